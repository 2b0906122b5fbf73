//! Nodes, nodal transformations and structural elements
//!
//! Elements hold `NodeId`s into the system's node arena and read nodal
//! displacements through it. `update_state` must run after any change of an
//! attached node's displacement before `force` or `stiffness` may be used;
//! the element checks this with per-node revision stamps.

mod beam2d;
mod frame2d;
mod membrane;
mod node;
mod quad;
mod transformation;
mod triangle;
mod truss;

pub use beam2d::Beam2D;
pub use frame2d::Frame2D;
pub use node::{Dof, DofCode, Node};
pub use quad::Quad;
pub use transformation::Transformation;
pub use triangle::LinearTriangle;
pub use truss::Truss;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FemError, FemResult};
use crate::math::{Mat, Vector};
use crate::system::NodeId;

/// Element family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    Truss,
    Beam2D,
    Frame2D,
    LinearTriangle,
    Quad,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Truss => "Truss",
            ElementKind::Beam2D => "Beam2D",
            ElementKind::Frame2D => "Frame2D",
            ElementKind::LinearTriangle => "LinearTriangle",
            ElementKind::Quad => "Quad",
        };
        f.write_str(name)
    }
}

/// Cached element response from the last `update_state`
#[derive(Debug, Clone)]
struct Response {
    revisions: Vec<u64>,
    force: Vector,
    stiffness: Mat,
}

/// Connectivity and cached response shared by all element types
#[derive(Debug, Clone)]
pub struct ElementCore {
    nodes: Vec<NodeId>,
    response: Option<Response>,
}

impl ElementCore {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self {
            nodes,
            response: None,
        }
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Look up the `i`-th attached node in the arena
    pub(crate) fn node<'a>(&self, nodes: &'a [Node], i: usize) -> FemResult<&'a Node> {
        let id = self.nodes[i];
        nodes
            .get(id.index())
            .ok_or(FemError::NodeNotFound(id.index()))
    }

    pub(crate) fn check_node_count(&self, expected: usize) -> FemResult<()> {
        if self.nodes.len() != expected {
            return Err(FemError::InvalidInput(format!(
                "element requires {} nodes, got {}",
                expected,
                self.nodes.len()
            )));
        }
        Ok(())
    }

    /// Store a freshly computed response stamped with current node revisions
    pub(crate) fn store(&mut self, nodes: &[Node], force: Vector, stiffness: Mat) -> FemResult<()> {
        let revisions = (0..self.nodes.len())
            .map(|i| self.node(nodes, i).map(|n| n.revision()))
            .collect::<FemResult<Vec<u64>>>()?;
        self.response = Some(Response {
            revisions,
            force,
            stiffness,
        });
        Ok(())
    }

    pub(crate) fn invalidate(&mut self) {
        self.response = None;
    }

    fn response(&self, nodes: &[Node]) -> FemResult<&Response> {
        let response = self.response.as_ref().ok_or(FemError::NotUpdated)?;
        for (i, &revision) in response.revisions.iter().enumerate() {
            if self.node(nodes, i)?.revision() != revision {
                return Err(FemError::StaleState);
            }
        }
        Ok(response)
    }
}

/// Common interface of all structural elements
///
/// Force vectors and stiffness matrices are node-major: the DOFs of
/// `dof_codes()` for the first node, then for the second node, and so on,
/// always in the global frame.
pub trait Element: fmt::Debug {
    fn kind(&self) -> ElementKind;

    fn core(&self) -> &ElementCore;

    fn core_mut(&mut self) -> &mut ElementCore;

    /// DOF codes required at every attached node
    fn dof_codes(&self) -> &'static [DofCode];

    /// Validate connectivity and geometry against the node arena and cache
    /// reference quantities
    fn attach(&mut self, nodes: &[Node]) -> FemResult<()>;

    /// Recompute strains, stresses, internal force and tangent stiffness from
    /// the current nodal displacements
    fn update_state(&mut self, nodes: &[Node]) -> FemResult<()>;

    /// Names accepted by `value`
    fn value_names(&self) -> &'static [&'static str];

    /// Named scalar result from the last `update_state`
    fn value(&self, name: &str) -> Option<f64>;

    /// Accept the material state of a converged step
    fn commit(&mut self);

    /// Discard the material state of an unconverged step
    fn revert(&mut self);

    /// Equivalent nodal forces of element loads (reference load, global frame)
    fn element_load(&self) -> Option<Vector> {
        None
    }

    /// Uniform transverse load per unit length; only line elements with
    /// bending support it
    fn set_distributed_load(&mut self, w: f64) -> FemResult<()> {
        let _ = w;
        Err(FemError::InvalidInput(format!(
            "{} does not take distributed loads",
            self.kind()
        )))
    }

    /// Remove all element loads
    fn reset_loads(&mut self) {}

    /// Return all materials to their virgin state and drop the cached response
    fn reset_state(&mut self);

    fn nodes(&self) -> &[NodeId] {
        self.core().nodes()
    }

    /// Internal force vector
    fn force(&self, nodes: &[Node]) -> FemResult<&Vector> {
        self.core().response(nodes).map(|r| &r.force)
    }

    /// Tangent stiffness matrix
    fn stiffness(&self, nodes: &[Node]) -> FemResult<&Mat> {
        self.core().response(nodes).map(|r| &r.stiffness)
    }
}

/// Node-major global displacement vector of an element
pub(crate) fn gather_disp(core: &ElementCore, nodes: &[Node], codes: &[DofCode]) -> FemResult<Vector> {
    let count = core.nodes().len();
    let mut u = Vector::zeros(count * codes.len());
    for i in 0..count {
        let ui = core.node(nodes, i)?.global_disp(codes)?;
        u.rows_mut(i * codes.len(), codes.len()).copy_from(&ui);
    }
    Ok(u)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Finite-difference checks shared by the element tests

    use super::*;
    use approx::assert_relative_eq;

    /// Nodes with all DOFs requested by `element`, indexed 0..n
    pub fn attach(element: &mut dyn Element, mut nodes: Vec<Node>) -> Vec<Node> {
        element.attach(&nodes).unwrap();
        let codes = element.dof_codes();
        for node in nodes.iter_mut() {
            node.request(codes);
        }
        nodes
    }

    /// Compare the tangent with central differences of the force vector
    pub fn check_tangent(element: &mut dyn Element, nodes: &mut [Node], h: f64, tol: f64) {
        element.update_state(nodes).unwrap();
        let k = element.stiffness(nodes).unwrap().clone();
        let per_node = element.dof_codes().len();
        let n = k.nrows();

        let mut fd = Mat::zeros(n, n);
        for j in 0..n {
            let (a, d) = (j / per_node, j % per_node);
            let base = nodes[a].disp();

            let mut plus = base.clone();
            plus[d] += h;
            nodes[a].set_disp(plus.as_slice()).unwrap();
            element.update_state(nodes).unwrap();
            let fp = element.force(nodes).unwrap().clone();

            let mut minus = base.clone();
            minus[d] -= h;
            nodes[a].set_disp(minus.as_slice()).unwrap();
            element.update_state(nodes).unwrap();
            let fm = element.force(nodes).unwrap().clone();

            nodes[a].set_disp(base.as_slice()).unwrap();
            fd.set_column(j, &((fp - fm) / (2.0 * h)));
        }
        element.update_state(nodes).unwrap();

        let scale = k.amax().max(1.0);
        for i in 0..n {
            for j in 0..n {
                assert_relative_eq!(k[(i, j)], fd[(i, j)], epsilon = tol * scale);
            }
        }
    }

    /// Assign a displacement vector (node-major, element DOF order)
    pub fn set_element_disp(nodes: &mut [Node], per_node: usize, u: &[f64]) {
        for (a, node) in nodes.iter_mut().enumerate() {
            node.set_disp(&u[a * per_node..(a + 1) * per_node]).unwrap();
        }
    }
}
