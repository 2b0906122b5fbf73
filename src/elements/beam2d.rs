//! Euler-Bernoulli beam along the global x axis

use super::{gather_disp, DofCode, Element, ElementCore, ElementKind, Node};
use crate::error::{FemError, FemResult};
use crate::materials::SectionMaterial;
use crate::math::{gauss_legendre, Mat, Vec2, Vector};
use crate::system::NodeId;

const CODES: &[DofCode] = &[DofCode::Uy, DofCode::Rz];

/// Default number of Gauss points along the element
pub const DEFAULT_INTEGRATION_POINTS: usize = 3;

/// Curvature interpolation `κ = B d` for `d = [v_i, θ_i, v_j, θ_j]`
fn curvature_row(xi: f64, length: f64) -> [f64; 4] {
    let l2 = length * length;
    [
        (-6.0 + 12.0 * xi) / l2,
        (-4.0 + 6.0 * xi) / length,
        (6.0 - 12.0 * xi) / l2,
        (-2.0 + 6.0 * xi) / length,
    ]
}

/// Two-node beam with cubic Hermite deflection, DOFs `uy` and `rz`
///
/// The beam axis must run along +x. Curvature is sampled at Gauss points and
/// each point owns its own section instance; only the flexural response of
/// the section is used (no axial-flexural coupling).
#[derive(Debug, Clone)]
pub struct Beam2D {
    core: ElementCore,
    sections: Vec<Box<dyn SectionMaterial>>,
    points: Vec<(f64, f64)>,
    length: f64,
    distributed_load: f64,
    end_moments: [f64; 2],
}

impl Beam2D {
    pub fn new(i: NodeId, j: NodeId, section: Box<dyn SectionMaterial>) -> Self {
        Self {
            core: ElementCore::new(vec![i, j]),
            sections: vec![section],
            points: Vec::new(),
            length: 0.0,
            distributed_load: 0.0,
            end_moments: [0.0; 2],
        }
    }

    /// Number of Gauss points (1 to 5); must be set before the element is added
    pub fn with_integration_points(mut self, n: usize) -> FemResult<Self> {
        self.points = gauss_legendre(n)?;
        Ok(self)
    }

    /// Uniform transverse load per unit length (positive along +y)
    pub fn distributed_load(&self) -> f64 {
        self.distributed_load
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Section instances, one per integration point
    pub fn sections(&self) -> &[Box<dyn SectionMaterial>] {
        &self.sections
    }
}

impl Element for Beam2D {
    fn kind(&self) -> ElementKind {
        ElementKind::Beam2D
    }

    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn dof_codes(&self) -> &'static [DofCode] {
        CODES
    }

    fn attach(&mut self, nodes: &[Node]) -> FemResult<()> {
        self.core.check_node_count(2)?;
        let xi = self.core.node(nodes, 0)?.coords();
        let xj = self.core.node(nodes, 1)?.coords();
        let (dx, dy, dz) = (xj[0] - xi[0], xj[1] - xi[1], xj[2] - xi[2]);
        if dx <= 0.0 || dy.abs() > 1e-9 * dx || dz.abs() > 1e-9 * dx {
            return Err(FemError::InvalidGeometry(
                "Beam2D must run along the positive x axis; use Frame2D for other orientations"
                    .to_string(),
            ));
        }
        self.length = dx;

        if self.points.is_empty() {
            self.points = gauss_legendre(DEFAULT_INTEGRATION_POINTS)?;
        }
        let prototype = self.sections[0].clone();
        self.sections = vec![prototype; self.points.len()];
        Ok(())
    }

    fn update_state(&mut self, nodes: &[Node]) -> FemResult<()> {
        let d = gather_disp(&self.core, nodes, CODES)?;
        let length = self.length;

        let mut force = Vector::zeros(4);
        let mut stiffness = Mat::zeros(4, 4);
        for (&(xi, w), section) in self.points.iter().zip(self.sections.iter_mut()) {
            let b = Vector::from_row_slice(&curvature_row(xi, length));
            let kappa = b.dot(&d);
            section.set_strain(&Vec2::new(0.0, kappa))?;
            let moment = section.stress()[1];
            let ei = section.stiffness()[(1, 1)];

            force += &b * (w * length * moment);
            stiffness += &b * b.transpose() * (w * length * ei);
        }
        self.end_moments = [-force[1], force[3]];

        self.core.store(nodes, force, stiffness)
    }

    fn value_names(&self) -> &'static [&'static str] {
        &["moment_i", "moment_j"]
    }

    fn value(&self, name: &str) -> Option<f64> {
        match name {
            "moment_i" => Some(self.end_moments[0]),
            "moment_j" => Some(self.end_moments[1]),
            _ => None,
        }
    }

    fn commit(&mut self) {
        for section in &mut self.sections {
            section.commit();
        }
    }

    fn revert(&mut self) {
        for section in &mut self.sections {
            section.revert();
        }
        self.core.invalidate();
    }

    fn element_load(&self) -> Option<Vector> {
        if self.distributed_load == 0.0 {
            return None;
        }
        let (w, l) = (self.distributed_load, self.length);
        Some(Vector::from_vec(vec![
            w * l / 2.0,
            w * l * l / 12.0,
            w * l / 2.0,
            -w * l * l / 12.0,
        ]))
    }

    fn set_distributed_load(&mut self, w: f64) -> FemResult<()> {
        self.distributed_load = w;
        Ok(())
    }

    fn reset_loads(&mut self) {
        self.distributed_load = 0.0;
    }

    fn reset_state(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
        self.core.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::{attach, check_tangent, set_element_disp};
    use crate::materials::{ElasticSection, FiberMaterial, FiberSection};
    use approx::assert_relative_eq;

    fn beam(section: Box<dyn SectionMaterial>) -> (Beam2D, Vec<Node>) {
        let mut beam = Beam2D::new(NodeId::new(0), NodeId::new(1), section);
        let nodes = attach(&mut beam, vec![Node::new(0.0, 0.0), Node::new(2.0, 0.0)]);
        (beam, nodes)
    }

    #[test]
    fn test_elastic_stiffness_matches_closed_form() {
        let section = ElasticSection::new(100.0, 1.0, 0.5).unwrap();
        let (mut beam, nodes) = beam(Box::new(section));
        beam.update_state(&nodes).unwrap();
        let k = beam.stiffness(&nodes).unwrap();

        let (ei, l): (f64, f64) = (50.0, 2.0);
        let expected = Mat::from_row_slice(
            4,
            4,
            &[
                12.0, 6.0 * l, -12.0, 6.0 * l,
                6.0 * l, 4.0 * l * l, -6.0 * l, 2.0 * l * l,
                -12.0, -6.0 * l, 12.0, -6.0 * l,
                6.0 * l, 2.0 * l * l, -6.0 * l, 4.0 * l * l,
            ],
        ) * (ei / l.powi(3));
        assert_relative_eq!(*k, expected, epsilon = 1e-10);
    }

    #[test]
    fn test_constant_curvature_end_moments() {
        let section = ElasticSection::new(100.0, 1.0, 0.5).unwrap();
        let (mut beam, mut nodes) = beam(Box::new(section));
        // v = x^2 / 2 * kappa with kappa = 0.01
        set_element_disp(&mut nodes, 2, &[0.0, 0.0, 0.02, 0.02]);
        beam.update_state(&nodes).unwrap();
        assert_relative_eq!(beam.value("moment_i").unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(beam.value("moment_j").unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_consistent_tangent_fiber_section() {
        let steel = FiberMaterial::new(1000.0, 1.0, 50.0).unwrap();
        let section = FiberSection::rectangle(0.1, 0.2, 10, &steel).unwrap();
        let (mut beam, mut nodes) = beam(Box::new(section));
        set_element_disp(&mut nodes, 2, &[0.0, 0.013, 0.021, 0.027]);
        check_tangent(&mut beam, &mut nodes, 1e-8, 1e-5);
    }

    #[test]
    fn test_distributed_load_equivalent_forces() {
        let section = ElasticSection::new(100.0, 1.0, 0.5).unwrap();
        let (mut beam, _nodes) = beam(Box::new(section));
        assert!(beam.element_load().is_none());

        beam.set_distributed_load(-3.0).unwrap();
        let p = beam.element_load().unwrap();
        assert_relative_eq!(p[0] + p[2], -6.0);
        assert_relative_eq!(p[1], -1.0);

        beam.reset_loads();
        assert!(beam.element_load().is_none());
    }

    #[test]
    fn test_inclined_beam_rejected() {
        let section = ElasticSection::new(100.0, 1.0, 0.5).unwrap();
        let mut beam = Beam2D::new(NodeId::new(0), NodeId::new(1), Box::new(section));
        let nodes = vec![Node::new(0.0, 0.0), Node::new(1.0, 1.0)];
        assert!(beam.attach(&nodes).is_err());
    }
}
