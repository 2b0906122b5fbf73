//! The structural system: node and element arenas, assembly and state control

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::elements::{DofCode, Element, Node};
use crate::error::{FemError, FemResult};
use crate::math::{solve_linear_system, Mat, SparseMatrixBuilder, Vector};
use crate::math::sparse::solve_sparse_spd;
use crate::recorder::{Record, RecordKey, Recorder};
use crate::results::{DofReport, ElementReport, NodeReport, StepOutcome, SystemReport};
use crate::solver::Solver;

/// Handle of a node in a `System`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Handle of an element in a `System`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(usize);

impl ElementId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Equation numbers of all nodal DOFs
///
/// Free DOFs are numbered `0..free` in node insertion order, skipping fixed
/// DOFs; restrained DOFs follow as `free..free + restrained`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofMap {
    equations: Vec<Vec<usize>>,
    free: usize,
    restrained: usize,
}

impl DofMap {
    fn new(nodes: &[Node]) -> Self {
        let mut equations: Vec<Vec<usize>> = nodes
            .iter()
            .map(|n| vec![usize::MAX; n.dofs().len()])
            .collect();

        let mut next = 0;
        let mut free = 0;
        for fixed in [false, true] {
            for (node, eqs) in nodes.iter().zip(equations.iter_mut()) {
                for (dof, eq) in node.dofs().iter().zip(eqs.iter_mut()) {
                    if dof.is_fixed() == fixed {
                        *eq = next;
                        next += 1;
                    }
                }
            }
            if !fixed {
                free = next;
            }
        }

        Self {
            equations,
            free,
            restrained: next - free,
        }
    }

    pub fn free_count(&self) -> usize {
        self.free
    }

    pub fn restrained_count(&self) -> usize {
        self.restrained
    }

    pub fn total(&self) -> usize {
        self.free + self.restrained
    }

    /// Equation numbers of a node's DOFs, in the node's DOF order
    pub fn equations(&self, node: NodeId) -> &[usize] {
        self.equations
            .get(node.index())
            .map(|e| e.as_slice())
            .unwrap_or(&[])
    }

    /// Free equation number of a DOF, `None` if it is restrained
    pub fn free_equation(&self, node: NodeId, dof: usize) -> Option<usize> {
        self.equations(node)
            .get(dof)
            .copied()
            .filter(|&eq| eq < self.free)
    }
}

/// Storage requested for the assembled tangent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TangentFormat {
    /// Residual only
    None,
    Dense,
    Sparse,
}

/// Assembled tangent stiffness over the free DOFs
#[derive(Debug, Clone)]
pub enum Tangent {
    None,
    Dense(Mat),
    Sparse(SparseMatrixBuilder),
}

impl Tangent {
    /// Solve `K Δu = rhs`
    pub fn solve(&self, rhs: &Vector) -> FemResult<Vector> {
        match self {
            Tangent::None => Err(FemError::InvalidInput(
                "no tangent was assembled".to_string(),
            )),
            Tangent::Dense(k) => solve_linear_system(k, rhs),
            Tangent::Sparse(_) if rhs.is_empty() => Ok(Vector::zeros(0)),
            Tangent::Sparse(builder) => solve_sparse_spd(builder, rhs),
        }
    }

    pub fn to_dense(&self) -> Option<Mat> {
        match self {
            Tangent::None => None,
            Tangent::Dense(k) => Some(k.clone()),
            Tangent::Sparse(builder) => Some(builder.to_dense()),
        }
    }
}

/// Result of one global assembly
#[derive(Debug, Clone)]
pub struct Assembly {
    pub load_factor: f64,
    /// Out-of-balance force `λ P - F_int` on the free DOFs
    pub residual: Vector,
    /// Reference load `P` on the free DOFs
    pub reference: Vector,
    /// Support reactions `F_int - λ P` on the restrained DOFs
    pub reactions: Vector,
    pub tangent: Tangent,
    pub map: DofMap,
}

impl Assembly {
    pub fn residual_norm(&self) -> f64 {
        self.residual.norm()
    }
}

enum Storage {
    None,
    Dense(Mat),
    Sparse(SparseMatrixBuilder),
}

/// A structure made of nodes and elements, driven by an attached solver
#[derive(Debug, Default)]
pub struct System {
    nodes: Vec<Node>,
    elements: Vec<Box<dyn Element>>,
    solver: Option<Box<dyn Solver>>,
    load_factor: f64,
    step: usize,
    recorder: Option<Recorder>,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId::new(self.nodes.len() - 1)
    }

    /// Attach an element; its nodes must already be in the system and receive
    /// the DOF codes the element needs
    pub fn add_element<E: Element + 'static>(&mut self, mut element: E) -> FemResult<ElementId> {
        for &id in element.nodes() {
            self.node(id)?;
        }
        element.attach(&self.nodes)?;

        let codes = element.dof_codes();
        for &id in element.nodes() {
            self.nodes[id.index()].request(codes);
        }
        debug!(
            "added {} on nodes {:?}",
            element.kind(),
            element.nodes().iter().map(|n| n.index()).collect::<Vec<_>>()
        );

        self.elements.push(Box::new(element));
        Ok(ElementId::new(self.elements.len() - 1))
    }

    pub fn node(&self, id: NodeId) -> FemResult<&Node> {
        self.nodes.get(id.index()).ok_or(FemError::NodeNotFound(id.index()))
    }

    pub fn node_mut(&mut self, id: NodeId) -> FemResult<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .ok_or(FemError::NodeNotFound(id.index()))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn element(&self, id: ElementId) -> FemResult<&dyn Element> {
        self.elements
            .get(id.index())
            .map(|e| e.as_ref())
            .ok_or(FemError::ElementNotFound(id.index()))
    }

    pub fn element_mut(&mut self, id: ElementId) -> FemResult<&mut dyn Element> {
        let element: &mut dyn Element = self
            .elements
            .get_mut(id.index())
            .ok_or(FemError::ElementNotFound(id.index()))?
            .as_mut();
        Ok(element)
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &dyn Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (ElementId::new(i), e.as_ref()))
    }

    /// Named element result, e.g. `"axial"` of a truss
    pub fn element_value(&self, id: ElementId, name: &str) -> FemResult<f64> {
        let element = self.element(id)?;
        element.value(name).ok_or_else(|| {
            FemError::InvalidInput(format!("{} has no value '{}'", element.kind(), name))
        })
    }

    /// Apply a uniform distributed load to a line element
    pub fn add_distributed_load(&mut self, id: ElementId, w: f64) -> FemResult<()> {
        self.element_mut(id)?.set_distributed_load(w)
    }

    pub fn set_solver<S: Solver + 'static>(&mut self, solver: S) {
        info!("using {}", solver.name());
        self.solver = Some(Box::new(solver));
    }

    pub fn solver(&self) -> Option<&dyn Solver> {
        self.solver.as_deref()
    }

    /// Target load factor of the next step, forwarded to the solver
    pub fn set_load_factor(&mut self, load_factor: f64) -> FemResult<()> {
        let solver = self.solver.as_mut().ok_or(FemError::NoSolver)?;
        solver.set_load_factor(load_factor);
        Ok(())
    }

    /// Load factor of the last converged step
    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Number of converged steps since the last displacement reset
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn dof_map(&self) -> DofMap {
        DofMap::new(&self.nodes)
    }

    /// Update all elements and assemble the residual, and unless `force_only`
    /// the dense tangent, over the free DOFs
    pub fn assemble(&mut self, load_factor: f64, force_only: bool) -> FemResult<Assembly> {
        let format = if force_only {
            TangentFormat::None
        } else {
            TangentFormat::Dense
        };
        self.assemble_with(load_factor, format)
    }

    pub fn assemble_with(&mut self, load_factor: f64, format: TangentFormat) -> FemResult<Assembly> {
        let map = self.dof_map();
        let nf = map.free_count();
        let storage = match format {
            TangentFormat::None => Storage::None,
            TangentFormat::Dense => Storage::Dense(Mat::zeros(nf, nf)),
            TangentFormat::Sparse => Storage::Sparse(SparseMatrixBuilder::new(nf)),
        };
        let (full, reference, storage) = self.scatter(load_factor, &map, nf, storage)?;

        let tangent = match storage {
            Storage::None => Tangent::None,
            Storage::Dense(k) => Tangent::Dense(k),
            Storage::Sparse(builder) => Tangent::Sparse(builder),
        };
        let residual = full.rows(0, nf).into_owned();
        let reactions = -full.rows(nf, map.restrained_count()).into_owned();
        debug!(
            "assembled {} free / {} restrained DOFs at lambda = {}, |R| = {:.6e}",
            nf,
            map.restrained_count(),
            load_factor,
            residual.norm()
        );

        Ok(Assembly {
            load_factor,
            residual,
            reference: reference.rows(0, nf).into_owned(),
            reactions,
            tangent,
            map,
        })
    }

    /// Dense tangent and residual over all DOFs, restrained ones included
    pub(crate) fn assemble_full(&mut self, load_factor: f64) -> FemResult<(Mat, Vector, DofMap)> {
        let map = self.dof_map();
        let n = map.total();
        let (residual, _, storage) = self.scatter(load_factor, &map, n, Storage::Dense(Mat::zeros(n, n)))?;
        match storage {
            Storage::Dense(k) => Ok((k, residual, map)),
            _ => Err(FemError::AnalysisFailed("dense assembly expected".to_string())),
        }
    }

    /// Residual and reference load over all equations of `map`; tangent
    /// entries with both equations below `limit` go to `storage`
    fn scatter(
        &mut self,
        load_factor: f64,
        map: &DofMap,
        limit: usize,
        mut storage: Storage,
    ) -> FemResult<(Vector, Vector, Storage)> {
        for element in self.elements.iter_mut() {
            element.update_state(&self.nodes)?;
        }

        let mut residual = Vector::zeros(map.total());
        let mut reference = Vector::zeros(map.total());
        for (i, node) in self.nodes.iter().enumerate() {
            let p = node.load();
            for (&eq, pk) in map.equations(NodeId::new(i)).iter().zip(p.iter()) {
                residual[eq] += load_factor * pk;
                reference[eq] += pk;
            }
        }

        for element in &self.elements {
            let (expansion, location) = self.expansion(element.as_ref(), map)?;
            let force = expansion.transpose() * element.force(&self.nodes)?;
            let mut net = -force;
            if let Some(p) = element.element_load() {
                let p = expansion.transpose() * p;
                net += &p * load_factor;
                for (&eq, value) in location.iter().zip(p.iter()) {
                    reference[eq] += value;
                }
            }
            for (&eq, value) in location.iter().zip(net.iter()) {
                residual[eq] += value;
            }

            if matches!(storage, Storage::None) {
                continue;
            }
            let k = expansion.transpose() * element.stiffness(&self.nodes)? * &expansion;
            match &mut storage {
                Storage::Dense(global) => {
                    for (a, &row) in location.iter().enumerate() {
                        if row >= limit {
                            continue;
                        }
                        for (b, &col) in location.iter().enumerate() {
                            if col < limit {
                                global[(row, col)] += k[(a, b)];
                            }
                        }
                    }
                }
                Storage::Sparse(builder) => {
                    let free: Vec<Option<usize>> = location
                        .iter()
                        .map(|&eq| if eq < limit { Some(eq) } else { None })
                        .collect();
                    builder.add_element_matrix(&free, &k);
                }
                Storage::None => {}
            }
        }
        Ok((residual, reference, storage))
    }

    /// Map from the node-frame DOFs of an element's nodes to its global,
    /// node-major element DOFs, and the equation numbers of those node DOFs
    fn expansion(&self, element: &dyn Element, map: &DofMap) -> FemResult<(Mat, Vec<usize>)> {
        let codes = element.dof_codes();
        let ids = element.nodes();
        let columns: usize = ids
            .iter()
            .map(|&id| self.node(id).map(|n| n.dofs().len()))
            .sum::<FemResult<usize>>()?;

        let mut expansion = Mat::zeros(ids.len() * codes.len(), columns);
        let mut location = Vec::with_capacity(columns);
        let mut col = 0;
        for (a, &id) in ids.iter().enumerate() {
            let node = self.node(id)?;
            let n = node.dofs().len();
            // global = Tᵀ node-frame
            let to_global = match node.transformation_matrix()? {
                Some(t) => t.transpose(),
                None => Mat::identity(n, n),
            };
            for (c, &code) in codes.iter().enumerate() {
                let idx = node.index_of(code).ok_or(FemError::UnknownDof(code))?;
                for j in 0..n {
                    expansion[(a * codes.len() + c, col + j)] = to_global[(idx, j)];
                }
            }
            location.extend_from_slice(map.equations(id));
            col += n;
        }
        Ok((expansion, location))
    }

    /// Add a correction over the free DOFs (length `free_count`) or over all
    /// DOFs (length `total`); restrained DOFs are never changed
    pub fn apply_correction(&mut self, map: &DofMap, du: &Vector) -> FemResult<()> {
        if du.len() != map.free_count() && du.len() != map.total() {
            return Err(FemError::DimensionMismatch {
                expected: map.free_count(),
                actual: du.len(),
            });
        }
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let eqs = map.equations(NodeId::new(i));
            let delta = Vector::from_iterator(
                eqs.len(),
                eqs.iter()
                    .map(|&eq| if eq < map.free_count() { du[eq] } else { 0.0 }),
            );
            node.increment_disp(&delta);
        }
        Ok(())
    }

    /// Node-frame displacements of the free DOFs, indexed by equation number
    pub fn free_disp(&self, map: &DofMap) -> Vector {
        let mut u = Vector::zeros(map.free_count());
        for (i, node) in self.nodes.iter().enumerate() {
            for (dof, &eq) in node.dofs().iter().zip(map.equations(NodeId::new(i))) {
                if eq < map.free_count() {
                    u[eq] = dof.disp();
                }
            }
        }
        u
    }

    /// Accept the current state as the converged state at `load_factor`
    pub fn commit_state(&mut self, load_factor: f64) {
        for node in &mut self.nodes {
            node.commit();
        }
        for element in &mut self.elements {
            element.commit();
        }
        self.load_factor = load_factor;
        self.step += 1;
        self.record_this_step();
    }

    /// Return to the last converged state
    pub fn revert_state(&mut self) {
        for node in &mut self.nodes {
            node.revert();
        }
        for element in &mut self.elements {
            element.revert();
        }
        self.refresh_elements();
    }

    /// Bring element results in line with the current displacements
    fn refresh_elements(&mut self) {
        for (i, element) in self.elements.iter_mut().enumerate() {
            if let Err(err) = element.update_state(&self.nodes) {
                warn!("E{} could not be updated: {}", i, err);
            }
        }
    }

    /// Lend the attached solver the system for one call
    fn with_solver<T>(
        &mut self,
        run: impl FnOnce(&mut dyn Solver, &mut System) -> FemResult<T>,
    ) -> FemResult<T> {
        let mut solver = self.solver.take().ok_or(FemError::NoSolver)?;
        let result = run(solver.as_mut(), self);
        self.solver = Some(solver);
        result
    }

    /// Run one step with the attached solver
    pub fn solve(&mut self) -> FemResult<StepOutcome> {
        self.with_solver(|solver, system| solver.solve(system))
    }

    /// Let the following steps find the load factor at which a free DOF
    /// reaches `target` (node frame)
    pub fn set_displacement_control(&mut self, node: NodeId, code: DofCode, target: f64) -> FemResult<()> {
        let dof = self
            .node(node)?
            .dofs()
            .iter()
            .find(|d| d.code() == code)
            .ok_or(FemError::UnknownDof(code))?;
        if dof.is_fixed() {
            return Err(FemError::FixedDof(code));
        }
        let solver = self.solver.as_mut().ok_or(FemError::NoSolver)?;
        solver.set_displacement_control(node, code, target)?;
        info!("{} target {}:{} = {}", solver.name(), node, code, target);
        Ok(())
    }

    /// Solve one load-controlled step of `load_increment` from the last
    /// converged state and switch to arc-length control with that step's
    /// length; `alpha` weighs the load factor in the arc length
    pub fn init_arc_length(&mut self, load_increment: f64, alpha: f64) -> FemResult<StepOutcome> {
        self.with_solver(|solver, system| solver.init_arc_length(system, load_increment, alpha))
    }

    /// Advance one arc length along the equilibrium path
    pub fn step_arc_length(&mut self) -> FemResult<StepOutcome> {
        self.with_solver(|solver, system| solver.step_arc_length(system))
    }

    /// Solve a sequence of load factors, stopping after the first failed step
    pub fn solve_increments(&mut self, load_factors: &[f64]) -> FemResult<Vec<StepOutcome>> {
        let mut outcomes = Vec::with_capacity(load_factors.len());
        for &lam in load_factors {
            self.set_load_factor(lam)?;
            let outcome = self.solve()?;
            outcomes.push(outcome);
            if !outcome.is_converged() {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Zero all displacements and return every material to its virgin state
    pub fn reset_disp(&mut self) {
        for node in &mut self.nodes {
            node.reset_disp();
        }
        for element in &mut self.elements {
            element.reset_state();
        }
        self.refresh_elements();
        self.load_factor = 0.0;
        self.step = 0;
    }

    /// Remove all nodal and element loads
    pub fn reset_load(&mut self) {
        for node in &mut self.nodes {
            node.reset_load();
        }
        for element in &mut self.elements {
            element.reset_loads();
        }
    }

    pub fn reset_all(&mut self) {
        self.reset_disp();
        self.reset_load();
    }

    /// Install a recorder with its tracked keys; replaces any previous one
    ///
    /// Keys cannot be added to a recorder that already holds records.
    pub fn set_recorder(&mut self, recorder: Recorder) -> FemResult<()> {
        if !recorder.is_consistent() {
            return Err(FemError::InvalidInput(
                "recorder keys changed after recording started; clear it first".to_string(),
            ));
        }
        for key in recorder.keys() {
            match key {
                RecordKey::LoadFactor => {}
                RecordKey::Dof(node, _) => {
                    self.node(*node)?;
                }
                RecordKey::Element(element, _) => {
                    self.element(*element)?;
                }
            }
        }
        self.recorder = Some(recorder);
        Ok(())
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    /// Start recording; installs a load-factor-only recorder if none is set
    pub fn start_recorder(&mut self) {
        self.recorder.get_or_insert_with(Recorder::new).start();
    }

    pub fn stop_recorder(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.stop();
        }
    }

    /// Record the current state if the recorder is active
    pub fn record_this_step(&mut self) {
        let values = match &self.recorder {
            Some(recorder) if recorder.is_active() => recorder
                .keys()
                .iter()
                .map(|key| self.recorded_value(key))
                .collect(),
            _ => return,
        };
        let record = Record {
            step: self.step,
            load_factor: self.load_factor,
            values,
        };
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.push(record);
        }
    }

    fn recorded_value(&self, key: &RecordKey) -> f64 {
        match key {
            RecordKey::LoadFactor => self.load_factor,
            RecordKey::Dof(node, code) => self
                .node(*node)
                .and_then(|n| n.disp_for(&[*code]))
                .map(|u| u[0])
                .unwrap_or(f64::NAN),
            RecordKey::Element(element, name) => self
                .element(*element)
                .ok()
                .and_then(|e| e.value(name))
                .unwrap_or(f64::NAN),
        }
    }

    /// History of a recorded quantity by label, e.g. `"lam"` or `"N1:uy"`
    pub fn fetch_record(&self, label: &str) -> FemResult<Vec<f64>> {
        self.recorder
            .as_ref()
            .ok_or_else(|| FemError::InvalidInput("no recorder installed".to_string()))?
            .fetch_by_label(label)
    }

    /// Load-displacement curve `(λ, u)` of a tracked DOF
    pub fn fetch_dof_history(&self, node: NodeId, code: DofCode) -> FemResult<Vec<(f64, f64)>> {
        let recorder = self
            .recorder
            .as_ref()
            .ok_or_else(|| FemError::InvalidInput("no recorder installed".to_string()))?;
        let lam = recorder.fetch(&RecordKey::LoadFactor)?;
        let u = recorder.fetch(&RecordKey::Dof(node, code))?;
        Ok(lam.into_iter().zip(u).collect())
    }

    /// Support reactions on the fixed DOFs of a node (node frame)
    pub fn reactions(&mut self, id: NodeId) -> FemResult<Vec<(DofCode, f64)>> {
        self.node(id)?;
        let assembly = self.assemble(self.load_factor, true)?;
        Ok(self.node_reactions(id, &assembly))
    }

    fn node_reactions(&self, id: NodeId, assembly: &Assembly) -> Vec<(DofCode, f64)> {
        let nf = assembly.map.free_count();
        let Ok(node) = self.node(id) else {
            return Vec::new();
        };
        node.dofs()
            .iter()
            .zip(assembly.map.equations(id))
            .filter(|(_, eq)| **eq >= nf)
            .map(|(dof, &eq)| (dof.code(), assembly.reactions[eq - nf]))
            .collect()
    }

    /// Nodes, reactions and element results of the current state
    pub fn report(&mut self) -> FemResult<SystemReport> {
        let assembly = self.assemble(self.load_factor, true)?;

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            let id = NodeId::new(i);
            let reactions = self.node_reactions(id, &assembly);
            let dofs = node
                .dofs()
                .iter()
                .map(|dof| DofReport {
                    code: dof.code(),
                    fixed: dof.is_fixed(),
                    disp: dof.disp(),
                    reaction: reactions
                        .iter()
                        .find(|(code, _)| *code == dof.code())
                        .map(|&(_, r)| r),
                })
                .collect();
            let load = node
                .codes()
                .into_iter()
                .zip(node.load().iter().copied())
                .filter(|&(_, p)| p != 0.0)
                .collect();
            nodes.push(NodeReport {
                index: i,
                pos: node.pos().to_vec(),
                dofs,
                load,
            });
        }

        let elements = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, element)| ElementReport {
                index: i,
                kind: element.kind(),
                nodes: element.nodes().iter().map(|n| n.index()).collect(),
                values: element
                    .value_names()
                    .iter()
                    .filter_map(|&name| element.value(name).map(|v| (name.to_string(), v)))
                    .collect(),
            })
            .collect();

        Ok(SystemReport {
            load_factor: self.load_factor,
            step: self.step,
            free_dofs: assembly.map.free_count(),
            restrained_dofs: assembly.map.restrained_count(),
            nodes,
            elements,
        })
    }
}
