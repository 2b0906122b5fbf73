//! Nodes and their degrees of freedom

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::transformation::Transformation;
use crate::error::{FemError, FemResult};
use crate::math::{Mat, Vector};

/// Symbolic code of a nodal degree of freedom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DofCode {
    Ux,
    Uy,
    Uz,
    Rx,
    Ry,
    Rz,
}

impl DofCode {
    pub const ALL: [DofCode; 6] = [
        DofCode::Ux,
        DofCode::Uy,
        DofCode::Uz,
        DofCode::Rx,
        DofCode::Ry,
        DofCode::Rz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DofCode::Ux => "ux",
            DofCode::Uy => "uy",
            DofCode::Uz => "uz",
            DofCode::Rx => "rx",
            DofCode::Ry => "ry",
            DofCode::Rz => "rz",
        }
    }

    pub fn is_translation(&self) -> bool {
        matches!(self, DofCode::Ux | DofCode::Uy | DofCode::Uz)
    }

    /// Coordinate axis (0 = x, 1 = y, 2 = z) the DOF acts along or about
    pub fn axis(&self) -> usize {
        match self {
            DofCode::Ux | DofCode::Rx => 0,
            DofCode::Uy | DofCode::Ry => 1,
            DofCode::Uz | DofCode::Rz => 2,
        }
    }
}

impl fmt::Display for DofCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DofCode {
    type Err = FemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DofCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FemError::InvalidInput(format!("unknown DOF code '{}'", s)))
    }
}

/// A single scalar degree of freedom
///
/// Displacements are stored in the node frame, i.e. rotated by the node's
/// transformation when one is attached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dof {
    code: DofCode,
    fixed: bool,
    disp: f64,
    committed: f64,
}

impl Dof {
    fn new(code: DofCode, fixed: bool) -> Self {
        Self {
            code,
            fixed,
            disp: 0.0,
            committed: 0.0,
        }
    }

    pub fn code(&self) -> DofCode {
        self.code
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn disp(&self) -> f64 {
        self.disp
    }
}

/// A node in 2D or 3D space
///
/// The DOF list grows as elements request codes and never shrinks, so DOF
/// indices are stable. Fixities and loads are keyed by code and may be given
/// before any element requests the DOF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pos: [f64; 3],
    dim: usize,
    dofs: Vec<Dof>,
    fixity: BTreeSet<DofCode>,
    loads: BTreeMap<DofCode, f64>,
    transformation: Option<Transformation>,
    #[serde(skip)]
    revision: u64,
}

impl Node {
    /// Create a node in the plane
    pub fn new(x: f64, y: f64) -> Self {
        Self::with_dim([x, y, 0.0], 2)
    }

    /// Create a node in space
    pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Self::with_dim([x, y, z], 3)
    }

    fn with_dim(pos: [f64; 3], dim: usize) -> Self {
        Self {
            pos,
            dim,
            dofs: Vec::new(),
            fixity: BTreeSet::new(),
            loads: BTreeMap::new(),
            transformation: None,
            revision: 0,
        }
    }

    /// Spatial dimension (2 or 3)
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Reference position
    pub fn pos(&self) -> &[f64] {
        &self.pos[..self.dim]
    }

    pub(crate) fn coords(&self) -> [f64; 3] {
        self.pos
    }

    pub fn dofs(&self) -> &[Dof] {
        &self.dofs
    }

    pub fn codes(&self) -> Vec<DofCode> {
        self.dofs.iter().map(|d| d.code).collect()
    }

    pub fn has_dof(&self, code: DofCode) -> bool {
        self.index_of(code).is_some()
    }

    pub fn index_of(&self, code: DofCode) -> Option<usize> {
        self.dofs.iter().position(|d| d.code == code)
    }

    fn require(&self, code: DofCode) -> FemResult<usize> {
        self.index_of(code).ok_or(FemError::UnknownDof(code))
    }

    /// Register DOF codes needed by an element and return their indices
    pub fn request(&mut self, codes: &[DofCode]) -> Vec<usize> {
        codes
            .iter()
            .map(|&code| match self.index_of(code) {
                Some(idx) => idx,
                None => {
                    self.dofs.push(Dof::new(code, self.fixity.contains(&code)));
                    self.dofs.len() - 1
                }
            })
            .collect()
    }

    /// Restrain the given DOFs (homogeneous Dirichlet condition)
    pub fn fix_dof(&mut self, codes: &[DofCode]) {
        for &code in codes {
            self.fixity.insert(code);
            if let Some(idx) = self.index_of(code) {
                self.dofs[idx].fixed = true;
            }
        }
    }

    /// Restrain a DOF at a non-zero displacement value
    pub fn prescribe_disp(&mut self, code: DofCode, value: f64) -> FemResult<()> {
        let idx = self.require(code)?;
        self.fix_dof(&[code]);
        let dof = &mut self.dofs[idx];
        dof.disp = value;
        dof.committed = value;
        self.revision += 1;
        Ok(())
    }

    pub fn is_fixed(&self, code: DofCode) -> bool {
        self.fixity.contains(&code)
    }

    /// Overwrite the displacements of all DOFs (node frame, DOF order)
    ///
    /// Fails with `FemError::FixedDof` if a fixed DOF would change value; in
    /// that case nothing is modified.
    pub fn set_disp(&mut self, values: &[f64]) -> FemResult<()> {
        let codes = self.codes();
        self.set_disp_for(&codes, values)
    }

    /// Overwrite the displacements of the listed DOFs
    pub fn set_disp_for(&mut self, codes: &[DofCode], values: &[f64]) -> FemResult<()> {
        check_len(codes.len(), values.len())?;

        let mut updates = Vec::with_capacity(codes.len());
        for (&code, &value) in codes.iter().zip(values) {
            let idx = self.require(code)?;
            let dof = &self.dofs[idx];
            if dof.fixed && dof.disp != value {
                return Err(FemError::FixedDof(code));
            }
            updates.push((idx, value));
        }

        for (idx, value) in updates {
            self.dofs[idx].disp = value;
            self.dofs[idx].committed = value;
        }
        self.revision += 1;
        Ok(())
    }

    /// Displacements of all DOFs (node frame, DOF order)
    pub fn disp(&self) -> Vector {
        Vector::from_iterator(self.dofs.len(), self.dofs.iter().map(|d| d.disp))
    }

    /// Displacements of the listed DOFs (node frame)
    pub fn disp_for(&self, codes: &[DofCode]) -> FemResult<Vector> {
        let values = codes
            .iter()
            .map(|&code| self.require(code).map(|idx| self.dofs[idx].disp))
            .collect::<FemResult<Vec<f64>>>()?;
        Ok(Vector::from_vec(values))
    }

    /// Deformed position `X + factor * u` using global translations
    pub fn deformed_pos(&self, factor: f64) -> FemResult<Vec<f64>> {
        let global = self.global_disp_all()?;
        let mut pos = self.pos;
        for (dof, u) in self.dofs.iter().zip(global.iter()) {
            if dof.code.is_translation() && dof.code.axis() < self.dim {
                pos[dof.code.axis()] += factor * u;
            }
        }
        Ok(pos[..self.dim].to_vec())
    }

    /// Add to the reference load (node frame)
    pub fn add_load(&mut self, codes: &[DofCode], values: &[f64]) -> FemResult<()> {
        check_len(codes.len(), values.len())?;
        for (&code, &value) in codes.iter().zip(values) {
            *self.loads.entry(code).or_insert(0.0) += value;
        }
        Ok(())
    }

    /// Replace the reference load on the listed DOFs (node frame)
    pub fn set_load(&mut self, codes: &[DofCode], values: &[f64]) -> FemResult<()> {
        check_len(codes.len(), values.len())?;
        for (&code, &value) in codes.iter().zip(values) {
            self.loads.insert(code, value);
        }
        Ok(())
    }

    /// Reference load aligned with the DOF list; loads on absent codes are ignored
    pub fn load(&self) -> Vector {
        Vector::from_iterator(
            self.dofs.len(),
            self.dofs
                .iter()
                .map(|d| self.loads.get(&d.code).copied().unwrap_or(0.0)),
        )
    }

    /// Reference load on the listed codes (zero where none is applied)
    pub fn load_for(&self, codes: &[DofCode]) -> Vector {
        Vector::from_iterator(
            codes.len(),
            codes.iter().map(|c| self.loads.get(c).copied().unwrap_or(0.0)),
        )
    }

    pub fn has_load(&self) -> bool {
        !self.loads.is_empty()
    }

    pub fn reset_disp(&mut self) {
        for dof in &mut self.dofs {
            dof.disp = 0.0;
            dof.committed = 0.0;
        }
        self.revision += 1;
    }

    pub fn reset_load(&mut self) {
        self.loads.clear();
    }

    /// Reset displacements and loads; topology and fixities are kept
    pub fn reset_all(&mut self) {
        self.reset_disp();
        self.reset_load();
    }

    /// Attach a local frame for this node's displacements, loads and fixities
    pub fn add_transformation(&mut self, transformation: Transformation) {
        self.transformation = Some(transformation);
    }

    pub fn transformation(&self) -> Option<&Transformation> {
        self.transformation.as_ref()
    }

    /// Node-frame rotation over the node's DOF list, if a transformation is attached
    pub(crate) fn transformation_matrix(&self) -> FemResult<Option<Mat>> {
        self.transformation
            .as_ref()
            .map(|t| t.matrix(&self.codes()))
            .transpose()
    }

    fn global_disp_all(&self) -> FemResult<Vector> {
        let local = self.disp();
        match self.transformation_matrix()? {
            Some(t) => Ok(t.transpose() * local),
            None => Ok(local),
        }
    }

    /// Displacements of the listed DOFs in the global frame (used by elements)
    pub(crate) fn global_disp(&self, codes: &[DofCode]) -> FemResult<Vector> {
        let all = self.global_disp_all()?;
        let values = codes
            .iter()
            .map(|&code| self.require(code).map(|idx| all[idx]))
            .collect::<FemResult<Vec<f64>>>()?;
        Ok(Vector::from_vec(values))
    }

    /// Apply a solver correction (node frame, DOF order); fixed DOFs are untouched
    pub(crate) fn increment_disp(&mut self, delta: &Vector) {
        for (dof, du) in self.dofs.iter_mut().zip(delta.iter()) {
            if !dof.fixed {
                dof.disp += du;
            }
        }
        self.revision += 1;
    }

    /// Accept the current displacements as the converged state
    pub(crate) fn commit(&mut self) {
        for dof in &mut self.dofs {
            dof.committed = dof.disp;
        }
    }

    /// Return to the last converged displacements
    pub(crate) fn revert(&mut self) {
        for dof in &mut self.dofs {
            dof.disp = dof.committed;
        }
        self.revision += 1;
    }

    /// Counter bumped on every displacement change
    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }
}

fn check_len(expected: usize, actual: usize) -> FemResult<()> {
    if expected != actual {
        return Err(FemError::DimensionMismatch { expected, actual });
    }
    Ok(())
}
