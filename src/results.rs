//! Result types: step outcomes and the system report

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::elements::{DofCode, ElementKind};
use crate::error::FemResult;

/// Final status of a load step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Residual dropped below the tolerance; state committed
    Converged,
    /// Iteration limit reached; state reverted to the last converged step
    Failed,
}

/// Outcome of one call to `Solver::solve`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Target load factor of the step
    pub load_factor: f64,
    /// Number of corrections applied
    pub iterations: usize,
    /// Norm of the last residual evaluated
    pub residual_norm: f64,
    pub status: StepStatus,
}

impl StepOutcome {
    pub fn is_converged(&self) -> bool {
        self.status == StepStatus::Converged
    }
}

/// One DOF row of the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DofReport {
    pub code: DofCode,
    pub fixed: bool,
    pub disp: f64,
    /// Support reaction, present for fixed DOFs
    pub reaction: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    pub index: usize,
    pub pos: Vec<f64>,
    pub dofs: Vec<DofReport>,
    pub load: Vec<(DofCode, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementReport {
    pub index: usize,
    pub kind: ElementKind,
    pub nodes: Vec<usize>,
    pub values: Vec<(String, f64)>,
}

/// Snapshot of the converged state of a system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemReport {
    pub load_factor: f64,
    pub step: usize,
    pub free_dofs: usize,
    pub restrained_dofs: usize,
    pub nodes: Vec<NodeReport>,
    pub elements: Vec<ElementReport>,
}

impl SystemReport {
    /// Largest absolute displacement over all DOFs
    pub fn max_displacement(&self) -> f64 {
        self.nodes
            .iter()
            .flat_map(|n| n.dofs.iter())
            .map(|d| d.disp.abs())
            .fold(0.0, f64::max)
    }

    pub fn to_json(&self) -> FemResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SystemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "System Analysis Report")?;
        writeln!(f, "======================")?;
        writeln!(
            f,
            "load factor = {:.6}, step = {}, free DOFs = {}, restrained DOFs = {}",
            self.load_factor, self.step, self.free_dofs, self.restrained_dofs
        )?;

        writeln!(f)?;
        writeln!(f, "Nodes")?;
        writeln!(f, "-----")?;
        for node in &self.nodes {
            let pos: Vec<String> = node.pos.iter().map(|x| format!("{:.4}", x)).collect();
            writeln!(f, "N{} at ({})", node.index, pos.join(", "))?;
            for dof in &node.dofs {
                write!(
                    f,
                    "    {:<2} {} u = {:>14.6e}",
                    dof.code,
                    if dof.fixed { "fixed" } else { "free " },
                    dof.disp
                )?;
                if let Some(r) = dof.reaction {
                    write!(f, "  R = {:>14.6e}", r)?;
                }
                writeln!(f)?;
            }
            for (code, p) in &node.load {
                writeln!(f, "    load {} = {:.6e}", code, p)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Elements")?;
        writeln!(f, "--------")?;
        for element in &self.elements {
            let nodes: Vec<String> = element.nodes.iter().map(|n| format!("N{}", n)).collect();
            write!(f, "E{} {} [{}]", element.index, element.kind, nodes.join(", "))?;
            for (name, value) in &element.values {
                write!(f, " {} = {:.6e}", name, value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
