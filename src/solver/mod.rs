//! Equilibrium solvers
//!
//! A solver owns the target load factor of the next step and drives a
//! `System` from its last converged state to equilibrium at that load
//! factor. It commits the system on convergence and reverts it otherwise.
//! Under displacement or arc-length control the load factor becomes an
//! unknown of the step instead of its target.

mod linear;
mod newton;

pub use linear::LinearSolver;
pub use newton::NewtonRaphsonSolver;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::elements::DofCode;
use crate::error::{FemError, FemResult};
use crate::results::StepOutcome;
use crate::system::{NodeId, System};

/// Progress of the step a solver is working on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverState {
    /// No step started yet
    Idle,
    /// Elements are being updated and assembled
    Assembling,
    /// Corrections are being applied
    Iterating,
    /// The last step reached equilibrium and was committed
    Converged,
    /// The last step failed and the system was reverted
    Failed,
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverState::Idle => "idle",
            SolverState::Assembling => "assembling",
            SolverState::Iterating => "iterating",
            SolverState::Converged => "converged",
            SolverState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Convergence tolerance on the residual norm ‖R‖
    pub tolerance: f64,
    /// Maximum number of corrections per step
    pub max_iterations: usize,
    /// Use the sparse Cholesky solver (requires a positive definite tangent)
    pub sparse: bool,
    /// Log every iteration at info level instead of debug
    pub log: bool,
}

impl SolverOptions {
    pub fn new(tolerance: f64, max_iterations: usize) -> FemResult<Self> {
        if !(tolerance > 0.0) || !tolerance.is_finite() {
            return Err(FemError::InvalidInput(format!(
                "tolerance must be positive, got {}",
                tolerance
            )));
        }
        if max_iterations == 0 {
            return Err(FemError::InvalidInput(
                "at least one iteration must be allowed".to_string(),
            ));
        }
        Ok(Self {
            tolerance,
            max_iterations,
            sparse: false,
            log: false,
        })
    }

    /// Solve with the sparse Cholesky factorization
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Enable per-iteration progress output
    pub fn with_logging(mut self) -> Self {
        self.log = true;
        self
    }
}

/// How the load factor of the next step is found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathControl {
    /// The load factor is prescribed by `Solver::set_load_factor`
    Load,
    /// The load factor is whatever moves one free DOF to `target`
    /// (node frame, total displacement)
    Displacement {
        node: NodeId,
        code: DofCode,
        target: f64,
    },
    /// Each step covers the same arc length
    /// `Δu·Δu + alpha ‖P‖² Δλ² = length²` from the last converged state
    ArcLength { alpha: f64, length: f64 },
}

impl fmt::Display for PathControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathControl::Load => f.write_str("load control"),
            PathControl::Displacement { node, code, target } => {
                write!(f, "displacement control of {}:{} to {}", node, code, target)
            }
            PathControl::ArcLength { alpha, length } => {
                write!(f, "arc-length control, ds = {:.4e}, alpha = {}", length, alpha)
            }
        }
    }
}

/// Common interface of equilibrium solvers
pub trait Solver: fmt::Debug {
    fn name(&self) -> &'static str;

    fn state(&self) -> SolverState;

    /// Target load factor of the next step
    fn load_factor(&self) -> f64;

    fn set_load_factor(&mut self, load_factor: f64);

    /// Run one load step to the target load factor
    ///
    /// Returns `Err` for a singular tangent or invalid model; a step that does
    /// not converge is reported through `StepOutcome::status`.
    fn solve(&mut self, system: &mut System) -> FemResult<StepOutcome>;

    /// Active path-following mode
    fn control(&self) -> PathControl {
        PathControl::Load
    }

    /// Find the load factor of the following steps from a target displacement
    fn set_displacement_control(&mut self, node: NodeId, code: DofCode, target: f64) -> FemResult<()> {
        let _ = (node, code, target);
        Err(FemError::InvalidInput(format!(
            "{} supports load control only",
            self.name()
        )))
    }

    /// Take one load-controlled step of `load_increment` and keep its length
    /// as the arc length of the following steps
    fn init_arc_length(
        &mut self,
        system: &mut System,
        load_increment: f64,
        alpha: f64,
    ) -> FemResult<StepOutcome> {
        let _ = (system, load_increment, alpha);
        Err(FemError::InvalidInput(format!(
            "{} supports load control only",
            self.name()
        )))
    }

    /// Advance by one arc length; requires `init_arc_length`
    fn step_arc_length(&mut self, system: &mut System) -> FemResult<StepOutcome> {
        let _ = system;
        Err(FemError::InvalidInput(format!(
            "{} supports load control only",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_validation() {
        assert!(SolverOptions::new(0.0, 10).is_err());
        assert!(SolverOptions::new(f64::NAN, 10).is_err());
        assert!(SolverOptions::new(1e-8, 0).is_err());

        let options = SolverOptions::new(1e-8, 10).unwrap().sparse().with_logging();
        assert!(options.sparse);
        assert!(options.log);
        assert_eq!(options.max_iterations, 10);
    }
}
