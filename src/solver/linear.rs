//! Single-step linear solver

use log::{debug, info};

use super::{Solver, SolverState};
use crate::error::{FemError, FemResult};
use crate::math::solve_linear_system;
use crate::results::{StepOutcome, StepStatus};
use crate::system::{System, TangentFormat};

/// Solves `K Δu = R` once per step and commits the result
///
/// Exact for linear problems. For nonlinear elements or materials this is a
/// single Newton correction from the last converged state.
#[derive(Debug, Clone)]
pub struct LinearSolver {
    sparse: bool,
    load_factor: f64,
    state: SolverState,
}

impl LinearSolver {
    pub fn new() -> Self {
        Self {
            sparse: false,
            load_factor: 1.0,
            state: SolverState::Idle,
        }
    }

    /// Factorize with the sparse Cholesky solver
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    fn fail<T>(&mut self, system: &mut System, err: FemError) -> FemResult<T> {
        self.state = SolverState::Failed;
        system.revert_state();
        Err(err)
    }

    /// Solve over all DOFs with boundary conditions imposed by replacing the
    /// rows and columns of restrained DOFs with identity rows
    ///
    /// Produces the same step as `solve` and is kept to cross-check the
    /// condensed assembly.
    #[deprecated(note = "use `Solver::solve`, which assembles over the free DOFs only")]
    pub fn original_solve(&mut self, system: &mut System) -> FemResult<StepOutcome> {
        let lam = self.load_factor;
        self.state = SolverState::Assembling;
        let (mut k, mut r, map) = match system.assemble_full(lam) {
            Ok(full) => full,
            Err(err) => return self.fail(system, err),
        };

        for eq in map.free_count()..map.total() {
            k.row_mut(eq).fill(0.0);
            k.column_mut(eq).fill(0.0);
            k[(eq, eq)] = 1.0;
            r[eq] = 0.0;
        }

        self.state = SolverState::Iterating;
        let du = match solve_linear_system(&k, &r) {
            Ok(du) => du,
            Err(err) => return self.fail(system, err),
        };
        if let Err(err) = system.apply_correction(&map, &du) {
            return self.fail(system, err);
        }

        self.finish(system, 1)
    }

    fn finish(&mut self, system: &mut System, iterations: usize) -> FemResult<StepOutcome> {
        let lam = self.load_factor;
        let residual_norm = match system.assemble(lam, true) {
            Ok(assembly) => assembly.residual_norm(),
            Err(err) => return self.fail(system, err),
        };
        system.commit_state(lam);
        self.state = SolverState::Converged;
        info!("linear step at lambda = {} done, |R| = {:.6e}", lam, residual_norm);

        Ok(StepOutcome {
            load_factor: lam,
            iterations,
            residual_norm,
            status: StepStatus::Converged,
        })
    }
}

impl Default for LinearSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for LinearSolver {
    fn name(&self) -> &'static str {
        "LinearSolver"
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn load_factor(&self) -> f64 {
        self.load_factor
    }

    fn set_load_factor(&mut self, load_factor: f64) {
        self.load_factor = load_factor;
    }

    fn solve(&mut self, system: &mut System) -> FemResult<StepOutcome> {
        let lam = self.load_factor;
        self.state = SolverState::Assembling;
        let format = if self.sparse {
            TangentFormat::Sparse
        } else {
            TangentFormat::Dense
        };
        let assembly = match system.assemble_with(lam, format) {
            Ok(assembly) => assembly,
            Err(err) => return self.fail(system, err),
        };
        debug!(
            "linear step: {} equations, |R| = {:.6e}",
            assembly.map.free_count(),
            assembly.residual_norm()
        );

        self.state = SolverState::Iterating;
        let du = match assembly.tangent.solve(&assembly.residual) {
            Ok(du) => du,
            Err(err) => return self.fail(system, err),
        };
        if let Err(err) = system.apply_correction(&assembly.map, &du) {
            return self.fail(system, err);
        }

        self.finish(system, 1)
    }
}
