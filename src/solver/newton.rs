//! Newton-Raphson iteration under load, displacement or arc-length control

use log::{debug, info, warn};

use super::{PathControl, Solver, SolverOptions, SolverState};
use crate::elements::DofCode;
use crate::error::{FemError, FemResult};
use crate::math::Vector;
use crate::results::{StepOutcome, StepStatus};
use crate::system::{Assembly, NodeId, System, TangentFormat};

/// Converged state one step before the last one
#[derive(Debug, Clone)]
struct Converged {
    disp: Vector,
    load_factor: f64,
}

/// Constraint equation `g(u, λ) = 0` bordering the tangent
#[derive(Debug, Clone)]
enum Constraint {
    /// `g = target - u[equation]`
    Displacement { equation: usize, target: f64 },
    /// `g = ds² - Δu·Δu - alpha ‖P‖² Δλ²`, increments from `start`
    ArcLength {
        alpha: f64,
        length2: f64,
        start: Vector,
        start_lambda: f64,
    },
}

impl Constraint {
    fn violation(&self, u: &Vector, lam: f64, reference: &Vector) -> f64 {
        match self {
            Constraint::Displacement { equation, target } => target - u[*equation],
            Constraint::ArcLength {
                alpha,
                length2,
                start,
                start_lambda,
            } => {
                let du = u - start;
                let dlam = lam - start_lambda;
                length2 - du.norm_squared() - alpha * dlam * dlam * reference.norm_squared()
            }
        }
    }

    /// Load factor correction that satisfies the linearized constraint for
    /// `du = du_r + dλ du_p`
    fn load_correction(
        &self,
        g: f64,
        u: &Vector,
        lam: f64,
        reference: &Vector,
        du_r: &Vector,
        du_p: &Vector,
    ) -> FemResult<f64> {
        let (numerator, denominator) = match self {
            Constraint::Displacement { equation, .. } => (g - du_r[*equation], du_p[*equation]),
            Constraint::ArcLength {
                alpha,
                start,
                start_lambda,
                ..
            } => {
                let du = u - start;
                let dlam = lam - start_lambda;
                (
                    g - 2.0 * du.dot(du_r),
                    2.0 * du.dot(du_p) + 2.0 * alpha * dlam * reference.norm_squared(),
                )
            }
        };
        if denominator == 0.0 || !denominator.is_finite() {
            return Err(FemError::SingularMatrix);
        }
        Ok(numerator / denominator)
    }
}

/// Full Newton-Raphson solver with the consistent tangent
///
/// Each step starts from the last converged state and iterates until the
/// residual norm drops below the tolerance. A step that exhausts the
/// iteration limit is reverted and reported as `StepStatus::Failed`.
///
/// Under displacement or arc-length control the load factor is an extra
/// unknown. Each iteration solves the tangent for the residual and for the
/// reference load and picks the load factor correction from the linearized
/// constraint; convergence is checked on `sqrt(‖R‖² + g²)`. Tracing past a
/// limit point makes the tangent indefinite, which the sparse Cholesky
/// option rejects.
#[derive(Debug, Clone)]
pub struct NewtonRaphsonSolver {
    options: SolverOptions,
    load_factor: f64,
    state: SolverState,
    control: PathControl,
    previous: Option<Converged>,
}

impl NewtonRaphsonSolver {
    pub fn new(options: SolverOptions) -> Self {
        Self {
            options,
            load_factor: 1.0,
            state: SolverState::Idle,
            control: PathControl::Load,
            previous: None,
        }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    fn format(&self) -> TangentFormat {
        if self.options.sparse {
            TangentFormat::Sparse
        } else {
            TangentFormat::Dense
        }
    }

    fn correct(&mut self, system: &mut System, assembly: &Assembly) -> FemResult<()> {
        self.state = SolverState::Iterating;
        let du = assembly.tangent.solve(&assembly.residual)?;
        system.apply_correction(&assembly.map, &du)
    }

    /// Bordered correction; returns the load factor increment
    fn correct_constrained(
        &mut self,
        system: &mut System,
        assembly: &Assembly,
        constraint: &Constraint,
        g: f64,
    ) -> FemResult<f64> {
        self.state = SolverState::Iterating;
        let du_r = assembly.tangent.solve(&assembly.residual)?;
        let du_p = assembly.tangent.solve(&assembly.reference)?;
        let u = system.free_disp(&assembly.map);
        let dlam = constraint.load_correction(
            g,
            &u,
            assembly.load_factor,
            &assembly.reference,
            &du_r,
            &du_p,
        )?;
        system.apply_correction(&assembly.map, &(du_r + du_p * dlam))?;
        Ok(dlam)
    }

    fn fail<T>(&mut self, system: &mut System, err: FemError) -> FemResult<T> {
        self.state = SolverState::Failed;
        system.revert_state();
        Err(err)
    }

    /// Assemble at the target load factor and apply one correction
    ///
    /// Returns the residual norm before the correction. Nothing is committed;
    /// `solve` decides when the step has converged.
    pub fn solve_single_step(&mut self, system: &mut System) -> FemResult<f64> {
        self.state = SolverState::Assembling;
        let assembly = system.assemble_with(self.load_factor, self.format())?;
        let norm = assembly.residual_norm();
        self.correct(system, &assembly)?;
        Ok(norm)
    }

    /// Newton iteration from the current state starting at `self.load_factor`
    fn iterate(&mut self, system: &mut System, constraint: Option<&Constraint>) -> FemResult<StepOutcome> {
        let tolerance = self.options.tolerance;
        let max_iterations = self.options.max_iterations;
        let mut lam = self.load_factor;
        let mut norm = f64::INFINITY;
        let mut iterations = 0;

        for iteration in 0..=max_iterations {
            iterations = iteration;
            self.state = SolverState::Assembling;
            let assembly = match system.assemble_with(lam, self.format()) {
                Ok(assembly) => assembly,
                Err(err) => return self.fail(system, err),
            };
            let g = match constraint {
                Some(c) => c.violation(&system.free_disp(&assembly.map), lam, &assembly.reference),
                None => 0.0,
            };
            norm = (assembly.residual.norm_squared() + g * g).sqrt();
            if self.options.log {
                info!("  iteration {}: lambda = {}, |R| = {:.6e}", iteration, lam, norm);
            } else {
                debug!("iteration {}: lambda = {}, |R| = {:.6e}", iteration, lam, norm);
            }

            if norm < tolerance {
                system.commit_state(lam);
                self.load_factor = lam;
                self.state = SolverState::Converged;
                info!(
                    "step {} converged at lambda = {} after {} iterations",
                    system.step(),
                    lam,
                    iteration
                );
                return Ok(StepOutcome {
                    load_factor: lam,
                    iterations: iteration,
                    residual_norm: norm,
                    status: StepStatus::Converged,
                });
            }
            if !norm.is_finite() {
                warn!("residual is not finite at lambda = {}", lam);
                break;
            }
            if iteration == max_iterations {
                break;
            }

            let corrected = match constraint {
                Some(c) => self
                    .correct_constrained(system, &assembly, c, g)
                    .map(|dlam| lam += dlam),
                None => self.correct(system, &assembly),
            };
            if let Err(err) = corrected {
                return self.fail(system, err);
            }
        }

        warn!(
            "no convergence at lambda = {} after {} iterations, |R| = {:.6e}",
            lam, iterations, norm
        );
        self.state = SolverState::Failed;
        system.revert_state();
        Ok(StepOutcome {
            load_factor: lam,
            iterations,
            residual_norm: norm,
            status: StepStatus::Failed,
        })
    }

    /// Free equation of a displacement-controlled DOF
    fn control_equation(system: &System, node: NodeId, code: DofCode) -> FemResult<usize> {
        let index = system
            .node(node)?
            .index_of(code)
            .ok_or(FemError::UnknownDof(code))?;
        system
            .dof_map()
            .free_equation(node, index)
            .ok_or(FemError::FixedDof(code))
    }
}

impl Solver for NewtonRaphsonSolver {
    fn name(&self) -> &'static str {
        "NewtonRaphsonSolver"
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Also returns the solver to load control
    fn set_load_factor(&mut self, load_factor: f64) {
        self.load_factor = load_factor;
        self.control = PathControl::Load;
    }

    fn solve(&mut self, system: &mut System) -> FemResult<StepOutcome> {
        match self.control.clone() {
            PathControl::Load => self.iterate(system, None),
            PathControl::Displacement { node, code, target } => {
                let equation = Self::control_equation(system, node, code)?;
                self.load_factor = system.load_factor();
                self.iterate(system, Some(&Constraint::Displacement { equation, target }))
            }
            PathControl::ArcLength { .. } => self.step_arc_length(system),
        }
    }

    fn control(&self) -> PathControl {
        self.control.clone()
    }

    fn set_displacement_control(&mut self, node: NodeId, code: DofCode, target: f64) -> FemResult<()> {
        if !target.is_finite() {
            return Err(FemError::InvalidInput(format!(
                "target displacement must be finite, got {}",
                target
            )));
        }
        self.control = PathControl::Displacement { node, code, target };
        Ok(())
    }

    fn init_arc_length(
        &mut self,
        system: &mut System,
        load_increment: f64,
        alpha: f64,
    ) -> FemResult<StepOutcome> {
        if load_increment == 0.0 || !load_increment.is_finite() {
            return Err(FemError::InvalidInput(format!(
                "load increment must be finite and non-zero, got {}",
                load_increment
            )));
        }
        if !(alpha >= 0.0) || !alpha.is_finite() {
            return Err(FemError::InvalidInput(format!(
                "alpha must be non-negative, got {}",
                alpha
            )));
        }

        let map = system.dof_map();
        let start = system.free_disp(&map);
        let start_lambda = system.load_factor();

        self.control = PathControl::Load;
        self.load_factor = start_lambda + load_increment;
        let outcome = self.iterate(system, None)?;
        if !outcome.is_converged() {
            return Ok(outcome);
        }

        let reference = system.assemble_with(self.load_factor, TangentFormat::None)?.reference;
        let du = system.free_disp(&map) - &start;
        let length2 = du.norm_squared() + alpha * load_increment * load_increment * reference.norm_squared();
        if length2 == 0.0 {
            return Err(FemError::InvalidInput(
                "the load increment produced no displacement".to_string(),
            ));
        }

        self.control = PathControl::ArcLength {
            alpha,
            length: length2.sqrt(),
        };
        self.previous = Some(Converged {
            disp: start,
            load_factor: start_lambda,
        });
        info!("{}", self.control);
        Ok(outcome)
    }

    fn step_arc_length(&mut self, system: &mut System) -> FemResult<StepOutcome> {
        let (PathControl::ArcLength { alpha, length }, Some(previous)) =
            (self.control.clone(), self.previous.clone())
        else {
            return Err(FemError::InvalidInput(
                "arc-length control is not initialized".to_string(),
            ));
        };

        let map = system.dof_map();
        let start = system.free_disp(&map);
        if start.len() != previous.disp.len() {
            return Err(FemError::DimensionMismatch {
                expected: previous.disp.len(),
                actual: start.len(),
            });
        }
        let start_lambda = system.load_factor();

        // extrapolate along the last converged increment
        if let Err(err) = system.apply_correction(&map, &(&start - &previous.disp)) {
            return self.fail(system, err);
        }
        self.load_factor = 2.0 * start_lambda - previous.load_factor;

        let constraint = Constraint::ArcLength {
            alpha,
            length2: length * length,
            start: start.clone(),
            start_lambda,
        };
        let outcome = self.iterate(system, Some(&constraint))?;
        if outcome.is_converged() {
            self.previous = Some(Converged {
                disp: start,
                load_factor: start_lambda,
            });
        } else {
            self.load_factor = start_lambda;
        }
        Ok(outcome)
    }
}
