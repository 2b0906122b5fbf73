//! Uniaxial materials

use log::trace;
use serde::{Deserialize, Serialize};

use super::UniaxialMaterial;
use crate::error::{FemError, FemResult};

/// Linear elastic uniaxial material, σ = E ε
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticMaterial {
    /// Modulus of elasticity
    pub e: f64,
    #[serde(skip)]
    strain: f64,
}

impl ElasticMaterial {
    pub fn new(e: f64) -> Self {
        Self { e, strain: 0.0 }
    }
}

impl UniaxialMaterial for ElasticMaterial {
    fn set_strain(&mut self, strain: f64) {
        self.strain = strain;
    }

    fn strain(&self) -> f64 {
        self.strain
    }

    fn stress(&self) -> f64 {
        self.e * self.strain
    }

    fn stiffness(&self) -> f64 {
        self.e
    }

    fn reset(&mut self) {
        self.strain = 0.0;
    }

    fn clone_box(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}

/// History variables of the fiber plasticity model
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FiberState {
    /// Plastic strain
    pub plastic_strain: f64,
    /// Accumulated equivalent plastic strain (drives isotropic hardening)
    pub alpha: f64,
}

/// Rate-independent 1D plasticity with linear isotropic hardening
///
/// Stress update by return mapping: the trial stress `E (ε - εp)` is checked
/// against the yield surface `|σ| = fy + H α` and projected back when outside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiberMaterial {
    /// Modulus of elasticity
    pub e: f64,
    /// Initial yield stress
    pub fy: f64,
    /// Isotropic hardening modulus
    pub h: f64,
    committed: FiberState,
    trial: FiberState,
    strain: f64,
    stress: f64,
    tangent: f64,
}

impl FiberMaterial {
    /// Create a fiber material; `h = 0` gives elastic-perfectly plastic behavior
    pub fn new(e: f64, fy: f64, h: f64) -> FemResult<Self> {
        if e <= 0.0 || !e.is_finite() {
            return Err(FemError::InvalidMaterial(format!(
                "modulus of elasticity must be positive, got {}",
                e
            )));
        }
        if fy <= 0.0 {
            return Err(FemError::InvalidMaterial(format!(
                "yield stress must be positive, got {}",
                fy
            )));
        }
        if h < 0.0 {
            return Err(FemError::InvalidMaterial(format!(
                "hardening modulus must not be negative, got {}",
                h
            )));
        }
        Ok(Self {
            e,
            fy,
            h,
            committed: FiberState::default(),
            trial: FiberState::default(),
            strain: 0.0,
            stress: 0.0,
            tangent: e,
        })
    }

    /// Structural steel (S250), elastic-perfectly plastic, in Pa
    pub fn steel() -> Self {
        Self {
            e: 200e9,
            fy: 250e6,
            h: 0.0,
            committed: FiberState::default(),
            trial: FiberState::default(),
            strain: 0.0,
            stress: 0.0,
            tangent: 200e9,
        }
    }

    /// History variables of the current trial state
    pub fn state(&self) -> FiberState {
        self.trial
    }

    pub fn plastic_strain(&self) -> f64 {
        self.trial.plastic_strain
    }

    pub fn is_yielding(&self) -> bool {
        self.trial.alpha > self.committed.alpha
    }
}

impl UniaxialMaterial for FiberMaterial {
    fn set_strain(&mut self, strain: f64) {
        let base = self.committed;
        let sigma_trial = self.e * (strain - base.plastic_strain);
        let f = sigma_trial.abs() - (self.fy + self.h * base.alpha);

        self.strain = strain;
        if f > 0.0 {
            let sign = sigma_trial.signum();
            let dgamma = f / (self.e + self.h);
            self.trial = FiberState {
                plastic_strain: base.plastic_strain + sign * dgamma,
                alpha: base.alpha + dgamma,
            };
            self.stress = sigma_trial - self.e * sign * dgamma;
            self.tangent = self.e * self.h / (self.e + self.h);
            trace!("fiber yielding: strain={:.4e}, dgamma={:.4e}", strain, dgamma);
        } else {
            self.trial = base;
            self.stress = sigma_trial;
            self.tangent = self.e;
        }
    }

    fn strain(&self) -> f64 {
        self.strain
    }

    fn stress(&self) -> f64 {
        self.stress
    }

    fn stiffness(&self) -> f64 {
        self.tangent
    }

    fn commit(&mut self) {
        self.committed = self.trial;
    }

    fn revert(&mut self) {
        self.trial = self.committed;
        let strain = self.strain;
        self.set_strain(strain);
    }

    fn reset(&mut self) {
        self.committed = FiberState::default();
        self.trial = FiberState::default();
        self.strain = 0.0;
        self.stress = 0.0;
        self.tangent = self.e;
    }

    fn clone_box(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}
