//! Three-dimensional continuum materials

use log::trace;
use serde::{Deserialize, Serialize};

use super::ContinuumMaterial;
use crate::error::{FemError, FemResult};
use crate::math::{Mat6, Vec6};

fn check_elastic(e: f64, nu: f64) -> FemResult<()> {
    if e <= 0.0 || !e.is_finite() {
        return Err(FemError::InvalidMaterial(format!(
            "modulus of elasticity must be positive, got {}",
            e
        )));
    }
    if !(-1.0 < nu && nu < 0.5) {
        return Err(FemError::InvalidMaterial(format!(
            "Poisson's ratio must lie in (-1, 0.5), got {}",
            nu
        )));
    }
    Ok(())
}

/// Isotropic elasticity tensor for engineering shear strains
fn elastic_tensor(e: f64, nu: f64) -> Mat6 {
    let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
    let g = e / (2.0 * (1.0 + nu));
    let mut c = Mat6::zeros();
    for i in 0..3 {
        for j in 0..3 {
            c[(i, j)] = lambda;
        }
        c[(i, i)] = lambda + 2.0 * g;
        c[(i + 3, i + 3)] = g;
    }
    c
}

/// Linear elastic isotropic solid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticIsotropic {
    /// Modulus of elasticity
    pub e: f64,
    /// Poisson's ratio
    pub nu: f64,
    c: Mat6,
    strain: Vec6,
}

impl ElasticIsotropic {
    pub fn new(e: f64, nu: f64) -> FemResult<Self> {
        check_elastic(e, nu)?;
        Ok(Self {
            e,
            nu,
            c: elastic_tensor(e, nu),
            strain: Vec6::zeros(),
        })
    }

    /// Shear modulus
    pub fn g(&self) -> f64 {
        self.e / (2.0 * (1.0 + self.nu))
    }
}

impl ContinuumMaterial for ElasticIsotropic {
    fn set_strain(&mut self, strain: &Vec6) -> FemResult<()> {
        self.strain = *strain;
        Ok(())
    }

    fn strain(&self) -> Vec6 {
        self.strain
    }

    fn stress(&self) -> Vec6 {
        self.c * self.strain
    }

    fn stiffness(&self) -> Mat6 {
        self.c
    }

    fn reset(&mut self) {
        self.strain = Vec6::zeros();
    }

    fn clone_box(&self) -> Box<dyn ContinuumMaterial> {
        Box::new(self.clone())
    }
}

/// History variables of the J2 plasticity model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct J2State {
    /// Plastic strain (engineering shear components)
    pub plastic_strain: Vec6,
    /// Equivalent plastic strain
    pub alpha: f64,
    /// Back stress (deviatoric, stress-like Voigt components)
    pub back_stress: Vec6,
}

impl Default for J2State {
    fn default() -> Self {
        Self {
            plastic_strain: Vec6::zeros(),
            alpha: 0.0,
            back_stress: Vec6::zeros(),
        }
    }
}

/// Von Mises (J2) plasticity with linear isotropic and kinematic hardening
///
/// Radial return mapping with the consistent algorithmic tangent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VonMises {
    /// Modulus of elasticity
    pub e: f64,
    /// Poisson's ratio
    pub nu: f64,
    /// Uniaxial yield stress
    pub fy: f64,
    /// Isotropic hardening modulus
    pub k: f64,
    /// Kinematic hardening modulus
    pub h: f64,
    c: Mat6,
    committed: J2State,
    trial: J2State,
    strain: Vec6,
    stress: Vec6,
    tangent: Mat6,
}

/// Deviatoric part of a stress-like Voigt vector
fn deviator(s: &Vec6) -> Vec6 {
    let mean = (s[0] + s[1] + s[2]) / 3.0;
    Vec6::new(s[0] - mean, s[1] - mean, s[2] - mean, s[3], s[4], s[5])
}

/// Tensor norm of a stress-like Voigt vector
fn tensor_norm(s: &Vec6) -> f64 {
    (s[0] * s[0] + s[1] * s[1] + s[2] * s[2] + 2.0 * (s[3] * s[3] + s[4] * s[4] + s[5] * s[5])).sqrt()
}

impl VonMises {
    pub fn new(e: f64, nu: f64, fy: f64) -> FemResult<Self> {
        check_elastic(e, nu)?;
        if fy <= 0.0 {
            return Err(FemError::InvalidMaterial(format!(
                "yield stress must be positive, got {}",
                fy
            )));
        }
        let c = elastic_tensor(e, nu);
        Ok(Self {
            e,
            nu,
            fy,
            k: 0.0,
            h: 0.0,
            c,
            committed: J2State::default(),
            trial: J2State::default(),
            strain: Vec6::zeros(),
            stress: Vec6::zeros(),
            tangent: c,
        })
    }

    /// Set isotropic (`k`) and kinematic (`h`) hardening moduli
    pub fn with_hardening(mut self, k: f64, h: f64) -> FemResult<Self> {
        if k < 0.0 || h < 0.0 {
            return Err(FemError::InvalidMaterial(
                "hardening moduli must not be negative".to_string(),
            ));
        }
        self.k = k;
        self.h = h;
        Ok(self)
    }

    pub fn state(&self) -> J2State {
        self.trial
    }

    fn shear_modulus(&self) -> f64 {
        self.e / (2.0 * (1.0 + self.nu))
    }

    fn bulk_modulus(&self) -> f64 {
        self.e / (3.0 * (1.0 - 2.0 * self.nu))
    }
}

impl ContinuumMaterial for VonMises {
    fn set_strain(&mut self, strain: &Vec6) -> FemResult<()> {
        let base = self.committed;
        let g = self.shear_modulus();
        let kappa = self.bulk_modulus();
        let sqrt23 = (2.0_f64 / 3.0).sqrt();

        let sigma_trial = self.c * (strain - base.plastic_strain);
        let xi = deviator(&sigma_trial) - base.back_stress;
        let norm_xi = tensor_norm(&xi);
        let f = norm_xi - sqrt23 * (self.fy + self.k * base.alpha);

        self.strain = *strain;
        if f <= 0.0 {
            self.trial = base;
            self.stress = sigma_trial;
            self.tangent = self.c;
            return Ok(());
        }

        let n = xi / norm_xi;
        let dgamma = f / (2.0 * g + 2.0 / 3.0 * (self.k + self.h));

        let mut n_strain = n;
        for i in 3..6 {
            n_strain[i] *= 2.0;
        }

        self.trial = J2State {
            plastic_strain: base.plastic_strain + n_strain * dgamma,
            alpha: base.alpha + sqrt23 * dgamma,
            back_stress: base.back_stress + n * (2.0 / 3.0 * self.h * dgamma),
        };
        self.stress = sigma_trial - n * (2.0 * g * dgamma);

        let theta = 1.0 - 2.0 * g * dgamma / norm_xi;
        let theta_bar = 1.0 / (1.0 + (self.k + self.h) / (3.0 * g)) - (1.0 - theta);

        // deviatoric projector acting on engineering strains
        let mut p_dev = Mat6::zeros();
        for i in 0..3 {
            for j in 0..3 {
                p_dev[(i, j)] = if i == j { 2.0 / 3.0 } else { -1.0 / 3.0 };
            }
            p_dev[(i + 3, i + 3)] = 0.5;
        }
        let mut one_one = Mat6::zeros();
        for i in 0..3 {
            for j in 0..3 {
                one_one[(i, j)] = 1.0;
            }
        }

        self.tangent = one_one * kappa + p_dev * (2.0 * g * theta)
            - (n * n.transpose()) * (2.0 * g * theta_bar);

        trace!("von Mises return: dgamma={:.4e}, alpha={:.4e}", dgamma, self.trial.alpha);
        Ok(())
    }

    fn strain(&self) -> Vec6 {
        self.strain
    }

    fn stress(&self) -> Vec6 {
        self.stress
    }

    fn stiffness(&self) -> Mat6 {
        self.tangent
    }

    fn commit(&mut self) {
        self.committed = self.trial;
    }

    fn revert(&mut self) {
        self.trial = self.committed;
        let strain = self.strain;
        // re-evaluating from the committed state cannot fail
        let _ = self.set_strain(&strain);
    }

    fn reset(&mut self) {
        self.committed = J2State::default();
        self.trial = J2State::default();
        self.strain = Vec6::zeros();
        self.stress = Vec6::zeros();
        self.tangent = self.c;
    }

    fn clone_box(&self) -> Box<dyn ContinuumMaterial> {
        Box::new(self.clone())
    }
}
