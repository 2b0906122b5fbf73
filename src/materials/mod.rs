//! Constitutive models and cross-section integration
//!
//! Every material keeps a trial state, updated eagerly by `set_strain`, and a
//! committed state from the last converged load step. `stress()` and
//! `stiffness()` always describe the trial state. `commit()` makes the trial
//! history permanent and `revert()` throws it away.

mod continuum;
mod plane;
mod plate;
mod section;
mod uniaxial;

pub use continuum::{ElasticIsotropic, VonMises};
pub use plane::{PlaneStrain, PlaneStress};
pub use plate::PlateSection;
pub use section::{ElasticSection, FiberSection};
pub use uniaxial::{ElasticMaterial, FiberMaterial};

use std::fmt::Debug;

use crate::error::FemResult;
use crate::math::{Mat2, Mat3, Mat6, Vec2, Vec3, Vec6};

/// One-dimensional stress-strain law (truss bars, section fibers)
pub trait UniaxialMaterial: Debug {
    fn set_strain(&mut self, strain: f64);
    fn strain(&self) -> f64;
    fn stress(&self) -> f64;
    /// Tangent modulus dσ/dε
    fn stiffness(&self) -> f64;
    fn commit(&mut self) {}
    fn revert(&mut self) {}
    /// Return to the virgin state, discarding all history
    fn reset(&mut self);
    fn clone_box(&self) -> Box<dyn UniaxialMaterial>;
}

/// Three-dimensional material in Voigt notation
///
/// Order is (xx, yy, zz, xy, yz, zx); shear strains are engineering strains.
pub trait ContinuumMaterial: Debug {
    fn set_strain(&mut self, strain: &Vec6) -> FemResult<()>;
    fn strain(&self) -> Vec6;
    fn stress(&self) -> Vec6;
    fn stiffness(&self) -> Mat6;
    fn commit(&mut self) {}
    fn revert(&mut self) {}
    /// Return to the virgin state, discarding all history
    fn reset(&mut self);
    fn clone_box(&self) -> Box<dyn ContinuumMaterial>;
}

/// In-plane material (xx, yy, xy) with an out-of-plane thickness
pub trait PlaneMaterial: Debug {
    fn set_strain(&mut self, strain: &Vec3) -> FemResult<()>;
    fn strain(&self) -> Vec3;
    fn stress(&self) -> Vec3;
    fn stiffness(&self) -> Mat3;
    fn thickness(&self) -> f64;
    /// Normal stress through the thickness, zero under plane stress
    fn out_of_plane_stress(&self) -> f64 {
        0.0
    }
    fn commit(&mut self) {}
    fn revert(&mut self) {}
    /// Return to the virgin state, discarding all history
    fn reset(&mut self);
    fn clone_box(&self) -> Box<dyn PlaneMaterial>;
}

/// Beam cross-section: generalized strain (ε, κ) to resultants (N, M)
pub trait SectionMaterial: Debug {
    fn set_strain(&mut self, strain: &Vec2) -> FemResult<()>;
    fn strain(&self) -> Vec2;
    fn stress(&self) -> Vec2;
    fn stiffness(&self) -> Mat2;
    fn commit(&mut self) {}
    fn revert(&mut self) {}
    /// Return to the virgin state, discarding all history
    fn reset(&mut self);
    fn clone_box(&self) -> Box<dyn SectionMaterial>;
}

impl Clone for Box<dyn UniaxialMaterial> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn ContinuumMaterial> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn PlaneMaterial> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn SectionMaterial> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
