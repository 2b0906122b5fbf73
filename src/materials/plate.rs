//! Layered plate section (through-thickness integration)

use super::PlaneMaterial;
use crate::error::{FemError, FemResult};
use crate::math::{gauss_legendre, Mat3, Mat6, Vec3, Vec6};

/// Integration point through the thickness
#[derive(Debug, Clone)]
struct Ply {
    z: f64,
    weight: f64,
    material: Box<dyn PlaneMaterial>,
}

/// Layered plate section
///
/// Generalized strain is `[ε0; κ]` (membrane strain and curvature, xx, yy, xy)
/// and the resultants are `[N; M]`. With `ε(z) = ε0 + z κ` each layer is
/// integrated with two Gauss points, which is exact for elastic layers. The
/// tangent is the ABD matrix `[[A, B], [B, D]]`.
#[derive(Debug, Clone)]
pub struct PlateSection {
    plies: Vec<Ply>,
    thickness: f64,
    strain: Vec6,
}

impl PlateSection {
    pub fn new() -> Self {
        Self {
            plies: Vec::new(),
            thickness: 0.0,
            strain: Vec6::zeros(),
        }
    }

    /// Homogeneous plate of total thickness `t` split into `layers` plies
    pub fn layered(material: &dyn PlaneMaterial, t: f64, layers: usize) -> FemResult<Self> {
        if t <= 0.0 || layers == 0 {
            return Err(FemError::InvalidMaterial(format!(
                "invalid plate layout (t={}, layers={})",
                t, layers
            )));
        }
        let dz = t / layers as f64;
        let mut section = Self::new();
        for i in 0..layers {
            let bottom = -t / 2.0 + i as f64 * dz;
            section.add_layer(bottom, bottom + dz, material)?;
        }
        Ok(section)
    }

    /// Add a layer between heights `z_bottom` and `z_top` measured from the mid-surface
    pub fn add_layer(&mut self, z_bottom: f64, z_top: f64, material: &dyn PlaneMaterial) -> FemResult<()> {
        let t = z_top - z_bottom;
        if t <= 0.0 {
            return Err(FemError::InvalidMaterial(format!(
                "layer top {} must lie above bottom {}",
                z_top, z_bottom
            )));
        }
        for (xi, w) in gauss_legendre(2)? {
            self.plies.push(Ply {
                z: z_bottom + xi * t,
                weight: w * t,
                material: material.clone_box(),
            });
        }
        self.thickness += t;
        Ok(())
    }

    /// Total thickness
    pub fn total_thickness(&self) -> f64 {
        self.thickness
    }

    /// Set membrane strain and curvature
    pub fn set_generalized_strain(&mut self, strain: &Vec6) -> FemResult<()> {
        if self.plies.is_empty() {
            return Err(FemError::InvalidMaterial("plate section has no layers".to_string()));
        }
        self.strain = *strain;
        let membrane = strain.fixed_rows::<3>(0).into_owned();
        let curvature = strain.fixed_rows::<3>(3).into_owned();
        for ply in &mut self.plies {
            ply.material.set_strain(&(membrane + curvature * ply.z))?;
        }
        Ok(())
    }

    pub fn generalized_strain(&self) -> Vec6 {
        self.strain
    }

    /// Stress resultants `[N; M]`
    pub fn resultants(&self) -> Vec6 {
        let mut r = Vec6::zeros();
        for ply in &self.plies {
            let s = ply.material.stress() * ply.weight;
            for k in 0..3 {
                r[k] += s[k];
                r[k + 3] += s[k] * ply.z;
            }
        }
        r
    }

    /// ABD tangent
    pub fn abd(&self) -> Mat6 {
        let mut k = Mat6::zeros();
        for ply in &self.plies {
            let c = ply.material.stiffness() * ply.weight;
            let z = ply.z;
            for i in 0..3 {
                for j in 0..3 {
                    k[(i, j)] += c[(i, j)];
                    k[(i, j + 3)] += c[(i, j)] * z;
                    k[(i + 3, j)] += c[(i, j)] * z;
                    k[(i + 3, j + 3)] += c[(i, j)] * z * z;
                }
            }
        }
        k
    }

    fn commit_plies(&mut self) {
        for ply in &mut self.plies {
            ply.material.commit();
        }
    }

    fn revert_plies(&mut self) {
        for ply in &mut self.plies {
            ply.material.revert();
        }
    }
}

impl Default for PlateSection {
    fn default() -> Self {
        Self::new()
    }
}

/// Membrane view of the plate: curvature is held at zero and stresses are
/// thickness averages, so a layered section can drive plane elements.
impl PlaneMaterial for PlateSection {
    fn set_strain(&mut self, strain: &Vec3) -> FemResult<()> {
        let mut generalized = Vec6::zeros();
        generalized.fixed_rows_mut::<3>(0).copy_from(strain);
        self.set_generalized_strain(&generalized)
    }

    fn strain(&self) -> Vec3 {
        self.strain.fixed_rows::<3>(0).into_owned()
    }

    fn stress(&self) -> Vec3 {
        self.resultants().fixed_rows::<3>(0).into_owned() / self.thickness
    }

    fn stiffness(&self) -> Mat3 {
        self.abd().fixed_view::<3, 3>(0, 0).into_owned() / self.thickness
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }

    fn commit(&mut self) {
        self.commit_plies();
    }

    fn revert(&mut self) {
        self.revert_plies();
    }

    fn reset(&mut self) {
        for ply in &mut self.plies {
            ply.material.reset();
        }
        self.strain = Vec6::zeros();
    }

    fn clone_box(&self) -> Box<dyn PlaneMaterial> {
        Box::new(self.clone())
    }
}
