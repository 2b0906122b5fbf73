//! Plane stress and plane strain projections of 3D materials

use log::warn;

use super::{ContinuumMaterial, ElasticIsotropic, PlaneMaterial};
use crate::error::{FemError, FemResult};
use crate::math::{Mat3, Mat6, Vec3, Vec6};

/// Voigt indices of the in-plane components (xx, yy, xy)
const IN_PLANE: [usize; 3] = [0, 1, 3];
/// Voigt indices of the out-of-plane components (zz, yz, zx)
const OUT_OF_PLANE: [usize; 3] = [2, 4, 5];

const MAX_PROJECTION_ITERATIONS: usize = 25;

fn embed(in_plane: &Vec3, out_of_plane: &Vec3) -> Vec6 {
    let mut full = Vec6::zeros();
    for k in 0..3 {
        full[IN_PLANE[k]] = in_plane[k];
        full[OUT_OF_PLANE[k]] = out_of_plane[k];
    }
    full
}

fn pick(v: &Vec6, idx: &[usize; 3]) -> Vec3 {
    Vec3::new(v[idx[0]], v[idx[1]], v[idx[2]])
}

fn block(c: &Mat6, rows: &[usize; 3], cols: &[usize; 3]) -> Mat3 {
    Mat3::from_fn(|i, j| c[(rows[i], cols[j])])
}

/// Plane strain: out-of-plane strains are zero
#[derive(Debug, Clone)]
pub struct PlaneStrain<M: ContinuumMaterial + Clone> {
    material: M,
    thickness: f64,
}

impl<M: ContinuumMaterial + Clone> PlaneStrain<M> {
    pub fn new(material: M, thickness: f64) -> FemResult<Self> {
        if thickness <= 0.0 {
            return Err(FemError::InvalidMaterial(format!(
                "thickness must be positive, got {}",
                thickness
            )));
        }
        Ok(Self {
            material,
            thickness,
        })
    }

    /// Full 3D stress state, including the out-of-plane normal stress
    pub fn stress_3d(&self) -> Vec6 {
        self.material.stress()
    }

    pub fn material(&self) -> &M {
        &self.material
    }
}

impl PlaneStrain<ElasticIsotropic> {
    pub fn elastic(e: f64, nu: f64, thickness: f64) -> FemResult<Self> {
        Self::new(ElasticIsotropic::new(e, nu)?, thickness)
    }
}

impl<M: ContinuumMaterial + Clone + 'static> PlaneMaterial for PlaneStrain<M> {
    fn set_strain(&mut self, strain: &Vec3) -> FemResult<()> {
        self.material.set_strain(&embed(strain, &Vec3::zeros()))
    }

    fn strain(&self) -> Vec3 {
        pick(&self.material.strain(), &IN_PLANE)
    }

    fn stress(&self) -> Vec3 {
        pick(&self.material.stress(), &IN_PLANE)
    }

    fn stiffness(&self) -> Mat3 {
        block(&self.material.stiffness(), &IN_PLANE, &IN_PLANE)
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }

    fn out_of_plane_stress(&self) -> f64 {
        self.material.stress()[2]
    }

    fn commit(&mut self) {
        self.material.commit();
    }

    fn revert(&mut self) {
        self.material.revert();
    }

    fn reset(&mut self) {
        self.material.reset();
    }

    fn clone_box(&self) -> Box<dyn PlaneMaterial> {
        Box::new(self.clone())
    }
}

/// Plane stress: out-of-plane strains are iterated until the
/// out-of-plane stresses vanish
///
/// The in-plane tangent is the static condensation
/// `C_aa - C_ab C_bb^-1 C_ba` of the 3D tangent.
#[derive(Debug, Clone)]
pub struct PlaneStress<M: ContinuumMaterial + Clone> {
    material: M,
    thickness: f64,
    strain: Vec3,
    out_of_plane: Vec3,
    committed_out_of_plane: Vec3,
    tangent: Mat3,
    initial_tangent: Mat3,
}

impl<M: ContinuumMaterial + Clone> PlaneStress<M> {
    pub fn new(material: M, thickness: f64) -> FemResult<Self> {
        if thickness <= 0.0 {
            return Err(FemError::InvalidMaterial(format!(
                "thickness must be positive, got {}",
                thickness
            )));
        }
        let c = material.stiffness();
        let tangent = condense(&c)?;
        Ok(Self {
            material,
            thickness,
            strain: Vec3::zeros(),
            out_of_plane: Vec3::zeros(),
            committed_out_of_plane: Vec3::zeros(),
            tangent,
            initial_tangent: tangent,
        })
    }

    /// Out-of-plane strains (zz, yz, zx) that satisfy the plane stress condition
    pub fn out_of_plane_strain(&self) -> Vec3 {
        self.out_of_plane
    }

    pub fn material(&self) -> &M {
        &self.material
    }
}

impl PlaneStress<ElasticIsotropic> {
    pub fn elastic(e: f64, nu: f64, thickness: f64) -> FemResult<Self> {
        Self::new(ElasticIsotropic::new(e, nu)?, thickness)
    }
}

fn condense(c: &Mat6) -> FemResult<Mat3> {
    let c_aa = block(c, &IN_PLANE, &IN_PLANE);
    let c_ab = block(c, &IN_PLANE, &OUT_OF_PLANE);
    let c_ba = block(c, &OUT_OF_PLANE, &IN_PLANE);
    let c_bb_inv = block(c, &OUT_OF_PLANE, &OUT_OF_PLANE)
        .try_inverse()
        .ok_or(FemError::SingularMatrix)?;
    Ok(c_aa - c_ab * c_bb_inv * c_ba)
}

impl<M: ContinuumMaterial + Clone + 'static> PlaneMaterial for PlaneStress<M> {
    fn set_strain(&mut self, strain: &Vec3) -> FemResult<()> {
        self.strain = *strain;
        let mut eps_b = self.out_of_plane;

        for iteration in 0..MAX_PROJECTION_ITERATIONS {
            self.material.set_strain(&embed(strain, &eps_b))?;
            let sigma = self.material.stress();
            let c = self.material.stiffness();

            let sigma_b = pick(&sigma, &OUT_OF_PLANE);
            let scale = sigma.amax().max(1e-8 * c.amax());
            if sigma_b.amax() <= 1e-12 * scale {
                self.out_of_plane = eps_b;
                self.tangent = condense(&c)?;
                return Ok(());
            }

            let c_bb = block(&c, &OUT_OF_PLANE, &OUT_OF_PLANE);
            let correction = c_bb
                .lu()
                .solve(&sigma_b)
                .ok_or(FemError::SingularMatrix)?;
            eps_b -= correction;

            if iteration + 1 == MAX_PROJECTION_ITERATIONS {
                warn!(
                    "plane stress projection stalled at |sigma_b| = {:.3e}",
                    sigma_b.amax()
                );
            }
        }

        Err(FemError::AnalysisFailed(
            "plane stress projection did not converge".to_string(),
        ))
    }

    fn strain(&self) -> Vec3 {
        self.strain
    }

    fn stress(&self) -> Vec3 {
        pick(&self.material.stress(), &IN_PLANE)
    }

    fn stiffness(&self) -> Mat3 {
        self.tangent
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }

    fn commit(&mut self) {
        self.material.commit();
        self.committed_out_of_plane = self.out_of_plane;
    }

    fn revert(&mut self) {
        self.material.revert();
        self.out_of_plane = self.committed_out_of_plane;
    }

    fn reset(&mut self) {
        self.material.reset();
        self.strain = Vec3::zeros();
        self.out_of_plane = Vec3::zeros();
        self.committed_out_of_plane = Vec3::zeros();
        self.tangent = self.initial_tangent;
    }

    fn clone_box(&self) -> Box<dyn PlaneMaterial> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::VonMises;
    use approx::assert_relative_eq;

    fn fd_tangent(mat: &dyn PlaneMaterial, strain: &Vec3) -> Mat3 {
        let h = 1e-7;
        let mut perturbed = mat.clone_box();
        let mut k = Mat3::zeros();
        for j in 0..3 {
            let mut plus = *strain;
            plus[j] += h;
            let mut minus = *strain;
            minus[j] -= h;
            perturbed.set_strain(&plus).unwrap();
            let sp = perturbed.stress();
            perturbed.set_strain(&minus).unwrap();
            let sm = perturbed.stress();
            k.set_column(j, &((sp - sm) / (2.0 * h)));
        }
        k
    }

    #[test]
    fn test_elastic_plane_stress_matches_closed_form() {
        let (e, nu) = (1000.0, 0.3);
        let mut mat = PlaneStress::elastic(e, nu, 0.1).unwrap();
        mat.set_strain(&Vec3::new(0.001, 0.0005, 0.0002)).unwrap();

        let f = e / (1.0 - nu * nu);
        let expected = Mat3::new(f, f * nu, 0.0, f * nu, f, 0.0, 0.0, 0.0, f * (1.0 - nu) / 2.0);
        assert_relative_eq!(mat.stiffness(), expected, epsilon = 1e-9);
        assert_relative_eq!(
            mat.stress(),
            expected * Vec3::new(0.001, 0.0005, 0.0002),
            epsilon = 1e-9
        );
        // thickness change from Poisson contraction
        assert_relative_eq!(
            mat.out_of_plane_strain()[0],
            -nu / (1.0 - nu) * 0.0015,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_elastic_plane_strain_matches_closed_form() {
        let (e, nu) = (1000.0, 0.25);
        let mut mat = PlaneStrain::elastic(e, nu, 1.0).unwrap();
        mat.set_strain(&Vec3::new(0.001, 0.0, 0.0)).unwrap();
        let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
        let g = e / (2.0 * (1.0 + nu));
        assert_relative_eq!(mat.stress()[0], (lambda + 2.0 * g) * 0.001, epsilon = 1e-12);
        assert_relative_eq!(mat.stress_3d()[2], lambda * 0.001, epsilon = 1e-12);
        assert_eq!(mat.out_of_plane_stress(), mat.stress_3d()[2]);
    }

    #[test]
    fn test_plastic_plane_stress_tangent() {
        let vm = VonMises::new(200.0, 0.3, 1.0).unwrap().with_hardening(20.0, 0.0).unwrap();
        let mut mat = PlaneStress::new(vm, 1.0).unwrap();
        let strain = Vec3::new(0.015, -0.004, 0.006);
        mat.set_strain(&strain).unwrap();

        let sigma_zz = mat.material().stress()[2];
        assert!(sigma_zz.abs() < 1e-9, "sigma_zz = {}", sigma_zz);

        let fd = fd_tangent(&mat, &strain);
        assert_relative_eq!(mat.stiffness(), fd, epsilon = 1e-4, max_relative = 1e-4);
    }

    #[test]
    fn test_thickness_must_be_positive() {
        assert!(PlaneStress::elastic(1.0, 0.3, 0.0).is_err());
        assert!(PlaneStrain::elastic(1.0, 0.3, -1.0).is_err());
    }
}
