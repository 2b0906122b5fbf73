//! Total Lagrangian kinematics shared by the plane elements

use nalgebra::{Matrix2, Matrix3x2, Vector2};

use crate::error::FemResult;
use crate::materials::PlaneMaterial;
use crate::math::{Mat, Vec3, Vector};

/// Deformation gradient `F = I + Σ u_a ⊗ ∇N_a` from reference shape
/// function gradients and node-major displacements `[ux, uy, ...]`
pub(super) fn deformation_gradient(gradients: &[Vector2<f64>], u: &Vector) -> Matrix2<f64> {
    let mut f = Matrix2::identity();
    for (a, ga) in gradients.iter().enumerate() {
        f += Vector2::new(u[2 * a], u[2 * a + 1]) * ga.transpose();
    }
    f
}

/// Green-Lagrange strain `[E11, E22, 2 E12]`
pub(super) fn green_strain(f: &Matrix2<f64>) -> Vec3 {
    let c = f.transpose() * f;
    Vec3::new((c[(0, 0)] - 1.0) / 2.0, (c[(1, 1)] - 1.0) / 2.0, c[(0, 1)])
}

/// Evaluate the material at one integration point and add its internal
/// force and tangent, weighted by `volume`, to the element arrays
pub(super) fn integrate_point(
    gradients: &[Vector2<f64>],
    u: &Vector,
    material: &mut dyn PlaneMaterial,
    volume: f64,
    force: &mut Vector,
    stiffness: &mut Mat,
) -> FemResult<()> {
    let f = deformation_gradient(gradients, u);
    material.set_strain(&green_strain(&f))?;
    let s = material.stress();
    let d = material.stiffness();

    // δE = B_a δu_a
    let b: Vec<Matrix3x2<f64>> = gradients
        .iter()
        .map(|ga| {
            Matrix3x2::new(
                f[(0, 0)] * ga[0],
                f[(1, 0)] * ga[0],
                f[(0, 1)] * ga[1],
                f[(1, 1)] * ga[1],
                f[(0, 0)] * ga[1] + f[(0, 1)] * ga[0],
                f[(1, 0)] * ga[1] + f[(1, 1)] * ga[0],
            )
        })
        .collect();
    let s_mat = Matrix2::new(s[0], s[2], s[2], s[1]);

    for (a, ba) in b.iter().enumerate() {
        let fa = ba.transpose() * s * volume;
        force[2 * a] += fa[0];
        force[2 * a + 1] += fa[1];
        for (c, bc) in b.iter().enumerate() {
            let geometric = (gradients[a].transpose() * s_mat * gradients[c])[(0, 0)];
            let kac = (ba.transpose() * d * bc + Matrix2::identity() * geometric) * volume;
            for i in 0..2 {
                for j in 0..2 {
                    stiffness[(2 * a + i, 2 * c + j)] += kac[(i, j)];
                }
            }
        }
    }
    Ok(())
}

/// Von Mises equivalent stress of `[S11, S22, S12]` with normal stress
/// `szz` through the thickness
pub(super) fn von_mises(s: &Vec3, szz: f64) -> f64 {
    let (sxx, syy, sxy) = (s[0], s[1], s[2]);
    (0.5 * ((sxx - syy).powi(2) + (syy - szz).powi(2) + (szz - sxx).powi(2)) + 3.0 * sxy * sxy).sqrt()
}
