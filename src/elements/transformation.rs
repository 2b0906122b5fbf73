//! Nodal coordinate transformations
//!
//! A transformation attached to a node rotates the frame in which that node's
//! displacements, loads and fixities are expressed. Typical uses are inclined
//! rollers and skewed supports.

use serde::{Deserialize, Serialize};

use super::node::DofCode;
use crate::error::{FemError, FemResult};
use crate::math::{Mat, Mat3, Vec3, Vector};

/// Rotation from the global frame into a node-local frame
///
/// Rows of the rotation matrix are the local basis vectors expressed in global
/// coordinates, so `v_local = R * v_global`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    rotation: Mat3,
}

impl Transformation {
    pub fn identity() -> Self {
        Self {
            rotation: Mat3::identity(),
        }
    }

    /// In-plane rotation: local x axis at `angle` (radians, counter-clockwise) from global x
    pub fn rotation_2d(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            rotation: Mat3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0),
        }
    }

    /// Build a local frame from two direction vectors
    ///
    /// `d1` defines the local x axis. The local y axis is the part of `d2`
    /// orthogonal to `d1`; the local z axis completes a right-handed basis.
    pub fn from_directions(d1: [f64; 3], d2: [f64; 3]) -> FemResult<Self> {
        let d1 = Vec3::from(d1);
        let d2 = Vec3::from(d2);

        let n1 = d1.norm();
        if n1 < 1e-12 {
            return Err(FemError::InvalidGeometry(
                "local x direction has zero length".to_string(),
            ));
        }
        let e1 = d1 / n1;
        let v2 = d2 - e1 * d2.dot(&e1);
        let n2 = v2.norm();
        if n2 < 1e-12 * d2.norm().max(1.0) {
            return Err(FemError::InvalidGeometry(
                "local y direction is parallel to local x direction".to_string(),
            ));
        }
        let e2 = v2 / n2;
        let e3 = e1.cross(&e2);

        Ok(Self {
            rotation: Mat3::from_rows(&[e1.transpose(), e2.transpose(), e3.transpose()]),
        })
    }

    /// 3x3 rotation matrix (rows are the local axes)
    pub fn rotation(&self) -> &Mat3 {
        &self.rotation
    }

    /// Rotation restricted to an ordered list of DOF codes
    ///
    /// Translations couple only with translations and rotations only with
    /// rotations. The restricted matrix must remain orthogonal, which fails
    /// when the node is missing a component the rotation mixes in (e.g. a
    /// rotated 2D frame at a node carrying `uy` but not `ux`).
    pub fn matrix(&self, codes: &[DofCode]) -> FemResult<Mat> {
        let n = codes.len();
        let t = Mat::from_fn(n, n, |i, j| {
            let (a, b) = (codes[i], codes[j]);
            if a.is_translation() == b.is_translation() {
                self.rotation[(a.axis(), b.axis())]
            } else {
                0.0
            }
        });

        let defect = (&t * t.transpose() - Mat::identity(n, n)).amax();
        if defect > 1e-10 {
            return Err(FemError::InvalidGeometry(format!(
                "nodal transformation is not closed over the DOFs {:?}",
                codes
            )));
        }
        Ok(t)
    }

    /// Express a global vector in the local frame
    pub fn to_local(&self, codes: &[DofCode], global: &Vector) -> FemResult<Vector> {
        Ok(self.matrix(codes)? * global)
    }

    /// Express a local vector in the global frame
    pub fn to_global(&self, codes: &[DofCode], local: &Vector) -> FemResult<Vector> {
        Ok(self.matrix(codes)?.transpose() * local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn test_rotation_2d_round_trip() {
        let t = Transformation::rotation_2d(FRAC_PI_4);
        let codes = [DofCode::Ux, DofCode::Uy, DofCode::Rz];
        let global = Vector::from_vec(vec![1.0, 0.0, 0.25]);

        let local = t.to_local(&codes, &global).unwrap();
        let c = FRAC_PI_4.cos();
        assert_relative_eq!(local[0], c, epsilon = 1e-14);
        assert_relative_eq!(local[1], -c, epsilon = 1e-14);
        // rotation about the z axis leaves rz alone
        assert_relative_eq!(local[2], 0.25, epsilon = 1e-14);

        let back = t.to_global(&codes, &local).unwrap();
        assert_relative_eq!(back, global, epsilon = 1e-14);
    }

    #[test]
    fn test_from_directions_orthonormal() {
        let t = Transformation::from_directions([1.0, 1.0, 0.0], [0.0, 1.0, 0.0]).unwrap();
        let r = t.rotation();
        assert_relative_eq!(r * r.transpose(), Mat3::identity(), epsilon = 1e-14);
        assert_relative_eq!(r[(2, 2)], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_parallel_directions_rejected() {
        assert!(Transformation::from_directions([1.0, 0.0, 0.0], [2.0, 0.0, 0.0]).is_err());
        assert!(Transformation::from_directions([0.0, 0.0, 0.0], [0.0, 1.0, 0.0]).is_err());
    }

    #[test]
    fn test_incomplete_dof_group_rejected() {
        let t = Transformation::rotation_2d(0.3);
        assert!(t.matrix(&[DofCode::Uy, DofCode::Rz]).is_err());
        assert!(Transformation::identity().matrix(&[DofCode::Uy, DofCode::Rz]).is_ok());
    }
}
