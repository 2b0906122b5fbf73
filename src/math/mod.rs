//! Mathematical utilities for finite element calculations

pub mod sparse;

use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, Matrix6, Vector2, Vector3, Vector6};

use crate::error::{FemError, FemResult};

pub use sparse::{SparseCholeskySolver, SparseMatrixBuilder};

pub type Mat = DMatrix<f64>;
pub type Vector = DVector<f64>;
pub type Mat2 = Matrix2<f64>;
pub type Vec2 = Vector2<f64>;
pub type Mat3 = Matrix3<f64>;
pub type Vec3 = Vector3<f64>;
/// Voigt-notation tangent (xx, yy, zz, xy, yz, zx)
pub type Mat6 = Matrix6<f64>;
/// Voigt-notation vector (xx, yy, zz, xy, yz, zx)
pub type Vec6 = Vector6<f64>;

/// Relative pivot size below which a factorization is treated as singular
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve a linear system using LU decomposition
///
/// Returns `FemError::SingularMatrix` when a pivot vanishes relative to the
/// largest pivot, which is how a mechanism or missing support shows up.
pub fn solve_linear_system(a: &Mat, b: &Vector) -> FemResult<Vector> {
    if a.nrows() != b.len() || !a.is_square() {
        return Err(FemError::DimensionMismatch {
            expected: a.nrows(),
            actual: b.len(),
        });
    }
    if a.nrows() == 0 {
        return Ok(Vector::zeros(0));
    }

    let lu = a.clone().lu();
    let pivots = lu.u().diagonal();
    let largest = pivots.amax();
    let smallest = pivots.iter().fold(f64::INFINITY, |m, p| m.min(p.abs()));
    if !largest.is_finite() || largest == 0.0 || smallest <= PIVOT_TOLERANCE * largest {
        return Err(FemError::SingularMatrix);
    }

    lu.solve(b).ok_or(FemError::SingularMatrix)
}

/// Gauss-Legendre points and weights mapped onto the unit interval [0, 1]
///
/// Returns `(xi, weight)` pairs; the weights sum to one.
pub fn gauss_legendre(n: usize) -> FemResult<Vec<(f64, f64)>> {
    let points: &[(f64, f64)] = match n {
        1 => &[(0.0, 2.0)],
        2 => &[(-0.577_350_269_189_625_8, 1.0), (0.577_350_269_189_625_8, 1.0)],
        3 => &[
            (-0.774_596_669_241_483_4, 5.0 / 9.0),
            (0.0, 8.0 / 9.0),
            (0.774_596_669_241_483_4, 5.0 / 9.0),
        ],
        4 => &[
            (-0.861_136_311_594_052_6, 0.347_854_845_137_453_8),
            (-0.339_981_043_584_856_3, 0.652_145_154_862_546_1),
            (0.339_981_043_584_856_3, 0.652_145_154_862_546_1),
            (0.861_136_311_594_052_6, 0.347_854_845_137_453_8),
        ],
        5 => &[
            (-0.906_179_845_938_664, 0.236_926_885_056_189_1),
            (-0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
            (0.0, 0.568_888_888_888_888_9),
            (0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
            (0.906_179_845_938_664, 0.236_926_885_056_189_1),
        ],
        _ => {
            return Err(FemError::InvalidInput(format!(
                "Gauss-Legendre rule with {} points is not available (1..=5)",
                n
            )))
        }
    };

    Ok(points
        .iter()
        .map(|&(x, w)| ((1.0 + x) / 2.0, w / 2.0))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_linear_system() {
        let a = Mat::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = Vector::from_vec(vec![1.0, 2.0]);
        let x = solve_linear_system(&a, &b).unwrap();
        assert_relative_eq!((&a * &x - &b).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_system_is_reported() {
        let a = Mat::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
        let b = Vector::from_vec(vec![1.0, 0.0]);
        assert_eq!(solve_linear_system(&a, &b), Err(FemError::SingularMatrix));
    }

    #[test]
    fn test_gauss_legendre_integrates_polynomials() {
        for n in 1..=5 {
            let rule = gauss_legendre(n).unwrap();
            let total: f64 = rule.iter().map(|(_, w)| w).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-14);

            // exact for degree 2n - 1
            let degree = 2 * n - 1;
            let integral: f64 = rule.iter().map(|(x, w)| w * x.powi(degree as i32)).sum();
            assert_relative_eq!(integral, 1.0 / (degree as f64 + 1.0), epsilon = 1e-13);
        }
        assert!(gauss_legendre(0).is_err());
        assert!(gauss_legendre(6).is_err());
    }
}
