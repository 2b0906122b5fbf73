//! Sparse matrix utilities for efficient FEA solves
//!
//! Tangent matrices of larger structures are mostly zeros. Assembling into
//! coordinate storage and factorizing a skyline profile keeps both memory and
//! work proportional to the bandwidth instead of the full matrix.

use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::error::{FemError, FemResult};

/// Sparse matrix builder using COO format
/// More efficient for incremental assembly
#[derive(Debug, Clone)]
pub struct SparseMatrixBuilder {
    size: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl SparseMatrixBuilder {
    /// Create a new sparse matrix builder
    pub fn new(size: usize) -> Self {
        // Estimate: 3 DOFs per node, ~6 neighbours per node
        let estimated_nnz = size * 20;
        Self {
            size,
            entries: Vec::with_capacity(estimated_nnz),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Add a value to the matrix (accumulates if already exists); exact
    /// zeros are not stored
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.entries.push((row, col, value));
        }
    }

    /// Scatter an element matrix using a location vector
    ///
    /// Entries mapped to `None` (restrained degrees of freedom) are skipped.
    pub fn add_element_matrix(&mut self, location: &[Option<usize>], k_elem: &DMatrix<f64>) {
        for (i, di) in location.iter().enumerate() {
            let Some(di) = *di else { continue };
            for (j, dj) in location.iter().enumerate() {
                if let Some(dj) = *dj {
                    self.add(di, dj, k_elem[(i, j)]);
                }
            }
        }
    }

    /// Convert to CSR format for efficient solves
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.size, self.size);

        for &(row, col, val) in &self.entries {
            coo.push(row, col, val);
        }

        CsrMatrix::from(&coo)
    }

    /// Convert to dense matrix (for comparison/debugging)
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut mat = DMatrix::zeros(self.size, self.size);

        for &(row, col, val) in &self.entries {
            mat[(row, col)] += val;
        }

        mat
    }

    /// Number of stored (unmerged) entries
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Get sparsity ratio
    pub fn sparsity(&self) -> f64 {
        let total = self.size * self.size;
        if total == 0 {
            return 0.0;
        }
        1.0 - (self.entries.len() as f64 / total as f64)
    }
}

/// Sparse Cholesky solver for symmetric positive definite matrices
///
/// Uses skyline (profile) storage of the lower triangle. Suited to tangent
/// matrices of stable structures, which are symmetric positive definite and
/// banded when degrees of freedom are numbered node by node.
#[derive(Debug, Clone)]
pub struct SparseCholeskySolver {
    size: usize,
    // For each row, values from the first non-zero column up to the diagonal
    skyline: Vec<Vec<f64>>,
    // Distance from the diagonal to the first non-zero in each row
    heights: Vec<usize>,
}

impl SparseCholeskySolver {
    /// Create solver from CSR matrix
    pub fn new(csr: &CsrMatrix<f64>) -> FemResult<Self> {
        if csr.nrows() != csr.ncols() {
            return Err(FemError::DimensionMismatch {
                expected: csr.nrows(),
                actual: csr.ncols(),
            });
        }
        let size = csr.nrows();

        // Compute row heights (skyline profile)
        let mut heights = vec![0usize; size];
        for (row, col, _val) in csr.triplet_iter() {
            if col < row {
                heights[row] = heights[row].max(row - col);
            }
        }

        let mut skyline: Vec<Vec<f64>> = heights.iter().map(|&h| vec![0.0; h + 1]).collect();

        // Copy lower triangle into skyline storage
        for (row, col, &val) in csr.triplet_iter() {
            if col <= row {
                let idx = col - (row - heights[row]);
                skyline[row][idx] += val;
            }
        }

        Ok(Self {
            size,
            skyline,
            heights,
        })
    }

    /// Factorize the matrix in place (Cholesky on the skyline profile)
    pub fn factorize(&mut self) -> FemResult<()> {
        let max_diag = self
            .skyline
            .iter()
            .zip(&self.heights)
            .map(|(row, &h)| row[h].abs())
            .fold(0.0, f64::max);

        for i in 0..self.size {
            let hi = self.heights[i];
            let start_i = i - hi;

            // Compute L[i,j] for j < i
            for j in start_i..i {
                let hj = self.heights[j];
                let start_j = j - hj;

                let start = start_i.max(start_j);
                let mut sum = 0.0;
                for k in start..j {
                    sum += self.get(i, k) * self.get(j, k);
                }

                let diag_j = self.skyline[j][hj];
                let idx = j - start_i;
                self.skyline[i][idx] = (self.skyline[i][idx] - sum) / diag_j;
            }

            // Compute L[i,i] (diagonal)
            let mut sum = 0.0;
            for j in start_i..i {
                let val = self.get(i, j);
                sum += val * val;
            }

            let diag = self.skyline[i][hi] - sum;
            if diag.abs() <= 1e-12 * max_diag {
                return Err(FemError::SingularMatrix);
            }
            if diag < 0.0 {
                return Err(FemError::NotPositiveDefinite);
            }
            self.skyline[i][hi] = diag.sqrt();
        }

        Ok(())
    }

    /// Lower-triangle lookup (row >= col)
    #[inline]
    fn get(&self, row: usize, col: usize) -> f64 {
        let start = row - self.heights[row];
        if col < start {
            return 0.0;
        }
        self.skyline[row][col - start]
    }

    /// Solve L * L^T * x = b
    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        let mut x = b.clone();

        // Forward substitution: L * y = b
        for i in 0..self.size {
            let start = i - self.heights[i];

            let mut sum = 0.0;
            for j in start..i {
                sum += self.get(i, j) * x[j];
            }

            x[i] = (x[i] - sum) / self.get(i, i);
        }

        // Backward substitution: L^T * x = y
        for i in (0..self.size).rev() {
            x[i] /= self.get(i, i);

            let start = i - self.heights[i];
            for j in start..i {
                x[j] -= self.get(i, j) * x[i];
            }
        }

        x
    }
}

/// Factorize and solve a symmetric positive definite system in one call
pub fn solve_sparse_spd(builder: &SparseMatrixBuilder, b: &DVector<f64>) -> FemResult<DVector<f64>> {
    if builder.size() != b.len() {
        return Err(FemError::DimensionMismatch {
            expected: builder.size(),
            actual: b.len(),
        });
    }
    debug!(
        "sparse solve: {} equations, {} entries, sparsity {:.3}",
        builder.size(),
        builder.nnz(),
        builder.sparsity()
    );
    let mut solver = SparseCholeskySolver::new(&builder.to_csr())?;
    solver.factorize()?;
    Ok(solver.solve(b))
}
