//! Linear algebra operations
//!
//! This module provides a unified interface for the dense matrix operations
//! the fitting engine needs. nalgebra is the backend; all ndarray<->nalgebra
//! conversions are contained here so callers only ever see ndarray types.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use num_complex::Complex64;

/// Result of least squares solve
#[derive(Debug, Clone)]
pub struct LstsqResult {
    pub solution: Vec<f64>,
    pub singular_values: Vec<f64>,
    /// Effective condition number over the singular values kept by the solve
    pub condition: f64,
    /// Number of singular values dropped as numerically zero
    pub rank_deficiency: usize,
}

/// Result of a least squares solve with several right-hand sides
#[derive(Debug, Clone)]
pub struct LstsqMultiResult {
    /// Solution matrix [n_unknowns, n_rhs]
    pub solution: Array2<f64>,
    pub condition: f64,
    pub rank_deficiency: usize,
}

// ============================================================================
// Conversion helpers (internal)
// ============================================================================

#[inline]
fn to_na_complex(a: &Array2<Complex64>) -> DMatrix<Complex64> {
    let (m, n) = a.dim();
    DMatrix::from_fn(m, n, |i, j| a[[i, j]])
}

#[inline]
fn from_na_complex(m: &DMatrix<Complex64>) -> Array2<Complex64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

#[inline]
fn to_na_real(a: &Array2<f64>) -> DMatrix<f64> {
    let (m, n) = a.dim();
    DMatrix::from_fn(m, n, |i, j| a[[i, j]])
}

#[inline]
fn from_na_real(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Rank tolerance used by every SVD-based solve: eps * max(m, n) * sigma_max
#[inline]
fn rank_tolerance(m: usize, n: usize, sigma_max: f64) -> f64 {
    f64::EPSILON * m.max(n) as f64 * sigma_max
}

/// Effective condition number and rank deficiency for a set of singular values
fn effective_condition(singular_values: &[f64], tol: f64) -> (f64, usize) {
    let sigma_max = singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let kept: Vec<f64> = singular_values
        .iter()
        .cloned()
        .filter(|&s| s > tol)
        .collect();
    let rank_deficiency = singular_values.len() - kept.len();
    let sigma_min = kept.iter().cloned().fold(f64::INFINITY, f64::min);
    let condition = if kept.is_empty() {
        f64::INFINITY
    } else {
        sigma_max / sigma_min
    };
    (condition, rank_deficiency)
}

// ============================================================================
// Matrix inversion
// ============================================================================

/// Invert a complex matrix
///
/// Returns None if matrix is singular or non-square.
pub fn inv_complex(a: &Array2<Complex64>) -> Option<Array2<Complex64>> {
    let (m, n) = a.dim();
    if m != n || m == 0 {
        return None;
    }

    to_na_complex(a).try_inverse().map(|inv| from_na_complex(&inv))
}

// ============================================================================
// Eigenvalue decomposition
// ============================================================================

/// Compute complex eigenvalues of a real matrix
///
/// Returns error if matrix is not square.
pub fn eigenvalues(a: &Array2<f64>) -> Result<Vec<Complex64>, &'static str> {
    let (m, n) = a.dim();
    if m != n {
        return Err("Matrix must be square");
    }
    if m == 0 {
        return Ok(Vec::new());
    }

    let eigs = to_na_real(a).complex_eigenvalues();
    Ok(eigs.iter().map(|e| Complex64::new(e.re, e.im)).collect())
}

/// Eigen-decomposition of a Hermitian matrix
///
/// Returns (eigenvalues, eigenvectors as columns). Only the Hermitian part
/// of `a` is used.
pub fn hermitian_eigen(a: &Array2<Complex64>) -> Result<(Vec<f64>, Array2<Complex64>), &'static str> {
    let (m, n) = a.dim();
    if m != n {
        return Err("Matrix must be square");
    }
    if m == 0 {
        return Err("Empty matrix");
    }

    let mat = to_na_complex(a);
    let herm = (&mat + mat.adjoint()) * Complex64::new(0.5, 0.0);
    let eig = herm.symmetric_eigen();

    Ok((
        eig.eigenvalues.iter().cloned().collect(),
        from_na_complex(&eig.eigenvectors),
    ))
}

// ============================================================================
// Singular Value Decomposition
// ============================================================================

/// Compute singular values of a complex matrix
pub fn singular_values(a: &Array2<Complex64>) -> Vec<f64> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Vec::new();
    }

    let svd = to_na_complex(a).svd(false, false);
    svd.singular_values.iter().cloned().collect()
}

/// Full SVD of complex matrix: (U, S, Vh)
pub fn svd_complex(
    a: &Array2<Complex64>,
) -> Result<(Array2<Complex64>, Vec<f64>, Array2<Complex64>), &'static str> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err("Empty matrix");
    }

    let svd = to_na_complex(a).svd(true, true);

    let u = svd.u.ok_or("SVD failed: no U matrix")?;
    let vh = svd.v_t.ok_or("SVD failed: no Vh matrix")?;
    let sigma: Vec<f64> = svd.singular_values.iter().cloned().collect();

    Ok((from_na_complex(&u), sigma, from_na_complex(&vh)))
}

/// Full SVD of real matrix: (U, S, Vh)
pub fn svd_real(a: &Array2<f64>) -> Result<(Array2<f64>, Vec<f64>, Array2<f64>), &'static str> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err("Empty matrix");
    }

    let svd = to_na_real(a).svd(true, true);

    let u = svd.u.ok_or("SVD failed: no U matrix")?;
    let vh = svd.v_t.ok_or("SVD failed: no Vh matrix")?;
    let sigma: Vec<f64> = svd.singular_values.iter().cloned().collect();

    Ok((from_na_real(&u), sigma, from_na_real(&vh)))
}

// ============================================================================
// QR Decomposition
// ============================================================================

/// QR decomposition, returns R matrix only (upper triangular, min(m, n) x n)
pub fn qr_r(a: &Array2<f64>) -> Array2<f64> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Array2::zeros((0, n));
    }

    let r = to_na_real(a).qr().r();

    let k = m.min(n);
    Array2::from_shape_fn((k, n), |(i, j)| r[(i, j)])
}

// ============================================================================
// Least Squares
// ============================================================================

/// Solve least squares problem Ax = b using SVD
///
/// Singular values below `eps * max(m, n) * sigma_max` are treated as zero,
/// giving the minimum-norm solution for rank-deficient systems.
pub fn lstsq(a: &Array2<f64>, b: &Array1<f64>) -> Result<LstsqResult, &'static str> {
    lstsq_rcond(a, b, 0.0)
}

/// Least squares with an explicit relative cutoff
///
/// Singular values below `max(eps * max(m, n), rcond) * sigma_max` are
/// treated as zero.
pub fn lstsq_rcond(
    a: &Array2<f64>,
    b: &Array1<f64>,
    rcond: f64,
) -> Result<LstsqResult, &'static str> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err("Empty matrix");
    }
    if b.len() != m {
        return Err("Dimension mismatch");
    }

    let b_na = DVector::from_fn(m, |i, _| b[i]);
    let svd = to_na_real(a).svd(true, true);

    let singular_values: Vec<f64> = svd.singular_values.iter().cloned().collect();
    let sigma_max = singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let tol = rank_tolerance(m, n, sigma_max).max(rcond * sigma_max);

    let solution = svd.solve(&b_na, tol).map_err(|_| "SVD solve failed")?;
    let (condition, rank_deficiency) = effective_condition(&singular_values, tol);

    Ok(LstsqResult {
        solution: solution.iter().cloned().collect(),
        singular_values,
        condition,
        rank_deficiency,
    })
}

/// Solve least squares problem AX = B for several right-hand sides at once
///
/// The SVD of A is computed once and shared by every column of B.
pub fn lstsq_multi(a: &Array2<f64>, b: &Array2<f64>) -> Result<LstsqMultiResult, &'static str> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err("Empty matrix");
    }
    if b.nrows() != m {
        return Err("Dimension mismatch");
    }

    let b_na = to_na_real(b);
    let svd = to_na_real(a).svd(true, true);

    let singular_values: Vec<f64> = svd.singular_values.iter().cloned().collect();
    let sigma_max = singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let tol = rank_tolerance(m, n, sigma_max);

    let solution = svd.solve(&b_na, tol).map_err(|_| "SVD solve failed")?;
    let (condition, rank_deficiency) = effective_condition(&singular_values, tol);

    Ok(LstsqMultiResult {
        solution: from_na_real(&solution),
        condition,
        rank_deficiency,
    })
}
