//! Network parameter transformation functions
//!
//! Conversions between scattering (S) and impedance (Z) matrices for a
//! single frequency point, using a real, per-port reference impedance.

use ndarray::Array2;
use num_complex::Complex64;

use super::linalg::inv_complex;

/// Convert an S-matrix to a Z-matrix
///
/// Formula: Z = F * (I + S) * inv(I - S) * F
/// where F is diagonal matrix of sqrt(z0)
///
/// Returns None when I - S is singular (a lossless open circuit).
pub fn s2z(s: &Array2<Complex64>, z0: &[f64]) -> Option<Array2<Complex64>> {
    let nports = s.nrows();
    if nports != z0.len() {
        return None;
    }

    let identity = Array2::<Complex64>::eye(nports);
    let f_mat = sqrt_z0_diag(z0);

    let i_plus_s = &identity + s;
    let i_minus_s = &identity - s;

    let inv_i_minus_s = inv_complex(&i_minus_s)?;
    let term = i_plus_s.dot(&inv_i_minus_s);
    Some(f_mat.dot(&term).dot(&f_mat))
}

/// Convert a Z-matrix to an S-matrix
///
/// Formula: S = F^-1 * (Z - G) * inv(Z + G) * F
/// where G is diagonal z0 and F is diagonal sqrt(z0).
///
/// Returns None when Z + G is singular.
pub fn z2s(z: &Array2<Complex64>, z0: &[f64]) -> Option<Array2<Complex64>> {
    let nports = z.nrows();
    if nports != z0.len() {
        return None;
    }

    let f_mat = sqrt_z0_diag(z0);
    let mut inv_f_mat = Array2::<Complex64>::zeros((nports, nports));
    let mut z0_diag = Array2::<Complex64>::zeros((nports, nports));
    for i in 0..nports {
        inv_f_mat[[i, i]] = Complex64::new(1.0 / z0[i].sqrt(), 0.0);
        z0_diag[[i, i]] = Complex64::new(z0[i], 0.0);
    }

    let z_minus_z0 = z - &z0_diag;
    let z_plus_z0 = z + &z0_diag;

    let inv_term = inv_complex(&z_plus_z0)?;
    let term = z_minus_z0.dot(&inv_term);
    Some(inv_f_mat.dot(&term).dot(&f_mat))
}

fn sqrt_z0_diag(z0: &[f64]) -> Array2<Complex64> {
    let n = z0.len();
    let mut f_mat = Array2::<Complex64>::zeros((n, n));
    for (i, &z) in z0.iter().enumerate() {
        f_mat[[i, i]] = Complex64::new(z.sqrt(), 0.0);
    }
    f_mat
}
