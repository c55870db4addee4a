//! Core algorithms for Vector Fitting
//!
//! Implements the real-valued pole basis, pole relocation (relaxed sigma
//! function, QR compression, eigenvalue extraction) and residue fitting
//! (least squares at fixed poles).
//!
//! All routines work in normalized frequency units.

use ndarray::{s, Array1, Array2, Array3};
use num_complex::Complex64;
use std::f64::consts::PI;

use super::constants::{NORM_TOLERANCE, RELOCATION_RCOND, RESIDUE_TOLERANCE};
use super::poles::{self, model_order, Pole};
use crate::math::linalg;

/// Result of pole relocation iteration
#[derive(Debug)]
pub struct PoleRelocationResult {
    pub poles: Vec<Pole>,
    pub d_res: f64,
    pub condition: f64,
    pub rank_deficiency: usize,
    pub singular_vals: Vec<f64>,
}

/// Result of the residue fit at fixed poles
#[derive(Debug)]
pub struct ResidueFit {
    /// Residues [n_poles, n_responses]; real poles carry zero imaginary part
    pub residues: Array2<Complex64>,
    /// Constant terms [n_responses]
    pub constant: Option<Array1<f64>>,
    /// Proportional terms [n_responses]
    pub proportional: Option<Array1<f64>>,
    pub condition: f64,
}

/// Numerical failure inside a least-squares step
#[derive(Debug, Clone, PartialEq)]
pub struct SolveFailure {
    pub condition: f64,
    pub reason: String,
}

/// Complex Laplace variable `s = j*2*pi*f` for each frequency
pub fn laplace(freqs: &[f64]) -> Vec<Complex64> {
    freqs
        .iter()
        .map(|f| Complex64::new(0.0, 2.0 * PI * f))
        .collect()
}

/// Real-valued partial-fraction basis [n_freqs, model_order]
///
/// A real pole contributes `1/(s-p)`; a pair contributes
/// `1/(s-p) + 1/(s-p*)` and `j/(s-p) - j/(s-p*)`, so that coefficients
/// `(c1, c2)` give the residue `c1 + j*c2`.
pub fn basis(poles: &[Pole], s: &[Complex64]) -> Array2<Complex64> {
    let order = model_order(poles);
    let mut phi = Array2::<Complex64>::zeros((s.len(), order));
    let one = Complex64::new(1.0, 0.0);

    for (f, &s_f) in s.iter().enumerate() {
        let mut col = 0;
        for pole in poles {
            let p = pole.value();
            if pole.is_real() {
                phi[[f, col]] = one / (s_f - p);
                col += 1;
            } else {
                let term1 = one / (s_f - p);
                let term2 = one / (s_f - p.conj());
                phi[[f, col]] = term1 + term2;
                phi[[f, col + 1]] = Complex64::i() * (term1 - term2);
                col += 2;
            }
        }
    }
    phi
}

/// Pole relocation algorithm
///
/// Solves the relaxed sigma-function problem: for every response the model
/// columns are eliminated by a QR factorization, the remaining sigma block is
/// stacked across responses together with the relaxation constraint
/// `Re(sum_f sigma(s_f)) = n_freqs`, and the new poles are the eigenvalues of
/// `A - b * c^T / d`.
///
/// The solve is truncated at `sigma_max / max_condition`, so spare poles give
/// a minimum-norm solution rather than a failure; only non-finite results are
/// rejected.
#[allow(clippy::too_many_arguments)]
pub fn pole_relocation(
    poles: &[Pole],
    freqs: &[f64],
    freq_responses: &Array2<Complex64>,
    weights: &[f64],
    fit_constant: bool,
    fit_proportional: bool,
    max_condition: f64,
    imag_axis_tolerance: f64,
) -> Result<PoleRelocationResult, SolveFailure> {
    let n_responses = freq_responses.nrows();
    let n_freqs = freq_responses.ncols();
    let order = model_order(poles);

    if n_freqs == 0 || order == 0 {
        return Err(failure(f64::NAN, "empty relocation input"));
    }

    let s = laplace(freqs);
    let phi = basis(poles, &s);

    let n_model = order + usize::from(fit_constant) + usize::from(fit_proportional);
    let n_sigma = order + 1;
    let n_cols = n_model + n_sigma;

    // R22 blocks of every response, stacked
    let mut blocks: Vec<Array2<f64>> = Vec::with_capacity(n_responses);

    for resp_idx in 0..n_responses {
        let w = weights[resp_idx];
        let mut a = Array2::<Complex64>::zeros((n_freqs, n_cols));

        for f in 0..n_freqs {
            let h = freq_responses[[resp_idx, f]];
            let mut col = 0;
            for k in 0..order {
                a[[f, col]] = phi[[f, k]] * w;
                col += 1;
            }
            if fit_constant {
                a[[f, col]] = Complex64::new(w, 0.0);
                col += 1;
            }
            if fit_proportional {
                a[[f, col]] = s[f] * w;
                col += 1;
            }
            for k in 0..order {
                a[[f, col]] = -h * phi[[f, k]] * w;
                col += 1;
            }
            a[[f, col]] = -h * w;
        }

        let r = linalg::qr_r(&stack_real_imag_matrix(&a));
        if r.nrows() > n_model {
            blocks.push(r.slice(s![n_model.., n_model..]).to_owned());
        }
    }

    let n_block_rows: usize = blocks.iter().map(|b| b.nrows()).sum();
    let total_rows = n_block_rows + 1;
    let mut a_fast = Array2::<f64>::zeros((total_rows, n_sigma));
    let mut b_fast = Array1::<f64>::zeros(total_rows);

    let mut row = 0;
    for block in &blocks {
        let rows = block.nrows();
        a_fast
            .slice_mut(s![row..row + rows, ..])
            .assign(block);
        row += rows;
    }

    // Relaxation constraint: Re(sum_f sigma(s_f)) = n_freqs
    let weight_extra = {
        let norm: f64 = (0..n_responses)
            .map(|i| {
                freq_responses
                    .row(i)
                    .iter()
                    .map(|c| (c * weights[i]).norm_sqr())
                    .sum::<f64>()
            })
            .sum::<f64>()
            .sqrt();
        norm / (n_responses * n_freqs) as f64
    };
    for k in 0..order {
        let sum: f64 = (0..n_freqs).map(|f| phi[[f, k]].re).sum();
        a_fast[[row, k]] = sum * weight_extra;
    }
    a_fast[[row, order]] = n_freqs as f64 * weight_extra;
    b_fast[row] = n_freqs as f64 * weight_extra;

    // Singular values below sigma_max / max_condition are dropped
    let rcond = RELOCATION_RCOND.max(1.0 / max_condition);
    let (a_scaled, scales) = scale_columns(&a_fast);
    let result = linalg::lstsq_rcond(&a_scaled, &b_fast, rcond)
        .map_err(|e| failure(f64::NAN, e))?;

    let x: Vec<f64> = result
        .solution
        .iter()
        .zip(scales.iter())
        .map(|(v, sc)| v / sc)
        .collect();

    check_solution(x.iter(), result.condition, max_condition, "pole relocation")?;

    let mut d_res = x[order];
    if d_res.abs() < RESIDUE_TOLERANCE {
        d_res = RESIDUE_TOLERANCE * if d_res < 0.0 { -1.0 } else { 1.0 };
    }

    // H = A - b * c^T / d_res
    let mut h_matrix = Array2::<f64>::zeros((order, order));
    let mut b_vec = vec![0.0; order];
    let mut col = 0;
    for pole in poles {
        let p = pole.value();
        if pole.is_real() {
            h_matrix[[col, col]] = p.re;
            b_vec[col] = 1.0;
            col += 1;
        } else {
            h_matrix[[col, col]] = p.re;
            h_matrix[[col, col + 1]] = p.im;
            h_matrix[[col + 1, col]] = -p.im;
            h_matrix[[col + 1, col + 1]] = p.re;
            b_vec[col] = 2.0;
            col += 2;
        }
    }
    for (i, &b_i) in b_vec.iter().enumerate() {
        if b_i != 0.0 {
            for j in 0..order {
                h_matrix[[i, j]] -= b_i * x[j] / d_res;
            }
        }
    }

    if h_matrix.iter().any(|v| !v.is_finite()) {
        return Err(failure(result.condition, "non-finite relocation matrix"));
    }

    let eigs = linalg::eigenvalues(&h_matrix).map_err(|e| failure(result.condition, e))?;
    let new_poles = poles::poles_from_eigenvalues(&eigs, imag_axis_tolerance);

    Ok(PoleRelocationResult {
        poles: new_poles,
        d_res,
        condition: result.condition,
        rank_deficiency: result.rank_deficiency,
        singular_vals: result.singular_values,
    })
}

/// Fit residues using least squares
///
/// All responses share one system matrix `[phi, 1, s]`, so a single SVD
/// serves every right-hand side.
pub fn fit_residues(
    poles: &[Pole],
    freqs: &[f64],
    freq_responses: &Array2<Complex64>,
    fit_constant: bool,
    fit_proportional: bool,
    max_condition: f64,
) -> Result<ResidueFit, SolveFailure> {
    let n_responses = freq_responses.nrows();
    let n_freqs = freq_responses.ncols();
    let order = model_order(poles);
    let n_cols = order + usize::from(fit_constant) + usize::from(fit_proportional);

    if n_freqs == 0 || n_cols == 0 {
        return Err(failure(f64::NAN, "empty residue fit input"));
    }

    let s = laplace(freqs);
    let phi = basis(poles, &s);

    let mut a_matrix = Array2::<Complex64>::zeros((n_freqs, n_cols));
    a_matrix.slice_mut(s![.., ..order]).assign(&phi);
    let mut col = order;
    let mut idx_constant = None;
    if fit_constant {
        a_matrix.column_mut(col).fill(Complex64::new(1.0, 0.0));
        idx_constant = Some(col);
        col += 1;
    }
    let mut idx_proportional = None;
    if fit_proportional {
        for f in 0..n_freqs {
            a_matrix[[f, col]] = s[f];
        }
        idx_proportional = Some(col);
    }

    let a_ri = stack_real_imag_matrix(&a_matrix);
    let b_ri = stack_real_imag_matrix(&freq_responses.t().to_owned());
    let (a_scaled, scales) = scale_columns(&a_ri);

    let result = linalg::lstsq_multi(&a_scaled, &b_ri).map_err(|e| failure(f64::NAN, e))?;
    let mut x = result.solution;
    for (k, sc) in scales.iter().enumerate() {
        x.row_mut(k).mapv_inplace(|v| v / sc);
    }

    check_solution(x.iter(), result.condition, max_condition, "residue fit")?;

    let mut residues = Array2::<Complex64>::zeros((poles.len(), n_responses));
    for resp_idx in 0..n_responses {
        let mut col = 0;
        for (k, pole) in poles.iter().enumerate() {
            if pole.is_real() {
                residues[[k, resp_idx]] = Complex64::new(x[[col, resp_idx]], 0.0);
                col += 1;
            } else {
                residues[[k, resp_idx]] =
                    Complex64::new(x[[col, resp_idx]], x[[col + 1, resp_idx]]);
                col += 2;
            }
        }
    }

    Ok(ResidueFit {
        residues,
        constant: idx_constant.map(|idx| x.row(idx).to_owned()),
        proportional: idx_proportional.map(|idx| x.row(idx).to_owned()),
        condition: result.condition,
    })
}

/// Stack the responses of an [nfreq, nports, nports] array row-major
/// into [n_responses, nfreq] (s11, s12, ..., s21, s22, ...)
pub fn stack_responses(data: &Array3<Complex64>) -> Array2<Complex64> {
    let (n_freqs, nports, _) = data.dim();
    Array2::from_shape_fn((nports * nports, n_freqs), |(idx, f)| {
        data[[f, idx / nports, idx % nports]]
    })
}

// Helper functions

fn failure(condition: f64, reason: impl Into<String>) -> SolveFailure {
    SolveFailure {
        condition,
        reason: reason.into(),
    }
}

fn check_solution<'a>(
    mut x: impl Iterator<Item = &'a f64>,
    condition: f64,
    max_condition: f64,
    stage: &str,
) -> Result<(), SolveFailure> {
    if !condition.is_finite() || condition > max_condition {
        return Err(failure(
            condition,
            format!("{} is ill-conditioned", stage),
        ));
    }
    if x.any(|v| !v.is_finite()) {
        return Err(failure(condition, format!("{} produced non-finite values", stage)));
    }
    Ok(())
}

/// Normalize columns to unit 2-norm; zero columns are left untouched
fn scale_columns(a: &Array2<f64>) -> (Array2<f64>, Vec<f64>) {
    let mut scaled = a.clone();
    let mut scales = Vec::with_capacity(a.ncols());
    for mut column in scaled.columns_mut() {
        let norm = column.iter().map(|v| v * v).sum::<f64>().sqrt();
        let scale = if norm > NORM_TOLERANCE { norm } else { 1.0 };
        column.mapv_inplace(|v| v / scale);
        scales.push(scale);
    }
    (scaled, scales)
}

fn stack_real_imag_matrix(a: &Array2<Complex64>) -> Array2<f64> {
    let (rows, cols) = a.dim();
    let mut result = Array2::<f64>::zeros((2 * rows, cols));
    for i in 0..rows {
        for j in 0..cols {
            result[[i, j]] = a[[i, j]].re;
            result[[rows + i, j]] = a[[i, j]].im;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_basis_pair_reproduces_residue() {
        let p = Complex64::new(-0.5, 3.0);
        let r = Complex64::new(0.2, -0.1);
        let poles = vec![Pole::pair(p)];
        let s = laplace(&[0.1, 0.4, 1.0]);
        let phi = basis(&poles, &s);

        for (f, &s_f) in s.iter().enumerate() {
            let direct = r / (s_f - p) + r.conj() / (s_f - p.conj());
            let via_basis = phi[[f, 0]] * r.re + phi[[f, 1]] * r.im;
            assert_relative_eq!(direct.re, via_basis.re, epsilon = 1e-12);
            assert_relative_eq!(direct.im, via_basis.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fit_residues_exact_model() {
        let poles = vec![Pole::real(-2.0), Pole::pair(Complex64::new(-0.3, 4.0))];
        let freqs: Vec<f64> = (1..=20).map(|k| k as f64 * 0.05).collect();
        let s = laplace(&freqs);

        let r_real = 1.5;
        let r_pair = Complex64::new(0.4, 0.2);
        let d = 0.25;
        let response: Array1<Complex64> = s
            .iter()
            .map(|&s_f| {
                Complex64::new(r_real, 0.0) / (s_f - poles[0].value())
                    + r_pair / (s_f - poles[1].value())
                    + r_pair.conj() / (s_f - poles[1].value().conj())
                    + d
            })
            .collect();
        let responses = response.insert_axis(ndarray::Axis(0));

        let fit = fit_residues(&poles, &freqs, &responses, true, false, 1e13).unwrap();
        assert_relative_eq!(fit.residues[[0, 0]].re, r_real, epsilon = 1e-8);
        assert_relative_eq!(fit.residues[[1, 0]].re, r_pair.re, epsilon = 1e-8);
        assert_relative_eq!(fit.residues[[1, 0]].im, r_pair.im, epsilon = 1e-8);
        assert_relative_eq!(fit.constant.unwrap()[0], d, epsilon = 1e-8);
        assert!(fit.proportional.is_none());
    }

    #[test]
    fn test_relocation_keeps_exact_poles() {
        // Data generated by the starting poles: relocation must not move them
        let poles = vec![Pole::real(-1.0), Pole::pair(Complex64::new(-0.2, 3.0))];
        let freqs: Vec<f64> = (1..=40).map(|k| k as f64 * 0.025).collect();
        let s = laplace(&freqs);
        let response: Array1<Complex64> = s
            .iter()
            .map(|&s_f| {
                Complex64::new(0.8, 0.0) / (s_f - poles[0].value())
                    + Complex64::new(0.1, 0.3) / (s_f - poles[1].value())
                    + Complex64::new(0.1, -0.3) / (s_f - poles[1].value().conj())
            })
            .collect();
        let responses = response.insert_axis(ndarray::Axis(0));
        let weights = vec![1.0];

        let result =
            pole_relocation(&poles, &freqs, &responses, &weights, false, false, 1e13, 1e-6)
                .unwrap();
        assert_eq!(result.poles.len(), 2);
        assert_relative_eq!(result.poles[0].value().re, -1.0, epsilon = 1e-6);
        assert_relative_eq!(result.poles[1].value().re, -0.2, epsilon = 1e-6);
        assert_relative_eq!(result.poles[1].value().im, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_stack_responses_row_major() {
        let data = Array3::from_shape_fn((2, 2, 2), |(f, i, j)| {
            Complex64::new((f * 100 + i * 10 + j) as f64, 0.0)
        });
        let stacked = stack_responses(&data);
        assert_eq!(stacked.dim(), (4, 2));
        assert_eq!(stacked[[1, 0]].re, 1.0); // s12 at f0
        assert_eq!(stacked[[2, 1]].re, 110.0); // s21 at f1
    }

    #[test]
    fn test_scale_columns() {
        let a = Array2::from_shape_vec((2, 2), vec![3.0, 0.0, 4.0, 0.0]).unwrap();
        let (scaled, scales) = scale_columns(&a);
        assert_relative_eq!(scales[0], 5.0);
        assert_relative_eq!(scales[1], 1.0);
        assert_relative_eq!(scaled[[1, 0]], 0.8);
    }
}
