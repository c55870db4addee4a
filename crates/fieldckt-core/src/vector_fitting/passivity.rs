//! Passivity testing and enforcement for Vector Fitting models
//!
//! Passivity is assessed by sampling the model over a dense sweep that
//! spans and extends beyond the fitted band:
//! - S-parameters: the largest singular value must not exceed 1
//! - Z-parameters: the smallest eigenvalue of the Hermitian part must not
//!   drop below 0 (positive-realness)
//!
//! Enforcement uses iterative singular value (eigenvalue) perturbation: the
//! violating part of the response is fitted with the model's own pole basis
//! and subtracted from the residues, leaving the poles untouched.
//!
//! References:
//! - T. Dhaene et al., "Efficient Algorithm for Passivity Enforcement of S-Parameter-
//!   Based Macromodels," IEEE TMTT, vol. 57, no. 2, 2009

use ndarray::{Array1, Array2, Array3};
use num_complex::Complex64;
use tracing::{debug, info, warn};

use super::algorithms::{basis, laplace};
use super::config::PassivityConfig;
use super::constants::VIOLATION_TOLERANCE;
use super::core::FitError;
use super::model::PoleResidueModel;
use super::poles::{model_order, Pole};
use crate::frequency::{sweep, SweepType};
use crate::math::linalg;
use crate::network::ParameterKind;

/// Result of passivity test
#[derive(Debug, Clone, PartialEq)]
pub struct PassivityTestResult {
    /// Frequency bands where passivity is violated [[f_start, f_stop], ...]
    pub violation_bands: Vec<[f64; 2]>,
    /// Maximum singular value (S) or minimum Hermitian-part eigenvalue (Z)
    pub worst: f64,
    /// Frequency at which `worst` occurs (Hz)
    pub worst_frequency: f64,
    pub passive: bool,
}

impl PassivityTestResult {
    #[inline]
    pub fn is_passive(&self) -> bool {
        self.passive
    }
}

/// Result of passivity enforcement
#[derive(Debug, Clone)]
pub struct PassivityEnforceResult {
    pub model: PoleResidueModel,
    /// Number of perturbation iterations performed
    pub iterations: usize,
    /// Worst metric per iteration
    pub history: Vec<f64>,
    /// Whether the constant term had to be clipped first
    pub d_clipped: bool,
}

/// Dense evaluation sweep: linear from DC to `freq_margin * f_max` plus a
/// logarithmic sweep across the fitted band
pub fn evaluation_frequencies(model: &PoleResidueModel, config: &PassivityConfig) -> Vec<f64> {
    let (f_lo, f_hi) = model.band();
    let f_max = config.freq_margin * f_hi;

    let mut freqs = sweep(0.0, f_max, config.n_samples, SweepType::Linear);
    if f_hi > 0.0 {
        let f_start = if f_lo > 0.0 { f_lo } else { f_hi * 1e-6 };
        freqs.extend(sweep(f_start, f_hi, config.n_samples, SweepType::Log));
    }
    freqs.sort_by(f64::total_cmp);
    freqs.dedup_by(|a, b| (*a - *b).abs() <= f64::EPSILON * b.abs().max(1.0));
    freqs
}

/// Passivity test of a fitted model over the dense sweep
pub fn passivity_test(
    model: &PoleResidueModel,
    config: &PassivityConfig,
) -> Result<PassivityTestResult, FitError> {
    let freqs = evaluation_frequencies(model, config);
    let evaluator = Evaluator::new(model, &freqs);
    let coeffs = coefficients(model);
    assess(model.kind(), &freqs, &evaluator.evaluate(model, &coeffs))
}

/// Enforce passivity by perturbing residues (and clipping D if necessary)
///
/// A model that is already passive is returned unchanged, so repeated
/// calls are no-ops. On non-convergence the error carries the best-effort
/// model.
pub fn enforce_passivity(
    model: &PoleResidueModel,
    config: &PassivityConfig,
) -> Result<PassivityEnforceResult, FitError> {
    config.validate()?;

    let freqs = evaluation_frequencies(model, config);
    let evaluator = Evaluator::new(model, &freqs);
    let mut coeffs = coefficients(model);

    let initial = assess(model.kind(), &freqs, &evaluator.evaluate(model, &coeffs))?;
    if initial.passive {
        debug!(worst = initial.worst, "model already passive");
        return Ok(PassivityEnforceResult {
            model: model.clone(),
            iterations: 0,
            history: vec![initial.worst],
            d_clipped: false,
        });
    }

    let has_proportional = model
        .proportional()
        .map_or(false, |e| e.iter().any(|&v| v != 0.0));
    if model.kind() == ParameterKind::S && has_proportional {
        return Err(FitError::PassivityEnforcementFailed {
            iterations: 0,
            worst: initial.worst,
            reason: "S-parameter model with a nonzero proportional term cannot be passive"
                .to_string(),
            d_clipped: false,
            model: Box::new(model.clone()),
        });
    }

    info!(
        worst = initial.worst,
        worst_frequency = initial.worst_frequency,
        bands = initial.violation_bands.len(),
        "enforcing passivity"
    );

    // Clip the constant term if it violates on its own
    let mut constant = model.constant().cloned();
    let mut d_clipped = false;
    if let Some(d) = constant.as_mut() {
        d_clipped = clip_constant(d, model.kind(), config.delta_threshold)?;
        if d_clipped {
            warn!("constant term violates passivity on its own and was clipped");
        }
    }

    let mut current = model.with_terms(model.residues().clone(), constant.clone());
    let mut history = Vec::new();
    let mut worst = initial.worst;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        let h = evaluator.evaluate(&current, &coeffs);
        let test = assess(current.kind(), &freqs, &h)?;
        worst = test.worst;
        history.push(worst);
        if test.passive {
            break;
        }

        let violation = match current.kind() {
            ParameterKind::S => s_violation(&h, config.delta_threshold)?,
            ParameterKind::Z => z_violation(&h, config.delta_threshold)?,
        };
        let real_only = current.kind() == ParameterKind::Z;
        evaluator.perturb(&mut coeffs, &violation, config.damping, real_only);

        current = current.with_terms(to_residues(current.poles(), &coeffs), constant.clone());
        iterations += 1;
        debug!(iteration = iterations, worst, "passivity perturbation");
    }

    let final_test = assess(current.kind(), &freqs, &evaluator.evaluate(&current, &coeffs))?;
    if !final_test.passive {
        return Err(FitError::PassivityEnforcementFailed {
            iterations,
            worst: final_test.worst,
            reason: format!("{} violation bands remain", final_test.violation_bands.len()),
            d_clipped,
            model: Box::new(current),
        });
    }

    info!(iterations, worst, "passivity enforced");
    Ok(PassivityEnforceResult {
        model: current,
        iterations,
        history,
        d_clipped,
    })
}

/// Pole basis sampled over the sweep
struct Evaluator {
    /// [n_freqs, model_order]
    phi: Array2<Complex64>,
    s: Vec<Complex64>,
}

impl Evaluator {
    fn new(model: &PoleResidueModel, freqs: &[f64]) -> Self {
        let s = laplace(freqs);
        Self {
            phi: basis(model.poles(), &s),
            s,
        }
    }

    /// Model response [n_freqs, n, n] from real residue coefficients
    fn evaluate(&self, model: &PoleResidueModel, coeffs: &Array3<f64>) -> Array3<Complex64> {
        let n = model.nports();
        let n_freqs = self.s.len();
        let order = self.phi.ncols();

        Array3::from_shape_fn((n_freqs, n, n), |(f, i, j)| {
            let mut h = Complex64::new(0.0, 0.0);
            if let Some(d) = model.constant() {
                h += d[[i, j]];
            }
            if let Some(e) = model.proportional() {
                h += self.s[f] * e[[i, j]];
            }
            for k in 0..order {
                h += self.phi[[f, k]] * coeffs[[k, i, j]];
            }
            h
        })
    }

    /// Fit the violation of every entry with the pole basis and subtract a
    /// damped correction from the coefficients
    fn perturb(
        &self,
        coeffs: &mut Array3<f64>,
        violation: &Array3<Complex64>,
        damping: f64,
        real_only: bool,
    ) {
        let (n_freqs, n, _) = violation.dim();
        let order = self.phi.ncols();
        let rows_per_freq = if real_only { 1 } else { 2 };

        for i in 0..n {
            for j in 0..n {
                let active: Vec<usize> = (0..n_freqs)
                    .filter(|&f| violation[[f, i, j]].norm() > VIOLATION_TOLERANCE)
                    .collect();
                if active.is_empty() {
                    continue;
                }

                let rows = active.len() * rows_per_freq;
                let mut a = Array2::<f64>::zeros((rows, order));
                let mut b = Array1::<f64>::zeros(rows);
                for (r, &f) in active.iter().enumerate() {
                    let viol = violation[[f, i, j]];
                    for k in 0..order {
                        a[[r * rows_per_freq, k]] = self.phi[[f, k]].re;
                    }
                    b[r * rows_per_freq] = viol.re;
                    if !real_only {
                        for k in 0..order {
                            a[[r * 2 + 1, k]] = self.phi[[f, k]].im;
                        }
                        b[r * 2 + 1] = viol.im;
                    }
                }

                match linalg::lstsq(&a, &b) {
                    Ok(result) => {
                        for (k, &delta) in result.solution.iter().enumerate() {
                            coeffs[[k, i, j]] -= damping * delta;
                        }
                    }
                    Err(e) => warn!(i, j, error = e, "violation fit failed"),
                }
            }
        }
    }
}

/// Passivity metric per frequency and violation bands
fn assess(
    kind: ParameterKind,
    freqs: &[f64],
    h: &Array3<Complex64>,
) -> Result<PassivityTestResult, FitError> {
    let mut violating = Vec::with_capacity(freqs.len());
    let mut worst = match kind {
        ParameterKind::S => f64::NEG_INFINITY,
        ParameterKind::Z => f64::INFINITY,
    };
    let mut worst_frequency = 0.0;

    for (f, &freq) in freqs.iter().enumerate() {
        let matrix = h.index_axis(ndarray::Axis(0), f).to_owned();
        let (metric, violates) = match kind {
            ParameterKind::S => {
                let sigma_max = linalg::singular_values(&matrix)
                    .into_iter()
                    .fold(0.0, f64::max);
                (sigma_max, sigma_max > 1.0 + VIOLATION_TOLERANCE)
            }
            ParameterKind::Z => {
                let (eigs, _) =
                    linalg::hermitian_eigen(&matrix).map_err(|e| FitError::LinearAlgebra(e.into()))?;
                let lambda_min = eigs.into_iter().fold(f64::INFINITY, f64::min);
                (lambda_min, lambda_min < -VIOLATION_TOLERANCE)
            }
        };

        let is_worse = match kind {
            ParameterKind::S => metric > worst,
            ParameterKind::Z => metric < worst,
        };
        if is_worse {
            worst = metric;
            worst_frequency = freq;
        }
        violating.push(violates);
    }

    let mut violation_bands: Vec<[f64; 2]> = Vec::new();
    let mut start: Option<usize> = None;
    for (f, &v) in violating.iter().enumerate() {
        match (v, start) {
            (true, None) => start = Some(f),
            (false, Some(s)) => {
                violation_bands.push([freqs[s], freqs[f - 1]]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        violation_bands.push([freqs[s], freqs[freqs.len() - 1]]);
    }

    Ok(PassivityTestResult {
        passive: violation_bands.is_empty(),
        violation_bands,
        worst,
        worst_frequency,
    })
}

/// S violation: U * diag(max(sigma - delta, 0)) * Vh per frequency
fn s_violation(h: &Array3<Complex64>, delta_threshold: f64) -> Result<Array3<Complex64>, FitError> {
    let (n_freqs, n, _) = h.dim();
    let mut viol = Array3::<Complex64>::zeros((n_freqs, n, n));

    for f in 0..n_freqs {
        let matrix = h.index_axis(ndarray::Axis(0), f).to_owned();
        let (u, sigma, vh) =
            linalg::svd_complex(&matrix).map_err(|e| FitError::LinearAlgebra(e.into()))?;
        let sigma_max = sigma.iter().cloned().fold(0.0, f64::max);
        let delta = sigma_max.min(delta_threshold);

        for (k, &sk) in sigma.iter().enumerate() {
            let excess = sk - delta;
            if excess <= 0.0 {
                continue;
            }
            for i in 0..n {
                for j in 0..n {
                    viol[[f, i, j]] += u[[i, k]] * excess * vh[[k, j]];
                }
            }
        }
    }
    Ok(viol)
}

/// Z violation: W * diag(min(lambda - margin, 0)) * W^H per frequency
///
/// The margin is `(1 - delta_threshold)` of the largest eigenvalue magnitude
/// over the sweep.
fn z_violation(h: &Array3<Complex64>, delta_threshold: f64) -> Result<Array3<Complex64>, FitError> {
    let (n_freqs, n, _) = h.dim();
    let mut decompositions = Vec::with_capacity(n_freqs);
    let mut scale = 0.0_f64;

    for f in 0..n_freqs {
        let matrix = h.index_axis(ndarray::Axis(0), f).to_owned();
        let (eigs, vecs) =
            linalg::hermitian_eigen(&matrix).map_err(|e| FitError::LinearAlgebra(e.into()))?;
        scale = eigs.iter().fold(scale, |acc, l| acc.max(l.abs()));
        decompositions.push((eigs, vecs));
    }
    let margin = (1.0 - delta_threshold) * scale;

    let mut viol = Array3::<Complex64>::zeros((n_freqs, n, n));
    for (f, (eigs, w)) in decompositions.iter().enumerate() {
        for (k, &lambda) in eigs.iter().enumerate() {
            let deficit = lambda - margin;
            if deficit >= 0.0 {
                continue;
            }
            for i in 0..n {
                for j in 0..n {
                    viol[[f, i, j]] += w[[i, k]] * deficit * w[[j, k]].conj();
                }
            }
        }
    }
    Ok(viol)
}

/// Clip a constant term that is non-passive by itself; returns whether it changed
fn clip_constant(
    d: &mut Array2<f64>,
    kind: ParameterKind,
    delta_threshold: f64,
) -> Result<bool, FitError> {
    let n = d.nrows();
    match kind {
        ParameterKind::S => {
            let (u, sigma, vh) = linalg::svd_real(d).map_err(|e| FitError::LinearAlgebra(e.into()))?;
            if sigma.iter().all(|&s| s <= 1.0) {
                return Ok(false);
            }
            *d = Array2::from_shape_fn((n, n), |(i, j)| {
                sigma
                    .iter()
                    .enumerate()
                    .map(|(k, &s)| u[[i, k]] * s.min(delta_threshold) * vh[[k, j]])
                    .sum()
            });
            Ok(true)
        }
        ParameterKind::Z => {
            let dc = d.mapv(|v| Complex64::new(v, 0.0));
            let (eigs, w) =
                linalg::hermitian_eigen(&dc).map_err(|e| FitError::LinearAlgebra(e.into()))?;
            if eigs.iter().all(|&l| l >= 0.0) {
                return Ok(false);
            }
            for (k, &lambda) in eigs.iter().enumerate() {
                if lambda >= 0.0 {
                    continue;
                }
                for i in 0..n {
                    for j in 0..n {
                        d[[i, j]] -= lambda * (w[[i, k]] * w[[j, k]].conj()).re;
                    }
                }
            }
            Ok(true)
        }
    }
}

/// Real coefficients [model_order, n, n] of the residues in the pole basis
fn coefficients(model: &PoleResidueModel) -> Array3<f64> {
    let n = model.nports();
    let residues = model.residues();
    let mut coeffs = Array3::<f64>::zeros((model_order(model.poles()), n, n));

    let mut col = 0;
    for (k, pole) in model.poles().iter().enumerate() {
        for i in 0..n {
            for j in 0..n {
                coeffs[[col, i, j]] = residues[[k, i, j]].re;
                if !pole.is_real() {
                    coeffs[[col + 1, i, j]] = residues[[k, i, j]].im;
                }
            }
        }
        col += pole.order();
    }
    coeffs
}

/// Inverse of `coefficients`
fn to_residues(poles: &[Pole], coeffs: &Array3<f64>) -> Array3<Complex64> {
    let (_, n, _) = coeffs.dim();
    let mut residues = Array3::<Complex64>::zeros((poles.len(), n, n));

    let mut col = 0;
    for (k, pole) in poles.iter().enumerate() {
        for i in 0..n {
            for j in 0..n {
                let im = if pole.is_real() {
                    0.0
                } else {
                    coeffs[[col + 1, i, j]]
                };
                residues[[k, i, j]] = Complex64::new(coeffs[[col, i, j]], im);
            }
        }
        col += pole.order();
    }
    residues
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn one_port(pole: f64, residue: f64, d: f64, kind: ParameterKind) -> PoleResidueModel {
        PoleResidueModel::new(
            vec![Pole::real(pole)],
            Array3::from_elem((1, 1, 1), Complex64::new(residue, 0.0)),
            Some(Array2::from_elem((1, 1), d)),
            None,
            kind,
            50.0,
            (1e6, 1e9),
        )
        .unwrap()
    }

    #[test]
    fn test_passive_model() {
        // |S(0)| = 0.5, decays with frequency
        let model = one_port(-1e9, 0.5e9, 0.0, ParameterKind::S);
        let result = passivity_test(&model, &PassivityConfig::default()).unwrap();
        assert!(result.is_passive());
        assert!(result.violation_bands.is_empty());
        assert_relative_eq!(result.worst, 0.5, epsilon = 1e-6);
        assert_eq!(result.worst_frequency, 0.0);
    }

    #[test]
    fn test_violation_band_found() {
        // |S(0)| = 1.5, crosses 1 near f = sqrt(1.25)*1e9/(2*pi)
        let model = one_port(-1e9, 1.5e9, 0.0, ParameterKind::S);
        let result = passivity_test(&model, &PassivityConfig::default()).unwrap();
        assert!(!result.is_passive());
        assert_eq!(result.violation_bands.len(), 1);
        assert_eq!(result.violation_bands[0][0], 0.0);
        let crossing = 1.25_f64.sqrt() * 1e9 / (2.0 * std::f64::consts::PI);
        assert!(result.violation_bands[0][1] < crossing);
        assert_relative_eq!(result.worst, 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_enforce_s_and_idempotent() {
        let model = one_port(-1e9, 1.2e9, 0.0, ParameterKind::S);
        let config = PassivityConfig::default();
        let first = enforce_passivity(&model, &config).unwrap();
        assert!(first.iterations > 0);
        assert!(passivity_test(&first.model, &config).unwrap().is_passive());
        assert_eq!(first.model.poles(), model.poles());

        let second = enforce_passivity(&first.model, &config).unwrap();
        assert_eq!(second.iterations, 0);
        assert_eq!(second.model, first.model);
    }

    #[test]
    fn test_constant_clipped() {
        let model = one_port(-1e9, 0.01e9, 1.1, ParameterKind::S);
        let result = enforce_passivity(&model, &PassivityConfig::default()).unwrap();
        assert!(result.d_clipped);
        assert!(result.model.constant().unwrap()[[0, 0]] <= 1.0);
    }

    #[test]
    fn test_clipping_reported_when_enforcement_fails() {
        let model = one_port(-1e9, 1.2e9, 1.1, ParameterKind::S);
        let config = PassivityConfig {
            max_iterations: 0,
            ..Default::default()
        };
        match enforce_passivity(&model, &config) {
            Err(FitError::PassivityEnforcementFailed {
                iterations,
                d_clipped,
                model: best,
                ..
            }) => {
                assert_eq!(iterations, 0);
                assert!(d_clipped);
                assert!(best.constant().unwrap()[[0, 0]] <= 1.0);
            }
            other => panic!("expected enforcement failure, got {:?}", other),
        }
    }

    #[test]
    fn test_z_negative_resistance_enforced() {
        // Re Z(0) = -0.5 + 0.3 < 0 at low frequency, positive at high
        let model = one_port(-1e9, -0.5e9, 0.3, ParameterKind::Z);
        let config = PassivityConfig::default();
        assert!(!passivity_test(&model, &config).unwrap().is_passive());

        let result = enforce_passivity(&model, &config).unwrap();
        let test = passivity_test(&result.model, &config).unwrap();
        assert!(test.is_passive());
        assert!(test.worst >= -VIOLATION_TOLERANCE);
    }

    #[test]
    fn test_s_with_proportional_term_fails() {
        let model = PoleResidueModel::new(
            vec![Pole::real(-1e9)],
            Array3::from_elem((1, 1, 1), Complex64::new(1.5e9, 0.0)),
            None,
            Some(Array2::from_elem((1, 1), 1e-9)),
            ParameterKind::S,
            50.0,
            (1e6, 1e9),
        )
        .unwrap();
        match enforce_passivity(&model, &PassivityConfig::default()) {
            Err(FitError::PassivityEnforcementFailed { model: best, .. }) => {
                assert_eq!(*best, model)
            }
            other => panic!("expected enforcement failure, got {:?}", other),
        }
    }

    #[test]
    fn test_coefficients_roundtrip_pair() {
        let mut residues = Array3::zeros((2, 1, 1));
        residues[[0, 0, 0]] = Complex64::new(0.4, 0.0);
        residues[[1, 0, 0]] = Complex64::new(0.2, -0.7);
        let model = PoleResidueModel::new(
            vec![Pole::real(-1.0), Pole::pair(Complex64::new(-0.5, 2.0))],
            residues.clone(),
            None,
            None,
            ParameterKind::S,
            50.0,
            (0.1, 1.0),
        )
        .unwrap();
        let coeffs = coefficients(&model);
        assert_eq!(coeffs.dim(), (3, 1, 1));
        assert_eq!(to_residues(model.poles(), &coeffs), residues);
    }
}
