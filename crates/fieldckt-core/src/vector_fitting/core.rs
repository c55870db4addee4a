//! VectorFitter and the main fitting routines (manual and automatic mode)

use std::time::Instant;

use ndarray::{Array1, Array2, Array3};
use num_complex::Complex64;
use tracing::{debug, info, warn};

use super::algorithms::{self, PoleRelocationResult, SolveFailure};
use super::config::{AutoFitConfig, FitConfig, FitMode};
use super::constants::NORM_TOLERANCE;
use super::model::{ModelError, PoleResidueModel};
use super::poles::{self, model_order, Pole};
use crate::config::ConfigError;
use crate::constants::MIN_FIT_SAMPLES;
use crate::network::{NetworkResponse, ParameterKind, ResponseError};

/// Errors raised by fitting and passivity enforcement
#[derive(thiserror::Error, Debug)]
pub enum FitError {
    #[error("insufficient samples: {found} frequencies, at least {required} required")]
    InsufficientSamples { found: usize, required: usize },

    #[error("fitting diverged {} at model order {n_poles} (condition {condition:e}): {reason}",
        stage_label(.iteration))]
    FittingDiverged {
        /// Relocation iteration, or None for the final residue fit
        iteration: Option<usize>,
        n_poles: usize,
        condition: f64,
        reason: String,
    },

    #[error("passivity enforcement did not converge after {iterations} iterations (worst {worst:.6}): {reason}")]
    PassivityEnforcementFailed {
        iterations: usize,
        /// Largest singular value (S) or most negative eigenvalue (Z) left
        worst: f64,
        reason: String,
        /// Whether the constant term of `model` was clipped
        d_clipped: bool,
        /// Best-effort model, which the caller may still accept
        model: Box<PoleResidueModel>,
    },

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("invalid model: {0}")]
    Model(#[from] ModelError),

    #[error("linear algebra failure: {0}")]
    LinearAlgebra(String),
}

/// One pole budget tried by the automatic mode
#[derive(Debug, Clone, PartialEq)]
pub struct AutoFitStep {
    pub n_poles_real: usize,
    pub n_poles_cmplx: usize,
    pub model_order: usize,
    /// None when the fit at this budget diverged
    pub rms_error: Option<f64>,
    pub relocation_iterations: usize,
}

/// Outcome of a fitting run
#[derive(Debug, Clone)]
pub struct FitReport {
    pub model: PoleResidueModel,
    pub rms_error: f64,
    pub relocation_iterations: usize,
    pub converged: bool,
    /// Budgets visited in automatic mode (empty in manual mode)
    pub steps: Vec<AutoFitStep>,
    /// Wall-clock time of the fit (in seconds)
    pub wall_clock_time: f64,
}

/// Vector fitting engine
#[derive(Debug, Clone, Default)]
pub struct VectorFitter {
    config: FitConfig,
}

/// Fit a response with the given configuration
pub fn fit(response: &NetworkResponse, config: &FitConfig) -> Result<PoleResidueModel, FitError> {
    VectorFitter::new(config.clone())?
        .fit(response)
        .map(|report| report.model)
}

/// Response prepared for fitting: converted, normalized and stacked
struct Prepared {
    target: NetworkResponse,
    freqs_norm: Vec<f64>,
    norm: f64,
    responses: Array2<Complex64>,
    weights: Vec<f64>,
    nports: usize,
    band: (f64, f64),
}

struct BudgetFit {
    model: PoleResidueModel,
    iterations: usize,
    converged: bool,
}

impl VectorFitter {
    pub fn new(config: FitConfig) -> Result<Self, FitError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Perform vector fitting on a network response
    pub fn fit(&self, response: &NetworkResponse) -> Result<FitReport, FitError> {
        let timer_start = Instant::now();

        if response.nfreq() < MIN_FIT_SAMPLES {
            return Err(FitError::InsufficientSamples {
                found: response.nfreq(),
                required: MIN_FIT_SAMPLES,
            });
        }

        let prepared = self.prepare(response)?;

        let (fitted, steps) = match &self.config.mode {
            FitMode::Manual {
                n_poles_real,
                n_poles_cmplx,
            } => {
                let fitted = self.fit_budget(
                    &prepared,
                    *n_poles_real,
                    *n_poles_cmplx,
                    self.config.max_iterations,
                )?;
                (fitted, Vec::new())
            }
            FitMode::Automatic(auto) => self.fit_automatic(&prepared, auto)?,
        };

        let rms_error = fitted.model.rms_error(&prepared.target)?;
        let wall_clock_time = timer_start.elapsed().as_secs_f64();

        info!(
            model_order = fitted.model.model_order(),
            rms_error,
            iterations = fitted.iterations,
            converged = fitted.converged,
            wall_clock_time,
            "vector fit complete"
        );

        Ok(FitReport {
            model: fitted.model,
            rms_error,
            relocation_iterations: fitted.iterations,
            converged: fitted.converged,
            steps,
            wall_clock_time,
        })
    }

    fn prepare(&self, response: &NetworkResponse) -> Result<Prepared, FitError> {
        let target = response.to_kind(self.config.parameter_kind, self.config.z0)?;
        let freqs = target.frequencies();

        // Normalize frequencies for numerical stability
        let norm = freqs.iter().sum::<f64>() / freqs.len() as f64;
        let freqs_norm: Vec<f64> = freqs.iter().map(|f| f / norm).collect();

        let responses = algorithms::stack_responses(&target.to_array3());
        let weights: Vec<f64> = responses
            .rows()
            .into_iter()
            .map(|row| {
                let norm = row.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
                if norm > NORM_TOLERANCE {
                    1.0 / norm
                } else {
                    1.0
                }
            })
            .collect();

        let band = (freqs[0], freqs[freqs.len() - 1]);
        Ok(Prepared {
            nports: target.nports(),
            target,
            freqs_norm,
            norm,
            responses,
            weights,
            band,
        })
    }

    /// Relocate poles from a fresh initial placement, then fit residues
    fn fit_budget(
        &self,
        prepared: &Prepared,
        n_poles_real: usize,
        n_poles_cmplx: usize,
        max_iterations: usize,
    ) -> Result<BudgetFit, FitError> {
        let config = &self.config;
        let mut poles = poles::init_poles(
            &prepared.freqs_norm,
            n_poles_real,
            n_poles_cmplx,
            config.init_pole_spacing,
        );

        let mut converged = false;
        let mut converged_once = false;
        let mut max_singular = 1.0;
        let mut iterations = 0;

        for iteration in 0..max_iterations {
            let PoleRelocationResult {
                poles: new_poles,
                d_res,
                condition,
                rank_deficiency,
                singular_vals,
            } = algorithms::pole_relocation(
                &poles,
                &prepared.freqs_norm,
                &prepared.responses,
                &prepared.weights,
                config.fit_constant,
                config.fit_proportional,
                config.max_condition,
                config.imag_axis_tolerance,
            )
            .map_err(|e| diverged(Some(iteration), model_order(&poles), e))?;

            if rank_deficiency > 0 {
                debug!(iteration, rank_deficiency, "rank-deficient relocation solved minimum-norm");
            }

            poles = new_poles;
            iterations = iteration + 1;

            // Check convergence
            let new_max_singular = singular_vals.iter().cloned().fold(0.0, f64::max);
            let delta_max = (1.0 - new_max_singular / max_singular).abs();
            max_singular = new_max_singular;

            debug!(iteration, d_res, condition, delta_max, "pole relocation");

            if delta_max < config.convergence_tol {
                if converged_once {
                    converged = true;
                    break;
                }
                converged_once = true;
            } else {
                converged_once = false;
            }
        }

        if !converged {
            debug!(iterations, "relocation stopped at iteration cap");
        }

        // Fit residues with final poles
        let fit = algorithms::fit_residues(
            &poles,
            &prepared.freqs_norm,
            &prepared.responses,
            config.fit_constant,
            config.fit_proportional,
            config.max_condition,
        )
        .map_err(|e| diverged(None, model_order(&poles), e))?;

        let model = self.assemble_model(prepared, &poles, fit)?;
        Ok(BudgetFit {
            model,
            iterations,
            converged,
        })
    }

    /// Un-normalize and reshape the stacked fit into a model
    fn assemble_model(
        &self,
        prepared: &Prepared,
        poles: &[Pole],
        fit: algorithms::ResidueFit,
    ) -> Result<PoleResidueModel, FitError> {
        let n = prepared.nports;
        let norm = prepared.norm;

        let residues = Array3::from_shape_fn((poles.len(), n, n), |(k, i, j)| {
            fit.residues[[k, i * n + j]] * norm
        });
        let to_matrix = |v: Array1<f64>, scale: f64| {
            Array2::from_shape_fn((n, n), |(i, j)| v[i * n + j] * scale)
        };

        let model = PoleResidueModel::new(
            poles.iter().map(|p| p.scaled(norm)).collect(),
            residues,
            fit.constant.map(|d| to_matrix(d, 1.0)),
            fit.proportional.map(|e| to_matrix(e, 1.0 / norm)),
            self.config.parameter_kind,
            self.config.z0,
            prepared.band,
        )?;
        Ok(model)
    }

    fn fit_automatic(
        &self,
        prepared: &Prepared,
        auto: &AutoFitConfig,
    ) -> Result<(BudgetFit, Vec<AutoFitStep>), FitError> {
        let n_real = auto.n_poles_init_real;
        let mut n_cmplx = auto.n_poles_init_cmplx;
        let mut iters = auto.iters_start;

        let mut steps = Vec::new();
        let mut best: Option<(usize, usize, f64, BudgetFit)> = None;
        let mut last_error = None;

        loop {
            let order = n_real + 2 * n_cmplx;
            match self.fit_budget(prepared, n_real, n_cmplx, iters) {
                Ok(fitted) => {
                    let rms = fitted.model.rms_error(&prepared.target)?;
                    info!(n_real, n_cmplx, model_order = order, rms_error = rms, "auto fit step");
                    steps.push(AutoFitStep {
                        n_poles_real: n_real,
                        n_poles_cmplx: n_cmplx,
                        model_order: order,
                        rms_error: Some(rms),
                        relocation_iterations: fitted.iterations,
                    });

                    let improves = best.as_ref().map_or(true, |(_, _, e, _)| rms <= *e);
                    if improves {
                        best = Some((n_real, n_cmplx, rms, fitted));
                    }
                    if rms <= auto.target_error {
                        break;
                    }
                }
                Err(err @ FitError::FittingDiverged { .. }) => {
                    warn!(n_real, n_cmplx, model_order = order, error = %err, "auto fit step diverged");
                    steps.push(AutoFitStep {
                        n_poles_real: n_real,
                        n_poles_cmplx: n_cmplx,
                        model_order: order,
                        rms_error: None,
                        relocation_iterations: 0,
                    });
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }

            if order >= auto.model_order_max {
                break;
            }
            let add = auto.n_poles_add.min((auto.model_order_max - order) / 2);
            if add == 0 {
                break;
            }
            n_cmplx += add;
            iters = auto.iters_inter;
        }

        let Some((n_real, n_cmplx, rms, fitted)) = best else {
            return Err(last_error.unwrap_or_else(|| FitError::FittingDiverged {
                iteration: None,
                n_poles: auto.initial_order(),
                condition: f64::NAN,
                reason: "no pole budget could be fitted".to_string(),
            }));
        };

        if rms > auto.target_error {
            warn!(rms_error = rms, target = auto.target_error, "target error not reached");
        }

        // Final refit of the best budget with the longer iteration count
        let final_fit = match self.fit_budget(prepared, n_real, n_cmplx, auto.iters_final) {
            Ok(refit) => {
                let refit_rms = refit.model.rms_error(&prepared.target)?;
                if refit_rms <= rms {
                    refit
                } else {
                    fitted
                }
            }
            Err(err @ FitError::FittingDiverged { .. }) => {
                warn!(error = %err, "final refit diverged, keeping best step");
                fitted
            }
            Err(err) => return Err(err),
        };

        Ok((final_fit, steps))
    }
}

fn stage_label(iteration: &Option<usize>) -> String {
    match iteration {
        Some(i) => format!("in relocation iteration {}", i),
        None => "in residue fit".to_string(),
    }
}

fn diverged(iteration: Option<usize>, n_poles: usize, failure: SolveFailure) -> FitError {
    FitError::FittingDiverged {
        iteration,
        n_poles,
        condition: failure.condition,
        reason: failure.reason,
    }
}

impl FitReport {
    #[inline]
    pub fn parameter_kind(&self) -> ParameterKind {
        self.model.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn flat_response(freqs: &[f64], value: f64) -> NetworkResponse {
        let data = Array3::from_elem((freqs.len(), 1, 1), Complex64::new(value, 0.0));
        NetworkResponse::from_arrays(freqs, &data, ParameterKind::S).unwrap()
    }

    fn resonant_response(freqs: &[f64]) -> NetworkResponse {
        let p = Complex64::new(-2.0 * PI * 5e7, 2.0 * PI * 1e9);
        let r = Complex64::new(2.0 * PI * 4e7, 2.0 * PI * 1e7);
        let data = Array3::from_shape_fn((freqs.len(), 1, 1), |(f, _, _)| {
            let s = Complex64::new(0.0, 2.0 * PI * freqs[f]);
            r / (s - p) + r.conj() / (s - p.conj()) + 0.1
        });
        NetworkResponse::from_arrays(freqs, &data, ParameterKind::S).unwrap()
    }

    #[test]
    fn test_insufficient_samples() {
        let response = flat_response(&[1e6, 1e7, 1e8], 0.5);
        let err = fit(&response, &FitConfig::manual(1, 0)).unwrap_err();
        assert!(matches!(
            err,
            FitError::InsufficientSamples {
                found: 3,
                required: 4
            }
        ));
    }

    #[test]
    fn test_flat_response_fit_by_constant() {
        let response = flat_response(&[1e6, 1e7, 1e8, 1e9], 0.5);
        let report = VectorFitter::new(FitConfig::manual(1, 0))
            .unwrap()
            .fit(&response)
            .unwrap();

        let d = report.model.constant().unwrap();
        assert_relative_eq!(d[[0, 0]], 0.5, epsilon = 1e-6);
        assert!(report.rms_error < 1e-6);
        assert!(report.model.is_stable());
    }

    #[test]
    fn test_resonance_recovered() {
        let freqs: Vec<f64> = (1..=100).map(|k| k as f64 * 2e7).collect();
        let response = resonant_response(&freqs);
        let report = VectorFitter::new(FitConfig::manual(0, 1))
            .unwrap()
            .fit(&response)
            .unwrap();

        assert!(report.rms_error < 1e-6, "rms {}", report.rms_error);
        let pole = report.model.poles()[0].value();
        assert_relative_eq!(pole.im, 2.0 * PI * 1e9, max_relative = 1e-6);
        assert_relative_eq!(pole.re, -2.0 * PI * 5e7, max_relative = 1e-6);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            VectorFitter::new(FitConfig::manual(0, 0)),
            Err(FitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_automatic_reaches_target() {
        let freqs: Vec<f64> = (1..=100).map(|k| k as f64 * 2e7).collect();
        let response = resonant_response(&freqs);
        let auto = AutoFitConfig {
            n_poles_init_real: 0,
            n_poles_init_cmplx: 1,
            n_poles_add: 1,
            model_order_max: 6,
            target_error: 1e-3,
            ..Default::default()
        };
        let report = VectorFitter::new(FitConfig::automatic(auto))
            .unwrap()
            .fit(&response)
            .unwrap();

        assert!(!report.steps.is_empty());
        assert!(report.rms_error <= 1e-3);
        assert!(report.model.model_order() <= 6);
    }

    #[test]
    fn test_spare_poles_fit_minimum_norm() {
        let freqs: Vec<f64> = (1..=100).map(|k| k as f64 * 2e7).collect();
        let response = resonant_response(&freqs);
        for n_cmplx in 1..=4 {
            let report = VectorFitter::new(FitConfig::manual(0, n_cmplx))
                .unwrap()
                .fit(&response)
                .unwrap_or_else(|e| panic!("{} pairs: {}", n_cmplx, e));
            assert!(report.rms_error < 1e-6, "{} pairs: rms {}", n_cmplx, report.rms_error);
            assert!(report.model.is_stable());
        }
    }

    #[test]
    fn test_ill_conditioned_residue_fit_diverges() {
        let freqs: Vec<f64> = (1..=100).map(|k| k as f64 * 2e7).collect();
        let response = resonant_response(&freqs);
        let config = FitConfig {
            max_condition: 1.01,
            ..FitConfig::manual(0, 1)
        };
        match fit(&response, &config) {
            Err(err @ FitError::FittingDiverged { .. }) => {
                assert!(err.to_string().contains("in residue fit"), "{}", err);
                let FitError::FittingDiverged {
                    iteration,
                    n_poles,
                    condition,
                    ..
                } = err
                else {
                    unreachable!()
                };
                assert_eq!(iteration, None);
                assert_eq!(n_poles, 2);
                assert!(condition > 1.01);
            }
            other => panic!("expected divergence, got {:?}", other.map(|m| m.model_order())),
        }
    }

    #[test]
    fn test_automatic_skips_diverged_budget() {
        // 12 samples: the 11-pair budget is nearly square and cannot meet the bound
        let freqs: Vec<f64> = (1..=12).map(|k| k as f64 * 1.6e8).collect();
        let response = resonant_response(&freqs);
        let auto = AutoFitConfig {
            n_poles_init_real: 0,
            n_poles_init_cmplx: 1,
            n_poles_add: 5,
            model_order_max: 22,
            target_error: 1e-30,
            ..Default::default()
        };
        let config = FitConfig {
            max_condition: 1e3,
            ..FitConfig::automatic(auto)
        };
        let report = VectorFitter::new(config).unwrap().fit(&response).unwrap();

        let budgets: Vec<(usize, usize)> = report
            .steps
            .iter()
            .map(|step| (step.n_poles_real, step.n_poles_cmplx))
            .collect();
        assert_eq!(budgets, vec![(0, 1), (0, 6), (0, 11)]);
        assert!(
            report.steps.iter().any(|step| step.rms_error.is_none()),
            "{:?}",
            report.steps
        );
        let best = report
            .steps
            .iter()
            .filter_map(|step| step.rms_error)
            .fold(f64::INFINITY, f64::min);
        assert!(report.rms_error <= best);
        assert!(report.model.is_stable());
    }

    #[test]
    fn test_error_message_names_iteration() {
        let err = FitError::FittingDiverged {
            iteration: Some(3),
            n_poles: 6,
            condition: 1e20,
            reason: "pole relocation is ill-conditioned".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("iteration 3"));
        assert!(msg.contains("order 6"));
    }
}
