//! Fitting and passivity configuration

use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_IMAG_AXIS_TOLERANCE, DEFAULT_MAX_CONDITION, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE,
    PASSIVITY_DAMPING_FACTOR, PASSIVITY_DELTA_THRESHOLD, PASSIVITY_FREQ_MARGIN,
    PASSIVITY_MAX_ITERATIONS, PASSIVITY_N_SAMPLES,
};
use crate::config::ConfigError;
use crate::constants::DEFAULT_Z0;
use crate::network::ParameterKind;

/// Initial pole spacing type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitPoleSpacing {
    #[default]
    Linear,
    Logarithmic,
}

/// Pole budget selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FitMode {
    /// Fixed numbers of real poles and complex-conjugate pole pairs
    Manual {
        n_poles_real: usize,
        n_poles_cmplx: usize,
    },
    /// Grow the pole budget until a target error is met
    Automatic(AutoFitConfig),
}

impl Default for FitMode {
    fn default() -> Self {
        FitMode::Manual {
            n_poles_real: 2,
            n_poles_cmplx: 2,
        }
    }
}

/// Automatic order-growth settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoFitConfig {
    pub n_poles_init_real: usize,
    pub n_poles_init_cmplx: usize,
    /// Complex pole pairs added per step; the real pole count stays at
    /// `n_poles_init_real`
    pub n_poles_add: usize,
    pub model_order_max: usize,
    /// Relocation iterations for the first budget
    pub iters_start: usize,
    /// Relocation iterations for each grown budget
    pub iters_inter: usize,
    /// Relocation iterations for the final refit
    pub iters_final: usize,
    /// Normalized RMS error at which growth stops
    pub target_error: f64,
}

impl Default for AutoFitConfig {
    fn default() -> Self {
        Self {
            n_poles_init_real: 3,
            n_poles_init_cmplx: 3,
            n_poles_add: 3,
            model_order_max: 100,
            iters_start: 3,
            iters_inter: 3,
            iters_final: 5,
            target_error: 1e-2,
        }
    }
}

/// Vector fitting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub mode: FitMode,
    pub init_pole_spacing: InitPoleSpacing,
    /// Parameter kind fitted; the response is converted when it differs
    pub parameter_kind: ParameterKind,
    pub fit_constant: bool,
    pub fit_proportional: bool,
    /// Relocation iteration cap in manual mode
    pub max_iterations: usize,
    /// Relative change in the largest singular value treated as converged
    pub convergence_tol: f64,
    /// Bound on the effective condition number of every solve
    pub max_condition: f64,
    /// Band around the imaginary axis for relocated poles (normalized units)
    pub imag_axis_tolerance: f64,
    /// Reference impedance for S/Z conversion (Ohm)
    pub z0: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            mode: FitMode::default(),
            init_pole_spacing: InitPoleSpacing::Linear,
            parameter_kind: ParameterKind::S,
            fit_constant: true,
            fit_proportional: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_tol: DEFAULT_TOLERANCE,
            max_condition: DEFAULT_MAX_CONDITION,
            imag_axis_tolerance: DEFAULT_IMAG_AXIS_TOLERANCE,
            z0: DEFAULT_Z0,
        }
    }
}

impl FitConfig {
    /// Manual-mode configuration with the given pole counts
    pub fn manual(n_poles_real: usize, n_poles_cmplx: usize) -> Self {
        Self {
            mode: FitMode::Manual {
                n_poles_real,
                n_poles_cmplx,
            },
            ..Default::default()
        }
    }

    /// Automatic-mode configuration
    pub fn automatic(auto: AutoFitConfig) -> Self {
        Self {
            mode: FitMode::Automatic(auto),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.mode {
            FitMode::Manual {
                n_poles_real,
                n_poles_cmplx,
            } => {
                if n_poles_real + n_poles_cmplx == 0 {
                    return Err(invalid("fit.mode", "at least one pole is required"));
                }
            }
            FitMode::Automatic(auto) => auto.validate()?,
        }
        if self.max_iterations == 0 {
            return Err(invalid("fit.max_iterations", "must be at least 1"));
        }
        if !(self.convergence_tol > 0.0) {
            return Err(invalid("fit.convergence_tol", "must be positive"));
        }
        if !(self.max_condition > 1.0) {
            return Err(invalid("fit.max_condition", "must exceed 1"));
        }
        if !(self.imag_axis_tolerance > 0.0 && self.imag_axis_tolerance < 1.0) {
            return Err(invalid("fit.imag_axis_tolerance", "must lie in (0, 1)"));
        }
        if !(self.z0.is_finite() && self.z0 > 0.0) {
            return Err(invalid("fit.z0", "must be positive and finite"));
        }
        Ok(())
    }
}

impl AutoFitConfig {
    /// Model order of the initial budget
    pub fn initial_order(&self) -> usize {
        self.n_poles_init_real + 2 * self.n_poles_init_cmplx
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_order() == 0 {
            return Err(invalid("fit.auto", "initial pole budget is empty"));
        }
        if self.initial_order() > self.model_order_max {
            return Err(invalid(
                "fit.auto.model_order_max",
                format!(
                    "initial order {} exceeds maximum {}",
                    self.initial_order(),
                    self.model_order_max
                ),
            ));
        }
        if self.iters_start == 0 || self.iters_inter == 0 || self.iters_final == 0 {
            return Err(invalid("fit.auto.iters", "iteration counts must be at least 1"));
        }
        if !(self.target_error > 0.0) {
            return Err(invalid("fit.auto.target_error", "must be positive"));
        }
        Ok(())
    }
}

/// Passivity assessment and enforcement configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassivityConfig {
    /// Run enforcement after fitting (pipeline only)
    pub enabled: bool,
    /// Points per evaluation sweep
    pub n_samples: usize,
    /// Evaluation extends to `freq_margin * f_max`
    pub freq_margin: f64,
    pub max_iterations: usize,
    /// Singular values are pulled down to this level
    pub delta_threshold: f64,
    /// Fraction of the fitted correction applied per iteration
    pub damping: f64,
}

impl Default for PassivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_samples: PASSIVITY_N_SAMPLES,
            freq_margin: PASSIVITY_FREQ_MARGIN,
            max_iterations: PASSIVITY_MAX_ITERATIONS,
            delta_threshold: PASSIVITY_DELTA_THRESHOLD,
            damping: PASSIVITY_DAMPING_FACTOR,
        }
    }
}

impl PassivityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_samples < 2 {
            return Err(invalid("passivity.n_samples", "must be at least 2"));
        }
        if !(self.freq_margin >= 1.0) {
            return Err(invalid("passivity.freq_margin", "must be at least 1"));
        }
        if !(self.delta_threshold > 0.0 && self.delta_threshold < 1.0) {
            return Err(invalid("passivity.delta_threshold", "must lie in (0, 1)"));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(invalid("passivity.damping", "must lie in (0, 1]"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
