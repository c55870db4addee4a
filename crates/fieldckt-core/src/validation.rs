//! Validation of fitted models against samples and simulator output

use ndarray::Array2;
use num_complex::Complex64;
use serde::Serialize;

use crate::math::transforms::{s2z, z2s};
use crate::network::{NetworkResponse, ParameterKind, ResponseError};
use crate::vector_fitting::PoleResidueModel;

/// Errors raised while comparing responses
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("length mismatch: {what} has {found} values, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("incident wave vanishes at point {index}")]
    ZeroIncidentWave { index: usize },

    #[error("port {port} out of range for a {nports}-port model")]
    PortOutOfRange { port: usize, nports: usize },

    #[error("cannot convert model to S-parameters at {frequency} Hz")]
    Conversion { frequency: f64 },

    #[error("invalid reference impedance {0}")]
    InvalidReferenceImpedance(f64),

    #[error(transparent)]
    Response(#[from] ResponseError),
}

/// Error metrics between two traces
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorMetrics {
    /// RMS of the absolute difference, normalized by the mean reference
    /// magnitude (absolute when that mean is zero)
    pub rms_error: f64,
    /// Largest absolute difference
    pub max_error: f64,
    /// Frequency of `max_error` (Hz)
    pub worst_frequency: f64,
    pub points: usize,
}

/// Compare a trace against a reference sampled at the same frequencies
pub fn compare(
    frequencies: &[f64],
    actual: &[Complex64],
    reference: &[Complex64],
) -> Result<ErrorMetrics, ValidationError> {
    let n = frequencies.len();
    for (what, len) in [("actual", actual.len()), ("reference", reference.len())] {
        if len != n {
            return Err(ValidationError::LengthMismatch {
                what,
                expected: n,
                found: len,
            });
        }
    }

    let mut sum_sq = 0.0;
    let mut mag_sum = 0.0;
    let mut max_error = 0.0;
    let mut worst_frequency = frequencies.first().copied().unwrap_or(0.0);
    for ((&f, a), r) in frequencies.iter().zip(actual).zip(reference) {
        let e = (a - r).norm();
        sum_sq += e * e;
        mag_sum += r.norm();
        if e > max_error {
            max_error = e;
            worst_frequency = f;
        }
    }

    let rms_error = if n == 0 {
        0.0
    } else {
        let rms = (sum_sq / n as f64).sqrt();
        let mean_mag = mag_sum / n as f64;
        if mean_mag > 0.0 {
            rms / mean_mag
        } else {
            rms
        }
    };

    Ok(ErrorMetrics {
        rms_error,
        max_error,
        worst_frequency,
        points: n,
    })
}

/// Per-entry and overall comparison of a model against its source samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelValidation {
    pub kind: ParameterKind,
    pub overall: ErrorMetrics,
    /// Metrics of entry (i, j) at index `i * nports + j`
    pub entries: Vec<ErrorMetrics>,
    pub nports: usize,
}

impl ModelValidation {
    pub fn entry(&self, i: usize, j: usize) -> Option<&ErrorMetrics> {
        if i >= self.nports || j >= self.nports {
            return None;
        }
        self.entries.get(i * self.nports + j)
    }
}

/// Compare the model response against samples, in the model's parameter kind
pub fn validate_model(
    model: &PoleResidueModel,
    response: &NetworkResponse,
) -> Result<ModelValidation, ValidationError> {
    let target = response.to_kind(model.kind(), model.z0())?;
    let n = target.nports();
    if model.nports() != n {
        return Err(ValidationError::LengthMismatch {
            what: "model ports",
            expected: n,
            found: model.nports(),
        });
    }
    let freqs = target.frequencies();

    let mut all_actual = Vec::with_capacity(freqs.len() * n * n);
    let mut all_reference = Vec::with_capacity(freqs.len() * n * n);
    let mut all_freqs = Vec::with_capacity(freqs.len() * n * n);
    let mut entries = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let actual = model
                .response(i, j, &freqs)
                .ok_or(ValidationError::PortOutOfRange { port: i, nports: n })?
                .to_vec();
            let reference = target.entry(i, j).to_vec();
            entries.push(compare(&freqs, &actual, &reference)?);
            all_actual.extend(actual);
            all_reference.extend(reference);
            all_freqs.extend_from_slice(&freqs);
        }
    }

    Ok(ModelValidation {
        kind: model.kind(),
        overall: compare(&all_freqs, &all_actual, &all_reference)?,
        entries,
        nports: n,
    })
}

/// Recover S_kk of a driven port from its voltage and inflowing current
///
/// With power waves `a = (V + z0 I) / (2 sqrt(z0))` and
/// `b = (V - z0 I) / (2 sqrt(z0))`, returns `b / a` per point.
pub fn s_from_port_waves(
    voltage: &[Complex64],
    current: &[Complex64],
    z0: f64,
) -> Result<Vec<Complex64>, ValidationError> {
    if !(z0.is_finite() && z0 > 0.0) {
        return Err(ValidationError::InvalidReferenceImpedance(z0));
    }
    if voltage.len() != current.len() {
        return Err(ValidationError::LengthMismatch {
            what: "current",
            expected: voltage.len(),
            found: current.len(),
        });
    }
    let k = 1.0 / (2.0 * z0.sqrt());
    voltage
        .iter()
        .zip(current)
        .enumerate()
        .map(|(index, (&v, &i))| {
            let a = (v + i * z0) * k;
            let b = (v - i * z0) * k;
            if a.norm() <= f64::MIN_POSITIVE {
                Err(ValidationError::ZeroIncidentWave { index })
            } else {
                Ok(b / a)
            }
        })
        .collect()
}

/// Model S-matrix at `freq` referenced to `z0`
///
/// Z models are converted; S models fitted at a different reference
/// impedance are renormalized through Z.
pub fn model_s_matrix(
    model: &PoleResidueModel,
    freq: f64,
    z0: f64,
) -> Result<Array2<Complex64>, ValidationError> {
    let h = model.evaluate(freq);
    let n = model.nports();
    let conversion = ValidationError::Conversion { frequency: freq };
    let z = match model.kind() {
        ParameterKind::S if (model.z0() - z0).abs() <= f64::EPSILON * z0 => return Ok(h),
        ParameterKind::S => s2z(&h, &vec![model.z0(); n]).ok_or(conversion.clone())?,
        ParameterKind::Z => h,
    };
    z2s(&z, &vec![z0; n]).ok_or(conversion)
}

/// Model S_kk over a sweep, referenced to `z0`
pub fn model_reflection(
    model: &PoleResidueModel,
    port: usize,
    freqs: &[f64],
    z0: f64,
) -> Result<Vec<Complex64>, ValidationError> {
    let nports = model.nports();
    if port >= nports {
        return Err(ValidationError::PortOutOfRange { port, nports });
    }
    freqs
        .iter()
        .map(|&f| model_s_matrix(model, f, z0).map(|s| s[[port, port]]))
        .collect()
}
