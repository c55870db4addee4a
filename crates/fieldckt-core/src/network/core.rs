//! Core NetworkResponse struct and constructors
//!
//! Contains the fundamental sample containers and the invariants they
//! enforce: square matrices, constant port count and parameter kind,
//! strictly increasing frequency.

use std::fmt;

use ndarray::{Array1, Array2, Array3};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Network response errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseError {
    #[error("network response has no samples")]
    Empty,

    #[error("matrix at {frequency} Hz is {rows}x{cols}, expected a square matrix")]
    NonSquare {
        frequency: f64,
        rows: usize,
        cols: usize,
    },

    #[error("sample at {frequency} Hz has {found} ports, expected {expected}")]
    PortCountMismatch {
        frequency: f64,
        expected: usize,
        found: usize,
    },

    #[error("sample at {frequency} Hz holds {found} parameters, expected {expected}")]
    KindMismatch {
        frequency: f64,
        expected: ParameterKind,
        found: ParameterKind,
    },

    #[error("frequency {frequency} Hz does not follow {previous} Hz in strictly increasing order")]
    NotIncreasing { frequency: f64, previous: f64 },

    #[error("invalid frequency value {0} Hz")]
    InvalidFrequency(f64),

    #[error("parameter conversion is singular at {frequency} Hz")]
    SingularConversion { frequency: f64 },

    #[error("reference impedance must be positive and finite, got {0}")]
    InvalidReferenceImpedance(f64),

    #[error("{frequencies} frequencies given for {samples} matrices")]
    LengthMismatch { frequencies: usize, samples: usize },
}

/// Network parameter kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Scattering parameters
    #[default]
    S,
    /// Impedance parameters
    Z,
}

impl ParameterKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "S" => Some(ParameterKind::S),
            "Z" => Some(ParameterKind::Z),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKind::S => write!(f, "S"),
            ParameterKind::Z => write!(f, "Z"),
        }
    }
}

/// One (frequency, N x N matrix) pair
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySample {
    frequency_hz: f64,
    matrix: Array2<Complex64>,
    parameter_kind: ParameterKind,
}

impl FrequencySample {
    /// Create a sample, validating that the matrix is square and the
    /// frequency is finite and non-negative
    pub fn new(
        frequency_hz: f64,
        matrix: Array2<Complex64>,
        parameter_kind: ParameterKind,
    ) -> Result<Self, ResponseError> {
        if !frequency_hz.is_finite() || frequency_hz < 0.0 {
            return Err(ResponseError::InvalidFrequency(frequency_hz));
        }
        let (rows, cols) = matrix.dim();
        if rows != cols || rows == 0 {
            return Err(ResponseError::NonSquare {
                frequency: frequency_hz,
                rows,
                cols,
            });
        }
        Ok(Self {
            frequency_hz,
            matrix,
            parameter_kind,
        })
    }

    #[inline]
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    #[inline]
    pub fn matrix(&self) -> &Array2<Complex64> {
        &self.matrix
    }

    #[inline]
    pub fn parameter_kind(&self) -> ParameterKind {
        self.parameter_kind
    }

    #[inline]
    pub fn nports(&self) -> usize {
        self.matrix.nrows()
    }
}

/// An ordered, validated sequence of frequency samples
///
/// Frequencies are strictly increasing; port count and parameter kind are
/// the same for every sample. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkResponse {
    samples: Vec<FrequencySample>,
    nports: usize,
    kind: ParameterKind,
}

impl NetworkResponse {
    /// Assemble a response from samples already sorted by frequency
    pub fn new(samples: Vec<FrequencySample>) -> Result<Self, ResponseError> {
        let first = samples.first().ok_or(ResponseError::Empty)?;
        let nports = first.nports();
        let kind = first.parameter_kind();

        for sample in &samples {
            if sample.nports() != nports {
                return Err(ResponseError::PortCountMismatch {
                    frequency: sample.frequency_hz(),
                    expected: nports,
                    found: sample.nports(),
                });
            }
            if sample.parameter_kind() != kind {
                return Err(ResponseError::KindMismatch {
                    frequency: sample.frequency_hz(),
                    expected: kind,
                    found: sample.parameter_kind(),
                });
            }
        }

        for pair in samples.windows(2) {
            if pair[1].frequency_hz() <= pair[0].frequency_hz() {
                return Err(ResponseError::NotIncreasing {
                    frequency: pair[1].frequency_hz(),
                    previous: pair[0].frequency_hz(),
                });
            }
        }

        Ok(Self {
            samples,
            nports,
            kind,
        })
    }

    /// Create from a frequency vector and a [nfreq, nports, nports] array
    pub fn from_arrays(
        frequencies: &[f64],
        data: &Array3<Complex64>,
        kind: ParameterKind,
    ) -> Result<Self, ResponseError> {
        let (nfreq, rows, cols) = data.dim();
        if nfreq != frequencies.len() {
            return Err(ResponseError::LengthMismatch {
                frequencies: frequencies.len(),
                samples: nfreq,
            });
        }
        let samples = frequencies
            .iter()
            .enumerate()
            .map(|(f, &freq)| {
                let matrix = Array2::from_shape_fn((rows, cols), |(i, j)| data[[f, i, j]]);
                FrequencySample::new(freq, matrix, kind)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(samples)
    }

    #[inline]
    pub fn samples(&self) -> &[FrequencySample] {
        &self.samples
    }

    #[inline]
    pub fn nfreq(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn nports(&self) -> usize {
        self.nports
    }

    #[inline]
    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// Frequency vector in Hz
    pub fn frequencies(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.frequency_hz()).collect()
    }

    /// Response of matrix entry (i, j) across all frequencies
    pub fn entry(&self, i: usize, j: usize) -> Array1<Complex64> {
        self.samples.iter().map(|s| s.matrix()[[i, j]]).collect()
    }

    /// All samples as a [nfreq, nports, nports] array
    pub fn to_array3(&self) -> Array3<Complex64> {
        let n = self.nports;
        Array3::from_shape_fn((self.nfreq(), n, n), |(f, i, j)| {
            self.samples[f].matrix()[[i, j]]
        })
    }

    /// Mean magnitude over every entry and frequency
    pub fn mean_magnitude(&self) -> f64 {
        let count = self.nfreq() * self.nports * self.nports;
        if count == 0 {
            return 0.0;
        }
        let total: f64 = self
            .samples
            .iter()
            .flat_map(|s| s.matrix().iter())
            .map(|c| c.norm())
            .sum();
        total / count as f64
    }
}
