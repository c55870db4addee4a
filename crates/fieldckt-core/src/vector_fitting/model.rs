//! Fitted pole-residue model and its evaluation
//!
//! H(s) = D + s*E + sum_k [ R_k / (s - p_k) + conj(R_k) / (s - conj(p_k)) ]
//! where real poles contribute a single term.

use ndarray::{Array1, Array2, Array3};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::poles::{model_order, Pole};
use crate::network::{NetworkResponse, ParameterKind, ResponseError};

/// Errors constructing a model from parts
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("residues have shape {found:?}, expected [{n_poles}, n, n]")]
    ResidueShape {
        found: (usize, usize, usize),
        n_poles: usize,
    },

    #[error("{term} term has shape {found:?}, expected ({n}, {n})")]
    TermShape {
        term: &'static str,
        found: (usize, usize),
        n: usize,
    },

    #[error("real pole {index} has a complex residue")]
    ComplexResidueOnRealPole { index: usize },
}

/// Fitted rational model in pole-residue form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoleResidueModel {
    poles: Vec<Pole>,
    /// Residue matrices [n_poles, nports, nports]
    residues: Array3<Complex64>,
    /// Constant term D
    constant: Option<Array2<f64>>,
    /// Proportional term E
    proportional: Option<Array2<f64>>,
    kind: ParameterKind,
    z0: f64,
    /// Fitted frequency band (Hz)
    band: (f64, f64),
}

impl PoleResidueModel {
    /// Assemble a model, validating that every part agrees on the port count
    pub fn new(
        poles: Vec<Pole>,
        residues: Array3<Complex64>,
        constant: Option<Array2<f64>>,
        proportional: Option<Array2<f64>>,
        kind: ParameterKind,
        z0: f64,
        band: (f64, f64),
    ) -> Result<Self, ModelError> {
        let (n_res, rows, cols) = residues.dim();
        if n_res != poles.len() || rows != cols {
            return Err(ModelError::ResidueShape {
                found: residues.dim(),
                n_poles: poles.len(),
            });
        }
        for (term, matrix) in [("constant", &constant), ("proportional", &proportional)] {
            if let Some(m) = matrix {
                if m.dim() != (rows, rows) {
                    return Err(ModelError::TermShape {
                        term,
                        found: m.dim(),
                        n: rows,
                    });
                }
            }
        }
        for (k, pole) in poles.iter().enumerate() {
            if pole.is_real() && residues.slice(ndarray::s![k, .., ..]).iter().any(|r| r.im != 0.0)
            {
                return Err(ModelError::ComplexResidueOnRealPole { index: k });
            }
        }

        Ok(Self {
            poles,
            residues,
            constant,
            proportional,
            kind,
            z0,
            band,
        })
    }

    #[inline]
    pub fn poles(&self) -> &[Pole] {
        &self.poles
    }

    #[inline]
    pub fn residues(&self) -> &Array3<Complex64> {
        &self.residues
    }

    #[inline]
    pub fn constant(&self) -> Option<&Array2<f64>> {
        self.constant.as_ref()
    }

    #[inline]
    pub fn proportional(&self) -> Option<&Array2<f64>> {
        self.proportional.as_ref()
    }

    #[inline]
    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    #[inline]
    pub fn z0(&self) -> f64 {
        self.z0
    }

    #[inline]
    pub fn band(&self) -> (f64, f64) {
        self.band
    }

    #[inline]
    pub fn nports(&self) -> usize {
        self.residues.shape()[1]
    }

    /// Model order = N_real + 2 * N_complex
    pub fn model_order(&self) -> usize {
        model_order(&self.poles)
    }

    /// True when every pole has a non-positive real part
    pub fn is_stable(&self) -> bool {
        self.poles.iter().all(|p| p.value().re <= 0.0)
    }

    /// Every pole with its residue matrix, conjugate members listed explicitly
    pub fn expanded_poles(&self) -> Vec<(Complex64, Array2<Complex64>)> {
        let mut out = Vec::with_capacity(self.model_order());
        for (k, pole) in self.poles.iter().enumerate() {
            let r = self.residues.slice(ndarray::s![k, .., ..]).to_owned();
            let p = pole.value();
            if pole.is_real() {
                out.push((p, r));
            } else {
                let r_conj = r.mapv(|c| c.conj());
                out.push((p, r));
                out.push((p.conj(), r_conj));
            }
        }
        out
    }

    /// Evaluate the model matrix at complex frequency `s`
    pub fn evaluate_s(&self, s: Complex64) -> Array2<Complex64> {
        let n = self.nports();
        let mut h = Array2::<Complex64>::zeros((n, n));

        if let Some(d) = &self.constant {
            h.zip_mut_with(d, |h, &d| *h += d);
        }
        if let Some(e) = &self.proportional {
            h.zip_mut_with(e, |h, &e| *h += s * e);
        }

        for (k, pole) in self.poles.iter().enumerate() {
            let p = pole.value();
            let inv = Complex64::new(1.0, 0.0) / (s - p);
            let inv_conj = Complex64::new(1.0, 0.0) / (s - p.conj());
            for i in 0..n {
                for j in 0..n {
                    let r = self.residues[[k, i, j]];
                    h[[i, j]] += if pole.is_real() {
                        r * inv
                    } else {
                        r * inv + r.conj() * inv_conj
                    };
                }
            }
        }
        h
    }

    /// Evaluate the model matrix at a frequency in Hz
    pub fn evaluate(&self, freq: f64) -> Array2<Complex64> {
        self.evaluate_s(Complex64::new(0.0, 2.0 * PI * freq))
    }

    /// Model response of entry (i, j) at the given frequencies (Hz)
    ///
    /// Returns None if (i, j) is out of range.
    pub fn response(&self, i: usize, j: usize, freqs: &[f64]) -> Option<Array1<Complex64>> {
        let n = self.nports();
        if i >= n || j >= n {
            return None;
        }

        let d = self.constant.as_ref().map(|d| d[[i, j]]).unwrap_or(0.0);
        let e = self.proportional.as_ref().map(|e| e[[i, j]]).unwrap_or(0.0);

        Some(
            freqs
                .iter()
                .map(|&freq| {
                    let s = Complex64::new(0.0, 2.0 * PI * freq);
                    let mut h = Complex64::new(d, 0.0) + s * e;
                    for (k, pole) in self.poles.iter().enumerate() {
                        let p = pole.value();
                        let r = self.residues[[k, i, j]];
                        h += r / (s - p);
                        if !pole.is_real() {
                            h += r.conj() / (s - p.conj());
                        }
                    }
                    h
                })
                .collect(),
        )
    }

    /// Normalized RMS error against a response
    ///
    /// `sqrt(mean |model - sample|^2)` over every entry and frequency, divided
    /// by the mean sample magnitude (absolute RMS when that mean is zero).
    /// The response is converted to the model's parameter kind first.
    pub fn rms_error(&self, response: &NetworkResponse) -> Result<f64, ResponseError> {
        let target = response.to_kind(self.kind, self.z0)?;
        let (sum_sq, count) = self.error_terms(&target).fold((0.0, 0usize), |(s, c), e| {
            (s + e * e, c + 1)
        });
        if count == 0 {
            return Ok(0.0);
        }
        let rms = (sum_sq / count as f64).sqrt();
        let mean_mag = target.mean_magnitude();
        Ok(if mean_mag > 0.0 { rms / mean_mag } else { rms })
    }

    /// Largest absolute entry error against a response
    pub fn max_error(&self, response: &NetworkResponse) -> Result<f64, ResponseError> {
        let target = response.to_kind(self.kind, self.z0)?;
        Ok(self.error_terms(&target).fold(0.0, f64::max))
    }

    fn error_terms<'a>(&'a self, target: &'a NetworkResponse) -> impl Iterator<Item = f64> + 'a {
        target.samples().iter().flat_map(move |sample| {
            let h = self.evaluate(sample.frequency_hz());
            sample
                .matrix()
                .iter()
                .zip(h.into_iter())
                .map(|(t, m)| (m - t).norm())
                .collect::<Vec<_>>()
        })
    }

    /// Replace residues and constant term, keeping pole locations
    pub(crate) fn with_terms(
        &self,
        residues: Array3<Complex64>,
        constant: Option<Array2<f64>>,
    ) -> Self {
        Self {
            residues,
            constant,
            ..self.clone()
        }
    }
}
