//! Pole abstraction for Vector Fitting
//!
//! Poles are kept as a tagged list: real poles, and complex-conjugate pairs
//! stored once with positive imaginary part (the conjugate is implicit).

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::warn;

use super::config::InitPoleSpacing;
use super::constants::{COMPLEX_POLE_DAMPING_RATIO, MIN_FREQUENCY_FRACTION, REAL_POLE_TOLERANCE};
use crate::frequency::{sweep, SweepType};

/// A single real pole or a complex-conjugate pole pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Pole {
    Real { value: f64 },
    /// `value` carries the member with positive imaginary part
    Pair { value: Complex64 },
}

impl Pole {
    pub fn real(value: f64) -> Self {
        Pole::Real { value }
    }

    pub fn pair(value: Complex64) -> Self {
        Pole::Pair {
            value: Complex64::new(value.re, value.im.abs()),
        }
    }

    /// Pole location (upper member for a pair)
    #[inline]
    pub fn value(&self) -> Complex64 {
        match *self {
            Pole::Real { value } => Complex64::new(value, 0.0),
            Pole::Pair { value } => value,
        }
    }

    #[inline]
    pub fn is_real(&self) -> bool {
        matches!(self, Pole::Real { .. })
    }

    /// Number of states (basis columns) this pole contributes
    #[inline]
    pub fn order(&self) -> usize {
        match self {
            Pole::Real { .. } => 1,
            Pole::Pair { .. } => 2,
        }
    }

    /// Scale the pole location (used to undo frequency normalization)
    pub fn scaled(&self, factor: f64) -> Self {
        match *self {
            Pole::Real { value } => Pole::Real {
                value: value * factor,
            },
            Pole::Pair { value } => Pole::Pair {
                value: value * factor,
            },
        }
    }
}

/// Model order = n_real + 2 * n_pairs
#[inline]
pub fn model_order(poles: &[Pole]) -> usize {
    poles.iter().map(Pole::order).sum()
}

/// Initialize starting poles across the (normalized) frequency range
///
/// Real poles sit at `-2*pi*f`; complex pairs at `-0.01*w + j*w`.
pub fn init_poles(
    freqs: &[f64],
    n_poles_real: usize,
    n_poles_cmplx: usize,
    spacing: InitPoleSpacing,
) -> Vec<Pole> {
    if freqs.is_empty() {
        return Vec::new();
    }

    let f_min = freqs.iter().cloned().fold(f64::INFINITY, f64::min);
    let f_max = freqs.iter().cloned().fold(0.0, f64::max);

    // Poles cannot be at f=0
    let f_min = if f_min <= 0.0 {
        freqs
            .iter()
            .cloned()
            .filter(|&f| f > 0.0)
            .fold(f64::INFINITY, f64::min)
            .min(f_max)
            * MIN_FREQUENCY_FRACTION
    } else {
        f_min
    };

    let sweep_type = match spacing {
        InitPoleSpacing::Linear => SweepType::Linear,
        InitPoleSpacing::Logarithmic => SweepType::Log,
    };

    let real_freqs = sweep(f_min, f_max, n_poles_real, sweep_type);
    let cmplx_freqs = sweep(f_min, f_max, n_poles_cmplx, sweep_type);

    let mut poles = Vec::with_capacity(n_poles_real + n_poles_cmplx);
    for f in real_freqs {
        poles.push(Pole::real(-2.0 * PI * f));
    }
    for f in cmplx_freqs {
        let omega = 2.0 * PI * f;
        poles.push(Pole::pair(Complex64::new(
            -COMPLEX_POLE_DAMPING_RATIO * omega,
            omega,
        )));
    }
    poles
}

/// Convert relocation eigenvalues into a stable pole set
///
/// Eigenvalues with negligible imaginary part become real poles; of each
/// conjugate pair only the upper member is kept. A pole inside the band
/// `|Re p| <= tol * max(|p|, 1)` is placed at `-tol * max(|p|, 1)`; a pole
/// further into the right half-plane is reflected.
pub fn poles_from_eigenvalues(eigenvalues: &[Complex64], imag_axis_tolerance: f64) -> Vec<Pole> {
    let mut poles = Vec::with_capacity(eigenvalues.len());
    let mut n_flipped = 0usize;

    for ev in eigenvalues {
        let scale = ev.norm().max(1.0);
        let band = imag_axis_tolerance * scale;

        let re = if ev.re.abs() <= band {
            if ev.re > -band {
                n_flipped += 1;
            }
            -band
        } else if ev.re > 0.0 {
            n_flipped += 1;
            -ev.re
        } else {
            ev.re
        };

        if ev.im.abs() <= REAL_POLE_TOLERANCE * scale {
            poles.push(Pole::real(re));
        } else if ev.im > 0.0 {
            poles.push(Pole::pair(Complex64::new(re, ev.im)));
        }
    }

    if n_flipped > 0 {
        warn!(n_flipped, "moved unstable poles into the left half-plane");
    }

    // real poles first, then pairs by ascending imaginary part
    poles.sort_by(|a, b| match (a, b) {
        (Pole::Real { value: x }, Pole::Real { value: y }) => y.total_cmp(x),
        (Pole::Real { .. }, Pole::Pair { .. }) => std::cmp::Ordering::Less,
        (Pole::Pair { .. }, Pole::Real { .. }) => std::cmp::Ordering::Greater,
        (Pole::Pair { value: x }, Pole::Pair { value: y }) => x.im.total_cmp(&y.im),
    });
    poles
}
