//! Frequency units and sweep generation
//!
//! Field-solver exports carry frequencies in a display unit (MHz by default);
//! everything downstream of the loader works in Hz.

use serde::{Deserialize, Serialize};

/// Frequency unit enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyUnit {
    Hz,
    KHz,
    #[default]
    MHz,
    GHz,
    THz,
}

impl FrequencyUnit {
    /// Get the multiplier to convert to Hz
    pub fn multiplier(&self) -> f64 {
        match self {
            FrequencyUnit::Hz => 1.0,
            FrequencyUnit::KHz => 1e3,
            FrequencyUnit::MHz => 1e6,
            FrequencyUnit::GHz => 1e9,
            FrequencyUnit::THz => 1e12,
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hz" => Some(FrequencyUnit::Hz),
            "khz" => Some(FrequencyUnit::KHz),
            "mhz" => Some(FrequencyUnit::MHz),
            "ghz" => Some(FrequencyUnit::GHz),
            "thz" => Some(FrequencyUnit::THz),
            _ => None,
        }
    }

    /// Convert a value in this unit to Hz
    #[inline]
    pub fn to_hz(&self, value: f64) -> f64 {
        value * self.multiplier()
    }
}

/// Sweep type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepType {
    #[default]
    Linear,
    Log,
}

/// Generate `npoints` frequencies between `start` and `stop` (inclusive)
///
/// A single point sits at the midpoint of the range. A logarithmic sweep
/// with a non-positive endpoint falls back to linear spacing.
pub fn sweep(start: f64, stop: f64, npoints: usize, sweep_type: SweepType) -> Vec<f64> {
    match sweep_type {
        SweepType::Linear => linspace(start, stop, npoints),
        SweepType::Log => logspace(start, stop, npoints),
    }
}

fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![(start + stop) / 2.0],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + i as f64 * step).collect()
        }
    }
}

fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if start <= 0.0 || stop <= 0.0 {
        return linspace(start, stop, n);
    }
    linspace(start.ln(), stop.ln(), n)
        .into_iter()
        .map(f64::exp)
        .collect()
}
