//! Native simulation driver for the ngspice shared library
//!
//! - `ffi`: dynamically loaded `libngspice` entry points and the C layouts
//!   they exchange
//! - `callbacks`: the six callbacks ngspice invokes from its own threads
//! - `engine`: the `SpiceEngine` seam between the session and the library
//! - `session`: the `SimulationSession` state machine (one active session per
//!   library instance)
//! - `vector`: owned copies of simulator result vectors

mod callbacks;
mod engine;
pub mod ffi;
mod session;
mod vector;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::constants::DEFAULT_Z0;
use crate::frequency::SweepType;

pub use callbacks::CallbackSink;
pub use engine::{SessionSlot, SpiceEngine};
pub use ffi::NgspiceEngine;
pub use session::{SessionState, SimulationSession};
pub use vector::{ResultVector, VectorData};

/// Errors raised by the simulation driver
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("ngspice shared library not found (tried: {})", .tried.join(", "))]
    LibraryNotFound { tried: Vec<String> },

    #[error("symbol {symbol} missing from ngspice library: {reason}")]
    MissingSymbol { symbol: &'static str, reason: String },

    #[error("a simulation session is already active for this library")]
    SessionAlreadyActive,

    #[error("ngspice initialization failed with code {code}")]
    InitializationFailed { code: i32 },

    #[error("circuit load failed with code {code}")]
    CircuitLoadFailed { code: i32 },

    #[error("a circuit is already loaded in this session")]
    CircuitAlreadyLoaded,

    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("command {command:?} failed with code {code}")]
    CommandFailed { command: String, code: i32 },

    #[error("vector {name:?} not found in the current plot")]
    VectorNotFound { name: String },

    #[error("vector {name:?} is malformed: {reason}")]
    MalformedVector { name: String, reason: &'static str },

    #[error("{context} contains an interior NUL byte")]
    InvalidString { context: &'static str },

    #[error("ngspice exited with status {status}")]
    EngineExited { status: i32 },

    #[error("invalid AC sweep: {0}")]
    InvalidSweep(String),
}

/// AC analysis sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcSweep {
    pub sweep_type: SweepType,
    /// Points per decade (log) or total points (linear)
    pub points: usize,
    pub start: f64,
    pub stop: f64,
}

impl Default for AcSweep {
    fn default() -> Self {
        Self {
            sweep_type: SweepType::Log,
            points: 20,
            start: 1e6,
            stop: 1e9,
        }
    }
}

impl AcSweep {
    /// Logarithmic sweep covering a band
    pub fn log(points_per_decade: usize, start: f64, stop: f64) -> Self {
        Self {
            sweep_type: SweepType::Log,
            points: points_per_decade,
            start,
            stop,
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.points == 0 {
            return Err(SimulationError::InvalidSweep("points must be at least 1".into()));
        }
        let start_ok = match self.sweep_type {
            SweepType::Log => self.start > 0.0,
            SweepType::Linear => self.start >= 0.0,
        };
        if !(start_ok && self.start.is_finite() && self.stop.is_finite() && self.stop > self.start)
        {
            return Err(SimulationError::InvalidSweep(format!(
                "invalid range {} .. {}",
                self.start, self.stop
            )));
        }
        Ok(())
    }

    /// ngspice analysis command, e.g. `ac dec 20 1e6 1e9`
    pub fn command(&self) -> String {
        let kind = match self.sweep_type {
            SweepType::Linear => "lin",
            SweepType::Log => "dec",
        };
        format!("ac {} {} {:e} {:e}", kind, self.points, self.start, self.stop)
    }
}

/// Simulation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Shared library path; platform defaults are tried when absent
    pub library_path: Option<PathBuf>,
    pub sweep: AcSweep,
    /// Zero-based port driven with `AC 1`
    pub excited_port: usize,
    pub z0: f64,
    /// Sleep between `ngSpice_running` polls; 0 spins
    pub poll_interval_us: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            sweep: AcSweep::default(),
            excited_port: 0,
            z0: DEFAULT_Z0,
            poll_interval_us: 1000,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sweep.validate().map_err(|e| ConfigError::Invalid {
            field: "simulation.sweep",
            reason: e.to_string(),
        })?;
        if !(self.z0.is_finite() && self.z0 > 0.0) {
            return Err(ConfigError::Invalid {
                field: "simulation.z0",
                reason: "must be positive and finite".into(),
            });
        }
        Ok(())
    }
}
