//! Numerical constants shared across the pipeline
//!
//! Provides standardized tolerance values and defaults used by more than one
//! module. Fitting-specific knobs live in `vector_fitting::constants`.

/// Default reference impedance for S-parameter conversion and port waves (Ohm)
pub const DEFAULT_Z0: f64 = 50.0;

/// Minimum number of distinct frequencies the fitting engine accepts
pub const MIN_FIT_SAMPLES: usize = 4;

/// Relative tolerance for treating two frequencies as equal
pub const FREQ_EQ_TOL: f64 = 1e-12;
