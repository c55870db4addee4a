//! Network module - ordered frequency-domain network samples
//!
//! Provides the `FrequencySample` and `NetworkResponse` containers handed
//! from the loader to the fitting engine, plus S/Z parameter conversion.

mod core;
mod params;

pub use self::core::{FrequencySample, NetworkResponse, ParameterKind, ResponseError};
