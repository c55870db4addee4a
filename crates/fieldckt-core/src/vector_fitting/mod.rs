//! Vector Fitting algorithm for rational approximation of frequency responses
//!
//! This module provides a Rust implementation of the Vector Fitting algorithm
//! for approximating frequency domain responses with rational functions in
//! pole-residue form, together with passivity assessment and enforcement.
//!
//! # References
//!
//! - B. Gustavsen, A. Semlyen, "Rational Approximation of Frequency Domain Responses
//!   by Vector Fitting", IEEE Trans. Power Delivery, vol. 14, no. 3, 1999
//! - B. Gustavsen, "Improving the Pole Relocating Properties of Vector Fitting",
//!   IEEE Trans. Power Delivery, vol. 21, no. 3, 2006
//! - D. Deschrijver et al., "Macromodeling of Multiport Systems Using a Fast
//!   Implementation of the Vector Fitting Method", IEEE MWCL, vol. 18, no. 6, 2008

pub mod algorithms;
mod config;
pub mod constants;
mod core;
mod model;
pub mod passivity;
mod poles;

pub use self::core::{fit, AutoFitStep, FitError, FitReport, VectorFitter};
pub use config::{AutoFitConfig, FitConfig, FitMode, InitPoleSpacing, PassivityConfig};
pub use model::{ModelError, PoleResidueModel};
pub use passivity::{
    enforce_passivity, passivity_test, PassivityEnforceResult, PassivityTestResult,
};
pub use poles::{init_poles, model_order, poles_from_eigenvalues, Pole};
