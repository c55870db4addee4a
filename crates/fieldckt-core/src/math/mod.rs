//! Mathematical functions module
//!
//! Dense linear algebra for the fitting engine and network parameter
//! transforms.

pub mod linalg;
pub mod transforms;

pub use transforms::*;
