//! fieldckt-core: equivalent circuits from field-solver frequency responses
//!
//! Turns per-frequency Z or S matrices exported by an electromagnetic field
//! solver into a rational pole-residue model (Vector Fitting), enforces
//! passivity, synthesizes a SPICE subcircuit and checks it with ngspice.
//!
//! ## Modules
//!
//! - `frequency` - Frequency units and sweeps
//! - `network` - Ordered frequency samples (`NetworkResponse`)
//! - `loader` - `.ztm` / `.sparameters` matrix files
//! - `math` - Linear algebra and S/Z transforms
//! - `vector_fitting` - Vector Fitting and passivity enforcement
//! - `synthesis` - SPICE subcircuit synthesis and validation testbench
//! - `ngspice` - ngspice shared-library driver
//! - `validation` - Model versus sample / simulation metrics
//! - `pipeline` - End-to-end orchestration
//! - `config` - JSON pipeline configuration
//! - `logging` - `tracing` subscriber setup

pub mod config;
pub mod constants;
pub mod error;
pub mod frequency;
pub mod loader;
pub mod logging;
pub mod math;
pub mod network;
pub mod ngspice;
pub mod pipeline;
pub mod synthesis;
pub mod validation;
pub mod vector_fitting;

pub use config::{ConfigError, PipelineConfig};
pub use error::{Error, Result};
pub use frequency::{FrequencyUnit, SweepType};
pub use loader::{load_files, LoaderConfig};
pub use network::{FrequencySample, NetworkResponse, ParameterKind};
pub use ngspice::{NgspiceEngine, SimulationSession};
pub use pipeline::{Pipeline, PipelineOutput, SimulationReport};
pub use synthesis::{synthesize, CircuitNetlist};
pub use vector_fitting::{enforce_passivity, fit, FitConfig, PoleResidueModel, VectorFitter};
