//! Pipeline configuration
//!
//! Every component has its own plain config struct with a `Default`; this
//! module aggregates them into a `PipelineConfig` that can be read from JSON.
//! Missing fields take their defaults:
//!
//! ```json
//! {
//!   "loader": { "frequency_unit": "ghz" },
//!   "fit": { "mode": { "type": "automatic", "target_error": 0.005 } },
//!   "synthesis": { "subckt_name": "antenna" }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::loader::LoaderConfig;
use crate::logging::LogConfig;
use crate::ngspice::SimulationConfig;
use crate::synthesis::SynthesisConfig;
use crate::vector_fitting::{FitConfig, PassivityConfig};

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration of a complete load, fit, synthesize and simulate run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub fit: FitConfig,
    pub passivity: PassivityConfig,
    pub synthesis: SynthesisConfig,
    pub simulation: SimulationConfig,
    pub log: LogConfig,
}

impl PipelineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loader.validate()?;
        self.fit.validate()?;
        self.passivity.validate()?;
        self.synthesis.validate()?;
        self.simulation.validate()?;
        self.log.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::FrequencyUnit;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = PipelineConfig::from_json_str(
            r#"{"loader": {"frequency_unit": "ghz"}, "synthesis": {"subckt_name": "dut"}}"#,
        )
        .unwrap();
        assert_eq!(config.loader.frequency_unit, FrequencyUnit::GHz);
        assert_eq!(config.synthesis.subckt_name, "dut");
        assert_eq!(config.fit, FitConfig::default());
    }

    #[test]
    fn test_automatic_mode_json() {
        let config = PipelineConfig::from_json_str(
            r#"{"fit": {"mode": {"type": "automatic", "target_error": 0.005}}}"#,
        )
        .unwrap();
        match config.fit.mode {
            crate::vector_fitting::FitMode::Automatic(auto) => {
                assert_eq!(auto.target_error, 0.005);
                assert_eq!(auto.model_order_max, 100);
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig::default();
        let text = config.to_json().unwrap();
        assert_eq!(PipelineConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_values() {
        let err = PipelineConfig::from_json_str(r#"{"simulation": {"z0": -1.0}}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "simulation.z0",
                ..
            }
        ));
        assert!(matches!(
            PipelineConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"passivity": {{"enabled": false}}}}"#).unwrap();
        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert!(!config.passivity.enabled);

        assert!(matches!(
            PipelineConfig::from_json_file("/nonexistent/config.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
