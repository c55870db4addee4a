//! Network data loader
//!
//! Reads per-frequency matrix files of the recognized formats and assembles
//! them into one `NetworkResponse`, ordered by frequency.

mod matrix_file;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use matrix_file::{parse_matrix_table, MATRIX_COLUMNS};

use crate::config::ConfigError;
use crate::constants::FREQ_EQ_TOL;
use crate::frequency::FrequencyUnit;
use crate::network::{FrequencySample, NetworkResponse, ParameterKind, ResponseError};

/// Loader errors
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed matrix in {}{}: {reason}", .path.display(), .line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    MalformedMatrix {
        path: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    #[error("{} holds more than one frequency ({first} Hz and {second} Hz at line {line})", .path.display())]
    MultipleFrequenciesInFile {
        path: PathBuf,
        first: f64,
        second: f64,
        line: usize,
    },

    #[error("frequency {frequency} Hz appears in both {} and {}", .first.display(), .second.display())]
    DuplicateFrequency {
        frequency: f64,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("unsupported input format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("no data rows in {}", .path.display())]
    EmptyFile { path: PathBuf },

    #[error("no input files given")]
    NoInputs,

    #[error("invalid sample in {}: {source}", .path.display())]
    Response {
        path: PathBuf,
        #[source]
        source: ResponseError,
    },

    #[error(transparent)]
    Assembly(#[from] ResponseError),
}

/// Recognized input formats, dispatched once by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// `.ztm` impedance matrix per frequency
    ImpedanceMatrix,
    /// `.sparameters` scattering matrix per frequency
    ScatteringMatrix,
}

impl InputFormat {
    /// Determine the format from a path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("ztm") => Ok(InputFormat::ImpedanceMatrix),
            Some("sparameters") => Ok(InputFormat::ScatteringMatrix),
            _ => Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Parameter kind carried by files of this format
    pub fn parameter_kind(&self) -> ParameterKind {
        match self {
            InputFormat::ImpedanceMatrix => ParameterKind::Z,
            InputFormat::ScatteringMatrix => ParameterKind::S,
        }
    }

    /// Parse file content of this format
    pub fn parse(
        &self,
        content: &str,
        origin: &Path,
        config: &LoaderConfig,
    ) -> Result<FrequencySample, LoadError> {
        match self {
            InputFormat::ImpedanceMatrix | InputFormat::ScatteringMatrix => {
                parse_matrix_table(content, origin, self.parameter_kind(), config)
            }
        }
    }
}

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Unit of the frequency column in input files
    pub frequency_unit: FrequencyUnit,
    /// Lines starting with any of these characters are skipped
    pub comment_markers: Vec<char>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            frequency_unit: FrequencyUnit::MHz,
            comment_markers: vec!['#', '>', '.'],
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(c) = self
            .comment_markers
            .iter()
            .find(|c| c.is_ascii_digit() || c.is_whitespace() || **c == '-' || **c == '+')
        {
            return Err(ConfigError::Invalid {
                field: "loader.comment_markers",
                reason: format!("'{}' can start a data row", c),
            });
        }
        Ok(())
    }
}

/// Load a single file into one frequency sample
pub fn load_file(path: &Path, config: &LoaderConfig) -> Result<FrequencySample, LoadError> {
    let format = InputFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let sample = format.parse(&content, path, config)?;
    debug!(
        path = %path.display(),
        frequency_hz = sample.frequency_hz(),
        nports = sample.nports(),
        "loaded sample"
    );
    Ok(sample)
}

/// Load every file and assemble a frequency-ordered `NetworkResponse`
///
/// Files may be given in any order. Two files with the same frequency are an
/// error; the response is never built in that case.
pub fn load_files<P: AsRef<Path>>(
    paths: &[P],
    config: &LoaderConfig,
) -> Result<NetworkResponse, LoadError> {
    if paths.is_empty() {
        return Err(LoadError::NoInputs);
    }

    let mut loaded: Vec<(FrequencySample, PathBuf)> = paths
        .iter()
        .map(|p| {
            let path = p.as_ref();
            load_file(path, config).map(|s| (s, path.to_path_buf()))
        })
        .collect::<Result<_, _>>()?;

    loaded.sort_by(|a, b| a.0.frequency_hz().total_cmp(&b.0.frequency_hz()));

    for pair in loaded.windows(2) {
        let (f_a, f_b) = (pair[0].0.frequency_hz(), pair[1].0.frequency_hz());
        if (f_b - f_a).abs() <= FREQ_EQ_TOL * f_a.abs().max(f_b.abs()) {
            return Err(LoadError::DuplicateFrequency {
                frequency: f_a,
                first: pair[0].1.clone(),
                second: pair[1].1.clone(),
            });
        }
    }

    let response = NetworkResponse::new(loaded.into_iter().map(|(s, _)| s).collect())?;
    info!(
        nfreq = response.nfreq(),
        nports = response.nports(),
        kind = %response.kind(),
        "assembled network response"
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            InputFormat::from_path(Path::new("a/b/f100.ztm")).unwrap(),
            InputFormat::ImpedanceMatrix
        );
        assert_eq!(
            InputFormat::from_path(Path::new("X.SParameters")).unwrap(),
            InputFormat::ScatteringMatrix
        );
        assert!(matches!(
            InputFormat::from_path(Path::new("data.s2p")),
            Err(LoadError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            InputFormat::from_path(Path::new("noext")),
            Err(LoadError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_format_kinds() {
        assert_eq!(InputFormat::ImpedanceMatrix.parameter_kind(), ParameterKind::Z);
        assert_eq!(InputFormat::ScatteringMatrix.parameter_kind(), ParameterKind::S);
    }

    #[test]
    fn test_no_inputs() {
        let paths: Vec<PathBuf> = Vec::new();
        assert!(matches!(
            load_files(&paths, &LoaderConfig::default()),
            Err(LoadError::NoInputs)
        ));
    }

    #[test]
    fn test_config_validate() {
        assert!(LoaderConfig::default().validate().is_ok());
        let bad = LoaderConfig {
            comment_markers: vec!['1'],
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
