//! Per-frequency matrix file parser
//!
//! Each file is a whitespace-delimited table with five columns per row:
//! frequency, row index, column index, real part, imaginary part. Rows are
//! laid out row-major, so the row count must be a perfect square N².

use std::path::Path;

use ndarray::Array2;
use num_complex::Complex64;

use super::{LoadError, LoaderConfig};
use crate::constants::FREQ_EQ_TOL;
use crate::network::{FrequencySample, ParameterKind};

/// Number of columns in every data row
pub const MATRIX_COLUMNS: usize = 5;

const COL_FREQ: usize = 0;
const COL_RE: usize = 3;
const COL_IM: usize = 4;

/// Parse one file's content into a single frequency sample
///
/// `origin` is only used to label errors.
pub fn parse_matrix_table(
    content: &str,
    origin: &Path,
    kind: ParameterKind,
    config: &LoaderConfig,
) -> Result<FrequencySample, LoadError> {
    let mut frequency: Option<f64> = None;
    let mut values: Vec<Complex64> = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line_no = line_idx + 1;
        let trimmed = line.trim();

        if trimmed.is_empty() || is_comment(line, &config.comment_markers) {
            continue;
        }

        let row = parse_row(trimmed).map_err(|reason| LoadError::MalformedMatrix {
            path: origin.to_path_buf(),
            line: Some(line_no),
            reason,
        })?;

        match frequency {
            None => frequency = Some(row[COL_FREQ]),
            Some(f) if !same_frequency(f, row[COL_FREQ]) => {
                return Err(LoadError::MultipleFrequenciesInFile {
                    path: origin.to_path_buf(),
                    first: config.frequency_unit.to_hz(f),
                    second: config.frequency_unit.to_hz(row[COL_FREQ]),
                    line: line_no,
                });
            }
            Some(_) => {}
        }

        values.push(Complex64::new(row[COL_RE], row[COL_IM]));
    }

    let frequency = frequency.ok_or_else(|| LoadError::EmptyFile {
        path: origin.to_path_buf(),
    })?;

    let n = square_size(values.len()).ok_or_else(|| LoadError::MalformedMatrix {
        path: origin.to_path_buf(),
        line: None,
        reason: format!("{} rows is not a perfect square", values.len()),
    })?;

    let matrix = Array2::from_shape_vec((n, n), values).map_err(|e| LoadError::MalformedMatrix {
        path: origin.to_path_buf(),
        line: None,
        reason: e.to_string(),
    })?;

    let frequency_hz = config.frequency_unit.to_hz(frequency);
    FrequencySample::new(frequency_hz, matrix, kind).map_err(|source| LoadError::Response {
        path: origin.to_path_buf(),
        source,
    })
}

fn is_comment(line: &str, markers: &[char]) -> bool {
    line.chars()
        .next()
        .map(|c| markers.contains(&c))
        .unwrap_or(false)
}

fn parse_row(line: &str) -> Result<[f64; MATRIX_COLUMNS], String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != MATRIX_COLUMNS {
        return Err(format!(
            "expected {} columns, found {}",
            MATRIX_COLUMNS,
            tokens.len()
        ));
    }

    let mut row = [0.0; MATRIX_COLUMNS];
    for (slot, token) in row.iter_mut().zip(tokens.iter()) {
        *slot = token
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{}'", token))?;
    }
    Ok(row)
}

fn same_frequency(a: f64, b: f64) -> bool {
    (a - b).abs() <= FREQ_EQ_TOL * a.abs().max(b.abs())
}

/// Integer square root when `rows` is a non-zero perfect square
fn square_size(rows: usize) -> Option<usize> {
    if rows == 0 {
        return None;
    }
    let n = (rows as f64).sqrt().round() as usize;
    (n * n == rows).then_some(n)
}
