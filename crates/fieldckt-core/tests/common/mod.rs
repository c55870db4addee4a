//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array3;
use num_complex::Complex64;

use fieldckt_core::network::{NetworkResponse, ParameterKind};

/// A complex pole pair with a real residue, plus a constant
pub struct Resonance {
    pub f_res: f64,
    pub damping: f64,
    pub residue: f64,
}

impl Resonance {
    pub fn pole(&self) -> Complex64 {
        Complex64::new(-2.0 * PI * self.damping, 2.0 * PI * self.f_res)
    }

    pub fn at(&self, freq: f64) -> Complex64 {
        let s = Complex64::new(0.0, 2.0 * PI * freq);
        let p = self.pole();
        let r = Complex64::new(2.0 * PI * self.residue, 0.0);
        r / (s - p) + r / (s - p.conj())
    }
}

/// Linear grid `step, 2*step, ..., n*step`
pub fn grid(step: f64, n: usize) -> Vec<f64> {
    (1..=n).map(|k| k as f64 * step).collect()
}

/// 1-port response built from resonances plus a constant
pub fn one_port(freqs: &[f64], resonances: &[Resonance], constant: f64) -> NetworkResponse {
    let data = Array3::from_shape_fn((freqs.len(), 1, 1), |(f, _, _)| {
        resonances
            .iter()
            .map(|r| r.at(freqs[f]))
            .fold(Complex64::new(constant, 0.0), |acc, v| acc + v)
    });
    NetworkResponse::from_arrays(freqs, &data, ParameterKind::S).unwrap()
}

/// Write one matrix file per frequency (MHz) and return the paths
pub fn write_matrix_files(
    dir: &Path,
    extension: &str,
    freqs_mhz: &[f64],
    matrix: impl Fn(f64) -> Vec<Vec<Complex64>>,
) -> Vec<PathBuf> {
    freqs_mhz
        .iter()
        .enumerate()
        .map(|(idx, &f)| {
            let m = matrix(f);
            let mut text = String::from("# frequency row col re im\n");
            for (i, row) in m.iter().enumerate() {
                for (j, v) in row.iter().enumerate() {
                    text.push_str(&format!("{} {} {} {:e} {:e}\n", f, i + 1, j + 1, v.re, v.im));
                }
            }
            let path = dir.join(format!("sample_{:03}.{}", idx, extension));
            fs::write(&path, text).unwrap();
            path
        })
        .collect()
}
