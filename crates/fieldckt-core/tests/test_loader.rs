//! Loader tests against matrix files on disk

mod common;

use std::fs;

use approx::assert_relative_eq;
use num_complex::Complex64;

use fieldckt_core::frequency::FrequencyUnit;
use fieldckt_core::loader::{load_file, load_files, LoadError, LoaderConfig};
use fieldckt_core::network::{ParameterKind, ResponseError};

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

#[test]
fn test_load_ztm_files_out_of_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths = common::write_matrix_files(dir.path(), "ztm", &[300.0, 100.0, 200.0], |f| {
        vec![
            vec![c(50.0, f), c(1.0, 0.0)],
            vec![c(2.0, 0.0), c(25.0, -f)],
        ]
    });

    let response = load_files(&paths, &LoaderConfig::default()).unwrap();
    assert_eq!(response.kind(), ParameterKind::Z);
    assert_eq!(response.nports(), 2);
    assert_eq!(response.frequencies(), vec![100e6, 200e6, 300e6]);

    // Row-major reshape: row 1 col 2 is entry (0, 1)
    let first = response.samples()[0].matrix();
    assert_eq!(first[[0, 0]], c(50.0, 100.0));
    assert_eq!(first[[0, 1]], c(1.0, 0.0));
    assert_eq!(first[[1, 0]], c(2.0, 0.0));
    assert_eq!(first[[1, 1]], c(25.0, -100.0));
}

#[test]
fn test_frequency_unit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.sparameters");
    fs::write(&path, "1.5 1 1 0.25 -0.5\n").unwrap();

    let config = LoaderConfig {
        frequency_unit: FrequencyUnit::GHz,
        ..Default::default()
    };
    let sample = load_file(&path, &config).unwrap();
    assert_relative_eq!(sample.frequency_hz(), 1.5e9);
    assert_eq!(sample.parameter_kind(), ParameterKind::S);
    assert_eq!(sample.matrix()[[0, 0]], c(0.25, -0.5));
}

#[test]
fn test_comments_and_blank_lines_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.ztm");
    fs::write(
        &path,
        "# header\n> solver export\n\n100 1 1 50 0\n100 1 2 1 0\n100 2 1 1 0\n100 2 2 50 0\n",
    )
    .unwrap();
    let sample = load_file(&path, &LoaderConfig::default()).unwrap();
    assert_eq!(sample.nports(), 2);
}

#[test]
fn test_duplicate_frequency_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.ztm");
    let b = dir.path().join("b.ztm");
    fs::write(&a, "100 1 1 50 0\n").unwrap();
    fs::write(&b, "100 1 1 51 0\n").unwrap();

    match load_files(&[&a, &b], &LoaderConfig::default()) {
        Err(LoadError::DuplicateFrequency { frequency, .. }) => {
            assert_relative_eq!(frequency, 100e6)
        }
        other => panic!("expected duplicate frequency, got {:?}", other),
    }
}

#[test]
fn test_malformed_row_reports_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.ztm");
    fs::write(&path, "100 1 1 50 0\n100 1 2 oops 0\n").unwrap();

    match load_file(&path, &LoaderConfig::default()) {
        Err(LoadError::MalformedMatrix { line, .. }) => assert_eq!(line, Some(2)),
        other => panic!("expected malformed matrix, got {:?}", other),
    }
}

#[test]
fn test_wrong_column_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.ztm");
    fs::write(&path, "100 1 1 50\n").unwrap();
    assert!(matches!(
        load_file(&path, &LoaderConfig::default()),
        Err(LoadError::MalformedMatrix { line: Some(1), .. })
    ));
}

#[test]
fn test_non_square_row_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.ztm");
    fs::write(&path, "100 1 1 50 0\n100 1 2 1 0\n100 2 1 1 0\n").unwrap();
    assert!(matches!(
        load_file(&path, &LoaderConfig::default()),
        Err(LoadError::MalformedMatrix { line: None, .. })
    ));
}

#[test]
fn test_mixed_kinds_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let z = dir.path().join("a.ztm");
    let s = dir.path().join("b.sparameters");
    fs::write(&z, "100 1 1 50 0\n").unwrap();
    fs::write(&s, "200 1 1 0.1 0\n").unwrap();

    assert!(matches!(
        load_files(&[&z, &s], &LoaderConfig::default()),
        Err(LoadError::Assembly(ResponseError::KindMismatch { .. }))
    ));
}

#[test]
fn test_missing_file() {
    let err = load_file(
        std::path::Path::new("/nonexistent/f100.ztm"),
        &LoaderConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
    assert!(err.to_string().contains("f100.ztm"));
}
