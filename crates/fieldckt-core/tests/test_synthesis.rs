//! Netlist synthesis from fitted models

mod common;

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;

use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Array3};
use num_complex::Complex64;

use common::{grid, one_port, Resonance};
use fieldckt_core::network::ParameterKind;
use fieldckt_core::synthesis::{
    default_port_names, parse_subckt_headers, synthesize, testbench, SynthesisError,
};
use fieldckt_core::vector_fitting::{fit, FitConfig, Pole, PoleResidueModel};

fn fitted_model() -> PoleResidueModel {
    let freqs = grid(1e7, 100);
    let response = one_port(
        &freqs,
        &[Resonance {
            f_res: 3e8,
            damping: 4e7,
            residue: 1e7,
        }],
        0.1,
    );
    fit(&response, &FitConfig::manual(1, 1)).unwrap()
}

fn z_two_port() -> PoleResidueModel {
    let mut residues = Array3::zeros((2, 2, 2));
    for i in 0..2 {
        for j in 0..2 {
            residues[[0, i, j]] = Complex64::new(1e9 * (1 + i + j) as f64, 0.0);
            residues[[1, i, j]] = Complex64::new(2e8, 5e7 * (i + j) as f64);
        }
    }
    PoleResidueModel::new(
        vec![Pole::real(-3e9), Pole::pair(Complex64::new(-1e8, 2e9))],
        residues,
        Some(Array2::from_elem((2, 2), 5.0)),
        Some(Array2::from_elem((2, 2), 1e-10)),
        ParameterKind::Z,
        50.0,
        (1e6, 1e9),
    )
    .unwrap()
}

fn stamp(a: &mut DMatrix<Complex64>, row: Option<usize>, col: Option<usize>, value: Complex64) {
    if let (Some(r), Some(c)) = (row, col) {
        a[(r, c)] += value;
    }
}

/// Port impedance matrix of a subcircuit body by modified nodal analysis
///
/// Handles the element kinds the realizations emit (R, C, L, V, G, F, E, H).
/// Column `j` holds the port voltages for a unit current into port `j`.
fn nodal_port_impedance(text: &str, ports: &[String], freq: f64) -> DMatrix<Complex64> {
    let elements: Vec<Vec<&str>> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('*') && !l.starts_with('.'))
        .map(|l| l.split_whitespace().collect())
        .collect();

    let mut nodes: HashMap<String, usize> = HashMap::new();
    let intern = |nodes: &mut HashMap<String, usize>, name: &str| {
        if name != "0" && !nodes.contains_key(name) {
            let index = nodes.len();
            nodes.insert(name.to_string(), index);
        }
    };
    for port in ports {
        intern(&mut nodes, port);
    }
    let mut branches: HashMap<&str, usize> = HashMap::new();
    for e in &elements {
        intern(&mut nodes, e[1]);
        intern(&mut nodes, e[2]);
        match e[0].as_bytes()[0] {
            b'G' => {
                intern(&mut nodes, e[3]);
                intern(&mut nodes, e[4]);
            }
            b'E' => {
                intern(&mut nodes, e[3]);
                intern(&mut nodes, e[4]);
                branches.insert(e[0], branches.len());
            }
            b'V' | b'H' => {
                branches.insert(e[0], branches.len());
            }
            _ => {}
        }
    }

    let n_nodes = nodes.len();
    let size = n_nodes + branches.len();
    let node = |name: &str| if name == "0" { None } else { Some(nodes[name]) };
    let value = |token: &str| token.parse::<f64>().unwrap();
    let one = Complex64::new(1.0, 0.0);
    let s = Complex64::new(0.0, 2.0 * PI * freq);

    let mut a = DMatrix::<Complex64>::zeros(size, size);
    for e in &elements {
        let (p, n) = (node(e[1]), node(e[2]));
        let admittance = match e[0].as_bytes()[0] {
            b'R' => Some(one / value(e[3])),
            b'C' => Some(s * value(e[3])),
            b'L' => Some(one / (s * value(e[3]))),
            _ => None,
        };
        if let Some(y) = admittance {
            stamp(&mut a, p, p, y);
            stamp(&mut a, n, n, y);
            stamp(&mut a, p, n, -y);
            stamp(&mut a, n, p, -y);
            continue;
        }

        match e[0].as_bytes()[0] {
            // Current from n+ through the source to n-
            b'G' => {
                let (cp, cn) = (node(e[3]), node(e[4]));
                let g = Complex64::new(value(e[5]), 0.0);
                stamp(&mut a, p, cp, g);
                stamp(&mut a, p, cn, -g);
                stamp(&mut a, n, cp, -g);
                stamp(&mut a, n, cn, g);
            }
            b'F' => {
                let control = Some(n_nodes + branches[e[3]]);
                let gain = Complex64::new(value(e[4]), 0.0);
                stamp(&mut a, p, control, gain);
                stamp(&mut a, n, control, -gain);
            }
            b'V' | b'E' | b'H' => {
                let b = Some(n_nodes + branches[e[0]]);
                stamp(&mut a, p, b, one);
                stamp(&mut a, n, b, -one);
                stamp(&mut a, b, p, one);
                stamp(&mut a, b, n, -one);
                match e[0].as_bytes()[0] {
                    b'E' => {
                        let gain = Complex64::new(value(e[5]), 0.0);
                        stamp(&mut a, b, node(e[3]), -gain);
                        stamp(&mut a, b, node(e[4]), gain);
                    }
                    b'H' => {
                        let control = Some(n_nodes + branches[e[3]]);
                        stamp(&mut a, b, control, -Complex64::new(value(e[4]), 0.0));
                    }
                    // Sense sources are 0 V
                    _ => {}
                }
            }
            other => panic!("unexpected element {:?}", other as char),
        }
    }

    let lu = a.lu();
    let mut z = DMatrix::<Complex64>::zeros(ports.len(), ports.len());
    for (j, port) in ports.iter().enumerate() {
        let mut rhs = DVector::<Complex64>::zeros(size);
        rhs[nodes[port.as_str()]] = one;
        let x = lu.solve(&rhs).expect("singular nodal matrix");
        for (i, other) in ports.iter().enumerate() {
            z[(i, j)] = x[nodes[other.as_str()]];
        }
    }
    z
}

#[test]
fn test_synthesis_is_deterministic() {
    let model = fitted_model();
    let ports = default_port_names(1);
    let a = synthesize(&model, "antenna", &ports).unwrap();
    let b = synthesize(&model, "antenna", &ports).unwrap();
    assert_eq!(a.text(), b.text());

    let z = z_two_port();
    let ports = vec!["in".to_string(), "out".to_string()];
    assert_eq!(
        synthesize(&z, "zdut", &ports).unwrap().text(),
        synthesize(&z, "zdut", &ports).unwrap().text()
    );
}

#[test]
fn test_header_matches_ports() {
    for (model, name, ports) in [
        (fitted_model(), "s_equivalent", default_port_names(1)),
        (z_two_port(), "zdut", vec!["in".to_string(), "out".to_string()]),
    ] {
        let netlist = synthesize(&model, name, &ports).unwrap();
        let headers = parse_subckt_headers(netlist.text());
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].name, name);
        assert_eq!(headers[0].ports, ports);
        assert_eq!(netlist.lines().last(), Some(format!(".ENDS {}", name).as_str()));
    }
}

#[test]
fn test_port_count_mismatch() {
    let err = synthesize(&z_two_port(), "zdut", &default_port_names(3)).unwrap_err();
    assert!(matches!(
        err,
        SynthesisError::PortCount {
            expected: 2,
            found: 3
        }
    ));
}

#[test]
fn test_write_and_reread() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.cir");
    let netlist = synthesize(&fitted_model(), "antenna", &default_port_names(1)).unwrap();
    netlist.write_to(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text, netlist.text());
    assert_eq!(parse_subckt_headers(&text)[0].name, "antenna");
}

#[test]
fn test_testbench_wraps_subcircuit() {
    let netlist = synthesize(&z_two_port(), "zdut", &default_port_names(2)).unwrap();
    let bench = testbench(&netlist, 0, 50.0).unwrap();

    assert!(bench.text().contains(netlist.text()));
    assert!(bench.lines().any(|l| l == "X1 port1 port2 zdut"));
    assert!(bench.lines().any(|l| l == "V1 src1 0 DC 0 AC 1"));
    assert!(bench.lines().any(|l| l == "V2 src2 0 DC 0 AC 0"));
    assert_eq!(bench.lines().last(), Some(".end"));
}

#[test]
fn test_nodal_solution_matches_model() {
    // S 1-port: reflection seen from a unit current drive
    let model = fitted_model();
    let ports = default_port_names(1);
    let netlist = synthesize(&model, "antenna", &ports).unwrap();
    let z0 = model.z0();
    for freq in [1e7, 1.5e8, 3e8, 6e8, 1e9] {
        let v = nodal_port_impedance(netlist.text(), &ports, freq)[(0, 0)];
        let s11 = (v - z0) / (v + z0);
        let expected = model.evaluate(freq)[[0, 0]];
        assert!((s11 - expected).norm() < 1e-6, "{} Hz: {} vs {}", freq, s11, expected);
    }

    // Z 2-port with constant and proportional terms
    let model = z_two_port();
    let ports = vec!["in".to_string(), "out".to_string()];
    let netlist = synthesize(&model, "zdut", &ports).unwrap();
    for freq in [1e6, 1e8, 3.183e8, 1e9] {
        let z = nodal_port_impedance(netlist.text(), &ports, freq);
        let expected = model.evaluate(freq);
        let scale = expected.iter().map(|v| v.norm()).fold(0.0, f64::max);
        for i in 0..2 {
            for j in 0..2 {
                let diff = (z[(i, j)] - expected[[i, j]]).norm();
                assert!(
                    diff < 1e-6 * scale,
                    "{} Hz Z{}{}: {} vs {}",
                    freq,
                    i + 1,
                    j + 1,
                    z[(i, j)],
                    expected[[i, j]]
                );
            }
        }
    }
}
