//! SPICE realizations of pole-residue models
//!
//! Both realizations are direct implementations of the state-space form of
//! the model: every pole gets one first-order state (real pole) or two coupled
//! states (complex pair) per driving port, built from a unit capacitor, a
//! resistor `-1/Re(p)` and controlled sources.

use num_complex::Complex64;

use super::NetlistWriter;
use crate::vector_fitting::{Pole, PoleResidueModel};

/// Power-wave realization of an S-parameter model
///
/// Each port is a sense source `V<i>` in series with its reference
/// resistance; the reflected wave `b_i` is injected as a current into the
/// resistor node, the incident wave `a_j = (V_j + Z0*I_j) / (2*sqrt(Z0))` drives
/// the state networks.
pub(super) fn realize_s(
    model: &PoleResidueModel,
    subckt_name: &str,
    ports: &[String],
) -> NetlistWriter {
    let z0 = model.z0();
    let mut netlist = NetlistWriter::new();

    let build_e = has_proportional(model);

    netlist.line("* EQUIVALENT CIRCUIT FOR VECTOR FITTED S-MATRIX");
    netlist.line(format!("* Reference impedance {} Ohm", num(z0)));
    netlist.line("*");
    netlist.line(format!(".SUBCKT {} {}", subckt_name, ports.join(" ")));

    // Transfer gain of the controlled sources representing incident wave a_i
    // a_i = 1 / 2 / sqrt(Z0) * (V_i + Z0 * I_i)
    let gain_vccs_a = 1.0 / 2.0 / z0.sqrt();
    let gain_cccs_a = z0.sqrt() / 2.0;
    // Transfer gain for reflected wave b_i = sqrt(Z0) / 2 * I_b_i
    let gain_b = 2.0 / z0.sqrt();

    for (i, port_i) in ports.iter().enumerate() {
        let n = i + 1;
        netlist.line("*");
        netlist.line(format!("* Port network for port {}", port_i));

        let s_node = netlist.node(format!("s{}", n));

        // Dummy voltage source for port current sensing
        netlist.line(format!("V{} {} {} 0", n, port_i, s_node));
        // Port reference resistor
        netlist.line(format!("R{} {} 0 {}", n, s_node, num(z0)));

        for (j, port_j) in ports.iter().enumerate() {
            let m = j + 1;

            let d = model.constant().map_or(0.0, |d| d[[i, j]]);
            if d != 0.0 {
                netlist.line(format!(
                    "Gd{}_{} 0 {} {} 0 {}",
                    n,
                    m,
                    s_node,
                    port_j,
                    num(gain_b * d * gain_vccs_a)
                ));
                netlist.line(format!(
                    "Fd{}_{} 0 {} V{} {}",
                    n,
                    m,
                    s_node,
                    m,
                    num(gain_b * d * gain_cccs_a)
                ));
            }

            let e = model.proportional().map_or(0.0, |e| e[[i, j]]);
            if e != 0.0 {
                netlist.line(format!(
                    "Ge{}_{} 0 {} e{} 0 {}",
                    n,
                    m,
                    s_node,
                    m,
                    num(gain_b * e)
                ));
            }

            // Each residue of S_ij is multiplied by its state signal driven by port j
            for (k, pole) in model.poles().iter().enumerate() {
                let residue = model.residues()[[k, i, j]];
                write_residue_taps(&mut netlist, pole, residue * gain_b, k + 1, (n, m), &s_node);
            }
        }

        netlist.line("*");
        netlist.line(format!("* State networks driven by port {}", port_i));
        for (k, pole) in model.poles().iter().enumerate() {
            let drive = |netlist: &mut NetlistWriter, tag: &str, state: &str, scale: f64| {
                netlist.line(format!(
                    "Gx{}{}_a{} 0 {} {} 0 {}",
                    k + 1,
                    tag,
                    n,
                    state,
                    port_i,
                    num(scale * gain_vccs_a)
                ));
                netlist.line(format!(
                    "Fx{}{}_a{} 0 {} V{} {}",
                    k + 1,
                    tag,
                    n,
                    state,
                    n,
                    num(scale * gain_cccs_a)
                ));
            };
            write_state_network(&mut netlist, pole, k + 1, n, "a", drive);
        }

        if build_e {
            netlist.line("*");
            netlist.line(format!(
                "* Network with derivative of input a_{} for proportional term",
                n
            ));
            let e_node = netlist.node(format!("e{}", n));
            netlist.line(format!("Le{} {} 0 1.0", n, e_node));
            netlist.line(format!(
                "Ge{} 0 {} {} 0 {}",
                n,
                e_node,
                port_i,
                num(gain_vccs_a)
            ));
            netlist.line(format!("Fe{} 0 {} V{} {}", n, e_node, n, num(gain_cccs_a)));
        }
    }

    netlist.line(format!(".ENDS {}", subckt_name));
    netlist
}

/// Series-source realization of a Z-parameter model
///
/// The port current flows through a sense source `V<i>` into a chain of
/// controlled voltage sources to ground whose voltages add up to
/// `V_i = sum_j Z_ij(s) * I_j`. State networks are driven by the port
/// currents.
pub(super) fn realize_z(
    model: &PoleResidueModel,
    subckt_name: &str,
    ports: &[String],
) -> NetlistWriter {
    let mut netlist = NetlistWriter::new();
    let build_e = has_proportional(model);

    netlist.line("* EQUIVALENT CIRCUIT FOR VECTOR FITTED Z-MATRIX");
    netlist.line("*");
    netlist.line(format!(".SUBCKT {} {}", subckt_name, ports.join(" ")));

    for (i, port_i) in ports.iter().enumerate() {
        let n = i + 1;
        netlist.line("*");
        netlist.line(format!("* Series voltage chain for port {}", port_i));

        // (element name, controlling part) of every series term
        let mut terms: Vec<(String, String)> = Vec::new();
        for j in 0..ports.len() {
            let m = j + 1;

            let d = model.constant().map_or(0.0, |d| d[[i, j]]);
            if d != 0.0 {
                terms.push((format!("Hd{}_{}", n, m), format!("V{} {}", m, num(d))));
            }

            let e = model.proportional().map_or(0.0, |e| e[[i, j]]);
            if e != 0.0 {
                terms.push((format!("Ee{}_{}", n, m), format!("e{} 0 {}", m, num(e))));
            }

            for (k, pole) in model.poles().iter().enumerate() {
                let r = model.residues()[[k, i, j]];
                let kk = k + 1;
                if pole.is_real() {
                    if r.re != 0.0 {
                        terms.push((
                            format!("Er{}_{}_{}", kk, n, m),
                            format!("x{}_i{} 0 {}", kk, m, num(r.re)),
                        ));
                    }
                } else {
                    if r.re != 0.0 {
                        terms.push((
                            format!("Er{}_re_{}_{}", kk, n, m),
                            format!("x{}_re_i{} 0 {}", kk, m, num(r.re)),
                        ));
                    }
                    if r.im != 0.0 {
                        terms.push((
                            format!("Er{}_im_{}_{}", kk, n, m),
                            format!("x{}_im_i{} 0 {}", kk, m, num(r.im)),
                        ));
                    }
                }
            }
        }

        let chain: Vec<String> = (1..=terms.len())
            .map(|t| netlist.node(format!("z{}_{}", n, t)))
            .collect();

        // Current sensing source into the chain
        let first = chain.first().map_or("0", String::as_str);
        netlist.line(format!("V{} {} {} 0", n, port_i, first));
        for (t, (element, control)) in terms.iter().enumerate() {
            let next = chain.get(t + 1).map_or("0", String::as_str);
            netlist.line(format!("{} {} {} {}", element, chain[t], next, control));
        }

        netlist.line("*");
        netlist.line(format!("* State networks driven by port {} current", port_i));
        for (k, pole) in model.poles().iter().enumerate() {
            let drive = |netlist: &mut NetlistWriter, tag: &str, state: &str, scale: f64| {
                netlist.line(format!(
                    "Fx{}{}_i{} 0 {} V{} {}",
                    k + 1,
                    tag,
                    n,
                    state,
                    n,
                    num(scale)
                ));
            };
            write_state_network(&mut netlist, pole, k + 1, n, "i", drive);
        }

        if build_e {
            netlist.line("*");
            netlist.line(format!("* Derivative of port {} current for proportional term", port_i));
            let e_node = netlist.node(format!("e{}", n));
            netlist.line(format!("Le{} {} 0 1.0", n, e_node));
            netlist.line(format!("Fe{} 0 {} V{} 1.0", n, e_node, n));
        }
    }

    netlist.line(format!(".ENDS {}", subckt_name));
    netlist
}

/// State network(s) of pole `k` driven by port `n`
///
/// Real pole: `C dx/dt = p*x + u`. Complex pair:
/// `dx_re/dt = Re(p)*x_re + Im(p)*x_im + 2u`, `dx_im/dt = -Im(p)*x_re + Re(p)*x_im`.
/// `drive(netlist, tag, state, scale)` writes the sources injecting
/// `scale * u` into the state node.
fn write_state_network<F>(
    netlist: &mut NetlistWriter,
    pole: &Pole,
    k: usize,
    n: usize,
    suffix: &str,
    drive: F,
) where
    F: Fn(&mut NetlistWriter, &str, &str, f64),
{
    let p = pole.value();

    if pole.is_real() {
        let x = netlist.node(format!("x{}_{}{}", k, suffix, n));
        netlist.line(format!("Cx{}_{}{} {} 0 1.0", k, suffix, n, x));
        drive(netlist, "", &x, 1.0);
        write_pole_resistor(netlist, format!("Rp{}_{}{}", k, suffix, n), &x, p.re);
    } else {
        let x_re = netlist.node(format!("x{}_re_{}{}", k, suffix, n));
        let x_im = netlist.node(format!("x{}_im_{}{}", k, suffix, n));

        // Real part state
        netlist.line(format!("Cx{}_re_{}{} {} 0 1.0", k, suffix, n, x_re));
        drive(netlist, "_re", &x_re, 2.0);
        write_pole_resistor(netlist, format!("Rp{}_re_re_{}{}", k, suffix, n), &x_re, p.re);
        netlist.line(format!(
            "Gp{}_re_im_{}{} 0 {} {} 0 {}",
            k,
            suffix,
            n,
            x_re,
            x_im,
            num(p.im)
        ));

        // Imaginary part state
        netlist.line(format!("Cx{}_im_{}{} {} 0 1.0", k, suffix, n, x_im));
        netlist.line(format!(
            "Gp{}_im_re_{}{} 0 {} {} 0 {}",
            k,
            suffix,
            n,
            x_im,
            x_re,
            num(-p.im)
        ));
        write_pole_resistor(netlist, format!("Rp{}_im_im_{}{}", k, suffix, n), &x_im, p.re);
    }
}

/// Resistor `-1/Re(p)`; omitted for a lossless pole
fn write_pole_resistor(netlist: &mut NetlistWriter, name: String, node: &str, pole_re: f64) {
    if pole_re != 0.0 {
        netlist.line(format!("{} 0 {} {}", name, node, num(-1.0 / pole_re)));
    }
}

/// Output taps of one (scaled) residue of entry (n, m) into the port node
fn write_residue_taps(
    netlist: &mut NetlistWriter,
    pole: &Pole,
    residue: Complex64,
    k: usize,
    (n, m): (usize, usize),
    out_node: &str,
) {
    if pole.is_real() {
        netlist.line(format!(
            "Gr{}_{}_{} 0 {} x{}_a{} 0 {}",
            k,
            n,
            m,
            out_node,
            k,
            m,
            num(residue.re)
        ));
    } else {
        netlist.line(format!(
            "Gr{}_re_{}_{} 0 {} x{}_re_a{} 0 {}",
            k,
            n,
            m,
            out_node,
            k,
            m,
            num(residue.re)
        ));
        netlist.line(format!(
            "Gr{}_im_{}_{} 0 {} x{}_im_a{} 0 {}",
            k,
            n,
            m,
            out_node,
            k,
            m,
            num(residue.im)
        ));
    }
}

fn has_proportional(model: &PoleResidueModel) -> bool {
    model
        .proportional()
        .map_or(false, |e| e.iter().any(|&v| v != 0.0))
}

/// Deterministic number formatting
#[inline]
fn num(value: f64) -> String {
    format!("{:e}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ParameterKind;
    use ndarray::{Array2, Array3};

    fn names(n: usize) -> Vec<String> {
        super::super::default_port_names(n)
    }

    fn s_model() -> PoleResidueModel {
        PoleResidueModel::new(
            vec![Pole::real(-1e9)],
            Array3::from_elem((1, 1, 1), Complex64::new(0.5, 0.0)),
            Some(Array2::from_elem((1, 1), 0.1)),
            None,
            ParameterKind::S,
            50.0,
            (1e6, 1e9),
        )
        .unwrap()
    }

    #[test]
    fn test_generate_spice_1port() {
        let netlist = realize_s(&s_model(), "test_model", &names(1)).finish();

        assert!(netlist.contains(".SUBCKT test_model p1\n"));
        assert!(netlist.contains(".ENDS test_model"));
        assert!(netlist.contains("V1 p1 s1 0"));
        assert!(netlist.contains("R1 s1 0 5e1"));
        assert!(netlist.contains("Rp1_a1 0 x1_a1 1e-9"));
        assert!(netlist.contains("Gr1_1_1 0 s1 x1_a1 0 "));
    }

    #[test]
    fn test_pair_states_coupled() {
        let mut residues = Array3::zeros((1, 2, 2));
        residues[[0, 0, 1]] = Complex64::new(1.0, 2.0);
        let model = PoleResidueModel::new(
            vec![Pole::pair(Complex64::new(-1e8, 1e9))],
            residues,
            None,
            None,
            ParameterKind::S,
            50.0,
            (1e6, 1e9),
        )
        .unwrap();
        let netlist = realize_s(&model, "pair", &names(2)).finish();

        assert!(netlist.contains("Gp1_re_im_a1 0 x1_re_a1 x1_im_a1 0 1e9"));
        assert!(netlist.contains("Gp1_im_re_a2 0 x1_im_a2 x1_re_a2 0 -1e9"));
        assert!(netlist.contains("Gr1_re_1_2 0 s1 x1_re_a2 0 "));
        assert!(!netlist.contains("Gd"));
    }

    #[test]
    fn test_z_chain_terminates_at_ground() {
        let model = PoleResidueModel::new(
            vec![Pole::real(-1e9)],
            Array3::from_elem((1, 1, 1), Complex64::new(2e9, 0.0)),
            Some(Array2::from_elem((1, 1), 10.0)),
            None,
            ParameterKind::Z,
            50.0,
            (1e6, 1e9),
        )
        .unwrap();
        let netlist = realize_z(&model, "zdut", &names(1)).finish();

        assert!(netlist.contains("V1 p1 z1_1 0\n"));
        assert!(netlist.contains("Hd1_1 z1_1 z1_2 V1 1e1\n"));
        assert!(netlist.contains("Er1_1_1 z1_2 0 x1_i1 0 2e9\n"));
        assert!(netlist.contains("Fx1_i1 0 x1_i1 V1 1e0\n"));
    }

    #[test]
    fn test_z_without_terms_shorts_port() {
        let model = PoleResidueModel::new(
            Vec::new(),
            Array3::zeros((0, 1, 1)),
            None,
            None,
            ParameterKind::Z,
            50.0,
            (1e6, 1e9),
        )
        .unwrap();
        let netlist = realize_z(&model, "short", &names(1)).finish();
        assert!(netlist.contains("V1 p1 0 0\n"));
    }

    #[test]
    fn test_number_format() {
        assert_eq!(num(50.0), "5e1");
        assert_eq!(num(-1e-9), "-1e-9");
        assert_eq!(num(0.1), "1e-1");
    }
}
