//! Top-level validation circuit around a synthesized subcircuit

use super::{CircuitNetlist, SynthesisError};

/// A complete circuit ready to be loaded into the simulator
#[derive(Debug, Clone, PartialEq)]
pub struct Testbench {
    text: String,
    excited_port: usize,
    z0: f64,
    /// Simulator vector names of each port voltage
    voltage_probes: Vec<String>,
    /// Simulator vector names of each port current (into the subcircuit)
    current_probes: Vec<String>,
}

impl Testbench {
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    #[inline]
    pub fn excited_port(&self) -> usize {
        self.excited_port
    }

    #[inline]
    pub fn z0(&self) -> f64 {
        self.z0
    }

    #[inline]
    pub fn voltage_probes(&self) -> &[String] {
        &self.voltage_probes
    }

    #[inline]
    pub fn current_probes(&self) -> &[String] {
        &self.current_probes
    }
}

/// Wrap a subcircuit in a top-level circuit driving every port
///
/// Port `k` (1-based nodes `port<k>`) is driven by `V<k>` behind a `z0`
/// resistor and a 0 V current probe `Vprobe<k>`; the excited port gets
/// `AC 1`, all others `AC 0`. `excited_port` is zero-based.
pub fn testbench(
    netlist: &CircuitNetlist,
    excited_port: usize,
    z0: f64,
) -> Result<Testbench, SynthesisError> {
    let nports = netlist.ports().len();
    if excited_port >= nports {
        return Err(SynthesisError::ExcitedPortOutOfRange {
            port: excited_port,
            nports,
        });
    }
    if !(z0.is_finite() && z0 > 0.0) {
        return Err(SynthesisError::InvalidReferenceImpedance(z0));
    }

    let mut text = String::new();
    // The simulator treats the first line as the title
    text.push_str(&format!("* validation testbench for {}\n", netlist.name()));
    text.push_str(netlist.text());

    let nodes: Vec<String> = (1..=nports).map(|k| format!("port{}", k)).collect();
    text.push_str(&format!("X1 {} {}\n", nodes.join(" "), netlist.name()));

    for k in 1..=nports {
        let ac = if k == excited_port + 1 { 1 } else { 0 };
        text.push_str(&format!("V{} src{} 0 DC 0 AC {}\n", k, k, ac));
        text.push_str(&format!("R{} src{} drv{} {:e}\n", k, k, k, z0));
        text.push_str(&format!("Vprobe{} drv{} port{} 0\n", k, k, k));
    }
    text.push_str(".end\n");

    Ok(Testbench {
        text,
        excited_port,
        z0,
        voltage_probes: nodes.iter().map(|n| format!("v({})", n)).collect(),
        current_probes: (1..=nports).map(|k| format!("i(vprobe{})", k)).collect(),
    })
}
