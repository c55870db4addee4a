//! Equivalent-circuit synthesis for fitted pole-residue models
//!
//! A fitted model is realized as a SPICE subcircuit whose external nodes are
//! the network ports (referenced to ground):
//! - S-parameter models: power-wave realization (`spice::realize_s`)
//! - Z-parameter models: series controlled-voltage-source realization
//!   (`spice::realize_z`)
//!
//! Synthesis is a pure transform: the same model and port names always yield
//! byte-identical netlist text.

mod spice;
mod testbench;

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ConfigError;
use crate::network::ParameterKind;
use crate::vector_fitting::PoleResidueModel;

pub use testbench::{testbench, Testbench};

/// Errors raised while synthesizing or persisting a netlist
#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("expected {expected} port names, got {found}")]
    PortCount { expected: usize, found: usize },

    #[error("invalid port name {name:?}: {reason}")]
    InvalidPortName { name: String, reason: &'static str },

    #[error("port name {name:?} collides with an internal node")]
    PortNameCollision { name: String },

    #[error("invalid subcircuit name {0:?}")]
    InvalidSubcktName(String),

    #[error("pole {index} at {value} lies in the right half-plane")]
    UnstablePole { index: usize, value: String },

    #[error("excited port {port} out of range for a {nports}-port network")]
    ExcitedPortOutOfRange { port: usize, nports: usize },

    #[error("invalid reference impedance {0}")]
    InvalidReferenceImpedance(f64),

    #[error("failed to write netlist {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Synthesis options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub subckt_name: String,
    /// External node names; `p1..pN` when absent
    pub port_names: Option<Vec<String>>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            subckt_name: "s_equivalent".to_string(),
            port_names: None,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier(&self.subckt_name).map_err(|reason| ConfigError::Invalid {
            field: "synthesis.subckt_name",
            reason: reason.to_string(),
        })?;
        if let Some(names) = &self.port_names {
            check_port_names(names).map_err(|e| ConfigError::Invalid {
                field: "synthesis.port_names",
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Port names for an `nports`-port model
    pub fn port_names_for(&self, nports: usize) -> Vec<String> {
        self.port_names
            .clone()
            .unwrap_or_else(|| default_port_names(nports))
    }
}

/// `p1`, `p2`, ..., `pN`
pub fn default_port_names(nports: usize) -> Vec<String> {
    (1..=nports).map(|i| format!("p{}", i)).collect()
}

/// A synthesized subcircuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitNetlist {
    name: String,
    ports: Vec<String>,
    kind: ParameterKind,
    text: String,
}

impl CircuitNetlist {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    #[inline]
    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Netlist lines without terminators
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    /// Write the netlist to a file
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), SynthesisError> {
        let path = path.as_ref();
        fs::write(path, self.text.as_bytes()).map_err(|source| SynthesisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), subckt = %self.name, "netlist written");
        Ok(())
    }
}

impl fmt::Display for CircuitNetlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Synthesize a subcircuit for a fitted model
pub fn synthesize(
    model: &PoleResidueModel,
    subckt_name: &str,
    port_names: &[String],
) -> Result<CircuitNetlist, SynthesisError> {
    check_identifier(subckt_name)
        .map_err(|_| SynthesisError::InvalidSubcktName(subckt_name.to_string()))?;
    if port_names.len() != model.nports() {
        return Err(SynthesisError::PortCount {
            expected: model.nports(),
            found: port_names.len(),
        });
    }
    check_port_names(port_names)?;

    if let Some((index, pole)) = model
        .poles()
        .iter()
        .enumerate()
        .find(|(_, p)| p.value().re > 0.0)
    {
        return Err(SynthesisError::UnstablePole {
            index,
            value: pole.value().to_string(),
        });
    }

    let writer = match model.kind() {
        ParameterKind::S => spice::realize_s(model, subckt_name, port_names),
        ParameterKind::Z => spice::realize_z(model, subckt_name, port_names),
    };

    if let Some(name) = port_names.iter().find(|p| writer.is_internal(p)) {
        return Err(SynthesisError::PortNameCollision { name: name.clone() });
    }

    debug!(
        subckt = subckt_name,
        kind = %model.kind(),
        model_order = model.model_order(),
        "netlist synthesized"
    );

    Ok(CircuitNetlist {
        name: subckt_name.to_string(),
        ports: port_names.to_vec(),
        kind: model.kind(),
        text: writer.finish(),
    })
}

/// A `.SUBCKT` header found in netlist text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcktHeader {
    pub name: String,
    pub ports: Vec<String>,
}

/// Find canonical `.SUBCKT name port...` headers
///
/// Comment (`*`) and blank lines are skipped; parameters (`params:` or
/// `key=value` tokens) end the port list.
pub fn parse_subckt_headers(text: &str) -> Vec<SubcktHeader> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('*'))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            if !tokens.next()?.eq_ignore_ascii_case(".subckt") {
                return None;
            }
            let name = tokens.next()?.to_string();
            let ports = tokens
                .take_while(|t| !t.contains('=') && !t.eq_ignore_ascii_case("params:"))
                .map(str::to_string)
                .collect();
            Some(SubcktHeader { name, ports })
        })
        .collect()
}

/// Line-oriented netlist text with internal node bookkeeping
pub(crate) struct NetlistWriter {
    text: String,
    internal: BTreeSet<String>,
}

impl NetlistWriter {
    pub(crate) fn new() -> Self {
        Self {
            text: String::new(),
            internal: BTreeSet::new(),
        }
    }

    pub(crate) fn line(&mut self, line: impl AsRef<str>) {
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    /// Register an internal node name and return it
    pub(crate) fn node(&mut self, name: String) -> String {
        self.internal.insert(name.to_ascii_lowercase());
        name
    }

    /// SPICE node names are case-insensitive
    fn is_internal(&self, name: &str) -> bool {
        self.internal.contains(&name.to_ascii_lowercase())
    }

    fn finish(self) -> String {
        self.text
    }
}

fn check_identifier(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'))
    {
        return Err("only ASCII letters, digits and _ - . + are allowed");
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        return Err("must start with a letter, digit or underscore");
    }
    Ok(())
}

fn check_port_names(names: &[String]) -> Result<(), SynthesisError> {
    let mut seen = BTreeSet::new();
    for name in names {
        check_identifier(name).map_err(|reason| SynthesisError::InvalidPortName {
            name: name.clone(),
            reason,
        })?;
        if name == "0" || name.eq_ignore_ascii_case("gnd") {
            return Err(SynthesisError::InvalidPortName {
                name: name.clone(),
                reason: "ground cannot be a port",
            });
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(SynthesisError::InvalidPortName {
                name: name.clone(),
                reason: "duplicate port name",
            });
        }
    }
    Ok(())
}
