//! Simulation session tests
//!
//! A scripted engine exercises the session state machine; the live test
//! drives the real ngspice library and is skipped when it is not installed.

use std::collections::HashMap;
use std::time::Duration;

use approx::assert_relative_eq;
use num_complex::Complex64;

use fieldckt_core::ngspice::{
    AcSweep, NgspiceEngine, ResultVector, SessionSlot, SessionState, SimulationError,
    SimulationSession, SpiceEngine, VectorData,
};

/// Engine answering from a fixed table of vectors
struct ScriptedEngine {
    slot: &'static SessionSlot,
    vectors: HashMap<String, ResultVector>,
    log: Vec<String>,
}

impl ScriptedEngine {
    fn new(slot: &'static SessionSlot) -> Self {
        let mut vectors = HashMap::new();
        vectors.insert(
            "frequency".to_string(),
            ResultVector::new(
                "frequency",
                VectorData::Complex(vec![Complex64::new(1e3, 0.0), Complex64::new(1e4, 0.0)]),
            ),
        );
        vectors.insert(
            "v(2)".to_string(),
            ResultVector::new("v(2)", VectorData::Complex(vec![Complex64::new(0.5, 0.0); 2])),
        );
        Self {
            slot,
            vectors,
            log: Vec::new(),
        }
    }
}

impl SpiceEngine for ScriptedEngine {
    fn slot(&self) -> &'static SessionSlot {
        self.slot
    }

    fn init(&mut self) -> Result<(), SimulationError> {
        Ok(())
    }

    fn load_circuit(&mut self, lines: &[String]) -> Result<(), SimulationError> {
        self.log.push(format!("circuit with {} lines", lines.len()));
        Ok(())
    }

    fn command(&mut self, command: &str) -> Result<(), SimulationError> {
        self.log.push(format!("stdout {}", command));
        if command.starts_with("ac") || command == "quit" || command == "display" {
            Ok(())
        } else {
            Err(SimulationError::CommandFailed {
                command: command.to_string(),
                code: 1,
            })
        }
    }

    fn is_running(&self) -> bool {
        false
    }

    fn current_plot(&mut self) -> Option<String> {
        Some("ac1".to_string())
    }

    fn all_vectors(&mut self, _plot: &str) -> Vec<String> {
        let mut names: Vec<String> = self.vectors.keys().cloned().collect();
        names.sort();
        names
    }

    fn vector(&mut self, name: &str) -> Result<Option<ResultVector>, SimulationError> {
        Ok(self.vectors.get(name).cloned())
    }

    fn drain_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.log)
    }
}

fn leaked_slot() -> &'static SessionSlot {
    Box::leak(Box::new(SessionSlot::new()))
}

fn divider() -> Vec<String> {
    vec![
        "* divider".to_string(),
        "V1 1 0 DC 0 AC 1".to_string(),
        "R1 1 2 1k".to_string(),
        "R2 2 0 1k".to_string(),
        ".end".to_string(),
    ]
}

#[test]
fn test_missing_vector_keeps_session_usable() {
    let mut session = SimulationSession::open(ScriptedEngine::new(leaked_slot())).unwrap();
    session.load_circuit(&divider()).unwrap();
    session
        .run(&AcSweep::log(10, 1e3, 1e4), Duration::ZERO)
        .unwrap();

    match session.vector("v(nonexistent)") {
        Err(SimulationError::VectorNotFound { name }) => assert_eq!(name, "v(nonexistent)"),
        other => panic!("expected VectorNotFound, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Completed);

    let v = session.vector("v(2)").unwrap();
    assert_eq!(v.to_complex(), vec![Complex64::new(0.5, 0.0); 2]);
    assert_eq!(session.vector_names().unwrap(), vec!["frequency", "v(2)"]);
}

#[test]
fn test_second_session_rejected_until_first_quits() {
    let slot = leaked_slot();
    let first = SimulationSession::open(ScriptedEngine::new(slot)).unwrap();
    assert_eq!(
        SimulationSession::open(ScriptedEngine::new(slot)).unwrap_err(),
        SimulationError::SessionAlreadyActive
    );

    let output = first.quit();
    assert!(output.iter().any(|l| l == "stdout quit"));
    assert!(SimulationSession::open(ScriptedEngine::new(slot)).is_ok());
}

#[test]
fn test_output_collected_and_command_failure_recoverable() {
    let mut session = SimulationSession::open(ScriptedEngine::new(leaked_slot())).unwrap();
    session.load_circuit(&divider()).unwrap();
    assert!(session.output().iter().any(|l| l == "circuit with 5 lines"));

    let err = session.command("bogus").unwrap_err();
    assert!(matches!(err, SimulationError::CommandFailed { code: 1, .. }));
    assert_eq!(session.state(), SessionState::CircuitLoaded);
    session.command("display").unwrap();
}

#[test]
fn test_vectors_before_run_rejected() {
    let mut session = SimulationSession::open(ScriptedEngine::new(leaked_slot())).unwrap();
    session.load_circuit(&divider()).unwrap();
    assert!(matches!(
        session.vector("v(2)"),
        Err(SimulationError::InvalidState {
            state: SessionState::CircuitLoaded,
            ..
        })
    ));
}

#[test]
fn test_live_ngspice_divider() {
    let engine = match NgspiceEngine::load(None) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Warning: {}, skipping test", e);
            return;
        }
    };

    let mut session = SimulationSession::open(engine).unwrap();
    session.load_circuit(&divider()).unwrap();
    session
        .run(&AcSweep::log(10, 1e3, 1e6), Duration::from_micros(100))
        .unwrap();

    let frequency = session.vector("frequency").unwrap().to_real();
    assert!(frequency.len() >= 31);
    assert_relative_eq!(frequency[0], 1e3, max_relative = 1e-9);

    let v2 = session
        .vector("v(2)")
        .or_else(|_| session.vector("2"))
        .unwrap();
    assert!(v2.is_complex());
    for v in v2.to_complex() {
        assert_relative_eq!(v.norm(), 0.5, epsilon = 1e-9);
    }

    assert!(matches!(
        session.vector("v(nonexistent)"),
        Err(SimulationError::VectorNotFound { .. })
    ));
    session.quit();
}
