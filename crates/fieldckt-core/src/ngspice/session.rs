//! Simulation session lifecycle

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::engine::{SessionSlot, SpiceEngine};
use super::{AcSweep, ResultVector, SimulationError};

/// Lifecycle state of a `SimulationSession`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    Initialized,
    CircuitLoaded,
    Running,
    Completed,
    Error,
}

/// Exclusive handle on a simulator instance
///
/// Opening claims the engine's `SessionSlot`; dropping or quitting the session
/// tears the simulator down and gives the slot back.
pub struct SimulationSession<E: SpiceEngine> {
    engine: E,
    state: SessionState,
    slot: &'static SessionSlot,
    output: Vec<String>,
}

impl<E: SpiceEngine> std::fmt::Debug for SimulationSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationSession")
            .field("state", &self.state)
            .field("output_lines", &self.output.len())
            .finish_non_exhaustive()
    }
}

impl<E: SpiceEngine> SimulationSession<E> {
    /// Claim the engine and initialize it
    pub fn open(mut engine: E) -> Result<Self, SimulationError> {
        let slot = engine.slot();
        if !slot.try_acquire() {
            return Err(SimulationError::SessionAlreadyActive);
        }
        if let Err(e) = engine.init() {
            slot.release();
            return Err(e);
        }
        info!(state = ?SessionState::Initialized, "simulation session opened");
        Ok(Self {
            engine,
            state: SessionState::Initialized,
            slot,
            output: Vec::new(),
        })
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = ?self.state, to = ?next, "simulation session transition");
            self.state = next;
        }
    }

    fn collect_output(&mut self) {
        let lines = self.engine.drain_output();
        self.output.extend(lines);
    }

    fn check_exit(&mut self) -> Result<(), SimulationError> {
        if let Some(status) = self.engine.exit_status() {
            self.transition(SessionState::Error);
            return Err(SimulationError::EngineExited { status });
        }
        Ok(())
    }

    /// Load the circuit; allowed once per session
    ///
    /// A failed load leaves the session in `Error`.
    pub fn load_circuit(&mut self, lines: &[String]) -> Result<(), SimulationError> {
        match self.state {
            SessionState::Initialized => {}
            SessionState::CircuitLoaded | SessionState::Running | SessionState::Completed => {
                return Err(SimulationError::CircuitAlreadyLoaded)
            }
            state => {
                return Err(SimulationError::InvalidState {
                    operation: "load a circuit",
                    state,
                })
            }
        }

        debug!(lines = lines.len(), "loading circuit");
        let result = self.engine.load_circuit(lines);
        self.collect_output();
        match result {
            Ok(()) => {
                self.transition(SessionState::CircuitLoaded);
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::Error);
                Err(e)
            }
        }
    }

    /// Load a netlist given as one text block
    pub fn load_netlist(&mut self, text: &str) -> Result<(), SimulationError> {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        self.load_circuit(&lines)
    }

    /// Run an AC analysis and block until the simulator reports completion
    ///
    /// A rejected command is recoverable: the session returns to its
    /// previous state.
    pub fn run(&mut self, sweep: &AcSweep, poll_interval: Duration) -> Result<(), SimulationError> {
        let previous = match self.state {
            SessionState::CircuitLoaded | SessionState::Completed => self.state,
            state => {
                return Err(SimulationError::InvalidState {
                    operation: "run an analysis",
                    state,
                })
            }
        };
        sweep.validate()?;

        let command = sweep.command();
        self.transition(SessionState::Running);
        if let Err(e) = self.engine.command(&command) {
            self.collect_output();
            warn!(command = %command, error = %e, "analysis command rejected");
            self.transition(previous);
            return Err(e);
        }

        while self.engine.is_running() {
            if poll_interval.is_zero() {
                std::hint::spin_loop();
            } else {
                thread::sleep(poll_interval);
            }
        }
        self.collect_output();
        self.check_exit()?;
        self.transition(SessionState::Completed);
        Ok(())
    }

    /// Issue an interpreter command; failures leave the session usable
    pub fn command(&mut self, command: &str) -> Result<(), SimulationError> {
        if matches!(
            self.state,
            SessionState::Unloaded | SessionState::Running | SessionState::Error
        ) {
            return Err(SimulationError::InvalidState {
                operation: "issue a command",
                state: self.state,
            });
        }
        let result = self.engine.command(command);
        self.collect_output();
        if let Err(e) = &result {
            warn!(command = %command, error = %e, "ngspice command failed");
        }
        self.check_exit()?;
        result
    }

    fn require_results(&self, operation: &'static str) -> Result<(), SimulationError> {
        if self.state != SessionState::Completed {
            return Err(SimulationError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Current plot name
    pub fn current_plot(&mut self) -> Result<Option<String>, SimulationError> {
        self.require_results("read the current plot")?;
        Ok(self.engine.current_plot())
    }

    /// Names of every vector in the current plot
    pub fn vector_names(&mut self) -> Result<Vec<String>, SimulationError> {
        self.require_results("list vectors")?;
        Ok(match self.engine.current_plot() {
            Some(plot) => self.engine.all_vectors(&plot),
            None => Vec::new(),
        })
    }

    /// Copy one vector out of the simulator
    pub fn vector(&mut self, name: &str) -> Result<ResultVector, SimulationError> {
        self.require_results("read a vector")?;
        self.engine
            .vector(name)?
            .ok_or_else(|| SimulationError::VectorNotFound {
                name: name.to_string(),
            })
    }

    /// Copy several vectors, failing on the first missing one
    pub fn vectors<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Vec<ResultVector>, SimulationError> {
        names.iter().map(|n| self.vector(n.as_ref())).collect()
    }

    /// Simulator output captured so far
    pub fn output(&self) -> &[String] {
        &self.output
    }

    fn teardown(&mut self) {
        if self.state == SessionState::Unloaded {
            return;
        }
        if let Err(e) = self.engine.command("quit") {
            debug!(error = %e, "quit command failed during teardown");
        }
        self.collect_output();
        self.transition(SessionState::Unloaded);
        self.slot.release();
    }

    /// Quit the simulator and release the library
    pub fn quit(mut self) -> Vec<String> {
        self.teardown();
        std::mem::take(&mut self.output)
    }
}

impl<E: SpiceEngine> Drop for SimulationSession<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}
