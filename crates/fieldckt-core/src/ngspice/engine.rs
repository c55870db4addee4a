//! Seam between the session state machine and a simulator backend

use std::sync::atomic::{AtomicBool, Ordering};

use super::{ResultVector, SimulationError};

/// Exclusive-use flag for one simulator library instance
///
/// ngspice keeps global state per loaded library, so only one session may
/// drive it at a time.
#[derive(Debug)]
pub struct SessionSlot {
    taken: AtomicBool,
}

impl SessionSlot {
    pub const fn new() -> Self {
        Self {
            taken: AtomicBool::new(false),
        }
    }

    /// Claim the slot; false when another session holds it
    pub fn try_acquire(&self) -> bool {
        self.taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.taken.store(false, Ordering::Release);
    }

    pub fn is_taken(&self) -> bool {
        self.taken.load(Ordering::Acquire)
    }
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations a simulation session needs from the simulator
pub trait SpiceEngine {
    /// Slot shared by every engine bound to the same library instance
    fn slot(&self) -> &'static SessionSlot;

    /// Register callbacks and prepare the simulator
    fn init(&mut self) -> Result<(), SimulationError>;

    /// Load a netlist given as individual lines (without terminator)
    fn load_circuit(&mut self, lines: &[String]) -> Result<(), SimulationError>;

    /// Execute one simulator command
    fn command(&mut self, command: &str) -> Result<(), SimulationError>;

    /// True while a background analysis is running
    fn is_running(&self) -> bool;

    /// Name of the current plot, if any
    fn current_plot(&mut self) -> Option<String>;

    /// Vector names of a plot
    fn all_vectors(&mut self, plot: &str) -> Vec<String>;

    /// Copy a vector out of the simulator; `Ok(None)` when it does not exist
    fn vector(&mut self, name: &str) -> Result<Option<ResultVector>, SimulationError>;

    /// Take the simulator output captured since the last call
    fn drain_output(&mut self) -> Vec<String>;

    /// Exit status if the simulator asked to shut down
    fn exit_status(&self) -> Option<i32> {
        None
    }
}
