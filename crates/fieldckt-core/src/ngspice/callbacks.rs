//! Callbacks invoked by ngspice
//!
//! ngspice calls these from its own threads with the `user_data` pointer
//! registered at initialization, which points at a `CallbackSink` living
//! for the whole process. The callbacks only append to lock-protected buffers and
//! update atomics; they never block on the caller.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{trace, warn};

/// Buffers and flags shared with the ngspice threads
#[derive(Debug)]
pub struct CallbackSink {
    output: Mutex<Vec<String>>,
    status: Mutex<Option<String>>,
    exited: AtomicBool,
    exit_status: AtomicI32,
    background_running: AtomicBool,
    data_points: Mutex<usize>,
}

impl CallbackSink {
    pub const fn new() -> Self {
        Self {
            output: Mutex::new(Vec::new()),
            status: Mutex::new(None),
            exited: AtomicBool::new(false),
            exit_status: AtomicI32::new(0),
            background_running: AtomicBool::new(false),
            data_points: Mutex::new(0),
        }
    }

    /// Clear everything recorded by a previous session
    pub fn reset(&self) {
        self.drain_output();
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.exited.store(false, Ordering::SeqCst);
        self.exit_status.store(0, Ordering::SeqCst);
        self.background_running.store(false, Ordering::SeqCst);
        *self.data_points.lock().unwrap_or_else(PoisonError::into_inner) = 0;
    }

    pub(crate) fn push_output(&self, line: String) {
        trace!(target: "ngspice", "{}", line);
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    pub(crate) fn set_status(&self, status: String) {
        trace!(target: "ngspice", status = %status);
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    pub(crate) fn record_exit(&self, status: i32) {
        self.exit_status.store(status, Ordering::SeqCst);
        self.exited.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_background_running(&self, running: bool) {
        self.background_running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn count_data_point(&self) {
        *self.data_points.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    /// Take every captured output line
    pub fn drain_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Last status text reported by the engine
    pub fn status(&self) -> Option<String> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Exit status if the engine requested a controlled exit
    pub fn exit_status(&self) -> Option<i32> {
        self.exited
            .load(Ordering::SeqCst)
            .then(|| self.exit_status.load(Ordering::SeqCst))
    }

    pub fn background_running(&self) -> bool {
        self.background_running.load(Ordering::SeqCst)
    }

    /// Number of data points sent during the last analyses
    pub fn data_points(&self) -> usize {
        *self.data_points.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CallbackSink {
    fn default() -> Self {
        Self::new()
    }
}

/// # Safety
/// `user_data` must be null or point to a live `CallbackSink`.
unsafe fn sink<'a>(user_data: *mut c_void) -> Option<&'a CallbackSink> {
    (user_data as *const CallbackSink).as_ref()
}

unsafe fn text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

pub(crate) unsafe extern "C" fn send_char(
    output: *mut c_char,
    _id: c_int,
    user_data: *mut c_void,
) -> c_int {
    if let Some(sink) = sink(user_data) {
        sink.push_output(text(output));
    }
    0
}

pub(crate) unsafe extern "C" fn send_stat(
    status: *mut c_char,
    _id: c_int,
    user_data: *mut c_void,
) -> c_int {
    if let Some(sink) = sink(user_data) {
        sink.set_status(text(status));
    }
    0
}

pub(crate) unsafe extern "C" fn controlled_exit(
    exit_status: c_int,
    immediate_unload: bool,
    exit_upon_quit: bool,
    _id: c_int,
    user_data: *mut c_void,
) -> c_int {
    if !exit_upon_quit {
        warn!(exit_status, immediate_unload, "ngspice requested exit");
    }
    if let Some(sink) = sink(user_data) {
        sink.record_exit(exit_status);
    }
    0
}

pub(crate) unsafe extern "C" fn send_data(
    _values: *mut c_void,
    _count: c_int,
    _id: c_int,
    user_data: *mut c_void,
) -> c_int {
    if let Some(sink) = sink(user_data) {
        sink.count_data_point();
    }
    0
}

pub(crate) unsafe extern "C" fn send_init_data(
    _info: *mut c_void,
    _id: c_int,
    user_data: *mut c_void,
) -> c_int {
    if let Some(sink) = sink(user_data) {
        *sink.data_points.lock().unwrap_or_else(PoisonError::into_inner) = 0;
    }
    0
}

pub(crate) unsafe extern "C" fn bg_thread_running(
    not_running: bool,
    _id: c_int,
    user_data: *mut c_void,
) -> c_int {
    if let Some(sink) = sink(user_data) {
        sink.set_background_running(!not_running);
    }
    0
}
