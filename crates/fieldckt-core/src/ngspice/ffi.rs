//! # ngspice shared library bindings
//!
//! `libngspice` is loaded at runtime with libloading, so the crate builds and
//! fits models on machines without ngspice; only simulation needs it.
//!
//! ## Library functions
//!
//! - `ngSpice_Init` - register callbacks
//! - `ngSpice_Circ` - load a netlist as a NULL-terminated array of lines
//! - `ngSpice_Command` - run one interpreter command
//! - `ngSpice_running` - background thread status
//! - `ngSpice_CurPlot` / `ngSpice_AllVecs` - plot and vector names
//! - `ngGet_Vec_Info` - borrow a result vector

use std::ffi::{c_char, c_int, c_short, c_void, CStr, CString};
use std::path::Path;
use std::ptr;

use libloading::Library;
use num_complex::Complex64;
use tracing::{debug, info};

use super::callbacks::{self, CallbackSink};
use super::engine::{SessionSlot, SpiceEngine};
use super::{ResultVector, SimulationError, VectorData};

/// Vector holds real data
pub const VF_REAL: c_short = 1 << 0;
/// Vector holds complex data
pub const VF_COMPLEX: c_short = 1 << 1;

/// `ngcomplex_t`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NgComplex {
    pub cx_real: f64,
    pub cx_imag: f64,
}

/// `vector_info`
#[repr(C)]
#[derive(Debug)]
pub struct VectorInfo {
    pub v_name: *mut c_char,
    pub v_type: c_int,
    pub v_flags: c_short,
    pub v_realdata: *mut f64,
    pub v_compdata: *mut NgComplex,
    pub v_length: c_int,
}

pub type SendChar = unsafe extern "C" fn(*mut c_char, c_int, *mut c_void) -> c_int;
pub type SendStat = unsafe extern "C" fn(*mut c_char, c_int, *mut c_void) -> c_int;
pub type ControlledExit = unsafe extern "C" fn(c_int, bool, bool, c_int, *mut c_void) -> c_int;
pub type SendData = unsafe extern "C" fn(*mut c_void, c_int, c_int, *mut c_void) -> c_int;
pub type SendInitData = unsafe extern "C" fn(*mut c_void, c_int, *mut c_void) -> c_int;
pub type BgThreadRunning = unsafe extern "C" fn(bool, c_int, *mut c_void) -> c_int;

type InitFn = unsafe extern "C" fn(
    Option<SendChar>,
    Option<SendStat>,
    Option<ControlledExit>,
    Option<SendData>,
    Option<SendInitData>,
    Option<BgThreadRunning>,
    *mut c_void,
) -> c_int;
type CircFn = unsafe extern "C" fn(*mut *mut c_char) -> c_int;
type CommandFn = unsafe extern "C" fn(*mut c_char) -> c_int;
type RunningFn = unsafe extern "C" fn() -> bool;
type CurPlotFn = unsafe extern "C" fn() -> *mut c_char;
type AllVecsFn = unsafe extern "C" fn(*mut c_char) -> *mut *mut c_char;
type VecInfoFn = unsafe extern "C" fn(*mut c_char) -> *mut VectorInfo;

/// Library names to try on different platforms
#[cfg(target_os = "linux")]
pub const LIB_NAMES: &[&str] = &["libngspice.so.0", "libngspice.so"];

#[cfg(target_os = "macos")]
pub const LIB_NAMES: &[&str] = &["libngspice.dylib", "libngspice.0.dylib"];

#[cfg(target_os = "windows")]
pub const LIB_NAMES: &[&str] = &["ngspice.dll", "libngspice-0.dll"];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const LIB_NAMES: &[&str] = &["libngspice.so"];

/// ngspice keeps one interpreter per process image
static NGSPICE_SLOT: SessionSlot = SessionSlot::new();

/// Registered as `user_data`; outlives every callback ngspice may still fire
static NGSPICE_SINK: CallbackSink = CallbackSink::new();

/// Entry points copied out of the library; valid while `_lib` is loaded
struct Api {
    init: InitFn,
    circ: CircFn,
    command: CommandFn,
    running: RunningFn,
    cur_plot: CurPlotFn,
    all_vecs: AllVecsFn,
    vec_info: VecInfoFn,
}

/// `SpiceEngine` backed by the ngspice shared library
pub struct NgspiceEngine {
    api: Api,
    library: String,
    _lib: Library,
}

impl std::fmt::Debug for NgspiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NgspiceEngine")
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

/// # Safety
/// `T` must be the exact function pointer type of `name`.
unsafe fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T, SimulationError> {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);
    lib.get::<T>(&bytes)
        .map(|sym| *sym)
        .map_err(|e| SimulationError::MissingSymbol {
            symbol: name,
            reason: e.to_string(),
        })
}

impl NgspiceEngine {
    /// Load the library from `path`, or from the platform default names
    pub fn load(path: Option<&Path>) -> Result<Self, SimulationError> {
        let candidates: Vec<String> = match path {
            Some(p) => vec![p.display().to_string()],
            None => LIB_NAMES.iter().map(|s| s.to_string()).collect(),
        };

        for name in &candidates {
            // SAFETY: loading ngspice runs no initializers with preconditions
            let lib = match unsafe { Library::new(name) } {
                Ok(lib) => lib,
                Err(e) => {
                    debug!(library = %name, error = %e, "ngspice candidate not loadable");
                    continue;
                }
            };
            let api = unsafe { Self::resolve(&lib)? };
            info!(library = %name, "loaded ngspice shared library");
            return Ok(Self {
                api,
                library: name.clone(),
                _lib: lib,
            });
        }
        Err(SimulationError::LibraryNotFound { tried: candidates })
    }

    /// True when a default ngspice library can be loaded
    pub fn is_available() -> bool {
        Self::load(None).is_ok()
    }

    /// Path or name the library was loaded from
    pub fn library(&self) -> &str {
        &self.library
    }

    unsafe fn resolve(lib: &Library) -> Result<Api, SimulationError> {
        Ok(Api {
            init: symbol(lib, "ngSpice_Init")?,
            circ: symbol(lib, "ngSpice_Circ")?,
            command: symbol(lib, "ngSpice_Command")?,
            running: symbol(lib, "ngSpice_running")?,
            cur_plot: symbol(lib, "ngSpice_CurPlot")?,
            all_vecs: symbol(lib, "ngSpice_AllVecs")?,
            vec_info: symbol(lib, "ngGet_Vec_Info")?,
        })
    }
}

fn c_string(text: &str, context: &'static str) -> Result<CString, SimulationError> {
    CString::new(text).map_err(|_| SimulationError::InvalidString { context })
}

/// # Safety
/// `ptr` must be null or a NUL-terminated string.
unsafe fn owned(ptr: *const c_char) -> Option<String> {
    (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Copy a borrowed `vector_info` into an owned vector
///
/// # Safety
/// `info` must point to a valid `vector_info` whose data pointers cover
/// `v_length` elements.
unsafe fn copy_vector(name: &str, info: &VectorInfo) -> Result<ResultVector, SimulationError> {
    let malformed = |reason| SimulationError::MalformedVector {
        name: name.to_string(),
        reason,
    };
    let len = usize::try_from(info.v_length).map_err(|_| malformed("negative length"))?;
    let vector_name = owned(info.v_name).unwrap_or_else(|| name.to_string());

    let complex = info.v_flags & VF_COMPLEX != 0;
    let data = if len == 0 {
        if complex {
            VectorData::Complex(Vec::new())
        } else {
            VectorData::Real(Vec::new())
        }
    } else if complex {
        if info.v_compdata.is_null() {
            return Err(malformed("complex vector without complex data"));
        }
        let raw = std::slice::from_raw_parts(info.v_compdata, len);
        VectorData::Complex(
            raw.iter()
                .map(|c| Complex64::new(c.cx_real, c.cx_imag))
                .collect(),
        )
    } else {
        if info.v_realdata.is_null() {
            return Err(malformed("real vector without real data"));
        }
        VectorData::Real(std::slice::from_raw_parts(info.v_realdata, len).to_vec())
    };
    Ok(ResultVector::new(vector_name, data))
}

impl SpiceEngine for NgspiceEngine {
    fn slot(&self) -> &'static SessionSlot {
        &NGSPICE_SLOT
    }

    fn init(&mut self) -> Result<(), SimulationError> {
        NGSPICE_SINK.reset();
        let user_data = &NGSPICE_SINK as *const CallbackSink as *mut c_void;
        // SAFETY: callbacks match the ngspice prototypes and the sink is static
        let code = unsafe {
            (self.api.init)(
                Some(callbacks::send_char),
                Some(callbacks::send_stat),
                Some(callbacks::controlled_exit),
                Some(callbacks::send_data),
                Some(callbacks::send_init_data),
                Some(callbacks::bg_thread_running),
                user_data,
            )
        };
        if code != 0 {
            return Err(SimulationError::InitializationFailed { code });
        }
        Ok(())
    }

    fn load_circuit(&mut self, lines: &[String]) -> Result<(), SimulationError> {
        let owned = lines
            .iter()
            .map(|l| c_string(l, "netlist line"))
            .collect::<Result<Vec<_>, _>>()?;
        // ngspice copies the lines; the array only has to live for the call
        let mut array: Vec<*mut c_char> = owned.iter().map(|c| c.as_ptr() as *mut c_char).collect();
        array.push(ptr::null_mut());

        let code = unsafe { (self.api.circ)(array.as_mut_ptr()) };
        if code != 0 {
            return Err(SimulationError::CircuitLoadFailed { code });
        }
        Ok(())
    }

    fn command(&mut self, command: &str) -> Result<(), SimulationError> {
        let text = c_string(command, "command")?;
        let code = unsafe { (self.api.command)(text.as_ptr() as *mut c_char) };
        if code != 0 {
            return Err(SimulationError::CommandFailed {
                command: command.to_string(),
                code,
            });
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        unsafe { (self.api.running)() }
    }

    fn current_plot(&mut self) -> Option<String> {
        unsafe { owned((self.api.cur_plot)()) }
    }

    fn all_vectors(&mut self, plot: &str) -> Vec<String> {
        let Ok(name) = c_string(plot, "plot name") else {
            return Vec::new();
        };
        let mut names = Vec::new();
        unsafe {
            let mut cursor = (self.api.all_vecs)(name.as_ptr() as *mut c_char);
            if cursor.is_null() {
                return names;
            }
            while !(*cursor).is_null() {
                if let Some(n) = owned(*cursor) {
                    names.push(n);
                }
                cursor = cursor.add(1);
            }
        }
        names
    }

    fn vector(&mut self, name: &str) -> Result<Option<ResultVector>, SimulationError> {
        let text = c_string(name, "vector name")?;
        unsafe {
            let info = (self.api.vec_info)(text.as_ptr() as *mut c_char);
            match info.as_ref() {
                None => Ok(None),
                Some(info) => copy_vector(name, info).map(Some),
            }
        }
    }

    fn drain_output(&mut self) -> Vec<String> {
        NGSPICE_SINK.drain_output()
    }

    fn exit_status(&self) -> Option<i32> {
        NGSPICE_SINK.exit_status()
    }
}
