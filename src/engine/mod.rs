//! Engine boundary
//!
//! The interpreter engine is an external library. This module describes what
//! the host needs from it as the [`Engine`] trait, working on an opaque
//! [`EngineHandle`]. [`DynamicEngine`] is the production implementation,
//! backed by a library loaded at startup.
//!
//! # Architecture
//!
//! ```text
//! Registry ──acquire──▶ Engine::create ──▶ EngineHandle
//!    │
//!    └─lookup(id)──▶ Session lease ──▶ Engine::execute / locale / ...
//!                                  ▲
//! engine callbacks ◀── Callbacks ──┘ (output / input trampolines)
//! ```

use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::PathBuf;
use std::ptr::{self, NonNull};

use thiserror::Error;

use crate::registry::RegistryError;

pub mod library;

pub use library::{default_library_path, DynamicEngine, LIBRARY_NAME};

/// Pointer-sized engine integer (`I` in the engine headers).
pub type EngineInt = isize;

/// Engine array value (`A` in the engine headers), owned by the engine.
pub type EngineArray = *mut c_void;

/// Output callback: `(instance, output kind, text)`.
pub type OutputFn = unsafe extern "system" fn(*mut c_void, c_int, *const c_char);

/// Input callback: `(instance, prompt) -> line`.
pub type InputFn = unsafe extern "system" fn(*mut c_void, *const c_char) -> *const c_char;

/// Session option selecting the console front end.
pub const SMCON: EngineInt = 3;

/// Opaque reference to one engine instance.
///
/// Handles are produced by [`Engine::create`] and owned by the registry.
/// They are only dereferenced by the engine itself and by the break cell
/// contract in [`crate::interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(NonNull<c_void>);

// SAFETY: the handle is an opaque token; every access to the instance behind
// it goes through the engine, which the registry never calls concurrently for
// the same session from the driver.
unsafe impl Send for EngineHandle {}
// SAFETY: see `Send`.
unsafe impl Sync for EngineHandle {}

impl EngineHandle {
    /// Wrap a raw instance pointer, rejecting null.
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// The raw instance pointer as handed to the engine.
    #[inline]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Address of the instance, used as a routing key.
    #[inline]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// Callback table in the layout the engine expects: five pointer-sized slots.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Callbacks {
    /// Output handler
    pub output: Option<OutputFn>,
    /// Window driver hook (unused by the console)
    pub window_driver: *const c_void,
    /// Input handler
    pub input: Option<InputFn>,
    /// Poll hook (unused by the console)
    pub poll: *const c_void,
    /// Session options (front end type)
    pub options: EngineInt,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            output: None,
            window_driver: ptr::null(),
            input: None,
            poll: ptr::null(),
            options: 0,
        }
    }
}

/// Class of an output event as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Formatted result
    Formatted,
    /// Error text
    Error,
    /// Session log echo
    Log,
    /// System assertion failure
    System,
    /// Exit request; the text argument carries the status
    Exit,
    /// File output
    File,
    /// Unrecognised code
    Other(c_int),
}

impl OutputKind {
    /// Decode the engine's output type code.
    pub fn from_raw(code: c_int) -> Self {
        match code {
            1 => OutputKind::Formatted,
            2 => OutputKind::Error,
            3 => OutputKind::Log,
            4 => OutputKind::System,
            5 => OutputKind::Exit,
            6 => OutputKind::File,
            other => OutputKind::Other(other),
        }
    }

    /// The engine's output type code.
    pub fn as_raw(self) -> c_int {
        match self {
            OutputKind::Formatted => 1,
            OutputKind::Error => 2,
            OutputKind::Log => 3,
            OutputKind::System => 4,
            OutputKind::Exit => 5,
            OutputKind::File => 6,
            OutputKind::Other(code) => code,
        }
    }
}

/// Type, rank, shape and data descriptors of a named value in
/// multi-dimensional form. Shape and data are engine-owned addresses.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NounDescriptor {
    pub jtype: EngineInt,
    pub rank: EngineInt,
    pub shape: EngineInt,
    pub data: EngineInt,
}

/// Operations of an engine library.
///
/// Handles passed to these methods must come from [`Engine::create`] on the
/// same engine and must not have been freed. The registry upholds this by
/// only handing out handles through session leases.
pub trait Engine: Send + Sync + 'static {
    /// Construct a new instance; `None` when the engine could not allocate one.
    fn create(&self) -> Option<EngineHandle>;

    /// Install the callback table for an instance.
    fn set_callbacks(
        &self,
        handle: EngineHandle,
        callbacks: &Callbacks,
    );

    /// Execute a sentence; the integer status is the engine's own.
    fn execute(
        &self,
        handle: EngineHandle,
        sentence: &CStr,
    ) -> c_int;

    /// Current locale name.
    fn locale(&self, handle: EngineHandle) -> Option<String>;

    /// Read a named value as an engine array.
    fn get_array(
        &self,
        handle: EngineHandle,
        name: &CStr,
    ) -> EngineArray;

    /// Assign a named value from serialized data.
    fn set_array(
        &self,
        handle: EngineHandle,
        name: &CStr,
        data: &[u8],
    ) -> EngineInt;

    /// Read a named value in multi-dimensional form.
    fn get_noun(
        &self,
        handle: EngineHandle,
        name: &CStr,
        noun: &mut NounDescriptor,
    ) -> c_int;

    /// Assign a named value from multi-dimensional form.
    fn set_noun(
        &self,
        handle: EngineHandle,
        name: &CStr,
        noun: &mut NounDescriptor,
    ) -> c_int;

    /// Allocate an engine array of the given type, element count and shape.
    fn allocate_array(
        &self,
        handle: EngineHandle,
        jtype: EngineInt,
        count: EngineInt,
        shape: &[EngineInt],
    ) -> EngineArray;

    /// Look up the text of an error code; `text` receives the engine address.
    fn error_text(
        &self,
        handle: EngineHandle,
        code: EngineInt,
        text: &mut EngineInt,
    ) -> c_int;

    fn transpose(
        &self,
        handle: EngineHandle,
        flag: EngineInt,
    ) -> c_int;

    /// The engine's own break request.
    fn interrupt(&self, handle: EngineHandle) -> c_int;

    fn clear(&self, handle: EngineHandle) -> c_int;

    fn is_busy(&self, handle: EngineHandle) -> c_int;

    /// Tear the instance down.
    fn free(&self, handle: EngineHandle) -> c_int;
}

/// Engine boundary errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load engine library {}: {source}", .path.display())]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("engine library is missing symbol `{name}`: {source}")]
    MissingSymbol {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("text passed to the engine contains a NUL byte")]
    InteriorNul(#[from] std::ffi::NulError),

    #[error(transparent)]
    Session(#[from] RegistryError),
}
