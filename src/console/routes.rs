//! Engine callback routing
//!
//! The engine calls back with nothing but the instance handle, so bridges are
//! found through a process-wide table keyed by handle address. The lock is
//! only held long enough to clone the bridge out; callbacks themselves run
//! unlocked.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{CallbackBridge, OutputEvent};
use crate::engine::{Callbacks, EngineHandle, EngineInt, InputFn, OutputFn, OutputKind, SMCON};

static ROUTES: Lazy<RwLock<HashMap<usize, Arc<CallbackBridge>>>> = Lazy::new(Default::default);

/// Returned to an engine that asks for input on an instance with no bridge.
const UNROUTED_INPUT: &CStr = c"2!:55''";

/// Registration of a bridge for one instance; removed on drop.
#[derive(Debug)]
pub struct Route {
    addr: usize,
    bridge: Arc<CallbackBridge>,
}

impl Route {
    pub fn bridge(&self) -> &Arc<CallbackBridge> {
        &self.bridge
    }
}

impl Drop for Route {
    fn drop(&mut self) {
        let mut routes = ROUTES.write();
        let ours = routes
            .get(&self.addr)
            .is_some_and(|bridge| Arc::ptr_eq(bridge, &self.bridge));
        if ours {
            routes.remove(&self.addr);
            debug!(instance = self.addr, "callback route removed");
        }
    }
}

/// Route the engine's callbacks for `handle` to `bridge`, replacing any
/// earlier registration.
pub fn register(
    handle: EngineHandle,
    bridge: Arc<CallbackBridge>,
) -> Route {
    let addr = handle.addr();
    ROUTES.write().insert(addr, Arc::clone(&bridge));
    debug!(instance = addr, "callback route registered");
    Route { addr, bridge }
}

/// Callback table for a console session.
pub fn callbacks() -> Callbacks {
    Callbacks {
        output: Some(output_trampoline as OutputFn),
        input: Some(input_trampoline as InputFn),
        options: SMCON,
        ..Callbacks::default()
    }
}

fn route(instance: *mut c_void) -> Option<Arc<CallbackBridge>> {
    ROUTES.read().get(&(instance as usize)).cloned()
}

/// Output callback handed to the engine.
///
/// # Safety
///
/// `text` is null or a NUL-terminated string, except for exit events where it
/// carries the status as a pointer-sized integer.
pub unsafe extern "system" fn output_trampoline(
    instance: *mut c_void,
    kind: c_int,
    text: *const c_char,
) {
    let Some(bridge) = route(instance) else {
        warn!(instance = instance as usize, kind, "output from unrouted engine instance");
        return;
    };
    let event = match OutputKind::from_raw(kind) {
        OutputKind::Exit => OutputEvent::Exit(text as EngineInt as i32),
        kind => {
            let payload = if text.is_null() {
                &[][..]
            } else {
                // SAFETY: non-exit text is NUL-terminated per the caller contract.
                unsafe { CStr::from_ptr(text) }.to_bytes()
            };
            OutputEvent::Text { kind, payload }
        }
    };
    bridge.on_output(event);
}

/// Input callback handed to the engine.
///
/// # Safety
///
/// `prompt` is null or a NUL-terminated string.
pub unsafe extern "system" fn input_trampoline(
    instance: *mut c_void,
    prompt: *const c_char,
) -> *const c_char {
    let Some(bridge) = route(instance) else {
        warn!(instance = instance as usize, "input request from unrouted engine instance");
        return UNROUTED_INPUT.as_ptr();
    };
    let prompt = if prompt.is_null() {
        &[][..]
    } else {
        // SAFETY: NUL-terminated per the caller contract.
        unsafe { CStr::from_ptr(prompt) }.to_bytes()
    };
    bridge.on_input_raw(prompt)
}
