//! Interrupt bridge
//!
//! Delivers a cooperative break request to a running engine instance from a
//! context where only async-signal-safe work is allowed: no locks, no
//! allocation, no registry calls. The request is a single atomic increment of
//! the instance's break cell; the engine polls and clears that cell at its own
//! checkpoints. Nothing is forcibly unblocked or aborted.
//!
//! # Break cell contract (version 1)
//!
//! The first machine word of every engine instance holds the address of the
//! instance's break byte. This is the only assumption made about the
//! instance layout; the host increments the byte and never reads meaning
//! into it beyond that.
//!
//! ```text
//! instance ──▶ [ *break_cell | engine-private state ... ]
//!                   │
//!                   └──▶ u8 break cell  (host: +1, engine: poll/clear)
//! ```

use std::ffi::c_int;
use std::io;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::engine::Engine;
use crate::registry::Lease;

/// Version of the break cell layout contract with the engine.
pub const BREAK_CONTRACT_VERSION: u32 = 1;

/// Word offset of the break cell pointer inside an engine instance.
const BREAK_CELL_OFFSET: usize = 0;

/// Break cell the signal handler increments; null when nothing is armed.
static ACTIVE_TARGET: AtomicPtr<u8> = AtomicPtr::new(ptr::null_mut());

/// Every counter that was ever armed. A handler may still hold a target it
/// loaded before the disarm, so these instances are never freed.
static PINNED: Mutex<Vec<CancelCounter>> = parking_lot::const_mutex(Vec::new());

/// Capability to request cancellation of one engine instance.
///
/// Holds a lease on the session, so the instance (and its break cell) stays
/// alive for as long as the counter exists.
#[derive(Clone)]
pub struct CancelCounter {
    cell: NonNull<u8>,
    _lease: Arc<dyn Send + Sync>,
}

// SAFETY: the cell is only ever accessed through `AtomicU8`.
unsafe impl Send for CancelCounter {}
// SAFETY: see `Send`.
unsafe impl Sync for CancelCounter {}

impl std::fmt::Debug for CancelCounter {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CancelCounter")
            .field("cell", &self.cell)
            .finish_non_exhaustive()
    }
}

impl CancelCounter {
    /// Locate the break cell of a session's instance. `None` if the instance
    /// publishes a null break cell.
    pub fn resolve<E: Engine>(session: &Lease<E>) -> Option<Self> {
        let instance = session.handle().as_ptr().cast::<*mut u8>();
        // SAFETY: break cell contract v1; the instance starts with a
        // pointer-sized slot holding the break cell address, and the lease
        // keeps the instance alive.
        let cell = unsafe { instance.add(BREAK_CELL_OFFSET).read() };
        let cell = NonNull::new(cell)?;
        let lease: Arc<dyn Send + Sync> = session.clone();
        Some(Self {
            cell,
            _lease: lease,
        })
    }

    /// Increment the break cell by one and return its new value.
    ///
    /// Async-signal-safe and never blocks.
    #[inline]
    pub fn request_cancel(&self) -> u8 {
        bump(self.cell.as_ptr())
    }

    /// Current break cell value.
    pub fn value(&self) -> u8 {
        // SAFETY: the cell is live while the lease is held.
        unsafe { AtomicU8::from_ptr(self.cell.as_ptr()) }.load(Ordering::Relaxed)
    }
}

#[inline]
fn bump(cell: *mut u8) -> u8 {
    // SAFETY: callers only pass break cells of live instances.
    let cell = unsafe { AtomicU8::from_ptr(cell) };
    cell.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

/// Process-wide interrupt signal routing.
pub struct InterruptBridge;

impl InterruptBridge {
    /// Install the interrupt signal handler.
    pub fn install() -> io::Result<()> {
        // SAFETY: the handler only performs an atomic load, an atomic
        // increment and `signal`, all async-signal-safe.
        let previous = unsafe { libc::signal(libc::SIGINT, handler_address()) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        debug!("interrupt handler installed");
        Ok(())
    }

    /// Restore the default interrupt disposition.
    pub fn uninstall() -> io::Result<()> {
        // SAFETY: restoring the default disposition has no preconditions.
        let previous = unsafe { libc::signal(libc::SIGINT, libc::SIG_DFL) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        debug!("interrupt handler removed");
        Ok(())
    }

    /// Make `counter` the target of interrupt signals until the returned
    /// guard is dropped. The counter's session is kept alive for the rest of
    /// the process, even after it is released.
    pub fn arm(counter: CancelCounter) -> ArmedInterrupt {
        PINNED.lock().push(counter.clone());
        ACTIVE_TARGET.store(counter.cell.as_ptr(), Ordering::Release);
        ArmedInterrupt { counter }
    }

    /// Deliver one cancellation request to the armed target. Returns whether
    /// a target was armed. This is the whole body of the signal handler.
    pub fn deliver() -> bool {
        let target = ACTIVE_TARGET.load(Ordering::Acquire);
        if target.is_null() {
            return false;
        }
        bump(target);
        true
    }
}

/// An armed interrupt target; disarms on drop.
#[derive(Debug)]
pub struct ArmedInterrupt {
    counter: CancelCounter,
}

impl ArmedInterrupt {
    pub fn counter(&self) -> &CancelCounter {
        &self.counter
    }
}

impl Drop for ArmedInterrupt {
    fn drop(&mut self) {
        // Only disarm if no later arm replaced this target.
        let _ = ACTIVE_TARGET.compare_exchange(
            self.counter.cell.as_ptr(),
            ptr::null_mut(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

extern "C" fn on_interrupt(_signal: c_int) {
    InterruptBridge::deliver();
    // Some platforms reset the disposition after each delivery.
    // SAFETY: `signal` is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler_address());
    }
}

fn handler_address() -> libc::sighandler_t {
    on_interrupt as extern "C" fn(c_int) as libc::sighandler_t
}

#[cfg(test)]
mod tests;
