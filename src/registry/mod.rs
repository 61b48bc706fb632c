//! Session registry
//!
//! Maps small integer session ids to engine instances.
//!
//! # Guarantees
//!
//! - Ids are assigned from 0 in strictly increasing order, only once the
//!   engine factory has produced an instance, and are never reused.
//! - Storage grows in fixed-size chunks. Growth copies slot contents, never
//!   the instances themselves, so a handle looked up before a growth event is
//!   identical afterwards.
//! - `acquire` calls are serialized (the engine factory is not reentrant);
//!   lookups only take a short shared read of the table and never wait on a
//!   factory call.
//! - A session is a reference-counted lease. Releasing a session tears the
//!   instance down only after every outstanding lease (forwarded call, armed
//!   interrupt) has been dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::{Engine, EngineHandle};

mod forward;

/// Default number of slots added per growth step.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid session id {0}")]
    SessionNotFound(i64),

    #[error("session allocation failed: {0}")]
    AllocationFailure(String),

    #[error("session registry lock was abandoned")]
    LockAbandoned,
}

impl RegistryError {
    /// Sentinel status reported across the engine ABI.
    pub fn code(&self) -> i32 {
        match self {
            RegistryError::SessionNotFound(_) => -1,
            RegistryError::AllocationFailure(_) => -2,
            RegistryError::LockAbandoned => -3,
        }
    }
}

/// Stable identifier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(usize);

impl SessionId {
    /// Slot index in the registry.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SessionId> for i64 {
    fn from(id: SessionId) -> Self {
        id.0 as i64
    }
}

impl TryFrom<i64> for SessionId {
    type Error = RegistryError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        usize::try_from(raw)
            .map(SessionId)
            .map_err(|_| RegistryError::SessionNotFound(raw))
    }
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Slots added each time storage is exhausted
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Upper bound on sessions ever created
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_sessions: None,
        }
    }
}

/// One engine instance owned by the registry.
pub struct Session<E: Engine> {
    id: SessionId,
    handle: EngineHandle,
    engine: Arc<E>,
    released: AtomicBool,
}

/// Borrowed access to a session for the duration of a call.
pub type Lease<E> = Arc<Session<E>>;

impl<E: Engine> Session<E> {
    fn new(
        id: SessionId,
        handle: EngineHandle,
        engine: Arc<E>,
    ) -> Self {
        Self {
            id,
            handle,
            engine,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl<E: Engine> fmt::Debug for Session<E> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("released", &self.is_released())
            .finish()
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        // Unreleased sessions live until process teardown.
        if self.released.load(Ordering::Acquire) {
            let status = self.engine.free(self.handle);
            debug!(session = %self.id, status, "engine instance freed");
        }
    }
}

enum Slot<E: Engine> {
    Live(Lease<E>),
    Released,
}

/// Thread-safe table of engine sessions.
pub struct Registry<E: Engine> {
    engine: Arc<E>,
    config: RegistryConfig,
    /// Serializes `acquire`; poisoning marks an abandoned lock.
    acquire_lock: Mutex<()>,
    slots: RwLock<Vec<Slot<E>>>,
    growth_events: AtomicUsize,
}

impl<E: Engine> Registry<E> {
    /// Create the registry with one chunk of storage.
    pub fn init(
        engine: Arc<E>,
        mut config: RegistryConfig,
    ) -> Result<Self, RegistryError> {
        config.chunk_size = config.chunk_size.max(1);
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(config.chunk_size)
            .map_err(|e| RegistryError::AllocationFailure(e.to_string()))?;
        debug!(capacity = slots.capacity(), "session registry initialised");
        Ok(Self {
            engine,
            config,
            acquire_lock: Mutex::new(()),
            slots: RwLock::new(slots),
            growth_events: AtomicUsize::new(0),
        })
    }

    /// The engine sessions are created on.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Create a new engine instance and assign it the next session id.
    ///
    /// On any failure nothing is mutated and no id is consumed.
    pub fn acquire(&self) -> Result<SessionId, RegistryError> {
        let _guard = match self.acquire_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                drop(poisoned);
                warn!("session registry lock was abandoned by a panicking holder");
                self.acquire_lock.clear_poison();
                return Err(RegistryError::LockAbandoned);
            }
        };

        self.reserve_slot()?;

        let handle = self.engine.create().ok_or_else(|| {
            RegistryError::AllocationFailure("engine factory returned no instance".to_string())
        })?;

        let mut slots = self.slots.write();
        let id = SessionId(slots.len());
        slots.push(Slot::Live(Arc::new(Session::new(
            id,
            handle,
            Arc::clone(&self.engine),
        ))));
        debug!(session = %id, "session created");
        Ok(id)
    }

    /// Make sure one more slot fits without reallocating during the append.
    fn reserve_slot(&self) -> Result<(), RegistryError> {
        {
            let slots = self.slots.read();
            if let Some(max) = self.config.max_sessions {
                if slots.len() >= max {
                    return Err(RegistryError::AllocationFailure(format!(
                        "session limit of {} reached",
                        max
                    )));
                }
            }
            if slots.len() < slots.capacity() {
                return Ok(());
            }
        }

        let mut slots = self.slots.write();
        slots
            .try_reserve_exact(self.config.chunk_size)
            .map_err(|e| RegistryError::AllocationFailure(e.to_string()))?;
        self.growth_events.fetch_add(1, Ordering::Relaxed);
        debug!(capacity = slots.capacity(), "session table grown");
        Ok(())
    }

    /// Resolve a session id to a lease on its instance.
    pub fn lookup(&self, id: SessionId) -> Result<Lease<E>, RegistryError> {
        match self.slots.read().get(id.index()) {
            Some(Slot::Live(session)) => Ok(Arc::clone(session)),
            _ => Err(RegistryError::SessionNotFound(id.into())),
        }
    }

    /// Resolve a raw ABI id; negative ids are never valid.
    pub fn lookup_raw(&self, raw: i64) -> Result<Lease<E>, RegistryError> {
        self.lookup(SessionId::try_from(raw)?)
    }

    /// Release a session. The engine teardown runs once no lease remains.
    pub fn release(&self, id: SessionId) -> Result<(), RegistryError> {
        let session = {
            let mut slots = self.slots.write();
            let slot = slots
                .get_mut(id.index())
                .ok_or(RegistryError::SessionNotFound(id.into()))?;
            let Slot::Live(session) = std::mem::replace(slot, Slot::Released) else {
                return Err(RegistryError::SessionNotFound(id.into()));
            };
            session
        };
        session.released.store(true, Ordering::Release);
        debug!(
            session = %id,
            leases = Arc::strong_count(&session) - 1,
            "session released"
        );
        Ok(())
    }

    /// Highest id assigned so far.
    pub fn highest_assigned(&self) -> Option<SessionId> {
        self.slots.read().len().checked_sub(1).map(SessionId)
    }

    /// Number of ids assigned so far, released ones included.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current slot capacity.
    pub fn capacity(&self) -> usize {
        self.slots.read().capacity()
    }

    /// Number of times storage has grown past its initial chunk.
    pub fn growth_events(&self) -> usize {
        self.growth_events.load(Ordering::Relaxed)
    }

    /// Drop the backing storage. Sessions that were never released are not
    /// torn down; they live until the process exits.
    pub fn shutdown(self) {
        let slots = self.slots.into_inner();
        let live = slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count();
        debug!(sessions = slots.len(), live, "session registry shut down");
    }
}
