//! Read-eval loop driver
//!
//! Creates one session, wires its callbacks to a [`CallbackBridge`], submits
//! the bootstrap sentence and then alternates between reading a line and
//! submitting it. The loop ends only through the engine's exit event.
//!
//! [`host`] runs a driver over an owned registry and shuts the registry down
//! when the loop returns. A terminating exit hook ends the process from
//! inside the loop, so on that path the registry is never shut down and its
//! sessions live until process exit.
//!
//! ```text
//! Init ──start──▶ Running ──Exit(status)──▶ Terminated(status)
//! ```

use std::ffi::{CString, NulError};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::console::routes::{self, Route};
use crate::console::{CallbackBridge, DEFAULT_PROMPT};
use crate::engine::Engine;
use crate::interrupt::{ArmedInterrupt, CancelCounter, InterruptBridge};
use crate::registry::{Lease, Registry, RegistryError, SessionId};

pub mod bootstrap;

pub use bootstrap::{Bootstrap, StartupMode};

/// Driver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Init,
    Running,
    Terminated(i32),
}

/// Driver errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to create engine session: {0}")]
    Registry(#[from] RegistryError),

    #[error("driver already started")]
    AlreadyStarted,

    #[error("driver has no session; call start first")]
    NotStarted,

    #[error("sentence contains a NUL byte")]
    InteriorNul(#[from] NulError),
}

/// Driver options
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Prompt for each line read by the loop
    pub prompt: String,
    /// Route interrupt signals to the session's break cell
    pub handle_interrupts: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            handle_interrupts: true,
        }
    }
}

struct ActiveSession<E: Engine> {
    session: Lease<E>,
    _route: Route,
    interrupt: Option<ArmedInterrupt>,
}

impl<E: Engine> Drop for ActiveSession<E> {
    fn drop(&mut self) {
        if self.interrupt.is_some() {
            if let Err(e) = InterruptBridge::uninstall() {
                warn!("failed to remove interrupt handler: {}", e);
            }
        }
    }
}

/// Console read-eval loop over one engine session.
pub struct ReplDriver<E: Engine> {
    registry: Arc<Registry<E>>,
    bridge: Arc<CallbackBridge>,
    options: DriverOptions,
    active: Option<ActiveSession<E>>,
}

impl<E: Engine> ReplDriver<E> {
    pub fn new(
        registry: Arc<Registry<E>>,
        bridge: Arc<CallbackBridge>,
        options: DriverOptions,
    ) -> Self {
        Self {
            registry,
            bridge,
            options,
            active: None,
        }
    }

    pub fn state(&self) -> DriverState {
        match (&self.active, self.bridge.exit_status()) {
            (_, Some(status)) => DriverState::Terminated(status),
            (None, None) => DriverState::Init,
            (Some(_), None) => DriverState::Running,
        }
    }

    /// Id of the driven session once started.
    pub fn session(&self) -> Option<SessionId> {
        self.active.as_ref().map(|active| active.session.id())
    }

    pub fn bridge(&self) -> &Arc<CallbackBridge> {
        &self.bridge
    }

    /// Create the session, install callbacks and interrupt routing, and
    /// submit the bootstrap sentence once. Its status is not inspected.
    pub fn start(
        &mut self,
        bootstrap: &Bootstrap,
    ) -> Result<SessionId, DriverError> {
        if self.active.is_some() {
            return Err(DriverError::AlreadyStarted);
        }
        let sentence = CString::new(bootstrap.sentence())?;

        let id = self.registry.acquire()?;
        let session = self.registry.lookup(id)?;
        let route = routes::register(session.handle(), Arc::clone(&self.bridge));
        session.set_callbacks(&routes::callbacks());

        let counter = CancelCounter::resolve(&session);
        if counter.is_none() {
            warn!(session = %id, "engine instance exposes no break cell, interrupts disabled");
        }
        self.bridge.set_cancel_target(counter.clone());
        let interrupt = match counter {
            Some(counter) if self.options.handle_interrupts => match InterruptBridge::install() {
                Ok(()) => Some(InterruptBridge::arm(counter)),
                Err(e) => {
                    warn!("failed to install interrupt handler: {}", e);
                    None
                }
            },
            _ => None,
        };

        self.active = Some(ActiveSession {
            session: Arc::clone(&session),
            _route: route,
            interrupt,
        });

        debug!(session = %id, mode = ?bootstrap.mode(), "submitting bootstrap sentence");
        let status = session.execute(&sentence);
        debug!(session = %id, status, "bootstrap sentence finished");
        Ok(id)
    }

    /// Read one line and submit it; the engine's status is not inspected.
    pub fn step(&self) -> Result<(), DriverError> {
        let active = self.active.as_ref().ok_or(DriverError::NotStarted)?;
        let line = self.bridge.on_input_bytes(self.options.prompt.as_bytes());
        let sentence = CString::new(line)?;
        active.session.execute(&sentence);
        Ok(())
    }

    /// Step until the engine reports exit and return its status. With a
    /// terminating exit hook this never returns.
    pub fn run(&mut self) -> Result<i32, DriverError> {
        loop {
            if let Some(status) = self.bridge.exit_status() {
                return Ok(status);
            }
            self.step()?;
        }
    }
}

/// Start a driver over `registry`, run it until the engine exits and shut
/// the registry down. Returns the engine's exit status.
pub fn host<E: Engine>(
    registry: Registry<E>,
    bridge: Arc<CallbackBridge>,
    options: DriverOptions,
    bootstrap: &Bootstrap,
) -> Result<i32, DriverError> {
    let registry = Arc::new(registry);
    let result = {
        let mut driver = ReplDriver::new(Arc::clone(&registry), bridge, options);
        driver.start(bootstrap).and_then(|_| driver.run())
    };
    match Arc::try_unwrap(registry) {
        Ok(registry) => registry.shutdown(),
        Err(_) => warn!("session registry still shared, shutdown skipped"),
    }
    result
}

/// End the process with the engine's exit status.
pub fn terminate(status: i32) -> ! {
    debug!(status, "terminating");
    std::process::exit(status)
}
