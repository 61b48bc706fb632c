//! jsm: engine session manager and console host
//!
//! Hosts any number of instances of a dynamically loaded interpreter engine
//! under small integer session ids, and drives one of them as a console
//! read-eval loop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use jsm::console::{CallbackBridge, ConsoleConfig};
//! use jsm::engine::DynamicEngine;
//! use jsm::registry::{Registry, RegistryConfig};
//! use jsm::repl::{Bootstrap, DriverOptions, ReplDriver};
//!
//! fn main() -> jsm::Result<()> {
//!     let engine = Arc::new(DynamicEngine::load("/opt/j/bin/libj.so")?);
//!     let registry = Arc::new(Registry::init(engine, RegistryConfig::default())?);
//!     let bridge = Arc::new(CallbackBridge::stdio(&ConsoleConfig::default()));
//!     let mut driver = ReplDriver::new(registry, bridge, DriverOptions::default());
//!
//!     let args: Vec<String> = std::env::args().skip(1).collect();
//!     driver.start(&Bootstrap::new("jsm", &args, "/opt/j/bin".as_ref()))?;
//!     let status = driver.run()?;
//!     std::process::exit(status);
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod console;
pub mod engine;
pub mod interrupt;
pub mod registry;
pub mod repl;

// Utility modules
pub mod util;


// Re-exports
pub use anyhow::{Context, Result};
pub use engine::{DynamicEngine, Engine, EngineError};
pub use registry::{Registry, RegistryError, SessionId};
pub use repl::{Bootstrap, DriverError, ReplDriver};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Program name
pub const NAME: &str = "jsm";
