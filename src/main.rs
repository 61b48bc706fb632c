//! jsm - console host for the interpreter engine

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use jsm::console::CallbackBridge;
use jsm::engine::DynamicEngine;
use jsm::registry::Registry;
use jsm::repl::{self, Bootstrap, DriverError, DriverOptions};
use jsm::util::config::{self, LIBRARY_ENV};
use jsm::util::logger::{self, LogLevel};
use jsm::{util, NAME, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Console host for a dynamically loaded interpreter engine
///
/// Everything from the first engine argument on is passed to the engine
/// untouched, `-jprofile` included.
#[derive(Parser, Debug)]
#[command(name = NAME)]
#[command(version = VERSION)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Configuration file (default: ~/.config/jsm/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Engine library to load (JEPATH takes precedence)
    #[arg(long, value_name = "PATH")]
    engine: Option<PathBuf>,

    /// Log level for host diagnostics on stderr
    #[arg(long, value_enum, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Arguments for the engine session
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    args: Vec<String>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Print version
    #[arg(long, action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() {
    let args = Args::parse();

    match run(args) {
        Ok(status) => repl::terminate(status),
        Err(e) => {
            eprintln!("{}: {:#}", NAME, e);
            repl::terminate(1)
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let mut config = match &args.config {
        Some(path) => config::load_from_path(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => config::load_user_config().context("Failed to load user config")?,
    };
    if let Some(engine) = args.engine {
        config.engine.library = Some(engine);
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(0);
    }

    logger::init_with_level(config.log.level);
    debug!("{} {} starting", NAME, VERSION);

    let library = config
        .library_path(std::env::var_os(LIBRARY_ENV))
        .context("Failed to locate the engine library")?;
    let engine = Arc::new(DynamicEngine::load(&library)?);
    let registry = Registry::init(engine, config.registry.clone())?;

    let bridge = CallbackBridge::stdio(&config.console).with_exit_hook(|status| {
        repl::terminate(status);
    });
    let options = DriverOptions {
        prompt: config.console.prompt.clone(),
        handle_interrupts: config.interrupt.enabled,
    };
    let program = std::env::args_os()
        .next()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_else(|| NAME.to_string());
    let bin_dir = util::binary_dir().context("Failed to locate the host binary")?;
    let bootstrap = Bootstrap::new(program, &args.args, &bin_dir);

    match repl::host(registry, Arc::new(bridge), options, &bootstrap) {
        Ok(status) => Ok(status),
        Err(e @ DriverError::Registry(_)) => {
            Err(anyhow::Error::new(e).context("Library initialization failure"))
        }
        Err(e) => Err(e.into()),
    }
}
