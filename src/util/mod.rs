//! Utility modules and helpers

use std::io;
use std::path::PathBuf;

pub mod config;
pub mod logger;

/// Directory containing the running executable.
pub fn binary_dir() -> io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(PathBuf::from).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("executable path {} has no parent", exe.display()),
        )
    })
}
