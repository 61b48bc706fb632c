//! Bootstrap sentence
//!
//! The first sentence a new session executes. It publishes the command line
//! as `ARGV_z_` and the host binary's directory as `BINPATH_z_`, then runs
//! the startup profile according to the startup mode.
//!
//! ```text
//! <prefix>[ARGV_z_=:<argv>[BINPATH_z_=:'<bindir>'
//! ```

use std::path::Path;

/// Startup profile script, relative to the binary directory.
pub const PROFILE_SCRIPT: &str = "profile.ijs";

/// Argument selecting an alternative profile (or none).
pub const PROFILE_FLAG: &str = "-jprofile";

/// How the session is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    /// Run `profile.ijs` from the binary directory
    Profile,
    /// `-jprofile FILE ...`: run the script named by the third argv element
    ScriptProfile,
    /// `-jprofile` alone: run nothing
    NoProfile,
}

impl StartupMode {
    /// Select the mode from the user arguments (program name excluded).
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        let first: Option<&str> = args.first().map(|arg| arg.as_ref());
        match first {
            Some(PROFILE_FLAG) if args.len() == 1 => StartupMode::NoProfile,
            Some(PROFILE_FLAG) => StartupMode::ScriptProfile,
            _ => StartupMode::Profile,
        }
    }

    fn prefix(self) -> String {
        match self {
            StartupMode::Profile => format!("(3 : '0!:0 y')<BINPATH,'/{}'", PROFILE_SCRIPT),
            StartupMode::ScriptProfile => "(3 : '0!:0 y')2{ARGV".to_string(),
            StartupMode::NoProfile => "i.0 0".to_string(),
        }
    }
}

/// Double every single quote so `text` can sit inside a quoted literal.
pub fn escape_quotes(text: &str) -> String {
    text.replace('\'', "''")
}

/// Quote one argument as a string literal.
pub fn quote(text: &str) -> String {
    format!("'{}'", escape_quotes(text))
}

/// Boxed list literal of the given items. A single item is made a
/// one-element list with `,<`.
pub fn argv_literal<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| quote(item.as_ref())).collect();
    let list = quoted.join(";");
    if items.len() == 1 {
        format!(",<{}", list)
    } else {
        list
    }
}

/// Everything needed to build the bootstrap sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    mode: StartupMode,
    argv: Vec<String>,
    bin_dir: String,
}

impl Bootstrap {
    pub fn new(
        program: impl Into<String>,
        args: &[String],
        bin_dir: &Path,
    ) -> Self {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program.into());
        argv.extend(args.iter().cloned());
        Self {
            mode: StartupMode::from_args(args),
            argv,
            bin_dir: bin_dir.to_string_lossy().into_owned(),
        }
    }

    pub fn mode(&self) -> StartupMode {
        self.mode
    }

    /// Program path followed by the user arguments.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn sentence(&self) -> String {
        format!(
            "{}[ARGV_z_=:{}[BINPATH_z_=:'{}'",
            self.mode.prefix(),
            argv_literal(&self.argv),
            escape_quotes(&self.bin_dir)
        )
    }
}
