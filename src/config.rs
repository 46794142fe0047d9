//! Session configuration, built by the CLI front-end from `clap` and handed
//! to the core as one value rather than raw `clap::ArgMatches`.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted when more than one mapped binary could
/// plausibly be the interpreter, overriding the name-substring heuristic in
/// [`crate::process_map::MemoryMap::select_binary`].
pub const INTERPRETER_BIN_ENV: &str = "STACKSHOT_INTERPRETER_BIN";

#[derive(Debug, Clone)]
pub enum Target {
    Pid(i32),
    Spawn { argv: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub target: Target,
    pub interval: Duration,
    pub duration: Option<Duration>,
    pub output: Option<PathBuf>,
    pub interpreter_name_hint: String,
    pub max_consecutive_errors: u32,
}

impl SessionConfig {
    /// The name fragment used to pick the interpreter binary out of the
    /// target's mapped images, honoring [`INTERPRETER_BIN_ENV`] when set.
    pub fn resolved_name_hint(&self) -> String {
        std::env::var(INTERPRETER_BIN_ENV).unwrap_or_else(|_| self.interpreter_name_hint.clone())
    }
}
