//! stackshot: an external, non-invasive sampling profiler for interpreted
//! runtimes. Attaches to (or spawns) a target process, periodically reads
//! its stack out of raw process memory with no ptrace-stop, no debugger
//! attach, and no code injection, and emits collapsed-stack lines.
//!
//! The crate is organized the way the probe actually walks a target:
//! [`process_map`] finds where things are mapped, [`binary`] parses the
//! selected image, [`probe`] locates the runtime's anchor structures,
//! [`sampler`] walks one thread's frame chain, and [`scheduler`] drives the
//! cadence. [`session`] wires all of it into the four operations
//! (`attach`/`spawn`/`start`/`stop`) the CLI front-end in `src/bin/` drives.

pub mod binary;
pub mod config;
pub mod error;
pub mod layout;
pub mod output;
pub mod probe;
pub mod process_map;
pub mod remote;
pub mod runtime;
pub mod sampler;
pub mod scheduler;
pub mod session;

#[cfg(target_os = "macos")]
mod mac;

pub use config::{SessionConfig, Target, INTERPRETER_BIN_ENV};
pub use error::{ExitCode, MapError, ParseError, ProbeError, ReadError, SampleErrorKind, SessionError};
pub use output::{Sink, WriterSink};
pub use scheduler::SessionStats;
pub use session::{CancelHandle, Session};
