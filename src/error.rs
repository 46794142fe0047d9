//! Typed errors for every component, aggregated into [`SessionError`] at the
//! boundary the driver and CLI actually see.
//!
//! Only two severities matter in practice: fatal at attach time, and
//! per-sample/per-thread discard. Nothing here needs to accumulate partial
//! results across a tree of sub-operations, so errors stay a flat enum
//! instead of an accumulating list.

use thiserror::Error;

/// Errors from the [`crate::remote::RemoteMemoryReader`] layer.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no such process: {0}")]
    NoSuchProcess(i32),
    #[error("permission denied reading process {pid}")]
    PermissionDenied { pid: i32 },
    #[error("fault reading {length} bytes at {address:#x} from process {pid}")]
    MemoryFault {
        pid: i32,
        address: usize,
        length: usize,
    },
    #[error("read of {length} bytes at {address:#x} from process {pid} returned only {got} bytes")]
    ShortRead {
        pid: i32,
        address: usize,
        length: usize,
        got: usize,
    },
}

/// Errors from the [`crate::process_map`] layer.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("no such process: {0}")]
    NoSuchProcess(i32),
    #[error("permission denied reading the memory map of process {0}")]
    PermissionDenied(i32),
    #[error("failed to read process map for {pid}")]
    Io {
        pid: i32,
        #[source]
        source: std::io::Error,
    },
    #[error("no executable mapping found for process {0}")]
    NoExecutableMapping(i32),
    #[error("could not parse mapping line: {0:?}")]
    MalformedLine(String),
    #[error("incomplete memory map for process {0}: no interpreter binary or no heap region found")]
    MapIncomplete(i32),
}

/// Errors from the [`crate::binary`] layer.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unrecognized or truncated object file format")]
    BadFormat(#[from] goblin::error::Error),
    #[error("object file carries no dynamic symbol table")]
    NoDynamicSymbols,
    #[error("failed to read {length} bytes at offset {offset} of the mapped object")]
    Truncated { offset: u64, length: u64 },
}

/// Errors from the [`crate::probe`] layer.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("runtime anchors not found in process {0}")]
    RuntimeNotFound(i32),
    #[error("runtime version {major}.{minor} has no known layout descriptor")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Top-level error the session API, driver and CLI all converge on.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("failed to spawn target: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
    #[error("too many consecutive sampling errors ({0}), aborting")]
    ConsecutiveErrors(u32),
}

/// Per-sample failure kind, used for the driver's rolling counters. Unlike
/// [`SessionError`] these never abort a session on their own; they are
/// counted and exposed through [`crate::session::SessionStats`].
///
/// `DepthExceeded` (`spec.md` §7) is deliberately absent here: its policy is
/// truncate-and-emit-with-a-sentinel rather than discard, so it surfaces as
/// an `Ok(Sample)` with a sentinel frame (see [`crate::sampler`]) instead of
/// one of these per-thread discard kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleErrorKind {
    MemoryFault,
    ThreadGone,
}

impl From<&ReadError> for SampleErrorKind {
    fn from(_: &ReadError) -> Self {
        SampleErrorKind::MemoryFault
    }
}

/// Exit codes the CLI front-end maps [`SessionError`] onto. Kept as a
/// `#[repr(i32)]` enum rather than bare constants so the mapping is
/// exhaustive and visible in one place.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    NoSuchProcess = 2,
    PermissionDenied = 3,
    BadFormat = 4,
    RuntimeNotFound = 5,
    UnsupportedVersion = 6,
    TooManyErrors = 7,
    SpawnFailed = 8,
    OutputFailed = 9,
}

impl From<&SessionError> for ExitCode {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::Read(ReadError::NoSuchProcess(_)) => ExitCode::NoSuchProcess,
            SessionError::Read(ReadError::PermissionDenied { .. }) => ExitCode::PermissionDenied,
            SessionError::Read(_) => ExitCode::PermissionDenied,
            SessionError::Map(MapError::NoSuchProcess(_)) => ExitCode::NoSuchProcess,
            SessionError::Map(MapError::PermissionDenied(_)) => ExitCode::PermissionDenied,
            SessionError::Map(MapError::MapIncomplete(_)) => ExitCode::RuntimeNotFound,
            SessionError::Map(_) => ExitCode::BadFormat,
            SessionError::Parse(_) => ExitCode::BadFormat,
            SessionError::Probe(ProbeError::RuntimeNotFound(_)) => ExitCode::RuntimeNotFound,
            SessionError::Probe(ProbeError::UnsupportedVersion { .. }) => {
                ExitCode::UnsupportedVersion
            }
            SessionError::Probe(ProbeError::Read(_)) => ExitCode::PermissionDenied,
            SessionError::Probe(ProbeError::Map(_)) => ExitCode::BadFormat,
            SessionError::Probe(ProbeError::Parse(_)) => ExitCode::BadFormat,
            SessionError::Spawn(_) => ExitCode::SpawnFailed,
            SessionError::Output(_) => ExitCode::OutputFailed,
            SessionError::ConsecutiveErrors(_) => ExitCode::TooManyErrors,
        }
    }
}
