//! Session API: the four operations the CLI front-end (or any other
//! embedder) drives the core through — `attach`, `spawn`, `start`, `stop`.
//! Session state (map, binary image, anchors, version) is built once at
//! attach time and never mutated afterward; only the cancellation and exit
//! flags are touched while sampling runs, and both are plain atomics rather
//! than a lock.

use crate::binary::{self, BinaryImage};
use crate::config::{SessionConfig, Target};
use crate::error::{ProbeError, ReadError, SessionError};
use crate::output::Sink;
use crate::probe::{Probe, ProbeResult};
use crate::process_map::{self, MappingInfo, MemoryMap};
use crate::remote::{self, BoundedReader, PlatformReader, RemoteAddress, RemoteMemoryReader, RemoteMemoryReaderExt};
use crate::runtime::cpython::{self, CPython};
use crate::sampler::Sampler;
use crate::scheduler::{self, SchedulerConfig, SessionStats, TickResult};
use crate::layout::{RuntimeFamily, VersionDescriptor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Caps the thread-state linked-list walk the same way frame walks are
/// capped, so a corrupted `next` pointer cannot spin the driver forever.
const MAX_THREADS: usize = 4096;

/// How long [`Session::spawn`] retries attaching to a just-started child
/// before giving up, to give the interpreter time to map its binary.
const SPAWN_ATTACH_TIMEOUT: Duration = Duration::from_secs(3);
const SPAWN_ATTACH_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// A live attachment to one target process, holding everything resolved at
/// attach time: the bounded memory reader, the selected runtime family and
/// version, and the cached thread-state-head address.
pub struct Session {
    pid: i32,
    reader: BoundedReader<PlatformReader>,
    family: Box<dyn RuntimeFamily>,
    version: VersionDescriptor,
    thread_state_head: RemoteAddress,
    cancel: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    /// Present only when this session spawned its own target; the reaper
    /// thread owns the `Child` and flips `exited` once it reaps it.
    _reaper: Option<std::thread::JoinHandle<()>>,
}

/// A cloneable, `'static` handle to a [`Session`]'s cancellation flag,
/// obtained via [`Session::cancel_handle`]. Holding this handle outside the
/// session lets e.g. a process-wide Ctrl+C handler request a stop without
/// borrowing the session itself.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Session {
    /// Builds a session from a [`SessionConfig`], dispatching to
    /// [`Session::attach`] or [`Session::spawn`] per its [`Target`].
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        let name_hint = config.resolved_name_hint();
        match &config.target {
            Target::Pid(pid) => Self::attach(*pid, &name_hint),
            Target::Spawn { argv } => Self::spawn(argv, &name_hint),
        }
    }

    /// Attaches to an already-running process by pid.
    pub fn attach(pid: i32, name_hint: &str) -> Result<Self, SessionError> {
        let mut session = Self::attach_once(pid, name_hint)?;
        session._reaper = None;
        Ok(session)
    }

    /// Spawns `argv[0]` with the remaining elements as arguments, then
    /// attaches to it, retrying briefly while the interpreter's binary
    /// maps into its own address space.
    pub fn spawn(argv: &[String], name_hint: &str) -> Result<Self, SessionError> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            SessionError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command line",
            ))
        })?;
        let child = std::process::Command::new(program)
            .args(args)
            .spawn()
            .map_err(SessionError::Spawn)?;
        let pid = child.id() as i32;

        let exited = Arc::new(AtomicBool::new(false));
        let reaper_flag = exited.clone();
        let reaper = std::thread::spawn(move || {
            let mut child = child;
            let _ = child.wait();
            reaper_flag.store(true, Ordering::SeqCst);
        });

        let deadline = std::time::Instant::now() + SPAWN_ATTACH_TIMEOUT;
        let mut last_err = None;
        loop {
            match Self::attach_once(pid, name_hint) {
                Ok(mut session) => {
                    session.exited = exited;
                    session._reaper = Some(reaper);
                    return Ok(session);
                }
                Err(err) => {
                    last_err = Some(err);
                    if std::time::Instant::now() >= deadline {
                        break;
                    }
                    std::thread::sleep(SPAWN_ATTACH_RETRY_INTERVAL);
                }
            }
        }
        Err(last_err.unwrap_or(SessionError::Spawn(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out attaching to spawned target",
        ))))
    }

    fn attach_once(pid: i32, name_hint: &str) -> Result<Self, SessionError> {
        let map = process_map::load_memory_map(pid)?;

        let mapping = map
            .select_binary(name_hint)
            .ok_or(crate::error::MapError::MapIncomplete(pid))?
            .clone();
        if map.heap().is_none() {
            return Err(crate::error::MapError::MapIncomplete(pid).into());
        }

        let path = mapping
            .path
            .clone()
            .ok_or(crate::error::MapError::MapIncomplete(pid))?;
        let data = std::fs::read(&path).map_err(|source| crate::error::MapError::Io {
            pid,
            source,
        })?;
        let binary = binary::parse_object(&data, mapping.start.0)?;

        let platform_reader = remote::open_platform_reader(pid)?;
        let reader = BoundedReader::new(platform_reader, pid, map.min_addr, map.max_addr);

        let family: Box<dyn RuntimeFamily> = Box::new(CPython);
        let hint = cpython::version_from_path(&path);
        let probe_result = probe_any_version(&reader, &map, &mapping, &binary, family.as_ref(), hint)?;

        Ok(Self {
            pid,
            reader,
            family,
            version: probe_result.version,
            thread_state_head: probe_result.thread_state_head,
            cancel: Arc::new(AtomicBool::new(false)),
            exited: Arc::new(AtomicBool::new(false)),
            _reaper: None,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Signals the running [`Session::start`] loop to stop at the next
    /// opportunity. Safe to call from a signal handler or another thread.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// A `'static`, cloneable handle that can call [`Session::stop`] from
    /// outside the session's lifetime, e.g. from a Ctrl+C handler installed
    /// by the CLI front-end.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Runs the sampling loop: one tick per `interval`, until `duration`
    /// elapses (`None` = until the target exits), writing every resolved
    /// [`crate::sampler::Sample`] to `sink` as a collapsed-stack line whose
    /// metric is the interval in microseconds.
    pub fn start(
        &self,
        interval: Duration,
        duration: Option<Duration>,
        max_consecutive_errors: u32,
        sink: &mut dyn Sink,
    ) -> Result<SessionStats, SessionError> {
        let config = SchedulerConfig {
            interval,
            duration,
            max_consecutive_errors,
        };
        let metric = interval.as_micros().max(1) as u64;
        let sampler = Sampler::new(&self.reader, self.family.as_ref());

        let stats = scheduler::run(
            &config,
            || self.tick(&sampler),
            |sample| sink.write_sample(sample, metric).map_err(SessionError::Output),
            || self.cancel.load(Ordering::SeqCst) || self.exited.load(Ordering::SeqCst),
        )?;
        sink.flush().map_err(SessionError::Output)?;
        Ok(stats)
    }

    /// Walks the interpreter's own thread-state linked list starting at the
    /// cached `thread_state_head`, producing one result per node.
    fn tick(&self, sampler: &Sampler<'_>) -> TickResult {
        let mut results = Vec::new();
        let mut current = Some(self.thread_state_head);
        let mut visited = 0usize;

        while let Some(addr) = current {
            if visited >= MAX_THREADS {
                break;
            }
            visited += 1;

            let tid_addr = addr.offset(self.version.thread.thread_id as u64);
            let tid = match self.reader.read_pod::<u64>(tid_addr) {
                Ok(value) => value as i32,
                Err(ReadError::NoSuchProcess(_)) => {
                    self.exited.store(true, Ordering::SeqCst);
                    break;
                }
                Err(_) => {
                    results.push(Err(crate::error::SampleErrorKind::ThreadGone));
                    break;
                }
            };

            let frame_addr = addr.offset(self.version.thread.current_frame as u64);
            let frame_ptr = match self.reader.read_pod::<u64>(frame_addr) {
                Ok(value) => value,
                Err(ReadError::NoSuchProcess(_)) => {
                    self.exited.store(true, Ordering::SeqCst);
                    break;
                }
                Err(_) => {
                    results.push(Err(crate::error::SampleErrorKind::ThreadGone));
                    break;
                }
            };

            if frame_ptr == 0 {
                results.push(Ok(crate::sampler::Sample {
                    pid: self.pid,
                    tid,
                    frames: Vec::new(),
                }));
            } else {
                results.push(sampler.sample(self.pid, tid, RemoteAddress(frame_ptr), &self.version));
            }

            let next_addr = addr.offset(self.version.thread.next as u64);
            current = match self.reader.read_pod::<u64>(next_addr) {
                Ok(0) | Err(_) => None,
                Ok(next) => Some(RemoteAddress(next)),
            };
        }

        results
    }
}

/// Tries the version hinted by the binary's filename first (if any), then
/// every tabulated version in order, accepting the first whose anchors
/// round-trip successfully.
fn probe_any_version(
    reader: &dyn RemoteMemoryReader,
    map: &MemoryMap,
    mapping: &MappingInfo,
    binary: &BinaryImage,
    family: &dyn RuntimeFamily,
    hint: Option<(u16, u16)>,
) -> Result<ProbeResult, ProbeError> {
    let probe = Probe::new(family);

    let mut order: Vec<(u16, u16)> = Vec::new();
    if let Some(h) = hint {
        order.push(h);
    }
    for v in family.version_table() {
        let pair = (v.major, v.minor);
        if Some(pair) != hint {
            order.push(pair);
        }
    }

    let mut last_err = ProbeError::RuntimeNotFound(0);
    for (major, minor) in order {
        match probe.find_anchors(reader, map, mapping, binary, major, minor) {
            Ok(result) => return Ok(result),
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}
