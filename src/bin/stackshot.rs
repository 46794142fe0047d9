//! Thin CLI front-end: parses arguments with `clap`, builds a
//! [`SessionConfig`], and drives the `attach`/`spawn`/`start` session API.
//! Kept deliberately small — everything that matters lives in the library.

use clap::Parser;
use stackshot::{ExitCode, Session, SessionConfig, SessionError, Sink, Target, WriterSink};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

/// Process exit code for CLI usage errors, independent of [`ExitCode`]
/// (those cover session failures, not argument mistakes).
const EX_USAGE: i32 = 64;

#[derive(Parser, Debug)]
#[command(
    name = "stackshot",
    version,
    about = "External, non-invasive sampling profiler for interpreted runtimes"
)]
struct Cli {
    /// Attach to an already-running process by pid.
    #[arg(long)]
    pid: Option<i32>,

    /// Sampling interval, e.g. "10ms", "1s".
    #[arg(long, default_value = "10ms", value_parser = parse_duration)]
    rate: Duration,

    /// How long to sample, e.g. "30s". Absent or "0s" means until the
    /// target exits.
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Where to write collapsed-stack lines. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Name fragment used to pick the interpreter binary out of the
    /// target's mapped images (overridden by `STACKSHOT_INTERPRETER_BIN`).
    #[arg(long, default_value = "python")]
    interpreter_name_hint: String,

    /// Consecutive per-sample failures tolerated before the session aborts.
    #[arg(long, default_value_t = 50)]
    max_consecutive_errors: u32,

    /// A command (and its arguments) to spawn and attach to. Mutually
    /// exclusive with `--pid`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|err| err.to_string())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let target = match (cli.pid, cli.command.is_empty()) {
        (Some(pid), true) => Target::Pid(pid),
        (None, false) => Target::Spawn {
            argv: cli.command.clone(),
        },
        (Some(_), false) => {
            eprintln!("--pid and a command to spawn are mutually exclusive");
            std::process::exit(EX_USAGE);
        }
        (None, true) => {
            eprintln!("either --pid <PID> or a command to spawn is required");
            std::process::exit(EX_USAGE);
        }
    };

    let config = SessionConfig {
        target,
        interval: cli.rate,
        duration: cli.duration.filter(|d| !d.is_zero()),
        output: cli.output,
        interpreter_name_hint: cli.interpreter_name_hint,
        max_consecutive_errors: cli.max_consecutive_errors,
    };

    match run(&config) {
        Ok(stats) => {
            log::info!(
                "session complete: {} sampled, {} discarded",
                stats.samples_ok,
                stats.samples_error
            );
            std::process::exit(ExitCode::Ok as i32);
        }
        Err(err) => {
            log::error!("{err}");
            std::process::exit(ExitCode::from(&err) as i32);
        }
    }
}

fn run(config: &SessionConfig) -> Result<stackshot::SessionStats, SessionError> {
    let session = Session::new(config)?;
    log::info!("attached to pid {}", session.pid());

    // Cancellation is signal-driven. The handler only ever flips a flag the
    // driver observes between samples; it never touches an in-flight remote
    // read.
    let cancel = session.cancel_handle();
    if let Err(err) = ctrlc::set_handler(move || cancel.stop()) {
        log::warn!("failed to install Ctrl+C handler: {err}");
    }

    let mut sink = open_sink(config)?;
    session.start(
        config.interval,
        config.duration,
        config.max_consecutive_errors,
        sink.as_mut(),
    )
}

fn open_sink(config: &SessionConfig) -> Result<Box<dyn Sink>, SessionError> {
    match &config.output {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(SessionError::Output)?;
            Ok(Box::new(WriterSink::new(BufWriter::new(file))))
        }
        None => Ok(Box::new(WriterSink::new(BufWriter::new(io::stdout())))),
    }
}
