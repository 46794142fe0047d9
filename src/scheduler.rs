//! Scheduler/Driver: best-effort cadence sampling loop with no
//! double-sampling catch-up, rolling error counters, and a consecutive-error
//! abort threshold.

use crate::error::{SampleErrorKind, SessionError};
use crate::sampler::Sample;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// `None` means sample until the target exits.
    pub duration: Option<Duration>,
    /// Consecutive per-sample failures (across all threads combined) before
    /// the driver gives up and returns [`SessionError::ConsecutiveErrors`].
    pub max_consecutive_errors: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            duration: None,
            max_consecutive_errors: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub samples_ok: u64,
    pub samples_error: u64,
    pub last_error_kind: Option<SampleErrorKind>,
}

/// One tick's worth of per-thread results, handed to the driver's caller.
pub type TickResult = Vec<Result<Sample, SampleErrorKind>>;

/// Runs the sampling loop. `tick` is invoked once per interval and returns
/// one result per live thread; `on_sample` is invoked for every
/// successfully resolved [`Sample`]. `should_stop` lets the caller signal
/// cancellation (e.g. the target exited, or a `stop()` call came in) without
/// the driver owning any cross-thread state itself.
pub fn run(
    config: &SchedulerConfig,
    mut tick: impl FnMut() -> TickResult,
    mut on_sample: impl FnMut(&Sample) -> Result<(), SessionError>,
    mut should_stop: impl FnMut() -> bool,
) -> Result<SessionStats, SessionError> {
    let start = Instant::now();
    let mut stats = SessionStats::default();
    let mut consecutive_errors: u32 = 0;
    let mut next_tick = start;

    loop {
        if should_stop() {
            break;
        }
        if let Some(duration) = config.duration {
            if start.elapsed() >= duration {
                break;
            }
        }

        for result in tick() {
            match result {
                Ok(sample) => {
                    stats.samples_ok += 1;
                    consecutive_errors = 0;
                    on_sample(&sample)?;
                }
                Err(kind) => {
                    stats.samples_error += 1;
                    stats.last_error_kind = Some(kind);
                    consecutive_errors += 1;
                    log::debug!("discarding sample: {kind:?}");
                    if consecutive_errors >= config.max_consecutive_errors {
                        return Err(SessionError::ConsecutiveErrors(consecutive_errors));
                    }
                }
            }
        }

        // Best-effort cadence: advance to the next scheduled tick without
        // ever scheduling more than one catch-up tick when we fall behind.
        next_tick += config.interval;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborts_after_consecutive_error_threshold() {
        let config = SchedulerConfig {
            interval: Duration::from_millis(1),
            duration: None,
            max_consecutive_errors: 3,
        };
        let mut ticks = 0;
        let result = run(
            &config,
            || {
                ticks += 1;
                vec![Err(SampleErrorKind::MemoryFault)]
            },
            |_| Ok(()),
            || false,
        );
        assert!(matches!(result, Err(SessionError::ConsecutiveErrors(3))));
        assert_eq!(ticks, 3);
    }

    #[test]
    fn a_success_resets_the_consecutive_error_counter() {
        let config = SchedulerConfig {
            interval: Duration::from_millis(1),
            duration: None,
            max_consecutive_errors: 2,
        };
        let call = std::rc::Rc::new(std::cell::Cell::new(0));
        let call_in_tick = call.clone();
        let result = run(
            &config,
            move || {
                call_in_tick.set(call_in_tick.get() + 1);
                let n = call_in_tick.get();
                if n == 5 {
                    return vec![];
                }
                if n % 2 == 0 {
                    vec![Err(SampleErrorKind::MemoryFault)]
                } else {
                    vec![Err(SampleErrorKind::ThreadGone)]
                }
            },
            |_| Ok(()),
            move || call.get() > 4,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn stops_when_should_stop_reports_true() {
        let config = SchedulerConfig {
            interval: Duration::from_millis(1),
            duration: None,
            max_consecutive_errors: 100,
        };
        let stats = run(&config, || vec![], |_| Ok(()), || true).unwrap();
        assert_eq!(stats.samples_ok, 0);
    }
}
