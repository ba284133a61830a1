//! Fixed-phase frame pacer.
//!
//! Keeps an absolute schedule of deadlines `t0 + k * interval` instead of
//! sleeping a fixed delay after each iteration, so jitter below the
//! deadline does not accumulate into drift. When an iteration overruns,
//! the schedule is re-anchored on the overrun's completion time and the
//! backlog is dropped rather than caught up.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

// ── StageTimings ─────────────────────────────────────────────────

/// Per-stage durations of one video iteration, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub grab: Duration,
    pub composite: Duration,
    pub convert: Duration,
    pub encode: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.grab + self.composite + self.convert + self.encode
    }
}

// ── Pace ─────────────────────────────────────────────────────────

/// What the pacer decided after an iteration completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Finished before the deadline; sleep this long.
    OnTime { sleep: Duration },
    /// Finished after the deadline by `late_by`; no sleep.
    Overrun { late_by: Duration },
}

// ── PacerStats ───────────────────────────────────────────────────

/// Counters reported when a paced loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacerStats {
    pub iterations: u64,
    pub overruns: u64,
}

// ── FramePacer ───────────────────────────────────────────────────

/// Phase-locked scheduler for a fixed-rate loop.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    target: Instant,
}

impl FramePacer {
    /// Start a schedule whose first deadline is `now + interval`.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            target: now + interval,
        }
    }

    /// Frame interval for `fps` frames per second.
    pub fn interval_for(fps: u32) -> Duration {
        Duration::from_secs(1) / fps.max(1)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The current deadline.
    pub fn target(&self) -> Instant {
        self.target
    }

    /// Record an iteration that finished at `finished_at` and advance
    /// the schedule.
    pub fn complete(&mut self, finished_at: Instant) -> Pace {
        if finished_at > self.target {
            let late_by = finished_at - self.target;
            self.target = finished_at + self.interval;
            Pace::Overrun { late_by }
        } else {
            let sleep = self.target - finished_at;
            self.target += self.interval;
            Pace::OnTime { sleep }
        }
    }

    /// Drive `iteration` at the pacer's rate until `cancel` fires or the
    /// iteration fails.
    ///
    /// The token is checked once per iteration; an iteration in progress
    /// always runs to completion. Counters are returned alongside the
    /// outcome so a failed loop still reports how far it got.
    pub fn run<F, E>(mut self, cancel: &CancellationToken, mut iteration: F) -> (PacerStats, Result<(), E>)
    where
        F: FnMut() -> Result<StageTimings, E>,
    {
        let mut stats = PacerStats::default();

        while !cancel.is_cancelled() {
            let timings = match iteration() {
                Ok(timings) => timings,
                Err(e) => return (stats, Err(e)),
            };
            stats.iterations += 1;

            match self.complete(Instant::now()) {
                Pace::OnTime { sleep } => {
                    trace!(?sleep, "frame on time");
                    std::thread::sleep(sleep);
                }
                Pace::Overrun { late_by } => {
                    stats.overruns += 1;
                    warn!(
                        late_ms = late_by.as_secs_f64() * 1e3,
                        grab_ms = timings.grab.as_secs_f64() * 1e3,
                        composite_ms = timings.composite.as_secs_f64() * 1e3,
                        convert_ms = timings.convert.as_secs_f64() * 1e3,
                        encode_ms = timings.encode.as_secs_f64() * 1e3,
                        "frame delayed"
                    );
                }
            }
        }

        (stats, Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn interval_for_sixty_fps() {
        let interval = FramePacer::interval_for(60);
        assert_eq!(interval.as_nanos(), 16_666_666);
        assert_eq!(FramePacer::interval_for(0), Duration::from_secs(1));
    }

    #[test]
    fn fast_iterations_stay_phase_locked() {
        let interval = 16 * MS;
        let t0 = Instant::now();
        let mut pacer = FramePacer::new(interval, t0);

        // iteration k starts at t0 + k*interval (after the previous sleep)
        // and takes a varying amount of time below the budget
        let mut start = t0;
        for k in 0..100u32 {
            let work = MS * (k % 7 + 1);
            let pace = pacer.complete(start + work);
            let Pace::OnTime { sleep } = pace else {
                panic!("iteration {k} reported an overrun");
            };
            start = start + work + sleep;
            assert_eq!(start, t0 + interval * (k + 1));
        }
        assert_eq!(pacer.target(), t0 + interval * 101);
    }

    #[test]
    fn overrun_resets_schedule_without_backlog() {
        let interval = 16 * MS;
        let t0 = Instant::now();
        let mut pacer = FramePacer::new(interval, t0);

        // first iteration overruns its deadline by 40ms
        let finished = t0 + interval + 40 * MS;
        assert_eq!(
            pacer.complete(finished),
            Pace::Overrun { late_by: 40 * MS }
        );
        assert_eq!(pacer.target(), finished + interval);

        // a fast iteration afterwards is measured against the new anchor
        let pace = pacer.complete(finished + 2 * MS);
        assert_eq!(pace, Pace::OnTime { sleep: 14 * MS });
        assert_eq!(pacer.target(), finished + 2 * interval);
    }

    #[test]
    fn finishing_exactly_on_target_is_on_time() {
        let t0 = Instant::now();
        let mut pacer = FramePacer::new(10 * MS, t0);
        assert_eq!(
            pacer.complete(t0 + 10 * MS),
            Pace::OnTime { sleep: Duration::ZERO }
        );
    }

    #[test]
    fn run_keeps_real_time_rate() {
        let interval = 5 * MS;
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let pacer = FramePacer::new(interval, start);

        let mut n = 0;
        let (stats, result) = pacer.run(&cancel, || {
            n += 1;
            if n == 20 {
                cancel.cancel();
            }
            Ok::<_, ()>(StageTimings::default())
        });

        assert_eq!(result, Ok(()));

        let elapsed = start.elapsed();
        assert_eq!(stats.iterations, 20);
        assert!(elapsed >= interval * 20, "ran too fast: {elapsed:?}");
        assert!(elapsed < interval * 20 + 500 * MS, "ran too slow: {elapsed:?}");
    }

    #[test]
    fn run_counts_overruns_and_propagates_errors() {
        let cancel = CancellationToken::new();
        let pacer = FramePacer::new(MS, Instant::now());

        let mut n = 0;
        let (stats, result) = pacer.run(&cancel, || {
            n += 1;
            if n == 3 {
                return Err("encoder gone");
            }
            std::thread::sleep(3 * MS);
            Ok(StageTimings::default())
        });

        assert_eq!(result, Err("encoder gone"));
        // both completed iterations took longer than the 1ms budget
        assert_eq!(stats, PacerStats { iterations: 2, overruns: 2 });
    }

    #[test]
    fn run_exits_immediately_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (stats, result) = FramePacer::new(MS, Instant::now())
            .run(&cancel, || -> Result<StageTimings, ()> { panic!("should not iterate") });
        assert_eq!(result, Ok(()));
        assert_eq!(stats, PacerStats::default());
    }
}
