//! Fixed-rate clock that feeds elapsed time to game timers.
//!
//! The clock owns no timers. The server loop awaits
//! [`TickScheduler::wait_for_tick`] and advances its timers by the
//! [`TickInfo::elapsed`] it gets back. A rate of 0 means the clock is
//! stopped: the wait never resolves, and timers only move when their owner
//! advances them by hand.
//!
//! `wait_for_tick` is cancel-safe. Dropping the future before it resolves
//! leaves the schedule untouched, so it can sit in a `select!` next to a
//! command channel.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// How to reschedule after waking up more than a tenth of a period late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatePolicy {
    /// The next tick is due one period after the late wake-up.
    #[default]
    Resync,
    /// The next tick stays on the original grid, so a backlog fires back
    /// to back until the clock has caught up.
    KeepCadence,
}

/// Clock settings, usually part of the server config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Ticks per second. 0 stops the clock.
    pub tick_rate_hz: u32,
    pub late_policy: LatePolicy,
    /// Upper bound (µs) of a random offset applied to the first tick.
    pub start_jitter_us: u64,
    /// Warn when handling one tick takes this fraction of a period or more.
    pub budget_warn_fraction: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 0,
            late_policy: LatePolicy::default(),
            start_jitter_us: 2_000,
            budget_warn_fraction: 0.8,
        }
    }
}

impl TickConfig {
    /// Game timers display whole tenths of a second at best.
    pub const MAX_RATE_HZ: u32 = 100;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Self::default()
        }
    }

    /// The same config with the rate capped at [`Self::MAX_RATE_HZ`] and the
    /// budget fraction kept within `0.0..=1.0`.
    pub fn clamped(self) -> Self {
        if self.tick_rate_hz > Self::MAX_RATE_HZ {
            warn!(
                requested = self.tick_rate_hz,
                max = Self::MAX_RATE_HZ,
                "tick rate capped"
            );
        }
        Self {
            tick_rate_hz: self.tick_rate_hz.min(Self::MAX_RATE_HZ),
            budget_warn_fraction: self.budget_warn_fraction.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Time between ticks, or `None` for a stopped clock.
    pub fn period(&self) -> Option<Duration> {
        match self.tick_rate_hz {
            0 => None,
            hz => Some(Duration::from_secs(1) / hz),
        }
    }
}

/// What [`TickScheduler::wait_for_tick`] resolved with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInfo {
    /// 1 for the first tick.
    pub tick: u64,
    pub period: Duration,
    /// Time since the previous tick, or since the clock was created or
    /// resumed. Timers advance by this, not by `period`.
    pub elapsed: Duration,
    /// The wake-up came more than a tenth of a period after it was due.
    pub late: bool,
    /// Whole periods that went by without a tick.
    pub missed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub ticks: u64,
    pub late_ticks: u64,
    pub missed_ticks: u64,
    /// Longest wall-clock time between a tick resolving and
    /// [`TickScheduler::record_tick_end`].
    pub slowest_tick: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Stopped,
    Running { due: Instant },
    Paused,
}

pub struct TickScheduler {
    config: TickConfig,
    period: Option<Duration>,
    phase: Phase,
    tick: u64,
    since: Instant,
    /// Wall clock, so paused test time does not hide slow handling.
    busy_since: Option<std::time::Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.clamped();
        let period = config.period();
        let now = Instant::now();
        let phase = match period {
            Some(period) => {
                let jitter = match config.start_jitter_us {
                    0 => Duration::ZERO,
                    max => Duration::from_micros(rand::rng().random_range(0..max)),
                };
                Phase::Running {
                    due: now + period + jitter,
                }
            }
            None => Phase::Stopped,
        };
        debug!(
            rate_hz = config.tick_rate_hz,
            policy = ?config.late_policy,
            "tick clock created"
        );

        Self {
            config,
            period,
            phase,
            tick: 0,
            since: now,
            busy_since: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Resolves at the next tick. Never resolves while stopped or paused.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (Phase::Running { due }, Some(period)) = (self.phase, self.period) else {
            return std::future::pending().await;
        };
        time::sleep_until(due).await;

        let now = Instant::now();
        let lateness = now.saturating_duration_since(due);
        let late = lateness > period / 10;
        let missed = if late {
            (lateness.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };
        let next_due = match self.config.late_policy {
            LatePolicy::Resync => now + period,
            LatePolicy::KeepCadence => due + period,
        };

        self.phase = Phase::Running { due: next_due };
        self.tick += 1;
        let elapsed = now.saturating_duration_since(self.since);
        self.since = now;
        self.busy_since = Some(std::time::Instant::now());

        self.metrics.ticks += 1;
        if late {
            self.metrics.late_ticks += 1;
            self.metrics.missed_ticks += missed;
        }
        if missed > 0 {
            warn!(
                tick = self.tick,
                missed,
                policy = ?self.config.late_policy,
                "tick clock fell behind"
            );
        }
        trace!(tick = self.tick, ?elapsed, "tick");

        TickInfo {
            tick: self.tick,
            period,
            elapsed,
            late,
            missed,
        }
    }

    /// Call once the tick has been handled. Warns when the handling ate
    /// most of the period.
    pub fn record_tick_end(&mut self) {
        let (Some(started), Some(period)) = (self.busy_since.take(), self.period) else {
            return;
        };
        let spent = started.elapsed();
        self.metrics.slowest_tick = self.metrics.slowest_tick.max(spent);
        if spent.as_secs_f64() >= period.as_secs_f64() * self.config.budget_warn_fraction {
            warn!(
                tick = self.tick,
                spent_ms = spent.as_secs_f64() * 1000.0,
                period_ms = period.as_secs_f64() * 1000.0,
                "tick handling over budget"
            );
        }
    }

    pub fn pause(&mut self) {
        if let Phase::Running { .. } = self.phase {
            self.phase = Phase::Paused;
            debug!(tick = self.tick, "tick clock paused");
        }
    }

    /// Restarts a paused clock one period from now. The paused stretch is
    /// not reported as elapsed.
    pub fn resume(&mut self) {
        let (Phase::Paused, Some(period)) = (self.phase, self.period) else {
            return;
        };
        let now = Instant::now();
        self.since = now;
        self.phase = Phase::Running { due: now + period };
        debug!(tick = self.tick, "tick clock resumed");
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.phase, Phase::Paused)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.phase, Phase::Stopped)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
