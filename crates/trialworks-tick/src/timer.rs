//! A steppable game timer.

use std::time::Duration;

use serde::Deserialize;
use tracing::trace;

use crate::TimerError;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Construction parameters for a [`Timer`]. Values are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    pub start_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    /// Units per second. Negative counts down. Zero is rejected.
    pub tick_rate: f64,
    /// Wrap to the opposite bound instead of terminating at a boundary.
    pub auto_restart: bool,
    /// Remove the timer from its manager once it terminates.
    pub auto_destroy: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            start_value: 0.0,
            min_value: 0.0,
            max_value: Timer::MAX_VALUE,
            tick_rate: 1.0,
            auto_restart: false,
            auto_destroy: true,
        }
    }
}

impl TimerSettings {
    /// A timer counting up from `start` to `max`.
    pub fn counting_up(start: f64, max: f64) -> Self {
        Self {
            start_value: start,
            max_value: max,
            ..Default::default()
        }
    }

    /// A timer counting down from `start` to zero.
    pub fn countdown(start: f64) -> Self {
        Self {
            start_value: start,
            tick_rate: -1.0,
            ..Default::default()
        }
    }

    pub fn auto_restart(mut self, enabled: bool) -> Self {
        self.auto_restart = enabled;
        self
    }

    pub fn auto_destroy(mut self, enabled: bool) -> Self {
        self.auto_destroy = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle of a timer.
///
/// ```text
/// Created → Running ⇄ Paused
///    └──────────┴───────┴──→ Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Created,
    Running,
    Paused,
    Terminated,
}

impl TimerState {
    /// `true` once the timer has been started (running or paused).
    pub fn is_started(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl std::fmt::Display for TimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// The bound a timer reached during [`Timer::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Min,
    Max,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// A bounded value that moves at a fixed rate while running.
#[derive(Debug, Clone)]
pub struct Timer {
    value: f64,
    min_value: f64,
    max_value: f64,
    tick_rate: f64,
    auto_restart: bool,
    auto_destroy: bool,
    state: TimerState,
}

impl Timer {
    /// Global cap on timer values: six hours.
    pub const MAX_VALUE: f64 = 6.0 * 60.0 * 60.0;

    pub fn new(settings: TimerSettings) -> Result<Self, TimerError> {
        let TimerSettings {
            start_value,
            min_value,
            max_value,
            tick_rate,
            auto_restart,
            auto_destroy,
        } = settings;
        // Range checks fail for NaN as well.
        if !(0.0..=Self::MAX_VALUE).contains(&min_value) {
            return Err(TimerError::InvalidMinTimerValue);
        }
        if !(0.0..=Self::MAX_VALUE).contains(&max_value) {
            return Err(TimerError::InvalidMaxTimerValue);
        }
        if start_value.is_nan() || start_value < min_value {
            return Err(TimerError::TimerTooLow);
        }
        if start_value > max_value {
            return Err(TimerError::TimerTooHigh);
        }
        validate_tick_rate(tick_rate)?;
        Ok(Self {
            value: start_value,
            min_value,
            max_value,
            tick_rate,
            auto_restart,
            auto_destroy,
            state: TimerState::Created,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state.is_started()
    }

    pub fn is_paused(&self) -> bool {
        self.state == TimerState::Paused
    }

    pub fn is_terminated(&self) -> bool {
        self.state == TimerState::Terminated
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    pub fn auto_destroy(&self) -> bool {
        self.auto_destroy
    }

    pub fn start(&mut self) -> Result<f64, TimerError> {
        match self.state {
            TimerState::Running | TimerState::Paused => Err(TimerError::AlreadyStarted),
            TimerState::Terminated => Err(TimerError::AlreadyTerminated),
            TimerState::Created => {
                self.state = TimerState::Running;
                Ok(self.value)
            }
        }
    }

    /// Pauses a running timer. A timer that was never started stays
    /// unstarted and just reports its value.
    pub fn pause(&mut self) -> Result<f64, TimerError> {
        match self.state {
            TimerState::Paused => Err(TimerError::AlreadyPaused),
            TimerState::Terminated => Err(TimerError::AlreadyTerminated),
            TimerState::Created => Ok(self.value),
            TimerState::Running => {
                self.state = TimerState::Paused;
                Ok(self.value)
            }
        }
    }

    /// Resumes a paused timer, or starts one that was never started.
    pub fn unpause(&mut self) -> Result<f64, TimerError> {
        match self.state {
            TimerState::Running => Err(TimerError::NotPaused),
            TimerState::Terminated => Err(TimerError::AlreadyTerminated),
            TimerState::Created => self.start(),
            TimerState::Paused => {
                self.state = TimerState::Running;
                Ok(self.value)
            }
        }
    }

    pub fn terminate(&mut self) -> Result<f64, TimerError> {
        if self.state == TimerState::Terminated {
            return Err(TimerError::AlreadyTerminated);
        }
        self.state = TimerState::Terminated;
        Ok(self.value)
    }

    /// Sets the value, clamped into `[min, max]`. Returns the stored value.
    /// A NaN leaves the value untouched.
    pub fn set_time(&mut self, new_time: f64) -> f64 {
        if !new_time.is_nan() {
            self.value = new_time.clamp(self.min_value, self.max_value);
        }
        self.value
    }

    pub fn change_time_by(&mut self, delta: f64) -> f64 {
        self.set_time(self.value + delta)
    }

    pub fn set_tick_rate(&mut self, tick_rate: f64) -> Result<(), TimerError> {
        validate_tick_rate(tick_rate)?;
        self.tick_rate = tick_rate;
        Ok(())
    }

    pub fn set_max_value(&mut self, max_value: f64) -> Result<(), TimerError> {
        if !(self.min_value..=Self::MAX_VALUE).contains(&max_value) {
            return Err(TimerError::InvalidMaxTimerValue);
        }
        self.max_value = max_value;
        self.value = self.value.min(max_value);
        Ok(())
    }

    /// Moves a running timer by `tick_rate · dt`.
    ///
    /// Reports at most one boundary per call. On auto-restart the value
    /// wraps to the opposite bound and any overshoot is discarded; without
    /// auto-restart the timer parks on the bound and terminates.
    pub fn advance(&mut self, dt: Duration) -> Option<Boundary> {
        if self.state != TimerState::Running {
            return None;
        }
        self.value = (self.value + self.tick_rate * dt.as_secs_f64())
            .clamp(self.min_value, self.max_value);

        let boundary = if self.tick_rate > 0.0 && self.value >= self.max_value {
            if self.auto_restart {
                self.value = self.min_value;
            } else {
                self.value = self.max_value;
                self.state = TimerState::Terminated;
            }
            Some(Boundary::Max)
        } else if self.tick_rate <= 0.0 && self.value <= self.min_value {
            if self.auto_restart {
                self.value = self.max_value;
            } else {
                self.value = self.min_value;
                self.state = TimerState::Terminated;
            }
            Some(Boundary::Min)
        } else {
            None
        };

        if let Some(b) = boundary {
            trace!(?b, value = self.value, state = %self.state, "timer crossed boundary");
        }
        boundary
    }
}

fn validate_tick_rate(tick_rate: f64) -> Result<(), TimerError> {
    if tick_rate == 0.0 || !tick_rate.is_finite() {
        return Err(TimerError::InvalidTickRate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_new_default_settings_created_at_zero() {
        let t = Timer::new(TimerSettings::default()).unwrap();
        assert_eq!(t.value(), 0.0);
        assert_eq!(t.state(), TimerState::Created);
        assert_eq!(t.max_value(), 21_600.0);
    }

    #[test]
    fn test_new_rejects_bad_settings() {
        let bad = |s: TimerSettings| Timer::new(s).unwrap_err();
        let d = TimerSettings::default();
        assert_eq!(
            bad(TimerSettings { start_value: -1.0, ..d }),
            TimerError::TimerTooLow
        );
        assert_eq!(
            bad(TimerSettings { start_value: 10.0, max_value: 5.0, ..d }),
            TimerError::TimerTooHigh
        );
        assert_eq!(
            bad(TimerSettings { start_value: -2.0, min_value: -3.0, ..d }),
            TimerError::InvalidMinTimerValue
        );
        assert_eq!(
            bad(TimerSettings { max_value: 30_000.0, ..d }),
            TimerError::InvalidMaxTimerValue
        );
        assert_eq!(
            bad(TimerSettings { tick_rate: 0.0, ..d }),
            TimerError::InvalidTickRate
        );
    }

    #[test]
    fn test_new_rejects_non_finite_settings() {
        let bad = |s: TimerSettings| Timer::new(s).unwrap_err();
        let d = TimerSettings::default();
        assert_eq!(
            bad(TimerSettings { start_value: f64::NAN, ..d }),
            TimerError::TimerTooLow
        );
        assert_eq!(
            bad(TimerSettings { min_value: f64::NAN, ..d }),
            TimerError::InvalidMinTimerValue
        );
        assert_eq!(
            bad(TimerSettings { max_value: f64::NAN, ..d }),
            TimerError::InvalidMaxTimerValue
        );
        assert_eq!(
            bad(TimerSettings { max_value: f64::INFINITY, ..d }),
            TimerError::InvalidMaxTimerValue
        );
        assert_eq!(
            bad(TimerSettings { tick_rate: f64::NAN, ..d }),
            TimerError::InvalidTickRate
        );
        assert_eq!(
            bad(TimerSettings { tick_rate: f64::NEG_INFINITY, ..d }),
            TimerError::InvalidTickRate
        );
    }

    #[test]
    fn test_non_finite_updates_keep_timer_usable() {
        let mut t = Timer::new(TimerSettings::counting_up(1.0, 5.0)).unwrap();
        assert_eq!(t.set_max_value(f64::NAN), Err(TimerError::InvalidMaxTimerValue));
        assert_eq!(t.set_tick_rate(f64::NAN), Err(TimerError::InvalidTickRate));
        assert_eq!(t.set_tick_rate(f64::INFINITY), Err(TimerError::InvalidTickRate));
        assert_eq!(t.set_time(f64::NAN), 1.0);
        assert_eq!(t.change_time_by(f64::NAN), 1.0);
        assert_eq!(t.set_time(f64::INFINITY), 5.0);

        t.set_time(1.0);
        t.start().unwrap();
        assert_eq!(t.advance(secs(1.0)), None);
        assert_eq!(t.value(), 2.0);
    }

    #[test]
    fn test_pause_before_start_keeps_created() {
        let mut t = Timer::new(TimerSettings::counting_up(3.0, 10.0)).unwrap();
        assert_eq!(t.pause(), Ok(3.0));
        assert_eq!(t.state(), TimerState::Created);
    }

    #[test]
    fn test_unpause_unstarted_starts() {
        let mut t = Timer::new(TimerSettings::default()).unwrap();
        t.unpause().unwrap();
        assert!(t.is_running());
        assert_eq!(t.unpause(), Err(TimerError::NotPaused));
        t.pause().unwrap();
        assert_eq!(t.pause(), Err(TimerError::AlreadyPaused));
    }

    #[test]
    fn test_start_twice_errors() {
        let mut t = Timer::new(TimerSettings::default()).unwrap();
        t.start().unwrap();
        assert_eq!(t.start(), Err(TimerError::AlreadyStarted));
    }

    #[test]
    fn test_terminated_rejects_everything() {
        let mut t = Timer::new(TimerSettings::default()).unwrap();
        t.terminate().unwrap();
        assert_eq!(t.start(), Err(TimerError::AlreadyTerminated));
        assert_eq!(t.pause(), Err(TimerError::AlreadyTerminated));
        assert_eq!(t.unpause(), Err(TimerError::AlreadyTerminated));
        assert_eq!(t.terminate(), Err(TimerError::AlreadyTerminated));
    }

    #[test]
    fn test_set_time_clamps_to_bounds() {
        let mut t = Timer::new(TimerSettings::counting_up(0.0, 5.0)).unwrap();
        assert_eq!(t.set_time(9.0), 5.0);
        assert_eq!(t.set_time(-1.0), 0.0);
        assert_eq!(t.change_time_by(2.5), 2.5);
    }

    #[test]
    fn test_set_max_value_validates() {
        let mut t = Timer::new(TimerSettings {
            min_value: 2.0,
            start_value: 2.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(t.set_max_value(1.0), Err(TimerError::InvalidMaxTimerValue));
        assert_eq!(t.set_max_value(22_000.0), Err(TimerError::InvalidMaxTimerValue));
        assert!(t.set_max_value(8.0).is_ok());
        assert_eq!(t.set_tick_rate(0.0), Err(TimerError::InvalidTickRate));
    }

    #[test]
    fn test_advance_ignores_unstarted_and_paused() {
        let mut t = Timer::new(TimerSettings::counting_up(0.0, 5.0)).unwrap();
        assert_eq!(t.advance(secs(10.0)), None);
        assert_eq!(t.value(), 0.0);
        t.start().unwrap();
        t.pause().unwrap();
        assert_eq!(t.advance(secs(10.0)), None);
        assert_eq!(t.value(), 0.0);
    }

    #[test]
    fn test_advance_auto_restart_wraps_and_discards_overflow() {
        let mut t =
            Timer::new(TimerSettings::counting_up(0.0, 5.0).auto_restart(true)).unwrap();
        t.start().unwrap();
        assert_eq!(t.advance(secs(4.0)), None);
        assert_eq!(t.value(), 4.0);
        // 4 + 12 overshoots by two full periods; still one report.
        assert_eq!(t.advance(secs(12.0)), Some(Boundary::Max));
        assert_eq!(t.value(), 0.0);
        assert!(t.is_running());
    }

    #[test]
    fn test_advance_one_shot_terminates_at_max() {
        let mut t = Timer::new(TimerSettings::counting_up(0.0, 0.1)).unwrap();
        t.start().unwrap();
        assert_eq!(t.advance(secs(0.05)), None);
        assert_eq!(t.advance(secs(0.05)), Some(Boundary::Max));
        assert!(t.is_terminated());
        assert_eq!(t.value(), 0.1);
        assert_eq!(t.advance(secs(1.0)), None);
    }

    #[test]
    fn test_advance_countdown_fires_min_once() {
        let mut t = Timer::new(TimerSettings::countdown(3.0)).unwrap();
        t.start().unwrap();
        assert_eq!(t.advance(secs(2.0)), None);
        assert_eq!(t.value(), 1.0);
        assert_eq!(t.advance(secs(2.0)), Some(Boundary::Min));
        assert_eq!(t.value(), 0.0);
        assert!(t.is_terminated());
    }

    #[test]
    fn test_advance_countdown_auto_restart_wraps_to_max() {
        let mut t = Timer::new(TimerSettings {
            start_value: 1.0,
            max_value: 5.0,
            tick_rate: -1.0,
            auto_restart: true,
            ..Default::default()
        })
        .unwrap();
        t.start().unwrap();
        assert_eq!(t.advance(secs(1.0)), Some(Boundary::Min));
        assert_eq!(t.value(), 5.0);
    }

    #[test]
    fn test_settings_deserialize_fills_defaults() {
        let s: TimerSettings = serde_json::from_str(r#"{ "start_value": 300, "tick_rate": -1 }"#).unwrap();
        assert_eq!(s.start_value, 300.0);
        assert_eq!(s.tick_rate, -1.0);
        assert_eq!(s.max_value, Timer::MAX_VALUE);
        assert!(s.auto_destroy);
    }

    #[test]
    fn test_timer_state_display() {
        assert_eq!(TimerState::Running.to_string(), "Running");
        assert!(TimerState::Paused.is_started());
        assert!(!TimerState::Terminated.is_started());
    }
}
