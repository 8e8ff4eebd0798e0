//! Per-game timer collection.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::{Boundary, Timer, TimerError, TimerSettings};

/// Id of a timer inside its [`TimerManager`]. Displayed as `timer{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer{}", self.0)
    }
}

/// Owns the timers of one game.
///
/// New timers get the smallest id not currently in use, so ids are
/// recycled once a timer is deleted.
#[derive(Debug, Clone, Default)]
pub struct TimerManager {
    timers: BTreeMap<TimerId, Timer>,
    timer_limit: Option<usize>,
}

impl TimerManager {
    pub fn new(timer_limit: Option<usize>) -> Self {
        Self {
            timers: BTreeMap::new(),
            timer_limit,
        }
    }

    pub fn timer_limit(&self) -> Option<usize> {
        self.timer_limit
    }

    pub fn new_timer(&mut self, settings: TimerSettings) -> Result<TimerId, TimerError> {
        if let Some(limit) = self.timer_limit {
            if self.timers.len() >= limit {
                return Err(TimerError::ManagerTooManyTimers);
            }
        }
        let timer = Timer::new(settings)?;
        let id = self.available_id();
        self.timers.insert(id, timer);
        debug!(timer = %id, "timer created");
        Ok(id)
    }

    /// Terminates (if needed) and removes a timer.
    pub fn delete_timer(&mut self, id: TimerId) -> Result<(), TimerError> {
        let mut timer = self
            .timers
            .remove(&id)
            .ok_or(TimerError::ManagerDoesNotManageTimer)?;
        if !timer.is_terminated() {
            let _ = timer.terminate();
        }
        debug!(timer = %id, "timer deleted");
        Ok(())
    }

    pub fn timer(&self, id: TimerId) -> Result<&Timer, TimerError> {
        self.timers.get(&id).ok_or(TimerError::ManagerInvalidTimerId)
    }

    pub fn timer_mut(&mut self, id: TimerId) -> Result<&mut Timer, TimerError> {
        self.timers.get_mut(&id).ok_or(TimerError::ManagerInvalidTimerId)
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<TimerId> {
        self.timers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Deletes every timer.
    pub fn clear(&mut self) {
        for id in self.ids() {
            let _ = self.delete_timer(id);
        }
    }

    /// Advances one timer. A timer that terminated on this step and has
    /// `auto_destroy` set is removed before returning.
    pub fn advance(&mut self, id: TimerId, dt: Duration) -> Option<Boundary> {
        let timer = self.timers.get_mut(&id)?;
        let boundary = timer.advance(dt);
        if boundary.is_some() && timer.is_terminated() && timer.auto_destroy() {
            self.timers.remove(&id);
            debug!(timer = %id, "timer finished and was removed");
        }
        boundary
    }

    fn available_id(&self) -> TimerId {
        let mut n = 0;
        while self.timers.contains_key(&TimerId(n)) {
            n += 1;
        }
        TimerId(n)
    }
}
