//! Error types for timers and timer managers.

/// Errors raised by [`Timer`](crate::Timer) and
/// [`TimerManager`](crate::TimerManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// The start value is below the minimum.
    #[error("timer start value is below its minimum")]
    TimerTooLow,

    /// The start value is above the maximum.
    #[error("timer start value is above its maximum")]
    TimerTooHigh,

    /// The minimum is negative.
    #[error("timer minimum must not be negative")]
    InvalidMinTimerValue,

    /// The maximum is below the minimum or above the global cap.
    #[error("timer maximum is out of range")]
    InvalidMaxTimerValue,

    /// A tick rate of zero would freeze the timer forever.
    #[error("timer tick rate must be non-zero")]
    InvalidTickRate,

    #[error("timer already started")]
    AlreadyStarted,

    #[error("timer already paused")]
    AlreadyPaused,

    #[error("timer is not paused")]
    NotPaused,

    #[error("timer already terminated")]
    AlreadyTerminated,

    /// The manager's timer limit has been reached.
    #[error("manager has too many timers")]
    ManagerTooManyTimers,

    /// The timer is not (or no longer) part of this manager.
    #[error("manager does not manage this timer")]
    ManagerDoesNotManageTimer,

    /// No timer with the requested id exists.
    #[error("invalid timer id")]
    ManagerInvalidTimerId,
}
