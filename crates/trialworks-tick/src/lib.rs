//! Game timers and the clock that drives them.
//!
//! Timers here never spawn tasks or read the wall clock. A [`Timer`] only
//! moves when something calls [`Timer::advance`] with an elapsed duration,
//! and it reports the boundary it crossed (if any) as a return value. The
//! owner decides what that boundary means.
//!
//! # Pieces
//!
//! - [`Timer`]: a bounded value moving at `tick_rate` units per second.
//! - [`TimerManager`]: the per-game collection of timers with
//!   smallest-free ids and an optional limit.
//! - [`TickScheduler`]: a fixed-rate clock for the server loop. Each
//!   resolved [`TickInfo`] tells the loop how much time to feed the timers.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         tick = scheduler.wait_for_tick() => {
//!             engine.tick(tick.elapsed);
//!         }
//!     }
//! }
//! ```

mod error;
mod manager;
mod scheduler;
mod timer;

pub use error::TimerError;
pub use manager::{TimerId, TimerManager};
pub use scheduler::{LatePolicy, TickConfig, TickInfo, TickMetrics, TickScheduler};
pub use timer::{Boundary, Timer, TimerSettings, TimerState};
