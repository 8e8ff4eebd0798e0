//! Games, managers and the trial family of a Trialworks server.
//!
//! Everything here is owned by one [`Engine`]. A game is a player group
//! with optional capabilities stacked on top:
//!
//! ```text
//! PlayerGroup → Game → GameWithAreas → HubbedGame → Trial → TrialMinigame → NonStopDebate
//!                              └──────────→ Hub (owns the trial manager)
//! ```
//!
//! Games react to what happens in the world (clients moving, changing
//! character, speaking, disconnecting) through an in-process event bus.
//! Every public [`Engine`] method runs its whole cascade synchronously and
//! then re-validates the structure, so callers only ever observe a
//! consistent state.
//!
//! # Example
//!
//! ```
//! use trialworks_game::{Engine, GameOptions, HubSpec, NsdMode, NsdOptions};
//!
//! let mut engine = Engine::default();
//! let hub = engine.new_hub(HubSpec::default()).unwrap();
//! let leader = engine.connect_client(None);
//!
//! let trial = engine.new_trial(hub, Some(leader), GameOptions::trial()).unwrap();
//! let nsd = engine.new_nsd(trial, Some(leader), NsdOptions::default()).unwrap();
//! assert_eq!(engine.nsd_mode(nsd).unwrap(), NsdMode::Prerecording);
//! ```

mod areas;
mod config;
mod engine;
mod error;
mod events;
mod game;
mod group;
mod hub;
mod invariants;
mod manager;
mod minigame;
mod nsd;
mod trial;

pub use areas::AreaBinding;
pub use config::{EngineConfig, GameOptions, HubSpec, NsdOptions, TeamOptions};
pub use engine::Engine;
pub use error::{ErrorKind, GameError, InvariantViolation, Layer, Rejection};
pub use events::{Source, Topic};
pub use game::Game;
pub use group::{PlayerGroup, TeamRoster};
pub use hub::{HubAssets, HubBinding};
pub use manager::{Manager, ManagerKind};
pub use minigame::MinigameBinding;
pub use nsd::{NonStopDebate, NsdMode};
pub use trial::{Stat, TrialExtras};
