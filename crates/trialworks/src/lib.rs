//! # Trialworks
//!
//! Trial rooms, minigames and nonstop debates for courtroom roleplay
//! servers.
//!
//! The game layer lives in [`trialworks_game`] and is fully synchronous.
//! This crate wraps it in a single Tokio task that owns the [`Engine`],
//! takes commands over a channel and drives every game timer from a
//! fixed-rate tick clock.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trialworks::prelude::*;
//!
//! # async fn run() -> Result<(), TrialworksError> {
//! let config = ServerConfig::from_json_str(r#"{ "tick": { "tick_rate_hz": 20 } }"#)?;
//! trialworks::init_tracing(&config.log_filter);
//!
//! let (server, _task) = Server::builder().config(config).spawn()?;
//! let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
//! let client = server.connect(tx).await?;
//! server.say(client, IcMessage::new("Objection!")).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod server;

use tracing_subscriber::{EnvFilter, fmt};

pub use config::ServerConfig;
pub use error::TrialworksError;
pub use server::{Server, ServerBuilder, ServerHandle};

pub use trialworks_game as game;
pub use trialworks_protocol as protocol;
pub use trialworks_tick as tick;
pub use trialworks_world as world;

pub use trialworks_game::Engine;

pub mod prelude {
    pub use crate::{Server, ServerBuilder, ServerConfig, ServerHandle, TrialworksError};
    pub use trialworks_game::{
        Engine, ErrorKind, GameError, GameOptions, HubSpec, Layer, NsdMode, NsdOptions,
        Rejection, Stat,
    };
    pub use trialworks_protocol::{
        AreaId, CharacterId, ClientId, GameRef, IcMessage, Notification,
    };
    pub use trialworks_tick::{TickConfig, TimerSettings};
    pub use trialworks_world::AreaSpec;
}

/// Installs a `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used. Does
/// nothing if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
