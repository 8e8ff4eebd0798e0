//! Clients and areas of a Trialworks server.
//!
//! The game layer reasons about two kinds of things it does not own the
//! semantics of:
//!
//! 1. **Clients**: connected users, each with an outbound notification
//!    channel, a current area and maybe a character ([`Client`]).
//! 2. **Areas**: the rooms of the virtual world, grouped by hub
//!    ([`Area`], built from parsed [`AreaSpec`] entries).
//!
//! [`World`] holds both registries and keeps "which client is in which
//! area" consistent in both directions.
//!
//! # How it fits in the stack
//!
//! ```text
//! Game Layer (above)  ← games, hubs, trials, debates
//!     ↕
//! World Layer (this crate)  ← who is connected, where they stand
//!     ↕
//! Protocol Layer (below)  ← ids, notifications
//! ```

mod area;
mod client;
mod error;
mod registry;

pub use area::{Area, AreaSpec};
pub use client::{Client, NotificationSender};
pub use error::WorldError;
pub use registry::{AreaRegistry, ClientRegistry, World};
