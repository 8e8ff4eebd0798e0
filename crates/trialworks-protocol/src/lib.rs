//! Shared vocabulary for Trialworks.
//!
//! This crate defines the types every other layer agrees on:
//!
//! - **Identity** ([`ClientId`], [`AreaId`], [`GameId`], [`GameRef`], …):
//!   who and what the server is talking about.
//! - **Notifications** ([`Notification`]): the fire-and-forget events the
//!   game layer pushes at a client (OOC text, splashes, timer and health
//!   updates, in-character lines).
//! - **In-character input** ([`IcMessage`]): the parsed contents of a
//!   message a client tried to say in character.
//! - **Errors** ([`ProtocolError`]): malformed identifiers.
//!
//! # Architecture
//!
//! The crate knows nothing about sockets or framing. Whatever transport
//! sits in front of the server turns bytes into these types on the way in
//! and serializes [`Notification`] on the way out.
//!
//! ```text
//! Transport (bytes) → Protocol (IcMessage / Notification) → Game layer
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod error;
mod message;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::ProtocolError;
pub use message::{HealthSide, IcMessage, Notification, PERJURY_BUTTON};
pub use types::{AreaId, CharacterId, ClientId, GameId, GameRef, ManagerRef};
