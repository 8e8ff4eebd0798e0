//! Identity types shared by every Trialworks layer.
//!
//! Most entities in the server refer to each other constantly: a trial
//! knows its hub, a minigame knows its trial, an area knows which games
//! include it. Rather than holding pointers to each other, every
//! reference is one of the small `Copy` ids below, resolved through the
//! registry that owns the entity. A dangling id is therefore never a
//! dangling pointer, just a failed lookup.

// Serde gives every id a stable JSON form so the transport layer (and
// configuration files) can carry them without extra glue.
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Client and area identity
// ---------------------------------------------------------------------------

/// A connected client, unique for the lifetime of its connection.
///
/// This is a "newtype wrapper": a `u64` that the compiler refuses to mix
/// up with an [`AreaId`] or any other number.
///
/// `#[serde(transparent)]` serializes it as the bare number, so
/// `ClientId(4)` is just `4` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

/// Display is used by structured logging: `tracing::info!(%client, ...)`
/// prints "C-4". User-facing text prints the bare number (`client.0`).
impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// An area (a room of the virtual world), unique across all hubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(pub u64);

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A-{}", self.0)
    }
}

/// Index of a character in a hub's character list.
///
/// A client is a *participant* exactly when it holds `Some(CharacterId)`;
/// `None` means spectator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub usize);

// ---------------------------------------------------------------------------
// Game identity
// ---------------------------------------------------------------------------

/// The textual id a manager gives one of its games (`H0`, `trial2`,
/// `trial2g0`, …).
///
/// Ids are only unique inside their manager. Code that needs a
/// server-wide handle uses [`GameRef`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl GameId {
    /// Builds `{prefix}{number}`.
    pub fn new(prefix: &str, number: u64) -> Self {
        Self(format!("{prefix}{number}"))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the number that follows `prefix`.
    ///
    /// `GameId("trial3").number_after("trial")` is `Ok(3)`.
    pub fn number_after(&self, prefix: &str) -> Result<u64, ProtocolError> {
        self.0
            .strip_prefix(prefix)
            .and_then(|rest| rest.parse().ok())
            .ok_or_else(|| ProtocolError::InvalidGameId {
                id: self.0.clone(),
                prefix: prefix.to_string(),
            })
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A server-wide handle to a game.
///
/// Handles are never reused, so a handle to a destroyed game keeps
/// resolving to that (now unmanaged) game instead of to a stranger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameRef(pub u64);

impl fmt::Display for GameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// A server-wide handle to a game manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagerRef(pub u64);

impl fmt::Display for ManagerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}
