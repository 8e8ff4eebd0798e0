//! Inbound in-character messages and outbound notifications.
//!
//! The game layer never writes bytes. It emits [`Notification`] values into
//! a client's outbound channel, and whatever encoder sits at the edge of the
//! server decides how they look on the wire. Delivery is fire-and-forget:
//! an event for a client that just disconnected is silently lost.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ClientId;

/// The interjection button that only its sender and the debate leaders
/// see as-is. Everyone else sees [`IcMessage::PERJURY_MASK`] instead.
pub const PERJURY_BUTTON: u8 = 8;

// ---------------------------------------------------------------------------
// In-character input
// ---------------------------------------------------------------------------

/// The contents of an in-character message a client wants to send.
///
/// `button` carries the interjection the client attached to the line
/// (0 = plain dialogue, 1–8 = the various "bullets" used in debates).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcMessage {
    /// The spoken text.
    pub text: String,
    /// The interjection button (0 = none).
    pub button: u8,
    /// The name shown above the text.
    pub showname: String,
    /// When set, only these viewers see the real button; every other
    /// viewer sees [`Self::PERJURY_MASK`]. Filled in during acceptance
    /// checks, never by the sender.
    #[serde(skip)]
    pub perjury_viewers: Option<BTreeSet<ClientId>>,
}

impl IcMessage {
    /// What non-privileged viewers see instead of a perjury button.
    pub const PERJURY_MASK: u8 = 7;

    /// Creates a message with no interjection.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            button: 0,
            showname: String::new(),
            perjury_viewers: None,
        }
    }

    /// Builder-style setter for the interjection button.
    pub fn with_button(mut self, button: u8) -> Self {
        self.button = button;
        self
    }

    /// The button as seen by `viewer`.
    pub fn button_for(&self, viewer: ClientId) -> u8 {
        match &self.perjury_viewers {
            Some(viewers) if !viewers.contains(&viewer) => Self::PERJURY_MASK,
            _ => self.button,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound notifications
// ---------------------------------------------------------------------------

/// Which health bar a [`Notification::Health`] updates.
///
/// Trials reuse the two courtroom health bars: focus on side 1,
/// influence on side 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthSide {
    Focus = 1,
    Influence = 2,
}

/// An event pushed at a single client.
///
/// `#[serde(tag = "type")]` produces `{ "type": "Splash", "name": ... }`,
/// which is what the edge encoder expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// Out-of-character text.
    Ooc { message: String },

    /// Switches the client's interface theme; `""` restores the default.
    Gamemode { name: String },

    /// A one-shot full screen animation (`testimony1`, `testimony4`, …).
    Splash { name: String },

    /// Sets one of the two health bars.
    Health { side: HealthSide, value: i64 },

    // -- Client-side timer control --
    /// Lets the client timer run.
    TimerResume { timer_id: u32 },

    /// Freezes the client timer.
    TimerPause { timer_id: u32 },

    /// Sets the client timer in milliseconds.
    TimerSetTime { timer_id: u32, millis: i64 },

    /// How much the client timer moves per step, in milliseconds.
    TimerSetStepLength { timer_id: u32, millis: i64 },

    /// How often the client timer steps, in milliseconds.
    TimerSetFiringInterval { timer_id: u32, millis: i64 },

    // -- In-character replay --
    /// An in-character line attributed to `sender`.
    Ic {
        sender: ClientId,
        showname: String,
        text: String,
        button: u8,
    },

    /// Clears the in-character text box.
    IcBlankpost,
}
