//! Error types for the protocol layer.
//!
//! Each Trialworks crate owns its error enum so that the origin of a
//! failure is visible from its type alone. A `ProtocolError` always means
//! some identifier or payload was malformed, never that the game state
//! refused an operation.

/// Errors that can occur when interpreting protocol-level values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A textual game id did not have the expected `{prefix}{number}` shape.
    ///
    /// Displayed as: "invalid game id `trialX` (expected prefix `trial`)".
    #[error("invalid game id `{id}` (expected prefix `{prefix}`)")]
    InvalidGameId { id: String, prefix: String },
}
