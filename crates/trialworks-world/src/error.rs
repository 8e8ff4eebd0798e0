//! Error types for the world layer.

use trialworks_protocol::{AreaId, ClientId};

/// Lookup failures in the client and area registries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// No connected client has this id (it may have just disconnected).
    #[error("client {0} not found")]
    ClientNotFound(ClientId),

    /// No area has this id (it may have been unloaded).
    #[error("area {0} not found")]
    AreaNotFound(AreaId),
}
