//! Unified error type for the Trialworks server.

use trialworks_game::{GameError, Rejection};
use trialworks_protocol::ProtocolError;
use trialworks_tick::TimerError;
use trialworks_world::WorldError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors, including the nested results returned by
/// [`ServerHandle::call`](crate::ServerHandle::call).
#[derive(Debug, thiserror::Error)]
pub enum TrialworksError {
    /// A checked game operation failed.
    #[error(transparent)]
    Game(#[from] GameError),

    /// An in-character message was refused.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The configuration text was not valid JSON for [`ServerConfig`](crate::ServerConfig).
    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The configuration parsed but cannot be used.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The server task has stopped (shut down or aborted).
    #[error("server is not running")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialworks_game::{ErrorKind, Layer};
    use trialworks_protocol::ClientId;

    #[test]
    fn test_from_game_error() {
        let err = GameError::new(Layer::Trial, ErrorKind::UserNotPlayer);
        let top: TrialworksError = err.into();
        assert!(matches!(top, TrialworksError::Game(_)));
        assert_eq!(top.to_string(), "trial: user is not a player");
    }

    #[test]
    fn test_from_rejection_keeps_text() {
        let err = Rejection::Refused("You may not speak yet.".into());
        let top: TrialworksError = err.into();
        assert!(matches!(top, TrialworksError::Rejected(_)));
        assert_eq!(top.to_string(), "You may not speak yet.");
    }

    #[test]
    fn test_from_timer_error() {
        let top: TrialworksError = TimerError::TimerTooLow.into();
        assert!(matches!(top, TrialworksError::Timer(_)));
    }

    #[test]
    fn test_from_world_error() {
        let top: TrialworksError = WorldError::ClientNotFound(ClientId(4)).into();
        assert!(matches!(top, TrialworksError::World(_)));
        assert!(top.to_string().contains('4'));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidGameId {
            id: "trialX".into(),
            prefix: "trial".into(),
        };
        let top: TrialworksError = err.into();
        assert!(matches!(top, TrialworksError::Protocol(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let top: TrialworksError = err.into();
        assert!(matches!(top, TrialworksError::ConfigParse(_)));
    }
}
