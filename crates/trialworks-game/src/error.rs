//! Error types for the game layer.
//!
//! Every failure is a [`GameError`]: the [`Layer`] of the entity the
//! caller invoked plus a flat [`ErrorKind`]. Callers match on the kind and
//! only ever see the family of the layer they called into.

use std::fmt;

use trialworks_protocol::{AreaId, ClientId, GameRef, ManagerRef};
use trialworks_tick::TimerError;

/// Family of a game (or of the games a manager creates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    PlayerGroup,
    Game,
    GameWithAreas,
    HubbedGame,
    Hub,
    Trial,
    TrialMinigame,
    NonStopDebate,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PlayerGroup => "player group",
            Self::Game => "game",
            Self::GameWithAreas => "game with areas",
            Self::HubbedGame => "hubbed game",
            Self::Hub => "hub",
            Self::Trial => "trial",
            Self::TrialMinigame => "trial minigame",
            Self::NonStopDebate => "nonstop debate",
        };
        f.write_str(name)
    }
}

/// What went wrong, independent of the layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    // -- Lifecycle --
    #[error("game is unmanaged")]
    GameIsUnmanaged,
    #[error("user is already a player")]
    UserAlreadyPlayer,
    #[error("user is not a player")]
    UserNotPlayer,
    #[error("user is already a leader")]
    UserAlreadyLeader,
    #[error("user is not a leader")]
    UserNotLeader,
    #[error("user is already invited")]
    UserAlreadyInvited,
    #[error("user is not invited")]
    UserNotInvited,
    #[error("game does not take invitations")]
    GameDoesNotTakeInvitations,
    #[error("user has no participant character")]
    UserHasNoCharacter,

    // -- Capacity --
    #[error("game is full")]
    GameIsFull,
    #[error("manager has too many games")]
    ManagerTooManyGames,
    #[error("user is concurrently in too many games")]
    UserHitGameConcurrentLimit,
    #[error("area is concurrently in too many games")]
    AreaHitGameConcurrentLimit,
    #[error("game has too many teams")]
    GameTooManyTeams,
    #[error("game has too many timers")]
    GameTooManyTimers,
    #[error("user is already in another team")]
    UserInAnotherTeam,

    // -- Lookup --
    #[error("{reason}")]
    ManagerInvalidGameId { reason: String },
    #[error("manager does not manage this game")]
    ManagerDoesNotManageGame,
    #[error("manager cannot be left without games")]
    ManagerCannotManageeNoManagees,
    #[error("game does not manage this team")]
    GameDoesNotManageTeam,
    #[error("invalid team id")]
    GameInvalidTeamId,
    #[error("game does not manage this timer")]
    GameDoesNotManageTimer,
    #[error("invalid timer id")]
    GameInvalidTimerId,
    #[error("user is not in a minigame")]
    UserNotInMinigame,
    #[error("game is not a {needed}")]
    MissingCapability { needed: Layer },

    // -- Topology --
    #[error("user is not in an area of the game")]
    UserNotInArea,
    #[error("area is already part of the game")]
    AreaAlreadyInGame,
    #[error("area is not part of the game")]
    AreaNotInGame,
    #[error("area belongs to another hub")]
    AreaNotInHub,
    #[error("area disallows bullets")]
    AreaDisallowsBullets,
    #[error("area list is empty")]
    AreaListEmpty,

    // -- Trial stats --
    #[error("influence value is out of range")]
    InfluenceIsInvalid,
    #[error("focus value is out of range")]
    FocusIsInvalid,

    // -- Nonstop debate --
    #[error("Nonstop debate is already in this mode.")]
    NsdAlreadyInMode,
    #[error("Nonstop debate is not in a mode that allows this.")]
    NsdNotInMode,
    #[error("There are no messages to loop.")]
    NsdNoMessages,
    #[error("timers are already set up")]
    TimersAlreadySetup,

    // -- Collaborators --
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error("client {0} not found")]
    UnknownClient(ClientId),
    #[error("area {0} not found")]
    UnknownArea(AreaId),
    #[error("game {0} not found")]
    UnknownGame(GameRef),
    #[error("manager {0} not found")]
    UnknownManager(ManagerRef),
}

impl ErrorKind {
    pub(crate) fn invalid_game_id(id: &str) -> Self {
        Self::ManagerInvalidGameId {
            reason: format!("no game with id `{id}`"),
        }
    }
}

/// The single error type of every checked game operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{layer}: {kind}")]
pub struct GameError {
    pub layer: Layer,
    pub kind: ErrorKind,
}

impl GameError {
    pub fn new(layer: Layer, kind: ErrorKind) -> Self {
        Self { layer, kind }
    }
}

/// Why an in-character message was refused. The text is shown to the
/// sender as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("{0}")]
    Refused(String),
    #[error("client {0} not found")]
    UnknownClient(ClientId),
}

impl Rejection {
    pub(crate) fn refused(msg: impl Into<String>) -> Self {
        Self::Refused(msg.into())
    }
}

/// A broken structural invariant. Never returned to callers: the engine
/// aborts when it finds one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvariantViolation(pub String);

/// Logs and aborts. Used when the structure is found inconsistent or a
/// cascade fails a precondition that was already verified.
#[track_caller]
pub(crate) fn fatal(context: impl fmt::Display) -> ! {
    tracing::error!(%context, "game structure is inconsistent");
    panic!("game structure is inconsistent: {context}");
}
