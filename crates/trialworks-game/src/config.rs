//! Options for creating games, teams, hubs and debates.
//!
//! Every options struct deserializes with `#[serde(default)]`, so a config
//! file only names the fields it changes.

use serde::Deserialize;
use trialworks_protocol::{AreaId, GameRef};
use trialworks_world::AreaSpec;

// ---------------------------------------------------------------------------
// GameOptions
// ---------------------------------------------------------------------------

/// Limits and flags of a new game.
///
/// Fields that only make sense for some families (areas, hub, minigame
/// settings) are ignored by managers whose games lack that capability.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GameOptions {
    pub player_limit: Option<usize>,
    /// How many sibling games a player may be in at once.
    pub player_concurrent_limit: Option<usize>,
    pub require_invitations: bool,
    /// Destroy the game once its last player leaves.
    pub require_players: bool,
    /// Keep at least one leader while there are players.
    pub require_leaders: bool,
    pub require_participant_character: bool,
    pub team_limit: Option<usize>,
    pub timer_limit: Option<usize>,

    // -- Area binding --
    /// Initial areas. Empty means "the creator's area".
    pub areas: Vec<AreaId>,
    /// How many sibling games an area may be in at once.
    pub area_concurrent_limit: Option<usize>,
    pub autoadd_on_client_enter: bool,
    pub autoadd_on_creation_existing_users: bool,
    /// Destroy the game once its last area is removed.
    pub require_areas: bool,

    // -- Hub binding --
    /// Hub the game's areas must belong to. Defaults to the hub owning the
    /// manager, or the creator's hub.
    #[serde(skip)]
    pub hub: Option<GameRef>,

    // -- Trial --
    pub autoadd_minigame_on_player_added: bool,
    pub minigame_limit: Option<usize>,

    // -- Minigame --
    pub autoadd_on_trial_player_add: bool,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            player_limit: None,
            player_concurrent_limit: Some(1),
            require_invitations: false,
            require_players: true,
            require_leaders: true,
            require_participant_character: false,
            team_limit: None,
            timer_limit: None,
            areas: Vec::new(),
            area_concurrent_limit: None,
            autoadd_on_client_enter: false,
            autoadd_on_creation_existing_users: false,
            require_areas: true,
            hub: None,
            autoadd_minigame_on_player_added: false,
            minigame_limit: Some(1),
            autoadd_on_trial_player_add: false,
        }
    }
}

impl GameOptions {
    /// Hubs never empty out: everyone in their areas is a member.
    pub fn hub() -> Self {
        Self {
            require_players: false,
            require_leaders: false,
            player_concurrent_limit: Some(1),
            area_concurrent_limit: Some(1),
            autoadd_on_client_enter: true,
            require_areas: false,
            ..Default::default()
        }
    }

    pub fn trial() -> Self {
        Self {
            require_leaders: false,
            player_concurrent_limit: Some(1),
            area_concurrent_limit: Some(1),
            autoadd_on_client_enter: false,
            require_areas: true,
            ..Default::default()
        }
    }

    pub fn with_player_limit(mut self, limit: Option<usize>) -> Self {
        self.player_limit = limit;
        self
    }

    pub fn with_player_concurrent_limit(mut self, limit: Option<usize>) -> Self {
        self.player_concurrent_limit = limit;
        self
    }

    pub fn with_areas(mut self, areas: impl IntoIterator<Item = AreaId>) -> Self {
        self.areas = areas.into_iter().collect();
        self
    }

    pub fn with_area_concurrent_limit(mut self, limit: Option<usize>) -> Self {
        self.area_concurrent_limit = limit;
        self
    }

    pub fn with_require_invitations(mut self, enabled: bool) -> Self {
        self.require_invitations = enabled;
        self
    }

    pub fn with_require_leaders(mut self, enabled: bool) -> Self {
        self.require_leaders = enabled;
        self
    }

    pub fn with_require_participant_character(mut self, enabled: bool) -> Self {
        self.require_participant_character = enabled;
        self
    }

    pub fn with_autoadd_on_client_enter(mut self, enabled: bool) -> Self {
        self.autoadd_on_client_enter = enabled;
        self
    }

    pub fn with_autoadd_on_creation_existing_users(mut self, enabled: bool) -> Self {
        self.autoadd_on_creation_existing_users = enabled;
        self
    }

    pub fn with_team_limit(mut self, limit: Option<usize>) -> Self {
        self.team_limit = limit;
        self
    }

    pub fn with_timer_limit(mut self, limit: Option<usize>) -> Self {
        self.timer_limit = limit;
        self
    }

    pub fn with_hub(mut self, hub: GameRef) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn with_minigame_limit(mut self, limit: Option<usize>) -> Self {
        self.minigame_limit = limit;
        self
    }

    pub fn with_autoadd_minigame_on_player_added(mut self, enabled: bool) -> Self {
        self.autoadd_minigame_on_player_added = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// TeamOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TeamOptions {
    pub player_limit: Option<usize>,
    pub require_invitations: bool,
    pub require_players: bool,
    pub require_leaders: bool,
}

impl Default for TeamOptions {
    fn default() -> Self {
        Self {
            player_limit: None,
            require_invitations: false,
            require_players: true,
            require_leaders: true,
        }
    }
}

// ---------------------------------------------------------------------------
// NsdOptions
// ---------------------------------------------------------------------------

/// What a trial leader may choose when starting a nonstop debate. The
/// remaining limits are fixed by the trial.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NsdOptions {
    pub player_limit: Option<usize>,
    pub require_invitations: bool,
    pub require_players: bool,
    pub require_participant_character: bool,
    pub team_limit: Option<usize>,
    pub timer_limit: Option<usize>,
    pub autoadd_on_creation_existing_users: bool,
    /// `None` inherits the trial's `autoadd_minigame_on_player_added`.
    pub autoadd_on_trial_player_add: Option<bool>,
    /// Debate length in seconds. Zero or less means no countdown.
    pub timer_start_value: f64,
}

impl Default for NsdOptions {
    fn default() -> Self {
        Self {
            player_limit: None,
            require_invitations: false,
            require_players: true,
            require_participant_character: false,
            team_limit: None,
            timer_limit: None,
            autoadd_on_creation_existing_users: false,
            autoadd_on_trial_player_add: None,
            timer_start_value: 300.0,
        }
    }
}

impl NsdOptions {
    pub fn with_timer_start_value(mut self, seconds: f64) -> Self {
        self.timer_start_value = seconds;
        self
    }

    pub fn with_autoadd_on_creation_existing_users(mut self, enabled: bool) -> Self {
        self.autoadd_on_creation_existing_users = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// HubSpec
// ---------------------------------------------------------------------------

/// The parsed asset lists a hub starts with.
///
/// The `*_source` fields only name where a list came from; they show up
/// in `hub_info`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HubSpec {
    pub name: String,
    pub area_source: String,
    pub areas: Vec<AreaSpec>,
    pub character_source: String,
    pub characters: Vec<String>,
    pub background_source: String,
    pub backgrounds: Vec<String>,
    pub music_source: String,
    pub music: Vec<String>,
}

impl Default for HubSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            area_source: "config/areas.yaml".into(),
            areas: vec![AreaSpec::named("Lobby")],
            character_source: "config/characters.yaml".into(),
            characters: Vec::new(),
            background_source: "config/backgrounds.yaml".into(),
            backgrounds: vec!["default".into()],
            music_source: "config/music.yaml".into(),
            music: Vec::new(),
        }
    }
}

impl HubSpec {
    pub fn with_areas(mut self, areas: Vec<AreaSpec>) -> Self {
        self.areas = areas;
        self
    }

    pub fn with_characters(mut self, characters: Vec<String>) -> Self {
        self.characters = characters;
        self
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Re-check every structural invariant after each public operation.
    pub validate_structure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_structure: true,
        }
    }
}
