//! The game entity and the operations every game supports.
//!
//! A [`Game`] is a player group plus optional capability records. Which
//! records are present decides the game's [`Layer`]: a game with an
//! [`AreaBinding`] is a game with areas, adding a [`HubBinding`] makes it
//! hubbed, and so on up to nonstop debates.

use std::collections::BTreeSet;

use trialworks_protocol::{ClientId, GameId, GameRef, ManagerRef};
use trialworks_tick::{Timer, TimerError, TimerId, TimerManager, TimerSettings};

use crate::areas::AreaBinding;
use crate::engine::Engine;
use crate::events::Source;
use crate::group::{PlayerGroup, TeamRoster};
use crate::hub::{HubAssets, HubBinding};
use crate::minigame::MinigameBinding;
use crate::nsd::NonStopDebate;
use crate::trial::TrialExtras;
use crate::{ErrorKind, GameError, Layer, TeamOptions};

#[derive(Debug, Clone)]
pub struct Game {
    pub(crate) key: GameRef,
    pub(crate) manager: ManagerRef,
    pub(crate) id: GameId,
    pub(crate) number: u64,
    pub(crate) name: String,
    pub(crate) layer: Layer,
    pub(crate) unmanaged: bool,
    pub(crate) group: PlayerGroup,
    pub(crate) require_participant_character: bool,
    pub(crate) teams: TeamRoster,
    pub(crate) timers: TimerManager,
    pub(crate) areas: Option<AreaBinding>,
    pub(crate) hub: Option<HubBinding>,
    pub(crate) hub_assets: Option<HubAssets>,
    pub(crate) trial: Option<TrialExtras>,
    pub(crate) minigame: Option<MinigameBinding>,
    pub(crate) nsd: Option<NonStopDebate>,
    /// Manager of this game's own sub-games (a hub's trials, a trial's
    /// minigames).
    pub(crate) children: Option<ManagerRef>,
}

impl Game {
    pub fn key(&self) -> GameRef {
        self.key
    }

    /// The manager that created this game. Still reported after the game
    /// was destroyed.
    pub fn manager(&self) -> ManagerRef {
        self.manager
    }

    pub fn id(&self) -> &GameId {
        &self.id
    }

    /// The number after the manager prefix.
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn is_unmanaged(&self) -> bool {
        self.unmanaged
    }

    pub fn group(&self) -> &PlayerGroup {
        &self.group
    }

    pub fn players(&self) -> &BTreeSet<ClientId> {
        self.group.players()
    }

    pub fn leaders(&self) -> &BTreeSet<ClientId> {
        self.group.leaders()
    }

    pub fn is_player(&self, user: ClientId) -> bool {
        self.group.is_player(user)
    }

    pub fn is_leader(&self, user: ClientId) -> bool {
        self.group.leaders().contains(&user)
    }

    pub fn requires_participant_character(&self) -> bool {
        self.require_participant_character
    }

    pub fn teams(&self) -> &TeamRoster {
        &self.teams
    }

    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    pub fn areas(&self) -> Option<&AreaBinding> {
        self.areas.as_ref()
    }

    /// The hub whose areas this game may use.
    pub fn hub(&self) -> Option<GameRef> {
        self.hub.as_ref().map(|b| b.hub)
    }

    pub fn hub_assets(&self) -> Option<&HubAssets> {
        self.hub_assets.as_ref()
    }

    pub fn trial_extras(&self) -> Option<&TrialExtras> {
        self.trial.as_ref()
    }

    pub fn minigame(&self) -> Option<&MinigameBinding> {
        self.minigame.as_ref()
    }

    pub fn nsd(&self) -> Option<&NonStopDebate> {
        self.nsd.as_ref()
    }

    pub fn children(&self) -> Option<ManagerRef> {
        self.children
    }

    pub(crate) fn has_area(&self, area: trialworks_protocol::AreaId) -> bool {
        self.areas.as_ref().is_some_and(|b| b.contains(area))
    }

    /// Most specific family, from the capability records present.
    pub(crate) fn derive_layer(&self, fallback: Layer) -> Layer {
        if self.nsd.is_some() {
            Layer::NonStopDebate
        } else if self.minigame.is_some() {
            Layer::TrialMinigame
        } else if self.trial.is_some() {
            Layer::Trial
        } else if self.hub_assets.is_some() {
            Layer::Hub
        } else if self.hub.is_some() {
            Layer::HubbedGame
        } else if self.areas.is_some() {
            Layer::GameWithAreas
        } else {
            fallback
        }
    }
}

// ---------------------------------------------------------------------------
// Engine operations: membership
// ---------------------------------------------------------------------------

impl Engine {
    pub fn add_player(&mut self, game: GameRef, user: ClientId) -> Result<(), GameError> {
        self.checked(game, |e| e.do_add_player(game, user))
    }

    pub fn remove_player(&mut self, game: GameRef, user: ClientId) -> Result<(), GameError> {
        self.checked(game, |e| e.do_remove_player(game, user))
    }

    pub fn add_leader(&mut self, game: GameRef, user: ClientId) -> Result<(), GameError> {
        self.checked(game, |e| {
            e.live_game_mut(game)?.group.add_leader(user)?;
            Ok(())
        })
    }

    pub fn remove_leader(&mut self, game: GameRef, user: ClientId) -> Result<(), GameError> {
        self.checked(game, |e| {
            e.live_game_mut(game)?.group.remove_leader(user)?;
            Ok(())
        })
    }

    pub fn add_invitation(&mut self, game: GameRef, user: ClientId) -> Result<(), GameError> {
        self.checked(game, |e| {
            e.live_game_mut(game)?.group.add_invitation(user)?;
            Ok(())
        })
    }

    pub fn remove_invitation(&mut self, game: GameRef, user: ClientId) -> Result<(), GameError> {
        self.checked(game, |e| {
            e.live_game_mut(game)?.group.remove_invitation(user)?;
            Ok(())
        })
    }

    pub fn is_player(&self, game: GameRef, user: ClientId) -> bool {
        self.games.get(&game).is_some_and(|g| g.is_player(user))
    }

    /// Whether `user` leads `game`. Errors if `user` is not a player.
    pub fn is_leader(&self, game: GameRef, user: ClientId) -> Result<bool, GameError> {
        let g = self.game_or_err(game)?;
        g.group.is_leader(user).map_err(|kind| GameError::new(g.layer, kind))
    }

    pub fn is_invited(&self, game: GameRef, user: ClientId) -> Result<bool, GameError> {
        let g = self.game_or_err(game)?;
        g.group.is_invited(user).map_err(|kind| GameError::new(g.layer, kind))
    }

    pub fn players(&self, game: GameRef) -> BTreeSet<ClientId> {
        self.games
            .get(&game)
            .map(|g| g.players().clone())
            .unwrap_or_default()
    }

    pub fn leaders(&self, game: GameRef) -> BTreeSet<ClientId> {
        self.games
            .get(&game)
            .map(|g| g.leaders().clone())
            .unwrap_or_default()
    }

    pub fn regulars(&self, game: GameRef) -> BTreeSet<ClientId> {
        self.games
            .get(&game)
            .map(|g| g.group.regulars())
            .unwrap_or_default()
    }

    pub fn set_name(&mut self, game: GameRef, name: impl Into<String>) -> Result<(), GameError> {
        let name = name.into();
        self.checked(game, |e| {
            e.live_game_mut(game)?.name = name;
            Ok(())
        })
    }

    /// Destroys a game. Destroying an unmanaged game does nothing.
    pub fn destroy(&mut self, game: GameRef) -> Result<(), GameError> {
        self.checked(game, |e| {
            e.game_ref(game)?;
            e.guard_last_hub(game)?;
            e.do_destroy(game);
            Ok(())
        })
    }

    pub(crate) fn do_add_player(&mut self, key: GameRef, user: ClientId) -> Result<(), ErrorKind> {
        let client = self
            .world
            .clients
            .get(user)
            .map_err(|_| ErrorKind::UnknownClient(user))?;
        let game = self.live_game(key)?;
        if let Some(binding) = &game.minigame {
            if !self.is_player(binding.trial, user) {
                return Err(ErrorKind::UserNotPlayer);
            }
        }
        if game.areas.is_some() && !client.area.is_some_and(|a| game.has_area(a)) {
            return Err(ErrorKind::UserNotInArea);
        }
        if game.require_participant_character && !client.has_participant_character() {
            return Err(ErrorKind::UserHasNoCharacter);
        }
        game.group.check_admission(user)?;
        self.check_player_concurrency(game.manager, game.group.player_concurrent_limit(), user)?;

        let game = self.live_game_mut(key)?;
        game.group.admit(user);
        let manager = game.manager;
        tracing::debug!(game = %game.id, client = %user, "player added");
        self.bus.subscribe(key, Source::Client(user));
        if let Some(m) = self.managers.get_mut(&manager) {
            m.index_player(user, key);
        }

        let game = self.live_game(key)?;
        let (is_trial, is_nsd) = (game.trial.is_some(), game.nsd.is_some());
        if is_trial {
            self.trial_on_player_added(key, user);
        }
        if is_nsd {
            self.nsd_introduce(key, user);
        }
        Ok(())
    }

    pub(crate) fn do_remove_player(
        &mut self,
        key: GameRef,
        user: ClientId,
    ) -> Result<(), ErrorKind> {
        let game = self.live_game(key)?;
        if !game.is_player(user) {
            return Err(ErrorKind::UserNotPlayer);
        }
        if game.trial.is_some() {
            self.trial_before_player_removed(key, user);
        }

        let game = self.live_game_mut(key)?;
        game.teams.remove_player(user);
        game.group.remove(user)?;
        let manager = game.manager;
        let emptied = game.group.requires_players() && game.group.is_empty();
        let is_nsd = game.nsd.is_some();
        tracing::debug!(game = %game.id, client = %user, "player removed");
        self.bus.unsubscribe(key, Source::Client(user));
        if let Some(m) = self.managers.get_mut(&manager) {
            m.unindex_player(user, key);
        }

        if emptied {
            self.do_destroy(key);
        }
        if is_nsd {
            self.nsd_dismiss(key, user);
        }
        Ok(())
    }

    /// Tears a game down. A no-op for games that are already unmanaged.
    pub(crate) fn do_destroy(&mut self, key: GameRef) {
        let Some(game) = self.games.get(&key) else {
            return;
        };
        if game.unmanaged {
            return;
        }
        let occupants = self.users_in_areas(key);
        let is_trial = game.trial.is_some();
        let is_hub = game.hub_assets.is_some();
        let children = game.children;

        // Sub-games go first so they still see their parent while leaving.
        if is_trial || is_hub {
            let subgames = children
                .and_then(|c| self.managers.get(&c))
                .map(|m| m.games())
                .unwrap_or_default();
            for sub in subgames {
                self.do_destroy(sub);
            }
        }

        let Some(game) = self.games.get_mut(&key) else {
            return;
        };
        game.unmanaged = true;
        let players: Vec<ClientId> = game.group.players().iter().copied().collect();
        let areas: Vec<_> = game
            .areas
            .as_mut()
            .map(AreaBinding::take_areas)
            .unwrap_or_default();
        game.timers.clear();
        game.teams.clear();
        game.group.clear();
        let children = game.children.take();
        let (manager, id, layer) = (game.manager, game.id.clone(), game.layer);

        if let Some(m) = self.managers.get_mut(&manager) {
            m.remove(&id);
            for player in &players {
                m.unindex_player(*player, key);
            }
            for area in &areas {
                m.unindex_area(*area, key);
            }
        }
        self.bus.unsubscribe_all(key);
        if let Some(child) = children {
            self.managers.remove(&child);
        }
        tracing::info!(game = %id, %layer, "game destroyed");

        let Some(game) = self.games.get(&key) else {
            return;
        };
        let (is_minigame, is_nsd) = (game.minigame.is_some(), game.nsd.is_some());
        if is_trial {
            self.trial_after_destroy(key, &occupants);
        }
        if is_minigame {
            for user in &occupants {
                self.with_client(*user, |c| c.send_gamemode("trial"));
            }
        }
        if is_nsd {
            for user in &occupants {
                self.nsd_dismiss(key, *user);
            }
        }
        if is_hub {
            self.hub_after_destroy(key, &occupants, areas);
        }
    }

    /// Hubs can only be deleted while another one remains.
    pub(crate) fn guard_last_hub(&self, game: GameRef) -> Result<(), ErrorKind> {
        let g = self.game_ref(game)?;
        if g.hub_assets.is_some() && !g.unmanaged {
            let hubs = self.managers.get(&g.manager).map_or(0, |m| m.len());
            if hubs <= 1 {
                return Err(ErrorKind::ManagerCannotManageeNoManagees);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine operations: teams
// ---------------------------------------------------------------------------

impl Engine {
    /// Creates a team in `game`. `creator`, if given, must be a player.
    pub fn new_team(
        &mut self,
        game: GameRef,
        creator: Option<ClientId>,
        options: TeamOptions,
    ) -> Result<GameId, GameError> {
        self.checked(game, |e| {
            let g = e.live_game_mut(game)?;
            if let Some(creator) = creator {
                if !g.is_player(creator) {
                    return Err(ErrorKind::UserNotPlayer);
                }
            }
            g.teams.new_team(creator, &options)
        })
    }

    pub fn delete_team(&mut self, game: GameRef, team: &GameId) -> Result<(), GameError> {
        self.checked(game, |e| {
            e.live_game_mut(game)?.teams.delete_team(team)?;
            Ok(())
        })
    }

    pub fn add_team_player(
        &mut self,
        game: GameRef,
        team: &GameId,
        user: ClientId,
    ) -> Result<(), GameError> {
        self.checked(game, |e| {
            let g = e.live_game_mut(game)?;
            if !g.is_player(user) {
                return Err(ErrorKind::UserNotPlayer);
            }
            g.teams.add_player(team, user)
        })
    }

    pub fn remove_team_player(&mut self, game: GameRef, user: ClientId) -> Result<(), GameError> {
        self.checked(game, |e| {
            let g = e.live_game_mut(game)?;
            if g.teams.team_of(user).is_none() {
                return Err(ErrorKind::UserNotPlayer);
            }
            g.teams.remove_player(user);
            Ok(())
        })
    }

    pub fn team_of_user(&self, game: GameRef, user: ClientId) -> Option<GameId> {
        self.games.get(&game)?.teams.team_of(user).cloned()
    }
}

// ---------------------------------------------------------------------------
// Engine operations: timers
// ---------------------------------------------------------------------------

impl Engine {
    pub fn new_timer(
        &mut self,
        game: GameRef,
        settings: TimerSettings,
    ) -> Result<TimerId, GameError> {
        self.checked(game, |e| {
            e.live_game_mut(game)?
                .timers
                .new_timer(settings)
                .map_err(timer_kind)
        })
    }

    pub fn delete_timer(&mut self, game: GameRef, timer: TimerId) -> Result<(), GameError> {
        self.checked(game, |e| {
            e.live_game_mut(game)?
                .timers
                .delete_timer(timer)
                .map_err(timer_kind)
        })
    }

    pub fn timer(&self, game: GameRef, timer: TimerId) -> Option<&Timer> {
        self.games.get(&game)?.timers.timer(timer).ok()
    }

    /// Runs `op` on one of the game's timers.
    pub fn with_timer<T>(
        &mut self,
        game: GameRef,
        timer: TimerId,
        op: impl FnOnce(&mut Timer) -> Result<T, TimerError>,
    ) -> Result<T, GameError> {
        self.checked(game, |e| {
            let t = e
                .live_game_mut(game)?
                .timers
                .timer_mut(timer)
                .map_err(timer_kind)?;
            op(t).map_err(ErrorKind::from)
        })
    }
}

/// Manager-level timer failures map to game errors; the rest pass through.
pub(crate) fn timer_kind(err: TimerError) -> ErrorKind {
    match err {
        TimerError::ManagerTooManyTimers => ErrorKind::GameTooManyTimers,
        TimerError::ManagerDoesNotManageTimer => ErrorKind::GameDoesNotManageTimer,
        TimerError::ManagerInvalidTimerId => ErrorKind::GameInvalidTimerId,
        other => ErrorKind::Timer(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_kind_maps_manager_errors() {
        assert_eq!(
            timer_kind(TimerError::ManagerTooManyTimers),
            ErrorKind::GameTooManyTimers
        );
        assert_eq!(
            timer_kind(TimerError::AlreadyPaused),
            ErrorKind::Timer(TimerError::AlreadyPaused)
        );
    }
}
