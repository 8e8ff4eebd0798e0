//! Games bound to a set of areas.

use std::collections::BTreeSet;

use trialworks_protocol::{AreaId, ClientId, GameRef};

use crate::engine::Engine;
use crate::events::Source;
use crate::{ErrorKind, GameError, Layer};

/// The area capability of a game.
#[derive(Debug, Clone, Default)]
pub struct AreaBinding {
    areas: BTreeSet<AreaId>,
    area_concurrent_limit: Option<usize>,
    autoadd_on_client_enter: bool,
    require_areas: bool,
    ever_had_areas: bool,
}

impl AreaBinding {
    pub(crate) fn new(
        area_concurrent_limit: Option<usize>,
        autoadd_on_client_enter: bool,
        require_areas: bool,
    ) -> Self {
        Self {
            areas: BTreeSet::new(),
            area_concurrent_limit,
            autoadd_on_client_enter,
            require_areas,
            ever_had_areas: false,
        }
    }

    pub fn areas(&self) -> &BTreeSet<AreaId> {
        &self.areas
    }

    pub fn contains(&self, area: AreaId) -> bool {
        self.areas.contains(&area)
    }

    pub fn area_concurrent_limit(&self) -> Option<usize> {
        self.area_concurrent_limit
    }

    pub fn autoadd_on_client_enter(&self) -> bool {
        self.autoadd_on_client_enter
    }

    pub fn requires_areas(&self) -> bool {
        self.require_areas
    }

    pub fn ever_had_areas(&self) -> bool {
        self.ever_had_areas
    }

    fn insert(&mut self, area: AreaId) {
        self.areas.insert(area);
        self.ever_had_areas = true;
    }

    pub(crate) fn take_areas(&mut self) -> Vec<AreaId> {
        std::mem::take(&mut self.areas).into_iter().collect()
    }
}

impl Engine {
    pub fn add_area(&mut self, game: GameRef, area: AreaId) -> Result<(), GameError> {
        self.checked(game, |e| e.do_add_area(game, area))
    }

    /// Removes an area, first removing the players standing in it. A game
    /// that requires areas is destroyed when its last one goes.
    pub fn remove_area(&mut self, game: GameRef, area: AreaId) -> Result<(), GameError> {
        self.checked(game, |e| e.do_remove_area(game, area))
    }

    pub fn has_area(&self, game: GameRef, area: AreaId) -> bool {
        self.games.get(&game).is_some_and(|g| g.has_area(area))
    }

    pub fn game_areas(&self, game: GameRef) -> BTreeSet<AreaId> {
        self.games
            .get(&game)
            .and_then(|g| g.areas.as_ref())
            .map(|b| b.areas.clone())
            .unwrap_or_default()
    }

    /// Turning autoadd on for a game that requires invitations is ignored.
    pub fn set_autoadd_on_client_enter(
        &mut self,
        game: GameRef,
        enabled: bool,
    ) -> Result<(), GameError> {
        self.checked(game, |e| {
            let g = e.live_game_mut(game)?;
            let requires_invitations = g.group.requires_invitations();
            let binding = g.areas.as_mut().ok_or(ErrorKind::MissingCapability {
                needed: Layer::GameWithAreas,
            })?;
            if enabled && requires_invitations {
                tracing::warn!(%game, "autoadd ignored for game requiring invitations");
                return Ok(());
            }
            binding.autoadd_on_client_enter = enabled;
            Ok(())
        })
    }

    /// Everyone standing in one of the game's areas.
    pub fn users_in_areas(&self, game: GameRef) -> BTreeSet<ClientId> {
        self.game_areas(game)
            .into_iter()
            .flat_map(|area| self.world.clients_in(area))
            .collect()
    }

    pub fn nonplayer_users_in_areas(&self, game: GameRef) -> BTreeSet<ClientId> {
        self.users_in_areas(game)
            .into_iter()
            .filter(|u| !self.is_player(game, *u))
            .collect()
    }

    pub fn nonleader_users_in_areas(&self, game: GameRef) -> BTreeSet<ClientId> {
        let leaders = self.leaders(game);
        self.users_in_areas(game)
            .into_iter()
            .filter(|u| !leaders.contains(u))
            .collect()
    }

    pub(crate) fn do_add_area(&mut self, key: GameRef, area: AreaId) -> Result<(), ErrorKind> {
        let game = self.live_game(key)?;
        let binding = game.areas.as_ref().ok_or(ErrorKind::MissingCapability {
            needed: Layer::GameWithAreas,
        })?;
        let record = self
            .world
            .areas
            .get(area)
            .map_err(|_| ErrorKind::UnknownArea(area))?;
        if let Some(mg) = &game.minigame {
            if !self.has_area(mg.trial, area) {
                return Err(ErrorKind::AreaNotInGame);
            }
        }
        if game.trial.is_some() && !record.bullet {
            return Err(ErrorKind::AreaDisallowsBullets);
        }
        if game.hub.as_ref().is_some_and(|h| h.hub != record.hub) {
            return Err(ErrorKind::AreaNotInHub);
        }
        if binding.contains(area) {
            return Err(ErrorKind::AreaAlreadyInGame);
        }
        if self
            .find_area_concurrent_limiting_game(game.manager, area)
            .is_some()
        {
            return Err(ErrorKind::AreaHitGameConcurrentLimit);
        }
        let count = self.games_in_area(game.manager, area).len();
        if binding.area_concurrent_limit.is_some_and(|limit| count >= limit) {
            return Err(ErrorKind::AreaHitGameConcurrentLimit);
        }

        let game = self.live_game_mut(key)?;
        if let Some(binding) = game.areas.as_mut() {
            binding.insert(area);
        }
        let manager = game.manager;
        tracing::debug!(game = %game.id, %area, "area added");
        self.bus.subscribe(key, Source::Area(area));
        if let Some(m) = self.managers.get_mut(&manager) {
            m.index_area(area, key);
        }
        Ok(())
    }

    pub(crate) fn do_remove_area(&mut self, key: GameRef, area: AreaId) -> Result<(), ErrorKind> {
        let game = self.live_game(key)?;
        if !game.has_area(area) {
            return Err(ErrorKind::AreaNotInGame);
        }
        if game.trial.is_some() {
            for minigame in self.minigames_of(key) {
                if self.has_area(minigame, area) {
                    let result = self.do_remove_area(minigame, area);
                    self.cascade(result, "removing trial area from minigame");
                }
            }
        }

        let standing: Vec<ClientId> = self
            .players(key)
            .into_iter()
            .filter(|p| self.area_of(*p) == Some(area))
            .collect();
        for player in standing {
            if !self.is_live(key) {
                break;
            }
            let result = self.do_remove_player(key, player);
            self.cascade(result, "removing player of removed area");
        }
        if !self.is_live(key) {
            return Ok(());
        }

        let game = self.live_game_mut(key)?;
        let mut emptied = false;
        if let Some(binding) = game.areas.as_mut() {
            binding.areas.remove(&area);
            emptied = binding.require_areas && binding.areas.is_empty();
        }
        let manager = game.manager;
        tracing::debug!(game = %game.id, %area, "area removed");
        self.bus.unsubscribe(key, Source::Area(area));
        if let Some(m) = self.managers.get_mut(&manager) {
            m.unindex_area(area, key);
        }
        if emptied {
            self.do_destroy(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_marks_ever_had_areas() {
        let mut binding = AreaBinding::new(None, false, true);
        assert!(!binding.ever_had_areas());
        binding.insert(AreaId(3));
        assert!(binding.contains(AreaId(3)));
        assert_eq!(binding.take_areas(), vec![AreaId(3)]);
        assert!(binding.ever_had_areas());
        assert!(binding.areas().is_empty());
    }
}
