//! Managers: registries of sibling games.
//!
//! A manager hands out ids inside its own namespace and keeps two reverse
//! indices (player → games, area → games) so that concurrency limits can
//! be checked without scanning every game.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use trialworks_protocol::{AreaId, ClientId, GameId, GameRef, ManagerRef};

use trialworks_tick::TimerManager;

use crate::areas::AreaBinding;
use crate::engine::Engine;
use crate::events::{directory, Source};
use crate::game::Game;
use crate::group::{PlayerGroup, TeamRoster};
use crate::hub::{HubAssets, HubBinding};
use crate::minigame::MinigameBinding;
use crate::trial::TrialExtras;
use crate::{ErrorKind, GameError, GameOptions, HubSpec, Layer};

// ---------------------------------------------------------------------------
// ManagerKind
// ---------------------------------------------------------------------------

/// The family of games a manager creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerKind {
    PlayerGroup,
    Game,
    GameWithAreas,
    HubbedGame,
    Hub,
    Trial,
    /// The minigames of one trial.
    Minigame,
}

impl ManagerKind {
    /// The layer errors of this manager's games are reported under.
    pub fn layer(self) -> Layer {
        match self {
            Self::PlayerGroup => Layer::PlayerGroup,
            Self::Game => Layer::Game,
            Self::GameWithAreas => Layer::GameWithAreas,
            Self::HubbedGame => Layer::HubbedGame,
            Self::Hub => Layer::Hub,
            Self::Trial => Layer::Trial,
            Self::Minigame => Layer::TrialMinigame,
        }
    }

    pub(crate) fn default_prefix(self) -> &'static str {
        match self {
            Self::PlayerGroup => "pg",
            Self::Game => "g",
            Self::GameWithAreas => "gwa",
            Self::HubbedGame => "hg",
            Self::Hub => "H",
            Self::Trial => "trial",
            Self::Minigame => "g",
        }
    }

    pub(crate) fn has_areas(self) -> bool {
        !matches!(self, Self::PlayerGroup | Self::Game)
    }

    pub(crate) fn is_hubbed(self) -> bool {
        matches!(self, Self::HubbedGame | Self::Trial | Self::Minigame)
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PlayerGroup => "player group manager",
            Self::Game => "game manager",
            Self::GameWithAreas => "game with areas manager",
            Self::HubbedGame => "hubbed game manager",
            Self::Hub => "hub manager",
            Self::Trial => "trial manager",
            Self::Minigame => "minigame manager",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Manager {
    key: ManagerRef,
    kind: ManagerKind,
    prefix: String,
    managee_limit: Option<usize>,
    /// The game this manager belongs to (a hub's trials, a trial's
    /// minigames). `None` for top-level managers.
    owner: Option<GameRef>,
    games: BTreeMap<GameId, GameRef>,
    player_games: BTreeMap<ClientId, BTreeSet<GameRef>>,
    area_games: BTreeMap<AreaId, BTreeSet<GameRef>>,
}

impl Manager {
    pub(crate) fn new(
        key: ManagerRef,
        kind: ManagerKind,
        prefix: String,
        managee_limit: Option<usize>,
        owner: Option<GameRef>,
    ) -> Self {
        Self {
            key,
            kind,
            prefix,
            managee_limit,
            owner,
            games: BTreeMap::new(),
            player_games: BTreeMap::new(),
            area_games: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> ManagerRef {
        self.key
    }

    pub fn kind(&self) -> ManagerKind {
        self.kind
    }

    /// Prefix of the ids this manager hands out.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn managee_limit(&self) -> Option<usize> {
        self.managee_limit
    }

    pub fn owner(&self) -> Option<GameRef> {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn manages(&self, game: GameRef) -> bool {
        self.games.values().any(|g| *g == game)
    }

    pub fn game_ids(&self) -> Vec<GameId> {
        self.games.keys().cloned().collect()
    }

    /// Managed games ordered by id.
    pub fn games(&self) -> Vec<GameRef> {
        self.games.values().copied().collect()
    }

    pub(crate) fn id_map(&self) -> &BTreeMap<GameId, GameRef> {
        &self.games
    }

    pub fn game_by_id(&self, id: &str) -> Option<GameRef> {
        self.games.get(&GameId::from(id)).copied()
    }

    pub fn games_of_user(&self, user: ClientId) -> BTreeSet<GameRef> {
        self.player_games.get(&user).cloned().unwrap_or_default()
    }

    pub fn games_in_area(&self, area: AreaId) -> BTreeSet<GameRef> {
        self.area_games.get(&area).cloned().unwrap_or_default()
    }

    pub(crate) fn player_index(&self) -> &BTreeMap<ClientId, BTreeSet<GameRef>> {
        &self.player_games
    }

    pub(crate) fn area_index(&self) -> &BTreeMap<AreaId, BTreeSet<GameRef>> {
        &self.area_games
    }

    /// Smallest free `{prefix}{n}` below the managee limit.
    pub(crate) fn available_id(&self) -> Result<(GameId, u64), ErrorKind> {
        (0..)
            .take_while(|n| self.managee_limit.is_none_or(|limit| *n < limit as u64))
            .map(|n| (GameId::new(&self.prefix, n), n))
            .find(|(id, _)| !self.games.contains_key(id))
            .ok_or(ErrorKind::ManagerTooManyGames)
    }

    pub(crate) fn insert(&mut self, id: GameId, game: GameRef) {
        self.games.insert(id, game);
    }

    pub(crate) fn remove(&mut self, id: &GameId) {
        self.games.remove(id);
    }

    pub(crate) fn index_player(&mut self, user: ClientId, game: GameRef) {
        self.player_games.entry(user).or_default().insert(game);
    }

    pub(crate) fn unindex_player(&mut self, user: ClientId, game: GameRef) {
        if let Some(games) = self.player_games.get_mut(&user) {
            games.remove(&game);
            if games.is_empty() {
                self.player_games.remove(&user);
            }
        }
    }

    pub(crate) fn index_area(&mut self, area: AreaId, game: GameRef) {
        self.area_games.entry(area).or_default().insert(game);
    }

    pub(crate) fn unindex_area(&mut self, area: AreaId, game: GameRef) {
        if let Some(games) = self.area_games.get_mut(&area) {
            games.remove(&game);
            if games.is_empty() {
                self.area_games.remove(&area);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Engine operations
// ---------------------------------------------------------------------------

impl Engine {
    /// Registers a new top-level manager.
    pub fn new_manager(&mut self, kind: ManagerKind, managee_limit: Option<usize>) -> ManagerRef {
        self.insert_manager(kind, kind.default_prefix().to_string(), managee_limit, None)
    }

    pub(crate) fn insert_manager(
        &mut self,
        kind: ManagerKind,
        prefix: String,
        managee_limit: Option<usize>,
        owner: Option<GameRef>,
    ) -> ManagerRef {
        let key = ManagerRef(self.next_manager);
        self.next_manager += 1;
        tracing::debug!(manager = %key, %kind, %prefix, ?managee_limit, "manager created");
        self.managers
            .insert(key, Manager::new(key, kind, prefix, managee_limit, owner));
        key
    }

    /// Creates a game in `manager`, adds its areas and then `creator`.
    ///
    /// If any step fails the half-built game is destroyed and the error
    /// returned.
    pub fn create_game(
        &mut self,
        manager: ManagerRef,
        options: GameOptions,
        creator: Option<ClientId>,
    ) -> Result<GameRef, GameError> {
        let layer = self
            .managers
            .get(&manager)
            .map_or(Layer::Game, |m| m.kind().layer());
        self.checked_as(layer, |e| {
            if e.managers.get(&manager).is_some_and(|m| m.kind() == ManagerKind::Hub) {
                e.do_new_hub(manager, options, HubSpec::default())
            } else {
                e.do_create_game(manager, options, creator)
            }
        })
    }

    pub(crate) fn do_create_game(
        &mut self,
        manager: ManagerRef,
        options: GameOptions,
        creator: Option<ClientId>,
    ) -> Result<GameRef, ErrorKind> {
        let m = self
            .managers
            .get(&manager)
            .ok_or(ErrorKind::UnknownManager(manager))?;
        let (id, number) = m.available_id()?;
        let (kind, owner) = (m.kind(), m.owner());
        let creator = creator.filter(|_| kind != ManagerKind::Hub);
        let creator_area = creator.and_then(|c| self.area_of(c));
        let hub = if kind.is_hubbed() {
            let hub = self
                .hub_for_new_game(kind, owner, &options, creator_area)
                .ok_or(ErrorKind::MissingCapability { needed: Layer::Hub })?;
            Some(HubBinding { hub })
        } else {
            None
        };
        if options.autoadd_on_client_enter && options.require_invitations {
            tracing::warn!(game = %id, "autoadd disabled for game requiring invitations");
        }
        let autoadd = options.autoadd_on_client_enter && !options.require_invitations;

        let key = GameRef(self.next_game);
        self.next_game += 1;
        let mut game = Game {
            key,
            manager,
            id: id.clone(),
            number,
            name: String::new(),
            layer: kind.layer(),
            unmanaged: false,
            group: PlayerGroup::new(
                options.player_limit,
                options.player_concurrent_limit,
                options.require_invitations,
                options.require_players,
                options.require_leaders,
            ),
            require_participant_character: options.require_participant_character,
            teams: TeamRoster::new(options.team_limit),
            timers: TimerManager::new(options.timer_limit),
            areas: kind.has_areas().then(|| {
                AreaBinding::new(options.area_concurrent_limit, autoadd, options.require_areas)
            }),
            hub,
            hub_assets: None,
            trial: None,
            minigame: None,
            nsd: None,
            children: None,
        };
        match kind {
            ManagerKind::Hub => {
                game.hub_assets = Some(HubAssets::from_spec(&HubSpec::default()));
            }
            ManagerKind::Trial => {
                game.trial = Some(TrialExtras::new(options.autoadd_minigame_on_player_added));
            }
            ManagerKind::Minigame => {
                let trial = owner.ok_or(ErrorKind::MissingCapability {
                    needed: Layer::Trial,
                })?;
                game.minigame = Some(MinigameBinding::new(
                    trial,
                    options.autoadd_on_trial_player_add,
                ));
            }
            _ => {}
        }
        game.layer = game.derive_layer(kind.layer());
        let topics = directory(
            game.areas.is_some(),
            game.hub.is_some(),
            game.trial.is_some(),
            game.minigame.is_some(),
        );
        let parent_trial = game.minigame.as_ref().map(|b| b.trial);
        self.games.insert(key, game);
        if let Some(m) = self.managers.get_mut(&manager) {
            m.insert(id.clone(), key);
        }
        let children = match kind {
            ManagerKind::Hub => Some(self.insert_manager(
                ManagerKind::Trial,
                ManagerKind::Trial.default_prefix().to_string(),
                None,
                Some(key),
            )),
            ManagerKind::Trial => Some(self.insert_manager(
                ManagerKind::Minigame,
                format!("{id}g"),
                options.minigame_limit,
                Some(key),
            )),
            _ => None,
        };
        if let Some(game) = self.games.get_mut(&key) {
            game.children = children;
        }
        self.bus.set_directory(key, topics);
        if let Some(hub) = hub {
            self.bus.subscribe(key, Source::AreaList(hub.hub));
        }
        if let Some(trial) = parent_trial {
            self.bus.subscribe(key, Source::Game(trial));
        }

        if kind.has_areas() && kind != ManagerKind::Hub {
            let initial: Vec<AreaId> = if options.areas.is_empty() {
                creator_area.into_iter().collect()
            } else {
                options.areas.clone()
            };
            for area in initial {
                if let Err(err) = self.do_add_area(key, area) {
                    self.do_destroy(key);
                    return Err(err);
                }
            }
        }
        if let Some(creator) = creator {
            if let Err(err) = self.do_add_player(key, creator) {
                self.do_destroy(key);
                return Err(err);
            }
        }
        if options.autoadd_on_creation_existing_users {
            for user in self.users_in_areas(key) {
                if Some(user) == creator || self.is_player(key, user) {
                    continue;
                }
                if let Err(err) = self.do_add_player(key, user) {
                    self.do_destroy(key);
                    return Err(err);
                }
            }
        }
        if kind == ManagerKind::Trial {
            for user in self.nonplayer_users_in_areas(key) {
                self.trial_introduce(key, user);
            }
        }
        tracing::info!(game = %id, %kind, "game created");
        Ok(key)
    }

    fn hub_for_new_game(
        &self,
        kind: ManagerKind,
        owner: Option<GameRef>,
        options: &GameOptions,
        creator_area: Option<AreaId>,
    ) -> Option<GameRef> {
        match kind {
            ManagerKind::Trial => owner,
            ManagerKind::Minigame => self.games.get(&owner?)?.hub(),
            _ => options.hub.or_else(|| {
                let area = self.world.areas.get(creator_area?).ok()?;
                Some(area.hub)
            }),
        }
    }

    /// Destroys a game of `manager`.
    pub fn delete_game(&mut self, manager: ManagerRef, game: GameRef) -> Result<(), GameError> {
        let layer = self
            .managers
            .get(&manager)
            .map_or(Layer::Game, |m| m.kind().layer());
        self.checked_as(layer, |e| {
            let m = e.managers.get(&manager).ok_or(ErrorKind::UnknownManager(manager))?;
            if !m.manages(game) {
                return Err(ErrorKind::ManagerDoesNotManageGame);
            }
            e.guard_last_hub(game)?;
            e.do_destroy(game);
            Ok(())
        })
    }

    pub fn game_by_id(&self, manager: ManagerRef, id: &str) -> Result<GameRef, GameError> {
        let m = self.manager_or_err(manager)?;
        m.game_by_id(id).ok_or_else(|| {
            GameError::new(m.kind().layer(), ErrorKind::invalid_game_id(id))
        })
    }

    /// Looks a game up by the number after its prefix (`3` for `trial3`).
    pub fn game_by_numerical_id(
        &self,
        manager: ManagerRef,
        number: u64,
    ) -> Result<GameRef, GameError> {
        let m = self.manager_or_err(manager)?;
        let id = GameId::new(m.prefix(), number);
        m.game_by_id(id.as_str()).ok_or_else(|| {
            GameError::new(m.kind().layer(), ErrorKind::invalid_game_id(id.as_str()))
        })
    }

    pub fn games_of_user(&self, manager: ManagerRef, user: ClientId) -> BTreeSet<GameRef> {
        self.managers
            .get(&manager)
            .map(|m| m.games_of_user(user))
            .unwrap_or_default()
    }

    pub fn games_in_area(&self, manager: ManagerRef, area: AreaId) -> BTreeSet<GameRef> {
        self.managers
            .get(&manager)
            .map(|m| m.games_in_area(area))
            .unwrap_or_default()
    }

    pub fn game_ids(&self, manager: ManagerRef) -> Vec<GameId> {
        self.managers
            .get(&manager)
            .map(Manager::game_ids)
            .unwrap_or_default()
    }

    /// The most restrictive sibling game that already stops `user` from
    /// joining another game of `manager`, if any.
    pub fn find_player_concurrent_limiting_game(
        &self,
        manager: ManagerRef,
        user: ClientId,
    ) -> Option<GameRef> {
        let games = self.managers.get(&manager)?.games_of_user(user);
        self.most_restrictive(&games, |g| g.group().player_concurrent_limit())
    }

    /// Same as [`find_player_concurrent_limiting_game`](Self::find_player_concurrent_limiting_game)
    /// for areas.
    pub fn find_area_concurrent_limiting_game(
        &self,
        manager: ManagerRef,
        area: AreaId,
    ) -> Option<GameRef> {
        let games = self.managers.get(&manager)?.games_in_area(area);
        self.most_restrictive(&games, |g| g.areas().and_then(|b| b.area_concurrent_limit()))
    }

    fn most_restrictive(
        &self,
        games: &BTreeSet<GameRef>,
        limit_of: impl Fn(&Game) -> Option<usize>,
    ) -> Option<GameRef> {
        let (game, limit) = games
            .iter()
            .filter_map(|g| {
                let limit = self.games.get(g).and_then(&limit_of)?;
                Some((*g, limit))
            })
            .min_by_key(|(_, limit)| *limit)?;
        (games.len() >= limit).then_some(game)
    }

    pub(crate) fn check_player_concurrency(
        &self,
        manager: ManagerRef,
        own_limit: Option<usize>,
        user: ClientId,
    ) -> Result<(), ErrorKind> {
        if self.find_player_concurrent_limiting_game(manager, user).is_some() {
            return Err(ErrorKind::UserHitGameConcurrentLimit);
        }
        let count = self.games_of_user(manager, user).len();
        if own_limit.is_some_and(|limit| count >= limit) {
            return Err(ErrorKind::UserHitGameConcurrentLimit);
        }
        Ok(())
    }

    fn manager_or_err(&self, manager: ManagerRef) -> Result<&Manager, GameError> {
        self.managers
            .get(&manager)
            .ok_or_else(|| GameError::new(Layer::Game, ErrorKind::UnknownManager(manager)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(limit: Option<usize>) -> Manager {
        Manager::new(ManagerRef(0), ManagerKind::Trial, "trial".into(), limit, None)
    }

    #[test]
    fn test_available_id_smallest_free() {
        let mut m = manager(None);
        m.insert(GameId::from("trial0"), GameRef(0));
        m.insert(GameId::from("trial2"), GameRef(1));
        assert_eq!(m.available_id().unwrap(), (GameId::from("trial1"), 1));
    }

    #[test]
    fn test_available_id_respects_limit() {
        let mut m = manager(Some(1));
        m.insert(GameId::from("trial0"), GameRef(0));
        assert_eq!(m.available_id(), Err(ErrorKind::ManagerTooManyGames));
    }

    #[test]
    fn test_unindex_drops_empty_entries() {
        let mut m = manager(None);
        m.index_player(ClientId(1), GameRef(4));
        m.index_area(AreaId(2), GameRef(4));
        m.unindex_player(ClientId(1), GameRef(4));
        m.unindex_area(AreaId(2), GameRef(4));
        assert!(m.player_index().is_empty());
        assert!(m.area_index().is_empty());
    }

    #[test]
    fn test_kind_layers_and_prefixes() {
        assert_eq!(ManagerKind::Hub.default_prefix(), "H");
        assert_eq!(ManagerKind::GameWithAreas.layer(), Layer::GameWithAreas);
        assert!(ManagerKind::Minigame.is_hubbed());
        assert!(!ManagerKind::Game.has_areas());
    }
}
