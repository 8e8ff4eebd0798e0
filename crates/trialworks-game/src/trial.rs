//! Trials: hubbed games whose players carry influence and focus, and
//! which host minigames such as nonstop debates.

use std::collections::{BTreeMap, BTreeSet};

use trialworks_protocol::{AreaId, ClientId, GameRef, HealthSide, ManagerRef};

use crate::engine::{area_label, Engine};
use crate::events::{Event, Source};
use crate::{ErrorKind, GameError, GameOptions, Layer, NsdOptions};

/// A bounded trial statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stat {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl Stat {
    fn full(min: f64, max: f64) -> Self {
        Self {
            value: max,
            min,
            max,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatKind {
    Influence,
    Focus,
}

impl StatKind {
    fn side(self) -> HealthSide {
        match self {
            Self::Influence => HealthSide::Influence,
            Self::Focus => HealthSide::Focus,
        }
    }

    fn invalid(self) -> ErrorKind {
        match self {
            Self::Influence => ErrorKind::InfluenceIsInvalid,
            Self::Focus => ErrorKind::FocusIsInvalid,
        }
    }
}

const MIN_STAT: f64 = 0.0;
const MAX_STAT: f64 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct TrialExtras {
    influence: BTreeMap<ClientId, Stat>,
    focus: BTreeMap<ClientId, Stat>,
    autoadd_minigame_on_player_added: bool,
}

impl TrialExtras {
    pub(crate) fn new(autoadd_minigame_on_player_added: bool) -> Self {
        Self {
            autoadd_minigame_on_player_added,
            ..Default::default()
        }
    }

    pub fn influence(&self, user: ClientId) -> Option<Stat> {
        self.influence.get(&user).copied()
    }

    pub fn focus(&self, user: ClientId) -> Option<Stat> {
        self.focus.get(&user).copied()
    }

    pub fn autoadd_minigame_on_player_added(&self) -> bool {
        self.autoadd_minigame_on_player_added
    }

    pub(crate) fn tracked(&self) -> (BTreeSet<ClientId>, BTreeSet<ClientId>) {
        (
            self.influence.keys().copied().collect(),
            self.focus.keys().copied().collect(),
        )
    }

    pub(crate) fn stats(&self) -> impl Iterator<Item = (ClientId, Stat)> + '_ {
        self.influence
            .iter()
            .chain(self.focus.iter())
            .map(|(user, stat)| (*user, *stat))
    }

    fn map(&self, kind: StatKind) -> &BTreeMap<ClientId, Stat> {
        match kind {
            StatKind::Influence => &self.influence,
            StatKind::Focus => &self.focus,
        }
    }

    fn map_mut(&mut self, kind: StatKind) -> &mut BTreeMap<ClientId, Stat> {
        match kind {
            StatKind::Influence => &mut self.influence,
            StatKind::Focus => &mut self.focus,
        }
    }
}

// ---------------------------------------------------------------------------
// Public operations
// ---------------------------------------------------------------------------

impl Engine {
    /// Starts a trial in `hub`. With no explicit areas the trial takes the
    /// creator's area.
    pub fn new_trial(
        &mut self,
        hub: GameRef,
        creator: Option<ClientId>,
        options: GameOptions,
    ) -> Result<GameRef, GameError> {
        self.checked_as(Layer::Trial, |e| {
            let manager = e.trial_manager_of(hub)?;
            e.do_create_game(manager, options, creator)
        })
    }

    /// The trial of `hub` that `user` plays in.
    pub fn trial_of_user(&self, hub: GameRef, user: ClientId) -> Result<GameRef, GameError> {
        let manager = self
            .trial_manager_of(hub)
            .map_err(|kind| GameError::new(Layer::Trial, kind))?;
        self.games_of_user(manager, user)
            .into_iter()
            .next()
            .ok_or_else(|| GameError::new(Layer::Trial, ErrorKind::UserNotPlayer))
    }

    pub fn influence(&self, trial: GameRef, user: ClientId) -> Result<Stat, GameError> {
        self.stat(trial, user, StatKind::Influence)
    }

    pub fn focus(&self, trial: GameRef, user: ClientId) -> Result<Stat, GameError> {
        self.stat(trial, user, StatKind::Focus)
    }

    pub fn set_influence(
        &mut self,
        trial: GameRef,
        user: ClientId,
        value: f64,
    ) -> Result<(), GameError> {
        self.checked_as(Layer::Trial, |e| {
            e.do_set_stat(trial, user, StatKind::Influence, value)
        })
    }

    /// Adds `delta`, clamped to the player's bounds.
    pub fn change_influence_by(
        &mut self,
        trial: GameRef,
        user: ClientId,
        delta: f64,
    ) -> Result<(), GameError> {
        self.checked_as(Layer::Trial, |e| {
            e.do_change_stat_by(trial, user, StatKind::Influence, delta)
        })
    }

    pub fn set_focus(&mut self, trial: GameRef, user: ClientId, value: f64) -> Result<(), GameError> {
        self.checked_as(Layer::Trial, |e| {
            e.do_set_stat(trial, user, StatKind::Focus, value)
        })
    }

    pub fn change_focus_by(
        &mut self,
        trial: GameRef,
        user: ClientId,
        delta: f64,
    ) -> Result<(), GameError> {
        self.checked_as(Layer::Trial, |e| {
            e.do_change_stat_by(trial, user, StatKind::Focus, delta)
        })
    }

    pub fn set_autoadd_minigame_on_player_added(
        &mut self,
        trial: GameRef,
        enabled: bool,
    ) -> Result<(), GameError> {
        self.checked_as(Layer::Trial, |e| {
            e.trial_extras_mut(trial)?.autoadd_minigame_on_player_added = enabled;
            Ok(())
        })
    }

    pub fn minigames(&self, trial: GameRef) -> Vec<GameRef> {
        self.minigames_of(trial)
    }

    pub fn minigame_by_id(&self, trial: GameRef, id: &str) -> Result<GameRef, GameError> {
        let manager = self
            .minigame_manager_of(trial)
            .map_err(|kind| GameError::new(Layer::Trial, kind))?;
        self.game_by_id(manager, id)
            .map_err(|err| GameError::new(Layer::Trial, err.kind))
    }

    /// Like [`minigame_by_id`](Self::minigame_by_id), but only for debates.
    pub fn nsd_by_id(&self, trial: GameRef, id: &str) -> Result<GameRef, GameError> {
        let minigame = self.minigame_by_id(trial, id)?;
        let layer = self.games.get(&minigame).map_or(Layer::TrialMinigame, |g| g.layer);
        if layer != Layer::NonStopDebate {
            return Err(GameError::new(
                Layer::Trial,
                ErrorKind::ManagerInvalidGameId {
                    reason: format!("`{id}` is a minigame of type {layer}, not nonstop debate."),
                },
            ));
        }
        Ok(minigame)
    }

    /// The debate of `trial` that `user` plays in.
    pub fn nsd_of_user(&self, trial: GameRef, user: ClientId) -> Result<GameRef, GameError> {
        let manager = self
            .minigame_manager_of(trial)
            .map_err(|kind| GameError::new(Layer::Trial, kind))?;
        self.games_of_user(manager, user)
            .into_iter()
            .find(|g| self.games.get(g).is_some_and(|g| g.nsd.is_some()))
            .ok_or_else(|| GameError::new(Layer::Trial, ErrorKind::UserNotInMinigame))
    }

    /// Starts a nonstop debate in the creator's area.
    ///
    /// The trial fixes the limits that keep debates sane: a player and an
    /// area are in at most one debate, and debates never autoadd walkers.
    pub fn new_nsd(
        &mut self,
        trial: GameRef,
        creator: Option<ClientId>,
        options: NsdOptions,
    ) -> Result<GameRef, GameError> {
        self.validated(|e| e.do_new_nsd(trial, creator, options))
    }

    fn do_new_nsd(
        &mut self,
        trial: GameRef,
        creator: Option<ClientId>,
        options: NsdOptions,
    ) -> Result<GameRef, GameError> {
        let as_trial = |kind| GameError::new(Layer::Trial, kind);
        let as_nsd = |kind| GameError::new(Layer::NonStopDebate, kind);

        let extras = self.trial_extras(trial).map_err(as_trial)?;
        let autoadd_on_trial_player_add = options
            .autoadd_on_trial_player_add
            .unwrap_or(extras.autoadd_minigame_on_player_added);
        let manager = self.minigame_manager_of(trial).map_err(as_trial)?;
        let creator_area = creator.and_then(|c| self.area_of(c));
        let game_options = GameOptions {
            player_limit: options.player_limit,
            player_concurrent_limit: Some(1),
            require_invitations: options.require_invitations,
            require_players: options.require_players,
            require_leaders: false,
            require_participant_character: options.require_participant_character,
            team_limit: options.team_limit,
            timer_limit: options.timer_limit,
            areas: creator_area.into_iter().collect(),
            area_concurrent_limit: Some(1),
            autoadd_on_client_enter: false,
            autoadd_on_creation_existing_users: false,
            require_areas: true,
            autoadd_on_trial_player_add,
            ..GameOptions::default()
        };
        let nsd = self
            .do_create_game(manager, game_options, None)
            .map_err(as_trial)?;
        self.attach_nsd(nsd, options.timer_start_value);
        if let Err(kind) = self.nsd_setup_timers(nsd) {
            self.do_destroy(nsd);
            return Err(as_nsd(kind));
        }
        if let Some(creator) = creator {
            if let Err(kind) = self.do_add_player(nsd, creator) {
                self.do_destroy(nsd);
                return Err(as_nsd(kind));
            }
        }
        if options.autoadd_on_creation_existing_users {
            for user in self.users_in_areas(nsd) {
                if Some(user) == creator {
                    continue;
                }
                match self.do_add_player(nsd, user) {
                    Ok(()) | Err(ErrorKind::UserNotPlayer) => {}
                    Err(kind) => tracing::debug!(%user, %kind, "debate autoadd skipped"),
                }
            }
        }
        for user in self.nonplayer_users_in_areas(nsd) {
            self.nsd_introduce(nsd, user);
        }
        Ok(nsd)
    }

    /// Summary of a trial and its members' stats.
    pub fn trial_info(&self, trial: GameRef) -> Result<String, GameError> {
        let game = self
            .live_game(trial)
            .map_err(|kind| GameError::new(Layer::Trial, kind))?;
        let extras = self.trial_extras(trial).map_err(|kind| GameError::new(Layer::Trial, kind))?;
        let leaders = game.group.leaders().clone();
        let regulars = game.group.regulars();
        let members = leaders.len() + regulars.len();

        let describe = |group: &BTreeSet<ClientId>| -> String {
            if group.is_empty() {
                return "\n*None".to_string();
            }
            let mut named: Vec<(String, ClientId)> = group
                .iter()
                .map(|u| (self.displayname(*u), *u))
                .collect();
            named.sort();
            named
                .into_iter()
                .map(|(name, user)| {
                    let influence = extras.influence(user).map_or(0.0, |s| s.value);
                    let focus = extras.focus(user).map_or(0.0, |s| s.value);
                    format!("\n*[{}] {name}: Influence: {influence}; Focus: {focus}", user.0)
                })
                .collect()
        };

        let mut area_ids: Vec<String> = self
            .game_areas(trial)
            .into_iter()
            .map(|a| a.0.to_string())
            .collect();
        area_ids.sort();
        Ok(format!(
            "Trial {} [{members}/-] ({}).\nLeaders: {}\nRegular members: {}",
            game.id,
            area_ids.join(", "),
            describe(&leaders),
            describe(&regulars),
        ))
    }

    /// Destroys the trial and plays the closing splash to whoever was in
    /// its areas.
    pub fn end_trial(&mut self, trial: GameRef) -> Result<(), GameError> {
        self.checked_as(Layer::Trial, |e| {
            e.trial_extras(trial)?;
            let occupants = e.users_in_areas(trial);
            e.do_destroy(trial);
            for user in occupants {
                e.with_client(user, |c| c.send_splash("testimony2"));
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Lifecycle hooks and event handlers
// ---------------------------------------------------------------------------

impl Engine {
    pub(crate) fn minigames_of(&self, trial: GameRef) -> Vec<GameRef> {
        self.games
            .get(&trial)
            .and_then(|g| g.children)
            .and_then(|m| self.managers.get(&m))
            .map(|m| m.games())
            .unwrap_or_default()
    }

    pub(crate) fn trial_on_player_added(&mut self, trial: GameRef, user: ClientId) {
        if let Ok(extras) = self.trial_extras_mut(trial) {
            extras.influence.insert(user, Stat::full(MIN_STAT, MAX_STAT));
            extras.focus.insert(user, Stat::full(MIN_STAT, MAX_STAT));
        }
        self.trial_introduce(trial, user);
        self.publish(
            Source::Game(trial),
            Event::TrialPlayerAdded {
                trial,
                player: user,
            },
        );
    }

    pub(crate) fn trial_before_player_removed(&mut self, trial: GameRef, user: ClientId) {
        if let Ok(extras) = self.trial_extras_mut(trial) {
            extras.influence.remove(&user);
            extras.focus.remove(&user);
        }
        for minigame in self.minigames_of(trial) {
            if self.is_player(minigame, user) {
                let result = self.do_remove_player(minigame, user);
                self.cascade(result, "removing trial player from minigame");
            }
        }
    }

    pub(crate) fn trial_introduce(&self, trial: GameRef, user: ClientId) {
        let Ok(extras) = self.trial_extras(trial) else {
            return;
        };
        if self.is_player(trial, user) {
            let focus = extras.focus(user).map_or(MAX_STAT, |s| s.value);
            let influence = extras.influence(user).map_or(MAX_STAT, |s| s.value);
            self.with_client(user, |c| {
                c.send_health(HealthSide::Focus, focus);
                c.send_health(HealthSide::Influence, influence);
            });
        }
        if !self.minigames_of(trial).is_empty() {
            return;
        }
        self.with_client(user, |c| {
            c.send_gamemode("trial");
            c.send_splash("testimony1");
            c.send_timer_pause(0);
            c.send_timer_set_time(0, 0);
            c.send_timer_set_step_length(0, 0);
            c.send_timer_set_firing_interval(0, 0);
        });
    }

    pub(crate) fn trial_dismiss(&self, trial: GameRef, user: ClientId) {
        let Some(game) = self.games.get(&trial) else {
            return;
        };
        if !game.group.ever_had_players() {
            return;
        }
        let Some(area) = self.area_of(user) else {
            return;
        };
        let inside = game.has_area(area);
        let Ok(record) = self.world.areas.get(area) else {
            return;
        };
        self.with_client(user, |c| {
            c.send_health(HealthSide::Focus, record.hp_pro as f64);
            c.send_health(HealthSide::Influence, record.hp_def as f64);
            if !inside {
                c.send_gamemode("");
            }
        });
    }

    pub(crate) fn trial_after_destroy(&mut self, trial: GameRef, occupants: &BTreeSet<ClientId>) {
        if let Ok(extras) = self.trial_extras_mut(trial) {
            extras.influence.clear();
            extras.focus.clear();
        }
        for user in occupants {
            self.trial_dismiss(trial, *user);
        }
    }

    /// Removal notices shared by the handlers that can empty a trial.
    fn trial_announce_if_ended(
        &self,
        trial: GameRef,
        tid: &str,
        client: ClientId,
        nonplayers: &BTreeSet<ClientId>,
        tell_client: bool,
    ) {
        if self.is_live(trial) {
            return;
        }
        if tell_client {
            self.send_ooc(
                client,
                &format!("Your trial `{tid}` was automatically ended as it lost all its players."),
            );
        }
        self.send_ooc_staff(
            |c| c == client || nonplayers.contains(&c),
            &format!("(X) Trial `{tid}` was automatically ended as it lost all its players."),
        );
        self.send_ooc_watchers(
            nonplayers,
            Some(client),
            "The trial you were watching was automatically ended as it lost all its players.",
        );
    }

    pub(crate) fn trial_on_left(
        &mut self,
        trial: GameRef,
        area: AreaId,
        client: ClientId,
        old_displayname: &str,
    ) {
        let Some(game) = self.games.get(&trial) else {
            return;
        };
        let current = self.area_of(client);
        if current.is_some_and(|a| game.has_area(a)) {
            return;
        }
        let tid = game.id.to_string();
        let leaders = game.leaders().clone();
        let route = format!("{}->{}", area.0, area_label(current));
        if game.is_player(client) {
            self.send_ooc(
                client,
                &format!("You have left to an area not part of trial `{tid}` and thus were automatically removed from the trial."),
            );
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {old_displayname} [{}] has left to an area not part of your trial and thus was automatically removed it ({route}).", client.0),
            );
            let nonplayers = self.nonplayer_users_in_areas(trial);
            let result = self.do_remove_player(trial, client);
            self.cascade(result, "removing trial player that left");
            self.trial_announce_if_ended(trial, &tid, client, &nonplayers, true);
        } else {
            self.send_ooc(client, &format!("You have left to an area not part of trial `{tid}`."));
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {old_displayname} [{}] has left to an area not part of your trial ({route}).", client.0),
            );
            self.trial_dismiss(trial, client);
        }
    }

    pub(crate) fn trial_on_entered(
        &mut self,
        trial: GameRef,
        area: AreaId,
        client: ClientId,
        old_area: Option<AreaId>,
    ) {
        let Some(game) = self.games.get(&trial) else {
            return;
        };
        if game.is_player(client) || old_area.is_some_and(|a| game.has_area(a)) {
            return;
        }
        let Some(c) = self.client(client) else {
            return;
        };
        let (name, is_staff, has_character) =
            (c.displayname.clone(), c.is_staff, c.has_participant_character());
        let tid = game.id.to_string();
        let leaders = game.leaders().clone();
        let require_character = game.require_participant_character;
        let autoadd = game.areas.as_ref().is_some_and(|b| b.autoadd_on_client_enter());

        self.send_ooc(client, &format!("You have entered an area part of trial `{tid}`."));
        self.send_ooc_to(
            leaders.iter().copied(),
            Some(client),
            &format!(
                "(X) Non-player {name} [{}] has entered an area part of your trial ({}->{}).",
                client.0,
                area_label(old_area),
                area.0
            ),
        );

        if require_character && !has_character {
            if is_staff {
                self.send_ooc(client, &format!("This trial requires you have a participant character to join. Join this trial with /trial_join {tid} after choosing a participant character."));
            }
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) This trial requires players have a participant character to join. Add {name} to your trial with /trial_add {} after they choose a participant character.", client.0),
            );
            self.trial_introduce(trial, client);
        } else if autoadd {
            let failure = match self.do_add_player(trial, client) {
                Ok(()) => None,
                Err(ErrorKind::UserHitGameConcurrentLimit) => {
                    Some("Player is concurrently in too many trials.".to_string())
                }
                Err(ErrorKind::GameIsFull) => Some("The trial is full.".to_string()),
                Err(other) => Some(other.to_string()),
            };
            let leaders = self.leaders(trial);
            match failure {
                Some(msg) => {
                    self.send_ooc(client, &format!("Unable to automatically add you to the trial: {msg}"));
                    self.send_ooc_to(
                        leaders,
                        Some(client),
                        &format!("(X) Unable to automatically add non-player {name} [{}] to your trial: {msg}", client.0),
                    );
                }
                None => {
                    self.send_ooc(client, &format!("You were automatically added to trial `{tid}`."));
                    self.send_ooc_to(
                        leaders,
                        Some(client),
                        &format!("(X) Non-player {name} [{}] was automatically added to your trial.", client.0),
                    );
                }
            }
            for minigame in self.minigames_of(trial) {
                let Some(m) = self.games.get(&minigame) else {
                    continue;
                };
                let (kind, mid) = (m.layer, m.id.to_string());
                let minigame_leaders = m.leaders().clone();
                if m.is_player(client) {
                    self.send_ooc(client, &format!("You were automatically added to {kind} `{mid}`."));
                    self.send_ooc_to(
                        minigame_leaders,
                        Some(client),
                        &format!("(X) {name} [{}] was automatically added to your {kind}.", client.0),
                    );
                } else {
                    self.send_ooc(client, &format!("Unable to be automatically added to {kind} `{mid}`."));
                    self.send_ooc_to(
                        minigame_leaders,
                        Some(client),
                        &format!("(X) {name} [{}] could not be automatically added to your {kind}.", client.0),
                    );
                }
            }
        } else {
            if is_staff {
                self.send_ooc(client, &format!("Join this trial with /trial_join {tid}"));
            }
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Add {name} to your trial with /trial_add {}", client.0),
            );
            self.trial_introduce(trial, client);
        }
    }

    pub(crate) fn trial_on_change_character(
        &mut self,
        trial: GameRef,
        client: ClientId,
        old_char_name: &str,
    ) {
        let Some(game) = self.games.get(&trial) else {
            return;
        };
        let Some(c) = self.client(client) else {
            return;
        };
        let leaders = game.leaders().clone();
        let tid = game.id.to_string();
        if game.require_participant_character && !c.has_participant_character() {
            self.send_ooc(
                client,
                "You were removed from your trial as it required its players to have participant characters.",
            );
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {} changed character from {old_char_name} to a non-participant character and was thus removed from your trial.", client.0),
            );
            let nonplayers = self.nonplayer_users_in_areas(trial);
            let result = self.do_remove_player(trial, client);
            self.cascade(result, "removing trial player without character");
            self.trial_announce_if_ended(trial, &tid, client, &nonplayers, true);
        } else {
            let char_name = c.char_name.clone();
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {} changed character from {old_char_name} to {char_name} in your trial.", client.0),
            );
        }
    }

    pub(crate) fn trial_on_client_destroyed(&mut self, trial: GameRef, client: ClientId) {
        let Some(game) = self.games.get(&trial) else {
            return;
        };
        if !game.is_player(client) {
            return;
        }
        let tid = game.id.to_string();
        let leaders = game.leaders().clone();
        self.send_ooc_to(
            leaders,
            Some(client),
            &format!(
                "(X) Player {} of your trial disconnected. ({})",
                self.displayname(client),
                area_label(self.area_of(client))
            ),
        );
        let nonplayers = self.nonplayer_users_in_areas(trial);
        let result = self.do_remove_player(trial, client);
        self.cascade(result, "removing disconnected trial player");
        self.trial_announce_if_ended(trial, &tid, client, &nonplayers, false);
    }

    /// A leader playing the closing splash ends the trial.
    pub(crate) fn trial_on_rt(&mut self, trial: GameRef, client: ClientId, name: &str) {
        if name != "testimony2" {
            return;
        }
        let Some(game) = self.games.get(&trial) else {
            return;
        };
        if !game.is_leader(client) {
            return;
        }
        let leaders = game.leaders().clone();
        let regulars = game.group.regulars();
        let nonplayers = self.nonplayer_users_in_areas(trial);
        let displayname = self.displayname(client);
        self.do_destroy(trial);
        self.send_ooc(client, "You ended your trial.");
        self.send_ooc_to(nonplayers, Some(client), "The trial you were watching was ended.");
        self.send_ooc_to(regulars, Some(client), "Your trial was ended.");
        self.send_ooc_to(
            leaders,
            Some(client),
            &format!("(X) {displayname} [{}] ended your trial.", client.0),
        );
    }

    pub(crate) fn trial_on_areas_loaded(&mut self, trial: GameRef) {
        self.send_ooc_to(
            self.nonleader_users_in_areas(trial),
            None,
            "The trial you were watching was deleted due to an area list load.",
        );
        self.send_ooc_to(
            self.players(trial),
            None,
            "Your trial was deleted due to an area list load.",
        );
        self.do_destroy(trial);
    }

    // -- Stat plumbing --

    fn stat(&self, trial: GameRef, user: ClientId, kind: StatKind) -> Result<Stat, GameError> {
        self.trial_extras(trial)
            .and_then(|x| x.map(kind).get(&user).copied().ok_or(ErrorKind::UserNotPlayer))
            .map_err(|kind| GameError::new(Layer::Trial, kind))
    }

    fn do_set_stat(
        &mut self,
        trial: GameRef,
        user: ClientId,
        kind: StatKind,
        value: f64,
    ) -> Result<(), ErrorKind> {
        self.live_game(trial)?;
        if !self.is_player(trial, user) {
            return Err(ErrorKind::UserNotPlayer);
        }
        let extras = self.trial_extras_mut(trial)?;
        let stat = extras
            .map_mut(kind)
            .get_mut(&user)
            .ok_or(ErrorKind::UserNotPlayer)?;
        if !stat.contains(value) {
            return Err(kind.invalid());
        }
        stat.value = value;
        self.with_client(user, |c| c.send_health(kind.side(), value));
        if kind == StatKind::Influence && value == 0.0 {
            self.send_ooc(user, "You ran out of influence!");
            self.send_ooc_to(
                self.leaders(trial),
                Some(user),
                &format!("(X) {} ran out of influence!", self.displayname(user)),
            );
        }
        Ok(())
    }

    fn do_change_stat_by(
        &mut self,
        trial: GameRef,
        user: ClientId,
        kind: StatKind,
        delta: f64,
    ) -> Result<(), ErrorKind> {
        self.live_game(trial)?;
        let stat = self
            .trial_extras(trial)?
            .map(kind)
            .get(&user)
            .copied()
            .ok_or(ErrorKind::UserNotPlayer)?;
        let value = (stat.value + delta).clamp(stat.min, stat.max);
        self.do_set_stat(trial, user, kind, value)
    }

    pub(crate) fn trial_change_influence(
        &mut self,
        trial: GameRef,
        user: ClientId,
        delta: f64,
    ) -> Result<(), ErrorKind> {
        self.do_change_stat_by(trial, user, StatKind::Influence, delta)
    }

    pub(crate) fn trial_extras(&self, trial: GameRef) -> Result<&TrialExtras, ErrorKind> {
        self.game_ref(trial)?
            .trial
            .as_ref()
            .ok_or(ErrorKind::MissingCapability {
                needed: Layer::Trial,
            })
    }

    fn trial_extras_mut(&mut self, trial: GameRef) -> Result<&mut TrialExtras, ErrorKind> {
        self.games
            .get_mut(&trial)
            .ok_or(ErrorKind::UnknownGame(trial))?
            .trial
            .as_mut()
            .ok_or(ErrorKind::MissingCapability {
                needed: Layer::Trial,
            })
    }

    fn trial_manager_of(&self, hub: GameRef) -> Result<ManagerRef, ErrorKind> {
        let game = self.live_game(hub)?;
        if game.hub_assets.is_none() {
            return Err(ErrorKind::MissingCapability { needed: Layer::Hub });
        }
        game.children.ok_or(ErrorKind::GameIsUnmanaged)
    }

    fn minigame_manager_of(&self, trial: GameRef) -> Result<ManagerRef, ErrorKind> {
        let game = self.live_game(trial)?;
        self.trial_extras(trial)?;
        game.children.ok_or(ErrorKind::GameIsUnmanaged)
    }
}
