//! Player groups: the membership core shared by games and their teams.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::IteratorRandom;
use trialworks_protocol::{ClientId, GameId};

use crate::config::TeamOptions;
use crate::ErrorKind;

// ---------------------------------------------------------------------------
// PlayerGroup
// ---------------------------------------------------------------------------

/// Players, leaders and invitations of one game or team.
///
/// Leaders are always players and invitations never are. Concurrency
/// across sibling games is the manager's business, not the group's.
#[derive(Debug, Clone)]
pub struct PlayerGroup {
    players: BTreeSet<ClientId>,
    leaders: BTreeSet<ClientId>,
    invitations: BTreeSet<ClientId>,
    player_limit: Option<usize>,
    player_concurrent_limit: Option<usize>,
    require_invitations: bool,
    require_players: bool,
    require_leaders: bool,
    ever_had_players: bool,
}

impl PlayerGroup {
    pub fn new(
        player_limit: Option<usize>,
        player_concurrent_limit: Option<usize>,
        require_invitations: bool,
        require_players: bool,
        require_leaders: bool,
    ) -> Self {
        Self {
            players: BTreeSet::new(),
            leaders: BTreeSet::new(),
            invitations: BTreeSet::new(),
            player_limit,
            player_concurrent_limit,
            require_invitations,
            require_players,
            require_leaders,
            ever_had_players: false,
        }
    }

    pub fn players(&self) -> &BTreeSet<ClientId> {
        &self.players
    }

    pub fn leaders(&self) -> &BTreeSet<ClientId> {
        &self.leaders
    }

    /// Players that are not leaders.
    pub fn regulars(&self) -> BTreeSet<ClientId> {
        self.players.difference(&self.leaders).copied().collect()
    }

    pub fn invitations(&self) -> &BTreeSet<ClientId> {
        &self.invitations
    }

    pub fn is_player(&self, user: ClientId) -> bool {
        self.players.contains(&user)
    }

    pub fn is_leader(&self, user: ClientId) -> Result<bool, ErrorKind> {
        if !self.is_player(user) {
            return Err(ErrorKind::UserNotPlayer);
        }
        Ok(self.leaders.contains(&user))
    }

    pub fn is_invited(&self, user: ClientId) -> Result<bool, ErrorKind> {
        if self.is_player(user) {
            return Err(ErrorKind::UserAlreadyPlayer);
        }
        Ok(self.invitations.contains(&user))
    }

    pub fn player_limit(&self) -> Option<usize> {
        self.player_limit
    }

    pub fn player_concurrent_limit(&self) -> Option<usize> {
        self.player_concurrent_limit
    }

    pub fn requires_invitations(&self) -> bool {
        self.require_invitations
    }

    pub fn requires_players(&self) -> bool {
        self.require_players
    }

    pub fn requires_leaders(&self) -> bool {
        self.require_leaders
    }

    pub fn ever_had_players(&self) -> bool {
        self.ever_had_players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// The group-local admission checks, in the order they are reported.
    pub fn check_admission(&self, user: ClientId) -> Result<(), ErrorKind> {
        if self.require_invitations && !self.invitations.contains(&user) {
            return Err(ErrorKind::UserNotInvited);
        }
        if self.is_player(user) {
            return Err(ErrorKind::UserAlreadyPlayer);
        }
        if self.player_limit.is_some_and(|limit| self.players.len() >= limit) {
            return Err(ErrorKind::GameIsFull);
        }
        Ok(())
    }

    /// Adds a player that already passed [`check_admission`](Self::check_admission).
    pub fn admit(&mut self, user: ClientId) {
        self.players.insert(user);
        self.invitations.remove(&user);
        self.ever_had_players = true;
        self.choose_leader_if_needed();
    }

    pub fn remove(&mut self, user: ClientId) -> Result<(), ErrorKind> {
        if !self.players.remove(&user) {
            return Err(ErrorKind::UserNotPlayer);
        }
        self.leaders.remove(&user);
        self.choose_leader_if_needed();
        Ok(())
    }

    pub fn add_leader(&mut self, user: ClientId) -> Result<(), ErrorKind> {
        if !self.is_player(user) {
            return Err(ErrorKind::UserNotPlayer);
        }
        if !self.leaders.insert(user) {
            return Err(ErrorKind::UserAlreadyLeader);
        }
        Ok(())
    }

    pub fn remove_leader(&mut self, user: ClientId) -> Result<(), ErrorKind> {
        if !self.is_player(user) {
            return Err(ErrorKind::UserNotPlayer);
        }
        if !self.leaders.remove(&user) {
            return Err(ErrorKind::UserNotLeader);
        }
        self.choose_leader_if_needed();
        Ok(())
    }

    pub fn add_invitation(&mut self, user: ClientId) -> Result<(), ErrorKind> {
        if !self.require_invitations {
            return Err(ErrorKind::GameDoesNotTakeInvitations);
        }
        if self.invitations.contains(&user) {
            return Err(ErrorKind::UserAlreadyInvited);
        }
        if self.is_player(user) {
            return Err(ErrorKind::UserAlreadyPlayer);
        }
        self.invitations.insert(user);
        Ok(())
    }

    pub fn remove_invitation(&mut self, user: ClientId) -> Result<(), ErrorKind> {
        if !self.require_invitations {
            return Err(ErrorKind::GameDoesNotTakeInvitations);
        }
        if !self.invitations.remove(&user) {
            return Err(ErrorKind::UserNotInvited);
        }
        Ok(())
    }

    /// Drops every member. `ever_had_players` is kept.
    pub fn clear(&mut self) {
        self.players.clear();
        self.leaders.clear();
        self.invitations.clear();
    }

    fn choose_leader_if_needed(&mut self) {
        if !self.require_leaders || !self.leaders.is_empty() {
            return;
        }
        if let Some(leader) = self.players.iter().copied().choose(&mut rand::rng()) {
            self.leaders.insert(leader);
            tracing::debug!(%leader, "leader promoted");
        }
    }
}

// ---------------------------------------------------------------------------
// TeamRoster
// ---------------------------------------------------------------------------

/// The teams of one game. A player is in at most one team.
#[derive(Debug, Clone, Default)]
pub struct TeamRoster {
    limit: Option<usize>,
    teams: BTreeMap<GameId, PlayerGroup>,
    player_teams: BTreeMap<ClientId, GameId>,
}

impl TeamRoster {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            teams: BTreeMap::new(),
            player_teams: BTreeMap::new(),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn ids(&self) -> Vec<GameId> {
        self.teams.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn team(&self, id: &GameId) -> Result<&PlayerGroup, ErrorKind> {
        self.teams.get(id).ok_or(ErrorKind::GameInvalidTeamId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GameId, &PlayerGroup)> {
        self.teams.iter()
    }

    pub fn team_of(&self, user: ClientId) -> Option<&GameId> {
        self.player_teams.get(&user)
    }

    /// Creates a team, optionally seeded with `creator`. The caller checks
    /// that the creator is a player of the game.
    pub fn new_team(
        &mut self,
        creator: Option<ClientId>,
        options: &TeamOptions,
    ) -> Result<GameId, ErrorKind> {
        if let Some(creator) = creator {
            if self.player_teams.contains_key(&creator) {
                return Err(ErrorKind::UserInAnotherTeam);
            }
        }
        let id = self.available_id()?;
        let mut team = PlayerGroup::new(
            options.player_limit,
            Some(1),
            options.require_invitations,
            options.require_players,
            options.require_leaders,
        );
        if let Some(creator) = creator {
            team.admit(creator);
            self.player_teams.insert(creator, id.clone());
        }
        self.teams.insert(id.clone(), team);
        tracing::debug!(team = %id, "team created");
        Ok(id)
    }

    /// Deletes a team and returns its former players.
    pub fn delete_team(&mut self, id: &GameId) -> Result<BTreeSet<ClientId>, ErrorKind> {
        let team = self.teams.remove(id).ok_or(ErrorKind::GameDoesNotManageTeam)?;
        for player in team.players() {
            self.player_teams.remove(player);
        }
        tracing::debug!(team = %id, "team deleted");
        Ok(team.players().clone())
    }

    pub fn add_player(&mut self, id: &GameId, user: ClientId) -> Result<(), ErrorKind> {
        if self.player_teams.get(&user).is_some_and(|t| t != id) {
            return Err(ErrorKind::UserInAnotherTeam);
        }
        let team = self.teams.get_mut(id).ok_or(ErrorKind::GameDoesNotManageTeam)?;
        team.check_admission(user)?;
        team.admit(user);
        self.player_teams.insert(user, id.clone());
        Ok(())
    }

    /// Removes `user` from its team, deleting the team if it must not be
    /// empty. Does nothing for users in no team.
    pub fn remove_player(&mut self, user: ClientId) {
        let Some(id) = self.player_teams.remove(&user) else {
            return;
        };
        let now_empty = match self.teams.get_mut(&id) {
            Some(team) => {
                let _ = team.remove(user);
                team.requires_players() && team.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.teams.remove(&id);
            tracing::debug!(team = %id, "empty team deleted");
        }
    }

    pub fn clear(&mut self) {
        self.teams.clear();
        self.player_teams.clear();
    }

    fn available_id(&self) -> Result<GameId, ErrorKind> {
        (0..)
            .take_while(|n| self.limit.is_none_or(|limit| *n < limit as u64))
            .map(|n| GameId::new("pg", n))
            .find(|id| !self.teams.contains_key(id))
            .ok_or(ErrorKind::GameTooManyTeams)
    }
}
