//! Structural validation of the whole engine.
//!
//! Checked after every public operation (unless disabled in
//! [`EngineConfig`](crate::EngineConfig)). A violation means a cascade went
//! wrong somewhere, so the engine aborts instead of limping on.

use crate::engine::Engine;
use crate::events::Source;
use crate::game::Game;
use crate::manager::Manager;
use crate::InvariantViolation;

type Check = Result<(), InvariantViolation>;

fn ensure(condition: bool, what: impl FnOnce() -> String) -> Check {
    if condition {
        Ok(())
    } else {
        Err(InvariantViolation(what()))
    }
}

impl Engine {
    /// Verifies every structural invariant, returning the first broken one.
    pub fn check_structure(&self) -> Check {
        for manager in self.managers.values() {
            self.check_manager(manager)?;
        }
        for game in self.games.values() {
            if game.unmanaged {
                self.check_unmanaged(game)?;
            } else {
                self.check_game(game)?;
            }
        }
        Ok(())
    }

    fn check_manager(&self, m: &Manager) -> Check {
        let key = m.key();
        ensure(m.managee_limit().is_none_or(|limit| m.len() <= limit), || {
            format!("manager {key} holds {} games over its limit", m.len())
        })?;
        if let Some(owner) = m.owner() {
            ensure(self.is_live(owner), || {
                format!("manager {key} outlived its owner {owner}")
            })?;
        }

        for (id, game) in m.id_map() {
            let g = self
                .games
                .get(game)
                .ok_or_else(|| InvariantViolation(format!("manager {key} lists missing game {game}")))?;
            ensure(!g.unmanaged, || format!("manager {key} still lists destroyed game {id}"))?;
            ensure(g.manager == key && &g.id == id, || {
                format!("game {game} is listed as {id} by manager {key} but calls itself {}", g.id)
            })?;
        }

        for (user, games) in m.player_index() {
            for game in games {
                ensure(m.manages(*game) && self.is_player(*game, *user), || {
                    format!("manager {key} indexes {user} in {game} without membership")
                })?;
            }
        }
        for (area, games) in m.area_index() {
            for game in games {
                ensure(m.manages(*game) && self.has_area(*game, *area), || {
                    format!("manager {key} indexes area {area} in {game} without binding")
                })?;
            }
        }

        for game in m.games() {
            let Some(g) = self.games.get(&game) else {
                continue;
            };
            for user in g.players() {
                let count = m.games_of_user(*user).len();
                ensure(m.games_of_user(*user).contains(&game), || {
                    format!("manager {key} does not index player {user} of {}", g.id)
                })?;
                ensure(
                    g.group.player_concurrent_limit().is_none_or(|l| count <= l),
                    || format!("{user} is in {count} games of manager {key}, over the limit of {}", g.id),
                )?;
            }
            let Some(binding) = g.areas.as_ref() else {
                continue;
            };
            for area in binding.areas() {
                let count = m.games_in_area(*area).len();
                ensure(m.games_in_area(*area).contains(&game), || {
                    format!("manager {key} does not index area {area} of {}", g.id)
                })?;
                ensure(
                    binding.area_concurrent_limit().is_none_or(|l| count <= l),
                    || format!("area {area} is in {count} games of manager {key}, over the limit of {}", g.id),
                )?;
            }
        }
        Ok(())
    }

    fn check_unmanaged(&self, g: &Game) -> Check {
        let id = &g.id;
        ensure(g.group.is_empty(), || format!("destroyed game {id} kept players"))?;
        ensure(g.timers.is_empty(), || format!("destroyed game {id} kept timers"))?;
        ensure(g.areas.as_ref().is_none_or(|b| b.areas().is_empty()), || {
            format!("destroyed game {id} kept areas")
        })?;
        ensure(self.bus.subscriptions(g.key).is_empty(), || {
            format!("destroyed game {id} is still subscribed")
        })
    }

    fn check_game(&self, g: &Game) -> Check {
        let id = &g.id;
        let group = &g.group;
        let players = group.players();

        ensure(self.managers.get(&g.manager).is_some_and(|m| m.manages(g.key)), || {
            format!("live game {id} is not managed")
        })?;
        ensure(group.leaders().is_subset(players), || {
            format!("game {id} has leaders that are not players")
        })?;
        ensure(group.invitations().is_disjoint(players), || {
            format!("game {id} has invited players")
        })?;
        ensure(group.requires_invitations() || group.invitations().is_empty(), || {
            format!("game {id} holds invitations without taking them")
        })?;
        ensure(
            !group.requires_leaders() || players.is_empty() || !group.leaders().is_empty(),
            || format!("game {id} has players but no leader"),
        )?;
        ensure(group.player_limit().is_none_or(|l| players.len() <= l), || {
            format!("game {id} is over its player limit")
        })?;

        for player in players {
            ensure(self.world.clients.contains(*player), || {
                format!("game {id} has disconnected player {player}")
            })?;
            ensure(self.bus.is_subscribed(g.key, Source::Client(*player)), || {
                format!("game {id} does not listen to player {player}")
            })?;
        }
        for (team, roster) in g.teams.iter() {
            ensure(roster.players().is_subset(players), || {
                format!("team {team} of game {id} has players outside the game")
            })?;
        }

        if let Some(binding) = g.areas.as_ref() {
            for area in binding.areas() {
                ensure(self.bus.is_subscribed(g.key, Source::Area(*area)), || {
                    format!("game {id} does not listen to area {area}")
                })?;
                let record = self.world.areas.get(*area).map_err(|_| {
                    InvariantViolation(format!("game {id} holds missing area {area}"))
                })?;
                if let Some(hub) = g.hub() {
                    ensure(record.hub == hub, || {
                        format!("game {id} holds area {area} of another hub")
                    })?;
                }
                if g.hub_assets.is_some() {
                    ensure(record.hub == g.key, || {
                        format!("hub {id} holds area {area} of another hub")
                    })?;
                }
            }
            for player in players {
                ensure(
                    self.area_of(*player).is_some_and(|a| binding.contains(a)),
                    || format!("player {player} of {id} stands outside its areas"),
                )?;
            }
        }

        if let Some(binding) = g.minigame {
            let trial = self.games.get(&binding.trial);
            ensure(trial.is_some_and(|t| !t.unmanaged), || {
                format!("minigame {id} outlived its trial")
            })?;
            let trial_players = self.players(binding.trial);
            ensure(players.is_subset(&trial_players), || {
                format!("minigame {id} has players outside its trial")
            })?;
            ensure(
                self.game_areas(g.key).is_subset(&self.game_areas(binding.trial)),
                || format!("minigame {id} has areas outside its trial"),
            )?;
        }

        if let Some(extras) = g.trial.as_ref() {
            let (influence, focus) = extras.tracked();
            ensure(&influence == players && &focus == players, || {
                format!("trial {id} tracks stats for someone other than its players")
            })?;
            for (user, stat) in extras.stats() {
                ensure(stat.contains(stat.value), || {
                    format!("trial {id} stat of {user} is out of bounds")
                })?;
            }
        }

        if let Some(nsd) = g.nsd.as_ref() {
            let len = nsd.messages().len() as isize;
            ensure((-1..len).contains(&nsd.cursor()), || {
                format!("debate {id} cursor {} outside its {len} messages", nsd.cursor())
            })?;
        }
        Ok(())
    }
}
