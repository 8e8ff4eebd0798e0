//! Minigames played inside a trial.

use trialworks_protocol::{AreaId, ClientId, GameRef};

use crate::engine::{area_label, Engine};
use crate::{ErrorKind, GameError};

/// Ties a minigame to its parent trial. Players and areas of the minigame
/// are always players and areas of the trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinigameBinding {
    pub trial: GameRef,
    autoadd_on_trial_player_add: bool,
}

impl MinigameBinding {
    pub(crate) fn new(trial: GameRef, autoadd_on_trial_player_add: bool) -> Self {
        Self {
            trial,
            autoadd_on_trial_player_add,
        }
    }

    pub fn autoadd_on_trial_player_add(&self) -> bool {
        self.autoadd_on_trial_player_add
    }
}

impl Engine {
    /// The trial a minigame belongs to.
    pub fn minigame_trial(&self, minigame: GameRef) -> Option<GameRef> {
        self.games.get(&minigame)?.minigame.map(|b| b.trial)
    }

    pub fn set_autoadd_on_trial_player_add(
        &mut self,
        minigame: GameRef,
        enabled: bool,
    ) -> Result<(), GameError> {
        self.checked(minigame, |e| {
            let binding = e
                .live_game_mut(minigame)?
                .minigame
                .as_mut()
                .ok_or(ErrorKind::MissingCapability {
                    needed: crate::Layer::TrialMinigame,
                })?;
            binding.autoadd_on_trial_player_add = enabled;
            Ok(())
        })
    }

    pub(crate) fn minigame_on_trial_player_added(
        &mut self,
        minigame: GameRef,
        trial: GameRef,
        player: ClientId,
    ) {
        let autoadd = self
            .games
            .get(&minigame)
            .and_then(|g| g.minigame)
            .is_some_and(|b| b.trial == trial && b.autoadd_on_trial_player_add);
        if autoadd && !self.is_player(minigame, player) {
            let result = self.do_add_player(minigame, player);
            self.best_effort(result);
        }
    }

    pub(crate) fn minigame_on_left(
        &mut self,
        minigame: GameRef,
        area: AreaId,
        client: ClientId,
        old_displayname: &str,
    ) {
        let Some(game) = self.games.get(&minigame) else {
            return;
        };
        let current = self.area_of(client);
        if current.is_some_and(|a| game.has_area(a)) {
            return;
        }
        let mid = game.id.to_string();
        let leaders = game.leaders().clone();
        let route = format!("{}->{}", area.0, area_label(current));
        if game.is_player(client) {
            let was_leader = game.is_leader(client);
            self.send_ooc(
                client,
                &format!("You have left to an area not part of trial minigame `{mid}` and thus were automatically removed from the minigame."),
            );
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {old_displayname} [{}] has left to an area not part of your trial minigame and thus was automatically removed from it ({route}).", client.0),
            );
            let result = self.do_remove_player(minigame, client);
            self.cascade(result, "removing minigame player that left");
            if !self.is_live(minigame) {
                if was_leader {
                    self.send_ooc(
                        client,
                        &format!("Your trial minigame `{mid}` was automatically ended as it lost all its players."),
                    );
                }
                self.send_ooc_staff(
                    |c| c == client,
                    &format!("(X) Trial minigame `{mid}` was automatically ended as it lost all its players."),
                );
            }
        } else {
            self.send_ooc(
                client,
                &format!("You have left to an area not part of trial minigame `{mid}`."),
            );
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {old_displayname} [{}] has left to an area not part of your trial minigame ({route}).", client.0),
            );
        }
    }

    pub(crate) fn minigame_on_entered(
        &mut self,
        minigame: GameRef,
        area: AreaId,
        client: ClientId,
        old_area: Option<AreaId>,
    ) {
        let Some(game) = self.games.get(&minigame) else {
            return;
        };
        if game.is_player(client) || old_area.is_some_and(|a| game.has_area(a)) {
            return;
        }
        let mid = game.id.to_string();
        let leaders = game.leaders().clone();
        self.send_ooc(
            client,
            &format!("You have entered an area part of trial minigame `{mid}`."),
        );
        self.send_ooc_to(
            leaders,
            Some(client),
            &format!(
                "(X) Non-player {} [{}] has entered an area part of your trial minigame ({}->{}).",
                self.displayname(client),
                client.0,
                area_label(old_area),
                area.0
            ),
        );
    }
}
