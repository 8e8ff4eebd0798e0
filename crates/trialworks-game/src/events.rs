//! Event routing between clients, areas and games.
//!
//! Games subscribe to the clients and areas they care about on the
//! [`EventBus`](trialworks_bus::EventBus). Publishing takes a snapshot of
//! the recipients and delivers in subscription order; a recipient that was
//! destroyed or unsubscribed by an earlier handler is skipped.
//!
//! Delivery picks the most specific handler for the game's family
//! (debate, then minigame, then trial, then the plain area-bound one).

use trialworks_protocol::{AreaId, ClientId, GameRef, IcMessage};

use crate::engine::Engine;
use crate::{ErrorKind, Rejection};

/// Who an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Client(ClientId),
    Area(AreaId),
    /// The area list of a hub.
    AreaList(GameRef),
    Game(GameRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ClientInboundMsCheck,
    ClientInboundMsFinal,
    ClientChangeCharacter,
    ClientDestroyed,
    ClientInboundRt,
    AreaClientLeftFinal,
    AreaClientEnteredFinal,
    AreaClientInboundMsCheck,
    AreaDestroyed,
    AreasLoaded,
    TrialPlayerAdded,
}

#[derive(Debug, Clone)]
pub(crate) enum Event {
    ClientInboundMsFinal {
        client: ClientId,
        message: IcMessage,
    },
    ClientChangeCharacter {
        client: ClientId,
        old_char_name: String,
    },
    ClientDestroyed {
        client: ClientId,
    },
    ClientInboundRt {
        client: ClientId,
        name: String,
    },
    /// Published after the client moved; its current area is the new one.
    AreaClientLeftFinal {
        area: AreaId,
        client: ClientId,
        old_displayname: String,
    },
    AreaClientEnteredFinal {
        area: AreaId,
        client: ClientId,
        old_area: Option<AreaId>,
    },
    AreaDestroyed {
        area: AreaId,
    },
    AreasLoaded {
        hub: GameRef,
    },
    TrialPlayerAdded {
        trial: GameRef,
        player: ClientId,
    },
}

impl Event {
    pub(crate) fn topic(&self) -> Topic {
        match self {
            Self::ClientInboundMsFinal { .. } => Topic::ClientInboundMsFinal,
            Self::ClientChangeCharacter { .. } => Topic::ClientChangeCharacter,
            Self::ClientDestroyed { .. } => Topic::ClientDestroyed,
            Self::ClientInboundRt { .. } => Topic::ClientInboundRt,
            Self::AreaClientLeftFinal { .. } => Topic::AreaClientLeftFinal,
            Self::AreaClientEnteredFinal { .. } => Topic::AreaClientEnteredFinal,
            Self::AreaDestroyed { .. } => Topic::AreaDestroyed,
            Self::AreasLoaded { .. } => Topic::AreasLoaded,
            Self::TrialPlayerAdded { .. } => Topic::TrialPlayerAdded,
        }
    }
}

/// The topics a game with the given capabilities listens to.
pub(crate) fn directory(has_areas: bool, hubbed: bool, trial: bool, minigame: bool) -> Vec<Topic> {
    let mut topics = vec![
        Topic::ClientInboundMsCheck,
        Topic::ClientInboundMsFinal,
        Topic::ClientChangeCharacter,
        Topic::ClientDestroyed,
    ];
    if has_areas {
        topics.extend([
            Topic::AreaClientLeftFinal,
            Topic::AreaClientEnteredFinal,
            Topic::AreaClientInboundMsCheck,
            Topic::AreaDestroyed,
        ]);
    }
    if hubbed {
        topics.push(Topic::AreasLoaded);
    }
    if trial {
        topics.push(Topic::ClientInboundRt);
    }
    if minigame {
        topics.push(Topic::TrialPlayerAdded);
    }
    topics
}

impl Engine {
    pub(crate) fn publish(&mut self, source: Source, event: Event) {
        let topic = event.topic();
        let recipients = self.bus.recipients(source, topic);
        tracing::trace!(?source, ?topic, recipients = recipients.len(), "event published");
        for game in recipients {
            if !self.is_live(game) || !self.bus.is_subscribed(game, source) {
                continue;
            }
            self.deliver(game, &event);
        }
    }

    fn deliver(&mut self, game: GameRef, event: &Event) {
        let Some(g) = self.games.get(&game) else {
            return;
        };
        let nsd = g.nsd.is_some();
        let minigame = g.minigame.is_some();
        let trial = g.trial.is_some();
        let hubbed = g.hub.is_some();

        match event {
            Event::ClientInboundMsFinal { client, message } => {
                if nsd {
                    self.nsd_on_ms_final(game, *client, message);
                }
            }
            Event::ClientChangeCharacter {
                client,
                old_char_name,
            } => {
                if nsd {
                    self.nsd_on_change_character(game, *client, old_char_name);
                } else if trial {
                    self.trial_on_change_character(game, *client, old_char_name);
                } else {
                    self.base_on_change_character(game, *client);
                }
            }
            Event::ClientDestroyed { client } => {
                if nsd {
                    self.nsd_on_client_destroyed(game, *client);
                } else if trial {
                    self.trial_on_client_destroyed(game, *client);
                } else {
                    self.base_on_client_destroyed(game, *client);
                }
            }
            Event::ClientInboundRt { client, name } => {
                if trial {
                    self.trial_on_rt(game, *client, name);
                }
            }
            Event::AreaClientLeftFinal {
                area,
                client,
                old_displayname,
            } => {
                if nsd {
                    self.nsd_on_left(game, *area, *client, old_displayname);
                } else if minigame {
                    self.minigame_on_left(game, *area, *client, old_displayname);
                } else if trial {
                    self.trial_on_left(game, *area, *client, old_displayname);
                } else {
                    self.base_on_left(game, *client);
                }
            }
            Event::AreaClientEnteredFinal {
                area,
                client,
                old_area,
            } => {
                if nsd {
                    self.nsd_on_entered(game, *area, *client, *old_area);
                } else if minigame {
                    self.minigame_on_entered(game, *area, *client, *old_area);
                } else if trial {
                    self.trial_on_entered(game, *area, *client, *old_area);
                } else {
                    self.base_on_entered(game, *client);
                }
            }
            Event::AreaDestroyed { area } => self.base_on_area_destroyed(game, *area),
            Event::AreasLoaded { hub } => {
                tracing::debug!(%game, %hub, "area list reloaded under game");
                if nsd {
                    self.nsd_on_areas_loaded(game);
                } else if trial {
                    self.trial_on_areas_loaded(game);
                } else if hubbed || minigame {
                    self.do_destroy(game);
                }
            }
            Event::TrialPlayerAdded { trial, player } => {
                if minigame {
                    self.minigame_on_trial_player_added(game, *trial, *player);
                }
            }
        }
    }

    /// Runs the acceptance checks for an in-character line: first the
    /// games of the sender's area, then the games the sender plays in.
    /// Checks may annotate the message (perjury viewers).
    pub(crate) fn check_ic_message(
        &self,
        sender: ClientId,
        message: &mut IcMessage,
    ) -> Result<(), Rejection> {
        if let Some(area) = self.area_of(sender) {
            let source = Source::Area(area);
            for game in self.bus.recipients(source, Topic::AreaClientInboundMsCheck) {
                if !self.is_live(game) {
                    continue;
                }
                let is_nsd = self.games.get(&game).is_some_and(|g| g.nsd.is_some());
                if is_nsd && !self.is_player(game, sender) {
                    return Err(Rejection::refused(
                        "You are not a player of this nonstop debate.",
                    ));
                }
            }
        }
        let source = Source::Client(sender);
        for game in self.bus.recipients(source, Topic::ClientInboundMsCheck) {
            if !self.is_live(game) {
                continue;
            }
            if self.games.get(&game).is_some_and(|g| g.nsd.is_some()) {
                self.nsd_check_message(game, sender, message)?;
            }
        }
        Ok(())
    }

    // -- Handlers shared by every area-bound game --

    pub(crate) fn base_on_change_character(&mut self, game: GameRef, client: ClientId) {
        let Some(g) = self.games.get(&game) else {
            return;
        };
        let lost = self
            .client(client)
            .is_some_and(|c| !c.has_participant_character());
        if g.require_participant_character && lost && g.is_player(client) {
            let result = self.do_remove_player(game, client);
            self.best_effort(result);
        }
    }

    pub(crate) fn base_on_client_destroyed(&mut self, game: GameRef, client: ClientId) {
        if self.is_player(game, client) {
            let result = self.do_remove_player(game, client);
            self.cascade(result, "removing disconnected player");
        }
    }

    /// Players that walked out of every game area are removed.
    pub(crate) fn base_on_left(&mut self, game: GameRef, client: ClientId) {
        let Some(g) = self.games.get(&game) else {
            return;
        };
        let inside = self.area_of(client).is_some_and(|a| g.has_area(a));
        if g.is_player(client) && !inside {
            let result = self.do_remove_player(game, client);
            self.cascade(result, "removing player that left");
        }
    }

    pub(crate) fn base_on_entered(&mut self, game: GameRef, client: ClientId) {
        let Some(g) = self.games.get(&game) else {
            return;
        };
        let autoadd = g.areas.as_ref().is_some_and(|b| b.autoadd_on_client_enter());
        if autoadd && !g.is_player(client) {
            let result = self.do_add_player(game, client);
            self.best_effort(result);
        }
    }

    pub(crate) fn base_on_area_destroyed(&mut self, game: GameRef, area: AreaId) {
        if self.games.get(&game).is_some_and(|g| g.has_area(area)) {
            let result = self.do_remove_area(game, area);
            self.cascade(result, "removing destroyed area");
        }
    }

    /// Automatic additions that are allowed to fail.
    pub(crate) fn best_effort(&self, result: Result<(), ErrorKind>) {
        if let Err(kind) = result {
            tracing::debug!(%kind, "automatic update skipped");
        }
    }
}
