//! The engine: sole owner of the world, the managers and every game.
//!
//! All mutation goes through `&mut Engine`, so a cascade (a player
//! leaving an area removes them from a trial, which removes them from its
//! debate, which may end the debate) runs to completion before the next
//! command is looked at. Callers never hold a game across operations;
//! they hold a [`GameRef`] and ask again.
//!
//! Every public operation follows the same shape:
//!
//! 1. run the internal step, which reports a bare [`ErrorKind`];
//! 2. re-check the structure (see [`Engine::check_structure`]);
//! 3. wrap the kind into a [`GameError`] tagged with the caller's layer.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use trialworks_bus::EventBus;
use trialworks_protocol::{AreaId, CharacterId, ClientId, GameRef, IcMessage, ManagerRef};
use trialworks_tick::{Boundary, TimerId};
use trialworks_world::{Client, NotificationSender, World};

use crate::error::fatal;
use crate::events::{Event, Source, Topic};
use crate::game::Game;
use crate::manager::{Manager, ManagerKind};
use crate::{EngineConfig, ErrorKind, GameError, Layer, Rejection};

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) world: World,
    pub(crate) managers: BTreeMap<ManagerRef, Manager>,
    /// Every game ever created. Destroyed games stay here, unmanaged, so
    /// stale handles keep resolving.
    pub(crate) games: BTreeMap<GameRef, Game>,
    pub(crate) bus: EventBus<Source, GameRef, Topic>,
    pub(crate) hub_manager: ManagerRef,
    pub(crate) next_game: u64,
    pub(crate) next_manager: u64,
}

impl Engine {
    /// Creates an engine with an empty hub manager and no hubs.
    pub fn new(config: EngineConfig) -> Self {
        let mut engine = Self {
            config,
            world: World::new(),
            managers: BTreeMap::new(),
            games: BTreeMap::new(),
            bus: EventBus::new(),
            hub_manager: ManagerRef(0),
            next_game: 0,
            next_manager: 0,
        };
        engine.hub_manager = engine.new_manager(ManagerKind::Hub, None);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn hub_manager(&self) -> ManagerRef {
        self.hub_manager
    }

    pub fn game(&self, game: GameRef) -> Option<&Game> {
        self.games.get(&game)
    }

    pub fn manager(&self, manager: ManagerRef) -> Option<&Manager> {
        self.managers.get(&manager)
    }

    pub fn client(&self, client: ClientId) -> Option<&Client> {
        self.world.clients.get(client).ok()
    }

    /// True while the game exists and has not been destroyed.
    pub fn is_live(&self, game: GameRef) -> bool {
        self.games.get(&game).is_some_and(|g| !g.unmanaged)
    }

    // -- Checked-operation plumbing --

    pub(crate) fn checked<T>(
        &mut self,
        game: GameRef,
        op: impl FnOnce(&mut Self) -> Result<T, ErrorKind>,
    ) -> Result<T, GameError> {
        let layer = self.games.get(&game).map_or(Layer::Game, |g| g.layer);
        self.checked_as(layer, op)
    }

    pub(crate) fn checked_as<T>(
        &mut self,
        layer: Layer,
        op: impl FnOnce(&mut Self) -> Result<T, ErrorKind>,
    ) -> Result<T, GameError> {
        let result = op(self);
        self.validate();
        result.map_err(|kind| GameError::new(layer, kind))
    }

    pub(crate) fn validated<T>(&mut self, op: impl FnOnce(&mut Self) -> T) -> T {
        let result = op(self);
        self.validate();
        result
    }

    pub(crate) fn validate(&self) {
        if !self.config.validate_structure {
            return;
        }
        if let Err(violation) = self.check_structure() {
            fatal(violation);
        }
    }

    /// For cascades whose preconditions were already checked: a failure
    /// means the structure is broken.
    #[track_caller]
    pub(crate) fn cascade(&self, result: Result<(), ErrorKind>, what: &str) {
        if let Err(kind) = result {
            fatal(format_args!("{what}: {kind}"));
        }
    }

    pub(crate) fn game_ref(&self, game: GameRef) -> Result<&Game, ErrorKind> {
        self.games.get(&game).ok_or(ErrorKind::UnknownGame(game))
    }

    pub(crate) fn game_or_err(&self, game: GameRef) -> Result<&Game, GameError> {
        self.game_ref(game)
            .map_err(|kind| GameError::new(Layer::Game, kind))
    }

    pub(crate) fn live_game(&self, game: GameRef) -> Result<&Game, ErrorKind> {
        let g = self.game_ref(game)?;
        if g.unmanaged {
            return Err(ErrorKind::GameIsUnmanaged);
        }
        Ok(g)
    }

    pub(crate) fn live_game_mut(&mut self, game: GameRef) -> Result<&mut Game, ErrorKind> {
        let g = self
            .games
            .get_mut(&game)
            .ok_or(ErrorKind::UnknownGame(game))?;
        if g.unmanaged {
            return Err(ErrorKind::GameIsUnmanaged);
        }
        Ok(g)
    }

    // -- Notification helpers --

    pub(crate) fn with_client(&self, user: ClientId, f: impl FnOnce(&Client)) {
        if let Ok(client) = self.world.clients.get(user) {
            f(client);
        }
    }

    pub(crate) fn send_ooc(&self, user: ClientId, message: &str) {
        self.with_client(user, |c| c.send_ooc(message));
    }

    /// Sends to every listed user except `except`.
    pub(crate) fn send_ooc_to(
        &self,
        users: impl IntoIterator<Item = ClientId>,
        except: Option<ClientId>,
        message: &str,
    ) {
        for user in users {
            if Some(user) != except {
                self.send_ooc(user, message);
            }
        }
    }

    /// Staff notice; `skip` filters out those who get a different text.
    pub(crate) fn send_ooc_staff(&self, skip: impl Fn(ClientId) -> bool, message: &str) {
        for client in self.world.clients.iter() {
            if client.is_staff && !skip(client.id) {
                client.send_ooc(message);
            }
        }
    }

    /// Non-staff members of `watchers`, minus `except`.
    pub(crate) fn send_ooc_watchers(
        &self,
        watchers: &BTreeSet<ClientId>,
        except: Option<ClientId>,
        message: &str,
    ) {
        for user in watchers {
            if Some(*user) == except {
                continue;
            }
            self.with_client(*user, |c| {
                if !c.is_staff {
                    c.send_ooc(message);
                }
            });
        }
    }

    pub(crate) fn displayname(&self, user: ClientId) -> String {
        self.world
            .clients
            .get(user)
            .map(|c| c.displayname.clone())
            .unwrap_or_default()
    }

    pub(crate) fn area_of(&self, user: ClientId) -> Option<AreaId> {
        self.world.clients.get(user).ok().and_then(|c| c.area)
    }

    // -- Clock --

    /// Advances every live game's timers by `dt` and runs what crossed a
    /// boundary.
    pub fn tick(&mut self, dt: Duration) {
        let live: Vec<GameRef> = self
            .games
            .iter()
            .filter(|(_, g)| !g.unmanaged && !g.timers.is_empty())
            .map(|(key, _)| *key)
            .collect();
        for key in live {
            let ids = self
                .games
                .get(&key)
                .map(|g| g.timers.ids())
                .unwrap_or_default();
            for id in ids {
                let Some(game) = self.games.get_mut(&key) else {
                    break;
                };
                if game.unmanaged {
                    break;
                }
                if let Some(boundary) = game.timers.advance(id, dt) {
                    self.on_timer_boundary(key, id, boundary);
                }
            }
        }
        self.validate();
    }

    fn on_timer_boundary(&mut self, game: GameRef, timer: TimerId, boundary: Boundary) {
        tracing::trace!(%game, %timer, ?boundary, "timer boundary");
        if self.games.get(&game).is_some_and(|g| g.nsd.is_some()) {
            self.nsd_on_timer(game, timer, boundary);
        }
    }

    // -- Clients --

    /// Registers a client and walks it into the default area of the
    /// default hub.
    pub fn connect_client(&mut self, sender: Option<NotificationSender>) -> ClientId {
        self.validated(|e| {
            let id = e.world.clients.connect(sender);
            tracing::info!(client = %id, "client connected");
            let landing = e
                .default_hub()
                .and_then(|hub| e.world.areas.default_area(hub));
            if let Some(area) = landing {
                e.relocate(id, area);
            }
            id
        })
    }

    /// Tells every game the client is gone, then forgets it.
    pub fn disconnect_client(&mut self, client: ClientId) -> Result<(), GameError> {
        self.checked_as(Layer::Game, |e| {
            if !e.world.clients.contains(client) {
                return Err(ErrorKind::UnknownClient(client));
            }
            e.publish(Source::Client(client), Event::ClientDestroyed { client });
            e.world
                .remove_client(client)
                .map_err(|_| ErrorKind::UnknownClient(client))?;
            e.bus.drop_source(Source::Client(client));
            tracing::info!(%client, "client disconnected");
            Ok(())
        })
    }

    pub fn change_area(&mut self, client: ClientId, area: AreaId) -> Result<(), GameError> {
        self.checked_as(Layer::Game, |e| {
            if !e.world.clients.contains(client) {
                return Err(ErrorKind::UnknownClient(client));
            }
            if !e.world.areas.contains(area) {
                return Err(ErrorKind::UnknownArea(area));
            }
            e.relocate(client, area);
            Ok(())
        })
    }

    /// Switches the client's character (`None` makes it a spectator).
    pub fn change_character(
        &mut self,
        client: ClientId,
        character: Option<CharacterId>,
        char_name: impl Into<String>,
    ) -> Result<(), GameError> {
        let char_name = char_name.into();
        self.checked_as(Layer::Game, |e| {
            e.do_change_character(client, character, char_name)
        })
    }

    pub(crate) fn do_change_character(
        &mut self,
        client: ClientId,
        character: Option<CharacterId>,
        char_name: String,
    ) -> Result<(), ErrorKind> {
        let c = self
            .world
            .clients
            .get_mut(client)
            .map_err(|_| ErrorKind::UnknownClient(client))?;
        let old_char_name = std::mem::replace(&mut c.char_name, char_name);
        c.character = character;
        self.publish(
            Source::Client(client),
            Event::ClientChangeCharacter {
                client,
                old_char_name,
            },
        );
        Ok(())
    }

    pub fn set_displayname(
        &mut self,
        client: ClientId,
        name: impl Into<String>,
    ) -> Result<(), GameError> {
        let name = name.into();
        self.checked_as(Layer::Game, |e| {
            e.world
                .clients
                .get_mut(client)
                .map_err(|_| ErrorKind::UnknownClient(client))?
                .displayname = name;
            Ok(())
        })
    }

    pub fn set_staff(&mut self, client: ClientId, is_staff: bool) -> Result<(), GameError> {
        self.checked_as(Layer::Game, |e| {
            e.world
                .clients
                .get_mut(client)
                .map_err(|_| ErrorKind::UnknownClient(client))?
                .is_staff = is_staff;
            Ok(())
        })
    }

    /// Runs the acceptance checks, shows the line to the sender's area and
    /// lets subscribed games react to it.
    pub fn handle_ic_message(
        &mut self,
        sender: ClientId,
        message: IcMessage,
    ) -> Result<(), Rejection> {
        self.validated(|e| {
            let area = e
                .world
                .clients
                .get(sender)
                .map_err(|_| Rejection::UnknownClient(sender))?
                .area;
            let mut message = message;
            e.check_ic_message(sender, &mut message)?;
            if let Some(area) = area {
                for viewer in e.world.clients_in(area) {
                    e.with_client(viewer, |c| c.send_ic(sender, &message));
                }
            }
            e.publish(
                Source::Client(sender),
                Event::ClientInboundMsFinal {
                    client: sender,
                    message,
                },
            );
            Ok(())
        })
    }

    /// A client played a splash animation (`testimony1`, `testimony2`, …).
    pub fn handle_rt(&mut self, sender: ClientId, name: &str) -> Result<(), GameError> {
        self.checked_as(Layer::Game, |e| {
            let area = e
                .world
                .clients
                .get(sender)
                .map_err(|_| ErrorKind::UnknownClient(sender))?
                .area;
            if let Some(area) = area {
                for viewer in e.world.clients_in(area) {
                    e.with_client(viewer, |c| c.send_splash(name));
                }
            }
            e.publish(
                Source::Client(sender),
                Event::ClientInboundRt {
                    client: sender,
                    name: name.to_string(),
                },
            );
            Ok(())
        })
    }

    /// Moves a client and announces the move to both areas' games.
    pub(crate) fn relocate(&mut self, client: ClientId, to: AreaId) {
        let old_displayname = self.displayname(client);
        let old = match self.world.move_client(client, Some(to)) {
            Ok(old) => old,
            Err(err) => {
                tracing::warn!(%client, area = %to, %err, "move failed");
                return;
            }
        };
        if let Some(old) = old {
            self.publish(
                Source::Area(old),
                Event::AreaClientLeftFinal {
                    area: old,
                    client,
                    old_displayname,
                },
            );
        }
        self.publish(
            Source::Area(to),
            Event::AreaClientEnteredFinal {
                area: to,
                client,
                old_area: old,
            },
        );
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// `SERVER_SELECT` stands in for "no previous area".
pub(crate) fn area_label(area: Option<AreaId>) -> String {
    area.map_or_else(|| "SERVER_SELECT".to_string(), |a| a.0.to_string())
}
