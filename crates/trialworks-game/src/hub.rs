//! Hubs: top-level games that own a set of areas and the asset lists used
//! inside them.
//!
//! Every client belongs to exactly one hub, the one whose area it stands
//! in; hubs autoadd whoever walks in. A hub also owns the manager its
//! trials are created in.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use trialworks_protocol::{AreaId, ClientId, GameRef};
use trialworks_world::AreaSpec;

use crate::engine::Engine;
use crate::events::{Event, Source};
use crate::{ErrorKind, GameError, GameOptions, HubSpec, Layer};

/// Marks a game whose areas must all belong to `hub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubBinding {
    pub hub: GameRef,
}

/// The asset lists of a hub and where each was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubAssets {
    pub area_source: String,
    pub character_source: String,
    pub characters: Vec<String>,
    pub background_source: String,
    pub backgrounds: Vec<String>,
    pub music_source: String,
    pub music: Vec<String>,
    password: String,
}

impl HubAssets {
    pub(crate) fn from_spec(spec: &HubSpec) -> Self {
        Self {
            area_source: spec.area_source.clone(),
            character_source: spec.character_source.clone(),
            characters: spec.characters.clone(),
            background_source: spec.background_source.clone(),
            backgrounds: spec.backgrounds.clone(),
            music_source: spec.music_source.clone(),
            music: spec.music.clone(),
            password: random_password(),
        }
    }

    /// First background of the list, or `default` for an empty list.
    pub fn default_background(&self) -> &str {
        self.backgrounds.first().map_or("default", String::as_str)
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_password(&self, guess: &str) -> bool {
        constant_time_eq(guess.as_bytes(), self.password.as_bytes())
    }
}

/// Four random digits.
fn random_password() -> String {
    rand::rng().random_range(1000..10000).to_string()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl Engine {
    /// Creates a hub with the standard hub options.
    pub fn new_hub(&mut self, spec: HubSpec) -> Result<GameRef, GameError> {
        self.new_hub_with(GameOptions::hub(), spec)
    }

    pub fn new_hub_with(
        &mut self,
        options: GameOptions,
        spec: HubSpec,
    ) -> Result<GameRef, GameError> {
        let manager = self.hub_manager;
        self.checked_as(Layer::Hub, |e| e.do_new_hub(manager, options, spec))
    }

    pub(crate) fn do_new_hub(
        &mut self,
        manager: trialworks_protocol::ManagerRef,
        options: GameOptions,
        spec: HubSpec,
    ) -> Result<GameRef, ErrorKind> {
        if spec.areas.is_empty() {
            return Err(ErrorKind::AreaListEmpty);
        }
        let key = self.do_create_game(manager, options, None)?;
        if let Some(game) = self.games.get_mut(&key) {
            game.hub_assets = Some(HubAssets::from_spec(&spec));
            if !spec.name.is_empty() {
                game.name = spec.name.clone();
            }
        }
        let areas = self.world.areas.create(key, spec.areas);
        for area in areas {
            let result = self.do_add_area(key, area);
            self.cascade(result, "adding fresh area to hub");
        }
        Ok(key)
    }

    /// The hub new clients land in: the one with the smallest id.
    pub fn default_hub(&self) -> Option<GameRef> {
        self.managers
            .get(&self.hub_manager)?
            .id_map()
            .values()
            .next()
            .copied()
    }

    pub fn hubs(&self) -> Vec<GameRef> {
        self.managers
            .get(&self.hub_manager)
            .map(|m| m.games())
            .unwrap_or_default()
    }

    /// The hub of the area the client stands in.
    pub fn hub_of_client(&self, client: ClientId) -> Option<GameRef> {
        let area = self.area_of(client)?;
        self.world.areas.get(area).ok().map(|a| a.hub)
    }

    /// The manager a hub's trials live in.
    pub fn trial_manager(&self, hub: GameRef) -> Result<trialworks_protocol::ManagerRef, GameError> {
        self.hub_game(hub)
            .and_then(|g| g.children.ok_or(ErrorKind::GameIsUnmanaged))
            .map_err(|kind| GameError::new(Layer::Hub, kind))
    }

    pub fn hub_password(&self, hub: GameRef) -> Result<String, GameError> {
        self.hub_assets_of(hub).map(|a| a.password().to_string())
    }

    pub fn is_hub_password(&self, hub: GameRef, guess: &str) -> Result<bool, GameError> {
        self.hub_assets_of(hub).map(|a| a.is_password(guess))
    }

    pub fn set_hub_password(
        &mut self,
        hub: GameRef,
        password: impl Into<String>,
    ) -> Result<(), GameError> {
        let password = password.into();
        self.checked_as(Layer::Hub, |e| {
            e.hub_assets_mut(hub)?.password = password;
            Ok(())
        })
    }

    pub fn hub_info(&self, hub: GameRef) -> Result<String, GameError> {
        let game = self
            .hub_game(hub)
            .map_err(|kind| GameError::new(Layer::Hub, kind))?;
        let assets = self.hub_assets_of(hub)?;
        Ok(format!(
            "== Hub {} ==\r\n*GMs: {}. NonGMs: {}\r\n*Area list: {}\r\n*Background list: {}\r\n*Character list: {}\r\n*DJ list: {}",
            game.number,
            game.group.leaders().len(),
            game.group.regulars().len(),
            assets.area_source,
            assets.background_source,
            assets.character_source,
            assets.music_source,
        ))
    }

    /// Replaces the hub's areas.
    ///
    /// Games bound to the old list are told first (most end themselves),
    /// then occupants move to the area of the same name, or to the first
    /// new area, and finally the old areas are destroyed.
    pub fn load_areas(
        &mut self,
        hub: GameRef,
        specs: Vec<AreaSpec>,
        source: impl Into<String>,
    ) -> Result<Vec<AreaId>, GameError> {
        let source = source.into();
        self.checked_as(Layer::Hub, |e| e.do_load_areas(hub, specs, source))
    }

    fn do_load_areas(
        &mut self,
        hub: GameRef,
        specs: Vec<AreaSpec>,
        source: String,
    ) -> Result<Vec<AreaId>, ErrorKind> {
        if specs.is_empty() {
            return Err(ErrorKind::AreaListEmpty);
        }
        self.hub_game(hub)?;
        let old = self.world.areas.areas_of(hub).to_vec();
        let new = self.world.areas.create(hub, specs);
        tracing::info!(%hub, old = old.len(), new = new.len(), %source, "loading area list");

        self.publish(Source::AreaList(hub), Event::AreasLoaded { hub });
        for area in &new {
            let result = self.do_add_area(hub, *area);
            self.cascade(result, "adding loaded area to hub");
        }

        let by_name: BTreeMap<String, AreaId> = new
            .iter()
            .rev()
            .filter_map(|id| {
                let area = self.world.areas.get(*id).ok()?;
                Some((area.name.clone(), *id))
            })
            .collect();
        for area in &old {
            let name = self
                .world
                .areas
                .get(*area)
                .map(|a| a.name.clone())
                .unwrap_or_default();
            let Some(target) = by_name.get(&name).or(new.first()).copied() else {
                continue;
            };
            for client in self.world.clients_in(*area) {
                self.relocate(client, target);
            }
        }
        self.retire_areas(old);

        self.hub_assets_mut(hub)?.area_source = source;
        Ok(new)
    }

    /// Replaces the background list. Areas whose background vanished
    /// switch to the new default.
    pub fn load_backgrounds(
        &mut self,
        hub: GameRef,
        backgrounds: Vec<String>,
        source: impl Into<String>,
    ) -> Result<(), GameError> {
        let source = source.into();
        self.checked_as(Layer::Hub, |e| {
            let assets = e.hub_assets_mut(hub)?;
            assets.background_source = source;
            if assets.backgrounds == backgrounds {
                return Ok(());
            }
            assets.backgrounds = backgrounds;
            let valid: BTreeSet<String> = assets.backgrounds.iter().cloned().collect();
            let default = assets.default_background().to_string();
            let message = format!(
                "After a change in the background list, your area no longer had a valid background. Switching to {default}."
            );
            for area in e.game_areas(hub) {
                let Ok(record) = e.world.areas.get_mut(area) else {
                    continue;
                };
                if valid.contains(&record.background) {
                    continue;
                }
                record.background = default.clone();
                for client in e.world.clients_in(area) {
                    e.send_ooc(client, &message);
                }
            }
            Ok(())
        })
    }

    /// Replaces the character list. Players whose character is no longer
    /// listed become spectators.
    pub fn load_characters(
        &mut self,
        hub: GameRef,
        characters: Vec<String>,
        source: impl Into<String>,
    ) -> Result<(), GameError> {
        let source = source.into();
        self.checked_as(Layer::Hub, |e| {
            let assets = e.hub_assets_mut(hub)?;
            assets.character_source = source;
            if assets.characters == characters {
                return Ok(());
            }
            assets.characters = characters;
            let listed: BTreeSet<String> = assets.characters.iter().cloned().collect();
            let stranded: Vec<ClientId> = e
                .players(hub)
                .into_iter()
                .filter(|p| {
                    e.client(*p).is_some_and(|c| {
                        c.has_participant_character() && !listed.contains(&c.char_name)
                    })
                })
                .collect();
            for client in stranded {
                e.send_ooc(
                    client,
                    "After a change in the character list, your client character list is no longer synchronized. Please rejoin the server.",
                );
                e.do_change_character(client, None, String::new())?;
            }
            Ok(())
        })
    }

    pub fn load_music(
        &mut self,
        hub: GameRef,
        music: Vec<String>,
        source: impl Into<String>,
    ) -> Result<(), GameError> {
        let source = source.into();
        self.checked_as(Layer::Hub, |e| {
            let assets = e.hub_assets_mut(hub)?;
            assets.music = music;
            assets.music_source = source;
            Ok(())
        })
    }

    /// Moves the former occupants of a destroyed hub to the default hub and
    /// retires its areas.
    pub(crate) fn hub_after_destroy(
        &mut self,
        hub: GameRef,
        occupants: &BTreeSet<ClientId>,
        areas: Vec<AreaId>,
    ) {
        let landing = self
            .default_hub()
            .and_then(|h| Some((h, self.world.areas.default_area(h)?)));
        if let Some((new_hub, area)) = landing {
            let number = self.games.get(&new_hub).map_or(0, |g| g.number);
            let name = self
                .world
                .areas
                .get(area)
                .map(|a| a.name.clone())
                .unwrap_or_default();
            let message = format!(
                "Your hub no longer exists. Moving you to the default area {name} of hub {number}."
            );
            for client in occupants {
                self.send_ooc(*client, &message);
                self.relocate(*client, area);
            }
        }
        self.retire_areas(areas);
        self.bus.drop_source(Source::AreaList(hub));
    }

    /// Tells every game the areas are gone, then deletes them.
    fn retire_areas(&mut self, areas: Vec<AreaId>) {
        for area in areas {
            self.publish(Source::Area(area), Event::AreaDestroyed { area });
            for client in self.world.clients_in(area) {
                if let Err(err) = self.world.move_client(client, None) {
                    tracing::warn!(%client, %area, %err, "could not evict client");
                }
            }
            if let Err(err) = self.world.areas.remove(area) {
                tracing::warn!(%area, %err, "area already gone");
            }
            self.bus.drop_source(Source::Area(area));
        }
    }

    fn hub_game(&self, hub: GameRef) -> Result<&crate::Game, ErrorKind> {
        let game = self.live_game(hub)?;
        if game.hub_assets.is_none() {
            return Err(ErrorKind::MissingCapability { needed: Layer::Hub });
        }
        Ok(game)
    }

    fn hub_assets_of(&self, hub: GameRef) -> Result<&HubAssets, GameError> {
        self.hub_game(hub)
            .and_then(|g| {
                g.hub_assets
                    .as_ref()
                    .ok_or(ErrorKind::MissingCapability { needed: Layer::Hub })
            })
            .map_err(|kind| GameError::new(Layer::Hub, kind))
    }

    fn hub_assets_mut(&mut self, hub: GameRef) -> Result<&mut HubAssets, ErrorKind> {
        self.live_game_mut(hub)?
            .hub_assets
            .as_mut()
            .ok_or(ErrorKind::MissingCapability { needed: Layer::Hub })
    }
}
