//! Registries of connected clients and loaded areas.
//!
//! Both are owned by the single engine task, so they are plain maps with
//! no locking. [`World`] bundles them so that moving a client updates the
//! client's `area` and the areas' `clients` sets together.

use std::collections::BTreeMap;

use trialworks_protocol::{AreaId, ClientId, GameRef};

use crate::{Area, AreaSpec, Client, NotificationSender, WorldError};

// ---------------------------------------------------------------------------
// ClientRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<ClientId, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection under the smallest unused id.
    pub fn connect(&mut self, sender: Option<NotificationSender>) -> ClientId {
        let id = (0..)
            .map(ClientId)
            .find(|id| !self.clients.contains_key(id))
            .unwrap_or(ClientId(u64::MAX));
        self.clients.insert(id, Client::new(id, sender));
        tracing::debug!(client = %id, "client registered");
        id
    }

    pub fn remove(&mut self, id: ClientId) -> Result<Client, WorldError> {
        self.clients.remove(&id).ok_or(WorldError::ClientNotFound(id))
    }

    pub fn get(&self, id: ClientId) -> Result<&Client, WorldError> {
        self.clients.get(&id).ok_or(WorldError::ClientNotFound(id))
    }

    pub fn get_mut(&mut self, id: ClientId) -> Result<&mut Client, WorldError> {
        self.clients.get_mut(&id).ok_or(WorldError::ClientNotFound(id))
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ---------------------------------------------------------------------------
// AreaRegistry
// ---------------------------------------------------------------------------

/// All loaded areas. Ids are global and never reused, so a stale `AreaId`
/// held after a reload can only ever miss.
#[derive(Debug, Default)]
pub struct AreaRegistry {
    areas: BTreeMap<AreaId, Area>,
    /// Areas of each hub in list order. The first one is the default.
    by_hub: BTreeMap<GameRef, Vec<AreaId>>,
    next_id: u64,
}

impl AreaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one area per spec, appended to `hub`'s list. Returns the
    /// new ids in order.
    pub fn create(&mut self, hub: GameRef, specs: Vec<AreaSpec>) -> Vec<AreaId> {
        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = AreaId(self.next_id);
            self.next_id += 1;
            self.areas.insert(id, Area::from_spec(id, hub, spec));
            created.push(id);
        }
        self.by_hub.entry(hub).or_default().extend(&created);
        created
    }

    /// Removes an area. Its clients must have been moved out beforehand.
    pub fn remove(&mut self, id: AreaId) -> Result<Area, WorldError> {
        let area = self.areas.remove(&id).ok_or(WorldError::AreaNotFound(id))?;
        if let Some(list) = self.by_hub.get_mut(&area.hub) {
            list.retain(|a| *a != id);
            if list.is_empty() {
                self.by_hub.remove(&area.hub);
            }
        }
        Ok(area)
    }

    pub fn get(&self, id: AreaId) -> Result<&Area, WorldError> {
        self.areas.get(&id).ok_or(WorldError::AreaNotFound(id))
    }

    pub fn get_mut(&mut self, id: AreaId) -> Result<&mut Area, WorldError> {
        self.areas.get_mut(&id).ok_or(WorldError::AreaNotFound(id))
    }

    pub fn contains(&self, id: AreaId) -> bool {
        self.areas.contains_key(&id)
    }

    /// Areas of `hub` in list order.
    pub fn areas_of(&self, hub: GameRef) -> &[AreaId] {
        self.by_hub.get(&hub).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find_by_name(&self, hub: GameRef, name: &str) -> Option<AreaId> {
        self.areas_of(hub)
            .iter()
            .copied()
            .find(|id| self.areas.get(id).is_some_and(|a| a.name == name))
    }

    pub fn default_area(&self, hub: GameRef) -> Option<AreaId> {
        self.areas_of(hub).first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Area> {
        self.areas.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Area> {
        self.areas.values_mut()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct World {
    pub clients: ClientRegistry,
    pub areas: AreaRegistry,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `client` into `to` (or out of every area with `None`).
    ///
    /// Returns the area the client was in before.
    pub fn move_client(
        &mut self,
        client: ClientId,
        to: Option<AreaId>,
    ) -> Result<Option<AreaId>, WorldError> {
        if let Some(to) = to {
            self.areas.get(to)?;
        }
        let old = self.clients.get(client)?.area;
        if let Some(area) = old.and_then(|old| self.areas.areas.get_mut(&old)) {
            area.clients.remove(&client);
        }
        if let Some(to) = to {
            self.areas.get_mut(to)?.clients.insert(client);
        }
        self.clients.get_mut(client)?.area = to;
        tracing::trace!(%client, ?old, ?to, "client moved");
        Ok(old)
    }

    /// Removes a client and takes it out of its area.
    pub fn remove_client(&mut self, client: ClientId) -> Result<Client, WorldError> {
        self.move_client(client, None)?;
        self.clients.remove(client)
    }

    /// Clients currently standing in `area` (empty for unknown areas).
    pub fn clients_in(&self, area: AreaId) -> Vec<ClientId> {
        self.areas
            .get(area)
            .map(|a| a.clients.iter().copied().collect())
            .unwrap_or_default()
    }
}
