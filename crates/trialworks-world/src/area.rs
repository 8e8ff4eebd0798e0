//! Areas and the parsed specs they are built from.

use std::collections::BTreeSet;

use serde::Deserialize;
use trialworks_protocol::{AreaId, ClientId, GameRef};

/// One entry of an area list, as produced by the (external) loader.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AreaSpec {
    pub name: String,
    /// Whether interjection bullets may be used here. Trials only accept
    /// areas that allow them.
    pub bullet: bool,
    pub private: bool,
    pub locked: bool,
    pub reachable_areas: BTreeSet<String>,
    pub visible_areas: BTreeSet<String>,
    pub background: String,
    pub hp_pro: i64,
    pub hp_def: i64,
}

impl Default for AreaSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            bullet: true,
            private: false,
            locked: false,
            reachable_areas: BTreeSet::new(),
            visible_areas: BTreeSet::new(),
            background: "default".to_string(),
            hp_pro: 10,
            hp_def: 10,
        }
    }
}

impl AreaSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Area {
    pub id: AreaId,
    /// Hub this area belongs to.
    pub hub: GameRef,
    pub name: String,
    pub clients: BTreeSet<ClientId>,
    pub bullet: bool,
    pub private: bool,
    pub locked: bool,
    pub reachable_areas: BTreeSet<String>,
    pub visible_areas: BTreeSet<String>,
    pub background: String,
    pub hp_pro: i64,
    pub hp_def: i64,
}

impl Area {
    pub fn from_spec(id: AreaId, hub: GameRef, spec: AreaSpec) -> Self {
        Self {
            id,
            hub,
            name: spec.name,
            clients: BTreeSet::new(),
            bullet: spec.bullet,
            private: spec.private,
            locked: spec.locked,
            reachable_areas: spec.reachable_areas,
            visible_areas: spec.visible_areas,
            background: spec.background,
            hp_pro: spec.hp_pro,
            hp_def: spec.hp_def,
        }
    }
}
