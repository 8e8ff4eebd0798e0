//! Shared fixtures for the game integration tests.

#![allow(dead_code)]

use tokio::sync::mpsc::{self, UnboundedReceiver};
use trialworks_game::{Engine, HubSpec};
use trialworks_protocol::{AreaId, ClientId, GameRef, Notification};
use trialworks_world::AreaSpec;

pub struct Stage {
    pub engine: Engine,
    pub hub: GameRef,
    pub lobby: AreaId,
    pub court: AreaId,
}

/// A hub with two bullet-friendly areas; clients land in the lobby.
pub fn stage() -> Stage {
    let mut engine = Engine::default();
    let spec = HubSpec::default().with_areas(vec![
        AreaSpec::named("Lobby"),
        AreaSpec::named("Courtroom"),
    ]);
    let hub = engine.new_hub(spec).unwrap();
    let lobby = engine.world().areas.find_by_name(hub, "Lobby").unwrap();
    let court = engine.world().areas.find_by_name(hub, "Courtroom").unwrap();
    Stage {
        engine,
        hub,
        lobby,
        court,
    }
}

pub fn join(engine: &mut Engine) -> (ClientId, UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (engine.connect_client(Some(tx)), rx)
}

pub fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Only the OOC texts of whatever is queued.
pub fn oocs(rx: &mut UnboundedReceiver<Notification>) -> Vec<String> {
    drain(rx)
        .into_iter()
        .filter_map(|n| match n {
            Notification::Ooc { message } => Some(message),
            _ => None,
        })
        .collect()
}

pub fn displayname(engine: &Engine, client: ClientId) -> String {
    engine.client(client).unwrap().displayname.clone()
}
