//! Integration tests for hubs, trials and their minigames.

mod common;

use common::{displayname, drain, join, oocs, stage};
use trialworks_game::{Engine, ErrorKind, GameOptions, HubSpec, Layer, NsdOptions};
use trialworks_protocol::{CharacterId, ClientId, Notification};
use trialworks_world::AreaSpec;

// =========================================================================
// Hubs
// =========================================================================

#[test]
fn test_new_hub_requires_areas() {
    let mut engine = Engine::default();
    let err = engine
        .new_hub(HubSpec::default().with_areas(Vec::new()))
        .unwrap_err();
    assert_eq!(err.layer, Layer::Hub);
    assert_eq!(err.kind, ErrorKind::AreaListEmpty);
}

#[test]
fn test_last_hub_cannot_be_destroyed() {
    let mut s = stage();
    let err = s.engine.destroy(s.hub).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ManagerCannotManageeNoManagees);
    assert!(s.engine.is_live(s.hub));
}

#[test]
fn test_hub_follows_clients_between_its_areas() {
    let mut s = stage();
    let (a, _rx) = join(&mut s.engine);
    assert_eq!(s.engine.hub_of_client(a), Some(s.hub));
    s.engine.change_area(a, s.court).unwrap();
    assert!(s.engine.is_player(s.hub, a));
}

fn area_name(engine: &Engine, client: ClientId) -> String {
    let area = engine.client(client).unwrap().area.unwrap();
    engine.world().areas.get(area).unwrap().name.clone()
}

#[test]
fn test_area_reload_ends_trial_and_nsd() {
    let mut s = stage();
    let (a, mut ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    s.engine.change_area(b, s.court).unwrap();
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    let nsd = s
        .engine
        .new_nsd(trial, Some(a), NsdOptions::default())
        .unwrap();
    drain(&mut ra);

    let new = s
        .engine
        .load_areas(
            s.hub,
            vec![AreaSpec::named("Garden"), AreaSpec::named("Lobby")],
            "config/areas_v2.yaml",
        )
        .unwrap();

    assert!(!s.engine.is_live(trial));
    assert!(!s.engine.is_live(nsd));
    assert!(oocs(&mut ra).contains(&"Your trial was deleted due to an area list load.".to_string()));

    // Same-named area first, otherwise the first area of the new list.
    assert_eq!(s.engine.client(a).unwrap().area, Some(new[1]));
    assert_eq!(area_name(&s.engine, a), "Lobby");
    assert_eq!(s.engine.client(b).unwrap().area, Some(new[0]));
    assert!(s.engine.is_player(s.hub, a));
    assert!(s.engine.is_player(s.hub, b));

    assert!(s.engine.world().areas.get(s.lobby).is_err());
    assert!(s.engine.world().areas.get(s.court).is_err());
    assert!(s.engine.hub_info(s.hub).unwrap().contains("config/areas_v2.yaml"));
    assert_eq!(s.engine.check_structure(), Ok(()));
}

#[test]
fn test_area_reload_rejects_empty_list() {
    let mut s = stage();
    let err = s
        .engine
        .load_areas(s.hub, Vec::new(), "config/empty.yaml")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AreaListEmpty);
    assert!(s.engine.world().areas.get(s.lobby).is_ok());
}

#[test]
fn test_character_reload_turns_unlisted_players_into_spectators() {
    let mut s = stage();
    let (a, mut ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    s.engine
        .change_character(a, Some(CharacterId(0)), "Phoenix")
        .unwrap();
    s.engine
        .change_character(b, Some(CharacterId(1)), "Edgeworth")
        .unwrap();
    let options = GameOptions::trial().with_require_participant_character(true);
    let trial = s.engine.new_trial(s.hub, Some(b), options).unwrap();
    s.engine.add_player(trial, a).unwrap();
    drain(&mut ra);

    s.engine
        .load_characters(s.hub, vec!["Edgeworth".into()], "config/characters_v2.yaml")
        .unwrap();

    let client = s.engine.client(a).unwrap();
    assert_eq!(client.character, None);
    assert!(client.char_name.is_empty());
    assert!(s.engine.is_player(s.hub, a));
    assert!(!s.engine.is_player(trial, a));
    assert!(s.engine.is_player(trial, b));
    assert_eq!(s.engine.client(b).unwrap().character, Some(CharacterId(1)));
    assert!(oocs(&mut ra).iter().any(|m| m.starts_with("After a change in the character list")));
    assert_eq!(s.engine.check_structure(), Ok(()));
}

#[test]
fn test_background_reload_resets_missing_backgrounds() {
    let mut s = stage();
    let (a, mut ra) = join(&mut s.engine);
    drain(&mut ra);

    s.engine
        .load_backgrounds(s.hub, vec!["gallery".into()], "config/backgrounds_v2.yaml")
        .unwrap();

    let lobby = s.engine.world().areas.get(s.lobby).unwrap();
    assert_eq!(lobby.background, "gallery");
    assert_eq!(
        oocs(&mut ra),
        vec!["After a change in the background list, your area no longer had a valid background. Switching to gallery.".to_string()]
    );

    s.engine
        .load_music(s.hub, vec!["Objection.mp3".into()], "config/music_v2.yaml")
        .unwrap();
    assert!(s.engine.hub_info(s.hub).unwrap().contains("config/music_v2.yaml"));
}

#[test]
fn test_destroying_hub_moves_occupants_to_default_hub() {
    let mut s = stage();
    let garden_hub = s
        .engine
        .new_hub(HubSpec::default().with_areas(vec![AreaSpec::named("Garden")]))
        .unwrap();
    let garden = s
        .engine
        .world()
        .areas
        .find_by_name(garden_hub, "Garden")
        .unwrap();
    let (a, mut ra) = join(&mut s.engine);
    s.engine.change_area(a, garden).unwrap();
    assert!(s.engine.is_player(garden_hub, a));
    drain(&mut ra);

    s.engine.destroy(garden_hub).unwrap();

    assert_eq!(s.engine.hubs(), vec![s.hub]);
    assert_eq!(s.engine.client(a).unwrap().area, Some(s.lobby));
    assert!(s.engine.is_player(s.hub, a));
    assert!(s.engine.world().areas.get(garden).is_err());
    assert!(oocs(&mut ra).iter().any(|m| m.starts_with("Your hub no longer exists.")));
    assert_eq!(s.engine.check_structure(), Ok(()));
}

// =========================================================================
// Trial lifecycle
// =========================================================================

#[test]
fn test_new_trial_takes_creator_area() {
    let mut s = stage();
    let (a, _rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();

    assert_eq!(s.engine.game(trial).unwrap().id().to_string(), "trial0");
    assert_eq!(
        s.engine.game_areas(trial).into_iter().collect::<Vec<_>>(),
        vec![s.lobby]
    );
    assert!(s.engine.is_player(trial, a));
    assert!(!s.engine.is_leader(trial, a).unwrap());
    assert_eq!(s.engine.trial_of_user(s.hub, a).unwrap(), trial);
}

#[test]
fn test_new_trial_introduces_creator() {
    let mut s = stage();
    let (a, mut rx) = join(&mut s.engine);
    drain(&mut rx);
    s.engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();

    let got = drain(&mut rx);
    assert!(got.contains(&Notification::Gamemode {
        name: "trial".into()
    }));
    assert!(got.contains(&Notification::Splash {
        name: "testimony1".into()
    }));
}

#[test]
fn test_second_trial_in_same_area_fails() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    s.engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();

    let err = s
        .engine
        .new_trial(s.hub, Some(b), GameOptions::trial())
        .unwrap_err();
    assert_eq!(err.layer, Layer::Trial);
    assert_eq!(err.kind, ErrorKind::AreaHitGameConcurrentLimit);
}

#[test]
fn test_trial_refuses_area_without_bullets() {
    let mut engine = Engine::default();
    let spec = HubSpec::default().with_areas(vec![AreaSpec {
        bullet: false,
        ..AreaSpec::named("Gallery")
    }]);
    let hub = engine.new_hub(spec).unwrap();
    let (a, _rx) = join(&mut engine);

    let err = engine
        .new_trial(hub, Some(a), GameOptions::trial())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AreaDisallowsBullets);
    assert!(engine.trial_of_user(hub, a).is_err());
}

#[test]
fn test_last_player_leaving_ends_trial() {
    let mut s = stage();
    let (a, mut rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    drain(&mut rx);

    s.engine.change_area(a, s.court).unwrap();
    assert!(!s.engine.is_live(trial));
    let got = oocs(&mut rx);
    assert!(got.contains(
        &"You have left to an area not part of trial `trial0` and thus were automatically removed from the trial.".to_string()
    ));
    assert!(got.contains(
        &"Your trial `trial0` was automatically ended as it lost all its players.".to_string()
    ));
}

#[test]
fn test_leader_testimony2_ends_trial() {
    let mut s = stage();
    let (a, mut ra) = join(&mut s.engine);
    let (b, mut rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.add_player(trial, b).unwrap();
    s.engine.add_leader(trial, a).unwrap();
    drain(&mut ra);
    drain(&mut rb);

    s.engine.handle_rt(a, "testimony2").unwrap();
    assert!(!s.engine.is_live(trial));
    assert!(oocs(&mut ra).contains(&"You ended your trial.".to_string()));
    assert!(oocs(&mut rb).contains(&"Your trial was ended.".to_string()));
}

#[test]
fn test_regular_testimony2_keeps_trial() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.handle_rt(a, "testimony2").unwrap();
    assert!(s.engine.is_live(trial));
}

#[test]
fn test_end_trial_splashes_occupants() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (watcher, mut rw) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    drain(&mut rw);

    s.engine.end_trial(trial).unwrap();
    assert!(!s.engine.is_live(trial));
    assert!(!s.engine.is_player(trial, watcher));
    assert!(drain(&mut rw).contains(&Notification::Splash {
        name: "testimony2".into()
    }));
}

#[test]
fn test_trial_info_lists_members() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.add_player(trial, b).unwrap();
    s.engine.add_leader(trial, a).unwrap();

    let info = s.engine.trial_info(trial).unwrap();
    assert!(info.starts_with("Trial trial0 [2/-]"), "{info}");
    assert!(info.contains(&format!(
        "Leaders: \n*[{}] {}: Influence: 10; Focus: 10",
        a.0,
        displayname(&s.engine, a)
    )));
    assert!(info.contains(&format!("[{}] {}", b.0, displayname(&s.engine, b))));
}

// =========================================================================
// Influence and focus
// =========================================================================

#[test]
fn test_players_start_with_full_stats() {
    let mut s = stage();
    let (a, _rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    assert_eq!(s.engine.influence(trial, a).unwrap().value, 10.0);
    assert_eq!(s.engine.focus(trial, a).unwrap().value, 10.0);
}

#[test]
fn test_set_influence_out_of_range_fails() {
    let mut s = stage();
    let (a, _rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();

    let err = s.engine.set_influence(trial, a, 11.0).unwrap_err();
    assert_eq!(err.layer, Layer::Trial);
    assert_eq!(err.kind, ErrorKind::InfluenceIsInvalid);
    let err = s.engine.set_focus(trial, a, -1.0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::FocusIsInvalid);

    s.engine.set_influence(trial, a, 4.5).unwrap();
    assert_eq!(s.engine.influence(trial, a).unwrap().value, 4.5);
}

#[test]
fn test_set_influence_sends_health() {
    let mut s = stage();
    let (a, mut rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    drain(&mut rx);

    s.engine.set_focus(trial, a, 3.0).unwrap();
    assert!(drain(&mut rx).contains(&Notification::Health {
        side: trialworks_protocol::HealthSide::Focus,
        value: 3,
    }));
}

#[test]
fn test_change_influence_clamps_and_reports_zero() {
    let mut s = stage();
    let (a, mut ra) = join(&mut s.engine);
    let (b, mut rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.add_player(trial, b).unwrap();
    s.engine.add_leader(trial, b).unwrap();
    drain(&mut ra);
    drain(&mut rb);

    s.engine.change_influence_by(trial, a, -20.0).unwrap();
    assert_eq!(s.engine.influence(trial, a).unwrap().value, 0.0);
    assert!(oocs(&mut ra).contains(&"You ran out of influence!".to_string()));
    let expected = format!("(X) {} ran out of influence!", displayname(&s.engine, a));
    assert!(oocs(&mut rb).contains(&expected));

    s.engine.change_focus_by(trial, a, 5.0).unwrap();
    assert_eq!(s.engine.focus(trial, a).unwrap().value, 10.0);
}

#[test]
fn test_influence_change_then_undo_round_trips() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.set_influence(trial, a, 6.0).unwrap();

    s.engine.change_influence_by(trial, a, 2.5).unwrap();
    s.engine.change_influence_by(trial, a, -2.5).unwrap();
    assert_eq!(s.engine.influence(trial, a).unwrap().value, 6.0);

    s.engine.change_influence_by(trial, a, -1.5).unwrap();
    s.engine.change_influence_by(trial, a, 1.5).unwrap();
    assert_eq!(s.engine.influence(trial, a).unwrap().value, 6.0);
}

#[test]
fn test_influence_undo_after_hitting_bound_lands_below_it() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.set_influence(trial, a, 8.0).unwrap();

    // +5 stops at the maximum of 10, so the undo lands on 10 - 5.
    s.engine.change_influence_by(trial, a, 5.0).unwrap();
    assert_eq!(s.engine.influence(trial, a).unwrap().value, 10.0);
    s.engine.change_influence_by(trial, a, -5.0).unwrap();
    assert_eq!(s.engine.influence(trial, a).unwrap().value, 5.0);

    s.engine.set_focus(trial, a, 2.0).unwrap();
    s.engine.change_focus_by(trial, a, -3.0).unwrap();
    assert_eq!(s.engine.focus(trial, a).unwrap().value, 0.0);
    s.engine.change_focus_by(trial, a, 3.0).unwrap();
    assert_eq!(s.engine.focus(trial, a).unwrap().value, 3.0);
}

#[test]
fn test_stats_of_nonplayer_fail() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    assert_eq!(
        s.engine.influence(trial, b).unwrap_err().kind,
        ErrorKind::UserNotPlayer
    );
    assert_eq!(
        s.engine.set_influence(trial, b, 5.0).unwrap_err().kind,
        ErrorKind::UserNotPlayer
    );
}

#[test]
fn test_removed_player_loses_stats() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.add_player(trial, b).unwrap();
    s.engine.set_influence(trial, b, 2.0).unwrap();

    s.engine.remove_player(trial, b).unwrap();
    s.engine.add_player(trial, b).unwrap();
    assert_eq!(s.engine.influence(trial, b).unwrap().value, 10.0);
}

// =========================================================================
// Minigames
// =========================================================================

#[test]
fn test_nsd_id_extends_trial_id() {
    let mut s = stage();
    let (a, _rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    let nsd = s
        .engine
        .new_nsd(trial, Some(a), NsdOptions::default())
        .unwrap();

    assert_eq!(s.engine.game(nsd).unwrap().id().to_string(), "trial0g0");
    assert_eq!(s.engine.nsd_by_id(trial, "trial0g0").unwrap(), nsd);
    assert_eq!(s.engine.nsd_of_user(trial, a).unwrap(), nsd);
    assert_eq!(s.engine.minigame_trial(nsd), Some(trial));
    assert_eq!(s.engine.minigames(trial), vec![nsd]);
}

#[test]
fn test_second_nsd_hits_minigame_limit() {
    let mut s = stage();
    let (a, _rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine
        .new_nsd(trial, Some(a), NsdOptions::default())
        .unwrap();

    let err = s
        .engine
        .new_nsd(trial, Some(a), NsdOptions::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ManagerTooManyGames);
}

#[test]
fn test_nsd_creator_must_play_in_trial() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();

    let err = s
        .engine
        .new_nsd(trial, Some(b), NsdOptions::default())
        .unwrap_err();
    assert_eq!(err.layer, Layer::NonStopDebate);
    assert_eq!(err.kind, ErrorKind::UserNotPlayer);
    assert!(s.engine.minigames(trial).is_empty());
}

#[test]
fn test_nsd_of_nonplayer_fails() {
    let mut s = stage();
    let (a, _rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    let err = s.engine.nsd_of_user(trial, a).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UserNotInMinigame);
}

#[test]
fn test_removing_trial_player_removes_them_from_nsd() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.add_player(trial, b).unwrap();
    let nsd = s
        .engine
        .new_nsd(trial, Some(a), NsdOptions::default())
        .unwrap();
    s.engine.add_player(nsd, b).unwrap();

    s.engine.remove_player(trial, b).unwrap();
    assert!(!s.engine.is_player(nsd, b));
    assert!(s.engine.is_live(nsd));
}

#[test]
fn test_nsd_refuses_player_outside_trial() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    let nsd = s
        .engine
        .new_nsd(trial, Some(a), NsdOptions::default())
        .unwrap();
    let err = s.engine.add_player(nsd, b).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UserNotPlayer);
}

#[test]
fn test_destroying_trial_destroys_nsd() {
    let mut s = stage();
    let (a, _rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    let nsd = s
        .engine
        .new_nsd(trial, Some(a), NsdOptions::default())
        .unwrap();

    s.engine.destroy(trial).unwrap();
    assert!(!s.engine.is_live(nsd));
    assert!(!s.engine.is_live(trial));
    assert_eq!(s.engine.check_structure(), Ok(()));
}

#[test]
fn test_nsd_autoadds_new_trial_players() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    let options = GameOptions::trial().with_autoadd_minigame_on_player_added(true);
    let trial = s.engine.new_trial(s.hub, Some(a), options).unwrap();
    let nsd = s
        .engine
        .new_nsd(trial, Some(a), NsdOptions::default())
        .unwrap();
    assert!(s.engine.minigame_trial(nsd).is_some());

    s.engine.add_player(trial, b).unwrap();
    assert!(s.engine.is_player(nsd, b));
}

#[test]
fn test_nsd_creation_autoadds_trial_players_in_area() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, _rb) = join(&mut s.engine);
    let (watcher, _rw) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.add_player(trial, b).unwrap();

    let options = NsdOptions::default().with_autoadd_on_creation_existing_users(true);
    let nsd = s.engine.new_nsd(trial, Some(a), options).unwrap();
    assert!(s.engine.is_player(nsd, b));
    assert!(!s.engine.is_player(nsd, watcher));
}

#[test]
fn test_nsd_player_leaving_area_leaves_both() {
    let mut s = stage();
    let (a, _ra) = join(&mut s.engine);
    let (b, mut rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.add_player(trial, b).unwrap();
    let nsd = s
        .engine
        .new_nsd(trial, Some(a), NsdOptions::default())
        .unwrap();
    s.engine.add_player(nsd, b).unwrap();
    drain(&mut rb);

    s.engine.change_area(b, s.court).unwrap();
    assert!(!s.engine.is_player(nsd, b));
    assert!(!s.engine.is_player(trial, b));
    assert!(s.engine.is_live(nsd));
    assert_eq!(s.engine.check_structure(), Ok(()));
}

#[test]
fn test_nsd_by_id_of_unknown_minigame_fails() {
    let mut s = stage();
    let (a, _rx) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    let err = s.engine.nsd_by_id(trial, "trial0g3").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ManagerInvalidGameId { .. }));
}
