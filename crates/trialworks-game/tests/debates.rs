//! Integration tests for nonstop debates driven by the engine clock.

mod common;

use std::time::Duration;

use common::{displayname, drain, join, oocs, stage, Stage};
use tokio::sync::mpsc::UnboundedReceiver;
use trialworks_game::{ErrorKind, GameOptions, Layer, NsdMode, NsdOptions, Rejection};
use trialworks_protocol::{ClientId, GameRef, IcMessage, Notification, PERJURY_BUTTON};

// =========================================================================
// Helpers
// =========================================================================

/// A trial led by `a` with `b` as a regular, and a debate both play in.
struct Debate {
    s: Stage,
    a: ClientId,
    ra: UnboundedReceiver<Notification>,
    b: ClientId,
    rb: UnboundedReceiver<Notification>,
    trial: GameRef,
    nsd: GameRef,
}

fn debate(options: NsdOptions) -> Debate {
    let mut s = stage();
    let (a, ra) = join(&mut s.engine);
    let (b, rb) = join(&mut s.engine);
    let trial = s
        .engine
        .new_trial(s.hub, Some(a), GameOptions::trial())
        .unwrap();
    s.engine.add_player(trial, b).unwrap();
    s.engine.add_leader(trial, a).unwrap();
    let nsd = s.engine.new_nsd(trial, Some(a), options).unwrap();
    s.engine.add_player(nsd, b).unwrap();
    s.engine.add_leader(nsd, a).unwrap();
    Debate {
        s,
        a,
        ra,
        b,
        rb,
        trial,
        nsd,
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn say(d: &mut Debate, who: ClientId, text: &str, button: u8) -> Result<(), Rejection> {
    d.s.engine
        .handle_ic_message(who, IcMessage::new(text).with_button(button))
}

fn refused(msg: &str) -> Result<(), Rejection> {
    Err(Rejection::Refused(msg.to_string()))
}

/// Records `first` from b and `second` from a.
fn record_two(d: &mut Debate) {
    d.s.engine.tick(secs(5));
    let (a, b) = (d.a, d.b);
    say(d, b, "first", 0).unwrap();
    say(d, a, "second", 0).unwrap();
}

/// Records two statements, pauses and starts looping.
fn looping(d: &mut Debate) {
    record_two(d);
    d.s.engine.set_intermission(d.nsd, true).unwrap();
    d.s.engine.set_looping(d.nsd).unwrap();
}

fn ic_texts(rx: &mut UnboundedReceiver<Notification>) -> Vec<String> {
    drain(rx)
        .into_iter()
        .filter_map(|n| match n {
            Notification::Ic { text, .. } => Some(text),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Recording
// =========================================================================

#[test]
fn test_new_nsd_starts_prerecording_locked() {
    let d = debate(NsdOptions::default());
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Prerecording);
    let state = d.s.engine.game(d.nsd).unwrap().nsd().unwrap();
    assert!(state.is_locked_out());
    assert_eq!(state.cursor(), -1);
    assert_eq!(state.timer_start_value(), 300.0);
}

#[test]
fn test_lockout_refuses_nonleader_message() {
    let mut d = debate(NsdOptions::default());
    let b = d.b;
    assert_eq!(
        say(&mut d, b, "too early", 0),
        refused("You may not send a message just after the current mode started.")
    );
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Prerecording);
}

#[test]
fn test_leader_may_speak_during_lockout() {
    let mut d = debate(NsdOptions::default());
    let a = d.a;
    say(&mut d, a, "opening", 0).unwrap();
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Recording);
}

#[test]
fn test_lockout_lifts_after_five_seconds() {
    let mut d = debate(NsdOptions::default());
    d.s.engine.tick(Duration::from_millis(4900));
    assert!(d.s.engine.game(d.nsd).unwrap().nsd().unwrap().is_locked_out());

    d.s.engine.tick(Duration::from_millis(100));
    assert!(!d.s.engine.game(d.nsd).unwrap().nsd().unwrap().is_locked_out());
    let b = d.b;
    say(&mut d, b, "now", 0).unwrap();
}

#[test]
fn test_first_message_starts_recording_and_countdown() {
    let mut d = debate(NsdOptions::default());
    d.s.engine.tick(secs(5));
    drain(&mut d.ra);
    drain(&mut d.rb);
    let b = d.b;
    say(&mut d, b, "first", 0).unwrap();

    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Recording);
    let messages = d.s.engine.nsd_messages(d.nsd).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, b);
    assert_eq!(messages[0].1.text, "first");

    let countdown = d.s.engine.game(d.nsd).unwrap().nsd().unwrap().countdown().unwrap();
    assert!(d.s.engine.timer(d.nsd, countdown).unwrap().is_running());
    assert!(drain(&mut d.rb).contains(&Notification::TimerResume { timer_id: 0 }));
    assert!(oocs(&mut d.ra).iter().any(|m| m.starts_with(
        "(X) Messages for your nonstop debate are now being recorded."
    )));
}

#[test]
fn test_bullet_before_any_statement_refused() {
    let mut d = debate(NsdOptions::default());
    d.s.engine.tick(secs(5));
    let b = d.b;
    assert_eq!(say(&mut d, b, "objection", 1), refused("You may not use a bullet now."));
}

#[test]
fn test_disallowed_button_refused() {
    let mut d = debate(NsdOptions::default());
    d.s.engine.tick(secs(5));
    let b = d.b;
    assert_eq!(
        say(&mut d, b, "hm", 4),
        refused("You may not perform that action during a nonstop debate.")
    );
}

#[test]
fn test_nonplayer_in_area_cannot_speak() {
    let mut d = debate(NsdOptions::default());
    let (watcher, _rw) = join(&mut d.s.engine);
    assert_eq!(
        say(&mut d, watcher, "hello", 0),
        refused("You are not a player of this nonstop debate.")
    );
}

#[test]
fn test_bullet_while_recording_breaks_debate() {
    let mut d = debate(NsdOptions::default());
    record_two(&mut d);
    let b = d.b;
    say(&mut d, b, "No, that's wrong!", 2).unwrap();

    assert_eq!(
        d.s.engine.nsd_mode(d.nsd).unwrap(),
        NsdMode::IntermissionPostbreak
    );
    assert_eq!(d.s.engine.nsd_breaker(d.nsd).unwrap(), Some(b));
    assert_eq!(d.s.engine.nsd_messages(d.nsd).unwrap().len(), 2);
}

// =========================================================================
// Mode transitions
// =========================================================================

#[test]
fn test_intermission_requires_a_started_debate() {
    let mut d = debate(NsdOptions::default());
    let err = d.s.engine.set_intermission(d.nsd, false).unwrap_err();
    assert_eq!(err.layer, Layer::NonStopDebate);
    assert_eq!(err.kind, ErrorKind::NsdNotInMode);
}

#[test]
fn test_intermission_twice_fails() {
    let mut d = debate(NsdOptions::default());
    record_two(&mut d);
    d.s.engine.set_intermission(d.nsd, false).unwrap();
    let err = d.s.engine.set_intermission(d.nsd, false).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NsdAlreadyInMode);
}

#[test]
fn test_looping_from_recording_fails() {
    let mut d = debate(NsdOptions::default());
    record_two(&mut d);
    let err = d.s.engine.set_looping(d.nsd).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NsdNotInMode);
}

#[test]
fn test_intermission_blankposts_and_pauses() {
    let mut d = debate(NsdOptions::default());
    record_two(&mut d);
    drain(&mut d.rb);
    d.s.engine.set_intermission(d.nsd, true).unwrap();

    let got = drain(&mut d.rb);
    assert!(got.contains(&Notification::TimerPause { timer_id: 0 }));
    assert!(got.contains(&Notification::IcBlankpost));
    let countdown = d.s.engine.game(d.nsd).unwrap().nsd().unwrap().countdown().unwrap();
    assert!(d.s.engine.timer(d.nsd, countdown).unwrap().is_paused());
}

#[test]
fn test_leader_message_in_intermission_does_not_resume() {
    let mut d = debate(NsdOptions::default());
    record_two(&mut d);
    d.s.engine.set_intermission(d.nsd, false).unwrap();
    let a = d.a;
    say(&mut d, a, "let's think", 0).unwrap();
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Intermission);
    assert_eq!(d.s.engine.nsd_messages(d.nsd).unwrap().len(), 2);
}

#[test]
fn test_resume_from_intermission_returns_to_prerecording() {
    let mut d = debate(NsdOptions::default());
    record_two(&mut d);
    d.s.engine.set_intermission(d.nsd, false).unwrap();
    assert_eq!(d.s.engine.resume(d.nsd).unwrap(), NsdMode::Prerecording);
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Prerecording);
    assert!(d.s.engine.game(d.nsd).unwrap().nsd().unwrap().is_locked_out());
}

#[test]
fn test_resume_outside_intermission_fails() {
    let mut d = debate(NsdOptions::default());
    let err = d.s.engine.resume(d.nsd).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NsdNotInMode);
}

// =========================================================================
// Looping
// =========================================================================

#[test]
fn test_looping_replays_statements_in_order() {
    let mut d = debate(NsdOptions::default());
    record_two(&mut d);
    d.s.engine.set_intermission(d.nsd, true).unwrap();
    drain(&mut d.rb);

    d.s.engine.set_looping(d.nsd).unwrap();
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Looping);
    assert_eq!(ic_texts(&mut d.rb), vec!["first".to_string()]);

    d.s.engine.tick(secs(6));
    assert!(ic_texts(&mut d.rb).is_empty());
    d.s.engine.tick(secs(1));
    assert_eq!(ic_texts(&mut d.rb), vec!["second".to_string()]);
}

#[test]
fn test_loop_end_returns_to_intermission() {
    let mut d = debate(NsdOptions::default());
    looping(&mut d);
    d.s.engine.tick(secs(7));
    drain(&mut d.rb);

    d.s.engine.tick(secs(7));
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Intermission);
    assert!(oocs(&mut d.rb).contains(&"A loop of your nonstop debate has finished.".to_string()));
    assert_eq!(d.s.engine.resume(d.nsd).unwrap(), NsdMode::Looping);
}

#[test]
fn test_plain_text_refused_while_looping() {
    let mut d = debate(NsdOptions::default());
    looping(&mut d);
    d.s.engine.tick(secs(5));
    let b = d.b;
    assert_eq!(
        say(&mut d, b, "um", 0),
        refused("You may not speak now except if using a bullet.")
    );
}

#[test]
fn test_looping_relocks_nonleaders() {
    let mut d = debate(NsdOptions::default());
    looping(&mut d);
    let b = d.b;
    assert_eq!(
        say(&mut d, b, "objection", 2),
        refused("You may not send a message just after the current mode started.")
    );
}

#[test]
fn test_bullet_breaks_loop_and_notifies() {
    let mut d = debate(NsdOptions::default());
    looping(&mut d);
    d.s.engine.tick(secs(5));
    drain(&mut d.ra);
    drain(&mut d.rb);

    let b = d.b;
    say(&mut d, b, "No, that's wrong!", 2).unwrap();
    assert_eq!(
        d.s.engine.nsd_mode(d.nsd).unwrap(),
        NsdMode::IntermissionPostbreak
    );
    assert_eq!(d.s.engine.nsd_breaker(d.nsd).unwrap(), Some(b));

    let own = oocs(&mut d.rb);
    assert!(own.contains(&"You countered your own statement `first` and halted the debate.".to_string()));
    let leader = oocs(&mut d.ra);
    let expected = format!(
        "{} countered their own statement `first` and halted the debate.",
        displayname(&d.s.engine, b)
    );
    assert!(leader.contains(&expected));
    assert!(leader.iter().any(|m| m.contains("/nsd_accept")));
}

#[test]
fn test_perjury_button_hidden_from_onlookers() {
    let mut d = debate(NsdOptions::default());
    let (watcher, mut rw) = join(&mut d.s.engine);
    looping(&mut d);
    d.s.engine.tick(secs(5));
    drain(&mut d.ra);
    drain(&mut d.rb);
    drain(&mut rw);

    let b = d.b;
    say(&mut d, b, "Lies!", PERJURY_BUTTON).unwrap();
    let button_seen = |rx: &mut UnboundedReceiver<Notification>| {
        drain(rx).into_iter().find_map(|n| match n {
            Notification::Ic { text, button, .. } if text == "Lies!" => Some(button),
            _ => None,
        })
    };
    assert_eq!(button_seen(&mut d.rb), Some(PERJURY_BUTTON));
    assert_eq!(button_seen(&mut d.ra), Some(PERJURY_BUTTON));
    assert_eq!(button_seen(&mut rw), Some(IcMessage::PERJURY_MASK));
    assert!(!d.s.engine.is_player(d.nsd, watcher));
}

// =========================================================================
// Break verdicts
// =========================================================================

#[test]
fn test_reject_break_costs_influence() {
    let mut d = debate(NsdOptions::default());
    looping(&mut d);
    d.s.engine.tick(secs(5));
    let b = d.b;
    say(&mut d, b, "No!", 2).unwrap();
    drain(&mut d.rb);

    assert!(d.s.engine.reject_break(d.nsd).unwrap());
    assert_eq!(d.s.engine.influence(d.trial, b).unwrap().value, 9.0);
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Intermission);
    assert_eq!(d.s.engine.nsd_breaker(d.nsd).unwrap(), None);
    assert!(oocs(&mut d.rb).contains(&"Your break was rejected and you lost 1 influence.".to_string()));

    let err = d.s.engine.reject_break(d.nsd).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NsdNotInMode);
}

#[test]
fn test_accept_break_rewards_and_ends_debate() {
    let mut d = debate(NsdOptions::default());
    let b = d.b;
    d.s.engine.set_influence(d.trial, b, 5.0).unwrap();
    looping(&mut d);
    d.s.engine.tick(secs(5));
    say(&mut d, b, "No!", 2).unwrap();

    assert!(d.s.engine.accept_break(d.nsd).unwrap());
    assert_eq!(d.s.engine.influence(d.trial, b).unwrap().value, 5.5);
    assert!(!d.s.engine.is_live(d.nsd));
    assert!(d.s.engine.is_live(d.trial));
}

#[test]
fn test_accept_break_after_breaker_left_rewards_nobody() {
    let mut d = debate(NsdOptions::default());
    looping(&mut d);
    d.s.engine.tick(secs(5));
    let b = d.b;
    say(&mut d, b, "No!", 2).unwrap();
    d.s.engine.remove_player(d.nsd, b).unwrap();

    assert!(!d.s.engine.accept_break(d.nsd).unwrap());
    assert_eq!(d.s.engine.influence(d.trial, b).unwrap().value, 10.0);
    assert!(!d.s.engine.is_live(d.nsd));
}

#[test]
fn test_resume_after_break_loops_again() {
    let mut d = debate(NsdOptions::default());
    looping(&mut d);
    d.s.engine.tick(secs(5));
    let b = d.b;
    say(&mut d, b, "No!", 2).unwrap();

    assert_eq!(d.s.engine.resume(d.nsd).unwrap(), NsdMode::Looping);
    assert_eq!(d.s.engine.game(d.nsd).unwrap().nsd().unwrap().cursor(), 0);
}

// =========================================================================
// Countdown
// =========================================================================

#[test]
fn test_countdown_runs_out() {
    let mut d = debate(NsdOptions::default().with_timer_start_value(10.0));
    d.s.engine.tick(secs(5));
    let b = d.b;
    say(&mut d, b, "first", 0).unwrap();
    drain(&mut d.ra);
    drain(&mut d.rb);

    d.s.engine.tick(secs(9));
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Recording);
    d.s.engine.tick(secs(1));
    assert_eq!(
        d.s.engine.nsd_mode(d.nsd).unwrap(),
        NsdMode::IntermissionTimeranout
    );
    assert!(oocs(&mut d.rb).contains(&"Time ran out for your debate!".to_string()));
    assert!(oocs(&mut d.ra).iter().any(|m| m.contains("/nsd_resume")));
}

#[test]
fn test_countdown_does_not_run_before_recording() {
    let mut d = debate(NsdOptions::default().with_timer_start_value(10.0));
    d.s.engine.tick(secs(30));
    assert_eq!(d.s.engine.nsd_mode(d.nsd).unwrap(), NsdMode::Prerecording);
}

#[test]
fn test_no_countdown_without_start_value() {
    let d = debate(NsdOptions::default().with_timer_start_value(0.0));
    let state = d.s.engine.game(d.nsd).unwrap().nsd().unwrap();
    assert!(state.countdown().is_none());
}

// =========================================================================
// Membership
// =========================================================================

#[test]
fn test_end_nsd_returns_players_to_trial() {
    let mut d = debate(NsdOptions::default());
    drain(&mut d.rb);
    d.s.engine.end_nsd(d.nsd).unwrap();

    assert!(!d.s.engine.is_live(d.nsd));
    assert!(d.s.engine.is_live(d.trial));
    assert!(drain(&mut d.rb).contains(&Notification::Gamemode {
        name: "trial".into()
    }));
}

#[test]
fn test_last_player_removed_ends_nsd() {
    let mut d = debate(NsdOptions::default());
    let (a, b) = (d.a, d.b);
    d.s.engine.remove_player(d.nsd, b).unwrap();
    assert!(d.s.engine.is_live(d.nsd));
    d.s.engine.remove_player(d.nsd, a).unwrap();
    assert!(!d.s.engine.is_live(d.nsd));
    assert!(d.s.engine.is_player(d.trial, a));
}

#[test]
fn test_disconnected_player_leaves_debate() {
    let mut d = debate(NsdOptions::default());
    let b = d.b;
    d.s.engine.disconnect_client(b).unwrap();
    assert!(!d.s.engine.is_player(d.nsd, b));
    assert!(!d.s.engine.is_player(d.trial, b));
    assert_eq!(d.s.engine.check_structure(), Ok(()));
}
