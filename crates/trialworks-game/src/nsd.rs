//! Nonstop debates.
//!
//! A debate records a sequence of statements, then replays them on a loop
//! while players try to break the loop with a bullet. All of its timing
//! lives in the owning game's [`TimerManager`], so the engine clock drives
//! it through [`Engine::tick`]:
//!
//! | timer     | range          | on boundary                         |
//! |-----------|----------------|-------------------------------------|
//! | countdown | start → 0      | time ran out                        |
//! | message   | 0 → 7, restart | show the next recorded statement    |
//! | refresh   | 0 → 5, restart | re-send the countdown to occupants  |
//! | lockout   | 0 → 5, restart | allow non-leader input again        |
//! | variant   | 0 → 0.1, once  | switch occupants to trial gamemode  |

use std::collections::BTreeSet;
use std::fmt;

use trialworks_protocol::{ClientId, GameRef, IcMessage, PERJURY_BUTTON};
use trialworks_tick::{Boundary, Timer, TimerError, TimerId, TimerManager, TimerSettings};

use crate::engine::{area_label, Engine};
use crate::game::timer_kind;
use crate::{ErrorKind, GameError, Layer, Rejection};

const MESSAGE_REFRESH_RATE: f64 = 7.0;
const PLAYER_REFRESH_RATE: f64 = 5.0;
const MODE_SWITCH_LOCKOUT: f64 = 5.0;
const GAMEMODE_VARIANT_DELAY: f64 = 0.1;

/// Client-side timer slot used for the countdown.
const CLIENT_TIMER_ID: u32 = 0;
const CLIENT_STEP_MILLIS: i64 = -16;
const CLIENT_INTERVAL_MILLIS: i64 = 16;

const ALLOWED_BUTTONS: [u8; 7] = [0, 1, 2, 3, 5, 7, 8];

const BREAK_CHOICES: &str = "(X) Type /nsd_accept to accept the break and end the debate, /nsd_reject to reject the break and penalize the breaker, /nsd_resume to resume the debate where it was, or /nsd_end to end the debate.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NsdMode {
    Prerecording,
    Recording,
    Looping,
    Intermission,
    IntermissionPostbreak,
    IntermissionTimeranout,
}

impl NsdMode {
    pub fn is_intermission(self) -> bool {
        matches!(
            self,
            Self::Intermission | Self::IntermissionPostbreak | Self::IntermissionTimeranout
        )
    }

    fn gamemode(self) -> &'static str {
        if self.is_intermission() {
            "trial"
        } else {
            "nsd"
        }
    }
}

impl fmt::Display for NsdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Prerecording => "prerecording",
            Self::Recording => "recording",
            Self::Looping => "looping",
            Self::Intermission => "intermission",
            Self::IntermissionPostbreak => "intermission (post-break)",
            Self::IntermissionTimeranout => "intermission (time ran out)",
        };
        f.write_str(s)
    }
}

/// What a bullet does to the statement it hits.
fn bullet_action(button: u8) -> Option<&'static str> {
    match button {
        1 => Some("consented with"),
        2 | 7 => Some("countered"),
        3 => Some("indicated they want to argue against"),
        5 => Some("indicated they got it after hearing"),
        8 => Some("committed perjury by countering"),
        _ => None,
    }
}

/// Debate state attached to a trial minigame.
#[derive(Debug, Clone)]
pub struct NonStopDebate {
    mode: NsdMode,
    preintermission_mode: NsdMode,
    messages: Vec<(ClientId, IcMessage)>,
    /// Index of the statement last shown or recorded; -1 before the first.
    cursor: isize,
    timer_start_value: f64,
    countdown: Option<TimerId>,
    message_timer: Option<TimerId>,
    refresh_timer: Option<TimerId>,
    lockout_timer: Option<TimerId>,
    variant_timers: BTreeSet<TimerId>,
    breaker: Option<ClientId>,
    timers_setup: bool,
    lockout_locked: bool,
    intermission_messages: u32,
}

impl NonStopDebate {
    pub(crate) fn new(timer_start_value: f64) -> Self {
        Self {
            mode: NsdMode::Prerecording,
            preintermission_mode: NsdMode::Prerecording,
            messages: Vec::new(),
            cursor: -1,
            timer_start_value,
            countdown: None,
            message_timer: None,
            refresh_timer: None,
            lockout_timer: None,
            variant_timers: BTreeSet::new(),
            breaker: None,
            timers_setup: false,
            lockout_locked: true,
            intermission_messages: 0,
        }
    }

    pub fn mode(&self) -> NsdMode {
        self.mode
    }

    pub fn preintermission_mode(&self) -> NsdMode {
        self.preintermission_mode
    }

    pub fn messages(&self) -> &[(ClientId, IcMessage)] {
        &self.messages
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    pub fn breaker(&self) -> Option<ClientId> {
        self.breaker
    }

    pub fn countdown(&self) -> Option<TimerId> {
        self.countdown
    }

    pub fn is_locked_out(&self) -> bool {
        self.lockout_locked
    }

    pub fn timer_start_value(&self) -> f64 {
        self.timer_start_value
    }
}

/// Which debate timer to touch.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Countdown,
    Message,
    Refresh,
    Lockout,
}

impl Slot {
    fn of(self, nsd: &NonStopDebate) -> Option<TimerId> {
        match self {
            Self::Countdown => nsd.countdown,
            Self::Message => nsd.message_timer,
            Self::Refresh => nsd.refresh_timer,
            Self::Lockout => nsd.lockout_timer,
        }
    }
}

// ---------------------------------------------------------------------------
// Public operations
// ---------------------------------------------------------------------------

impl Engine {
    pub fn nsd_mode(&self, nsd: GameRef) -> Result<NsdMode, GameError> {
        self.nsd_view(nsd).map(NonStopDebate::mode)
    }

    pub fn nsd_messages(&self, nsd: GameRef) -> Result<&[(ClientId, IcMessage)], GameError> {
        self.nsd_view(nsd).map(NonStopDebate::messages)
    }

    pub fn nsd_breaker(&self, nsd: GameRef) -> Result<Option<ClientId>, GameError> {
        self.nsd_view(nsd).map(NonStopDebate::breaker)
    }

    /// Goes back to waiting for the first statement of a new recording.
    pub fn set_prerecording(&mut self, nsd: GameRef) -> Result<(), GameError> {
        self.checked_as(Layer::NonStopDebate, |e| e.do_set_prerecording(nsd))
    }

    /// Starts replaying the recorded statements from the first one.
    pub fn set_looping(&mut self, nsd: GameRef) -> Result<(), GameError> {
        self.checked_as(Layer::NonStopDebate, |e| e.do_set_looping(nsd))
    }

    /// Pauses the debate. With `blankpost` every occupant's chat box is
    /// cleared.
    pub fn set_intermission(&mut self, nsd: GameRef, blankpost: bool) -> Result<(), GameError> {
        self.checked_as(Layer::NonStopDebate, |e| e.do_set_intermission(nsd, blankpost))
    }

    /// Leaves an intermission for the mode that preceded it and reports
    /// which one that was.
    pub fn resume(&mut self, nsd: GameRef) -> Result<NsdMode, GameError> {
        self.checked_as(Layer::NonStopDebate, |e| {
            let state = e.nsd_state(nsd)?;
            if !state.mode.is_intermission() {
                return Err(ErrorKind::NsdNotInMode);
            }
            if state.preintermission_mode == NsdMode::Looping {
                e.do_set_looping(nsd)?;
                Ok(NsdMode::Looping)
            } else {
                e.do_set_prerecording(nsd)?;
                Ok(NsdMode::Prerecording)
            }
        })
    }

    /// Accepts the last break: the breaker recovers half an influence point
    /// and the debate ends. Reports whether the breaker was still around.
    pub fn accept_break(&mut self, nsd: GameRef) -> Result<bool, GameError> {
        self.checked_as(Layer::NonStopDebate, |e| {
            let rewarded = e.settle_break(nsd, 0.5, "Your break was accepted and you recovered 0.5 influence.")?;
            e.do_destroy(nsd);
            Ok(rewarded)
        })
    }

    /// Rejects the last break: the breaker loses one influence point and
    /// the debate stays in intermission.
    pub fn reject_break(&mut self, nsd: GameRef) -> Result<bool, GameError> {
        self.checked_as(Layer::NonStopDebate, |e| {
            let penalized = e.settle_break(nsd, -1.0, "Your break was rejected and you lost 1 influence.")?;
            let state = e.nsd_state_mut(nsd)?;
            state.mode = NsdMode::Intermission;
            state.breaker = None;
            Ok(penalized)
        })
    }

    pub fn end_nsd(&mut self, nsd: GameRef) -> Result<(), GameError> {
        self.checked_as(Layer::NonStopDebate, |e| {
            e.nsd_state(nsd)?;
            e.do_destroy(nsd);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Mode transitions
// ---------------------------------------------------------------------------

impl Engine {
    pub(crate) fn attach_nsd(&mut self, key: GameRef, timer_start_value: f64) {
        if let Some(game) = self.games.get_mut(&key) {
            game.nsd = Some(NonStopDebate::new(timer_start_value));
            game.layer = game.derive_layer(Layer::NonStopDebate);
        }
    }

    pub(crate) fn nsd_setup_timers(&mut self, key: GameRef) -> Result<(), ErrorKind> {
        let (nsd, timers) = self.nsd_parts(key)?;
        if nsd.timers_setup {
            return Err(ErrorKind::TimersAlreadySetup);
        }
        nsd.timers_setup = true;
        let mut create = |settings: TimerSettings| timers.new_timer(settings).map_err(timer_kind);

        nsd.refresh_timer = Some(create(
            TimerSettings::counting_up(0.0, PLAYER_REFRESH_RATE).auto_restart(true),
        )?);
        nsd.message_timer = Some(create(
            TimerSettings::counting_up(0.0, MESSAGE_REFRESH_RATE).auto_restart(true),
        )?);
        let lockout = create(
            TimerSettings::counting_up(0.0, MODE_SWITCH_LOCKOUT).auto_restart(true),
        )?;
        nsd.lockout_timer = Some(lockout);
        if nsd.timer_start_value > 0.0 {
            nsd.countdown = Some(create(
                TimerSettings::countdown(nsd.timer_start_value).auto_destroy(false),
            )?);
        }
        timers
            .timer_mut(lockout)
            .and_then(Timer::unpause)
            .map_err(timer_kind)?;
        Ok(())
    }

    fn do_set_prerecording(&mut self, key: GameRef) -> Result<(), ErrorKind> {
        let state = self.nsd_state(key)?;
        if state.mode == NsdMode::Prerecording {
            return Err(ErrorKind::NsdAlreadyInMode);
        }
        if !state.mode.is_intermission() {
            return Err(ErrorKind::NsdNotInMode);
        }
        let state = self.nsd_state_mut(key)?;
        state.mode = NsdMode::Prerecording;
        state.preintermission_mode = NsdMode::Prerecording;
        self.nsd_relock(key);
        tracing::debug!(nsd = %key, "debate back to prerecording");
        for user in self.users_in_areas(key) {
            self.with_client(user, |c| c.send_gamemode("nsd"));
            self.nsd_send_current_timers(key, user);
        }
        Ok(())
    }

    fn do_set_recording(&mut self, key: GameRef) -> Result<(), ErrorKind> {
        let state = self.nsd_state_mut(key)?;
        if state.mode != NsdMode::Prerecording {
            return Err(ErrorKind::NsdNotInMode);
        }
        state.mode = NsdMode::Recording;
        state.preintermission_mode = NsdMode::Recording;
        self.nsd_resume_countdown(key);
        self.nsd_timer(key, Slot::Refresh, Timer::unpause);
        tracing::debug!(nsd = %key, "debate recording");
        for user in self.users_in_areas(key) {
            self.with_client(user, |c| {
                c.send_gamemode("nsd");
                c.send_timer_resume(CLIENT_TIMER_ID);
            });
            self.nsd_send_current_timers(key, user);
        }
        self.send_ooc_to(
            self.leaders(key),
            None,
            "(X) Messages for your nonstop debate are now being recorded. Once you are satisfied with the debate messages, you may pause the debate with /nsd_pause and then loop the debate with /nsd_loop.",
        );
        Ok(())
    }

    fn do_set_intermission(&mut self, key: GameRef, blankpost: bool) -> Result<(), ErrorKind> {
        let state = self.nsd_state(key)?;
        if state.mode.is_intermission() {
            return Err(ErrorKind::NsdAlreadyInMode);
        }
        if state.mode == NsdMode::Prerecording {
            return Err(ErrorKind::NsdNotInMode);
        }
        self.nsd_state_mut(key)?.mode = NsdMode::Intermission;
        self.nsd_timer(key, Slot::Countdown, Timer::pause);
        self.nsd_timer(key, Slot::Message, Timer::pause);
        self.nsd_timer(key, Slot::Refresh, Timer::pause);
        self.nsd_relock(key);
        for user in self.users_in_areas(key) {
            self.with_client(user, |c| c.send_timer_pause(CLIENT_TIMER_ID));
            self.nsd_send_current_timers(key, user);
            if blankpost {
                self.with_client(user, |c| c.send_ic_blankpost());
            }
        }

        let (nsd, timers) = self.nsd_parts(key)?;
        let variant = timers
            .new_timer(TimerSettings::counting_up(0.0, GAMEMODE_VARIANT_DELAY))
            .and_then(|id| timers.timer_mut(id).and_then(Timer::start).map(|_| id));
        match variant {
            Ok(id) => {
                nsd.variant_timers.insert(id);
            }
            Err(err) => tracing::debug!(nsd = %key, %err, "gamemode variant timer skipped"),
        }
        nsd.intermission_messages = 0;
        tracing::debug!(nsd = %key, "debate in intermission");
        Ok(())
    }

    fn do_set_intermission_postbreak(
        &mut self,
        key: GameRef,
        breaker: ClientId,
        blankpost: bool,
    ) -> Result<(), ErrorKind> {
        self.do_set_intermission(key, blankpost)?;
        let state = self.nsd_state_mut(key)?;
        state.mode = NsdMode::IntermissionPostbreak;
        state.breaker = Some(breaker);
        Ok(())
    }

    fn do_set_intermission_timeranout(&mut self, key: GameRef) -> Result<(), ErrorKind> {
        self.do_set_intermission(key, true)?;
        self.nsd_state_mut(key)?.mode = NsdMode::IntermissionTimeranout;
        self.send_ooc_to(
            self.nonplayer_users_in_areas(key),
            None,
            "Time ran out for the debate you are watching!",
        );
        self.send_ooc_to(self.players(key), None, "Time ran out for your debate!");
        self.send_ooc_to(
            self.leaders(key),
            None,
            "(X) Type /nsd_resume to resume the debate where it was nonetheless, or /nsd_end to end the debate.",
        );
        Ok(())
    }

    fn do_set_looping(&mut self, key: GameRef) -> Result<(), ErrorKind> {
        let state = self.nsd_state(key)?;
        if state.mode == NsdMode::Looping {
            return Err(ErrorKind::NsdAlreadyInMode);
        }
        if !state.mode.is_intermission() {
            return Err(ErrorKind::NsdNotInMode);
        }
        if state.messages.is_empty() {
            return Err(ErrorKind::NsdNoMessages);
        }
        let state = self.nsd_state_mut(key)?;
        state.mode = NsdMode::Looping;
        state.preintermission_mode = NsdMode::Looping;
        state.cursor = -1;
        self.nsd_relock(key);
        self.nsd_resume_countdown(key);
        for user in self.users_in_areas(key) {
            self.with_client(user, |c| {
                c.send_gamemode("nsd");
                c.send_timer_resume(CLIENT_TIMER_ID);
            });
        }
        tracing::debug!(nsd = %key, "debate looping");
        self.nsd_display_next(key);
        self.nsd_timer(key, Slot::Refresh, Timer::unpause);
        self.nsd_timer(key, Slot::Message, |t| Ok(t.set_time(0.0)));
        self.nsd_timer(key, Slot::Message, Timer::unpause);
        Ok(())
    }

    /// Shows the next statement, or ends the loop after the last one.
    fn nsd_display_next(&mut self, key: GameRef) {
        let Ok(state) = self.nsd_state(key) else {
            return;
        };
        let next = state.cursor + 1;
        let upcoming = usize::try_from(next)
            .ok()
            .and_then(|i| state.messages.get(i))
            .cloned();
        if let Some((sender, message)) = upcoming {
            if let Ok(state) = self.nsd_state_mut(key) {
                state.cursor = next;
            }
            for user in self.users_in_areas(key) {
                self.with_client(user, |c| c.send_ic(sender, &message));
            }
            tracing::info!(
                nsd = %key,
                area = %area_label(self.area_of(sender)),
                client = %sender,
                text = %message.text,
                "debate statement replayed"
            );
            return;
        }

        self.send_ooc_to(
            self.nonplayer_users_in_areas(key),
            None,
            "A loop of the nonstop debate you are watching has finished.",
        );
        self.send_ooc_to(self.players(key), None, "A loop of your nonstop debate has finished.");
        self.send_ooc_to(
            self.leaders(key),
            None,
            "(X) Type /nsd_loop to loop the debate again, or /nsd_end to end the debate.",
        );
        if let Err(kind) = self.do_set_intermission(key, true) {
            tracing::debug!(nsd = %key, %kind, "loop end without intermission");
        }
    }

    fn nsd_add_message(&mut self, key: GameRef, player: ClientId, message: &IcMessage) {
        if let Ok(state) = self.nsd_state_mut(key) {
            state.messages.push((player, message.clone()));
            state.cursor += 1;
        }
        let paused = self
            .nsd_timer_ref(key, Slot::Countdown)
            .is_some_and(Timer::is_paused);
        if paused {
            self.nsd_timer(key, Slot::Countdown, Timer::unpause);
            for user in self.users_in_areas(key) {
                self.with_client(user, |c| c.send_timer_resume(CLIENT_TIMER_ID));
            }
        }
    }

    /// A bullet hit the statement under the cursor.
    fn nsd_break_loop(&mut self, key: GameRef, player: ClientId, message: &IcMessage) {
        let Ok(state) = self.nsd_state(key) else {
            return;
        };
        let Some((broken_player, broken)) = usize::try_from(state.cursor)
            .ok()
            .and_then(|i| state.messages.get(i))
            .cloned()
        else {
            return;
        };
        let Some(action) = bullet_action(message.button) else {
            return;
        };
        let regular_action = if message.button == PERJURY_BUTTON {
            "countered"
        } else {
            action
        };
        let you_action = action.replace(" they ", " you ");
        let text = &broken.text;
        let breaker_name = self.displayname(player);
        let broken_name = self.displayname(broken_player);
        let whose = |viewer: ClientId| {
            if broken_player == viewer {
                "your statement".to_string()
            } else if broken_player == player {
                "their own statement".to_string()
            } else {
                format!("{broken_name}'s statement")
            }
        };

        if broken_player == player {
            self.send_ooc(
                player,
                &format!("You {you_action} your own statement `{text}` and halted the debate."),
            );
        } else {
            self.send_ooc(
                player,
                &format!("You {you_action} {broken_name}'s statement `{text}` and halted the debate."),
            );
        }
        let leaders = self.leaders(key);
        for user in self.users_in_areas(key) {
            if !leaders.contains(&user) {
                continue;
            }
            if user != player {
                self.send_ooc(
                    user,
                    &format!("{breaker_name} {action} {} `{text}` and halted the debate.", whose(user)),
                );
            }
            self.send_ooc(user, BREAK_CHOICES);
        }
        for user in self.nonleader_users_in_areas(key) {
            if user != player {
                self.send_ooc(
                    user,
                    &format!("{breaker_name} {regular_action} {} `{text}` and halted the debate.", whose(user)),
                );
            }
        }
        tracing::info!(nsd = %key, breaker = %player, button = message.button, "debate loop broken");
        if let Err(kind) = self.do_set_intermission_postbreak(key, player, false) {
            tracing::debug!(nsd = %key, %kind, "break without intermission");
        }
    }

    /// Applies a break verdict to the breaker's trial influence.
    fn settle_break(&mut self, key: GameRef, delta: f64, notice: &str) -> Result<bool, ErrorKind> {
        let state = self.nsd_state(key)?;
        if state.mode != NsdMode::IntermissionPostbreak {
            return Err(ErrorKind::NsdNotInMode);
        }
        let present = state
            .breaker
            .filter(|b| self.world.clients.contains(*b) && self.is_player(key, *b));
        let Some(breaker) = present else {
            return Ok(false);
        };
        self.send_ooc(breaker, notice);
        if let Some(trial) = self.minigame_trial(key) {
            let result = self.trial_change_influence(trial, breaker, delta);
            self.cascade(result, "settling debate break");
        }
        Ok(true)
    }

    fn nsd_relock(&mut self, key: GameRef) {
        if let Ok(state) = self.nsd_state_mut(key) {
            state.lockout_locked = true;
        }
        self.nsd_timer(key, Slot::Lockout, |t| Ok(t.set_time(0.0)));
        self.nsd_timer(key, Slot::Lockout, Timer::unpause);
    }

    fn nsd_resume_countdown(&mut self, key: GameRef) {
        let live = self
            .nsd_timer_ref(key, Slot::Countdown)
            .is_some_and(|t| !t.is_terminated());
        if live {
            self.nsd_timer(key, Slot::Countdown, Timer::unpause);
        }
    }
}

// ---------------------------------------------------------------------------
// Input and event handlers
// ---------------------------------------------------------------------------

impl Engine {
    /// Acceptance rules for a statement from one of the debate's players.
    pub(crate) fn nsd_check_message(
        &self,
        key: GameRef,
        sender: ClientId,
        message: &mut IcMessage,
    ) -> Result<(), Rejection> {
        let Some(game) = self.games.get(&key) else {
            return Ok(());
        };
        let Some(state) = game.nsd.as_ref() else {
            return Ok(());
        };
        if state.lockout_locked && !game.is_leader(sender) {
            return Err(Rejection::refused(
                "You may not send a message just after the current mode started.",
            ));
        }
        if !ALLOWED_BUTTONS.contains(&message.button) {
            return Err(Rejection::refused(
                "You may not perform that action during a nonstop debate.",
            ));
        }
        if message.button > 0 && state.cursor == -1 {
            return Err(Rejection::refused("You may not use a bullet now."));
        }
        if message.button == 0 && state.mode == NsdMode::Looping {
            return Err(Rejection::refused(
                "You may not speak now except if using a bullet.",
            ));
        }
        if message.button == PERJURY_BUTTON {
            let mut viewers = game.leaders().clone();
            viewers.insert(sender);
            message.perjury_viewers = Some(viewers);
        }
        Ok(())
    }

    pub(crate) fn nsd_on_ms_final(&mut self, key: GameRef, player: ClientId, message: &IcMessage) {
        let Ok(state) = self.nsd_state(key) else {
            return;
        };
        if state.mode == NsdMode::Prerecording {
            let result = self.do_set_recording(key);
            self.cascade(result, "starting debate recording");
        }
        let Ok(mode) = self.nsd_state(key).map(NonStopDebate::mode) else {
            return;
        };
        match mode {
            NsdMode::Recording if message.button > 0 => self.nsd_break_loop(key, player, message),
            NsdMode::Recording => self.nsd_add_message(key, player, message),
            NsdMode::Looping => self.nsd_break_loop(key, player, message),
            NsdMode::Prerecording => {}
            mode => {
                let Ok(state) = self.nsd_state_mut(key) else {
                    return;
                };
                state.intermission_messages += 1;
                if state.intermission_messages % 20 != 0 && message.button == 0 {
                    return;
                }
                state.intermission_messages = 0;
                let reminder = match mode {
                    NsdMode::IntermissionPostbreak => "(X) Your nonstop debate is still in intermission mode after a break. Type /nsd_accept to accept the break and end the debate, /nsd_reject to reject the break and penalize the breaker, /nsd_resume to resume the debate where it was, or /nsd_end to end the debate.",
                    NsdMode::IntermissionTimeranout => "(X) Your nonstop debate is still in intermission mode after time ran out. Type /nsd_resume to resume the debate where it was nonetheless, or /nsd_end to end the debate.",
                    _ => "(X) Your nonstop debate is still in intermission mode. Type /nsd_resume to resume the debate where it was nonetheless, or /nsd_end to end the debate.",
                };
                self.send_ooc_to(self.leaders(key), None, reminder);
            }
        }
    }

    pub(crate) fn nsd_on_timer(&mut self, key: GameRef, timer: TimerId, boundary: Boundary) {
        let Ok(state) = self.nsd_state(key) else {
            return;
        };
        let fired = [Slot::Countdown, Slot::Message, Slot::Refresh, Slot::Lockout]
            .into_iter()
            .find(|slot| slot.of(state) == Some(timer));
        let variant = state.variant_timers.contains(&timer);
        match fired {
            Some(Slot::Countdown) if boundary == Boundary::Min => {
                if let Err(kind) = self.do_set_intermission_timeranout(key) {
                    tracing::debug!(nsd = %key, %kind, "countdown ended outside a running debate");
                }
            }
            Some(Slot::Countdown) => {}
            Some(Slot::Message) => self.nsd_display_next(key),
            Some(Slot::Refresh) => {
                for user in self.users_in_areas(key) {
                    self.nsd_send_current_timers(key, user);
                }
            }
            Some(Slot::Lockout) => {
                if let Ok(state) = self.nsd_state_mut(key) {
                    state.lockout_locked = false;
                }
                self.nsd_timer(key, Slot::Lockout, Timer::pause);
            }
            None if variant => {
                if let Ok(state) = self.nsd_state_mut(key) {
                    state.variant_timers.remove(&timer);
                }
                for user in self.users_in_areas(key) {
                    self.with_client(user, |c| c.send_gamemode("trial"));
                }
            }
            None => {}
        }
    }

    pub(crate) fn nsd_introduce(&self, key: GameRef, user: ClientId) {
        let Ok(state) = self.nsd_state(key) else {
            return;
        };
        let running = self
            .nsd_timer_ref(key, Slot::Countdown)
            .is_some_and(Timer::is_running);
        self.with_client(user, |c| {
            c.send_gamemode(state.mode.gamemode());
            c.send_splash("testimony4");
            if running {
                c.send_timer_resume(CLIENT_TIMER_ID);
            } else {
                c.send_timer_pause(CLIENT_TIMER_ID);
            }
        });
        self.nsd_send_current_timers(key, user);
    }

    pub(crate) fn nsd_dismiss(&self, key: GameRef, user: ClientId) {
        let Some(game) = self.games.get(&key) else {
            return;
        };
        if !game.group.ever_had_players() {
            return;
        }
        let area = self.area_of(user);
        if area.is_some_and(|a| game.has_area(a)) {
            return;
        }
        let in_trial = match (area, game.minigame) {
            (Some(a), Some(binding)) => self.has_area(binding.trial, a),
            _ => false,
        };
        self.with_client(user, |c| {
            c.send_gamemode(if in_trial { "trial" } else { "" });
            c.send_timer_pause(CLIENT_TIMER_ID);
            c.send_timer_set_time(CLIENT_TIMER_ID, 0);
            c.send_timer_set_step_length(CLIENT_TIMER_ID, 0);
            c.send_timer_set_firing_interval(CLIENT_TIMER_ID, 0);
        });
    }

    fn nsd_announce_if_ended(
        &self,
        key: GameRef,
        nid: &str,
        client: ClientId,
        nonplayers: &BTreeSet<ClientId>,
        tell_client: bool,
    ) {
        if self.is_live(key) {
            return;
        }
        if tell_client {
            self.send_ooc(
                client,
                &format!("Your nonstop debate `{nid}` was automatically ended as it lost all its players."),
            );
        }
        self.send_ooc_staff(
            |c| c == client || nonplayers.contains(&c),
            &format!("(X) Nonstop debate `{nid}` was automatically ended as it lost all its players."),
        );
        self.send_ooc_watchers(
            nonplayers,
            Some(client),
            "The nonstop debate you were watching was automatically ended as it lost all its players.",
        );
    }

    pub(crate) fn nsd_on_change_character(
        &mut self,
        key: GameRef,
        client: ClientId,
        old_char_name: &str,
    ) {
        let Some(game) = self.games.get(&key) else {
            return;
        };
        let Some(c) = self.client(client) else {
            return;
        };
        let leaders = game.leaders().clone();
        let nid = game.id.to_string();
        if game.require_participant_character && !c.has_participant_character() {
            self.send_ooc(
                client,
                "You were removed from your NSD as it required its players to have participant characters.",
            );
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {} changed character from {old_char_name} to a non-participant character and was thus removed from your NSD.", client.0),
            );
            let nonplayers = self.nonplayer_users_in_areas(key);
            let result = self.do_remove_player(key, client);
            self.best_effort(result);
            self.nsd_announce_if_ended(key, &nid, client, &nonplayers, true);
        } else {
            let char_name = c.char_name.clone();
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {} changed character from {old_char_name} to {char_name} in your NSD.", client.0),
            );
        }
    }

    pub(crate) fn nsd_on_client_destroyed(&mut self, key: GameRef, client: ClientId) {
        let Some(game) = self.games.get(&key) else {
            return;
        };
        if game.unmanaged || !game.is_player(client) {
            return;
        }
        let nid = game.id.to_string();
        self.send_ooc_to(
            game.leaders().clone(),
            Some(client),
            &format!(
                "(X) Player {} of your nonstop debate disconnected ({}).",
                self.displayname(client),
                area_label(self.area_of(client))
            ),
        );
        let nonplayers = self.nonplayer_users_in_areas(key);
        let result = self.do_remove_player(key, client);
        self.best_effort(result);
        self.nsd_announce_if_ended(key, &nid, client, &nonplayers, false);
    }

    pub(crate) fn nsd_on_left(
        &mut self,
        key: GameRef,
        area: trialworks_protocol::AreaId,
        client: ClientId,
        old_displayname: &str,
    ) {
        let Some(game) = self.games.get(&key) else {
            return;
        };
        let current = self.area_of(client);
        if current.is_some_and(|a| game.has_area(a)) {
            return;
        }
        let nid = game.id.to_string();
        let leaders = game.leaders().clone();
        let route = format!("{}->{}", area.0, area_label(current));
        if game.is_player(client) {
            self.send_ooc(
                client,
                &format!("You have left to an area not part of NSD `{nid}` and thus were automatically removed from the NSD."),
            );
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {old_displayname} [{}] has left to an area not part of your NSD and thus was automatically removed from it ({route}).", client.0),
            );
            let nonplayers = self.nonplayer_users_in_areas(key);
            let result = self.do_remove_player(key, client);
            self.cascade(result, "removing debate player that left");
            self.nsd_announce_if_ended(key, &nid, client, &nonplayers, true);
        } else {
            self.send_ooc(client, &format!("You have left to an area not part of NSD `{nid}`."));
            self.send_ooc_to(
                leaders,
                Some(client),
                &format!("(X) Player {old_displayname} [{}] has left to an area not part of your NSD ({route}).", client.0),
            );
            self.nsd_dismiss(key, client);
        }
    }

    pub(crate) fn nsd_on_entered(
        &mut self,
        key: GameRef,
        area: trialworks_protocol::AreaId,
        client: ClientId,
        old_area: Option<trialworks_protocol::AreaId>,
    ) {
        let Some(game) = self.games.get(&key) else {
            return;
        };
        if game.is_player(client) || old_area.is_some_and(|a| game.has_area(a)) {
            return;
        }
        let Some(c) = self.client(client) else {
            return;
        };
        let (name, is_staff, has_character) =
            (c.displayname.clone(), c.is_staff, c.has_participant_character());
        let nid = game.id.to_string();
        let leaders = game.leaders().clone();
        let in_trial = game.minigame.is_some_and(|b| self.is_player(b.trial, client));
        let require_character = game.require_participant_character;

        self.send_ooc(client, &format!("You have entered an area part of NSD `{nid}`."));
        self.send_ooc_to(
            leaders.iter().copied(),
            Some(client),
            &format!(
                "(X) Non-player {name} [{}] has entered an area part of your NSD ({}->{}).",
                client.0,
                area_label(old_area),
                area.0
            ),
        );
        let (own, for_leaders) = if !in_trial {
            (
                "You are not a player of the NSD of this trial. Join the trial first before trying to join the NSD.".to_string(),
                format!("(X) {name} is not a player of your trial. Add them to your trial first before attempting to add them to your NSD."),
            )
        } else if !require_character || has_character {
            (
                format!("Join this NSD with /nsd_join {nid}"),
                format!("(X) Add {name} to your NSD with /nsd_add {}", client.0),
            )
        } else {
            (
                format!("This NSD requires you have a participant character to join. Join this NSD with /nsd_join {nid} after choosing a participant character."),
                format!("(X) This NSD requires players have a participant character to join. Add {name} to your NSD with /nsd_add {} after they choose a participant character.", client.0),
            )
        };
        if is_staff {
            self.send_ooc(client, &own);
        }
        self.send_ooc_to(leaders, Some(client), &for_leaders);
        self.nsd_introduce(key, client);
    }

    pub(crate) fn nsd_on_areas_loaded(&mut self, key: GameRef) {
        self.send_ooc_to(
            self.nonleader_users_in_areas(key),
            None,
            "The nonstop debate you were watching was deleted due to an area list load.",
        );
        self.send_ooc_to(
            self.players(key),
            None,
            "Your nonstop debate was deleted due to an area list load.",
        );
        self.do_destroy(key);
    }

    // -- Plumbing --

    fn nsd_send_current_timers(&self, key: GameRef, user: ClientId) {
        let countdown = self.nsd_timer_ref(key, Slot::Countdown).map(Timer::value);
        self.with_client(user, |c| match countdown {
            Some(value) => {
                c.send_timer_set_time(CLIENT_TIMER_ID, (value * 1000.0).round() as i64);
                c.send_timer_set_step_length(CLIENT_TIMER_ID, CLIENT_STEP_MILLIS);
                c.send_timer_set_firing_interval(CLIENT_TIMER_ID, CLIENT_INTERVAL_MILLIS);
            }
            None => {
                c.send_timer_set_time(CLIENT_TIMER_ID, 0);
                c.send_timer_set_step_length(CLIENT_TIMER_ID, 0);
                c.send_timer_set_firing_interval(CLIENT_TIMER_ID, 0);
            }
        });
    }

    /// Runs `op` on a debate timer. Missing timers and state errors
    /// (pausing a paused timer and the like) are ignored.
    fn nsd_timer(
        &mut self,
        key: GameRef,
        slot: Slot,
        op: impl FnOnce(&mut Timer) -> Result<f64, TimerError>,
    ) {
        let Ok((nsd, timers)) = self.nsd_parts(key) else {
            return;
        };
        let Some(id) = slot.of(nsd) else {
            return;
        };
        if let Err(err) = timers.timer_mut(id).and_then(op) {
            tracing::trace!(nsd = %key, timer = %id, %err, "debate timer left as is");
        }
    }

    fn nsd_timer_ref(&self, key: GameRef, slot: Slot) -> Option<&Timer> {
        let game = self.games.get(&key)?;
        let id = slot.of(game.nsd.as_ref()?)?;
        game.timers.timer(id).ok()
    }

    fn nsd_view(&self, key: GameRef) -> Result<&NonStopDebate, GameError> {
        self.nsd_state(key)
            .map_err(|kind| GameError::new(Layer::NonStopDebate, kind))
    }

    pub(crate) fn nsd_state(&self, key: GameRef) -> Result<&NonStopDebate, ErrorKind> {
        self.live_game(key)?
            .nsd
            .as_ref()
            .ok_or(ErrorKind::MissingCapability {
                needed: Layer::NonStopDebate,
            })
    }

    fn nsd_state_mut(&mut self, key: GameRef) -> Result<&mut NonStopDebate, ErrorKind> {
        self.nsd_parts(key).map(|(nsd, _)| nsd)
    }

    fn nsd_parts(
        &mut self,
        key: GameRef,
    ) -> Result<(&mut NonStopDebate, &mut TimerManager), ErrorKind> {
        let game = self.live_game_mut(key)?;
        let nsd = game.nsd.as_mut().ok_or(ErrorKind::MissingCapability {
            needed: Layer::NonStopDebate,
        })?;
        Ok((nsd, &mut game.timers))
    }
}
