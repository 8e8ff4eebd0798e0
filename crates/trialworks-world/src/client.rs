//! A connected client and its notification channel.
//!
//! A client is the server's record of one connection:
//! - WHO it is (`ClientId`, display name, staff flag)
//! - WHERE it stands (its current area, if it has entered one)
//! - WHAT it plays as (a character id, or `None` for a spectator)
//! - HOW to reach it (an unbounded channel of [`Notification`]s)

use tokio::sync::mpsc;
use trialworks_protocol::{
    AreaId, CharacterId, ClientId, HealthSide, IcMessage, Notification,
};

/// Channel for delivering notifications to a client's connection task.
///
/// Unbounded so that the game layer never awaits: notifications are
/// fire-and-forget, and a send to a closed channel is silently dropped.
pub type NotificationSender = mpsc::UnboundedSender<Notification>;

#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    /// Current area. `None` only between connecting and the first move.
    pub area: Option<AreaId>,
    /// `Some` ⇔ the client holds a participant character.
    pub character: Option<CharacterId>,
    /// Name of the held character (`""` for spectators).
    pub char_name: String,
    pub displayname: String,
    pub is_staff: bool,
    sender: Option<NotificationSender>,
}

impl Client {
    /// Creates a spectator that is not in any area yet.
    ///
    /// A client without a sender still works; notifications to it vanish.
    pub fn new(id: ClientId, sender: Option<NotificationSender>) -> Self {
        Self {
            id,
            area: None,
            character: None,
            char_name: String::new(),
            displayname: format!("Client {}", id.0),
            is_staff: false,
            sender,
        }
    }

    pub fn has_participant_character(&self) -> bool {
        self.character.is_some()
    }

    /// Sends a notification. Dropped silently if the connection is gone.
    pub fn notify(&self, notification: Notification) {
        if let Some(tx) = &self.sender {
            let _ = tx.send(notification);
        }
    }

    pub fn send_ooc(&self, message: impl Into<String>) {
        self.notify(Notification::Ooc {
            message: message.into(),
        });
    }

    pub fn send_gamemode(&self, name: &str) {
        self.notify(Notification::Gamemode { name: name.into() });
    }

    pub fn send_splash(&self, name: &str) {
        self.notify(Notification::Splash { name: name.into() });
    }

    /// Health bars are integral; fractional health is truncated.
    pub fn send_health(&self, side: HealthSide, value: f64) {
        self.notify(Notification::Health {
            side,
            value: value as i64,
        });
    }

    pub fn send_timer_resume(&self, timer_id: u32) {
        self.notify(Notification::TimerResume { timer_id });
    }

    pub fn send_timer_pause(&self, timer_id: u32) {
        self.notify(Notification::TimerPause { timer_id });
    }

    pub fn send_timer_set_time(&self, timer_id: u32, millis: i64) {
        self.notify(Notification::TimerSetTime { timer_id, millis });
    }

    pub fn send_timer_set_step_length(&self, timer_id: u32, millis: i64) {
        self.notify(Notification::TimerSetStepLength { timer_id, millis });
    }

    pub fn send_timer_set_firing_interval(&self, timer_id: u32, millis: i64) {
        self.notify(Notification::TimerSetFiringInterval { timer_id, millis });
    }

    /// Shows `message` as said by `sender`, with the button this client
    /// is allowed to see.
    pub fn send_ic(&self, sender: ClientId, message: &IcMessage) {
        self.notify(Notification::Ic {
            sender,
            showname: message.showname.clone(),
            text: message.text.clone(),
            button: message.button_for(self.id),
        });
    }

    pub fn send_ic_blankpost(&self) {
        self.notify(Notification::IcBlankpost);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn test_new_client_is_spectator_without_area() {
        let c = Client::new(ClientId(3), None);
        assert!(!c.has_participant_character());
        assert_eq!(c.area, None);
        assert_eq!(c.displayname, "Client 3");
    }

    #[test]
    fn test_notify_without_sender_is_noop() {
        let c = Client::new(ClientId(1), None);
        c.send_ooc("nobody hears this");
    }

    #[test]
    fn test_notify_after_receiver_dropped_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let c = Client::new(ClientId(1), Some(tx));
        drop(rx);
        c.send_splash("testimony1");
    }

    #[test]
    fn test_send_health_truncates() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let c = Client::new(ClientId(1), Some(tx));
        c.send_health(HealthSide::Influence, 9.5);
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::Health {
                side: HealthSide::Influence,
                value: 9
            }
        );
    }

    #[test]
    fn test_send_ic_applies_perjury_mask() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let viewer = Client::new(ClientId(5), Some(tx));
        let mut msg = IcMessage::new("no").with_button(8);
        msg.perjury_viewers = Some(BTreeSet::from([ClientId(1)]));

        viewer.send_ic(ClientId(1), &msg);
        match rx.try_recv().unwrap() {
            Notification::Ic { button, sender, .. } => {
                assert_eq!(button, 7);
                assert_eq!(sender, ClientId(1));
            }
            other => panic!("unexpected notification {other:?}"),
        }
    }
}
