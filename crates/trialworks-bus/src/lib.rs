//! Synchronous publish/subscribe registry keyed by ids.
//!
//! Games react to things that happen to clients and areas (a client
//! disconnects, someone walks into an area, an area list is reloaded).
//! The bus records who listens to what; it never calls anyone itself.
//!
//! - A **source** is anything that publishes (a client, an area, …).
//! - A **listener** is anything that reacts (a game).
//! - A **topic** names the kind of event.
//!
//! Each listener has a *directory*: the set of topics it handles. A
//! publish asks the bus for [`EventBus::recipients`], which is a snapshot
//! of the source's subscribers, in subscription order, whose directory
//! contains the topic. Topics outside a listener's directory are ignored.
//!
//! Because recipients are a snapshot, the publisher must re-check
//! [`EventBus::is_subscribed`] before delivering to each one: an earlier
//! recipient may have unsubscribed or destroyed a later one.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use tracing::trace;

/// The id-based subscription registry.
///
/// Two indices are kept in step: source → subscribers (ordered) and
/// listener → sources. Every mutation updates both.
pub struct EventBus<S, L, T> {
    /// Subscribers of each source, in the order they subscribed.
    subscribers: HashMap<S, Vec<L>>,
    /// Sources each listener subscribed to.
    subscriptions: HashMap<L, Vec<S>>,
    /// Topics each listener handles.
    directories: HashMap<L, HashSet<T>>,
}

impl<S, L, T> EventBus<S, L, T>
where
    S: Copy + Eq + Hash + std::fmt::Debug,
    L: Copy + Eq + Hash + std::fmt::Debug,
    T: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
            subscriptions: HashMap::new(),
            directories: HashMap::new(),
        }
    }

    /// Replaces the topics `listener` handles.
    pub fn set_directory(&mut self, listener: L, topics: impl IntoIterator<Item = T>) {
        self.directories.insert(listener, topics.into_iter().collect());
    }

    /// Adds topics to `listener`'s directory.
    pub fn extend_directory(&mut self, listener: L, topics: impl IntoIterator<Item = T>) {
        self.directories.entry(listener).or_default().extend(topics);
    }

    pub fn handles(&self, listener: L, topic: T) -> bool {
        self.directories
            .get(&listener)
            .is_some_and(|topics| topics.contains(&topic))
    }

    /// Subscribes `listener` to `source`. Subscribing twice is a no-op.
    pub fn subscribe(&mut self, listener: L, source: S) {
        let subs = self.subscribers.entry(source).or_default();
        if subs.contains(&listener) {
            return;
        }
        subs.push(listener);
        self.subscriptions.entry(listener).or_default().push(source);
        trace!(?listener, ?source, "subscribed");
    }

    /// Removes one subscription. Unknown pairs are ignored.
    pub fn unsubscribe(&mut self, listener: L, source: S) {
        if let Some(subs) = self.subscribers.get_mut(&source) {
            subs.retain(|l| *l != listener);
            if subs.is_empty() {
                self.subscribers.remove(&source);
            }
        }
        if let Some(sources) = self.subscriptions.get_mut(&listener) {
            sources.retain(|s| *s != source);
            if sources.is_empty() {
                self.subscriptions.remove(&listener);
            }
        }
        trace!(?listener, ?source, "unsubscribed");
    }

    /// Drops every subscription of `listener` and forgets its directory.
    pub fn unsubscribe_all(&mut self, listener: L) {
        for source in self.subscriptions.remove(&listener).unwrap_or_default() {
            if let Some(subs) = self.subscribers.get_mut(&source) {
                subs.retain(|l| *l != listener);
                if subs.is_empty() {
                    self.subscribers.remove(&source);
                }
            }
        }
        self.directories.remove(&listener);
    }

    /// Forgets a source that no longer exists.
    pub fn drop_source(&mut self, source: S) {
        for listener in self.subscribers.remove(&source).unwrap_or_default() {
            if let Some(sources) = self.subscriptions.get_mut(&listener) {
                sources.retain(|s| *s != source);
                if sources.is_empty() {
                    self.subscriptions.remove(&listener);
                }
            }
        }
    }

    pub fn is_subscribed(&self, listener: L, source: S) -> bool {
        self.subscribers
            .get(&source)
            .is_some_and(|subs| subs.contains(&listener))
    }

    /// Subscribers of `source` in subscription order.
    pub fn subscribers(&self, source: S) -> &[L] {
        self.subscribers.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sources `listener` is subscribed to.
    pub fn subscriptions(&self, listener: L) -> &[S] {
        self.subscriptions.get(&listener).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Snapshot of who should receive `topic` from `source`.
    pub fn recipients(&self, source: S, topic: T) -> Vec<L> {
        self.subscribers(source)
            .iter()
            .copied()
            .filter(|l| self.handles(*l, topic))
            .collect()
    }
}

impl<S, L, T> Default for EventBus<S, L, T>
where
    S: Copy + Eq + Hash + std::fmt::Debug,
    L: Copy + Eq + Hash + std::fmt::Debug,
    T: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
