//! Live event fanout to session and token channels.
//!
//! A [`Fanout`] keeps two independent registries, one keyed by session id and
//! one keyed by token id. Each key maps to the subscribers currently attached
//! to that channel; a key disappears as soon as its last subscriber leaves.
//!
//! ## Delivery
//!
//! [`Fanout::publish`] snapshots the subscribers of the target channels under
//! the lock, releases it, then calls each subscriber's deliver function in
//! turn. A failing subscriber is logged and skipped; it never affects other
//! subscribers or the publisher. Nothing is queued or retried.
//!
//! ## Example
//!
//! ```
//! use hookbin_core::events::Event;
//! use hookbin_core::fanout::{ChannelKind, Fanout, Subscriber};
//!
//! let fanout = Fanout::new();
//! let sub = fanout.subscribe(
//!     ChannelKind::Session,
//!     "session-1",
//!     Subscriber::new("conn-1", |msg: &str| {
//!         println!("{msg}");
//!         Ok(())
//!     }),
//! );
//!
//! let report = fanout.publish("session-1", &Event::TokenCleared {});
//! assert_eq!(report.session_deliveries, 1);
//!
//! sub.unsubscribe();
//! assert!(fanout.active_channels(ChannelKind::Session).is_empty());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::events::Event;

/// The two channel families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Every event of a session.
    Session,
    /// Request events of a single token.
    Token,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Session => "session",
            ChannelKind::Token => "token",
        }
    }
}

/// A subscriber failed to accept an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The subscriber's transport has gone away.
    #[error("subscriber disconnected")]
    Disconnected,

    /// The subscriber is not keeping up.
    #[error("subscriber buffer full")]
    Lagging,

    /// Any other transport failure.
    #[error("delivery failed: {0}")]
    Transport(String),
}

type DeliverFn = dyn Fn(&str) -> Result<(), DeliveryError> + Send + Sync;

/// A live stream attached to a channel.
#[derive(Clone)]
pub struct Subscriber {
    id: String,
    deliver: Arc<DeliverFn>,
}

impl Subscriber {
    /// Creates a subscriber with the given id and deliver function.
    ///
    /// The deliver function receives the serialized event envelope. It must
    /// not block; hand the message off to the transport and return.
    pub fn new<F>(id: impl Into<String>, deliver: F) -> Self
    where
        F: Fn(&str) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            deliver: Arc::new(deliver),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hands one serialized event to the transport.
    pub fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        (self.deliver)(message)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

/// Successful deliveries of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub session_deliveries: usize,
    pub token_deliveries: usize,
}

struct Registration {
    /// Distinguishes re-subscriptions under the same subscriber id.
    seq: u64,
    subscriber: Subscriber,
}

type Registry = HashMap<String, HashMap<String, Registration>>;

#[derive(Default)]
struct Channels {
    sessions: Registry,
    tokens: Registry,
}

impl Channels {
    fn registry(&self, kind: ChannelKind) -> &Registry {
        match kind {
            ChannelKind::Session => &self.sessions,
            ChannelKind::Token => &self.tokens,
        }
    }

    fn registry_mut(&mut self, kind: ChannelKind) -> &mut Registry {
        match kind {
            ChannelKind::Session => &mut self.sessions,
            ChannelKind::Token => &mut self.tokens,
        }
    }
}

#[derive(Default)]
struct Inner {
    channels: Mutex<Channels>,
    next_seq: AtomicU64,
}

impl Inner {
    fn remove(&self, kind: ChannelKind, key: &str, subscriber_id: &str, seq: u64) -> bool {
        let mut channels = self.channels.lock();
        let registry = channels.registry_mut(kind);

        let Some(subscribers) = registry.get_mut(key) else {
            return false;
        };

        let removed = match subscribers.get(subscriber_id) {
            Some(reg) if reg.seq == seq => subscribers.remove(subscriber_id).is_some(),
            _ => false,
        };

        if subscribers.is_empty() {
            registry.remove(key);
        }

        removed
    }
}

/// Subscriber registries for session and token channels.
///
/// Cloning is cheap and shares the registries.
#[derive(Clone, Default)]
pub struct Fanout {
    inner: Arc<Inner>,
}

impl fmt::Debug for Fanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.inner.channels.lock();
        f.debug_struct("Fanout")
            .field("session_channels", &channels.sessions.len())
            .field("token_channels", &channels.tokens.len())
            .finish()
    }
}

impl Fanout {
    /// Creates an empty fanout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a subscriber to a channel.
    ///
    /// Subscribing again with the same subscriber id replaces the previous
    /// entry; the older [`Subscription`] then no longer removes anything.
    pub fn subscribe(
        &self,
        kind: ChannelKind,
        key: impl Into<String>,
        subscriber: Subscriber,
    ) -> Subscription {
        let key = key.into();
        let subscriber_id = subscriber.id.clone();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);

        {
            let mut channels = self.inner.channels.lock();
            channels
                .registry_mut(kind)
                .entry(key.clone())
                .or_default()
                .insert(subscriber_id.clone(), Registration { seq, subscriber });
        }

        debug!(
            channel = kind.as_str(),
            key = %key,
            subscriber = %subscriber_id,
            "Subscriber attached"
        );

        Subscription {
            inner: Arc::downgrade(&self.inner),
            kind,
            key,
            subscriber_id,
            seq,
            active: AtomicBool::new(true),
        }
    }

    /// Publishes an event for a session.
    ///
    /// Always targets the session channel; request events also target the
    /// channel of their token.
    pub fn publish(&self, session_id: &str, event: &Event) -> PublishReport {
        let mut report = PublishReport::default();

        match event.session_envelope() {
            Ok(message) => {
                report.session_deliveries =
                    self.deliver(ChannelKind::Session, session_id, &message, event);
            }
            Err(e) => error!(event = event.event_type(), error = %e, "Failed to serialize event"),
        }

        if let Some(token) = event.token_channel() {
            match event.token_envelope(token) {
                Ok(message) => {
                    report.token_deliveries =
                        self.deliver(ChannelKind::Token, token, &message, event);
                }
                Err(e) => {
                    error!(event = event.event_type(), error = %e, "Failed to serialize event")
                }
            }
        }

        debug!(
            event = event.event_type(),
            session = %session_id,
            session_deliveries = report.session_deliveries,
            token_deliveries = report.token_deliveries,
            "Event published"
        );

        report
    }

    fn deliver(&self, kind: ChannelKind, key: &str, message: &str, event: &Event) -> usize {
        let snapshot = self.subscribers(kind, key);

        let mut delivered = 0;
        for subscriber in snapshot {
            match subscriber.deliver(message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    channel = kind.as_str(),
                    key = %key,
                    subscriber = %subscriber.id,
                    event = event.event_type(),
                    error = %e,
                    "Event delivery failed"
                ),
            }
        }
        delivered
    }

    /// Copies the current subscribers of a channel.
    fn subscribers(&self, kind: ChannelKind, key: &str) -> Vec<Subscriber> {
        let channels = self.inner.channels.lock();
        channels
            .registry(kind)
            .get(key)
            .map(|subs| subs.values().map(|r| r.subscriber.clone()).collect())
            .unwrap_or_default()
    }

    /// Lists the keys that currently have at least one subscriber.
    pub fn active_channels(&self, kind: ChannelKind) -> Vec<String> {
        let channels = self.inner.channels.lock();
        let mut keys: Vec<String> = channels.registry(kind).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of subscribers on one channel.
    pub fn subscriber_count(&self, kind: ChannelKind, key: &str) -> usize {
        let channels = self.inner.channels.lock();
        channels.registry(kind).get(key).map_or(0, HashMap::len)
    }
}

/// Handle for one registration made by [`Fanout::subscribe`].
///
/// Dropping the handle unsubscribes, so tying it to the transport's lifetime
/// removes the subscriber when the connection closes.
pub struct Subscription {
    inner: Weak<Inner>,
    kind: ChannelKind,
    key: String,
    subscriber_id: String,
    seq: u64,
    active: AtomicBool,
}

impl Subscription {
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    /// Removes this registration and prunes the channel if it is now empty.
    ///
    /// Only the first call has an effect.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.remove(self.kind, &self.key, &self.subscriber_id, self.seq) {
            debug!(
                channel = self.kind.as_str(),
                key = %self.key,
                subscriber = %self.subscriber_id,
                "Subscriber detached"
            );
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("subscriber_id", &self.subscriber_id)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}
