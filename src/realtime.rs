//! Realtime hub (C8, spec §4.8).
//!
//! In-process pub/sub adapted from the teacher's `tokio::sync::broadcast`
//! `WsServerEvent` fan-out (`src/main.rs` websocket broadcaster), but with
//! per-subscriber audience filtering and a bounded mpsc queue per
//! subscriber instead of one shared broadcast channel, since each
//! subscriber here needs its own filter state and an explicit `OVERFLOW`
//! marker on backpressure (spec §4.8) rather than broadcast's implicit lag.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::user::Role;

const MAX_SUBSCRIBERS: usize = 500;
const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Audience {
    pub broadcast: bool,
    #[serde(default)]
    pub user_ids: HashSet<Uuid>,
    #[serde(default)]
    pub roles: HashSet<Role>,
    #[serde(default)]
    pub agency_codes: HashSet<String>,
    #[serde(default)]
    pub mediator_codes: HashSet<String>,
    #[serde(default)]
    pub brand_codes: HashSet<String>,
    #[serde(default)]
    pub parent_codes: HashSet<String>,
}

impl Audience {
    pub fn broadcast() -> Self {
        Self { broadcast: true, ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RealtimeEvent {
    Ready,
    Overflow,
    Domain {
        #[serde(skip)]
        audience: Audience,
        ts: DateTime<Utc>,
        name: String,
        payload: Option<serde_json::Value>,
    },
}

/// What one subscriber uses to decide whether an event is theirs.
#[derive(Debug, Clone, Default)]
pub struct SubscriberIdentity {
    pub user_id: Option<Uuid>,
    pub role: Option<Role>,
    pub agency_code: Option<String>,
    pub mediator_code: Option<String>,
    pub brand_code: Option<String>,
    pub parent_code: Option<String>,
}

fn matches(audience: &Audience, identity: &SubscriberIdentity) -> bool {
    if audience.broadcast {
        return true;
    }
    if let Some(uid) = identity.user_id {
        if audience.user_ids.contains(&uid) {
            return true;
        }
    }
    if let Some(role) = identity.role {
        if audience.roles.contains(&role) {
            return true;
        }
    }
    if let Some(code) = &identity.agency_code {
        if audience.agency_codes.contains(code) {
            return true;
        }
    }
    if let Some(code) = &identity.mediator_code {
        if audience.mediator_codes.contains(code) {
            return true;
        }
    }
    if let Some(code) = &identity.brand_code {
        if audience.brand_codes.contains(code) {
            return true;
        }
    }
    if let Some(code) = &identity.parent_code {
        if audience.parent_codes.contains(code) {
            return true;
        }
    }
    false
}

struct Subscriber {
    identity: SubscriberIdentity,
    sender: mpsc::Sender<RealtimeEvent>,
}

/// The process-wide realtime fan-out hub. One instance lives in
/// `AppState`, initialized once at startup and torn down at shutdown
/// (spec §5 "global mutable state is limited to the realtime hub").
#[derive(Clone)]
pub struct RealtimeHub {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    subscriber_count: Arc<AtomicUsize>,
}

pub struct Subscription {
    pub receiver: mpsc::Receiver<RealtimeEvent>,
    hub: RealtimeHub,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.subscriber_count.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Registers a listener. Refused once `MAX_SUBSCRIBERS` is reached
    /// (spec §4.8).
    pub fn subscribe(&self, identity: SubscriberIdentity) -> Option<Subscription> {
        if self.subscriber_count.load(Ordering::SeqCst) >= MAX_SUBSCRIBERS {
            return None;
        }
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.lock().push(Subscriber { identity, sender: tx.clone() });
        self.subscriber_count.fetch_add(1, Ordering::SeqCst);
        let _ = tx.try_send(RealtimeEvent::Ready);
        Some(Subscription { receiver: rx, hub: self.clone() })
    }

    /// Delivers to every matching subscriber, preserving publish order
    /// per-subscriber. On a full queue, drops the event and best-effort
    /// enqueues an `OVERFLOW` marker rather than blocking the publisher.
    pub fn publish(&self, audience: Audience, name: impl Into<String>, payload: Option<serde_json::Value>) {
        let event = RealtimeEvent::Domain {
            audience: audience.clone(),
            ts: Utc::now(),
            name: name.into(),
            payload,
        };
        let subscribers = self.subscribers.lock();
        for sub in subscribers.iter() {
            if !matches(&audience, &sub.identity) {
                continue;
            }
            if sub.sender.try_send(event.clone()).is_err() {
                let _ = sub.sender.try_send(RealtimeEvent::Overflow);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let hub = RealtimeHub::new();
        let mut sub_a = hub.subscribe(SubscriberIdentity::default()).unwrap();
        let mut sub_b = hub.subscribe(SubscriberIdentity::default()).unwrap();

        assert!(matches!(sub_a.receiver.recv().await.unwrap(), RealtimeEvent::Ready));
        assert!(matches!(sub_b.receiver.recv().await.unwrap(), RealtimeEvent::Ready));

        hub.publish(Audience::broadcast(), "ORDER_CREATED", None);

        assert!(matches!(sub_a.receiver.recv().await.unwrap(), RealtimeEvent::Domain { .. }));
        assert!(matches!(sub_b.receiver.recv().await.unwrap(), RealtimeEvent::Domain { .. }));
    }

    #[tokio::test]
    async fn role_filtered_audience_skips_non_matching_subscriber() {
        let hub = RealtimeHub::new();
        let mut ops_sub = hub.subscribe(SubscriberIdentity {
            role: Some(Role::Ops),
            ..Default::default()
        }).unwrap();
        let mut buyer_sub = hub.subscribe(SubscriberIdentity {
            role: Some(Role::Buyer),
            ..Default::default()
        }).unwrap();

        ops_sub.receiver.recv().await.unwrap();
        buyer_sub.receiver.recv().await.unwrap();

        let mut audience = Audience::default();
        audience.roles.insert(Role::Ops);
        hub.publish(audience, "VELOCITY_LIMIT", None);

        assert!(matches!(ops_sub.receiver.recv().await.unwrap(), RealtimeEvent::Domain { .. }));
        assert!(buyer_sub.receiver.try_recv().is_err());
    }
}
