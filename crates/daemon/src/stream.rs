// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitor stream: lifecycle event fan-out to observers.
//!
//! Each subscriber owns a bounded frame queue; a full queue means the
//! subscriber is too slow and gets dropped (with a lag event) rather than
//! backpressuring publishers. Filters narrow by base event type and by the
//! agent ids appearing in the event data. Transport is elsewhere: this
//! module only speaks [`Frame`]s.

use kokino_core::{ClientId, Clock, Event, IdGen};
use kokino_engine::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Frames queued per subscriber before it counts as lagged.
const SUBSCRIBER_QUEUE: usize = 256;

/// Data keys that carry agent ids, for agent-filter matching.
const AGENT_KEYS: [&str; 4] = ["agent_id", "from_agent", "to_agent", "target_agent"];

/// One outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping,
    Close,
}

/// Per-subscriber filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    /// Match any of these agent ids; `None` matches all.
    #[serde(default)]
    pub agents: Option<HashSet<String>>,
    /// Match these event types (base type or full type); `None` matches all.
    #[serde(default)]
    pub types: Option<HashSet<String>>,
}

impl Filters {
    fn matches(&self, event_type: &str, data: &serde_json::Value) -> bool {
        if let Some(types) = &self.types {
            let base = event_type.split('.').next().unwrap_or(event_type);
            if !types.contains(event_type) && !types.contains(base) {
                return false;
            }
        }
        if let Some(agents) = &self.agents {
            let mentioned = AGENT_KEYS.iter().any(|key| {
                data.get(key)
                    .and_then(|v| v.as_str())
                    .is_some_and(|id| agents.contains(id))
            });
            if !mentioned {
                return false;
            }
        }
        true
    }
}

struct Subscriber {
    tx: mpsc::Sender<Frame>,
    filters: Filters,
}

/// WebSocket-facing event fan-out.
#[derive(Clone)]
pub struct MonitorStream {
    subscribers: Arc<Mutex<HashMap<ClientId, Subscriber>>>,
    bus: EventBus,
    ids: Arc<dyn IdGen>,
    clock: Arc<dyn Clock>,
}

impl MonitorStream {
    pub fn new(bus: EventBus, ids: Arc<dyn IdGen>, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            bus,
            ids,
            clock,
        }
    }

    /// Register a subscriber; it immediately receives a `connected` frame.
    pub fn add_subscriber(&self, tx: mpsc::Sender<Frame>) -> ClientId {
        let client_id = ClientId::new(self.ids.next());
        let hello = serde_json::json!({
            "type": "connected",
            "clientId": client_id,
            "timestamp": self.clock.now_ms(),
        });
        let _ = tx.try_send(Frame::Text(hello.to_string()));
        self.subscribers.lock().insert(
            client_id.clone(),
            Subscriber {
                tx,
                filters: Filters::default(),
            },
        );
        tracing::debug!(client_id = %client_id, "monitor subscriber connected");
        client_id
    }

    /// Replace a subscriber's filter set; confirms with `filter-updated`.
    pub fn set_filters(&self, client_id: &ClientId, filters: Filters) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(subscriber) = subscribers.get_mut(client_id) else {
            return false;
        };
        subscriber.filters = filters.clone();
        let confirm = serde_json::json!({
            "type": "filter-updated",
            "filters": filters,
            "timestamp": self.clock.now_ms(),
        });
        let _ = subscriber.tx.try_send(Frame::Text(confirm.to_string()));
        true
    }

    /// Drop one subscriber.
    pub fn remove_subscriber(&self, client_id: &ClientId) {
        if self.subscribers.lock().remove(client_id).is_some() {
            tracing::debug!(client_id = %client_id, "monitor subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Fan one event out to every matching subscriber.
    ///
    /// A subscriber whose queue is full or closed is dropped; the drop is
    /// announced on the bus as `monitor.subscriber_lagged`.
    pub fn broadcast(&self, event: &Event, timestamp_ms: i64) {
        let event_type = event.type_name();
        let mut data = match serde_json::to_value(event) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(other) => {
                tracing::debug!(event_type, ?other, "non-object event skipped");
                return;
            }
            Err(e) => {
                tracing::warn!(event_type, error = %e, "event serialization failed");
                return;
            }
        };
        data.remove("type");
        let data = serde_json::Value::Object(data);

        let frame = serde_json::json!({
            "type": event_type,
            "data": data.clone(),
            "timestamp": timestamp_ms,
        })
        .to_string();

        let mut dropped = Vec::new();
        {
            let subscribers = self.subscribers.lock();
            for (client_id, subscriber) in subscribers.iter() {
                if !subscriber.filters.matches(event_type, &data) {
                    continue;
                }
                if subscriber.tx.try_send(Frame::Text(frame.clone())).is_err() {
                    dropped.push(client_id.clone());
                }
            }
        }
        for client_id in dropped {
            tracing::warn!(client_id = %client_id, "subscriber lagged, dropping");
            self.remove_subscriber(&client_id);
            self.bus.publish(Event::SubscriberLagged { client_id });
        }
    }

    /// Ping all subscribers; drop the ones whose queue is gone.
    pub fn heartbeat(&self) {
        let mut dropped = Vec::new();
        {
            let subscribers = self.subscribers.lock();
            for (client_id, subscriber) in subscribers.iter() {
                if subscriber.tx.try_send(Frame::Ping).is_err() {
                    dropped.push(client_id.clone());
                }
            }
        }
        for client_id in dropped {
            self.remove_subscriber(&client_id);
        }
    }

    /// Tell everyone the daemon is going away, then drop them.
    pub fn shutdown(&self, message: &str) {
        let frame = serde_json::json!({
            "type": "shutdown",
            "message": message,
        })
        .to_string();
        let mut subscribers = self.subscribers.lock();
        for subscriber in subscribers.values() {
            let _ = subscriber.tx.try_send(Frame::Text(frame.clone()));
            let _ = subscriber.tx.try_send(Frame::Close);
        }
        subscribers.clear();
    }

    /// Pump bus events into the fan-out until the bus closes.
    ///
    /// Spawned once at startup; lag on the bus side is logged and skipped.
    pub async fn run(self) {
        let mut rx = self.bus.subscribe();
        loop {
            match rx.recv().await {
                Ok(bus_event) => self.broadcast(&bus_event.event, bus_event.timestamp_ms),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "monitor stream lagged behind the bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// The expected queue depth for new subscriber channels.
    pub fn queue_depth() -> usize {
        SUBSCRIBER_QUEUE
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
