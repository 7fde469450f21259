// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast event bus.
//!
//! Producers publish lifecycle events; observers (the WebSocket stream, the
//! monitoring service) subscribe independently. The bus is the only edge
//! between monitoring and the stream, which keeps that dependency acyclic.
//! A slow subscriber lags and is told so; it never backpressures a
//! publisher.

use kokino_core::{Clock, Event};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default ring capacity per subscriber.
const DEFAULT_CAPACITY: usize = 1_024;

/// An event stamped at publish time.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub event: Event,
    pub timestamp_ms: i64,
}

/// Cloneable broadcast bus for lifecycle events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
    clock: Arc<dyn Clock>,
}

impl EventBus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, clock)
    }

    pub fn with_capacity(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, clock }
    }

    /// Publish an event. Never blocks; no subscribers is fine.
    pub fn publish(&self, event: Event) {
        let stamped = BusEvent {
            timestamp_ms: self.clock.now_ms(),
            event,
        };
        let _ = self.tx.send(stamped);
    }

    /// Subscribe from this point onward.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
