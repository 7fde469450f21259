// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry capability.
//!
//! Components receive an `Arc<dyn Telemetry>` at construction and call
//! `record` fire-and-forget: the store write happens on a background task,
//! and a write failure is logged and dropped. Telemetry must never block or
//! fail production work.

use kokino_core::MetricRecord;
use kokino_storage::TelemetryStore;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sink for metric records.
pub trait Telemetry: Send + Sync + 'static {
    fn record(&self, record: MetricRecord);
}

/// Telemetry that appends to the [`TelemetryStore`] via a writer task.
pub struct StoreTelemetry {
    tx: mpsc::UnboundedSender<MetricRecord>,
}

impl StoreTelemetry {
    /// Spawn the writer task and return the capability handle.
    pub fn spawn(store: TelemetryStore) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<MetricRecord>();
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = store.append(&record) {
                    tracing::warn!(event = %record.event, error = %e, "telemetry write dropped");
                }
            }
        });
        Arc::new(Self { tx })
    }
}

impl Telemetry for StoreTelemetry {
    fn record(&self, record: MetricRecord) {
        // Receiver gone means shutdown; nothing to do.
        let _ = self.tx.send(record);
    }
}

/// Telemetry that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn record(&self, _record: MetricRecord) {}
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use recording::RecordingTelemetry;

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use super::Telemetry;
    use kokino_core::{MetricKind, MetricRecord};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recording double: keeps every record in memory.
    #[derive(Clone, Default)]
    pub struct RecordingTelemetry {
        records: Arc<Mutex<Vec<MetricRecord>>>,
    }

    impl RecordingTelemetry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn records(&self) -> Vec<MetricRecord> {
            self.records.lock().clone()
        }

        pub fn count_of(&self, kind: MetricKind) -> usize {
            self.records.lock().iter().filter(|r| r.event == kind).count()
        }

        pub fn last_of(&self, kind: MetricKind) -> Option<MetricRecord> {
            self.records
                .lock()
                .iter()
                .rev()
                .find(|r| r.event == kind)
                .cloned()
        }
    }

    impl Telemetry for RecordingTelemetry {
        fn record(&self, record: MetricRecord) {
            self.records.lock().push(record);
        }
    }
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
