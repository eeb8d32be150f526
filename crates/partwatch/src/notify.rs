//! Completion events and the subscriber registry.
//!
//! The registry is owned by whatever transport accepts observers (see
//! [`crate::server`]) and handed to the watcher as a capability. Delivery is
//! best-effort: a subscriber whose channel is closed is dropped on the next
//! broadcast.

use crate::error::NotificationError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

/// Sent to observers after each processed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "analyzed", rename_all = "camelCase")]
pub struct AnalysisEvent {
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    #[serde(rename_all = "camelCase")]
    Sheets { sheet_names: Vec<String> },
    Failed { error: String },
}

impl AnalysisEvent {
    pub fn analyzed(file_name: impl Into<String>, sheet_names: Vec<String>) -> Self {
        Self {
            file_name: file_name.into(),
            outcome: AnalysisOutcome::Sheets { sheet_names },
        }
    }

    pub fn failed(file_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            outcome: AnalysisOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, NotificationError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

type Subscribers = HashMap<SubscriberId, mpsc::UnboundedSender<AnalysisEvent>>;

/// Process-wide set of live observers.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer and return the receiving end of its channel.
    pub fn add(&self) -> (SubscriberId, mpsc::UnboundedReceiver<AnalysisEvent>) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        debug!(subscriber = id.0, "Subscriber added");
        (id, rx)
    }

    pub fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = id.0, "Subscriber removed");
        }
        removed
    }

    /// Deliver `event` to every subscriber; unreachable ones are dropped.
    ///
    /// Returns the number of subscribers that accepted the event.
    pub fn broadcast(&self, event: &AnalysisEvent) -> usize {
        let mut subscribers = self.lock();
        let mut failed = Vec::new();

        for (id, tx) in subscribers.iter() {
            if tx.send(event.clone()).is_err() {
                failed.push(*id);
            }
        }

        for id in &failed {
            subscribers.remove(id);
            debug!(subscriber = id.0, "Dropping disconnected subscriber");
        }

        subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Poisoning is ignored: no critical section leaves the map inconsistent.
    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_event_shape() {
        let event = AnalysisEvent::analyzed("parts.xlsx", vec!["A".into(), "B".into()]);
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "analyzed",
                "fileName": "parts.xlsx",
                "sheetNames": ["A", "B"],
            })
        );
    }

    #[test]
    fn failure_event_shape() {
        let event = AnalysisEvent::failed("bad.xlsx", "not a zip");
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "analyzed",
                "fileName": "bad.xlsx",
                "error": "not a zip",
            })
        );
    }

    #[test]
    fn broadcast_reaches_all_live_subscribers() {
        let registry = SubscriberRegistry::new();
        let (_a, mut rx_a) = registry.add();
        let (_b, mut rx_b) = registry.add();

        let event = AnalysisEvent::analyzed("x.xlsx", vec![]);
        assert_eq!(registry.broadcast(&event), 2);
        assert_eq!(rx_a.try_recv().unwrap(), event);
        assert_eq!(rx_b.try_recv().unwrap(), event);
    }

    #[test]
    fn closed_subscribers_are_dropped() {
        let registry = SubscriberRegistry::new();
        let (_live, mut live_rx) = registry.add();
        let (_gone, gone_rx) = registry.add();
        drop(gone_rx);

        let delivered = registry.broadcast(&AnalysisEvent::failed("f.xlsx", "boom"));
        assert_eq!(delivered, 1);
        assert_eq!(registry.len(), 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let (id, _rx) = registry.add();
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
        assert_eq!(registry.broadcast(&AnalysisEvent::analyzed("f", vec![])), 0);
    }

    #[test]
    fn clones_share_state() {
        let registry = SubscriberRegistry::new();
        let handle = registry.clone();
        let (_id, _rx) = handle.add();
        assert_eq!(registry.len(), 1);
    }
}
