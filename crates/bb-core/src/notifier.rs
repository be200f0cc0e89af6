//! Distribution Notifier plumbing.
//!
//! The pipeline only ever talks to a [`Notifier`]. Whatever ships compiled
//! JSON to a platform extension, or refreshes a UI, subscribes behind it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::error::{panic_message, DistributionError};
use crate::events::Event;

/// Receiver of pipeline events.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &Event) -> Result<(), DistributionError>;
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, event: &Event) -> Result<(), DistributionError> {
        (**self).notify(event)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, event: &Event) -> Result<(), DistributionError> {
        (**self).notify(event)
    }
}

/// Hands `event` to `notifier`, absorbing errors and panics.
///
/// Returns `false` when delivery failed; the failure has already been
/// logged and there is no retry.
pub fn deliver(notifier: &dyn Notifier, event: &Event) -> bool {
    match try_notify(notifier, event) {
        Ok(()) => true,
        Err(e) => {
            match event.bundle_id() {
                Some(bundle_id) => log::error!("Error while setting content blocker {}: {}", bundle_id, e),
                None => log::error!("Error while publishing {}: {}", event.name(), e),
            }
            false
        }
    }
}

fn try_notify(notifier: &dyn Notifier, event: &Event) -> Result<(), DistributionError> {
    match panic::catch_unwind(AssertUnwindSafe(|| notifier.notify(event))) {
        Ok(result) => result,
        Err(payload) => Err(DistributionError::Panicked(panic_message(payload.as_ref()))),
    }
}

// =============================================================================
// Fan-out
// =============================================================================

/// Forwards every event to all registered subscribers.
///
/// A failing subscriber does not keep the others from seeing the event.
#[derive(Default)]
pub struct Broadcast {
    subscribers: Vec<Arc<dyn Notifier>>,
}

impl Broadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn Notifier>) {
        self.subscribers.push(subscriber);
    }

    pub fn with(mut self, subscriber: Arc<dyn Notifier>) -> Self {
        self.subscribe(subscriber);
        self
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl Notifier for Broadcast {
    fn notify(&self, event: &Event) -> Result<(), DistributionError> {
        let mut failed = 0usize;
        for subscriber in &self.subscribers {
            if let Err(e) = try_notify(subscriber.as_ref(), event) {
                log::warn!("Subscriber failed on {}: {}", event.name(), e);
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(DistributionError::Partial {
                failed,
                total: self.subscribers.len(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Recording
// =============================================================================

/// Keeps every event it receives. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|event| event.name() == name).count()
    }

    /// JSON handed to `bundle_id` by the most recent update request.
    pub fn bundle_json(&self, bundle_id: &str) -> Option<Vec<serde_json::Value>> {
        self.events().into_iter().rev().find_map(|event| match event {
            Event::BundleUpdateRequired { bundle_id: id, json } if id == bundle_id => Some(json),
            _ => None,
        })
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &Event) -> Result<(), DistributionError> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UpdateCycleResult;

    struct Failing;

    impl Notifier for Failing {
        fn notify(&self, _event: &Event) -> Result<(), DistributionError> {
            Err(DistributionError::Rejected("transport closed".to_string()))
        }
    }

    struct Panicking;

    impl Notifier for Panicking {
        fn notify(&self, _event: &Event) -> Result<(), DistributionError> {
            panic!("subscriber exploded");
        }
    }

    fn bundle_event() -> Event {
        Event::BundleUpdateRequired {
            bundle_id: "bundle.general".to_string(),
            json: Vec::new(),
        }
    }

    #[test]
    fn deliver_absorbs_errors_and_panics() {
        assert!(!deliver(&Failing, &bundle_event()));
        assert!(!deliver(&Panicking, &bundle_event()));

        let recorder = RecordingNotifier::new();
        assert!(deliver(&recorder, &bundle_event()));
        assert_eq!(recorder.count("BUNDLE_UPDATE_REQUIRED"), 1);
    }

    #[test]
    fn broadcast_isolates_failing_subscribers() {
        let first = Arc::new(RecordingNotifier::new());
        let last = Arc::new(RecordingNotifier::new());
        let broadcast = Broadcast::new()
            .with(first.clone())
            .with(Arc::new(Panicking))
            .with(Arc::new(Failing))
            .with(last.clone());
        assert_eq!(broadcast.len(), 4);

        let result = broadcast.notify(&Event::from(UpdateCycleResult::default()));
        assert!(matches!(result, Err(DistributionError::Partial { failed: 2, total: 4 })));
        assert_eq!(first.count("CYCLE_COMPLETE"), 1);
        assert_eq!(last.count("CYCLE_COMPLETE"), 1);
    }

    #[test]
    fn recorder_returns_latest_bundle_json() {
        let recorder = RecordingNotifier::new();
        recorder
            .notify(&Event::BundleUpdateRequired {
                bundle_id: "b".to_string(),
                json: vec![serde_json::json!(1)],
            })
            .unwrap();
        recorder
            .notify(&Event::BundleUpdateRequired {
                bundle_id: "b".to_string(),
                json: vec![serde_json::json!(2)],
            })
            .unwrap();

        assert_eq!(recorder.bundle_json("b"), Some(vec![serde_json::json!(2)]));
        assert_eq!(recorder.bundle_json("missing"), None);
        assert_eq!(recorder.take().len(), 2);
        assert!(recorder.events().is_empty());
    }
}
