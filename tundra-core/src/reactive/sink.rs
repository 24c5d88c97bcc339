//! Output sinks.
//!
//! An [`OutputSink`] is how a binding's state transitions leave the engine.
//! The runtime calls it in state order: `on_pending` at most once right after
//! a definition makes the binding pending, then exactly one of `on_fulfilled`
//! or `on_rejected` per settled generation. Stale results never reach it.
//! Calls for one binding never overlap because the runtime makes them from
//! its own `&mut self` methods.

use parking_lot::Mutex;

use crate::error::CellError;
use crate::value::Value;

/// Receiver of one binding's state transitions.
pub trait OutputSink: Send + Sync {
    fn on_pending(&self);
    fn on_fulfilled(&self, value: &Value);
    fn on_rejected(&self, error: &CellError);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn on_pending(&self) {}
    fn on_fulfilled(&self, _value: &Value) {}
    fn on_rejected(&self, _error: &CellError) {}
}

/// One reported transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Pending,
    Fulfilled(Value),
    Rejected(CellError),
}

impl SinkEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SinkEvent::Pending)
    }
}

/// A sink that keeps every event, for callers that poll.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far, oldest first.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn latest(&self) -> Option<SinkEvent> {
        self.events.lock().last().cloned()
    }

    /// Number of terminal reports received.
    pub fn settle_count(&self) -> usize {
        self.events.lock().iter().filter(|e| e.is_terminal()).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().push(event);
    }
}

impl OutputSink for RecordingSink {
    fn on_pending(&self) {
        self.push(SinkEvent::Pending);
    }

    fn on_fulfilled(&self, value: &Value) {
        self.push(SinkEvent::Fulfilled(value.clone()));
    }

    fn on_rejected(&self, error: &CellError) {
        self.push(SinkEvent::Rejected(error.clone()));
    }
}

/// A sink that forwards every event to a callback.
pub struct FnSink {
    callback: Box<dyn Fn(SinkEvent) + Send + Sync>,
}

impl FnSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(SinkEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl OutputSink for FnSink {
    fn on_pending(&self) {
        (self.callback)(SinkEvent::Pending);
    }

    fn on_fulfilled(&self, value: &Value) {
        (self.callback)(SinkEvent::Fulfilled(value.clone()));
    }

    fn on_rejected(&self, error: &CellError) {
        (self.callback)(SinkEvent::Rejected(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.on_pending();
        sink.on_fulfilled(&Value::Number(9.0));
        sink.on_pending();
        sink.on_rejected(&CellError::Thrown("boom".into()));

        assert_eq!(sink.events().len(), 4);
        assert_eq!(sink.settle_count(), 2);
        assert_eq!(
            sink.latest(),
            Some(SinkEvent::Rejected(CellError::Thrown("boom".into())))
        );

        sink.clear();
        assert_eq!(sink.latest(), None);
    }

    #[test]
    fn fn_sink_forwards() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sink = FnSink::new(move |event| {
            if event.is_terminal() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        sink.on_pending();
        sink.on_fulfilled(&Value::Null);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
