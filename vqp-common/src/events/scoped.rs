//! Capability-scoped, lifecycle-bound emitter façade
//!
//! Each player component talks to the bus through a [`ScopedEmitter`]
//! carrying the component's static [`Capabilities`] descriptor. Emitting
//! or listening outside the declared lists is a wiring error and fails
//! fast with a panic. All registrations made through one emitter are
//! removed when it is closed or dropped, so a destroyed component never
//! leaves dangling handlers behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

use super::{Details, Event, EventBus, Handler, SubscriptionId};

/// Static capability descriptor for one component variant.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Component name, used in violation messages.
    pub component: &'static str,
    /// Event types this component may emit.
    pub emits: &'static [&'static str],
    /// Event types this component may listen for.
    pub listens: &'static [&'static str],
}

/// Per-component façade over the [`EventBus`].
pub struct ScopedEmitter {
    bus: Arc<EventBus>,
    capabilities: Capabilities,
    registrations: Mutex<Vec<(String, SubscriptionId)>>,
    closed: AtomicBool,
}

impl ScopedEmitter {
    /// Create an emitter bound to `bus` with the given capability lists.
    pub fn new(bus: Arc<EventBus>, capabilities: Capabilities) -> Self {
        Self {
            bus,
            capabilities,
            registrations: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The underlying bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Register a handler; `event_type` must be in the listen list.
    pub fn subscribe(&self, event_type: &str, handler: Handler) -> SubscriptionId {
        self.assert_may_listen(event_type);
        let id = self.bus.subscribe(event_type, handler);
        self.track(event_type, id);
        id
    }

    /// Register an at-most-once handler; `event_type` must be in the
    /// listen list.
    pub fn subscribe_once(&self, event_type: &str, handler: Handler) -> SubscriptionId {
        self.assert_may_listen(event_type);
        let id = self.bus.subscribe_once(event_type, handler);
        self.track(event_type, id);
        id
    }

    /// Remove one of this emitter's registrations.
    pub fn unsubscribe(&self, event_type: &str, id: SubscriptionId) {
        self.bus.unsubscribe(event_type, id);
        self.registrations
            .lock()
            .expect("scoped emitter registrations poisoned")
            .retain(|(_, tracked)| *tracked != id);
    }

    /// Publish an event; `event_type` must be in the emit list.
    pub fn publish(&self, event_type: &str, details: Details) -> Arc<Event> {
        self.assert_may_emit(event_type);
        self.bus.publish(event_type, details)
    }

    /// Publish with a completion callback; `event_type` must be in the
    /// emit list.
    pub fn publish_then(
        &self,
        event_type: &str,
        details: Details,
        on_complete: impl FnOnce(&Event),
    ) -> Arc<Event> {
        self.assert_may_emit(event_type);
        self.bus.publish_then(event_type, details, on_complete)
    }

    /// Issue a correlated request; `event_type` must be in the emit list.
    pub fn request(
        &self,
        event_type: &str,
        details: Details,
        on_response: impl FnOnce(&Event) + Send + 'static,
    ) -> Uuid {
        self.assert_may_emit(event_type);
        self.bus.request(event_type, details, on_response)
    }

    /// Respond to a correlated request; `event_type` must be in the emit
    /// list.
    pub fn respond(&self, original: &Event, event_type: &str, details: Details) -> Arc<Event> {
        self.assert_may_emit(event_type);
        self.bus.respond(original, event_type, details)
    }

    /// Remove every registration made through this emitter. Idempotent;
    /// also runs on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let registrations = std::mem::take(
            &mut *self
                .registrations
                .lock()
                .expect("scoped emitter registrations poisoned"),
        );
        debug!(
            "closing emitter for {} ({} registrations)",
            self.capabilities.component,
            registrations.len()
        );
        for (event_type, id) in registrations {
            self.bus.unsubscribe(&event_type, id);
        }
    }

    fn track(&self, event_type: &str, id: SubscriptionId) {
        self.registrations
            .lock()
            .expect("scoped emitter registrations poisoned")
            .push((event_type.to_string(), id));
    }

    fn assert_may_emit(&self, event_type: &str) {
        if !self.capabilities.emits.contains(&event_type) {
            panic!(
                "component `{}` is not allowed to emit `{}`",
                self.capabilities.component, event_type
            );
        }
    }

    fn assert_may_listen(&self, event_type: &str) {
        if !self.capabilities.listens.contains(&event_type) {
            panic!(
                "component `{}` is not allowed to listen for `{}`",
                self.capabilities.component, event_type
            );
        }
    }
}

impl Drop for ScopedEmitter {
    fn drop(&mut self) {
        self.close();
    }
}
