//! Event types and EventBus for the VQP player
//!
//! Provides the shared [`Event`] type, the synchronous [`EventBus`]
//! dispatcher, and the capability-scoped [`ScopedEmitter`] façade used by
//! every player component.
//!
//! Dispatch is synchronous and single-threaded-cooperative: `publish`
//! invokes every handler registered for the event's type (plus `"any"`
//! wildcard handlers) in registration order before returning, and a handler
//! may itself publish without corrupting the outer emission.

mod playback_types;
mod scoped;

pub use playback_types::{ActionAtItemEnd, CheckMethod, PlaybackState};
pub use scoped::{Capabilities, ScopedEmitter};

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Event type name constants.
///
/// These strings are the interoperability contract between components;
/// listening components (UI controls, analytics) match on them verbatim.
pub mod types {
    /// Wildcard matching every event.
    pub const ANY: &str = "any";

    // Queue lifecycle
    pub const WILL_CHANGE_ITEM: &str = "will change item";
    pub const DID_ADVANCE: &str = "did advance";
    pub const DID_INSERT_ITEM: &str = "did insert item";
    pub const DID_REMOVE_ITEM: &str = "did remove item";
    pub const DID_REMOVE_ALL_ITEMS: &str = "did remove all items";
    pub const DID_REPLACE_ITEM: &str = "did replace item";
    pub const DID_SET_ACTION_AT_ITEM_END: &str = "did set action at item end";

    // Cue points
    pub const CUE_POINT: &str = "cue point";
    pub const DID_EMIT_BEFORE_CUE_POINTS: &str = "did emit before cue points";

    // Rendition selection (request/response pair)
    pub const SELECT_RENDITION: &str = "select rendition";
    pub const DID_SELECT_RENDITION: &str = "did select rendition";

    // Playback surface
    pub const PLAY: &str = "play";
    pub const PAUSE: &str = "pause";
    pub const DID_SEEK_TO: &str = "did seek to";
    pub const VIDEO_PROGRESS: &str = "video progress";
    pub const VIDEO_DID_END: &str = "video did end";

    // Catalog boundary
    pub const FIND_VIDEO: &str = "find video";
    pub const FOUND_VIDEO: &str = "found video";
    pub const FIND_PLAYLIST: &str = "find playlist";
    pub const FOUND_PLAYLIST: &str = "found playlist";

    /// Error reports from any component.
    pub const ERROR: &str = "error";
}

/// Event detail key constants (payload contract, matched verbatim).
pub mod keys {
    pub const CUE_POINTS: &str = "cuePoints";
    pub const START_TIME: &str = "startTime";
    pub const END_TIME: &str = "endTime";
    pub const METHOD: &str = "method";
    pub const OLD_ITEM: &str = "oldItem";
    pub const NEW_ITEM: &str = "newItem";
    pub const OLD_HANDLE: &str = "oldHandle";
    pub const NEW_HANDLE: &str = "newHandle";
    pub const ITEM: &str = "item";
    pub const VIDEO: &str = "video";
    pub const RENDITION: &str = "rendition";
    pub const PLAYLIST: &str = "playlist";
    pub const POSITION: &str = "position";
    pub const DURATION: &str = "duration";
    pub const ACTION: &str = "action";
    pub const ERROR: &str = "error";
    pub const REQUEST_ID: &str = "requestId";
}

/// Open key/value payload carried by an event.
pub type Details = serde_json::Map<String, serde_json::Value>;

/// Handler callback invoked for each matching emission.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Opaque token identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

// ========================================
// Event
// ========================================

/// A single emission on the bus.
///
/// The same instance is passed to every handler in the emission. The
/// `propagation_stopped` and `default_prevented` flags are write-once
/// latches: any handler may set them, no one can clear them, and all
/// later handlers (and the emitter) observe them.
#[derive(Debug)]
pub struct Event {
    event_type: String,
    details: Details,
    timestamp: chrono::DateTime<chrono::Utc>,
    propagation_stopped: AtomicBool,
    default_prevented: AtomicBool,
}

impl Event {
    /// Create an event; normally done by [`EventBus::publish`].
    pub fn new(event_type: impl Into<String>, details: Details) -> Self {
        Self {
            event_type: event_type.into(),
            details,
            timestamp: chrono::Utc::now(),
            propagation_stopped: AtomicBool::new(false),
            default_prevented: AtomicBool::new(false),
        }
    }

    /// The type of this event.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Supporting details for this event (may be empty).
    pub fn details(&self) -> &Details {
        &self.details
    }

    /// Look up a single detail value.
    pub fn detail(&self, key: &str) -> Option<&serde_json::Value> {
        self.details.get(key)
    }

    /// When this event was published.
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.timestamp
    }

    /// Stop this event from reaching any further handlers in the current
    /// emission. The completion callback of `publish_then` still runs.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a handler called [`Event::stop_propagation`].
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.load(Ordering::SeqCst)
    }

    /// Signal to the emitter that whatever default action it would take
    /// as a consequence of this event should not happen. Permanent.
    pub fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::SeqCst);
    }

    /// Whether a handler called [`Event::prevent_default`].
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::SeqCst)
    }

    /// The correlation id attached by [`EventBus::request`], if any.
    pub fn request_id(&self) -> Option<Uuid> {
        self.details
            .get(keys::REQUEST_ID)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Event", 5)?;
        s.serialize_field("type", &self.event_type)?;
        s.serialize_field("details", &self.details)?;
        s.serialize_field("timestamp", &self.timestamp)?;
        s.serialize_field("propagationStopped", &self.propagation_stopped())?;
        s.serialize_field("defaultPrevented", &self.default_prevented())?;
        s.end()
    }
}

// ========================================
// EventBus Implementation
// ========================================

struct Registration {
    id: SubscriptionId,
    seq: u64,
    event_type: String,
    handler: Handler,
    once: bool,
    /// At-most-once latch for `once` registrations. Swapped before the
    /// handler runs so a re-entrant publish of the same type cannot invoke
    /// it a second time.
    fired: AtomicBool,
}

type ResponseCallback = Box<dyn FnOnce(&Event) + Send>;

#[derive(Default)]
struct BusState {
    registrations: HashMap<String, Vec<Arc<Registration>>>,
    pending_responses: HashMap<Uuid, ResponseCallback>,
}

/// Central publish/subscribe dispatcher shared by all player components.
///
/// Dispatch is synchronous: `publish` invokes every handler registered for
/// the type at emission start, in registration order, before returning.
/// The handler list is snapshotted per emission, so subscribing or
/// unsubscribing from inside a handler affects only later emissions.
/// Handlers may re-enter the bus freely; the registry lock is released
/// while handlers run.
pub struct EventBus {
    state: Mutex<BusState>,
    next_seq: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a handler for all future events of `event_type`.
    ///
    /// Subscribe to [`types::ANY`] to receive every event.
    pub fn subscribe(&self, event_type: &str, handler: Handler) -> SubscriptionId {
        self.register(event_type, handler, false)
    }

    /// Register a handler invoked at most once, removed atomically with
    /// its invocation. The returned token may still be used to remove it
    /// before it fires.
    pub fn subscribe_once(&self, event_type: &str, handler: Handler) -> SubscriptionId {
        self.register(event_type, handler, true)
    }

    fn register(&self, event_type: &str, handler: Handler, once: bool) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        let registration = Arc::new(Registration {
            id,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            event_type: event_type.to_string(),
            handler,
            once,
            fired: AtomicBool::new(false),
        });
        let mut state = self.lock_state();
        state
            .registrations
            .entry(event_type.to_string())
            .or_default()
            .push(registration);
        id
    }

    /// Remove a previously registered handler. No effect if the token does
    /// not match a live registration for `event_type`.
    pub fn unsubscribe(&self, event_type: &str, id: SubscriptionId) {
        let mut state = self.lock_state();
        if let Some(list) = state.registrations.get_mut(event_type) {
            list.retain(|r| r.id != id);
            if list.is_empty() {
                state.registrations.remove(event_type);
            }
        }
    }

    /// Publish an event to all current handlers for its type (plus `"any"`
    /// handlers), returning the event for flag inspection.
    pub fn publish(&self, event_type: &str, details: Details) -> Arc<Event> {
        let event = Arc::new(Event::new(event_type, details));
        self.dispatch(&event);
        event
    }

    /// Publish, then run `on_complete` with the event after every handler
    /// (including any that stopped propagation) has been invoked.
    pub fn publish_then(
        &self,
        event_type: &str,
        details: Details,
        on_complete: impl FnOnce(&Event),
    ) -> Arc<Event> {
        let event = self.publish(event_type, details);
        on_complete(&event);
        event
    }

    /// Publish `event_type` with a fresh `requestId` attached to the
    /// details and hold `on_response` until a matching [`EventBus::respond`]
    /// arrives. The first response wins; later responses are ignored.
    ///
    /// Returns the correlation id, which can be passed to
    /// [`EventBus::cancel_request`] if no responder exists.
    pub fn request(
        &self,
        event_type: &str,
        mut details: Details,
        on_response: impl FnOnce(&Event) + Send + 'static,
    ) -> Uuid {
        let request_id = Uuid::new_v4();
        details.insert(
            keys::REQUEST_ID.to_string(),
            serde_json::Value::String(request_id.to_string()),
        );
        self.lock_state()
            .pending_responses
            .insert(request_id, Box::new(on_response));
        self.publish(event_type, details);
        request_id
    }

    /// Drop the pending response callback for an unanswered request.
    pub fn cancel_request(&self, request_id: Uuid) {
        self.lock_state().pending_responses.remove(&request_id);
    }

    /// Publish `event_type` as the response to `original`, echoing its
    /// `requestId` and completing the matching pending request, if any.
    ///
    /// The response is also delivered to ordinary subscribers of
    /// `event_type`.
    pub fn respond(&self, original: &Event, event_type: &str, mut details: Details) -> Arc<Event> {
        let request_id = original.request_id();
        match request_id {
            Some(id) => {
                details.insert(
                    keys::REQUEST_ID.to_string(),
                    serde_json::Value::String(id.to_string()),
                );
            }
            None => {
                warn!(
                    "respond to {:?} without a requestId; no pending request can match",
                    original.event_type()
                );
            }
        }

        let event = self.publish(event_type, details);

        if let Some(id) = request_id {
            let callback = self.lock_state().pending_responses.remove(&id);
            match callback {
                Some(callback) => callback(&event),
                None => debug!("ignoring extra response for request {}", id),
            }
        }
        event
    }

    /// Number of live registrations for a type (diagnostics).
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.lock_state()
            .registrations
            .get(event_type)
            .map_or(0, |l| l.len())
    }

    fn dispatch(&self, event: &Arc<Event>) {
        // Snapshot at emission start: handlers added or removed by a
        // handler in this emission only affect later emissions.
        let snapshot: Vec<Arc<Registration>> = {
            let state = self.lock_state();
            let mut regs: Vec<Arc<Registration>> = state
                .registrations
                .get(event.event_type())
                .cloned()
                .unwrap_or_default();
            if event.event_type() != types::ANY {
                if let Some(any) = state.registrations.get(types::ANY) {
                    regs.extend(any.iter().cloned());
                }
            }
            regs.sort_by_key(|r| r.seq);
            regs
        };

        for registration in snapshot {
            if event.propagation_stopped() {
                break;
            }
            if registration.once {
                if registration.fired.swap(true, Ordering::SeqCst) {
                    continue;
                }
                self.unsubscribe(&registration.event_type, registration.id);
            }
            let handler = Arc::clone(&registration.handler);
            // A faulting handler must not prevent the rest of the emission.
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic".to_string());
                error!(
                    "handler for {:?} panicked: {}; continuing emission",
                    event.event_type(),
                    message
                );
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BusState> {
        // Handlers run outside the lock, so a panicking handler cannot
        // poison it; recover rather than cascade.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
