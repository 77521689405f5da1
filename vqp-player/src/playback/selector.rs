//! Rendition selection
//!
//! Answers `select rendition` requests on the bus: a pluggable
//! [`RenditionPolicy`] chooses one playable rendition for a video, and the
//! [`RenditionSelector`] component wraps the policy behind the
//! request/response protocol so the coordinator never calls it directly.
//! Selection failure is terminal for the affected video: the selector
//! simply does not respond, and the requester times the request out by
//! cancelling it.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, warn};
use vqp_common::events::{keys, types, Capabilities, Details, EventBus, ScopedEmitter};
use vqp_common::media::{Properties, Rendition, Video};

use crate::playback::handle::HandleId;
use crate::playback::item::{ItemRegistry, PlayerItem};

/// Chooses one rendition for a video, or none if nothing is playable.
///
/// Implementations must be deterministic for a given video so repeated
/// selection (for example on preload and again on advance) agrees.
pub trait RenditionPolicy: Send + Sync {
    fn select(&self, video: &Video) -> Option<Rendition>;
}

/// Default policy: the first rendition, across all rendition sets in
/// order, that carries a source locator.
#[derive(Debug, Default)]
pub struct FirstPlayable;

impl RenditionPolicy for FirstPlayable {
    fn select(&self, video: &Video) -> Option<Rendition> {
        video
            .renditions()
            .find(|r| r.src_url().is_some())
            .cloned()
    }
}

const CAPABILITIES: Capabilities = Capabilities {
    component: "rendition-selector",
    emits: &[types::DID_SELECT_RENDITION, types::ERROR],
    listens: &[types::SELECT_RENDITION],
};

/// Bus-facing rendition selection component.
///
/// Subscribed to `select rendition` for its whole lifetime; answers each
/// request with `did select rendition` when the policy finds a playable
/// rendition, and stays silent when it does not.
pub struct RenditionSelector {
    emitter: Arc<ScopedEmitter>,
    policy: Arc<dyn RenditionPolicy>,
    registry: Arc<Mutex<ItemRegistry>>,
}

impl RenditionSelector {
    /// Create a selector with the default [`FirstPlayable`] policy.
    pub fn new(bus: Arc<EventBus>, registry: Arc<Mutex<ItemRegistry>>) -> Arc<Self> {
        Self::with_policy(bus, registry, Arc::new(FirstPlayable))
    }

    /// Create a selector with a custom policy and wire it to the bus.
    pub fn with_policy(
        bus: Arc<EventBus>,
        registry: Arc<Mutex<ItemRegistry>>,
        policy: Arc<dyn RenditionPolicy>,
    ) -> Arc<Self> {
        let emitter = Arc::new(ScopedEmitter::new(bus, CAPABILITIES));
        let selector = Arc::new(Self {
            emitter: Arc::clone(&emitter),
            policy,
            registry,
        });

        // The handler holds the emitter weakly: the bus keeps the closure
        // alive, and a strong reference back would keep the registration
        // alive past the selector's drop.
        let weak_emitter: Weak<ScopedEmitter> = Arc::downgrade(&emitter);
        let handler_policy = Arc::clone(&selector.policy);
        emitter.subscribe(
            types::SELECT_RENDITION,
            Arc::new(move |event| {
                let Some(emitter) = weak_emitter.upgrade() else {
                    return;
                };
                let Some(video_value) = event.detail(keys::VIDEO) else {
                    warn!("select rendition request without a video detail");
                    return;
                };
                let video: Video = match serde_json::from_value(video_value.clone()) {
                    Ok(video) => video,
                    Err(e) => {
                        warn!("select rendition request with malformed video: {}", e);
                        return;
                    }
                };
                match handler_policy.select(&video) {
                    Some(rendition) => match serde_json::to_value(&rendition) {
                        Ok(value) => {
                            let mut details = Details::new();
                            details.insert(keys::RENDITION.to_string(), value);
                            emitter.respond(event, types::DID_SELECT_RENDITION, details);
                        }
                        Err(e) => warn!("selected rendition failed to serialize: {}", e),
                    },
                    // No response; the requester cancels and treats the
                    // video as unplayable.
                    None => debug!("no playable rendition for requested video"),
                }
            }),
        );

        selector
    }

    /// Run the policy directly, outside the bus protocol.
    pub fn select_rendition(&self, video: &Video) -> Option<Rendition> {
        self.policy.select(video)
    }

    /// The queued item already holding exactly this video instance, or a
    /// fresh unqueued item for it.
    ///
    /// Matching is by pointer identity, so two structurally equal videos
    /// loaded separately get separate items.
    pub fn item_for_video(&self, video: &Arc<Video>) -> PlayerItem {
        if let Some(existing) = self.registry().find_by_video(video) {
            return existing.clone();
        }
        PlayerItem::new(Arc::clone(video))
    }

    /// The item backed by `handle`.
    ///
    /// Total: a handle the registry has never seen gets a synthetic item
    /// with an empty video, registered so later lookups agree.
    pub fn associated_item(&self, handle: HandleId) -> PlayerItem {
        let mut registry = self.registry();
        if let Some(item) = registry.find_by_handle(handle) {
            return item.clone();
        }
        warn!(
            "handle {} has no associated item; registering a synthetic one",
            handle
        );
        registry.register_synthetic(Arc::new(Video::new(Vec::new(), Properties::new())), handle)
    }

    fn registry(&self) -> MutexGuard<'_, ItemRegistry> {
        self.registry
            .lock()
            .expect("item registry lock poisoned")
    }
}

impl Drop for RenditionSelector {
    fn drop(&mut self) {
        self.emitter.close();
    }
}
