//! Catalog boundary
//!
//! Media lookup behind the bus's request/response protocol: a
//! [`CatalogGateway`] answers `find video` and `find playlist` requests
//! from a pluggable [`Catalog`] backend. Lookup failures are delivered as
//! `error` events, never as panics or silent drops, and leave the request
//! unanswered so the requester can cancel it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::warn;
use vqp_common::events::{keys, types, Capabilities, Details, Event, EventBus, ScopedEmitter};
use vqp_common::media::{Playlist, Video};

use crate::error::{Error, Result};

/// Media lookup backend keyed by opaque reference tokens.
pub trait Catalog: Send + Sync {
    fn find_video(&self, token: &str) -> Result<Arc<Video>>;
    fn find_playlist(&self, token: &str) -> Result<Playlist>;
}

/// In-memory catalog, mainly for embedding fixed content and tests.
#[derive(Default)]
pub struct StaticCatalog {
    videos: HashMap<String, Arc<Video>>,
    playlists: HashMap<String, Playlist>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, token: impl Into<String>, video: Arc<Video>) -> Self {
        self.videos.insert(token.into(), video);
        self
    }

    pub fn with_playlist(mut self, token: impl Into<String>, playlist: Playlist) -> Self {
        self.playlists.insert(token.into(), playlist);
        self
    }
}

impl Catalog for StaticCatalog {
    fn find_video(&self, token: &str) -> Result<Arc<Video>> {
        self.videos
            .get(token)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("no video for token {:?}", token)))
    }

    fn find_playlist(&self, token: &str) -> Result<Playlist> {
        self.playlists
            .get(token)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("no playlist for token {:?}", token)))
    }
}

const CAPABILITIES: Capabilities = Capabilities {
    component: "catalog-gateway",
    emits: &[types::FOUND_VIDEO, types::FOUND_PLAYLIST, types::ERROR],
    listens: &[types::FIND_VIDEO, types::FIND_PLAYLIST],
};

/// Bus-facing catalog component.
///
/// Answers `find video` with `found video` (the serialized video under
/// the `video` detail) and `find playlist` with `found playlist`.
pub struct CatalogGateway {
    emitter: Arc<ScopedEmitter>,
    catalog: Arc<dyn Catalog>,
}

impl CatalogGateway {
    pub fn new(bus: Arc<EventBus>, catalog: Arc<dyn Catalog>) -> Arc<Self> {
        let emitter = Arc::new(ScopedEmitter::new(bus, CAPABILITIES));
        let gateway = Arc::new(Self {
            emitter: Arc::clone(&emitter),
            catalog: Arc::clone(&catalog),
        });

        // Weak back-references keep the bus registrations from pinning the
        // gateway alive.
        let weak = Arc::downgrade(&emitter);
        let backend = Arc::clone(&catalog);
        emitter.subscribe(
            types::FIND_VIDEO,
            Arc::new(move |event| {
                Self::answer(&weak, event, |emitter| {
                    let token = Self::token_of(event)?;
                    let video = backend.find_video(token)?;
                    let mut details = Details::new();
                    details.insert(
                        keys::VIDEO.to_string(),
                        serde_json::to_value(video.as_ref())
                            .map_err(|e| Error::Catalog(e.to_string()))?,
                    );
                    emitter.respond(event, types::FOUND_VIDEO, details);
                    Ok(())
                });
            }),
        );

        let weak = Arc::downgrade(&emitter);
        let backend = catalog;
        emitter.subscribe(
            types::FIND_PLAYLIST,
            Arc::new(move |event| {
                Self::answer(&weak, event, |emitter| {
                    let token = Self::token_of(event)?;
                    let playlist = backend.find_playlist(token)?;
                    let mut details = Details::new();
                    details.insert(
                        keys::PLAYLIST.to_string(),
                        serde_json::to_value(&playlist)
                            .map_err(|e| Error::Catalog(e.to_string()))?,
                    );
                    emitter.respond(event, types::FOUND_PLAYLIST, details);
                    Ok(())
                });
            }),
        );

        gateway
    }

    /// Look a video up over the bus. `None` when no gateway answered or
    /// the lookup failed.
    pub fn request_video(bus: &EventBus, token: &str) -> Option<Video> {
        Self::request_one(bus, types::FIND_VIDEO, keys::VIDEO, token)
    }

    /// Look a playlist up over the bus.
    pub fn request_playlist(bus: &EventBus, token: &str) -> Option<Playlist> {
        Self::request_one(bus, types::FIND_PLAYLIST, keys::PLAYLIST, token)
    }

    /// Direct lookup against this gateway's backend.
    pub fn find_video(&self, token: &str) -> Result<Arc<Video>> {
        self.catalog.find_video(token)
    }

    pub fn find_playlist(&self, token: &str) -> Result<Playlist> {
        self.catalog.find_playlist(token)
    }

    fn request_one<T: serde::de::DeserializeOwned + Send + 'static>(
        bus: &EventBus,
        request_type: &str,
        response_key: &'static str,
        token: &str,
    ) -> Option<T> {
        let mut details = Details::new();
        details.insert(
            keys::ITEM.to_string(),
            serde_json::Value::String(token.to_string()),
        );
        let cell: Arc<std::sync::Mutex<Option<T>>> = Arc::new(std::sync::Mutex::new(None));
        let c = Arc::clone(&cell);
        let request_id = bus.request(request_type, details, move |response| {
            let Some(value) = response.detail(response_key) else {
                return;
            };
            if let Ok(found) = serde_json::from_value(value.clone()) {
                if let Ok(mut slot) = c.lock() {
                    *slot = Some(found);
                }
            }
        });
        let found = cell.lock().ok().and_then(|mut slot| slot.take());
        if found.is_none() {
            bus.cancel_request(request_id);
        }
        found
    }

    fn token_of(event: &Event) -> Result<&str> {
        event
            .detail(keys::ITEM)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Catalog("lookup request without a token".to_string()))
    }

    /// Run a lookup and convert its failure into an `error` event.
    fn answer(
        weak: &Weak<ScopedEmitter>,
        event: &Event,
        lookup: impl FnOnce(&ScopedEmitter) -> Result<()>,
    ) {
        let Some(emitter) = weak.upgrade() else {
            return;
        };
        if let Err(e) = lookup(&emitter) {
            warn!("catalog lookup for {:?} failed: {}", event.event_type(), e);
            let mut details = Details::new();
            details.insert(
                keys::ERROR.to_string(),
                serde_json::Value::String(e.to_string()),
            );
            emitter.publish(types::ERROR, details);
        }
    }
}

impl Drop for CatalogGateway {
    fn drop(&mut self) {
        self.emitter.close();
    }
}
