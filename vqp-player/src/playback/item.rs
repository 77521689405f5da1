//! Player items and the item registry
//!
//! A [`PlayerItem`] binds one video to at most one decoder handle while
//! the video is queued. The [`ItemRegistry`] is the single source of truth
//! for those bindings: every bind goes through it, and its `rebind`
//! operation binds the replacement handle before the old one is released,
//! so an item is never observably left without a handle mid-swap.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;
use vqp_common::media::Video;

use crate::error::{Error, Result};
use crate::playback::handle::HandleId;

/// Stable identifier for one player item, valid for the lifetime of its
/// queue membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The binding of one video to at most one decoder handle.
///
/// The handle may be absent while the item is queued but not yet
/// prepared. Identity is the `ItemId`, not the video: the same video may
/// appear in the queue more than once, as distinct items.
#[derive(Debug, Clone)]
pub struct PlayerItem {
    id: ItemId,
    video: Arc<Video>,
    handle: Option<HandleId>,
}

impl PlayerItem {
    /// Create an item for a video, with no decoder handle bound yet.
    pub fn new(video: Arc<Video>) -> Self {
        Self {
            id: ItemId::new(),
            video,
            handle: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn video(&self) -> &Arc<Video> {
        &self.video
    }

    /// The decoder handle currently backing this item, if any.
    pub fn handle(&self) -> Option<HandleId> {
        self.handle
    }

    pub fn is_backed(&self) -> bool {
        self.handle.is_some()
    }
}

impl PartialEq for PlayerItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PlayerItem {}

/// Registry of queued items and their handle bindings.
///
/// Replaces ambient reference-counted ownership with an explicit map from
/// item id to handle-or-none plus an explicit rebind operation.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: HashMap<ItemId, PlayerItem>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    /// Track an item. Replaces any previous entry with the same id.
    pub fn insert(&mut self, item: PlayerItem) {
        self.items.insert(item.id(), item);
    }

    pub fn get(&self, id: ItemId) -> Option<&PlayerItem> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    /// Stop tracking an item, returning it (with any still-bound handle).
    pub fn remove(&mut self, id: ItemId) -> Option<PlayerItem> {
        self.items.remove(&id)
    }

    /// Bind a handle to an item. Fails if the handle already backs a
    /// different item — a decoder handle serves one item at a time.
    pub fn bind(&mut self, id: ItemId, handle: HandleId) -> Result<()> {
        if let Some(owner) = self.find_by_handle(handle) {
            if owner.id() != id {
                return Err(Error::InvalidState(format!(
                    "handle {} is already bound to item {}",
                    handle,
                    owner.id()
                )));
            }
        }
        let item = self
            .items
            .get_mut(&id)
            .ok_or_else(|| Error::Queue(format!("unknown item {}", id)))?;
        item.handle = Some(handle);
        debug!("bound handle {} to item {}", handle, id);
        Ok(())
    }

    /// Replace an item's handle binding, returning the previous handle.
    ///
    /// The new handle is bound before the old one is given up, so the
    /// item is backed throughout.
    pub fn rebind(&mut self, id: ItemId, new_handle: HandleId) -> Result<Option<HandleId>> {
        if let Some(owner) = self.find_by_handle(new_handle) {
            if owner.id() != id {
                return Err(Error::InvalidState(format!(
                    "handle {} is already bound to item {}",
                    new_handle,
                    owner.id()
                )));
            }
        }
        let item = self
            .items
            .get_mut(&id)
            .ok_or_else(|| Error::Queue(format!("unknown item {}", id)))?;
        let old = item.handle.replace(new_handle);
        debug!(
            "rebound item {} from {:?} to {}",
            id,
            old.map(|h| h.to_string()),
            new_handle
        );
        Ok(old)
    }

    /// Clear an item's handle binding, returning the released handle.
    pub fn release(&mut self, id: ItemId) -> Option<HandleId> {
        let released = self.items.get_mut(&id).and_then(|item| item.handle.take());
        if let Some(handle) = released {
            debug!("released handle {} from item {}", handle, id);
        }
        released
    }

    /// Track a synthetic item for a handle the playback engine produced
    /// on its own, keeping the handle-to-item mapping total.
    pub fn register_synthetic(&mut self, video: Arc<Video>, handle: HandleId) -> PlayerItem {
        let mut item = PlayerItem::new(video);
        item.handle = Some(handle);
        debug!("registered synthetic item {} for handle {}", item.id(), handle);
        self.items.insert(item.id(), item.clone());
        item
    }

    /// The item currently backed by `handle`, if any.
    pub fn find_by_handle(&self, handle: HandleId) -> Option<&PlayerItem> {
        self.items.values().find(|i| i.handle == Some(handle))
    }

    /// An item holding exactly this video instance (pointer identity).
    pub fn find_by_video(&self, video: &Arc<Video>) -> Option<&PlayerItem> {
        self.items
            .values()
            .find(|i| Arc::ptr_eq(&i.video, video))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
