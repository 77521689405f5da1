//! Queue coordination
//!
//! The [`QueueCoordinator`] owns the item queue, the decoder handle pair,
//! and the playback surface. It keeps the active handle on the current
//! item and the inactive handle preloaded with the next item's rendition,
//! so advancing swaps handle roles instead of loading cold. Every
//! externally observable transition is announced on the bus, and the
//! `will change item` announcement is cancellable.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};
use vqp_common::config::PlayerConfig;
use vqp_common::events::{
    keys, types, ActionAtItemEnd, Capabilities, CheckMethod, Details, EventBus, PlaybackState,
    ScopedEmitter,
};
use vqp_common::media::{Playlist, Rendition, Video};

use crate::playback::handle::{HandlePair, RenderTarget};
use crate::playback::item::{ItemId, ItemRegistry, PlayerItem};
use crate::playback::scheduler::CuePointScheduler;
use crate::playback::selector::RenditionSelector;

const CAPABILITIES: Capabilities = Capabilities {
    component: "queue-coordinator",
    emits: &[
        types::WILL_CHANGE_ITEM,
        types::DID_ADVANCE,
        types::DID_INSERT_ITEM,
        types::DID_REMOVE_ITEM,
        types::DID_REMOVE_ALL_ITEMS,
        types::DID_REPLACE_ITEM,
        types::DID_SET_ACTION_AT_ITEM_END,
        types::SELECT_RENDITION,
        types::PLAY,
        types::PAUSE,
        types::DID_SEEK_TO,
        types::VIDEO_PROGRESS,
        types::VIDEO_DID_END,
        types::ERROR,
    ],
    listens: &[],
};

/// Gapless playback coordinator over an ordered item queue.
pub struct QueueCoordinator {
    config: PlayerConfig,
    bus: Arc<EventBus>,
    emitter: ScopedEmitter,
    registry: Arc<Mutex<ItemRegistry>>,
    selector: Arc<RenditionSelector>,
    scheduler: CuePointScheduler,
    /// Queue order; every id is present in the registry.
    order: Vec<ItemId>,
    current: Option<ItemId>,
    /// Which item the inactive handle is preloaded for, if any.
    preloaded_for: Option<ItemId>,
    handles: HandlePair,
    action_at_item_end: ActionAtItemEnd,
    state: PlaybackState,
    /// Latched once the playhead reaches the current item's duration, so
    /// end consequences fire once per arrival.
    at_end: bool,
    /// Set when the current item could not be prepared (no playable
    /// rendition); a later insert may skip past it.
    current_failed: bool,
    render_target: Option<RenderTarget>,
}

impl QueueCoordinator {
    /// Create an empty coordinator with its own private bus.
    pub fn new(config: PlayerConfig) -> Self {
        Self::with_bus(Arc::new(EventBus::new()), config)
    }

    /// Create an empty coordinator wired to an existing bus.
    pub fn with_bus(bus: Arc<EventBus>, config: PlayerConfig) -> Self {
        let registry = Arc::new(Mutex::new(ItemRegistry::new()));
        let selector = RenditionSelector::new(Arc::clone(&bus), Arc::clone(&registry));
        let scheduler = CuePointScheduler::new(Arc::clone(&bus));
        let emitter = ScopedEmitter::new(Arc::clone(&bus), CAPABILITIES);
        info!("queue coordinator created");
        Self {
            action_at_item_end: config.action_at_item_end,
            config,
            bus,
            emitter,
            registry,
            selector,
            scheduler,
            order: Vec::new(),
            current: None,
            preloaded_for: None,
            handles: HandlePair::new(),
            state: PlaybackState::Paused,
            at_end: false,
            current_failed: false,
            render_target: None,
        }
    }

    /// Create a coordinator preloaded with a playlist's videos, in order.
    pub fn from_playlist(playlist: &Playlist, config: PlayerConfig) -> Self {
        let mut coordinator = Self::new(config);
        coordinator.insert_playlist(playlist, None);
        coordinator
    }

    /// Create a coordinator holding a single video.
    pub fn from_video(video: Arc<Video>, config: PlayerConfig) -> Self {
        let mut coordinator = Self::new(config);
        coordinator.insert_video(video, None);
        coordinator
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn selector(&self) -> &Arc<RenditionSelector> {
        &self.selector
    }

    /// Snapshot of the queue contents, in order.
    pub fn items(&self) -> Vec<PlayerItem> {
        let registry = self.registry();
        self.order
            .iter()
            .filter_map(|id| registry.get(*id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The item the active handle is playing, if any.
    pub fn current_item(&self) -> Option<PlayerItem> {
        self.current.and_then(|id| self.registry().get(id).cloned())
    }

    pub fn action_at_item_end(&self) -> ActionAtItemEnd {
        self.action_at_item_end
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Playhead position of the current item, in seconds.
    pub fn position(&self) -> f64 {
        self.handles.active().position()
    }

    pub fn render_target(&self) -> Option<RenderTarget> {
        self.render_target
    }

    /// Attach a hosting surface. Replaces any previous attachment.
    pub fn attach_render_target(&mut self, target: RenderTarget) {
        self.render_target = Some(target);
    }

    pub fn detach_render_target(&mut self) {
        self.render_target = None;
    }

    // ========================================
    // Queue mutation
    // ========================================

    /// Insert an item after `after`, or at the end of the queue when
    /// `after` is `None` or names an item not in the queue.
    ///
    /// Inserting into an empty queue makes the item current and prepares
    /// its decoder.
    pub fn insert_item(&mut self, item: PlayerItem, after: Option<ItemId>) {
        let id = item.id();
        {
            let mut registry = self.registry();
            if !registry.contains(id) {
                registry.insert(item);
            }
        }

        let index = match after {
            None => self.order.len(),
            Some(after_id) => match self.index_of(after_id) {
                Some(i) => i + 1,
                None => {
                    warn!("afterItem {} not in queue; appending {}", after_id, id);
                    self.order.len()
                }
            },
        };
        self.order.insert(index, id);
        debug!("inserted item {} at queue index {}", id, index);

        let mut details = Details::new();
        details.insert(keys::ITEM.to_string(), serde_json::json!(id.to_string()));
        self.emitter.publish(types::DID_INSERT_ITEM, details);

        if self.current.is_none() {
            self.current = Some(id);
            self.prepare_current();
        } else if self.current_failed && self.action_at_item_end == ActionAtItemEnd::Advance {
            // A queue parked on an unplayable item can now move past it.
            if let Some(next) = self.current.and_then(|c| self.item_after(c)) {
                self.perform_advance(next);
            }
        } else {
            // The item after the current one may have changed.
            self.preload_next();
        }
    }

    /// Wrap a video in an item (reusing a cached item when the queue does
    /// not already hold it) and insert it.
    pub fn insert_video(&mut self, video: Arc<Video>, after: Option<ItemId>) -> PlayerItem {
        let item = self.selector.item_for_video(&video);
        // Reinserting a queued video gets a fresh item; one id appears in
        // the order at most once.
        let item = if self.index_of(item.id()).is_some() {
            PlayerItem::new(video)
        } else {
            item
        };
        self.insert_item(item.clone(), after);
        item
    }

    /// Insert a playlist's videos as consecutive items after `after`.
    pub fn insert_playlist(&mut self, playlist: &Playlist, after: Option<ItemId>) -> Vec<PlayerItem> {
        let mut anchor = after;
        let mut inserted = Vec::with_capacity(playlist.len());
        for video in playlist.videos() {
            let item = self.insert_video(Arc::clone(video), anchor);
            anchor = Some(item.id());
            inserted.push(item);
        }
        inserted
    }

    /// Remove an item from the queue. Removing the current item releases
    /// its decoder, moves the pointer to the following item, and leaves
    /// playback paused.
    pub fn remove_item(&mut self, id: ItemId) {
        let Some(index) = self.index_of(id) else {
            debug!("remove of item {} not in queue; ignoring", id);
            return;
        };
        let was_current = self.current == Some(id);
        self.order.remove(index);

        if was_current {
            self.state = PlaybackState::Paused;
            let released = {
                let mut registry = self.registry();
                let released = registry.release(id);
                registry.remove(id);
                released
            };
            if released == Some(self.handles.active().id()) {
                self.handles.active_mut().unload();
            }
            self.current = None;
            self.scheduler.clear();
            self.at_end = false;

            // The item that followed the removed one, if any, becomes
            // current but does not start playing on its own.
            if let Some(next_id) = self.order.get(index).copied() {
                if self.preloaded_for == Some(next_id) && self.handles.inactive().is_loaded() {
                    self.handles.swap_roles();
                    self.preloaded_for = None;
                    let handle = self.handles.active().id();
                    if let Err(e) = self.registry().bind(next_id, handle) {
                        warn!("post-removal binding failed: {}", e);
                    }
                    self.adopt_current(next_id);
                    self.preload_next();
                } else {
                    self.current = Some(next_id);
                    self.prepare_current();
                }
            } else {
                self.handles.release_both();
                self.preloaded_for = None;
            }
        } else {
            let removed = self.registry().remove(id);
            let removed_handle = removed.and_then(|i| i.handle());
            if self.preloaded_for == Some(id)
                || removed_handle == Some(self.handles.inactive().id())
            {
                self.handles.inactive_mut().unload();
                self.preloaded_for = None;
            }
            self.preload_next();
        }

        let mut details = Details::new();
        details.insert(keys::ITEM.to_string(), serde_json::json!(id.to_string()));
        self.emitter.publish(types::DID_REMOVE_ITEM, details);
    }

    /// Empty the queue, releasing both decoders.
    pub fn remove_all_items(&mut self) {
        self.order.clear();
        self.registry().clear();
        self.current = None;
        self.preloaded_for = None;
        self.handles.release_both();
        self.scheduler.clear();
        self.state = PlaybackState::Paused;
        self.at_end = false;
        self.emitter
            .publish(types::DID_REMOVE_ALL_ITEMS, Details::new());
    }

    // ========================================
    // Advancing
    // ========================================

    /// Advance to the item after the current one. No-op on the last item
    /// or with an empty queue.
    pub fn advance_to_next_item(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        let Some(next) = self.item_after(current) else {
            debug!("advance at last item; ignoring");
            return;
        };
        self.perform_advance(next);
    }

    /// Advance directly to a specific queued item. No-op if the item is
    /// not in the queue or is already current.
    pub fn advance_to_item(&mut self, id: ItemId) {
        if self.current == Some(id) {
            return;
        }
        if self.index_of(id).is_none() {
            warn!("advance to item {} not in queue; ignoring", id);
            return;
        }
        self.perform_advance(id);
    }

    /// Change the end-of-item policy.
    pub fn set_action_at_item_end(&mut self, action: ActionAtItemEnd) {
        self.action_at_item_end = action;
        let mut details = Details::new();
        details.insert(
            keys::ACTION.to_string(),
            serde_json::to_value(action).unwrap_or_default(),
        );
        self.emitter
            .publish(types::DID_SET_ACTION_AT_ITEM_END, details);
    }

    fn perform_advance(&mut self, new_id: ItemId) {
        let old_id = self.current;

        // Announce the transition; any listener may cancel it.
        let event = self
            .emitter
            .publish(types::WILL_CHANGE_ITEM, self.transition_details(old_id, new_id));
        if event.default_prevented() {
            debug!("item change to {} cancelled by a listener", new_id);
            return;
        }

        // Make sure the inactive handle holds the new item's rendition.
        if self.preloaded_for != Some(new_id) || !self.handles.inactive().is_loaded() {
            let Some(video) = self.video_of(new_id) else {
                warn!("advance to unknown item {}; ignoring", new_id);
                return;
            };
            match self.resolve_rendition(&video) {
                Some(rendition) => self.handles.inactive_mut().load(rendition),
                None => {
                    self.report_unplayable(new_id);
                    match self.action_at_item_end {
                        ActionAtItemEnd::Advance => match self.item_after(new_id) {
                            Some(following) => self.perform_advance(following),
                            None => self.state = PlaybackState::Paused,
                        },
                        ActionAtItemEnd::Pause => self.state = PlaybackState::Paused,
                        ActionAtItemEnd::None => {}
                    }
                    return;
                }
            }
        }

        // The preloaded handle becomes active; the old item's handle is
        // released only after the new binding is in place.
        self.handles.swap_roles();
        let new_handle = self.handles.active().id();
        {
            let mut registry = self.registry();
            if let Err(e) = registry.bind(new_id, new_handle) {
                warn!("advance binding failed: {}", e);
            }
            if let Some(old_id) = old_id {
                registry.release(old_id);
            }
        }
        self.handles.inactive_mut().unload();
        self.preloaded_for = None;
        self.adopt_current(new_id);

        self.emitter
            .publish(types::DID_ADVANCE, self.transition_details(old_id, new_id));

        // When already playing, the new item starts immediately, so its
        // start cue flow runs now rather than on the next explicit play.
        if self.state == PlaybackState::Playing {
            self.scheduler.check_start();
        }

        self.preload_next();
    }

    /// Point playback state at `new_id`, which must already be bound to
    /// the active handle.
    fn adopt_current(&mut self, new_id: ItemId) {
        self.current = Some(new_id);
        self.current_failed = false;
        self.at_end = false;
        self.handles.active_mut().set_position(0.0);
        if let Some(video) = self.video_of(new_id) {
            self.scheduler.bind_video(&video);
        }
    }

    // ========================================
    // Rendition management
    // ========================================

    /// Swap the current item onto a different rendition, preserving the
    /// playhead. The item is bound to the replacement decoder before the
    /// old one is released, so it is backed throughout.
    pub fn replace_rendition(&mut self, rendition: Rendition) {
        let Some(current) = self.current else {
            warn!("replace rendition with no current item; ignoring");
            return;
        };

        let position = self.handles.active().position();
        self.handles.inactive_mut().load(rendition);
        self.handles.swap_roles();
        let new_handle = self.handles.active().id();

        // The registry guard must drop before the handle pair is touched.
        let rebound = self.registry().rebind(current, new_handle);
        let old_handle = match rebound {
            Ok(old) => old,
            Err(e) => {
                warn!("rendition replacement rebind failed: {}", e);
                self.handles.swap_roles();
                self.handles.inactive_mut().unload();
                return;
            }
        };
        self.handles.active_mut().set_position(position);
        self.handles.inactive_mut().unload();
        self.preloaded_for = None;

        let mut details = Details::new();
        details.insert(
            keys::ITEM.to_string(),
            serde_json::json!(current.to_string()),
        );
        if let Some(old_handle) = old_handle {
            details.insert(
                keys::OLD_HANDLE.to_string(),
                serde_json::json!(old_handle.to_string()),
            );
        }
        details.insert(
            keys::NEW_HANDLE.to_string(),
            serde_json::json!(new_handle.to_string()),
        );
        self.emitter.publish(types::DID_REPLACE_ITEM, details);

        self.preload_next();
    }

    /// Ask the bus for a rendition choice; falls back to nothing when no
    /// selector answers.
    fn resolve_rendition(&self, video: &Arc<Video>) -> Option<Rendition> {
        let video_value = match serde_json::to_value(video.as_ref()) {
            Ok(value) => value,
            Err(e) => {
                warn!("video failed to serialize for selection: {}", e);
                return self.selector.select_rendition(video);
            }
        };
        let mut details = Details::new();
        details.insert(keys::VIDEO.to_string(), video_value);

        let cell: Arc<Mutex<Option<Rendition>>> = Arc::new(Mutex::new(None));
        let c = Arc::clone(&cell);
        let request_id = self.emitter.request(types::SELECT_RENDITION, details, move |response| {
            let Some(value) = response.detail(keys::RENDITION) else {
                return;
            };
            if let Ok(rendition) = serde_json::from_value::<Rendition>(value.clone()) {
                if let Ok(mut slot) = c.lock() {
                    *slot = Some(rendition);
                }
            }
        });

        // Dispatch is synchronous, so any answer has arrived by now.
        let resolved = cell.lock().ok().and_then(|mut slot| slot.take());
        if resolved.is_none() {
            self.bus.cancel_request(request_id);
        }
        resolved
    }

    /// Warm the inactive handle with the rendition of the item after the
    /// current one. Preload failure is quiet; the error surfaces if the
    /// item actually becomes current.
    fn preload_next(&mut self) {
        let next_id = self.current.and_then(|c| self.item_after(c));
        let Some(next_id) = next_id else {
            self.handles.inactive_mut().unload();
            self.preloaded_for = None;
            return;
        };
        if self.preloaded_for == Some(next_id) && self.handles.inactive().is_loaded() {
            return;
        }
        let Some(video) = self.video_of(next_id) else {
            return;
        };
        match self.resolve_rendition(&video) {
            Some(rendition) => {
                debug!("preloaded item {} on the inactive handle", next_id);
                self.handles.inactive_mut().load(rendition);
                self.preloaded_for = Some(next_id);
            }
            None => {
                debug!("preload skipped: no rendition for item {}", next_id);
                self.handles.inactive_mut().unload();
                self.preloaded_for = None;
            }
        }
    }

    /// Resolve and load the current item's rendition onto the active
    /// handle, then warm the next item.
    fn prepare_current(&mut self) {
        let Some(id) = self.current else {
            return;
        };
        let Some(video) = self.video_of(id) else {
            return;
        };
        match self.resolve_rendition(&video) {
            Some(rendition) => {
                self.handles.active_mut().load(rendition);
                if let Err(e) = self.registry().bind(id, self.handles.active().id()) {
                    warn!("current item binding failed: {}", e);
                }
                self.scheduler.bind_video(&video);
                self.current_failed = false;
                self.at_end = false;
                self.preload_next();
            }
            None => {
                self.current_failed = true;
                self.report_unplayable(id);
                match self.action_at_item_end {
                    ActionAtItemEnd::Advance => {
                        if let Some(following) = self.item_after(id) {
                            self.perform_advance(following);
                        } else {
                            self.state = PlaybackState::Paused;
                        }
                    }
                    ActionAtItemEnd::Pause => self.state = PlaybackState::Paused,
                    ActionAtItemEnd::None => {}
                }
            }
        }
    }

    // ========================================
    // Playback surface
    // ========================================

    /// Begin (or resume) playback of the current item. Starting from the
    /// top of the video runs the `before` cue point flow first.
    pub fn play(&mut self) {
        if self.current.is_none() {
            warn!("play with an empty queue; ignoring");
            return;
        }
        self.state = PlaybackState::Playing;
        if self.position() == 0.0 {
            self.scheduler.check_start();
        }
        let mut details = Details::new();
        if let Some(id) = self.current {
            details.insert(keys::ITEM.to_string(), serde_json::json!(id.to_string()));
        }
        self.emitter.publish(types::PLAY, details);
    }

    /// Pause playback, keeping the playhead in place.
    pub fn pause(&mut self) {
        self.state = PlaybackState::Paused;
        self.emitter.publish(types::PAUSE, Details::new());
    }

    /// Move the playhead, firing any cue points between the old checked
    /// position and the new one.
    pub fn seek_to(&mut self, position: f64) {
        if self.current.is_none() {
            warn!("seek with an empty queue; ignoring");
            return;
        }
        let position = position.max(0.0);
        self.handles.active_mut().set_position(position);
        self.scheduler.check_mid(position, CheckMethod::Seek);

        if position == 0.0 {
            self.scheduler.rearm_before();
        }
        let past_end = self
            .current_duration()
            .is_some_and(|duration| position >= duration);
        if self.at_end && !past_end {
            self.at_end = false;
            self.scheduler.rearm_end();
        }

        let mut details = Details::new();
        details.insert(keys::POSITION.to_string(), serde_json::json!(position));
        self.emitter.publish(types::DID_SEEK_TO, details);
    }

    /// Report a playhead position from the embedding engine without
    /// treating it as a seek. The next tick performs the cue check.
    pub fn set_playhead(&mut self, position: f64) {
        self.handles.active_mut().set_position(position);
    }

    /// One playback heartbeat: cue check, progress report, end detection.
    /// Driven by the position monitor while playing.
    pub fn tick(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let Some(current) = self.current else {
            return;
        };
        let position = self.handles.active().position();
        self.scheduler.check_mid(position, CheckMethod::Play);

        let duration = self.current_duration();
        let mut details = Details::new();
        details.insert(
            keys::ITEM.to_string(),
            serde_json::json!(current.to_string()),
        );
        details.insert(keys::POSITION.to_string(), serde_json::json!(position));
        if let Some(duration) = duration {
            details.insert(keys::DURATION.to_string(), serde_json::json!(duration));
        }
        self.emitter.publish(types::VIDEO_PROGRESS, details);

        if let Some(duration) = duration {
            if position >= duration && !self.at_end {
                self.finish_current_item(current, position);
            } else if position < duration && self.at_end {
                self.at_end = false;
                self.scheduler.rearm_end();
            }
        }
    }

    /// End-of-item flow: announce the end, fire `after` cue points, then
    /// apply the end-of-item policy unless a listener prevented it.
    fn finish_current_item(&mut self, current: ItemId, position: f64) {
        self.at_end = true;
        info!("item {} reached its end at {}", current, position);

        let mut details = Details::new();
        details.insert(
            keys::ITEM.to_string(),
            serde_json::json!(current.to_string()),
        );
        let end_event = self.emitter.publish(types::VIDEO_DID_END, details);
        self.scheduler.check_end(position);

        if end_event.default_prevented() {
            debug!("end-of-item consequence suppressed by a listener");
            return;
        }
        match self.action_at_item_end {
            ActionAtItemEnd::Advance => {
                if self.item_after(current).is_some() {
                    self.advance_to_next_item();
                } else {
                    self.state = PlaybackState::Paused;
                }
            }
            ActionAtItemEnd::Pause => self.state = PlaybackState::Paused,
            ActionAtItemEnd::None => {}
        }
    }

    // ========================================
    // Internals
    // ========================================

    fn registry(&self) -> MutexGuard<'_, ItemRegistry> {
        self.registry.lock().expect("item registry lock poisoned")
    }

    fn index_of(&self, id: ItemId) -> Option<usize> {
        self.order.iter().position(|queued| *queued == id)
    }

    fn item_after(&self, id: ItemId) -> Option<ItemId> {
        self.index_of(id)
            .and_then(|i| self.order.get(i + 1))
            .copied()
    }

    fn video_of(&self, id: ItemId) -> Option<Arc<Video>> {
        self.registry().get(id).map(|item| Arc::clone(item.video()))
    }

    fn current_duration(&self) -> Option<f64> {
        self.current
            .and_then(|id| self.video_of(id))
            .and_then(|video| video.duration())
    }

    fn transition_details(&self, old: Option<ItemId>, new: ItemId) -> Details {
        let mut details = Details::new();
        details.insert(
            keys::OLD_ITEM.to_string(),
            match old {
                Some(id) => serde_json::json!(id.to_string()),
                None => serde_json::Value::Null,
            },
        );
        details.insert(
            keys::NEW_ITEM.to_string(),
            serde_json::json!(new.to_string()),
        );
        details
    }

    fn report_unplayable(&self, id: ItemId) {
        warn!("no playable rendition for item {}", id);
        let mut details = Details::new();
        details.insert(keys::ITEM.to_string(), serde_json::json!(id.to_string()));
        details.insert(
            keys::ERROR.to_string(),
            serde_json::json!("no playable rendition"),
        );
        self.emitter.publish(types::ERROR, details);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vqp_common::media::{CuePoint, CuePosition, Properties};

    fn video(url: &str, duration: f64) -> Arc<Video> {
        let mut properties = Properties::new();
        properties.insert("duration".into(), serde_json::json!(duration));
        Arc::new(Video::from_url(url, properties))
    }

    fn unplayable_video() -> Arc<Video> {
        Arc::new(Video::new(Vec::new(), Properties::new()))
    }

    fn three_item_coordinator() -> QueueCoordinator {
        let playlist = Playlist::from_videos(vec![
            video("http://e/a", 10.0),
            video("http://e/b", 20.0),
            video("http://e/c", 30.0),
        ]);
        QueueCoordinator::from_playlist(&playlist, PlayerConfig::default())
    }

    fn count_events(bus: &EventBus, event_type: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.subscribe(
            event_type,
            Arc::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        count
    }

    #[test]
    fn test_playlist_load_sets_current_and_preloads_next() {
        let coordinator = three_item_coordinator();
        assert_eq!(coordinator.len(), 3);

        let current = coordinator.current_item().unwrap();
        assert_eq!(current.id(), coordinator.items()[0].id());
        assert!(current.is_backed());
        assert!(coordinator.handles.active().is_loaded());
        assert!(coordinator.handles.inactive().is_loaded());
        assert_eq!(
            coordinator.preloaded_for,
            Some(coordinator.items()[1].id())
        );
    }

    #[test]
    fn test_insert_after_places_item_adjacent() {
        let mut coordinator = three_item_coordinator();
        let first = coordinator.items()[0].id();

        let inserted = coordinator.insert_video(video("http://e/x", 5.0), Some(first));
        let ids: Vec<ItemId> = coordinator.items().iter().map(|i| i.id()).collect();
        assert_eq!(ids[1], inserted.id());
        assert_eq!(coordinator.len(), 4);
    }

    #[test]
    fn test_insert_after_unknown_item_appends() {
        let mut coordinator = three_item_coordinator();
        let stranger = ItemId::new();
        let inserted = coordinator.insert_video(video("http://e/x", 5.0), Some(stranger));
        assert_eq!(coordinator.items().last().unwrap().id(), inserted.id());
    }

    #[test]
    fn test_advance_swaps_handles_without_reload() {
        let mut coordinator = three_item_coordinator();
        let preloaded_handle = coordinator.handles.inactive().id();
        let advances = count_events(coordinator.bus(), types::DID_ADVANCE);

        coordinator.advance_to_next_item();

        // The preloaded decoder became active untouched.
        assert_eq!(coordinator.handles.active().id(), preloaded_handle);
        assert_eq!(
            coordinator.current_item().unwrap().handle(),
            Some(preloaded_handle)
        );
        assert_eq!(advances.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.position(), 0.0);
        // The third item is warmed in turn.
        assert_eq!(
            coordinator.preloaded_for,
            Some(coordinator.items()[2].id())
        );
    }

    #[test]
    fn test_advance_releases_previous_item_handle() {
        let mut coordinator = three_item_coordinator();
        let first = coordinator.items()[0].id();
        coordinator.advance_to_next_item();
        assert!(!coordinator.registry().get(first).unwrap().is_backed());
    }

    #[test]
    fn test_advance_at_last_item_is_a_no_op() {
        let mut coordinator = three_item_coordinator();
        coordinator.advance_to_next_item();
        coordinator.advance_to_next_item();

        let last = coordinator.current_item().unwrap().id();
        let advances = count_events(coordinator.bus(), types::DID_ADVANCE);
        coordinator.advance_to_next_item();
        assert_eq!(coordinator.current_item().unwrap().id(), last);
        assert_eq!(advances.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_will_change_item_can_cancel_advance() {
        let mut coordinator = three_item_coordinator();
        let first = coordinator.current_item().unwrap().id();

        coordinator.bus().subscribe(
            types::WILL_CHANGE_ITEM,
            Arc::new(|event| event.prevent_default()),
        );
        let advances = count_events(coordinator.bus(), types::DID_ADVANCE);

        coordinator.advance_to_next_item();
        assert_eq!(coordinator.current_item().unwrap().id(), first);
        assert_eq!(advances.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_advance_to_item_skips_ahead() {
        let mut coordinator = three_item_coordinator();
        let third = coordinator.items()[2].id();
        coordinator.advance_to_item(third);
        assert_eq!(coordinator.current_item().unwrap().id(), third);
    }

    #[test]
    fn test_remove_current_item_moves_pointer_and_pauses() {
        let mut coordinator = three_item_coordinator();
        coordinator.play();
        let first = coordinator.items()[0].id();
        let second = coordinator.items()[1].id();
        let removals = count_events(coordinator.bus(), types::DID_REMOVE_ITEM);

        coordinator.remove_item(first);

        assert_eq!(coordinator.len(), 2);
        assert_eq!(coordinator.current_item().unwrap().id(), second);
        assert!(coordinator.current_item().unwrap().is_backed());
        // Removal never resumes playback on its own.
        assert!(!coordinator.is_playing());
        assert_eq!(removals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_last_remaining_item_empties_playback() {
        let playlist = Playlist::from_video(video("http://e/a", 10.0));
        let mut coordinator = QueueCoordinator::from_playlist(&playlist, PlayerConfig::default());
        let only = coordinator.items()[0].id();

        coordinator.remove_item(only);
        assert!(coordinator.is_empty());
        assert!(coordinator.current_item().is_none());
        assert!(!coordinator.handles.active().is_loaded());
        assert!(!coordinator.handles.inactive().is_loaded());
    }

    #[test]
    fn test_remove_non_current_item_refreshes_preload() {
        let mut coordinator = three_item_coordinator();
        let second = coordinator.items()[1].id();
        let third = coordinator.items()[2].id();

        coordinator.remove_item(second);
        assert_eq!(coordinator.len(), 2);
        // The preload now targets the item that moved up.
        assert_eq!(coordinator.preloaded_for, Some(third));
    }

    #[test]
    fn test_remove_all_items() {
        let mut coordinator = three_item_coordinator();
        let count = count_events(coordinator.bus(), types::DID_REMOVE_ALL_ITEMS);

        coordinator.remove_all_items();
        assert!(coordinator.is_empty());
        assert!(coordinator.current_item().is_none());
        assert!(!coordinator.handles.active().is_loaded());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tick_publishes_progress_and_checks_cues() {
        let cued = Arc::new(
            video("http://e/a", 10.0)
                .with_cue_points(vec![CuePoint::at(2.0, "marker").unwrap()]),
        );
        let mut coordinator =
            QueueCoordinator::from_video(cued, PlayerConfig::default());
        let cues = count_events(coordinator.bus(), types::CUE_POINT);
        let progress = count_events(coordinator.bus(), types::VIDEO_PROGRESS);

        coordinator.play();
        coordinator.set_playhead(1.0);
        coordinator.tick();
        coordinator.set_playhead(3.0);
        coordinator.tick();

        assert_eq!(progress.load(Ordering::SeqCst), 2);
        assert_eq!(cues.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tick_is_inert_while_paused() {
        let mut coordinator = three_item_coordinator();
        let progress = count_events(coordinator.bus(), types::VIDEO_PROGRESS);
        coordinator.tick();
        assert_eq!(progress.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_end_of_item_advances_gaplessly() {
        let mut coordinator = three_item_coordinator();
        let second = coordinator.items()[1].id();
        let ends = count_events(coordinator.bus(), types::VIDEO_DID_END);

        coordinator.play();
        coordinator.set_playhead(10.0);
        coordinator.tick();

        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.current_item().unwrap().id(), second);
        // Advancing at item end keeps playing.
        assert!(coordinator.is_playing());
        assert_eq!(coordinator.position(), 0.0);
    }

    #[test]
    fn test_end_of_last_item_pauses() {
        let playlist = Playlist::from_video(video("http://e/a", 10.0));
        let mut coordinator = QueueCoordinator::from_playlist(&playlist, PlayerConfig::default());

        coordinator.play();
        coordinator.set_playhead(10.0);
        coordinator.tick();
        assert!(!coordinator.is_playing());

        // Parked at the end, the end flow does not refire.
        let ends = count_events(coordinator.bus(), types::VIDEO_DID_END);
        coordinator.play();
        coordinator.tick();
        assert_eq!(ends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_end_consequence_can_be_prevented() {
        let mut coordinator = three_item_coordinator();
        let first = coordinator.current_item().unwrap().id();
        coordinator.bus().subscribe(
            types::VIDEO_DID_END,
            Arc::new(|event| event.prevent_default()),
        );

        coordinator.play();
        coordinator.set_playhead(10.0);
        coordinator.tick();

        assert_eq!(coordinator.current_item().unwrap().id(), first);
        assert!(coordinator.is_playing());
    }

    #[test]
    fn test_action_pause_at_item_end() {
        let mut coordinator = three_item_coordinator();
        let first = coordinator.current_item().unwrap().id();
        coordinator.set_action_at_item_end(ActionAtItemEnd::Pause);

        coordinator.play();
        coordinator.set_playhead(10.0);
        coordinator.tick();

        assert_eq!(coordinator.current_item().unwrap().id(), first);
        assert!(!coordinator.is_playing());
    }

    #[test]
    fn test_after_cue_points_fire_at_item_end() {
        let cued = Arc::new(video("http://e/a", 10.0).with_cue_points(vec![CuePoint::new(
            CuePosition::After,
            "postroll",
            Properties::new(),
        )]));
        let mut coordinator =
            QueueCoordinator::from_video(cued, PlayerConfig::default());
        let cues = count_events(coordinator.bus(), types::CUE_POINT);

        coordinator.play();
        coordinator.set_playhead(10.0);
        coordinator.tick();
        coordinator.tick();

        assert_eq!(cues.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_before_cue_points_fire_on_play_from_start() {
        let cued = Arc::new(video("http://e/a", 10.0).with_cue_points(vec![CuePoint::new(
            CuePosition::Before,
            "preroll",
            Properties::new(),
        )]));
        let mut coordinator =
            QueueCoordinator::from_video(cued, PlayerConfig::default());
        let cues = count_events(coordinator.bus(), types::CUE_POINT);
        let done = count_events(coordinator.bus(), types::DID_EMIT_BEFORE_CUE_POINTS);

        coordinator.play();
        assert_eq!(cues.load(Ordering::SeqCst), 1);
        assert_eq!(done.load(Ordering::SeqCst), 1);

        // Pausing and resuming mid-video does not replay the start flow.
        coordinator.pause();
        coordinator.set_playhead(4.0);
        coordinator.play();
        assert_eq!(cues.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_seek_fires_skipped_cues_with_seek_method() {
        let cued = Arc::new(
            video("http://e/a", 10.0)
                .with_cue_points(vec![CuePoint::at(5.0, "marker").unwrap()]),
        );
        let mut coordinator =
            QueueCoordinator::from_video(cued, PlayerConfig::default());

        let methods = Arc::new(Mutex::new(Vec::new()));
        let m = Arc::clone(&methods);
        coordinator.bus().subscribe(
            types::CUE_POINT,
            Arc::new(move |event| {
                if let Some(method) = event.detail(keys::METHOD).and_then(|v| v.as_str()) {
                    m.lock().unwrap().push(method.to_string());
                }
            }),
        );

        coordinator.play();
        coordinator.seek_to(8.0);
        assert_eq!(*methods.lock().unwrap(), vec!["seek".to_string()]);
        assert_eq!(coordinator.position(), 8.0);
    }

    #[test]
    fn test_replace_rendition_preserves_position_and_backing() {
        let mut coordinator = three_item_coordinator();
        let current = coordinator.current_item().unwrap().id();
        let old_handle = coordinator.handles.active().id();
        let replacements = count_events(coordinator.bus(), types::DID_REPLACE_ITEM);

        coordinator.play();
        coordinator.set_playhead(4.0);
        coordinator.replace_rendition(Rendition::from_url("http://e/a-hd"));

        let item = coordinator.current_item().unwrap();
        assert_eq!(item.id(), current);
        let new_handle = item.handle().unwrap();
        assert_ne!(new_handle, old_handle);
        assert_eq!(coordinator.position(), 4.0);
        assert_eq!(
            coordinator
                .handles
                .active()
                .rendition()
                .and_then(|r| r.src_url()),
            Some("http://e/a-hd")
        );
        assert_eq!(replacements.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replace_rendition_rolls_back_when_spare_handle_is_claimed() {
        let mut coordinator = three_item_coordinator();
        let second = coordinator.items()[1].id();
        let spare = coordinator.handles.inactive().id();
        // Claim the spare decoder for another item behind the
        // coordinator's back; the rebind must then be refused.
        coordinator.registry().bind(second, spare).unwrap();

        let old_handle = coordinator.handles.active().id();
        coordinator.replace_rendition(Rendition::from_url("http://e/a-hd"));

        // Replacement rolled back: the current item keeps its handle and
        // rendition, and the spare is unloaded again.
        assert_eq!(coordinator.handles.active().id(), old_handle);
        assert_eq!(
            coordinator.current_item().unwrap().handle(),
            Some(old_handle)
        );
        assert_eq!(
            coordinator
                .handles
                .active()
                .rendition()
                .and_then(|r| r.src_url()),
            Some("http://e/a")
        );
        assert!(!coordinator.handles.inactive().is_loaded());
    }

    #[test]
    fn test_unplayable_first_item_reports_error_and_skips() {
        let playlist = Playlist::from_videos(vec![unplayable_video(), video("http://e/b", 10.0)]);
        let bus = Arc::new(EventBus::new());
        let errors = count_events(&bus, types::ERROR);

        let mut coordinator = QueueCoordinator::with_bus(bus, PlayerConfig::default());
        coordinator.insert_playlist(&playlist, None);

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        // Advance policy skips past the unplayable item.
        let current = coordinator.current_item().unwrap();
        assert_eq!(
            current.video().renditions().count(),
            1,
            "playable item became current"
        );
        assert!(current.is_backed());
    }

    #[test]
    fn test_unplayable_queue_parks_paused() {
        let playlist = Playlist::from_video(unplayable_video());
        let coordinator = QueueCoordinator::from_playlist(&playlist, PlayerConfig::default());
        assert!(!coordinator.is_playing());
        assert!(!coordinator.handles.active().is_loaded());
    }

    #[test]
    fn test_reinserting_queued_video_creates_a_fresh_item() {
        let mut coordinator = three_item_coordinator();
        let first_video = Arc::clone(coordinator.items()[0].video());
        let first_id = coordinator.items()[0].id();

        let again = coordinator.insert_video(first_video, None);
        assert_ne!(again.id(), first_id);
        assert_eq!(coordinator.len(), 4);
    }

    #[test]
    fn test_set_action_at_item_end_announces() {
        let mut coordinator = three_item_coordinator();
        let announced = Arc::new(Mutex::new(None));
        let a = Arc::clone(&announced);
        coordinator.bus().subscribe(
            types::DID_SET_ACTION_AT_ITEM_END,
            Arc::new(move |event| {
                *a.lock().unwrap() = event.detail(keys::ACTION).cloned();
            }),
        );

        coordinator.set_action_at_item_end(ActionAtItemEnd::None);
        assert_eq!(coordinator.action_at_item_end(), ActionAtItemEnd::None);
        assert_eq!(
            announced.lock().unwrap().clone(),
            Some(serde_json::json!("none"))
        );
    }

    #[test]
    fn test_render_target_attachment() {
        let mut coordinator = three_item_coordinator();
        assert!(coordinator.render_target().is_none());

        let target = RenderTarget::new();
        coordinator.attach_render_target(target);
        assert_eq!(coordinator.render_target(), Some(target));

        coordinator.detach_render_target();
        assert!(coordinator.render_target().is_none());
    }
}
