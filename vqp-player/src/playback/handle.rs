//! Decoder handle pair and render target
//!
//! A [`DecoderHandle`] is an opaque stand-in for one instance of the
//! underlying playback engine. The coordinator owns exactly two of them,
//! paired in a [`HandlePair`]: the active handle backs the current item
//! while the inactive handle is preloaded with the next item's rendition,
//! so advancing the queue swaps role tags instead of constructing a
//! decoder cold.

use std::fmt;

use tracing::debug;
use uuid::Uuid;
use vqp_common::media::Rendition;

/// Stable identifier for one decoder handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One instance of the underlying playback engine.
///
/// Exclusively owned by the coordinator; never bound to more than one
/// player item at a time (the item registry enforces the binding side).
#[derive(Debug)]
pub struct DecoderHandle {
    id: HandleId,
    rendition: Option<Rendition>,
    position: f64,
}

impl DecoderHandle {
    pub fn new() -> Self {
        Self {
            id: HandleId::new(),
            rendition: None,
            position: 0.0,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Load a rendition, replacing whatever was loaded before and
    /// resetting the playhead.
    pub fn load(&mut self, rendition: Rendition) {
        debug!("handle {} loading {:?}", self.id, rendition.src_url());
        self.rendition = Some(rendition);
        self.position = 0.0;
    }

    /// Release the loaded rendition and reset the playhead.
    pub fn unload(&mut self) {
        if self.rendition.take().is_some() {
            debug!("handle {} unloaded", self.id);
        }
        self.position = 0.0;
    }

    pub fn rendition(&self) -> Option<&Rendition> {
        self.rendition.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.rendition.is_some()
    }

    /// Current playhead position in seconds.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Report the playhead position (driven by the embedding engine or
    /// by seeks).
    pub fn set_position(&mut self, position: f64) {
        self.position = position.max(0.0);
    }
}

impl Default for DecoderHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The coordinator's two decoder handles, tagged active/inactive.
#[derive(Debug)]
pub struct HandlePair {
    a: DecoderHandle,
    b: DecoderHandle,
    active_is_a: bool,
}

impl HandlePair {
    pub fn new() -> Self {
        Self {
            a: DecoderHandle::new(),
            b: DecoderHandle::new(),
            active_is_a: true,
        }
    }

    pub fn active(&self) -> &DecoderHandle {
        if self.active_is_a {
            &self.a
        } else {
            &self.b
        }
    }

    pub fn active_mut(&mut self) -> &mut DecoderHandle {
        if self.active_is_a {
            &mut self.a
        } else {
            &mut self.b
        }
    }

    pub fn inactive(&self) -> &DecoderHandle {
        if self.active_is_a {
            &self.b
        } else {
            &self.a
        }
    }

    pub fn inactive_mut(&mut self) -> &mut DecoderHandle {
        if self.active_is_a {
            &mut self.b
        } else {
            &mut self.a
        }
    }

    /// Swap the active/inactive role tags. The handles themselves (and
    /// whatever they have loaded) are untouched.
    pub fn swap_roles(&mut self) {
        self.active_is_a = !self.active_is_a;
        debug!(
            "handle roles swapped; active is now {}",
            self.active().id()
        );
    }

    /// Unload both handles.
    pub fn release_both(&mut self) {
        self.a.unload();
        self.b.unload();
    }
}

impl Default for HandlePair {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque render-target handle a hosting surface attaches to.
///
/// Sizing and layout are the host's concern; the coordinator only tracks
/// attachment identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTarget(Uuid);

impl RenderTarget {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_unload() {
        let mut handle = DecoderHandle::new();
        assert!(!handle.is_loaded());

        handle.load(Rendition::from_url("http://example.com/v.m3u8"));
        assert!(handle.is_loaded());
        assert_eq!(handle.position(), 0.0);

        handle.set_position(12.5);
        assert_eq!(handle.position(), 12.5);

        handle.unload();
        assert!(!handle.is_loaded());
        assert_eq!(handle.position(), 0.0);
    }

    #[test]
    fn test_position_clamped_to_zero() {
        let mut handle = DecoderHandle::new();
        handle.set_position(-3.0);
        assert_eq!(handle.position(), 0.0);
    }

    #[test]
    fn test_inactive_mut_never_touches_the_active_handle() {
        let mut pair = HandlePair::new();
        pair.active_mut()
            .load(Rendition::from_url("http://example.com/current.m3u8"));
        pair.active_mut().set_position(7.0);

        // Preloading through the inactive slot must leave the playing
        // handle untouched, in both role orientations.
        pair.inactive_mut()
            .load(Rendition::from_url("http://example.com/next.m3u8"));
        assert_eq!(
            pair.active().rendition().and_then(|r| r.src_url()),
            Some("http://example.com/current.m3u8")
        );
        assert_eq!(pair.active().position(), 7.0);
        assert_eq!(pair.active_mut().id(), pair.active().id());

        pair.swap_roles();
        pair.inactive_mut()
            .load(Rendition::from_url("http://example.com/after-next.m3u8"));
        assert_eq!(
            pair.active().rendition().and_then(|r| r.src_url()),
            Some("http://example.com/next.m3u8")
        );
        assert_eq!(pair.inactive_mut().id(), pair.inactive().id());
    }

    #[test]
    fn test_swap_roles_preserves_loads() {
        let mut pair = HandlePair::new();
        let active_id = pair.active().id();
        let inactive_id = pair.inactive().id();
        assert_ne!(active_id, inactive_id);

        pair.inactive_mut()
            .load(Rendition::from_url("http://example.com/next.m3u8"));

        pair.swap_roles();
        assert_eq!(pair.active().id(), inactive_id);
        assert_eq!(pair.inactive().id(), active_id);
        assert!(pair.active().is_loaded());
        assert!(!pair.inactive().is_loaded());
    }

    #[test]
    fn test_release_both() {
        let mut pair = HandlePair::new();
        pair.active_mut().load(Rendition::from_url("a"));
        pair.inactive_mut().load(Rendition::from_url("b"));

        pair.release_both();
        assert!(!pair.active().is_loaded());
        assert!(!pair.inactive().is_loaded());
    }
}
