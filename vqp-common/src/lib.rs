//! # VQP Common Library (vqp-common)
//!
//! Shared value types and the event system for the VQP media-queue
//! playback coordinator.
//!
//! **Purpose:** Define the immutable media data model (videos, renditions,
//! playlists, cue points), the synchronous publish/subscribe event bus with
//! capability-scoped emitters, and shared error/config types used by the
//! player crate.

pub mod config;
pub mod error;
pub mod events;
pub mod media;

pub use error::{Error, Result};
