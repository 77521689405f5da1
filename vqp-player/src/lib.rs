//! VQP Player
//!
//! Event-driven media queue playback: an ordered queue of player items is
//! played gaplessly by double-buffering two decoder handles, with cue
//! points, rendition selection, and catalog lookup all coordinated over
//! the shared event bus from `vqp-common`.

pub mod catalog;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
pub use playback::QueueCoordinator;
