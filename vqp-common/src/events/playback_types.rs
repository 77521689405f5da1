//! Playback-related supporting types shared across the event system

use serde::{Deserialize, Serialize};

/// Coarse playback state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Policy governing queue behavior when the current item finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionAtItemEnd {
    /// Advance to the next item if one exists.
    #[default]
    Advance,
    /// Pause on the finished item.
    Pause,
    /// Do nothing; stay parked at the end of the item.
    None,
}

/// The kind of playhead activity that precipitated a cue point check.
///
/// Serialized into the `method` detail of `"cue point"` events as
/// `"play"` or `"seek"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMethod {
    Play,
    Seek,
}

impl CheckMethod {
    /// The wire string carried in cue point event details.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckMethod::Play => "play",
            CheckMethod::Seek => "seek",
        }
    }
}
