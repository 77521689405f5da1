//! Immutable media data model
//!
//! Value types describing playable content: a [`Video`] carries rendition
//! sets, free-form properties, and cue points; a [`Playlist`] is an ordered
//! sequence of videos. All types are immutable after construction; derived
//! copies (for example [`Video::with_cue_points`]) share rendition and
//! property storage instead of mutating in place.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Free-form key/value property mapping used throughout the data model.
///
/// JSON-valued so the key set stays open and forward compatible.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Property key under which a rendition's source locator is stored.
pub const PROP_URL: &str = "url";

/// Property key for a video's duration in seconds.
pub const PROP_DURATION: &str = "duration";

// ========================================
// Rendition / RenditionSet
// ========================================

/// A single encoded variant of a video.
///
/// A rendition is playable only if its properties resolve to a source
/// locator (the `url` property).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rendition {
    properties: Properties,
}

impl Rendition {
    /// Create a rendition from a property mapping.
    pub fn new(properties: Properties) -> Self {
        Self { properties }
    }

    /// Convenience constructor for the common URL-only case.
    pub fn from_url(url: impl Into<String>) -> Self {
        let mut properties = Properties::new();
        properties.insert(PROP_URL.to_string(), serde_json::Value::String(url.into()));
        Self { properties }
    }

    /// Properties describing this rendition.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// The source locator for this rendition, if one is present.
    pub fn src_url(&self) -> Option<&str> {
        self.properties.get(PROP_URL).and_then(|v| v.as_str())
    }
}

/// A group of renditions sharing one delivery method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenditionSet {
    delivery_method: String,
    renditions: Vec<Rendition>,
}

impl RenditionSet {
    /// Create a rendition set with a delivery-method tag (for example a
    /// streaming protocol identifier) and an ordered list of renditions.
    pub fn new(delivery_method: impl Into<String>, renditions: Vec<Rendition>) -> Self {
        Self {
            delivery_method: delivery_method.into(),
            renditions,
        }
    }

    /// Convenience constructor for a single rendition.
    pub fn from_rendition(delivery_method: impl Into<String>, rendition: Rendition) -> Self {
        Self::new(delivery_method, vec![rendition])
    }

    /// The delivery-method tag shared by all renditions in this set.
    pub fn delivery_method(&self) -> &str {
        &self.delivery_method
    }

    /// Renditions in this set, in order.
    pub fn renditions(&self) -> &[Rendition] {
        &self.renditions
    }
}

// ========================================
// CuePoint
// ========================================

/// Timeline anchor of a cue point.
///
/// Wire encoding is the literal string `"before"`, the literal string
/// `"after"`, or a decimal number of seconds (for example `"4.125"`).
///
/// Ordering is total: `Before` sorts first, `After` sorts last, and
/// numeric positions sort by value. Non-finite positions are rejected at
/// parse/construction time so the ordering stays total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CuePosition {
    /// Fires immediately before playback begins at the start of a video.
    Before,
    /// Fires at the given offset (seconds) into the video.
    At(f64),
    /// Fires immediately after a video ends.
    After,
}

impl CuePosition {
    /// Parse the textual wire encoding.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "before" => Ok(CuePosition::Before),
            "after" => Ok(CuePosition::After),
            other => {
                let seconds: f64 = other
                    .parse()
                    .map_err(|_| Error::InvalidCuePoint(format!("bad position {:?}", other)))?;
                Self::at(seconds)
            }
        }
    }

    /// Construct a numeric position, rejecting non-finite values.
    pub fn at(seconds: f64) -> Result<Self> {
        if !seconds.is_finite() {
            return Err(Error::InvalidCuePoint(format!(
                "non-finite position {}",
                seconds
            )));
        }
        Ok(CuePosition::At(seconds))
    }

    /// The numeric offset, if this is an interval position.
    pub fn seconds(&self) -> Option<f64> {
        match self {
            CuePosition::At(s) => Some(*s),
            _ => None,
        }
    }
}

impl fmt::Display for CuePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CuePosition::Before => write!(f, "before"),
            CuePosition::After => write!(f, "after"),
            CuePosition::At(seconds) => write!(f, "{}", seconds),
        }
    }
}

impl TryFrom<String> for CuePosition {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        CuePosition::parse(&s)
    }
}

impl From<CuePosition> for String {
    fn from(p: CuePosition) -> String {
        p.to_string()
    }
}

impl Eq for CuePosition {}

impl Ord for CuePosition {
    fn cmp(&self, other: &Self) -> Ordering {
        use CuePosition::*;
        match (self, other) {
            (Before, Before) | (After, After) => Ordering::Equal,
            (Before, _) => Ordering::Less,
            (_, Before) => Ordering::Greater,
            (After, _) => Ordering::Greater,
            (_, After) => Ordering::Less,
            // Positions are finite by construction
            (At(a), At(b)) => a.total_cmp(b),
        }
    }
}

impl PartialOrd for CuePosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A timeline marker with a classification tag and arbitrary properties.
///
/// The `type` tag has no intrinsic meaning; listening components assign
/// their own (ad markers, chapter markers, analytics beacons, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuePoint {
    position: CuePosition,
    #[serde(rename = "type")]
    cue_type: String,
    #[serde(default)]
    properties: Properties,
}

impl CuePoint {
    /// Create a cue point with a position, type tag, and properties.
    pub fn new(position: CuePosition, cue_type: impl Into<String>, properties: Properties) -> Self {
        Self {
            position,
            cue_type: cue_type.into(),
            properties,
        }
    }

    /// Create a cue point at a numeric offset with no properties.
    pub fn at(seconds: f64, cue_type: impl Into<String>) -> Result<Self> {
        Ok(Self::new(
            CuePosition::at(seconds)?,
            cue_type,
            Properties::new(),
        ))
    }

    /// Timeline anchor of this cue point.
    pub fn position(&self) -> &CuePosition {
        &self.position
    }

    /// Classification tag of this cue point.
    pub fn cue_type(&self) -> &str {
        &self.cue_type
    }

    /// Properties of this cue point.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Position-based total comparison: `before` first, `after` last,
    /// numeric positions by value.
    pub fn cmp_position(&self, other: &CuePoint) -> Ordering {
        self.position.cmp(&other.position)
    }
}

// ========================================
// Video / Playlist
// ========================================

/// Immutable description of playable content.
///
/// Rendition sets and properties are shared (via `Arc`) between a video
/// and its derived copies; only the cue point list differs between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    rendition_sets: Arc<Vec<RenditionSet>>,
    properties: Arc<Properties>,
    #[serde(default)]
    cue_points: Vec<CuePoint>,
}

impl Video {
    /// Create a video from rendition sets and properties.
    pub fn new(rendition_sets: Vec<RenditionSet>, properties: Properties) -> Self {
        Self {
            rendition_sets: Arc::new(rendition_sets),
            properties: Arc::new(properties),
            cue_points: Vec::new(),
        }
    }

    /// Convenience constructor for a single rendition set.
    pub fn from_rendition_set(set: RenditionSet, properties: Properties) -> Self {
        Self::new(vec![set], properties)
    }

    /// Convenience constructor for a single rendition (placed in a set
    /// with an empty delivery-method tag).
    pub fn from_rendition(rendition: Rendition, properties: Properties) -> Self {
        Self::from_rendition_set(RenditionSet::from_rendition("", rendition), properties)
    }

    /// Convenience constructor for a bare source URL.
    pub fn from_url(url: impl Into<String>, properties: Properties) -> Self {
        Self::from_rendition(Rendition::from_url(url), properties)
    }

    /// Derived copy with the given cue points, sharing rendition sets and
    /// properties with `self`. The cue points are sorted by position.
    pub fn with_cue_points(&self, mut cue_points: Vec<CuePoint>) -> Video {
        cue_points.sort_by(|a, b| a.cmp_position(b));
        Video {
            rendition_sets: Arc::clone(&self.rendition_sets),
            properties: Arc::clone(&self.properties),
            cue_points,
        }
    }

    /// Rendition sets for this video, in order.
    pub fn rendition_sets(&self) -> &[RenditionSet] {
        &self.rendition_sets
    }

    /// Iterate all renditions across all rendition sets, in order.
    pub fn renditions(&self) -> impl Iterator<Item = &Rendition> {
        self.rendition_sets.iter().flat_map(|s| s.renditions().iter())
    }

    /// Properties of this video (for example name, description).
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Cue points associated with this video, sorted by position.
    pub fn cue_points(&self) -> &[CuePoint] {
        &self.cue_points
    }

    /// Duration in seconds, when the `duration` property is present.
    pub fn duration(&self) -> Option<f64> {
        self.properties.get(PROP_DURATION).and_then(|v| v.as_f64())
    }
}

/// An ordered sequence of videos plus a property mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    videos: Vec<Arc<Video>>,
    #[serde(default)]
    properties: Properties,
}

impl Playlist {
    /// Create a playlist from videos and properties.
    pub fn new(videos: Vec<Arc<Video>>, properties: Properties) -> Self {
        Self { videos, properties }
    }

    /// Convenience constructor without properties.
    pub fn from_videos(videos: Vec<Arc<Video>>) -> Self {
        Self::new(videos, Properties::new())
    }

    /// Convenience constructor for a single video.
    pub fn from_video(video: Arc<Video>) -> Self {
        Self::from_videos(vec![video])
    }

    /// Videos in this playlist, in order.
    pub fn videos(&self) -> &[Arc<Video>] {
        &self.videos
    }

    /// Properties of this playlist.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Number of videos in the playlist.
    pub fn len(&self) -> usize {
        self.videos.len()
    }

    /// Whether the playlist holds no videos.
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}
