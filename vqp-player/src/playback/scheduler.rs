//! Cue point scheduling
//!
//! Tracks the playhead across one video's timeline and turns playhead
//! movement into `"cue point"` events. Mid-roll detection is interval
//! based: each check covers the span between the last checked position and
//! the new one, so cue points are never missed between coarse ticks, in
//! either direction. Start (`before`) and end (`after`) cue points are
//! armed flows that fire exactly once per arrival.

use std::sync::Arc;

use tracing::debug;
use vqp_common::events::{keys, types, Capabilities, CheckMethod, Details, Event, EventBus, ScopedEmitter};
use vqp_common::media::{CuePoint, CuePosition, Video};

const CAPABILITIES: Capabilities = Capabilities {
    component: "cue-point-scheduler",
    emits: &[types::CUE_POINT, types::DID_EMIT_BEFORE_CUE_POINTS],
    listens: &[],
};

/// Per-video cue point tracker.
///
/// Bound to the current item's cue point list by the coordinator, which
/// drives it from ticks, seeks, playback start, and item end.
pub struct CuePointScheduler {
    emitter: ScopedEmitter,
    cue_points: Vec<CuePoint>,
    /// Playhead position covered by the last check. `None` until the first
    /// check or playback start establishes a baseline.
    last_position: Option<f64>,
    before_armed: bool,
    end_armed: bool,
}

impl CuePointScheduler {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            emitter: ScopedEmitter::new(bus, CAPABILITIES),
            cue_points: Vec::new(),
            last_position: None,
            before_armed: true,
            end_armed: true,
        }
    }

    /// Adopt a new cue point list (sorted by position) and reset all
    /// tracking state, as when the queue advances to a new item.
    pub fn set_cue_points(&mut self, mut cue_points: Vec<CuePoint>) {
        cue_points.sort_by(|a, b| a.cmp_position(b));
        self.cue_points = cue_points;
        self.last_position = None;
        self.before_armed = true;
        self.end_armed = true;
    }

    /// Adopt the cue points of `video`.
    pub fn bind_video(&mut self, video: &Video) {
        self.set_cue_points(video.cue_points().to_vec());
    }

    /// Drop all cue points and tracking state.
    pub fn clear(&mut self) {
        self.set_cue_points(Vec::new());
    }

    /// Fire the `before` cue points, once per arrival at the start of the
    /// video. Publishes `"did emit before cue points"` afterwards so the
    /// caller knows the start flow ran, even when there were no `before`
    /// cues. Establishes position zero as the check baseline.
    pub fn check_start(&mut self) -> Option<Arc<Event>> {
        if !self.before_armed {
            return None;
        }
        self.before_armed = false;
        self.last_position = Some(0.0);

        let before: Vec<&CuePoint> = self
            .cue_points
            .iter()
            .filter(|c| matches!(c.position(), CuePosition::Before))
            .collect();
        let fired = if before.is_empty() {
            None
        } else {
            Some(self.emit_cue_points(&before, 0.0, 0.0, CheckMethod::Play))
        };
        self.emitter
            .publish(types::DID_EMIT_BEFORE_CUE_POINTS, Details::new());
        fired
    }

    /// Check for mid-roll cue points passed since the last check.
    ///
    /// The covered interval excludes the previously checked position and
    /// includes the new one, in either direction, so consecutive checks
    /// tile the timeline without double-firing. The first check after a
    /// reset only establishes the baseline.
    pub fn check_mid(&mut self, position: f64, method: CheckMethod) -> Option<Arc<Event>> {
        let previous = match self.last_position.replace(position) {
            Some(p) => p,
            None => {
                debug!("cue baseline established at {}", position);
                return None;
            }
        };
        if previous == position {
            return None;
        }

        let forward = position > previous;
        let fired: Vec<&CuePoint> = self
            .cue_points
            .iter()
            .filter(|c| match c.position().seconds() {
                Some(t) if forward => t > previous && t <= position,
                Some(t) => t >= position && t < previous,
                None => false,
            })
            .collect();
        if fired.is_empty() {
            return None;
        }

        let (low, high) = if forward {
            (previous, position)
        } else {
            (position, previous)
        };
        Some(self.emit_cue_points(&fired, low, high, method))
    }

    /// Fire the `after` cue points, once per arrival at the end of the
    /// video. Repeated calls while parked at the end are no-ops until
    /// [`CuePointScheduler::rearm_end`].
    pub fn check_end(&mut self, position: f64) -> Option<Arc<Event>> {
        if !self.end_armed {
            return None;
        }
        self.end_armed = false;

        let after: Vec<&CuePoint> = self
            .cue_points
            .iter()
            .filter(|c| matches!(c.position(), CuePosition::After))
            .collect();
        if after.is_empty() {
            return None;
        }
        Some(self.emit_cue_points(&after, position, position, CheckMethod::Play))
    }

    /// Re-arm the end flow after the playhead leaves the end of the video.
    pub fn rearm_end(&mut self) {
        self.end_armed = true;
    }

    /// Re-arm the start flow after the playhead returns to position zero.
    pub fn rearm_before(&mut self) {
        self.before_armed = true;
    }

    fn emit_cue_points(
        &self,
        cue_points: &[&CuePoint],
        start: f64,
        end: f64,
        method: CheckMethod,
    ) -> Arc<Event> {
        debug!(
            "firing {} cue point(s) in [{}, {}] via {}",
            cue_points.len(),
            start,
            end,
            method.as_str()
        );
        let mut details = Details::new();
        details.insert(
            keys::CUE_POINTS.to_string(),
            serde_json::Value::Array(
                cue_points
                    .iter()
                    .filter_map(|c| serde_json::to_value(c).ok())
                    .collect(),
            ),
        );
        details.insert(keys::START_TIME.to_string(), serde_json::json!(start));
        details.insert(keys::END_TIME.to_string(), serde_json::json!(end));
        details.insert(
            keys::METHOD.to_string(),
            serde_json::Value::String(method.as_str().to_string()),
        );
        self.emitter.publish(types::CUE_POINT, details)
    }
}
