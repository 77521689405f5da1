//! Playback engine
//!
//! Queue coordination over a pair of decoder handles, cue point
//! scheduling, rendition selection, and the heartbeat task that drives
//! them.

pub mod coordinator;
pub mod handle;
pub mod item;
pub mod monitor;
pub mod scheduler;
pub mod selector;

pub use coordinator::QueueCoordinator;
pub use handle::{DecoderHandle, HandleId, HandlePair, RenderTarget};
pub use item::{ItemId, ItemRegistry, PlayerItem};
pub use monitor::start_position_monitor;
pub use scheduler::CuePointScheduler;
pub use selector::{FirstPlayable, RenditionPolicy, RenditionSelector};
