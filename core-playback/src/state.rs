use std::sync::Arc;

use chrono::{DateTime, Utc};

use core_library::{ContentItem, TagId};

/// A resolved playback request: the scanned tag plus the cached content it
/// resolved to.
#[derive(Debug, Clone)]
pub struct PlaybackJob {
    pub tag_id: TagId,
    pub item: Arc<ContentItem>,
    pub enqueued_at: DateTime<Utc>,
}

impl PlaybackJob {
    pub fn new(tag_id: TagId, item: Arc<ContentItem>) -> Self {
        Self {
            tag_id,
            item,
            enqueued_at: Utc::now(),
        }
    }
}

/// Coordinator state as observed from outside. At most one job is ever
/// active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Resolving(TagId),
    Playing(TagId),
    /// A newer scan arrived; the named playback is being stopped and its
    /// termination confirmed before anything else runs.
    Preempting(TagId),
}

/// Emitted whenever the decoder slot frees up, so consumers (the display
/// process over the ready channel, tests over the broadcast) never wait on
/// a playback that already ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessEvent {
    /// The decoder ran to the end of the audio.
    NaturalFinish(TagId),
    /// Playback was cut short by a newer scan.
    Preempted(TagId),
    /// The decoder could not be started for this tag.
    Failed(TagId),
}

impl ReadinessEvent {
    pub fn tag_id(&self) -> &TagId {
        match self {
            ReadinessEvent::NaturalFinish(tag)
            | ReadinessEvent::Preempted(tag)
            | ReadinessEvent::Failed(tag) => tag,
        }
    }
}
