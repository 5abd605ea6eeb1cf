use std::fmt;
use std::sync::Arc;

use crate::registry::MediaStream;
use crate::subscription::SubscriptionId;

/// Lifecycle events that can change whether a decodable frame is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEvent {
    DataAvailable,
    Stalled,
    Ended,
    Aborted,
    Errored,
}

impl fmt::Display for VideoEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VideoEvent::DataAvailable => "data-available",
            VideoEvent::Stalled => "stalled",
            VideoEvent::Ended => "ended",
            VideoEvent::Aborted => "aborted",
            VideoEvent::Errored => "errored",
        };
        f.write_str(name)
    }
}

pub type VideoEventHandler = Arc<dyn Fn(VideoEvent) + Send + Sync>;

/// The decoder/player the remote stream is attached to. Owned by the host;
/// the surface controller only observes it and routes streams into it.
pub trait VideoSource: Send + Sync {
    /// Decoded frame size, once metadata is known.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// True once at least one decodable frame is available.
    fn is_ready(&self) -> bool;

    fn subscribe(&self, handler: VideoEventHandler) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Point the source at a new stream, or detach it.
    fn attach_stream(&self, stream: Option<MediaStream>);
}
