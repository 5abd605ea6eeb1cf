//! Single-slot broadcast point for the resolved remote media stream.
//!
//! The connection side publishes, the rendering side subscribes. Nothing else
//! is shared between the two.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;
use uuid::Uuid;

use crate::subscription::{SubscriptionId, SubscriptionIds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A remote media track as delivered by the peer transport.
pub trait RemoteTrack: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> TrackKind;
}

/// A composed stream of remote tracks. Identity is the stream id.
#[derive(Clone)]
pub struct MediaStream {
    id: Uuid,
    tracks: Vec<Arc<dyn RemoteTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn RemoteTrack>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks,
        }
    }

    pub fn with_track(track: Arc<dyn RemoteTrack>) -> Self {
        Self::new(vec![track])
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn RemoteTrack>] {
        &self.tracks
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Video)
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MediaStream {}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let track_ids: Vec<String> = self.tracks.iter().map(|t| t.id()).collect();
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &track_ids)
            .finish()
    }
}

pub type StreamHandler = Arc<dyn Fn(Option<MediaStream>) + Send + Sync>;

struct Slot {
    current: Option<MediaStream>,
    subscribers: Vec<(SubscriptionId, StreamHandler)>,
}

/// Holds the current stream (or its absence) and fans every change out to subscribers.
///
/// Publishes and subscriptions are serialized by one gate, so a subscriber sees
/// the value current when it subscribed and then every later publish, in order.
/// Handlers run synchronously on the publishing thread and must not publish,
/// subscribe or unsubscribe on the same registry.
pub struct StreamRegistry {
    gate: Mutex<()>,
    slot: Mutex<Slot>,
    ids: SubscriptionIds,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            slot: Mutex::new(Slot {
                current: None,
                subscribers: Vec::new(),
            }),
            ids: SubscriptionIds::default(),
        }
    }

    /// Replace the current value and notify every subscriber in subscription order.
    pub fn publish(&self, stream: Option<MediaStream>) {
        let _gate = lock(&self.gate);
        let handlers: Vec<StreamHandler> = {
            let mut slot = lock(&self.slot);
            slot.current = stream.clone();
            slot.subscribers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        debug!(
            stream = ?stream.as_ref().map(MediaStream::id),
            subscribers = handlers.len(),
            "publishing remote stream"
        );
        for handler in handlers {
            handler(stream.clone());
        }
    }

    pub fn current(&self) -> Option<MediaStream> {
        lock(&self.slot).current.clone()
    }

    /// Register a handler; it immediately receives the current value.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Option<MediaStream>) + Send + Sync + 'static,
    {
        let _gate = lock(&self.gate);
        let handler: StreamHandler = Arc::new(handler);
        let id = self.ids.next();
        let current = {
            let mut slot = lock(&self.slot);
            slot.subscribers.push((id, Arc::clone(&handler)));
            slot.current.clone()
        };
        handler(current);
        id
    }

    /// Remove a subscriber. Returns false if it was already gone. Waits for an
    /// in-flight publish, so the handler is never called once this returns.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let _gate = lock(&self.gate);
        let mut slot = lock(&self.slot);
        let before = slot.subscribers.len();
        slot.subscribers.retain(|(sub, _)| *sub != id);
        slot.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.slot).subscribers.len()
    }
}
