//! Signaling channels: the two-party message relay that carries offers,
//! answers and trickled candidates between the streaming and viewing devices.

mod relay;
mod ws;

use std::sync::{Arc, Mutex, MutexGuard};

use remote_display_common::{MessageKind, Result, SignalingMessage};

use crate::subscription::{SubscriptionId, SubscriptionIds};

pub use relay::{LocalRelay, RelayEndpoint};
pub use ws::WsSignalingChannel;

pub type SignalHandler = Arc<dyn Fn(SignalingMessage) + Send + Sync>;

/// Bidirectional message channel to the single other party.
///
/// `send` never blocks. It fails with `Error::SignalingUnavailable` when there
/// is nobody to deliver to; such messages are dropped, not queued. Handlers run
/// on the channel's delivery task, once per message of their kind, in receipt
/// order, and should hand work off rather than block.
pub trait SignalingChannel: Send + Sync {
    fn send(&self, kind: MessageKind, payload: Option<String>) -> Result<()>;

    fn subscribe(&self, kind: MessageKind, handler: SignalHandler) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Per-party handler table shared by the channel implementations.
#[derive(Default)]
pub(crate) struct Dispatcher {
    handlers: Mutex<Vec<(SubscriptionId, MessageKind, SignalHandler)>>,
    ids: SubscriptionIds,
}

impl Dispatcher {
    fn handlers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, MessageKind, SignalHandler)>> {
        match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn subscribe(&self, kind: MessageKind, handler: SignalHandler) -> SubscriptionId {
        let id = self.ids.next();
        self.handlers().push((id, kind, handler));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers();
        let before = handlers.len();
        handlers.retain(|(sub, _, _)| *sub != id);
        handlers.len() != before
    }

    /// Invoke every handler registered for the message's kind. Returns how many ran.
    pub(crate) fn dispatch(&self, message: SignalingMessage) -> usize {
        let matching: Vec<SignalHandler> = self
            .handlers()
            .iter()
            .filter(|(_, kind, _)| *kind == message.kind)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        for handler in &matching {
            handler(message.clone());
        }
        matching.len()
    }
}
