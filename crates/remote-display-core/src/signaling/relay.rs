//! In-process two-party relay.
//!
//! Each endpoint owns an unbounded inbox drained by its own delivery task, so
//! a send never blocks and handlers for one endpoint run strictly in receipt
//! order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use remote_display_common::{Error, MessageKind, Result, SignalingMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Dispatcher, SignalHandler, SignalingChannel};
use crate::subscription::SubscriptionId;

const MAX_PARTIES: usize = 2;

struct Party {
    id: u64,
    inbox: mpsc::UnboundedSender<SignalingMessage>,
}

#[derive(Default)]
struct RelayInner {
    parties: Mutex<[Option<Party>; MAX_PARTIES]>,
    next_party: AtomicU64,
}

impl RelayInner {
    fn parties(&self) -> MutexGuard<'_, [Option<Party>; MAX_PARTIES]> {
        match self.parties.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Relay shared by exactly two parties. Cloning shares the same relay.
#[derive(Clone, Default)]
pub struct LocalRelay {
    inner: Arc<RelayInner>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new party. Must be called inside a tokio runtime.
    pub fn connect(&self) -> Result<RelayEndpoint> {
        let (tx, mut rx) = mpsc::unbounded_channel::<SignalingMessage>();
        let party_id = self.inner.next_party.fetch_add(1, Ordering::Relaxed) + 1;

        {
            let mut parties = self.inner.parties();
            let slot = parties
                .iter_mut()
                .find(|p| p.is_none())
                .ok_or(Error::RelayFull)?;
            *slot = Some(Party {
                id: party_id,
                inbox: tx,
            });
        }

        let dispatcher = Arc::new(Dispatcher::default());
        let delivery = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    let kind = message.kind;
                    if dispatcher.dispatch(message) == 0 {
                        debug!(party = party_id, %kind, "no handler for relayed message");
                    }
                }
            })
        };

        info!(party = party_id, "party joined signaling relay");
        Ok(RelayEndpoint {
            relay: Arc::clone(&self.inner),
            party_id,
            dispatcher,
            delivery,
        })
    }

    pub fn party_count(&self) -> usize {
        self.inner.parties().iter().filter(|p| p.is_some()).count()
    }
}

/// One party's view of a `LocalRelay`.
pub struct RelayEndpoint {
    relay: Arc<RelayInner>,
    party_id: u64,
    dispatcher: Arc<Dispatcher>,
    delivery: JoinHandle<()>,
}

impl RelayEndpoint {
    pub fn party_id(&self) -> u64 {
        self.party_id
    }

    pub fn is_connected(&self) -> bool {
        self.relay
            .parties()
            .iter()
            .flatten()
            .any(|p| p.id == self.party_id)
    }

    /// Leave the relay. Messages already queued for this party are still delivered.
    pub fn disconnect(&self) {
        let mut parties = self.relay.parties();
        for slot in parties.iter_mut() {
            if slot.as_ref().is_some_and(|p| p.id == self.party_id) {
                *slot = None;
                info!(party = self.party_id, "party left signaling relay");
            }
        }
    }
}

impl SignalingChannel for RelayEndpoint {
    fn send(&self, kind: MessageKind, payload: Option<String>) -> Result<()> {
        let parties = self.relay.parties();
        if !parties.iter().flatten().any(|p| p.id == self.party_id) {
            return Err(Error::SignalingUnavailable);
        }
        let peer = parties
            .iter()
            .flatten()
            .find(|p| p.id != self.party_id)
            .ok_or(Error::SignalingUnavailable)?;
        debug!(from = self.party_id, to = peer.id, %kind, "forwarding");
        peer.inbox
            .send(SignalingMessage::new(kind, payload))
            .map_err(|_| Error::SignalingUnavailable)
    }

    fn subscribe(&self, kind: MessageKind, handler: SignalHandler) -> SubscriptionId {
        self.dispatcher.subscribe(kind, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }
}

impl Drop for RelayEndpoint {
    fn drop(&mut self) {
        self.disconnect();
        self.delivery.abort();
    }
}
