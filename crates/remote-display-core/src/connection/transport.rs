use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use remote_display_common::{IceCandidate, Result, SessionDescription};
use tokio::sync::mpsc;

use crate::registry::RemoteTrack;

/// Connectivity reported by the transport's ICE agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl Connectivity {
    /// Disconnected, failed and closed all end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Connectivity::Disconnected | Connectivity::Failed | Connectivity::Closed
        )
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Events raised by a transport toward its owning session.
#[derive(Clone)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    Track(Arc<dyn RemoteTrack>),
    Connectivity(Connectivity),
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::LocalCandidate(c) => {
                f.debug_tuple("LocalCandidate").field(&c.candidate).finish()
            }
            TransportEvent::Track(t) => f.debug_tuple("Track").field(&t.id()).finish(),
            TransportEvent::Connectivity(c) => f.debug_tuple("Connectivity").field(c).finish(),
        }
    }
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// One peer-to-peer media transport.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create an offer and install it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Create an answer to the installed remote offer and install it locally.
    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Builds transports; events for the new transport go to `events`.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, events: TransportEvents) -> Result<Arc<dyn PeerTransport>>;
}
