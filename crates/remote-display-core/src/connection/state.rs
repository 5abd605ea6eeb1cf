//! Connection lifecycle states.
//!
//! - IDLE: no transport; waiting for the peer to announce itself (offerer) or
//!   for an offer (answerer)
//! - NEGOTIATING: transport created, descriptions and candidates in flight
//! - CONNECTED: the transport delivered a media track; stream published
//! - FAILED / CLOSED: transport ended; session torn down

use std::fmt;

use remote_display_common::MessageKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }

    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (*self, next) {
            (Idle, Negotiating) => true,
            (Negotiating, Connected) => true,
            (Negotiating | Connected, Failed | Closed) => true,
            // A peer announcing itself again starts a fresh session.
            (Failed | Closed, Negotiating) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which side of the offer/answer exchange this party plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Streaming device: produces the offer.
    Offerer,
    /// Viewing device: consumes the offer and produces the answer.
    Answerer,
}

impl Role {
    /// Tag under which this role sends its own candidates.
    pub fn outbound_candidate_kind(&self) -> MessageKind {
        match self {
            Role::Answerer => MessageKind::LocalCandidate,
            Role::Offerer => MessageKind::RemoteCandidate,
        }
    }

    /// Tag under which this role receives the peer's candidates.
    pub fn inbound_candidate_kind(&self) -> MessageKind {
        match self {
            Role::Answerer => MessageKind::RemoteCandidate,
            Role::Offerer => MessageKind::LocalCandidate,
        }
    }

    /// Description kind this role receives from the peer.
    pub fn inbound_description_kind(&self) -> MessageKind {
        match self {
            Role::Answerer => MessageKind::Offer,
            Role::Offerer => MessageKind::Answer,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = remote_display_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offerer" | "offer" | "streamer" => Ok(Role::Offerer),
            "answerer" | "answer" | "viewer" => Ok(Role::Answerer),
            other => Err(remote_display_common::Error::config(format!(
                "unknown role {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Offerer => f.write_str("offerer"),
            Role::Answerer => f.write_str("answerer"),
        }
    }
}
