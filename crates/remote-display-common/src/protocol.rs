use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Signaling message tag.
///
/// Candidate tags are named from the viewing (answering) device's point of
/// view: the answerer publishes its own candidates as `local-candidate`, the
/// offerer publishes its own as `remote-candidate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    ConnectRequest,
    Offer,
    Answer,
    LocalCandidate,
    RemoteCandidate,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::ConnectRequest,
        MessageKind::Offer,
        MessageKind::Answer,
        MessageKind::LocalCandidate,
        MessageKind::RemoteCandidate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ConnectRequest => "connect-request",
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::LocalCandidate => "local-candidate",
            MessageKind::RemoteCandidate => "remote-candidate",
        }
    }

    /// Whether messages of this kind carry a payload.
    pub fn has_payload(&self) -> bool {
        !matches!(self, MessageKind::ConnectRequest)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::malformed(format!("unknown message type {s:?}")))
    }
}

/// One relayed signaling message. Payloads are opaque to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl SignalingMessage {
    pub fn new(kind: MessageKind, payload: Option<String>) -> Self {
        Self { kind, payload }
    }

    pub fn connect_request() -> Self {
        Self::new(MessageKind::ConnectRequest, None)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(Error::malformed)
    }

    /// The payload of a payload-bearing kind, or a malformed-payload error.
    pub fn require_payload(&self) -> crate::Result<&str> {
        if !self.kind.has_payload() {
            return Err(Error::malformed(format!("{} carries no payload", self.kind)));
        }
        self.payload
            .as_deref()
            .ok_or_else(|| Error::malformed(format!("{} without payload", self.kind)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description in the browser's `RTCSessionDescriptionInit` JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Parse a relayed payload and check it is the expected kind.
    pub fn parse(payload: &str, expected: SdpKind) -> crate::Result<Self> {
        let desc: SessionDescription = serde_json::from_str(payload).map_err(Error::malformed)?;
        if desc.kind != expected {
            return Err(Error::malformed(format!(
                "expected {expected:?} description, got {:?}",
                desc.kind
            )));
        }
        if desc.sdp.trim().is_empty() {
            return Err(Error::malformed("empty sdp"));
        }
        Ok(desc)
    }

    pub fn to_payload(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Network candidate in the browser's `RTCIceCandidateInit` JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn parse(payload: &str) -> crate::Result<Self> {
        serde_json::from_str(payload).map_err(Error::malformed)
    }

    pub fn to_payload(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
