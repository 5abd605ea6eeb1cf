//! Peer transport backed by the `webrtc` crate.

use std::sync::Arc;

use async_trait::async_trait;
use remote_display_common::{Error, IceCandidate, Result, SdpKind, SessionDescription};
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::state::Role;
use super::transport::{Connectivity, PeerTransport, TransportEvent, TransportEvents, TransportFactory};
use crate::registry::{RemoteTrack, TrackKind};

/// Builds one `RTCPeerConnection` per session with default codecs and
/// interceptors.
pub struct WebRtcTransportFactory {
    role: Role,
    ice_servers: Vec<String>,
}

impl WebRtcTransportFactory {
    /// An empty `ice_servers` list gathers host candidates only.
    pub fn new(role: Role, ice_servers: Vec<String>) -> Self {
        Self { role, ice_servers }
    }

    fn configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(&self, events: TransportEvents) -> Result<Arc<dyn PeerTransport>> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().map_err(Error::transport)?;
        let interceptors =
            register_default_interceptors(Registry::new(), &mut media).map_err(Error::transport)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(interceptors)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(self.configuration())
                .await
                .map_err(Error::transport)?,
        );

        // The offerer has no local tracks; without a transceiver its offer
        // would carry no media section to receive into.
        if self.role == Role::Offerer {
            pc.add_transceiver_from_kind(
                RTPCodecType::Video,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: Vec::new(),
                }),
            )
            .await
            .map_err(Error::transport)?;
        }

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("local candidate gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(TransportEvent::LocalCandidate(from_candidate_init(init)));
                    }
                    Err(e) => warn!("failed to serialize local candidate: {}", e),
                }
            })
        }));

        let tx = events.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = tx.clone();
                Box::pin(async move {
                    debug!(track = %track.id(), kind = ?track.kind(), "remote track");
                    let _ = tx.send(TransportEvent::Track(Arc::new(WebRtcTrack { track })));
                })
            },
        ));

        let tx = events;
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let tx = tx.clone();
            Box::pin(async move {
                if let Some(connectivity) = connectivity_from(state) {
                    let _ = tx.send(TransportEvent::Connectivity(connectivity));
                }
            })
        }));

        Ok(Arc::new(WebRtcTransport { pc }))
    }
}

fn connectivity_from(state: RTCIceConnectionState) -> Option<Connectivity> {
    match state {
        RTCIceConnectionState::New => Some(Connectivity::New),
        RTCIceConnectionState::Checking => Some(Connectivity::Checking),
        RTCIceConnectionState::Connected => Some(Connectivity::Connected),
        RTCIceConnectionState::Completed => Some(Connectivity::Completed),
        RTCIceConnectionState::Disconnected => Some(Connectivity::Disconnected),
        RTCIceConnectionState::Failed => Some(Connectivity::Failed),
        RTCIceConnectionState::Closed => Some(Connectivity::Closed),
        RTCIceConnectionState::Unspecified => None,
    }
}

fn from_candidate_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_candidate_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
    }
    .map_err(Error::transport)
}

struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await.map_err(Error::transport)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(Error::transport)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await.map_err(Error::transport)?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(Error::transport)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(Error::transport)
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(to_candidate_init(candidate))
            .await
            .map_err(Error::transport)
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await.map_err(Error::transport)
    }
}

/// A remote track received over WebRTC. Hosts read RTP from `inner()`.
pub struct WebRtcTrack {
    track: Arc<TrackRemote>,
}

impl WebRtcTrack {
    pub fn inner(&self) -> &Arc<TrackRemote> {
        &self.track
    }
}

impl RemoteTrack for WebRtcTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        }
    }
}
