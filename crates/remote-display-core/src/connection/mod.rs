//! Connection management: the session state machine, the peer transport seam
//! and its WebRTC implementation.

mod manager;
mod session;
mod state;
mod transport;
mod webrtc;

pub use manager::{ConnectionConfig, ConnectionHandle, ConnectionManager};
pub use session::SessionInfo;
pub use state::{ConnectionState, Role};
pub use transport::{Connectivity, PeerTransport, TransportEvent, TransportEvents, TransportFactory};
pub use webrtc::{WebRtcTrack, WebRtcTransportFactory};
