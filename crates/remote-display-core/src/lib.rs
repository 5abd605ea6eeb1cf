//! Remote display core: pairs a viewing device with a streaming device over a
//! signaling relay, negotiates a peer media transport and presents the
//! resulting video on a curved screen surface.
//!
//! The connection side publishes into a [`StreamRegistry`]; the rendering side
//! ([`DisplaySurfaceController`]) only subscribes to it.

#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
pub mod registry;
pub mod signaling;
pub mod subscription;
pub mod surface;

pub use config::RemoteDisplayConfig;
pub use connection::{
    ConnectionConfig, ConnectionHandle, ConnectionManager, ConnectionState, Role,
    WebRtcTransportFactory,
};
pub use registry::{MediaStream, RemoteTrack, StreamRegistry, TrackKind};
pub use remote_display_common::{Error, Result};
pub use signaling::{LocalRelay, RelayEndpoint, SignalingChannel, WsSignalingChannel};
pub use subscription::{SubscriptionId, SubscriptionIds};
pub use surface::{DisplaySurfaceController, SurfaceConfig, SurfaceKind};
