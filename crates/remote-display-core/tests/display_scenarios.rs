//! End-to-end scenarios: a connection manager feeding a surface controller
//! through the stream registry.

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use remote_display_common::{MessageKind, SessionDescription};
use remote_display_core::connection::{Connectivity, TransportEvent};
use remote_display_core::signaling::SignalingChannel;
use remote_display_core::surface::{PresentationContext, VideoSource};
use remote_display_core::{
    ConnectionConfig, ConnectionHandle, ConnectionManager, ConnectionState,
    DisplaySurfaceController, LocalRelay, RelayEndpoint, Role, StreamRegistry, SurfaceConfig,
    SurfaceKind,
};
use support::*;
use tokio::sync::mpsc;

struct Viewer {
    connection: ConnectionHandle,
    controller: DisplaySurfaceController,
    presentation: Arc<MockPresentation>,
    video: Arc<MockVideo>,
    registry: Arc<StreamRegistry>,
    streamer: RelayEndpoint,
    created: mpsc::UnboundedReceiver<Arc<ScriptedTransport>>,
    _relay: LocalRelay,
}

fn viewer(layers: bool) -> Viewer {
    let relay = LocalRelay::new();
    let endpoint = Arc::new(relay.connect().unwrap());
    let streamer = relay.connect().unwrap();
    let (factory, created) = ScriptedFactory::new();
    let registry = Arc::new(StreamRegistry::new());
    let presentation = MockPresentation::new(layers);
    let video = MockVideo::new();

    let connection = ConnectionManager::spawn(
        ConnectionConfig {
            role: Role::Answerer,
            require_presentation: true,
        },
        endpoint,
        factory,
        Arc::clone(&registry),
        Some(presentation.clone() as Arc<dyn PresentationContext>),
    );
    let controller = DisplaySurfaceController::new(
        Arc::clone(&registry),
        presentation.clone(),
        video.clone() as Arc<dyn VideoSource>,
    );
    Viewer {
        connection,
        controller,
        presentation,
        video,
        registry,
        streamer,
        created,
        _relay: relay,
    }
}

impl Viewer {
    async fn stream_arrives(&mut self) -> Arc<ScriptedTransport> {
        let offer = SessionDescription::offer("v=0\r\ns=streamer\r\n")
            .to_payload()
            .unwrap();
        self.streamer.send(MessageKind::Offer, Some(offer)).unwrap();
        let transport = next_transport(&mut self.created).await;
        transport.emit(TransportEvent::Track(video_track("camera")));
        wait_state(&self.connection, ConnectionState::Connected).await;
        transport
    }
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

#[tokio::test]
async fn test_no_peer_draws_nothing() {
    let mut rig = viewer(true);
    let config = SurfaceConfig::default();

    tokio::time::sleep(Duration::from_millis(50)).await;
    for _ in 0..3 {
        assert_eq!(rig.controller.evaluate(&config), SurfaceKind::None);
    }
    assert!(rig.controller.proxy_mesh().is_none());
    assert_eq!(rig.connection.state(), ConnectionState::Idle);
    assert!(rig.presentation.ledger.take().is_empty());
}

#[tokio::test]
async fn test_compositor_surface_uses_video_aspect() {
    let mut rig = viewer(true);
    let config = SurfaceConfig::default();
    rig.stream_arrives().await;
    assert_eq!(rig.video.attached.lock().unwrap().len(), 2);
    rig.video.frames(1920, 1080);

    assert_eq!(rig.controller.evaluate(&config), SurfaceKind::Compositor);
    assert_eq!(rig.presentation.ledger.take(), vec!["layer-acquire"]);
    let proxy = rig.controller.proxy_mesh().unwrap();
    assert!(!proxy.color_write);
    assert!(!proxy.textured);
    let aspect = 1920.0 / 1080.0;
    assert!(approx(proxy.geometry.aspect_ratio, aspect));
    assert!(approx(
        proxy.geometry.height,
        config.central_angle * config.radius / aspect
    ));
    assert!(approx(proxy.position.y, config.transform.position.y));

    // A resolution change regenerates geometry on the same layer.
    let id = rig.controller.surface_id();
    rig.video.frames(1440, 1080);
    rig.controller.evaluate(&config);
    let proxy = rig.controller.proxy_mesh().unwrap();
    assert!(approx(proxy.geometry.aspect_ratio, 4.0 / 3.0));
    assert_eq!(rig.controller.surface_id(), id);
    assert!(rig.presentation.ledger.take().is_empty());
}

#[tokio::test]
async fn test_fallback_placeholder_then_texture() {
    let mut rig = viewer(false);
    let config = SurfaceConfig::default();
    rig.stream_arrives().await;

    assert_eq!(rig.controller.evaluate(&config), SurfaceKind::Fallback);
    let placeholder = rig.controller.proxy_mesh().unwrap();
    assert!(placeholder.color_write);
    assert!(!placeholder.textured);
    assert!(approx(placeholder.geometry.aspect_ratio, 16.0 / 9.0));
    let id = rig.controller.surface_id();

    rig.video.frames(1280, 960);
    assert_eq!(rig.controller.evaluate(&config), SurfaceKind::Fallback);
    let live = rig.controller.proxy_mesh().unwrap();
    assert!(live.textured);
    assert!(approx(live.geometry.aspect_ratio, 4.0 / 3.0));
    assert_eq!(rig.controller.surface_id(), id);
    assert_eq!(rig.presentation.ledger.take(), vec!["texture-acquire"]);
}

#[tokio::test]
async fn test_failure_releases_surface_once() {
    let mut rig = viewer(true);
    let config = SurfaceConfig::default();
    let withdrawals = Arc::new(Mutex::new(0usize));
    {
        let withdrawals = Arc::clone(&withdrawals);
        rig.registry.subscribe(move |stream| {
            if stream.is_none() {
                *withdrawals.lock().unwrap() += 1;
            }
        });
    }
    let transport = rig.stream_arrives().await;
    rig.controller.evaluate(&config);
    assert_eq!(rig.controller.active_kind(), SurfaceKind::Compositor);

    transport.emit(TransportEvent::Connectivity(Connectivity::Failed));
    wait_state(&rig.connection, ConnectionState::Failed).await;
    for _ in 0..3 {
        assert_eq!(rig.controller.evaluate(&config), SurfaceKind::None);
    }

    let ledger = &rig.presentation.ledger;
    assert_eq!(ledger.count("layer-acquire"), 1);
    assert_eq!(ledger.count("layer-release"), 1);
    assert_eq!(ledger.outstanding(), 0);
    // One for the initial value and one for the teardown.
    assert_eq!(*withdrawals.lock().unwrap(), 2);
    assert!(rig.controller.proxy_mesh().is_none());
}

#[tokio::test]
async fn test_lost_presentation_session_falls_back() {
    let mut rig = viewer(true);
    let config = SurfaceConfig::default();
    rig.stream_arrives().await;
    rig.video.frames(1920, 1080);
    assert_eq!(rig.controller.evaluate(&config), SurfaceKind::Compositor);

    rig.presentation.set_session(false);
    assert_eq!(rig.controller.evaluate(&config), SurfaceKind::Fallback);
    assert!(rig.controller.proxy_mesh().unwrap().textured);
    assert_eq!(
        rig.presentation.ledger.take(),
        vec![
            "layer-acquire",
            "layer-release",
            "texture-acquire"
        ]
    );

    // The connection is unaffected by what the display does.
    assert_eq!(rig.connection.state(), ConnectionState::Connected);
    rig.controller.shutdown();
    assert_eq!(rig.presentation.ledger.outstanding(), 0);
    assert_eq!(rig.video.handler_count(), 0);
}
