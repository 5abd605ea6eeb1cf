//! Display surface selection and parameter synchronisation.
//!
//! The controller is driven from the render loop: call `evaluate` once per
//! frame with the current `SurfaceConfig`. Connection state reaches it only
//! through the `StreamRegistry`.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use glam::Vec3;
use remote_display_common::{Error, Result};
use tracing::{debug, info, warn};

use super::geometry::{aspect_ratio, CylinderGeometry, SurfaceConfig, DEFAULT_ASPECT_RATIO};
use super::presentation::{require_presentation, LayerInit, MediaLayer, PresentationContext, VideoTexture};
use super::selection::{select_surface, SurfaceInputs, SurfaceKind};
use super::video::{VideoEvent, VideoSource};
use crate::registry::StreamRegistry;
use crate::subscription::SubscriptionId;

/// What the scene should draw for the active surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyMesh {
    pub geometry: CylinderGeometry,
    pub position: Vec3,
    /// False for the compositor's depth-only occluder.
    pub color_write: bool,
    /// Whether a live video texture is bound.
    pub textured: bool,
}

struct CompositorSurface {
    id: u64,
    layer: Option<Box<dyn MediaLayer>>,
    geometry: CylinderGeometry,
}

impl CompositorSurface {
    fn create(
        id: u64,
        presentation: &dyn PresentationContext,
        config: &SurfaceConfig,
        aspect: f32,
    ) -> Result<Self> {
        let (session, space) = require_presentation(presentation)?;
        let layer = presentation.create_media_layer(&LayerInit {
            session,
            space,
            central_angle: config.central_angle,
            radius: config.radius,
            transform: config.transform,
        })?;
        Ok(Self {
            id,
            layer: Some(layer),
            geometry: CylinderGeometry::for_surface(config, aspect),
        })
    }

    /// Push only the parameters that differ from what the layer already has.
    fn push_parameters(&mut self, config: &SurfaceConfig) {
        let Some(layer) = self.layer.as_mut() else {
            return;
        };
        if layer.central_angle() != config.central_angle {
            layer.set_central_angle(config.central_angle);
        }
        if layer.radius() != config.radius {
            layer.set_radius(config.radius);
        }
        if layer.transform() != config.transform {
            layer.set_transform(config.transform);
        }
    }

    fn layer_aspect(&self) -> Option<f32> {
        self.layer.as_ref().and_then(|l| l.aspect_ratio())
    }

    fn release(&mut self) {
        if let Some(mut layer) = self.layer.take() {
            layer.release();
            debug!(surface = self.id, "released compositor layer");
        }
    }
}

impl Drop for CompositorSurface {
    fn drop(&mut self) {
        self.release();
    }
}

struct FallbackSurface {
    id: u64,
    texture: Option<Box<dyn VideoTexture>>,
    geometry: CylinderGeometry,
}

impl FallbackSurface {
    fn new(id: u64, config: &SurfaceConfig, aspect: f32) -> Self {
        Self {
            id,
            texture: None,
            geometry: CylinderGeometry::for_surface(config, aspect),
        }
    }

    fn bind_texture(&mut self, presentation: &dyn PresentationContext) -> Result<()> {
        if self.texture.is_none() {
            self.texture = Some(presentation.create_video_texture()?);
            debug!(surface = self.id, "bound video texture");
        }
        Ok(())
    }

    fn unbind_texture(&mut self) {
        if let Some(mut texture) = self.texture.take() {
            texture.release();
            debug!(surface = self.id, "released video texture");
        }
    }
}

impl Drop for FallbackSurface {
    fn drop(&mut self) {
        self.unbind_texture();
    }
}

enum ActiveSurface {
    None,
    Compositor(CompositorSurface),
    Fallback(FallbackSurface),
}

impl ActiveSurface {
    fn kind(&self) -> SurfaceKind {
        match self {
            ActiveSurface::None => SurfaceKind::None,
            ActiveSurface::Compositor(_) => SurfaceKind::Compositor,
            ActiveSurface::Fallback(_) => SurfaceKind::Fallback,
        }
    }

    fn id(&self) -> Option<u64> {
        match self {
            ActiveSurface::None => None,
            ActiveSurface::Compositor(s) => Some(s.id),
            ActiveSurface::Fallback(s) => Some(s.id),
        }
    }

    fn geometry_mut(&mut self) -> Option<&mut CylinderGeometry> {
        match self {
            ActiveSurface::None => None,
            ActiveSurface::Compositor(s) => Some(&mut s.geometry),
            ActiveSurface::Fallback(s) => Some(&mut s.geometry),
        }
    }

    fn release(&mut self) {
        match self {
            ActiveSurface::None => {}
            ActiveSurface::Compositor(s) => s.release(),
            ActiveSurface::Fallback(s) => s.unbind_texture(),
        }
    }
}

pub struct DisplaySurfaceController {
    presentation: Arc<dyn PresentationContext>,
    video: Arc<dyn VideoSource>,
    registry: Arc<StreamRegistry>,
    connected: Arc<AtomicBool>,
    video_ready: Arc<AtomicBool>,
    stream_subscription: Option<SubscriptionId>,
    video_subscription: Option<SubscriptionId>,
    active: ActiveSurface,
    applied: Option<SurfaceConfig>,
    next_surface_id: u64,
    last_error: Option<Error>,
    shut_down: bool,
}

impl DisplaySurfaceController {
    /// Subscribe to the registry and the video source. Published streams are
    /// routed into the video source.
    pub fn new(
        registry: Arc<StreamRegistry>,
        presentation: Arc<dyn PresentationContext>,
        video: Arc<dyn VideoSource>,
    ) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        let video_ready = Arc::new(AtomicBool::new(video.is_ready()));

        let video_subscription = {
            let weak: Weak<dyn VideoSource> = Arc::downgrade(&video);
            let video_ready = Arc::clone(&video_ready);
            video.subscribe(Arc::new(move |event: VideoEvent| {
                let ready = weak.upgrade().is_some_and(|v| v.is_ready());
                video_ready.store(ready, Ordering::SeqCst);
                debug!(%event, ready, "video readiness event");
            }))
        };

        let stream_subscription = {
            let connected = Arc::clone(&connected);
            let video_ready = Arc::clone(&video_ready);
            let video = Arc::clone(&video);
            registry.subscribe(move |stream| {
                connected.store(stream.is_some(), Ordering::SeqCst);
                video.attach_stream(stream);
                video_ready.store(video.is_ready(), Ordering::SeqCst);
            })
        };

        Self {
            presentation,
            video,
            registry,
            connected,
            video_ready,
            stream_subscription: Some(stream_subscription),
            video_subscription: Some(video_subscription),
            active: ActiveSurface::None,
            applied: None,
            next_surface_id: 1,
            last_error: None,
            shut_down: false,
        }
    }

    pub fn inputs(&self) -> SurfaceInputs {
        SurfaceInputs {
            connected: self.connected.load(Ordering::SeqCst),
            compositor_capable: self.presentation.supports_media_layers()
                && self.presentation.active_session().is_some(),
            video_ready: self.video_ready.load(Ordering::SeqCst),
        }
    }

    /// Select the surface for the current inputs and push `config` into it.
    pub fn evaluate(&mut self, config: &SurfaceConfig) -> SurfaceKind {
        if self.shut_down {
            return SurfaceKind::None;
        }

        let inputs = self.inputs();
        let desired = select_surface(inputs);
        if desired != self.active.kind() {
            self.switch_to(desired, config);
        }
        self.synchronize(config, inputs.video_ready);
        self.active.kind()
    }

    fn switch_to(&mut self, desired: SurfaceKind, config: &SurfaceConfig) {
        let previous = self.active.kind();
        let mut outgoing = mem::replace(&mut self.active, ActiveSurface::None);
        outgoing.release();
        drop(outgoing);
        self.applied = None;

        let id = self.next_surface_id;
        let aspect = self.current_aspect(None);
        let next = match desired {
            SurfaceKind::None => Ok(ActiveSurface::None),
            SurfaceKind::Compositor => {
                CompositorSurface::create(id, self.presentation.as_ref(), config, aspect)
                    .map(ActiveSurface::Compositor)
            }
            SurfaceKind::Fallback => Ok(ActiveSurface::Fallback(FallbackSurface::new(
                id, config, aspect,
            ))),
        };

        match next {
            Ok(surface) => {
                if surface.id().is_some() {
                    self.next_surface_id += 1;
                }
                self.active = surface;
                self.last_error = None;
                info!(from = %previous, to = %desired, surface = ?self.active.id(), "display surface switched");
            }
            Err(err) => {
                let repeated = self
                    .last_error
                    .as_ref()
                    .is_some_and(|e| mem::discriminant(e) == mem::discriminant(&err));
                if repeated {
                    debug!(surface = %desired, "surface creation still failing: {}", err);
                } else {
                    warn!(surface = %desired, "surface creation failed, rendering none: {}", err);
                }
                self.last_error = Some(err);
            }
        }
    }

    fn synchronize(&mut self, config: &SurfaceConfig, video_ready: bool) {
        if let ActiveSurface::Fallback(surface) = &mut self.active {
            if video_ready {
                if let Err(err) = surface.bind_texture(self.presentation.as_ref()) {
                    warn!(surface = surface.id, "video texture unavailable: {}", err);
                    self.last_error = Some(err);
                }
            } else {
                surface.unbind_texture();
            }
        }

        let config_changed = self.applied.as_ref() != Some(config);
        if config_changed {
            if let ActiveSurface::Compositor(surface) = &mut self.active {
                surface.push_parameters(config);
            }
        }

        let layer_aspect = match &self.active {
            ActiveSurface::Compositor(surface) => surface.layer_aspect(),
            _ => None,
        };
        let aspect = self.current_aspect(layer_aspect);
        if let Some(geometry) = self.active.geometry_mut() {
            if config_changed || geometry.aspect_ratio != aspect {
                *geometry = CylinderGeometry::for_surface(config, aspect);
            }
        }

        if self.active.kind() != SurfaceKind::None {
            self.applied = Some(*config);
        }
    }

    /// Real frame aspect once the video is ready, else what the layer
    /// reports, else 16:9.
    fn current_aspect(&self, layer_aspect: Option<f32>) -> f32 {
        let video_aspect = if self.video_ready.load(Ordering::SeqCst) {
            aspect_ratio(self.video.dimensions())
        } else {
            None
        };
        video_aspect.or(layer_aspect).unwrap_or(DEFAULT_ASPECT_RATIO)
    }

    pub fn active_kind(&self) -> SurfaceKind {
        self.active.kind()
    }

    /// Identity of the active surface; changes only when a surface is rebuilt.
    pub fn surface_id(&self) -> Option<u64> {
        self.active.id()
    }

    pub fn proxy_mesh(&self) -> Option<ProxyMesh> {
        let position = Vec3::new(0.0, self.applied.map(|c| c.transform.position.y)?, 0.0);
        match &self.active {
            ActiveSurface::None => None,
            ActiveSurface::Compositor(surface) => Some(ProxyMesh {
                geometry: surface.geometry,
                position,
                color_write: false,
                textured: false,
            }),
            ActiveSurface::Fallback(surface) => Some(ProxyMesh {
                geometry: surface.geometry,
                position,
                color_write: true,
                textured: surface.texture.is_some(),
            }),
        }
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Release the active surface and detach from the registry and video source.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let mut outgoing = mem::replace(&mut self.active, ActiveSurface::None);
        outgoing.release();
        self.applied = None;
        if let Some(id) = self.stream_subscription.take() {
            self.registry.unsubscribe(id);
        }
        if let Some(id) = self.video_subscription.take() {
            self.video.unsubscribe(id);
        }
        info!("display surface controller shut down");
    }
}

impl Drop for DisplaySurfaceController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
