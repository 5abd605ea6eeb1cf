use remote_display_common::{Error, Result};

use super::geometry::RigidTransform;

/// Opaque handle to the host's active immersive presentation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresentationSessionId(pub u64);

/// Opaque handle to the presentation's reference space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceSpaceId(pub u64);

/// Parameters for a compositor-managed cylinder layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerInit {
    pub session: PresentationSessionId,
    pub space: ReferenceSpaceId,
    pub central_angle: f32,
    pub radius: f32,
    pub transform: RigidTransform,
}

/// A compositor-managed media layer bound to the live video.
pub trait MediaLayer: Send {
    fn central_angle(&self) -> f32;
    fn set_central_angle(&mut self, angle: f32);

    fn radius(&self) -> f32;
    fn set_radius(&mut self, radius: f32);

    fn transform(&self) -> RigidTransform;
    fn set_transform(&mut self, transform: RigidTransform);

    /// Aspect ratio the compositor derived from the video, if known.
    fn aspect_ratio(&self) -> Option<f32> {
        None
    }

    /// Unregister the layer from the presentation session.
    fn release(&mut self);
}

/// A GPU texture sampling the live video frame.
pub trait VideoTexture: Send {
    fn release(&mut self);
}

/// Host rendering/presentation context. The core only queries it and asks it
/// for resources; it never starts or ends a presentation session.
pub trait PresentationContext: Send + Sync {
    fn active_session(&self) -> Option<PresentationSessionId>;

    fn reference_space(&self) -> Option<ReferenceSpaceId>;

    /// Whether the platform offers compositor-managed media layers at all.
    fn supports_media_layers(&self) -> bool;

    /// Create a layer and register it with the session's render state.
    fn create_media_layer(&self, init: &LayerInit) -> Result<Box<dyn MediaLayer>>;

    fn create_video_texture(&self) -> Result<Box<dyn VideoTexture>>;
}

/// Resolve the active session and reference space, in that order.
pub fn require_presentation(
    context: &dyn PresentationContext,
) -> Result<(PresentationSessionId, ReferenceSpaceId)> {
    let session = context
        .active_session()
        .ok_or(Error::NoPresentationContext)?;
    let space = context.reference_space().ok_or(Error::NoReferenceSpace)?;
    Ok((session, space))
}
