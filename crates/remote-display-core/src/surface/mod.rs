//! Display surface: decides where remote video is drawn and keeps the chosen
//! surface in sync with its configuration.

mod controller;
pub mod geometry;
pub mod presentation;
pub mod selection;
pub mod video;

pub use controller::{DisplaySurfaceController, ProxyMesh};
pub use geometry::{CylinderGeometry, RigidTransform, SurfaceConfig};
pub use presentation::{
    LayerInit, MediaLayer, PresentationContext, PresentationSessionId, ReferenceSpaceId,
    VideoTexture,
};
pub use selection::{select_surface, SurfaceInputs, SurfaceKind};
pub use video::{VideoEvent, VideoEventHandler, VideoSource};
