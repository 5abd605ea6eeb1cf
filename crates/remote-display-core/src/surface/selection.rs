use std::fmt;

/// Everything surface selection depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceInputs {
    pub connected: bool,
    pub compositor_capable: bool,
    pub video_ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    None,
    Compositor,
    Fallback,
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfaceKind::None => "none",
            SurfaceKind::Compositor => "compositor",
            SurfaceKind::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Pick the surface variant for a set of inputs.
///
/// Without a connection nothing is drawn. Video readiness does not change the
/// variant; it only gates whether the fallback binds a texture.
pub fn select_surface(inputs: SurfaceInputs) -> SurfaceKind {
    match (inputs.connected, inputs.compositor_capable) {
        (false, _) => SurfaceKind::None,
        (true, true) => SurfaceKind::Compositor,
        (true, false) => SurfaceKind::Fallback,
    }
}
