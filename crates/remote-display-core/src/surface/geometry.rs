use std::f32::consts::PI;

use glam::{Quat, Vec3};
use remote_display_common::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ASPECT_RATIO: f32 = 16.0 / 9.0;
pub const DEFAULT_CENTRAL_ANGLE: f32 = PI / 2.3;
pub const DEFAULT_RADIUS: f32 = 1.2;
pub const DEFAULT_HEIGHT: f32 = 1.015;

pub const RADIAL_SEGMENTS: u32 = 16;
pub const HEIGHT_SEGMENTS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub position: Vec3,
    pub orientation: Quat,
}

impl RigidTransform {
    pub fn from_translation(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::from_translation(Vec3::new(0.0, DEFAULT_HEIGHT, 0.0))
    }
}

/// Curved-screen parameters. Compared by value every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Angle subtended by the screen, radians.
    pub central_angle: f32,
    /// Distance from the viewer, metres.
    pub radius: f32,
    pub transform: RigidTransform,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            central_angle: DEFAULT_CENTRAL_ANGLE,
            radius: DEFAULT_RADIUS,
            transform: RigidTransform::default(),
        }
    }
}

impl SurfaceConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.central_angle.is_finite()
            || self.central_angle <= 0.0
            || self.central_angle > 2.0 * PI
        {
            return Err(Error::config(format!(
                "central angle must be in (0, 2π], got {}",
                self.central_angle
            )));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(Error::config(format!(
                "radius must be positive, got {}",
                self.radius
            )));
        }
        if !self.transform.position.is_finite() || !self.transform.orientation.is_finite() {
            return Err(Error::config("placement transform is not finite"));
        }
        Ok(())
    }
}

/// Width over height of a frame; `None` until both dimensions are known.
pub fn aspect_ratio(dimensions: Option<(u32, u32)>) -> Option<f32> {
    match dimensions {
        Some((w, h)) if w > 0 && h > 0 => Some(w as f32 / h as f32),
        _ => None,
    }
}

/// Open cylinder section the screen is drawn on, viewed from inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylinderGeometry {
    pub radius: f32,
    pub height: f32,
    pub radial_segments: u32,
    pub height_segments: u32,
    pub open_ended: bool,
    pub theta_start: f32,
    pub theta_length: f32,
    pub aspect_ratio: f32,
}

impl CylinderGeometry {
    /// Arc length over aspect gives the height, centred opposite the seam.
    pub fn for_surface(config: &SurfaceConfig, aspect_ratio: f32) -> Self {
        Self {
            radius: config.radius,
            height: config.central_angle * config.radius / aspect_ratio,
            radial_segments: RADIAL_SEGMENTS,
            height_segments: HEIGHT_SEGMENTS,
            open_ended: true,
            theta_start: PI - config.central_angle / 2.0,
            theta_length: config.central_angle,
            aspect_ratio,
        }
    }

    pub fn arc_length(&self) -> f32 {
        self.theta_length * self.radius
    }
}
