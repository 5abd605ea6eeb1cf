use remote_display_common::helpers::{env_bool, env_parse, split_list};
use remote_display_common::Result;

use crate::connection::{ConnectionConfig, Role};
use crate::surface::SurfaceConfig;

pub const ROLE_ENV: &str = "REMOTE_DISPLAY_ROLE";
pub const SIGNALING_URL_ENV: &str = "REMOTE_DISPLAY_SIGNALING_URL";
pub const ICE_SERVERS_ENV: &str = "REMOTE_DISPLAY_ICE_SERVERS";
pub const REQUIRE_PRESENTATION_ENV: &str = "REMOTE_DISPLAY_REQUIRE_PRESENTATION";
pub const CENTRAL_ANGLE_ENV: &str = "REMOTE_DISPLAY_CENTRAL_ANGLE";
pub const RADIUS_ENV: &str = "REMOTE_DISPLAY_RADIUS";
pub const HEIGHT_ENV: &str = "REMOTE_DISPLAY_HEIGHT";

pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:5173/rtc";

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDisplayConfig {
    pub role: Role,
    pub signaling_url: String,
    /// STUN/TURN URLs; empty means host candidates only.
    pub ice_servers: Vec<String>,
    pub require_presentation: bool,
    pub surface: SurfaceConfig,
}

impl Default for RemoteDisplayConfig {
    fn default() -> Self {
        Self {
            role: Role::Answerer,
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            ice_servers: Vec::new(),
            require_presentation: false,
            surface: SurfaceConfig::default(),
        }
    }
}

impl RemoteDisplayConfig {
    /// Defaults overridden by any `REMOTE_DISPLAY_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(role) = env_parse::<Role>(ROLE_ENV)? {
            config.role = role;
        }
        if let Some(url) = env_parse::<String>(SIGNALING_URL_ENV)? {
            config.signaling_url = url;
        }
        if let Some(servers) = env_parse::<String>(ICE_SERVERS_ENV)? {
            config.ice_servers = split_list(&servers);
        }
        config.require_presentation = env_bool(REQUIRE_PRESENTATION_ENV, false);
        if let Some(angle) = env_parse::<f32>(CENTRAL_ANGLE_ENV)? {
            config.surface.central_angle = angle;
        }
        if let Some(radius) = env_parse::<f32>(RADIUS_ENV)? {
            config.surface.radius = radius;
        }
        if let Some(height) = env_parse::<f32>(HEIGHT_ENV)? {
            config.surface.transform.position.y = height;
        }
        config.surface.validate()?;
        Ok(config)
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            role: self.role,
            require_presentation: self.require_presentation,
        }
    }
}
