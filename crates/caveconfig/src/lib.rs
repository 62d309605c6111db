//! Installation configuration for cavewall.
//!
//! A configuration names every physical wall of the installation (the
//! viewport table), the solver and stereo defaults, the cluster barrier
//! settings, and the tracking feed options. It is loaded once at startup
//! and immutable for the session.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

mod presets;

pub use presets::aixcave;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaveConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub tracking: TrackingSettings,
    #[serde(default)]
    pub viewports: BTreeMap<String, ViewportEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Far plane distance in meters, independent of the viewer distance.
    #[serde(default = "default_far_plane")]
    pub far_plane: f32,
    /// Interpupillary distance in meters for stereo eye offsets.
    #[serde(default = "default_ipd")]
    pub ipd: f32,
    /// Simulation tick rate in frames per second.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            far_plane: default_far_plane(),
            ipd: default_ipd(),
            frame_rate: default_frame_rate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterSettings {
    /// How long the master waits for frameReady acks before applying the
    /// stall policy.
    #[serde(
        default = "default_ack_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub ack_timeout: Duration,
    #[serde(default)]
    pub stall: StallMode,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            ack_timeout: default_ack_timeout(),
            stall: StallMode::default(),
        }
    }
}

/// Policy for a frame whose acks did not all arrive in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StallMode {
    /// Evict the stalled peers and present with whoever acked.
    #[default]
    PresentStale,
    /// Wait indefinitely for every ack.
    Strict,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingSettings {
    /// Tracked body id to follow; the feed's first body when unset.
    #[serde(default)]
    pub body: Option<String>,
    /// Sampling window for the update-rate meter.
    #[serde(
        default = "default_rate_window",
        deserialize_with = "deserialize_duration"
    )]
    pub rate_window: Duration,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            body: None,
            rate_window: default_rate_window(),
        }
    }
}

/// One physical wall: room-space placement plus its local clip rectangle.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ViewportEntry {
    /// Room-space position of the wall's local origin, meters.
    pub loc: [f32; 3],
    /// Euler angles (XYZ order, radians) of the wall-local → room rotation.
    pub rot: [f32; 3],
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
}

fn default_far_plane() -> f32 {
    100.0
}

fn default_ipd() -> f32 {
    0.06
}

fn default_frame_rate() -> f32 {
    60.0
}

fn default_ack_timeout() -> Duration {
    Duration::from_millis(250)
}

fn default_rate_window() -> Duration {
    Duration::from_millis(250)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl CaveConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: CaveConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn viewport(&self, name: &str) -> Option<&ViewportEntry> {
        self.viewports.get(name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.viewports.is_empty() {
            return Err(ConfigError::Invalid(
                "config must define at least one viewport".into(),
            ));
        }

        for (name, viewport) in &self.viewports {
            let values = [
                viewport.loc[0],
                viewport.loc[1],
                viewport.loc[2],
                viewport.rot[0],
                viewport.rot[1],
                viewport.rot[2],
                viewport.left,
                viewport.right,
                viewport.bottom,
                viewport.top,
            ];
            if values.iter().any(|value| !value.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "viewport '{name}' contains a non-finite value"
                )));
            }
            if viewport.right <= viewport.left {
                return Err(ConfigError::Invalid(format!(
                    "viewport '{name}' must satisfy right > left"
                )));
            }
            if viewport.top <= viewport.bottom {
                return Err(ConfigError::Invalid(format!(
                    "viewport '{name}' must satisfy top > bottom"
                )));
            }
        }

        if self.defaults.far_plane <= 0.0 {
            return Err(ConfigError::Invalid(
                "defaults.far_plane must be greater than zero".into(),
            ));
        }
        if self.defaults.ipd < 0.0 {
            return Err(ConfigError::Invalid(
                "defaults.ipd must be non-negative".into(),
            ));
        }
        if self.defaults.frame_rate <= 0.0 {
            return Err(ConfigError::Invalid(
                "defaults.frame_rate must be greater than zero".into(),
            ));
        }

        if self.cluster.stall == StallMode::PresentStale && self.cluster.ack_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "cluster.ack_timeout must be greater than zero for present-stale".into(),
            ));
        }

        Ok(())
    }
}
