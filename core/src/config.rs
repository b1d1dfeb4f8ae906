//! Device configuration (TOML)
//!
//! Every field has a default, so an empty document or a missing section yields
//! a working 800x600 single-sample device.

use std::path::Path;

use bakery_shared::{DepthFormat, SurfaceFormat};
use serde::{Deserialize, Serialize};

use crate::codec::FloatKeyMode;
use crate::error::ConfigError;
use crate::tracker::MAX_SAMPLER_SLOTS;

/// Device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    /// Virtual backbuffer created with the device
    #[serde(default)]
    pub backbuffer: BackbufferConfig,
    /// Cache tuning
    #[serde(default)]
    pub cache: CacheConfig,
    /// Binding limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// How the virtual backbuffer is mapped onto the real surface at present time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScaleMode {
    /// Stretch to fill the surface (may distort aspect ratio)
    #[default]
    Stretch,
    /// Maintain aspect ratio and centre, adding letterbox bars
    Fit,
    /// Largest integer scale that fits, centred (may not fill the surface)
    PixelPerfect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackbufferConfig {
    /// Width in pixels (default: 800)
    #[serde(default = "default_width")]
    pub width: u32,
    /// Height in pixels (default: 600)
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub color_format: SurfaceFormat,
    #[serde(default)]
    pub depth_format: DepthFormat,
    /// MSAA sample count (default: 1), clamped to what the backend supports
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
    #[serde(default)]
    pub scale_mode: ScaleMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Pipeline hash table bucket count (default: 1031, must be a prime >= 1000)
    #[serde(default = "default_pipeline_buckets")]
    pub pipeline_buckets: usize,
    /// How float state fields enter cache keys (default: bit-exact)
    #[serde(default)]
    pub float_keys: FloatKeyMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Number of sampler/texture slots tracked (default: 16, range: 1-32)
    #[serde(default = "default_sampler_slots")]
    pub sampler_slots: usize,
    /// Simultaneous render targets (default: 4, range: 1-8)
    #[serde(default = "default_max_render_targets")]
    pub max_render_targets: usize,
}

fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}
fn default_sample_count() -> u32 {
    1
}

fn default_pipeline_buckets() -> usize {
    1031
}

fn default_sampler_slots() -> usize {
    16
}
fn default_max_render_targets() -> usize {
    4
}

impl Default for BackbufferConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            color_format: SurfaceFormat::default(),
            depth_format: DepthFormat::default(),
            sample_count: default_sample_count(),
            scale_mode: ScaleMode::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pipeline_buckets: default_pipeline_buckets(),
            float_keys: FloatKeyMode::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            sampler_slots: default_sampler_slots(),
            max_render_targets: default_max_render_targets(),
        }
    }
}

impl DeviceConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let backbuffer = &self.backbuffer;
        if backbuffer.width == 0 || backbuffer.height == 0 {
            return Err(ConfigError::Invalid {
                field: "backbuffer",
                reason: format!(
                    "size {}x{} must be non-zero",
                    backbuffer.width, backbuffer.height
                ),
            });
        }
        if backbuffer.sample_count == 0 {
            return Err(ConfigError::Invalid {
                field: "backbuffer.sample_count",
                reason: "must be at least 1".to_string(),
            });
        }

        let buckets = self.cache.pipeline_buckets;
        if buckets < 1000 || !is_prime(buckets) {
            return Err(ConfigError::Invalid {
                field: "cache.pipeline_buckets",
                reason: format!("{buckets} is not a prime >= 1000"),
            });
        }

        if !(1..=MAX_SAMPLER_SLOTS).contains(&self.limits.sampler_slots) {
            return Err(ConfigError::Invalid {
                field: "limits.sampler_slots",
                reason: format!(
                    "{} is outside 1-{MAX_SAMPLER_SLOTS}",
                    self.limits.sampler_slots
                ),
            });
        }
        if !(1..=8).contains(&self.limits.max_render_targets) {
            return Err(ConfigError::Invalid {
                field: "limits.max_render_targets",
                reason: format!("{} is outside 1-8", self.limits.max_render_targets),
            });
        }
        Ok(())
    }
}

pub(crate) fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}
