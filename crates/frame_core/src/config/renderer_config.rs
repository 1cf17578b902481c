//! Renderer configuration
//!
//! Timeouts and uniform buffer placement for the frame cycle. Everything has
//! a default so a partial TOML/RON file only needs the fields it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError, MemoryVisibility};
use crate::render::frame::CameraUbo;

/// # Renderer Configuration
///
/// Settings consumed by [`FrameRenderer`](crate::render::FrameRenderer) and
/// the frame cycle controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// How long to wait for the swapchain to hand out an image
    pub acquire_timeout_ms: u64,
    /// How long to wait for a frame set's previous submission to retire
    pub fence_timeout_ms: u64,
    /// Size in bytes of each per-image uniform buffer
    pub uniform_buffer_size: u64,
    /// Where the uniform buffers live
    pub uniform_memory: MemoryVisibility,
    /// Background clear color [R, G, B, A] (0.0-1.0 range)
    pub clear_color: [f32; 4],
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl RendererConfig {
    /// Set the image acquisition timeout
    #[must_use]
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the frame completion wait timeout
    #[must_use]
    pub fn with_fence_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.fence_timeout_ms = timeout_ms;
        self
    }

    /// Set the per-image uniform buffer size
    #[must_use]
    pub fn with_uniform_buffer_size(mut self, size: u64) -> Self {
        self.uniform_buffer_size = size;
        self
    }

    /// Set the uniform buffer memory placement
    #[must_use]
    pub fn with_uniform_memory(mut self, visibility: MemoryVisibility) -> Self {
        self.uniform_memory = visibility;
        self
    }

    /// Set background clear color [R, G, B, A] (0.0-1.0 range)
    #[must_use]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Image acquisition timeout as a duration
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Frame completion wait timeout as a duration
    pub const fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    /// Check the values the frame cycle relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uniform_buffer_size < CameraUbo::SIZE {
            return Err(ConfigError::Invalid(format!(
                "uniform_buffer_size {} is smaller than the camera uniform layout ({} bytes)",
                self.uniform_buffer_size,
                CameraUbo::SIZE
            )));
        }
        if self.fence_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fence_timeout_ms must be non-zero".to_string()));
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::Invalid("clear_color must be finite".to_string()));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 1000,
            fence_timeout_ms: 1000,
            uniform_buffer_size: CameraUbo::SIZE,
            uniform_memory: MemoryVisibility::HostVisible,
            clear_color: [0.005, 0.005, 0.005, 1.0], // Dark gray background
            log_level: "info".to_string(),
        }
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.uniform_buffer_size, 68);
        assert_eq!(config.fence_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_undersized_uniform_buffer_rejected() {
        let config = RendererConfig::default().with_uniform_buffer_size(64);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_fence_timeout_rejected() {
        let config = RendererConfig::default().with_fence_timeout_ms(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RendererConfig = toml::from_str(
            "fence_timeout_ms = 250\nuniform_memory = \"DeviceLocal\"\n",
        )
        .unwrap();

        assert_eq!(config.fence_timeout_ms, 250);
        assert_eq!(config.uniform_memory, MemoryVisibility::DeviceLocal);
        assert_eq!(config.acquire_timeout_ms, 1000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_save_and_load_ron() {
        let path = std::env::temp_dir().join("frame_core_renderer_config_test.ron");
        let path = path.to_str().unwrap();

        let config = RendererConfig::default()
            .with_clear_color([0.1, 0.2, 0.3, 1.0])
            .with_uniform_buffer_size(80);
        config.save_to_file(path).unwrap();

        let loaded = RendererConfig::load_from_file(path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = RendererConfig::default().save_to_file("renderer.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
