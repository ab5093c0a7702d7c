//! Render configuration.
//!
//! Everything that used to be a process-wide toggle is a field here and is
//! handed to the batch, surface and graphics constructors explicitly.
//! Loadable from JSON; every field has a default so a partial file works:
//!
//! ```json
//! { "check_errors": true, "max_quads": 256, "diagnostics": { "enabled": true } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Drain and log `glGetError` after GL operations.
    pub check_errors: bool,
    /// Cull `Surface::draw` calls whose bounds miss the clip rectangle.
    pub check_intersection: bool,
    /// Upper bound on quads per flush. `None` uses the driver-derived capacity.
    pub max_quads: Option<usize>,
    /// Display-to-pixel scale of the default render target.
    pub scale_factor: f32,
    pub diagnostics: DiagConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            check_errors: cfg!(debug_assertions),
            check_intersection: false,
            max_quads: None,
            scale_factor: 1.0,
            diagnostics: DiagConfig::default(),
        }
    }
}

/// Where and how often to ship stats to `sprig-telemetry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagConfig {
    pub enabled: bool,
    pub send_addr: String,
    pub request_addr: String,
    pub interval_ms: u64,
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            send_addr: "127.0.0.1:9200".to_string(),
            request_addr: "127.0.0.1:9201".to_string(),
            interval_ms: 100,
        }
    }
}

impl RenderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RenderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RenderError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scale_factor <= 0.0 || !self.scale_factor.is_finite() {
            return Err(RenderError::Config(format!(
                "scale_factor must be positive, got {}",
                self.scale_factor
            )));
        }
        if self.max_quads == Some(0) {
            return Err(RenderError::Config("max_quads must be at least 1".into()));
        }
        if self.diagnostics.enabled && self.diagnostics.interval_ms == 0 {
            return Err(RenderError::Config(
                "diagnostics.interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
