//! Game settings and preferences
//!
//! Persisted as JSON next to the preferences store.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which renderer draws the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderBackend {
    #[default]
    Canvas,
    Gl,
}

/// Preference values forced while the RL harness drives the game
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RlOverrides {
    pub zoom: bool,
    pub use_gl: bool,
    pub independent_flippers: bool,
    /// Table the harness plays
    pub level: u32,
}

impl Default for RlOverrides {
    fn default() -> Self {
        Self {
            zoom: false,
            use_gl: true,
            independent_flippers: false,
            level: 1,
        }
    }
}

/// Game settings/preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === View ===
    /// Zoom in around the balls
    pub zoom: bool,
    pub renderer: RenderBackend,
    /// Left and right halves of the screen drive their own flippers
    pub independent_flippers: bool,
    pub high_quality: bool,

    // === HUD ===
    /// Show FPS counter
    pub show_fps: bool,

    // === Audio ===
    pub sound: bool,
    pub music: bool,

    // === Game ===
    pub unlimited_balls: bool,
    /// Table loaded at startup (1-based)
    pub initial_level: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zoom: true,
            renderer: RenderBackend::Canvas,
            independent_flippers: true,
            high_quality: false,

            show_fps: false,

            sound: true,
            music: true,

            unlimited_balls: false,
            initial_level: 1,
        }
    }
}

impl Settings {
    /// Force the values the RL harness expects
    pub fn apply_rl_overrides(&mut self, overrides: &RlOverrides) {
        self.zoom = overrides.zoom;
        self.renderer = if overrides.use_gl {
            RenderBackend::Gl
        } else {
            RenderBackend::Canvas
        };
        self.independent_flippers = overrides.independent_flippers;
        self.sound = false;
        self.music = false;
        self.initial_level = overrides.level;
    }

    /// Zoom factor for the view
    pub fn zoom_factor(&self) -> f32 {
        if self.zoom {
            crate::consts::ZOOM_FACTOR
        } else {
            1.0
        }
    }

    /// Load settings, falling back to defaults when missing or corrupt
    pub fn load(path: &Path) -> Self {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(_) => {
                log::info!("Using default settings");
                return Self::default();
            }
        };
        match serde_json::from_str(&json) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Ignoring corrupt settings {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        log::info!("Settings saved");
        Ok(())
    }
}
