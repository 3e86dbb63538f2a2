//! Configuration file management
//!
//! Loads TOML configuration files and provides atlas and font settings.
//! Default config path: ~/.config/fontchain/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::MAX_ATLAS_TEXTURES;

/// Engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Atlas texture settings
    pub atlas: AtlasConfig,
    /// Font loading settings
    pub fonts: FontsConfig,
}

/// Atlas texture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Width of every texture the atlas creates (texels)
    pub texture_width: u32,
    /// Height of every texture the atlas creates (texels)
    pub texture_height: u32,
    /// Empty texels kept to the left and above every packed glyph
    pub glyph_padding: u32,
    /// Gamma applied to rasterized masks (1.0 = linear)
    /// Higher values make text bolder
    pub gamma: f32,
    /// Texture count limit (at most 255, texture indices are 8-bit)
    pub max_textures: usize,
}

/// Font loading settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontsConfig {
    /// Line height ratio used by chains built without an explicit one
    pub default_line_height: f32,
    /// Characters rasterized as soon as an on-demand font is created
    pub preload: String,
    /// Extra directories searched for system font families
    pub search_dirs: Vec<String>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            texture_width: 1024,
            texture_height: 1024,
            glyph_padding: 1,
            gamma: 1.4,
            max_textures: MAX_ATLAS_TEXTURES,
        }
    }
}

impl Default for FontsConfig {
    fn default() -> Self {
        Self {
            default_line_height: 1.2,
            preload: " ".to_string(),
            search_dirs: Vec::new(),
        }
    }
}

impl AtlasConfig {
    /// Clamp out-of-range values to something the atlas can work with
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.texture_width == 0 || self.texture_height == 0 {
            warn!(
                "Invalid atlas texture size {}x{}, using {}x{}",
                self.texture_width, self.texture_height, defaults.texture_width, defaults.texture_height
            );
            self.texture_width = defaults.texture_width;
            self.texture_height = defaults.texture_height;
        }
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            warn!("Invalid gamma {}, using {}", self.gamma, defaults.gamma);
            self.gamma = defaults.gamma;
        }
        if self.max_textures == 0 || self.max_textures > MAX_ATLAS_TEXTURES {
            warn!(
                "max_textures {} out of range, clamping to 1..={}",
                self.max_textures, MAX_ATLAS_TEXTURES
            );
            self.max_textures = self.max_textures.clamp(1, MAX_ATLAS_TEXTURES);
        }
        self
    }
}

impl FontsConfig {
    /// Preload characters as codepoints (BMP only)
    pub fn preload_codepoints(&self) -> Vec<u32> {
        self.preload
            .chars()
            .map(|c| c as u32)
            .filter(|&c| c <= crate::constants::MAX_CODEPOINT)
            .collect()
    }
}

impl Config {
    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. FONTCHAIN_CONFIG environment variable
        if let Ok(path) = std::env::var("FONTCHAIN_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/fontchain/config.toml
        default_config_path().filter(|p| p.exists())
    }

    /// Load configuration with priority:
    /// 1. FONTCHAIN_CONFIG environment variable
    /// 2. ~/.config/fontchain/config.toml
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.atlas = config.atlas.validated();
        Ok(config)
    }

    /// Serialize settings (for template generation)
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fontchain").join("config.toml"))
}
