use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub map: MapConfig,
    pub icons: IconConfig,
    pub timing: TimingConfig,
    pub data: DataConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    pub center_lat: f64,
    pub center_lng: f64,
    /// Standard zoom the view snaps to after the populate fit pass.
    pub default_zoom: u8,
    /// Close-up zoom for single-match search.
    pub focus_zoom: u8,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IconConfig {
    /// Glyph diameter in pixels.
    pub size: u32,
    pub severe_color: String,
    pub moderate_color: String,
    pub normal_color: String,
    pub unknown_color: String,
    /// Flat disc color for areas with zero patients.
    pub empty_color: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    pub fade_ms: u64,
    pub highlight_reset_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Inline JSON payload; takes precedence over the endpoint.
    pub inline_file: Option<PathBuf>,
    /// Map-data endpoint queried when no inline payload is configured.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
