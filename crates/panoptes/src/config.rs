//! Configuration management for Panoptes.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use argus_common::constants::{self, scratch};
use argus_common::{ArgusError, ChallengeKind};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Redis URL for the outcome log (log-only sink when unset)
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Idle sessions are evicted after this many seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Directory served under /assets
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// Challenge pools
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// External media providers
    #[serde(default)]
    pub media: MediaConfig,

    /// Lifecycle timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Scratch surface
    #[serde(default)]
    pub scratch: ScratchConfig,
}

/// Challenge catalog configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Kinds the selector may draw from
    #[serde(default = "default_enabled_kinds")]
    pub enabled_kinds: Vec<ChallengeKind>,

    /// Labels for photo rounds (label doubles as the search term)
    #[serde(default = "default_image_categories")]
    pub image_categories: Vec<String>,

    /// Labels for GIF rounds
    #[serde(default = "default_gif_categories")]
    pub gif_categories: Vec<String>,

    /// JSON object mapping glyph id to numeric code
    #[serde(default = "default_glyph_table_path")]
    pub glyph_table_path: String,

    /// Public path prefix for glyph images
    #[serde(default = "default_glyph_asset_base")]
    pub glyph_asset_base: String,

    /// Digits per glyph code
    #[serde(default = "default_code_length")]
    pub code_length: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            enabled_kinds: default_enabled_kinds(),
            image_categories: default_image_categories(),
            gif_categories: default_gif_categories(),
            glyph_table_path: default_glyph_table_path(),
            glyph_asset_base: default_glyph_asset_base(),
            code_length: default_code_length(),
        }
    }
}

/// Media provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Photo search key (photo rounds use the fallback URL when unset)
    #[serde(default)]
    pub pexels_api_key: Option<String>,

    #[serde(default = "default_pexels_base_url")]
    pub pexels_base_url: String,

    #[serde(default = "default_pexels_per_page")]
    pub pexels_per_page: u32,

    /// Result pages are drawn from 1..=max
    #[serde(default = "default_pexels_max_page")]
    pub pexels_max_page: u32,

    /// GIF search key (GIF rounds run without media when unset)
    #[serde(default)]
    pub giphy_api_key: Option<String>,

    #[serde(default = "default_giphy_base_url")]
    pub giphy_base_url: String,

    /// Result offsets are drawn from 0..max
    #[serde(default = "default_giphy_max_offset")]
    pub giphy_max_offset: u32,

    /// Deterministic photo fallback, suffixed with `?{category}`
    #[serde(default = "default_image_fallback_base")]
    pub image_fallback_base: Option<String>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            pexels_api_key: None,
            pexels_base_url: default_pexels_base_url(),
            pexels_per_page: default_pexels_per_page(),
            pexels_max_page: default_pexels_max_page(),
            giphy_api_key: None,
            giphy_base_url: default_giphy_base_url(),
            giphy_max_offset: default_giphy_max_offset(),
            image_fallback_base: default_image_fallback_base(),
            fetch_timeout_ms: default_fetch_timeout(),
        }
    }
}

impl MediaConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Lifecycle timing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_view_window")]
    pub view_window_secs: u32,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_refresh_delay")]
    pub refresh_delay_ms: u64,

    #[serde(default = "default_scratch_deadline")]
    pub scratch_deadline_secs: u64,

    #[serde(default = "default_notice_duration")]
    pub notice_duration_ms: u64,

    #[serde(default = "default_rapid_toggle")]
    pub rapid_toggle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            view_window_secs: default_view_window(),
            tick_ms: default_tick_ms(),
            refresh_delay_ms: default_refresh_delay(),
            scratch_deadline_secs: default_scratch_deadline(),
            notice_duration_ms: default_notice_duration(),
            rapid_toggle_ms: default_rapid_toggle(),
        }
    }
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn scratch_deadline(&self) -> Duration {
        Duration::from_secs(self.scratch_deadline_secs)
    }

    pub fn notice_duration(&self) -> Duration {
        Duration::from_millis(self.notice_duration_ms)
    }

    pub fn rapid_toggle(&self) -> Duration {
        Duration::from_millis(self.rapid_toggle_ms)
    }
}

/// Scratch surface configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScratchConfig {
    #[serde(default = "default_scratch_width")]
    pub width: u32,

    #[serde(default = "default_scratch_height")]
    pub height: u32,

    #[serde(default = "default_brush_radius")]
    pub brush_radius: u32,

    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            width: default_scratch_width(),
            height: default_scratch_height(),
            brush_radius: default_brush_radius(),
            pass_threshold: default_pass_threshold(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { constants::DEFAULT_LISTEN_ADDR.to_string() }
fn default_session_ttl() -> u64 { constants::DEFAULT_SESSION_TTL_SECS }
fn default_assets_dir() -> String { "assets".to_string() }
fn default_enabled_kinds() -> Vec<ChallengeKind> { ChallengeKind::ALL.to_vec() }
fn default_glyph_table_path() -> String { "assets/glyphs/codes.json".to_string() }
fn default_glyph_asset_base() -> String { "/assets/glyphs".to_string() }
fn default_code_length() -> usize { constants::GLYPH_CODE_LENGTH }
fn default_pexels_base_url() -> String { "https://api.pexels.com/v1".to_string() }
fn default_pexels_per_page() -> u32 { 20 }
fn default_pexels_max_page() -> u32 { 5 }
fn default_giphy_base_url() -> String { "https://api.giphy.com/v1".to_string() }
fn default_giphy_max_offset() -> u32 { 20 }
fn default_image_fallback_base() -> Option<String> {
    Some("https://source.unsplash.com/featured/800x600/".to_string())
}
fn default_fetch_timeout() -> u64 { constants::DEFAULT_FETCH_TIMEOUT_MS }
fn default_view_window() -> u32 { constants::VIEW_WINDOW_SECS }
fn default_tick_ms() -> u64 { constants::TICK_MS }
fn default_refresh_delay() -> u64 { constants::REFRESH_DELAY_MS }
fn default_scratch_deadline() -> u64 { scratch::DEADLINE_SECS }
fn default_notice_duration() -> u64 { constants::NOTICE_DURATION_MS }
fn default_rapid_toggle() -> u64 { constants::RAPID_TOGGLE_MS }
fn default_scratch_width() -> u32 { scratch::WIDTH }
fn default_scratch_height() -> u32 { scratch::HEIGHT }
fn default_brush_radius() -> u32 { scratch::BRUSH_RADIUS }
fn default_pass_threshold() -> f64 { scratch::PASS_THRESHOLD }

fn default_image_categories() -> Vec<String> {
    [
        "Nature", "Technology", "Animals", "Architecture",
        "Food", "Sports", "Space", "Art",
        "Vehicles", "Fashion", "Music", "Travel",
        "Business", "Health", "Education", "Science",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_gif_categories() -> Vec<String> {
    ["vehicles", "animals", "sports", "buildings", "cartoons", "actions"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = Some(redis_url.clone());
        }
        if let Some(ref key) = args.pexels_api_key {
            config.media.pexels_api_key = Some(key.clone());
        }
        if let Some(ref key) = args.giphy_api_key {
            config.media.giphy_api_key = Some(key.clone());
        }

        Ok(config)
    }
}

impl AppConfig {
    /// Reject settings the engine cannot run with. Catalog contents are
    /// checked separately when the catalog is built.
    pub fn validate(&self) -> Result<(), ArgusError> {
        if self.session_ttl_secs == 0 {
            return Err(invalid("session_ttl_secs must be non-zero"));
        }
        self.timing.validate()?;
        self.scratch.validate()
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), ArgusError> {
        if self.tick_ms == 0 {
            return Err(invalid("timing.tick_ms must be non-zero"));
        }
        if self.view_window_secs == 0 {
            return Err(invalid("timing.view_window_secs must be non-zero"));
        }
        if self.scratch_deadline_secs == 0 {
            return Err(invalid("timing.scratch_deadline_secs must be non-zero"));
        }
        Ok(())
    }
}

impl ScratchConfig {
    pub fn validate(&self) -> Result<(), ArgusError> {
        for (name, edge) in [("width", self.width), ("height", self.height)] {
            if !(1..=scratch::MAX_EDGE).contains(&edge) {
                return Err(ArgusError::Config(format!(
                    "scratch.{} must be within 1..={}, got {}",
                    name,
                    scratch::MAX_EDGE,
                    edge
                )));
            }
        }
        if !(1..=self.width.max(self.height)).contains(&self.brush_radius) {
            return Err(ArgusError::Config(format!(
                "scratch.brush_radius must be within 1..={}, got {}",
                self.width.max(self.height),
                self.brush_radius
            )));
        }
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(ArgusError::Config(format!(
                "scratch.pass_threshold must be within [0, 1], got {}",
                self.pass_threshold
            )));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ArgusError {
    ArgusError::Config(message.to_string())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            redis_url: None,
            session_ttl_secs: default_session_ttl(),
            assets_dir: default_assets_dir(),
            catalog: CatalogConfig::default(),
            media: MediaConfig::default(),
            timing: TimingConfig::default(),
            scratch: ScratchConfig::default(),
        }
    }
}
