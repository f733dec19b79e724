//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::challenge::{
    ChallengeCatalog, ChallengeLoader, GiphyProvider, MediaProvider, PexelsProvider,
    VariantSelector,
};
use crate::config::AppConfig;
use crate::lifecycle::ChallengeEngine;
use crate::outcome::{LogOutcomeSink, OutcomeSink, RedisOutcomeSink};
use crate::session::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Selector, loader, outcome sink and timing shared by all sessions
    pub engine: Arc<ChallengeEngine>,

    /// Live sessions
    pub registry: Arc<SessionRegistry>,

    /// Process start (unix seconds)
    pub started_at: i64,
}

impl AppState {
    /// Validate the configuration and catalog, wire the providers and
    /// connect the outcome sink. Configuration problems are fatal.
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let catalog = Arc::new(
            ChallengeCatalog::from_config(&config.catalog).context("Invalid challenge catalog")?,
        );
        let selector = VariantSelector::new(&config.catalog.enabled_kinds)
            .context("Invalid challenge kind set")?;

        let image_provider = PexelsProvider::from_config(&config.media)
            .map(|p| Arc::new(p) as Arc<dyn MediaProvider>);
        let gif_provider = GiphyProvider::from_config(&config.media)
            .map(|p| Arc::new(p) as Arc<dyn MediaProvider>);
        if image_provider.is_none() {
            tracing::warn!("No photo API key configured, image rounds use fallback media");
        }
        if gif_provider.is_none() {
            tracing::warn!("No GIF API key configured, GIF rounds have no media");
        }

        let loader = ChallengeLoader::new(
            catalog,
            image_provider,
            gif_provider,
            config.media.image_fallback_base.clone(),
            config.media.fetch_timeout(),
        );

        let sink = connect_sink(config.redis_url.as_deref()).await;
        tracing::info!(sink = sink.name(), "Outcome sink ready");

        let engine = Arc::new(ChallengeEngine {
            selector,
            loader: Arc::new(loader),
            sink,
            timing: config.timing.clone(),
            scratch: config.scratch.clone(),
        });

        Ok(Self::with_engine(config, engine))
    }

    pub fn with_engine(config: AppConfig, engine: Arc<ChallengeEngine>) -> Self {
        let registry = Arc::new(SessionRegistry::new(engine.clone(), config.session_ttl_secs));
        Self {
            config,
            engine,
            registry,
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp() - self.started_at).unwrap_or(0)
    }
}

/// Redis when configured and reachable, otherwise log-only
async fn connect_sink(redis_url: Option<&str>) -> Arc<dyn OutcomeSink> {
    let Some(url) = redis_url else {
        return Arc::new(LogOutcomeSink);
    };

    match RedisOutcomeSink::connect(url).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, outcomes go to the log only");
            Arc::new(LogOutcomeSink)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.catalog.glyph_table_path =
            concat!(env!("CARGO_MANIFEST_DIR"), "/../../assets/glyphs/codes.json").to_string();
        config
    }

    #[tokio::test]
    async fn test_builds_with_log_sink_by_default() {
        let state = AppState::new(config()).await.unwrap();
        assert_eq!(state.engine.sink.name(), "log");
        assert_eq!(state.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_zero_tick_is_fatal() {
        let mut config = config();
        config.timing.tick_ms = 0;

        let err = AppState::new(config).await.err().unwrap();
        assert!(format!("{:#}", err).contains("timing.tick_ms must be non-zero"));
    }

    #[tokio::test]
    async fn test_unusable_scratch_surface_is_fatal() {
        let mut config = config();
        config.scratch.brush_radius = u32::MAX;
        assert!(AppState::new(config).await.is_err());
    }
}
