//! External media providers.
//!
//! Photo rounds search a Pexels-style API and pick one photo at random from a
//! random result page. GIF rounds ask a Giphy-style API for a single result at
//! a random offset. API keys are never logged.

use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use rand::seq::IndexedRandom;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use thiserror::Error;

use crate::config::MediaConfig;

/// Provider failure, always recovered by the loader
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("no results for '{0}'")]
    Empty(String),
}

/// Source of a media URL for a category search term
pub trait MediaProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch<'a>(&'a self, term: &'a str) -> BoxFuture<'a, Result<String, MediaError>>;
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

// === Photo search ===

#[derive(Debug, Deserialize)]
struct PhotoSearch {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    src: PhotoSources,
}

#[derive(Debug, Deserialize)]
struct PhotoSources {
    large: String,
}

/// Pexels photo search
pub struct PexelsProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    per_page: u32,
    max_page: u32,
}

impl PexelsProvider {
    /// Returns None when no API key is configured
    pub fn from_config(config: &MediaConfig) -> Option<Self> {
        let api_key = config.pexels_api_key.clone()?;
        Some(Self {
            client: build_client(config.fetch_timeout()),
            api_key,
            base_url: config.pexels_base_url.trim_end_matches('/').to_string(),
            per_page: config.pexels_per_page.max(1),
            max_page: config.pexels_max_page.max(1),
        })
    }
}

impl MediaProvider for PexelsProvider {
    fn name(&self) -> &'static str {
        "pexels"
    }

    fn fetch<'a>(&'a self, term: &'a str) -> BoxFuture<'a, Result<String, MediaError>> {
        Box::pin(async move {
            let page = rand::rng().random_range(1..=self.max_page);

            let response = self
                .client
                .get(format!("{}/search", self.base_url))
                .header(AUTHORIZATION, &self.api_key)
                .query(&[
                    ("query", term.to_string()),
                    ("per_page", self.per_page.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(MediaError::Status(status.as_u16()));
            }

            let body: PhotoSearch = response.json().await?;
            pick_photo(body, term, &mut rand::rng())
        })
    }
}

fn pick_photo<R: Rng>(body: PhotoSearch, term: &str, rng: &mut R) -> Result<String, MediaError> {
    body.photos
        .choose(rng)
        .map(|photo| photo.src.large.clone())
        .ok_or_else(|| MediaError::Empty(term.to_string()))
}

// === GIF search ===

#[derive(Debug, Deserialize)]
struct GifSearch {
    #[serde(default)]
    data: Vec<Gif>,
}

#[derive(Debug, Deserialize)]
struct Gif {
    images: GifRenditions,
}

#[derive(Debug, Deserialize)]
struct GifRenditions {
    fixed_height: GifRendition,
}

#[derive(Debug, Deserialize)]
struct GifRendition {
    url: String,
}

/// Giphy GIF search
pub struct GiphyProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_offset: u32,
}

impl GiphyProvider {
    /// Returns None when no API key is configured
    pub fn from_config(config: &MediaConfig) -> Option<Self> {
        let api_key = config.giphy_api_key.clone()?;
        Some(Self {
            client: build_client(config.fetch_timeout()),
            api_key,
            base_url: config.giphy_base_url.trim_end_matches('/').to_string(),
            max_offset: config.giphy_max_offset.max(1),
        })
    }
}

impl MediaProvider for GiphyProvider {
    fn name(&self) -> &'static str {
        "giphy"
    }

    fn fetch<'a>(&'a self, term: &'a str) -> BoxFuture<'a, Result<String, MediaError>> {
        Box::pin(async move {
            let offset = rand::rng().random_range(0..self.max_offset);

            let response = self
                .client
                .get(format!("{}/gifs/search", self.base_url))
                .query(&[
                    ("api_key", self.api_key.clone()),
                    ("q", term.to_string()),
                    ("limit", "1".to_string()),
                    ("offset", offset.to_string()),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(MediaError::Status(status.as_u16()));
            }

            let body: GifSearch = response.json().await?;
            first_gif(body, term)
        })
    }
}

fn first_gif(body: GifSearch, term: &str) -> Result<String, MediaError> {
    body.data
        .into_iter()
        .next()
        .map(|gif| gif.images.fixed_height.url)
        .ok_or_else(|| MediaError::Empty(term.to_string()))
}
