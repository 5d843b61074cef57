//! Client for the TMDB metadata API.
//!
//! Wraps the handful of endpoints the worker consumes: image configuration,
//! reverse lookup by IMDb id, external-id lookup for a TMDB movie, and the
//! discover listing used by the anime sync job. Non-success responses carry
//! the status and a truncated body snippet; callers decide whether that is
//! fatal to the job or only to the item.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::constants::TMDB_IMAGE_BASE_FALLBACK;

/// Maximum response-body characters kept in an error.
const ERROR_BODY_SNIPPET: usize = 120;

#[derive(Debug, Error)]
pub enum TmdbError {
    #[error("TMDB request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("TMDB {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// A movie record as returned by the TMDB API.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigurationResponse {
    #[serde(default)]
    images: Option<ImageSettings>,
}

#[derive(Debug, Deserialize)]
struct ImageSettings {
    #[serde(default)]
    secure_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<TmdbMovie>,
}

#[derive(Debug, Deserialize)]
struct ExternalIdsResponse {
    #[serde(default)]
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoverResponse {
    #[serde(default)]
    results: Vec<TmdbMovie>,
}

/// TMDB API client with api-key injection.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
    image_size: String,
}

impl TmdbClient {
    /// Create a new client from the application configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.tmdb_base_url.trim_end_matches('/').to_string(),
            api_key: config.tmdb_api_key.clone(),
            image_size: config.tmdb_image_size.clone(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<T, TmdbError> {
        let sep = if path_and_query.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}{}api_key={}",
            self.base_url,
            path_and_query,
            sep,
            urlencoding::encode(&self.api_key)
        );

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.chars().take(ERROR_BODY_SNIPPET).collect();
            return Err(TmdbError::Status { status, body });
        }

        Ok(response.json().await?)
    }

    /// Resolve the base URL for image assets from the configuration
    /// endpoint, falling back to the public default when unreachable.
    ///
    /// Resolved once per job, not cached globally.
    pub async fn image_base_url(&self) -> String {
        match self
            .get_json::<ConfigurationResponse>("/configuration")
            .await
        {
            Ok(config) => config
                .images
                .and_then(|i| i.secure_base_url)
                .unwrap_or_else(|| TMDB_IMAGE_BASE_FALLBACK.to_string()),
            Err(e) => {
                debug!(error = %e, "TMDB configuration lookup failed, using fallback image base");
                TMDB_IMAGE_BASE_FALLBACK.to_string()
            }
        }
    }

    /// Look up the TMDB movie record for an IMDb id, if any.
    pub async fn find_movie_by_imdb_id(
        &self,
        imdb_id: &str,
    ) -> Result<Option<TmdbMovie>, TmdbError> {
        let path = format!(
            "/find/{}?external_source=imdb_id&language=en-US",
            urlencoding::encode(imdb_id)
        );
        let response: FindResponse = self.get_json(&path).await?;
        Ok(response.movie_results.into_iter().next())
    }

    /// Resolve a TMDB movie id to its IMDb id. Returns `None` when the movie
    /// has no IMDb cross-reference.
    pub async fn imdb_id_for_movie(&self, tmdb_id: i64) -> Result<Option<String>, TmdbError> {
        let path = format!("/movie/{tmdb_id}/external_ids");
        let response: ExternalIdsResponse = self.get_json(&path).await?;
        Ok(response.imdb_id.filter(|id| !id.is_empty()))
    }

    /// One page of the discover listing used by the anime sync job:
    /// Japanese-language animation, vote-sorted, minimum 2000 votes.
    pub async fn discover_anime_page(&self, page: u32) -> Result<Vec<TmdbMovie>, TmdbError> {
        let path = format!(
            "/discover/movie?with_genres=16&with_original_language=ja\
             &sort_by=vote_average.desc&vote_count.gte=2000&include_adult=false\
             &language=en-US&page={page}"
        );
        let response: DiscoverResponse = self.get_json(&path).await?;
        Ok(response.results)
    }

    /// Full poster image URL for a poster path, in the configured size.
    #[must_use]
    pub fn poster_url(&self, image_base: &str, poster_path: &str) -> String {
        format!("{image_base}{}{poster_path}", self.image_size)
    }

    /// Poster URL for an IMDb id, or empty when the movie is unknown or has
    /// no poster.
    pub async fn poster_for_imdb_id(
        &self,
        imdb_id: &str,
        image_base: &str,
    ) -> Result<String, TmdbError> {
        let movie = self.find_movie_by_imdb_id(imdb_id).await?;
        Ok(movie
            .and_then(|m| m.poster_path)
            .map(|path| self.poster_url(image_base, &path))
            .unwrap_or_default())
    }

    /// Overview text for an IMDb id, or empty when the movie is unknown or
    /// has no overview.
    pub async fn overview_for_imdb_id(&self, imdb_id: &str) -> Result<String, TmdbError> {
        let movie = self.find_movie_by_imdb_id(imdb_id).await?;
        Ok(movie.and_then(|m| m.overview).unwrap_or_default())
    }
}
