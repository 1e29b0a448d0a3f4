//! Client configuration types.
//!
//! This module defines the settings for talking to the document search
//! backend. Page-size bounds mirror the limits the backend validates.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ClientError, Result};

/// Largest `limit` / `top_k` the search endpoint accepts.
pub const MAX_SEARCH_PAGE_SIZE: usize = 50;

/// Largest `limit` the resource listing accepts.
pub const MAX_RESOURCES_PAGE_SIZE: usize = 100;

/// Configuration for the backend client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL (e.g., `http://localhost:8000`).
    #[serde(default = "ClientConfig::default_base_url")]
    pub base_url: String,

    /// Timeout in seconds for the non-streaming calls.
    #[serde(default = "ClientConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Connect timeout in seconds, applied to every call.
    #[serde(default = "ClientConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Results per search page.
    #[serde(default = "ClientConfig::default_search_page_size")]
    pub search_page_size: usize,

    /// Candidates the backend re-ranks per search.
    #[serde(default = "ClientConfig::default_search_top_k")]
    pub search_top_k: u32,

    /// Resources per listing page.
    #[serde(default = "ClientConfig::default_resources_page_size")]
    pub resources_page_size: usize,
}

impl ClientConfig {
    fn default_base_url() -> String {
        "http://localhost:8000".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    const fn default_search_page_size() -> usize {
        10
    }

    const fn default_search_top_k() -> u32 {
        10
    }

    const fn default_resources_page_size() -> usize {
        20
    }

    /// Create a configuration pointing at `base_url` with default settings.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Check the settings against the limits the backend enforces.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::InvalidConfig(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if !(1..=MAX_SEARCH_PAGE_SIZE).contains(&self.search_page_size) {
            return Err(ClientError::InvalidConfig(format!(
                "search_page_size must be between 1 and {MAX_SEARCH_PAGE_SIZE}"
            )));
        }
        if !(1..=MAX_SEARCH_PAGE_SIZE).contains(&(self.search_top_k as usize)) {
            return Err(ClientError::InvalidConfig(format!(
                "search_top_k must be between 1 and {MAX_SEARCH_PAGE_SIZE}"
            )));
        }
        if !(1..=MAX_RESOURCES_PAGE_SIZE).contains(&self.resources_page_size) {
            return Err(ClientError::InvalidConfig(format!(
                "resources_page_size must be between 1 and {MAX_RESOURCES_PAGE_SIZE}"
            )));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            request_timeout_seconds: Self::default_request_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            search_page_size: Self::default_search_page_size(),
            search_top_k: Self::default_search_top_k(),
            resources_page_size: Self::default_resources_page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.search_page_size, 10);
        assert_eq!(config.search_top_k, 10);
        assert_eq!(config.resources_page_size, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn timeout_duration() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"https://docs.internal/"}"#).unwrap();
        assert_eq!(config.normalized_base_url(), "https://docs.internal");
        assert_eq!(config.request_timeout_seconds, 30);
        assert_eq!(config.resources_page_size, 20);
    }

    #[test]
    fn validate_rejects_oversized_pages() {
        let config = ClientConfig {
            search_page_size: 51,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ClientError::InvalidConfig(msg)) if msg.contains("search_page_size")
        ));

        let config = ClientConfig {
            resources_page_size: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_url() {
        let config = ClientConfig::with_base_url("localhost:8000");
        assert!(config.validate().is_err());
    }
}
