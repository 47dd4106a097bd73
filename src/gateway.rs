//! Metadata gateway
//!
//! Validated, retried reads against the extraction service. The gateway
//! holds no session state: caching the result and deciding what to do with
//! it belong to the session controller.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::FetchError;
use crate::models::{FormatSummary, MediaInfo, SubtitleCatalog};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::service::RemoteService;
use crate::url_utils;

pub struct MetadataGateway {
    service: Arc<dyn RemoteService>,
    policy: RetryPolicy,
}

impl MetadataGateway {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        Self::with_policy(service, RetryPolicy::control())
    }

    pub fn with_policy(service: Arc<dyn RemoteService>, policy: RetryPolicy) -> Self {
        Self { service, policy }
    }

    /// Fetch extracted metadata for `url`.
    ///
    /// The URL is checked before the retry loop so a locally-known-bad input
    /// never consumes a retry attempt.
    pub async fn fetch_metadata(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<MediaInfo, FetchError> {
        let url = validate_url(url)?;
        let service = self.service.clone();
        let info = retry_with_backoff(self.policy, token, "metadata", move || {
            let service = service.clone();
            let url = url.clone();
            async move { service.fetch_info(&url).await }
        })
        .await?;
        log::info!("Fetched metadata: \"{}\" ({}s)", info.title, info.duration);
        Ok(info)
    }

    /// Fetch the container/quality combinations available for `url`.
    pub async fn fetch_formats(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<FormatSummary, FetchError> {
        let url = validate_url(url)?;
        let service = self.service.clone();
        retry_with_backoff(self.policy, token, "formats", move || {
            let service = service.clone();
            let url = url.clone();
            async move { service.fetch_formats(&url).await }
        })
        .await
    }

    /// Fetch the subtitle tracks available for `url`.
    pub async fn fetch_subtitles(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<SubtitleCatalog, FetchError> {
        let url = validate_url(url)?;
        let service = self.service.clone();
        retry_with_backoff(self.policy, token, "subtitles", move || {
            let service = service.clone();
            let url = url.clone();
            async move { service.fetch_subtitles(&url).await }
        })
        .await
    }
}

fn validate_url(url: &str) -> Result<String, FetchError> {
    if url.trim().is_empty() {
        return Err(FetchError::validation("media URL must not be empty"));
    }
    match url_utils::normalize_media_url(url) {
        Some(normalized) => Ok(normalized),
        None => Err(FetchError::validation(format!(
            "not an http(s) URL: {}",
            url.trim()
        ))),
    }
}
