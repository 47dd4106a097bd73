//! Transport layer for the remote extraction service.
//!
//! [`RemoteService`] is the seam between orchestration logic and the wire:
//! production code talks HTTP through [`HttpRemoteService`], tests
//! substitute an in-memory double. Nothing above this module sees reqwest
//! types.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::errors::FetchError;
use crate::models::{
    DownloadRequest, FormatSummary, MediaInfo, PreparedDownload, SubtitleCatalog,
};
use crate::settings::Settings;

/// A payload byte stream plus the total size when the transport knows it.
pub struct PayloadStream {
    /// `Content-Length` of the payload, when the service reports one.
    pub total_bytes: Option<u64>,
    pub stream: BoxStream<'static, Result<bytes::Bytes, FetchError>>,
}

/// Everything the engine needs from the remote service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// `GET /info`: metadata for a media URL.
    async fn fetch_info(&self, url: &str) -> Result<MediaInfo, FetchError>;

    /// `GET /formats`: available container/quality combinations.
    async fn fetch_formats(&self, url: &str) -> Result<FormatSummary, FetchError>;

    /// `GET /subtitles`: available subtitle tracks.
    async fn fetch_subtitles(&self, url: &str) -> Result<SubtitleCatalog, FetchError>;

    /// `POST /download`: ask the service to prepare an artifact.
    async fn prepare_download(
        &self,
        request: &DownloadRequest,
    ) -> Result<PreparedDownload, FetchError>;

    /// `GET <download_url>`: open the raw payload stream.
    async fn fetch_payload(
        &self,
        download_url: &str,
        accept: &str,
    ) -> Result<PayloadStream, FetchError>;
}

/// HTTP implementation of [`RemoteService`].
///
/// Two clients because the two call classes have very different patience:
/// control calls finish in seconds, a payload fetch of large media may
/// legitimately take minutes.
pub struct HttpRemoteService {
    base_url: String,
    client: Client,
    payload_client: Client,
}

impl HttpRemoteService {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(settings.request_timeout).build()?;
        let payload_client = Client::builder().timeout(settings.payload_timeout).build()?;
        Ok(Self {
            base_url: settings.base_url.clone(),
            client,
            payload_client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Shared shape of the read-side endpoints: `GET {base}{path}?url=...`
    /// returning JSON.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        url_param: &str,
        resource: &str,
    ) -> Result<T, FetchError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .query(&[("url", url_param)])
            .send()
            .await?;
        let response = check_status(response)?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::not_found(resource.to_string()));
        }
        serde_json::from_str(&body).map_err(|e| {
            FetchError::invalid_response(format!("unparseable {} reply: {}", resource, e))
        })
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn fetch_info(&self, url: &str) -> Result<MediaInfo, FetchError> {
        self.get_json("/info", url, "metadata").await
    }

    async fn fetch_formats(&self, url: &str) -> Result<FormatSummary, FetchError> {
        self.get_json("/formats", url, "formats").await
    }

    async fn fetch_subtitles(&self, url: &str) -> Result<SubtitleCatalog, FetchError> {
        self.get_json("/subtitles", url, "subtitles").await
    }

    async fn prepare_download(
        &self,
        request: &DownloadRequest,
    ) -> Result<PreparedDownload, FetchError> {
        let response = self
            .client
            .post(self.endpoint("/download"))
            .json(request)
            .send()
            .await?;
        let response = check_status(response)?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::invalid_response("empty prepare reply"));
        }
        serde_json::from_str(&body)
            .map_err(|e| FetchError::invalid_response(format!("unparseable prepare reply: {}", e)))
    }

    async fn fetch_payload(
        &self,
        download_url: &str,
        accept: &str,
    ) -> Result<PayloadStream, FetchError> {
        let response = self
            .payload_client
            .get(download_url)
            .header(header::ACCEPT, accept)
            .send()
            .await?;
        let response = check_status(response)?;

        let total_bytes = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from))
            .boxed();
        Ok(PayloadStream {
            total_bytes,
            stream,
        })
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::HttpStatus {
            status,
            url: response.url().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_path() {
        let settings = Settings {
            base_url: "http://localhost:8000".to_string(),
            ..Settings::default()
        };
        let service = HttpRemoteService::new(&settings).unwrap();
        assert_eq!(service.endpoint("/info"), "http://localhost:8000/info");
    }
}
