//! Download orchestrator
//!
//! Executes the two-phase protocol per download action: phase 1 submits the
//! request and receives a prepared-download descriptor, phase 2 streams the
//! payload to disk. Progress moves 10 → 50 across phase 1 and 50 → 100
//! across phase 2 and never goes backward, even when a fetch attempt is
//! retried from scratch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::errors::FetchError;
use crate::models::{DownloadRequest, DownloadSelection, MediaType, PreparedDownload};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::service::RemoteService;
use crate::time_utils;

/// A downloaded artifact saved to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub filename: String,
    pub mime_type: String,
    pub bytes_written: u64,
}

/// Build the prepare-phase body for a validated selection.
///
/// Trim fields equal to the full-range defaults are left out; the service
/// reads their absence as "no trim" on that side.
pub fn build_request(
    url: &str,
    selection: &DownloadSelection,
    duration_seconds: u64,
) -> DownloadRequest {
    let (start_time, end_time) = time_utils::effective_trim(
        &selection.start_time,
        &selection.end_time,
        duration_seconds,
    );
    DownloadRequest {
        url: url.to_string(),
        media_type: selection.media_type,
        extension: selection.extension.clone(),
        quality: selection.quality.clone(),
        language: selection.language.clone(),
        format: selection.format.clone(),
        start_time,
        end_time,
    }
}

/// MIME type recorded on the artifact and sent as the payload `Accept`
/// header: `video/{ext|mp4}`, `audio/{ext|mp3}`, otherwise `text/{ext|plain}`.
pub fn mime_for(media_type: MediaType, extension: Option<&str>) -> String {
    match media_type {
        MediaType::Video => format!("video/{}", extension.unwrap_or("mp4")),
        MediaType::Audio => format!("audio/{}", extension.unwrap_or("mp3")),
        MediaType::Subtitle => format!("text/{}", extension.unwrap_or("plain")),
    }
}

/// Enforces the progress contract for one orchestration: values are clamped
/// to `[0, 100]` and the observer never sees a value below an earlier one.
struct ProgressReporter {
    callback: Box<dyn Fn(u8) + Send + Sync>,
    high_water: AtomicU8,
}

impl ProgressReporter {
    fn new(callback: impl Fn(u8) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            callback: Box::new(callback),
            high_water: AtomicU8::new(0),
        })
    }

    fn report(&self, value: u8) {
        let clamped = value.min(100);
        let previous = self.high_water.fetch_max(clamped, Ordering::SeqCst);
        if clamped > previous {
            (self.callback)(clamped);
        }
    }

    /// Map `loaded/total` linearly into the phase-2 half of the bar.
    fn report_bytes(&self, loaded: u64, total: u64) {
        if total == 0 {
            return;
        }
        let ratio = loaded.min(total) as f64 / total as f64;
        self.report(50 + (ratio * 50.0).round() as u8);
    }
}

/// Executes download actions against the remote service.
///
/// Holds no per-run state: every [`Downloader::run`] call is an independent
/// orchestration, serialized by the session controller.
pub struct Downloader {
    service: Arc<dyn RemoteService>,
    control_policy: RetryPolicy,
    payload_policy: RetryPolicy,
}

impl Downloader {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        Self::with_policies(service, RetryPolicy::control(), RetryPolicy::payload())
    }

    pub fn with_policies(
        service: Arc<dyn RemoteService>,
        control_policy: RetryPolicy,
        payload_policy: RetryPolicy,
    ) -> Self {
        Self {
            service,
            control_policy,
            payload_policy,
        }
    }

    /// Run the full two-phase protocol and save the artifact under
    /// `dest_dir`.
    ///
    /// `on_progress` observes monotonically non-decreasing integers in
    /// `[0, 100]`; on success the final value is exactly 100. Cancellation
    /// aborts whichever phase is in flight and leaves no partial file.
    pub async fn run(
        &self,
        request: &DownloadRequest,
        dest_dir: &Path,
        on_progress: impl Fn(u8) + Send + Sync + 'static,
        token: &CancellationToken,
    ) -> Result<SavedArtifact, FetchError> {
        let progress = ProgressReporter::new(on_progress);

        // Phase 1: ask the service to prepare the artifact.
        progress.report(10);
        log::info!(
            "Preparing {} download for {}",
            request.media_type.as_str(),
            request.url
        );

        let prepared = {
            let service = self.service.clone();
            let request = request.clone();
            retry_with_backoff(self.control_policy, token, "prepare", move || {
                let service = service.clone();
                let request = request.clone();
                async move { service.prepare_download(&request).await }
            })
            .await?
        };
        let (filename, download_url) = validate_prepared(&prepared)?;
        progress.report(50);

        // Phase 2: stream the payload and persist it.
        let extension = match request.media_type {
            MediaType::Subtitle => request.format.as_deref(),
            _ => request.extension.as_deref(),
        };
        let mime_type = mime_for(request.media_type, extension);

        let safe_name = sanitize_filename::sanitize(&filename);
        if safe_name.is_empty() {
            return Err(FetchError::invalid_response(format!(
                "unusable filename from service: {:?}",
                filename
            )));
        }
        let final_path = dest_dir.join(&safe_name);
        let part_path = dest_dir.join(format!("{}.part", safe_name));

        fs::create_dir_all(dest_dir).await?;

        let fetch_result = {
            let service = self.service.clone();
            let download_url = download_url.clone();
            let mime_type = mime_type.clone();
            let part_path = part_path.clone();
            let progress = progress.clone();
            let token_for_stream = token.clone();
            retry_with_backoff(self.payload_policy, token, "payload", move || {
                fetch_to_file(
                    service.clone(),
                    download_url.clone(),
                    mime_type.clone(),
                    part_path.clone(),
                    progress.clone(),
                    token_for_stream.clone(),
                )
            })
            .await
        };

        let bytes_written = match fetch_result {
            Ok(written) => written,
            Err(err) => {
                // No partial saves: a failed or cancelled fetch leaves
                // nothing behind.
                let _ = fs::remove_file(&part_path).await;
                return Err(err);
            }
        };

        fs::rename(&part_path, &final_path).await?;
        progress.report(100);
        log::info!(
            "Saved {} ({} bytes) to {}",
            safe_name,
            bytes_written,
            final_path.display()
        );

        Ok(SavedArtifact {
            path: final_path,
            filename: safe_name,
            mime_type,
            bytes_written,
        })
    }
}

/// One payload-fetch attempt: request the bytes and stream them into the
/// temp file. The file is truncated on entry so a retried attempt starts
/// over instead of appending to a half-written payload.
async fn fetch_to_file(
    service: Arc<dyn RemoteService>,
    download_url: String,
    accept: String,
    part_path: PathBuf,
    progress: Arc<ProgressReporter>,
    token: CancellationToken,
) -> Result<u64, FetchError> {
    let mut file = fs::File::create(&part_path).await?;
    let mut payload = service.fetch_payload(&download_url, &accept).await?;
    let total = payload.total_bytes;
    let mut written: u64 = 0;

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            next = payload.stream.next() => next,
        };
        let chunk = match next {
            Some(chunk) => chunk?,
            None => break,
        };
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if let Some(total) = total {
            progress.report_bytes(written, total);
        }
    }

    file.flush().await?;
    Ok(written)
}

/// A 2xx prepare reply must carry both the payload pointer and the target
/// filename; anything less is a contract violation by the service.
fn validate_prepared(prepared: &PreparedDownload) -> Result<(String, String), FetchError> {
    let filename = match prepared.filename.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return Err(FetchError::invalid_response(
                "prepared download is missing `filename`",
            ))
        }
    };
    let download_url = match prepared.download_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => {
            return Err(FetchError::invalid_response(
                "prepared download is missing `download_url`",
            ))
        }
    };
    Ok((filename, download_url))
}
