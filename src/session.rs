//! Session controller
//!
//! The status state machine the presentation layer observes, and the single
//! owner of per-session state (the current media and the in-flight
//! cancellation handle). Entry points are rejected while an operation is in
//! flight, so at most one outbound action exists at a time and no further
//! locking is needed around the orchestration itself.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::download::{build_request, Downloader, SavedArtifact};
use crate::errors::FetchError;
use crate::events::SessionEvent;
use crate::gateway::MetadataGateway;
use crate::models::{DownloadSelection, MediaInfo, SessionStatus};
use crate::service::{HttpRemoteService, RemoteService};
use crate::settings::Settings;
use crate::time_utils;
use crate::url_utils;

/// How long the terminal `Complete` state stays visible before the session
/// returns to `Idle`.
const COMPLETE_RESET_DELAY: Duration = Duration::from_millis(1500);

/// Buffered events between the engine and one observer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The media a session is currently working with: the submitted URL and the
/// metadata the service extracted for it. Replaced wholesale on each new
/// submission, never mutated in place.
#[derive(Debug, Clone)]
struct LoadedMedia {
    url: String,
    info: MediaInfo,
}

#[derive(Default)]
struct SessionState {
    status: SessionStatus,
    media: Option<LoadedMedia>,
    cancel: Option<CancellationToken>,
}

pub struct SessionController {
    gateway: MetadataGateway,
    downloader: Downloader,
    download_dir: PathBuf,
    state: Arc<RwLock<SessionState>>,
    progress: Arc<AtomicU8>,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionController {
    /// Wire a controller to a service implementation. Used directly by tests
    /// and by [`SessionController::connect`] for the HTTP transport.
    pub fn new(
        service: Arc<dyn RemoteService>,
        settings: &Settings,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            gateway: MetadataGateway::new(service.clone()),
            downloader: Downloader::new(service),
            download_dir: settings.download_dir.clone(),
            state: Arc::new(RwLock::new(SessionState::default())),
            progress: Arc::new(AtomicU8::new(0)),
            events,
        }
    }

    /// Create a controller talking HTTP to the configured service, plus the
    /// receiving end of its event stream.
    pub fn connect(
        settings: &Settings,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), FetchError> {
        let service = Arc::new(HttpRemoteService::new(settings)?);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Ok((Self::new(service, settings, tx), rx))
    }

    /// Current status snapshot.
    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    /// Current progress snapshot, `[0, 100]`.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// The metadata of the currently loaded media, if any.
    pub async fn media_info(&self) -> Option<MediaInfo> {
        self.state.read().await.media.as_ref().map(|m| m.info.clone())
    }

    /// Submit a media URL: `idle/error -> processing`, fetch metadata, store
    /// it, return to `idle`.
    ///
    /// A malformed URL is rejected before any transition, and a submit while
    /// another operation is in flight is rejected without touching state.
    pub async fn submit_url(&self, url: &str) -> Result<MediaInfo, FetchError> {
        let normalized = match url_utils::normalize_media_url(url) {
            Some(normalized) => normalized,
            None => {
                return Err(FetchError::validation(if url.trim().is_empty() {
                    "media URL must not be empty".to_string()
                } else {
                    format!("not an http(s) URL: {}", url.trim())
                }))
            }
        };

        let token = self.begin("metadata fetch", SessionStatus::Processing, true).await?;

        match self.gateway.fetch_metadata(&normalized, &token).await {
            Ok(info) => {
                {
                    let mut state = self.state.write().await;
                    state.media = Some(LoadedMedia {
                        url: normalized,
                        info: info.clone(),
                    });
                    state.cancel = None;
                }
                self.emit(SessionEvent::MetadataReady { info: info.clone() }).await;
                self.set_status(SessionStatus::Idle, 0).await;
                Ok(info)
            }
            Err(err) => {
                self.clear_cancel().await;
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    /// Submit a download action for the currently loaded media:
    /// `idle/error -> downloading`, then `complete` or `error`.
    ///
    /// The trim range is validated against the stored metadata before any
    /// transition or network call; an invalid range rejects the action with
    /// the state machine untouched.
    pub async fn submit_download(
        &self,
        selection: &DownloadSelection,
    ) -> Result<SavedArtifact, FetchError> {
        let (url, duration_seconds, duration_text) = {
            let state = self.state.read().await;
            match &state.media {
                Some(media) => (
                    media.url.clone(),
                    media.info.duration,
                    media.info.full_duration(),
                ),
                None => {
                    return Err(FetchError::validation(
                        "no media loaded; submit a URL first",
                    ))
                }
            }
        };

        if !time_utils::is_valid_range(&selection.start_time, &selection.end_time, &duration_text)
        {
            return Err(FetchError::validation(format!(
                "invalid time range {}..{} for duration {}",
                selection.start_time, selection.end_time, duration_text
            )));
        }

        let token = self.begin("download", SessionStatus::Downloading, false).await?;

        let request = build_request(&url, selection, duration_seconds);

        let events = self.events.clone();
        let progress = self.progress.clone();
        let on_progress = move |percent: u8| {
            progress.store(percent, Ordering::SeqCst);
            // Lossy on a saturated channel; the terminal event still lands.
            let _ = events.try_send(SessionEvent::DownloadProgress { percent });
        };

        let result = self
            .downloader
            .run(&request, &self.download_dir, on_progress, &token)
            .await;
        self.clear_cancel().await;

        match result {
            Ok(artifact) => {
                self.set_status(SessionStatus::Complete, 100).await;
                self.emit(SessionEvent::DownloadCompleted {
                    filename: artifact.filename.clone(),
                    path: artifact.path.display().to_string(),
                    bytes_written: artifact.bytes_written,
                })
                .await;
                self.spawn_auto_reset();
                Ok(artifact)
            }
            Err(FetchError::Cancelled) => {
                self.set_status(SessionStatus::Idle, 0).await;
                self.emit(SessionEvent::DownloadCancelled).await;
                Err(FetchError::Cancelled)
            }
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    /// Request cancellation of the in-flight operation, if any.
    pub async fn cancel_download(&self) {
        let state = self.state.read().await;
        if let Some(cancel) = &state.cancel {
            log::info!("Cancellation requested");
            cancel.cancel();
        }
    }

    /// Atomically move from a restable state into an active one. Rejected
    /// while an operation is in flight or a completed one is still being
    /// shown, leaving all state untouched.
    async fn begin(
        &self,
        operation: &'static str,
        next: SessionStatus,
        replace_media: bool,
    ) -> Result<CancellationToken, FetchError> {
        let token = {
            let mut state = self.state.write().await;
            match state.status {
                SessionStatus::Idle | SessionStatus::Error => {}
                SessionStatus::Processing
                | SessionStatus::Downloading
                | SessionStatus::Complete => return Err(FetchError::Busy { operation }),
            }
            if replace_media {
                state.media = None;
            }
            state.status = next;
            let token = CancellationToken::new();
            state.cancel = Some(token.clone());
            token
        };
        self.progress.store(0, Ordering::SeqCst);
        self.emit(SessionEvent::StatusChanged {
            status: next,
            progress: 0,
        })
        .await;
        Ok(token)
    }

    async fn clear_cancel(&self) {
        self.state.write().await.cancel = None;
    }

    async fn set_status(&self, status: SessionStatus, progress: u8) {
        self.state.write().await.status = status;
        self.progress.store(progress, Ordering::SeqCst);
        self.emit(SessionEvent::StatusChanged { status, progress }).await;
    }

    async fn fail(&self, err: &FetchError) {
        log::error!("Operation failed: {}", err);
        self.set_status(SessionStatus::Error, 0).await;
        self.emit(SessionEvent::Failed {
            message: err.to_string(),
        })
        .await;
    }

    async fn emit(&self, event: SessionEvent) {
        // An observer that went away is not an engine failure.
        let _ = self.events.send(event).await;
    }

    /// `Complete` is terminal for the action, not the session: return to
    /// `Idle` after a fixed delay unless something else already moved the
    /// machine.
    fn spawn_auto_reset(&self) {
        let state = self.state.clone();
        let progress = self.progress.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(COMPLETE_RESET_DELAY).await;
            let mut guard = state.write().await;
            if guard.status == SessionStatus::Complete {
                guard.status = SessionStatus::Idle;
                drop(guard);
                progress.store(0, Ordering::SeqCst);
                let _ = events
                    .send(SessionEvent::StatusChanged {
                        status: SessionStatus::Idle,
                        progress: 0,
                    })
                    .await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DownloadRequest, FormatSummary, MediaType, PreparedDownload, SubtitleCatalog,
    };
    use crate::service::PayloadStream;
    use async_trait::async_trait;
    use futures::stream;
    use futures::StreamExt;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    const MEDIA_URL: &str = "https://example.com/watch?v=1";

    fn sample_info() -> MediaInfo {
        MediaInfo {
            id: Some("v1".to_string()),
            title: "Sample Clip".to_string(),
            thumbnail: "https://cdn.example.com/t.jpg".to_string(),
            duration: 90,
            duration_string: "1:30".to_string(),
            views: Some(1200),
            channel: Some("sample".to_string()),
            streams: None,
            subtitles: None,
        }
    }

    /// Scriptable in-memory stand-in for the remote service.
    struct FakeService {
        info_failures: u32,
        /// Calls with an index at or past this threshold fail.
        info_fail_from: u32,
        info_calls: AtomicU32,
        prepare_failures: u32,
        prepare_calls: AtomicU32,
        payload_failures: u32,
        payload_calls: AtomicU32,
        payload: Vec<u8>,
        /// When set, the payload stream stalls after its first chunk.
        payload_hangs: bool,
        /// When set, `fetch_info` waits for a permit before answering.
        info_gate: Option<Arc<Semaphore>>,
        last_request: Mutex<Option<DownloadRequest>>,
    }

    impl Default for FakeService {
        fn default() -> Self {
            Self {
                info_failures: 0,
                info_fail_from: u32::MAX,
                info_calls: AtomicU32::new(0),
                prepare_failures: 0,
                prepare_calls: AtomicU32::new(0),
                payload_failures: 0,
                payload_calls: AtomicU32::new(0),
                payload: b"0123456789".to_vec(),
                payload_hangs: false,
                info_gate: None,
                last_request: Mutex::new(None),
            }
        }
    }

    impl FakeService {
        fn transient() -> FetchError {
            FetchError::from(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
        }
    }

    #[async_trait]
    impl RemoteService for FakeService {
        async fn fetch_info(&self, _url: &str) -> Result<MediaInfo, FetchError> {
            if let Some(gate) = &self.info_gate {
                let _permit = gate.acquire().await.unwrap();
            }
            let n = self.info_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.info_failures || n >= self.info_fail_from {
                return Err(Self::transient());
            }
            Ok(sample_info())
        }

        async fn fetch_formats(&self, _url: &str) -> Result<FormatSummary, FetchError> {
            Ok(FormatSummary::default())
        }

        async fn fetch_subtitles(&self, _url: &str) -> Result<SubtitleCatalog, FetchError> {
            Ok(SubtitleCatalog::default())
        }

        async fn prepare_download(
            &self,
            request: &DownloadRequest,
        ) -> Result<PreparedDownload, FetchError> {
            *self.last_request.lock().unwrap() = Some(request.clone());
            let n = self.prepare_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.prepare_failures {
                return Err(Self::transient());
            }
            Ok(PreparedDownload {
                message: Some("ready".to_string()),
                filename: Some("clip.mp4".to_string()),
                download_url: Some("http://localhost:8000/files/clip.mp4".to_string()),
            })
        }

        async fn fetch_payload(
            &self,
            _download_url: &str,
            _accept: &str,
        ) -> Result<PayloadStream, FetchError> {
            let n = self.payload_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.payload_failures {
                return Err(Self::transient());
            }
            if self.payload_hangs {
                let first = stream::iter(vec![Ok(bytes::Bytes::from_static(b"head"))]);
                return Ok(PayloadStream {
                    total_bytes: Some(1_000_000),
                    stream: first.chain(stream::pending()).boxed(),
                });
            }
            let chunks: Vec<Result<bytes::Bytes, FetchError>> = self
                .payload
                .chunks(4)
                .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
                .collect();
            Ok(PayloadStream {
                total_bytes: Some(self.payload.len() as u64),
                stream: stream::iter(chunks).boxed(),
            })
        }
    }

    struct Harness {
        controller: SessionController,
        service: Arc<FakeService>,
        events: mpsc::Receiver<SessionEvent>,
        _dir: tempfile::TempDir,
    }

    fn harness(service: FakeService) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            download_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let service = Arc::new(service);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let controller = SessionController::new(service.clone(), &settings, tx);
        Harness {
            controller,
            service,
            events: rx,
            _dir: dir,
        }
    }

    fn drain_events(events: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn submit_url_stores_metadata_and_returns_to_idle() {
        let mut h = harness(FakeService::default());

        let info = h.controller.submit_url(MEDIA_URL).await.unwrap();
        assert_eq!(info.title, "Sample Clip");
        assert_eq!(h.controller.status().await, SessionStatus::Idle);
        assert_eq!(h.controller.progress(), 0);
        assert_eq!(h.controller.media_info().await.unwrap().duration, 90);

        let events = drain_events(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::MetadataReady { .. })));
    }

    #[tokio::test]
    async fn empty_url_is_rejected_without_any_transition() {
        let mut h = harness(FakeService::default());

        let result = h.controller.submit_url("   ").await;
        assert!(matches!(result, Err(FetchError::Validation { .. })));
        assert_eq!(h.controller.status().await, SessionStatus::Idle);
        assert_eq!(h.service.info_calls.load(Ordering::SeqCst), 0);
        assert!(drain_events(&mut h.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_failure_lands_in_error_and_is_not_sticky() {
        let mut h = harness(FakeService {
            info_failures: 3,
            ..FakeService::default()
        });

        let result = h.controller.submit_url(MEDIA_URL).await;
        assert!(result.is_err());
        assert_eq!(h.controller.status().await, SessionStatus::Error);
        assert_eq!(h.service.info_calls.load(Ordering::SeqCst), 3);

        // A fresh submission clears the error state.
        let info = h.controller.submit_url(MEDIA_URL).await.unwrap();
        assert_eq!(info.duration, 90);
        assert_eq!(h.controller.status().await, SessionStatus::Idle);

        let events = drain_events(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn a_submit_while_processing_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness(FakeService {
            info_gate: Some(gate.clone()),
            ..FakeService::default()
        });
        let controller = Arc::new(h.controller);

        let submitting = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.submit_url(MEDIA_URL).await })
        };

        // Wait until the first submit holds the processing state.
        loop {
            if controller.status().await == SessionStatus::Processing {
                break;
            }
            tokio::task::yield_now().await;
        }

        let second = controller.submit_url(MEDIA_URL).await;
        assert!(matches!(second, Err(FetchError::Busy { .. })));
        // The rejected submit must not have disturbed the in-flight one.
        assert_eq!(controller.status().await, SessionStatus::Processing);

        gate.add_permits(1);
        submitting.await.unwrap().unwrap();
        assert_eq!(controller.status().await, SessionStatus::Idle);
    }

    #[tokio::test]
    async fn full_range_download_omits_trim_fields_and_completes() {
        let mut h = harness(FakeService::default());
        h.controller.submit_url(MEDIA_URL).await.unwrap();

        // duration = 90 => full range is 00:00:00..00:01:30
        let selection = DownloadSelection::full_range(MediaType::Video, 90);
        let artifact = h.controller.submit_download(&selection).await.unwrap();

        assert_eq!(artifact.filename, "clip.mp4");
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"0123456789");
        assert_eq!(h.controller.status().await, SessionStatus::Complete);
        assert_eq!(h.controller.progress(), 100);

        let request = h.service.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.url, MEDIA_URL);
        assert_eq!(request.start_time, None);
        assert_eq!(request.end_time, None);

        let events = drain_events(&mut h.events);
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::DownloadProgress { percent } => Some(*percent),
                _ => None,
            })
            .collect();
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));
    }

    #[tokio::test]
    async fn trimmed_download_carries_both_fields() {
        let h = harness(FakeService::default());
        h.controller.submit_url(MEDIA_URL).await.unwrap();

        let selection = DownloadSelection {
            start_time: "00:00:10".to_string(),
            end_time: "00:01:00".to_string(),
            ..DownloadSelection::full_range(MediaType::Video, 90)
        };
        h.controller.submit_download(&selection).await.unwrap();

        let request = h.service.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.start_time.as_deref(), Some("00:00:10"));
        assert_eq!(request.end_time.as_deref(), Some("00:01:00"));
    }

    #[tokio::test]
    async fn reversed_range_is_blocked_before_any_network_call() {
        let h = harness(FakeService::default());
        h.controller.submit_url(MEDIA_URL).await.unwrap();

        let selection = DownloadSelection {
            start_time: "00:01:00".to_string(),
            end_time: "00:00:10".to_string(),
            ..DownloadSelection::full_range(MediaType::Video, 90)
        };
        let result = h.controller.submit_download(&selection).await;

        assert!(matches!(result, Err(FetchError::Validation { .. })));
        assert_eq!(h.controller.status().await, SessionStatus::Idle);
        assert_eq!(h.service.prepare_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn prepare_recovers_on_the_final_attempt() {
        let h = harness(FakeService {
            prepare_failures: 2,
            ..FakeService::default()
        });
        h.controller.submit_url(MEDIA_URL).await.unwrap();

        let selection = DownloadSelection::full_range(MediaType::Video, 90);
        h.controller.submit_download(&selection).await.unwrap();

        assert_eq!(h.service.prepare_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.service.payload_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_fetch_attempts_end_in_error_with_the_cause() {
        let mut h = harness(FakeService {
            payload_failures: u32::MAX,
            ..FakeService::default()
        });
        h.controller.submit_url(MEDIA_URL).await.unwrap();

        let selection = DownloadSelection::full_range(MediaType::Video, 90);
        let result = h.controller.submit_download(&selection).await;

        assert!(matches!(result, Err(FetchError::Io { .. })));
        assert_eq!(h.service.payload_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.controller.status().await, SessionStatus::Error);
        assert_eq!(h.controller.progress(), 0);

        let events = drain_events(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn download_without_loaded_media_is_rejected() {
        let h = harness(FakeService::default());
        let selection = DownloadSelection::full_range(MediaType::Video, 90);
        let result = h.controller.submit_download(&selection).await;
        assert!(matches!(result, Err(FetchError::Validation { .. })));
        assert_eq!(h.controller.status().await, SessionStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_auto_resets_to_idle() {
        let h = harness(FakeService::default());
        h.controller.submit_url(MEDIA_URL).await.unwrap();

        let selection = DownloadSelection::full_range(MediaType::Video, 90);
        h.controller.submit_download(&selection).await.unwrap();
        assert_eq!(h.controller.status().await, SessionStatus::Complete);

        tokio::time::sleep(COMPLETE_RESET_DELAY + Duration::from_millis(100)).await;
        assert_eq!(h.controller.status().await, SessionStatus::Idle);
        assert_eq!(h.controller.progress(), 0);
    }

    #[tokio::test]
    async fn cancellation_returns_to_idle_not_error() {
        let mut h = harness(FakeService {
            payload_hangs: true,
            ..FakeService::default()
        });
        h.controller.submit_url(MEDIA_URL).await.unwrap();

        let controller = Arc::new(h.controller);
        let downloading = {
            let controller = controller.clone();
            tokio::spawn(async move {
                let selection = DownloadSelection::full_range(MediaType::Video, 90);
                controller.submit_download(&selection).await
            })
        };

        loop {
            if controller.status().await == SessionStatus::Downloading {
                break;
            }
            tokio::task::yield_now().await;
        }
        // Let the stalled stream hand over its first chunk before cancelling.
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.cancel_download().await;

        let result = downloading.await.unwrap();
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert_eq!(controller.status().await, SessionStatus::Idle);
        assert_eq!(controller.progress(), 0);

        let events = drain_events(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::DownloadCancelled)));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Failed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn new_url_submission_replaces_the_loaded_media() {
        // First call succeeds, everything after it fails.
        let h = harness(FakeService {
            info_fail_from: 1,
            ..FakeService::default()
        });

        h.controller.submit_url(MEDIA_URL).await.unwrap();
        assert!(h.controller.media_info().await.is_some());

        // A failing re-submission must not leave the stale media behind.
        let result = h.controller.submit_url(MEDIA_URL).await;
        assert!(result.is_err());
        assert!(h.controller.media_info().await.is_none());
        assert_eq!(h.controller.status().await, SessionStatus::Error);
    }
}
