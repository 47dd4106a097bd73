//! Service settings
//!
//! One base-URL setting plus timeout and destination knobs, read once at
//! process start from the environment. Nothing is persisted: the session
//! carries no on-disk state.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default base URL of the extraction service.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default timeout for metadata and prepare calls.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for the payload fetch. Media payloads can be large, so
/// this is on the order of minutes.
const DEFAULT_PAYLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Connection settings for the remote extraction service.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the extraction service, without a trailing slash.
    pub base_url: String,

    /// Timeout applied to metadata and prepare calls.
    pub request_timeout: Duration,

    /// Timeout applied to the payload fetch.
    pub payload_timeout: Duration,

    /// Directory downloaded artifacts are saved into.
    pub download_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            payload_timeout: DEFAULT_PAYLOAD_TIMEOUT,
            download_dir: default_download_dir(),
        }
    }
}

impl Settings {
    /// Read settings from the environment, falling back to defaults.
    ///
    /// Recognized variables: `FETCHLY_API_BASE_URL`,
    /// `FETCHLY_REQUEST_TIMEOUT_SECS`, `FETCHLY_PAYLOAD_TIMEOUT_SECS`,
    /// `FETCHLY_DOWNLOAD_DIR`.
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        let base_url = env::var("FETCHLY_API_BASE_URL")
            .ok()
            .and_then(|raw| normalize_base_url(&raw))
            .unwrap_or(defaults.base_url);

        let request_timeout = env_secs("FETCHLY_REQUEST_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let payload_timeout = env_secs("FETCHLY_PAYLOAD_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.payload_timeout);

        let download_dir = env::var("FETCHLY_DOWNLOAD_DIR")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.download_dir);

        Self {
            base_url,
            request_timeout,
            payload_timeout,
            download_dir,
        }
    }
}

/// Trim whitespace and trailing slashes so endpoint paths can always be
/// appended with a single `/`.
fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn env_secs(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// The platform downloads folder, or the working directory when the platform
/// does not define one.
fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}
