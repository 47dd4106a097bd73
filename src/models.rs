use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::time_utils;

/// Session lifecycle status observed by the presentation layer.
///
/// `Complete` and `Error` are terminal for one action, not for the session:
/// `Complete` auto-resets to `Idle` after a short delay and `Error` clears on
/// the next submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Processing,
    Downloading,
    Complete,
    Error,
}

/// Kind of artifact a download action asks the service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Subtitle => "subtitle",
        }
    }
}

/// One selectable video or audio rendition offered for the current media.
/// Read-only, derived data; same lifecycle as the `MediaInfo` that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVariant {
    pub extension: String,
    pub quality: String,
    #[serde(rename = "sourceUrl")]
    pub source_url: String,
}

/// One selectable subtitle track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub lang: String,
    pub ext: String,
    #[serde(rename = "sourceUrl")]
    pub source_url: String,
}

/// Available renditions grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCatalog {
    #[serde(default)]
    pub video: Vec<StreamVariant>,
    #[serde(default)]
    pub audio: Vec<StreamVariant>,
}

/// Metadata the service extracted for a media URL.
///
/// Immutable once fetched; a new URL submission replaces it wholesale rather
/// than mutating it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub thumbnail: String,
    /// Total duration in whole seconds.
    pub duration: u64,
    /// The service's own human-readable rendering of the duration.
    pub duration_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streams: Option<StreamCatalog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<Vec<SubtitleTrack>>,
}

impl MediaInfo {
    /// Canonical `HH:MM:SS` rendering of the full duration, as accepted by
    /// the trim-range helpers.
    pub fn full_duration(&self) -> String {
        time_utils::full_duration(self.duration)
    }
}

/// The user's download configuration, captured at the moment of the action.
///
/// Times are `HH:MM:SS`; malformed values fall back to the full range at
/// validation time instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSelection {
    pub media_type: MediaType,
    pub extension: Option<String>,
    pub quality: Option<String>,
    pub language: Option<String>,
    pub format: Option<String>,
    pub start_time: String,
    pub end_time: String,
}

impl DownloadSelection {
    /// A full-range selection with service-side defaults for everything else.
    pub fn full_range(media_type: MediaType, duration_seconds: u64) -> Self {
        Self {
            media_type,
            extension: None,
            quality: None,
            language: None,
            format: None,
            start_time: "00:00:00".to_string(),
            end_time: time_utils::full_duration(duration_seconds),
        }
    }
}

/// Body of the prepare-phase call. Constructed fresh per download action.
///
/// `start_time`/`end_time` are left out of the serialized body when they
/// equal the full-range defaults; the service reads their absence as
/// "no trim".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

/// Prepare-phase reply. `download_url` is a single-use pointer to the binary
/// payload; `filename` is the name the artifact must be saved under.
///
/// Fields stay optional at the wire level so an incomplete reply can be
/// reported as a contract violation instead of a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparedDownload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Available container/quality combinations, keyed by extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSummary {
    #[serde(default)]
    pub video_formats: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub audio_formats: HashMap<String, Vec<String>>,
}

/// Subtitle tracks the service can produce, keyed by language code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleCatalog {
    #[serde(default)]
    pub subtitles: HashMap<String, SubtitleLanguage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleLanguage {
    pub language_name: String,
    #[serde(default)]
    pub formats: Vec<String>,
}
