use serde::Serialize;

use crate::models::{MediaInfo, SessionStatus};

/// Engine -> observer events.
///
/// The presentation layer receives these from the channel handed to the
/// session controller and switches on `event` to update its state; snapshot
/// accessors on the controller cover late subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// The status machine moved; `progress` is the value travelling with it.
    StatusChanged {
        status: SessionStatus,
        progress: u8,
    },

    /// Metadata arrived for the submitted URL.
    MetadataReady { info: MediaInfo },

    /// Download progress in percent, non-decreasing within one download.
    DownloadProgress { percent: u8 },

    /// The artifact was saved.
    DownloadCompleted {
        filename: String,
        path: String,
        bytes_written: u64,
    },

    /// A genuine failure; `message` is human-readable.
    Failed { message: String },

    /// The in-flight download was cancelled on request. Deliberately not a
    /// `Failed` event: observers must not style this as an error.
    DownloadCancelled,
}
