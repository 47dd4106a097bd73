//! Fetchly client engine.
//!
//! Orchestrates media acquisition against a remote extraction service:
//! fetch extracted metadata for a URL, validate an optional trim window, run
//! the two-phase prepare/fetch download protocol with bounded retries and
//! streaming progress, and drive the session status machine a presentation
//! layer observes.

pub mod download;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod models;
pub mod retry;
pub mod service;
pub mod session;
pub mod settings;
pub mod time_utils;
pub mod url_utils;

pub use download::{Downloader, SavedArtifact};
pub use errors::FetchError;
pub use events::SessionEvent;
pub use gateway::MetadataGateway;
pub use models::{
    DownloadRequest, DownloadSelection, FormatSummary, MediaInfo, MediaType, PreparedDownload,
    SessionStatus, SubtitleCatalog,
};
pub use retry::RetryPolicy;
pub use service::{HttpRemoteService, RemoteService};
pub use session::SessionController;
pub use settings::Settings;
