//! Headless driver for the Fetchly engine.
//!
//! Stands in for the presentation layer: it submits a URL, prints the
//! extracted metadata, and drives a download while rendering the engine's
//! progress events.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use fetchly::{
    DownloadSelection, HttpRemoteService, MediaType, MetadataGateway, SessionController,
    SessionEvent, Settings,
};

#[derive(Parser)]
#[command(
    name = "fetchly",
    version,
    about = "Client for a remote media extraction service"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show extracted metadata for a media URL
    Info { url: String },

    /// List available container/quality combinations
    Formats { url: String },

    /// List available subtitle tracks
    Subtitles { url: String },

    /// Download an (optionally trimmed) artifact
    Download {
        url: String,

        /// Artifact kind: video, audio, or subtitle
        #[arg(long, default_value = "video", value_parser = parse_media_type)]
        media_type: MediaType,

        /// Container extension, e.g. mp4, m4a
        #[arg(long)]
        extension: Option<String>,

        /// Quality label, e.g. 720p or 192k
        #[arg(long)]
        quality: Option<String>,

        /// Subtitle language code, e.g. en
        #[arg(long)]
        language: Option<String>,

        /// Subtitle format, e.g. srt
        #[arg(long)]
        format: Option<String>,

        /// Trim window start (HH:MM:SS)
        #[arg(long)]
        start: Option<String>,

        /// Trim window end (HH:MM:SS); defaults to the full duration
        #[arg(long)]
        end: Option<String>,

        /// Destination directory (defaults to the platform downloads folder)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn parse_media_type(raw: &str) -> Result<MediaType, String> {
    match raw {
        "video" => Ok(MediaType::Video),
        "audio" => Ok(MediaType::Audio),
        "subtitle" => Ok(MediaType::Subtitle),
        other => Err(format!(
            "unknown media type {:?} (expected video, audio, or subtitle)",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Command::Info { url } => info(&settings, &url).await,
        Command::Formats { url } => formats(&settings, &url).await,
        Command::Subtitles { url } => subtitles(&settings, &url).await,
        Command::Download {
            url,
            media_type,
            extension,
            quality,
            language,
            format,
            start,
            end,
            output_dir,
        } => {
            let mut settings = settings;
            if let Some(dir) = output_dir {
                settings.download_dir = dir;
            }
            download(
                &settings, &url, media_type, extension, quality, language, format, start, end,
            )
            .await
        }
    }
}

async fn info(settings: &Settings, url: &str) -> Result<()> {
    let (controller, _events) = SessionController::connect(settings)?;
    let info = controller
        .submit_url(url)
        .await
        .context("failed to fetch metadata")?;

    println!("Title:     {}", info.title);
    if let Some(channel) = &info.channel {
        println!("Channel:   {}", channel);
    }
    println!("Duration:  {} ({})", info.duration_string, info.full_duration());
    if let Some(views) = info.views {
        println!("Views:     {}", views);
    }
    println!("Thumbnail: {}", info.thumbnail);
    Ok(())
}

async fn formats(settings: &Settings, url: &str) -> Result<()> {
    let service = Arc::new(HttpRemoteService::new(settings)?);
    let gateway = MetadataGateway::new(service);
    let summary = gateway
        .fetch_formats(url, &CancellationToken::new())
        .await
        .context("failed to fetch formats")?;

    println!("Video:");
    for (extension, qualities) in &summary.video_formats {
        println!("  {:<6} {}", extension, qualities.join(", "));
    }
    println!("Audio:");
    for (extension, bitrates) in &summary.audio_formats {
        println!("  {:<6} {}", extension, bitrates.join(", "));
    }
    Ok(())
}

async fn subtitles(settings: &Settings, url: &str) -> Result<()> {
    let service = Arc::new(HttpRemoteService::new(settings)?);
    let gateway = MetadataGateway::new(service);
    let catalog = gateway
        .fetch_subtitles(url, &CancellationToken::new())
        .await
        .context("failed to fetch subtitles")?;

    if catalog.subtitles.is_empty() {
        println!("No subtitles available.");
        return Ok(());
    }
    for (code, language) in &catalog.subtitles {
        println!(
            "  {:<8} {:<20} {}",
            code,
            language.language_name,
            language.formats.join(", ")
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn download(
    settings: &Settings,
    url: &str,
    media_type: MediaType,
    extension: Option<String>,
    quality: Option<String>,
    language: Option<String>,
    format: Option<String>,
    start: Option<String>,
    end: Option<String>,
) -> Result<()> {
    let (controller, mut events) = SessionController::connect(settings)?;
    let controller = Arc::new(controller);

    let info = controller
        .submit_url(url)
        .await
        .context("failed to fetch metadata")?;
    println!("{} ({})", info.title, info.duration_string);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    // Render engine events until the session reaches a terminal state.
    let renderer = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::DownloadProgress { percent } => {
                        bar.set_position(u64::from(percent));
                    }
                    SessionEvent::DownloadCompleted { path, .. } => {
                        bar.finish_with_message(format!("saved to {}", path));
                    }
                    SessionEvent::DownloadCancelled => {
                        bar.abandon_with_message("cancelled".to_string());
                    }
                    SessionEvent::Failed { message } => {
                        bar.abandon_with_message(message);
                    }
                    _ => {}
                }
            }
        })
    };

    let mut selection = DownloadSelection::full_range(media_type, info.duration);
    selection.extension = extension;
    selection.quality = quality;
    selection.language = language;
    selection.format = format;
    if let Some(start) = start {
        selection.start_time = start;
    }
    if let Some(end) = end {
        selection.end_time = end;
    }

    // Ctrl-C turns into a cancellation request instead of a hard exit.
    let watcher = {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                controller.cancel_download().await;
            }
        })
    };

    let result = controller.submit_download(&selection).await;
    watcher.abort();
    drop(controller);
    let _ = renderer.await;

    let artifact = result.context("download failed")?;
    println!(
        "{} ({}) -> {}",
        artifact.filename,
        format_file_size(artifact.bytes_written),
        artifact.path.display()
    );
    Ok(())
}

/// Render a byte count the way humans read it.
fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let exponent = ((bytes as f64).log(1024.0).floor() as usize).min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    if exponent == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[exponent])
    }
}
