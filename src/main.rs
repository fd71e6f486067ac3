use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{debug, info, warn};

use video_trimmer::{config::Config, logging, TrimEngine};

#[derive(Parser)]
#[command(
    name = "video-trimmer",
    version,
    about = "Trim a video to a time range and grab still frames",
    long_about = "Video-Trimmer exports a time-clipped copy of a video, optionally without audio, with its rotation baked in so the result plays right side up. It can also write upright JPEG thumbnails from the same file."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the metadata the engine resolves for a file
    Probe {
        /// Source video
        file: PathBuf,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Export [start, end) of a video; Ctrl-C cancels
    Trim {
        /// Source video
        file: PathBuf,

        /// Start of the range in milliseconds
        #[arg(short, long)]
        start: i64,

        /// End of the range in milliseconds (exclusive)
        #[arg(short, long)]
        end: i64,

        /// Drop the audio track
        #[arg(long)]
        no_audio: bool,
    },

    /// Write an upright JPEG still
    Thumbnail {
        /// Source video
        file: PathBuf,

        /// Position in milliseconds
        #[arg(short, long)]
        at: i64,

        /// Output width; only used together with --height
        #[arg(long)]
        width: Option<u32>,

        /// Output height; only used together with --width
        #[arg(long)]
        height: Option<u32>,

        /// JPEG quality 0-100 (defaults to the configured quality)
        #[arg(short, long)]
        quality: Option<u8>,
    },

    /// Delete every file the trimmer has written to its output directory
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => Config::from_file(config_path)
            .with_context(|| format!("loading configuration from {}", config_path.display()))?,
        None => Config::default(),
    };

    logging::init_logging(&config.logging, cli.verbose);
    info!("Starting Video-Trimmer v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &cli.config {
        debug!("Configuration loaded from {}", path.display());
    }

    let default_quality = config.thumbnail.default_quality;
    let mut engine = TrimEngine::new(config)?;

    match cli.command {
        Command::Probe { file, json } => {
            let asset = engine.load_video(&file).await?;
            let metadata = asset.metadata();
            if json {
                println!("{}", serde_json::to_string_pretty(metadata)?);
            } else {
                println!("{}", file.display());
                println!("  duration:  {} ms", asset.duration_ms());
                println!(
                    "  size:      {}x{}",
                    metadata.natural_size.width, metadata.natural_size.height
                );
                println!(
                    "  rotation:  {} degrees",
                    video_trimmer::video::Rotation::classify(&metadata.preferred_transform).degrees()
                );
                for track in &metadata.tracks {
                    println!("  track #{}: {:?} ({})", track.index, track.kind, track.codec);
                }
            }
        }

        Command::Trim {
            file,
            start,
            end,
            no_audio,
        } => {
            engine.load_video(&file).await?;
            let task = engine.start_trim(start, end, !no_audio)?;
            let cancel = task.cancel_token();
            let mut progress = task.subscribe_progress();

            let outcome = task.wait();
            tokio::pin!(outcome);
            let mut interrupted = false;

            let result = loop {
                tokio::select! {
                    biased;
                    result = &mut outcome => break result,
                    _ = signal::ctrl_c(), if !interrupted => {
                        warn!("Interrupted, cancelling export");
                        interrupted = true;
                        cancel.cancel();
                    }
                    Ok(()) = progress.changed() => {
                        debug!("Export progress: {:.0}%", *progress.borrow() * 100.0);
                    }
                }
            };

            let path = result?;
            info!("Trim complete! Output saved to: {}", path.display());
            println!("{}", path.display());
        }

        Command::Thumbnail {
            file,
            at,
            width,
            height,
            quality,
        } => {
            engine.load_video(&file).await?;
            let path = engine
                .generate_thumbnail(at, width, height, quality.unwrap_or(default_quality))
                .await?;
            println!("{}", path.display());
        }

        Command::ClearCache => {
            let removed = engine.clear_cache();
            println!("Removed {} cached files", removed);
        }
    }

    Ok(())
}
