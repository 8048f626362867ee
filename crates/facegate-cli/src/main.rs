use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{member_name_from_path, FaceEmbedder, FacePipeline, MatchOutcome, MatchSession, Registry};
use facegate_core::pipeline::{DETECTOR_MODEL_FILE, RECOGNIZER_MODEL_FILE};
use facegate_hw::Camera;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod live;

use config::{Config, Overrides};
use live::LiveFeed;

#[derive(Parser)]
#[command(name = "facegate", version, about = "Register face photos and recognise them on a live webcam")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face photo (the member name defaults to the file name)
    Register {
        /// Image containing the face (png, jpg, ...)
        image: PathBuf,
        /// Register under this name instead of the file name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Match the live webcam feed against registered members
    Match,
    /// List registered members
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version and effective configuration
    Info,
    /// List V4L2 capture devices
    Devices,
    /// Capture one frame and report camera diagnostics
    Test,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    config.apply(cli.overrides);
    tracing::debug!(?config, "configuration");

    match cli.command {
        Commands::Register { image, name } => {
            let registered = tokio::task::spawn_blocking(move || -> Result<Registered> {
                let mut registry = Registry::load(&config.registry_path)?;
                let mut pipeline =
                    FacePipeline::load(&config.model_dir).context("failed to load face models")?;
                register(&mut registry, &mut pipeline, &image, name)
            })
            .await??;
            println!("{registered}");
        }
        Commands::Match => return run_match(config).await,
        Commands::List { json } => list(&config, json)?,
        Commands::Info => info(&config)?,
        Commands::Devices => devices(),
        Commands::Test => {
            tokio::task::spawn_blocking(move || camera_test(&config)).await??;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// A member written to the registry by `register`.
#[derive(Debug, PartialEq)]
struct Registered {
    name: String,
    replaced: bool,
}

impl fmt::Display for Registered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Registered {}", self.name)?;
        if self.replaced {
            write!(f, " (replaced previous registration)")?;
        }
        Ok(())
    }
}

/// Embed the face in `image_path` and persist it under `name`, or under the
/// file name when no name is given. The registry file is only written once
/// a face was found.
fn register<E: FaceEmbedder>(
    registry: &mut Registry,
    embedder: &mut E,
    image_path: &Path,
    name: Option<String>,
) -> Result<Registered> {
    let name = match name {
        Some(name) => name,
        None => member_name_from_path(image_path)?,
    };

    let image = image::open(image_path)
        .with_context(|| format!("failed to open image {}", image_path.display()))?
        .to_rgb8();

    let Some(embedding) = embedder.embed(&image)? else {
        bail!("no face detected in {}", image_path.display());
    };

    let previous = registry.insert(&name, embedding, Some(image_path.to_path_buf()))?;
    registry.save()?;
    tracing::info!(name = %name, replaced = previous.is_some(), members = registry.len(), "member registered");

    Ok(Registered { name, replaced: previous.is_some() })
}

/// Raise `abort` on the first interrupt. Returns `true` if a second one
/// arrives, which means the capture loop never got to see the flag.
async fn watch_interrupts<F, Fut>(mut interrupt: F, abort: &AtomicBool) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = interrupt().await {
        tracing::warn!(error = %e, "cannot listen for interrupts");
        return false;
    }
    tracing::info!("interrupt received, stopping match");
    abort.store(true, Ordering::Relaxed);
    interrupt().await.is_ok()
}

async fn run_match(config: Config) -> Result<ExitCode> {
    let registry = Registry::load(&config.registry_path)?;
    if registry.is_empty() {
        println!("No members registered");
        return Ok(ExitCode::FAILURE);
    }

    let abort = Arc::new(AtomicBool::new(false));
    let signal_abort = Arc::clone(&abort);
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, &signal_abort).await {
            tracing::warn!("second interrupt, exiting");
            std::process::exit(130);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || -> Result<MatchOutcome> {
        let mut pipeline = FacePipeline::load(&config.model_dir).context("failed to load face models")?;

        let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)?;
        let mut stream = camera.stream()?;
        stream.discard(config.warmup_frames)?;

        let mut feed = LiveFeed::new(stream);
        let outcome = MatchSession::new(&registry)
            .with_threshold(config.similarity_threshold)
            .run(&mut feed, &mut pipeline, &abort)?;
        tracing::debug!(dark_frames = feed.dark_frames(), "match session finished");
        Ok(outcome)
    })
    .await??;

    Ok(match outcome {
        MatchOutcome::Matched { name, similarity, .. } => {
            println!("Welcome {name}! (similarity {similarity:.2})");
            ExitCode::SUCCESS
        }
        MatchOutcome::NoMatch { .. } => {
            println!("No matching member");
            ExitCode::FAILURE
        }
        MatchOutcome::Aborted { .. } => {
            println!("Match aborted");
            ExitCode::from(130)
        }
    })
}

fn list(config: &Config, json: bool) -> Result<()> {
    let registry = Registry::load(&config.registry_path)?;

    if json {
        let members: Vec<_> = registry
            .iter()
            .map(|(name, member)| {
                serde_json::json!({
                    "name": name,
                    "dim": member.embedding.dim(),
                    "model_version": member.embedding.model_version,
                    "registered_at": member.registered_at.to_rfc3339(),
                    "source": member.source,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&members)?);
        return Ok(());
    }

    if registry.is_empty() {
        println!("No members registered");
        return Ok(());
    }
    for (name, member) in registry.iter() {
        println!(
            "{name}\t{}\t{}",
            member.registered_at.format("%Y-%m-%d %H:%M:%S"),
            member.source.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
        );
    }
    Ok(())
}

fn info(config: &Config) -> Result<()> {
    let members = Registry::load(&config.registry_path).map(|r| r.len());
    let models: serde_json::Map<String, serde_json::Value> = [DETECTOR_MODEL_FILE, RECOGNIZER_MODEL_FILE]
        .into_iter()
        .map(|file| (file.to_string(), config.model_dir.join(file).exists().into()))
        .collect();

    let status = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "config": config,
        "members": members.as_ref().ok(),
        "registry_error": members.as_ref().err().map(|e| e.to_string()),
        "models": models,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No capture devices found");
    }
    for dev in devices {
        println!("{}\t{} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }
}

fn camera_test(config: &Config) -> Result<()> {
    println!("Opening {}...", config.camera_device);
    let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)?;
    println!(
        "  format: {}x{} {:?} ({:?})",
        camera.width,
        camera.height,
        camera.fourcc,
        camera.pixel_format()
    );

    let mut stream = camera.stream()?;
    stream.discard(config.warmup_frames)?;
    let frame = stream.next_frame()?;
    println!("  frame #{}: brightness {:.1}, dark: {}", frame.sequence, frame.avg_brightness(), frame.is_dark);
    Ok(())
}
