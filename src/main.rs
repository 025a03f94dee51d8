use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use pillcounter::{AppConfig, Controller, CountResult, Notification};

#[derive(Parser)]
#[command(name = "pillcounter")]
#[command(about = "Count pills in camera frames or still images")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save annotated, original and intermediate images to this directory
    #[arg(long, global = true, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Count pills in each image, in order
    Images {
        #[arg(value_name = "PATHS", required = true)]
        paths: Vec<PathBuf>,
    },
    /// Count pills from the camera until Ctrl-C
    Live {
        /// Stop after this many processed frames
        #[arg(long)]
        frames: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };

    let level = if args.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        detector = ?config.detector.kind,
        stream_id = config.display.stream_id,
        window_secs = config.smoothing.window_secs,
        "pillcounter starting"
    );

    if let Some(dir) = &args.out {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }

    let mut controller = Controller::new(&config);
    if let Some(reason) = controller.unavailable_reason() {
        bail!("detector unavailable: {}", reason);
    }

    let outcome = match args.command {
        Command::Images { paths } => run_images(&mut controller, paths, args.out.as_deref()).await,
        Command::Live { frames } => run_live(&mut controller, frames, args.out.as_deref()).await,
    };

    controller.shutdown();
    outcome
}

async fn run_images(controller: &mut Controller, paths: Vec<PathBuf>, out: Option<&Path>) -> anyhow::Result<()> {
    let total = paths.len();
    controller.load_static_set(paths.clone());

    let mut handled = 0;
    let mut grand_total = 0u64;
    while handled < total {
        let Some(notifications) = controller.next_notifications().await else {
            bail!("worker exited before all images were processed");
        };
        for notification in notifications {
            match notification {
                Notification::ImagesUpdated(_) => {
                    if let Some(result) = controller.latest_result() {
                        let name = result
                            .source_path
                            .as_deref()
                            .unwrap_or_else(|| Path::new("?"))
                            .display()
                            .to_string();
                        println!("{}: {} pills", name, result.raw_count);
                        grand_total += u64::from(result.raw_count);
                        if let Some(dir) = out {
                            save_result(dir, result, &format!("{:03}", handled))?;
                        }
                    }
                }
                Notification::Fault(e) => {
                    warn!(error = %e, "image skipped");
                    println!("{}: unreadable", paths[handled].display());
                }
                Notification::Unavailable(reason) => bail!("detector unavailable: {}", reason),
                _ => continue,
            }
            handled += 1;
            if handled < total {
                controller.next();
            }
        }
    }

    println!("\nTotal across {} images: {}", total, grand_total);
    Ok(())
}

async fn run_live(controller: &mut Controller, frames: Option<u64>, out: Option<&Path>) -> anyhow::Result<()> {
    controller.start_live();

    loop {
        let notifications = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            batch = controller.next_notifications() => match batch {
                Some(batch) => batch,
                None => bail!("worker exited unexpectedly"),
            },
        };

        for notification in notifications {
            match notification {
                Notification::PillCountChanged(count) => {
                    println!("frame {}: {} pills", controller.frames_processed(), count);
                }
                Notification::ImagesUpdated(_) => {
                    if let (Some(dir), Some(result)) = (out, controller.latest_result()) {
                        save_result(dir, result, "live")?;
                    }
                }
                Notification::Fault(e) => bail!("live capture failed: {}", e),
                Notification::Unavailable(reason) => bail!("detector unavailable: {}", reason),
                _ => {}
            }
        }

        if frames.is_some_and(|limit| controller.frames_processed() >= limit) {
            break;
        }
    }

    controller.stop();
    Ok(())
}

fn save_result(dir: &Path, result: &CountResult, tag: &str) -> anyhow::Result<()> {
    result
        .annotated
        .image()
        .save(dir.join(format!("annotated_{}.png", tag)))
        .context("failed to save annotated image")?;
    result
        .original
        .image()
        .save(dir.join(format!("unannotated_{}.png", tag)))
        .context("failed to save original image")?;
    for (i, stage) in result.stages.iter().enumerate() {
        stage
            .frame
            .image()
            .save(dir.join(format!("{}_{}_{}.png", i + 1, stage.name, tag)))
            .with_context(|| format!("failed to save stage image {}", stage.name))?;
    }
    Ok(())
}
