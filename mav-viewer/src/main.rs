//! mav-viewer - QR asset viewer driver
//!
//! Drives the viewer core from the command line: resolve a scanned route
//! into its bundle, fill a question set, submit an answer or report a video
//! view. Results are printed to stdout as JSON; logs go to stderr or the
//! configured log file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mav_common::config::{LoggingConfig, ENV_API_TOKEN};
use mav_common::events::{EventBus, ViewerEvent};
use mav_viewer::config::{self, CliOverrides};
use mav_viewer::model::ObjectiveSet;
use mav_viewer::{
    ApplyOutcome, QuestionSetResolver, ResolutionOutcome, RouteParams, TelemetryEmitter,
    ViewSession, ViewState,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mav-viewer", version, about = "QR-code asset viewer")]
struct Cli {
    /// Path to the TOML config file (else MAV_CONFIG, else the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the content service (else MAV_API_BASE_URL, else config)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token for signed-in requests
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a route (bookId [chapterId [topicId [subtopicId]]]) into its bundle
    Resolve {
        segments: Vec<String>,

        /// Route came from a workbook QR code
        #[arg(long)]
        workbook: bool,
    },

    /// Fetch the full questions of an objective set
    Questions { set_id: String },

    /// Submit an answer and print the verdict
    Answer {
        question_id: String,
        selected_index: usize,
    },

    /// Report a video view
    ViewVideo { video_id: String },
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        config_path: cli.config.as_deref(),
        base_url: cli.base_url.as_deref(),
        token: cli.token.as_deref(),
    };
    let (toml_config, config_file) = config::load_toml(overrides.config_path)?;

    init_tracing(&toml_config.logging)?;

    info!("Starting mav-viewer v{}", env!("CARGO_PKG_VERSION"));
    match &config_file {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file, using defaults"),
    }

    let settings = config::resolve_settings(&toml_config, &overrides);
    if settings.api_token.is_none() {
        info!(
            "No API token (--token, {} or config); requests are anonymous",
            ENV_API_TOKEN
        );
    }
    info!("Content service: {}", settings.api_base_url);

    let source = Arc::new(config::http_source(&settings)?);
    let policy = config::retry_policy(&settings);
    let ctx = config::request_context(&settings);

    match cli.command {
        Command::Resolve { segments, workbook } => {
            let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
            let params = RouteParams::from_segments(&segments, workbook)?;
            let session = ViewSession::new(source, policy, EventBus::default());

            match session.navigate(&params, &ctx).await {
                Ok(ApplyOutcome::Applied) => {}
                Ok(ApplyOutcome::Discarded) => bail!("Navigation superseded"),
                Err(e) => {
                    warn!(retryable = e.is_retryable(), "Resolve failed: {}", e);
                    return Err(e.into());
                }
            }

            match session.state().await {
                ViewState::Ready { entity, bundle } => {
                    print_json(&json!({ "entity": entity, "bundle": bundle.as_ref() }))?
                }
                other => bail!("Unexpected view state: {}", other.name()),
            }
        }

        Command::Questions { set_id } => {
            let resolver = QuestionSetResolver::new(source);
            let set = ObjectiveSet {
                id: set_id,
                name: String::new(),
                description: String::new(),
                level: String::new(),
                total_questions: 0,
                questions: Vec::new(),
                resolution_failed: false,
            };

            let resolved = resolver.resolve_with_outcome(&set, &ctx).await;
            let source_name = match &resolved.outcome {
                ResolutionOutcome::Resolved(strategy) => Some(strategy.as_str()),
                _ => None,
            };
            print_json(&json!({
                "setId": resolved.set.id,
                "source": source_name,
                "resolutionFailed": resolved.set.resolution_failed,
                "questions": resolved.set.questions,
            }))?;
        }

        Command::Answer {
            question_id,
            selected_index,
        } => {
            let telemetry = TelemetryEmitter::new(source, policy);
            let verdict = telemetry
                .record_answer(&question_id, selected_index, &ctx)
                .await;
            print_json(&json!({ "verdict": verdict, "toast": verdict.toast() }))?;
        }

        Command::ViewVideo { video_id } => {
            let bus = EventBus::default();
            let mut rx = bus.subscribe();
            let telemetry = TelemetryEmitter::new(source, policy).with_event_bus(bus);
            telemetry.record_video_view(&video_id, &ctx);

            // Only the spawned delivery task emits on this bus, so the first
            // event is its result. Bound the wait by the worst-case schedule.
            let budget = settings.request_timeout_ms * u64::from(policy.max_attempts)
                + policy.backoff_after(policy.max_attempts).as_millis() as u64 * 2;
            let event = tokio::time::timeout(Duration::from_millis(budget), rx.recv())
                .await
                .context("Timed out waiting for video view delivery")?
                .context("Telemetry channel closed")?;

            match event {
                ViewerEvent::VideoViewRecorded { attempts, .. } => {
                    print_json(&json!({ "videoId": video_id, "recorded": true, "attempts": attempts }))?
                }
                ViewerEvent::TelemetryFailed {
                    attempts, message, ..
                } => print_json(&json!({
                    "videoId": video_id,
                    "recorded": false,
                    "attempts": attempts,
                    "error": message,
                }))?,
                other => bail!("Unexpected event: {}", other.event_type()),
            }
        }
    }

    Ok(())
}
