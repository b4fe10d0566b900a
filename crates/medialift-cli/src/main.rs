//! medialift: command-line uploader
//!
//! Commands:
//!   upload <FILES...>   - upload files to the CMS endpoint, at most
//!                         `concurrency_limit` at a time, with live progress
//!   config show         - display the effective configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use medialift_core::MedialiftConfig;
use medialift_upload::{
    HttpTransport, TaskId, UploadCoordinator, UploadEventKind, UploadFile, UploadTaskEvent,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "medialift",
    version,
    about = "Bounded-concurrency media uploader",
    long_about = "medialift: upload files to a CMS multipart endpoint with a bounded number of concurrent transfers"
)]
struct Cli {
    /// Path to medialift.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "MEDIALIFT_CONFIG",
        default_value = "/etc/medialift/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "MEDIALIFT_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "MEDIALIFT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload one or more files
    ///
    /// A bearer token for the endpoint is read from MEDIALIFT_TOKEN.
    Upload(UploadArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Files to upload, admitted in the order given
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Upload endpoint (overrides upload.endpoint)
    #[arg(long, short = 'e')]
    endpoint: Option<String>,

    /// Maximum concurrent transfers (overrides upload.concurrency_limit)
    #[arg(long, short = 'j')]
    concurrency: Option<usize>,

    /// Cancel these task ids right after submission (repeatable)
    #[arg(long = "cancel", value_name = "ID")]
    cancel: Vec<u64>,

    /// Print events as JSON lines instead of progress bars
    #[arg(long)]
    json: bool,

    #[arg(long, env = "MEDIALIFT_TOKEN", hide_env_values = true, hide = true)]
    token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MedialiftConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.as_deref().unwrap_or(config.log.level.as_str());
    let format = match cli.log_format {
        Some(format) => format,
        None => LogFormat::from_str(&config.log.format, true)
            .map_err(|e| anyhow::anyhow!("invalid log.format '{}': {e}", config.log.format))?,
    };
    init_logging(level, &format);

    let from_file = cli.config.exists();
    if !from_file {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        from_file,
        "medialift starting"
    );

    match cli.command {
        Commands::Upload(args) => cmd_upload(&config, args).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is reserved for command output
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── `medialift upload` ────────────────────────────────────────────────────────

async fn cmd_upload(config: &MedialiftConfig, args: UploadArgs) -> Result<()> {
    let mut upload_cfg = config.upload.clone();
    if let Some(endpoint) = args.endpoint {
        upload_cfg.endpoint = endpoint;
    }
    if let Some(limit) = args.concurrency {
        upload_cfg.concurrency_limit = limit;
    }

    let transport =
        HttpTransport::from_config(&upload_cfg, args.token).context("building HTTP transport")?;
    let coordinator =
        UploadCoordinator::new(&upload_cfg, transport).context("creating upload coordinator")?;

    // Read everything up front so a bad path aborts before any upload starts
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        files.push(file);
    }

    let bars = if args.json {
        subscribe_json(&coordinator);
        None
    } else {
        Some(ProgressBars::attach(&coordinator)?)
    };

    for file in files {
        let name = file.file_name.clone();
        let id = coordinator
            .submit(file)
            .with_context(|| format!("submitting {name}"))?;
        if let Some(bars) = &bars {
            bars.ensure(id, &name);
        }
    }

    for id in args.cancel {
        if !coordinator.cancel(TaskId(id)) {
            warn!(task_id = id, "--cancel: no such task");
        }
    }

    tokio::select! {
        _ = coordinator.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; cancelling remaining uploads");
            coordinator.cancel_all();
            coordinator.wait_idle().await;
        }
    }

    let stats = coordinator.stats();
    if args.json {
        println!(
            "{}",
            serde_json::to_string(&stats).context("serializing upload stats")?
        );
    } else {
        println!();
        println!("Upload complete:");
        println!("  succeeded: {}", stats.succeeded);
        println!("  failed:    {}", stats.failed);
        println!("  cancelled: {}", stats.cancelled);
        println!("  total:     {}", stats.submitted);
    }

    if stats.failed > 0 {
        anyhow::bail!("{} of {} uploads failed", stats.failed, stats.submitted);
    }
    Ok(())
}

/// One JSON object per event on stdout. Non-progress events report the
/// `-1` progress sentinel.
fn subscribe_json(coordinator: &UploadCoordinator<HttpTransport>) {
    for kind in UploadEventKind::ALL {
        coordinator.on(kind, |event| match event_json(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to encode event"),
        });
    }
}

fn event_json(event: &UploadTaskEvent) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(event)?;
    value["progress"] = serde_json::json!(event.progress_or_sentinel());
    serde_json::to_string(&value)
}

/// Per-task bars keyed by task id, created on submission or first event.
#[derive(Clone)]
struct ProgressBars {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: Arc<Mutex<HashMap<TaskId, ProgressBar>>>,
}

impl ProgressBars {
    fn attach(coordinator: &UploadCoordinator<HttpTransport>) -> Result<Self> {
        let style =
            ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .context("building progress bar template")?
                .progress_chars("=>-");
        let bars = ProgressBars {
            multi: MultiProgress::new(),
            style,
            bars: Arc::default(),
        };
        for kind in UploadEventKind::ALL {
            let bars = bars.clone();
            coordinator.on(kind, move |event| bars.apply(event));
        }
        Ok(bars)
    }

    fn ensure(&self, id: TaskId, file_name: &str) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        bars.entry(id)
            .or_insert_with(|| {
                let pb = self.multi.add(ProgressBar::new(100));
                pb.set_style(self.style.clone());
                pb.set_prefix(format!("#{id} {file_name}"));
                pb.set_message("queued");
                pb
            })
            .clone()
    }

    fn apply(&self, event: &UploadTaskEvent) {
        let pb = self.ensure(event.task_id, &event.file_name);
        match event.kind {
            UploadEventKind::Start => pb.set_message("uploading"),
            UploadEventKind::Progress => {
                if let Some(percent) = event.progress {
                    pb.set_position(percent.round() as u64);
                }
            }
            UploadEventKind::Success => {
                let stored = event.uploaded_file_name.as_deref().unwrap_or_default();
                pb.finish_with_message(format!("done -> {stored}"));
            }
            UploadEventKind::Failure => {
                let reason = event.reason.as_deref().unwrap_or("failed");
                pb.abandon_with_message(format!("failed: {reason}"));
            }
            UploadEventKind::Cancellation => pb.abandon_with_message("cancelled"),
        }
    }
}

// ── `medialift config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &MedialiftConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
