use crate::{
    cancel::CancelToken,
    client::{BatchId, Transport, http::HttpTransport},
    clock::SystemClock,
    config::Config,
    pipeline::Harness,
    probe::millis,
    report::render_summary,
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "recon-bench")]
#[command(about = "Timing harness for the reconciliation service (upload, poll, probe, report)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./recon-bench.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the service is reachable and show the effective configuration.
    Doctor {},
    /// Run the read-latency batteries against an already processed batch.
    Probe {
        #[arg(long)]
        batch_id: String,
    },
    /// Upload each scenario's input, wait for processing, probe, and report.
    Run {
        #[arg(long)]
        base_url: Option<String>,
        /// Where to write the JSON report.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let mut cfg = Config::resolve(args.config.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg)?;
            doctor(&cfg)
        }
        Command::Probe { batch_id } => {
            let _guard = init_logging(&args, &cfg)?;
            probe(&cfg, &BatchId::new(batch_id.clone()))
        }
        Command::Run { base_url, out } => {
            if let Some(url) = base_url {
                cfg.server.base_url = url.clone();
            }
            if let Some(out) = out {
                cfg.output.report_path = out.clone();
            }
            let _guard = init_logging(&args, &cfg)?;
            run(&cfg)
        }
    }
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = resolve_log_path(cfg) {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(&path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from("recon-bench.log"))
}

/// Cancels `cancel` on Ctrl+C so a long completion wait can be abandoned.
fn install_interrupt_handler(cancel: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || {
        warn!("received Ctrl+C, aborting run");
        cancel.cancel();
    })
    .context("failed to register signal handler")
}

fn doctor(cfg: &Config) -> Result<()> {
    let transport = HttpTransport::new(cfg)?;
    let health = transport.health();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "base_url": transport.base_url(),
            "reachable": health.is_ok(),
            "error": health.as_ref().err().map(|e| e.to_string()),
            "config": cfg,
        }))?
    );
    health.with_context(|| format!("service not reachable at {}", transport.base_url()))
}

fn probe(cfg: &Config, batch_id: &BatchId) -> Result<()> {
    let transport = HttpTransport::new(cfg)?;
    let harness = Harness::new(cfg, transport, SystemClock, CancelToken::new());
    harness.check_health()?;

    let (search, list) = harness.probe_batch(batch_id);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "batch_id": batch_id,
            "avg_search_ms": search.mean().map(millis),
            "avg_list_ms": list.mean().map(millis),
            "search_failures": search.failures,
            "list_failures": list.failures,
        }))?
    );
    if search.results.is_empty() && list.results.is_empty() {
        bail!("every probe failed for batch {batch_id}");
    }
    Ok(())
}

fn run(cfg: &Config) -> Result<()> {
    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone())?;

    if cfg.output.dump_effective_config {
        let path = cfg
            .output
            .report_path
            .with_file_name("effective-config.toml");
        cfg.write_effective(&path)?;
    }

    let transport = HttpTransport::new(cfg)?;
    let harness = Harness::new(cfg, transport, SystemClock, cancel);
    let report = if cfg.output.write_report {
        harness.run_and_write(&cfg.output.report_path)?
    } else {
        harness.run()?
    };
    info!("{} scenario(s) recorded", report.len());

    if cfg.output.print_summary {
        println!("{}", render_summary(&report));
    }

    Ok(())
}
