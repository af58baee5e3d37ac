//! assay CLI entry point.
//!
//! Submits files from disk, waits until each one reaches a terminal state, and prints
//! one JSON line per file. The analyzer here is a stand-in that fingerprints the bytes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use assay_core::app::{Route, StatusView};
use assay_core::domain::{AnalyzeError, ArtifactRef, TaskId, Upload};
use assay_core::observability::TaskCounts;
use assay_core::{AppBuilder, AssayConfig};

#[derive(Debug, Parser)]
#[command(name = "assay")]
#[command(about = "Submit artifacts for analysis and wait for the results")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(short, long, env = "ASSAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override workers.count
    #[arg(short, long)]
    workers: Option<usize>,

    /// Override analyzer.permits
    #[arg(short, long)]
    permits: Option<usize>,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// How often to poll each task, in milliseconds
    #[arg(long, default_value = "100")]
    poll_ms: u64,

    /// Files to submit
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

/// Hashes the staged bytes. Runs on the blocking pool like a real model would.
struct DigestAnalyzer;

impl assay_core::ports::Analyzer for DigestAnalyzer {
    fn analyze(&self, artifact: &ArtifactRef) -> Result<Value, AnalyzeError> {
        let bytes = std::fs::read(&artifact.path)?;
        let digest = Sha256::digest(&bytes);
        Ok(json!({
            "filename": artifact.filename,
            "content_type": artifact.content_type,
            "bytes": bytes.len(),
            "sha256": hex::encode(digest),
        }))
    }
}

#[derive(Debug, Serialize)]
struct FileReport {
    file: PathBuf,
    task_id: TaskId,
    route: Route,
    #[serde(flatten)]
    status: StatusView,
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn load_config(cli: &Cli) -> Result<AssayConfig> {
    let mut config = match &cli.config {
        Some(path) => AssayConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AssayConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.workers.count = workers;
    }
    if let Some(permits) = cli.permits {
        config.analyzer.permits = permits;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    let config = load_config(&cli)?;
    let app = AppBuilder::new(config)
        .analyzer(Arc::new(DigestAnalyzer))
        .build()
        .context("building app")?
        .start();
    info!(workers = app.workers(), "assay started");

    let mut submitted = Vec::new();
    for file in &cli.files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let filename = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let upload = Upload::new(filename, content_type_for(file), bytes);

        match app.dispatcher().submit(upload).await {
            Ok(submission) => submitted.push((file.clone(), submission)),
            Err(err) => warn!(file = %file.display(), error = %err, "submission refused"),
        }
    }

    let poll = Duration::from_millis(cli.poll_ms.max(1));
    for (file, submission) in submitted {
        let status = loop {
            match app.dispatcher().status(submission.task_id.as_str()).await? {
                Some(view) if view.is_terminal() => break view,
                Some(_) => tokio::time::sleep(poll).await,
                None => {
                    break StatusView::Unknown {
                        detail: "task disappeared".to_string(),
                    };
                }
            }
        };
        let report = FileReport {
            file,
            task_id: submission.task_id,
            route: submission.route,
            status,
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    let counts = TaskCounts::snapshot(app.store().as_ref()).await;
    let shutdown = app.shutdown().await;
    info!(
        total = counts.total(),
        in_flight = counts.in_flight(),
        failed = counts.failed,
        drained = shutdown.drained,
        aborted = shutdown.aborted,
        "assay finished"
    );

    Ok(())
}
