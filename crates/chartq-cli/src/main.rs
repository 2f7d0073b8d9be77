//! chartq コマンド
//!
//! # 学習ポイント
//! - 起動時に Context を open し、終了時に close する（明示的なライフサイクル）
//! - 構築は AppBuilder に集約し、expect_tasks で組み込みタスクの登録漏れを検知する
//! - コマンドの結果は stdout に JSON で出し、ログは stderr に出す

mod cli;
mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use chartq_core::app::{App, AppBuilder, Context, Gateway};
use chartq_core::config::PipelineConfig;
use chartq_core::domain::{Job, JobId, JobStatus};
use chartq_core::tasks::job_types;
use clap::Parser;
use serde::Serialize;

use crate::cli::{Cli, Command, JobSpec};

const WAIT_POLL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level, cli.log_json);

    let config = cli.pipeline_config()?;
    let app = build_app(&config).await?;

    let result = dispatch(&app, &config, cli.command).await;
    app.close().await.context("closing backends")?;
    result
}

async fn build_app(config: &PipelineConfig) -> anyhow::Result<App> {
    let context = Context::open(&config.storage)
        .await
        .context("opening backends")?;
    let dataset = config.dataset.open()?;

    let app = AppBuilder::new()
        .with_builtin_tasks()?
        .expect_tasks(&job_types::ALL)
        .context(context)
        .dataset(dataset)
        .with_config(config)
        .build()?;
    Ok(app)
}

async fn dispatch(app: &App, config: &PipelineConfig, command: Command) -> anyhow::Result<()> {
    let gateway = app.gateway();
    match command {
        Command::Run { jobs, out_dir, .. } => {
            let summary = run_jobs(app, config, &jobs, &out_dir).await?;
            print_json(&summary)
        }
        Command::Worker { .. } => run_workers(app, config).await,
        Command::Submit { job_type, params } => {
            let params = cli::parse_params(&params)?;
            let job = gateway.submit(&job_type, params).await?;
            print_json(&job)
        }
        Command::Status { id } => print_json(&gateway.get(id).await?),
        Command::List => {
            let listing = Listing {
                counts: gateway.counts().await?,
                jobs: gateway.list().await?,
            };
            print_json(&listing)
        }
        Command::Result { id, out } => {
            let artifact = gateway.result(id).await?;
            tokio::fs::write(&out, artifact.bytes())
                .await
                .with_context(|| format!("writing {}", out.display()))?;
            tracing::info!(job_id = %id, path = %out.display(), bytes = artifact.len(), "result written");
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct Listing {
    counts: chartq_core::app::StatusCounts,
    jobs: Vec<Job>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    jobs: Vec<RunEntry>,
    completed: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct RunEntry {
    id: JobId,
    job_type: String,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<PathBuf>,
}

/// Submit every job, drive them with an in-process worker group and write
/// each completed chart into `out_dir`.
async fn run_jobs(
    app: &App,
    config: &PipelineConfig,
    specs: &[JobSpec],
    out_dir: &Path,
) -> anyhow::Result<RunSummary> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let gateway = app.gateway();
    let mut ids = Vec::with_capacity(specs.len());
    for spec in specs {
        let job = gateway
            .submit(&spec.job_type, spec.params.clone())
            .await
            .with_context(|| format!("submitting '{}'", spec.job_type))?;
        ids.push(job.id());
    }

    let workers = app.spawn_workers(config.workers);
    let finished = tokio::select! {
        jobs = wait_all(&gateway, &ids) => jobs,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            tracing::warn!("interrupted before every job finished");
            Ok(Vec::new())
        }
    };
    let processed = workers.shutdown_and_join().await;
    tracing::debug!(processed, "worker group stopped");
    let finished = finished?;

    let mut summary = RunSummary {
        jobs: Vec::with_capacity(finished.len()),
        completed: 0,
        failed: 0,
    };
    for job in finished {
        let file = match job.status() {
            JobStatus::Completed => {
                summary.completed += 1;
                Some(write_artifact(&gateway, job.id(), out_dir).await?)
            }
            _ => {
                summary.failed += 1;
                None
            }
        };
        summary.jobs.push(RunEntry {
            id: job.id(),
            job_type: job.job_type().to_string(),
            status: job.status(),
            error: job.error().map(str::to_string),
            file,
        });
    }
    Ok(summary)
}

async fn wait_all(gateway: &Gateway, ids: &[JobId]) -> anyhow::Result<Vec<Job>> {
    let mut jobs = Vec::with_capacity(ids.len());
    for id in ids {
        jobs.push(gateway.wait_terminal(*id, WAIT_POLL).await?);
    }
    Ok(jobs)
}

async fn write_artifact(gateway: &Gateway, id: JobId, out_dir: &Path) -> anyhow::Result<PathBuf> {
    let artifact = gateway.result(id).await?;
    let path = out_dir.join(format!("{id}.{}", artifact.extension()));
    tokio::fs::write(&path, artifact.bytes())
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

async fn run_workers(app: &App, config: &PipelineConfig) -> anyhow::Result<()> {
    let workers = app.spawn_workers(config.workers);
    tracing::info!(workers = workers.len(), "workers started, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;

    tracing::info!("shutting down");
    let processed = workers.shutdown_and_join().await;
    tracing::info!(processed, "workers stopped");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
