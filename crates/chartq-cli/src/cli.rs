//! コマンドライン引数
//!
//! すべてのフラグは環境変数からも読めます。引数から `PipelineConfig` を組み立て、
//! 以降の処理は設定だけを見ます。

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context as _, bail};
use chartq_core::config::{DatasetConfig, PipelineConfig, StorageConfig};
use chartq_core::domain::JobId;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;

/// chartq - chart rendering job pipeline
#[derive(Parser, Debug)]
#[command(name = "chartq", version, about, long_about = None)]
pub struct Cli {
    /// Log level, overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Where job records, the queue and results live
    #[arg(long, env = "CHARTQ_STORAGE", value_enum, default_value_t = StorageKind::Memory, global = true)]
    pub storage: StorageKind,

    /// Directory for the fs backend
    #[arg(long, env = "CHARTQ_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Connection URL for the redis backend
    #[arg(long, env = "CHARTQ_REDIS_URL", global = true)]
    pub redis_url: Option<String>,

    /// Key prefix for the redis backend
    #[arg(long, env = "CHARTQ_REDIS_PREFIX", default_value = "chartq", global = true)]
    pub redis_prefix: String,

    /// JSON array of records to chart (takes precedence over --dataset-url)
    #[arg(long, env = "CHARTQ_DATASET_FILE", global = true)]
    pub dataset_file: Option<PathBuf>,

    /// URL returning a JSON array of records
    #[arg(long, env = "CHARTQ_DATASET_URL", global = true)]
    pub dataset_url: Option<String>,

    /// Milliseconds a worker waits on the queue before checking for shutdown
    #[arg(long, env = "CHARTQ_POLL_INTERVAL_MS", default_value_t = 1000, global = true)]
    pub poll_interval_ms: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Fs,
    Redis,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit jobs, process them in-process and write the charts to a directory
    Run {
        /// TYPE or TYPE:JSON, e.g. histogram:{"param":"crime_type"}
        #[arg(long = "job", required = true)]
        jobs: Vec<JobSpec>,

        #[arg(long, default_value = "charts")]
        out_dir: PathBuf,

        #[arg(long, env = "CHARTQ_WORKERS", default_value_t = 2)]
        workers: usize,
    },

    /// Process queued jobs until Ctrl-C
    Worker {
        #[arg(long, env = "CHARTQ_WORKERS", default_value_t = 2)]
        workers: usize,
    },

    /// Submit one job and print its record
    Submit {
        #[arg(long)]
        job_type: String,

        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Print one job record
    Status { id: JobId },

    /// Print every job record and the status counts
    List,

    /// Write the artifact of a completed job to a file
    Result {
        id: JobId,

        #[arg(long)]
        out: PathBuf,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Worker { .. } => "worker",
            Self::Submit { .. } => "submit",
            Self::Status { .. } => "status",
            Self::List => "list",
            Self::Result { .. } => "result",
        }
    }

    /// Worker count for the commands that execute tasks.
    pub fn workers(&self) -> Option<usize> {
        match self {
            Self::Run { workers, .. } | Self::Worker { workers } => Some(*workers),
            _ => None,
        }
    }

    /// Whether the command hands ids to, or takes them from, a queue another
    /// process must see.
    fn needs_shared_queue(&self) -> bool {
        matches!(self, Self::Submit { .. } | Self::Worker { .. })
    }
}

impl StorageKind {
    fn shares_queue(self) -> bool {
        matches!(self, Self::Redis)
    }

    fn is_durable(self) -> bool {
        !matches!(self, Self::Memory)
    }
}

/// A `--job` argument: a job type with optional JSON params.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub job_type: String,
    pub params: Value,
}

impl FromStr for JobSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (job_type, params) = match s.split_once(':') {
            Some((job_type, raw)) => {
                let params = serde_json::from_str(raw)
                    .with_context(|| format!("params for '{job_type}' are not valid JSON"))?;
                (job_type, params)
            }
            None => (s, Value::Object(Default::default())),
        };
        if job_type.trim().is_empty() {
            bail!("job type is empty in '{s}'");
        }
        Ok(Self {
            job_type: job_type.trim().to_string(),
            params,
        })
    }
}

/// Parse `--params` for `submit`.
pub fn parse_params(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).context("--params is not valid JSON")
}

impl Cli {
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let backend = &self.backend;
        let command = self.command.name();
        if self.command.needs_shared_queue() && !backend.storage.shares_queue() {
            bail!(
                "`{command}` needs a queue shared between processes: use --storage redis, \
                 or `run` to submit and process jobs in one process"
            );
        }
        if !matches!(self.command, Command::Run { .. }) && !backend.storage.is_durable() {
            bail!("`{command}` cannot see jobs from another process with --storage memory");
        }

        let storage = match backend.storage {
            StorageKind::Memory => StorageConfig::Memory,
            StorageKind::Fs => {
                let Some(dir) = backend.data_dir.clone() else {
                    bail!("--storage fs needs --data-dir (or CHARTQ_DATA_DIR)");
                };
                StorageConfig::Fs { dir }
            }
            StorageKind::Redis => {
                let Some(url) = backend.redis_url.clone() else {
                    bail!("--storage redis needs --redis-url (or CHARTQ_REDIS_URL)");
                };
                StorageConfig::Redis {
                    url,
                    prefix: backend.redis_prefix.clone(),
                }
            }
        };
        let dataset = match (&backend.dataset_file, &backend.dataset_url) {
            (Some(path), _) => DatasetConfig::File { path: path.clone() },
            (None, Some(url)) => DatasetConfig::Url { url: url.clone() },
            (None, None) if self.command.workers().is_some() => {
                bail!("`{command}` needs --dataset-file or --dataset-url to chart");
            }
            (None, None) => DatasetConfig::default(),
        };

        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            workers: self.command.workers().unwrap_or(defaults.workers),
            poll_interval_ms: backend.poll_interval_ms,
            storage,
            dataset,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("line", "line", json!({}))]
    #[case("histogram:{\"param\":\"crime_type\"}", "histogram", json!({"param": "crime_type"}))]
    #[case(" line :{\"date_field\":\"d\"}", "line", json!({"date_field": "d"}))]
    fn job_spec_parses(#[case] raw: &str, #[case] job_type: &str, #[case] params: Value) {
        let spec: JobSpec = raw.parse().unwrap();
        assert_eq!(spec.job_type, job_type);
        assert_eq!(spec.params, params);
    }

    #[rstest]
    #[case("")]
    #[case(":{}")]
    #[case("histogram:{param}")]
    fn job_spec_rejects(#[case] raw: &str) {
        assert!(raw.parse::<JobSpec>().is_err());
    }

    #[test]
    fn run_builds_config_from_flags() {
        let cli = Cli::try_parse_from([
            "chartq",
            "--storage",
            "fs",
            "--data-dir",
            "/tmp/chartq",
            "--dataset-file",
            "/tmp/records.json",
            "run",
            "--job",
            "line",
            "--workers",
            "4",
        ])
        .unwrap();

        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(
            config.storage,
            StorageConfig::Fs {
                dir: PathBuf::from("/tmp/chartq")
            }
        );
        assert_eq!(
            config.dataset,
            DatasetConfig::File {
                path: PathBuf::from("/tmp/records.json")
            }
        );
    }

    #[test]
    fn fs_storage_without_dir_is_rejected() {
        let cli = Cli::try_parse_from(["chartq", "--storage", "fs", "list"]).unwrap();
        assert!(cli.pipeline_config().is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let cli = Cli::try_parse_from([
            "chartq",
            "--storage",
            "redis",
            "--redis-url",
            "redis://127.0.0.1",
            "--dataset-url",
            "http://localhost/data.json",
            "worker",
            "--workers",
            "0",
        ])
        .unwrap();
        let err = cli.pipeline_config().unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[rstest]
    #[case::fs_submit(&["--storage", "fs", "--data-dir", "/tmp/chartq", "submit", "--job-type", "line"], "shared")]
    #[case::fs_worker(&["--storage", "fs", "--data-dir", "/tmp/chartq", "--dataset-file", "d.json", "worker"], "shared")]
    #[case::memory_submit(&["submit", "--job-type", "line"], "shared")]
    #[case::memory_list(&["list"], "memory")]
    #[case::memory_status(&["status", "job-01ARZ3NDEKTSV4RRFFQ69G5FAV"], "memory")]
    fn process_local_backends_only_allow_in_process_commands(
        #[case] args: &[&str],
        #[case] reason: &str,
    ) {
        let cli = Cli::try_parse_from(std::iter::once("chartq").chain(args.iter().copied())).unwrap();
        let err = cli.pipeline_config().unwrap_err();
        assert!(err.to_string().contains(reason), "{err}");
    }

    #[rstest]
    #[case::fs_list(&["--storage", "fs", "--data-dir", "/tmp/chartq", "list"])]
    #[case::fs_result(&["--storage", "fs", "--data-dir", "/tmp/chartq", "result", "job-01ARZ3NDEKTSV4RRFFQ69G5FAV", "--out", "a.svg"])]
    #[case::redis_submit(&["--storage", "redis", "--redis-url", "redis://127.0.0.1", "submit", "--job-type", "line"])]
    fn read_and_submit_commands_accept_durable_backends(#[case] args: &[&str]) {
        let cli = Cli::try_parse_from(std::iter::once("chartq").chain(args.iter().copied())).unwrap();
        assert!(cli.pipeline_config().is_ok());
    }

    #[rstest]
    #[case::run(&["run", "--job", "line"])]
    #[case::worker(&["--storage", "redis", "--redis-url", "redis://127.0.0.1", "worker"])]
    fn commands_that_chart_require_a_dataset(#[case] args: &[&str]) {
        let cli = Cli::try_parse_from(std::iter::once("chartq").chain(args.iter().copied())).unwrap();
        let err = cli.pipeline_config().unwrap_err();
        assert!(err.to_string().contains("--dataset-file"), "{err}");
    }

    #[test]
    fn status_parses_job_id() {
        let cli =
            Cli::try_parse_from(["chartq", "status", "job-01ARZ3NDEKTSV4RRFFQ69G5FAV"]).unwrap();
        assert!(matches!(cli.command, Command::Status { .. }));
    }
}
