use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use corral_agentd::LogArgs;
use corral_api::{RemoteConfig, RemoteCoordinator};
use corral_core::{Client, ClientConfig, JobSpec, launch::split_words};
use corral_model::{
    Env, Priority,
    constants::{
        ENV_WORKER_COUNT, ENV_WORKER_INTERPRETER, ENV_WORKER_MEMORY_MB, ENV_WORKER_VCORES,
        SUPERVISOR_ARTIFACT,
    },
};
use corral_store::{ArtifactStager, LocalFsStore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "corral-submit")]
#[command(version)]
#[command(about = "Submit a script job to a corral cluster and wait for it to finish")]
struct Args {
    /// Script every worker runs.
    #[arg(long)]
    execute: PathBuf,

    /// File staged next to the script; repeatable.
    #[arg(long = "resource")]
    resources: Vec<PathBuf>,

    /// Milliseconds after submission before an unfinished job is killed.
    #[arg(long, default_value_t = 10_000_000)]
    timeout: u64,

    /// Coordinator URL.
    #[arg(long, env = "CORRAL_COORDINATOR", default_value = "http://127.0.0.1:8032")]
    coordinator: String,

    /// Root of the shared artifact store the cluster reads from.
    #[arg(long, env = "CORRAL_STORE_ROOT")]
    store_root: Option<PathBuf>,

    /// Supervisor executable. Defaults to `corral-am` next to this binary.
    #[arg(long, env = "CORRAL_SUPERVISOR_BINARY")]
    supervisor_binary: Option<PathBuf>,

    #[arg(long, default_value = "corral")]
    job_name: String,

    #[arg(long, default_value_t = 0)]
    priority: Priority,

    /// Number of worker containers.
    #[arg(long)]
    workers: Option<u32>,

    #[arg(long)]
    worker_memory_mb: Option<u32>,

    #[arg(long)]
    worker_vcores: Option<u32>,

    /// Program the script is run with, split into words with shell quoting
    /// rules, e.g. `/usr/bin/env python3` or `'/opt/my tools/python'`.
    #[arg(long)]
    interpreter: Option<String>,

    /// Milliseconds between status polls.
    #[arg(long, default_value_t = 1_000)]
    poll_interval: u64,

    #[command(flatten)]
    log: LogArgs,
}

impl Args {
    fn supervisor_env(&self) -> anyhow::Result<Env> {
        let mut env = Env::new();
        if let Some(n) = self.workers {
            env.push(ENV_WORKER_COUNT, n.to_string());
        }
        if let Some(m) = self.worker_memory_mb {
            env.push(ENV_WORKER_MEMORY_MB, m.to_string());
        }
        if let Some(v) = self.worker_vcores {
            env.push(ENV_WORKER_VCORES, v.to_string());
        }
        if let Some(i) = &self.interpreter {
            split_words(i).with_context(|| format!("--interpreter {i}"))?;
            env.push(ENV_WORKER_INTERPRETER, i.clone());
        }
        Ok(env)
    }

    fn supervisor_binary(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.supervisor_binary {
            return Ok(path.clone());
        }
        let exe = std::env::current_exe().context("locate current executable")?;
        let dir = exe
            .parent()
            .context("current executable has no parent directory")?;
        Ok(dir.join(SUPERVISOR_ARTIFACT))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    args.log.init()?;

    let remote = RemoteCoordinator::new(RemoteConfig {
        endpoint: args.coordinator.clone(),
        ..Default::default()
    })?;
    let store_root = args
        .store_root
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("corral").join("store"));
    let stager = ArtifactStager::new(Arc::new(LocalFsStore::new(store_root)));

    let cfg = ClientConfig {
        poll_interval: Duration::from_millis(args.poll_interval),
        timeout: Duration::from_millis(args.timeout),
        priority: args.priority,
        job_name: args.job_name.clone(),
        supervisor_binary: args.supervisor_binary()?,
        supervisor_capability: None,
        supervisor_env: args.supervisor_env()?,
    };
    let client = Client::new(Arc::new(remote), stager, cfg);

    let spec = args
        .resources
        .iter()
        .fold(JobSpec::new(&args.execute), |spec, r| spec.resource(r));
    info!(target: "corral.agentd", coordinator = %args.coordinator, script = %args.execute.display(), "submitting");

    let (job, outcome) = client.run(&spec).await?;
    println!("job {job} finished: {outcome}");
    Ok(ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1)))
}
