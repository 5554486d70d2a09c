use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::Parser;
use corral_agentd::LogArgs;
use corral_api::{RemoteConfig, RemoteCoordinator};
use corral_core::{ResourceNegotiator, Supervisor, SupervisorConfig, SupervisorEnv};
use corral_model::{FinalStatus, constants::ENV_COORDINATOR};
use tracing::{error, info};

/// Everything else arrives through the `CORRAL_*` environment set by the cluster.
#[derive(Parser, Debug)]
#[command(name = "corral-am")]
#[command(version)]
#[command(about = "Per-job supervisor: negotiates worker containers and launches the job script")]
struct Args {
    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    args.log.init()?;

    let env = SupervisorEnv::from_process_env()?;
    let endpoint = env
        .coordinator
        .clone()
        .with_context(|| format!("{ENV_COORDINATOR} is not set"))?;
    let cfg = env.apply(SupervisorConfig::default())?;
    info!(
        target: "corral.agentd",
        job = %env.job_id,
        coordinator = %endpoint,
        workers = cfg.worker_count,
        capability = %cfg.worker_capability,
        "supervisor starting"
    );

    let remote = Arc::new(RemoteCoordinator::new(RemoteConfig {
        endpoint,
        ..Default::default()
    })?);
    let negotiator = ResourceNegotiator::new(remote.clone(), env.job_id.clone());
    let mut supervisor = Supervisor::new(cfg, negotiator, remote, env.manifest);

    match supervisor.run().await {
        Ok(report) => {
            info!(target: "corral.agentd", status = ?report.final_status, summary = %report.summary, "supervisor finished");
            if report.final_status == FinalStatus::Succeeded {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Err(e) => {
            error!(target: "corral.agentd", error = %e, "supervisor failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
