use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use corral_agentd::{LogArgs, parse_capability, parse_node};
use corral_api::HttpApi;
use corral_cluster::{ClusterConfig, LocalCluster, NodeConfig};
use corral_model::ResourceCapability;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "corrald")]
#[command(version)]
#[command(about = "Coordinator and node launcher for a local corral cluster")]
struct Args {
    /// Address the HTTP API listens on.
    #[arg(long, default_value = "127.0.0.1:8032")]
    listen: SocketAddr,

    /// Coordinator URL handed to supervisors. Defaults to `http://<listen>`.
    #[arg(long)]
    advertise: Option<String>,

    /// Node as NAME=MEMORY_MB:VCORES; repeatable. Defaults to one node named after this host.
    #[arg(long = "node", value_parser = parse_node)]
    nodes: Vec<NodeConfig>,

    /// Largest container the cluster grants, as MEMORY_MB:VCORES.
    #[arg(long, value_parser = parse_capability, default_value = "8192:8")]
    max_capability: ResourceCapability,

    /// Root of the shared artifact store.
    #[arg(long, env = "CORRAL_STORE_ROOT")]
    store_root: Option<PathBuf>,

    /// Parent of every container work directory.
    #[arg(long)]
    work_root: Option<PathBuf>,

    /// Cap each container's address space at its memory.
    #[arg(long)]
    enforce_memory_limit: bool,

    #[command(flatten)]
    log: LogArgs,
}

impl Args {
    fn cluster_config(&self) -> ClusterConfig {
        let mut cfg = ClusterConfig::single_node(self.max_capability);
        if !self.nodes.is_empty() {
            cfg.nodes = self.nodes.clone();
        }
        if let Some(root) = &self.store_root {
            cfg.store_root = root.clone();
        }
        if let Some(root) = &self.work_root {
            cfg.work_root = root.clone();
        }
        cfg.advertised_endpoint = Some(
            self.advertise
                .clone()
                .unwrap_or_else(|| format!("http://{}", self.listen)),
        );
        cfg.enforce_memory_limit = self.enforce_memory_limit;
        cfg
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.log.init()?;

    let cfg = args.cluster_config();
    let cluster = LocalCluster::new(cfg.clone()).context("invalid cluster layout")?;
    let router = HttpApi::new(Arc::new(cluster)).router();

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    info!(
        target: "corral.agentd",
        listen = %args.listen,
        store = %cfg.store_root.display(),
        nodes = cfg.nodes.len(),
        "coordinator listening"
    );

    corral_api::axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!(target: "corral.agentd", "shutting down");
        })
        .await?;
    Ok(())
}
