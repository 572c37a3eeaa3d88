//! nexio-run - drive lifecycle scenarios against a storage cluster

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use nexio_control::{ClusterHandleRegistry, ClusterTopology, NodeId, NvmeSession};
use nexio_harness::{ScenarioNodes, ScenarioRunner};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "nexio-run")]
#[command(about = "Run nexio lifecycle scenarios against a storage cluster")]
#[command(version)]
struct Args {
    /// Scenario to run
    #[arg(value_enum)]
    scenario: Scenario,

    /// Topology file (TOML: [nodes] name = "host:port")
    #[arg(short, long, default_value = "/etc/nexio/topology.toml")]
    topology: String,

    /// Worker nodes holding pools and replicas (exactly two); defaults
    /// to the first two topology nodes
    #[arg(long, num_args = 2)]
    workers: Vec<String>,

    /// Node hosting the nexus; defaults to the third topology node
    #[arg(long)]
    nexus: Option<String>,

    /// Iterations of the two-replica cycle
    #[arg(short, long, default_value_t = 1)]
    iterations: u32,

    /// Device pairs in the scale scenario
    #[arg(short, long, default_value_t = 70)]
    count: usize,

    /// Exercise published targets through the local NVMe initiator
    #[arg(long)]
    attach: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    /// Two pools, two replicas, one published nexus, full teardown
    TwoReplicaNexus,
    /// Many null-backed nexus instances across two workers
    NullScale,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.attach && !NvmeSession::is_available() {
        bail!("--attach requested but the nvme tool is not installed");
    }

    let topology = ClusterTopology::from_file(&args.topology)
        .with_context(|| format!("loading topology {}", args.topology))?;
    info!(nodes = topology.len(), "connecting to cluster");

    let mut registry = ClusterHandleRegistry::connect(&topology).await?;
    let nodes = scenario_nodes(&args, &registry)?;
    info!(
        workers = ?nodes.workers,
        nexus = %nodes.nexus,
        "node roles assigned"
    );

    let mut runner = ScenarioRunner::new(&mut registry);
    match args.scenario {
        Scenario::TwoReplicaNexus => {
            runner
                .two_replica_nexus(&nodes, args.iterations, args.attach)
                .await?;
        }
        Scenario::NullScale => {
            runner.null_scale(&nodes, args.count, args.attach).await?;
        }
    }

    info!("scenario passed");
    Ok(())
}

fn scenario_nodes(args: &Args, registry: &ClusterHandleRegistry) -> Result<ScenarioNodes> {
    let ids = registry.node_ids();

    let workers: [NodeId; 2] = if args.workers.is_empty() {
        if ids.len() < 3 {
            bail!("topology lists {} nodes, scenarios need three", ids.len());
        }
        [ids[0].clone(), ids[1].clone()]
    } else {
        [parse_node(&args.workers[0])?, parse_node(&args.workers[1])?]
    };

    let nexus = match &args.nexus {
        Some(name) => parse_node(name)?,
        None => ids
            .iter()
            .find(|id| !workers.contains(*id))
            .cloned()
            .context("no node left to host the nexus")?,
    };

    Ok(ScenarioNodes { workers, nexus })
}

fn parse_node(name: &str) -> Result<NodeId> {
    NodeId::new(name).with_context(|| format!("bad node name {name:?}"))
}
