mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use commands::Output;
use esadmin::{Config, Engine, LogFormat, LoggingConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "esadmin")]
#[command(about = "Elasticsearch cluster administration tools")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.esadmin/config.toml)
    #[arg(long, short, global = true, env = "ESADMIN_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Connection overrides; each beats the config file
#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Cluster endpoint, host:port or URL
    #[arg(long, global = true, env = "ESADMIN_HOST")]
    host: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "ESADMIN_TIMEOUT")]
    timeout: Option<u64>,

    /// Retries for failed reads
    #[arg(long, global = true, env = "ESADMIN_RETRIES")]
    retries: Option<u32>,

    /// Use https
    #[arg(long, global = true, env = "ESADMIN_TLS")]
    tls: bool,

    #[arg(long, global = true, env = "ESADMIN_USERNAME")]
    username: Option<String>,

    #[arg(long, global = true, env = "ESADMIN_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stop allocating shards anywhere in the cluster
    AllocatorDisable,

    /// Resume shard allocation
    AllocatorEnable,

    /// Exit 0 if the node is the elected master
    AmIMaster {
        /// Node id or name (default: the node we are talking to)
        #[arg(long)]
        node: Option<String>,
    },

    /// Suspend automatic translog flushing
    AutoflushDisable {
        /// Index name, or * for every open index
        #[arg(default_value = "*")]
        index: String,
    },

    /// Resume automatic translog flushing
    AutoflushEnable {
        #[arg(default_value = "*")]
        index: String,
    },

    /// Cluster health summary
    ClusterHealth,

    /// Persistent and transient cluster settings
    ClusterSettings,

    /// Full cluster state document
    ClusterState,

    /// Limit concurrent rebalance relocations (0 stops rebalancing)
    ConcurrentRebalance { limit: u32 },

    /// Flush one index or every open index
    Flush {
        #[arg(default_value = "*")]
        index: String,
    },

    /// Delete an index
    IndexDelete { index: String },

    /// Nodes holding each primary shard of an index
    IndexLocations { index: String },

    /// Settings of an index
    IndexSettings { index: String },

    /// On-disk size of one or all indices
    IndexSize { index: Option<String> },

    /// Open/closed state, health and shape of indices
    IndexStatus { index: Option<String> },

    /// Names of all indices
    ListIndices,

    /// Relocate a shard copy and wait for it to land
    MoveShard {
        index: String,
        shard: u32,
        /// Source node id or name
        from: String,
        /// Target node id or name
        to: String,

        /// Move the replica on FROM instead of the primary
        #[arg(long)]
        replica: bool,

        /// Seconds to wait for the move (overrides config)
        #[arg(long = "wait")]
        wait_seconds: Option<u64>,
    },

    /// Roster entry for a node
    NodeInfo { node: String },

    /// Resolve a node name to its id
    NodeNameToId { name: String },

    /// Settings of a node
    NodeSettings { node: String },

    /// Number of shard copies on a node
    NodeShardCount { node: String },

    /// Runtime stats of a node
    NodeStats { node: String },

    /// Delete every index in the cluster
    NukeAllIndices {
        #[arg(long = "yes-i-really-mean-it")]
        confirmed: bool,
    },

    /// Block writes to one index or every open index
    WriteDisable {
        #[arg(default_value = "*")]
        index: String,
    },

    /// Unblock writes
    WriteEnable {
        #[arg(default_value = "*")]
        index: String,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load().context("loading config")?,
    };

    let args = &cli.connection;
    if let Some(host) = &args.host {
        config.connection.host = host.clone();
    }
    if let Some(timeout) = args.timeout {
        config.connection.timeout_seconds = timeout;
    }
    if let Some(retries) = args.retries {
        config.connection.retries = retries;
    }
    if args.tls {
        config.connection.tls = true;
    }
    if let Some(username) = &args.username {
        config.connection.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        config.connection.password = Some(password.clone());
    }
    if let Commands::MoveShard {
        wait_seconds: Some(wait),
        ..
    } = cli.command
    {
        config.operations.move_timeout_seconds = wait;
    }

    Ok(config)
}

/// Logs go to stderr so command output stays parseable
fn init_logging(config: &LoggingConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { config.level.as_str() })
    });
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    init_logging(&config.logging, cli.verbose);
    tracing::debug!("Using cluster at {}", config.connection.base_url());

    let engine = Engine::new(&config).context("creating cluster client")?;
    let out = Output::new(cli.json);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::AllocatorDisable => {
            commands::cluster::set_allocation(&engine, false, &cancel, out).await
        }
        Commands::AllocatorEnable => {
            commands::cluster::set_allocation(&engine, true, &cancel, out).await
        }
        Commands::AmIMaster { node } => {
            commands::cluster::am_i_master(&engine, node.as_deref(), out).await
        }
        Commands::AutoflushDisable { index } => {
            commands::index::set_auto_flush(&engine, &index, false, &cancel, out).await
        }
        Commands::AutoflushEnable { index } => {
            commands::index::set_auto_flush(&engine, &index, true, &cancel, out).await
        }
        Commands::ClusterHealth => commands::cluster::health(&engine, out).await,
        Commands::ClusterSettings => commands::cluster::settings(&engine).await,
        Commands::ClusterState => commands::cluster::state(&engine).await,
        Commands::ConcurrentRebalance { limit } => {
            commands::cluster::concurrent_rebalance(&engine, limit, &cancel, out).await
        }
        Commands::Flush { index } => commands::index::flush(&engine, &index, &cancel, out).await,
        Commands::IndexDelete { index } => {
            commands::index::delete(&engine, &index, &cancel, out).await
        }
        Commands::IndexLocations { index } => {
            commands::index::locations(&engine, &index, out).await
        }
        Commands::IndexSettings { index } => commands::index::settings(&engine, &index, out).await,
        Commands::IndexSize { index } => {
            commands::index::size(&engine, index.as_deref(), out).await
        }
        Commands::IndexStatus { index } => {
            commands::index::status(&engine, index.as_deref(), out).await
        }
        Commands::ListIndices => commands::index::list(&engine, out).await,
        Commands::MoveShard {
            index,
            shard,
            from,
            to,
            replica,
            ..
        } => {
            let request = commands::shard::MoveArgs {
                index,
                shard,
                from,
                to,
                replica,
            };
            commands::shard::move_shard(&engine, request, &cancel, out).await
        }
        Commands::NodeInfo { node } => commands::node::info(&engine, &node, out).await,
        Commands::NodeNameToId { name } => commands::node::name_to_id(&engine, &name, out).await,
        Commands::NodeSettings { node } => commands::node::settings(&engine, &node).await,
        Commands::NodeShardCount { node } => {
            commands::node::shard_count(&engine, &node, out).await
        }
        Commands::NodeStats { node } => commands::node::stats(&engine, &node).await,
        Commands::NukeAllIndices { confirmed } => {
            commands::index::nuke(&engine, confirmed, &cancel, out).await
        }
        Commands::WriteDisable { index } => {
            commands::index::set_write(&engine, &index, false, &cancel, out).await
        }
        Commands::WriteEnable { index } => {
            commands::index::set_write(&engine, &index, true, &cancel, out).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_command_names() {
        let cli = Cli::try_parse_from(["esadmin", "am-i-master", "--node", "es-1"]).unwrap();
        assert!(matches!(cli.command, Commands::AmIMaster { node: Some(ref n) } if n == "es-1"));

        let cli = Cli::try_parse_from(["esadmin", "write-disable"]).unwrap();
        assert!(matches!(cli.command, Commands::WriteDisable { ref index } if index == "*"));

        let cli = Cli::try_parse_from([
            "esadmin", "move-shard", "logs", "3", "es-1", "es-2", "--replica", "--wait", "60",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::MoveShard { shard: 3, replica: true, wait_seconds: Some(60), .. }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "esadmin", "cluster-health", "--host", "es.example:9200", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.connection.host.as_deref(), Some("es.example:9200"));
    }

    #[test]
    fn test_move_wait_overrides_config() {
        let path = missing_config_path();
        let cli = Cli::try_parse_from([
            "esadmin",
            "--config",
            path.to_str().unwrap(),
            "move-shard",
            "logs",
            "0",
            "a",
            "b",
            "--wait",
            "12",
            "--retries",
            "7",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.operations.move_timeout_seconds, 12);
        assert_eq!(config.connection.retries, 7);
    }

    /// A config path that does not exist, so defaults load
    fn missing_config_path() -> PathBuf {
        std::env::temp_dir().join("esadmin-cli-test-missing-config.toml")
    }
}
