//! Skein node binary.
//!
//! Binds the shared UDP endpoint, starts the node pool, runs any startup
//! scenarios, and hands control to the interactive shell.

mod shell;

use std::process;
use std::sync::Arc;

use clap::Parser;
use skein_core::Timings;
use skein_net::{NodePool, UdpServer};
use tracing::{error, info};

use crate::shell::Shell;

/// Skein node — host and join content swarms on the overlay ring.
#[derive(Parser, Debug)]
#[command(
    name = "skein-node",
    version,
    about = "Content-addressed swarm overlay node"
)]
struct Args {
    /// IP address of the server socket
    ip: String,

    /// Port number of the server socket
    port: u16,

    /// Bootstrap node address (repeatable)
    #[arg(long, value_name = "address")]
    bootstrap: Vec<String>,

    /// Time between stabilization runs, in seconds
    #[arg(long, value_name = "seconds")]
    stabilize_interval: Option<f64>,

    /// Time a routing entry is trusted before re-probing, in seconds
    #[arg(long, value_name = "seconds")]
    live_interval: Option<f64>,

    /// Rpc call timeout, in seconds
    #[arg(long, value_name = "seconds")]
    command_interval: Option<f64>,

    /// Rpc get-data call timeout, in seconds
    #[arg(long, value_name = "seconds")]
    get_data_timeout: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Host a random temporary file at startup
    #[arg(long)]
    scenario_host_random: bool,

    /// Host the specified file at startup
    #[arg(long, value_name = "file")]
    scenario_local_file: Option<String>,

    /// Join the specified swarm at startup and save its content to a file
    #[arg(long, num_args = 2, value_names = ["id", "file"])]
    scenario_join_remote: Option<Vec<String>>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    let timings = Timings::from_secs_f64(
        args.stabilize_interval,
        args.live_interval,
        args.command_interval,
        args.get_data_timeout,
    );

    let server = match UdpServer::bind((args.ip.as_str(), args.port)).await {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("failed to bind {}:{}: {e}", args.ip, args.port);
            process::exit(1);
        }
    };

    let pool = Arc::new(NodePool::new(server.clone(), timings));
    for address in &args.bootstrap {
        pool.add_bootstrap(address.clone());
    }
    let receiver = server.spawn_receiver(Arc::clone(&pool));

    info!("skein-node v{}", env!("CARGO_PKG_VERSION"));

    let shell = Shell::new(Arc::clone(&pool));

    if args.scenario_host_random {
        shell.host_random_blob();
    }
    if let Some(path) = &args.scenario_local_file {
        shell.host_local_file(path);
    }
    if let Some(join) = &args.scenario_join_remote {
        shell.join_remote(&join[0], &join[1]);
    }

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C, shutting down...");
    };

    tokio::select! {
        _ = shell.run() => {}
        _ = shutdown_signal => {}
    }

    pool.shutdown();
    receiver.abort();
    info!("shutdown complete");
}

/// Initialize the tracing subscriber, honoring `RUST_LOG` when set.
fn init_logging(level: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}
