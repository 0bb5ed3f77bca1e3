//! clockmesh - run a full-mesh cluster of Lamport-clock machines
//!
//! Every machine runs in this process but shares nothing with the others
//! except TCP sockets. Event logs go to `<log-dir>/machine-<port>.log`.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use clockmesh_core::TickRate;
use clockmesh_runtime::{init_tracing, Cluster, ClusterConfig, DEFAULT_PORTS};
use clockmesh_transport::ConnectPolicy;

#[derive(Parser, Debug)]
#[command(name = "clockmesh", version, about = "Lamport clock skew simulator")]
struct Args {
    /// Listening port of each machine
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_PORTS)]
    ports: Vec<u16>,

    /// Address all machines bind and connect on
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Directory for the per-machine event logs
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Stop after this many seconds; runs until Ctrl-C when omitted
    #[arg(long)]
    duration: Option<u64>,

    /// Pin every machine to this tick rate (1-6) instead of drawing one each
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Delay between binding receivers and opening links, in milliseconds
    #[arg(long, default_value_t = 0)]
    grace_ms: u64,

    /// Connection attempts per peer at startup
    #[arg(long, default_value_t = 10)]
    connect_attempts: u32,

    /// Emit diagnostics as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    init_tracing(args.json)?;

    let config = ClusterConfig {
        host: args.host,
        ports: args.ports,
        log_dir: Some(args.log_dir),
        tick_rate: args.tick_rate.map(TickRate::new).transpose()?,
        startup_grace: Duration::from_millis(args.grace_ms),
        connect: ConnectPolicy {
            max_attempts: args.connect_attempts,
            ..ConnectPolicy::default()
        },
    };

    let cluster = Cluster::launch(config).await?;
    for machine in cluster.machines() {
        println!("machine {} running at {} ticks/s", machine.id(), machine.tick_rate());
    }

    match args.duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => tokio::signal::ctrl_c().await?,
    }

    let reports = cluster.shutdown().await?;
    println!();
    println!(
        "{:<22} {:>5} {:>8} {:>8} {:>8} {:>8}",
        "machine", "rate", "clock", "recv", "sent", "internal"
    );
    for report in reports {
        println!(
            "{:<22} {:>5} {:>8} {:>8} {:>8} {:>8}",
            report.id.to_string(),
            report.tick_rate.to_string(),
            report.clock.to_string(),
            report.stats.received,
            report.stats.sends,
            report.stats.internal,
        );
        if report.send_failures > 0 || report.log_failures > 0 {
            println!(
                "  {} undelivered frames, {} unwritten log entries",
                report.send_failures, report.log_failures
            );
        }
    }

    Ok(())
}
