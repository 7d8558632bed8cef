//! Process bootstrap: reads configuration, starts the cluster (gossip
//! socket + periodic tasks + discovery), starts the matchmaking HTTP
//! surface, and waits for a shutdown signal.
//!
//! `#[actix_web::main]` entry point, `tracing_subscriber::FmtSubscriber`
//! set as the global default before anything else runs,
//! `signal_hook_tokio::Signals` polled in a loop for
//! `SIGHUP`/`SIGTERM`/`SIGINT`/`SIGQUIT`, graceful shutdown via
//! `server.handle().stop(true)` followed by the cluster's own shutdown
//! procedure.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use tracing::{info, Level};

use arena_hub::cluster;
use arena_hub::cluster::discovery::DiscoveryMode;
use arena_hub::config::HubSettings;
use arena_hub::rooms::{KubernetesRoomAllocator, LocalRoomAllocator, RoomAllocator};
use arena_hub::server;
use arena_hub::server::UnwrapFailure;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Arc::new(HubSettings::load());

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(Level::from_str(&settings.log_level).unwrap_or(Level::INFO))
            .finish(),
    )
    .failed_to("set default tracing subscriber");

    info!(
        hub_index = settings.hub_index,
        gossip_port = settings.gossip_port,
        http_port = settings.http_port,
        "starting arena-hub v{}",
        env!("CARGO_PKG_VERSION")
    );

    // `HUB_DISCOVERY_MODE` also selects the room allocator: `manual` runs a
    // simulated in-memory pool, `k8s` addresses rooms the way a real
    // pod/service deployment would without making Kubernetes API calls
    // itself.
    let allocator: Arc<dyn RoomAllocator> = match settings.discovery_mode {
        DiscoveryMode::Manual => Arc::new(LocalRoomAllocator::new(settings.hub_index)),
        DiscoveryMode::Orchestrated => Arc::new(KubernetesRoomAllocator::new(
            settings.hub_index,
            settings.k8s_namespace.clone(),
            settings.external_address.clone(),
        )),
    };

    let hub_cluster = cluster::init::start_cluster(settings.clone(), allocator).await;

    let http_server = server::build_http_server(hub_cluster.hub.clone(), &settings)
        .failed_to("start matchmaking HTTP server");
    let http_handle = http_server.handle();
    actix_web::rt::spawn(async move { http_server.await });

    let mut signals = Signals::new(&[SIGHUP, SIGTERM, SIGINT, SIGQUIT])?;

    while let Some(signal) = signals.next().await {
        match signal {
            SIGHUP => {
                // No reloadable configuration today; every setting is
                // fixed for the lifetime of the process.
            }
            SIGTERM | SIGINT | SIGQUIT => {
                info!("shutting down arena-hub v{}...", env!("CARGO_PKG_VERSION"));

                http_handle.stop(true).await;
                hub_cluster.shutdown().await;

                // Give the outbound `peerLeave` broadcast a moment to hit
                // the wire before the process (and its socket) disappears.
                tokio::time::sleep(Duration::from_millis(200)).await;

                break;
            }
            _ => unreachable!(),
        }
    }

    Ok(())
}
