/*
 * Copyright (c) 2024, Arena Hub Contributors.
 *
 * This file is part of Arena Hub.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! Task supervision and shutdown.
//!
//! One `tokio::spawn` per long-lived peripheral task (gossip socket,
//! failure detector, sparsity monitor, health prober), all polling a
//! single `tokio::sync::watch<bool>` "running" flag.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::HubSettings;
use crate::rooms::RoomAllocator;

use super::gossip::socket::spawn_gossip_socket;
use super::{failure_detector, health_prober, sparsity_monitor, Hub, IPC_CHANNEL_BUFFER};

/// Everything a caller needs to drive the cluster and shut it down.
pub struct ClusterHandle {
    pub hub: Arc<Hub>,
    shutdown_tx: watch::Sender<bool>,
}

impl ClusterHandle {
    /// Shutdown procedure: broadcast a one-shot `peerLeave`, flip every
    /// `running` flag, then let the allocator tear down its rooms. The
    /// gossip socket's receive loop unblocks on the same flag flip (it
    /// polls it inside `tokio::select!`).
    pub async fn shutdown(&self) {
        self.hub.broadcast_peer_leave().await;
        let _ = self.shutdown_tx.send(true);
        self.hub.allocator.cleanup();
    }
}

/// Wires up a hub: binds the gossip socket, pre-creates the local room
/// pool, spawns every periodic task, and performs startup discovery.
pub async fn start_cluster(settings: Arc<HubSettings>, allocator: Arc<dyn RoomAllocator>) -> ClusterHandle {
    let (gossip_tx, gossip_rx) = mpsc::channel(IPC_CHANNEL_BUFFER);
    let endpoint = super::discovery::compute_endpoint(
        settings.discovery_mode,
        settings.hub_index,
        settings.gossip_port,
        &settings.hub_service_name,
        &settings.k8s_namespace,
    )
    .unwrap_or_else(|| settings.bind_addr());

    let hub = Hub::new(
        settings.hub_index,
        endpoint,
        settings.discovery_mode,
        settings.clone(),
        gossip_tx,
        allocator,
    );

    hub.allocator.initialize_pool(hub.index);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Err(err) =
        spawn_gossip_socket(settings.bind_addr(), hub.clone(), gossip_rx, shutdown_rx.clone()).await
    {
        tracing::error!(error = %err, "failed to start gossip socket");
        std::process::exit(1);
    }

    tokio::spawn(failure_detector::run(
        hub.clone(),
        settings.suspect_timeout,
        settings.dead_timeout,
        settings.failure_check_interval,
        shutdown_rx.clone(),
    ));

    tokio::spawn(sparsity_monitor::run(
        hub.clone(),
        settings.sparsity_check_interval,
        shutdown_rx.clone(),
    ));

    let probe_client = health_prober::build_client(settings.room_probe_timeout);
    tokio::spawn(health_prober::run(
        hub.clone(),
        probe_client,
        settings.room_probe_port,
        settings.room_expected_status.clone(),
        settings.room_probe_interval,
        shutdown_rx.clone(),
    ));

    hub.mark_ready();
    hub.broadcast_peer_join().await;
    hub.run_discovery().await;

    ClusterHandle { hub, shutdown_tx }
}
