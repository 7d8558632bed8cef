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

//! Peer-Sparsity Monitor: triggers a discovery cycle when the non-dead
//! peer count drops below the fanout target. Suspected peers count as
//! non-dead — a conservative choice that avoids discovery storms during
//! transient suspicion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::Hub;

pub async fn run(hub: Arc<Hub>, check_interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(check_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                check_once(&hub).await;
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!("sparsity monitor shutting down");
                return;
            }
        }
    }
}

async fn check_once(hub: &Arc<Hub>) {
    let count = hub.state.get_all_not_dead(hub.index).len();
    if count < hub.fanout {
        tracing::debug!(count, fanout = hub.fanout, "peer set sparse, triggering discovery");
        hub.run_discovery().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::discovery::DiscoveryMode;
    use crate::cluster::state::Peer;
    use crate::config::HubSettings;
    use crate::rooms::LocalRoomAllocator;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    fn test_hub(fanout: usize) -> Arc<Hub> {
        let settings = Arc::new(HubSettings {
            hub_index: 0,
            gossip_port: 9000,
            http_port: 8080,
            fanout,
            suspect_timeout: Duration::from_secs(5),
            dead_timeout: Duration::from_secs(20),
            failure_check_interval: Duration::from_secs(1),
            sparsity_check_interval: Duration::from_secs(60),
            expected_hub_count: 3,
            discovery_mode: DiscoveryMode::Manual,
            k8s_namespace: "default".into(),
            hub_service_name: "hub".into(),
            external_address: "127.0.0.1".into(),
            room_probe_interval: Duration::from_secs(15),
            room_probe_timeout: Duration::from_secs(3),
            room_probe_port: 8080,
            room_expected_status: "WAITING_FOR_PLAYERS".into(),
            log_level: "info".into(),
        });
        let (tx, _rx) = mpsc::channel(1024);
        Hub::new(
            0,
            SocketAddr::from(([127, 0, 0, 1], 9000)),
            DiscoveryMode::Manual,
            settings,
            tx,
            Arc::new(LocalRoomAllocator::new(0)),
        )
    }

    #[tokio::test]
    async fn below_fanout_triggers_discovery_without_panicking() {
        let hub = test_hub(4);
        hub.state
            .add_peer(Peer::new(1, SocketAddr::from(([127, 0, 0, 1], 9001))));
        // Hub 0 is the manual-mode seed: `run_discovery` is a no-op for it,
        // so this just exercises that the sparse path doesn't panic.
        check_once(&hub).await;
    }

    #[tokio::test]
    async fn suspected_peers_count_toward_non_dead() {
        let hub = test_hub(2);
        for i in 1..=2 {
            hub.state
                .add_peer(Peer::new(i, SocketAddr::from(([127, 0, 0, 1], 9000 + i as u16))));
        }
        hub.state
            .set_peer_status(1, crate::cluster::state::PeerStatus::Suspected);

        let count = hub.state.get_all_not_dead(hub.index).len();
        assert_eq!(count, 2);
    }
}
