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

//! Failure Detector: a two-phase classifier, `alive → suspected → dead`,
//! driven purely by silence duration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::state::{now, PeerStatus};
use super::Hub;

pub async fn run(
    hub: Arc<Hub>,
    suspect_timeout: Duration,
    dead_timeout: Duration,
    check_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(check_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                check_once(&hub, suspect_timeout, dead_timeout).await;
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!("failure detector shutting down");
                return;
            }
        }
    }
}

async fn check_once(hub: &Arc<Hub>, suspect_timeout: Duration, dead_timeout: Duration) {
    let current = now();
    for peer in hub.state.get_all_peers(&[hub.index]) {
        let silence = current.saturating_sub(peer.last_seen);

        if silence > dead_timeout.as_secs() && peer.status != PeerStatus::Dead {
            tracing::info!(peer = peer.index, silence, "peer classified dead");
            hub.on_peer_dead(peer.index).await;
        } else if silence > suspect_timeout.as_secs() && peer.status == PeerStatus::Alive {
            tracing::info!(peer = peer.index, silence, "peer classified suspected");
            hub.state.set_peer_status(peer.index, PeerStatus::Suspected);
            hub.on_peer_suspected(peer.index).await;
        }
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

    fn test_hub() -> Arc<Hub> {
        let settings = Arc::new(HubSettings {
            hub_index: 0,
            gossip_port: 9000,
            http_port: 8080,
            fanout: 4,
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
    async fn silence_past_suspect_timeout_marks_suspected() {
        let hub = test_hub();
        let mut peer = Peer::new(1, SocketAddr::from(([127, 0, 0, 1], 9001)));
        peer.last_seen = now() - 10;
        hub.state.add_peer(peer);

        check_once(&hub, Duration::from_secs(5), Duration::from_secs(20)).await;

        assert_eq!(
            hub.state.get_peer(1).unwrap().unwrap().status,
            PeerStatus::Suspected
        );
    }

    #[tokio::test]
    async fn silence_past_dead_timeout_marks_dead_directly_from_alive() {
        let hub = test_hub();
        let mut peer = Peer::new(1, SocketAddr::from(([127, 0, 0, 1], 9001)));
        peer.last_seen = now() - 30;
        hub.state.add_peer(peer);

        check_once(&hub, Duration::from_secs(5), Duration::from_secs(20)).await;

        assert_eq!(
            hub.state.get_peer(1).unwrap().unwrap().status,
            PeerStatus::Dead
        );
    }

    #[tokio::test]
    async fn already_dead_peer_is_idempotent() {
        let hub = test_hub();
        let mut peer = Peer::new(1, SocketAddr::from(([127, 0, 0, 1], 9001)));
        peer.last_seen = now() - 100;
        peer.status = PeerStatus::Dead;
        hub.state.add_peer(peer);

        check_once(&hub, Duration::from_secs(5), Duration::from_secs(20)).await;

        assert_eq!(
            hub.state.get_peer(1).unwrap().unwrap().status,
            PeerStatus::Dead
        );
    }

    #[tokio::test]
    async fn recent_silence_stays_alive() {
        let hub = test_hub();
        let peer = Peer::new(1, SocketAddr::from(([127, 0, 0, 1], 9001)));
        hub.state.add_peer(peer);

        check_once(&hub, Duration::from_secs(5), Duration::from_secs(20)).await;

        assert_eq!(
            hub.state.get_peer(1).unwrap().unwrap().status,
            PeerStatus::Alive
        );
    }
}
