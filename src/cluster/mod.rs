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

//! Membership-and-gossip subsystem plus the room directory it carries.
//!
//! A [`Hub`] is one node in the cluster. It owns this node's identity, the
//! shared [`ClusterState`] (peers + room directory), the gossip send channel
//! and the room allocator. Every periodic task (failure detector, sparsity
//! monitor, health prober) holds a cloned `Arc<Hub>` and calls back into it;
//! the gossip socket does the same for inbound datagrams.

pub mod discovery;
pub mod failure_detector;
pub mod gossip;
pub mod health_prober;
pub mod init;
pub mod sparsity_monitor;
pub mod state;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::HubSettings;
use crate::rooms::RoomAllocator;

use self::discovery::DiscoveryMode;
use self::gossip::message::GossipMessage;
use self::state::ClusterState;

/// Index of a hub within the cluster. Derived from `HOSTNAME` (`hub-<N>`).
pub type PeerIndex = u64;

/// Monotonic per-origin sequence number, doubling as heartbeat value.
pub type Nonce = u64;

pub const IPC_CHANNEL_BUFFER: usize = 1024;

/// A single hub node: its identity plus handles to every component that
/// reads or mutates [`ClusterState`].
pub struct Hub {
    pub index: PeerIndex,
    pub endpoint: SocketAddr,
    pub fanout: usize,
    pub discovery_mode: DiscoveryMode,

    nonce: AtomicU64,
    ready: AtomicBool,

    pub state: Arc<ClusterState>,
    pub gossip_tx: mpsc::Sender<(SocketAddr, GossipMessage)>,
    pub allocator: Arc<dyn RoomAllocator>,
    pub settings: Arc<HubSettings>,
}

impl Hub {
    pub fn new(
        index: PeerIndex,
        endpoint: SocketAddr,
        discovery_mode: DiscoveryMode,
        settings: Arc<HubSettings>,
        gossip_tx: mpsc::Sender<(SocketAddr, GossipMessage)>,
        allocator: Arc<dyn RoomAllocator>,
    ) -> Arc<Self> {
        Arc::new(Hub {
            index,
            endpoint,
            fanout: settings.fanout,
            discovery_mode,
            nonce: AtomicU64::new(0),
            ready: AtomicBool::new(false),
            state: Arc::new(ClusterState::new()),
            gossip_tx,
            allocator,
            settings,
        })
    }

    /// Allocates the next outbound nonce for a message authored by this hub.
    pub fn next_nonce(&self) -> Nonce {
        self.nonce.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn last_nonce(&self) -> Nonce {
        self.nonce.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
