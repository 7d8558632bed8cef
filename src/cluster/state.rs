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

//! Cluster State: the peer table and room directory, guarded by a single
//! lock.
//!
//! Shared across the gossip socket's per-datagram tasks, the failure
//! detector, the sparsity monitor and the health prober, so it is wrapped
//! in a `parking_lot::RwLock` directly rather than owned by one task —
//! composing a read with a subsequent write inside one handler (e.g.
//! `apply_heartbeat_observation` then `get_peer`) takes the guard once
//! per call, never nests it, so a non-reentrant lock is sufficient.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::cluster::{Nonce, PeerIndex};
use crate::error::{HubError, HubResult};
use crate::rooms::{Room, RoomStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerStatus {
    Alive,
    Suspected,
    Dead,
}

#[derive(Debug, Clone)]
pub struct Peer {
    pub index: PeerIndex,
    pub endpoint: std::net::SocketAddr,
    pub status: PeerStatus,
    pub heartbeat: Nonce,
    /// Unix epoch seconds of the last datagram that evidenced liveness.
    pub last_seen: u64,
}

impl Peer {
    pub fn new(index: PeerIndex, endpoint: std::net::SocketAddr) -> Self {
        Peer {
            index,
            endpoint,
            status: PeerStatus::Alive,
            heartbeat: 0,
            last_seen: now(),
        }
    }
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

struct Inner {
    /// Sparse, index-keyed peer table. A map is used rather than a
    /// gap-filled array — it avoids sparse allocation and skipping absent
    /// slots falls out of iteration for free.
    peers: HashMap<PeerIndex, Peer>,
    rooms: HashMap<String, Room>,
}

pub struct ClusterState {
    inner: RwLock<Inner>,
}

impl ClusterState {
    pub fn new() -> Self {
        ClusterState {
            inner: RwLock::new(Inner {
                peers: HashMap::new(),
                rooms: HashMap::new(),
            }),
        }
    }

    // -- peers ------------------------------------------------------------

    /// Installs `peer` at its index, overwriting whatever was there.
    pub fn add_peer(&self, peer: Peer) {
        self.inner.write().peers.insert(peer.index, peer);
    }

    pub fn get_peer(&self, index: i64) -> HubResult<Option<Peer>> {
        if index < 0 {
            return Err(HubError::InvalidIndex(index));
        }
        Ok(self.inner.read().peers.get(&(index as PeerIndex)).cloned())
    }

    /// Creates the peer if missing (seen only through a forwarded datagram
    /// so far), otherwise refreshes liveness evidence without touching its
    /// heartbeat or fanout eligibility.
    pub fn mark_forward_alive(&self, index: PeerIndex, endpoint: std::net::SocketAddr) {
        let mut inner = self.inner.write();
        match inner.peers.get_mut(&index) {
            Some(peer) => {
                peer.last_seen = now();
                peer.status = PeerStatus::Alive;
            }
            None => {
                inner.peers.insert(index, Peer::new(index, endpoint));
            }
        }
    }

    /// The central heartbeat freshness rule: the single dedup primitive
    /// loop suppression rests on. Returns `true` iff the message should be
    /// dispatched and forwarded.
    pub fn apply_heartbeat_observation(
        &self,
        origin: PeerIndex,
        received_nonce: Nonce,
        is_leaving: bool,
    ) -> bool {
        let mut inner = self.inner.write();
        let Some(peer) = inner.peers.get_mut(&origin) else {
            return false;
        };

        if peer.status == PeerStatus::Dead {
            if is_leaving {
                // Case 2: suppress leave propagation from an already-dead peer.
                return false;
            }
            // Case 3: resurrection. A dead peer heartbeating again always
            // supersedes the stale value, regardless of the stored nonce.
            peer.heartbeat = received_nonce;
            peer.status = PeerStatus::Alive;
            peer.last_seen = now();
            return true;
        }

        if received_nonce > peer.heartbeat {
            peer.heartbeat = received_nonce;
            peer.status = if is_leaving {
                PeerStatus::Dead
            } else {
                PeerStatus::Alive
            };
            // Updates `last_seen` on any accepted message, not only explicit
            // `peerAlive` events, so a peer heard from only via forwarded
            // re-emissions is not falsely suspected.
            peer.last_seen = now();
            return true;
        }

        false
    }

    /// Sets status to `dead` without deleting the entry.
    pub fn remove_peer(&self, index: PeerIndex) {
        self.set_peer_status(index, PeerStatus::Dead);
    }

    pub fn get_all_peers(&self, exclude: &[PeerIndex]) -> Vec<Peer> {
        self.inner
            .read()
            .peers
            .values()
            .filter(|p| !exclude.contains(&p.index))
            .cloned()
            .collect()
    }

    pub fn get_all_not_dead(&self, exclude_index: PeerIndex) -> Vec<Peer> {
        self.inner
            .read()
            .peers
            .values()
            .filter(|p| p.index != exclude_index && p.status != PeerStatus::Dead)
            .cloned()
            .collect()
    }

    /// Used for `peerAlive` events: sets `last_seen=now, status=alive`.
    pub fn mark_peer_explicitly_alive(&self, index: PeerIndex) {
        let mut inner = self.inner.write();
        if let Some(peer) = inner.peers.get_mut(&index) {
            peer.status = PeerStatus::Alive;
            peer.last_seen = now();
        }
    }

    /// Unguarded status write, used by the failure detector and by dead
    /// escalation.
    pub fn set_peer_status(&self, index: PeerIndex, status: PeerStatus) {
        let mut inner = self.inner.write();
        if let Some(peer) = inner.peers.get_mut(&index) {
            peer.status = status;
        }
    }

    // -- rooms --------------------------------------------------------------

    pub fn add_room(&self, room: Room) {
        self.inner.write().rooms.insert(room.room_id.clone(), room);
    }

    pub fn get_room(&self, room_id: &str) -> Option<Room> {
        self.inner.read().rooms.get(room_id).cloned()
    }

    pub fn get_active_joinable_room(&self) -> Option<Room> {
        self.inner
            .read()
            .rooms
            .values()
            .find(|r| r.is_joinable())
            .cloned()
    }

    pub fn get_all_rooms(&self) -> Vec<Room> {
        self.inner.read().rooms.values().cloned().collect()
    }

    pub fn set_room_status(&self, room_id: &str, status: RoomStatus) {
        let mut inner = self.inner.write();
        if let Some(room) = inner.rooms.get_mut(room_id) {
            room.status = status;
        }
    }

    pub fn remove_room(&self, room_id: &str) {
        self.inner.write().rooms.remove(room_id);
    }

    /// Evicts every room owned by `index` from the directory.
    pub fn remove_rooms_owned_by(&self, index: PeerIndex) {
        self.inner
            .write()
            .rooms
            .retain(|_, room| room.owner_hub_index != index);
    }
}

impl Default for ClusterState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn get_peer_rejects_negative_index() {
        let state = ClusterState::new();
        assert!(matches!(
            state.get_peer(-1),
            Err(HubError::InvalidIndex(-1))
        ));
    }

    #[test]
    fn heartbeat_rule_unknown_peer_is_dropped() {
        let state = ClusterState::new();
        assert!(!state.apply_heartbeat_observation(1, 5, false));
    }

    #[test]
    fn heartbeat_rule_stale_leave_from_dead_peer_is_suppressed() {
        let state = ClusterState::new();
        state.add_peer(Peer::new(1, addr(9001)));
        state.set_peer_status(1, PeerStatus::Dead);

        assert!(!state.apply_heartbeat_observation(1, 99, true));
        assert_eq!(state.get_peer(1).unwrap().unwrap().status, PeerStatus::Dead);
    }

    #[test]
    fn heartbeat_rule_resurrects_dead_peer() {
        let state = ClusterState::new();
        state.add_peer(Peer::new(1, addr(9001)));
        state.set_peer_status(1, PeerStatus::Dead);

        assert!(state.apply_heartbeat_observation(1, 42, false));
        let peer = state.get_peer(1).unwrap().unwrap();
        assert_eq!(peer.status, PeerStatus::Alive);
        assert_eq!(peer.heartbeat, 42);
    }

    #[test]
    fn heartbeat_rule_rejects_stale_nonce() {
        let state = ClusterState::new();
        state.add_peer(Peer::new(1, addr(9001)));
        assert!(state.apply_heartbeat_observation(1, 10, false));
        assert!(!state.apply_heartbeat_observation(1, 10, false));
        assert!(!state.apply_heartbeat_observation(1, 5, false));
        assert_eq!(state.get_peer(1).unwrap().unwrap().heartbeat, 10);
    }

    #[test]
    fn heartbeat_rule_idempotence_law() {
        let state = ClusterState::new();
        state.add_peer(Peer::new(1, addr(9001)));
        state.apply_heartbeat_observation(1, 10, false);
        let before = state.get_peer(1).unwrap().unwrap();

        assert!(!state.apply_heartbeat_observation(1, 10, false));
        let after = state.get_peer(1).unwrap().unwrap();
        assert_eq!(before.heartbeat, after.heartbeat);
        assert_eq!(before.status, after.status);
    }

    #[test]
    fn get_all_not_dead_excludes_self_and_dead_peers() {
        let state = ClusterState::new();
        state.add_peer(Peer::new(0, addr(9000)));
        state.add_peer(Peer::new(1, addr(9001)));
        state.add_peer(Peer::new(2, addr(9002)));
        state.set_peer_status(2, PeerStatus::Dead);

        let remaining = state.get_all_not_dead(0);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].index, 1);
    }

    #[test]
    fn remove_rooms_owned_by_evicts_only_matching_owner() {
        let state = ClusterState::new();
        state.add_room(Room {
            room_id: "r1".into(),
            owner_hub_index: 1,
            status: RoomStatus::Active,
            external_port: 1,
            internal_service: String::new(),
            player_count: 0,
            max_players: 4,
        });
        state.add_room(Room {
            room_id: "r2".into(),
            owner_hub_index: 2,
            status: RoomStatus::Active,
            external_port: 2,
            internal_service: String::new(),
            player_count: 0,
            max_players: 4,
        });

        state.remove_rooms_owned_by(1);
        let remaining = state.get_all_rooms();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].room_id, "r2");
    }

    #[test]
    fn joinable_room_requires_active_and_capacity() {
        let room = Room {
            room_id: "r".into(),
            owner_hub_index: 0,
            status: RoomStatus::Active,
            external_port: 1,
            internal_service: String::new(),
            player_count: 4,
            max_players: 4,
        };
        assert!(!room.is_joinable());
    }
}
