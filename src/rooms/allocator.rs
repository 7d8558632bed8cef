//! Room allocator contract and two concrete implementations.
//!
//! The pod/service lifecycle of a real room worker is an external
//! collaborator this crate never drives directly; `KubernetesRoomAllocator`
//! reproduces only the addressing scheme a Kubernetes-backed deployment
//! would use, not real API calls.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::cluster::PeerIndex;
use crate::rooms::{Room, RoomStatus};

/// Default pool size a fresh hub pre-creates dormant rooms for.
pub const POOL_SIZE: usize = 3;

/// The external interface the core's matchmaking read path and the
/// coordinator's room lifecycle handlers call through. Implementations
/// own the actual room worker processes; this crate only needs to know
/// whether one is available and what to call it.
pub trait RoomAllocator: Send + Sync {
    /// Pre-creates this hub's starting pool of dormant rooms.
    fn initialize_pool(&self, hub_index: PeerIndex);

    /// Activates the first dormant room in the local pool, creating a new
    /// one if the pool is exhausted. Returns `None` when no room could be
    /// made available (the caller surfaces this as "no capacity").
    fn activate_room(&self) -> Option<Room>;

    /// All rooms owned by this hub, including dormant ones.
    fn get_all_local(&self) -> Vec<Room>;

    /// Tears down every room this allocator owns.
    fn cleanup(&self);

    /// The externally-reachable address for a room this allocator owns.
    fn room_address(&self, room: &Room) -> String;
}

/// Room allocator for single-machine runs: simulates rooms in memory
/// rather than spawning real worker processes.
pub struct LocalRoomAllocator {
    hub_index: PeerIndex,
    port_start: u16,
    rooms: Mutex<HashMap<String, Room>>,
}

impl LocalRoomAllocator {
    pub const ROOM_PORT_START: u16 = 20001;

    pub fn new(hub_index: PeerIndex) -> Self {
        LocalRoomAllocator {
            hub_index,
            port_start: Self::ROOM_PORT_START,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    fn next_room_id(&self, slot: usize) -> String {
        format!("hub{}-{}", self.hub_index, slot)
    }
}

impl RoomAllocator for LocalRoomAllocator {
    fn initialize_pool(&self, hub_index: PeerIndex) {
        tracing::info!(
            "Initializing local room pool with {} rooms (simulated)",
            POOL_SIZE
        );
        let mut rooms = self.rooms.lock();
        for slot in 0..POOL_SIZE {
            let room_id = self.next_room_id(slot);
            let port = self.port_start + (hub_index as u16 * 100) + slot as u16;
            tracing::debug!("Created simulated room {} on port {}", room_id, port);
            rooms.insert(
                room_id.clone(),
                Room {
                    room_id,
                    owner_hub_index: hub_index,
                    status: RoomStatus::Dormant,
                    external_port: port,
                    internal_service: format!("localhost:{}", port),
                    player_count: 0,
                    max_players: 4,
                },
            );
        }
    }

    fn activate_room(&self) -> Option<Room> {
        let mut rooms = self.rooms.lock();
        if let Some(room) = rooms
            .values_mut()
            .find(|room| room.status == RoomStatus::Dormant)
        {
            room.status = RoomStatus::Active;
            tracing::info!("Activated room {}", room.room_id);
            return Some(room.clone());
        }

        // Pool exhausted: mint a new dormant room and activate it.
        let slot = rooms.len();
        let room_id = self.next_room_id(slot);
        let port = self.port_start + (self.hub_index as u16 * 100) + slot as u16;
        let room = Room {
            room_id: room_id.clone(),
            owner_hub_index: self.hub_index,
            status: RoomStatus::Active,
            external_port: port,
            internal_service: format!("localhost:{}", port),
            player_count: 0,
            max_players: 4,
        };
        rooms.insert(room_id, room.clone());
        tracing::info!("Grew local room pool, activated {}", room.room_id);
        Some(room)
    }

    fn get_all_local(&self) -> Vec<Room> {
        self.rooms.lock().values().cloned().collect()
    }

    fn cleanup(&self) {
        tracing::debug!("Cleaning up rooms");
        self.rooms.lock().clear();
    }

    fn room_address(&self, _room: &Room) -> String {
        "localhost".to_string()
    }
}

/// Room allocator for an orchestrated (Kubernetes) deployment. Reproduces
/// the addressing scheme (`room-<id>-svc.<ns>.svc.cluster.local` internally,
/// `EXTERNAL_ADDRESS` externally) without making real API calls —
/// provisioning the pod/service per room is an external collaborator.
pub struct KubernetesRoomAllocator {
    hub_index: PeerIndex,
    namespace: String,
    external_address: String,
    rooms: Mutex<HashMap<String, Room>>,
}

impl KubernetesRoomAllocator {
    const ROOM_PORT: u16 = 5000;

    pub fn new(hub_index: PeerIndex, namespace: String, external_address: String) -> Self {
        KubernetesRoomAllocator {
            hub_index,
            namespace,
            external_address,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    fn internal_service(&self, room_id: &str) -> String {
        format!("room-{}-svc.{}.svc.cluster.local", room_id, self.namespace)
    }
}

impl RoomAllocator for KubernetesRoomAllocator {
    fn initialize_pool(&self, hub_index: PeerIndex) {
        let room_id = format!("hub{}-0", hub_index);
        let internal_service = self.internal_service(&room_id);
        tracing::info!("Created dormant room {} on {}", room_id, internal_service);
        self.rooms.lock().insert(
            room_id.clone(),
            Room {
                room_id,
                owner_hub_index: hub_index,
                status: RoomStatus::Dormant,
                external_port: Self::ROOM_PORT,
                internal_service,
                player_count: 0,
                max_players: 4,
            },
        );
    }

    fn activate_room(&self) -> Option<Room> {
        let mut rooms = self.rooms.lock();
        if let Some(room) = rooms
            .values_mut()
            .find(|room| room.status == RoomStatus::Dormant)
        {
            room.status = RoomStatus::Active;
            return Some(room.clone());
        }

        let slot = rooms.len();
        let room_id = format!("hub{}-{}", self.hub_index, slot);
        let internal_service = self.internal_service(&room_id);
        let room = Room {
            room_id: room_id.clone(),
            owner_hub_index: self.hub_index,
            status: RoomStatus::Active,
            external_port: Self::ROOM_PORT,
            internal_service,
            player_count: 0,
            max_players: 4,
        };
        rooms.insert(room_id, room.clone());
        Some(room)
    }

    fn get_all_local(&self) -> Vec<Room> {
        self.rooms.lock().values().cloned().collect()
    }

    fn cleanup(&self) {
        self.rooms.lock().clear();
    }

    fn room_address(&self, _room: &Room) -> String {
        self.external_address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_room_prefers_existing_dormant_room() {
        let allocator = LocalRoomAllocator::new(0);
        allocator.initialize_pool(0);

        let activated = allocator.activate_room().expect("pool has dormant rooms");
        assert_eq!(activated.status, RoomStatus::Active);
        assert_eq!(allocator.get_all_local().len(), POOL_SIZE);
    }

    #[test]
    fn activate_room_grows_pool_once_exhausted() {
        let allocator = LocalRoomAllocator::new(2);
        allocator.initialize_pool(2);

        for _ in 0..POOL_SIZE {
            allocator.activate_room().expect("dormant room available");
        }

        let grown = allocator
            .activate_room()
            .expect("pool grows a new room when exhausted");
        assert_eq!(grown.owner_hub_index, 2);
        assert_eq!(allocator.get_all_local().len(), POOL_SIZE + 1);
    }

    #[test]
    fn cleanup_empties_the_pool() {
        let allocator = LocalRoomAllocator::new(0);
        allocator.initialize_pool(0);
        allocator.cleanup();
        assert!(allocator.get_all_local().is_empty());
    }
}
