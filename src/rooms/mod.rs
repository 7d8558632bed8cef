//! The room directory's data type and the allocator boundary.
//!
//! The room allocator itself (process/pod lifecycle of room workers) is an
//! external collaborator per the core's contract; this module only fixes
//! the [`Room`] type and the [`RoomAllocator`] trait the coordinator calls
//! through, plus a couple of concrete allocators good enough to run the
//! cluster end to end.

pub mod allocator;

use serde::{Deserialize, Serialize};

use crate::cluster::PeerIndex;

pub use self::allocator::{KubernetesRoomAllocator, LocalRoomAllocator, RoomAllocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Dormant,
    Active,
    Playing,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub owner_hub_index: PeerIndex,
    pub status: RoomStatus,
    pub external_port: u16,
    /// Host:port the owning hub probes for health. Empty for rooms this hub
    /// only knows about through the directory (remote rooms).
    pub internal_service: String,
    pub player_count: u32,
    pub max_players: u32,
}

impl Room {
    pub fn is_joinable(&self) -> bool {
        self.status == RoomStatus::Active && self.player_count < self.max_players
    }
}
