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

//! The wire envelope: one tagged enum covering every gossip event, encoded
//! with `bincode` over `serde`. Peer authentication is out of scope, so
//! schema stability — not encryption — is the actual wire constraint here.

use serde::{Deserialize, Serialize};

use crate::cluster::{Nonce, PeerIndex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipMessage {
    pub nonce: Nonce,
    pub origin: PeerIndex,
    pub forwarded_by: PeerIndex,
    pub timestamp: u64,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    PeerJoin { joining_index: PeerIndex },
    PeerLeave { leaving_index: PeerIndex },
    PeerAlive { alive_index: PeerIndex },
    PeerSuspicious { suspicious_index: PeerIndex },
    PeerDead { dead_index: PeerIndex },
    RoomActivated {
        room_id: String,
        owner_hub: PeerIndex,
        external_port: u16,
        external_address: String,
    },
    RoomStarted { room_id: String },
    RoomClosed { room_id: String },
}

impl EventPayload {
    /// Only a `peerLeave` payload marks the heartbeat observation as a
    /// graceful departure.
    pub fn is_leaving(&self) -> bool {
        matches!(self, EventPayload::PeerLeave { .. })
    }
}

impl GossipMessage {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
