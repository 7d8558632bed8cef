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

//! Distributed matchmaking hub cluster for a multiplayer arena game.
//!
//! See the crate's `cluster` module for the membership-and-gossip
//! subsystem and room directory control plane; `server` for the
//! matchmaking HTTP surface; `rooms` for the room-allocator boundary.
//!
//! Split into a library and a thin `main.rs` binary so integration tests
//! can drive multiple in-process hubs without shelling out to a compiled
//! binary.

pub mod cluster;
pub mod config;
pub mod error;
pub mod rooms;
pub mod server;
