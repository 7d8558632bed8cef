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

//! Gossip wire format, transport and coordinator logic. The transport
//! (`socket`) and coordinator (`coordinator`) halves are split so pure
//! transport stays separate from per-event handling; every handler lives
//! on one [`crate::cluster::Hub`] rather than being spread across one
//! file per event type, since there are only seven event variants.

pub mod coordinator;
pub mod message;
pub mod socket;
