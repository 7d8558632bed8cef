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

//! Room Health Prober: probes every locally-knowable active room's
//! `/status` endpoint and fires `on_room_unhealthy` on anything but a 200
//! with the expected status string. Remote rooms (empty
//! `internal_service`) are skipped — the owning hub is authoritative.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;

use super::Hub;
use crate::rooms::{Room, RoomStatus};

#[derive(Debug, Deserialize)]
struct RoomStatusBody {
    status: String,
}

/// Builds the one shared `reqwest::Client` the prober reuses across probe
/// cycles rather than opening a fresh connection per room.
pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("failed to build health-prober HTTP client")
}

pub async fn run(
    hub: Arc<Hub>,
    client: reqwest::Client,
    probe_port: u16,
    expected_status: String,
    check_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(check_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                check_once(&hub, &client, probe_port, &expected_status).await;
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!("room health prober shutting down");
                return;
            }
        }
    }
}

async fn check_once(hub: &Arc<Hub>, client: &reqwest::Client, probe_port: u16, expected_status: &str) {
    // Probes run sequentially within one cycle, not fanned out in parallel.
    for room in hub.state.get_all_rooms() {
        if room.status != RoomStatus::Active || room.internal_service.is_empty() {
            continue;
        }
        if !probe_is_healthy(client, &room, probe_port, expected_status).await {
            tracing::debug!(room = %room.room_id, "room probe reported unhealthy");
            hub.on_room_unhealthy(&room).await;
        }
    }
}

async fn probe_is_healthy(
    client: &reqwest::Client,
    room: &Room,
    probe_port: u16,
    expected_status: &str,
) -> bool {
    let url = format!("http://{}:{}/status", room.internal_service, probe_port);
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(%url, error = %err, "room probe request failed");
            return false;
        }
    };

    if response.status() != reqwest::StatusCode::OK {
        tracing::debug!(%url, status = %response.status(), "room probe returned non-200");
        return false;
    }

    match response.json::<RoomStatusBody>().await {
        Ok(body) => body.status == expected_status,
        Err(err) => {
            tracing::debug!(%url, error = %err, "room probe returned malformed JSON");
            false
        }
    }
}
