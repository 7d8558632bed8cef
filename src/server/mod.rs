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

//! The matchmaking HTTP surface: a small `actix-web` service that reads the
//! room directory and falls back to the local room allocator on a miss.
//! Shared state is simply the `Arc<Hub>` the cluster already hands out, so
//! there is no separate server struct to define.

use std::net::SocketAddr;

use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Serialize;

use crate::cluster::Hub;
use crate::config::HubSettings;
use crate::rooms::{Room, RoomStatus};
use std::sync::Arc;

pub type HubData = web::Data<Arc<Hub>>;

/// Builds and binds the matchmaking HTTP server.
pub fn build_http_server(
    hub: Arc<Hub>,
    settings: &HubSettings,
) -> std::io::Result<actix_web::dev::Server> {
    let http_addr = settings.http_bind_addr();
    let data = web::Data::new(hub);

    tracing::info!(%http_addr, "starting matchmaking HTTP server");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/health", web::get().to(handle_health))
            .route("/ready", web::get().to(handle_ready))
            .route("/matchmaking", web::post().to(handle_matchmaking))
            .route("/room/{id}/start", web::post().to(handle_room_start))
            .route("/room/{id}/close", web::post().to(handle_room_close))
            .route("/debug/", web::get().to(handle_debug))
    })
    .bind(http_addr)?
    .run();

    Ok(server)
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn handle_health() -> HttpResponse {
    HttpResponse::Ok().json(HealthBody { status: "healthy" })
}

async fn handle_ready(hub: HubData) -> HttpResponse {
    if hub.is_ready() {
        HttpResponse::Ok().json(HealthBody { status: "healthy" })
    } else {
        HttpResponse::ServiceUnavailable().finish()
    }
}

#[derive(Serialize)]
struct MatchmakingResponse {
    request_code: u16,
    request_message: &'static str,
    room_address: String,
    room_port: u16,
    room_id: String,
}

/// `POST /matchmaking`: returns an existing joinable room or activates one.
/// 503 when the allocator reports no capacity.
async fn handle_matchmaking(hub: HubData) -> HttpResponse {
    match hub.find_or_activate_room().await {
        Some(room) => HttpResponse::Ok().json(MatchmakingResponse {
            request_code: 200,
            request_message: "ok",
            room_address: hub.allocator.room_address(&room),
            room_port: room.external_port,
            room_id: room.room_id,
        }),
        None => HttpResponse::ServiceUnavailable().finish(),
    }
}

/// `POST /room/{id}/start`: transitions the room to `playing` locally if
/// known, and broadcasts `roomStarted` regardless. The broadcast fires even
/// when the room isn't in the local directory yet, since a start call can
/// race ahead of the `roomActivated` gossip that would have introduced it.
async fn handle_room_start(hub: HubData, path: web::Path<String>) -> HttpResponse {
    let room_id = path.into_inner();
    if hub.state.get_room(&room_id).is_some() {
        hub.state.set_room_status(&room_id, RoomStatus::Playing);
    }
    hub.broadcast_room_started(&room_id).await;
    HttpResponse::Ok().finish()
}

/// `POST /room/{id}/close`: returns the room to `dormant` locally if known,
/// and broadcasts `roomClosed` regardless, for the same reason `start` does.
async fn handle_room_close(hub: HubData, path: web::Path<String>) -> HttpResponse {
    let room_id = path.into_inner();
    if hub.state.get_room(&room_id).is_some() {
        hub.state.set_room_status(&room_id, RoomStatus::Dormant);
    }
    hub.broadcast_room_closed(&room_id).await;
    HttpResponse::Ok().finish()
}

#[derive(Serialize)]
struct DebugBody {
    hub_index: u64,
    endpoint: SocketAddr,
    fanout: usize,
    ready: bool,
    last_nonce: u64,
    peers: Vec<DebugPeer>,
    rooms: Vec<Room>,
}

#[derive(Serialize)]
struct DebugPeer {
    index: u64,
    endpoint: SocketAddr,
    status: &'static str,
    heartbeat: u64,
    last_seen: u64,
}

/// `GET /debug/`: an operator-facing status blob, not a stable API — shape
/// may change freely.
async fn handle_debug(hub: HubData) -> HttpResponse {
    let peers = hub
        .state
        .get_all_peers(&[])
        .into_iter()
        .map(|p| DebugPeer {
            index: p.index,
            endpoint: p.endpoint,
            status: match p.status {
                crate::cluster::state::PeerStatus::Alive => "alive",
                crate::cluster::state::PeerStatus::Suspected => "suspected",
                crate::cluster::state::PeerStatus::Dead => "dead",
            },
            heartbeat: p.heartbeat,
            last_seen: p.last_seen,
        })
        .collect();

    HttpResponse::Ok().json(DebugBody {
        hub_index: hub.index,
        endpoint: hub.endpoint,
        fanout: hub.fanout,
        ready: hub.is_ready(),
        last_nonce: hub.last_nonce(),
        peers,
        rooms: hub.state.get_all_rooms(),
    })
}

/// Fail-fast helper for startup errors: print-and-exit(1) rather than
/// unwind, since fatal errors only ever occur during bootstrap.
pub trait UnwrapFailure<T> {
    fn failed_to(self, action: &str) -> T;
}

impl<T> UnwrapFailure<T> for Option<T> {
    fn failed_to(self, message: &str) -> T {
        match self {
            Some(result) => result,
            None => {
                println!("Failed to {}", message);
                std::process::exit(1);
            }
        }
    }
}

impl<T, E: std::fmt::Display> UnwrapFailure<T> for Result<T, E> {
    fn failed_to(self, message: &str) -> T {
        match self {
            Ok(result) => result,
            Err(err) => {
                println!("Failed to {}: {}", message, err);
                std::process::exit(1);
            }
        }
    }
}

pub fn failed_to(action: &str) -> ! {
    println!("Failed to {}", action);
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::discovery::DiscoveryMode;
    use crate::rooms::LocalRoomAllocator;
    use std::time::Duration;
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

    #[actix_web::test]
    async fn ready_is_503_before_mark_ready() {
        let hub = test_hub();
        let response = handle_ready(web::Data::new(hub)).await;
        assert_eq!(response.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn ready_is_200_after_mark_ready() {
        let hub = test_hub();
        hub.mark_ready();
        let response = handle_ready(web::Data::new(hub)).await;
        assert_eq!(response.status(), actix_web::http::StatusCode::OK);
    }

    #[actix_web::test]
    async fn matchmaking_activates_from_pool_when_directory_is_empty() {
        let hub = test_hub();
        hub.allocator.initialize_pool(0);
        let response = handle_matchmaking(web::Data::new(hub)).await;
        assert_eq!(response.status(), actix_web::http::StatusCode::OK);
    }

    #[actix_web::test]
    async fn room_start_broadcasts_even_for_unknown_room() {
        let hub = test_hub();
        let nonce_before = hub.last_nonce();
        let response =
            handle_room_start(web::Data::new(hub.clone()), web::Path::from("missing".to_string()))
                .await;
        assert_eq!(response.status(), actix_web::http::StatusCode::OK);
        assert!(hub.state.get_room("missing").is_none());
        assert!(hub.last_nonce() > nonce_before);
    }

    #[actix_web::test]
    async fn room_close_transitions_known_room_to_dormant() {
        let hub = test_hub();
        hub.state.add_room(crate::rooms::Room {
            room_id: "r1".into(),
            owner_hub_index: 0,
            status: RoomStatus::Active,
            external_port: 1,
            internal_service: String::new(),
            player_count: 0,
            max_players: 4,
        });

        let response =
            handle_room_close(web::Data::new(hub.clone()), web::Path::from("r1".to_string())).await;
        assert_eq!(response.status(), actix_web::http::StatusCode::OK);
        assert_eq!(hub.state.get_room("r1").unwrap().status, RoomStatus::Dormant);
    }
}
