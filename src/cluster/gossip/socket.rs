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

//! Datagram Endpoint: binds the gossip UDP socket. One `mpsc`-fed send
//! task, one receive loop that spawns a worker per inbound datagram, both
//! polling a `tokio::sync::watch<bool>` shutdown flag.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use super::message::GossipMessage;
use crate::cluster::Hub;

/// Frames up to this size are accepted off the wire.
pub const UDP_MAX_PAYLOAD: usize = 65535;

/// Binds the gossip UDP socket and spawns its send/receive tasks.
///
/// Inbound datagrams are decoded and dispatched to `hub.on_datagram`
/// concurrently — one `tokio::spawn` per datagram. Outbound messages
/// arrive over `gossip_rx` and are serialized once per send.
pub async fn spawn_gossip_socket(
    bind_addr: SocketAddr,
    hub: Arc<Hub>,
    mut gossip_rx: mpsc::Receiver<(SocketAddr, GossipMessage)>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let socket = Arc::new(UdpSocket::bind(bind_addr).await.map_err(|e| {
        tracing::error!(%bind_addr, error = %e, "failed to bind gossip UDP socket");
        e
    })?);

    let send_socket = socket.clone();
    tokio::spawn(async move {
        while let Some((dest, msg)) = gossip_rx.recv().await {
            let bytes = match msg.encode() {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode outbound gossip message");
                    continue;
                }
            };
            if let Err(err) = send_socket.send_to(&bytes, dest).await {
                tracing::debug!(%dest, error = %err, "failed to send gossip datagram");
            }
        }
    });

    let recv_socket = socket;
    tokio::spawn(async move {
        let mut buf = vec![0u8; UDP_MAX_PAYLOAD];
        loop {
            tokio::select! {
                result = recv_socket.recv_from(&mut buf) => {
                    match result {
                        Ok((size, sender)) => {
                            match GossipMessage::decode(&buf[..size]) {
                                Ok(msg) => {
                                    let hub = hub.clone();
                                    tokio::spawn(async move {
                                        hub.on_datagram(msg, sender).await;
                                    });
                                }
                                Err(err) => {
                                    tracing::debug!(%sender, error = %err, "dropping undecodable gossip datagram");
                                }
                            }
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "gossip socket recv_from failed");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    tracing::debug!("gossip socket shutting down");
                    break;
                }
            }
        }
    });

    Ok(())
}
