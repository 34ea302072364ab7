//! Connection registry for the WebSocket gateway
//!
//! This module tracks every open connection, independent of whether the
//! connection has joined the game:
//! - Connection lifecycle (register on handshake, remove on close)
//! - Server capacity enforcement
//! - Per-connection outbound queue and negotiated wire format
//!
//! Game membership lives in the session. A connection only becomes a player
//! once it sends `join`.

use log::info;
use shared::{ClientId, WireFormat};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// A connected WebSocket client
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Encoding used for frames sent to this client
    pub format: WireFormat,
    /// Queue drained by the connection's writer task
    sender: mpsc::UnboundedSender<Message>,
}

impl Client {
    /// Creates a client that speaks JSON until it sends a binary frame.
    pub fn new(id: ClientId, addr: SocketAddr, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            format: WireFormat::default(),
            sender,
        }
    }

    /// Queues a frame for the writer task.
    ///
    /// Returns false once the writer task has gone away, which means the
    /// connection is closing and a disconnect is already on its way.
    pub fn deliver(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Manages all open connections
///
/// Client IDs start from 1 and are never reused while the server runs, so a
/// late event for a closed connection can never be attributed to a new one.
pub struct ClientManager {
    clients: HashMap<ClientId, Client>,
    next_client_id: ClientId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));

        Some(client_id)
    }

    /// Removes a connection. Returns true if it was registered.
    pub fn remove_client(&mut self, client_id: &ClientId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Client {} ({}) disconnected after {:.1}s",
                client.id,
                client.addr,
                client.connected_for().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn get_client(&self, client_id: &ClientId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Records the wire format a client used for its latest frame
    pub fn set_format(&mut self, client_id: ClientId, format: WireFormat) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.format = format;
            true
        } else {
            false
        }
    }

    /// Every open connection, for broadcasting
    pub fn recipients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
