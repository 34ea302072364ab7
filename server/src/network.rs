//! WebSocket gateway and the server's main event loop

use crate::client_manager::{Client, ClientManager};
use crate::session::{Outcome, Session, SessionConfig};
use crate::timer::TimerEvent;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::codec::{self, CodecError};
use shared::{ClientCommand, ClientId, ServerEvent, WireFormat};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks and timers to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    CommandReceived {
        client_id: ClientId,
        command: ClientCommand,
    },
    MalformedFrame {
        client_id: ClientId,
        error: String,
    },
    ClientConnected {
        client_id: ClientId,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
    RoundTimer(TimerEvent),
    Shutdown,
}

/// Messages sent from the main loop to the network sender task
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    SendEvent {
        event: ServerEvent,
        client_id: ClientId,
    },
    BroadcastEvent {
        event: ServerEvent,
    },
}

/// Cloneable handle for stopping a running [`Server`]
#[derive(Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Trivia server: accepts WebSocket clients and owns the game session
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    session: Session,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        session_config: SessionConfig,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let session = Session::new(session_config, game_tx.clone(), server_tx.clone());

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            session,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Address the listener is bound to. Useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Spawns task that accepts TCP connections and upgrades them
    fn spawn_connection_acceptor(&self, listener: TcpListener) -> JoinHandle<()> {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            Arc::clone(&clients),
                            server_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Spawns task that encodes queued events and hands them to connections
    fn spawn_network_sender(&mut self) -> JoinHandle<()> {
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                let clients_guard = clients.read().await;
                match message {
                    GameMessage::SendEvent { event, client_id } => {
                        match clients_guard.get_client(&client_id) {
                            Some(client) => deliver(client, &mut EncodedEvent::new(&event)),
                            None => debug!("Dropping event for departed client {}", client_id),
                        }
                    }
                    GameMessage::BroadcastEvent { event } => {
                        let mut frames = EncodedEvent::new(&event);
                        for client in clients_guard.recipients() {
                            deliver(client, &mut frames);
                        }
                    }
                }
            }
        })
    }

    fn send_event(&self, client_id: ClientId, event: ServerEvent) {
        if let Err(e) = self.game_tx.send(GameMessage::SendEvent { event, client_id }) {
            error!("Failed to queue event for client {}: {}", client_id, e);
        }
    }

    /// Tells the sender why a command was refused
    fn report_outcome(&self, client_id: ClientId, outcome: Outcome) {
        match outcome {
            Outcome::Applied => {}
            Outcome::Ignored => debug!("Ignored command from client {}", client_id),
            Outcome::Rejected(rejection) => {
                debug!(
                    "Rejected command from client {} ({:?}): {}",
                    client_id,
                    rejection.kind(),
                    rejection
                );
                self.send_event(client_id, ServerEvent::private_notice(rejection.to_string()));
            }
        }
    }

    /// Main server loop. All session mutation happens here, one message at a
    /// time, until a shutdown is requested.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = self.listener.take().ok_or("server is already running")?;

        let tasks = [
            self.spawn_connection_acceptor(listener),
            self.spawn_network_sender(),
        ];

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::CommandReceived { client_id, command } => {
                    debug!("Client {} sent {:?}", client_id, command);
                    let outcome = process_command(&mut self.session, client_id, command);
                    self.report_outcome(client_id, outcome);
                }
                ServerMessage::MalformedFrame { client_id, error } => {
                    self.send_event(
                        client_id,
                        ServerEvent::private_notice(format!("Could not read message: {}", error)),
                    );
                }
                ServerMessage::ClientConnected { client_id } => {
                    self.send_event(client_id, ServerEvent::Welcome { client_id });
                }
                ServerMessage::ClientDisconnected { client_id } => {
                    {
                        let mut clients = self.clients.write().await;
                        clients.remove_client(&client_id);
                        if clients.is_empty() {
                            info!("No connections open");
                        } else {
                            debug!("{} connections open", clients.len());
                        }
                    }
                    self.session.leave(client_id);
                }
                ServerMessage::RoundTimer(event) => {
                    self.session.on_timer(event);
                }
                ServerMessage::Shutdown => break,
            }
        }

        info!("Server shutting down");
        self.session.reset();
        for task in tasks {
            task.abort();
        }

        Ok(())
    }
}

/// Calls the session operation matching a client command
pub fn process_command(session: &mut Session, client_id: ClientId, command: ClientCommand) -> Outcome {
    match command {
        ClientCommand::Join { name } => session.join(client_id, &name),
        ClientCommand::SetQuestion { question, answer } => {
            session.set_question(client_id, &question, &answer)
        }
        ClientCommand::StartRound { time_limit } => session.start_round(client_id, time_limit),
        ClientCommand::SubmitGuess { guess } => session.submit_guess(client_id, &guess),
        ClientCommand::Leave {} => session.leave(client_id),
        ClientCommand::RequestState {} => session.request_state(client_id),
    }
}

/// Drives one WebSocket connection from handshake to close
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };
    let (mut write_half, mut read_half) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let client_id = clients.write().await.add_client(addr, tx);
    let Some(client_id) = client_id else {
        warn!("Server full, refusing connection from {}", addr);
        if let Ok(text) = codec::encode_text(&ServerEvent::private_notice("Server full")) {
            let _ = write_half.send(Message::text(text)).await;
        }
        let _ = write_half.close().await;
        return;
    };

    if server_tx
        .send(ServerMessage::ClientConnected { client_id })
        .is_err()
    {
        return;
    }

    // Ends once the client manager drops this connection's sender
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write_half.send(message).await {
                debug!("Failed to write to client {}: {}", client_id, e);
                break;
            }
        }
        let _ = write_half.close().await;
    });

    while let Some(frame) = read_half.next().await {
        let (format, decoded) = match frame {
            Ok(Message::Text(text)) => (WireFormat::Json, codec::decode_command_text(&text)),
            Ok(Message::Binary(data)) => (
                WireFormat::Bincode,
                codec::decode_binary::<ClientCommand>(&data),
            ),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Read error from client {}: {}", client_id, e);
                break;
            }
        };

        clients.write().await.set_format(client_id, format);

        let message = match decoded {
            Ok(command) => ServerMessage::CommandReceived { client_id, command },
            Err(e) => {
                warn!("Client {} sent an unreadable frame: {}", client_id, e);
                ServerMessage::MalformedFrame {
                    client_id,
                    error: e.to_string(),
                }
            }
        };
        if server_tx.send(message).is_err() {
            break;
        }
    }

    let _ = server_tx.send(ServerMessage::ClientDisconnected { client_id });
}

/// An event encoded lazily, at most once per wire format
struct EncodedEvent<'a> {
    event: &'a ServerEvent,
    text: Option<String>,
    binary: Option<Vec<u8>>,
}

impl<'a> EncodedEvent<'a> {
    fn new(event: &'a ServerEvent) -> Self {
        Self {
            event,
            text: None,
            binary: None,
        }
    }

    fn frame(&mut self, format: WireFormat) -> Result<Message, CodecError> {
        match format {
            WireFormat::Json => {
                if self.text.is_none() {
                    self.text = Some(codec::encode_text(self.event)?);
                }
                Ok(Message::text(self.text.clone().unwrap_or_default()))
            }
            WireFormat::Bincode => {
                if self.binary.is_none() {
                    self.binary = Some(codec::encode_binary(self.event)?);
                }
                Ok(Message::binary(self.binary.clone().unwrap_or_default()))
            }
        }
    }
}

fn deliver(client: &Client, frames: &mut EncodedEvent) {
    match frames.frame(client.format) {
        Ok(message) => {
            if !client.deliver(message) {
                debug!("Client {} is closing, dropped event", client.id);
            }
        }
        Err(e) => error!("Failed to encode event for client {}: {}", client.id, e),
    }
}
