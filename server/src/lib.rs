//! # Trivia Server Library
//!
//! This library provides the authoritative server for a real-time multiplayer
//! trivia game. One player at a time acts as game master: they set a
//! question with its answer and start a timed round, while everyone else
//! races to guess the answer with a limited number of attempts.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Session
//! The server owns the only copy of the game state. Clients send commands and
//! receive events; they never hold state the server has to trust.
//!
//! ### Connection Management
//! Handles the complete lifecycle of WebSocket connections:
//! - Handshake and client ID assignment
//! - Capacity enforcement
//! - Per-connection wire format (JSON text or bincode binary frames)
//! - Disconnect detection, which counts as leaving the game
//!
//! ### Round Timing
//! Every active round runs a one-second countdown and a hard deadline. When
//! a round ends for any reason, both timers are cancelled and the game master
//! role rotates to the next player.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! Connection tasks and timers post messages into one inbound queue. The main
//! loop processes them one at a time and is the only place session state is
//! mutated, so commands and timer expiry never race each other.
//!
//! ### Outbound Queue
//! The session never writes to sockets. It queues events that a sender task
//! encodes once per wire format and hands to each connection's writer task.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The game state machine: roster, master rotation, question, guesses,
//! scoring and round lifecycle.
//!
//! ### Timer Module (`timer`)
//! Cancellable countdown and deadline tasks tagged with a round generation.
//!
//! ### Client Manager Module (`client_manager`)
//! Registry of open connections and their outbound queues.
//!
//! ### Network Module (`network`)
//! WebSocket gateway, command dispatch and the main server loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::session::SessionConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig { default_time_limit: 45 };
//!     let mut server = Server::new("127.0.0.1:3000", config, 64).await?;
//!
//!     // Runs until a shutdown is requested through `server.handle()`
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;
pub mod session;
pub mod timer;
