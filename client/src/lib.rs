//! # Trivia Client Library
//!
//! A terminal front end for the trivia server. It reads commands and guesses
//! from standard input, sends them over a WebSocket and prints every event
//! the server pushes back.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Parses typed lines into protocol commands. Lines starting with `/` are
//! commands (`/join`, `/question`, `/start`, ...); anything else is a guess.
//!
//! ### Display Module (`display`)
//! Renders server events as text, marking the local player and the current
//! game master in rosters.
//!
//! ### Network Module (`network`)
//! Owns the WebSocket connection and encodes commands as bincode frames.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Connection;
//! use client::display::format_event;
//! use shared::ClientCommand;
//!
//! # async fn play() -> Result<(), Box<dyn std::error::Error>> {
//! let mut connection = Connection::connect("ws://127.0.0.1:3000").await?;
//! connection
//!     .send(&ClientCommand::Join { name: "Alice".to_string() })
//!     .await?;
//!
//! while let Some(event) = connection.next_event().await? {
//!     println!("{}", format_event(&event, connection.client_id()));
//! }
//! # Ok(())
//! # }
//! ```

pub mod display;
pub mod input;
pub mod network;
