//! Wire protocol shared by the trivia server and its clients.
//!
//! Every message crossing the WebSocket is one of two externally tagged enums:
//! [`ClientCommand`] flows from a client to the server and [`ServerEvent`]
//! flows back. Both serialize to camelCase JSON for browser clients and to
//! bincode for native clients; see [`codec`].

pub mod codec;

pub use codec::{CodecError, WireFormat};

use serde::{Deserialize, Serialize};

/// Round duration used when the master does not request one.
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 60;
/// Guesses every non-master player gets at the start of a round.
pub const STARTING_GUESSES: u32 = 3;
/// A master plus at least two guessers.
pub const MIN_PLAYERS_TO_START: usize = 3;
pub const POINTS_PER_CORRECT: u32 = 10;

/// Opaque per-connection identity assigned by the server.
pub type ClientId = u32;

/// Commands a client may send.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    Join {
        name: String,
    },
    SetQuestion {
        question: String,
        answer: String,
    },
    StartRound {
        #[serde(default)]
        time_limit: Option<u32>,
    },
    SubmitGuess {
        guess: String,
    },
    Leave {},
    RequestState {},
}

/// Events the server sends, either broadcast or to a single connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Welcome {
        client_id: ClientId,
    },
    RosterUpdate {
        players: Vec<PlayerSummary>,
        master_id: Option<ClientId>,
    },
    Notice {
        text: String,
    },
    PrivateNotice {
        text: String,
    },
    RoundStarted {
        question: String,
        time_limit: u32,
        master_id: ClientId,
        master_name: String,
    },
    Tick {
        time_remaining: u32,
    },
    AnswerRevealed {
        answer: String,
    },
    RoundWon {
        winner_name: String,
        answer: String,
        scores: Vec<ScoreEntry>,
    },
    MasterChanged {
        master_id: Option<ClientId>,
        master_name: Option<String>,
    },
    BecameMaster {},
}

/// One row of a roster update.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: ClientId,
    pub name: String,
    pub score: u32,
    pub guesses: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub name: String,
    pub score: u32,
}

impl ServerEvent {
    pub fn notice(text: impl Into<String>) -> Self {
        ServerEvent::Notice { text: text.into() }
    }

    pub fn private_notice(text: impl Into<String>) -> Self {
        ServerEvent::PrivateNotice { text: text.into() }
    }
}
