//! The shared trivia session: roster, master rotation, and round lifecycle.
//!
//! A [`Session`] is owned by the server loop and mutated only from there, one
//! operation at a time. Operations validate the acting connection, mutate,
//! queue the resulting events on the outbound channel, and report an
//! [`Outcome`]. Rejections are never fatal; the session is valid after every
//! call.
//!
//! The session is `Idle` or has a round active. Roster changes can happen in
//! either state. A round ends by a correct guess, by every guesser running out
//! of guesses, or by the deadline; all three paths cancel the round timers,
//! clear the question, and hand the master role to the next player.

use crate::network::{GameMessage, ServerMessage};
use crate::timer::{RoundTimers, TimerEvent, TimerKind};
use log::{debug, info, warn};
use shared::{
    ClientId, PlayerSummary, ScoreEntry, ServerEvent, DEFAULT_TIME_LIMIT_SECS,
    MIN_PLAYERS_TO_START, POINTS_PER_CORRECT, STARTING_GUESSES,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Round duration in seconds when the master does not pick one
    pub default_time_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_time_limit: DEFAULT_TIME_LIMIT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: ClientId,
    pub name: String,
    pub score: u32,
    pub guesses: u32,
}

impl Player {
    pub fn new(id: ClientId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            score: 0,
            guesses: STARTING_GUESSES,
        }
    }

    fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id,
            name: self.name.clone(),
            score: self.score,
            guesses: self.guesses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required field was missing or empty
    Validation,
    /// The wrong player attempted the action
    Authorization,
    /// The session is in the wrong state for the action
    Precondition,
    /// The acting connection is not a player
    NotFound,
}

/// Why an operation was refused. The message is sent back to the sender.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Question and answer are required")]
    MissingQuestionOrAnswer,
    #[error("Only the game master can set a question")]
    NotMasterSetQuestion,
    #[error("Only the game master can start the game")]
    NotMasterStartRound,
    #[error("Game master cannot guess the answer.")]
    MasterCannotGuess,
    #[error("You are already in the game.")]
    AlreadyJoined,
    #[error("Cannot set question while game is running")]
    RoundInProgress,
    #[error("To start game, at least {0} players are needed")]
    NotEnoughPlayers(usize),
    #[error("Set a question before starting")]
    NoQuestion,
    #[error("Game has not started")]
    RoundNotActive,
    #[error("You have no attempts left.")]
    NoGuessesLeft,
    #[error("You are not in the game.")]
    UnknownPlayer,
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Rejection::MissingQuestionOrAnswer => ErrorKind::Validation,
            Rejection::NotMasterSetQuestion
            | Rejection::NotMasterStartRound
            | Rejection::MasterCannotGuess => ErrorKind::Authorization,
            Rejection::AlreadyJoined
            | Rejection::RoundInProgress
            | Rejection::NotEnoughPlayers(_)
            | Rejection::NoQuestion
            | Rejection::RoundNotActive
            | Rejection::NoGuessesLeft => ErrorKind::Precondition,
            Rejection::UnknownPlayer => ErrorKind::NotFound,
        }
    }
}

/// Result of a session operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// State changed and events were queued
    Applied,
    /// Nothing happened and nobody is told
    Ignored,
    /// Nothing happened; the sender should be told why
    Rejected(Rejection),
}

impl From<Rejection> for Outcome {
    fn from(rejection: Rejection) -> Self {
        Outcome::Rejected(rejection)
    }
}

pub struct Session {
    config: SessionConfig,
    players: Vec<Player>,
    master_index: usize,
    started: bool,
    question: Option<String>,
    /// Trimmed and lowercased
    answer: Option<String>,
    time_limit: u32,
    time_remaining: u32,
    /// Generation of the current (or last) round. Keeps counting across
    /// resets so queued timer events from an earlier round stay stale.
    round: u64,
    timers: RoundTimers,
    game_tx: mpsc::UnboundedSender<GameMessage>,
}

impl Session {
    /// Creates an idle, empty session.
    ///
    /// Events are queued on `game_tx`; round timers post into `server_tx`.
    pub fn new(
        config: SessionConfig,
        game_tx: mpsc::UnboundedSender<GameMessage>,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        let config = SessionConfig {
            default_time_limit: config.default_time_limit.max(1),
        };
        Self {
            config,
            players: Vec::new(),
            master_index: 0,
            started: false,
            question: None,
            answer: None,
            time_limit: config.default_time_limit,
            time_remaining: 0,
            round: 0,
            timers: RoundTimers::new(server_tx),
            game_tx,
        }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, client_id: ClientId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == client_id)
    }

    pub fn master(&self) -> Option<&Player> {
        self.players.get(self.master_index)
    }

    pub fn master_index(&self) -> usize {
        self.master_index
    }

    pub fn is_round_active(&self) -> bool {
        self.started
    }

    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    /// Round length used when a round starts without an override
    pub fn time_limit(&self) -> u32 {
        self.time_limit
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn timers_armed(&self) -> bool {
        self.timers.is_armed()
    }

    fn is_master(&self, client_id: ClientId) -> bool {
        self.master().is_some_and(|master| master.id == client_id)
    }

    fn position_of(&self, client_id: ClientId) -> Option<usize> {
        self.players.iter().position(|player| player.id == client_id)
    }

    /// Adds a player. The first player in an empty session becomes master.
    pub fn join(&mut self, client_id: ClientId, name: &str) -> Outcome {
        let name = name.trim();
        if name.is_empty() {
            debug!("Ignoring join without a name from client {}", client_id);
            return Outcome::Ignored;
        }
        if self.player(client_id).is_some() {
            return Rejection::AlreadyJoined.into();
        }

        self.players.push(Player::new(client_id, name));
        info!(
            "{} joined as client {} ({} players)",
            name,
            client_id,
            self.players.len()
        );

        self.broadcast_roster();
        self.broadcast(ServerEvent::notice(format!("{} joined the game", name)));

        if self.players.len() == 1 {
            self.master_index = 0;
            self.send_to(client_id, ServerEvent::BecameMaster {});
        }

        Outcome::Applied
    }

    /// Removes a player, e.g. on disconnect.
    ///
    /// The master index is only clamped back into range, never advanced, so
    /// when the master leaves the role falls to whoever now sits at the same
    /// position (or to the first player if the master was last).
    pub fn leave(&mut self, client_id: ClientId) -> Outcome {
        let Some(position) = self.position_of(client_id) else {
            return Outcome::Ignored;
        };

        let player = self.players.remove(position);
        info!(
            "{} (client {}) left ({} players)",
            player.name,
            client_id,
            self.players.len()
        );
        self.broadcast(ServerEvent::notice(format!(
            "{} has left the game",
            player.name
        )));

        if self.players.is_empty() {
            self.end_round();
            self.master_index = 0;
            info!("Session cleared, there are no players");
        } else {
            if self.master_index >= self.players.len() {
                self.master_index = 0;
            }
            self.broadcast_roster();
        }

        Outcome::Applied
    }

    /// Stores the question for the next round. Master only, while idle.
    pub fn set_question(&mut self, client_id: ClientId, question: &str, answer: &str) -> Outcome {
        if !self.is_master(client_id) {
            return Rejection::NotMasterSetQuestion.into();
        }
        if self.started {
            return Rejection::RoundInProgress.into();
        }

        let answer = answer.trim();
        if question.trim().is_empty() || answer.is_empty() {
            return Rejection::MissingQuestionOrAnswer.into();
        }

        // The question is shown as typed; only the answer is normalized
        self.question = Some(question.to_string());
        self.answer = Some(answer.to_lowercase());
        info!("Client {} set the next question", client_id);

        self.broadcast(ServerEvent::notice("Game master created a question"));
        self.broadcast_roster();

        Outcome::Applied
    }

    /// Starts the round. A positive `requested_time_limit` replaces the
    /// session's round length, which later rounds keep until another
    /// override or a reset.
    pub fn start_round(
        &mut self,
        client_id: ClientId,
        requested_time_limit: Option<u32>,
    ) -> Outcome {
        let Some(master) = self.master().filter(|master| master.id == client_id) else {
            return Rejection::NotMasterStartRound.into();
        };
        let (master_id, master_name) = (master.id, master.name.clone());

        if self.started {
            return Outcome::Ignored;
        }
        if self.players.len() < MIN_PLAYERS_TO_START {
            return Rejection::NotEnoughPlayers(MIN_PLAYERS_TO_START).into();
        }
        let Some(question) = self.question.clone().filter(|_| self.answer.is_some()) else {
            return Rejection::NoQuestion.into();
        };

        let time_limit = requested_time_limit
            .filter(|&seconds| seconds > 0)
            .unwrap_or(self.time_limit);

        self.time_limit = time_limit;
        self.time_remaining = time_limit;
        self.started = true;
        self.round += 1;
        for player in &mut self.players {
            player.guesses = STARTING_GUESSES;
        }
        info!(
            "Round {} started by {} with {}s on the clock",
            self.round, master_name, time_limit
        );

        self.broadcast_roster();
        self.broadcast(ServerEvent::RoundStarted {
            question,
            time_limit,
            master_id,
            master_name,
        });

        self.timers
            .arm(self.round, Duration::from_secs(u64::from(time_limit)));

        Outcome::Applied
    }

    /// Spends one of the sender's guesses and resolves the round if it
    /// matches the answer or was the last guess anyone had.
    pub fn submit_guess(&mut self, client_id: ClientId, guess: &str) -> Outcome {
        if !self.started {
            return Rejection::RoundNotActive.into();
        }
        let Some(position) = self.position_of(client_id) else {
            return Rejection::UnknownPlayer.into();
        };
        if self.is_master(client_id) {
            return Rejection::MasterCannotGuess.into();
        }

        let player = &mut self.players[position];
        if player.guesses == 0 {
            return Rejection::NoGuessesLeft.into();
        }
        player.guesses = player.guesses.saturating_sub(1);
        let (name, guesses_left) = (player.name.clone(), player.guesses);

        self.broadcast_roster();

        let guess = guess.trim().to_lowercase();
        if self.answer.as_deref() == Some(guess.as_str()) {
            self.players[position].score += POINTS_PER_CORRECT;
            self.timers.cancel();
            info!("{} won round {}", name, self.round);

            self.broadcast(ServerEvent::notice(format!("{} guessed correctly!", name)));
            self.broadcast(ServerEvent::RoundWon {
                winner_name: name,
                answer: self.answer.clone().unwrap_or_default(),
                scores: self.scoreboard(),
            });
            self.finish_round();
        } else {
            self.send_to(
                client_id,
                ServerEvent::private_notice(format!("Wrong. Guesses left: {}", guesses_left)),
            );

            if self.guessers_exhausted() {
                self.timers.cancel();
                info!("Round {} ended with every guess spent", self.round);

                self.broadcast(ServerEvent::notice(
                    "All players have exhausted guesses. Game over.",
                ));
                self.reveal_answer();
                self.finish_round();
            }
        }

        Outcome::Applied
    }

    /// Routes a timer event, dropping it if its round is no longer active.
    pub fn on_timer(&mut self, event: TimerEvent) -> Outcome {
        if !self.started || event.round != self.round {
            debug!(
                "Discarding {:?} for round {} (current round {})",
                event.kind, event.round, self.round
            );
            return Outcome::Ignored;
        }

        match event.kind {
            TimerKind::Tick => self.tick_elapsed(),
            TimerKind::Deadline => self.deadline_elapsed(),
        }
    }

    /// One second of the countdown has passed.
    pub fn tick_elapsed(&mut self) -> Outcome {
        if !self.started {
            return Outcome::Ignored;
        }
        self.time_remaining = self.time_remaining.saturating_sub(1);
        self.broadcast(ServerEvent::Tick {
            time_remaining: self.time_remaining,
        });
        Outcome::Applied
    }

    /// The round ran out of time without a winner.
    pub fn deadline_elapsed(&mut self) -> Outcome {
        if !self.started {
            return Outcome::Ignored;
        }

        self.timers.cancel();
        info!("Round {} timed out", self.round);

        self.broadcast(ServerEvent::notice("Time is up! No winner."));
        self.reveal_answer();
        self.finish_round();

        Outcome::Applied
    }

    /// Re-sends the current state to one connection without changing it.
    pub fn request_state(&self, client_id: ClientId) -> Outcome {
        self.send_to(client_id, self.roster_event());

        if self.started {
            if let (Some(question), Some(master)) = (&self.question, self.master()) {
                self.send_to(
                    client_id,
                    ServerEvent::RoundStarted {
                        question: question.clone(),
                        time_limit: self.time_limit,
                        master_id: master.id,
                        master_name: master.name.clone(),
                    },
                );
            }
            self.send_to(
                client_id,
                ServerEvent::Tick {
                    time_remaining: self.time_remaining,
                },
            );
        }

        Outcome::Applied
    }

    /// Returns the session to its freshly constructed state. Nothing is
    /// broadcast.
    pub fn reset(&mut self) {
        self.timers.cancel();
        self.players.clear();
        self.master_index = 0;
        self.started = false;
        self.question = None;
        self.answer = None;
        self.time_limit = self.config.default_time_limit;
        self.time_remaining = 0;
        info!("Session reset");
    }

    fn guessers_exhausted(&self) -> bool {
        let master_id = self.master().map(|master| master.id);
        self.players
            .iter()
            .filter(|player| Some(player.id) != master_id)
            .all(|player| player.guesses == 0)
    }

    fn scoreboard(&self) -> Vec<ScoreEntry> {
        self.players
            .iter()
            .map(|player| ScoreEntry {
                name: player.name.clone(),
                score: player.score,
            })
            .collect()
    }

    fn reveal_answer(&self) {
        if let Some(answer) = &self.answer {
            self.broadcast(ServerEvent::AnswerRevealed {
                answer: answer.clone(),
            });
        }
    }

    /// Ends the round, rotates the master, and announces the new one.
    fn finish_round(&mut self) {
        self.end_round();
        if !self.players.is_empty() {
            self.advance_master();
        }

        self.broadcast_roster();
        let master = self.master();
        self.broadcast(ServerEvent::MasterChanged {
            master_id: master.map(|master| master.id),
            master_name: master.map(|master| master.name.clone()),
        });
    }

    fn end_round(&mut self) {
        self.timers.cancel();
        self.started = false;
        self.question = None;
        self.answer = None;
        self.time_remaining = 0;
    }

    fn advance_master(&mut self) {
        self.master_index += 1;
        if self.master_index >= self.players.len() {
            self.master_index = 0;
        }
    }

    fn roster_event(&self) -> ServerEvent {
        ServerEvent::RosterUpdate {
            players: self.players.iter().map(Player::summary).collect(),
            master_id: self.master().map(|master| master.id),
        }
    }

    fn broadcast_roster(&self) {
        self.broadcast(self.roster_event());
    }

    fn broadcast(&self, event: ServerEvent) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastEvent { event }) {
            warn!("Failed to queue broadcast: {}", e);
        }
    }

    fn send_to(&self, client_id: ClientId, event: ServerEvent) {
        if let Err(e) = self.game_tx.send(GameMessage::SendEvent { event, client_id }) {
            warn!("Failed to queue event for client {}: {}", client_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const ALICE: ClientId = 1;
    const BOB: ClientId = 2;
    const CAROL: ClientId = 3;

    struct Harness {
        session: Session,
        game_rx: mpsc::UnboundedReceiver<GameMessage>,
        server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    }

    impl Harness {
        fn new() -> Self {
            let (game_tx, game_rx) = mpsc::unbounded_channel();
            let (server_tx, server_rx) = mpsc::unbounded_channel();
            Self {
                session: Session::new(SessionConfig::default(), game_tx, server_tx),
                game_rx,
                server_rx,
            }
        }

        /// Alice, Bob and Carol joined, in that order, with events drained
        fn with_three_players() -> Self {
            let mut harness = Self::new();
            harness.session.join(ALICE, "Alice");
            harness.session.join(BOB, "Bob");
            harness.session.join(CAROL, "Carol");
            harness.drain();
            harness
        }

        fn drain(&mut self) -> Vec<GameMessage> {
            let mut messages = Vec::new();
            while let Ok(message) = self.game_rx.try_recv() {
                messages.push(message);
            }
            messages
        }

        fn start_round(&mut self, master: ClientId, time_limit: u32) {
            assert_eq!(
                self.session.set_question(master, "2+2", "4"),
                Outcome::Applied
            );
            assert_eq!(
                self.session.start_round(master, Some(time_limit)),
                Outcome::Applied
            );
            self.drain();
        }
    }

    fn broadcasts(messages: &[GameMessage]) -> Vec<ServerEvent> {
        messages
            .iter()
            .filter_map(|message| match message {
                GameMessage::BroadcastEvent { event } => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    fn sent_to(messages: &[GameMessage], client_id: ClientId) -> Vec<ServerEvent> {
        messages
            .iter()
            .filter_map(|message| match message {
                GameMessage::SendEvent {
                    event,
                    client_id: to,
                } if *to == client_id => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    fn master_id(session: &Session) -> Option<ClientId> {
        session.master().map(|master| master.id)
    }

    fn assert_round_inactive(session: &Session) {
        assert!(!session.is_round_active());
        assert!(!session.timers_armed());
        assert_eq!(session.question(), None);
        assert_eq!(session.answer(), None);
        assert_eq!(session.time_remaining(), 0);
    }

    #[test]
    fn test_first_player_becomes_master() {
        let mut harness = Harness::new();

        assert_eq!(harness.session.join(ALICE, "Alice"), Outcome::Applied);
        let messages = harness.drain();
        assert_eq!(sent_to(&messages, ALICE), vec![ServerEvent::BecameMaster {}]);
        assert!(broadcasts(&messages)
            .contains(&ServerEvent::notice("Alice joined the game")));

        assert_eq!(harness.session.join(BOB, "Bob"), Outcome::Applied);
        let messages = harness.drain();
        assert!(sent_to(&messages, BOB).is_empty());
        assert_eq!(master_id(&harness.session), Some(ALICE));
    }

    #[test]
    fn test_join_broadcasts_roster_with_fresh_player() {
        let mut harness = Harness::new();
        harness.session.join(ALICE, "  Alice  ");

        let messages = harness.drain();
        assert_eq!(
            broadcasts(&messages)[0],
            ServerEvent::RosterUpdate {
                players: vec![PlayerSummary {
                    id: ALICE,
                    name: "Alice".to_string(),
                    score: 0,
                    guesses: STARTING_GUESSES,
                }],
                master_id: Some(ALICE),
            }
        );
    }

    #[test]
    fn test_join_without_name_is_ignored() {
        let mut harness = Harness::new();

        assert_eq!(harness.session.join(ALICE, ""), Outcome::Ignored);
        assert_eq!(harness.session.join(ALICE, "   \t"), Outcome::Ignored);
        assert!(harness.drain().is_empty());
        assert!(harness.session.players().is_empty());
    }

    #[test]
    fn test_join_twice_is_rejected() {
        let mut harness = Harness::new();
        harness.session.join(ALICE, "Alice");

        let outcome = harness.session.join(ALICE, "Alice again");
        assert_eq!(outcome, Outcome::Rejected(Rejection::AlreadyJoined));
        assert_eq!(Rejection::AlreadyJoined.kind(), ErrorKind::Precondition);
        assert_eq!(harness.session.players().len(), 1);
    }

    #[test]
    fn test_leave_unknown_is_ignored() {
        let mut harness = Harness::with_three_players();
        assert_eq!(harness.session.leave(99), Outcome::Ignored);
        assert!(harness.drain().is_empty());
    }

    #[test]
    fn test_leave_of_last_position_master_wraps_to_first() {
        let mut harness = Harness::with_three_players();
        harness.session.master_index = 2;

        assert_eq!(harness.session.leave(CAROL), Outcome::Applied);
        assert_eq!(master_id(&harness.session), Some(ALICE));

        let events = broadcasts(&harness.drain());
        assert_eq!(events[0], ServerEvent::notice("Carol has left the game"));
        assert!(matches!(
            events[1],
            ServerEvent::RosterUpdate {
                master_id: Some(ALICE),
                ..
            }
        ));
    }

    #[test]
    fn test_leave_keeps_index_even_when_identity_shifts() {
        let mut harness = Harness::with_three_players();
        harness.session.master_index = 1;

        // Removing a player ahead of the master moves the role to Carol
        harness.session.leave(ALICE);
        assert_eq!(harness.session.master_index(), 1);
        assert_eq!(master_id(&harness.session), Some(CAROL));
    }

    #[test]
    fn test_master_leaving_hands_role_to_same_position() {
        let mut harness = Harness::with_three_players();

        harness.session.leave(ALICE);
        assert_eq!(master_id(&harness.session), Some(BOB));
    }

    #[test]
    fn test_set_question_requires_master() {
        let mut harness = Harness::with_three_players();

        let outcome = harness.session.set_question(BOB, "2+2", "4");
        assert_eq!(outcome, Outcome::Rejected(Rejection::NotMasterSetQuestion));
        assert_eq!(Rejection::NotMasterSetQuestion.kind(), ErrorKind::Authorization);

        let outcome = harness.session.set_question(99, "2+2", "4");
        assert_eq!(outcome, Outcome::Rejected(Rejection::NotMasterSetQuestion));
        assert_eq!(harness.session.question(), None);
    }

    #[test]
    fn test_set_question_requires_both_fields() {
        let mut harness = Harness::with_three_players();

        for (question, answer) in [("", "4"), ("2+2", ""), ("  ", "4"), ("2+2", "  ")] {
            assert_eq!(
                harness.session.set_question(ALICE, question, answer),
                Outcome::Rejected(Rejection::MissingQuestionOrAnswer)
            );
        }
        assert_eq!(
            Rejection::MissingQuestionOrAnswer.kind(),
            ErrorKind::Validation
        );
        assert!(harness.drain().is_empty());
    }

    #[test]
    fn test_set_question_normalizes_answer() {
        let mut harness = Harness::with_three_players();

        let outcome = harness
            .session
            .set_question(ALICE, "  Capital of France? ", " PaRiS ");
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(harness.session.question(), Some("  Capital of France? "));
        assert_eq!(harness.session.answer(), Some("paris"));
        assert!(!harness.session.is_round_active());

        let events = broadcasts(&harness.drain());
        assert_eq!(events[0], ServerEvent::notice("Game master created a question"));
        assert!(matches!(events[1], ServerEvent::RosterUpdate { .. }));
    }

    #[test]
    fn test_start_round_needs_three_players() {
        let mut harness = Harness::new();
        harness.session.join(ALICE, "Alice");
        harness.session.join(BOB, "Bob");
        harness.session.set_question(ALICE, "2+2", "4");

        assert_eq!(
            harness.session.start_round(ALICE, Some(5)),
            Outcome::Rejected(Rejection::NotEnoughPlayers(MIN_PLAYERS_TO_START))
        );
        assert!(!harness.session.is_round_active());
        assert!(!harness.session.timers_armed());
        assert_eq!(
            Rejection::NotEnoughPlayers(3).to_string(),
            "To start game, at least 3 players are needed"
        );
    }

    #[test]
    fn test_start_round_needs_question() {
        let mut harness = Harness::with_three_players();
        assert_eq!(
            harness.session.start_round(ALICE, None),
            Outcome::Rejected(Rejection::NoQuestion)
        );
    }

    #[test]
    fn test_start_round_requires_master() {
        let mut harness = Harness::with_three_players();
        harness.session.set_question(ALICE, "2+2", "4");
        assert_eq!(
            harness.session.start_round(CAROL, None),
            Outcome::Rejected(Rejection::NotMasterStartRound)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_round_arms_timers_and_resets_guesses() {
        let mut harness = Harness::with_three_players();
        harness.session.players[1].guesses = 0;
        harness.session.set_question(ALICE, "2+2", "4");
        harness.drain();

        assert_eq!(harness.session.start_round(ALICE, Some(5)), Outcome::Applied);
        assert!(harness.session.is_round_active());
        assert!(harness.session.timers_armed());
        assert_eq!(harness.session.time_remaining(), 5);
        assert!(harness
            .session
            .players()
            .iter()
            .all(|player| player.guesses == STARTING_GUESSES));

        let events = broadcasts(&harness.drain());
        assert!(matches!(events[0], ServerEvent::RosterUpdate { .. }));
        assert_eq!(
            events[1],
            ServerEvent::RoundStarted {
                question: "2+2".to_string(),
                time_limit: 5,
                master_id: ALICE,
                master_name: "Alice".to_string(),
            }
        );

        // A second start while running is a silent no-op
        assert_eq!(harness.session.start_round(ALICE, Some(9)), Outcome::Ignored);
        assert_eq!(harness.session.time_limit(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_limit_override_carries_into_later_rounds() {
        let mut harness = Harness::with_three_players();

        harness.start_round(ALICE, 0);
        assert_eq!(harness.session.time_limit(), DEFAULT_TIME_LIMIT_SECS);
        harness.session.deadline_elapsed();

        harness.start_round(BOB, 15);
        assert_eq!(harness.session.time_limit(), 15);
        harness.session.deadline_elapsed();

        harness.session.set_question(CAROL, "1+1", "2");
        harness.drain();
        assert_eq!(harness.session.start_round(CAROL, None), Outcome::Applied);
        assert_eq!(harness.session.time_limit(), 15);
        assert_eq!(harness.session.time_remaining(), 15);
        assert!(broadcasts(&harness.drain()).contains(&ServerEvent::RoundStarted {
            question: "1+1".to_string(),
            time_limit: 15,
            master_id: CAROL,
            master_name: "Carol".to_string(),
        }));
        harness.session.deadline_elapsed();

        // Zero is not an override either
        harness.start_round(ALICE, 0);
        assert_eq!(harness.session.time_limit(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_question_rejected_during_round() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 5);

        assert_eq!(
            harness.session.set_question(ALICE, "3+3", "6"),
            Outcome::Rejected(Rejection::RoundInProgress)
        );
        assert_eq!(harness.session.answer(), Some("4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_correct_guess_wins_round() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 5);

        assert_eq!(harness.session.submit_guess(BOB, "  4 "), Outcome::Applied);

        let bob = harness.session.player(BOB).cloned().unwrap();
        assert_eq!(bob.score, POINTS_PER_CORRECT);
        assert_eq!(bob.guesses, STARTING_GUESSES - 1);
        assert_eq!(harness.session.player(CAROL).unwrap().score, 0);
        assert_eq!(master_id(&harness.session), Some(BOB));
        assert_round_inactive(&harness.session);

        let events = broadcasts(&harness.drain());
        assert!(matches!(events[0], ServerEvent::RosterUpdate { .. }));
        assert_eq!(events[1], ServerEvent::notice("Bob guessed correctly!"));
        assert_eq!(
            events[2],
            ServerEvent::RoundWon {
                winner_name: "Bob".to_string(),
                answer: "4".to_string(),
                scores: vec![
                    ScoreEntry {
                        name: "Alice".to_string(),
                        score: 0
                    },
                    ScoreEntry {
                        name: "Bob".to_string(),
                        score: 10
                    },
                    ScoreEntry {
                        name: "Carol".to_string(),
                        score: 0
                    },
                ],
            }
        );
        assert!(matches!(
            events[3],
            ServerEvent::RosterUpdate {
                master_id: Some(BOB),
                ..
            }
        ));
        assert_eq!(
            events[4],
            ServerEvent::MasterChanged {
                master_id: Some(BOB),
                master_name: Some("Bob".to_string()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_guess_matching_ignores_case() {
        let mut harness = Harness::with_three_players();
        harness.session.set_question(ALICE, "Capital of France?", "Paris");
        harness.session.start_round(ALICE, Some(30));

        harness.session.submit_guess(CAROL, "PARIS");
        assert_eq!(harness.session.player(CAROL).unwrap().score, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_guess_is_private_and_spends_a_guess() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 5);

        assert_eq!(harness.session.submit_guess(BOB, "5"), Outcome::Applied);
        let messages = harness.drain();

        assert_eq!(
            sent_to(&messages, BOB),
            vec![ServerEvent::private_notice("Wrong. Guesses left: 2")]
        );
        let events = broadcasts(&messages);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::RosterUpdate { .. }));
        assert!(harness.session.is_round_active());
        assert_eq!(harness.session.player(BOB).unwrap().score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_guessers_exhausted_ends_round() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 5);

        for _ in 0..STARTING_GUESSES {
            harness.session.submit_guess(BOB, "wrong");
        }
        for _ in 0..STARTING_GUESSES - 1 {
            harness.session.submit_guess(CAROL, "wrong");
        }
        assert!(harness.session.is_round_active());
        harness.drain();

        harness.session.submit_guess(CAROL, "still wrong");
        let events = broadcasts(&harness.drain());

        assert!(events.contains(&ServerEvent::notice(
            "All players have exhausted guesses. Game over."
        )));
        assert!(events.contains(&ServerEvent::AnswerRevealed {
            answer: "4".to_string()
        }));
        assert_eq!(
            events.last(),
            Some(&ServerEvent::MasterChanged {
                master_id: Some(BOB),
                master_name: Some("Bob".to_string()),
            })
        );
        assert_round_inactive(&harness.session);
        assert!(harness.session.players().iter().all(|p| p.score == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guess_rejections() {
        let mut harness = Harness::with_three_players();

        assert_eq!(
            harness.session.submit_guess(BOB, "4"),
            Outcome::Rejected(Rejection::RoundNotActive)
        );

        harness.start_round(ALICE, 5);

        assert_eq!(
            harness.session.submit_guess(99, "4"),
            Outcome::Rejected(Rejection::UnknownPlayer)
        );
        assert_eq!(Rejection::UnknownPlayer.kind(), ErrorKind::NotFound);

        assert_eq!(
            harness.session.submit_guess(ALICE, "4"),
            Outcome::Rejected(Rejection::MasterCannotGuess)
        );

        for _ in 0..STARTING_GUESSES {
            harness.session.submit_guess(BOB, "nope");
        }
        assert_eq!(
            harness.session.submit_guess(BOB, "4"),
            Outcome::Rejected(Rejection::NoGuessesLeft)
        );
        assert_eq!(harness.session.player(BOB).unwrap().guesses, 0);
        assert_eq!(harness.session.player(BOB).unwrap().score, 0);
        assert!(harness.session.is_round_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_is_round_robin() {
        let mut harness = Harness::with_three_players();
        let mut masters = vec![master_id(&harness.session)];

        for _ in 0..3 {
            let master = master_id(&harness.session).unwrap();
            harness.start_round(master, 5);
            harness.session.deadline_elapsed();
            masters.push(master_id(&harness.session));
        }

        assert_eq!(
            masters,
            vec![Some(ALICE), Some(BOB), Some(CAROL), Some(ALICE)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_once() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 1);
        let started = tokio::time::Instant::now();

        let mut deadlines = 0;
        while harness.session.is_round_active() {
            match harness.server_rx.recv().await {
                Some(ServerMessage::RoundTimer(event)) => {
                    if event.kind == TimerKind::Deadline {
                        deadlines += 1;
                    }
                    harness.session.on_timer(event);
                }
                other => panic!("Unexpected message {:?}", other),
            }
        }
        assert_eq!(deadlines, 1);
        assert!(started.elapsed() >= Duration::from_secs(1));

        let events = broadcasts(&harness.drain());
        assert!(events.contains(&ServerEvent::notice("Time is up! No winner.")));
        assert!(events.contains(&ServerEvent::AnswerRevealed {
            answer: "4".to_string()
        }));
        assert_eq!(master_id(&harness.session), Some(BOB));
        assert_round_inactive(&harness.session);

        tokio::time::sleep(Duration::from_secs(3)).await;
        while let Ok(message) = harness.server_rx.try_recv() {
            if let ServerMessage::RoundTimer(event) = message {
                assert_ne!(event.kind, TimerKind::Deadline);
                assert_eq!(harness.session.on_timer(event), Outcome::Ignored);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_count_down() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 2);

        assert_eq!(harness.session.tick_elapsed(), Outcome::Applied);
        assert_eq!(harness.session.time_remaining(), 1);
        harness.session.tick_elapsed();
        harness.session.tick_elapsed();
        assert_eq!(harness.session.time_remaining(), 0);

        let events = broadcasts(&harness.drain());
        assert_eq!(
            events,
            vec![
                ServerEvent::Tick { time_remaining: 1 },
                ServerEvent::Tick { time_remaining: 0 },
                ServerEvent::Tick { time_remaining: 0 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_events_are_ignored() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 5);
        let old_round = harness.session.round();
        harness.session.submit_guess(BOB, "4");

        harness.start_round(BOB, 5);
        harness.drain();

        let stale = TimerEvent {
            round: old_round,
            kind: TimerKind::Deadline,
        };
        assert_eq!(harness.session.on_timer(stale), Outcome::Ignored);
        assert!(harness.session.is_round_active());
        assert!(harness.drain().is_empty());
    }

    #[test]
    fn test_timer_events_ignored_when_idle() {
        let mut harness = Harness::with_three_players();
        let event = TimerEvent {
            round: 0,
            kind: TimerKind::Tick,
        };
        assert_eq!(harness.session.on_timer(event), Outcome::Ignored);
        assert_eq!(harness.session.deadline_elapsed(), Outcome::Ignored);
        assert_eq!(harness.session.tick_elapsed(), Outcome::Ignored);
        assert!(harness.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_player_leaving_forces_idle() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 5);

        harness.session.leave(BOB);
        harness.session.leave(CAROL);
        assert!(harness.session.is_round_active());

        harness.session.leave(ALICE);
        assert_round_inactive(&harness.session);
        assert_eq!(harness.session.master_index(), 0);
        assert!(harness.session.master().is_none());

        assert_eq!(harness.session.join(BOB, "Bob"), Outcome::Applied);
        assert_eq!(
            sent_to(&harness.drain(), BOB),
            vec![ServerEvent::BecameMaster {}]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_master_leaving_mid_round_hands_role_to_a_guesser() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 30);

        assert_eq!(harness.session.submit_guess(BOB, "5"), Outcome::Applied);
        assert_eq!(harness.session.leave(ALICE), Outcome::Applied);

        // Bob sits at Alice's old position and inherits the role mid-round
        assert!(harness.session.is_round_active());
        assert!(harness.session.timers_armed());
        assert_eq!(master_id(&harness.session), Some(BOB));
        assert_eq!(harness.session.player(BOB).map(|p| p.guesses), Some(2));
        assert_eq!(
            harness.session.submit_guess(BOB, "4"),
            Outcome::Rejected(Rejection::MasterCannotGuess)
        );
        assert_eq!(harness.session.player(BOB).map(|p| p.score), Some(0));

        // Bob's unspent guesses no longer count, so Carol alone can end it
        assert_eq!(harness.session.submit_guess(CAROL, "1"), Outcome::Applied);
        assert_eq!(harness.session.submit_guess(CAROL, "2"), Outcome::Applied);
        assert!(harness.session.is_round_active());
        harness.drain();

        assert_eq!(harness.session.submit_guess(CAROL, "3"), Outcome::Applied);
        assert_round_inactive(&harness.session);

        let events = broadcasts(&harness.drain());
        assert!(events.contains(&ServerEvent::notice(
            "All players have exhausted guesses. Game over."
        )));
        assert!(events.contains(&ServerEvent::AnswerRevealed {
            answer: "4".to_string()
        }));
        assert_eq!(
            events.last(),
            Some(&ServerEvent::MasterChanged {
                master_id: Some(CAROL),
                master_name: Some("Carol".to_string()),
            })
        );
    }

    #[test]
    fn test_request_state_when_idle_sends_only_roster() {
        let mut harness = Harness::with_three_players();

        assert_eq!(harness.session.request_state(CAROL), Outcome::Applied);
        let messages = harness.drain();

        assert!(broadcasts(&messages).is_empty());
        let events = sent_to(&messages, CAROL);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ServerEvent::RosterUpdate {
                master_id: Some(ALICE),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_state_during_round_resends_round() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 30);
        harness.session.tick_elapsed();
        harness.drain();

        // Spectators that have not joined may resync too
        harness.session.request_state(42);
        let messages = harness.drain();

        assert!(broadcasts(&messages).is_empty());
        let events = sent_to(&messages, 42);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            ServerEvent::RoundStarted {
                question: "2+2".to_string(),
                time_limit: 30,
                master_id: ALICE,
                master_name: "Alice".to_string(),
            }
        );
        assert_eq!(events[2], ServerEvent::Tick { time_remaining: 29 });
        assert_eq!(harness.session.time_remaining(), 29);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_returns_to_empty_idle() {
        let mut harness = Harness::with_three_players();
        harness.start_round(ALICE, 5);
        assert_eq!(harness.session.time_limit(), 5);

        harness.session.reset();

        assert!(harness.session.players().is_empty());
        assert!(harness.session.master().is_none());
        assert_round_inactive(&harness.session);
        assert_eq!(harness.session.time_limit(), DEFAULT_TIME_LIMIT_SECS);
        assert!(harness.drain().is_empty());
    }

    #[test]
    fn test_zero_default_time_limit_is_raised() {
        let (game_tx, _game_rx) = mpsc::unbounded_channel();
        let (server_tx, _server_rx) = mpsc::unbounded_channel();
        let session = Session::new(
            SessionConfig {
                default_time_limit: 0,
            },
            game_tx,
            server_tx,
        );
        assert_eq!(session.time_limit(), 1);
    }

    #[test]
    fn test_master_index_valid_under_random_churn() {
        let mut rng = StdRng::seed_from_u64(0x7121);
        let mut harness = Harness::new();
        let mut next_id: ClientId = 1;

        for _ in 0..2_000 {
            let players = harness.session.players().len();
            if players == 0 || rng.gen_bool(0.55) {
                harness.session.join(next_id, &format!("player-{}", next_id));
                next_id += 1;
            } else {
                let victim = harness.session.players()[rng.gen_range(0..players)].id;
                harness.session.leave(victim);
            }

            let players = harness.session.players().len();
            if players > 0 {
                assert!(harness.session.master_index() < players);
                assert!(harness.session.master().is_some());
            } else {
                assert_eq!(harness.session.master_index(), 0);
            }
            harness.drain();
        }
    }
}
