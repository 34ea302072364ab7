//! Countdown and deadline timers for an active round.
//!
//! Timers never touch the session directly. Each one posts a
//! [`ServerMessage::RoundTimer`] into the server's inbound queue, so timer
//! handling is serialized with client commands in the main loop. Every event
//! carries the round generation it was armed for, which lets the session drop
//! events that were already queued when their round ended.

use crate::network::ServerMessage;
use log::debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Interval between countdown ticks
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Tick,
    Deadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub round: u64,
    pub kind: TimerKind,
}

/// Handles for the periodic tick and the one-shot deadline of one round
pub struct RoundTimers {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    tick: Option<JoinHandle<()>>,
    deadline: Option<JoinHandle<()>>,
}

impl RoundTimers {
    pub fn new(server_tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            server_tx,
            tick: None,
            deadline: None,
        }
    }

    /// Starts both timers for `round`, replacing any that are still running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self, round: u64, limit: Duration) {
        self.cancel();

        let tick_tx = self.server_tx.clone();
        self.tick = Some(tokio::spawn(async move {
            let mut ticker = interval(TICK_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Skip the first tick since it fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let event = TimerEvent {
                    round,
                    kind: TimerKind::Tick,
                };
                if tick_tx.send(ServerMessage::RoundTimer(event)).is_err() {
                    break;
                }
            }
        }));

        let deadline_tx = self.server_tx.clone();
        self.deadline = Some(tokio::spawn(async move {
            sleep(limit).await;
            let event = TimerEvent {
                round,
                kind: TimerKind::Deadline,
            };
            if deadline_tx.send(ServerMessage::RoundTimer(event)).is_err() {
                debug!("Server loop gone before round {} deadline", round);
            }
        }));

        debug!("Armed timers for round {} ({:?})", round, limit);
    }

    /// Aborts both timers. Safe to call when nothing is armed.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.tick.take() {
            handle.abort();
        }
        if let Some(handle) = self.deadline.take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.tick.is_some() || self.deadline.is_some()
    }
}

impl Drop for RoundTimers {
    fn drop(&mut self) {
        self.cancel();
    }
}
