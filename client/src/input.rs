//! Turns lines typed at the terminal into protocol commands

use shared::ClientCommand;
use thiserror::Error;

pub const HELP_TEXT: &str = "\
Commands:
  /join NAME              join the game
  /question Q | A         set the question and answer (game master only, alias /q)
  /start [SECONDS]        start the round (game master only)
  /state                  ask for the roster and current round
  /leave                  leave the game
  /quit                   disconnect and exit
  /help                   show this text
Anything else is sent as a guess.";

/// What the terminal loop should do with a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Send(ClientCommand),
    Help,
    Quit,
    /// Blank line
    Nothing,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("usage: /join NAME")]
    MissingName,
    #[error("usage: /question QUESTION | ANSWER")]
    MissingAnswer,
    #[error("round length must be a whole number of seconds, got '{0}'")]
    BadTimeLimit(String),
    #[error("unknown command '/{0}', type /help for a list")]
    UnknownCommand(String),
}

pub fn parse_line(line: &str) -> Result<InputAction, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(InputAction::Nothing);
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(InputAction::Send(ClientCommand::SubmitGuess {
            guess: line.to_string(),
        }));
    };

    let (word, args) = match rest.split_once(char::is_whitespace) {
        Some((word, args)) => (word, args.trim()),
        None => (rest, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "join" => {
            if args.is_empty() {
                return Err(InputError::MissingName);
            }
            ClientCommand::Join {
                name: args.to_string(),
            }
        }
        "question" | "q" => {
            let (question, answer) = args.split_once('|').ok_or(InputError::MissingAnswer)?;
            ClientCommand::SetQuestion {
                question: question.trim().to_string(),
                answer: answer.trim().to_string(),
            }
        }
        "start" => {
            let time_limit = if args.is_empty() {
                None
            } else {
                let seconds = args
                    .parse::<u32>()
                    .map_err(|_| InputError::BadTimeLimit(args.to_string()))?;
                Some(seconds).filter(|&s| s > 0)
            };
            ClientCommand::StartRound { time_limit }
        }
        "state" => ClientCommand::RequestState {},
        "leave" => ClientCommand::Leave {},
        "help" => return Ok(InputAction::Help),
        "quit" | "exit" => return Ok(InputAction::Quit),
        _ => return Err(InputError::UnknownCommand(word.to_string())),
    };

    Ok(InputAction::Send(command))
}
