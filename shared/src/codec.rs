//! Frame encoding for both wire formats.
//!
//! Text frames carry JSON, binary frames carry bincode. Inbound JSON commands
//! go through [`decode_command_text`], which accepts the loosely typed
//! payloads browser clients tend to produce before handing them to serde.

use crate::ClientCommand;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// How a connection's frames are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    Bincode,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed JSON frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed binary frame: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("unrecognised command: {0}")]
    UnknownCommand(String),
}

pub fn encode_text<T: Serialize>(message: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_binary<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serialize(message)?)
}

pub fn decode_binary<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    Ok(bincode::deserialize(data)?)
}

/// Decodes a JSON command, coercing loose payloads first.
///
/// - `"leave"` and `"requestState"` may be sent as bare strings.
/// - `join` may carry the name directly instead of `{"name": ..}`.
/// - a missing or non-string `join` name, `setQuestion` question or answer, or
///   `submitGuess` guess becomes `""`.
/// - `startRound.timeLimit` may be a number or numeric string; fractions round
///   up to whole seconds and anything non-positive means "use the default".
pub fn decode_command_text(text: &str) -> Result<ClientCommand, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let value = normalize_command(value)?;
    Ok(serde_json::from_value(value)?)
}

fn normalize_command(value: Value) -> Result<Value, CodecError> {
    let (tag, body) = match value {
        Value::String(tag) => (tag, Value::Null),
        Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
            Some(entry) => entry,
            None => return Err(CodecError::UnknownCommand("{}".to_string())),
        },
        other => return Err(CodecError::UnknownCommand(other.to_string())),
    };

    let body = match tag.as_str() {
        "join" => {
            let name = match body {
                Value::String(name) => name,
                Value::Object(mut fields) => text_or_empty(fields.remove("name")),
                _ => String::new(),
            };
            json!({ "name": name })
        }
        "setQuestion" => {
            let mut fields = match body {
                Value::Object(fields) => fields,
                _ => Map::new(),
            };
            json!({
                "question": text_or_empty(fields.remove("question")),
                "answer": text_or_empty(fields.remove("answer"))
            })
        }
        "startRound" => {
            let raw = match body {
                Value::Object(mut fields) => fields.remove("timeLimit").unwrap_or(Value::Null),
                other => other,
            };
            json!({ "timeLimit": normalize_time_limit(&raw) })
        }
        "submitGuess" => {
            let raw = match body {
                Value::Object(mut fields) => fields.remove("guess").unwrap_or(Value::Null),
                other => other,
            };
            json!({ "guess": text_or_empty(Some(raw)) })
        }
        "leave" | "requestState" => Value::Object(Map::new()),
        _ => return Err(CodecError::UnknownCommand(tag)),
    };

    let mut normalized = Map::new();
    normalized.insert(tag, body);
    Ok(Value::Object(normalized))
}

/// Missing or non-string fields become empty text, which the session
/// treats as absent.
fn text_or_empty(value: Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text,
        _ => String::new(),
    }
}

fn normalize_time_limit(raw: &Value) -> Option<u32> {
    let seconds = match raw {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if seconds.is_finite() && seconds > 0.0 {
        Some(seconds.ceil().min(u32::MAX as f64) as u32)
    } else {
        None
    }
}
