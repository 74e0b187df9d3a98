//! The `{code, msg, data}` wrapper the backend puts around every JSON body.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ErrorCode;

/// Envelope code meaning success.
pub const SUCCESS_CODE: &str = "0";

/// Envelope code meaning the session is no longer valid.
pub const UNAUTHORIZED_CODE: &str = "401";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    #[serde(deserialize_with = "code_as_string")]
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: T,
}

/// What an envelope says about the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Unauthorized,
    Failure(ErrorCode),
}

impl<T> Envelope<T> {
    pub fn outcome(&self) -> Outcome {
        match self.code.trim() {
            SUCCESS_CODE => Outcome::Success,
            UNAUTHORIZED_CODE => Outcome::Unauthorized,
            other => Outcome::Failure(ErrorCode::from_app_code(other)),
        }
    }

    /// The server message, if it sent a non-blank one.
    pub fn message(&self) -> Option<&str> {
        let msg = self.msg.trim();
        if msg.is_empty() { None } else { Some(msg) }
    }
}

impl Envelope<Value> {
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}

/// Some backends send the code as a number; normalize it to its string form.
fn code_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(code) => Ok(code),
        Value::Number(code) => Ok(code.to_string()),
        other => Err(de::Error::custom(format!(
            "envelope code must be a string or number, got {}",
            other
        ))),
    }
}
