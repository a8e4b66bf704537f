//! Parameter types shared by the domain wrappers.

use serde::{Deserialize, Serialize};

/// Message target: one nick/channel, or several at once.
///
/// Serializes as a plain string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Single(String),
    Multiple(Vec<String>),
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Target::Single(value.to_string())
    }
}

impl From<String> for Target {
    fn from(value: String) -> Self {
        Target::Single(value)
    }
}

impl From<Vec<String>> for Target {
    fn from(value: Vec<String>) -> Self {
        Target::Multiple(value)
    }
}

impl From<&[&str]> for Target {
    fn from(value: &[&str]) -> Self {
        Target::Multiple(value.iter().map(|s| s.to_string()).collect())
    }
}

/// Severity accepted by `log.send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Advice,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Advice => "advice",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}
