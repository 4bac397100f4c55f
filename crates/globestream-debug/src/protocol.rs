//! Debug protocol - JSON command/response definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Commands sent by a debug client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum DebugCommand {
    /// Health check
    Ping,
    /// Engine statistics of the last tick
    GetStatistics,
    /// Current engine options
    GetOptions,
    /// Merge the given fields into the engine options
    SetOptions { options: serde_json::Value },
    /// State of one cached resource
    GetResource { name: String },
    /// Reset the traverse trees, keeping cached resources
    PurgeViewCache,
}

/// Responses from debug server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum DebugResponse {
    #[serde(rename = "ok")]
    Ok { data: ResponseData },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response data variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    Pong { message: String },
    Statistics { statistics: serde_json::Value },
    Options { options: serde_json::Value },
    Resource(ResourceInfo),
    ParamsUpdated { description: String },
    None,
}

/// Snapshot of one cached resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub name: String,
    pub kind: String,
    pub state: String,
    pub priority: f64,
    pub ram_cost: usize,
    pub gpu_cost: usize,
    pub last_access_tick: u32,
    pub blacklisted: bool,
}

/// A command line that could not be handled
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid command JSON: {0}")]
    InvalidCommand(#[from] serde_json::Error),
}

impl DebugCommand {
    /// Parse one command line
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

impl DebugResponse {
    pub fn ok(data: ResponseData) -> Self {
        Self::Ok { data }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error {
            message: msg.into(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(ResponseData::Pong {
            message: "pong".into(),
        })
    }

    pub fn none() -> Self {
        Self::ok(ResponseData::None)
    }
}
