// Item Domain Model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::DomainError;

/// Item lifecycle state.
///
/// Permitted transitions: PENDING -> IN_PROGRESS (claim),
/// IN_PROGRESS -> SUCCESS/ERROR (resolve), and any state -> PENDING
/// (re-enqueue). Everything else is rejected at the store level by
/// state-guarded updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Pending,
    InProgress,
    Success,
    Error,
}

impl ItemState {
    /// SUCCESS and ERROR are the terminal outcomes of processing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Success | ItemState::Error)
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemState::Pending => write!(f, "PENDING"),
            ItemState::InProgress => write!(f, "IN_PROGRESS"),
            ItemState::Success => write!(f, "SUCCESS"),
            ItemState::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for ItemState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ItemState::Pending),
            "IN_PROGRESS" => Ok(ItemState::InProgress),
            "SUCCESS" => Ok(ItemState::Success),
            "ERROR" => Ok(ItemState::Error),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// A unit of crawl work.
///
/// Identity is the pair `(configuration, identifier)`: `configuration` names
/// the crawl configuration that owns the item, `identifier` is unique within
/// it (typically a URL or resource key). At most one row exists per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub configuration: String,
    pub identifier: String,
    pub state: ItemState,

    /// Diagnostic text, set on resolution and cleared on re-enqueue.
    pub message: String,

    /// Opaque payload carried through to the worker. Serialized at the
    /// store boundary only, never inspected by the queue.
    pub data: serde_json::Value,

    /// Claim token correlating an IN_PROGRESS row to the claim that took
    /// it. Non-empty if and only if the item is IN_PROGRESS.
    pub hash: String,

    /// Epoch seconds of the last enqueue. Claims and resolutions leave it
    /// untouched, so pending items drain in discovery order and stuck
    /// IN_PROGRESS rows can be spotted by age.
    pub timestamp: i64,
}

impl Item {
    /// Create a fresh PENDING item for enqueueing. The timestamp is
    /// stamped by the queue at enqueue time, not here.
    pub fn new(
        configuration: impl Into<String>,
        identifier: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            configuration: configuration.into(),
            identifier: identifier.into(),
            state: ItemState::Pending,
            message: String::new(),
            data,
            hash: String::new(),
            timestamp: 0,
        }
    }

    /// A SUCCESS-state value for passing to `QueueManager::resolve`.
    pub fn succeeded(
        configuration: impl Into<String>,
        identifier: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::terminal(configuration, identifier, ItemState::Success, message)
    }

    /// An ERROR-state value for passing to `QueueManager::resolve`.
    pub fn failed(
        configuration: impl Into<String>,
        identifier: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::terminal(configuration, identifier, ItemState::Error, message)
    }

    fn terminal(
        configuration: impl Into<String>,
        identifier: impl Into<String>,
        state: ItemState,
        message: impl Into<String>,
    ) -> Self {
        Self {
            configuration: configuration.into(),
            identifier: identifier.into(),
            state,
            message: message.into(),
            data: serde_json::Value::Object(serde_json::Map::new()),
            hash: String::new(),
            timestamp: 0,
        }
    }
}
