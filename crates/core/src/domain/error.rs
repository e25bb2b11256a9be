// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Resolve was called with a non-terminal target state. This is a
    /// worker bug, not a recoverable queue condition.
    #[error("Resolve requires a terminal state (SUCCESS or ERROR), got {0}")]
    NonTerminalResolve(String),

    #[error("Unknown item state: {0}")]
    UnknownState(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
