// Domain Layer - Pure business logic and entities

pub mod error;
pub mod item;

// Re-exports
pub use error::DomainError;
pub use item::{Item, ItemState};
