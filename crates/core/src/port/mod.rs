// Port Layer - Interfaces for external dependencies

pub mod item_store;
pub mod time_provider;
pub mod token_provider;

// Re-exports
pub use item_store::{FieldPatch, ItemFilter, ItemStore};
pub use time_provider::TimeProvider;
pub use token_provider::TokenProvider;
