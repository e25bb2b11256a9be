// crawlq Infrastructure - SQLite Adapter
// Implements: ItemStore

mod connection;
mod item_store;
mod migration;

pub use connection::create_pool;
pub use item_store::SqliteItemStore;
pub use migration::run_migrations;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
