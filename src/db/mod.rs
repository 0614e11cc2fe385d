//! SQLite-backed seen-entry store.

pub mod core;
mod schema;
mod seen;

pub use self::core::Database;
pub use self::seen::SeenStore;
