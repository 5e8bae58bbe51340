//! # tidemark-sqlite
//!
//! SQLite driver for the Tidemark migration engine.
//!
//! SQLite is a single-file database: the engine manages the `main` schema
//! only, erase drops every user object, and the application lock degrades
//! to the history table lock row (there is no server to hold an advisory
//! lock on). Useful in production for embedded databases and in tests as
//! a real-database harness that needs no server.

pub mod driver;
pub mod error;
pub mod statement;
pub mod store;

pub use driver::{SqliteDriver, MAIN_SCHEMA};
pub use error::{SqliteError, SqliteResult};
pub use store::SqliteMetadataStore;
