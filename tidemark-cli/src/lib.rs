//! # tidemark-cli
//!
//! The `tidemark` command-line binary: migrate, validate, repair, erase
//! and info over a PostgreSQL or SQLite database.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
