#![forbid(unsafe_code)]

//! `deck-forge`: builds slide decks by driving an MCP PowerPoint tool server
//! over its stdio pipes.

pub mod config;
pub mod errors;
pub mod toolserver;
pub mod workflow;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
