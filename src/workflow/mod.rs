//! Presentation generation on top of the tool server client.
//!
//! - `content`: slide text and its sources.
//! - `session`: advisory identifiers parsed from tool output.
//! - `orchestrator`: the primary and fallback build sequences.
//! - `downloads`: generated file names and safe lookup.

pub mod content;
pub mod downloads;
pub mod orchestrator;
pub mod session;

pub use orchestrator::{Orchestrator, WorkflowResult, WorkflowSettings, WorkflowStage};
