//! Tontine CLI - command orchestration
//!
//! Wires the validation workflow to a local SQLite store, a file-backed
//! resource directory, console delivery and a JSONL audit trail.

pub mod commands;
pub mod context;
pub mod directory;

pub use context::AppContext;
pub use directory::FileDirectory;
