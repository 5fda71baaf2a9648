//! Environment Module
//!
//! Checks that the external programs the transcription pipeline shells out
//! to are installed.

pub mod tools;

pub use tools::{check_tool, require_tools, MissingTools};
