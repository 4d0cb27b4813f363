//! Configuration model
//!
//! Parsing for `.vscode/tasks.json` (tasks and inputs) and the editor
//! settings consulted when building package-manager commands.

pub mod jsonc;
pub mod settings;
pub mod tasks;
