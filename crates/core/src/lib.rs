//! vstask Core Library
//!
//! Runs the tasks of an editor `.vscode/tasks.json` outside the editor:
//! dependency graphs in sequence or in parallel, `${...}` variables and
//! `${input:...}` prompts, shell/process/npm command construction, PTY or
//! plain stdio launch with process-tree cleanup, and readiness detection for
//! background tasks.
//!
//! ## Architecture
//!
//! - [`workspace_manager`] - High-level interface used by the CLI
//! - [`execution`] - Command construction, dependency runs and the task runner
//! - [`process`] - Process launch, PTY sessions, signals and readiness
//! - [`inputs`] - `${input:id}` resolution and prompting
//! - [`variables`] - Built-in `${name}` variables
//! - [`platform`] - OS detection and per-platform task overrides
//! - [`workspace`] - Project root discovery and the dependency graph
//! - [`task_execution`] - Dry-run execution plans
//! - [`tasks`] - Label index and label colors
//! - [`configs`] - `tasks.json` model, JSONC reading and editor settings
//! - [`results`] - Result types for workspace operations
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vstask_core::execution::TaskRunnerConfig;
//! use vstask_core::workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> vstask_core::types::VstaskResult<()> {
//! let manager = WorkspaceManager::new(WorkspaceManagerConfig {
//!     start_dir: PathBuf::from("."),
//! })?;
//!
//! manager.run_task("build", TaskRunnerConfig::from_env()).await?;
//! # Ok(())
//! # }
//! ```

pub mod configs;
pub mod execution;
pub mod inputs;
pub mod platform;
pub mod process;
pub mod results;
pub mod task_execution;
pub mod tasks;
pub mod types;
pub mod variables;
pub mod workspace;
pub mod workspace_manager;

pub use types::{VstaskError, VstaskResult};
pub use workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};
