//! Task execution
//!
//! Command construction per task type, recursive dependency runs and the
//! runner that ties a task to a process.

pub mod command;
pub mod dependencies;
pub mod runner;

pub use command::{BuiltCommand, CommandBuilder};
pub use dependencies::DependsOrder;
pub use runner::{TaskRunner, TaskRunnerConfig};
