//! Task dependency orchestration
//!
//! Dependencies are resolved depth first. Every label entered during one root
//! run is recorded in a single [`Visited`] set shared by all branches, so
//! reaching a label a second time is an error. That covers real cycles and a
//! label reached through two separate branches (a diamond) alike.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::configs::tasks::TaskConfig;
use crate::execution::runner::TaskRunner;
use crate::process::{RunMode, RunOutcome};
use crate::types::{VstaskError, VstaskResult};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Order in which the direct dependencies of a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependsOrder {
    /// One at a time, stopping at the first failure.
    Sequence,
    /// All at once; the first failure to complete is reported.
    Parallel,
}

impl DependsOrder {
    /// `sequence` (any case) or parallel for everything else.
    pub fn of(task: &TaskConfig) -> Self {
        match task.depends_order.as_deref() {
            Some(order) if order.trim().eq_ignore_ascii_case("sequence") => DependsOrder::Sequence,
            _ => DependsOrder::Parallel,
        }
    }
}

/// Labels entered during one root run, shared by every branch of it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Visited(Arc<Mutex<HashSet<String>>>);

impl Visited {
    /// Records `label`; false when it was entered before.
    pub(crate) fn enter(&self, label: &str) -> bool {
        self.lock().insert(label.to_string())
    }

    pub(crate) fn contains(&self, label: &str) -> bool {
        self.lock().contains(label)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskRunner {
    /// Run `label` after its dependencies, failing with a cycle error when
    /// `label` was already entered during this root run.
    pub(crate) fn run_node(
        self: Arc<Self>,
        label: String,
        mode: RunMode,
        visited: Visited,
        cancel: CancellationToken,
    ) -> BoxFuture<VstaskResult<RunOutcome>> {
        Box::pin(async move {
            if !visited.enter(&label) {
                return Err(VstaskError::DependencyCycle(label));
            }
            let task = self
                .task(&label)
                .cloned()
                .ok_or_else(|| VstaskError::MissingDependency(label.clone()))?;

            self.run_dependencies(&task, &visited, &cancel).await?;

            self.execute(&task, mode, &cancel).await
        })
    }

    async fn run_dependencies(
        self: &Arc<Self>,
        task: &TaskConfig,
        visited: &Visited,
        cancel: &CancellationToken,
    ) -> VstaskResult<()> {
        let labels = task.dependency_labels();
        if labels.is_empty() {
            return Ok(());
        }

        for label in labels {
            if visited.contains(label) {
                return Err(VstaskError::DependencyCycle(label.clone()));
            }
            if self.task(label).is_none() {
                return Err(VstaskError::MissingDependency(label.clone()));
            }
        }

        let order = DependsOrder::of(task);
        debug!(task = %task.label, ?order, dependencies = ?labels, "running dependencies");

        match order {
            DependsOrder::Sequence => {
                for label in labels {
                    Arc::clone(self)
                        .run_node(
                            label.clone(),
                            RunMode::WaitForReady,
                            visited.clone(),
                            cancel.clone(),
                        )
                        .await
                        .map_err(|err| dependency_failed(label, err))?;
                }
                Ok(())
            }
            DependsOrder::Parallel => {
                let mut branches = JoinSet::new();
                for label in labels {
                    let branch = Arc::clone(self).run_node(
                        label.clone(),
                        RunMode::WaitForReady,
                        visited.clone(),
                        cancel.clone(),
                    );
                    let label = label.clone();
                    branches.spawn(async move {
                        branch
                            .await
                            .map_err(|err| dependency_failed(&label, err))
                    });
                }

                let mut first_error = None;
                while let Some(joined) = branches.join_next().await {
                    let result =
                        joined.unwrap_or_else(|err| Err(VstaskError::Aborted(err.to_string())));
                    if let Err(err) = result {
                        if first_error.is_none() {
                            first_error = Some(err);
                        } else {
                            debug!(error = %err, "discarding further dependency failure");
                        }
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }
}

pub(crate) fn dependency_failed(label: &str, source: VstaskError) -> VstaskError {
    VstaskError::DependencyFailed {
        label: label.to_string(),
        source: Box::new(source),
    }
}
