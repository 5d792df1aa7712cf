//! Pipelines
//!
//! Compose completions: sequential chains where each stage receives the
//! previous stage's output as context, and concurrent fan-out where every
//! task runs on its own tokio task.

use std::future::Future;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::provider::LlmProvider;

/// A unit of work: cancellation token plus optional prior-stage result
pub type TaskFn = Arc<
    dyn Fn(CancellationToken, Option<String>) -> BoxFuture<'static, Result<String>> + Send + Sync,
>;

/// Wrap an async closure as a [`TaskFn`]
pub fn task<F, Fut>(function: F) -> TaskFn
where
    F: Fn(CancellationToken, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    Arc::new(move |cancel, context| Box::pin(function(cancel, context)))
}

/// Turn a configured provider into a pipeline task
pub fn provider_task(provider: Arc<dyn LlmProvider>) -> TaskFn {
    task(move |cancel, context| {
        let provider = Arc::clone(&provider);
        async move {
            let context: Vec<&str> = context.iter().map(String::as_str).collect();
            provider.completion(&cancel, &context).await
        }
    })
}

/// Ordered collection of tasks
#[derive(Clone, Default)]
pub struct Pipeline {
    tasks: Vec<TaskFn>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: TaskFn) -> &mut Self {
        self.tasks.push(task);
        self
    }

    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = TaskFn>) -> &mut Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Chain `tasks` into one task. The first stage gets the caller's
    /// context; later stages get the previous output. The first failure stops
    /// the chain.
    pub fn create_chain(tasks: Vec<TaskFn>) -> TaskFn {
        let tasks = Arc::new(tasks);
        task(move |cancel, context| {
            let tasks = Arc::clone(&tasks);
            async move {
                let mut carried = context;
                let total = tasks.len();
                for (index, stage) in tasks.iter().enumerate() {
                    tracing::debug!(task = index + 1, total, "chain progress");
                    let output = stage(cancel.clone(), carried.take()).await.map_err(|source| {
                        AgentError::ChainInterrupted {
                            task: index + 1,
                            source: Box::new(source),
                        }
                    })?;
                    carried = Some(output);
                }
                Ok(carried.unwrap_or_default())
            }
        })
    }

    /// Run tasks one after another without passing context between them.
    ///
    /// Stops at the first failure; the outputs gathered so far travel in
    /// [`AgentError::Partial`].
    pub async fn run_sequentially(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let total = self.tasks.len();
        let mut results = Vec::with_capacity(total);
        for (index, task) in self.tasks.iter().enumerate() {
            tracing::debug!(task = index + 1, total, "sequential progress");
            match task(cancel.clone(), None).await {
                Ok(output) => results.push(Some(output)),
                Err(source) => {
                    results.resize(total, None);
                    return Err(AgentError::Partial {
                        results,
                        source: Box::new(AgentError::TaskFailed {
                            task: index + 1,
                            source: Box::new(source),
                        }),
                    });
                }
            }
        }
        Ok(results.into_iter().flatten().collect())
    }

    /// Run every task on its own tokio task; results keep submission order.
    ///
    /// All tasks run to completion. Failures, panics included, are collected
    /// and returned together inside [`AgentError::Partial`] alongside the
    /// outputs of the tasks that succeeded.
    pub async fn run_concurrently(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let handles = self.tasks.iter().enumerate().map(|(index, task)| {
            let future = task(cancel.clone(), None);
            tokio::spawn(async move {
                tracing::debug!(task = index + 1, "task started");
                let result = future.await;
                tracing::debug!(task = index + 1, ok = result.is_ok(), "task finished");
                result
            })
        });

        let mut results = Vec::with_capacity(self.tasks.len());
        let mut failures = Vec::new();
        for (index, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined.map_err(join_error).and_then(|result| result) {
                Ok(output) => results.push(Some(output)),
                Err(source) => {
                    results.push(None);
                    failures.push(AgentError::TaskFailed {
                        task: index + 1,
                        source: Box::new(source),
                    });
                }
            }
        }

        let source = match failures.len() {
            0 => return Ok(results.into_iter().flatten().collect()),
            1 => failures.remove(0),
            _ => AgentError::Multiple(failures),
        };
        Err(AgentError::Partial {
            results,
            source: Box::new(source),
        })
    }
}

fn join_error(err: JoinError) -> AgentError {
    if !err.is_panic() {
        return AgentError::Cancelled;
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".into());
    AgentError::Panicked(message)
}
