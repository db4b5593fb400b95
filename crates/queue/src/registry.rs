//! Job definition registry: name → handler + execution options.
//!
//! The registry is process-local. Every instance polling a shared store must
//! register the same definitions before its poller starts, since handler
//! availability is not distributed.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;

use crate::job::JobRecord;

/// Boxed future returned by a job handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A registered job handler.
///
/// Receives the claimed record (payload included) and may perform async I/O;
/// an `Err` becomes the record's `failReason`.
pub type JobHandler = Arc<dyn Fn(JobRecord) -> HandlerFuture + Send + Sync>;

/// Per-name execution options.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Maximum number of records with this name in flight at once.
    pub concurrency: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self { concurrency: 5 }
    }
}

impl JobOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// A handler plus its options.
#[derive(Clone)]
pub struct JobDefinition {
    options: JobOptions,
    handler: JobHandler,
}

impl JobDefinition {
    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn handler(&self) -> JobHandler {
        self.handler.clone()
    }
}

/// Process-wide mapping from job name to definition.
///
/// Built once at startup, then shared read-only with the scheduler.
#[derive(Default)]
pub struct JobRegistry {
    definitions: HashMap<String, JobDefinition>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job name.
    ///
    /// Redefining a name is an intentional override (last writer wins, to
    /// support reload scenarios); it is logged, not rejected.
    pub fn define<F, Fut>(&mut self, name: impl Into<String>, options: JobOptions, handler: F)
    where
        F: Fn(JobRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        if self.definitions.contains_key(&name) {
            warn!(job_name = %name, "redefining job handler; last definition wins");
        }
        self.definitions.insert(
            name,
            JobDefinition {
                options,
                handler: Arc::new(move |job| Box::pin(handler(job)) as HandlerFuture),
            },
        );
    }

    pub fn lookup(&self, name: &str) -> Option<&JobDefinition> {
        self.definitions.get(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
