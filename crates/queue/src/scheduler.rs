//! Polling scheduler: pulls due work from the store and drives execution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::job::{JobRecord, JobType};
use crate::registry::{JobHandler, JobRegistry};
use crate::store::{JobStore, SharedJobStore, StoreError};

/// Failure reason recorded when a due job's name has no registered handler.
pub const NO_HANDLER_REASON: &str = "no handler registered";

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to poll the store for due jobs.
    pub poll_interval: Duration,
    /// Maximum candidates pulled per poll cycle.
    pub batch_size: usize,
    /// Maximum processing window; a lock older than this is stale and the
    /// record becomes claimable again (crash recovery).
    pub lock_lifetime: Duration,
    /// Global ceiling on concurrently running handlers.
    pub max_concurrency: usize,
    /// Delete run-once records after successful completion instead of
    /// retiring them in place.
    pub remove_on_success: bool,
    /// Name for logging.
    pub name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 100,
            lock_lifetime: Duration::from_secs(600),
            max_concurrency: 20,
            remove_on_success: false,
            name: "scheduler".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_lock_lifetime(mut self, lock_lifetime: Duration) -> Self {
        self.lock_lifetime = lock_lifetime;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_remove_on_success(mut self, remove: bool) -> Self {
        self.remove_on_success = remove;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Scheduler runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchedulerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub currently_running: usize,
}

/// In-flight accounting per job name plus a global total.
///
/// Acquire happens before the claim so a record is never locked only to be
/// dropped on the floor by a full worker pool.
#[derive(Debug, Default)]
struct InFlight {
    per_name: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl InFlight {
    fn try_acquire(&self, name: &str, per_name_limit: usize, global_limit: usize) -> bool {
        let mut per_name = self.per_name.lock().expect("in-flight lock poisoned");
        if self.total.load(Ordering::SeqCst) >= global_limit {
            return false;
        }
        let count = per_name.entry(name.to_string()).or_insert(0);
        if *count >= per_name_limit {
            return false;
        }
        *count += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn release(&self, name: &str) {
        let mut per_name = self.per_name.lock().expect("in-flight lock poisoned");
        if let Some(count) = per_name.get_mut(name) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                per_name.remove(name);
            }
        }
        self.total.fetch_sub(1, Ordering::SeqCst);
    }

    fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<SchedulerStats>>,
    in_flight: Arc<InFlight>,
}

impl SchedulerHandle {
    /// Request graceful shutdown and wait for in-flight handlers to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }

    /// Snapshot of the runtime statistics.
    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self
            .stats
            .lock()
            .expect("scheduler stats lock poisoned")
            .clone();
        stats.currently_running = self.in_flight.total();
        stats
    }
}

/// Polling job scheduler.
///
/// Periodically scans the store for due records, claims them atomically,
/// dispatches registered handlers, and records outcomes. Multiple instances
/// may run against the same store; the claim compare-and-set decides who
/// executes what.
pub struct Scheduler {
    store: SharedJobStore,
    registry: Arc<JobRegistry>,
    config: SchedulerConfig,
    in_flight: Arc<InFlight>,
    stats: Arc<Mutex<SchedulerStats>>,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
}

impl Scheduler {
    pub fn new(store: SharedJobStore, registry: Arc<JobRegistry>, config: SchedulerConfig) -> Self {
        Self {
            store,
            registry,
            config,
            in_flight: Arc::new(InFlight::default()),
            stats: Arc::new(Mutex::new(SchedulerStats::default())),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    fn lock_lifetime(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.lock_lifetime)
            .unwrap_or_else(|_| chrono::Duration::seconds(600))
    }

    /// Run one poll cycle: find due candidates, claim, dispatch.
    ///
    /// Returns the number of handlers dispatched. Handlers run on the
    /// runtime (fire-and-continue); use [`Scheduler::drain`] to wait for
    /// them.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let lock_lifetime = self.lock_lifetime();
        let due = self
            .store
            .find_due(now, lock_lifetime, self.config.batch_size)
            .await?;

        let mut dispatched = 0;
        for job in due {
            let definition = self.registry.lookup(&job.name);
            let per_name_limit = definition.map(|d| d.options().concurrency).unwrap_or(1);

            if !self
                .in_flight
                .try_acquire(&job.name, per_name_limit, self.config.max_concurrency)
            {
                // Ceiling reached; the record stays due for a later cycle.
                continue;
            }

            let claimed = match self.store.claim(job.id, now, lock_lifetime).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    self.in_flight.release(&job.name);
                    return Err(e);
                }
            };
            if !claimed {
                // Lost the race to another instance; not an error.
                self.in_flight.release(&job.name);
                continue;
            }

            match definition {
                None => {
                    // Configuration error: report it on the record and move
                    // on so the row does not stay locked forever.
                    error!(job_id = %job.id, job_name = %job.name, "due job has no registered handler");
                    let marked = self.store.mark_failure(job.id, now, NO_HANDLER_REASON).await;
                    self.in_flight.release(&job.name);
                    {
                        let mut stats = self.stats.lock().expect("scheduler stats lock poisoned");
                        stats.jobs_processed += 1;
                        stats.jobs_failed += 1;
                    }
                    marked?;
                }
                Some(definition) => {
                    dispatched += 1;
                    let task = execute_claimed(
                        self.store.clone(),
                        job,
                        definition.handler(),
                        self.in_flight.clone(),
                        self.stats.clone(),
                        self.config.remove_on_success,
                    );
                    self.tasks.lock().await.spawn(task);
                }
            }
        }

        Ok(dispatched)
    }

    /// Wait for every in-flight handler to finish.
    pub async fn drain(&self) {
        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }

    async fn reap_finished(&self) {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
    }

    /// Spawn the polling loop on the runtime.
    ///
    /// The registry must be fully populated before this is called; handlers
    /// registered afterwards are not visible to this instance.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();
        let in_flight = self.in_flight.clone();

        let scheduler = Arc::new(self);
        let join = tokio::spawn(scheduler.run(shutdown_rx));

        SchedulerHandle {
            shutdown: shutdown_tx,
            join,
            stats,
            in_flight,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            scheduler = %self.config.name,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "scheduler started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    match self.poll_once(now).await {
                        Ok(0) => {}
                        Ok(n) => debug!(scheduler = %self.config.name, dispatched = n, "poll cycle dispatched jobs"),
                        Err(e) => {
                            // Store unavailability is transient; retry on
                            // the next tick rather than crash the process.
                            error!(scheduler = %self.config.name, error = %e, "poll cycle failed; retrying on next tick");
                        }
                    }
                    self.reap_finished().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.drain().await;
        info!(scheduler = %self.config.name, "scheduler stopped");
    }
}

/// Execute one claimed record and record its outcome.
async fn execute_claimed(
    store: SharedJobStore,
    job: JobRecord,
    handler: JobHandler,
    in_flight: Arc<InFlight>,
    stats: Arc<Mutex<SchedulerStats>>,
    remove_on_success: bool,
) {
    let id = job.id;
    let name = job.name.clone();
    let run_once = job.job_type == JobType::Normal;

    debug!(job_id = %id, job_name = %name, "executing job");
    let result = handler(job).await;
    let finished_at = Utc::now();

    match result {
        Ok(()) => {
            let recorded = if remove_on_success && run_once {
                store.delete_by_id(id).await.map(|_| ())
            } else {
                store.mark_success(id, finished_at).await
            };
            if let Err(e) = recorded {
                error!(job_id = %id, job_name = %name, error = %e, "failed to record job success");
            }
            debug!(job_id = %id, job_name = %name, "job finished");
            let mut stats = stats.lock().expect("scheduler stats lock poisoned");
            stats.jobs_processed += 1;
            stats.jobs_succeeded += 1;
        }
        Err(e) => {
            let reason = format!("{e:#}");
            error!(job_id = %id, job_name = %name, error = %reason, "job handler failed");
            if let Err(e) = store.mark_failure(id, finished_at, &reason).await {
                error!(job_id = %id, job_name = %name, error = %e, "failed to record job failure");
            }
            let mut stats = stats.lock().expect("scheduler stats lock poisoned");
            stats.jobs_processed += 1;
            stats.jobs_failed += 1;
        }
    }

    in_flight.release(&name);
}
