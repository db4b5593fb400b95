//! In-memory job store for tests/dev.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

use courseboard_core::JobId;

use super::r#trait::{JobStore, StoreError};
use crate::job::{JobOverview, JobRecord};

/// In-memory job store.
///
/// Claim takes the write lock for the whole read-modify-write, which makes
/// it atomic with respect to concurrent claimers, the same guarantee the
/// durable implementation gets from a conditional UPDATE.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn candidate_order(a: &JobRecord, b: &JobRecord) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| match (a.next_run_at, b.next_run_at) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        })
        .then_with(|| a.id.cmp(&b.id))
}

fn listing_order(a: &JobRecord, b: &JobRecord) -> Ordering {
    b.next_run_at
        .cmp(&a.next_run_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let jobs = self.jobs.read().expect("job store lock poisoned");
        Ok(jobs.get(&id).cloned())
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.read().expect("job store lock poisoned");
        let mut due: Vec<JobRecord> = jobs
            .values()
            .filter(|j| j.is_due(now, lock_lifetime))
            .cloned()
            .collect();
        due.sort_by(candidate_order);
        due.truncate(limit);
        Ok(due)
    }

    async fn claim(
        &self,
        id: JobId,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        match jobs.get_mut(&id) {
            Some(job) if job.lock_is_stale(now, lock_lifetime) => {
                job.apply_claim(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_success(&self, id: JobId, finished_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        if let Some(job) = jobs.get_mut(&id) {
            job.apply_success(finished_at);
        }
        Ok(())
    }

    async fn mark_failure(
        &self,
        id: JobId,
        failed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        if let Some(job) = jobs.get_mut(&id) {
            job.apply_failure(failed_at, reason);
        }
        Ok(())
    }

    async fn query(
        &self,
        name_filter: Option<&str>,
        limit: usize,
        skip: usize,
    ) -> Result<(Vec<JobRecord>, u64), StoreError> {
        let jobs = self.jobs.read().expect("job store lock poisoned");
        let needle = name_filter.map(str::to_lowercase);
        let mut matching: Vec<JobRecord> = jobs
            .values()
            .filter(|j| match &needle {
                Some(n) => j.name.to_lowercase().contains(n),
                None => true,
            })
            .cloned()
            .collect();
        let total = matching.len() as u64;
        matching.sort_by(listing_order);
        let page = matching.into_iter().skip(skip).take(limit).collect();
        Ok((page, total))
    }

    async fn overview(&self) -> Result<Vec<JobOverview>, StoreError> {
        let jobs = self.jobs.read().expect("job store lock poisoned");
        let mut grouped: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for job in jobs.values() {
            let entry = grouped.entry(job.name.clone()).or_default();
            entry.0 += 1;
            if job.locked_at.is_some() {
                entry.1 += 1;
            }
        }
        Ok(grouped
            .into_iter()
            .map(|(name, (total, running))| JobOverview {
                name,
                total,
                running,
            })
            .collect())
    }

    async fn delete_by_name(&self, name: &str) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        let before = jobs.len();
        jobs.retain(|_, j| j.name != name);
        Ok((before - jobs.len()) as u64)
    }

    async fn delete_by_id(&self, id: JobId) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().expect("job store lock poisoned");
        Ok(jobs.remove(&id).is_some())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let jobs = self.jobs.read().expect("job store lock poisoned");
        Ok(jobs.len() as u64)
    }
}
