//! The persisted job record and its lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use courseboard_core::JobId;

/// Execution type of a job record.
///
/// The admin surface only ever creates run-once records; `Recurring` exists
/// because the shared collection schema carries it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    #[default]
    Normal,
    Recurring,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Normal => "normal",
            JobType::Recurring => "recurring",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(JobType::Normal),
            "recurring" => Some(JobType::Recurring),
            _ => None,
        }
    }
}

/// State of a job record, derived from its persisted fields.
///
/// The record itself stores timestamps, not a status column; state is a pure
/// function of those timestamps, the clock, and the configured lock
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// `next_run_at` is in the future.
    Scheduled,
    /// Due: eligible for the next poll cycle to claim.
    Pending,
    /// Locked by a scheduler instance, lock not yet stale.
    Running,
    /// Last attempt finished successfully.
    Finished,
    /// Last attempt failed; terminal for this record (retry re-enqueues).
    Failed,
}

/// A unit of deferred/background work, persisted in the shared collection.
///
/// Field names serialize in the collection's wire form (`nextRunAt`,
/// `lockedAt`, ...), which is also what the admin UI consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    /// Routes the record to a registered handler; not unique across records.
    pub name: String,
    /// Arbitrary payload passed to the handler.
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(rename = "type", default)]
    pub job_type: JobType,
    /// Ordering hint among due jobs; higher runs first.
    #[serde(default)]
    pub priority: i32,
    /// Next-eligible-run time. `None` or past means due now (until the
    /// record finishes or fails).
    pub next_run_at: Option<DateTime<Utc>>,
    /// User id of the operator who last touched the record, if any.
    pub last_modified_by: Option<String>,
    /// Lock marker; set by the claiming scheduler instance.
    pub locked_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fail_count: u32,
    pub fail_reason: Option<String>,
}

impl JobRecord {
    /// Create a due-now record with a fresh id.
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            data,
            job_type: JobType::Normal,
            priority: 0,
            next_run_at: Some(Utc::now()),
            last_modified_by: None,
            locked_at: None,
            last_run_at: None,
            last_finished_at: None,
            failed_at: None,
            fail_count: 0,
            fail_reason: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Schedule the record for a specific time instead of "now".
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.next_run_at = Some(at);
        self
    }

    pub fn modified_by(mut self, user_id: impl Into<String>) -> Self {
        self.last_modified_by = Some(user_id.into());
        self
    }

    /// Whether the lock marker has outlived the maximum processing window.
    ///
    /// A stale lock marks an abandoned claim (crashed worker); the record is
    /// eligible for re-claim.
    pub fn lock_is_stale(&self, now: DateTime<Utc>, lock_lifetime: Duration) -> bool {
        match self.locked_at {
            Some(locked_at) => now - locked_at >= lock_lifetime,
            None => true,
        }
    }

    /// Derive the lifecycle state of this record.
    pub fn state(&self, now: DateTime<Utc>, lock_lifetime: Duration) -> JobState {
        if self.locked_at.is_some() && !self.lock_is_stale(now, lock_lifetime) {
            return JobState::Running;
        }
        match (self.failed_at, self.last_finished_at) {
            (Some(failed), Some(finished)) if finished >= failed => return JobState::Finished,
            (Some(_), _) => return JobState::Failed,
            (None, Some(_)) => return JobState::Finished,
            (None, None) => {}
        }
        match self.next_run_at {
            Some(at) if at > now => JobState::Scheduled,
            _ => JobState::Pending,
        }
    }

    /// Whether the record is eligible for claiming in this poll cycle.
    pub fn is_due(&self, now: DateTime<Utc>, lock_lifetime: Duration) -> bool {
        matches!(self.state(now, lock_lifetime), JobState::Pending)
    }

    /// Apply a successful claim: set the lock marker and the run stamp.
    pub fn apply_claim(&mut self, now: DateTime<Utc>) {
        self.locked_at = Some(now);
        self.last_run_at = Some(now);
    }

    /// Apply a successful completion: clear the lock, retire the record.
    ///
    /// Clearing `next_run_at` is what stops a run-once record from becoming
    /// due again; clearing the failure fields makes a record whose final
    /// attempt succeeded read as `Finished` (the cumulative `fail_count`
    /// stays).
    pub fn apply_success(&mut self, finished_at: DateTime<Utc>) {
        self.locked_at = None;
        self.last_finished_at = Some(finished_at);
        self.next_run_at = None;
        self.failed_at = None;
        self.fail_reason = None;
    }

    /// Apply a failed attempt: clear the lock, record the reason.
    pub fn apply_failure(&mut self, failed_at: DateTime<Utc>, reason: impl Into<String>) {
        self.locked_at = None;
        self.failed_at = Some(failed_at);
        self.fail_reason = Some(reason.into());
        self.fail_count += 1;
    }
}

/// Per-name aggregate statistics for the overview listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOverview {
    pub name: String,
    pub total: u64,
    /// Records currently holding a lock marker.
    pub running: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lifetime() -> Duration {
        Duration::minutes(10)
    }

    #[test]
    fn new_record_is_due_now() {
        let now = Utc::now();
        let job = JobRecord::new("send-welcome-email", serde_json::json!({"email": "a@b.c"}));
        assert_eq!(job.state(now, lifetime()), JobState::Pending);
        assert!(job.is_due(now, lifetime()));
    }

    #[test]
    fn future_schedule_is_scheduled_not_due() {
        let now = Utc::now();
        let job = JobRecord::new("x", serde_json::json!({})).scheduled_at(now + Duration::hours(1));
        assert_eq!(job.state(now, lifetime()), JobState::Scheduled);
        assert!(!job.is_due(now, lifetime()));
    }

    #[test]
    fn fresh_lock_is_running() {
        let now = Utc::now();
        let mut job = JobRecord::new("x", serde_json::json!({}));
        job.apply_claim(now);
        assert_eq!(job.state(now + Duration::minutes(5), lifetime()), JobState::Running);
        assert!(!job.is_due(now + Duration::minutes(5), lifetime()));
    }

    #[test]
    fn stale_lock_is_due_again() {
        let now = Utc::now();
        let mut job = JobRecord::new("x", serde_json::json!({}));
        job.apply_claim(now);
        let later = now + Duration::minutes(11);
        assert_eq!(job.state(later, lifetime()), JobState::Pending);
        assert!(job.is_due(later, lifetime()));
    }

    #[test]
    fn success_retires_the_record() {
        let now = Utc::now();
        let mut job = JobRecord::new("x", serde_json::json!({}));
        job.apply_claim(now);
        job.apply_success(now + Duration::seconds(2));
        let later = now + Duration::minutes(1);
        assert_eq!(job.state(later, lifetime()), JobState::Finished);
        assert!(!job.is_due(later, lifetime()));
        assert_eq!(job.next_run_at, None);
    }

    #[test]
    fn failure_is_terminal_for_the_record() {
        let now = Utc::now();
        let mut job = JobRecord::new("x", serde_json::json!({}));
        job.apply_claim(now);
        job.apply_failure(now + Duration::seconds(1), "SMTP timeout");
        let later = now + Duration::minutes(1);
        assert_eq!(job.state(later, lifetime()), JobState::Failed);
        assert!(!job.is_due(later, lifetime()));
        assert_eq!(job.fail_count, 1);
        assert_eq!(job.fail_reason.as_deref(), Some("SMTP timeout"));
    }

    #[test]
    fn finish_newer_than_failure_reads_finished() {
        let now = Utc::now();
        let mut job = JobRecord::new("x", serde_json::json!({}));
        job.apply_failure(now, "first attempt died");
        job.apply_claim(now + Duration::seconds(5));
        job.apply_success(now + Duration::seconds(9));
        assert_eq!(job.state(now + Duration::minutes(1), lifetime()), JobState::Finished);
        // Cumulative count survives the later success.
        assert_eq!(job.fail_count, 1);
    }

    #[test]
    fn wire_field_names_match_the_collection_schema() {
        let job = JobRecord::new("send-welcome-email", serde_json::json!({"k": "v"}));
        let value = serde_json::to_value(&job).unwrap();
        for key in [
            "id",
            "name",
            "data",
            "type",
            "priority",
            "nextRunAt",
            "lastModifiedBy",
            "lockedAt",
            "lastRunAt",
            "lastFinishedAt",
            "failedAt",
            "failCount",
            "failReason",
        ] {
            assert!(value.get(key).is_some(), "missing wire field {key}");
        }
        assert_eq!(value["type"], "normal");
    }

    proptest! {
        /// A record can never be both claimable and holding a fresh lock,
        /// regardless of what its other timestamps look like.
        #[test]
        fn due_records_never_hold_a_fresh_lock(
            locked_secs_ago in proptest::option::of(0i64..3600),
            failed in proptest::bool::ANY,
            finished in proptest::bool::ANY,
            next_in_secs in proptest::option::of(-3600i64..3600),
        ) {
            let now = Utc::now();
            let mut job = JobRecord::new("p", serde_json::json!({}));
            job.locked_at = locked_secs_ago.map(|s| now - Duration::seconds(s));
            job.failed_at = failed.then(|| now - Duration::seconds(30));
            job.last_finished_at = finished.then(|| now - Duration::seconds(20));
            job.next_run_at = next_in_secs.map(|s| now + Duration::seconds(s));

            let lifetime = Duration::minutes(10);
            if job.is_due(now, lifetime) {
                prop_assert!(job.lock_is_stale(now, lifetime));
                prop_assert!(job.failed_at.is_none() || job.last_finished_at >= job.failed_at);
            }
        }
    }
}
