//! In-memory job store. A single readers-writer lock guards a `HashMap`
//! keyed by request id; readers get cloned snapshots so they never hold the lock
//! across an `.await`.

use std::collections::HashMap;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::JobStoreError;
use crate::types::Job;

#[derive(Default)]
pub struct JobStore {
    inner: RwLock<HashMap<u64, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite the job for `job.request_id`, bumping `updated_at`.
    pub async fn put(&self, mut job: Job) {
        job.updated_at = OffsetDateTime::now_utc();
        let mut guard = self.inner.write().await;
        guard.insert(job.request_id, job);
    }

    /// Return a cloned snapshot; callers must not assume mutations propagate back.
    pub async fn get(&self, id: u64) -> Option<Job> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Apply `f` to the stored job for `id` under the write lock, atomically.
    pub async fn update<F>(&self, id: u64, f: F) -> Result<(), JobStoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&id) {
            Some(job) => {
                f(job);
                job.updated_at = OffsetDateTime::now_utc();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(id)),
        }
    }

    /// Apply `f` to the stored job for `id` under the write lock, atomically,
    /// returning a clone of the job as it stood right after the mutation. Used
    /// by the worker pool to linearize the nonce bump with the store.
    pub async fn update_returning<F>(&self, id: u64, f: F) -> Result<Job, JobStoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&id) {
            Some(job) => {
                f(job);
                job.updated_at = OffsetDateTime::now_utc();
                Ok(job.clone())
            }
            None => Err(JobStoreError::NotFound(id)),
        }
    }

    /// Remove the job for `id`; a no-op if absent.
    pub async fn remove(&self, id: u64) {
        self.inner.write().await.remove(&id);
    }

    pub async fn contains(&self, id: u64) -> bool {
        self.inner.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Snapshot of jobs eligible to run right now, earliest `next_run` first.
    /// Ordering is advisory.
    pub async fn ready(&self, now: OffsetDateTime) -> Vec<Job> {
        let guard = self.inner.read().await;
        let mut jobs: Vec<Job> = guard.values().filter(|job| job.is_ready(now)).cloned().collect();
        jobs.sort_by_key(|job| job.next_run);
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionState;
    use std::time::Duration;

    fn job(id: u64) -> Job {
        Job::new(id, "https://example.com".into(), "a".into(), 0, Duration::from_secs(60), Duration::ZERO)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = JobStore::new();
        store.put(job(1)).await;
        let fetched = store.get(1).await.unwrap();
        assert_eq!(fetched.request_id, 1);
    }

    #[tokio::test]
    async fn update_missing_job_errors() {
        let store = JobStore::new();
        let result = store.update(42, |_| {}).await;
        assert!(matches!(result, Err(JobStoreError::NotFound(42))));
    }

    #[tokio::test]
    async fn remove_is_noop_when_absent() {
        let store = JobStore::new();
        store.remove(99).await;
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn ready_excludes_executing_and_not_due() {
        let store = JobStore::new();
        let mut due = job(1);
        due.next_run = OffsetDateTime::now_utc() - Duration::from_secs(1);
        store.put(due).await;

        let mut executing = job(2);
        executing.next_run = OffsetDateTime::now_utc() - Duration::from_secs(1);
        executing.execution_state = ExecutionState::Executing;
        store.put(executing).await;

        let mut not_due = job(3);
        not_due.next_run = OffsetDateTime::now_utc() + Duration::from_secs(60);
        store.put(not_due).await;

        let ready = store.ready(OffsetDateTime::now_utc()).await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].request_id, 1);
    }
}
