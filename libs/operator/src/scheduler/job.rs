//! Component C: the canonical set of scheduled probes, built by the
//! reconciler from `Monitor` specs (§4.C/D).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

pub type JobId = String;

#[derive(Clone, Debug)]
pub struct ScheduledJob {
    pub id: JobId,
    pub namespace: String,
    pub name: String,
    pub next_run_at: DateTime<Utc>,
    pub interval_sec: u32,
    pub timeout_sec: u32,
    pub jitter_percent: u8,
    pub priority: i32,
}

impl ScheduledJob {
    pub fn new_id(namespace: &str, name: &str) -> JobId {
        format!("{namespace}/{name}")
    }
}

/// `id -> current job`. Owned exclusively by the reconciler (§3 Ownership).
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<JobId, ScheduledJob>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledJob> {
        self.jobs.get(id)
    }

    pub fn insert(&mut self, job: ScheduledJob) {
        self.jobs.insert(job.id.clone(), job);
    }

    pub fn remove(&mut self, id: &str) -> Option<ScheduledJob> {
        self.jobs.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    /// `{id ∈ JobRegistry}` for the job-monitor parity invariant (§8 #1).
    pub fn ids(&self) -> impl Iterator<Item = &JobId> {
        self.jobs.keys()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
