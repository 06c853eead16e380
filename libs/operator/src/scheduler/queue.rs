//! Component D: a min-heap on `nextRunAt` with `add`/`pop`/`peek`/
//! `remove(id)`/`update(job)` (§4.C/D). Ties are broken by job id for
//! determinism (§8 invariant 2).
//!
//! Removal from a `BinaryHeap` isn't expressible in place, so `remove`
//! and `update` are realized as lazy invalidation: a generation counter
//! per id is bumped, stale heap entries are dropped silently when popped,
//! and `remove` falls back to a full rebuild of the underlying vector --
//! the simplest correct option at the ≤10⁴ job scale this queue targets.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};

use super::job::{JobId, ScheduledJob};

#[derive(Clone, Eq, PartialEq)]
struct HeapEntry {
    next_run_at: DateTime<Utc>,
    id: JobId,
    generation: u64,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest `next_run_at` sorts first.
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct JobQueue {
    heap: BinaryHeap<HeapEntry>,
    generations: HashMap<JobId, u64>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, job: &ScheduledJob) {
        let generation = self.generations.entry(job.id.clone()).or_insert(0);
        *generation += 1;
        self.heap.push(HeapEntry {
            next_run_at: job.next_run_at,
            id: job.id.clone(),
            generation: *generation,
        });
    }

    /// Replace-in-place: bump generation (invalidating any stale heap entry
    /// for this id) then push the fresh one.
    pub fn update(&mut self, job: &ScheduledJob) {
        self.add(job);
    }

    pub fn remove(&mut self, id: &str) {
        self.generations.remove(id);
        self.heap = self.heap.drain().filter(|e| e.id != id).collect();
    }

    /// Pops the earliest valid (non-stale) entry.
    pub fn pop(&mut self) -> Option<JobId> {
        while let Some(entry) = self.heap.pop() {
            if self.generations.get(&entry.id) == Some(&entry.generation) {
                return Some(entry.id);
            }
        }
        None
    }

    /// The earliest valid `next_run_at`, without consuming it.
    pub fn peek_next_run_at(&self) -> Option<DateTime<Utc>> {
        self.heap
            .iter()
            .filter(|e| self.generations.get(&e.id) == Some(&e.generation))
            .map(|e| e.next_run_at)
            .min()
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job(id: &str, secs: i64) -> ScheduledJob {
        let (namespace, name) = id.split_once('/').unwrap();
        ScheduledJob {
            id: id.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            next_run_at: Utc::now() + Duration::seconds(secs),
            interval_sec: 30,
            timeout_sec: 5,
            jitter_percent: 0,
            priority: 0,
        }
    }

    #[test]
    fn pops_in_nondecreasing_next_run_at_order() {
        let mut q = JobQueue::new();
        q.add(&job("default/a", 30));
        q.add(&job("default/b", 10));
        q.add(&job("default/c", 20));
        let order: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, vec!["default/b", "default/c", "default/a"]);
    }

    #[test]
    fn ties_broken_by_id() {
        let mut q = JobQueue::new();
        let now = job("default/b", 5).next_run_at;
        let mut a = job("default/a", 5);
        a.next_run_at = now;
        let mut b = job("default/b", 5);
        b.next_run_at = now;
        q.add(&a);
        q.add(&b);
        assert_eq!(q.pop().unwrap(), "default/a");
        assert_eq!(q.pop().unwrap(), "default/b");
    }

    #[test]
    fn update_replaces_stale_entry() {
        let mut q = JobQueue::new();
        q.add(&job("default/a", 100));
        q.update(&job("default/a", 1));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().unwrap(), "default/a");
        assert!(q.pop().is_none());
    }

    #[test]
    fn remove_drops_job_from_queue() {
        let mut q = JobQueue::new();
        q.add(&job("default/a", 5));
        q.add(&job("default/b", 10));
        q.remove("default/a");
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().unwrap(), "default/b");
    }
}
