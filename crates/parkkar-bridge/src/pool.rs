//! Background jobs keyed by lot id.
//!
//! Detect-mode relays run detached from the request that started them.
//! The pool keeps an abort handle for each so they can be counted and
//! cancelled per lot or all at once on shutdown. It does not deduplicate:
//! two jobs for the same lot simply both run.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::task::{AbortHandle, JoinHandle};

#[derive(Default)]
pub struct JobPool {
    jobs: Mutex<HashMap<String, Vec<AbortHandle>>>,
}

impl JobPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `job` on the current runtime and track it under `lot_id`.
    ///
    /// Dropping the returned handle detaches the task; it stays tracked.
    pub fn spawn<F>(&self, lot_id: &str, job: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(job);
        let mut jobs = self.lock();
        let entries = jobs.entry(lot_id.to_owned()).or_default();
        entries.retain(|h| !h.is_finished());
        entries.push(handle.abort_handle());
        handle
    }

    /// Jobs for `lot_id` that have not finished yet.
    pub fn running(&self, lot_id: &str) -> usize {
        self.lock()
            .get(lot_id)
            .map_or(0, |entries| entries.iter().filter(|h| !h.is_finished()).count())
    }

    pub fn running_total(&self) -> usize {
        self.lock()
            .values()
            .flatten()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Cancel every job for `lot_id`, returning how many were still running.
    pub fn abort_lot(&self, lot_id: &str) -> usize {
        let entries = self.lock().remove(lot_id).unwrap_or_default();
        abort_each(entries)
    }

    pub fn abort_all(&self) -> usize {
        let drained: Vec<AbortHandle> = self.lock().drain().flat_map(|(_, v)| v).collect();
        abort_each(drained)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<AbortHandle>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn abort_each(handles: Vec<AbortHandle>) -> usize {
    let mut live = 0;
    for handle in handles {
        if !handle.is_finished() {
            live += 1;
            handle.abort();
        }
    }
    live
}
