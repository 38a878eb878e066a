//! Bounded pool for blocking scan jobs.
//!
//! Extracting an archive holds a file handle and burns CPU on inflation, so
//! the number of jobs running at once is capped. [`WorkerPool::hire`] waits
//! for a free slot, [`WorkerPool::spawn`] runs a job on the blocking thread
//! pool and frees the slot when the job ends, and [`WorkerPool::wait`] joins
//! everything that was spawned.

use anyhow::{Context, Result};
use log::error;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

pub const DEFAULT_WORKERS: usize = 4;

/// An admission slot. Dropping it (or calling [`Worker::release`]) frees
/// the slot.
#[derive(Debug)]
pub struct Worker {
    _permit: OwnedSemaphorePermit,
}

impl Worker {
    pub fn release(self) {}
}

#[derive(Debug)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    tasks: JoinSet<()>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool of `capacity` workers (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently taken.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Wait until a slot is free and take it.
    pub async fn hire(&self) -> Result<Worker> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .context("worker pool is closed")?;
        Ok(Worker { _permit: permit })
    }

    /// Run `job` on the blocking thread pool; `worker` is released when the
    /// job returns.
    pub fn spawn<F>(&mut self, worker: Worker, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.tasks.spawn_blocking(move || {
            job();
            worker.release();
        });
    }

    /// Wait for every spawned job to finish.
    pub async fn wait(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!("scan worker failed: {}", e);
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_capacity_is_at_least_one() {
        assert_eq!(WorkerPool::new(0).capacity(), 1);
        assert_eq!(WorkerPool::new(3).capacity(), 3);
        assert_eq!(WorkerPool::default().capacity(), DEFAULT_WORKERS);
    }

    #[tokio::test]
    async fn test_hire_and_release_track_in_flight() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.in_flight(), 0);

        let first = pool.hire().await.unwrap();
        let second = pool.hire().await.unwrap();
        assert_eq!(pool.in_flight(), 2);

        first.release();
        assert_eq!(pool.in_flight(), 1);
        drop(second);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_hire_blocks_when_saturated() {
        let pool = WorkerPool::new(1);
        let held = pool.hire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.hire()).await;
        assert!(blocked.is_err(), "hire must wait for a free slot");

        held.release();
        let hired = tokio::time::timeout(Duration::from_millis(500), pool.hire()).await;
        assert!(hired.is_ok());
    }

    #[tokio::test]
    async fn test_single_worker_never_overlaps() {
        let mut pool = WorkerPool::new(1);
        let spans = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..5 {
            let worker = pool.hire().await.unwrap();
            let spans = Arc::clone(&spans);
            pool.spawn(worker, move || {
                let start = Instant::now();
                thread::sleep(Duration::from_millis(10));
                spans.lock().unwrap().push((start, Instant::now()));
            });
        }
        pool.wait().await;

        let mut spans = spans.lock().unwrap().clone();
        assert_eq!(spans.len(), 5);
        spans.sort();
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "jobs overlapped: {:?}", pair);
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..12 {
            let worker = pool.hire().await.unwrap();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(worker, move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        pool.wait().await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_joins_all_jobs() {
        let mut pool = WorkerPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let worker = pool.hire().await.unwrap();
            let done = Arc::clone(&done);
            pool.spawn(worker, move || {
                thread::sleep(Duration::from_millis(2));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait().await;

        assert_eq!(done.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_panicking_job_frees_its_slot() {
        let mut pool = WorkerPool::new(1);
        let worker = pool.hire().await.unwrap();
        pool.spawn(worker, || panic!("boom"));
        pool.wait().await;

        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_stuck_job_holds_its_slot() {
        let mut pool = WorkerPool::new(1);
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        let worker = pool.hire().await.unwrap();
        pool.spawn(worker, move || {
            // Simulates a stalled archive read
            let _ = rx.recv();
        });

        let starved = tokio::time::timeout(Duration::from_millis(50), pool.hire()).await;
        assert!(starved.is_err(), "a stuck job keeps its slot");

        drop(tx);
        pool.wait().await;
        assert_eq!(pool.in_flight(), 0);
    }
}
