//! Thread pool with fail-fast admission.
//!
//! The pool runs a fixed number of worker threads. A task counts as in flight from
//! submission until it finishes; once `threads + queue_limit` tasks are in flight,
//! [`ThreadPool::spawn`] fails with `Rejected` instead of queuing without bound.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use chdata_common::{Result, error::Error};

use crate::{
    blocking_queue::BlockingQueue,
    join_handle::JoinHandle,
    oneshot,
    queue::{ChunkQueue, PollError},
};

/// A boxed function that can be executed by a worker thread.
type TaskFn = Box<dyn FnOnce() + Send + 'static>;

/// A bounded pool of worker threads.
///
/// ## Cloning
///
/// `ThreadPool` implements [`Clone`] and all clones share the same workers and the same
/// admission limit. Worker threads exit once the last clone is dropped and the queued
/// tasks have run.
#[derive(Clone)]
pub struct ThreadPool(Arc<PoolShared>);

struct PoolShared {
    tasks: Arc<BlockingQueue<TaskFn>>,
    in_flight: Arc<AtomicUsize>,
    threads: usize,
    limit: usize,
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        self.tasks.close();
    }
}

impl ThreadPool {
    /// Creates a pool of `threads` workers that admits up to `queue_limit` waiting
    /// tasks on top of the running ones.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is 0 or a worker thread cannot be spawned.
    pub fn new(threads: usize, queue_limit: usize) -> Self {
        Self::with_thread_name(threads, queue_limit, |i| format!("chdata-worker-{i}"))
    }

    /// Creates a pool like [`new`](Self::new), naming each worker with `thread_name`.
    ///
    /// # Arguments
    ///
    /// * `threads` - The number of worker threads to spawn. Must be greater than 0.
    /// * `queue_limit` - How many admitted tasks may wait for a free worker.
    /// * `thread_name` - Maps a 0-based thread index to its name; an empty name leaves
    ///   the thread unnamed.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is 0 or a worker thread cannot be spawned.
    pub fn with_thread_name(
        threads: usize,
        queue_limit: usize,
        thread_name: impl Fn(usize) -> String,
    ) -> Self {
        assert_ne!(threads, 0);

        let tasks = Arc::new(BlockingQueue::<TaskFn>::unbounded());
        let in_flight = Arc::new(AtomicUsize::new(0));
        for i in 0..threads {
            let tasks = tasks.clone();
            let in_flight = in_flight.clone();
            let mut builder = thread::Builder::new();
            let name = thread_name(i);
            if !name.is_empty() {
                builder = builder.name(name);
            }
            builder
                .spawn(move || Self::thread_fn(&*tasks, &in_flight))
                .expect("spawn thread");
        }

        ThreadPool(Arc::new(PoolShared {
            tasks,
            in_flight,
            threads,
            limit: threads.saturating_add(queue_limit),
        }))
    }

    /// Sets the size of the global pool. Only effective before the first call to
    /// [`global()`](Self::global). Values below 1 are clamped to 1.
    pub fn configure_global_pool_size(pool_size: usize) {
        GLOBAL_POOL_SIZE.store(pool_size.max(1), Ordering::SeqCst);
    }

    /// Returns the process-wide pool, creating it on first use.
    ///
    /// The worker count comes from
    /// [`configure_global_pool_size()`](Self::configure_global_pool_size), or else is
    /// `2 * available_parallelism + 1` with a minimum of 4. The global pool admits as
    /// many waiting tasks as it has workers.
    pub fn global() -> &'static ThreadPool {
        static POOL: OnceLock<ThreadPool> = OnceLock::new();
        POOL.get_or_init(|| {
            let size = Self::global_pool_size();
            ThreadPool::with_thread_name(size, size, |i| format!("chdata-global-{i}"))
        })
    }

    pub fn threads(&self) -> usize {
        self.0.threads
    }

    /// Maximum number of tasks in flight.
    pub fn capacity(&self) -> usize {
        self.0.limit
    }

    /// Tasks admitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.0.in_flight.load(Ordering::SeqCst)
    }

    /// Runs `f` on a worker thread and returns a handle to its result.
    ///
    /// # Returns
    ///
    /// A [`JoinHandle<R>`], or a `Rejected` error if the pool is at capacity.
    pub fn spawn<F, R>(&self, f: F) -> Result<JoinHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<thread::Result<R>>();
        self.spawn_detached(move || {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(f));
            let _ = tx.send(outcome); // Ignore send errors if the handle is dropped
        })?;
        Ok(JoinHandle::new(rx))
    }

    /// Runs `f` on a worker thread without a handle to wait on.
    ///
    /// # Returns
    ///
    /// A `Rejected` error if the pool is at capacity.
    pub fn spawn_detached<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = &self.0;
        let admitted = shared
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < shared.limit).then_some(n + 1)
            });
        if admitted.is_err() {
            log::debug!("thread pool rejected a task, {} in flight", shared.limit);
            return Err(Error::rejected(shared.limit));
        }

        let task: TaskFn = Box::new(f);
        if shared.tasks.offer(task, None).is_err() {
            shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::invalid_operation("thread pool is shut down"));
        }
        Ok(())
    }

    fn global_pool_size() -> usize {
        let size = GLOBAL_POOL_SIZE.load(Ordering::SeqCst);
        if size == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get() * 2 + 1)
                .unwrap_or(0)
                .max(4)
        } else {
            size
        }
    }

    fn thread_fn(tasks: &dyn ChunkQueue<TaskFn>, in_flight: &AtomicUsize) {
        loop {
            match tasks.poll(None) {
                Ok(task) => {
                    // A panicking detached task must not take the worker down.
                    let _ = std::panic::catch_unwind(AssertUnwindSafe(task));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                Err(PollError::Closed) => return,
                Err(PollError::Timeout) => continue,
            }
        }
    }
}

/// Size requested for the global pool; 0 means "derive from the CPU count".
static GLOBAL_POOL_SIZE: AtomicUsize = AtomicUsize::new(0);

#[cfg(test)]
mod tests {
    use super::*;
    use chdata_common::error::ErrorKind;
    use std::{
        sync::{Barrier, Mutex},
        time::{Duration, Instant},
    };

    #[test]
    #[should_panic]
    fn test_new_thread_pool_zero_threads() {
        ThreadPool::new(0, 0);
    }

    #[test]
    fn test_spawn_simple_task() {
        let pool = ThreadPool::new(2, 2);
        let handle = pool.spawn(|| 42).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn test_spawn_multiple_tasks() {
        let pool = ThreadPool::new(2, 8);
        let handles: Vec<_> = (0..10).map(|i| pool.spawn(move || i * 2).unwrap()).collect();
        let results = JoinHandle::join_all(handles).unwrap();
        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrent_task_execution() {
        let pool = ThreadPool::new(4, 0);
        let start_time = Instant::now();
        let sleep_duration = Duration::from_millis(50);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                pool.spawn(move || {
                    std::thread::sleep(sleep_duration);
                    42
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert!(start_time.elapsed() < sleep_duration * 3);
    }

    #[test]
    fn test_rejects_beyond_capacity() {
        let pool = ThreadPool::new(1, 1);
        assert_eq!(pool.capacity(), 2);
        let gate = Arc::new(Barrier::new(2));

        let running = {
            let gate = gate.clone();
            pool.spawn(move || {
                gate.wait();
                1
            })
            .unwrap()
        };
        let queued = pool.spawn(|| 2).unwrap();

        let err = pool.spawn(|| 3).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Rejected { capacity: 2 }));
        assert!(pool.spawn_detached(|| ()).is_err());

        gate.wait();
        assert_eq!(running.join().unwrap(), 1);
        assert_eq!(queued.join().unwrap(), 2);

        // Capacity is released once tasks finish.
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.in_flight() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pool.spawn(|| 4).unwrap().join().unwrap(), 4);
    }

    #[test]
    fn test_panicking_task() {
        let pool = ThreadPool::new(1, 4);
        let handle = pool.spawn(|| -> u32 { panic!("task failure") }).unwrap();
        let err = handle.join_timeout(Duration::from_secs(5)).unwrap_err();
        assert!(err.is_timeout());

        // The worker survives.
        assert_eq!(pool.spawn(|| 5).unwrap().join().unwrap(), 5);
    }

    #[test]
    fn test_spawn_detached_with_shared_state() {
        let pool = ThreadPool::new(4, 32);
        let shared_vec = Arc::new(Mutex::new(Vec::new()));

        let num_tasks = 20;
        for i in 0..num_tasks {
            let shared_vec = shared_vec.clone();
            pool.spawn_detached(move || {
                shared_vec.lock().unwrap().push(i);
            })
            .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while shared_vec.lock().unwrap().len() < num_tasks && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        let mut sorted_vec = shared_vec.lock().unwrap().clone();
        sorted_vec.sort();
        assert_eq!(sorted_vec, (0..num_tasks).collect::<Vec<_>>());
    }

    #[test]
    fn test_global_thread_pool() {
        let global1 = ThreadPool::global();
        let global2 = ThreadPool::global();
        assert!(std::ptr::eq(global1, global2));
        assert!(global1.threads() >= 1);

        let handle = global1.spawn(|| "global task").unwrap();
        assert_eq!(handle.join().unwrap(), "global task");
    }

    #[test]
    fn test_recursive_task_spawning() {
        let pool = ThreadPool::new(2, 2);
        let inner_pool = pool.clone();

        let handle = pool
            .spawn(move || inner_pool.spawn(|| 100).unwrap().join().unwrap() + 50)
            .unwrap();
        assert_eq!(handle.join().unwrap(), 150);
    }
}
