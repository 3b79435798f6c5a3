//! Write-behind queue
//!
//! Foreground writes enqueue a [`WriteTask`]; a single drainer thread
//! applies each task to the authoritative store. The drainer paces itself by
//! queue depth and blocks on a condition variable when idle. Processor
//! errors are logged and never interrupt draining. Ordering is FIFO per
//! enqueue order; duplicate keys are not coalesced, the store's
//! last-writer-wins resolves them.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cache::error::CacheError;
use crate::telemetry::CacheMetrics;

/// Default bound on queued tasks; excess enqueues are dropped with a warning.
pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 10_000;

/// One deferred write to the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTask {
    pub key: String,
    pub value: String,
    pub ttl: Duration,
}

/// Side effect applied to each drained task, `Database::set` in practice.
pub type WriteProcessor = Box<dyn Fn(&WriteTask) -> Result<(), CacheError> + Send>;

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<WriteTask>,
    stopped: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

/// Bounded FIFO of deferred store writes with an adaptive drain rate.
pub struct WriteBehindQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
    metrics: Arc<CacheMetrics>,
    debug: bool,
}

impl WriteBehindQueue {
    pub fn new(
        processor: WriteProcessor,
        capacity: usize,
        metrics: Arc<CacheMetrics>,
        debug: bool,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = spawn_drainer(Arc::clone(&shared), processor, Arc::clone(&metrics), debug);
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
            capacity,
            metrics,
            debug,
        }
    }

    /// Append a task. After `stop`, or when the queue is full, the task is
    /// dropped and counted.
    pub fn enqueue(&self, task: WriteTask) {
        let mut state = lock(&self.shared.state);
        if state.stopped {
            log::warn!("write queue stopped, dropping task for key={}", task.key);
            self.metrics.record_write_task_dropped();
            return;
        }
        if state.tasks.len() >= self.capacity {
            log::warn!("write queue full, dropping task for key={}", task.key);
            self.metrics.record_write_task_dropped();
            return;
        }
        if self.debug {
            log::debug!("enqueuing write task for key={}", task.key);
        }
        state.tasks.push_back(task);
        self.metrics.set_write_queue_depth(state.tasks.len());
        drop(state);
        self.shared.wakeup.notify_one();
    }

    /// Current queue depth.
    pub fn depth(&self) -> usize {
        lock(&self.shared.state).tasks.len()
    }

    /// Stop the drainer after its in-flight task. Idempotent; remaining
    /// queued tasks are discarded.
    pub fn stop(&self) {
        {
            let mut state = lock(&self.shared.state);
            if state.stopped {
                return;
            }
            state.stopped = true;
            let remaining = state.tasks.len();
            if remaining > 0 {
                log::warn!("write queue stopping with {} unprocessed tasks", remaining);
            }
        }
        self.shared.wakeup.notify_all();
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WriteBehindQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain interval for the given queue depth.
fn interval_for_depth(depth: usize) -> Duration {
    match depth {
        d if d > 10 => Duration::from_millis(80),
        d if d > 7 => Duration::from_millis(200),
        d if d > 4 => Duration::from_millis(400),
        _ => Duration::from_millis(600),
    }
}

fn spawn_drainer(
    shared: Arc<Shared>,
    processor: WriteProcessor,
    metrics: Arc<CacheMetrics>,
    debug: bool,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        let task = {
            let mut state = lock(&shared.state);
            loop {
                if state.stopped {
                    return;
                }
                if state.tasks.is_empty() {
                    state = shared
                        .wakeup
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    continue;
                }
                // Pace one task per tick; wakeups during the wait never
                // restart the deadline.
                let deadline = Instant::now() + interval_for_depth(state.tasks.len());
                loop {
                    if state.stopped {
                        return;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let (guard, _timeout) = shared
                        .wakeup
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    state = guard;
                }
                match state.tasks.pop_front() {
                    Some(task) => {
                        metrics.set_write_queue_depth(state.tasks.len());
                        break task;
                    }
                    None => continue,
                }
            }
        };

        if debug {
            log::debug!("processing write task for key={}", task.key);
        }
        if let Err(err) = processor(&task) {
            log::error!("write-behind task for key={} failed: {}", task.key, err);
        }
        metrics.record_write_task_processed();
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recording_queue(capacity: usize) -> (WriteBehindQueue, Arc<StdMutex<Vec<String>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor: WriteProcessor = Box::new(move |task| {
            sink.lock().unwrap().push(task.key.clone());
            Ok(())
        });
        let queue = WriteBehindQueue::new(
            processor,
            capacity,
            Arc::new(CacheMetrics::new()),
            false,
        );
        (queue, seen)
    }

    fn task(key: &str) -> WriteTask {
        WriteTask {
            key: key.to_string(),
            value: "v".to_string(),
            ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn tasks_are_processed_in_enqueue_order() {
        let (queue, seen) = recording_queue(DEFAULT_WRITE_QUEUE_CAPACITY);
        for i in 0..10 {
            queue.enqueue(task(&format!("k{}", i)));
        }

        let deadline = Instant::now() + Duration::from_secs(8);
        while seen.lock().unwrap().len() < 10 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        let processed = seen.lock().unwrap().clone();
        let expected: Vec<String> = (0..10).map(|i| format!("k{}", i)).collect();
        assert_eq!(processed, expected);
    }

    #[test]
    fn stop_is_idempotent_and_rejects_later_tasks() {
        let (queue, seen) = recording_queue(DEFAULT_WRITE_QUEUE_CAPACITY);
        queue.stop();
        queue.stop();

        queue.enqueue(task("late"));
        std::thread::sleep(Duration::from_millis(100));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn full_queue_drops_newest() {
        // Processor that blocks draining long enough for the bound to matter.
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor: WriteProcessor = Box::new(move |task| {
            sink.lock().unwrap().push(task.key.clone());
            Ok(())
        });
        let queue = WriteBehindQueue::new(processor, 2, Arc::new(CacheMetrics::new()), false);

        queue.enqueue(task("a"));
        queue.enqueue(task("b"));
        queue.enqueue(task("c"));
        // Depth never exceeds the bound of 2.
        assert!(queue.depth() <= 2);
    }

    #[test]
    fn processor_errors_do_not_stop_the_drain() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor: WriteProcessor = Box::new(move |task| {
            sink.lock().unwrap().push(task.key.clone());
            Err(CacheError::store("injected failure"))
        });
        let queue = WriteBehindQueue::new(
            processor,
            DEFAULT_WRITE_QUEUE_CAPACITY,
            Arc::new(CacheMetrics::new()),
            false,
        );

        queue.enqueue(task("a"));
        queue.enqueue(task("b"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
