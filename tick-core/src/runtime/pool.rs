//! Fixed-size worker thread pool.
//!
//! Tasks are queued behind a mutex + condition variable. `wait_all`
//! spins politely (short sleeps) until the active-task counter drains.
//! Dropping the pool sets the shutdown flag, wakes every waiter and
//! joins all workers, so teardown cannot race a final execute.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::trace;

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct PoolState {
    tasks: VecDeque<Task>,
    active: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    work_ready: Condvar,
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Pool sized to the number of online processors (fallback 4).
    /// Never below two workers: processes of one event must be able to
    /// block on each other's signals.
    pub fn with_default_size() -> Self {
        let size = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(size.max(2))
    }

    pub fn new(num_threads: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::default()),
            work_ready: Condvar::new(),
        });

        let workers = (0..num_threads.max(1))
            .map(|i| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("tick-worker-{i}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a task and wake one waiting worker.
    pub fn submit<F: FnOnce() + Send + 'static>(&self, task: F) {
        let mut state = self.shared.state.lock().unwrap();
        state.tasks.push_back(Box::new(task));
        state.active += 1;
        self.shared.work_ready.notify_one();
    }

    /// Block until every submitted task has finished.
    pub fn wait_all(&self) {
        loop {
            {
                let state = self.shared.state.lock().unwrap();
                if state.active == 0 {
                    return;
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut state = shared.state.lock().unwrap();
            while state.tasks.is_empty() && !state.shutdown {
                state = shared.work_ready.wait(state).unwrap();
            }
            if state.shutdown {
                return;
            }
            state.tasks.pop_front().expect("non-empty after wait")
        };

        task();

        let mut state = shared.state.lock().unwrap();
        state.active -= 1;
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
        }
        self.shared.work_ready.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        trace!(target: "tick::runtime", "thread pool shut down");
    }
}
