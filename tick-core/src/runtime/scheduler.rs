//! Event scheduler: fan-out of processes over the worker pool.
//!
//! Processes register per event in declaration order, and that order is
//! the submission order on every execute. Concurrency happens across
//! the processes of one event; `wait_completion` is the barrier.

use super::bytecode::Instruction;
use super::error::RuntimeError;
use super::interp::Interpreter;
use super::pool::ThreadPool;
use super::runtime::Runtime;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Everything one process invocation needs besides the shared runtime:
/// its name (for diagnostics) and its instruction stream. The string
/// pool and constant pool ride along inside the runtime handle.
#[derive(Debug)]
pub struct ProcessContext {
    pub name: String,
    pub code: Arc<Vec<Instruction>>,
}

pub struct EventScheduler {
    pool: ThreadPool,
    registry: HashMap<String, Vec<Arc<ProcessContext>>>,
    /// Events whose processes are currently dispatched; a re-execute of
    /// one of these would saturate the pool against itself.
    in_flight: Mutex<HashSet<String>>,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::with_pool(ThreadPool::with_default_size())
    }

    pub fn with_pool(pool: ThreadPool) -> Self {
        Self {
            pool,
            registry: HashMap::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Make an event known even before any process attaches to it.
    pub fn register_event(&mut self, event: &str) {
        self.registry.entry(event.to_string()).or_default();
    }

    pub fn register_process(&mut self, event: &str, process: Arc<ProcessContext>) {
        self.registry
            .entry(event.to_string())
            .or_default()
            .push(process);
    }

    pub fn processes_for(&self, event: &str) -> usize {
        self.registry.get(event).map(|v| v.len()).unwrap_or(0)
    }

    /// Submit every process of `event` to the pool. Each task runs a
    /// fresh interpreter over the process's stream; a fault terminates
    /// only that process and is logged.
    pub fn execute(&self, event: &str, runtime: &Arc<Runtime>) -> Result<(), RuntimeError> {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(event.to_string()) {
                return Err(RuntimeError::NestedExecute(event.to_string()));
            }
        }

        let Some(processes) = self.registry.get(event) else {
            return Ok(());
        };

        debug!(
            target: "tick::runtime",
            event,
            processes = processes.len(),
            "executing event"
        );

        for process in processes {
            let runtime = runtime.clone();
            let process = process.clone();
            self.pool.submit(move || {
                let mut interp = Interpreter::new(runtime);
                if let Err(err) = interp.execute(&process.code) {
                    error!(
                        target: "tick::runtime",
                        process = %process.name,
                        %err,
                        "process terminated with a fault"
                    );
                }
            });
        }

        Ok(())
    }

    /// Barrier: returns once every dispatched task has finished. All
    /// in-flight events are complete at that point.
    pub fn wait_completion(&self) {
        self.pool.wait_all();
        self.in_flight.lock().unwrap().clear();
    }
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}
