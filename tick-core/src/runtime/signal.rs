//! Blocking signal queues.
//!
//! A signal is an unbounded FIFO of values guarded by a mutex and a
//! condition variable. `emit` never blocks; `recv` blocks until a value
//! is available. The deque drains as values are consumed, so an
//! alternating emit/recv workload never grows the buffer.

use super::value::Value;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct SignalQueue {
    queue: Mutex<VecDeque<Value>>,
    ready: Condvar,
}

impl SignalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one value and wake one waiting receiver.
    pub fn emit(&self, value: Value) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(value);
        self.ready.notify_one();
    }

    /// Dequeue one value, blocking while the queue is empty.
    pub fn recv(&self) -> Value {
        let mut queue = self.queue.lock().unwrap();
        while queue.is_empty() {
            queue = self.ready.wait(queue).unwrap();
        }
        queue.pop_front().expect("non-empty after wait")
    }

    pub fn has_value(&self) -> bool {
        !self.queue.lock().unwrap().is_empty()
    }
}
