// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity FIFO buffer of encoded lines.
//!
//! Producers call [`BoundedQueue::enqueue`] from any thread; the flusher drains batches.
//! When the queue is full new lines are rejected rather than evicting older ones, and the
//! caller is responsible for counting the drop.

use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug)]
pub struct BoundedQueue {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        BoundedQueue {
            lines: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `line` unless the queue is full. Never blocks on I/O.
    pub fn enqueue(&self, line: String) -> bool {
        #[allow(clippy::expect_used)]
        let mut lines = self.lines.lock().expect("lock poisoned");
        if lines.len() >= self.capacity {
            return false;
        }
        lines.push_back(line);
        true
    }

    /// Removes and returns up to `max_n` of the oldest lines.
    pub fn drain(&self, max_n: usize) -> Vec<String> {
        #[allow(clippy::expect_used)]
        let mut lines = self.lines.lock().expect("lock poisoned");
        let n = max_n.min(lines.len());
        lines.drain(..n).collect()
    }

    /// Puts a batch back ahead of anything enqueued since it was drained.
    ///
    /// Lines that no longer fit are discarded, newest first, and their number is returned.
    pub fn requeue_front(&self, batch: Vec<String>) -> usize {
        #[allow(clippy::expect_used)]
        let mut lines = self.lines.lock().expect("lock poisoned");
        let room = self.capacity.saturating_sub(lines.len());
        let dropped = batch.len().saturating_sub(room);
        for line in batch.into_iter().take(room).rev() {
            lines.push_front(line);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.lines.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }
}
