//! Bounded in-memory dead-letter queue for tasks whose retry budget was
//! exhausted.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct DeadLetterTask {
    pub task_id: String,
    pub reason: String,
    pub enqueued_at: DateTime<Utc>,
}

pub struct DeadLetterQueue {
    capacity: usize,
    tasks: Mutex<VecDeque<DeadLetterTask>>,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tasks: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, task_id: String, reason: String) {
        let mut tasks = self.tasks.lock();
        if tasks.len() >= self.capacity {
            if let Some(evicted) = tasks.pop_front() {
                tracing::warn!(task_id = %evicted.task_id, "evicting oldest dead-letter task to make room");
            }
        }
        tracing::warn!(%task_id, %reason, "task moved to dead-letter queue");
        tasks.push_back(DeadLetterTask { task_id, reason, enqueued_at: Utc::now() });
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drain(&self) -> Vec<DeadLetterTask> {
        self.tasks.lock().drain(..).collect()
    }
}
