//! Task queue: strict FIFO of recordings with a single consumer
//!
//! Producers append; the worker peeks the head, works on it while it stays
//! visible in the queue, then removes it. The queue itself never fails.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info};

use crate::backend::AudioHandle;
use crate::events::StateEvent;

/// Where a task is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
}

/// One recording-to-response unit
#[derive(Debug)]
struct Task {
    id: u64,
    audio: Option<AudioHandle>,
    transcript: Option<String>,
    status: TaskStatus,
}

/// Inspectable copy of a queued task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: u64,
    pub status: TaskStatus,
    pub transcript: Option<String>,
}

/// The head task as handed to the worker
#[derive(Debug)]
pub struct ActiveTask {
    pub id: u64,
    /// Moved out of the queued task; `None` only if already consumed
    pub audio: Option<AudioHandle>,
}

/// FIFO of tasks with a wake signal for the consumer
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    next_id: AtomicU64,
    wake: Notify,
    event_tx: broadcast::Sender<StateEvent>,
}

impl TaskQueue {
    pub fn new(event_tx: broadcast::Sender<StateEvent>) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            wake: Notify::new(),
            event_tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a recording at the tail and wake the worker; returns the task id
    pub fn enqueue(&self, audio: AudioHandle) -> u64 {
        let (id, queue_len) = {
            let mut tasks = self.lock();
            // Ids are taken under the lock so they follow append order
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            tasks.push_back(Task {
                id,
                audio: Some(audio),
                transcript: None,
                status: TaskStatus::Queued,
            });
            (id, tasks.len())
        };

        info!(task_id = id, queue_len, "task added to queue");
        let _ = self.event_tx.send(StateEvent::TaskQueued {
            task_id: id,
            queue_len,
        });
        self.wake.notify_one();
        id
    }

    /// Mark the head as processing and hand out its audio, leaving it queued
    pub fn dequeue_head(&self) -> Option<ActiveTask> {
        let mut tasks = self.lock();
        let head = tasks.front_mut()?;
        head.status = TaskStatus::Processing;
        Some(ActiveTask {
            id: head.id,
            audio: head.audio.take(),
        })
    }

    /// Record the transcript on the head task; it is set at most once
    pub fn set_head_transcript(&self, transcript: &str) {
        let mut tasks = self.lock();
        if let Some(head) = tasks.front_mut() {
            if head.transcript.is_none() {
                head.transcript = Some(transcript.to_string());
            }
        }
    }

    /// Drop the head task; no-op on an empty queue
    pub fn remove_head(&self) -> Option<u64> {
        let removed = self.lock().pop_front().map(|task| task.id);
        match removed {
            Some(id) => debug!(task_id = id, "task removed from queue"),
            None => debug!("remove on empty queue ignored"),
        }
        removed
    }

    /// Park until the queue is non-empty
    pub async fn wait_for_task(&self) {
        loop {
            let notified = self.wake.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every task in queue order
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.lock()
            .iter()
            .map(|task| TaskSnapshot {
                id: task.id,
                status: task.status,
                transcript: task.transcript.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn create_queue() -> TaskQueue {
        let (tx, _) = broadcast::channel(1024);
        TaskQueue::new(tx)
    }

    fn clip(name: &str) -> AudioHandle {
        AudioHandle::new(format!("/nonexistent/{name}.wav"))
    }

    #[test]
    fn test_peek_keeps_head_visible() {
        let queue = create_queue();
        let id = queue.enqueue(clip("a"));

        let active = queue.dequeue_head().unwrap();
        assert_eq!(active.id, id);
        assert!(active.audio.is_some());

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, TaskStatus::Processing);

        assert_eq!(queue.remove_head(), Some(id));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_on_empty_is_noop() {
        let queue = create_queue();
        assert_eq!(queue.remove_head(), None);
        assert!(queue.dequeue_head().is_none());
    }

    #[test]
    fn test_transcript_set_once() {
        let queue = create_queue();
        queue.enqueue(clip("a"));
        queue.dequeue_head();
        queue.set_head_transcript("first");
        queue.set_head_transcript("second");
        assert_eq!(queue.snapshot()[0].transcript.as_deref(), Some("first"));
    }

    #[test]
    fn test_enqueue_reports_length() {
        let (tx, mut rx) = broadcast::channel(16);
        let queue = TaskQueue::new(tx);
        queue.enqueue(clip("a"));
        queue.enqueue(clip("b"));

        assert!(matches!(
            rx.try_recv().unwrap(),
            StateEvent::TaskQueued { queue_len: 1, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            StateEvent::TaskQueued { queue_len: 2, .. }
        ));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_fifo_with_concurrent_producers() {
        let queue = Arc::new(create_queue());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| queue.enqueue(clip(&format!("{p}-{i}"))))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for producer in producers {
            let ids = producer.join().unwrap();
            // Each producer's own appends stay in its order
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }

        let mut drained = Vec::new();
        while let Some(active) = queue.dequeue_head() {
            drained.push(active.id);
            queue.remove_head();
        }
        assert_eq!(drained.len(), 200);
        assert!(drained.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_enqueue() {
        let queue = Arc::new(create_queue());
        let waiter = Arc::clone(&queue);
        let handle = tokio::spawn(async move { waiter.wait_for_task().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        queue.enqueue(clip("a"));
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_wait_returns_immediately_when_non_empty() {
        let queue = create_queue();
        queue.enqueue(clip("a"));
        tokio_test::block_on(queue.wait_for_task());
    }
}
