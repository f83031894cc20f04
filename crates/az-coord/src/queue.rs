//! Per-task serial command queue.
//!
//! Each task id owns a FIFO of labeled effects. At most one effect per task
//! runs at any instant; completion (success, failure, or timeout) starts the
//! next entry. Enqueueing never cancels a running effect; callers check
//! `is_busy` first when they want a user-visible refusal instead of queueing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Notice emitted when a queue entry exceeds its time budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNotice {
    pub task_id: String,
    pub label: String,
}

struct Entry {
    label: String,
    effect: BoxFuture<'static, ()>,
}

#[derive(Default)]
struct TaskQueue {
    running: Option<String>,
    pending: VecDeque<Entry>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, TaskQueue>,
}

/// Per-task serial queue of labeled async operations.
#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<Mutex<Inner>>,
    timeout: Duration,
    timeouts: Option<mpsc::UnboundedSender<QueueNotice>>,
}

impl CommandQueue {
    /// Create a queue with the given per-entry timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            timeout,
            timeouts: None,
        }
    }

    /// Register a channel receiving timeout notices.
    pub fn with_timeout_notices(mut self, tx: mpsc::UnboundedSender<QueueNotice>) -> Self {
        self.timeouts = Some(tx);
        self
    }

    /// Append an effect to the task's queue. If the task is idle the effect
    /// starts immediately on a background scheduler.
    pub fn enqueue(&self, task_id: &str, label: &str, effect: BoxFuture<'static, ()>) {
        let task_id = task_id.to_string();
        let label = label.to_string();
        let effect_to_start = {
            let mut inner = self.inner.lock().unwrap();
            let task = inner.tasks.entry(task_id.clone()).or_default();
            if task.running.is_none() {
                task.running = Some(label.clone());
                Some(effect)
            } else {
                debug!(task_id, label, "queued behind running entry");
                task.pending.push_back(Entry {
                    label: label.clone(),
                    effect,
                });
                None
            }
        };

        if let Some(effect) = effect_to_start {
            self.drive(task_id, label, effect);
        }
    }

    /// Run one effect, then advance the task's queue until it drains.
    fn drive(&self, task_id: String, label: String, effect: BoxFuture<'static, ()>) {
        let queue = self.clone();
        tokio::spawn(async move {
            let mut current_label = label;
            let mut current_effect = effect;
            loop {
                if tokio::time::timeout(queue.timeout, current_effect).await.is_err() {
                    warn!(task_id, label = current_label, "queue entry timed out");
                    if let Some(tx) = &queue.timeouts {
                        let _ = tx.send(QueueNotice {
                            task_id: task_id.clone(),
                            label: current_label.clone(),
                        });
                    }
                }

                let next = {
                    let mut inner = queue.inner.lock().unwrap();
                    let task = inner.tasks.get_mut(&task_id).expect("task queue exists");
                    match task.pending.pop_front() {
                        Some(entry) => {
                            task.running = Some(entry.label.clone());
                            Some(entry)
                        }
                        None => {
                            inner.tasks.remove(&task_id);
                            None
                        }
                    }
                };

                match next {
                    Some(entry) => {
                        current_label = entry.label;
                        current_effect = entry.effect;
                    }
                    None => return,
                }
            }
        });
    }

    /// Whether the task has a running entry.
    pub fn is_busy(&self, task_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .get(task_id)
            .is_some_and(|t| t.running.is_some())
    }

    /// Label of the running entry, `None` when the task is idle.
    pub fn running_label(&self, task_id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .get(task_id)
            .and_then(|t| t.running.clone())
    }

    /// Whether any task has a running entry.
    pub fn is_any_busy(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .values()
            .any(|t| t.running.is_some())
    }

    /// Labels of all running entries, for quit gating.
    pub fn running_labels(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .values()
            .filter_map(|t| t.running.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queue() -> CommandQueue {
        CommandQueue::new(Duration::from_secs(5))
    }

    async fn settle() {
        // Let spawned drivers make progress
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_fifo_order_per_task() {
        let q = queue();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            q.enqueue(
                "az-1",
                &format!("op{i}"),
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    log.lock().unwrap().push(i);
                }),
            );
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(!q.is_busy("az-1"));
    }

    #[tokio::test]
    async fn test_mutual_exclusion_per_task() {
        let q = queue();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            q.enqueue(
                "az-1",
                "op",
                Box::pin(async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                }),
            );
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tasks_run_in_parallel_across_ids() {
        let q = queue();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for id in ["az-1", "az-2"] {
            let tx = tx.clone();
            q.enqueue(
                id,
                "op",
                Box::pin(async move {
                    tx.send(id).unwrap();
                    // Hold the slot; the other task must still get through
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }),
            );
        }

        let first = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        let second = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(first.is_ok() && second.is_ok());
    }

    #[tokio::test]
    async fn test_running_label_introspection() {
        let q = queue();
        q.enqueue(
            "az-1",
            "merge",
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(150)).await;
            }),
        );
        settle().await;

        assert!(q.is_busy("az-1"));
        assert!(!q.is_busy("az-2"));
        assert_eq!(q.running_label("az-1").as_deref(), Some("merge"));
        assert!(q.is_any_busy());
        assert_eq!(q.running_labels(), vec!["merge".to_string()]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(q.running_label("az-1"), None);
        assert!(!q.is_any_busy());
    }

    #[tokio::test]
    async fn test_timeout_advances_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let q = CommandQueue::new(Duration::from_millis(50)).with_timeout_notices(tx);
        let ran_second = Arc::new(AtomicUsize::new(0));

        q.enqueue(
            "az-1",
            "stuck",
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }),
        );
        let flag = Arc::clone(&ran_second);
        q.enqueue(
            "az-1",
            "next",
            Box::pin(async move {
                flag.store(1, Ordering::SeqCst);
            }),
        );

        let notice = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.label, "stuck");
        assert_eq!(notice.task_id, "az-1");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ran_second.load(Ordering::SeqCst), 1);
        assert!(!q.is_busy("az-1"));
    }

    #[tokio::test]
    async fn test_enqueue_does_not_cancel_running() {
        let q = queue();
        let finished = Arc::new(AtomicUsize::new(0));

        let f1 = Arc::clone(&finished);
        q.enqueue(
            "az-1",
            "first",
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(80)).await;
                f1.fetch_add(1, Ordering::SeqCst);
            }),
        );
        settle().await;
        let f2 = Arc::clone(&finished);
        q.enqueue(
            "az-1",
            "second",
            Box::pin(async move {
                f2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }
}
