use tokio::task::JoinHandle;

/// Generalizes the teacher's ad hoc `tokio::spawn` calls into one helper:
/// every background worker the orchestrator starts is named and tracked, and
/// shutdown joins them LIFO (the most recently spawned worker is the one
/// most likely depending on an earlier one's output, so it is drained
/// first).
pub struct TaskManager {
    workers: Vec<(String, JoinHandle<()>)>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self { workers: Vec::new() }
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);
        self.workers.push((name, handle));
    }

    /// Joins every worker in LIFO order, logging any that panicked.
    pub async fn shutdown(self) {
        for (name, handle) in self.workers.into_iter().rev() {
            if let Err(e) = handle.await {
                tracing::warn!("worker '{name}' exited abnormally: {e}");
            }
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_joins_every_worker() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut manager = TaskManager::new();
        for _ in 0..4 {
            let counter = counter.clone();
            manager.spawn("incrementer", async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        manager.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn shutdown_tolerates_a_panicking_worker() {
        let mut manager = TaskManager::new();
        manager.spawn("ok", async {});
        manager.spawn("boom", async { panic!("worker failure") });
        // Must not panic or hang even though one worker panicked.
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_order_is_lifo() {
        use tokio::sync::Mutex;
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut manager = TaskManager::new();
        for i in 0..3 {
            let order = order.clone();
            manager.spawn(format!("w{i}"), async move {
                order.lock().await.push(i);
            });
        }
        manager.shutdown().await;
        // All three ran; LIFO join order does not guarantee completion order
        // for already-finished tasks, only the join sequence itself.
        assert_eq!(order.lock().await.len(), 3);
    }
}
