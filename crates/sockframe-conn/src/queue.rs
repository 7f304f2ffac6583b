use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serial executor for completion callbacks.
///
/// Jobs run one at a time, in dispatch order, on a single drainer task, so
/// callback ordering is preserved. Clones share the same underlying queue;
/// a queue may be handed to several connections to serialize all of their
/// callbacks together.
#[derive(Clone)]
pub struct SerialQueue {
    jobs: mpsc::UnboundedSender<Job>,
}

impl SerialQueue {
    /// Create a queue backed by a newly spawned drainer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let (jobs, mut pending) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = pending.recv().await {
                job();
            }
        });
        Self { jobs }
    }

    /// Schedule a job to run after all previously dispatched jobs.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.jobs.send(Box::new(job));
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn jobs_run_in_dispatch_order() {
        let queue = SerialQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..100u32 {
            let tx = tx.clone();
            queue.dispatch(move || {
                let _ = tx.send(i);
            });
        }

        for expected in 0..100u32 {
            assert_eq!(rx.recv().await, Some(expected));
        }
    }

    #[tokio::test]
    async fn clones_share_one_queue() {
        let queue = SerialQueue::new();
        let clone = queue.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = tx.clone();
        queue.dispatch(move || {
            let _ = first.send("first");
        });
        clone.dispatch(move || {
            let _ = tx.send("second");
        });

        assert_eq!(rx.recv().await, Some("first"));
        assert_eq!(rx.recv().await, Some("second"));
    }
}
