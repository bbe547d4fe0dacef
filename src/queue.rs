use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use crate::routes::ExecutionJob;

/// FIFO of submissions waiting for a free worker
#[derive(Default)]
pub struct JobQueue {
    queue: Mutex<VecDeque<ExecutionJob>>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, job: ExecutionJob) {
        self.queue.lock().await.push_back(job);
        self.notify.notify_one();
    }

    /// Waits for the oldest job whose requester is still listening
    ///
    /// Jobs whose reply channel closed while queued (the HTTP client went
    /// away) are discarded here instead of being executed for nobody.
    pub async fn pop(&self) -> ExecutionJob {
        loop {
            {
                let mut queue = self.queue.lock().await;
                while let Some(job) = queue.pop_front() {
                    if !job.responder.is_closed() {
                        return job;
                    }
                    log::debug!("Discarding job {}, its requester is gone", job.id);
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::routes::ExecuteRequest;

    fn job(id: u64) -> (ExecutionJob, oneshot::Receiver<crate::model::ExecutionReport>) {
        let (responder, rx) = oneshot::channel();
        let request = ExecuteRequest {
            code: "fn solution(x) { x }".to_string(),
            language: "rhai".to_string(),
            test_cases: Vec::new(),
        };
        (ExecutionJob { id, request, responder }, rx)
    }

    #[tokio::test]
    async fn test_pop_is_fifo() {
        let queue = JobQueue::new();
        let (first, _rx1) = job(1);
        let (second, _rx2) = job(2);
        queue.push(first).await;
        queue.push(second).await;
        assert_eq!(queue.pop().await.id, 1);
        assert_eq!(queue.pop().await.id, 2);
    }

    #[tokio::test]
    async fn test_abandoned_jobs_are_skipped() {
        let queue = JobQueue::new();
        let (abandoned, rx) = job(1);
        drop(rx);
        let (wanted, _rx) = job(2);
        queue.push(abandoned).await;
        queue.push(wanted).await;
        assert_eq!(queue.pop().await.id, 2);

        let (abandoned, rx) = job(3);
        drop(rx);
        queue.push(abandoned).await;
        let waited = tokio::time::timeout(Duration::from_millis(50), queue.pop()).await;
        assert!(waited.is_err());
    }
}
