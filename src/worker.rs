use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::harness::Harness;
use crate::queue::JobQueue;
use crate::routes::ExecutionJob;

pub async fn worker(
    id: u8,
    harness: Arc<Harness>,
    queue: Arc<JobQueue>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            job = queue.pop() => {
                let ExecutionJob { id: job_id, request, responder } = job;
                log::info!("Worker {id} got job {job_id} from queue");

                // 1. Run the submission on the blocking pool
                let harness_ref = Arc::clone(&harness);
                let report_handle = tokio::task::spawn_blocking(move || {
                    let report = harness_ref.execute(
                        &request.code,
                        &request.language,
                        &request.test_cases,
                    );
                    log::info!("Job {job_id} finished on worker {id}");
                    report
                });

                // 2. Give back control to the runtime until the job is done
                match report_handle.await {
                    Ok(report) => {
                        if responder.send(report).is_err() {
                            log::warn!("Client of job {job_id} went away before the report was ready");
                        } else {
                            log::debug!("Job {job_id} report sent back from worker {id}");
                        }
                    }
                    Err(e) => {
                        // Dropping the responder makes the handler answer with an internal error
                        log::error!("Job {job_id} failed on worker {id}: {e:?}");
                    }
                }
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}
