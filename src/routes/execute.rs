use std::sync::atomic::{AtomicU64, Ordering};

use actix_web::{HttpResponse, Responder, post, web};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::ErrorResponse;
use crate::model::{ExecutionReport, TestCase};
use crate::queue::JobQueue;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// A request waiting in the queue, with the channel its report goes back on
pub struct ExecutionJob {
    pub id: u64,
    pub request: ExecuteRequest,
    pub responder: oneshot::Sender<ExecutionReport>,
}

#[post("/execute")]
pub async fn post_execute_handler(
    job_queue: web::Data<JobQueue>,
    body: web::Json<ExecuteRequest>,
) -> impl Responder {
    let job_id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
    let request = body.into_inner();
    log::info!(
        "Queued job {job_id}: {} submission with {} cases",
        request.language,
        request.test_cases.len()
    );

    let (tx, rx) = oneshot::channel::<ExecutionReport>();
    job_queue
        .push(ExecutionJob {
            id: job_id,
            request,
            responder: tx,
        })
        .await;

    match rx.await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => {
            log::error!("Job {job_id} was dropped before reporting: {e}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 6,
            })
        }
    }
}
