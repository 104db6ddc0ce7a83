use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use tokio::sync::{mpsc, oneshot};

use crate::error::{AppError, AppResult};

/// A queued job together with the channel its result goes back on
struct JobMessage<J, R> {
    job: J,
    reply: oneshot::Sender<AppResult<R>>,
}

/// Serialized inference lane
///
/// Owns one dedicated OS thread that runs jobs strictly one at a time in submission
/// order. The model is built to use every core for a single call, so running two jobs
/// at once only makes both slower. Async callers wait on a oneshot reply without
/// blocking the runtime.
pub struct InferenceWorker<J, R> {
    job_tx: mpsc::UnboundedSender<JobMessage<J, R>>,
}

impl<J, R> Clone for InferenceWorker<J, R> {
    fn clone(&self) -> Self {
        Self {
            job_tx: self.job_tx.clone(),
        }
    }
}

impl<J, R> InferenceWorker<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// Starts the worker thread
    ///
    /// The thread exits once every handle to the worker has been dropped and the queue
    /// has drained.
    pub fn spawn<F>(handler: F) -> AppResult<Self>
    where
        F: Fn(J) -> AppResult<R> + Send + 'static,
    {
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        thread::Builder::new()
            .name("inference-worker".to_string())
            .spawn(move || Self::worker_loop(handler, job_rx))?;

        Ok(Self { job_tx })
    }

    fn worker_loop<F>(handler: F, mut job_rx: mpsc::UnboundedReceiver<JobMessage<J, R>>)
    where
        F: Fn(J) -> AppResult<R>,
    {
        tracing::info!("Inference worker started");

        while let Some(JobMessage { job, reply }) = job_rx.blocking_recv() {
            let result = catch_unwind(AssertUnwindSafe(|| handler(job))).unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "Inference job panicked");
                Err(AppError::Internal(format!("inference job panicked: {}", message)))
            });

            if reply.send(result).is_err() {
                tracing::debug!("Caller went away before the inference job finished");
            }
        }

        tracing::info!("Inference worker stopped");
    }

    /// Queues a job and waits for its result
    pub async fn submit(&self, job: J) -> AppResult<R> {
        let (reply, result_rx) = oneshot::channel();

        self.job_tx
            .send(JobMessage { job, reply })
            .map_err(|_| AppError::Internal("inference worker is not running".to_string()))?;

        result_rx
            .await
            .map_err(|_| AppError::Internal("inference worker dropped the job".to_string()))?
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
