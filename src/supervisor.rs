//! Error boundary for per-unit-of-work workers.
//!
//! [`supervise`] runs a future on its own task and turns a panic inside it
//! into a [`WorkerFault`], so a misbehaving executor or driver fails its own
//! unit of work instead of the scheduler loop.

use std::any::Any;
use std::future::Future;
use thiserror::Error;
use tokio::task::JoinError;

/// Failure that escaped a supervised worker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerFault {
    /// The worker panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// The worker was aborted before it finished.
    #[error("worker was cancelled before completion")]
    Cancelled,
}

/// Runs `work` on its own task and waits for it.
///
/// # Errors
///
/// Returns [`WorkerFault::Panicked`] with the panic message when the worker
/// panics, or [`WorkerFault::Cancelled`] when it is aborted.
pub async fn supervise<F, T>(work: F) -> Result<T, WorkerFault>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work).await.map_err(fault_from_join_error)
}

fn fault_from_join_error(err: JoinError) -> WorkerFault {
    if err.is_panic() {
        WorkerFault::Panicked(panic_message(err.into_panic()))
    } else {
        WorkerFault::Cancelled
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(other) => other
            .downcast_ref::<&'static str>()
            .map_or_else(|| String::from("non-string panic payload"), |message| (*message).to_owned()),
    }
}
