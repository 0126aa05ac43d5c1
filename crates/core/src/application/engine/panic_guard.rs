// Panic isolation for strategy calls
use std::any::Any;
use std::future::Future;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed
    Success(T),
    /// Execution panicked
    Panicked(String),
    /// Task was aborted before completing
    Aborted,
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Strategy call running on its own task
///
/// Dropping the guard aborts the task, so a worker that is torn down or gives
/// up on the call never leaves it running detached.
pub struct GuardedTask<T> {
    handle: tokio::task::JoinHandle<T>,
}

/// Spawn `future` so a panic fails one target, not the worker
pub fn spawn_guarded<F, T>(future: F) -> GuardedTask<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    GuardedTask {
        handle: tokio::task::spawn(future),
    }
}

impl<T> GuardedTask<T> {
    /// Handle for tearing the task down if an outer guard gives up on it
    pub fn abort_handle(&self) -> tokio::task::AbortHandle {
        self.handle.abort_handle()
    }

    pub async fn join(mut self) -> PanicGuardResult<T> {
        match (&mut self.handle).await {
            Ok(value) => PanicGuardResult::Success(value),
            Err(join_err) if join_err.is_panic() => {
                let panic_msg = panic_message(join_err.into_panic());
                error!(panic_msg = %panic_msg, "Strategy task panicked");
                PanicGuardResult::Panicked(panic_msg)
            }
            Err(_) => PanicGuardResult::Aborted,
        }
    }
}

impl<T> Drop for GuardedTask<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawn and wait in one step
pub async fn execute_guarded<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    spawn_guarded(future).join().await
}
