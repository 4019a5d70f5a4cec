//! Polling and callback consumption of asynchronous results.

use std::fmt;
use std::time::Duration;

use hermes_core::{ExecutionError, Fault};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

use crate::task::TaskId;

enum State<T> {
    Running(JoinHandle<Result<T, ExecutionError>>),
    Ready(Result<T, ExecutionError>),
    Taken,
}

/// Handle to a result computed on the executor.
///
/// The result can be polled with [`is_done`](Self::is_done), awaited with
/// [`get`](Self::get) or [`get_timeout`](Self::get_timeout), or abandoned with
/// [`cancel`](Self::cancel). Dropping the handle does not cancel the work.
pub struct ResponseFuture<T> {
    id: TaskId,
    state: State<T>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl<T> ResponseFuture<T> {
    pub(crate) fn spawned(
        id: TaskId,
        handle: JoinHandle<Result<T, ExecutionError>>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            state: State::Running(handle),
            cancel_tx: Some(cancel_tx),
        }
    }

    /// Creates an already completed future.
    pub fn ready(result: Result<T, ExecutionError>) -> Self {
        Self {
            id: TaskId::new(),
            state: State::Ready(result),
            cancel_tx: None,
        }
    }

    /// Creates an already failed future.
    pub fn failed(error: ExecutionError) -> Self {
        Self::ready(Err(error))
    }

    /// The task ID on the executor.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns `true` once a result is available.
    pub fn is_done(&self) -> bool {
        match &self.state {
            State::Running(handle) => handle.is_finished(),
            State::Ready(_) | State::Taken => true,
        }
    }

    /// Requests cancellation.
    ///
    /// Returns `false` if the result is already available or cancellation was
    /// already requested. A cancelled future yields [`ExecutionError::Cancelled`].
    pub fn cancel(&mut self) -> bool {
        if self.is_done() {
            return false;
        }
        match self.cancel_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Waits for the result.
    pub async fn get(self) -> Result<T, ExecutionError> {
        match self.state {
            State::Running(handle) => flatten(handle.await),
            State::Ready(result) => result,
            State::Taken => Err(already_taken()),
        }
    }

    /// Waits at most `timeout` for the result.
    ///
    /// On [`ExecutionError::Timeout`] the future is left intact and may be
    /// waited on again. Any other outcome consumes the result.
    pub async fn get_timeout(&mut self, timeout: Duration) -> Result<T, ExecutionError> {
        if let State::Running(handle) = &mut self.state {
            let joined = match tokio::time::timeout(timeout, handle).await {
                Ok(joined) => joined,
                Err(_) => return Err(ExecutionError::Timeout(timeout)),
            };
            self.state = State::Taken;
            return flatten(joined);
        }
        match std::mem::replace(&mut self.state, State::Taken) {
            State::Ready(result) => result,
            _ => Err(already_taken()),
        }
    }
}

impl<T> fmt::Debug for ResponseFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("id", &self.id)
            .field("done", &self.is_done())
            .finish()
    }
}

fn flatten<T>(joined: Result<Result<T, ExecutionError>, JoinError>) -> Result<T, ExecutionError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(ExecutionError::Cancelled),
        Err(e) => Err(ExecutionError::Failed(Fault::runtime(format!("task panicked: {e}")))),
    }
}

fn already_taken() -> ExecutionError {
    ExecutionError::Failed(Fault::runtime("response already taken"))
}

/// Receives the outcome of an asynchronous invocation, exactly once.
pub trait AsyncHandler<T>: Send + 'static {
    /// Called with the response or the error.
    fn handle_response(self, result: Result<T, ExecutionError>);
}

impl<T, F> AsyncHandler<T> for F
where
    F: FnOnce(Result<T, ExecutionError>) + Send + 'static,
{
    fn handle_response(self, result: Result<T, ExecutionError>) {
        self(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_future() {
        let future = ResponseFuture::ready(Ok(7));
        assert!(future.is_done());
        assert_eq!(future.get().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_failed_future_cannot_cancel() {
        let mut future: ResponseFuture<()> = ResponseFuture::failed(ExecutionError::ExecutorShutdown);
        assert!(!future.cancel());
        assert!(future.get().await.unwrap_err().is_shutdown());
    }

    #[tokio::test]
    async fn test_get_timeout_keeps_future() {
        let (tx, rx) = oneshot::channel::<u32>();
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(async move { rx.await.map_err(|_| ExecutionError::Cancelled) });
        let mut future = ResponseFuture::spawned(TaskId::new(), handle, cancel_tx);

        let err = future.get_timeout(Duration::from_millis(10)).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!future.is_done());

        tx.send(5).unwrap();
        assert_eq!(future.get_timeout(Duration::from_secs(1)).await.unwrap(), 5);
        assert!(future.get().await.is_err());
    }

    #[tokio::test]
    async fn test_aborted_task_reports_cancelled() {
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ExecutionError>(())
        });
        handle.abort();
        let future = ResponseFuture::spawned(TaskId::new(), handle, cancel_tx);
        assert!(future.get().await.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_closure_is_async_handler() {
        let (tx, mut rx) = oneshot::channel();
        let handler = move |result: Result<u8, ExecutionError>| {
            let _ = tx.send(result.is_ok());
        };
        handler.handle_response(Ok(1));
        assert!(rx.try_recv().unwrap());
    }
}
