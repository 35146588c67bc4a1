//! Worker-call wrapper.
//!
//! Runs database operations as tasks on a runtime owned by the worker, so the
//! caller's thread never drives I/O itself. [`Worker::call`] blocks until the
//! task finishes and hands back its result; [`Worker::spawn`] returns the join
//! handle instead and leaves the waiting to the caller.

use crate::error::TabulaError;

use std::cell::Cell;
use std::future::Future;
use std::sync::mpsc;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

thread_local! {
    static ON_WORKER_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Executes operations on a dedicated tokio runtime.
pub struct Worker {
    runtime: Runtime,
}

impl Worker {
    /// Create a worker backed by a multi-thread runtime with `threads` threads.
    pub fn new(threads: usize) -> Result<Self, TabulaError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("tabula-worker")
            .on_thread_start(|| ON_WORKER_THREAD.with(|flag| flag.set(true)))
            .enable_all()
            .build()
            .map_err(|e| TabulaError::internal(format!("Failed to create tokio runtime: {e}")))?;

        tracing::debug!(threads, "Worker runtime started");

        Ok(Self { runtime })
    }

    /// Run `operation` on the worker and wait for it to finish.
    ///
    /// The operation's own error is returned unchanged. A panic inside the
    /// operation comes back as [`TabulaError::Worker`].
    ///
    /// Any thread may call this, including `spawn_blocking` threads and the
    /// threads of another runtime (which are stalled while waiting). Calls made
    /// from a worker's own runtime threads are refused with
    /// [`TabulaError::Worker`], since waiting there can starve the operation.
    pub fn call<F, T>(&self, operation: F) -> Result<T, TabulaError>
    where
        F: Future<Output = Result<T, TabulaError>> + Send + 'static,
        T: Send + 'static,
    {
        if ON_WORKER_THREAD.with(Cell::get) {
            return Err(TabulaError::worker(
                "call() blocks and cannot be used from a worker thread; use spawn() and await",
            ));
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let task = self.runtime.spawn(operation);
        self.runtime.spawn(async move {
            // The receiver only goes away if the caller stopped waiting.
            let _ = tx.send(task.await);
        });

        rx.recv()
            .map_err(|_| TabulaError::worker("Worker runtime shut down before the operation finished"))??
    }

    /// Run `operation` and discard any failure.
    ///
    /// Returns `None` when the operation fails or panics. Use [`Worker::call`]
    /// unless the caller explicitly wants failures to be invisible.
    pub fn call_or_none<F, T>(&self, operation: F) -> Option<T>
    where
        F: Future<Output = Result<T, TabulaError>> + Send + 'static,
        T: Send + 'static,
    {
        match self.call(operation) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "Discarding worker failure");
                None
            }
        }
    }

    /// Spawn `future` on the worker without waiting for it.
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.runtime.spawn(future)
    }

}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn double(x: i64) -> Result<i64, TabulaError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(x * 2)
    }

    async fn failing() -> Result<i64, TabulaError> {
        Err(TabulaError::invalid_data("bad row"))
    }

    #[test]
    fn test_call_returns_what_the_operation_returns() {
        let worker = Worker::new(1).unwrap();
        assert_eq!(worker.call(double(21)).unwrap(), 42);

        let direct = Runtime::new().unwrap().block_on(double(21)).unwrap();
        assert_eq!(worker.call(double(21)).unwrap(), direct);
    }

    #[test]
    fn test_call_runs_off_the_calling_thread() {
        let worker = Worker::new(1).unwrap();
        let caller = std::thread::current().id();
        let ran_on = worker.call(async { Ok(std::thread::current().id()) }).unwrap();
        assert_ne!(caller, ran_on);
    }

    #[test]
    fn test_call_waits_for_completion() {
        let worker = Worker::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        worker
            .call(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_call_propagates_errors() {
        let worker = Worker::new(1).unwrap();
        let err = worker.call(failing()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid data: bad row");
    }

    #[test]
    fn test_call_turns_panics_into_worker_errors() {
        let worker = Worker::new(1).unwrap();
        let err = worker
            .call(async {
                if true {
                    panic!("kaboom");
                }
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.category(), "Worker");

        // The runtime survives a panicking task.
        assert_eq!(worker.call(double(1)).unwrap(), 2);
    }

    #[test]
    fn test_call_or_none_swallows_failures() {
        let worker = Worker::new(1).unwrap();
        assert_eq!(worker.call_or_none(double(4)), Some(8));
        assert_eq!(worker.call_or_none(failing()), None);
    }

    #[test]
    fn test_spawn_can_be_awaited() {
        let worker = Worker::new(2).unwrap();
        let handle = worker.spawn(async { 7 });
        let value = worker.call(async move { Ok(handle.await?) }).unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_call_works_from_blocking_threads() {
        let value = tokio::task::spawn_blocking(|| {
            let worker = Worker::new(1).unwrap();
            worker.call(double(5))
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(value, 10);
    }

    #[tokio::test]
    async fn test_call_inside_another_runtime_waits() {
        let worker = tokio::task::spawn_blocking(|| Worker::new(1)).await.unwrap().unwrap();
        assert_eq!(worker.call(double(2)).unwrap(), 4);

        // spawn still works from async code.
        let handle = worker.spawn(double(3));
        assert_eq!(handle.await.unwrap().unwrap(), 6);

        // Dropping a runtime inside an async context panics; hand it off.
        tokio::task::spawn_blocking(move || drop(worker)).await.unwrap();
    }

    #[test]
    fn test_call_refuses_worker_threads() {
        let worker = Arc::new(Worker::new(1).unwrap());
        let inner = worker.clone();
        let nested = worker.call(async move { Ok(inner.call(double(1))) }).unwrap();

        let err = nested.unwrap_err();
        assert_eq!(err.category(), "Worker");
        assert!(err.to_string().contains("worker thread"));
        assert_eq!(worker.call(double(1)).unwrap(), 2);
    }
}
