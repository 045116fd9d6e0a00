//! Runtime and session task management for the relay server
//!
//! This module builds the multi-threaded runtime the server runs on and
//! keeps track of every spawned session so they can all be joined before
//! the process exits.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::{RelayError, Result};

/// Build the multi-threaded runtime described by `config`
///
/// # Arguments
/// * `config` - Server configuration containing the worker thread count
///
/// # Returns
/// A `Result` containing the runtime or an error
pub fn build_runtime(config: &ServerConfig) -> Result<Runtime> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_io()
        .enable_time()
        .thread_name("rusty-relay-worker")
        .build()
        .map_err(|e| RelayError::SystemError(format!("Failed to build runtime: {}", e)))?;

    info!("Created runtime with {} worker threads", config.worker_threads);
    Ok(runtime)
}

/// Tracked set of session tasks
pub struct SessionPool<T> {
    handles: Vec<JoinHandle<T>>,
    /// Sessions spawned and not yet finished
    active_tasks: Arc<AtomicUsize>,
}

impl<T: Send + 'static> SessionPool<T> {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            active_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn a session and keep its handle for `join_all`
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        // Finished handles carry nothing worth keeping
        self.handles.retain(|handle| !handle.is_finished());

        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        let active_tasks = Arc::clone(&self.active_tasks);

        let handle = tokio::spawn(async move {
            let result = future.await;
            active_tasks.fetch_sub(1, Ordering::SeqCst);
            result
        });

        self.handles.push(handle);
    }

    /// Get the current number of running sessions
    pub fn active_count(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Wait for every tracked session to finish, returning their results
    pub async fn join_all(&mut self) -> Vec<T> {
        let handles = std::mem::take(&mut self.handles);
        if !handles.is_empty() {
            info!("Waiting for {} session workers to finish", handles.len());
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) if e.is_panic() => error!("Session worker panicked: {}", e),
                Err(e) => warn!("Session worker was cancelled: {}", e),
            }
        }
        results
    }
}

impl<T: Send + 'static> Default for SessionPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[test]
    fn test_runtime_creation() {
        let mut config = ServerConfig::for_testing();
        config.worker_threads = 3;
        let runtime = build_runtime(&config).expect("Failed to create runtime");
        let answer = runtime.block_on(async { 42 });
        assert_eq!(answer, 42);
    }

    #[tokio::test]
    async fn test_join_all_waits_for_every_task() {
        let mut pool = SessionPool::new();
        for i in 0..3u64 {
            pool.spawn(async move {
                sleep(Duration::from_millis(20 * i)).await;
                i
            });
        }

        let mut results = pool.join_all().await;
        results.sort();
        assert_eq!(results, vec![0, 1, 2]);
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test]
    async fn test_finished_tasks_are_reaped_on_spawn() {
        let mut pool = SessionPool::new();
        pool.spawn(async { 1 });
        sleep(Duration::from_millis(50)).await;
        pool.spawn(async {
            sleep(Duration::from_millis(50)).await;
            2
        });

        // The first task was reaped, only the second result is collected
        assert_eq!(pool.join_all().await, vec![2]);
    }
}
