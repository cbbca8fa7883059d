//! Handle to a background rebuild

use std::thread;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{CatalogError, CatalogResult};
use crate::sync::RebuildOutcome;

type RebuildResult = CatalogResult<RebuildOutcome>;

/// A rebuild running on the tokio blocking pool, or on a plain thread when
/// the caller has no runtime
#[derive(Debug)]
pub enum RebuildHandle {
    Task {
        runtime: Handle,
        task: JoinHandle<RebuildResult>,
    },
    Thread(thread::JoinHandle<RebuildResult>),
}

impl RebuildHandle {
    /// Run `job` in the background without ever requiring a runtime
    pub(crate) fn spawn<F>(job: F) -> CatalogResult<Self>
    where
        F: FnOnce() -> RebuildResult + Send + 'static,
    {
        match Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn_blocking(job);
                Ok(RebuildHandle::Task { runtime, task })
            }
            Err(_) => thread::Builder::new()
                .name("catalog-rebuild".to_string())
                .spawn(job)
                .map(RebuildHandle::Thread)
                .map_err(|e| {
                    CatalogError::Join(format!("could not start rebuild thread: {}", e))
                }),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            RebuildHandle::Task { task, .. } => task.is_finished(),
            RebuildHandle::Thread(handle) => handle.is_finished(),
        }
    }

    /// Wait for the rebuild from async code
    pub async fn join(self) -> RebuildResult {
        match self {
            RebuildHandle::Task { task, .. } => task.await?,
            RebuildHandle::Thread(handle) => {
                tokio::task::spawn_blocking(move || join_thread(handle)).await?
            }
        }
    }

    /// Wait for the rebuild from synchronous code
    ///
    /// A pool task cannot be waited on from inside a runtime; use `join` there.
    pub fn join_blocking(self) -> RebuildResult {
        match self {
            RebuildHandle::Thread(handle) => join_thread(handle),
            RebuildHandle::Task { runtime, task } => {
                if Handle::try_current().is_ok() {
                    return Err(CatalogError::Join(
                        "join_blocking called from async context".to_string(),
                    ));
                }
                runtime.block_on(task)?
            }
        }
    }
}

fn join_thread(handle: thread::JoinHandle<RebuildResult>) -> RebuildResult {
    handle
        .join()
        .map_err(|_| CatalogError::Join("rebuild thread panicked".to_string()))?
}
