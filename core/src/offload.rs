//! Single-worker offloading of blocking calls
//!
//! The host console is a synchronous channel that must not be used
//! concurrently, and waiting on it must never stall the async caller. All
//! blocking calls therefore run, one at a time and in submission order, on a
//! dedicated OS thread. The caller gets a [`PendingCall`] it can await with a
//! deadline, and await again if the first deadline passes.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs blocking calls on one dedicated worker thread
pub struct BlockingCallOffloader {
    jobs: mpsc::UnboundedSender<Job>,
}

impl BlockingCallOffloader {
    /// Spawn the worker thread
    pub fn new(name: &str) -> Result<Self> {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!("Offload worker started");
                while let Some(job) = queue.blocking_recv() {
                    job();
                }
                debug!("Offload worker stopped");
            })
            .map_err(|e| Error::Unexpected(format!("Failed to spawn offload worker: {}", e)))?;

        Ok(Self { jobs })
    }

    /// Queue `call` behind every call submitted before it
    ///
    /// The call starts running as soon as the worker is free, whether or not
    /// anyone awaits the returned handle.
    pub fn submit<F, T>(&self, call: F) -> Result<PendingCall<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move || match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(value) => {
                // Receiver may have given up; the result is simply dropped.
                let _ = tx.send(value);
            }
            Err(_) => error!("Blocking call panicked on offload worker"),
        });

        self.jobs
            .send(job)
            .map_err(|_| Error::Unexpected("Offload worker is not running".into()))?;

        Ok(PendingCall { rx })
    }
}

/// Handle to a call already queued on the offload worker
pub struct PendingCall<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> PendingCall<T> {
    /// Wait up to `limit` for the call to finish
    ///
    /// On [`Error::Timeout`] the call keeps running and this handle stays
    /// valid, so the same call can be awaited again.
    pub async fn wait_for(&mut self, limit: Duration) -> Result<T> {
        match tokio::time::timeout(limit, &mut self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Error::Unexpected(
                "Blocking call ended without a result".into(),
            )),
            Err(_) => Err(Error::Timeout(format!(
                "no response within {}ms",
                limit.as_millis()
            ))),
        }
    }
}
