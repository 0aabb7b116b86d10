use backfleet_common::Backend;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::process::Child;
use tracing::error;

/// A worker that terminated while it was being watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub name: String,
    pub status: String,
}

/// Watches every worker process and reports the first one to exit.
///
/// Any exit counts: a worker is expected to live as long as the
/// orchestrator, so a clean exit is as fatal as a crash.
#[derive(Default)]
pub struct ChildWatchdog {
    workers: Vec<(Backend, Child)>,
}

impl ChildWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, backend: Backend, child: Child) {
        self.workers.push((backend, child));
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Starts watching on a background task.
    ///
    /// Aborting the task drops the remaining children, which kills them.
    pub fn spawn(self) -> tokio::task::JoinHandle<WorkerExit> {
        tokio::spawn(self.run())
    }

    /// Resolves with the first worker to exit, or never if there are none.
    pub async fn run(self) -> WorkerExit {
        let mut exits: FuturesUnordered<_> = self
            .workers
            .into_iter()
            .map(|(backend, mut child)| async move {
                let status = match child.wait().await {
                    Ok(status) => status.to_string(),
                    Err(e) => format!("wait failed: {}", e),
                };
                WorkerExit {
                    name: backend.name,
                    status,
                }
            })
            .collect();

        match exits.next().await {
            Some(exit) => {
                error!("Backend {} exited unexpectedly: {}", exit.name, exit.status);
                exit
            }
            None => std::future::pending().await,
        }
    }
}
