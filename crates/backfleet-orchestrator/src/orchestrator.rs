use backfleet_common::{FleetConfig, FleetError, Result, Topology, TrafficType, WorkerEnv};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::ChildStdin;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::barrier::ReadinessBarrier;
use crate::http_server::{MetadataServer, MetadataState};
use crate::launcher::ProcessLauncher;
use crate::registry::Registry;
use crate::watchdog::{ChildWatchdog, WorkerExit};

/// Backfleet Orchestrator - spawns the backend fleet and serves its registry.
///
/// # Lifecycle
///
/// 1. Enumerate the topology from the configuration
/// 2. Bind the metadata listener, so early registrations queue instead of failing
/// 3. Spawn one worker process per backend
/// 4. Start the child watchdog and the metadata server
/// 5. Wait for every backend to register
/// 6. Wait for cancellation
///
/// A worker exiting at any point after it was spawned is fatal, as is a
/// spawn failure or the metadata server stopping. There is no recovery and
/// no retry: a run with a missing backend is not a valid run.
pub struct Orchestrator {
    config: FleetConfig,
    topology: Arc<Topology>,
}

impl Orchestrator {
    pub fn new(config: FleetConfig) -> Self {
        let topology = Arc::new(config.topology());
        Self { config, topology }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Runs the whole lifecycle until `cancel` fires or something fails.
    ///
    /// # Returns
    /// - `Ok(())` - Cancelled
    /// - `Err(FleetError)` - Spawn failure, worker exit, registration timeout,
    ///   or metadata server failure
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let host_addr = self.config.host_addr.clone();
        let mut fleet = self.start().await?;

        if !fleet.wait_ready(&cancel).await? {
            info!("Cancelled before all backends registered");
            return Ok(());
        }

        info!("{} backends registered", fleet.state().registry().len());
        info!(
            "Metadata server running at http://{}:{}/backends",
            host_addr,
            fleet.metadata_port()
        );

        fleet.wait_cancelled(&cancel).await
    }

    /// Binds the metadata service, spawns every worker and starts the
    /// watchdog and server tasks.
    ///
    /// A spawn failure aborts immediately. Workers already started are not
    /// unwound beyond being killed when their handles drop.
    pub async fn start(self) -> Result<RunningFleet> {
        let barrier = Arc::new(ReadinessBarrier::new(self.topology.len()));
        let state = Arc::new(MetadataState::new(
            Registry::new(self.topology.clone()),
            barrier.clone(),
        ));

        let listener = MetadataServer::bind(SocketAddr::from((
            Ipv4Addr::UNSPECIFIED,
            self.config.metadata_port,
        )))
        .await?;
        let metadata_port = listener.local_addr()?.port();
        // Workers always run on this host.
        let metadata_url = format!("http://{}:{}", Ipv4Addr::LOCALHOST, metadata_port);

        info!(
            "Starting {} backends per traffic type for {:?}",
            self.config.backends_per_type,
            TrafficType::ALL
        );

        let launcher = ProcessLauncher::new(self.config.worker_command.clone());
        let mut watchdog = ChildWatchdog::new();
        let mut shutdown = Vec::with_capacity(self.topology.len());

        for backend in self.topology.iter() {
            let worker = launcher.launch(&WorkerEnv::new(backend.clone(), metadata_url.clone()))?;
            shutdown.push(worker.shutdown);
            watchdog.watch(worker.backend, worker.child);
        }

        let watchdog = watchdog.spawn();
        let server = tokio::spawn(MetadataServer::new(state.clone()).serve(listener));

        Ok(RunningFleet {
            state,
            barrier,
            watchdog,
            server,
            _shutdown: shutdown,
            metadata_port,
            registration_timeout: self.config.registration_timeout,
        })
    }
}

/// A started fleet: workers spawned, watchdog and metadata server running.
///
/// Dropping it stops both tasks, which kills the workers, and closes their
/// shutdown pipes.
pub struct RunningFleet {
    state: Arc<MetadataState>,
    barrier: Arc<ReadinessBarrier>,
    watchdog: JoinHandle<WorkerExit>,
    server: JoinHandle<Result<()>>,
    _shutdown: Vec<ChildStdin>,
    metadata_port: u16,
    registration_timeout: Option<Duration>,
}

impl RunningFleet {
    pub fn state(&self) -> &Arc<MetadataState> {
        &self.state
    }

    /// Port the metadata service is listening on, on all interfaces.
    pub fn metadata_port(&self) -> u16 {
        self.metadata_port
    }

    /// Blocks until every backend has registered.
    ///
    /// # Returns
    /// - `Ok(true)` - The barrier released
    /// - `Ok(false)` - Cancelled first
    /// - `Err(FleetError)` - A worker exited, the server failed, or the
    ///   registration timeout elapsed
    pub async fn wait_ready(&mut self, cancel: &CancellationToken) -> Result<bool> {
        let barrier = self.barrier.clone();
        let timeout = self.registration_timeout;
        let ready = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, barrier.wait())
                    .await
                    .map_err(|_| {
                        FleetError::RegistrationTimeout(
                            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        )
                    }),
                None => {
                    barrier.wait().await;
                    Ok(())
                }
            }
        };

        tokio::select! {
            exit = &mut self.watchdog => Err(worker_exit_error(exit)),
            result = &mut self.server => Err(server_stopped_error(result)),
            ready = ready => ready.map(|_| true),
            _ = cancel.cancelled() => Ok(false),
        }
    }

    /// Blocks until cancellation, failing fast if a worker exits or the
    /// server stops.
    pub async fn wait_cancelled(&mut self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            exit = &mut self.watchdog => Err(worker_exit_error(exit)),
            result = &mut self.server => Err(server_stopped_error(result)),
            _ = cancel.cancelled() => {
                info!("Cancellation received, shutting down");
                Ok(())
            }
        }
    }
}

impl Drop for RunningFleet {
    fn drop(&mut self) {
        self.watchdog.abort();
        self.server.abort();
    }
}

fn worker_exit_error(exit: std::result::Result<WorkerExit, JoinError>) -> FleetError {
    match exit {
        Ok(exit) => FleetError::WorkerExited {
            name: exit.name,
            status: exit.status,
        },
        Err(e) => FleetError::Transport(format!("Watchdog task failed: {}", e)),
    }
}

fn server_stopped_error(result: std::result::Result<Result<()>, JoinError>) -> FleetError {
    match result {
        Ok(Ok(())) => FleetError::Transport("Metadata server stopped".to_string()),
        Ok(Err(e)) => e,
        Err(e) => FleetError::Transport(format!("Metadata server task failed: {}", e)),
    }
}
