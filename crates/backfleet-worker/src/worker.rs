use backfleet_client::MetadataClient;
use backfleet_common::{FleetError, Result, WorkerEnv};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{info, info_span, Instrument};

use crate::http_server::BackendServer;

/// Backfleet Worker - one synthetic backend.
///
/// # Lifecycle
///
/// 1. Bind an ephemeral port on all interfaces
/// 2. Register `(host, name, port, traffic type)` with the metadata service, once
/// 3. Serve HTTP on the bound port
/// 4. Exit cleanly when the shutdown stream (stdin, in production) reaches EOF
///
/// The orchestrator holds the write end of every worker's stdin, so the
/// workers go away together with it.
pub struct Worker {
    env: WorkerEnv,
}

impl Worker {
    pub fn new(env: WorkerEnv) -> Self {
        Self { env }
    }

    /// Builds a worker from the environment set by the orchestrator.
    ///
    /// # Errors
    ///
    /// `FleetError::MissingEnv` or `FleetError::UnknownTrafficType` when the
    /// process was not launched by an orchestrator.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(WorkerEnv::from_env()?))
    }

    pub fn env(&self) -> &WorkerEnv {
        &self.env
    }

    /// Runs until stdin closes.
    pub async fn run(self) -> Result<()> {
        self.run_until(tokio::io::stdin()).await
    }

    /// Runs until `shutdown` reaches EOF.
    ///
    /// # Returns
    /// - `Ok(())` - Shutdown stream closed
    /// - `Err(FleetError)` - Bind, registration, or serving failed
    pub async fn run_until<S>(self, shutdown: S) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        let span = info_span!(
            "backend",
            name = %self.env.backend.name,
            pid = std::process::id()
        );

        async move {
            let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
            let port = listener.local_addr()?.port();

            let client = MetadataClient::new(self.env.metadata_url.clone())?;
            client.register(&self.env.backend.bind(port)).await?;
            info!("Registered {} on port {}", self.env.backend.traffic_type, port);

            let server = BackendServer::new(self.env.backend.clone());
            tokio::select! {
                result = server.serve(listener) => result,
                result = wait_for_eof(shutdown) => {
                    result?;
                    info!("Shutdown pipe closed, exiting");
                    Ok(())
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Drains `reader` until EOF. Anything written to it is ignored.
async fn wait_for_eof<S>(mut reader: S) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 64];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| FleetError::Transport(format!("Failed to read shutdown pipe: {}", e)))?;
        if n == 0 {
            return Ok(());
        }
    }
}
