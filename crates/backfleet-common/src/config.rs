//! Run Configuration
//!
//! One [`FleetConfig`] is built at startup and passed by reference to every
//! component that needs it.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::PathBuf;
use std::time::Duration;

use crate::topology::Topology;

/// Environment variable that overrides host address detection.
pub const HOST_ADDR_VAR: &str = "BACKFLEET_HOST_ADDR";

/// How to launch a single worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Program to execute
    pub program: PathBuf,
    /// Arguments selecting worker mode
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-invokes the running executable with the `serve-backend` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["serve-backend".to_string()]))
    }
}

/// Configuration for one orchestrated run.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Number of backends per traffic type
    pub backends_per_type: usize,
    /// Prefix for backend names
    pub host_prefix: String,
    /// Address reported for every backend
    pub host_addr: String,
    /// Port the metadata service listens on (all interfaces)
    pub metadata_port: u16,
    /// Optional bound on how long to wait for every backend to register.
    ///
    /// `None` waits forever.
    pub registration_timeout: Option<Duration>,
    /// Command used to launch workers
    pub worker_command: WorkerCommand,
}

impl FleetConfig {
    pub fn new(host_addr: impl Into<String>, worker_command: WorkerCommand) -> Self {
        Self {
            backends_per_type: 1,
            host_prefix: "backfleet".to_string(),
            host_addr: host_addr.into(),
            metadata_port: 9090,
            registration_timeout: None,
            worker_command,
        }
    }

    pub fn with_backends_per_type(mut self, n: usize) -> Self {
        self.backends_per_type = n;
        self
    }

    pub fn with_host_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.host_prefix = prefix.into();
        self
    }

    pub fn with_metadata_port(mut self, port: u16) -> Self {
        self.metadata_port = port;
        self
    }

    pub fn with_registration_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.registration_timeout = timeout;
        self
    }

    /// The backends this configuration describes.
    pub fn topology(&self) -> Topology {
        Topology::enumerate(&self.host_addr, &self.host_prefix, self.backends_per_type)
    }
}

/// Determines the address other hosts can reach this one on.
///
/// Connecting a UDP socket sends nothing but makes the kernel pick the
/// outbound interface, whose address is what we want. Loopback is the
/// fallback when there is no route.
pub fn detect_host_addr() -> IpAddr {
    let detected = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 53))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip());

    match detected {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            tracing::warn!("Could not detect outbound address, using loopback: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = FleetConfig::new("10.0.0.1", WorkerCommand::new("/bin/true", vec![]));
        assert_eq!(config.backends_per_type, 1);
        assert_eq!(config.metadata_port, 9090);
        assert!(config.registration_timeout.is_none());
        assert_eq!(config.topology().len(), 4);
    }

    #[test]
    fn test_config_builders() {
        let config = FleetConfig::new("10.0.0.1", WorkerCommand::new("/bin/true", vec![]))
            .with_backends_per_type(5)
            .with_host_prefix("perf")
            .with_metadata_port(0)
            .with_registration_timeout(Some(Duration::from_secs(3)));
        let topology = config.topology();
        assert_eq!(topology.len(), 20);
        assert!(topology.get("perf-edge-4").is_some());
        assert_eq!(config.registration_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_current_exe_selects_worker_mode() {
        let command = WorkerCommand::current_exe().unwrap();
        assert_eq!(command.args, vec!["serve-backend".to_string()]);
    }

    #[test]
    fn test_detect_host_addr_is_usable() {
        let ip = detect_host_addr();
        assert!(!ip.is_unspecified());
    }
}
