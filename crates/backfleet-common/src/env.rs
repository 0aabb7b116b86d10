//! Worker Environment Contract
//!
//! The orchestrator hands each worker its identity through environment
//! variables. The worker reads them back with [`WorkerEnv::from_env`].

use crate::backend::{Backend, TrafficType};
use crate::error::{FleetError, Result};

/// Name of the backend the worker serves.
pub const BACKEND_NAME_VAR: &str = "BACKFLEET_BACKEND_NAME";
/// Traffic type label of the backend the worker serves.
pub const BACKEND_TRAFFIC_TYPE_VAR: &str = "BACKFLEET_BACKEND_TRAFFIC_TYPE";
/// Host address the worker should report on registration.
pub const BACKEND_HOST_ADDR_VAR: &str = "BACKFLEET_BACKEND_HOST_ADDR";
/// Base URL of the orchestrator's metadata service.
pub const METADATA_URL_VAR: &str = "BACKFLEET_METADATA_URL";

/// Everything a worker needs to know about itself and where to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEnv {
    pub backend: Backend,
    pub metadata_url: String,
}

impl WorkerEnv {
    pub fn new(backend: Backend, metadata_url: impl Into<String>) -> Self {
        Self {
            backend,
            metadata_url: metadata_url.into(),
        }
    }

    /// Variables to set on the worker's process.
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            (BACKEND_NAME_VAR, self.backend.name.clone()),
            (BACKEND_TRAFFIC_TYPE_VAR, self.backend.traffic_type.to_string()),
            (BACKEND_HOST_ADDR_VAR, self.backend.host_addr.clone()),
            (METADATA_URL_VAR, self.metadata_url.clone()),
        ]
    }

    /// Reads the contract from the current process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the contract through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).ok_or(FleetError::MissingEnv(key));

        let name = get(BACKEND_NAME_VAR)?;
        let traffic_type: TrafficType = get(BACKEND_TRAFFIC_TYPE_VAR)?.parse()?;
        let host_addr = get(BACKEND_HOST_ADDR_VAR)?;
        let metadata_url = get(METADATA_URL_VAR)?;

        Ok(Self {
            backend: Backend::new(host_addr, name, traffic_type),
            metadata_url,
        })
    }
}
