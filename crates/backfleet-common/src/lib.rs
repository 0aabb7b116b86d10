//! Backfleet Common Types
//!
//! This crate provides the data model shared by every backfleet component:
//! the orchestrator that spawns and tracks backends, the workers that
//! self-register, and the client used by downstream tooling.
//!
//! # Overview
//!
//! A backfleet run is a fixed topology of synthetic backends, one per
//! (traffic type, ordinal) pair. Each backend is a separate worker process
//! that binds a port and reports it to the orchestrator's metadata service.
//!
//! - [`backend`] - `TrafficType`, `Backend` and `BoundBackend`
//! - [`topology`] - deterministic enumeration of the backends for a run
//! - [`env`] - environment contract between orchestrator and worker
//! - [`config`] - the run configuration handed to every component
//! - [`error`] - the `FleetError` type used across the workspace
//!
//! # Example
//!
//! ```
//! use backfleet_common::{Topology, TrafficType};
//!
//! let topology = Topology::enumerate("10.0.0.5", "fleet", 2);
//! assert_eq!(topology.len(), 8);
//! assert_eq!(topology.backends(TrafficType::Http)[1].name, "fleet-http-1");
//! ```

pub mod backend;
pub mod config;
pub mod env;
pub mod error;
pub mod topology;

pub use backend::{Backend, BoundBackend, TrafficType};
pub use config::{detect_host_addr, FleetConfig, WorkerCommand, HOST_ADDR_VAR};
pub use env::WorkerEnv;
pub use error::{FleetError, Result};
pub use topology::Topology;
