//! Backfleet Worker
//!
//! The process the orchestrator launches once per backend. It binds an
//! ephemeral port, registers it with the metadata service, and serves a
//! small static site until its stdin reaches EOF.

pub mod http_server;
pub mod worker;

pub use http_server::BackendServer;
pub use worker::Worker;
