pub mod barrier;
pub mod http_server;
pub mod launcher;
pub mod orchestrator;
pub mod registry;
pub mod watchdog;

pub use barrier::{BarrierSignal, ReadinessBarrier, RegistrationObserver};
pub use http_server::{MetadataServer, MetadataState};
pub use launcher::{ProcessLauncher, SpawnedWorker};
pub use orchestrator::{Orchestrator, RunningFleet};
pub use registry::Registry;
pub use watchdog::{ChildWatchdog, WorkerExit};
