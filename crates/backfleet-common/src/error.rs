use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Unknown traffic type: {0}")]
    UnknownTrafficType(String),

    #[error("Backend {0} has not registered a port yet")]
    NotReady(String),

    #[error("Invalid backend listing line: {0}")]
    InvalidListing(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Failed to spawn backend {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backend {name} exited unexpectedly: {status}")]
    WorkerExited { name: String, status: String },

    #[error("Timed out after {0}ms waiting for backends to register")]
    RegistrationTimeout(u64),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;
