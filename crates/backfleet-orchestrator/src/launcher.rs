use backfleet_common::{Backend, FleetError, Result, WorkerCommand, WorkerEnv};
use std::process::Stdio;
use tokio::process::{Child, ChildStdin, Command};

/// A worker process that has been started but not yet waited on.
pub struct SpawnedWorker {
    pub backend: Backend,
    pub child: Child,
    /// Write end of the worker's stdin. Dropping it delivers EOF, which the
    /// worker treats as its shutdown signal.
    pub shutdown: ChildStdin,
}

/// Starts one OS process per backend from a fixed [`WorkerCommand`].
pub struct ProcessLauncher {
    command: WorkerCommand,
}

impl ProcessLauncher {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }

    /// Spawns a worker with `env` exported into its environment.
    ///
    /// The child inherits stdout and stderr and is killed if its handle is
    /// dropped.
    pub fn launch(&self, env: &WorkerEnv) -> Result<SpawnedWorker> {
        let name = env.backend.name.clone();

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .envs(env.vars())
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FleetError::Spawn {
                name: name.clone(),
                source,
            })?;

        let shutdown = child.stdin.take().ok_or_else(|| FleetError::Spawn {
            name: name.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "stdin was not piped"),
        })?;

        tracing::debug!("Spawned {} as pid {:?}", name, child.id());

        Ok(SpawnedWorker {
            backend: env.backend.clone(),
            child,
            shutdown,
        })
    }
}
