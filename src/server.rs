use anyhow::{bail, Context, Result};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Owns the graph-store server process for the length of a run.
///
/// When no command is configured the guard is inert and the store is assumed
/// to be running already. The child is spawned with `kill_on_drop`, so it is
/// torn down on every exit path, including errors and Ctrl-C.
pub struct ServerGuard {
    child: Option<Child>,
    program: String,
}

impl ServerGuard {
    pub fn unmanaged() -> Self {
        Self {
            child: None,
            program: String::new(),
        }
    }

    /// Spawns `command[0]` with the remaining elements as arguments.
    pub fn start(command: &[String]) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            return Ok(Self::unmanaged());
        };

        info!(program = %program, "Starting graph store server");
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start graph store server: {program}"))?;

        Ok(Self {
            child: Some(child),
            program: program.clone(),
        })
    }

    /// Fails if the managed process has already exited.
    pub fn ensure_running(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        if let Some(status) = child
            .try_wait()
            .context("Failed to poll graph store server")?
        {
            bail!("Graph store server {} exited early with {status}", self.program);
        }
        Ok(())
    }

    pub async fn stop(mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to stop graph store server");
        }
        info!(program = %self.program, "Graph store server stopped");
        Ok(())
    }
}
