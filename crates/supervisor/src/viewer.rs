//! Viewer subprocess handling

use std::path::Path;

use sync_core::{Error, Result};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Build the viewer launch arguments for a given release version.
///
/// Flag availability shifts across viewer releases: 2.x must be told to
/// bind all interfaces, and 2.5+ needs the fast-load path disabled so all
/// plugins register. Passthrough arguments land before the version-gated
/// flags; the log directory comes last.
pub fn launch_args(
    version: &str,
    port: u16,
    path_prefix: &str,
    log_dir: &Path,
    extra: &[String],
) -> Result<Vec<String>> {
    let (major, minor) = parse_version(version)?;

    let mut args = vec![
        format!("--port={}", port),
        format!("--path_prefix={}", path_prefix),
    ];
    args.extend(extra.iter().cloned());

    if major >= 2 {
        args.push("--bind_all".to_string());
    }
    if major > 2 || (major == 2 && minor >= 5) {
        args.push("--load_fast=false".to_string());
    }

    args.push(format!("--logdir={}", log_dir.display()));
    Ok(args)
}

fn parse_version(version: &str) -> Result<(u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next().and_then(|p| p.parse().ok());
    let minor = parts.next().and_then(|p| p.parse().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => Ok((major, minor)),
        _ => Err(Error::InvalidConfig {
            message: format!("unparseable viewer version '{}'", version),
        }),
    }
}

/// Handle to the running viewer subprocess
#[derive(Debug)]
pub struct ViewerProcess {
    child: Child,
}

impl ViewerProcess {
    /// Launch the viewer
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        info!(%program, ?args, "Launching viewer process");
        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Process {
                message: format!("failed to launch '{}': {}", program, e),
            })?;
        Ok(Self { child })
    }

    /// Exit code if the viewer has exited, without blocking
    pub fn try_wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.try_wait().map_err(|e| Error::Process {
            message: format!("failed to poll viewer process: {}", e),
        })?;
        Ok(status.map(|s| s.code().unwrap_or(-1)))
    }

    /// Kill the viewer if it is still running and reap it
    pub async fn shutdown(mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }

        debug!("Killing viewer process");
        if let Err(e) = self.child.start_kill() {
            warn!(error = %e, "Failed to kill viewer process");
            return;
        }
        let _ = self.child.wait().await;
    }
}
