//! Sync session state machine

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use fetcher::Fetcher;
use sync_core::{Result, SupervisorConfig};

use crate::probe::{has_samples, MetricsProbe};
use crate::viewer::ViewerProcess;

/// Exit status reported when no metrics appeared before the deadline
pub const EXIT_TIMED_OUT: i32 = 124;

/// Exit status reported when the viewer exited before serving metrics
pub const EXIT_CRASHED: i32 = 125;

/// Exit status reported when the session was externally interrupted
pub const EXIT_INTERRUPTED: i32 = 130;

/// Terminal outcome of one sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The viewer served metrics and later exited on its own
    Completed { exit_code: i32 },

    /// No metrics appeared before the deadline
    TimedOut,

    /// The viewer exited before serving metrics
    Crashed { exit_code: i32 },

    /// The session was interrupted by a termination request
    Interrupted,
}

impl SessionOutcome {
    /// Process exit status mirroring this outcome
    ///
    /// Graceful completion passes the viewer's own code through; the other
    /// outcomes map to distinguished non-zero statuses.
    pub fn exit_status(&self) -> i32 {
        match self {
            SessionOutcome::Completed { exit_code } => *exit_code,
            SessionOutcome::TimedOut => EXIT_TIMED_OUT,
            SessionOutcome::Crashed { .. } => EXIT_CRASHED,
            SessionOutcome::Interrupted => EXIT_INTERRUPTED,
        }
    }
}

/// Drives the polling loop for one viewer session
///
/// Each cycle checks viewer liveness, probes readiness until it fires
/// (readiness is sticky for the rest of the session), runs a fetch cycle,
/// and sleeps. The loop is strictly sequential; cancellation is a deadline
/// comparison, not an external interrupt into the state machine.
pub struct SyncSupervisor {
    fetcher: Fetcher,
    probe: Box<dyn MetricsProbe>,
    config: SupervisorConfig,
}

impl SyncSupervisor {
    pub fn new(fetcher: Fetcher, probe: Box<dyn MetricsProbe>, config: SupervisorConfig) -> Self {
        Self {
            fetcher,
            probe,
            config,
        }
    }

    /// Run the session to its terminal outcome
    ///
    /// The viewer is killed on every terminal path, including errors and
    /// external interruption.
    #[instrument(skip(self, viewer))]
    pub async fn run(&mut self, mut viewer: ViewerProcess) -> Result<SessionOutcome> {
        let deadline = Instant::now() + self.config.max_wait;

        let result = tokio::select! {
            outcome = self.poll_loop(&mut viewer, deadline) => outcome,
            _ = tokio::signal::ctrl_c() => {
                info!("Received termination request");
                Ok(SessionOutcome::Interrupted)
            }
        };

        viewer.shutdown().await;
        result
    }

    async fn poll_loop(
        &mut self,
        viewer: &mut ViewerProcess,
        deadline: Instant,
    ) -> Result<SessionOutcome> {
        let mut ready = false;

        loop {
            if let Some(exit_code) = viewer.try_wait()? {
                if ready {
                    info!(exit_code, "Viewer exited after serving metrics");
                    return Ok(SessionOutcome::Completed { exit_code });
                }
                error!(exit_code, "Viewer exited before serving metrics");
                return Ok(SessionOutcome::Crashed { exit_code });
            }

            if !ready && Instant::now() > deadline {
                error!(
                    max_wait_secs = self.config.max_wait.as_secs(),
                    "No metrics observed before the deadline"
                );
                return Ok(SessionOutcome::TimedOut);
            }

            if !ready {
                match self.probe.sample().await {
                    Ok(series) if has_samples(&series) => {
                        info!("Viewer is serving metrics");
                        ready = true;
                    }
                    Ok(_) => debug!("Viewer reachable, no metrics yet"),
                    Err(e) => debug!(error = %e, "Viewer not responding yet"),
                }
            }

            if let Err(e) = self.fetcher.fetch_new().await {
                warn!(error = %e, "Fetch cycle failed, retrying next cycle");
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
