//! Supervisor - Polling loop driving the viewer lifecycle
//!
//! Launches the metrics viewer as a subprocess, mirrors remote logs into
//! its directory each cycle, probes its readiness endpoint until metrics
//! appear, and enforces the session deadline. The viewer is killed on
//! every terminal path.

mod probe;
mod session;
mod viewer;

pub use probe::{has_samples, HttpMetricsProbe, MetricsProbe, ScalarSeries};
pub use session::{
    SessionOutcome, SyncSupervisor, EXIT_CRASHED, EXIT_INTERRUPTED, EXIT_TIMED_OUT,
};
pub use viewer::{launch_args, ViewerProcess};
