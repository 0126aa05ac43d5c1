// Child process helpers shared by the subprocess adapters

use std::time::Duration;
use tracing::info;

/// Time a child gets between SIGTERM and being killed (ADR: No magic values)
pub(crate) const TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Ask a child to exit; the caller drops it (kill_on_drop) once the grace expires
pub(crate) fn request_termination(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        use tracing::warn;

        let Ok(raw) = i32::try_from(pid) else {
            warn!(pid, "PID out of range, relying on kill-on-drop");
            return;
        };
        info!(pid, "Sending SIGTERM");
        if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            // Already gone
            warn!(pid, error = %e, "SIGTERM failed");
        }
    }

    #[cfg(not(unix))]
    {
        info!(pid, "No graceful signal on this platform, killing on drop");
    }
}
