//! OS-level process liveness checks, used by the supervisor's adopt and
//! monitor logic (§4.8). A "signal 0" probe asks the kernel whether a pid
//! exists and is visible to us without actually delivering a signal.

use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Returns true if `pid` refers to a live OS process we have permission to see.
pub fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Sends `SIGKILL` to `pid`. Used exclusively by the health-check kill path
/// and the operator's explicit `forceKillAndRestart` escape hatch (§4.8) —
/// never by ordinary shutdown, which must not touch managed children.
pub fn kill_forcibly(pid: u32) -> std::io::Result<()> {
    kill(Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGKILL)
        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn arbitrary_high_pid_is_probably_dead() {
        // Not a hard guarantee on every system, but a pid this high that
        // isn't our own is overwhelmingly likely to be unused in a test sandbox.
        assert!(!is_alive(u32::MAX - 1));
    }
}
