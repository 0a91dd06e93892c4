//! PID file read/write/lock for managed processes (§4.8).
//!
//! Each managed process gets an advisory-locked PID file. The supervisor
//! holds the lock only while writing; it does not hold it for the life of
//! the child; the child is detached and outlives the lock. On supervisor
//! startup, an existing PID file is read and its PID liveness-checked to
//! decide whether to adopt the running process instead of spawning a new one.

use fs2::FileExt;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use crate::errors::SupervisorError;
use crate::util::pid::is_alive;

/// Atomically writes `pid` to `path`, holding an exclusive advisory lock for
/// the duration of the write so two supervisor instances can never both
/// believe they own the same process id (§4.8).
pub fn write_pid(path: &Path, pid: u32) -> Result<(), SupervisorError> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let map_err = |source: std::io::Error| SupervisorError::PidFileWrite {
        path: path.display().to_string(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(map_err)?;
    file.lock_exclusive().map_err(map_err)?;
    file.set_len(0).map_err(map_err)?;
    writeln!(file, "{pid}").map_err(map_err)?;
    file.sync_all().map_err(map_err)?;
    FileExt::unlock(&file).map_err(map_err)?;
    Ok(())
}

/// Reads a previously written PID file, returning `None` if it's absent,
/// empty, or unparsable (treated as "nothing to adopt", not a hard error).
pub fn read_pid(path: &Path) -> Option<u32> {
    let mut contents = String::new();
    std::fs::File::open(path)
        .ok()?
        .read_to_string(&mut contents)
        .ok()?;
    contents.trim().parse().ok()
}

/// Attempts to adopt a running process recorded in `path`'s PID file:
/// returns `Some(pid)` only if the file exists, parses, and the pid is
/// still alive on this host (§4.8 "PID reconnection").
pub fn try_adopt(path: &Path) -> Option<u32> {
    let pid = read_pid(path)?;
    is_alive(pid).then_some(pid)
}

pub fn remove(path: &Path) {
    let _ = std::fs::remove_file(path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.pid");
        write_pid(&path, 4242).unwrap();
        assert_eq!(read_pid(&path), Some(4242));
    }

    #[test]
    fn adopt_succeeds_for_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.pid");
        write_pid(&path, std::process::id()).unwrap();
        assert_eq!(try_adopt(&path), Some(std::process::id()));
    }

    #[test]
    fn adopt_fails_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.pid");
        assert_eq!(try_adopt(&path), None);
    }

    #[test]
    fn adopt_fails_for_dead_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.pid");
        write_pid(&path, u32::MAX - 1).unwrap();
        assert_eq!(try_adopt(&path), None);
    }
}
