//! Minimal /proc lookups used to resolve scheduler identity and exemptions.

use std::path::Path;

const PROC_ROOT: &str = "/proc";

/// Find the first process whose `comm` equals `name`.
pub fn find_pid_by_comm(name: &str) -> Option<u32> {
    find_pid_by_comm_in(Path::new(PROC_ROOT), name)
}

/// Same as [`find_pid_by_comm`] against an arbitrary proc-style root.
///
/// Returns the lowest matching pid so repeated lookups are stable.
pub fn find_pid_by_comm_in(root: &Path, name: &str) -> Option<u32> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(root = %root.display(), error = %e, "cannot read proc root");
            return None;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
            // Processes can exit between readdir and read.
            let comm = std::fs::read_to_string(entry.path().join("comm")).ok()?;
            (comm.trim_end_matches('\n') == name).then_some(pid)
        })
        .min()
}

/// Whether `pid` refers to a running process.
pub fn pid_is_live(pid: u32) -> bool {
    pid != 0 && Path::new(PROC_ROOT).join(pid.to_string()).exists()
}
