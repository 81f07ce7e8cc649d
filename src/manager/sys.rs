//! OS process table access
//!
//! Everything platform-specific lives here: reading a process's start time
//! (the token that detects PID reuse), enumerating descendants, and tearing
//! down a process tree. Linux reads `/proc`; other Unix systems ask `ps`.

use std::collections::{HashMap, HashSet};
use std::io;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, Pid};
use tokio::time::{sleep, Instant};

/// How often exit is polled while terminating
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait after SIGKILL before giving up
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Identity of a process as seen in the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    /// Process group id
    pub pgid: u32,
    /// Start time as reported by the OS, compared verbatim
    pub start_time: String,
    /// Exited but not yet reaped
    pub zombie: bool,
}

impl ProcessInfo {
    /// Same process that was recorded, and still running
    pub fn matches(&self, token: &str) -> bool {
        !self.zombie && self.start_time == token
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TerminateError {
    #[error("cannot signal pid {pid}: {errno}")]
    Signal { pid: u32, errno: Errno },

    #[error("pid {pid} still running after SIGKILL")]
    Survived { pid: u32 },

    #[error("cannot read process table: {0}")]
    ProcessTable(#[from] io::Error),
}

/// Look up one process; `None` if no such PID exists
pub fn process_info(pid: u32) -> io::Result<Option<ProcessInfo>> {
    imp::process_info(pid)
}

/// Whether `pid` is the same live process that had start time `token`
pub fn is_alive(pid: u32, token: &str) -> io::Result<bool> {
    Ok(process_info(pid)?.is_some_and(|info| info.matches(token)))
}

/// All descendants of `root` (children, grandchildren, ...), with their tokens
pub fn descendants(root: u32) -> io::Result<Vec<ProcessInfo>> {
    let table = imp::process_table()?;

    let mut children: HashMap<u32, Vec<&ProcessInfo>> = HashMap::new();
    for info in &table {
        children.entry(info.ppid).or_default().push(info);
    }

    let mut found = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut to_check = vec![root];
    while let Some(pid) = to_check.pop() {
        for child in children.get(&pid).into_iter().flatten() {
            if seen.insert(child.pid) {
                to_check.push(child.pid);
                found.push((*child).clone());
            }
        }
    }
    Ok(found)
}

/// Members of the process group led by a service whose leader has exited
///
/// A PID is never reused while it still names a process group, so when no
/// live process holds `leader` any member of group `leader` was forked by the
/// service. If `leader` now belongs to a different process the group is not
/// ours and nothing is returned.
pub fn orphaned_group(leader: u32, token: &str) -> io::Result<Vec<ProcessInfo>> {
    match process_info(leader)? {
        Some(info) if info.start_time != token => return Ok(Vec::new()),
        Some(info) if !info.zombie => return Ok(Vec::new()),
        _ => {}
    }

    Ok(imp::process_table()?
        .into_iter()
        .filter(|info| info.pgid == leader && info.pid != leader && !info.zombie)
        .collect())
}

/// Terminate what is left of a service's process group
///
/// Same escalation as [`terminate_tree`], addressed to the group because the
/// leader is gone.
pub async fn terminate_group(
    leader: u32,
    members: &[ProcessInfo],
    grace: Duration,
) -> Result<(), TerminateError> {
    if members.is_empty() {
        return Ok(());
    }
    let pgid = Pid::from_raw(leader as i32);

    log::info!("Sending SIGTERM to process group {} ({} left)", leader, members.len());
    signal_group(pgid, Signal::SIGTERM)?;
    if wait_for_exit(members, grace).await? {
        return Ok(());
    }

    log::warn!("process group {} did not exit within {:?}, sending SIGKILL", leader, grace);
    signal_group(pgid, Signal::SIGKILL)?;
    if wait_for_exit(members, KILL_GRACE).await? {
        return Ok(());
    }

    Err(TerminateError::Survived { pid: leader })
}

fn signal_group(pgid: Pid, signal: Signal) -> Result<(), TerminateError> {
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(TerminateError::Signal {
            pid: pgid.as_raw() as u32,
            errno,
        }),
    }
}

/// Terminate the process tree rooted at `pid`
///
/// Sends SIGTERM to the root, its process group and every descendant, waits
/// up to `grace` for all of them to exit, then escalates to SIGKILL.
pub async fn terminate_tree(pid: u32, token: &str, grace: Duration) -> Result<(), TerminateError> {
    let mut targets = vec![ProcessInfo {
        pid,
        ppid: 0,
        pgid: pid,
        start_time: token.to_string(),
        zombie: false,
    }];
    targets.extend(descendants(pid)?);

    log::info!("Sending SIGTERM to pid {} ({} descendants)", pid, targets.len() - 1);
    signal_tree(pid, &targets, Signal::SIGTERM)?;
    if wait_for_exit(&targets, grace).await? {
        return Ok(());
    }

    log::warn!("pid {} did not exit within {:?}, sending SIGKILL", pid, grace);

    // Pick up anything forked since the first pass
    if is_alive(pid, token)? {
        for info in descendants(pid)? {
            if !targets.iter().any(|t| t.pid == info.pid) {
                targets.push(info);
            }
        }
    }
    signal_tree(pid, &targets, Signal::SIGKILL)?;
    if wait_for_exit(&targets, KILL_GRACE).await? {
        return Ok(());
    }

    Err(TerminateError::Survived { pid })
}

fn signal_tree(root: u32, targets: &[ProcessInfo], signal: Signal) -> Result<(), TerminateError> {
    // Services run in their own process group; catch what enumeration missed
    let root_pid = Pid::from_raw(root as i32);
    if getpgid(Some(root_pid)) == Ok(root_pid) {
        match killpg(root_pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => log::debug!("killpg({}, {}) failed: {}", root, signal, errno),
        }
    }

    for target in targets {
        if !is_alive(target.pid, &target.start_time)? {
            continue;
        }
        match kill(Pid::from_raw(target.pid as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) if target.pid == root => {
                return Err(TerminateError::Signal { pid: root, errno });
            }
            Err(errno) => {
                log::warn!("Cannot signal descendant {} of {}: {}", target.pid, root, errno);
            }
        }
    }
    Ok(())
}

/// Poll until every target has exited; `false` on timeout
async fn wait_for_exit(targets: &[ProcessInfo], timeout: Duration) -> io::Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        let mut any_alive = false;
        for target in targets {
            if is_alive(target.pid, &target.start_time)? {
                any_alive = true;
                break;
            }
        }
        if !any_alive {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(POLL_INTERVAL).await;
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use super::ProcessInfo;
    use nix::errno::Errno;
    use std::io;

    pub fn process_info(pid: u32) -> io::Result<Option<ProcessInfo>> {
        let stat = match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            // The process vanished between open and read
            Err(e) if e.raw_os_error() == Some(Errno::ESRCH as i32) => return Ok(None),
            Err(e) => return Err(e),
        };
        parse_stat(pid, &stat).map(Some).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed /proc/{}/stat", pid),
            )
        })
    }

    pub fn process_table() -> io::Result<Vec<ProcessInfo>> {
        let mut table = Vec::new();
        for entry in std::fs::read_dir("/proc")? {
            let Ok(entry) = entry else {
                continue;
            };
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            // Processes come and go while we scan
            if let Ok(Some(info)) = process_info(pid) {
                table.push(info);
            }
        }
        Ok(table)
    }

    /// Parse `/proc/<pid>/stat`
    ///
    /// The command name (field 2) may contain spaces and parentheses, so
    /// fields are counted from the last `)`.
    pub(super) fn parse_stat(pid: u32, stat: &str) -> Option<ProcessInfo> {
        let rest = &stat[stat.rfind(')')? + 1..];
        let fields: Vec<&str> = rest.split_whitespace().collect();

        // fields[0] = state (3), fields[1] = ppid (4), fields[2] = pgrp (5),
        // fields[19] = starttime (22)
        let state = *fields.first()?;
        let ppid = fields.get(1)?.parse().ok()?;
        let pgid = fields.get(2)?.parse().ok()?;
        let start_time = fields.get(19)?;
        start_time.parse::<u64>().ok()?;

        Some(ProcessInfo {
            pid,
            ppid,
            pgid,
            start_time: start_time.to_string(),
            zombie: matches!(state, "Z" | "X" | "x"),
        })
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::ProcessInfo;
    use std::io;
    use std::process::Command;

    pub fn process_info(pid: u32) -> io::Result<Option<ProcessInfo>> {
        let output = Command::new("ps")
            .args(["-o", "stat=,ppid=,pgid=,lstart=", "-p", &pid.to_string()])
            .output()?;
        let text = String::from_utf8_lossy(&output.stdout);
        let line = text.trim();
        if line.is_empty() {
            return Ok(None);
        }

        // lstart is several words, e.g. "Tue Oct 14 09:12:03 2026"
        let mut parts = line.split_whitespace();
        let state = parts.next().unwrap_or_default();
        let ppid = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let pgid = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let start_time = parts.collect::<Vec<_>>().join(" ");

        Ok(Some(ProcessInfo {
            pid,
            ppid,
            pgid,
            start_time,
            zombie: state.starts_with('Z'),
        }))
    }

    pub fn process_table() -> io::Result<Vec<ProcessInfo>> {
        let output = Command::new("ps").args(["-A", "-o", "pid=,ppid="]).output()?;
        let text = String::from_utf8_lossy(&output.stdout);
        let mut table = Vec::new();
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let (Some(pid), Some(ppid)) = (parts.next(), parts.next()) else {
                continue;
            };
            let (Ok(pid), Ok(_)) = (pid.parse::<u32>(), ppid.parse::<u32>()) else {
                continue;
            };
            if let Ok(Some(info)) = process_info(pid) {
                table.push(info);
            }
        }
        Ok(table)
    }
}
