//! Steady-state handoff loop.

use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};
use usersched_skel::Session;

/// Totals for one run of the loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub ticks: u64,
    pub claimed: u64,
    pub stopped_by_kernel: bool,
}

/// Poll until the session reports a non-zero scheduler pid.
///
/// Returns `None` on timeout.
pub fn wait_for_scheduler_pid(
    session: &Session,
    timeout: Duration,
    interval: Duration,
) -> Option<u32> {
    let deadline = Instant::now() + timeout;
    loop {
        let pid = session.get_scheduler_pid();
        if pid != 0 {
            return Some(pid);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(interval);
    }
}

/// Claim everything currently queued and publish the cumulative number of
/// completed decisions. Returns how many tasks were claimed this tick.
///
/// The published count wraps at `u64::MAX`, like the kernel's own counters.
pub fn tick(session: &mut Session, completed: &mut u64) -> u64 {
    let pending = session.get_nr_queued();
    let mut claimed = 0;
    while claimed < pending && session.sub_nr_queued() {
        claimed += 1;
    }
    if claimed > 0 {
        *completed = completed.wrapping_add(claimed);
        session.notify_complete(*completed);
        debug!(claimed, completed = *completed, "published completions");
    }
    claimed
}

/// Run ticks every `interval` until the kernel side records an exit or
/// `max_ticks` is reached.
pub fn run_loop(session: &mut Session, interval: Duration, max_ticks: Option<u64>) -> LoopStats {
    let mut stats = LoopStats::default();
    let mut completed = 0u64;

    loop {
        if session.stopped() {
            let exit = session.exit_info();
            info!(kind = ?exit.kind, code = exit.exit_code, reason = %exit.reason, "kernel side exited");
            stats.stopped_by_kernel = true;
            break;
        }
        if max_ticks.is_some_and(|max| stats.ticks >= max) {
            break;
        }

        stats.claimed = stats.claimed.wrapping_add(tick(session, &mut completed));
        stats.ticks += 1;
        thread::sleep(interval);
    }

    info!(ticks = stats.ticks, claimed = stats.claimed, "handoff loop finished");
    stats
}
