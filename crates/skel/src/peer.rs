//! The kernel side of the shared region, for simulation and tests.
//!
//! A `KernelPeer` performs the writes the in-kernel scheduler would:
//! it bumps `nr_queued` on enqueue, reads the published configuration and
//! records an exit. It does not take the process-wide session slot, so it
//! can sit next to a [`Session`](crate::Session) on the same backing.

use tracing::debug;
use usersched_core::SchedError;

use crate::abi::{ConfigSnapshot, CounterSnapshot, ExitKind, UserExitInfo};
use crate::object::SchedObject;
use crate::region::Region;

pub struct KernelPeer {
    region: Region,
    object: Box<dyn SchedObject>,
}

impl KernelPeer {
    pub fn attach<O: SchedObject>(object: O) -> Result<Self, SchedError> {
        let object: Box<dyn SchedObject> = Box::new(object);
        let region = unsafe { Region::bind(object.region(), object.region_len()) }?;
        Ok(Self { region, object })
    }

    /// Enqueue `n` tasks. Returns the new queue depth.
    ///
    /// Fails with [`SchedError::Overflow`] if the depth would exceed
    /// `u64::MAX`; `nr_queued` is left unchanged in that case.
    pub fn enqueue(&self, n: u64) -> Result<u64, SchedError> {
        let queued = self.region.add_nr_queued(n).ok_or_else(|| {
            SchedError::Overflow(format!(
                "enqueue of {n} on top of {} queued",
                self.region.nr_queued()
            ))
        })?;
        debug!(added = n, queued, "kernel peer enqueue");
        Ok(queued)
    }

    /// Publish the scheduler identity from outside the session, as another
    /// control-plane process (e.g. `schedctl init`) would.
    pub fn set_scheduler_pid(&self, pid: u32) {
        self.region.set_scheduler_pid(pid);
    }

    pub fn set_nr_queued(&self, n: u64) {
        self.region.store_nr_queued(n);
    }

    pub fn nr_queued(&self) -> u64 {
        self.region.nr_queued()
    }

    pub fn nr_scheduled(&self) -> u64 {
        self.region.nr_scheduled()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.region.counter_snapshot()
    }

    /// Zero both counters, as a restarted kernel side would.
    pub fn reset_counters(&self) {
        self.region.store_nr_queued(0);
        self.region.store_nr_scheduled(0);
    }

    pub fn config(&self) -> ConfigSnapshot {
        self.region.config_snapshot()
    }

    pub fn exit(&self, kind: ExitKind, exit_code: i64, reason: &str, message: &str) {
        self.exit_with(&UserExitInfo {
            kind,
            paid: 0,
            exit_code,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }

    /// Record a full exit, including the pid of the task that caused it.
    pub fn exit_with(&self, info: &UserExitInfo) {
        self.region.write_exit(info);
        debug!(kind = ?info.kind, paid = info.paid, exit_code = info.exit_code, "kernel peer recorded exit");
    }

    /// Clear the exit record.
    pub fn clear_exit(&self) {
        self.region.write_exit(&UserExitInfo::cleared());
    }

    pub fn exit_info(&self) -> UserExitInfo {
        self.region.exit_info()
    }

    /// Release the backing object.
    pub fn detach(self) {
        self.object.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapObject;

    #[test]
    fn enqueue_accumulates() {
        let peer = KernelPeer::attach(HeapObject::new()).unwrap();
        assert_eq!(peer.enqueue(2).unwrap(), 2);
        assert_eq!(peer.enqueue(3).unwrap(), 5);
        assert_eq!(peer.nr_queued(), 5);
    }

    #[test]
    fn enqueue_overflow_leaves_depth_untouched() {
        let peer = KernelPeer::attach(HeapObject::new()).unwrap();
        peer.enqueue(1).unwrap();
        let err = peer.enqueue(u64::MAX).unwrap_err();
        assert!(matches!(err, SchedError::Overflow(_)));
        assert_eq!(peer.nr_queued(), 1);
    }

    #[test]
    fn scheduler_pid_published_by_peer() {
        let peer = KernelPeer::attach(HeapObject::new()).unwrap();
        peer.set_scheduler_pid(31);
        assert_eq!(peer.config().scheduler_pid, 31);
    }

    #[test]
    fn reset_zeroes_counters() {
        let peer = KernelPeer::attach(HeapObject::new()).unwrap();
        peer.set_nr_queued(9);
        peer.reset_counters();
        assert_eq!(peer.counters(), CounterSnapshot { nr_queued: 0, nr_scheduled: 0 });
    }

    #[test]
    fn exit_then_clear() {
        let peer = KernelPeer::attach(HeapObject::new()).unwrap();
        peer.exit(ExitKind::Error, 1, "boom", "runqueue stall");
        assert!(peer.exit_info().stopped());
        peer.clear_exit();
        assert!(!peer.exit_info().stopped());
    }

    #[test]
    fn exit_carries_offending_pid() {
        let peer = KernelPeer::attach(HeapObject::new()).unwrap();
        peer.exit_with(&UserExitInfo {
            kind: ExitKind::ErrorStall,
            paid: 1234,
            exit_code: -1,
            reason: "watchdog".into(),
            message: "task 1234 stalled".into(),
        });
        let info = peer.exit_info();
        assert_eq!(info.paid, 1234);
        assert_eq!(info.kind, ExitKind::ErrorStall);

        peer.clear_exit();
        assert_eq!(peer.exit_info().paid, 0);
    }

    #[test]
    fn short_backing_rejected() {
        let err = KernelPeer::attach(HeapObject::with_len(8)).err().unwrap();
        assert!(err.is_init());
    }
}
