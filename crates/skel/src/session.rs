//! The live binding between this process and the kernel-side scheduler.
//!
//! At most one [`Session`] exists per process. It owns the kernel-side
//! object and the typed view of its shared region; every protocol
//! operation goes through it. [`Session::destroy`] consumes the handle, so
//! double destroy and use after destroy do not compile.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};
use usersched_core::{SchedConfig, SchedError};

use crate::abi::{ConfigSnapshot, CounterSnapshot, UserExitInfo};
use crate::object::SchedObject;
use crate::region::Region;

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Whether a session is currently open in this process.
pub fn session_active() -> bool {
    SESSION_ACTIVE.load(Ordering::Acquire)
}

/// Ownership of the process-wide session slot. Freed on drop.
struct SessionSlot(());

impl SessionSlot {
    fn claim() -> Result<Self, SchedError> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SessionSlot(()))
            .map_err(|_| SchedError::InvalidUse("a session is already open in this process".into()))
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::Release);
    }
}

pub struct Session {
    region: Region,
    object: Option<Box<dyn SchedObject>>,
    name: String,
    _slot: SessionSlot,
}

impl Session {
    /// Construct the kernel-side object and bind it as this process's session.
    ///
    /// Fails with [`SchedError::InvalidUse`] if a session is already open, and
    /// with [`SchedError::Init`] if construction or binding fails. On failure
    /// nothing stays allocated and the slot is free again.
    pub fn open<O, F>(construct: F) -> Result<Self, SchedError>
    where
        O: SchedObject,
        F: FnOnce() -> Result<O, SchedError>,
    {
        let slot = SessionSlot::claim()?;

        let object: Box<dyn SchedObject> = match construct() {
            Ok(object) => Box::new(object),
            Err(e @ SchedError::Init(_)) => return Err(e),
            Err(e) => return Err(SchedError::Init(e.to_string())),
        };

        let region = match unsafe { Region::bind(object.region(), object.region_len()) } {
            Ok(region) => region,
            Err(e) => {
                warn!(object = object.name(), error = %e, "releasing unusable scheduler object");
                object.release();
                return Err(e);
            }
        };

        let name = object.name().to_string();
        info!(object = %name, "scheduler session opened");
        Ok(Self {
            region,
            object: Some(object),
            name,
            _slot: slot,
        })
    }

    /// Release all kernel-side resources and free the session slot.
    pub fn destroy(mut self) {
        if let Some(object) = self.object.take() {
            object.release();
        }
        info!(object = %self.name, "scheduler session destroyed");
    }

    // ── Configuration ───────────────────────────────────────────

    pub fn set_scheduler_pid(&mut self, pid: u32) {
        self.region.set_scheduler_pid(pid);
    }

    pub fn set_exempt_pid(&mut self, pid: u32) {
        self.region.set_exempt_pid(pid);
    }

    pub fn set_early_processing(&mut self, enabled: bool) {
        self.region.set_early_processing(enabled);
    }

    /// Default time slice in nanoseconds. Callers pass a positive value.
    pub fn set_default_slice(&mut self, slice_ns: u64) {
        self.region.set_default_slice(slice_ns);
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.region.set_debug(enabled);
    }

    pub fn set_builtin_idle(&mut self, enabled: bool) {
        self.region.set_builtin_idle(enabled);
    }

    /// Currently published scheduler identity; 0 until configured.
    pub fn get_scheduler_pid(&self) -> u32 {
        self.region.scheduler_pid()
    }

    pub fn config_snapshot(&self) -> ConfigSnapshot {
        self.region.config_snapshot()
    }

    /// Publish every configuration field from `config`.
    ///
    /// `scheduler_pid` is written last so a reader polling it sees the other
    /// fields once it turns non-zero.
    pub fn apply(&mut self, config: &SchedConfig) -> ConfigSnapshot {
        let scheduler_pid = config.resolved_scheduler_pid();
        let exempt_pid = config.resolved_exempt_pid();

        self.set_exempt_pid(exempt_pid);
        self.set_early_processing(config.early_processing);
        self.set_default_slice(config.default_slice_ns);
        self.set_debug(config.debug);
        self.set_builtin_idle(config.builtin_idle);
        self.set_scheduler_pid(scheduler_pid);

        let applied = self.config_snapshot();
        info!(
            scheduler_pid = applied.scheduler_pid,
            exempt_pid = applied.exempt_pid,
            slice_ns = applied.default_slice,
            early_processing = applied.early_processing,
            builtin_idle = applied.builtin_idle,
            debug = applied.debug,
            "scheduler configuration applied"
        );
        applied
    }

    // ── Live counters ───────────────────────────────────────────

    pub fn get_nr_queued(&self) -> u64 {
        self.region.nr_queued()
    }

    pub fn get_nr_scheduled(&self) -> u64 {
        self.region.nr_scheduled()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.region.counter_snapshot()
    }

    /// Overwrite `nr_scheduled` with `n`. This is an absolute count, not a
    /// delta: the kernel side reads the value as-is.
    pub fn notify_complete(&mut self, n: u64) {
        self.region.store_nr_scheduled(n);
    }

    /// Claim one queued task: decrement `nr_queued` unless it is zero.
    ///
    /// Returns `false` (and changes nothing) when the counter is already zero,
    /// e.g. because the kernel side reset it after a restart.
    pub fn sub_nr_queued(&mut self) -> bool {
        let claimed = self.region.sub_nr_queued();
        if !claimed {
            debug!("sub_nr_queued at zero");
        }
        claimed
    }

    // ── Exit record ─────────────────────────────────────────────

    pub fn exit_info(&self) -> UserExitInfo {
        self.region.exit_info()
    }

    /// The kernel side has recorded an exit.
    pub fn stopped(&self) -> bool {
        let info = self.exit_info();
        if info.stopped() {
            debug!(kind = ?info.kind, exit_code = info.exit_code, "kernel side stopped");
        }
        info.stopped()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            warn!(object = %self.name, "session dropped without destroy, releasing");
            object.release();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("object", &self.name)
            .field("counters", &self.counters())
            .finish()
    }
}
