//! Typed accessors over a bound shared region.
//!
//! `Region` is the only place that turns a base pointer into references to
//! the ABI blocks. Everything above it works with typed getters and setters.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};

use usersched_core::SchedError;

use crate::abi::{
    ConfigBlock, ConfigSnapshot, CounterBlock, CounterSnapshot, ExitBlock, ExitKind,
    UserExitInfo, CONFIG_OFFSET, COUNTERS_OFFSET, EXIT_MSG_LEN, EXIT_OFFSET, EXIT_REASON_LEN,
    REGION_ALIGN, REGION_SIZE,
};

pub(crate) struct Region {
    config: NonNull<ConfigBlock>,
    counters: NonNull<CounterBlock>,
    exit: NonNull<ExitBlock>,
}

// All accesses through `Region` are atomic.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Bind the ABI blocks at their fixed offsets from `base`.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` bytes for as long
    /// as the returned `Region` is used.
    pub(crate) unsafe fn bind(base: NonNull<u8>, len: usize) -> Result<Self, SchedError> {
        if len < REGION_SIZE {
            return Err(SchedError::Init(format!(
                "shared region too small: {len} bytes, need {REGION_SIZE}"
            )));
        }
        if base.as_ptr() as usize % REGION_ALIGN != 0 {
            return Err(SchedError::Init(format!(
                "shared region misaligned: base {:p}",
                base.as_ptr()
            )));
        }
        Ok(Self {
            config: base.add(CONFIG_OFFSET).cast(),
            counters: base.add(COUNTERS_OFFSET).cast(),
            exit: base.add(EXIT_OFFSET).cast(),
        })
    }

    fn config(&self) -> &ConfigBlock {
        unsafe { self.config.as_ref() }
    }

    fn counters(&self) -> &CounterBlock {
        unsafe { self.counters.as_ref() }
    }

    fn exit(&self) -> &ExitBlock {
        unsafe { self.exit.as_ref() }
    }

    // ── Configuration block ─────────────────────────────────

    pub(crate) fn scheduler_pid(&self) -> u32 {
        self.config().scheduler_pid.load(Ordering::Acquire)
    }

    pub(crate) fn set_scheduler_pid(&self, pid: u32) {
        self.config().scheduler_pid.store(pid, Ordering::Release);
    }

    pub(crate) fn set_exempt_pid(&self, pid: u32) {
        self.config().exempt_pid.store(pid, Ordering::Relaxed);
    }

    pub(crate) fn set_early_processing(&self, enabled: bool) {
        self.config()
            .early_processing
            .store(enabled as u8, Ordering::Relaxed);
    }

    pub(crate) fn set_default_slice(&self, slice_ns: u64) {
        self.config().default_slice.store(slice_ns, Ordering::Relaxed);
    }

    pub(crate) fn set_debug(&self, enabled: bool) {
        self.config().debug.store(enabled as u8, Ordering::Relaxed);
    }

    pub(crate) fn set_builtin_idle(&self, enabled: bool) {
        self.config().builtin_idle.store(enabled as u8, Ordering::Relaxed);
    }

    pub(crate) fn config_snapshot(&self) -> ConfigSnapshot {
        let c = self.config();
        ConfigSnapshot {
            scheduler_pid: c.scheduler_pid.load(Ordering::Acquire),
            exempt_pid: c.exempt_pid.load(Ordering::Relaxed),
            early_processing: c.early_processing.load(Ordering::Relaxed) != 0,
            default_slice: c.default_slice.load(Ordering::Relaxed),
            debug: c.debug.load(Ordering::Relaxed) != 0,
            builtin_idle: c.builtin_idle.load(Ordering::Relaxed) != 0,
        }
    }

    // ── Live counters ───────────────────────────────────────

    pub(crate) fn nr_queued(&self) -> u64 {
        self.counters().nr_queued.load(Ordering::Acquire)
    }

    pub(crate) fn nr_scheduled(&self) -> u64 {
        self.counters().nr_scheduled.load(Ordering::Acquire)
    }

    pub(crate) fn store_nr_queued(&self, n: u64) {
        self.counters().nr_queued.store(n, Ordering::Release);
    }

    pub(crate) fn store_nr_scheduled(&self, n: u64) {
        self.counters().nr_scheduled.store(n, Ordering::Release);
    }

    /// Add `n` to `nr_queued` unless that would overflow. Returns the value
    /// stored, or `None` with the counter unchanged.
    pub(crate) fn add_nr_queued(&self, n: u64) -> Option<u64> {
        self.counters()
            .nr_queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |q| q.checked_add(n))
            .ok()
            .map(|prev| prev + n)
    }

    /// Decrement `nr_queued` unless it is already zero. Returns whether a
    /// task was claimed.
    pub(crate) fn sub_nr_queued(&self) -> bool {
        self.counters()
            .nr_queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub(crate) fn counter_snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            nr_queued: self.nr_queued(),
            nr_scheduled: self.nr_scheduled(),
        }
    }

    // ── Exit record ─────────────────────────────────────────

    pub(crate) fn exit_info(&self) -> UserExitInfo {
        let e = self.exit();
        UserExitInfo {
            kind: ExitKind::from_raw(e.kind.load(Ordering::Acquire)),
            paid: e.paid.load(Ordering::Acquire),
            exit_code: e.exit_code.load(Ordering::Acquire),
            reason: read_cstr(&e.reason),
            message: read_cstr(&e.msg),
        }
    }

    /// Text is written before `kind` so a reader that sees a non-zero kind
    /// also sees the text.
    pub(crate) fn write_exit(&self, info: &UserExitInfo) {
        let e = self.exit();
        write_cstr(&e.reason[..EXIT_REASON_LEN], &info.reason);
        write_cstr(&e.msg[..EXIT_MSG_LEN], &info.message);
        e.paid.store(info.paid, Ordering::Release);
        e.exit_code.store(info.exit_code, Ordering::Release);
        e.kind.store(info.kind.as_raw(), Ordering::Release);
    }
}

fn read_cstr(bytes: &[AtomicU8]) -> String {
    let raw: Vec<u8> = bytes
        .iter()
        .map(|b| b.load(Ordering::Relaxed))
        .take_while(|&b| b != 0)
        .collect();
    String::from_utf8_lossy(&raw).into_owned()
}

/// Truncates to leave room for the terminating NUL.
fn write_cstr(dst: &[AtomicU8], src: &str) {
    let src = src.as_bytes();
    let n = src.len().min(dst.len().saturating_sub(1));
    for (i, slot) in dst.iter().enumerate() {
        let byte = if i < n { src[i] } else { 0 };
        slot.store(byte, Ordering::Relaxed);
    }
}
