//! Shared-region layout.
//!
//! This is the wire format between the user-space scheduler and the
//! kernel-side scheduler object. Field order, width and alignment must be
//! byte-identical on both sides; the assertions at the bottom pin them.
//!
//! ```text
//! offset  block      size
//! 0       config     24   (padded to 64)
//! 64      counters   16   (padded to 64)
//! 128     exit info  1168
//! ```
//!
//! Every field is declared with an atomic type of the same width as the
//! plain integer the kernel side uses. Booleans are stored as `u8` so a
//! stray byte written by the other side can never become an invalid `bool`.

use std::mem::{offset_of, size_of};
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicU8};

use serde::Serialize;

pub const EXIT_REASON_LEN: usize = 128;
pub const EXIT_MSG_LEN: usize = 1024;

pub const CONFIG_OFFSET: usize = 0;
pub const COUNTERS_OFFSET: usize = 64;
pub const EXIT_OFFSET: usize = 128;

/// Minimum number of bytes a backing region must provide.
pub const REGION_SIZE: usize = EXIT_OFFSET + size_of::<ExitBlock>();

/// Required alignment of the region base.
pub const REGION_ALIGN: usize = 8;

/// Configuration block, written once by user space before steady state.
#[repr(C)]
#[allow(dead_code)] // only reached through the mapped region
pub(crate) struct ConfigBlock {
    pub(crate) scheduler_pid: AtomicU32,
    pub(crate) exempt_pid: AtomicU32,
    pub(crate) default_slice: AtomicU64,
    pub(crate) early_processing: AtomicU8,
    pub(crate) debug: AtomicU8,
    pub(crate) builtin_idle: AtomicU8,
    _pad: [u8; 5],
}

/// Live counters, mutated concurrently by both sides.
#[repr(C)]
#[allow(dead_code)] // only reached through the mapped region
pub(crate) struct CounterBlock {
    pub(crate) nr_queued: AtomicU64,
    pub(crate) nr_scheduled: AtomicU64,
}

/// Exit record, written by the kernel side when it unregisters.
#[repr(C)]
#[allow(dead_code)] // only reached through the mapped region
pub(crate) struct ExitBlock {
    pub(crate) kind: AtomicI32,
    pub(crate) paid: AtomicU32,
    pub(crate) exit_code: AtomicI64,
    pub(crate) reason: [AtomicU8; EXIT_REASON_LEN],
    pub(crate) msg: [AtomicU8; EXIT_MSG_LEN],
}

const _: () = {
    assert!(size_of::<ConfigBlock>() == 24);
    assert!(offset_of!(ConfigBlock, scheduler_pid) == 0);
    assert!(offset_of!(ConfigBlock, exempt_pid) == 4);
    assert!(offset_of!(ConfigBlock, default_slice) == 8);
    assert!(offset_of!(ConfigBlock, early_processing) == 16);
    assert!(offset_of!(ConfigBlock, debug) == 17);
    assert!(offset_of!(ConfigBlock, builtin_idle) == 18);

    assert!(size_of::<CounterBlock>() == 16);
    assert!(offset_of!(CounterBlock, nr_queued) == 0);
    assert!(offset_of!(CounterBlock, nr_scheduled) == 8);

    assert!(size_of::<ExitBlock>() == 16 + EXIT_REASON_LEN + EXIT_MSG_LEN);
    assert!(offset_of!(ExitBlock, exit_code) == 8);
    assert!(offset_of!(ExitBlock, reason) == 16);
    assert!(offset_of!(ExitBlock, msg) == 16 + EXIT_REASON_LEN);

    assert!(CONFIG_OFFSET + size_of::<ConfigBlock>() <= COUNTERS_OFFSET);
    assert!(COUNTERS_OFFSET + size_of::<CounterBlock>() <= EXIT_OFFSET);
    assert!(COUNTERS_OFFSET % REGION_ALIGN == 0);
    assert!(EXIT_OFFSET % REGION_ALIGN == 0);
};

// ── Decoded views ─────────────────────────────────────────────

/// Point-in-time copy of the configuration block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfigSnapshot {
    pub scheduler_pid: u32,
    pub exempt_pid: u32,
    pub early_processing: bool,
    pub default_slice: u64,
    pub debug: bool,
    pub builtin_idle: bool,
}

/// Point-in-time copy of the live counters. The two fields are read
/// independently and may not be mutually consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub nr_queued: u64,
    pub nr_scheduled: u64,
}

/// Why the kernel-side scheduler exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitKind {
    None,
    Done,
    Unreg,
    UnregBpf,
    UnregKern,
    SysRq,
    Error,
    ErrorBpf,
    ErrorStall,
    Unknown(i32),
}

impl ExitKind {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => ExitKind::None,
            1 => ExitKind::Done,
            64 => ExitKind::Unreg,
            65 => ExitKind::UnregBpf,
            66 => ExitKind::UnregKern,
            67 => ExitKind::SysRq,
            1024 => ExitKind::Error,
            1025 => ExitKind::ErrorBpf,
            1026 => ExitKind::ErrorStall,
            other => ExitKind::Unknown(other),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            ExitKind::None => 0,
            ExitKind::Done => 1,
            ExitKind::Unreg => 64,
            ExitKind::UnregBpf => 65,
            ExitKind::UnregKern => 66,
            ExitKind::SysRq => 67,
            ExitKind::Error => 1024,
            ExitKind::ErrorBpf => 1025,
            ExitKind::ErrorStall => 1026,
            ExitKind::Unknown(raw) => raw,
        }
    }

    pub fn is_error(self) -> bool {
        self.as_raw() >= 1024
    }
}

/// Decoded exit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserExitInfo {
    pub kind: ExitKind,
    /// Pid of the task that triggered the exit, 0 if none.
    pub paid: u32,
    pub exit_code: i64,
    pub reason: String,
    pub message: String,
}

impl UserExitInfo {
    /// An empty record: nothing has exited.
    pub fn cleared() -> Self {
        Self {
            kind: ExitKind::None,
            paid: 0,
            exit_code: 0,
            reason: String::new(),
            message: String::new(),
        }
    }

    /// The kernel side has exited (or never cleared a previous exit).
    pub fn stopped(&self) -> bool {
        self.kind != ExitKind::None || self.exit_code != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_size_covers_all_blocks() {
        assert_eq!(REGION_SIZE, 128 + 16 + 128 + 1024);
    }

    #[test]
    fn exit_kind_raw_values_survive() {
        for raw in [0, 1, 64, 65, 66, 67, 1024, 1025, 1026, 7] {
            assert_eq!(ExitKind::from_raw(raw).as_raw(), raw);
        }
        assert_eq!(ExitKind::from_raw(7), ExitKind::Unknown(7));
    }

    #[test]
    fn error_kinds() {
        assert!(ExitKind::ErrorStall.is_error());
        assert!(!ExitKind::Unreg.is_error());
    }

    #[test]
    fn stopped_on_kind_or_code() {
        let mut info = UserExitInfo::cleared();
        assert!(!info.stopped());
        // The triggering pid alone does not mean an exit happened.
        info.paid = 77;
        assert!(!info.stopped());
        info.exit_code = 3;
        assert!(info.stopped());
        info.exit_code = 0;
        info.kind = ExitKind::Unreg;
        assert!(info.stopped());
    }
}
