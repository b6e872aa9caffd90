//! Integration tests for the session protocol: configuration round-trips,
//! queued/scheduled counter semantics and open/destroy cycles.

use std::sync::{Mutex, MutexGuard};
use std::thread;

use usersched_skel::{session_active, HeapObject, KernelPeer, SchedError, Session};

// ============================================================================
// Test Helpers
// ============================================================================

static SERIAL: Mutex<()> = Mutex::new(());

/// Sessions are process-wide; run session tests one at a time.
fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// Open a session on a heap region and attach a simulated kernel side to it.
fn open_pair() -> (Session, KernelPeer, HeapObject) {
    let obj = HeapObject::new();
    let probe = obj.clone();
    let peer = KernelPeer::attach(obj.clone()).unwrap();
    let session = Session::open(move || Ok(obj)).unwrap();
    (session, peer, probe)
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn default_slice_round_trips() {
    let _g = serial();
    let (mut session, peer, _) = open_pair();
    for slice in [1, 20_000, 5_000_000, u64::MAX] {
        session.set_default_slice(slice);
        assert_eq!(session.config_snapshot().default_slice, slice);
        assert_eq!(peer.config().default_slice, slice);
    }
    session.destroy();
}

#[test]
fn setters_touch_only_their_field() {
    let _g = serial();
    let (mut session, peer, _) = open_pair();
    session.set_exempt_pid(88);
    session.set_early_processing(true);
    session.set_debug(true);

    let cfg = peer.config();
    assert_eq!(cfg.exempt_pid, 88);
    assert!(cfg.early_processing);
    assert!(cfg.debug);
    assert_eq!(cfg.scheduler_pid, 0);
    assert_eq!(cfg.default_slice, 0);
    assert!(!cfg.builtin_idle);

    session.set_early_processing(false);
    assert!(!peer.config().early_processing);
    assert!(peer.config().debug);
    session.destroy();
}

#[test]
fn scheduler_pid_zero_means_unset() {
    let _g = serial();
    let (mut session, _peer, _) = open_pair();
    assert_eq!(session.get_scheduler_pid(), 0);
    session.set_scheduler_pid(std::process::id());
    assert_eq!(session.get_scheduler_pid(), std::process::id());
    session.destroy();
}

// ============================================================================
// Live counters
// ============================================================================

#[test]
fn sub_nr_queued_at_zero_is_noop() {
    let _g = serial();
    let (mut session, _peer, _) = open_pair();
    assert_eq!(session.get_nr_queued(), 0);
    assert!(!session.sub_nr_queued());
    assert!(!session.sub_nr_queued());
    assert_eq!(session.get_nr_queued(), 0);
    session.destroy();
}

#[test]
fn sub_nr_queued_drains_to_exactly_zero() {
    let _g = serial();
    let (mut session, peer, _) = open_pair();
    peer.set_nr_queued(5);
    for remaining in (0..5).rev() {
        assert!(session.sub_nr_queued());
        assert_eq!(session.get_nr_queued(), remaining);
    }
    assert!(!session.sub_nr_queued());
    assert_eq!(session.get_nr_queued(), 0);
    session.destroy();
}

#[test]
fn notify_complete_overwrites() {
    let _g = serial();
    let (mut session, peer, _) = open_pair();
    session.notify_complete(10);
    assert_eq!(session.get_nr_scheduled(), 10);
    session.notify_complete(3);
    assert_eq!(session.get_nr_scheduled(), 3);
    assert_eq!(peer.nr_scheduled(), 3);
    session.notify_complete(0);
    assert_eq!(session.get_nr_scheduled(), 0);
    session.destroy();
}

#[test]
fn kernel_reset_between_claims_is_tolerated() {
    let _g = serial();
    let (mut session, peer, _) = open_pair();
    peer.set_nr_queued(2);
    assert!(session.sub_nr_queued());
    peer.reset_counters();
    assert!(!session.sub_nr_queued());
    assert_eq!(session.get_nr_queued(), 0);
    session.destroy();
}

#[test]
fn concurrent_enqueue_and_claim_never_underflow() {
    let _g = serial();
    let (mut session, peer, _) = open_pair();

    const PER_BATCH: u64 = 10;
    const BATCHES: u64 = 500;

    let producer = thread::spawn(move || {
        for _ in 0..BATCHES {
            peer.enqueue(PER_BATCH).unwrap();
            thread::yield_now();
        }
        peer
    });

    let mut claimed = 0u64;
    while claimed < PER_BATCH * BATCHES {
        if session.sub_nr_queued() {
            claimed += 1;
        } else {
            thread::yield_now();
        }
        assert!(session.get_nr_queued() <= PER_BATCH * BATCHES);
    }

    let peer = producer.join().unwrap();
    assert_eq!(peer.nr_queued(), 0);
    assert!(!session.sub_nr_queued());
    session.destroy();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn open_destroy_cycles_leave_nothing_behind() {
    let _g = serial();
    let obj = HeapObject::new();
    for _ in 0..100 {
        let handle = obj.clone();
        let session = Session::open(move || Ok(handle)).unwrap();
        assert!(session_active());
        session.destroy();
        assert!(!session_active());
        assert_eq!(obj.handle_count(), 1);
    }
}

#[test]
fn second_open_rejected_until_destroy() {
    let _g = serial();
    let (session, _peer, _) = open_pair();
    let err = Session::open(|| Ok(HeapObject::new())).unwrap_err();
    assert!(matches!(err, SchedError::InvalidUse(_)));
    session.destroy();

    let again = Session::open(|| Ok(HeapObject::new())).unwrap();
    again.destroy();
}

#[test]
fn failed_open_leaves_no_partial_state() {
    let _g = serial();
    let too_small = HeapObject::with_len(64);
    let probe = too_small.clone();
    let err = Session::open(move || Ok(too_small)).unwrap_err();
    assert!(err.is_init());
    assert_eq!(probe.handle_count(), 1);
    assert!(!session_active());

    let session = Session::open(|| Ok(HeapObject::new())).unwrap();
    session.destroy();
}

#[test]
fn destroy_releases_backing_while_peer_keeps_it() {
    let _g = serial();
    let (session, peer, probe) = open_pair();
    // probe + peer + session
    assert_eq!(probe.handle_count(), 3);
    session.destroy();
    assert_eq!(probe.handle_count(), 2);
    peer.detach();
    assert_eq!(probe.handle_count(), 1);
}

// ============================================================================
// End-to-end handoff
// ============================================================================

#[test]
fn configure_claim_and_complete() {
    let _g = serial();
    let (mut session, peer, _) = open_pair();

    session.set_scheduler_pid(4242);
    session.set_default_slice(20000);
    session.set_builtin_idle(false);

    peer.set_nr_queued(3);
    session.sub_nr_queued();
    session.sub_nr_queued();
    session.sub_nr_queued();
    assert_eq!(session.get_nr_queued(), 0);

    session.notify_complete(3);
    assert_eq!(session.get_nr_scheduled(), 3);

    let cfg = peer.config();
    assert_eq!(cfg.scheduler_pid, 4242);
    assert_eq!(cfg.default_slice, 20000);
    assert!(!cfg.builtin_idle);
    assert_eq!(peer.nr_scheduled(), 3);

    session.destroy();
}
