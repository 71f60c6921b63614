/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler state, split by owning context.
//!
//! [`SyncState`] is written by the timer and tone callbacks as well as by
//! the main loop, so it lives behind a single mutex (see
//! [`SharedSyncState`]).  [`Cursor`] and [`Counters`] are only ever touched
//! by the main loop and need no lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
#[cfg(test)]
use std::sync::TryLockError;

use crate::config::SchedulerConfig;

// ── SyncToMet ─────────────────────────────────────────────────────────────────

/// Bit set describing how the timeline is tied to mission-elapsed time.
///
/// An empty set means the scheduler is counting minor frames since the last
/// tone only.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncToMet(u8);

impl SyncToMet {
    pub const NOT_SYNCHRONIZED: Self = Self(0);
    /// Minor frames are derived from MET because the timer is too coarse.
    pub const MINOR_SYNCHRONIZED: Self = Self(1);
    /// No tone seen yet; searching for the MET zero point.
    pub const PENDING_MAJOR_SYNCH: Self = Self(2);
    /// The major frame boundary was found from MET.
    pub const MAJOR_SYNCHRONIZED: Self = Self(4);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Keeps only the bits in `mask`.
    pub fn retain(&mut self, mask: Self) {
        self.0 &= mask.0;
    }

    pub fn is_synchronized(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for SyncToMet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("NOT_SYNCHRONIZED");
        }
        let names = [
            (Self::MINOR_SYNCHRONIZED, "MINOR_SYNCHRONIZED"),
            (Self::PENDING_MAJOR_SYNCH, "PENDING_MAJOR_SYNCH"),
            (Self::MAJOR_SYNCHRONIZED, "MAJOR_SYNCHRONIZED"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&set.join("|"))
    }
}

/// What last established the major frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MajorFrameSource {
    #[default]
    None,
    ExternalTone,
    MinorFrameTimer,
}

impl MajorFrameSource {
    pub fn to_raw(self) -> u8 {
        match self {
            MajorFrameSource::None => 0,
            MajorFrameSource::ExternalTone => 1,
            MajorFrameSource::MinorFrameTimer => 2,
        }
    }
}

// ── SyncState ─────────────────────────────────────────────────────────────────

/// Frame synchronisation state shared by the callbacks and the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub sync_to_met: SyncToMet,
    pub major_frame_source: MajorFrameSource,
    pub minor_frames_since_tone: u16,
    pub last_sync_met_slot: u16,
    pub sync_attempts_left: u16,
    pub ignore_major_frame: bool,
    pub unexpected_major_frame: bool,
    pub consecutive_noisy_frame_counter: u32,
    /// Next slot the table processor will execute.
    pub next_slot_number: u16,
    /// Slots that may legitimately elapse between two wakeups.
    pub worst_case_slots_per_minor_frame: u16,

    pub valid_major_frame_count: u32,
    pub missed_major_frame_count: u32,
    pub unexpected_major_frame_count: u32,
}

impl SyncState {
    /// State right after timer initialisation.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            sync_to_met: SyncToMet::NOT_SYNCHRONIZED,
            major_frame_source: MajorFrameSource::None,
            minor_frames_since_tone: config.time_sync_slot(),
            last_sync_met_slot: 0,
            sync_attempts_left: 0,
            ignore_major_frame: false,
            unexpected_major_frame: false,
            consecutive_noisy_frame_counter: 0,
            next_slot_number: 0,
            worst_case_slots_per_minor_frame: 1,
            valid_major_frame_count: 0,
            missed_major_frame_count: 0,
            unexpected_major_frame_count: 0,
        }
    }
}

/// Mutex-protected [`SyncState`] handle.
///
/// The state is plain data, so a panic while the lock was held cannot leave
/// it inconsistent in a way a later reader could not handle; poisoning is
/// therefore ignored.
#[derive(Debug, Clone)]
pub struct SharedSyncState(Arc<Mutex<SyncState>>);

impl SharedSyncState {
    pub fn new(state: SyncState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SyncState {
        self.lock().clone()
    }

    /// Whether some guard is currently alive, on any thread.
    #[cfg(test)]
    pub fn is_held(&self) -> bool {
        matches!(self.0.try_lock(), Err(TryLockError::WouldBlock))
    }
}

// ── ProcessingGate ────────────────────────────────────────────────────────────

/// Switch that lets other tasks pause the table walk.
///
/// Clones share one flag.  Closing the gate leaves the timeline, the timer
/// and the tone handling untouched; only the walk itself is skipped.
#[derive(Debug, Clone)]
pub struct ProcessingGate(Arc<AtomicBool>);

impl ProcessingGate {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn enable(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ── Loop-owned state ──────────────────────────────────────────────────────────

/// Table-walk bookkeeping owned by the main loop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cursor {
    /// Slot count processed on the previous wakeup (after jitter correction).
    pub last_process_count: u16,
    /// Completed passes through the table; drives frequency/remainder.
    pub table_pass_count: u32,
    /// Latch for the one-shot "too noisy" event.
    pub ignore_major_frame_msg_sent: bool,
    /// Accuracy reported by the minor-frame timer, in microseconds.
    pub clock_accuracy: u32,
}

/// Housekeeping counters owned by the main loop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Counters {
    pub command_counter: u8,
    pub error_counter: u8,
    pub activity_success_count: u32,
    pub activity_failure_count: u32,
    pub slots_processed_count: u32,
    pub skipped_slots_count: u16,
    pub multiple_slots_count: u16,
    pub same_slot_count: u16,
    pub bad_table_data_count: u16,
    pub table_verify_success_count: u16,
    pub table_verify_failure_count: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_sync_state_waits_in_sync_slot() {
        let state = SyncState::new(&SchedulerConfig::default());
        assert_eq!(state.sync_to_met, SyncToMet::NOT_SYNCHRONIZED);
        assert_eq!(state.minor_frames_since_tone, 99);
        assert_eq!(state.worst_case_slots_per_minor_frame, 1);
        assert_eq!(state.major_frame_source, MajorFrameSource::None);
    }

    #[test]
    fn sync_bits_insert_remove_retain() {
        let mut s = SyncToMet::NOT_SYNCHRONIZED;
        assert!(!s.is_synchronized());
        s.insert(SyncToMet::MINOR_SYNCHRONIZED);
        s.insert(SyncToMet::PENDING_MAJOR_SYNCH);
        assert!(s.contains(SyncToMet::PENDING_MAJOR_SYNCH));
        assert_eq!(s.bits(), 3);

        s.retain(SyncToMet::MINOR_SYNCHRONIZED);
        assert_eq!(s, SyncToMet::MINOR_SYNCHRONIZED);
        s.remove(SyncToMet::MINOR_SYNCHRONIZED);
        assert!(!s.is_synchronized());
        assert_eq!(format!("{s:?}"), "NOT_SYNCHRONIZED");
    }

    #[test]
    fn gate_clones_share_one_flag() {
        let gate = ProcessingGate::new(true);
        let remote = gate.clone();
        remote.disable();
        assert!(!gate.is_enabled());
        gate.enable();
        assert!(remote.is_enabled());
    }

    #[test]
    fn shared_state_survives_poisoning() {
        let shared = SharedSyncState::new(SyncState::new(&SchedulerConfig::default()));
        let clone = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock();
            panic!("poison");
        })
        .join();
        shared.lock().next_slot_number = 7;
        assert_eq!(shared.snapshot().next_slot_number, 7);
    }
}
