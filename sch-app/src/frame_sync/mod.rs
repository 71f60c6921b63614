/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Major/minor frame synchronisation.
//!
//! Two asynchronous inputs drive the timeline:
//!
//! ```text
//!  tone ──► major_frame_callback ─┐                 ┌─► wakeup.give()
//!                                 ├─► SyncState ────┤
//!  timer ─► minor_frame_callback ─┘                 └─► timer re-arm
//! ```
//!
//! The minor-frame timer normally runs at the slot period.  While waiting in
//! the last slot for the tone it is armed for one *long* slot
//! (`normal + drift window`); if the tone does not arrive the next expiry
//! wraps the timeline and a *short* slot (`normal - drift window`) makes up
//! the difference.
//!
//! If no tone is ever seen, the first timer expiry switches the timeline to
//! mission-elapsed time: the callbacks look for the MET slot 0 boundary for
//! up to three major frames and then run MET-aligned.
//!
//! # Callback discipline
//! Callbacks hold the state lock only while updating fields.  MET is read
//! before the guard is taken; timer re-arm and the wakeup are issued after
//! it is dropped.  Callbacks never report events: the main loop turns state
//! changes into events.

use std::sync::{Arc, OnceLock, Weak};

use tracing::warn;

use crate::config::SchedulerConfig;
use crate::services::{
    ClockState, FrameCallback, ServiceError, TimeService, TimerHandle, TimerService, Wakeup,
};
use crate::state::{MajorFrameSource, SharedSyncState, SyncState, SyncToMet};

/// Name under which the minor-frame timer is created.
pub const MINOR_FRAME_TIMER_NAME: &str = "SCH_MINOR_TIMER";

// ── MET slot math ─────────────────────────────────────────────────────────────

/// Converts MET sub-seconds (units of 2^-32 s) to microseconds.
pub fn subseconds_to_micros(subseconds: u32) -> u32 {
    let micros = (u64::from(subseconds) * 1_000_000) >> 32;
    micros.min(999_999) as u32
}

/// Slot of the major frame that `subseconds` falls into.
///
/// A time within one microsecond of the next slot boundary already counts
/// as the next slot, and the slot past the end of the table wraps to 0.
pub fn met_slot(subseconds: u32, config: &SchedulerConfig) -> u16 {
    let normal = config.normal_slot_period();
    let micros = subseconds_to_micros(subseconds);

    let mut slot = micros / normal;
    let remainder = micros - slot * normal + 1;
    slot += remainder / normal;

    if slot >= u32::from(config.total_slots) {
        0
    } else {
        slot as u16
    }
}

/// Where the table walk stands, taken from one view of the sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelinePosition {
    pub current_slot: u16,
    pub next_slot: u16,
    pub sync_to_met: SyncToMet,
    pub worst_case_slots_per_minor_frame: u16,
}

/// Timer setting to apply once the state lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerArm {
    start_us: u32,
    interval_us: u32,
}

// ── FrameSync ─────────────────────────────────────────────────────────────────

/// Frame synchronisation engine.
///
/// Shared between the scheduler main loop and the two callbacks; the
/// callbacks reach it through weak references so that dropping the
/// scheduler tears the engine down.
pub struct FrameSync {
    config: SchedulerConfig,
    state: SharedSyncState,
    time: Arc<dyn TimeService>,
    timer: Arc<dyn TimerService>,
    wakeup: Arc<dyn Wakeup>,
    timer_id: OnceLock<u32>,
}

impl FrameSync {
    pub fn new(
        config: SchedulerConfig,
        time: Arc<dyn TimeService>,
        timer: Arc<dyn TimerService>,
        wakeup: Arc<dyn Wakeup>,
    ) -> Arc<Self> {
        let state = SharedSyncState::new(SyncState::new(&config));
        Arc::new(Self {
            config,
            state,
            time,
            timer,
            wakeup,
            timer_id: OnceLock::new(),
        })
    }

    pub fn state(&self) -> &SharedSyncState {
        &self.state
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ── Setup ─────────────────────────────────────────────────────────────────

    /// Creates the minor-frame timer wired to [`minor_frame_callback`].
    ///
    /// [`minor_frame_callback`]: Self::minor_frame_callback
    pub fn create_timer(self: &Arc<Self>) -> Result<TimerHandle, ServiceError> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let callback: FrameCallback = Arc::new(move || {
            if let Some(sync) = weak.upgrade() {
                sync.minor_frame_callback();
            }
        });
        let handle = self.timer.create(MINOR_FRAME_TIMER_NAME, callback)?;
        // A second create keeps the first id; the engine owns one timer.
        let _ = self.timer_id.set(handle.id);
        Ok(handle)
    }

    /// Subscribes [`major_frame_callback`] to the tone.
    ///
    /// [`major_frame_callback`]: Self::major_frame_callback
    pub fn subscribe_tone(self: &Arc<Self>) -> Result<(), ServiceError> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let callback: FrameCallback = Arc::new(move || {
            if let Some(sync) = weak.upgrade() {
                sync.major_frame_callback();
            }
        });
        self.time.register_tone_callback(callback)
    }

    pub fn unsubscribe_tone(&self) {
        self.time.unregister_tone_callback();
    }

    /// Arms the minor-frame timer.  A no-op before [`create_timer`].
    ///
    /// [`create_timer`]: Self::create_timer
    pub fn arm_timer(&self, start_us: u32, interval_us: u32) -> Result<(), ServiceError> {
        match self.timer_id.get() {
            Some(&id) => self.timer.set(id, start_us, interval_us),
            None => Ok(()),
        }
    }

    fn apply(&self, arm: Option<TimerArm>) {
        if let Some(arm) = arm {
            if let Err(e) = self.arm_timer(arm.start_us, arm.interval_us) {
                warn!(
                    start_us = arm.start_us,
                    interval_us = arm.interval_us,
                    "minor frame timer re-arm failed: {e}"
                );
            }
        }
    }

    // ── Slot numbers ──────────────────────────────────────────────────────────

    /// Slot of the current MET second.
    pub fn met_slot_number(&self) -> u16 {
        met_slot(self.time.met_subseconds(), &self.config)
    }

    /// Slot the timeline is in right now.
    ///
    /// Synchronised to MET: the MET slot corrected by the MET slot at which
    /// the last tone arrived.  Otherwise the minor frames counted since the
    /// last tone.
    pub fn current_slot_number(&self) -> u16 {
        self.timeline_position().current_slot
    }

    /// Current slot together with the walk fields it is compared against.
    ///
    /// MET is sampled before the lock is taken; every other field comes
    /// from one guard.
    pub fn timeline_position(&self) -> TimelinePosition {
        let met_slot = self.met_slot_number();
        let s = self.state.lock();
        TimelinePosition {
            current_slot: self.slot_in_timeline(&s, met_slot),
            next_slot: s.next_slot_number,
            sync_to_met: s.sync_to_met,
            worst_case_slots_per_minor_frame: s.worst_case_slots_per_minor_frame,
        }
    }

    fn slot_in_timeline(&self, s: &SyncState, met_slot: u16) -> u16 {
        if !s.sync_to_met.is_synchronized() {
            return s.minor_frames_since_tone;
        }

        let last_sync = s.last_sync_met_slot;
        if met_slot < last_sync {
            met_slot + self.config.total_slots - last_sync
        } else {
            met_slot - last_sync
        }
    }

    // ── Callbacks ─────────────────────────────────────────────────────────────

    /// Minor-frame timer expiry.
    pub fn minor_frame_callback(&self) {
        let met_slot = self.met_slot_number();
        let (arm, give) = {
            let mut s = self.state.lock();
            self.advance_minor_frame(&mut s, met_slot)
        };
        self.apply(arm);
        if give {
            self.wakeup.give();
        }
    }

    fn advance_minor_frame(&self, s: &mut SyncState, met_slot: u16) -> (Option<TimerArm>, bool) {
        let normal = self.config.normal_slot_period();
        let total = self.config.total_slots;
        let mut arm = None;

        // First expiry without a preceding tone: fall back to MET
        if s.major_frame_source == MajorFrameSource::None {
            s.major_frame_source = MajorFrameSource::MinorFrameTimer;
            s.sync_to_met.insert(SyncToMet::PENDING_MAJOR_SYNCH);
            s.sync_attempts_left = self.config.max_sync_attempts();
            s.last_sync_met_slot = 0;
        }

        if s.sync_to_met.contains(SyncToMet::PENDING_MAJOR_SYNCH)
            && s.major_frame_source == MajorFrameSource::MinorFrameTimer
        {
            arm = Some(TimerArm {
                start_us: normal,
                interval_us: normal,
            });
            s.sync_attempts_left = s.sync_attempts_left.saturating_sub(1);

            if met_slot != 0 && s.sync_attempts_left > 0 {
                return (arm, false);
            }

            // Found (or gave up on) the MET major frame boundary
            s.sync_to_met.remove(SyncToMet::PENDING_MAJOR_SYNCH);
            s.sync_to_met.insert(SyncToMet::MAJOR_SYNCHRONIZED);
            s.minor_frames_since_tone = met_slot;
            s.last_sync_met_slot = 0;
        } else {
            s.minor_frames_since_tone = s.minor_frames_since_tone.saturating_add(1);
        }

        if s.minor_frames_since_tone >= total {
            // The long slot ran out without a tone
            arm = Some(TimerArm {
                start_us: self.config.short_slot_period(),
                interval_us: normal,
            });
            s.minor_frames_since_tone = 0;
            s.missed_major_frame_count = s.missed_major_frame_count.wrapping_add(1);
        }

        if s.minor_frames_since_tone == self.config.time_sync_slot() {
            arm = Some(TimerArm {
                start_us: self.config.sync_slot_period(),
                interval_us: 0,
            });
        }

        (arm, true)
    }

    /// Major-frame tone.
    pub fn major_frame_callback(&self) {
        let flywheel = self.time.clock_state() == ClockState::Flywheel;
        let met_slot = self.met_slot_number();
        let (arm, give) = {
            let mut s = self.state.lock();
            let outcome = self.accept_tone(&mut s, flywheel);
            s.last_sync_met_slot = met_slot;
            outcome
        };
        self.apply(arm);
        if give {
            self.wakeup.give();
        }
    }

    fn accept_tone(&self, s: &mut SyncState, flywheel: bool) -> (Option<TimerArm>, bool) {
        if !flywheel {
            if self.is_noisy(s) {
                s.unexpected_major_frame = true;
                s.unexpected_major_frame_count = s.unexpected_major_frame_count.wrapping_add(1);

                if !s.ignore_major_frame {
                    s.consecutive_noisy_frame_counter += 1;
                    if s.consecutive_noisy_frame_counter >= self.config.max_noisy_major_frames {
                        s.ignore_major_frame = true;
                    }
                }
            } else {
                s.unexpected_major_frame = false;
                s.consecutive_noisy_frame_counter = 0;
            }
        }

        if s.ignore_major_frame {
            return (None, false);
        }

        let normal = self.config.normal_slot_period();
        s.valid_major_frame_count = s.valid_major_frame_count.wrapping_add(1);
        s.minor_frames_since_tone = 0;
        s.major_frame_source = MajorFrameSource::ExternalTone;
        s.sync_to_met.retain(SyncToMet::MINOR_SYNCHRONIZED);

        (
            Some(TimerArm {
                start_us: normal,
                interval_us: normal,
            }),
            true,
        )
    }

    /// A tone is unexpected when it arrives away from the end of the table.
    fn is_noisy(&self, s: &SyncState) -> bool {
        let total = i32::from(self.config.total_slots);
        let worst = i32::from(s.worst_case_slots_per_minor_frame);

        let counting_frames = !s.sync_to_met.is_synchronized()
            && s.minor_frames_since_tone != self.config.time_sync_slot();
        let met_aligned = s.sync_to_met == SyncToMet::MINOR_SYNCHRONIZED
            && s.next_slot_number != 0
            && i32::from(s.next_slot_number) < total - worst - 1;

        counting_frames || met_aligned
    }
}

impl std::fmt::Debug for FrameSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSync")
            .field("state", &self.state)
            .field("timer_id", &self.timer_id.get())
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{micros_to_subseconds, FakeClock, FakeTimer, FakeWakeup};

    struct Rig {
        sync: Arc<FrameSync>,
        clock: Arc<FakeClock>,
        timer: Arc<FakeTimer>,
        wakeup: Arc<FakeWakeup>,
    }

    fn rig() -> Rig {
        let clock = Arc::new(FakeClock::default());
        let timer = Arc::new(FakeTimer::default());
        let wakeup = Arc::new(FakeWakeup::default());
        let sync = FrameSync::new(
            SchedulerConfig::default(),
            clock.clone(),
            timer.clone(),
            wakeup.clone(),
        );
        sync.create_timer().unwrap();
        Rig {
            sync,
            clock,
            timer,
            wakeup,
        }
    }

    #[test]
    fn met_slot_rounds_up_within_one_microsecond() {
        let cfg = SchedulerConfig::default();
        assert_eq!(met_slot(micros_to_subseconds(0), &cfg), 0);
        assert_eq!(met_slot(micros_to_subseconds(10_000), &cfg), 1);
        assert_eq!(met_slot(micros_to_subseconds(19_998), &cfg), 1);
        assert_eq!(met_slot(micros_to_subseconds(19_999), &cfg), 2);
        assert_eq!(met_slot(micros_to_subseconds(995_000), &cfg), 99);
        // one microsecond short of the next second wraps to slot 0
        assert_eq!(met_slot(micros_to_subseconds(999_999), &cfg), 0);
    }

    #[test]
    fn subseconds_convert_to_micros() {
        assert_eq!(subseconds_to_micros(0), 0);
        assert_eq!(subseconds_to_micros(0x8000_0000), 500_000);
        assert_eq!(subseconds_to_micros(u32::MAX), 999_999);
        assert_eq!(subseconds_to_micros(micros_to_subseconds(123_456)), 123_456);
    }

    #[test]
    fn current_slot_counts_frames_when_not_synchronized() {
        let r = rig();
        r.sync.state().lock().minor_frames_since_tone = 42;
        assert_eq!(r.sync.current_slot_number(), 42);
    }

    #[test]
    fn current_slot_wraps_relative_to_last_sync_slot() {
        let r = rig();
        {
            let mut s = r.sync.state().lock();
            s.sync_to_met = SyncToMet::MINOR_SYNCHRONIZED;
            s.last_sync_met_slot = 90;
        }
        r.clock.set_micros(50_000); // MET slot 5
        assert_eq!(r.sync.current_slot_number(), 15);

        r.clock.set_micros(950_000); // MET slot 95
        assert_eq!(r.sync.current_slot_number(), 5);
    }

    #[test]
    fn expected_tone_resets_timeline_and_gives_wakeup() {
        let r = rig();
        // fresh state waits in the sync slot, so the first tone is expected
        r.sync.major_frame_callback();

        let s = r.sync.state().snapshot();
        assert_eq!(s.minor_frames_since_tone, 0);
        assert_eq!(s.valid_major_frame_count, 1);
        assert_eq!(s.major_frame_source, MajorFrameSource::ExternalTone);
        assert!(!s.unexpected_major_frame);
        assert_eq!(r.timer.last_set(), Some((10_000, 10_000)));
        assert_eq!(r.wakeup.count(), 1);
    }

    #[test]
    fn noisy_tones_disable_synchronization() {
        let r = rig();
        {
            let mut s = r.sync.state().lock();
            s.minor_frames_since_tone = 1;
            s.consecutive_noisy_frame_counter = 1;
        }
        r.clock.set_micros(370_000);
        r.sync.major_frame_callback();

        let s = r.sync.state().snapshot();
        assert_eq!(s.consecutive_noisy_frame_counter, 2);
        assert!(s.ignore_major_frame);
        assert!(s.unexpected_major_frame);
        assert_eq!(s.unexpected_major_frame_count, 1);
        assert_eq!(s.last_sync_met_slot, 37);
        assert_eq!(s.valid_major_frame_count, 0);
        assert_eq!(r.wakeup.count(), 0);

        // further noise is counted but no longer escalates
        r.sync.major_frame_callback();
        let s = r.sync.state().snapshot();
        assert_eq!(s.consecutive_noisy_frame_counter, 2);
        assert_eq!(s.unexpected_major_frame_count, 2);
    }

    #[test]
    fn flywheel_tone_skips_noise_checks() {
        let r = rig();
        r.sync.state().lock().minor_frames_since_tone = 10;
        r.clock.set_state(ClockState::Flywheel);
        r.sync.major_frame_callback();

        let s = r.sync.state().snapshot();
        assert_eq!(s.unexpected_major_frame_count, 0);
        assert_eq!(s.valid_major_frame_count, 1);
        assert_eq!(s.minor_frames_since_tone, 0);
    }

    #[test]
    fn minor_synchronized_tone_is_noisy_mid_table() {
        let r = rig();
        {
            let mut s = r.sync.state().lock();
            s.sync_to_met = SyncToMet::MINOR_SYNCHRONIZED;
            s.next_slot_number = 40;
        }
        r.sync.major_frame_callback();
        let s = r.sync.state().snapshot();
        assert!(s.unexpected_major_frame);
        // minor-frame MET sync is kept across the tone
        assert_eq!(s.sync_to_met, SyncToMet::MINOR_SYNCHRONIZED);

        {
            let mut s = r.sync.state().lock();
            s.next_slot_number = 98;
        }
        r.sync.major_frame_callback();
        assert!(!r.sync.state().snapshot().unexpected_major_frame);
    }

    #[test]
    fn minor_frame_advances_and_arms_long_slot() {
        let r = rig();
        {
            let mut s = r.sync.state().lock();
            s.major_frame_source = MajorFrameSource::ExternalTone;
            s.minor_frames_since_tone = 97;
        }
        r.sync.minor_frame_callback();
        assert_eq!(r.sync.state().snapshot().minor_frames_since_tone, 98);
        assert_eq!(r.timer.last_set(), None);

        r.sync.minor_frame_callback();
        assert_eq!(r.sync.state().snapshot().minor_frames_since_tone, 99);
        assert_eq!(r.timer.last_set(), Some((15_000, 0)));
        assert_eq!(r.wakeup.count(), 2);
    }

    #[test]
    fn missed_tone_wraps_with_short_slot() {
        let r = rig();
        {
            let mut s = r.sync.state().lock();
            s.major_frame_source = MajorFrameSource::ExternalTone;
            s.minor_frames_since_tone = 99;
        }
        r.sync.minor_frame_callback();

        let s = r.sync.state().snapshot();
        assert_eq!(s.minor_frames_since_tone, 0);
        assert_eq!(s.missed_major_frame_count, 1);
        assert_eq!(r.timer.last_set(), Some((5_000, 10_000)));
    }

    #[test]
    fn first_timer_expiry_without_tone_searches_met_zero() {
        let r = rig();
        r.clock.set_micros(420_000);
        r.sync.minor_frame_callback();

        let s = r.sync.state().snapshot();
        assert_eq!(s.major_frame_source, MajorFrameSource::MinorFrameTimer);
        assert!(s.sync_to_met.contains(SyncToMet::PENDING_MAJOR_SYNCH));
        assert_eq!(s.sync_attempts_left, 299);
        assert_eq!(r.wakeup.count(), 0);
        assert_eq!(r.timer.last_set(), Some((10_000, 10_000)));

        // MET reaches the top of the second
        r.clock.set_micros(0);
        r.sync.minor_frame_callback();
        let s = r.sync.state().snapshot();
        assert_eq!(s.sync_to_met, SyncToMet::MAJOR_SYNCHRONIZED);
        assert_eq!(s.minor_frames_since_tone, 0);
        assert_eq!(s.last_sync_met_slot, 0);
        assert_eq!(r.wakeup.count(), 1);
    }

    #[test]
    fn met_search_gives_up_after_max_attempts() {
        let r = rig();
        r.clock.set_micros(420_000);
        for _ in 0..299 {
            r.sync.minor_frame_callback();
        }
        assert_eq!(r.wakeup.count(), 0);

        r.sync.minor_frame_callback();
        let s = r.sync.state().snapshot();
        assert_eq!(s.sync_to_met, SyncToMet::MAJOR_SYNCHRONIZED);
        assert_eq!(s.minor_frames_since_tone, 42);
        assert_eq!(r.wakeup.count(), 1);
    }

    #[test]
    fn callbacks_read_met_outside_the_state_lock() {
        let r = rig();
        r.clock.watch_lock(r.sync.state().clone());

        // MET search path of the timer callback, then a tone
        r.clock.set_micros(420_000);
        r.sync.minor_frame_callback();
        r.clock.set_micros(0);
        r.sync.minor_frame_callback();
        r.sync.major_frame_callback();

        r.sync.state().lock().sync_to_met = SyncToMet::MINOR_SYNCHRONIZED;
        r.sync.timeline_position();

        assert_eq!(r.clock.reads_under_lock(), 0);
        assert_eq!(r.sync.state().snapshot().last_sync_met_slot, 0);
    }

    #[test]
    fn timeline_position_reads_walk_fields_together() {
        let r = rig();
        {
            let mut s = r.sync.state().lock();
            s.sync_to_met = SyncToMet::MINOR_SYNCHRONIZED;
            s.last_sync_met_slot = 3;
            s.next_slot_number = 20;
            s.worst_case_slots_per_minor_frame = 2;
            s.minor_frames_since_tone = 77;
        }
        r.clock.set_micros(250_000); // MET slot 25

        assert_eq!(
            r.sync.timeline_position(),
            TimelinePosition {
                current_slot: 22,
                next_slot: 20,
                sync_to_met: SyncToMet::MINOR_SYNCHRONIZED,
                worst_case_slots_per_minor_frame: 2,
            }
        );

        // counting frames: MET is ignored
        r.sync.state().lock().sync_to_met = SyncToMet::NOT_SYNCHRONIZED;
        assert_eq!(r.sync.timeline_position().current_slot, 77);
    }

    #[test]
    fn two_early_tones_from_fresh_state_disable_synchronization() {
        let r = rig();
        r.sync.state().lock().minor_frames_since_tone = 1;

        r.sync.major_frame_callback();
        let s = r.sync.state().snapshot();
        assert_eq!(s.consecutive_noisy_frame_counter, 1);
        assert!(!s.ignore_major_frame);
        // the first early tone is still taken as the frame boundary
        assert_eq!(s.valid_major_frame_count, 1);
        assert_eq!(s.minor_frames_since_tone, 0);

        r.sync.state().lock().minor_frames_since_tone = 1;
        r.sync.major_frame_callback();
        let s = r.sync.state().snapshot();
        assert_eq!(s.consecutive_noisy_frame_counter, 2);
        assert!(s.ignore_major_frame);
        assert_eq!(s.valid_major_frame_count, 1);
        assert_eq!(s.minor_frames_since_tone, 1);
        assert_eq!(r.wakeup.count(), 1);
    }

    #[test]
    fn callbacks_stop_once_engine_is_dropped() {
        let r = rig();
        let callback = r.timer.callback().unwrap();
        drop(r.sync);
        callback();
        assert_eq!(r.wakeup.count(), 0);
    }
}
