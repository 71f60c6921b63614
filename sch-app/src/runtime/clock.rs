/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Host mission-elapsed-time clock with a simulated major-frame tone.
//!
//! MET starts when the clock is created.  The sub-second part is the
//! position inside the current major frame, scaled to 2^-32 units, so a
//! shortened major frame still spans the full sub-second range.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use crate::services::{ClockState, FrameCallback, ServiceError, TimeService};

/// [`TimeService`] driven by the host monotonic clock.
pub struct HostClock {
    epoch: Instant,
    major_frame: Duration,
    tone: Mutex<Option<FrameCallback>>,
}

impl HostClock {
    pub fn new(major_frame: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            major_frame,
            tone: Mutex::new(None),
        }
    }

    fn tone(&self) -> MutexGuard<'_, Option<FrameCallback>> {
        self.tone.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers one tone to the registered callback, if any.
    pub fn fire_tone(&self) {
        let callback = self.tone().clone();
        if let Some(cb) = callback {
            trace!("tone");
            cb();
        }
    }

    /// Spawns the tone source: one tone at every major frame boundary of
    /// MET.
    pub fn spawn_tone(self: &Arc<Self>, handle: &Handle) -> JoinHandle<()> {
        let clock = Arc::clone(self);
        let period = self.major_frame;
        let first = time::Instant::from_std(self.epoch) + period;
        handle.spawn(async move {
            let mut ticks = time::interval_at(first, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                clock.fire_tone();
            }
        })
    }
}

impl TimeService for HostClock {
    fn met_subseconds(&self) -> u32 {
        let frame = self.major_frame.as_nanos().max(1);
        let into_frame = self.epoch.elapsed().as_nanos() % frame;
        ((into_frame << 32) / frame) as u32
    }

    fn clock_state(&self) -> ClockState {
        ClockState::Valid
    }

    fn register_tone_callback(&self, callback: FrameCallback) -> Result<(), ServiceError> {
        *self.tone() = Some(callback);
        debug!("tone callback registered");
        Ok(())
    }

    fn unregister_tone_callback(&self) {
        *self.tone() = None;
        debug!("tone callback removed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
