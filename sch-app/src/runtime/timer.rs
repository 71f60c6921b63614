/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Minor-frame timers on the tokio clock.
//!
//! Each armed timer is one spawned task; re-arming aborts the task and spawns
//! a replacement, so the latest setting always wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::services::{FrameCallback, ServiceError, TimerHandle, TimerService};

/// Status returned for a timer id that was never created.
pub const UNKNOWN_TIMER: ServiceError = ServiceError::Code(-4);

struct TimerSlot {
    name: String,
    callback: FrameCallback,
    task: Option<JoinHandle<()>>,
}

/// [`TimerService`] backed by tokio tasks.
pub struct HostTimer {
    handle: Handle,
    accuracy_us: u32,
    next_id: AtomicU32,
    timers: Mutex<HashMap<u32, TimerSlot>>,
}

impl HostTimer {
    /// Timers spawn their tasks on `handle` and report `accuracy_us` as
    /// their guaranteed accuracy.
    pub fn new(handle: Handle, accuracy_us: u32) -> Self {
        Self {
            handle,
            accuracy_us,
            next_id: AtomicU32::new(1),
            timers: Mutex::new(HashMap::new()),
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<u32, TimerSlot>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimerService for HostTimer {
    fn create(&self, name: &str, callback: FrameCallback) -> Result<TimerHandle, ServiceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.timers().insert(
            id,
            TimerSlot {
                name: name.to_owned(),
                callback,
                task: None,
            },
        );
        debug!(id, name, accuracy_us = self.accuracy_us, "timer created");
        Ok(TimerHandle {
            id,
            accuracy_us: self.accuracy_us,
        })
    }

    fn set(&self, id: u32, start_us: u32, interval_us: u32) -> Result<(), ServiceError> {
        let mut timers = self.timers();
        let slot = timers.get_mut(&id).ok_or(UNKNOWN_TIMER)?;

        if let Some(task) = slot.task.take() {
            task.abort();
        }
        if start_us == 0 && interval_us == 0 {
            trace!(id, name = %slot.name, "timer disarmed");
            return Ok(());
        }

        let callback = slot.callback.clone();
        let start = Instant::now() + Duration::from_micros(u64::from(start_us));
        slot.task = Some(self.handle.spawn(async move {
            time::sleep_until(start).await;
            callback();
            if interval_us == 0 {
                return;
            }
            let period = Duration::from_micros(u64::from(interval_us));
            let mut ticks = time::interval_at(start + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                callback();
            }
        }));

        trace!(id, name = %slot.name, start_us, interval_us, "timer armed");
        Ok(())
    }
}

impl Drop for HostTimer {
    fn drop(&mut self) {
        for slot in self.timers().values_mut() {
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
