/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler configuration loading.
//!
//! Every tuning constant of the slot scheduler lives in one
//! [`SchedulerConfig`].  Missing keys fall back to the platform defaults, so
//! an empty file (or no file at all) yields the stock 100-slot, 1 Hz
//! configuration.
//!
//! The expected YAML structure is:
//! ```yaml
//! total_slots: 100
//! entries_per_slot: 5
//! max_messages: 128
//! max_lag_count: 50
//! max_slots_per_wakeup: 5
//! micros_per_major_frame: 1000000
//! sync_slot_drift_window: 5000
//! max_noisy_major_frames: 2
//! start_processing_enabled: true
//! ```

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

// ── SchedulerConfig ───────────────────────────────────────────────────────────

/// Platform configuration of the slot scheduler.
///
/// Derived timing values (slot periods, the time-sync slot, sync attempts) are
/// computed on demand from these fields so they can never disagree with them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Minor frames per major frame (the scheduler wake-up rate in Hz when the
    /// major frame is one second).
    pub total_slots: u16,

    /// Schedule table entries available in every slot.
    pub entries_per_slot: u16,

    /// Capacity of the message definition table.
    pub max_messages: u16,

    /// Largest message accepted in the message table, in 16-bit words.
    pub max_msg_words: u16,

    /// Smallest message accepted in the message table (command header size),
    /// in 16-bit words.
    pub min_msg_words: u16,

    /// Lowest message id accepted in the message table.
    pub min_msg_id: u16,

    /// Highest message id accepted in the message table.
    pub max_msg_id: u16,

    /// Message id marking an unused message table entry.
    pub unused_message_id: u16,

    /// When more slots than this are late, the backlog is skipped instead of
    /// executed.
    pub max_lag_count: u16,

    /// Upper bound on the slots executed in a single wakeup while catching up.
    pub max_slots_per_wakeup: u16,

    /// Length of the major frame in microseconds.
    pub micros_per_major_frame: u32,

    /// Extra time given to the last slot of the table while waiting for the
    /// tone, in microseconds.
    pub sync_slot_drift_window: u32,

    /// Delay before the first minor-frame timer expiry, giving the tone a
    /// chance to arrive first, in microseconds.
    pub startup_period: u32,

    /// Consecutive unexpected tones after which tone synchronisation is
    /// disabled.
    pub max_noisy_major_frames: u32,

    /// Whether the table walk runs from the first wakeup.  When false the
    /// timeline still runs but nothing is processed until
    /// [`Scheduler::enable_processing`](crate::scheduler::Scheduler::enable_processing).
    pub start_processing_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            total_slots: 100,
            entries_per_slot: 5,
            max_messages: 128,
            max_msg_words: 64,
            min_msg_words: 4,
            min_msg_id: 0,
            max_msg_id: 0x1FFF,
            unused_message_id: 0,
            max_lag_count: 50,
            max_slots_per_wakeup: 5,
            micros_per_major_frame: 1_000_000,
            sync_slot_drift_window: 5_000,
            startup_period: 5_000_000,
            max_noisy_major_frames: 2,
            start_processing_enabled: true,
        }
    }
}

impl SchedulerConfig {
    /// Parses `path` into a configuration and checks it for consistency.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// describes an impossible timeline (see [`check`](Self::check)).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading scheduler configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let config: SchedulerConfig = if content.trim().is_empty() {
            SchedulerConfig::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?
        };

        config
            .check()
            .with_context(|| format!("Invalid scheduler configuration: {}", path.display()))?;

        debug!(?config, "scheduler configuration loaded");
        Ok(config)
    }

    /// Rejects configurations the slot arithmetic cannot work with.
    pub fn check(&self) -> Result<()> {
        ensure!(self.total_slots >= 2, "total_slots must be at least 2");
        ensure!(self.entries_per_slot >= 1, "entries_per_slot must be at least 1");
        ensure!(self.max_messages >= 2, "max_messages must be at least 2");
        ensure!(
            self.min_msg_words >= 3 && self.min_msg_words <= self.max_msg_words,
            "min_msg_words ({}) must be in [3, max_msg_words ({})]",
            self.min_msg_words,
            self.max_msg_words
        );
        ensure!(
            self.min_msg_id <= self.max_msg_id,
            "min_msg_id (0x{:X}) exceeds max_msg_id (0x{:X})",
            self.min_msg_id,
            self.max_msg_id
        );
        ensure!(
            self.max_lag_count >= 1 && self.max_lag_count < self.total_slots,
            "max_lag_count ({}) must be in [1, total_slots)",
            self.max_lag_count
        );
        ensure!(
            self.max_slots_per_wakeup >= 1,
            "max_slots_per_wakeup must be at least 1"
        );
        ensure!(
            self.normal_slot_period() > self.sync_slot_drift_window,
            "slot period ({}us) must exceed the drift window ({}us)",
            self.normal_slot_period(),
            self.sync_slot_drift_window
        );
        Ok(())
    }

    // ── Derived timing ────────────────────────────────────────────────────────

    /// Nominal minor frame length in microseconds.
    pub fn normal_slot_period(&self) -> u32 {
        self.micros_per_major_frame / u32::from(self.total_slots)
    }

    /// Length of the "long" last slot armed while waiting for the tone.
    pub fn sync_slot_period(&self) -> u32 {
        self.normal_slot_period() + self.sync_slot_drift_window
    }

    /// Length of the "short" first slot that compensates a missed tone.
    pub fn short_slot_period(&self) -> u32 {
        self.normal_slot_period() - self.sync_slot_drift_window
    }

    /// The slot in which the tone is expected (always the last one).
    pub fn time_sync_slot(&self) -> u16 {
        self.total_slots - 1
    }

    /// Worst minor-frame timer accuracy that still cannot lose a slot over a
    /// whole major frame, in microseconds.
    pub fn worst_clock_accuracy(&self) -> u32 {
        self.normal_slot_period() / u32::from(self.total_slots - 1)
    }

    /// Minor frames sampled while looking for the MET zero point before
    /// giving up (three major frames).
    pub fn max_sync_attempts(&self) -> u16 {
        self.total_slots.saturating_mul(3)
    }

    /// Total number of schedule table entries.
    pub fn table_entries(&self) -> usize {
        usize::from(self.total_slots) * usize::from(self.entries_per_slot)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
