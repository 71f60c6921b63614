/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Schedule table walk.
//!
//! Each wakeup compares the slot the timeline is in with the next slot the
//! table walk expects and decides how many slots to run:
//!
//! | Lag | Action |
//! |---|---|
//! | whole table (current slot did not move) | nothing, `same_slot_count` |
//! | `> max_lag_count` | skip ahead to the current slot |
//! | otherwise | run up to `max_slots_per_wakeup` slots |
//!
//! A lag of two right after a lag of one, or a full-table lag right after
//! any other lag, is treated as timer jitter and only one slot is run.

use crate::events::{EventId, Severity};
use crate::frame_sync::TimelinePosition;
use crate::state::SyncToMet;
use crate::table::EnableState;

use super::{ProcessError, Scheduler};

impl Scheduler {
    /// Runs the slots that became due since the previous wakeup.
    pub(crate) fn process_schedule_table(&mut self) -> Result<(), ProcessError> {
        let total = self.config.total_slots;
        let TimelinePosition {
            current_slot: current,
            next_slot: next,
            sync_to_met,
            worst_case_slots_per_minor_frame: worst_case,
        } = self.sync.timeline_position();

        let mut count = if current < next {
            total - next + current + 1
        } else {
            current - next + 1
        };

        // Jitter correction
        if count == 2 {
            if self.cursor.last_process_count == 1 {
                count = 1;
            }
            self.cursor.last_process_count = 2;
        } else if count == total {
            if self.cursor.last_process_count != total {
                count = 1;
            }
            self.cursor.last_process_count = total;
        } else {
            self.cursor.last_process_count = count;
        }

        if count == total {
            self.counters.same_slot_count = self.counters.same_slot_count.wrapping_add(1);
            self.events.send(
                EventId::SameSlot,
                Severity::Debug,
                format!("Slot did not increment: slot = {current}"),
            );
            count = 0;
        }

        let mut result = Ok(());
        let mut next = next;

        if count > self.config.max_lag_count {
            self.counters.skipped_slots_count = self.counters.skipped_slots_count.wrapping_add(1);
            self.events.send(
                EventId::SkippedSlots,
                Severity::Error,
                format!("Slots skipped: slot = {next}, count = {}", count - 1),
            );

            if current < next {
                self.cursor.table_pass_count = self.cursor.table_pass_count.wrapping_add(1);
            }

            // Skipping past the end of the table skips its command slot too
            if u32::from(next) + u32::from(count) > u32::from(self.config.time_sync_slot()) {
                result = self.process_commands();
            }

            next = current;
            self.sync.state().lock().next_slot_number = next;
            count = 1;
        }

        count = count.min(self.config.max_slots_per_wakeup);

        if count > 1 {
            self.counters.multiple_slots_count =
                self.counters.multiple_slots_count.wrapping_add(1);
            if count > worst_case || sync_to_met == SyncToMet::NOT_SYNCHRONIZED {
                self.events.send(
                    EventId::MultiSlots,
                    Severity::Info,
                    format!("Multiple slots processed: slot = {next}, count = {count}"),
                );
            }
        }

        while count != 0 && result.is_ok() {
            result = self.process_next_slot();
            count -= 1;
        }

        result
    }

    /// Runs every enabled entry of the next slot and advances the cursor.
    ///
    /// Commands are only executed in the time-sync slot, the last one of the
    /// table, so that group commands never change entries mid-table.
    pub(crate) fn process_next_slot(&mut self) -> Result<(), ProcessError> {
        let slot = self.sync.state().lock().next_slot_number;
        let per_slot = self.config.entries_per_slot;
        let base = usize::from(slot) * usize::from(per_slot);

        for entry in 0..per_slot {
            let index = base + usize::from(entry);
            if self.schedule[index].state() == Some(EnableState::Enabled) {
                self.process_next_entry(slot, entry, index);
            }
        }

        let result = if slot == self.config.time_sync_slot() {
            self.process_commands()
        } else {
            Ok(())
        };

        let mut next = slot + 1;
        if next == self.config.total_slots {
            next = 0;
            self.cursor.table_pass_count = self.cursor.table_pass_count.wrapping_add(1);
        }
        self.sync.state().lock().next_slot_number = next;
        self.counters.slots_processed_count = self.counters.slots_processed_count.wrapping_add(1);

        result
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
