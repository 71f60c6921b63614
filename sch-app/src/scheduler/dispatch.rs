/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Activity dispatcher.
//!
//! Tables are validated when they are loaded, but an entry can still be
//! damaged afterwards, so every enabled entry is re-checked right before it
//! fires.  A damaged entry is disabled (once) and reported; it never sends.

use crate::events::{EventId, Severity};
use crate::services::TableKind;
use crate::table::{ActivityType, EnableState};

use super::Scheduler;

impl Scheduler {
    /// Fires entry `index` (slot `slot`, position `entry`) if its phase
    /// matches the current table pass.
    pub(crate) fn process_next_entry(&mut self, slot: u16, entry: u16, index: usize) {
        let e = self.schedule[index];

        let corrupt = usize::from(e.message_index) >= self.messages.len()
            || e.frequency == 0
            || e.activity() != Some(ActivityType::SendMessage)
            || e.remainder >= e.frequency;

        if corrupt {
            self.counters.bad_table_data_count = self.counters.bad_table_data_count.wrapping_add(1);
            self.events.send(
                EventId::Corruption,
                Severity::Error,
                format!("Corrupt data error (1): slot = {slot}, entry = {entry}"),
            );
            self.events.send(
                EventId::Corruption,
                Severity::Error,
                format!(
                    "Corrupt data error (2): msg = {}, freq = {}, type = {}, rem = {}",
                    e.message_index, e.frequency, e.activity_type, e.remainder
                ),
            );

            self.schedule[index].set_state(EnableState::Disabled);
            self.mark_modified(TableKind::Schedule);
            return;
        }

        if self.cursor.table_pass_count % u32::from(e.frequency) != u32::from(e.remainder) {
            return;
        }

        let message = self.messages[usize::from(e.message_index)].as_message();
        match self.bus.send(message) {
            Ok(()) => {
                self.counters.activity_success_count =
                    self.counters.activity_success_count.wrapping_add(1);
            }
            Err(err) => {
                self.counters.activity_failure_count =
                    self.counters.activity_failure_count.wrapping_add(1);
                self.events.send(
                    EventId::PacketSend,
                    Severity::Error,
                    format!(
                        "Activity error: slot = {slot}, entry = {entry}, err = 0x{:08X}",
                        err.status()
                    ),
                );
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
