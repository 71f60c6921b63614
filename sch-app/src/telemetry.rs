/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Housekeeping and diagnostic telemetry snapshots.

use serde::Serialize;

use crate::state::{Counters, Cursor, SyncState};
use crate::table::{EnableState, MessageEntry, ScheduleEntry};

/// Entry states packed per diagnostic word.
pub const STATES_PER_WORD: usize = 8;

/// Telemetry published on the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "packet", rename_all = "snake_case")]
pub enum TelemetryPacket {
    Housekeeping(HousekeepingTlm),
    Diagnostic(DiagnosticTlm),
}

/// Periodic health snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HousekeepingTlm {
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
    pub table_pass_count: u32,
    pub valid_major_frame_count: u32,
    pub missed_major_frame_count: u32,
    pub unexpected_major_frame_count: u32,
    pub minor_frames_since_tone: u16,
    pub next_slot_number: u16,
    pub last_sync_met_slot: u16,
    pub ignore_major_frame: bool,
    pub unexpected_major_frame: bool,
    pub sync_to_met: u8,
    pub major_frame_source: u8,
}

impl HousekeepingTlm {
    pub fn capture(counters: &Counters, cursor: &Cursor, sync: &SyncState) -> Self {
        Self {
            command_counter: counters.command_counter,
            error_counter: counters.error_counter,
            activity_success_count: counters.activity_success_count,
            activity_failure_count: counters.activity_failure_count,
            slots_processed_count: counters.slots_processed_count,
            skipped_slots_count: counters.skipped_slots_count,
            multiple_slots_count: counters.multiple_slots_count,
            same_slot_count: counters.same_slot_count,
            bad_table_data_count: counters.bad_table_data_count,
            table_verify_success_count: counters.table_verify_success_count,
            table_verify_failure_count: counters.table_verify_failure_count,
            table_pass_count: cursor.table_pass_count,
            valid_major_frame_count: sync.valid_major_frame_count,
            missed_major_frame_count: sync.missed_major_frame_count,
            unexpected_major_frame_count: sync.unexpected_major_frame_count,
            minor_frames_since_tone: sync.minor_frames_since_tone,
            next_slot_number: sync.next_slot_number,
            last_sync_met_slot: sync.last_sync_met_slot,
            ignore_major_frame: sync.ignore_major_frame,
            unexpected_major_frame: sync.unexpected_major_frame,
            sync_to_met: sync.sync_to_met.bits(),
            major_frame_source: sync.major_frame_source.to_raw(),
        }
    }
}

/// Snapshot of every schedule entry's state and target message id.
///
/// States are packed two bits per entry, eight entries per word, lowest
/// entry index in the most significant bits: `01` enabled, `10` disabled,
/// `00` anything else.  Message ids are zero for entries that are neither
/// enabled nor disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticTlm {
    pub entry_states: Vec<u16>,
    pub message_ids: Vec<u16>,
}

impl DiagnosticTlm {
    pub fn capture(schedule: &[ScheduleEntry], messages: &[MessageEntry]) -> Self {
        let mut entry_states = vec![0u16; schedule.len().div_ceil(STATES_PER_WORD)];
        let mut message_ids = vec![0u16; schedule.len()];

        for (index, entry) in schedule.iter().enumerate() {
            let bits: u16 = match entry.state() {
                Some(EnableState::Enabled) => 1,
                Some(EnableState::Disabled) => 2,
                _ => continue,
            };
            let shift = (STATES_PER_WORD - 1 - index % STATES_PER_WORD) * 2;
            entry_states[index / STATES_PER_WORD] |= bits << shift;
            message_ids[index] = messages
                .get(usize::from(entry.message_index))
                .map(MessageEntry::message_id)
                .unwrap_or(0);
        }

        Self {
            entry_states,
            message_ids,
        }
    }

    /// Raw 2-bit state of entry `index`.
    pub fn entry_state(&self, index: usize) -> u16 {
        let shift = (STATES_PER_WORD - 1 - index % STATES_PER_WORD) * 2;
        self.entry_states
            .get(index / STATES_PER_WORD)
            .map(|w| (w >> shift) & 0b11)
            .unwrap_or(0)
    }
}
