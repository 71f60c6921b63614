/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Load-time table validation.
//!
//! Runs once per table (re)load, before a candidate table can become active.
//! Every entry is classified as exactly one of good / bad / unused, so the
//! summary always adds up to the table length.  The first error found is
//! returned; every bad entry gets its own error event with the raw fields.

use crate::config::SchedulerConfig;
use crate::events::{EventId, EventReporter, Severity};
use crate::scheduler::error::{MessageTableError, ScheduleTableError};
use crate::state::Counters;

use super::{ActivityType, EnableState, MessageEntry, ScheduleEntry, UNUSED};

/// Aggregate classification of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifySummary {
    pub good: usize,
    pub bad: usize,
    pub unused: usize,
}

impl VerifySummary {
    pub fn total(&self) -> usize {
        self.good + self.bad + self.unused
    }
}

/// Outcome of verifying a whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification<E> {
    pub summary: VerifySummary,
    pub first_error: Option<E>,
}

impl<E> Verification<E> {
    pub fn into_result(self) -> Result<VerifySummary, E> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(self.summary),
        }
    }
}

/// Message table acceptance limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimits {
    pub min_words: u16,
    pub max_words: u16,
    pub min_msg_id: u16,
    pub max_msg_id: u16,
    pub unused_msg_id: u16,
}

impl From<&SchedulerConfig> for MessageLimits {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            min_words: config.min_msg_words,
            max_words: config.max_msg_words,
            min_msg_id: config.min_msg_id,
            max_msg_id: config.max_msg_id,
            unused_msg_id: config.unused_message_id,
        }
    }
}

/// Classification of an entry that passed its checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accepted {
    Good,
    Unused,
}

// ── Schedule table ────────────────────────────────────────────────────────────

fn check_schedule_entry(
    index: usize,
    entry: &ScheduleEntry,
    max_messages: u16,
) -> Result<Accepted, ScheduleTableError> {
    match entry.state() {
        Some(EnableState::Unused) => {
            if entry.is_blank() {
                Ok(Accepted::Unused)
            } else {
                Err(ScheduleTableError::Garbage { index })
            }
        }
        Some(EnableState::Enabled | EnableState::Disabled) => {
            if u32::from(entry.frequency) == UNUSED {
                Err(ScheduleTableError::NoFrequency { index })
            } else if entry.remainder >= entry.frequency {
                Err(ScheduleTableError::BadRemainder { index })
            } else if entry.activity() != Some(ActivityType::SendMessage) {
                Err(ScheduleTableError::BadActivity { index })
            } else if entry.message_index == 0 || entry.message_index >= max_messages {
                Err(ScheduleTableError::BadMsgIndex { index })
            } else {
                Ok(Accepted::Good)
            }
        }
        None => Err(ScheduleTableError::BadEnableState { index }),
    }
}

/// Classifies every schedule entry, reports the result and maintains the
/// verify counters.
pub fn verify_schedule_table(
    entries: &[ScheduleEntry],
    max_messages: u16,
    events: &EventReporter,
    counters: &mut Counters,
) -> Verification<ScheduleTableError> {
    let mut summary = VerifySummary::default();
    let mut first_error = None;

    for (index, entry) in entries.iter().enumerate() {
        match check_schedule_entry(index, entry, max_messages) {
            Ok(Accepted::Good) => summary.good += 1,
            Ok(Accepted::Unused) => summary.unused += 1,
            Err(e) => {
                summary.bad += 1;
                first_error.get_or_insert(e);
                events.send(
                    EventId::ScheduleTableErr,
                    Severity::Error,
                    format!(
                        "Schedule tbl verify error - idx[{}] ena[{}] typ[{}] fre[{}] rem[{}] msg[{}] grp[0x{:08X}]",
                        index,
                        entry.enable_state,
                        entry.activity_type,
                        entry.frequency,
                        entry.remainder,
                        entry.message_index,
                        entry.group_data
                    ),
                );
            }
        }
    }

    events.send(
        EventId::ScheduleTableSummary,
        Severity::Debug,
        format!(
            "Schedule table verify results -- good[{}] bad[{}] unused[{}]",
            summary.good, summary.bad, summary.unused
        ),
    );
    bump_verify_counter(counters, first_error.is_none());

    Verification {
        summary,
        first_error,
    }
}

/// [`verify_schedule_table`] reduced to its first error.
pub fn validate_schedule_table(
    entries: &[ScheduleEntry],
    max_messages: u16,
    events: &EventReporter,
    counters: &mut Counters,
) -> Result<VerifySummary, ScheduleTableError> {
    verify_schedule_table(entries, max_messages, events, counters).into_result()
}

// ── Message table ─────────────────────────────────────────────────────────────

fn check_message_entry(
    index: usize,
    entry: &MessageEntry,
    limits: &MessageLimits,
) -> Result<Accepted, MessageTableError> {
    let message_id = entry.message_id();

    if message_id == limits.unused_msg_id {
        return if entry.user_data().iter().all(|&w| u32::from(w) == UNUSED) {
            Ok(Accepted::Unused)
        } else {
            Err(MessageTableError::Garbage { index })
        };
    }

    if (limits.min_msg_id..=limits.max_msg_id).contains(&message_id) {
        let length = entry.total_length();
        let min = u32::from(limits.min_words) * 2;
        let max = u32::from(limits.max_words) * 2;
        if u32::from(length) > max || u32::from(length) < min || length & 1 != 0 {
            return Err(MessageTableError::InvalidLength { index, length });
        }
        return Ok(Accepted::Good);
    }

    Err(MessageTableError::BadMsgId { index, message_id })
}

/// Classifies every message entry, reports the result and maintains the
/// verify counters.
pub fn verify_message_table(
    entries: &[MessageEntry],
    limits: &MessageLimits,
    events: &EventReporter,
    counters: &mut Counters,
) -> Verification<MessageTableError> {
    let mut summary = VerifySummary::default();
    let mut first_error = None;

    for (index, entry) in entries.iter().enumerate() {
        match check_message_entry(index, entry, limits) {
            Ok(Accepted::Good) => summary.good += 1,
            Ok(Accepted::Unused) => summary.unused += 1,
            Err(e) => {
                summary.bad += 1;
                first_error.get_or_insert(e);
                // buf[] is the offending buffer offset; checks are header-level
                events.send(
                    EventId::MessageTableErr,
                    Severity::Error,
                    format!(
                        "Message tbl verify err - idx[{}] mid[0x{:X}] len[{}] buf[{}]",
                        index,
                        entry.message_id(),
                        entry.total_length(),
                        0
                    ),
                );
            }
        }
    }

    events.send(
        EventId::MessageTableSummary,
        Severity::Debug,
        format!(
            "Message tbl verify results - good[{}] bad[{}] unused[{}]",
            summary.good, summary.bad, summary.unused
        ),
    );
    bump_verify_counter(counters, first_error.is_none());

    Verification {
        summary,
        first_error,
    }
}

/// [`verify_message_table`] reduced to its first error.
pub fn validate_message_table(
    entries: &[MessageEntry],
    limits: &MessageLimits,
    events: &EventReporter,
    counters: &mut Counters,
) -> Result<VerifySummary, MessageTableError> {
    verify_message_table(entries, limits, events, counters).into_result()
}

fn bump_verify_counter(counters: &mut Counters, passed: bool) {
    if passed {
        counters.table_verify_success_count = counters.table_verify_success_count.wrapping_add(1);
    } else {
        counters.table_verify_failure_count = counters.table_verify_failure_count.wrapping_add(1);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
