/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the slot scheduler.
//!
//! Errors follow the failure layers of the scheduler:
//!
//! * [`InitError`] is fatal: the scheduler cannot start without its timer,
//!   its tone subscription and two valid tables.
//! * [`ScheduleTableError`] / [`MessageTableError`] classify a rejected table
//!   entry.  They are returned by the validator and keep the candidate table
//!   from becoming active; they are never fatal once the scheduler runs.
//! * [`CommandError`] reports a rejected command (bad argument or state).
//! * [`ProcessError`] terminates the main loop.
//!
//! Timing anomalies (skipped slots, noisy tones) and dispatch failures are
//! not errors at all: they are reported through events and counters.

use thiserror::Error;

use crate::services::ServiceError;

// ── Table validation ──────────────────────────────────────────────────────────

/// Why a schedule table entry was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleTableError {
    /// Unused entry with a non-zero field.
    #[error("entry {index}: unused entry carries data")]
    Garbage { index: usize },

    #[error("entry {index}: frequency is zero")]
    NoFrequency { index: usize },

    #[error("entry {index}: remainder is not below the frequency")]
    BadRemainder { index: usize },

    #[error("entry {index}: unrecognised activity type")]
    BadActivity { index: usize },

    #[error("entry {index}: message index out of range")]
    BadMsgIndex { index: usize },

    #[error("entry {index}: unrecognised enable state")]
    BadEnableState { index: usize },
}

/// Why a message table entry was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MessageTableError {
    /// Unused entry with non-zero user data.
    #[error("message {index}: unused entry carries data")]
    Garbage { index: usize },

    #[error("message {index}: length {length} is odd or outside the allowed range")]
    InvalidLength { index: usize, length: u16 },

    #[error("message {index}: message id 0x{message_id:X} outside the allowed range")]
    BadMsgId { index: usize, message_id: u16 },
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// A command rejected by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("slot {slot} / entry {entry} outside the schedule table")]
    InvalidEntry { slot: u16, entry: u16 },

    /// The entry is unused, corrupt, or already in the requested state.
    #[error("slot {slot} / entry {entry} has state {state} which cannot be changed")]
    InvalidState { slot: u16, entry: u16, state: u8 },

    #[error("no group selected")]
    NoGroupSelected,

    #[error("neither group {group_id} nor multi-group 0x{multi_group_mask:06X} found")]
    GroupNotFound { group_id: u8, multi_group_mask: u32 },
}

// ── Start-up & main loop ──────────────────────────────────────────────────────

/// Fatal start-up failure.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid scheduler configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("cannot create the minor frame timer: {0}")]
    TimerCreate(ServiceError),

    #[error("cannot arm the minor frame timer: {0}")]
    TimerSet(ServiceError),

    #[error("cannot subscribe to the major frame tone: {0}")]
    ToneSubscribe(ServiceError),

    #[error("cannot load the schedule table: {0}")]
    ScheduleLoad(ServiceError),

    #[error("cannot load the message table: {0}")]
    MessageLoad(ServiceError),

    #[error("schedule table rejected: {0}")]
    ScheduleTable(#[from] ScheduleTableError),

    #[error("message table rejected: {0}")]
    MessageTable(#[from] MessageTableError),

    #[error("schedule table has {actual} entries, expected {expected}")]
    ScheduleTableSize { expected: usize, actual: usize },

    #[error("message table has {actual} entries, expected {expected}")]
    MessageTableSize { expected: usize, actual: usize },
}

/// Failure that ends the main loop.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("command pipe read failed: {0}")]
    CommandPipe(ServiceError),
}

impl ProcessError {
    /// Status word reported in the exit event.
    pub fn status(&self) -> u32 {
        match self {
            ProcessError::CommandPipe(e) => e.status(),
        }
    }
}
