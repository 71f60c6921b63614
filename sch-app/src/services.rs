/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Collaborator interfaces.
//!
//! The scheduler core never talks to an operating system, a message bus or a
//! table manager directly.  Everything it needs from the outside world goes
//! through the traits below; `runtime/` provides the host implementations
//! and the unit tests provide recording fakes.
//!
//! Traits whose methods are called from the frame callbacks (`TimeService`,
//! `TimerService`, `Wakeup`) must be `Send + Sync` and must never block.

use std::sync::Arc;

use thiserror::Error;

use crate::scheduler::commands::Command;
use crate::table::{MessageEntry, ScheduleEntry};
use crate::telemetry::TelemetryPacket;

/// Opaque failure status reported by a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("service status 0x{0:08X}")]
    Code(i32),
}

impl ServiceError {
    /// The status as the unsigned word carried in event text.
    pub fn status(self) -> u32 {
        match self {
            ServiceError::Code(code) => code as u32,
        }
    }
}

// ── Message bus ───────────────────────────────────────────────────────────────

/// Outbound message transport.
pub trait MessageBus: Send + Sync {
    /// Sends one pre-built message (header included).
    fn send(&self, message: &[u16]) -> Result<(), ServiceError>;

    /// Publishes a telemetry snapshot.
    fn publish(&self, packet: &TelemetryPacket);
}

// ── Table service ─────────────────────────────────────────────────────────────

/// Which of the two tables an operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Schedule,
    Message,
}

/// A candidate table handed over by the table service for activation.
#[derive(Debug, Clone, PartialEq)]
pub enum TableUpdate {
    Schedule(Vec<ScheduleEntry>),
    Message(Vec<MessageEntry>),
}

/// Source of the schedule and message tables.
///
/// The scheduler owns the active copies; the service supplies the initial
/// tables and later candidate replacements, which are validated before they
/// become active.
pub trait TableService: Send {
    fn load_schedule_table(&mut self) -> Result<Vec<ScheduleEntry>, ServiceError>;

    fn load_message_table(&mut self) -> Result<Vec<MessageEntry>, ServiceError>;

    /// Next pending table replacement, if any.
    fn poll_update(&mut self) -> Result<Option<TableUpdate>, ServiceError>;

    /// Tells the service the scheduler changed the active table in place
    /// (command or run-time corruption handling).
    fn mark_modified(&mut self, table: TableKind);
}

// ── Time service ──────────────────────────────────────────────────────────────

/// Callback invoked on timer expiry or tone arrival.
pub type FrameCallback = Arc<dyn Fn() + Send + Sync>;

/// Quality of the mission-elapsed-time clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    /// Locked to the external time reference.
    Valid,
    /// Free-running on the local oscillator; tones are not trusted.
    Flywheel,
    /// Never set since boot.
    NotSet,
}

/// Mission-elapsed time and the major-frame tone.
pub trait TimeService: Send + Sync {
    /// Sub-second part of MET, in units of 2^-32 s.
    fn met_subseconds(&self) -> u32;

    fn clock_state(&self) -> ClockState;

    /// Registers the callback fired on every tone.
    fn register_tone_callback(&self, callback: FrameCallback) -> Result<(), ServiceError>;

    fn unregister_tone_callback(&self);
}

// ── Timer service ─────────────────────────────────────────────────────────────

/// A created timer and the accuracy its platform guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    pub id: u32,
    /// Worst-case expiry error in microseconds.
    pub accuracy_us: u32,
}

/// Periodic / one-shot timers.
pub trait TimerService: Send + Sync {
    fn create(&self, name: &str, callback: FrameCallback) -> Result<TimerHandle, ServiceError>;

    /// Arms timer `id` to fire after `start_us`, then every `interval_us`
    /// (`0` = one-shot).  Re-arming replaces any previous setting.
    fn set(&self, id: u32, start_us: u32, interval_us: u32) -> Result<(), ServiceError>;
}

// ── Commands & wakeup ─────────────────────────────────────────────────────────

/// Inbound command queue, polled without blocking.
pub trait CommandPipe: Send {
    /// Next queued command, or `Ok(None)` when the queue is empty.
    fn receive(&mut self) -> Result<Option<Command>, ServiceError>;
}

/// Binary semaphore released by the frame callbacks; the main loop runs one
/// table pass per release.
pub trait Wakeup: Send + Sync {
    fn give(&self);
}
