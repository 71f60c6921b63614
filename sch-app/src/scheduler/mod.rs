/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler instance: start-up, the per-wakeup step and table management.
//!
//! # Life cycle
//! ```text
//! Scheduler::init()   load + validate tables, create the minor-frame timer
//! Scheduler::start()  subscribe to the tone, arm the start-up timer
//! loop {
//!     <wait for Wakeup::give()>
//!     Scheduler::wakeup()   one table pass; Err ends the loop
//! }
//! Scheduler::shutdown()
//! ```
//!
//! The instance owns the active tables, the loop-owned cursor and counters,
//! and shares [`SyncState`](crate::state::SyncState) with the frame
//! callbacks through [`FrameSync`].
//!
//! The table walk, the activity dispatcher and the command handlers live in
//! the [`processor`], [`dispatch`] and [`commands`] submodules as further
//! `impl Scheduler` blocks.

pub mod commands;
mod dispatch;
pub mod error;
mod processor;

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::events::{EventId, EventReporter, EventSink, Severity};
use crate::frame_sync::FrameSync;
use crate::services::{
    CommandPipe, MessageBus, TableKind, TableService, TableUpdate, TimeService, TimerService,
    Wakeup,
};
use crate::state::{Counters, Cursor, ProcessingGate, SyncToMet};
use crate::table::validate::{verify_message_table, verify_schedule_table, MessageLimits};
use crate::table::{MessageEntry, ScheduleEntry};
use crate::telemetry::{DiagnosticTlm, HousekeepingTlm};

pub use error::{CommandError, InitError, MessageTableError, ProcessError, ScheduleTableError};

/// Scheduler version reported in the start-up and no-op events.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the scheduler needs from the outside world.
pub struct Services {
    pub bus: Arc<dyn MessageBus>,
    pub tables: Box<dyn TableService>,
    pub time: Arc<dyn TimeService>,
    pub timer: Arc<dyn TimerService>,
    pub events: Arc<dyn EventSink>,
    pub commands: Box<dyn CommandPipe>,
    pub wakeup: Arc<dyn Wakeup>,
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// One scheduler instance.
pub struct Scheduler {
    config: SchedulerConfig,
    sync: Arc<FrameSync>,
    cursor: Cursor,
    counters: Counters,
    schedule: Vec<ScheduleEntry>,
    messages: Vec<MessageEntry>,
    bus: Arc<dyn MessageBus>,
    tables: Box<dyn TableService>,
    commands: Box<dyn CommandPipe>,
    events: EventReporter,
    gate: ProcessingGate,
}

impl Scheduler {
    /// Loads and validates both tables and creates the minor-frame timer.
    ///
    /// # Errors
    /// Any failure is fatal; the matching error event has already been
    /// reported when this returns.
    pub fn init(config: SchedulerConfig, services: Services) -> Result<Self, InitError> {
        let Services {
            bus,
            mut tables,
            time,
            timer,
            events,
            commands,
            wakeup,
        } = services;

        let events = EventReporter::new(events);
        let mut counters = Counters::default();

        // Derived slot periods must be non-zero and exceed the drift window
        config.check().map_err(|e| {
            events.send(
                EventId::InitStats,
                Severity::Error,
                format!("Invalid scheduler configuration: {e:#}"),
            );
            InitError::Config(e)
        })?;

        let schedule = tables.load_schedule_table().map_err(|e| {
            events.send(
                EventId::TableLoadErr,
                Severity::Error,
                format!("Error (RC=0x{:08X}) Loading schedule table", e.status()),
            );
            InitError::ScheduleLoad(e)
        })?;
        check_table_size(&events, "schedule", config.table_entries(), schedule.len())
            .map_err(|(expected, actual)| InitError::ScheduleTableSize { expected, actual })?;
        verify_schedule_table(&schedule, config.max_messages, &events, &mut counters)
            .into_result()?;

        let messages = tables.load_message_table().map_err(|e| {
            events.send(
                EventId::TableLoadErr,
                Severity::Error,
                format!("Error (RC=0x{:08X}) Loading message table", e.status()),
            );
            InitError::MessageLoad(e)
        })?;
        check_table_size(&events, "message", usize::from(config.max_messages), messages.len())
            .map_err(|(expected, actual)| InitError::MessageTableSize { expected, actual })?;
        verify_message_table(&messages, &MessageLimits::from(&config), &events, &mut counters)
            .into_result()?;

        let sync = FrameSync::new(config.clone(), time, timer, wakeup);
        let gate = ProcessingGate::new(config.start_processing_enabled);
        let mut scheduler = Self {
            config,
            sync,
            cursor: Cursor::default(),
            counters,
            schedule,
            messages,
            bus,
            tables,
            commands,
            events,
            gate,
        };
        scheduler.timer_init()?;

        scheduler.events.send(
            EventId::InitStats,
            Severity::Info,
            format!("SCH Initialized. Version {VERSION}"),
        );
        Ok(scheduler)
    }

    /// Creates the minor-frame timer and adapts the sync mode to its
    /// accuracy.
    fn timer_init(&mut self) -> Result<(), InitError> {
        let worst = self.config.worst_clock_accuracy();
        self.cursor.clock_accuracy = worst;

        let handle = self.sync.create_timer().map_err(|e| {
            self.events.send(
                EventId::MinorFrameTimerCreateErr,
                Severity::Error,
                format!("Error creating Timer (RC=0x{:08X})", e.status()),
            );
            InitError::TimerCreate(e)
        })?;

        if handle.accuracy_us > worst {
            self.events.send(
                EventId::MinorFrameTimerAccuracy,
                Severity::Info,
                format!(
                    "OS Timer Accuracy ({} > reqd {} usec) requires Minor Frame MET sync",
                    handle.accuracy_us, worst
                ),
            );
            let worst_case =
                handle.accuracy_us * 2 / self.config.normal_slot_period() + 1;
            let mut s = self.sync.state().lock();
            s.sync_to_met = SyncToMet::MINOR_SYNCHRONIZED;
            s.worst_case_slots_per_minor_frame = u16::try_from(worst_case).unwrap_or(u16::MAX);
            drop(s);
            self.cursor.clock_accuracy = handle.accuracy_us;
        }

        debug!(timer_id = handle.id, accuracy_us = handle.accuracy_us, "minor frame timer created");
        Ok(())
    }

    /// Subscribes to the tone and arms the start-up timer.
    ///
    /// The first timer expiry comes after `startup_period`, giving the tone
    /// the chance to establish the major frame first.
    pub fn start(&mut self) -> Result<(), InitError> {
        let armed = self
            .sync
            .subscribe_tone()
            .map_err(InitError::ToneSubscribe)
            .and_then(|()| {
                self.sync
                    .arm_timer(self.config.startup_period, 0)
                    .map_err(InitError::TimerSet)
            });

        if let Err(e) = &armed {
            let status = match e {
                InitError::ToneSubscribe(s) | InitError::TimerSet(s) => s.status(),
                _ => 0,
            };
            self.events.send(
                EventId::MajorFrameSubErr,
                Severity::Error,
                format!("Error initializing Timers (RC=0x{status:08X})"),
            );
        }
        armed?;

        info!(
            slots = self.config.total_slots,
            slot_period_us = self.config.normal_slot_period(),
            "scheduler started"
        );
        Ok(())
    }

    /// One main-loop iteration, run after every wakeup.
    pub fn wakeup(&mut self) -> Result<(), ProcessError> {
        let (ignoring, since_tone) = {
            let s = self.sync.state().lock();
            (s.ignore_major_frame, s.minor_frames_since_tone)
        };

        if ignoring && !self.cursor.ignore_major_frame_msg_sent {
            self.events.send(
                EventId::NoisyMajorFrame,
                Severity::Error,
                format!(
                    "Major Frame Sync too noisy (Slot {since_tone}). Disabling synchronization."
                ),
            );
            self.cursor.ignore_major_frame_msg_sent = true;
        } else if !ignoring {
            self.cursor.ignore_major_frame_msg_sent = false;
        }

        if !self.gate.is_enabled() {
            return Ok(());
        }
        self.process_schedule_table()
    }

    // ── Processing gate ───────────────────────────────────────────────────────

    /// Resumes the table walk from the next wakeup.
    ///
    /// Slots that went by while processing was disabled are handled like any
    /// other backlog: run when within `max_lag_count`, skipped otherwise.
    pub fn enable_processing(&self) {
        self.gate.enable();
        info!("schedule processing enabled");
    }

    /// Stops the table walk.  The timer and tone keep the timeline running.
    pub fn disable_processing(&self) {
        self.gate.disable();
        info!("schedule processing disabled");
    }

    pub fn processing_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    /// Handle for toggling processing from another task.
    pub fn processing_gate(&self) -> ProcessingGate {
        self.gate.clone()
    }

    /// Detaches from the tone and reports the exit status.
    pub fn shutdown(&mut self, status: u32) {
        self.sync.unsubscribe_tone();
        self.events.send(
            EventId::AppExit,
            Severity::Critical,
            format!("SCH App: terminating, err = 0x{status:08X}"),
        );
    }

    // ── Table management ──────────────────────────────────────────────────────

    /// Activates every pending table update that passes validation.
    ///
    /// A rejected or unreadable update leaves the active table in place.
    fn manage_tables(&mut self) {
        loop {
            match self.tables.poll_update() {
                Ok(None) => break,
                Ok(Some(update)) => self.activate(update),
                Err(e) => {
                    self.events.send(
                        EventId::TableLoadErr,
                        Severity::Error,
                        format!("Error (RC=0x{:08X}) Reloading tables", e.status()),
                    );
                    break;
                }
            }
        }
    }

    fn activate(&mut self, update: TableUpdate) {
        match update {
            TableUpdate::Schedule(table) => {
                let expected = self.config.table_entries();
                if check_table_size(&self.events, "schedule", expected, table.len()).is_err() {
                    return;
                }
                let verdict = verify_schedule_table(
                    &table,
                    self.config.max_messages,
                    &self.events,
                    &mut self.counters,
                );
                if verdict.first_error.is_none() {
                    self.schedule = table;
                    self.events
                        .send(EventId::TableReload, Severity::Info, "Schedule table reloaded");
                }
            }
            TableUpdate::Message(table) => {
                let expected = usize::from(self.config.max_messages);
                if check_table_size(&self.events, "message", expected, table.len()).is_err() {
                    return;
                }
                let limits = MessageLimits::from(&self.config);
                let verdict =
                    verify_message_table(&table, &limits, &self.events, &mut self.counters);
                if verdict.first_error.is_none() {
                    self.messages = table;
                    self.events
                        .send(EventId::TableReload, Severity::Info, "Message table reloaded");
                }
            }
        }
    }

    fn mark_modified(&mut self, table: TableKind) {
        self.tables.mark_modified(table);
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn frame_sync(&self) -> &Arc<FrameSync> {
        &self.sync
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn schedule(&self) -> &[ScheduleEntry] {
        &self.schedule
    }

    pub fn messages(&self) -> &[MessageEntry] {
        &self.messages
    }

    pub fn housekeeping_snapshot(&self) -> HousekeepingTlm {
        let sync = self.sync.state().snapshot();
        HousekeepingTlm::capture(&self.counters, &self.cursor, &sync)
    }

    pub fn diagnostic_snapshot(&self) -> DiagnosticTlm {
        DiagnosticTlm::capture(&self.schedule, &self.messages)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("sync", &self.sync)
            .field("cursor", &self.cursor)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

/// Rejects a table whose entry count does not match the configuration.
fn check_table_size(
    events: &EventReporter,
    name: &str,
    expected: usize,
    actual: usize,
) -> Result<(), (usize, usize)> {
    if expected == actual {
        return Ok(());
    }
    events.send(
        EventId::TableLoadErr,
        Severity::Error,
        format!("The {name} table has {actual} entries, expected {expected}"),
    );
    Err((expected, actual))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
