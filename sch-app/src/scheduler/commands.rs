/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Ground commands.
//!
//! Commands are queued on the [`CommandPipe`](crate::services::CommandPipe)
//! and drained in the time-sync slot (see the processor).  Every handler is
//! also callable directly; either way it reports an event, bumps the command
//! or error counter, and returns the outcome.
//!
//! Entry commands only move an entry between `Enabled` and `Disabled`.  An
//! unused or corrupt entry, or one already in the requested state, is
//! rejected with [`CommandError::InvalidState`].

use crate::events::{EventId, Severity};
use crate::services::TableKind;
use crate::table::{EnableState, EntryRef, GroupData};
use crate::telemetry::{HousekeepingTlm, TelemetryPacket};

use super::{CommandError, ProcessError, Scheduler, VERSION};

/// A command accepted by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Noop,
    ResetCounters,
    Enable(EntryRef),
    Disable(EntryRef),
    EnableGroup(GroupData),
    DisableGroup(GroupData),
    EnableSync,
    SendDiagnostics,
    /// Housekeeping request: publish telemetry and let the table service
    /// swap in pending tables.
    Housekeeping,
}

/// Direction of an entry or group command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Enable,
    Disable,
}

impl Toggle {
    fn label(self) -> &'static str {
        match self {
            Toggle::Enable => "ENABLE",
            Toggle::Disable => "DISABLE",
        }
    }

    fn from_state(self) -> EnableState {
        match self {
            Toggle::Enable => EnableState::Disabled,
            Toggle::Disable => EnableState::Enabled,
        }
    }

    fn to_state(self) -> EnableState {
        match self {
            Toggle::Enable => EnableState::Enabled,
            Toggle::Disable => EnableState::Disabled,
        }
    }
}

impl Scheduler {
    /// Executes every queued command.
    ///
    /// # Errors
    /// A pipe read failure; commands that are merely rejected are not
    /// errors here.
    pub(crate) fn process_commands(&mut self) -> Result<(), ProcessError> {
        while let Some(command) = self.commands.receive().map_err(ProcessError::CommandPipe)? {
            self.execute(command);
        }
        Ok(())
    }

    /// Executes one command.
    pub fn execute(&mut self, command: Command) {
        // Outcomes are already reported through events and counters
        let _ = match command {
            Command::Noop => {
                self.noop();
                Ok(())
            }
            Command::ResetCounters => {
                self.reset_counters();
                Ok(())
            }
            Command::Enable(at) => self.enable_entry(at),
            Command::Disable(at) => self.disable_entry(at),
            Command::EnableGroup(group) => self.enable_group(group).map(|_| ()),
            Command::DisableGroup(group) => self.disable_group(group).map(|_| ()),
            Command::EnableSync => {
                self.enable_sync();
                Ok(())
            }
            Command::SendDiagnostics => {
                self.send_diagnostics();
                Ok(())
            }
            Command::Housekeeping => {
                self.housekeeping();
                Ok(())
            }
        };
    }

    fn post_command_result(&mut self, good: bool) {
        if good {
            self.counters.command_counter = self.counters.command_counter.wrapping_add(1);
        } else {
            self.counters.error_counter = self.counters.error_counter.wrapping_add(1);
        }
    }

    // ── No-op / reset ─────────────────────────────────────────────────────────

    pub fn noop(&mut self) {
        self.post_command_result(true);
        self.events.send(
            EventId::Noop,
            Severity::Info,
            format!("NO-op command. Version {VERSION}"),
        );
    }

    /// Zeroes every housekeeping counter, the command counters included.
    ///
    /// Tables, the table-walk cursor and the synchronisation state other
    /// than its major-frame counters are left untouched.
    pub fn reset_counters(&mut self) {
        self.counters = Default::default();
        {
            let mut s = self.sync.state().lock();
            s.valid_major_frame_count = 0;
            s.missed_major_frame_count = 0;
            s.unexpected_major_frame_count = 0;
        }
        self.events
            .send(EventId::Reset, Severity::Debug, "RESET command");
    }

    // ── Entry commands ────────────────────────────────────────────────────────

    pub fn enable_entry(&mut self, at: EntryRef) -> Result<(), CommandError> {
        self.toggle_entry(at, Toggle::Enable)
    }

    pub fn disable_entry(&mut self, at: EntryRef) -> Result<(), CommandError> {
        self.toggle_entry(at, Toggle::Disable)
    }

    fn toggle_entry(&mut self, at: EntryRef, toggle: Toggle) -> Result<(), CommandError> {
        let (arg_err, state_err, done) = match toggle {
            Toggle::Enable => (EventId::EnableArgErr, EventId::EnableStateErr, EventId::Enable),
            Toggle::Disable => (EventId::DisableArgErr, EventId::DisableStateErr, EventId::Disable),
        };
        let label = toggle.label();
        let total = self.config.total_slots;
        let per_slot = self.config.entries_per_slot;

        let Some(index) = at.index(total, per_slot) else {
            self.post_command_result(false);
            self.events.send(
                arg_err,
                Severity::Error,
                format!(
                    "{label} cmd: invalid argument, slot={} (<{}), entry={} (<{})",
                    at.slot, total, at.entry, per_slot
                ),
            );
            return Err(CommandError::InvalidEntry {
                slot: at.slot,
                entry: at.entry,
            });
        };

        let raw = self.schedule[index].enable_state;
        if self.schedule[index].state() != Some(toggle.from_state()) {
            self.post_command_result(false);
            self.events.send(
                state_err,
                Severity::Error,
                format!(
                    "{label} command: invalid state = {raw}, slot = {}, entry = {}",
                    at.slot, at.entry
                ),
            );
            return Err(CommandError::InvalidState {
                slot: at.slot,
                entry: at.entry,
                state: raw,
            });
        }

        self.schedule[index].set_state(toggle.to_state());
        self.mark_modified(TableKind::Schedule);
        self.post_command_result(true);
        self.events.send(
            done,
            Severity::Debug,
            format!("{label} command: slot = {}, entry = {}", at.slot, at.entry),
        );
        Ok(())
    }

    // ── Group commands ────────────────────────────────────────────────────────

    /// Enables every used entry selected by `group`; returns the match count.
    pub fn enable_group(&mut self, group: GroupData) -> Result<usize, CommandError> {
        self.toggle_group(group, Toggle::Enable)
    }

    /// Disables every used entry selected by `group`; returns the match count.
    pub fn disable_group(&mut self, group: GroupData) -> Result<usize, CommandError> {
        self.toggle_group(group, Toggle::Disable)
    }

    fn toggle_group(&mut self, group: GroupData, toggle: Toggle) -> Result<usize, CommandError> {
        let (arg_err, not_found, done) = match toggle {
            Toggle::Enable => (
                EventId::EnableGroupArgErr,
                EventId::EnableGroupNotFound,
                EventId::EnableGroup,
            ),
            Toggle::Disable => (
                EventId::DisableGroupArgErr,
                EventId::DisableGroupNotFound,
                EventId::DisableGroup,
            ),
        };
        let label = toggle.label();

        if group.is_empty() {
            self.post_command_result(false);
            self.events.send(
                arg_err,
                Severity::Error,
                format!("{label} GROUP command: invalid argument, no groups selected"),
            );
            return Err(CommandError::NoGroupSelected);
        }

        let mut matches = 0usize;
        for entry in self.schedule.iter_mut() {
            let used = matches!(
                entry.state(),
                Some(EnableState::Enabled | EnableState::Disabled)
            );
            if entry.group_data == 0 || !used {
                continue;
            }
            if group.selects(entry.group()) {
                entry.set_state(toggle.to_state());
                matches += 1;
            }
        }

        if matches == 0 {
            self.post_command_result(false);
            self.events.send(
                not_found,
                Severity::Error,
                format!(
                    "{label} GROUP command: Neither Group {} nor Multi-Group 0x{:06X} found",
                    group.group_id, group.multi_group_mask
                ),
            );
            return Err(CommandError::GroupNotFound {
                group_id: group.group_id,
                multi_group_mask: group.multi_group_mask,
            });
        }

        self.mark_modified(TableKind::Schedule);
        self.post_command_result(true);
        self.events.send(
            done,
            Severity::Debug,
            format!("{label} GROUP command: match count = {matches}"),
        );
        Ok(matches)
    }

    // ── Synchronisation ───────────────────────────────────────────────────────

    /// Accepts the tone again after it was disabled as too noisy.
    pub fn enable_sync(&mut self) {
        {
            let mut s = self.sync.state().lock();
            s.ignore_major_frame = false;
            s.unexpected_major_frame = false;
            s.consecutive_noisy_frame_counter = 0;
        }
        self.post_command_result(true);
        self.events.send(
            EventId::EnableSync,
            Severity::Debug,
            "Major Frame Synchronization Enabled",
        );
    }

    // ── Telemetry ─────────────────────────────────────────────────────────────

    pub fn send_diagnostics(&mut self) {
        self.post_command_result(true);
        let packet = TelemetryPacket::Diagnostic(self.diagnostic_snapshot());
        self.bus.publish(&packet);
        self.events.send(
            EventId::SendDiag,
            Severity::Debug,
            "Transmitting Diagnostic Message",
        );
    }

    /// Publishes housekeeping telemetry, re-opens the event filters and
    /// activates pending table updates.
    pub fn housekeeping(&mut self) {
        let sync = self.sync.state().snapshot();
        let tlm = HousekeepingTlm::capture(&self.counters, &self.cursor, &sync);
        self.bus.publish(&TelemetryPacket::Housekeeping(tlm));
        self.events.reset_filters();
        self.manage_tables();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
