/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler event reporting.
//!
//! Every observable anomaly (skipped slots, table corruption, noisy tone,
//! command outcome) is reported as an [`Event`]: a stable numeric id, a
//! severity and pre-formatted text.  Events go to an [`EventSink`]; the
//! scheduler never waits on the sink and never learns whether delivery
//! worked.
//!
//! High-rate events are guarded by binary filters (see
//! [`EventReporter::new`]): after the first one or two occurrences they are
//! suppressed until the filters are reset, which happens on every
//! housekeeping request.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

// ── Event ids ─────────────────────────────────────────────────────────────────

/// Stable identifiers of every event the scheduler can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventId {
    InitStats,
    AppExit,
    TableLoadErr,
    MinorFrameTimerCreateErr,
    MinorFrameTimerAccuracy,
    MajorFrameSubErr,
    SameSlot,
    SkippedSlots,
    MultiSlots,
    Corruption,
    PacketSend,
    NoisyMajorFrame,
    ScheduleTableErr,
    ScheduleTableSummary,
    MessageTableErr,
    MessageTableSummary,
    Noop,
    Reset,
    Enable,
    Disable,
    EnableGroup,
    DisableGroup,
    EnableSync,
    SendDiag,
    EnableArgErr,
    EnableStateErr,
    DisableArgErr,
    DisableStateErr,
    EnableGroupArgErr,
    EnableGroupNotFound,
    DisableGroupArgErr,
    DisableGroupNotFound,
    TableReload,
}

impl EventId {
    /// Numeric id carried on the wire.
    pub fn code(self) -> u16 {
        match self {
            EventId::InitStats => 1,
            EventId::AppExit => 2,
            EventId::TableLoadErr => 9,
            EventId::MinorFrameTimerCreateErr => 12,
            EventId::MinorFrameTimerAccuracy => 13,
            EventId::MajorFrameSubErr => 14,
            EventId::SameSlot => 16,
            EventId::SkippedSlots => 17,
            EventId::MultiSlots => 18,
            EventId::Corruption => 19,
            EventId::PacketSend => 20,
            EventId::NoisyMajorFrame => 21,
            EventId::ScheduleTableErr => 30,
            EventId::ScheduleTableSummary => 31,
            EventId::MessageTableErr => 32,
            EventId::MessageTableSummary => 33,
            EventId::Noop => 40,
            EventId::Reset => 41,
            EventId::Enable => 42,
            EventId::Disable => 43,
            EventId::EnableGroup => 44,
            EventId::DisableGroup => 45,
            EventId::EnableSync => 46,
            EventId::SendDiag => 47,
            EventId::EnableArgErr => 50,
            EventId::EnableStateErr => 51,
            EventId::DisableArgErr => 52,
            EventId::DisableStateErr => 53,
            EventId::EnableGroupArgErr => 54,
            EventId::EnableGroupNotFound => 55,
            EventId::DisableGroupArgErr => 56,
            EventId::DisableGroupNotFound => 57,
            EventId::TableReload => 61,
        }
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
            Severity::Critical => "CRIT",
        };
        f.pad(s)
    }
}

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub severity: Severity,
    pub text: String,
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Destination of scheduler events.
///
/// Implementations must not block the caller; a failed delivery is dropped.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Forwards events to `tracing`, mapping severities onto log levels.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &Event) {
        let eid = event.id.code();
        match event.severity {
            Severity::Debug => debug!(eid, "{}", event.text),
            Severity::Info => info!(eid, "{}", event.text),
            Severity::Error => error!(eid, "{}", event.text),
            Severity::Critical => error!(eid, critical = true, "{}", event.text),
        }
    }
}

// ── Binary filters ────────────────────────────────────────────────────────────

/// Per-event suppression counter: lets the first `limit` events through.
#[derive(Debug)]
struct BinaryFilter {
    limit: u32,
    sent: Cell<u32>,
}

impl BinaryFilter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            sent: Cell::new(0),
        }
    }

    fn admit(&self) -> bool {
        let sent = self.sent.get();
        if sent >= self.limit {
            return false;
        }
        self.sent.set(sent + 1);
        true
    }
}

// ── EventReporter ─────────────────────────────────────────────────────────────

/// Event front-end owned by the scheduler main loop.
///
/// Applies the binary filters and forwards admitted events to the sink.  It
/// is not `Sync`: only the main loop reports events, the frame
/// callbacks never do.
pub struct EventReporter {
    sink: Arc<dyn EventSink>,
    filters: BTreeMap<EventId, BinaryFilter>,
}

impl EventReporter {
    /// Creates a reporter with the standard filter set:
    ///
    /// | Event | Passes |
    /// |---|---|
    /// | `SameSlot`, `MultiSlots`, `SkippedSlots`, `PacketSend` | first one |
    /// | `Corruption` | first two (the two halves of one report) |
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        let filters = [
            (EventId::SameSlot, 1),
            (EventId::MultiSlots, 1),
            (EventId::SkippedSlots, 1),
            (EventId::Corruption, 2),
            (EventId::PacketSend, 1),
        ]
        .into_iter()
        .map(|(id, limit)| (id, BinaryFilter::new(limit)))
        .collect();

        Self { sink, filters }
    }

    /// Creates a reporter that forwards everything.
    pub fn unfiltered(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            filters: BTreeMap::new(),
        }
    }

    /// Reports one event, unless its filter is exhausted.
    pub fn send(&self, id: EventId, severity: Severity, text: impl Into<String>) {
        if let Some(filter) = self.filters.get(&id) {
            if !filter.admit() {
                return;
            }
        }
        self.sink.emit(&Event {
            id,
            severity,
            text: text.into(),
        });
    }

    /// Re-opens every filter.
    pub fn reset_filters(&self) {
        for filter in self.filters.values() {
            filter.sent.set(0);
        }
    }
}

impl fmt::Debug for EventReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReporter")
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
