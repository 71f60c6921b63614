/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Recording fakes for every collaborator trait, and a [`Harness`] that
//! wires them into a ready-to-use [`Scheduler`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::SchedulerConfig;
use crate::events::{Event, EventId, EventSink, Severity};
use crate::scheduler::commands::Command;
use crate::scheduler::{InitError, Scheduler, Services};
use crate::services::{
    ClockState, CommandPipe, FrameCallback, MessageBus, ServiceError, TableKind, TableService,
    TableUpdate, TimeService, TimerHandle, TimerService, Wakeup,
};
use crate::state::SharedSyncState;
use crate::table::{EnableState, GroupData, MessageEntry, ScheduleEntry};
use crate::telemetry::TelemetryPacket;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap()
}

/// Smallest sub-second value that converts back to exactly `micros`.
pub fn micros_to_subseconds(micros: u32) -> u32 {
    (u64::from(micros) << 32).div_ceil(1_000_000) as u32
}

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn count(&self, id: EventId) -> usize {
        lock(&self.events).iter().filter(|e| e.id == id).count()
    }

    pub fn contains(&self, id: EventId, severity: Severity, text: &str) -> bool {
        lock(&self.events)
            .iter()
            .any(|e| e.id == id && e.severity == severity && e.text == text)
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &Event) {
        lock(&self.events).push(event.clone());
    }
}

// ── Time & timer ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct ClockInner {
    subseconds: u32,
    state: Option<ClockState>,
    tone: Option<FrameCallback>,
    register_error: Option<ServiceError>,
    watched: Option<SharedSyncState>,
    reads_under_lock: usize,
}

#[derive(Default)]
pub struct FakeClock {
    inner: Mutex<ClockInner>,
}

impl FakeClock {
    pub fn set_micros(&self, micros: u32) {
        lock(&self.inner).subseconds = micros_to_subseconds(micros);
    }

    pub fn set_state(&self, state: ClockState) {
        lock(&self.inner).state = Some(state);
    }

    pub fn fail_register(&self, err: ServiceError) {
        lock(&self.inner).register_error = Some(err);
    }

    pub fn has_tone_callback(&self) -> bool {
        lock(&self.inner).tone.is_some()
    }

    /// Counts every MET read made while `state` is locked.
    pub fn watch_lock(&self, state: SharedSyncState) {
        lock(&self.inner).watched = Some(state);
    }

    pub fn reads_under_lock(&self) -> usize {
        lock(&self.inner).reads_under_lock
    }

    /// Delivers one tone, if a callback is registered.
    pub fn fire_tone(&self) {
        let tone = lock(&self.inner).tone.clone();
        if let Some(cb) = tone {
            cb();
        }
    }
}

impl TimeService for FakeClock {
    fn met_subseconds(&self) -> u32 {
        let mut inner = lock(&self.inner);
        if inner.watched.as_ref().is_some_and(SharedSyncState::is_held) {
            inner.reads_under_lock += 1;
        }
        inner.subseconds
    }

    fn clock_state(&self) -> ClockState {
        lock(&self.inner).state.unwrap_or(ClockState::Valid)
    }

    fn register_tone_callback(&self, callback: FrameCallback) -> Result<(), ServiceError> {
        let mut inner = lock(&self.inner);
        if let Some(err) = inner.register_error {
            return Err(err);
        }
        inner.tone = Some(callback);
        Ok(())
    }

    fn unregister_tone_callback(&self) {
        lock(&self.inner).tone = None;
    }
}

struct TimerInner {
    accuracy_us: u32,
    create_error: Option<ServiceError>,
    callback: Option<FrameCallback>,
    sets: Vec<(u32, u32)>,
}

pub struct FakeTimer {
    inner: Mutex<TimerInner>,
}

impl Default for FakeTimer {
    fn default() -> Self {
        Self {
            inner: Mutex::new(TimerInner {
                accuracy_us: 10,
                create_error: None,
                callback: None,
                sets: Vec::new(),
            }),
        }
    }
}

impl FakeTimer {
    pub fn set_accuracy(&self, accuracy_us: u32) {
        lock(&self.inner).accuracy_us = accuracy_us;
    }

    pub fn fail_create(&self, err: ServiceError) {
        lock(&self.inner).create_error = Some(err);
    }

    pub fn last_set(&self) -> Option<(u32, u32)> {
        lock(&self.inner).sets.last().copied()
    }

    pub fn callback(&self) -> Option<FrameCallback> {
        lock(&self.inner).callback.clone()
    }
}

impl TimerService for FakeTimer {
    fn create(&self, _name: &str, callback: FrameCallback) -> Result<TimerHandle, ServiceError> {
        let mut inner = lock(&self.inner);
        if let Some(err) = inner.create_error {
            return Err(err);
        }
        inner.callback = Some(callback);
        Ok(TimerHandle {
            id: 1,
            accuracy_us: inner.accuracy_us,
        })
    }

    fn set(&self, _id: u32, start_us: u32, interval_us: u32) -> Result<(), ServiceError> {
        lock(&self.inner).sets.push((start_us, interval_us));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeWakeup {
    given: Mutex<usize>,
}

impl FakeWakeup {
    pub fn count(&self) -> usize {
        *lock(&self.given)
    }
}

impl Wakeup for FakeWakeup {
    fn give(&self) {
        *lock(&self.given) += 1;
    }
}

// ── Bus ───────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct BusInner {
    sent: Vec<Vec<u16>>,
    published: Vec<TelemetryPacket>,
    error: Option<ServiceError>,
}

#[derive(Default)]
pub struct FakeBus {
    inner: Mutex<BusInner>,
}

impl FakeBus {
    pub fn fail_with(&self, err: ServiceError) {
        lock(&self.inner).error = Some(err);
    }

    /// Message ids of every successfully sent message, in order.
    pub fn sent_ids(&self) -> Vec<u16> {
        lock(&self.inner).sent.iter().map(|m| m[0]).collect()
    }

    pub fn published(&self) -> Vec<TelemetryPacket> {
        lock(&self.inner).published.clone()
    }
}

impl MessageBus for FakeBus {
    fn send(&self, message: &[u16]) -> Result<(), ServiceError> {
        let mut inner = lock(&self.inner);
        if let Some(err) = inner.error {
            return Err(err);
        }
        inner.sent.push(message.to_vec());
        Ok(())
    }

    fn publish(&self, packet: &TelemetryPacket) {
        lock(&self.inner).published.push(packet.clone());
    }
}

// ── Tables & commands ─────────────────────────────────────────────────────────

/// Shared handle: clones see the same tables.
#[derive(Clone)]
pub struct FakeTables {
    schedule: Arc<Mutex<Vec<ScheduleEntry>>>,
    messages: Arc<Mutex<Vec<MessageEntry>>>,
    updates: Arc<Mutex<VecDeque<TableUpdate>>>,
    modified: Arc<Mutex<Vec<TableKind>>>,
}

impl FakeTables {
    /// Standard test tables:
    ///
    /// * slot 0 entry 0: enabled, every pass, message 1, group 1
    /// * slot 2 entry 1: disabled, every pass, message 2
    /// * message 1 = `0x1803`, message 2 = `0x1804`, both 8 bytes
    pub fn standard(config: &SchedulerConfig) -> Self {
        let mut schedule = vec![ScheduleEntry::unused(); config.table_entries()];
        schedule[0] = ScheduleEntry::send_message(
            EnableState::Enabled,
            1,
            0,
            1,
            GroupData {
                group_id: 1,
                multi_group_mask: 0,
            },
        );
        let per_slot = usize::from(config.entries_per_slot);
        schedule[2 * per_slot + 1] =
            ScheduleEntry::send_message(EnableState::Disabled, 1, 0, 2, GroupData::default());

        let mut messages = vec![
            MessageEntry::unused(usize::from(config.min_msg_words));
            usize::from(config.max_messages)
        ];
        messages[1] = MessageEntry::with_length(0x1803, 8);
        messages[2] = MessageEntry::with_length(0x1804, 8);

        Self {
            schedule: Arc::new(Mutex::new(schedule)),
            messages: Arc::new(Mutex::new(messages)),
            updates: Arc::default(),
            modified: Arc::default(),
        }
    }

    /// The table handed out by the next load.
    pub fn schedule_mut(&self) -> MutexGuard<'_, Vec<ScheduleEntry>> {
        lock(&self.schedule)
    }

    pub fn messages_mut(&self) -> MutexGuard<'_, Vec<MessageEntry>> {
        lock(&self.messages)
    }

    pub fn push_update(&self, update: TableUpdate) {
        lock(&self.updates).push_back(update);
    }

    pub fn modified(&self) -> Vec<TableKind> {
        lock(&self.modified).clone()
    }
}

impl TableService for FakeTables {
    fn load_schedule_table(&mut self) -> Result<Vec<ScheduleEntry>, ServiceError> {
        Ok(lock(&self.schedule).clone())
    }

    fn load_message_table(&mut self) -> Result<Vec<MessageEntry>, ServiceError> {
        Ok(lock(&self.messages).clone())
    }

    fn poll_update(&mut self) -> Result<Option<TableUpdate>, ServiceError> {
        Ok(lock(&self.updates).pop_front())
    }

    fn mark_modified(&mut self, table: TableKind) {
        lock(&self.modified).push(table);
    }
}

#[derive(Default)]
struct CommandsInner {
    queue: VecDeque<Command>,
    error: Option<ServiceError>,
}

/// Shared handle: clones see the same queue.
#[derive(Clone, Default)]
pub struct FakeCommands {
    inner: Arc<Mutex<CommandsInner>>,
}

impl FakeCommands {
    pub fn push(&self, command: Command) {
        lock(&self.inner).queue.push_back(command);
    }

    pub fn pending(&self) -> usize {
        lock(&self.inner).queue.len()
    }

    pub fn fail_with(&self, err: ServiceError) {
        lock(&self.inner).error = Some(err);
    }
}

impl CommandPipe for FakeCommands {
    fn receive(&mut self) -> Result<Option<Command>, ServiceError> {
        let mut inner = lock(&self.inner);
        if let Some(err) = inner.error {
            return Err(err);
        }
        Ok(inner.queue.pop_front())
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

/// A scheduler wired to fakes, with handles kept for inspection.
pub struct Harness {
    pub config: SchedulerConfig,
    pub events: Arc<RecordingSink>,
    pub clock: Arc<FakeClock>,
    pub timer: Arc<FakeTimer>,
    pub wakeup: Arc<FakeWakeup>,
    pub bus: Arc<FakeBus>,
    pub tables: FakeTables,
    pub commands: FakeCommands,
}

impl Harness {
    pub fn new() -> Self {
        let config = SchedulerConfig::default();
        let tables = FakeTables::standard(&config);
        Self {
            config,
            events: Arc::new(RecordingSink::default()),
            clock: Arc::new(FakeClock::default()),
            timer: Arc::new(FakeTimer::default()),
            wakeup: Arc::new(FakeWakeup::default()),
            bus: Arc::new(FakeBus::default()),
            tables,
            commands: FakeCommands::default(),
        }
    }

    pub fn try_scheduler(&self) -> Result<Scheduler, InitError> {
        let services = Services {
            bus: self.bus.clone(),
            tables: Box::new(self.tables.clone()),
            time: self.clock.clone(),
            timer: self.timer.clone(),
            events: self.events.clone(),
            commands: Box::new(self.commands.clone()),
            wakeup: self.wakeup.clone(),
        };
        Scheduler::init(self.config.clone(), services)
    }

    pub fn scheduler(&self) -> Scheduler {
        self.try_scheduler().unwrap()
    }
}
