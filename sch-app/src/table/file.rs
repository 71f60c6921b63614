/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! YAML table files and the host table service.
//!
//! Both tables are written sparsely; every position not listed is unused.
//!
//! ```yaml
//! # schedule.yaml
//! entries:
//!   - { slot: 0, entry: 0, frequency: 1, message_index: 1 }
//!   - { slot: 50, entry: 1, frequency: 4, remainder: 2, message_index: 2,
//!       enable_state: 2, group_id: 3, multi_group_mask: 0x000001 }
//!
//! # messages.yaml
//! messages:
//!   - { index: 1, message_id: 0x1803, length: 8 }
//!   - { index: 2, message_id: 0x1804, length: 12, payload: [1, 2, 3] }
//! ```
//!
//! Out-of-range coordinates and duplicate positions are rejected while
//! parsing; field-level consistency is left to the validator so that the
//! same checks apply to every table source.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::services::{ServiceError, TableKind, TableService, TableUpdate};

use super::{
    ActivityType, EnableState, EntryRef, GroupData, MessageEntry, ScheduleEntry,
    MULTI_GROUP_BIT_MASK, PRIMARY_HEADER_WORDS,
};

/// Status reported to the scheduler when a table file cannot be used.
pub const TABLE_LOAD_FAILED: ServiceError = ServiceError::Code(-1);

// ── File formats ──────────────────────────────────────────────────────────────

fn enabled_raw() -> u8 {
    EnableState::Enabled.to_raw()
}

fn send_message_raw() -> u8 {
    ActivityType::SendMessage.to_raw()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleFile {
    #[serde(default)]
    entries: Vec<ScheduleRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleRecord {
    slot: u16,
    entry: u16,
    #[serde(default = "enabled_raw")]
    enable_state: u8,
    #[serde(default = "send_message_raw")]
    activity_type: u8,
    frequency: u16,
    #[serde(default)]
    remainder: u16,
    message_index: u16,
    #[serde(default)]
    group_id: u8,
    #[serde(default)]
    multi_group_mask: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageFile {
    #[serde(default)]
    messages: Vec<MessageRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageRecord {
    index: u16,
    message_id: u16,
    /// Total message length in bytes, header included.
    length: u16,
    /// User data words following the primary header.
    #[serde(default)]
    payload: Vec<u16>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parses a schedule table document into a full-size table.
pub fn parse_schedule_table(content: &str, config: &SchedulerConfig) -> Result<Vec<ScheduleEntry>> {
    let file: ScheduleFile = if content.trim().is_empty() {
        ScheduleFile { entries: Vec::new() }
    } else {
        serde_yaml::from_str(content).context("Failed to parse schedule table YAML")?
    };

    let mut table = vec![ScheduleEntry::unused(); config.table_entries()];
    let mut seen = vec![false; table.len()];

    for rec in file.entries {
        let at = EntryRef {
            slot: rec.slot,
            entry: rec.entry,
        };
        let Some(index) = at.index(config.total_slots, config.entries_per_slot) else {
            bail!(
                "schedule entry slot={} entry={} outside table ({} slots x {} entries)",
                rec.slot,
                rec.entry,
                config.total_slots,
                config.entries_per_slot
            );
        };
        if std::mem::replace(&mut seen[index], true) {
            bail!("schedule entry slot={} entry={} listed twice", rec.slot, rec.entry);
        }

        if rec.multi_group_mask & !MULTI_GROUP_BIT_MASK != 0 {
            bail!(
                "schedule entry slot={} entry={} multi_group_mask 0x{:X} exceeds 24 bits",
                rec.slot,
                rec.entry,
                rec.multi_group_mask
            );
        }

        let group = GroupData {
            group_id: rec.group_id,
            multi_group_mask: rec.multi_group_mask,
        };
        table[index] = ScheduleEntry {
            enable_state: rec.enable_state,
            activity_type: rec.activity_type,
            frequency: rec.frequency,
            remainder: rec.remainder,
            message_index: rec.message_index,
            group_data: group.encode(),
        };
    }

    Ok(table)
}

/// Parses a message table document into a full-size table.
pub fn parse_message_table(content: &str, config: &SchedulerConfig) -> Result<Vec<MessageEntry>> {
    let file: MessageFile = if content.trim().is_empty() {
        MessageFile {
            messages: Vec::new(),
        }
    } else {
        serde_yaml::from_str(content).context("Failed to parse message table YAML")?
    };

    let unused_words = usize::from(config.min_msg_words);
    let mut table = vec![MessageEntry::unused(unused_words); usize::from(config.max_messages)];
    let mut seen = vec![false; table.len()];
    let max_words = usize::from(config.max_msg_words);

    for rec in file.messages {
        let index = usize::from(rec.index);
        if index >= table.len() {
            bail!(
                "message index {} outside table ({} messages)",
                rec.index,
                config.max_messages
            );
        }
        if std::mem::replace(&mut seen[index], true) {
            bail!("message index {} listed twice", rec.index);
        }

        let mut entry = MessageEntry::with_length(rec.message_id, rec.length);
        let needed = PRIMARY_HEADER_WORDS + rec.payload.len();
        if entry.words.len() < needed {
            entry.words.resize(needed, 0);
        }
        entry.words[PRIMARY_HEADER_WORDS..needed].copy_from_slice(&rec.payload);

        if entry.words.len() > max_words {
            bail!(
                "message index {} needs {} words, buffers hold {}",
                rec.index,
                entry.words.len(),
                max_words
            );
        }
        table[index] = entry;
    }

    Ok(table)
}

pub fn load_schedule_file(path: &Path, config: &SchedulerConfig) -> Result<Vec<ScheduleEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open schedule table: {}", path.display()))?;
    parse_schedule_table(&content, config)
        .with_context(|| format!("Invalid schedule table: {}", path.display()))
}

pub fn load_message_file(path: &Path, config: &SchedulerConfig) -> Result<Vec<MessageEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open message table: {}", path.display()))?;
    parse_message_table(&content, config)
        .with_context(|| format!("Invalid message table: {}", path.display()))
}

// ── YamlTableService ──────────────────────────────────────────────────────────

/// One watched table file.
#[derive(Debug)]
struct WatchedFile {
    path: PathBuf,
    /// Modification time of the version last handed out.
    loaded_at: Option<SystemTime>,
}

impl WatchedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            loaded_at: None,
        }
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// `true` when the file changed since it was last loaded.
    fn changed(&self) -> bool {
        match (self.modified(), self.loaded_at) {
            (Some(now), Some(then)) => now != then,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Table service backed by two YAML files.
///
/// Initial loads read the files; afterwards every poll compares the file
/// modification times and hands out a reloaded table when one changed.
#[derive(Debug)]
pub struct YamlTableService {
    config: SchedulerConfig,
    schedule: WatchedFile,
    messages: WatchedFile,
}

impl YamlTableService {
    pub fn new(
        config: SchedulerConfig,
        schedule_path: impl Into<PathBuf>,
        message_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            schedule: WatchedFile::new(schedule_path.into()),
            messages: WatchedFile::new(message_path.into()),
        }
    }

    fn read_schedule(&mut self) -> Result<Vec<ScheduleEntry>, ServiceError> {
        // A broken file is reported once, not on every poll
        self.schedule.loaded_at = self.schedule.modified();
        load_schedule_file(&self.schedule.path, &self.config).map_err(|e| {
            error!("{e:#}");
            TABLE_LOAD_FAILED
        })
    }

    fn read_messages(&mut self) -> Result<Vec<MessageEntry>, ServiceError> {
        // A broken file is reported once, not on every poll
        self.messages.loaded_at = self.messages.modified();
        load_message_file(&self.messages.path, &self.config).map_err(|e| {
            error!("{e:#}");
            TABLE_LOAD_FAILED
        })
    }
}

impl TableService for YamlTableService {
    fn load_schedule_table(&mut self) -> Result<Vec<ScheduleEntry>, ServiceError> {
        info!("Loading schedule table from: {}", self.schedule.path.display());
        self.read_schedule()
    }

    fn load_message_table(&mut self) -> Result<Vec<MessageEntry>, ServiceError> {
        info!("Loading message table from: {}", self.messages.path.display());
        self.read_messages()
    }

    fn poll_update(&mut self) -> Result<Option<TableUpdate>, ServiceError> {
        if self.schedule.changed() {
            info!("Schedule table file changed: {}", self.schedule.path.display());
            return self.read_schedule().map(|t| Some(TableUpdate::Schedule(t)));
        }
        if self.messages.changed() {
            info!("Message table file changed: {}", self.messages.path.display());
            return self.read_messages().map(|t| Some(TableUpdate::Message(t)));
        }
        Ok(None)
    }

    fn mark_modified(&mut self, table: TableKind) {
        debug!(?table, "active table modified in memory");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const SCHEDULE_YAML: &str = r#"
entries:
  - { slot: 0, entry: 0, frequency: 1, message_index: 1 }
  - slot: 50
    entry: 1
    frequency: 4
    remainder: 2
    message_index: 2
    enable_state: 2
    group_id: 3
    multi_group_mask: 0x000001
"#;

    const MESSAGE_YAML: &str = r#"
messages:
  - { index: 1, message_id: 0x1803, length: 8 }
  - { index: 2, message_id: 0x1804, length: 12, payload: [1, 2, 3] }
"#;

    #[test]
    fn parse_schedule_places_entries_by_coordinates() {
        let cfg = SchedulerConfig::default();
        let table = parse_schedule_table(SCHEDULE_YAML, &cfg).unwrap();
        assert_eq!(table.len(), 500);

        assert_eq!(table[0].state(), Some(EnableState::Enabled));
        assert_eq!(table[0].activity(), Some(ActivityType::SendMessage));
        assert_eq!(table[0].frequency, 1);

        let e = table[50 * 5 + 1];
        assert_eq!(e.state(), Some(EnableState::Disabled));
        assert_eq!(e.remainder, 2);
        assert_eq!(e.group_data, 0x0300_0001);

        assert_eq!(table.iter().filter(|e| e.is_blank()).count(), 498);
    }

    #[test]
    fn schedule_entry_outside_table_is_rejected() {
        let cfg = SchedulerConfig::default();
        let err = parse_schedule_table(
            "entries:\n  - { slot: 100, entry: 0, frequency: 1, message_index: 1 }\n",
            &cfg,
        )
        .unwrap_err();
        assert!(err.to_string().contains("outside table"));
    }

    #[test]
    fn multi_group_mask_wider_than_24_bits_is_rejected() {
        let cfg = SchedulerConfig::default();
        let doc = "entries:\n  - { slot: 2, entry: 0, frequency: 1, message_index: 1, group_id: 1, multi_group_mask: 0x1000000 }\n";
        let err = parse_schedule_table(doc, &cfg).unwrap_err();
        assert!(err.to_string().contains("exceeds 24 bits"));

        let ok = "entries:\n  - { slot: 2, entry: 0, frequency: 1, message_index: 1, group_id: 1, multi_group_mask: 0xFFFFFF }\n";
        let table = parse_schedule_table(ok, &cfg).unwrap();
        assert_eq!(table[2 * 5].group_data, 0x01FF_FFFF);
    }

    #[test]
    fn duplicate_schedule_position_is_rejected() {
        let cfg = SchedulerConfig::default();
        let doc = "entries:\n  - { slot: 1, entry: 0, frequency: 1, message_index: 1 }\n  - { slot: 1, entry: 0, frequency: 2, message_index: 1 }\n";
        assert!(parse_schedule_table(doc, &cfg).is_err());
    }

    #[test]
    fn parse_messages_builds_headers_and_payload() {
        let cfg = SchedulerConfig::default();
        let table = parse_message_table(MESSAGE_YAML, &cfg).unwrap();
        assert_eq!(table.len(), 128);
        assert_eq!(table[0].message_id(), 0);
        assert_eq!(table[1].message_id(), 0x1803);
        assert_eq!(table[1].total_length(), 8);
        assert_eq!(table[2].user_data(), &[1, 2, 3]);
        assert_eq!(table[2].as_message().len(), 6);
    }

    #[test]
    fn oversized_message_is_rejected() {
        let cfg = SchedulerConfig::default();
        let doc = "messages:\n  - { index: 1, message_id: 0x1803, length: 200 }\n";
        let err = parse_message_table(doc, &cfg).unwrap_err();
        assert!(err.to_string().contains("buffers hold 64"));
    }

    #[test]
    fn empty_documents_yield_unused_tables() {
        let cfg = SchedulerConfig::default();
        assert!(parse_schedule_table("", &cfg).unwrap().iter().all(|e| e.is_blank()));
        assert!(parse_message_table("", &cfg)
            .unwrap()
            .iter()
            .all(|m| m.message_id() == 0));
    }

    #[test]
    fn table_service_loads_then_reports_no_change() {
        let sched = yaml_tempfile(SCHEDULE_YAML);
        let msgs = yaml_tempfile(MESSAGE_YAML);
        let mut svc =
            YamlTableService::new(SchedulerConfig::default(), sched.path(), msgs.path());

        assert_eq!(svc.load_schedule_table().unwrap().len(), 500);
        assert_eq!(svc.load_message_table().unwrap().len(), 128);
        assert_eq!(svc.poll_update().unwrap(), None);
    }

    #[test]
    fn table_service_missing_file_is_load_failure() {
        let mut svc = YamlTableService::new(
            SchedulerConfig::default(),
            "/nonexistent/schedule.yaml",
            "/nonexistent/messages.yaml",
        );
        assert_eq!(svc.load_schedule_table(), Err(TABLE_LOAD_FAILED));
        assert_eq!(svc.poll_update(), Ok(None));
    }
}
