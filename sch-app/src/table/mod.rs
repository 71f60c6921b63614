/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Schedule and message table data structures.
//!
//! Two tables drive the scheduler:
//!
//! ```text
//! Schedule Definition Table (SDT)          Message Definition Table (MDT)
//!   slot 0: entry 0 .. entry N-1   ──msg index──►  message 0 .. message M-1
//!   slot 1: ...
//! ```
//!
//! # Raw fields, typed views
//! Table entries keep their raw integer fields so that a corrupted value
//! (an enable state of `7`, an unknown activity type) can still be *held*,
//! reported and rejected.  The rest of the crate reads them through typed
//! views ([`EnableState`], [`ActivityType`], [`GroupData`]); the conversion
//! back to raw integers only happens at the table boundary.

pub mod file;
pub mod validate;

use serde::{Deserialize, Serialize};

/// Sentinel value of every schedule entry field when the entry is unused.
pub const UNUSED: u32 = 0;

/// Group id part of the packed `group_data` word.
pub const GROUP_NUMBER_BIT_MASK: u32 = 0xFF00_0000;

/// Multi-group membership part of the packed `group_data` word.
pub const MULTI_GROUP_BIT_MASK: u32 = 0x00FF_FFFF;

/// Words in a message's primary header (stream id, sequence, length).
pub const PRIMARY_HEADER_WORDS: usize = 3;

// ── Enable state ──────────────────────────────────────────────────────────────

/// Lifecycle state of a schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableState {
    /// The slot position holds no activity.
    Unused,
    /// The activity fires whenever its frequency/remainder match.
    Enabled,
    /// The activity is defined but currently suppressed.
    Disabled,
}

impl EnableState {
    /// Parse the raw table value.  Unknown values (table corruption) yield
    /// `None`.
    pub fn from_raw(v: u8) -> Option<Self> {
        match v {
            0 => Some(EnableState::Unused),
            1 => Some(EnableState::Enabled),
            2 => Some(EnableState::Disabled),
            _ => None,
        }
    }

    /// Convert to the raw table value.
    pub fn to_raw(self) -> u8 {
        match self {
            EnableState::Unused => 0,
            EnableState::Enabled => 1,
            EnableState::Disabled => 2,
        }
    }
}

// ── Activity type ─────────────────────────────────────────────────────────────

/// What an entry does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    None,
    /// Send the referenced message-table entry on the message bus.
    SendMessage,
}

impl ActivityType {
    /// Parse the raw table value.  Unknown values yield `None`.
    pub fn from_raw(v: u8) -> Option<Self> {
        match v {
            0 => Some(ActivityType::None),
            1 => Some(ActivityType::SendMessage),
            _ => None,
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            ActivityType::None => 0,
            ActivityType::SendMessage => 1,
        }
    }
}

// ── Group data ────────────────────────────────────────────────────────────────

/// Decoded form of the packed `group_data` word.
///
/// On the wire the top 8 bits carry a single group id (0 = none) and the low
/// 24 bits a multi-group membership bitmask.  Inside the scheduler the two
/// halves are always handled separately so one can never be masked with the
/// other's bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupData {
    pub group_id: u8,
    /// Only the low 24 bits are meaningful.
    pub multi_group_mask: u32,
}

impl GroupData {
    pub fn decode(raw: u32) -> Self {
        Self {
            group_id: ((raw & GROUP_NUMBER_BIT_MASK) >> 24) as u8,
            multi_group_mask: raw & MULTI_GROUP_BIT_MASK,
        }
    }

    pub fn encode(self) -> u32 {
        (u32::from(self.group_id) << 24) | (self.multi_group_mask & MULTI_GROUP_BIT_MASK)
    }

    /// `true` when neither a group id nor any multi-group bit is selected.
    pub fn is_empty(self) -> bool {
        self.group_id == 0 && self.multi_group_mask & MULTI_GROUP_BIT_MASK == 0
    }

    /// Whether an entry tagged with `other` belongs to the selection `self`:
    /// same non-zero group id, or at least one shared multi-group bit.
    pub fn selects(self, other: GroupData) -> bool {
        (self.group_id != 0 && self.group_id == other.group_id)
            || (self.multi_group_mask & other.multi_group_mask & MULTI_GROUP_BIT_MASK) != 0
    }
}

// ── Table coordinates ─────────────────────────────────────────────────────────

/// Position of one entry in the schedule table, validated against the
/// table geometry before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    pub slot: u16,
    pub entry: u16,
}

impl EntryRef {
    /// Flat index into the schedule table, or `None` if either coordinate is
    /// outside the table.
    pub fn index(self, total_slots: u16, entries_per_slot: u16) -> Option<usize> {
        if self.slot >= total_slots || self.entry >= entries_per_slot {
            return None;
        }
        Some(usize::from(self.slot) * usize::from(entries_per_slot) + usize::from(self.entry))
    }
}

// ── ScheduleEntry ─────────────────────────────────────────────────────────────

/// One schedule table position (slot × entry).
///
/// An unused entry has every field at [`UNUSED`]; a used entry must carry a
/// send-message activity, a non-zero frequency, `remainder < frequency` and
/// a message index inside the message table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleEntry {
    pub enable_state: u8,
    pub activity_type: u8,
    /// Period, in table passes, at which the activity fires.
    pub frequency: u16,
    /// Phase offset used to stagger same-frequency activities.
    pub remainder: u16,
    pub message_index: u16,
    /// Packed group word, see [`GroupData`].
    pub group_data: u32,
}

impl ScheduleEntry {
    /// An entry in the unused state.
    pub fn unused() -> Self {
        Self::default()
    }

    /// A send-message entry in the given state.
    pub fn send_message(
        state: EnableState,
        frequency: u16,
        remainder: u16,
        message_index: u16,
        group: GroupData,
    ) -> Self {
        Self {
            enable_state: state.to_raw(),
            activity_type: ActivityType::SendMessage.to_raw(),
            frequency,
            remainder,
            message_index,
            group_data: group.encode(),
        }
    }

    pub fn state(&self) -> Option<EnableState> {
        EnableState::from_raw(self.enable_state)
    }

    pub fn set_state(&mut self, state: EnableState) {
        self.enable_state = state.to_raw();
    }

    pub fn activity(&self) -> Option<ActivityType> {
        ActivityType::from_raw(self.activity_type)
    }

    pub fn group(&self) -> GroupData {
        GroupData::decode(self.group_data)
    }

    /// `true` when every field holds the unused sentinel.
    pub fn is_blank(&self) -> bool {
        *self == Self::unused()
    }
}

// ── MessageEntry ──────────────────────────────────────────────────────────────

/// One pre-built message of the message definition table.
///
/// The buffer holds 16-bit words starting with a primary header:
///
/// | word | contents |
/// |---|---|
/// | 0 | message id (stream id) |
/// | 1 | sequence flags / count |
/// | 2 | length field = total bytes − 7 |
///
/// followed by the user data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageEntry {
    pub words: Vec<u16>,
}

impl MessageEntry {
    /// An unused entry (all-zero buffer of `words` words).
    pub fn unused(words: usize) -> Self {
        Self {
            words: vec![0; words.max(PRIMARY_HEADER_WORDS)],
        }
    }

    /// A message with the given id whose total length is `total_bytes`.
    ///
    /// The buffer is sized to hold the whole message (rounded up to words);
    /// payload words are zero.
    pub fn with_length(message_id: u16, total_bytes: u16) -> Self {
        let word_count = usize::from(total_bytes).div_ceil(2).max(PRIMARY_HEADER_WORDS);
        let mut words = vec![0u16; word_count];
        words[0] = message_id;
        words[1] = 0xC000;
        words[2] = total_bytes.wrapping_sub(7);
        Self { words }
    }

    pub fn message_id(&self) -> u16 {
        self.words.first().copied().unwrap_or(0)
    }

    /// Total message length in bytes, as declared by the header.
    ///
    /// The length field is a 16-bit quantity, so the sum wraps the same way
    /// the header encoding does.
    pub fn total_length(&self) -> u16 {
        self.words.get(2).copied().unwrap_or(0).wrapping_add(7)
    }

    /// Words after the primary header.
    pub fn user_data(&self) -> &[u16] {
        self.words.get(PRIMARY_HEADER_WORDS..).unwrap_or(&[])
    }

    /// The part of the buffer covered by the declared length.
    pub fn as_message(&self) -> &[u16] {
        let declared = usize::from(self.total_length()).div_ceil(2);
        &self.words[..declared.min(self.words.len())]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_state_round_trips_known_values() {
        for state in [EnableState::Unused, EnableState::Enabled, EnableState::Disabled] {
            assert_eq!(EnableState::from_raw(state.to_raw()), Some(state));
        }
        assert_eq!(EnableState::from_raw(3), None);
    }

    #[test]
    fn unknown_activity_type_is_none() {
        assert_eq!(ActivityType::from_raw(1), Some(ActivityType::SendMessage));
        assert_eq!(ActivityType::from_raw(9), None);
    }

    #[test]
    fn group_data_splits_id_and_mask() {
        let g = GroupData::decode(0x0300_0005);
        assert_eq!(g.group_id, 3);
        assert_eq!(g.multi_group_mask, 0x05);
        assert_eq!(g.encode(), 0x0300_0005);
    }

    #[test]
    fn group_encode_drops_bits_above_24() {
        let g = GroupData {
            group_id: 1,
            multi_group_mask: 0xFF00_0001,
        };
        assert_eq!(g.encode(), 0x0100_0001);
    }

    #[test]
    fn group_selection_matches_id_or_mask_overlap() {
        let entry = GroupData::decode(0x0200_0006);
        assert!(GroupData::decode(0x0200_0000).selects(entry));
        assert!(GroupData::decode(0x0000_0002).selects(entry));
        assert!(!GroupData::decode(0x0100_0001).selects(entry));
        // group id 0 never matches by id
        assert!(!GroupData::decode(0).selects(GroupData::decode(0)));
    }

    #[test]
    fn entry_ref_index_checks_bounds() {
        assert_eq!(EntryRef { slot: 2, entry: 3 }.index(100, 5), Some(13));
        assert_eq!(EntryRef { slot: 100, entry: 0 }.index(100, 5), None);
        assert_eq!(EntryRef { slot: 0, entry: 5 }.index(100, 5), None);
    }

    #[test]
    fn message_header_fields() {
        let m = MessageEntry::with_length(0x1803, 8);
        assert_eq!(m.message_id(), 0x1803);
        assert_eq!(m.total_length(), 8);
        assert_eq!(m.words.len(), 4);
        assert_eq!(m.as_message().len(), 4);
        assert_eq!(m.user_data(), &[0]);
    }

    #[test]
    fn short_length_wraps_through_the_header_field() {
        let m = MessageEntry::with_length(0x1FFF, 6);
        assert_eq!(m.words[2], 0xFFFF);
        assert_eq!(m.total_length(), 6);
    }

    #[test]
    fn blank_entry_is_unused() {
        let e = ScheduleEntry::unused();
        assert!(e.is_blank());
        assert_eq!(e.state(), Some(EnableState::Unused));
        let used = ScheduleEntry::send_message(EnableState::Enabled, 1, 0, 1, GroupData::default());
        assert!(!used.is_blank());
    }
}
