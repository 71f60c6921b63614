/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! sch-app – minor-frame slot scheduler
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/       – YAML scheduler configuration
//! ├── events        – event ids, severities, binary filters
//! ├── services      – collaborator traits (bus, time, timer, tables, commands)
//! ├── state         – frame sync state shared with the callbacks, counters
//! ├── table/        – schedule / message tables, validation, YAML table files
//! ├── frame_sync/   – tone + minor-frame timer synchronisation
//! ├── scheduler/    – table walk, activity dispatch, ground commands
//! ├── telemetry     – housekeeping and diagnostic packets
//! └── runtime/      – tokio host services and the main loop
//! ```

pub mod config;
pub mod events;
pub mod frame_sync;
pub mod runtime;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod table;
pub mod telemetry;

#[cfg(test)]
mod testing;
