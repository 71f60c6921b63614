/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Message bus that logs instead of transmitting.

use tracing::{debug, info, warn};

use crate::services::{MessageBus, ServiceError};
use crate::telemetry::TelemetryPacket;

/// Host [`MessageBus`]: every message and packet ends up in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBus;

impl MessageBus for LoggingBus {
    fn send(&self, message: &[u16]) -> Result<(), ServiceError> {
        let message_id = message.first().copied().unwrap_or(0);
        debug!(
            message_id = format_args!("0x{message_id:04X}"),
            words = message.len(),
            "message sent"
        );
        Ok(())
    }

    fn publish(&self, packet: &TelemetryPacket) {
        match serde_yaml::to_string(packet) {
            Ok(text) => info!("telemetry\n{text}"),
            Err(e) => warn!("telemetry packet not serialisable: {e}"),
        }
    }
}
