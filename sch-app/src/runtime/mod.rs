/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Host runtime: tokio-backed services and the scheduler main loop.
//!
//! ```text
//! HostTimer ──┐
//!             ├─► FrameSync callbacks ─► NotifyWakeup ─► run() ─► Scheduler::wakeup()
//! HostClock ──┘                                            ▲
//!                          CommandSender ─► ChannelCommandPipe (drained in the sync slot)
//! ```

pub mod bus;
pub mod clock;
pub mod timer;

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::scheduler::commands::Command;
use crate::scheduler::{ProcessError, Scheduler};
use crate::services::{CommandPipe, ServiceError, Wakeup};

pub use bus::LoggingBus;
pub use clock::HostClock;
pub use timer::HostTimer;

/// Status reported once every command sender has been dropped.
pub const PIPE_CLOSED: ServiceError = ServiceError::Code(-3);

// ── Wakeup ────────────────────────────────────────────────────────────────────

/// Binary semaphore between the frame callbacks and the main loop.
///
/// Gives that arrive while the loop is busy collapse into one pending
/// permit.
#[derive(Debug, Default, Clone)]
pub struct NotifyWakeup {
    notify: Arc<Notify>,
}

impl NotifyWakeup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the next give (returns at once if one is pending).
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl Wakeup for NotifyWakeup {
    fn give(&self) {
        self.notify.notify_one();
    }
}

// ── Command channel ───────────────────────────────────────────────────────────

/// Sending half of the command pipe.
pub type CommandSender = mpsc::UnboundedSender<Command>;

/// Receiving half of the command pipe, polled without blocking.
#[derive(Debug)]
pub struct ChannelCommandPipe {
    rx: mpsc::UnboundedReceiver<Command>,
}

/// Creates a connected command sender and pipe.
pub fn command_channel() -> (CommandSender, ChannelCommandPipe) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ChannelCommandPipe { rx })
}

impl CommandPipe for ChannelCommandPipe {
    fn receive(&mut self) -> Result<Option<Command>, ServiceError> {
        match self.rx.try_recv() {
            Ok(cmd) => Ok(Some(cmd)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PIPE_CLOSED),
        }
    }
}

// ── Main loop ─────────────────────────────────────────────────────────────────

/// Runs the scheduler until a wakeup fails or, when `major_frames` is set,
/// until that many table passes have completed.
pub async fn run(
    scheduler: &mut Scheduler,
    wakeup: &NotifyWakeup,
    major_frames: Option<u32>,
) -> Result<(), ProcessError> {
    info!(?major_frames, "entering scheduler main loop");
    loop {
        wakeup.wait().await;

        if let Err(e) = scheduler.wakeup() {
            error!("scheduler main loop stopped: {e}");
            return Err(e);
        }

        let passes = scheduler.cursor().table_pass_count;
        if major_frames.is_some_and(|limit| passes >= limit) {
            debug!(passes, "requested major frames completed");
            return Ok(());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
