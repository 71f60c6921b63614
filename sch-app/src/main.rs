/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use sch_app::config::SchedulerConfig;
use sch_app::events::TracingEventSink;
use sch_app::runtime::{self, HostClock, HostTimer, LoggingBus, NotifyWakeup};
use sch_app::scheduler::commands::Command;
use sch_app::scheduler::{Scheduler, Services};
use sch_app::table::file::YamlTableService;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Minor-frame slot scheduler (host build).
///
/// Example:
///   sch-app --config demos/sch_config.yaml \
///           --schedule demos/schedule.yaml --messages demos/messages.yaml
#[derive(Debug, Parser)]
#[command(
    name = "sch-app",
    about = "Minor-frame slot scheduler – host build",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML scheduler configuration (defaults apply when omitted).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to the YAML schedule table.
    #[arg(short = 's', long = "schedule")]
    schedule: PathBuf,

    /// Path to the YAML message table.
    #[arg(short = 'm', long = "messages")]
    messages: PathBuf,

    /// Stop after this many major frames (runs until Ctrl-C when omitted).
    #[arg(short = 'n', long = "major-frames")]
    major_frames: Option<u32>,

    /// Do not simulate the major-frame tone; the scheduler falls back to MET.
    #[arg(long = "no-tone", default_value_t = false)]
    no_tone: bool,

    /// Accuracy reported by the host minor-frame timer, in microseconds.
    #[arg(long = "timer-accuracy", default_value_t = 0)]
    timer_accuracy: u32,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(
        config       = ?cli.config,
        schedule     = %cli.schedule.display(),
        messages     = %cli.messages.display(),
        major_frames = ?cli.major_frames,
        no_tone      = cli.no_tone,
        "Configuration"
    );

    // ── Load scheduler configuration ──────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => match SchedulerConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load scheduler configuration: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("No configuration file provided, using default scheduler settings");
            SchedulerConfig::default()
        }
    };

    if let Err(e) = serve(&cli, config).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

/// Builds the host services, runs the scheduler and shuts it down.
async fn serve(cli: &Cli, config: SchedulerConfig) -> Result<()> {
    let handle = Handle::current();
    let major_frame = Duration::from_micros(u64::from(config.micros_per_major_frame));

    let clock = Arc::new(HostClock::new(major_frame));
    let wakeup = NotifyWakeup::new();
    let (commands, pipe) = runtime::command_channel();

    let services = Services {
        bus: Arc::new(LoggingBus),
        tables: Box::new(YamlTableService::new(
            config.clone(),
            &cli.schedule,
            &cli.messages,
        )),
        time: clock.clone(),
        timer: Arc::new(HostTimer::new(handle.clone(), cli.timer_accuracy)),
        events: Arc::new(TracingEventSink),
        commands: Box::new(pipe),
        wakeup: Arc::new(wakeup.clone()),
    };

    let mut scheduler =
        Scheduler::init(config, services).context("Scheduler initialisation failed")?;
    scheduler.start().context("Scheduler start-up failed")?;

    let tone = (!cli.no_tone).then(|| clock.spawn_tone(&handle));

    // Housekeeping request once per major frame
    let housekeeping = {
        let commands = commands.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(major_frame);
            loop {
                ticks.tick().await;
                if commands.send(Command::Housekeeping).is_err() {
                    break;
                }
            }
        })
    };

    let outcome = tokio::select! {
        r = runtime::run(&mut scheduler, &wakeup, cli.major_frames) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    housekeeping.abort();
    if let Some(tone) = tone {
        tone.abort();
    }
    drop(commands);

    let status = match &outcome {
        Ok(()) => 0,
        Err(e) => e.status(),
    };
    scheduler.shutdown(status);

    let counters = scheduler.counters();
    info!(
        slots      = counters.slots_processed_count,
        activities = counters.activity_success_count,
        failures   = counters.activity_failure_count,
        skipped    = counters.skipped_slots_count,
        "Scheduler stopped"
    );

    outcome.context("Scheduler main loop failed")
}
