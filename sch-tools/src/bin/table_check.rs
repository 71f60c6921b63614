/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! table-check – offline validation of a schedule / message table pair.
//!
//! Applies exactly the checks the scheduler runs before a table becomes
//! active and prints every verification event.  Exit status is 0 when both
//! tables would be accepted, 1 otherwise.
//!
//! ```text
//! table-check --schedule demos/schedule.yaml --messages demos/messages.yaml
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use sch_app::config::SchedulerConfig;
use sch_app::events::{Event, EventReporter, EventSink};
use sch_app::state::Counters;
use sch_app::table::file::{load_message_file, load_schedule_file};
use sch_app::table::validate::{verify_message_table, verify_schedule_table, MessageLimits};
use sch_app::telemetry::DiagnosticTlm;

#[derive(Debug, Parser)]
#[command(
    name = "table-check",
    about = "Validate sch-app table files without running the scheduler",
    long_about = None,
)]
struct Cli {
    /// Scheduler configuration the tables are checked against.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Schedule table to check.
    #[arg(short = 's', long = "schedule")]
    schedule: Option<PathBuf>,

    /// Message table to check.
    #[arg(short = 'm', long = "messages")]
    messages: Option<PathBuf>,

    /// Also print the per-entry enable states (diagnostic packet layout).
    #[arg(long = "states", default_value_t = false)]
    states: bool,
}

/// Prints every event on stdout.
struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: &Event) {
        println!(
            "[{:>3}] {:<8} {}",
            event.id.code(),
            event.severity,
            event.text
        );
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match check(&cli) {
        Ok(true) => info!("tables accepted"),
        Ok(false) => {
            warn!("tables rejected");
            process::exit(1);
        }
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}

/// Returns whether every given table passed.
fn check(cli: &Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => SchedulerConfig::load_from_file(path)?,
        None => SchedulerConfig::default(),
    };

    let events = EventReporter::unfiltered(Arc::new(StdoutSink));
    let mut counters = Counters::default();
    let mut schedule = None;
    let mut messages = None;

    if let Some(path) = &cli.schedule {
        let table = load_schedule_file(path, &config)?;
        let verdict = verify_schedule_table(&table, config.max_messages, &events, &mut counters);
        println!(
            "schedule: {} entries, good {} / bad {} / unused {}",
            verdict.summary.total(),
            verdict.summary.good,
            verdict.summary.bad,
            verdict.summary.unused
        );
        schedule = Some(table);
    }

    if let Some(path) = &cli.messages {
        let table = load_message_file(path, &config)?;
        let limits = MessageLimits::from(&config);
        let verdict = verify_message_table(&table, &limits, &events, &mut counters);
        println!(
            "messages: {} entries, good {} / bad {} / unused {}",
            verdict.summary.total(),
            verdict.summary.good,
            verdict.summary.bad,
            verdict.summary.unused
        );
        messages = Some(table);
    }

    if cli.states {
        if let Some(schedule) = &schedule {
            let diag = DiagnosticTlm::capture(schedule, messages.as_deref().unwrap_or(&[]));
            let per_slot = usize::from(config.entries_per_slot).max(1);
            for slot in 0..schedule.len() / per_slot {
                let states: String = (slot * per_slot..(slot + 1) * per_slot)
                    .map(|i| match diag.entry_state(i) {
                        1 => 'E',
                        2 => 'd',
                        _ => '.',
                    })
                    .collect();
                println!("slot {slot:>4}: {states}");
            }
        }
    }

    Ok(counters.table_verify_failure_count == 0)
}
