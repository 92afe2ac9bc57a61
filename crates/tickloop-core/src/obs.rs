//! Structured observability hooks for the autopilot loop.
//!
//! This module provides:
//! - Cycle-scoped tracing spans via [`cycle_span`]
//! - Emission functions for every state transition and lifecycle event
//!
//! Events are emitted at `info!` level, failures at `warn!`.
//! Filter with `RUST_LOG`; pass `--json` to the CLI for JSON lines.

use std::time::Duration;

use tracing::{info, warn};

/// Span carrying the run id and cycle number.
///
/// Attach it to async work with [`tracing::Instrument`]:
///
/// ```ignore
/// step(cycle).instrument(cycle_span("run-1234", 3)).await;
/// // every event inside carries run_id and cycle = 3
/// ```
pub fn cycle_span(run_id: &str, cycle: u64) -> tracing::Span {
    tracing::info_span!("tickloop.cycle", run_id = %run_id, cycle = cycle)
}

/// Emit event: autopilot run started.
pub fn emit_run_started(run_id: &str, max_cycles: Option<u64>) {
    match max_cycles {
        Some(max) => info!(event = "run.started", run_id = %run_id, max_cycles = max),
        None => info!(event = "run.started", run_id = %run_id, max_cycles = "unbounded"),
    }
}

/// Emit event: a cycle began.
pub fn emit_cycle_started(cycle: u64) {
    info!(event = "cycle.started", cycle = cycle);
}

/// Emit event: the state machine moved between states.
pub fn emit_transition(cycle: u64, from: &str, to: &str) {
    info!(event = "cycle.transition", cycle = cycle, from = %from, to = %to);
}

/// Emit event: a collaborator stage exited.
pub fn emit_stage_finished(cycle: u64, stage: &str, exit_code: i32) {
    if exit_code == 0 {
        info!(event = "stage.finished", cycle = cycle, stage = %stage, exit_code = exit_code);
    } else {
        warn!(event = "stage.finished", cycle = cycle, stage = %stage, exit_code = exit_code);
    }
}

/// Emit event: a collaborator stage could not be run at all (warning level).
pub fn emit_stage_error(cycle: u64, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "stage.error", cycle = cycle, stage = %stage, error = %error);
}

/// Emit event: a supervisor pass returned.
pub fn emit_supervisor_finished(cycle: u64, changed: bool) {
    info!(event = "supervisor.finished", cycle = cycle, changed = changed);
}

/// Emit event: back-off sleep scheduled.
pub fn emit_backoff_scheduled(cycle: u64, delay: Duration) {
    info!(
        event = "backoff.scheduled",
        cycle = cycle,
        delay_ms = delay.as_millis() as u64,
    );
}

/// Emit event: run ended, either succeeded or out of cycles.
pub fn emit_run_finished(run_id: &str, cycles: u64, succeeded: bool) {
    if succeeded {
        info!(event = "run.finished", run_id = %run_id, cycles = cycles, succeeded = true);
    } else {
        warn!(event = "run.finished", run_id = %run_id, cycles = cycles, succeeded = false);
    }
}
