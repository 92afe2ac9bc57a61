//! The autopilot cycle state machine.
//!
//! ```text
//! RunCollector ─ok─▶ RunValidator ─ok─▶ Success
//!      │                  │
//!      └──fail──▶ Failure ◀──fail
//!                    │
//!                    ▼
//!              RunSupervisor ─▶ Backoff ─▶ RunCollector (cycle + 1)
//!                                  │
//!                                  └─ max_cycles reached ─▶ Exhausted
//! ```
//!
//! A stage succeeds only on exit code 0. Non-zero exits, spawn errors and
//! timeouts are the same failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::backoff;
use crate::config::{AutopilotConfig, StageConfig};
use crate::obs;
use crate::process::ProcessRunner;
use crate::supervisor::Supervise;

/// States of one autopilot cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    RunCollector,
    RunValidator,
    Success,
    Failure,
    RunSupervisor,
    Backoff,
    Exhausted,
}

impl CycleState {
    pub fn name(&self) -> &'static str {
        match self {
            CycleState::RunCollector => "run_collector",
            CycleState::RunValidator => "run_validator",
            CycleState::Success => "success",
            CycleState::Failure => "failure",
            CycleState::RunSupervisor => "run_supervisor",
            CycleState::Backoff => "backoff",
            CycleState::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleState::Success | CycleState::Exhausted)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    /// Stopped after `retries.max_cycles` failed cycles.
    Exhausted,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    /// Cycles started, including the last one.
    pub cycles: u64,
    pub total_backoff: Duration,
    /// Supervisor passes that reported a change.
    pub fixes_applied: u64,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

#[derive(Debug, Default)]
struct Progress {
    cycle: u64,
    total_backoff: Duration,
    fixes_applied: u64,
}

/// Drives collector, validator, supervisor and back-off until success.
pub struct Orchestrator {
    config: AutopilotConfig,
    runner: Box<dyn ProcessRunner>,
    supervisor: Box<dyn Supervise>,
}

impl Orchestrator {
    pub fn new(
        config: AutopilotConfig,
        runner: Box<dyn ProcessRunner>,
        supervisor: Box<dyn Supervise>,
    ) -> Self {
        Self {
            config,
            runner,
            supervisor,
        }
    }

    pub fn config(&self) -> &AutopilotConfig {
        &self.config
    }

    /// Run cycles until the collector and validator both succeed.
    ///
    /// Without `retries.max_cycles` this only returns on success.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        obs::emit_run_started(&run_id, self.config.retries.max_cycles);

        let mut progress = Progress {
            cycle: 1,
            ..Progress::default()
        };
        let mut state = CycleState::RunCollector;
        obs::cycle_span(&run_id, progress.cycle).in_scope(|| obs::emit_cycle_started(progress.cycle));

        while !state.is_terminal() {
            let cycle = progress.cycle;
            let next = self
                .step(state, &mut progress)
                .instrument(obs::cycle_span(&run_id, cycle))
                .await;
            obs::cycle_span(&run_id, cycle)
                .in_scope(|| obs::emit_transition(cycle, state.name(), next.name()));
            state = next;
        }

        let outcome = match state {
            CycleState::Success => RunOutcome::Succeeded,
            _ => RunOutcome::Exhausted,
        };
        obs::emit_run_finished(&run_id, progress.cycle, outcome == RunOutcome::Succeeded);

        RunReport {
            run_id,
            outcome,
            cycles: progress.cycle,
            total_backoff: progress.total_backoff,
            fixes_applied: progress.fixes_applied,
        }
    }

    async fn step(&self, state: CycleState, progress: &mut Progress) -> CycleState {
        let cycle = progress.cycle;
        match state {
            CycleState::RunCollector => {
                if self.run_stage(cycle, &self.config.collector).await {
                    CycleState::RunValidator
                } else {
                    CycleState::Failure
                }
            }
            CycleState::RunValidator => {
                if self.run_stage(cycle, &self.config.validator).await {
                    CycleState::Success
                } else {
                    CycleState::Failure
                }
            }
            CycleState::Failure => CycleState::RunSupervisor,
            CycleState::RunSupervisor => {
                let changed = self.supervisor.supervise(cycle).await;
                obs::emit_supervisor_finished(cycle, changed);
                if changed {
                    progress.fixes_applied += 1;
                }
                CycleState::Backoff
            }
            CycleState::Backoff => {
                if self
                    .config
                    .retries
                    .max_cycles
                    .is_some_and(|max| cycle >= max)
                {
                    return CycleState::Exhausted;
                }
                let delay = backoff::delay(cycle, &self.config.retries);
                obs::emit_backoff_scheduled(cycle, delay);
                tokio::time::sleep(delay).await;
                progress.total_backoff += delay;
                progress.cycle += 1;
                obs::emit_cycle_started(progress.cycle);
                CycleState::RunCollector
            }
            CycleState::Success | CycleState::Exhausted => state,
        }
    }

    async fn run_stage(&self, cycle: u64, stage: &StageConfig) -> bool {
        match self.runner.run(stage).await {
            Ok(code) => {
                obs::emit_stage_finished(cycle, &stage.name, code);
                code == 0
            }
            Err(e) => {
                obs::emit_stage_error(cycle, &stage.name, &e);
                false
            }
        }
    }
}
