//! Supervisor: one audit-and-heal pass per failed cycle.
//!
//! A pass:
//! 1. audits the collector's endpoint override variable
//! 2. rewrites the collector source when the override is set but empty
//! 3. optionally collects documentation references from a search probe
//! 4. publishes an applied fix, then appends a heartbeat
//!
//! A pass never fails. Every internal error is logged and recorded in the
//! [`SupervisorReport`], and control returns to the orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tickloop_probe::{collect_references, SearchProbe, SerperClient, SerperConfig};
use tracing::{info, warn};

use crate::config::{AutopilotConfig, ProbeConfig, StageConfig};
use crate::env::{EnvPresence, EnvSnapshot};
use crate::git::{CommitResult, GitClient};
use crate::heartbeat::append_heartbeat;
use crate::patch::{PatchOperation, PatchOutcome};
use crate::process::ProcessRunner;

/// Exit code of `tickloop supervise` when the pass applied no fix.
pub const NO_FIX_EXIT_CODE: i32 = 2;

/// Anything the orchestrator can hand a failed cycle to.
#[async_trait]
pub trait Supervise: Send + Sync {
    /// Run one pass for `cycle`; returns whether a fix was applied.
    async fn supervise(&self, cycle: u64) -> bool;
}

/// Audit result for the endpoint override variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFinding {
    /// Unset; the collector's own default applies.
    Unset,
    /// Set to a real value by the operator.
    Configured,
    /// Set but empty, shadowing the collector's default.
    EmptyOverride,
}

/// Everything one pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorReport {
    pub cycle: u64,
    pub audit: AuditFinding,
    pub patch: Option<PatchOutcome>,
    pub references: usize,
    pub publish: Option<CommitResult>,
    pub heartbeat_written: bool,
    pub errors: Vec<String>,
}

impl SupervisorReport {
    pub fn changed(&self) -> bool {
        self.patch.as_ref().is_some_and(PatchOutcome::changed)
    }
}

/// In-process supervisor.
pub struct Supervisor {
    workdir: PathBuf,
    heartbeat_path: PathBuf,
    commit_message: String,
    patch: PatchOperation,
    env: EnvSnapshot,
    git: GitClient,
    probe_config: ProbeConfig,
    probe: Option<Box<dyn SearchProbe>>,
}

impl Supervisor {
    /// Build a supervisor from configuration and an environment snapshot.
    ///
    /// A Serper probe is attached when probing is enabled and its API key is set.
    pub fn from_config(config: &AutopilotConfig, env: EnvSnapshot) -> Self {
        let sup = &config.supervisor;
        let git = GitClient::from_config(&sup.workdir, &config.publish, &env);
        let probe = build_serper_probe(&config.probe, &env);

        Self {
            workdir: sup.workdir.clone(),
            heartbeat_path: sup.heartbeat_path.clone(),
            commit_message: sup.commit_message.clone(),
            patch: PatchOperation::from_config(&sup.patch),
            env,
            git,
            probe_config: config.probe.clone(),
            probe,
        }
    }

    /// Replace the search probe.
    pub fn with_probe(mut self, probe: Box<dyn SearchProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Audit the endpoint override variable.
    pub fn audit(&self) -> AuditFinding {
        let var = &self.patch.env_var;
        match self.env.presence(var) {
            EnvPresence::Unset => {
                info!(var = %var, "override not set; collector default applies");
                AuditFinding::Unset
            }
            EnvPresence::Set(_) => {
                info!(var = %var, "override is non-empty; no patch needed");
                AuditFinding::Configured
            }
            EnvPresence::Blank => {
                warn!(var = %var, "override is set but empty; collector default is shadowed");
                AuditFinding::EmptyOverride
            }
        }
    }

    /// Run one full pass and report what happened.
    pub async fn run_pass(&self, cycle: u64) -> SupervisorReport {
        info!(cycle, "supervisor audit start");
        let mut errors = Vec::new();

        let audit = self.audit();
        let patch = if audit == AuditFinding::EmptyOverride {
            match self.patch.apply(&self.workdir) {
                Ok(outcome) => {
                    match &outcome {
                        PatchOutcome::Applied { .. } => {}
                        PatchOutcome::AlreadyApplied => info!("safe fallback already present"),
                        PatchOutcome::PatternNotFound => info!("pattern not found; no changes made"),
                        PatchOutcome::TargetMissing { path } => {
                            info!(path = %path.display(), "patch target not found; skipping")
                        }
                    }
                    Some(outcome)
                }
                Err(e) => {
                    warn!(error = %e, "patch failed");
                    errors.push(format!("patch: {e}"));
                    None
                }
            }
        } else {
            None
        };

        let references = self.probe_references().await;

        let changed = patch.as_ref().is_some_and(PatchOutcome::changed);
        let publish = if changed {
            let result = self.git.commit_and_push_if_changed(&self.commit_message);
            match &result {
                CommitResult::Pushed { .. } => info!("supervisor pushed a fix"),
                CommitResult::PushFailed { reason, .. } => {
                    warn!(%reason, "supervisor had changes but could not push")
                }
                CommitResult::NoChanges => info!("patch left no diff to commit"),
            }
            Some(result)
        } else {
            info!("supervisor audit completed; no fix required");
            None
        };

        let heartbeat = self.workdir.join(&self.heartbeat_path);
        let heartbeat_written = match append_heartbeat(&heartbeat, cycle, changed) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, path = %heartbeat.display(), "heartbeat write failed");
                errors.push(format!("heartbeat: {e}"));
                false
            }
        };

        info!(cycle, changed, "supervisor pass done");
        SupervisorReport {
            cycle,
            audit,
            patch,
            references,
            publish,
            heartbeat_written,
            errors,
        }
    }

    async fn probe_references(&self) -> usize {
        if !self.probe_config.enabled {
            return 0;
        }
        let Some(probe) = &self.probe else {
            info!(var = %self.probe_config.api_key_env, "no search key; skipping search");
            return 0;
        };

        let hits = collect_references(
            probe.as_ref(),
            &self.probe_config.queries,
            self.probe_config.max_results,
            Duration::from_millis(self.probe_config.interval_ms),
        )
        .await;
        info!(total = hits.len(), "references collected");
        hits.len()
    }
}

#[async_trait]
impl Supervise for Supervisor {
    async fn supervise(&self, cycle: u64) -> bool {
        self.run_pass(cycle).await.changed()
    }
}

fn build_serper_probe(config: &ProbeConfig, env: &EnvSnapshot) -> Option<Box<dyn SearchProbe>> {
    if !config.enabled {
        return None;
    }
    let key = env.non_empty(&config.api_key_env)?;
    let serper = SerperConfig {
        endpoint: config.endpoint.clone(),
        timeout: Duration::from_secs(config.timeout_secs),
    };
    match SerperClient::new(key, serper) {
        Ok(client) => Some(Box::new(client)),
        Err(e) => {
            warn!(error = %e, "search probe unavailable");
            None
        }
    }
}

/// Supervisor run as a separate process: `command --cycle N`.
///
/// Exit code 0 means a fix was applied; anything else, including a spawn
/// failure, counts as no fix.
pub struct SubprocessSupervisor<R> {
    runner: R,
    stage: StageConfig,
}

impl<R: ProcessRunner> SubprocessSupervisor<R> {
    pub fn new(runner: R, command: Vec<String>) -> Self {
        Self {
            runner,
            stage: StageConfig::custom("supervisor", command, 0),
        }
    }
}

#[async_trait]
impl<R: ProcessRunner> Supervise for SubprocessSupervisor<R> {
    async fn supervise(&self, cycle: u64) -> bool {
        let stage = self.stage.with_args(["--cycle".to_string(), cycle.to_string()]);
        match self.runner.run(&stage).await {
            Ok(0) => true,
            Ok(code) => {
                info!(cycle, exit_code = code, "supervisor had no fix this round");
                false
            }
            Err(e) => {
                warn!(cycle, error = %e, "supervisor process failed");
                false
            }
        }
    }
}
