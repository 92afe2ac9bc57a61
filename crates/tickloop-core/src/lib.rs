//! TickLoop Core Library
//!
//! The autopilot loop and the pieces it composes: back-off, subprocess
//! stages, the source patch, git publishing and the supervisor pass.

pub mod backoff;
pub mod config;
pub mod env;
pub mod error;
pub mod git;
pub mod heartbeat;
pub mod obs;
pub mod orchestrator;
pub mod patch;
pub mod process;
pub mod supervisor;
pub mod telemetry;

pub use config::{
    validate, AutopilotConfig, ConfigError, PatchConfig, ProbeConfig, PublishConfig, RetryConfig,
    StageConfig, SupervisorConfig, SupervisorMode, DEFAULT_CONFIG_PATH,
};
pub use env::{EnvPresence, EnvSnapshot};
pub use error::{Result, TickloopError};
pub use git::{capture_head_sha, is_git_repo, CommitResult, GitClient, PublishFailure, PushCredentials};
pub use heartbeat::{append_heartbeat, format_heartbeat};
pub use orchestrator::{CycleState, Orchestrator, RunOutcome, RunReport};
pub use patch::{content_digest, PatchOperation, PatchOutcome, PatchState};
pub use process::{CommandRunner, ProcessRunner};
pub use supervisor::{
    AuditFinding, SubprocessSupervisor, Supervise, Supervisor, SupervisorReport, NO_FIX_EXIT_CODE,
};
pub use telemetry::init_tracing;

/// TickLoop version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
