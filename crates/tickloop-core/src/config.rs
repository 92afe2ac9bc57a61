//! Autopilot configuration: schema, loading and validation.
//!
//! The configuration is read once at start-up from a YAML document and then
//! passed around by reference. Every field has a default, so a file holding
//! only `retries:` is enough:
//!
//! ```yaml
//! retries:
//!   base_seconds: 5
//!   max_seconds: 60
//!   jitter: true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Config path used when the CLI is not given one.
pub const DEFAULT_CONFIG_PATH: &str = ".tickloop/config/autopilot.yaml";

/// Errors arising from configuration I/O, parsing or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        field: String,
        value: String,
        reason: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("could not render configuration: {0}")]
    Render(#[source] serde_yaml::Error),
}

/// Complete autopilot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    pub retries: RetryConfig,
    pub collector: StageConfig,
    pub validator: StageConfig,
    pub supervisor: SupervisorConfig,
    pub publish: PublishConfig,
    pub probe: ProbeConfig,
}

/// Back-off parameters between failed cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay after the first failed cycle, in seconds.
    pub base_seconds: f64,
    /// Upper bound on the un-jittered delay, in seconds.
    pub max_seconds: f64,
    /// Scale each delay by a random factor in `[0.7, 1.3]`.
    pub jitter: bool,
    /// Stop after this many failed cycles. `None` retries forever.
    pub max_cycles: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_seconds: 5.0,
            max_seconds: 60.0,
            jitter: true,
            max_cycles: None,
        }
    }
}

/// An external collaborator invoked through its exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Human-readable stage name.
    pub name: String,
    /// Command to execute (first element is the executable).
    pub command: Vec<String>,
    /// Timeout in seconds; 0 waits indefinitely.
    pub timeout_secs: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::custom(String::new(), Vec::new(), 0)
    }
}

impl StageConfig {
    /// Create a stage from an explicit argv.
    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            timeout_secs,
        }
    }

    /// Default collector: the collector runner script.
    pub fn collector() -> Self {
        Self::custom(
            "collector",
            vec![
                "python3".to_string(),
                ".tickloop/scripts/run_collectors.py".to_string(),
            ],
            0,
        )
    }

    /// Default validator: the data validation script.
    pub fn validator() -> Self {
        Self::custom(
            "validator",
            vec!["python3".to_string(), ".tickloop/scripts/validate.py".to_string()],
            0,
        )
    }

    /// The same stage with extra trailing arguments.
    pub fn with_args<I, S>(&self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut stage = self.clone();
        stage.command.extend(args.into_iter().map(Into::into));
        stage
    }
}

/// Where the supervisor pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorMode {
    /// Run the pass inside the orchestrator process.
    #[default]
    InProcess,
    /// Spawn `supervisor.command --cycle N` and read its exit code.
    Subprocess,
}

/// Supervisor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub mode: SupervisorMode,
    /// Command used in subprocess mode; `--cycle N` is appended.
    pub command: Vec<String>,
    /// Working tree the supervisor audits and publishes from.
    pub workdir: PathBuf,
    /// Append-only heartbeat file, relative to `workdir`.
    pub heartbeat_path: PathBuf,
    /// Commit message for a published fix.
    pub commit_message: String,
    pub patch: PatchConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            mode: SupervisorMode::InProcess,
            command: vec!["tickloop".to_string(), "supervise".to_string()],
            workdir: PathBuf::from("."),
            heartbeat_path: PathBuf::from(".tickloop/heartbeat.log"),
            commit_message: "supervisor: auto-fix polymarket URL fallback + web recon".to_string(),
            patch: PatchConfig::default(),
        }
    }
}

/// The one repairable misconfiguration: an empty endpoint override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Collector source to rewrite, relative to the supervisor workdir.
    pub target: PathBuf,
    /// Endpoint override variable read by the collector.
    pub env_var: String,
    /// Function the collector calls to read the variable.
    pub accessor: String,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            target: PathBuf::from(".tickloop/collectors/polymarket_markets.py"),
            env_var: "POLYMARKET_MARKETS_URL".to_string(),
            accessor: "os.getenv".to_string(),
        }
    }
}

/// Remote publishing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub remote_host: String,
    pub branch: String,
    /// Variable holding the push token.
    pub token_env: String,
    /// Variable holding `owner/name` of the remote repository.
    pub repository_env: String,
    pub bot_name: String,
    pub bot_email: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            remote_host: "github.com".to_string(),
            branch: "main".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            repository_env: "GITHUB_REPOSITORY".to_string(),
            bot_name: "tickloop-autopilot".to_string(),
            bot_email: "tickloop-autopilot@users.noreply.github.com".to_string(),
        }
    }
}

/// Documentation probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,
    pub api_key_env: String,
    pub endpoint: String,
    pub queries: Vec<String>,
    pub max_results: usize,
    /// Pause between queries, in milliseconds.
    pub interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: "SERPER_API_KEY".to_string(),
            endpoint: tickloop_probe::search::SERPER_ENDPOINT.to_string(),
            queries: vec![
                "Polymarket CLOB markets API endpoint".to_string(),
                "Polymarket markets API docs clob.polymarket.com".to_string(),
                "Polymarket API rate limits markets endpoint".to_string(),
            ],
            max_results: 3,
            interval_ms: 1000,
            timeout_secs: 25,
        }
    }
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            retries: RetryConfig::default(),
            collector: StageConfig::collector(),
            validator: StageConfig::validator(),
            supervisor: SupervisorConfig::default(),
            publish: PublishConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl AutopilotConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            file: path.display().to_string(),
            source: e,
        })?;

        Self::from_yaml(&content, &path.display().to_string())
    }

    /// Parse and validate a YAML document.
    ///
    /// A `collector`/`validator` section without a name or command falls back
    /// to the default script for that part.
    pub fn from_yaml(content: &str, source_name: &str) -> Result<Self, ConfigError> {
        let mut config: AutopilotConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                file: source_name.to_string(),
                source: e,
            })?;

        fill_stage_defaults(&mut config.collector, StageConfig::collector());
        fill_stage_defaults(&mut config.validator, StageConfig::validator());

        validate(&config).map_err(|errors| {
            ConfigError::Validation(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        })?;

        Ok(config)
    }

    /// Render the resolved configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(ConfigError::Render)
    }
}

fn fill_stage_defaults(stage: &mut StageConfig, fallback: StageConfig) {
    if stage.name.is_empty() {
        stage.name = fallback.name;
    }
    if stage.command.is_empty() {
        stage.command = fallback.command;
    }
}

/// Check every semantic constraint, collecting all violations.
pub fn validate(config: &AutopilotConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let retries = &config.retries;

    if !(retries.base_seconds.is_finite() && retries.base_seconds > 0.0) {
        errors.push(ConfigError::InvalidField {
            field: "retries.base_seconds".into(),
            value: retries.base_seconds.to_string(),
            reason: "must be a positive number".into(),
        });
    }

    if !(retries.max_seconds.is_finite() && retries.max_seconds > 0.0) {
        errors.push(ConfigError::InvalidField {
            field: "retries.max_seconds".into(),
            value: retries.max_seconds.to_string(),
            reason: "must be a positive number".into(),
        });
    } else if retries.max_seconds < retries.base_seconds {
        errors.push(ConfigError::InvalidField {
            field: "retries.max_seconds".into(),
            value: retries.max_seconds.to_string(),
            reason: "must be \u{2265} retries.base_seconds".into(),
        });
    }

    if retries.max_cycles == Some(0) {
        errors.push(ConfigError::InvalidField {
            field: "retries.max_cycles".into(),
            value: "0".into(),
            reason: "must be at least 1 when set".into(),
        });
    }

    for (field, stage) in [("collector", &config.collector), ("validator", &config.validator)] {
        if stage.command.is_empty() || stage.command[0].trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("{field}.command"),
                value: format!("{:?}", stage.command),
                reason: "must name an executable".into(),
            });
        }
    }

    if config.supervisor.mode == SupervisorMode::Subprocess && config.supervisor.command.is_empty()
    {
        errors.push(ConfigError::InvalidField {
            field: "supervisor.command".into(),
            value: "[]".into(),
            reason: "required in subprocess mode".into(),
        });
    }

    if config.supervisor.patch.env_var.trim().is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "supervisor.patch.env_var".into(),
            value: "\"\"".into(),
            reason: "must not be empty".into(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_YAML: &str = r#"
retries:
  base_seconds: 2
  max_seconds: 30
  jitter: false
  max_cycles: 10
collector:
  name: markets
  command: ["python3", "collect.py"]
  timeout_secs: 120
validator:
  command: ["python3", "validate.py"]
supervisor:
  mode: subprocess
  command: ["tickloop", "supervise"]
publish:
  branch: trunk
probe:
  enabled: false
"#;

    #[test]
    fn test_retries_only_document_uses_defaults_elsewhere() {
        let yaml = "retries:\n  base_seconds: 5\n  max_seconds: 60\n  jitter: true\n";
        let config = AutopilotConfig::from_yaml(yaml, "inline").unwrap();
        assert_eq!(config.retries, RetryConfig::default());
        assert_eq!(config.collector, StageConfig::collector());
        assert_eq!(config.validator, StageConfig::validator());
        assert_eq!(config.supervisor.mode, SupervisorMode::InProcess);
        assert_eq!(config.publish.token_env, "GITHUB_TOKEN");
    }

    #[test]
    fn test_partial_retries_fill_defaults() {
        let config = AutopilotConfig::from_yaml("retries:\n  jitter: false\n", "inline").unwrap();
        assert_eq!(config.retries.base_seconds, 5.0);
        assert_eq!(config.retries.max_seconds, 60.0);
        assert!(!config.retries.jitter);
        assert_eq!(config.retries.max_cycles, None);
    }

    #[test]
    fn test_full_document_parses() {
        let config = AutopilotConfig::from_yaml(FULL_YAML, "inline").unwrap();
        assert_eq!(config.retries.base_seconds, 2.0);
        assert_eq!(config.retries.max_cycles, Some(10));
        assert_eq!(config.collector.name, "markets");
        assert_eq!(config.collector.timeout_secs, 120);
        assert_eq!(config.validator.name, "validator");
        assert_eq!(config.supervisor.mode, SupervisorMode::Subprocess);
        assert_eq!(config.publish.branch, "trunk");
        assert!(!config.probe.enabled);
    }

    #[test]
    fn test_max_below_base_rejected() {
        let yaml = "retries:\n  base_seconds: 10\n  max_seconds: 5\n";
        let err = AutopilotConfig::from_yaml(yaml, "inline").unwrap_err();
        assert!(err.to_string().contains("retries.max_seconds"));
    }

    #[test]
    fn test_non_positive_values_rejected() {
        let mut config = AutopilotConfig::default();
        config.retries.base_seconds = 0.0;
        config.retries.max_seconds = -1.0;
        config.retries.max_cycles = Some(0);
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_subprocess_mode_needs_command() {
        let mut config = AutopilotConfig::default();
        config.supervisor.mode = SupervisorMode::Subprocess;
        config.supervisor.command.clear();
        let errors = validate(&config).unwrap_err();
        assert!(errors[0].to_string().contains("supervisor.command"));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = AutopilotConfig::from_yaml("retries: [unclosed", "broken.yaml").unwrap_err();
        match err {
            ConfigError::Parse { file, .. } => assert_eq!(file, "broken.yaml"),
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AutopilotConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_YAML.as_bytes()).unwrap();
        let config = AutopilotConfig::load(file.path()).unwrap();
        assert_eq!(config.publish.branch, "trunk");
    }

    #[test]
    fn test_resolved_yaml_reloads() {
        let config = AutopilotConfig::from_yaml(FULL_YAML, "inline").unwrap();
        let rendered = config.to_yaml().unwrap();
        let reloaded = AutopilotConfig::from_yaml(&rendered, "rendered").unwrap();
        assert_eq!(config, reloaded);
    }

    #[test]
    fn test_render_error_is_not_reported_as_parse_error() {
        let source = serde_yaml::from_str::<u8>("not a number").unwrap_err();
        let message = ConfigError::Render(source).to_string();
        assert!(message.starts_with("could not render configuration"));
        assert!(!message.contains("parse error"));
    }

    #[test]
    fn test_with_args_appends() {
        let stage = StageConfig::custom("supervisor", vec!["tickloop".into()], 0);
        let extended = stage.with_args(["--cycle", "4"]);
        assert_eq!(extended.command, vec!["tickloop", "--cycle", "4"]);
        assert_eq!(stage.command.len(), 1);
    }
}
