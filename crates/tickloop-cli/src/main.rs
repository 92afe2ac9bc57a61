//! TickLoop - unattended collect/validate autopilot
//!
//! The `tickloop` command runs the collector and validator until both
//! succeed, handing every failed cycle to a self-healing supervisor.
//!
//! ## Commands
//!
//! - `run`: the autopilot loop (default)
//! - `supervise`: one supervisor pass, as invoked by a subprocess supervisor
//! - `show-config`: print the resolved configuration
//! - `check-keys`: probe model-provider API keys

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Instrument, Level};

use tickloop_core::{
    is_git_repo, obs, AutopilotConfig, CommandRunner, EnvSnapshot, Orchestrator,
    SubprocessSupervisor, Supervise, Supervisor, SupervisorMode, DEFAULT_CONFIG_PATH,
    NO_FIX_EXIT_CODE,
};
use tickloop_probe::check_all_providers;

/// Exit code for failures before the loop starts.
const STARTUP_ERROR_EXIT_CODE: u8 = 2;

const KEY_CHECK_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Parser)]
#[command(name = "tickloop")]
#[command(author = "TickLoop Maintainers")]
#[command(version = tickloop_core::VERSION)]
#[command(about = "Unattended collect/validate loop with a self-healing supervisor", long_about = None)]
struct Cli {
    /// Path to the autopilot configuration (YAML)
    #[arg(short, long, global = true, env = "TICKLOOP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the autopilot loop until collector and validator succeed
    Run,

    /// Run one supervisor pass
    ///
    /// Exits 0 when a fix was applied and 2 when there was nothing to fix.
    Supervise {
        /// Cycle number of the failure being supervised
        #[arg(long, default_value_t = 1)]
        cycle: u64,
    },

    /// Print the resolved configuration as YAML
    ShowConfig,

    /// Check model-provider API keys by listing their models
    CheckKeys,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tickloop_core::init_tracing(cli.json, level);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(STARTUP_ERROR_EXIT_CODE)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&cli.config).await,
        Commands::Supervise { cycle } => cmd_supervise(&cli.config, cycle).await,
        Commands::ShowConfig => cmd_show_config(&cli.config),
        Commands::CheckKeys => cmd_check_keys().await,
    }
}

fn load_config(path: &Path) -> Result<AutopilotConfig> {
    AutopilotConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

async fn cmd_run(config_path: &Path) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let env = EnvSnapshot::capture();

    if !is_git_repo(&config.supervisor.workdir) {
        warn!(
            workdir = %config.supervisor.workdir.display(),
            "supervisor workdir is not a git repository; fixes will not be published"
        );
    }

    let supervisor: Box<dyn Supervise> = match config.supervisor.mode {
        SupervisorMode::InProcess => Box::new(Supervisor::from_config(&config, env)),
        SupervisorMode::Subprocess => {
            // The child reads the same configuration file.
            let mut command = config.supervisor.command.clone();
            command.extend(["--config".to_string(), config_path.display().to_string()]);
            Box::new(SubprocessSupervisor::new(CommandRunner::new(), command))
        }
    };

    info!(config = %config_path.display(), mode = ?config.supervisor.mode, "autopilot starting");
    let orchestrator = Orchestrator::new(config, Box::new(CommandRunner::new()), supervisor);
    let report = orchestrator.run().await;

    if report.succeeded() {
        info!(
            cycles = report.cycles,
            fixes = report.fixes_applied,
            "collector and validator succeeded"
        );
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "giving up after {} cycles ({} fixes applied)",
            report.cycles, report.fixes_applied
        );
        Ok(ExitCode::FAILURE)
    }
}

async fn cmd_supervise(config_path: &Path, cycle: u64) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let supervisor = Supervisor::from_config(&config, EnvSnapshot::capture());

    let report = supervisor
        .run_pass(cycle)
        .instrument(obs::cycle_span("supervise", cycle))
        .await;

    let summary =
        serde_json::to_string_pretty(&report).context("Failed to serialize supervisor report")?;
    println!("{summary}");

    if report.changed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(NO_FIX_EXIT_CODE as u8))
    }
}

fn cmd_show_config(config_path: &Path) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let yaml = config.to_yaml().context("Failed to render configuration")?;
    print!("{yaml}");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_check_keys() -> Result<ExitCode> {
    let env = EnvSnapshot::capture();
    let checks = check_all_providers(
        |provider| env.non_empty(provider.env_var()).map(str::to_string),
        KEY_CHECK_TIMEOUT,
    )
    .await
    .context("Failed to build HTTP client")?;

    for check in &checks {
        println!("{}", check.summary());
    }

    if checks.iter().any(|c| c.is_ok()) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_comes_from_core() {
        assert_eq!(
            Cli::command().get_version(),
            Some(tickloop_core::VERSION)
        );
    }

    #[test]
    fn test_tracing_init_twice_keeps_first_subscriber() {
        tickloop_core::init_tracing(false, Level::INFO);
        tickloop_core::init_tracing(true, Level::DEBUG);
        info!("still logging after a second init");
    }

    #[test]
    fn test_run_is_default_subcommand() {
        let cli = Cli::try_parse_from(["tickloop"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_supervise_takes_cycle_and_global_flags() {
        let cli = Cli::try_parse_from([
            "tickloop",
            "supervise",
            "--cycle",
            "7",
            "--config",
            "custom.yaml",
            "--json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Supervise { cycle: 7 })));
        assert_eq!(cli.config, PathBuf::from("custom.yaml"));
        assert!(cli.json);
    }

    #[test]
    fn test_missing_config_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_show_config(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("absent.yaml"));
    }
}
