use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default per-run wall-clock cap (seconds). Matches the schedule
/// store's column default so a row created elsewhere behaves the same.
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Top-level config (pipeflow.toml + PIPEFLOW_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipeflowConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub logs: LogConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Run-loop timings and the overlap policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between evaluation passes.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Backoff after a failed evaluation pass.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    /// Upper bound on the shutdown drain wait.
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// When false (default), a schedule whose previous run is still
    /// executing is skipped instead of dispatched again.
    #[serde(default)]
    pub allow_overlap: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            backoff_secs: default_backoff_secs(),
            shutdown_grace_secs: default_grace_secs(),
            allow_overlap: false,
        }
    }
}

/// Install paths for the external ETL runners plus the platform's
/// shell-wrapping requirement. Built once at startup; the adapter never
/// consults the environment on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPaths {
    /// Pentaho PDI job runner (kitchen).
    #[serde(default = "default_kitchen")]
    pub kitchen: String,
    /// Pentaho PDI transformation runner (pan).
    #[serde(default = "default_pan")]
    pub pan: String,
    /// Apache Hop runner (hop-run).
    #[serde(default = "default_hop_run")]
    pub hop_run: String,
    /// Wrap invocations in the platform shell (`cmd /C` / `sh -c`).
    /// Windows batch runners require this; Unix scripts do not.
    #[serde(default = "default_needs_shell")]
    pub needs_shell: bool,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            kitchen: default_kitchen(),
            pan: default_pan(),
            hop_run: default_hop_run(),
            needs_shell: default_needs_shell(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory for the shared daily job log, relative to the
    /// service working directory unless absolute.
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

/// Operator notification channels. Empty `channels` disables delivery;
/// failures are always logged regardless.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    /// Channel names to fan out to: "telegram", "email".
    #[serde(default)]
    pub channels: Vec<String>,
    pub telegram: Option<TelegramConfig>,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_server")]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub from: String,
    pub to: String,
    /// Login user; falls back to `from` when unset.
    pub user: Option<String>,
    pub password: String,
}

#[cfg(windows)]
fn default_kitchen() -> String {
    r"C:\data-integration\Kitchen.bat".to_string()
}
#[cfg(windows)]
fn default_pan() -> String {
    r"C:\data-integration\Pan.bat".to_string()
}
#[cfg(windows)]
fn default_hop_run() -> String {
    r"C:\Apache-hop\hop-run.bat".to_string()
}

#[cfg(not(windows))]
fn default_kitchen() -> String {
    "/opt/data-integration/kitchen.sh".to_string()
}
#[cfg(not(windows))]
fn default_pan() -> String {
    "/opt/data-integration/pan.sh".to_string()
}
#[cfg(not(windows))]
fn default_hop_run() -> String {
    "/opt/hop/hop-run.sh".to_string()
}

fn default_needs_shell() -> bool {
    cfg!(windows)
}
fn default_tick_secs() -> u64 {
    60
}
fn default_backoff_secs() -> u64 {
    10
}
fn default_grace_secs() -> u64 {
    10
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_db_path() -> String {
    "pipeflow.db".to_string()
}
fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}
fn default_smtp_port() -> u16 {
    587
}

impl PipeflowConfig {
    /// Load config from a TOML file with PIPEFLOW_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ./pipeflow.toml (service working directory)
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("pipeflow.toml");

        let config: PipeflowConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PIPEFLOW_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Startup preconditions the run-loop depends on. A zero tick or
    /// backoff would turn the loop into a busy spin.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.scheduler.tick_secs == 0 {
            return Err(crate::error::CoreError::Precondition(
                "scheduler.tick_secs must be at least 1".into(),
            ));
        }
        if self.scheduler.backoff_secs == 0 {
            return Err(crate::error::CoreError::Precondition(
                "scheduler.backoff_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
