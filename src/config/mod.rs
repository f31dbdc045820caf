//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::types::Bound;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tootline";
const ENV_PREFIX: &str = "TOOTLINE";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_USER_AGENT: &str = concat!("tootline/", env!("CARGO_PKG_VERSION"));

/// Command-line arguments for the tootline binary.
#[derive(Debug, Parser)]
#[command(
    name = "tootline",
    version,
    about = "Walk public Mastodon timelines between two bounds"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "TOOTLINE_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print every status between the bounds, newest first, one JSON object per line.
    Timeline(TimelineArgs),
    /// Print a single page of statuses as pretty JSON.
    Page(PageArgs),
}

#[derive(Debug, Args, Clone)]
pub struct TimelineArgs {
    /// Instance host name or base URL.
    pub host: String,

    /// Walk the federated timeline instead of the local one.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub federated: bool,

    /// Newest status to include: a status id, an RFC 3339 timestamp or a YYYY-MM-DD date.
    #[arg(long, value_name = "BOUND")]
    pub newest: Option<Bound>,

    /// Oldest status to include: a status id, an RFC 3339 timestamp or a YYYY-MM-DD date.
    #[arg(long, value_name = "BOUND")]
    pub oldest: Option<Bound>,

    /// Stop after printing this many statuses.
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct PageArgs {
    /// Instance host name or base URL.
    pub host: String,

    /// Read the federated timeline instead of the local one.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub federated: bool,

    /// Highest status id to include.
    #[arg(long = "from-id", value_name = "ID")]
    pub from_id: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        global = true,
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the per-request timeout.
    #[arg(long = "timeout-seconds", value_name = "SECONDS", global = true)]
    pub timeout_seconds: Option<u64>,

    /// Override the User-Agent sent to instances.
    #[arg(long = "user-agent", value_name = "AGENT", global = true)]
    pub user_agent: Option<String>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// How instances are contacted.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    load_layers(cli, environment())
}

/// `TOOTLINE__SECTION__KEY` variables, e.g. `TOOTLINE__REMOTE__TIMEOUT_SECONDS`.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__")
}

fn load_layers(cli: &CliArgs, env: Environment) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(env);

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    remote: RawRemoteSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.remote.timeout_seconds = Some(seconds);
        }
        if let Some(agent) = overrides.user_agent.as_ref() {
            self.remote.user_agent = Some(agent.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, remote } = raw;

        let logging = build_logging_settings(logging)?;
        let remote = build_remote_settings(remote)?;

        Ok(Self { logging, remote })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_remote_settings(remote: RawRemoteSettings) -> Result<RemoteSettings, LoadError> {
    let timeout_secs = remote.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "remote.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let user_agent = match remote.user_agent {
        Some(agent) => {
            let trimmed = agent.trim();
            if trimmed.is_empty() {
                return Err(LoadError::invalid("remote.user_agent", "must not be empty"));
            }
            trimmed.to_string()
        }
        None => DEFAULT_USER_AGENT.to_string(),
    };

    Ok(RemoteSettings {
        timeout: Duration::from_secs(timeout_secs),
        user_agent,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRemoteSettings {
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
