use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub llm: LlmConfig,
    pub thresholds: ThresholdConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Worker routines processing jobs concurrently.
    pub workers: usize,
    /// Watchdog deadline for a `running` job.
    pub job_timeout_secs: u64,
    /// Watchdog scan interval.
    pub watchdog_interval_secs: u64,
    /// History endpoint page size default and ceiling.
    pub history_default_limit: u32,
    pub history_max_limit: u32,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    /// When disabled every decision carries only the deterministic
    /// reasoning; no narration call is made.
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Decision constants that are policy, not code. Everything here can be
/// overridden from `cityhall.toml`.
#[derive(Clone, Debug)]
pub struct ThresholdConfig {
    pub reservoir_critical_low_pct: f64,
    pub reservoir_critical_high_pct: f64,
    pub curfew_start_hour: u32,
    pub rest_day: String,
    pub transfer_ceiling: Decimal,
    pub restricted_locations: Vec<String>,
    pub escalate_confidence_floor: f64,
    pub escalate_confidence_base: f64,
    pub escalate_shortfall_slope: f64,
    pub policy_confidence_base: f64,
    pub policy_confidence_step: f64,
    pub policy_confidence_cap: f64,
    pub deny_confidence: f64,
    pub critical_confidence: f64,
    pub approve_confidence_base: f64,
    pub approve_margin_gain: f64,
    pub skill_gap_penalty: f64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://cityhall.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            engine: EngineConfig {
                workers: 4,
                job_timeout_secs: 60,
                watchdog_interval_secs: 5,
                history_default_limit: 20,
                history_max_limit: 100,
            },
            llm: LlmConfig {
                enabled: false,
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.1".to_string(),
                api_key: None,
                timeout_secs: 30,
                max_retries: 2,
            },
            thresholds: ThresholdConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            reservoir_critical_low_pct: 15.0,
            reservoir_critical_high_pct: 100.0,
            curfew_start_hour: 7,
            rest_day: "sunday".to_string(),
            transfer_ceiling: Decimal::new(50_000, 0),
            restricted_locations: vec!["Historic District".to_string()],
            escalate_confidence_floor: 0.40,
            escalate_confidence_base: 0.70,
            escalate_shortfall_slope: 0.50,
            policy_confidence_base: 0.85,
            policy_confidence_step: 0.05,
            policy_confidence_cap: 0.95,
            deny_confidence: 0.90,
            critical_confidence: 0.90,
            approve_confidence_base: 0.70,
            approve_margin_gain: 0.25,
            skill_gap_penalty: 0.05,
        }
    }
}

impl ThresholdConfig {
    pub fn rest_day_weekday(&self) -> Option<chrono::Weekday> {
        match self.rest_day.trim().to_ascii_lowercase().as_str() {
            "monday" => Some(chrono::Weekday::Mon),
            "tuesday" => Some(chrono::Weekday::Tue),
            "wednesday" => Some(chrono::Weekday::Wed),
            "thursday" => Some(chrono::Weekday::Thu),
            "friday" => Some(chrono::Weekday::Fri),
            "saturday" => Some(chrono::Weekday::Sat),
            "sunday" => Some(chrono::Weekday::Sun),
            _ => None,
        }
    }

    pub fn is_restricted_location(&self, location: &str) -> bool {
        let key = location.trim().to_ascii_lowercase();
        self.restricted_locations
            .iter()
            .any(|restricted| key.contains(&restricted.trim().to_ascii_lowercase()))
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cityhall.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(workers) = engine.workers {
                self.engine.workers = workers;
            }
            if let Some(job_timeout_secs) = engine.job_timeout_secs {
                self.engine.job_timeout_secs = job_timeout_secs;
            }
            if let Some(watchdog_interval_secs) = engine.watchdog_interval_secs {
                self.engine.watchdog_interval_secs = watchdog_interval_secs;
            }
            if let Some(history_default_limit) = engine.history_default_limit {
                self.engine.history_default_limit = history_default_limit;
            }
            if let Some(history_max_limit) = engine.history_max_limit {
                self.engine.history_max_limit = history_max_limit;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(enabled) = llm.enabled {
                self.llm.enabled = enabled;
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(api_key_value.into());
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(thresholds) = patch.thresholds {
            if let Some(value) = thresholds.reservoir_critical_low_pct {
                self.thresholds.reservoir_critical_low_pct = value;
            }
            if let Some(value) = thresholds.reservoir_critical_high_pct {
                self.thresholds.reservoir_critical_high_pct = value;
            }
            if let Some(value) = thresholds.curfew_start_hour {
                self.thresholds.curfew_start_hour = value;
            }
            if let Some(value) = thresholds.rest_day {
                self.thresholds.rest_day = value;
            }
            if let Some(value) = thresholds.transfer_ceiling {
                self.thresholds.transfer_ceiling = value;
            }
            if let Some(value) = thresholds.restricted_locations {
                self.thresholds.restricted_locations = value;
            }
            if let Some(value) = thresholds.escalate_confidence_floor {
                self.thresholds.escalate_confidence_floor = value;
            }
            if let Some(value) = thresholds.deny_confidence {
                self.thresholds.deny_confidence = value;
            }
            if let Some(value) = thresholds.approve_confidence_base {
                self.thresholds.approve_confidence_base = value;
            }
            if let Some(value) = thresholds.approve_margin_gain {
                self.thresholds.approve_margin_gain = value;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CITYHALL_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CITYHALL_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("CITYHALL_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CITYHALL_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CITYHALL_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CITYHALL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CITYHALL_SERVER_PORT") {
            self.server.port = parse_u16("CITYHALL_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CITYHALL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CITYHALL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CITYHALL_ENGINE_WORKERS") {
            self.engine.workers = parse_u32("CITYHALL_ENGINE_WORKERS", &value)? as usize;
        }
        if let Some(value) = read_env("CITYHALL_ENGINE_JOB_TIMEOUT_SECS") {
            self.engine.job_timeout_secs = parse_u64("CITYHALL_ENGINE_JOB_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CITYHALL_ENGINE_WATCHDOG_INTERVAL_SECS") {
            self.engine.watchdog_interval_secs =
                parse_u64("CITYHALL_ENGINE_WATCHDOG_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("CITYHALL_LLM_ENABLED") {
            self.llm.enabled = parse_bool("CITYHALL_LLM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CITYHALL_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("CITYHALL_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CITYHALL_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("CITYHALL_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CITYHALL_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CITYHALL_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("CITYHALL_LLM_MAX_RETRIES", &value)?;
        }

        let log_level =
            read_env("CITYHALL_LOGGING_LEVEL").or_else(|| read_env("CITYHALL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CITYHALL_LOGGING_FORMAT").or_else(|| read_env("CITYHALL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(workers) = overrides.workers {
            self.engine.workers = workers;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_engine(&self.engine)?;
        validate_llm(&self.llm)?;
        validate_thresholds(&self.thresholds)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cityhall.toml"), PathBuf::from("config/cityhall.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.workers == 0 {
        return Err(ConfigError::Validation("engine.workers must be greater than zero".to_string()));
    }

    if engine.job_timeout_secs == 0 || engine.job_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "engine.job_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if engine.watchdog_interval_secs == 0
        || engine.watchdog_interval_secs > engine.job_timeout_secs
    {
        return Err(ConfigError::Validation(
            "engine.watchdog_interval_secs must be in range 1..=engine.job_timeout_secs"
                .to_string(),
        ));
    }

    if engine.history_default_limit == 0
        || engine.history_default_limit > engine.history_max_limit
    {
        return Err(ConfigError::Validation(
            "engine.history_default_limit must be in range 1..=engine.history_max_limit"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if !llm.enabled {
        return Ok(());
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.base_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.base_url is required when llm.enabled is true".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model is required when llm.enabled is true".to_string(),
        ));
    }

    if let Some(api_key) = &llm.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.api_key must not be empty when provided".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_thresholds(thresholds: &ThresholdConfig) -> Result<(), ConfigError> {
    if thresholds.reservoir_critical_low_pct < 0.0
        || thresholds.reservoir_critical_low_pct >= thresholds.reservoir_critical_high_pct
    {
        return Err(ConfigError::Validation(
            "thresholds.reservoir_critical_low_pct must be non-negative and below the high threshold"
                .to_string(),
        ));
    }

    if thresholds.curfew_start_hour >= 24 {
        return Err(ConfigError::Validation(
            "thresholds.curfew_start_hour must be in range 0..=23".to_string(),
        ));
    }

    if thresholds.rest_day_weekday().is_none() {
        return Err(ConfigError::Validation(
            "thresholds.rest_day must be a weekday name (monday..sunday)".to_string(),
        ));
    }

    if thresholds.transfer_ceiling < Decimal::ZERO {
        return Err(ConfigError::Validation(
            "thresholds.transfer_ceiling must be non-negative".to_string(),
        ));
    }

    let unit_interval = [
        ("escalate_confidence_floor", thresholds.escalate_confidence_floor),
        ("escalate_confidence_base", thresholds.escalate_confidence_base),
        ("policy_confidence_base", thresholds.policy_confidence_base),
        ("policy_confidence_cap", thresholds.policy_confidence_cap),
        ("deny_confidence", thresholds.deny_confidence),
        ("approve_confidence_base", thresholds.approve_confidence_base),
    ];
    for (name, value) in unit_interval {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "thresholds.{name} must be in range 0.0..=1.0"
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    engine: Option<EnginePatch>,
    llm: Option<LlmPatch>,
    thresholds: Option<ThresholdPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    workers: Option<usize>,
    job_timeout_secs: Option<u64>,
    watchdog_interval_secs: Option<u64>,
    history_default_limit: Option<u32>,
    history_max_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ThresholdPatch {
    reservoir_critical_low_pct: Option<f64>,
    reservoir_critical_high_pct: Option<f64>,
    curfew_start_hour: Option<u32>,
    rest_day: Option<String>,
    transfer_ceiling: Option<Decimal>,
    restricted_locations: Option<Vec<String>>,
    escalate_confidence_floor: Option<f64>,
    deny_confidence: Option<f64>,
    approve_confidence_base: Option<f64>,
    approve_margin_gain: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
