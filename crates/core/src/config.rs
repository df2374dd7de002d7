use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::Role;
use crate::execution::RateLimitConfig;
use crate::permissions::PermissionPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
    pub rate_limit: RateLimitSettings,
    pub audit: AuditConfig,
    pub resolver: ResolverConfig,
    pub executor: ExecutorConfig,
    pub permissions: PermissionsConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub mode: ExecutionMode,
    pub ignore_prefixes: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub max_commands: usize,
    pub history_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct AuditConfig {
    pub retention: usize,
}

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub max_give_amount: u32,
    pub max_summon_amount: u32,
    pub some_amount: u32,
    pub many_amount: u32,
    pub cache_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub kind: ExecutorKind,
    pub path: Option<PathBuf>,
}

/// Role rosters and optional overrides of the built-in policy tables. Keys
/// are role names and are checked during validation.
#[derive(Clone, Debug, Default)]
pub struct PermissionsConfig {
    pub roles: BTreeMap<String, Vec<String>>,
    pub capabilities: BTreeMap<String, Vec<String>>,
    pub min_confidence: BTreeMap<String, f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// How far a chat line travels through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Off,
    DryRun,
    Live,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Commands are written to the structured log only.
    Log,
    /// Commands are appended to an outbox file read by the server wrapper.
    File,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub pipeline_mode: Option<ExecutionMode>,
    pub executor_kind: Option<ExecutorKind>,
    pub executor_path: Option<PathBuf>,
    pub server_port: Option<u16>,
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
                url: "sqlite://warden.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: Some("https://api.groq.com/openai/v1".to_string()),
                model: "llama-3.1-8b-instant".to_string(),
                timeout_secs: 15,
                temperature: 0.3,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            pipeline: PipelineConfig {
                mode: ExecutionMode::Live,
                ignore_prefixes: vec!["/".to_string(), "!".to_string()],
            },
            rate_limit: RateLimitSettings {
                window_secs: 10,
                max_commands: 20,
                history_capacity: 500,
            },
            audit: AuditConfig { retention: 1000 },
            resolver: ResolverConfig {
                max_give_amount: 64,
                max_summon_amount: 20,
                some_amount: 5,
                many_amount: 32,
                cache_capacity: 1024,
            },
            executor: ExecutorConfig { kind: ExecutorKind::Log, path: None },
            permissions: PermissionsConfig::default(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" | "groq" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
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

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::DryRun => "dry_run",
            Self::Live => "live",
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "off" | "disabled" => Ok(Self::Off),
            "dry_run" | "dryrun" | "simulate" => Ok(Self::DryRun),
            "live" | "on" => Ok(Self::Live),
            other => Err(ConfigError::Validation(format!(
                "unsupported pipeline mode `{other}` (expected off|dry_run|live)"
            ))),
        }
    }
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::File => "file",
        }
    }
}

impl std::str::FromStr for ExecutorKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "file" => Ok(Self::File),
            other => Err(ConfigError::Validation(format!(
                "unsupported executor kind `{other}` (expected log|file)"
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
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

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
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

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(mode) = pipeline.mode {
                self.pipeline.mode = mode;
            }
            if let Some(ignore_prefixes) = pipeline.ignore_prefixes {
                self.pipeline.ignore_prefixes = ignore_prefixes;
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(window_secs) = rate_limit.window_secs {
                self.rate_limit.window_secs = window_secs;
            }
            if let Some(max_commands) = rate_limit.max_commands {
                self.rate_limit.max_commands = max_commands;
            }
            if let Some(history_capacity) = rate_limit.history_capacity {
                self.rate_limit.history_capacity = history_capacity;
            }
        }

        if let Some(audit) = patch.audit {
            if let Some(retention) = audit.retention {
                self.audit.retention = retention;
            }
        }

        if let Some(resolver) = patch.resolver {
            if let Some(value) = resolver.max_give_amount {
                self.resolver.max_give_amount = value;
            }
            if let Some(value) = resolver.max_summon_amount {
                self.resolver.max_summon_amount = value;
            }
            if let Some(value) = resolver.some_amount {
                self.resolver.some_amount = value;
            }
            if let Some(value) = resolver.many_amount {
                self.resolver.many_amount = value;
            }
            if let Some(value) = resolver.cache_capacity {
                self.resolver.cache_capacity = value;
            }
        }

        if let Some(executor) = patch.executor {
            if let Some(kind) = executor.kind {
                self.executor.kind = kind;
            }
            if let Some(path) = executor.path {
                self.executor.path = Some(path);
            }
        }

        if let Some(permissions) = patch.permissions {
            if let Some(roles) = permissions.roles {
                self.permissions.roles = roles;
            }
            if let Some(capabilities) = permissions.capabilities {
                self.permissions.capabilities = capabilities;
            }
            if let Some(min_confidence) = permissions.min_confidence {
                self.permissions.min_confidence = min_confidence;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("WARDEN_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("WARDEN_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("WARDEN_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("WARDEN_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("WARDEN_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WARDEN_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("WARDEN_LLM_API_KEY").or_else(|| read_env("GROQ_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("WARDEN_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("WARDEN_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("WARDEN_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("WARDEN_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("WARDEN_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("WARDEN_LLM_TEMPERATURE", &value)?;
        }

        if let Some(value) = read_env("WARDEN_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("WARDEN_SERVER_PORT") {
            self.server.port = parse_u16("WARDEN_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("WARDEN_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("WARDEN_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("WARDEN_LOGGING_LEVEL").or_else(|| read_env("WARDEN_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WARDEN_LOGGING_FORMAT").or_else(|| read_env("WARDEN_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("WARDEN_PIPELINE_MODE") {
            self.pipeline.mode = value.parse()?;
        }
        if let Some(value) = read_env("WARDEN_PIPELINE_IGNORE_PREFIXES") {
            self.pipeline.ignore_prefixes = split_list(&value);
        }

        if let Some(value) = read_env("WARDEN_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = parse_u64("WARDEN_RATE_LIMIT_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("WARDEN_RATE_LIMIT_MAX_COMMANDS") {
            self.rate_limit.max_commands = parse_usize("WARDEN_RATE_LIMIT_MAX_COMMANDS", &value)?;
        }
        if let Some(value) = read_env("WARDEN_RATE_LIMIT_HISTORY_CAPACITY") {
            self.rate_limit.history_capacity =
                parse_usize("WARDEN_RATE_LIMIT_HISTORY_CAPACITY", &value)?;
        }

        if let Some(value) = read_env("WARDEN_AUDIT_RETENTION") {
            self.audit.retention = parse_usize("WARDEN_AUDIT_RETENTION", &value)?;
        }

        if let Some(value) = read_env("WARDEN_RESOLVER_MAX_GIVE_AMOUNT") {
            self.resolver.max_give_amount = parse_u32("WARDEN_RESOLVER_MAX_GIVE_AMOUNT", &value)?;
        }
        if let Some(value) = read_env("WARDEN_RESOLVER_MAX_SUMMON_AMOUNT") {
            self.resolver.max_summon_amount =
                parse_u32("WARDEN_RESOLVER_MAX_SUMMON_AMOUNT", &value)?;
        }

        if let Some(value) = read_env("WARDEN_EXECUTOR_KIND") {
            self.executor.kind = value.parse()?;
        }
        if let Some(value) = read_env("WARDEN_EXECUTOR_PATH") {
            self.executor.path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("WARDEN_PERMISSIONS_OWNERS") {
            self.permissions.roles.insert(Role::Owner.as_str().to_string(), split_list(&value));
        }
        if let Some(value) = read_env("WARDEN_PERMISSIONS_ADMINS") {
            self.permissions.roles.insert(Role::Admin.as_str().to_string(), split_list(&value));
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
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(mode) = overrides.pipeline_mode {
            self.pipeline.mode = mode;
        }
        if let Some(kind) = overrides.executor_kind {
            self.executor.kind = kind;
        }
        if let Some(path) = overrides.executor_path {
            self.executor.path = Some(path);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_rate_limit(&self.rate_limit)?;
        validate_resolver(&self.resolver)?;
        validate_executor(&self.executor)?;
        validate_permissions(&self.permissions)?;
        validate_threshold_order(&self.permission_policy())?;
        if self.audit.retention == 0 {
            return Err(ConfigError::Validation(
                "audit.retention must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_secs(self.rate_limit.window_secs),
            max_commands: self.rate_limit.max_commands,
            history_capacity: self.rate_limit.history_capacity,
        }
    }

    /// Builds the permission snapshot from the built-in tables and the
    /// configured rosters and overrides. Assumes `validate` passed.
    pub fn permission_policy(&self) -> PermissionPolicy {
        let mut policy = PermissionPolicy::default();
        for (name, members) in &self.permissions.roles {
            if let Some(role) = Role::parse(name) {
                policy = policy.with_roster(role, members);
            }
        }
        for (name, capabilities) in &self.permissions.capabilities {
            if let Some(role) = Role::parse(name) {
                policy = policy.with_capabilities(role, capabilities);
            }
        }
        for (name, threshold) in &self.permissions.min_confidence {
            if let Some(role) = Role::parse(name) {
                policy = policy.with_min_confidence(role, *threshold);
            }
        }
        policy
    }

    pub fn has_llm_api_key(&self) -> bool {
        self.llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/warden.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    } else if llm.provider == LlmProvider::Ollama {
        return Err(ConfigError::Validation(
            "llm.base_url is required for ollama provider".to_string(),
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

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_rate_limit(rate_limit: &RateLimitSettings) -> Result<(), ConfigError> {
    if rate_limit.window_secs == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.window_secs must be greater than zero".to_string(),
        ));
    }
    if rate_limit.max_commands == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.max_commands must be greater than zero".to_string(),
        ));
    }
    if rate_limit.history_capacity == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.history_capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_resolver(resolver: &ResolverConfig) -> Result<(), ConfigError> {
    let amounts = [
        ("resolver.max_give_amount", resolver.max_give_amount),
        ("resolver.max_summon_amount", resolver.max_summon_amount),
        ("resolver.some_amount", resolver.some_amount),
        ("resolver.many_amount", resolver.many_amount),
    ];
    if let Some((key, _)) = amounts.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
    }
    Ok(())
}

fn validate_executor(executor: &ExecutorConfig) -> Result<(), ConfigError> {
    if executor.kind == ExecutorKind::File && executor.path.is_none() {
        return Err(ConfigError::Validation(
            "executor.path is required when executor.kind = \"file\"".to_string(),
        ));
    }
    Ok(())
}

fn validate_permissions(permissions: &PermissionsConfig) -> Result<(), ConfigError> {
    let names = permissions
        .roles
        .keys()
        .chain(permissions.capabilities.keys())
        .chain(permissions.min_confidence.keys());
    for name in names {
        if Role::parse(name).is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown role `{name}` in [permissions] (expected owner|admin|moderator|builder|vip|player)"
            )));
        }
    }
    for (name, threshold) in &permissions.min_confidence {
        if !(0.0..=1.0).contains(threshold) {
            return Err(ConfigError::Validation(format!(
                "permissions.min_confidence.{name} must be in range 0.0..=1.0"
            )));
        }
    }
    Ok(())
}

/// Thresholds must rise strictly from owner down through vip once the
/// overrides are merged with the built-in table. `player` is always denied,
/// so its threshold is not ordered.
fn validate_threshold_order(policy: &PermissionPolicy) -> Result<(), ConfigError> {
    let ordered: Vec<Role> = Role::ALL.into_iter().filter(|role| !role.is_lowest()).collect();
    for pair in ordered.windows(2) {
        let (higher, lower) = (pair[0], pair[1]);
        let (lenient, strict) = (policy.min_confidence(higher), policy.min_confidence(lower));
        if lenient >= strict {
            return Err(ConfigError::Validation(format!(
                "permissions.min_confidence.{} ({lenient}) must be lower than permissions.min_confidence.{} ({strict})",
                higher.as_str(),
                lower.as_str()
            )));
        }
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| invalid(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    pipeline: Option<PipelinePatch>,
    rate_limit: Option<RateLimitPatch>,
    audit: Option<AuditPatch>,
    resolver: Option<ResolverPatch>,
    executor: Option<ExecutorPatch>,
    permissions: Option<PermissionsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    mode: Option<ExecutionMode>,
    ignore_prefixes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    window_secs: Option<u64>,
    max_commands: Option<usize>,
    history_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AuditPatch {
    retention: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ResolverPatch {
    max_give_amount: Option<u32>,
    max_summon_amount: Option<u32>,
    some_amount: Option<u32>,
    many_amount: Option<u32>,
    cache_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutorPatch {
    kind: Option<ExecutorKind>,
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct PermissionsPatch {
    roles: Option<BTreeMap<String, Vec<String>>>,
    capabilities: Option<BTreeMap<String, Vec<String>>>,
    min_confidence: Option<BTreeMap<String, f32>>,
}
