use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use warden_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use warden_core::domain::actor::Role;

struct Field {
    key: String,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(
        key: impl Into<String>,
        env_keys: &'static [&'static str],
        value: impl Into<String>,
    ) -> Self {
        Self { key: key.into(), env_keys, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            &field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(&field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let mut fields = vec![
        Field::new("database.url", &["WARDEN_DATABASE_URL"], config.database.url.clone()),
        Field::new(
            "database.max_connections",
            &["WARDEN_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            &["WARDEN_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        Field::new("llm.provider", &["WARDEN_LLM_PROVIDER"], config.llm.provider.as_str()),
        Field::new("llm.model", &["WARDEN_LLM_MODEL"], config.llm.model.clone()),
        Field::new(
            "llm.base_url",
            &["WARDEN_LLM_BASE_URL"],
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", &["WARDEN_LLM_API_KEY", "GROQ_API_KEY"], api_key),
        Field::new(
            "llm.timeout_secs",
            &["WARDEN_LLM_TIMEOUT_SECS"],
            config.llm.timeout_secs.to_string(),
        ),
        Field::new(
            "llm.temperature",
            &["WARDEN_LLM_TEMPERATURE"],
            config.llm.temperature.to_string(),
        ),
        Field::new(
            "server.bind_address",
            &["WARDEN_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        Field::new("server.port", &["WARDEN_SERVER_PORT"], config.server.port.to_string()),
        Field::new(
            "logging.level",
            &["WARDEN_LOGGING_LEVEL", "WARDEN_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        Field::new(
            "logging.format",
            &["WARDEN_LOGGING_FORMAT", "WARDEN_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
        Field::new("pipeline.mode", &["WARDEN_PIPELINE_MODE"], config.pipeline.mode.as_str()),
        Field::new(
            "pipeline.ignore_prefixes",
            &["WARDEN_PIPELINE_IGNORE_PREFIXES"],
            format!("{:?}", config.pipeline.ignore_prefixes),
        ),
        Field::new(
            "rate_limit.window_secs",
            &["WARDEN_RATE_LIMIT_WINDOW_SECS"],
            config.rate_limit.window_secs.to_string(),
        ),
        Field::new(
            "rate_limit.max_commands",
            &["WARDEN_RATE_LIMIT_MAX_COMMANDS"],
            config.rate_limit.max_commands.to_string(),
        ),
        Field::new(
            "audit.retention",
            &["WARDEN_AUDIT_RETENTION"],
            config.audit.retention.to_string(),
        ),
        Field::new(
            "resolver.max_give_amount",
            &["WARDEN_RESOLVER_MAX_GIVE_AMOUNT"],
            config.resolver.max_give_amount.to_string(),
        ),
        Field::new(
            "resolver.max_summon_amount",
            &["WARDEN_RESOLVER_MAX_SUMMON_AMOUNT"],
            config.resolver.max_summon_amount.to_string(),
        ),
        Field::new("executor.kind", &["WARDEN_EXECUTOR_KIND"], config.executor.kind.as_str()),
        Field::new(
            "executor.path",
            &["WARDEN_EXECUTOR_PATH"],
            config
                .executor
                .path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
        ),
    ];

    for (name, members) in &config.permissions.roles {
        let Some(role) = Role::parse(name) else {
            continue;
        };
        let env_keys: &'static [&'static str] = match role {
            Role::Owner => &["WARDEN_PERMISSIONS_OWNERS"],
            Role::Admin => &["WARDEN_PERMISSIONS_ADMINS"],
            _ => &[],
        };
        fields.push(Field::new(
            format!("permissions.roles.{}", role.as_str()),
            env_keys,
            members.join(", "),
        ));
    }

    fields
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/warden.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path
        .split('.')
        .try_fold(root, |current, key| current.get(key))
        .is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a provider prefix such as `gsk_` or `sk-` so operators can tell
/// which key is loaded without exposing it.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let split = trimmed.find(['-', '_']);
    match split {
        Some(index) if index > 0 && index <= 4 => format!("{}***", &trimmed[..=index]),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn redaction_keeps_only_the_provider_prefix() {
        assert_eq!(redact_token("gsk_abcdef123"), "gsk_***");
        assert_eq!(redact_token("sk-ant-secret"), "sk-***");
        assert_eq!(redact_token("plainsecretvalue"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value = "[pipeline]\nmode = \"live\"\n".parse().expect("valid toml");
        assert!(contains_path(&doc, "pipeline.mode"));
        assert!(!contains_path(&doc, "pipeline.ignore_prefixes"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
