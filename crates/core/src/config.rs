use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::PlannerPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sms: SmsConfig,
    pub fsm: FsmConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub business: BusinessProfile,
    pub policy: PlannerPolicy,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SmsConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub account_id: String,
    pub auth_token: SecretString,
    pub from_number: String,
}

#[derive(Clone, Debug)]
pub struct FsmConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Static business configuration folded into every context snapshot: who the
/// business is, what it offers, and where.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub name: String,
    pub services: Vec<String>,
    pub service_area: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_link: Option<String>,
    pub scheduling_window_days: u16,
}

impl Default for BusinessProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            services: Vec::new(),
            service_area: String::new(),
            review_link: None,
            scheduling_window_days: 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub business_name: Option<String>,
    pub business_services: Option<Vec<String>>,
    pub sms_enabled: Option<bool>,
    pub sms_auth_token: Option<String>,
    pub sms_from_number: Option<String>,
    pub fsm_enabled: Option<bool>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub auto_quote_enabled: Option<bool>,
    pub approvals_required_for_booking: Option<bool>,
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
                url: "sqlite://leadline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            sms: SmsConfig {
                enabled: false,
                api_base_url: "https://api.sms.example.com".to_string(),
                account_id: String::new(),
                auth_token: String::new().into(),
                from_number: String::new(),
            },
            fsm: FsmConfig {
                enabled: false,
                api_base_url: "https://api.fsm.example.com".to_string(),
                api_key: None,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            business: BusinessProfile::default(),
            policy: PlannerPolicy::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
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
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadline.toml"));
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

        if let Some(sms) = patch.sms {
            if let Some(enabled) = sms.enabled {
                self.sms.enabled = enabled;
            }
            if let Some(api_base_url) = sms.api_base_url {
                self.sms.api_base_url = api_base_url;
            }
            if let Some(account_id) = sms.account_id {
                self.sms.account_id = account_id;
            }
            if let Some(auth_token_value) = sms.auth_token {
                self.sms.auth_token = secret_value(auth_token_value);
            }
            if let Some(from_number) = sms.from_number {
                self.sms.from_number = from_number;
            }
        }

        if let Some(fsm) = patch.fsm {
            if let Some(enabled) = fsm.enabled {
                self.fsm.enabled = enabled;
            }
            if let Some(api_base_url) = fsm.api_base_url {
                self.fsm.api_base_url = api_base_url;
            }
            if let Some(api_key_value) = fsm.api_key {
                self.fsm.api_key = Some(secret_value(api_key_value));
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
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
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
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

        if let Some(business) = patch.business {
            if let Some(name) = business.name {
                self.business.name = name;
            }
            if let Some(services) = business.services {
                self.business.services = services;
            }
            if let Some(service_area) = business.service_area {
                self.business.service_area = service_area;
            }
            if let Some(review_link) = business.review_link {
                self.business.review_link = Some(review_link);
            }
            if let Some(scheduling_window_days) = business.scheduling_window_days {
                self.business.scheduling_window_days = scheduling_window_days;
            }
        }

        if let Some(policy) = patch.policy {
            if let Some(version) = policy.version {
                self.policy.version = version;
            }
            if let Some(auto_quote_enabled) = policy.auto_quote_enabled {
                self.policy.auto_quote_enabled = auto_quote_enabled;
            }
            if let Some(approvals_required_for_booking) = policy.approvals_required_for_booking {
                self.policy.approvals_required_for_booking = approvals_required_for_booking;
            }
            if let Some(review_requests_enabled) = policy.review_requests_enabled {
                self.policy.review_requests_enabled = review_requests_enabled;
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
        if let Some(value) = read_env("LEADLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("LEADLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEADLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SMS_ENABLED") {
            self.sms.enabled = parse_bool("LEADLINE_SMS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_SMS_API_BASE_URL") {
            self.sms.api_base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_SMS_ACCOUNT_ID") {
            self.sms.account_id = value;
        }
        if let Some(value) = read_env("LEADLINE_SMS_AUTH_TOKEN") {
            self.sms.auth_token = secret_value(value);
        }
        if let Some(value) = read_env("LEADLINE_SMS_FROM_NUMBER") {
            self.sms.from_number = value;
        }

        if let Some(value) = read_env("LEADLINE_FSM_ENABLED") {
            self.fsm.enabled = parse_bool("LEADLINE_FSM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_FSM_API_BASE_URL") {
            self.fsm.api_base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_FSM_API_KEY") {
            self.fsm.api_key = Some(secret_value(value));
        }

        if let Some(value) = read_env("LEADLINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("LEADLINE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADLINE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("LEADLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LEADLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("LEADLINE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("LEADLINE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_PORT") {
            self.server.port = parse_u16("LEADLINE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_BUSINESS_NAME") {
            self.business.name = value;
        }
        if let Some(value) = read_env("LEADLINE_BUSINESS_SERVICES") {
            self.business.services = value
                .split(',')
                .map(|service| service.trim().to_owned())
                .filter(|service| !service.is_empty())
                .collect();
        }
        if let Some(value) = read_env("LEADLINE_BUSINESS_SERVICE_AREA") {
            self.business.service_area = value;
        }
        if let Some(value) = read_env("LEADLINE_BUSINESS_REVIEW_LINK") {
            self.business.review_link = Some(value);
        }

        if let Some(value) = read_env("LEADLINE_POLICY_AUTO_QUOTE_ENABLED") {
            self.policy.auto_quote_enabled =
                parse_bool("LEADLINE_POLICY_AUTO_QUOTE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_POLICY_APPROVALS_REQUIRED_FOR_BOOKING") {
            self.policy.approvals_required_for_booking =
                parse_bool("LEADLINE_POLICY_APPROVALS_REQUIRED_FOR_BOOKING", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_POLICY_REVIEW_REQUESTS_ENABLED") {
            self.policy.review_requests_enabled =
                parse_bool("LEADLINE_POLICY_REVIEW_REQUESTS_ENABLED", &value)?;
        }

        let log_level =
            read_env("LEADLINE_LOGGING_LEVEL").or_else(|| read_env("LEADLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADLINE_LOGGING_FORMAT").or_else(|| read_env("LEADLINE_LOG_FORMAT"));
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
        if let Some(business_name) = overrides.business_name {
            self.business.name = business_name;
        }
        if let Some(business_services) = overrides.business_services {
            self.business.services = business_services;
        }
        if let Some(sms_enabled) = overrides.sms_enabled {
            self.sms.enabled = sms_enabled;
        }
        if let Some(sms_auth_token) = overrides.sms_auth_token {
            self.sms.auth_token = secret_value(sms_auth_token);
        }
        if let Some(sms_from_number) = overrides.sms_from_number {
            self.sms.from_number = sms_from_number;
        }
        if let Some(fsm_enabled) = overrides.fsm_enabled {
            self.fsm.enabled = fsm_enabled;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(auto_quote_enabled) = overrides.auto_quote_enabled {
            self.policy.auto_quote_enabled = auto_quote_enabled;
        }
        if let Some(approvals_required_for_booking) = overrides.approvals_required_for_booking {
            self.policy.approvals_required_for_booking = approvals_required_for_booking;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_sms(&self.sms)?;
        validate_fsm(&self.fsm)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_business(&self.business)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadline.toml"), PathBuf::from("config/leadline.toml")]
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

fn validate_sms(sms: &SmsConfig) -> Result<(), ConfigError> {
    if !sms.enabled {
        return Ok(());
    }

    if sms.api_base_url.trim().is_empty()
        || !(sms.api_base_url.starts_with("http://") || sms.api_base_url.starts_with("https://"))
    {
        return Err(ConfigError::Validation(
            "sms.api_base_url must start with http:// or https:// when sms.enabled is true"
                .to_string(),
        ));
    }
    if sms.account_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "sms.account_id is required when sms.enabled is true".to_string(),
        ));
    }
    if sms.auth_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "sms.auth_token is required when sms.enabled is true".to_string(),
        ));
    }
    if !sms.from_number.starts_with('+') {
        return Err(ConfigError::Validation(
            "sms.from_number must be an E.164 number starting with `+`".to_string(),
        ));
    }

    Ok(())
}

fn validate_fsm(fsm: &FsmConfig) -> Result<(), ConfigError> {
    if !fsm.enabled {
        return Ok(());
    }

    if !(fsm.api_base_url.starts_with("http://") || fsm.api_base_url.starts_with("https://")) {
        return Err(ConfigError::Validation(
            "fsm.api_base_url must start with http:// or https:// when fsm.enabled is true"
                .to_string(),
        ));
    }

    let missing_key = fsm
        .api_key
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_key {
        return Err(ConfigError::Validation(
            "fsm.api_key is required when fsm.enabled is true".to_string(),
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

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_business(business: &BusinessProfile) -> Result<(), ConfigError> {
    if business.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "business.name is required; set it in leadline.toml or LEADLINE_BUSINESS_NAME"
                .to_string(),
        ));
    }
    if business.services.is_empty() {
        return Err(ConfigError::Validation(
            "business.services must list at least one offered service".to_string(),
        ));
    }
    if business.scheduling_window_days == 0 {
        return Err(ConfigError::Validation(
            "business.scheduling_window_days must be greater than zero".to_string(),
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
    sms: Option<SmsPatch>,
    fsm: Option<FsmPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    business: Option<BusinessPatch>,
    policy: Option<PolicyPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SmsPatch {
    enabled: Option<bool>,
    api_base_url: Option<String>,
    account_id: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FsmPatch {
    enabled: Option<bool>,
    api_base_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BusinessPatch {
    name: Option<String>,
    services: Option<Vec<String>>,
    service_area: Option<String>,
    review_link: Option<String>,
    scheduling_window_days: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyPatch {
    version: Option<u32>,
    auto_quote_enabled: Option<bool>,
    approvals_required_for_booking: Option<bool>,
    review_requests_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn business_env() {
        env::set_var("LEADLINE_BUSINESS_NAME", "Brightside Exteriors");
        env::set_var("LEADLINE_BUSINESS_SERVICES", "gutter cleaning, lawn care");
    }

    const BUSINESS_VARS: [&str; 2] = ["LEADLINE_BUSINESS_NAME", "LEADLINE_BUSINESS_SERVICES"];

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        business_env();
        env::set_var("TEST_SMS_AUTH_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadline.toml");
            fs::write(
                &path,
                r#"
[sms]
auth_token = "${TEST_SMS_AUTH_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.sms.auth_token.expose_secret() == "token-from-env",
                "sms auth token should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SMS_AUTH_TOKEN"]);
        clear_vars(&BUSINESS_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        business_env();
        env::set_var("LEADLINE_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadline.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win over env and file",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["LEADLINE_DATABASE_URL"]);
        clear_vars(&BUSINESS_VARS);
        result
    }

    #[test]
    fn policy_section_feeds_the_planner_policy() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        business_env();

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadline.toml");
            fs::write(
                &path,
                r#"
[policy]
version = 4
auto_quote_enabled = true
approvals_required_for_booking = false
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.policy.version == 4, "policy version should come from the file")?;
            ensure(config.policy.auto_quote_enabled, "auto quote should be enabled")?;
            ensure(
                !config.policy.approvals_required_for_booking,
                "booking approvals should be disabled by the file",
            )?;
            ensure(
                config.policy.review_requests_enabled,
                "unset policy fields keep their defaults",
            )?;
            Ok(())
        })();

        clear_vars(&BUSINESS_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_without_business_profile() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&BUSINESS_VARS);
        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("business.name")
        );
        ensure(has_message, "validation failure should mention business.name")
    }

    #[test]
    fn enabled_sms_requires_credentials_and_sender() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        business_env();
        env::set_var("LEADLINE_SMS_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected sms validation failure".to_string()),
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("sms.")
            );
            ensure(has_message, "validation failure should mention the sms section")
        })();

        clear_vars(&["LEADLINE_SMS_ENABLED"]);
        clear_vars(&BUSINESS_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        business_env();
        env::set_var("LEADLINE_SMS_AUTH_TOKEN", "sms-secret-value");
        env::set_var("LEADLINE_LLM_API_KEY", "llm-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("sms-secret-value"),
                "debug output should not contain the sms auth token",
            )?;
            ensure(
                !debug.contains("llm-secret-value"),
                "debug output should not contain the llm api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["LEADLINE_SMS_AUTH_TOKEN", "LEADLINE_LLM_API_KEY"]);
        clear_vars(&BUSINESS_VARS);
        result
    }
}
