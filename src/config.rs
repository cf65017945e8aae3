use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// Every variable read by [`Config::from_env`].
#[cfg(test)]
pub(crate) const ENV_NAMES: [&str; 23] = [
    "LEXICON_WORKER_HTTP_BIND",
    "LEXICON_DB_DSN",
    "LEXICON_DB_MAX_CONNECTIONS",
    "LEXICON_DB_MIN_CONNECTIONS",
    "LEXICON_DB_ACQUIRE_TIMEOUT_SECS",
    "GENERATION_BASE_URL",
    "GENERATION_API_KEY",
    "GENERATION_MODEL",
    "GENERATION_MAX_TOKENS",
    "GENERATION_TEMPERATURE",
    "GENERATION_USER",
    "GENERATION_SCHEMA_NAME",
    "TRANSLATION_SCHEMA_NAME",
    "GENERATION_CONNECT_TIMEOUT_MS",
    "GENERATION_TIMEOUT_SECS",
    "LYRICS_PROMPT_PATH",
    "LYRICS_PROMPT_RELOAD",
    "TRANSLATION_CACHE_TTL_SECS",
    "TRANSLATION_LINE_TIMEOUT_SECS",
    "TRANSLATION_BATCH_TIMEOUT_SECS",
    "TRANSLATION_PROGRESS_CHANNEL",
    "OTEL_EXPORTER_OTLP_ENDPOINT",
    "OTEL_SAMPLING_RATIO",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    db_dsn: Option<String>,
    db_max_connections: u32,
    db_min_connections: u32,
    db_acquire_timeout: Duration,
    generation_base_url: String,
    generation_api_key: String,
    generation_model: String,
    generation_max_tokens: u32,
    generation_temperature: f64,
    generation_user: String,
    generation_schema_name: String,
    translation_schema_name: String,
    generation_connect_timeout: Duration,
    generation_timeout: Duration,
    lyrics_prompt_path: Option<PathBuf>,
    lyrics_prompt_reload: bool,
    translation_cache_ttl: Duration,
    translation_line_timeout: Duration,
    translation_batch_timeout: Duration,
    translation_progress_channel: String,
    otel_exporter_endpoint: Option<String>,
    otel_sampling_ratio: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数からワーカーの設定値を読み込み、検証する。
    ///
    /// 生成バックエンドの URL と API キーは必須。DB の DSN が無い場合は
    /// インメモリストアで起動する。
    ///
    /// # Errors
    /// 必須値が未設定、もしくは各種値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("LEXICON_WORKER_HTTP_BIND", "0.0.0.0:9010")?;

        // Database connection pool settings
        let db_dsn = optional_env("LEXICON_DB_DSN");
        let db_max_connections = parse_u32("LEXICON_DB_MAX_CONNECTIONS", 10)?;
        let db_min_connections = parse_u32("LEXICON_DB_MIN_CONNECTIONS", 1)?;
        let db_acquire_timeout = parse_duration_secs("LEXICON_DB_ACQUIRE_TIMEOUT_SECS", 30)?;

        // Generation backend
        let generation_base_url = env_var("GENERATION_BASE_URL")?;
        let generation_api_key = env_var("GENERATION_API_KEY")?;
        let generation_model =
            env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let generation_max_tokens = parse_u32("GENERATION_MAX_TOKENS", 1500)?;
        if generation_max_tokens == 0 {
            return Err(ConfigError::Invalid {
                name: "GENERATION_MAX_TOKENS",
                source: anyhow::anyhow!("must be greater than zero"),
            });
        }
        let generation_temperature = parse_f64("GENERATION_TEMPERATURE", 0.2)?;
        let generation_user =
            env::var("GENERATION_USER").unwrap_or_else(|_| "service:parsing".to_string());
        let generation_schema_name =
            parse_schema_name("GENERATION_SCHEMA_NAME", "ParsingResponse")?;
        let translation_schema_name =
            parse_schema_name("TRANSLATION_SCHEMA_NAME", "lyrics_translation_v1")?;
        let generation_connect_timeout =
            parse_duration_ms("GENERATION_CONNECT_TIMEOUT_MS", 10_000)?;
        let generation_timeout = parse_duration_secs("GENERATION_TIMEOUT_SECS", 60)?;

        // Prompt source
        let lyrics_prompt_path = optional_env("LYRICS_PROMPT_PATH").map(PathBuf::from);
        let lyrics_prompt_reload = parse_bool("LYRICS_PROMPT_RELOAD", false)?;

        // Realtime translation
        let translation_cache_ttl = parse_duration_secs("TRANSLATION_CACHE_TTL_SECS", 86_400)?;
        let translation_line_timeout = parse_duration_secs("TRANSLATION_LINE_TIMEOUT_SECS", 10)?;
        let translation_batch_timeout =
            parse_duration_secs("TRANSLATION_BATCH_TIMEOUT_SECS", 30)?;
        let translation_progress_channel = env::var("TRANSLATION_PROGRESS_CHANNEL")
            .unwrap_or_else(|_| "translation:updates".to_string());

        // OpenTelemetry settings
        let otel_exporter_endpoint = optional_env("OTEL_EXPORTER_OTLP_ENDPOINT");
        let otel_sampling_ratio = parse_f64("OTEL_SAMPLING_RATIO", 1.0)?;

        Ok(Self {
            http_bind,
            db_dsn,
            db_max_connections,
            db_min_connections,
            db_acquire_timeout,
            generation_base_url,
            generation_api_key,
            generation_model,
            generation_max_tokens,
            generation_temperature,
            generation_user,
            generation_schema_name,
            translation_schema_name,
            generation_connect_timeout,
            generation_timeout,
            lyrics_prompt_path,
            lyrics_prompt_reload,
            translation_cache_ttl,
            translation_line_timeout,
            translation_batch_timeout,
            translation_progress_channel,
            otel_exporter_endpoint,
            otel_sampling_ratio,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn db_dsn(&self) -> Option<&str> {
        self.db_dsn.as_deref()
    }

    #[must_use]
    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    #[must_use]
    pub fn db_min_connections(&self) -> u32 {
        self.db_min_connections
    }

    #[must_use]
    pub fn db_acquire_timeout(&self) -> Duration {
        self.db_acquire_timeout
    }

    #[must_use]
    pub fn generation_base_url(&self) -> &str {
        &self.generation_base_url
    }

    #[must_use]
    pub fn generation_api_key(&self) -> &str {
        &self.generation_api_key
    }

    #[must_use]
    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    #[must_use]
    pub fn generation_max_tokens(&self) -> u32 {
        self.generation_max_tokens
    }

    #[must_use]
    pub fn generation_temperature(&self) -> f64 {
        self.generation_temperature
    }

    #[must_use]
    pub fn generation_user(&self) -> &str {
        &self.generation_user
    }

    #[must_use]
    pub fn generation_schema_name(&self) -> &str {
        &self.generation_schema_name
    }

    #[must_use]
    pub fn translation_schema_name(&self) -> &str {
        &self.translation_schema_name
    }

    #[must_use]
    pub fn generation_connect_timeout(&self) -> Duration {
        self.generation_connect_timeout
    }

    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        self.generation_timeout
    }

    #[must_use]
    pub fn lyrics_prompt_path(&self) -> Option<&PathBuf> {
        self.lyrics_prompt_path.as_ref()
    }

    #[must_use]
    pub fn lyrics_prompt_reload(&self) -> bool {
        self.lyrics_prompt_reload
    }

    #[must_use]
    pub fn translation_cache_ttl(&self) -> Duration {
        self.translation_cache_ttl
    }

    #[must_use]
    pub fn translation_line_timeout(&self) -> Duration {
        self.translation_line_timeout
    }

    #[must_use]
    pub fn translation_batch_timeout(&self) -> Duration {
        self.translation_batch_timeout
    }

    #[must_use]
    pub fn translation_progress_channel(&self) -> &str {
        &self.translation_progress_channel
    }

    #[must_use]
    pub fn otel_exporter_endpoint(&self) -> Option<&str> {
        self.otel_exporter_endpoint.as_deref()
    }

    #[must_use]
    pub fn otel_sampling_ratio(&self) -> f64 {
        self.otel_sampling_ratio
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional_env(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(value))
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}

/// Schema names end up in the `response_format` payload and must stay URL/identifier safe.
fn parse_schema_name(name: &'static str, default: &str) -> Result<String, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let valid = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(raw)
    } else {
        Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("schema name must match ^[a-zA-Z0-9_-]+$: {raw}"),
        })
    }
}
