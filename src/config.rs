use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "VisaBuddy AI Service";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tracing filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "visabuddy=info,visabuddy_lib=info,tower_http=info"
}

/// Get the application data directory (~/.visabuddy, or ./.visabuddy
/// when no home directory is known).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".visabuddy")
}

/// Default location of the local vector cache.
pub fn cache_file() -> PathBuf {
    app_data_dir().join(".cache").join("rag_cache.json")
}

/// Default location of the conversation database.
pub fn database_file() -> PathBuf {
    app_data_dir().join("visabuddy.db")
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    DeepSeek,
}

impl LlmProvider {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "deepseek" | "together" => Some(LlmProvider::DeepSeek),
            _ => None,
        }
    }
}

/// Runtime settings, read from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: IpAddr,
    pub port: u16,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub provider: LlmProvider,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub deepseek_api_key: Option<String>,
    pub rate_limit_per_hour: u32,
    pub backend_url: String,
    pub backend_token: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub pinecone_index_host: Option<String>,
    pub pinecone_index_name: String,
    pub kb_path: PathBuf,
    pub cache_file: PathBuf,
    pub database_path: PathBuf,
    pub result_cache_ttl_secs: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = parse_or(get("HOST"), "HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(get("PORT"), "PORT", 8001u16)?;
        let rate_limit_per_hour = parse_or(get("RATE_LIMIT_PER_HOUR"), "RATE_LIMIT_PER_HOUR", 20u32)?;
        let result_cache_ttl_secs =
            parse_or(get("RESULT_CACHE_TTL_SECS"), "RESULT_CACHE_TTL_SECS", 600u64)?;

        let provider = match get("LLM_PROVIDER") {
            Some(value) => LlmProvider::parse(&value).ok_or(ConfigError::Invalid {
                key: "LLM_PROVIDER",
                value,
            })?,
            None => LlmProvider::OpenAi,
        };

        let cors_origins = get("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty() && *o != "*")
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            cors_origins,
            provider,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4".to_string()),
            deepseek_api_key: get("DEEPSEEK_API_KEY"),
            rate_limit_per_hour,
            backend_url: get("BACKEND_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            backend_token: get("BACKEND_SERVICE_TOKEN"),
            pinecone_api_key: get("PINECONE_API_KEY"),
            pinecone_index_host: get("PINECONE_INDEX_HOST"),
            pinecone_index_name: get("PINECONE_INDEX_NAME")
                .unwrap_or_else(|| "visabuddy-visa-kb".to_string()),
            kb_path: get("KB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data").join("visa_kb.json")),
            cache_file: get("RAG_CACHE_FILE").map(PathBuf::from).unwrap_or_else(cache_file),
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(database_file),
            result_cache_ttl_secs,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.port, 8001);
        assert_eq!(s.provider, LlmProvider::OpenAi);
        assert_eq!(s.openai_model, "gpt-4");
        assert_eq!(s.rate_limit_per_hour, 20);
        assert_eq!(s.backend_url, "http://localhost:3000");
        assert_eq!(s.pinecone_index_name, "visabuddy-visa-kb");
        assert!(s.cors_origins.is_empty());
        assert!(s.openai_api_key.is_none());
        assert!(s.kb_path.ends_with("visa_kb.json"));
    }

    #[test]
    fn cors_origins_split_and_wildcard_dropped() {
        let s = settings(&[("CORS_ORIGINS", "https://a.app, *, https://b.app,")]).unwrap();
        assert_eq!(s.cors_origins, vec!["https://a.app", "https://b.app"]);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let s = settings(&[("OPENAI_API_KEY", "   "), ("PORT", "")]).unwrap();
        assert!(s.openai_api_key.is_none());
        assert_eq!(s.port, 8001);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = settings(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "PORT",
                value: "eighty".into()
            }
        );
    }

    #[test]
    fn provider_aliases() {
        let s = settings(&[("LLM_PROVIDER", "Together")]).unwrap();
        assert_eq!(s.provider, LlmProvider::DeepSeek);
        assert!(settings(&[("LLM_PROVIDER", "llama")]).is_err());
    }

    #[test]
    fn app_data_paths_nest() {
        assert!(cache_file().starts_with(app_data_dir()));
        assert!(database_file().ends_with("visabuddy.db"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "1.0.0");
    }
}
