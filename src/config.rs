use std::env;
use std::time::Duration;

/// Environment-driven settings, read once at startup. Mirrors the env-prefix
/// convention of the system this crate fronts: every variable is `AGGREGATOR_<NAME>`.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub host: String,
    pub port: u16,

    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
    pub total_timeout: Duration,

    pub default_top_k: u32,
    pub max_top_k: u32,
    pub max_data_sources: usize,

    pub cors_origins: Vec<String>,

    pub peer_token_expire_seconds: u64,
    pub transport_url: Option<String>,
    pub transport_auth: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let service_name = env_or("AGGREGATOR_SERVICE_NAME", "syfthub-aggregator");
        let host = env_or("AGGREGATOR_HOST", "0.0.0.0");
        let port = env_parse_or("AGGREGATOR_PORT", 8001);

        let retrieval_timeout = Duration::from_secs_f64(env_parse_or("AGGREGATOR_RETRIEVAL_TIMEOUT", 30.0));
        let generation_timeout = Duration::from_secs_f64(env_parse_or("AGGREGATOR_GENERATION_TIMEOUT", 120.0));
        let total_timeout = Duration::from_secs_f64(env_parse_or("AGGREGATOR_TOTAL_TIMEOUT", 180.0));

        let default_top_k = env_parse_or("AGGREGATOR_DEFAULT_TOP_K", 5);
        let max_top_k = env_parse_or("AGGREGATOR_MAX_TOP_K", 20);
        let max_data_sources = env_parse_or("AGGREGATOR_MAX_DATA_SOURCES", 10);

        let cors_origins = env::var("AGGREGATOR_CORS_ORIGINS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| vec!["*".to_string()]);

        let peer_token_expire_seconds = env_parse_or("AGGREGATOR_PEER_TOKEN_EXPIRE_SECONDS", 3600);

        let transport_url = env::var("AGGREGATOR_TRANSPORT_URL").ok();
        if transport_url.is_none() {
            tracing::warn!("AGGREGATOR_TRANSPORT_URL not set — tunnel subsystem disabled");
        }
        let transport_auth = env::var("AGGREGATOR_TRANSPORT_AUTH").ok();

        Config {
            service_name,
            host,
            port,
            retrieval_timeout,
            generation_timeout,
            total_timeout,
            default_top_k,
            max_top_k,
            max_data_sources,
            cors_origins,
            peer_token_expire_seconds,
            transport_url,
            transport_auth,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "failed to parse env var, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        // SAFETY: tests run single-threaded within this module's scope for env mutation.
        for key in [
            "AGGREGATOR_SERVICE_NAME",
            "AGGREGATOR_HOST",
            "AGGREGATOR_PORT",
            "AGGREGATOR_RETRIEVAL_TIMEOUT",
            "AGGREGATOR_GENERATION_TIMEOUT",
            "AGGREGATOR_TOTAL_TIMEOUT",
            "AGGREGATOR_DEFAULT_TOP_K",
            "AGGREGATOR_MAX_TOP_K",
            "AGGREGATOR_MAX_DATA_SOURCES",
            "AGGREGATOR_CORS_ORIGINS",
            "AGGREGATOR_PEER_TOKEN_EXPIRE_SECONDS",
            "AGGREGATOR_TRANSPORT_URL",
            "AGGREGATOR_TRANSPORT_AUTH",
        ] {
            unsafe { env::remove_var(key) };
        }

        let config = Config::from_env();
        assert_eq!(config.service_name, "syfthub-aggregator");
        assert_eq!(config.port, 8001);
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.max_top_k, 20);
        assert_eq!(config.max_data_sources, 10);
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
    }
}
