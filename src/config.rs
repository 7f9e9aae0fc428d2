use chrono::Duration;
use dotenvy::dotenv;
use std::env;

/// Tunables of the messaging engine itself.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Groups at or above this size never expose full read receipts
    pub redaction_member_threshold: usize,
    /// Messages older than this never expose full read receipts in groups
    pub redaction_max_age: Duration,
    pub max_text_len: usize,
    pub max_emoji_len: usize,
    pub default_story_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 50,
            redaction_member_threshold: 100,
            redaction_max_age: Duration::days(7),
            max_text_len: 4096,
            max_emoji_len: 32,
            default_story_ttl: Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Absent means the in-process store is used
    pub database_url: Option<String>,
    pub db_max_connections: usize,
    pub jwt_public_key_pem: Option<String>,
    pub audit_queue_capacity: usize,
    pub ws: WsConfig,
    pub engine: EngineConfig,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let port = parsed("PORT", 3000);
        let db_max_connections = parsed("DB_MAX_CONNECTIONS", 16);

        // Inline PEM wins over a key file
        let jwt_public_key_pem = match env::var("JWT_PUBLIC_KEY_PEM") {
            Ok(pem) if !pem.trim().is_empty() => Some(pem),
            _ => match env::var("JWT_PUBLIC_KEY_FILE") {
                Ok(path) => Some(std::fs::read_to_string(&path).map_err(|e| {
                    crate::error::AppError::Config(format!(
                        "failed to read JWT_PUBLIC_KEY_FILE {path}: {e}"
                    ))
                })?),
                Err(_) => None,
            },
        };

        let defaults = WsConfig::default();
        let ws = WsConfig {
            heartbeat_interval_secs: parsed(
                "WS_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_secs,
            ),
            client_timeout_secs: parsed("WS_CLIENT_TIMEOUT_SECS", defaults.client_timeout_secs),
        };
        if ws.client_timeout_secs <= ws.heartbeat_interval_secs {
            return Err(crate::error::AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        Ok(Self {
            port,
            database_url,
            db_max_connections,
            jwt_public_key_pem,
            audit_queue_capacity: parsed("AUDIT_QUEUE_CAPACITY", 1024),
            ws,
            engine: EngineConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_page_size, 20);
        assert_eq!(cfg.max_page_size, 50);
        assert_eq!(cfg.redaction_member_threshold, 100);
        assert_eq!(cfg.redaction_max_age, Duration::days(7));
    }

    #[test]
    fn test_parsed_falls_back_on_garbage() {
        env::set_var("MESSAGING_ENGINE_TEST_PARSE", "not-a-number");
        assert_eq!(parsed("MESSAGING_ENGINE_TEST_PARSE", 7u16), 7);
        env::remove_var("MESSAGING_ENGINE_TEST_PARSE");
    }
}
