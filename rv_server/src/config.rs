//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration. The two token keys are required outside development; a
//! missing key is a startup failure, never a runtime fallback.

use rentiva::db::DatabaseConfig;
use std::net::SocketAddr;

/// Deployment profile controlling how strictly secrets are enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn from_env() -> Self {
        match std::env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Optional Prometheus exporter bind address
    pub metrics_bind: Option<SocketAddr>,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Authentication tuning
    pub auth: AuthConfig,
}

/// Security-related configuration
#[derive(Clone)]
pub struct SecurityConfig {
    /// Deployment profile
    pub environment: Environment,
    /// Secret for the access token family (required in production)
    pub access_token_key: String,
    /// Secret for the session token family (required in production)
    pub session_token_key: String,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets never reach logs or panic messages.
        f.debug_struct("SecurityConfig")
            .field("environment", &self.environment)
            .field("access_token_key", &"<redacted>")
            .field("session_token_key", &"<redacted>")
            .finish()
    }
}

/// Authentication tuning configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OTP code lifetime in minutes
    pub otp_expiry_minutes: i64,
    /// Access token lifetime in minutes
    pub access_token_ttl_minutes: i64,
    /// Session lifetime in hours
    pub session_ttl_hours: i64,
    /// Lifetime granted by a session extension, in hours
    pub session_extension_hours: i64,
    /// Device dispatch timeout in milliseconds
    pub device_response_timeout_ms: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let environment = Environment::from_env();

        // Bind address
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:8080"
                    .parse()
                    .expect("Default bind address is valid")
            });

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .and_then(|s| s.parse().ok());

        // Database configuration
        let database_url = database_url_override
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| "postgres://postgres@localhost/rentiva_db".to_string());

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 5),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT_SECS", 5),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", 1800),
        };

        let access_token_key = token_key_from_env("ACCESS_TOKEN_KEY", environment)?;
        let session_token_key = token_key_from_env("SESSION_TOKEN_KEY", environment)?;

        if access_token_key == session_token_key {
            return Err(ConfigError::Invalid {
                var: "SESSION_TOKEN_KEY".to_string(),
                reason: "Must differ from ACCESS_TOKEN_KEY; the token families need distinct keys"
                    .to_string(),
            });
        }

        let security = SecurityConfig {
            environment,
            access_token_key,
            session_token_key,
        };

        let auth = AuthConfig {
            otp_expiry_minutes: parse_env_or("OTP_EXPIRY_MINUTES", 10),
            access_token_ttl_minutes: parse_env_or("ACCESS_TOKEN_TTL_MINUTES", 15),
            session_ttl_hours: parse_env_or("SESSION_TTL_HOURS", 1),
            session_extension_hours: parse_env_or("SESSION_EXTENSION_HOURS", 1),
            device_response_timeout_ms: parse_env_or("DEVICE_RESPONSE_TIMEOUT_MS", 10_000),
        };

        let config = ServerConfig {
            bind,
            metrics_bind,
            database,
            security,
            auth,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.otp_expiry_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "OTP_EXPIRY_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.auth.access_token_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_TTL_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.auth.session_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "SESSION_TTL_HOURS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.auth.session_extension_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "SESSION_EXTENSION_HOURS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.auth.device_response_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "DEVICE_RESPONSE_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Read a token key, enforcing presence and length outside development.
fn token_key_from_env(var: &str, environment: Environment) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(key) => {
            if key.len() < 32 {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "Must be at least 32 characters".to_string(),
                });
            }
            Ok(key)
        }
        Err(_) if environment == Environment::Development => {
            tracing::warn!(var, "using a development-only token key; set {var} for real deployments");
            Ok(format!("development-only-{var}-0123456789abcdef"))
        }
        Err(_) => Err(ConfigError::MissingRequired {
            var: var.to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        }),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:8080".parse().unwrap(),
            metrics_bind: None,
            database: DatabaseConfig {
                database_url: "postgres://localhost/test".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_secs: 5,
                idle_timeout_secs: 300,
                max_lifetime_secs: 1800,
            },
            security: SecurityConfig {
                environment: Environment::Development,
                access_token_key: "a".repeat(32),
                session_token_key: "b".repeat(32),
            },
            auth: AuthConfig {
                otp_expiry_minutes: 10,
                access_token_ttl_minutes: 15,
                session_ttl_hours: 1,
                session_extension_hours: 1,
                device_response_timeout_ms: 10_000,
            },
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "ACCESS_TOKEN_KEY".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ACCESS_TOKEN_KEY"));
        assert!(msg.contains("Use openssl"));
    }

    #[test]
    fn test_validation_rejects_zero_otp_expiry() {
        let mut config = sample_config();
        config.auth.otp_expiry_minutes = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_validation_rejects_zero_device_timeout() {
        let mut config = sample_config();
        config.auth.device_response_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_security_debug_redacts_keys() {
        let config = sample_config();
        let debug = format!("{:?}", config.security);
        assert!(!debug.contains("aaaa"), "key material leaked into Debug");
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_valid_config_passes_validation() {
        assert!(sample_config().validate().is_ok());
    }
}
