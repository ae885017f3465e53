use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

use crate::types::RESI_ROUTE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub api_prefix: String,
    pub max_request_size_bytes: usize,
    pub cors_origins: Vec<String>,
    pub enable_request_logging: bool,
    pub stream_buffer: usize,
}

/// Key material is base64 encoded; all three must be set for authorization to be enabled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub private_key: Option<String>,
    pub public_key: Option<String>,
    pub secret: Option<String>,
    pub token_expiry_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub enable_client_builder: bool,
    pub models_dir: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(v) = env::var("RESI_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("RESI_API_PREFIX") {
            self.server.api_prefix = v.trim_matches('/').to_string();
        }
        if let Ok(v) = env::var("RESI_MAX_REQUEST_SIZE_BYTES") {
            self.server.max_request_size_bytes = v.parse().unwrap_or(self.server.max_request_size_bytes);
        }
        if let Ok(v) = env::var("RESI_CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = env::var("RESI_ENABLE_REQUEST_LOGGING") {
            self.server.enable_request_logging = v.parse().unwrap_or(self.server.enable_request_logging);
        }
        if let Ok(v) = env::var("RESI_STREAM_BUFFER") {
            self.server.stream_buffer = v.parse().unwrap_or(self.server.stream_buffer);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_PRIVATE_KEY") {
            self.security.private_key = Some(v);
        }
        if let Ok(v) = env::var("SECURITY_PUBLIC_KEY") {
            self.security.public_key = Some(v);
        }
        if let Ok(v) = env::var("SECURITY_SECRET") {
            self.security.secret = Some(v);
        }
        if let Ok(v) = env::var("SECURITY_TOKEN_EXPIRY_HOURS") {
            self.security.token_expiry_hours = v.parse().unwrap_or(self.security.token_expiry_hours);
        }

        // Build overrides
        if let Ok(v) = env::var("BUILD_ENABLE_CLIENT_BUILDER") {
            self.build.enable_client_builder = v.parse().unwrap_or(self.build.enable_client_builder);
        }
        if let Ok(v) = env::var("BUILD_MODELS_DIR") {
            self.build.models_dir = Some(v);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                api_prefix: RESI_ROUTE.to_string(),
                max_request_size_bytes: 16 * 1024 * 1024, // 16MB
                cors_origins: Vec::new(),
                enable_request_logging: true,
                stream_buffer: 16,
            },
            security: SecurityConfig {
                token_expiry_hours: 24 * 7, // 1 week
                ..Default::default()
            },
            build: BuildConfig {
                enable_client_builder: true,
                models_dir: Some("models".to_string()),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 80,
                api_prefix: RESI_ROUTE.to_string(),
                max_request_size_bytes: 8 * 1024 * 1024, // 8MB
                cors_origins: vec!["https://staging.example.com".to_string()],
                enable_request_logging: true,
                stream_buffer: 16,
            },
            security: SecurityConfig {
                token_expiry_hours: 24,
                ..Default::default()
            },
            build: BuildConfig {
                enable_client_builder: false,
                models_dir: None,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 80,
                api_prefix: RESI_ROUTE.to_string(),
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
                cors_origins: vec!["https://app.example.com".to_string()],
                enable_request_logging: false,
                stream_buffer: 32,
            },
            security: SecurityConfig {
                token_expiry_hours: 4,
                ..Default::default()
            },
            build: BuildConfig {
                enable_client_builder: false,
                models_dir: None,
            },
        }
    }
}

impl SecurityConfig {
    /// `(private, public, secret)` when all three are configured
    pub fn key_material(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.private_key.as_deref()?,
            self.public_key.as_deref()?,
            self.secret.as_deref()?,
        ))
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}
