use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// Languages the form flow and the form-filler templates are available in.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[("en", "English"), ("es", "Español")];

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "testing" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub session: SessionConfig,
    pub features: FeatureFlags,
    pub locale: LocaleConfig,
    pub services: ServiceEndpoints,
    pub directory: DirectoryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let ttl_minutes = env::var("SESSION_TTL")
            .unwrap_or_else(|_| "10".to_string())
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidSessionTtl)?;

        let demo_uuid = match non_empty_var("DEMO_UUID") {
            Some(raw) => Some(
                Uuid::parse_str(raw.trim())
                    .map_err(|source| ConfigError::InvalidDemoUuid { source })?,
            ),
            None => None,
        };

        let enable_ab = flag("ENABLE_AB");

        let default_locale = non_empty_var("DEFAULT_LOCALE")
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| is_supported_language(value))
            .unwrap_or_else(|| "en".to_string());

        let lookup_timeout_secs = env::var("SOS_LOOKUP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidTimeout)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            session: SessionConfig {
                ttl: Duration::from_secs(ttl_minutes * 60),
                demo_uuid,
            },
            features: FeatureFlags { enable_ab },
            locale: LocaleConfig { default_locale },
            services: ServiceEndpoints {
                sos_lookup_url: non_empty_var("SOS_LOOKUP_URL"),
                request_timeout: Duration::from_secs(lookup_timeout_secs),
                form_filler_url: non_empty_var("FORM_FILLER_URL"),
            },
            directory: DirectoryConfig {
                clerks_csv: non_empty_var("CLERKS_CSV").map(PathBuf::from),
                zipcodes_csv: non_empty_var("ZIPCODES_CSV").map(PathBuf::from),
                early_voting_csv: non_empty_var("EARLY_VOTING_CSV").map(PathBuf::from),
                dropboxes_csv: non_empty_var("DROPBOXES_CSV").map(PathBuf::from),
            },
        })
    }
}

impl Default for AppConfig {
    /// The configuration `load` produces with no environment set.
    fn default() -> Self {
        Self {
            environment: AppEnvironment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
            },
            session: SessionConfig {
                ttl: Duration::from_secs(10 * 60),
                demo_uuid: None,
            },
            features: FeatureFlags::default(),
            locale: LocaleConfig {
                default_locale: "en".to_string(),
            },
            services: ServiceEndpoints {
                sos_lookup_url: None,
                request_timeout: Duration::from_secs(10),
                form_filler_url: None,
            },
            directory: DirectoryConfig::default(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn flag(name: &str) -> bool {
    non_empty_var(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

pub fn is_supported_language(code: &str) -> bool {
    SUPPORTED_LANGUAGES.iter().any(|(supported, _)| *supported == code)
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Registrant session lifetime and the shared demo session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub demo_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureFlags {
    pub enable_ab: bool,
}

#[derive(Debug, Clone)]
pub struct LocaleConfig {
    pub default_locale: String,
}

/// Locations of the external collaborators: the SOS registry lookup and the form filler.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub sos_lookup_url: Option<String>,
    pub request_timeout: Duration,
    pub form_filler_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryConfig {
    pub clerks_csv: Option<PathBuf>,
    pub zipcodes_csv: Option<PathBuf>,
    pub early_voting_csv: Option<PathBuf>,
    pub dropboxes_csv: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: std::net::AddrParseError },
    #[error("SESSION_TTL must be a whole number of minutes")]
    InvalidSessionTtl,
    #[error("SOS_LOOKUP_TIMEOUT_SECS must be a whole number of seconds")]
    InvalidTimeout,
    #[error("DEMO_UUID must be a valid UUID")]
    InvalidDemoUuid { source: uuid::Error },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "SESSION_TTL",
            "DEMO_UUID",
            "ENABLE_AB",
            "DEFAULT_LOCALE",
            "SOS_LOOKUP_URL",
            "SOS_LOOKUP_TIMEOUT_SECS",
            "FORM_FILLER_URL",
            "CLERKS_CSV",
            "ZIPCODES_CSV",
            "EARLY_VOTING_CSV",
            "DROPBOXES_CSV",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.session.ttl, Duration::from_secs(600));
        assert!(config.session.demo_uuid.is_none());
        assert!(!config.features.enable_ab);
        assert_eq!(config.locale.default_locale, "en");
        assert!(config.services.sos_lookup_url.is_none());
        assert!(config.services.form_filler_url.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_feature_flags_and_session_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ENABLE_AB", "True");
        env::set_var("SESSION_TTL", "30");
        env::set_var("DEMO_UUID", "0a5e3a4e-2f4c-4d5b-9f0e-6c1d2b3a4f5e");
        env::set_var("DEFAULT_LOCALE", "ES");
        let config = AppConfig::load().expect("config loads");
        assert!(config.features.enable_ab);
        assert_eq!(config.session.ttl, Duration::from_secs(1800));
        assert!(config.session.demo_uuid.is_some());
        assert_eq!(config.locale.default_locale, "es");
        reset_env();
    }

    #[test]
    fn rejects_malformed_demo_uuid() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DEMO_UUID", "not-a-uuid");
        let err = AppConfig::load().expect_err("invalid uuid rejected");
        assert!(matches!(err, ConfigError::InvalidDemoUuid { .. }));
        reset_env();
    }

    #[test]
    fn unsupported_locale_falls_back_to_english() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DEFAULT_LOCALE", "fr");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.locale.default_locale, "en");
        reset_env();
    }
}
