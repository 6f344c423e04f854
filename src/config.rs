use std::net::SocketAddr;
use std::path::PathBuf;

use crate::crypto::{MIN_SECRET_LENGTH, PBKDF2_ITERATIONS};

/// Application-level constants
pub const APP_NAME: &str = "Kiangombe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 60;
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 7;
pub const DEFAULT_MAIL_FROM: &str = "no-reply@kiangombe.local";
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Used only when `KIANGOMBE_JWT_SECRET` is unset.
const DEV_JWT_SECRET: &str = "kiangombe-development-secret-change-me";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot determine home directory; set KIANGOMBE_DB_PATH")]
    NoHomeDir,
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("KIANGOMBE_JWT_SECRET must be at least {0} bytes")]
    SecretTooShort(usize),
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "kiangombe_lib=info,kiangombe=info,tower_http=warn"
}

/// Get the application data directory: ~/Kiangombe/
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

pub fn default_db_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join("kiangombe.db"))
}

/// Outbound SMTP relay. Absent when `KIANGOMBE_MAIL_SERVER` is unset.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub starttls: bool,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("starttls", &self.starttls)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub frontend_url: String,
    pub password_iterations: u32,
    pub mail_from: String,
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    /// Read configuration from `KIANGOMBE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable lookup, so tests never touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(
            "KIANGOMBE_BIND_ADDR",
            get("KIANGOMBE_BIND_ADDR"),
            DEFAULT_BIND_ADDR,
        )?;
        let db_path = match get("KIANGOMBE_DB_PATH") {
            Some(p) => PathBuf::from(p),
            None => default_db_path()?,
        };
        let jwt_secret = match get("KIANGOMBE_JWT_SECRET") {
            Some(secret) if secret.len() < MIN_SECRET_LENGTH => {
                return Err(ConfigError::SecretTooShort(MIN_SECRET_LENGTH))
            }
            Some(secret) => secret,
            None => {
                tracing::warn!("KIANGOMBE_JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };
        let access_token_minutes = positive(
            "KIANGOMBE_ACCESS_TOKEN_MINUTES",
            get("KIANGOMBE_ACCESS_TOKEN_MINUTES"),
            DEFAULT_ACCESS_TOKEN_MINUTES,
        )?;
        let refresh_token_days = positive(
            "KIANGOMBE_REFRESH_TOKEN_DAYS",
            get("KIANGOMBE_REFRESH_TOKEN_DAYS"),
            DEFAULT_REFRESH_TOKEN_DAYS,
        )?;
        let password_iterations = positive(
            "KIANGOMBE_PASSWORD_ITERATIONS",
            get("KIANGOMBE_PASSWORD_ITERATIONS"),
            i64::from(PBKDF2_ITERATIONS),
        )?;
        let password_iterations =
            u32::try_from(password_iterations).map_err(|_| ConfigError::Invalid {
                key: "KIANGOMBE_PASSWORD_ITERATIONS",
                value: password_iterations.to_string(),
            })?;

        let frontend_url = get("KIANGOMBE_FRONTEND_URL")
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let mail_from = get("KIANGOMBE_MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string());
        let smtp = match get("KIANGOMBE_MAIL_SERVER") {
            Some(server) => Some(SmtpConfig {
                server: server.trim().to_string(),
                port: parse_or(
                    "KIANGOMBE_MAIL_PORT",
                    get("KIANGOMBE_MAIL_PORT"),
                    &DEFAULT_SMTP_PORT.to_string(),
                )?,
                username: get("KIANGOMBE_MAIL_USERNAME"),
                password: get("KIANGOMBE_MAIL_PASSWORD"),
                starttls: flag(
                    "KIANGOMBE_MAIL_STARTTLS",
                    get("KIANGOMBE_MAIL_STARTTLS"),
                    true,
                )?,
            }),
            None => None,
        };

        Ok(Self {
            bind_addr,
            db_path,
            jwt_secret,
            access_token_minutes,
            refresh_token_days,
            frontend_url,
            password_iterations,
            mail_from,
            smtp,
        })
    }

    /// Config for tests: given database, cheap hashing, loopback bind.
    #[cfg(test)]
    pub fn for_tests(db_path: PathBuf) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            db_path,
            jwt_secret: "test-secret-test-secret-test-secret!".to_string(),
            access_token_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            refresh_token_days: DEFAULT_REFRESH_TOKEN_DAYS,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            password_iterations: 1_000,
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            smtp: None,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<T, ConfigError> {
    let raw = value.unwrap_or_else(|| default.to_string());
    raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn positive(key: &'static str, value: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

fn flag(key: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[("KIANGOMBE_DB_PATH", "/tmp/k.db")])).unwrap();
        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.access_token_minutes, 60);
        assert_eq!(config.refresh_token_days, 7);
        assert_eq!(config.password_iterations, PBKDF2_ITERATIONS);
        assert_eq!(config.frontend_url, "http://localhost:3000");
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert!(config.jwt_secret.len() >= MIN_SECRET_LENGTH);
    }

    #[test]
    fn values_are_read() {
        let config = AppConfig::from_lookup(lookup(&[
            ("KIANGOMBE_BIND_ADDR", "127.0.0.1:9100"),
            ("KIANGOMBE_DB_PATH", "/srv/clinic.db"),
            ("KIANGOMBE_JWT_SECRET", "a-very-long-production-secret-value!!"),
            ("KIANGOMBE_ACCESS_TOKEN_MINUTES", "15"),
            ("KIANGOMBE_FRONTEND_URL", "https://clinic.example/"),
            ("KIANGOMBE_PASSWORD_ITERATIONS", "200000"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9100");
        assert_eq!(config.db_path, PathBuf::from("/srv/clinic.db"));
        assert_eq!(config.access_token_minutes, 15);
        assert_eq!(config.frontend_url, "https://clinic.example");
        assert_eq!(config.password_iterations, 200_000);
    }

    #[test]
    fn bad_values_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("KIANGOMBE_DB_PATH", "/tmp/k.db"),
            ("KIANGOMBE_ACCESS_TOKEN_MINUTES", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "KIANGOMBE_ACCESS_TOKEN_MINUTES", .. }));

        let err = AppConfig::from_lookup(lookup(&[
            ("KIANGOMBE_DB_PATH", "/tmp/k.db"),
            ("KIANGOMBE_BIND_ADDR", "nowhere"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "KIANGOMBE_BIND_ADDR", .. }));
    }

    #[test]
    fn smtp_settings_are_read() {
        let config = AppConfig::from_lookup(lookup(&[("KIANGOMBE_DB_PATH", "/tmp/k.db")])).unwrap();
        assert!(config.smtp.is_none());

        let config = AppConfig::from_lookup(lookup(&[
            ("KIANGOMBE_DB_PATH", "/tmp/k.db"),
            ("KIANGOMBE_MAIL_SERVER", "smtp.example.com"),
            ("KIANGOMBE_MAIL_USERNAME", "clinic"),
            ("KIANGOMBE_MAIL_PASSWORD", "hunter22"),
        ]))
        .unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.server, "smtp.example.com");
        assert_eq!(smtp.port, DEFAULT_SMTP_PORT);
        assert_eq!(smtp.username.as_deref(), Some("clinic"));
        assert!(smtp.starttls);
        assert!(!format!("{smtp:?}").contains("hunter22"));

        let config = AppConfig::from_lookup(lookup(&[
            ("KIANGOMBE_DB_PATH", "/tmp/k.db"),
            ("KIANGOMBE_MAIL_SERVER", "localhost"),
            ("KIANGOMBE_MAIL_PORT", "1025"),
            ("KIANGOMBE_MAIL_STARTTLS", "false"),
        ]))
        .unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 1025);
        assert!(!smtp.starttls);

        let err = AppConfig::from_lookup(lookup(&[
            ("KIANGOMBE_DB_PATH", "/tmp/k.db"),
            ("KIANGOMBE_MAIL_SERVER", "localhost"),
            ("KIANGOMBE_MAIL_STARTTLS", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "KIANGOMBE_MAIL_STARTTLS", .. }));
    }

    #[test]
    fn short_secret_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("KIANGOMBE_DB_PATH", "/tmp/k.db"),
            ("KIANGOMBE_JWT_SECRET", "short"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::SecretTooShort(_)));
    }

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir().unwrap();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Kiangombe"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
