use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Routes that skip token validation unless overridden in `[auth]`.
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "/health",
    "/docs",
    "/openapi.json",
    "/redoc",
    "/login",
    "/register",
    "/api/v1/login",
    "/api/v1/register",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tls: TlsSettings,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub login_code: LoginCodeConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
    Testing,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Testing => "testing",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:keystone.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// HTTPS listener settings and the location of the certificate pair.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,
    /// Defaults to `<cert_dir>/certificate.crt`
    pub cert_file: Option<PathBuf>,
    /// Defaults to `<cert_dir>/private.key`
    pub key_file: Option<PathBuf>,
    /// Generate a self-signed pair at startup when none exists
    #[serde(default = "default_true")]
    pub auto_generate: bool,
    #[serde(default = "default_days_valid")]
    pub days_valid: u32,
    #[serde(default = "default_organization")]
    pub organization: String,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_dir: default_cert_dir(),
            cert_file: None,
            key_file: None,
            auto_generate: true,
            days_valid: default_days_valid(),
            organization: default_organization(),
        }
    }
}

impl TlsSettings {
    pub fn cert_path(&self) -> PathBuf {
        self.cert_file
            .clone()
            .unwrap_or_else(|| self.cert_dir.join(crate::tls::CERT_FILE_NAME))
    }

    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.cert_dir.join(crate::tls::KEY_FILE_NAME))
    }
}

fn default_true() -> bool {
    true
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("./certs")
}

fn default_days_valid() -> u32 {
    365
}

fn default_organization() -> String {
    "Keystone Dev".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens. A random one is generated when empty.
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_minutes: i64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            access_token_ttl_minutes: default_access_token_ttl(),
            cookie_name: default_cookie_name(),
            cookie_secure: true,
            excluded_paths: default_excluded_paths(),
        }
    }
}

fn default_access_token_ttl() -> i64 {
    30
}

fn default_cookie_name() -> String {
    "access_token".to_string()
}

fn default_excluded_paths() -> Vec<String> {
    DEFAULT_EXCLUDED_PATHS.iter().map(|p| p.to_string()).collect()
}

fn generate_secret_key() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginCodeConfig {
    #[serde(default = "default_code_length")]
    pub length: usize,
    #[serde(default = "default_code_expiry")]
    pub expiry_minutes: i64,
}

impl Default for LoginCodeConfig {
    fn default() -> Self {
        Self {
            length: default_code_length(),
            expiry_minutes: default_code_expiry(),
        }
    }
}

fn default_code_length() -> usize {
    6
}

fn default_code_expiry() -> i64 {
    15
}

/// SMTP settings for outgoing mail
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    /// Use implicit TLS relay instead of a plain connection
    #[serde(default = "default_true")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: true,
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Keystone".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_wildcard")]
    pub allow_origins: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_credentials: bool,
    #[serde(default = "default_wildcard")]
    pub allow_methods: Vec<String>,
    #[serde(default = "default_wildcard")]
    pub allow_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: default_wildcard(),
            allow_credentials: true,
            allow_methods: default_wildcard(),
            allow_headers: default_wildcard(),
        }
    }
}

fn default_wildcard() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.ensure_secret_key();
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("KEYSTONE_SECRET_KEY") {
            self.auth.secret_key = secret;
        }
        if let Ok(url) = std::env::var("KEYSTONE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(password) = std::env::var("KEYSTONE_SMTP_PASSWORD") {
            self.email.smtp_password = Some(password);
        }
    }

    fn ensure_secret_key(&mut self) {
        if self.auth.secret_key.is_empty() {
            warn!("No auth.secret_key configured, generated a random one; tokens will not survive a restart");
            self.auth.secret_key = generate_secret_key();
        }
    }

    pub fn is_development(&self) -> bool {
        self.server.environment == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == Environment::Production
    }

    pub fn has_tls_files(&self) -> bool {
        self.tls.cert_path().exists() && self.tls.key_path().exists()
    }

    /// Effective settings with secrets redacted, for `show-config`
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let redact = |value: &Option<String>| match value {
            Some(_) => "********".to_string(),
            None => "(not set)".to_string(),
        };

        vec![
            ("environment", self.server.environment.as_str().to_string()),
            ("listen", format!("{}:{}", self.server.host, self.server.port)),
            ("database.url", self.database.url.clone()),
            ("tls.enabled", self.tls.enabled.to_string()),
            ("tls.cert_file", self.tls.cert_path().display().to_string()),
            ("tls.key_file", self.tls.key_path().display().to_string()),
            ("tls.files_present", self.has_tls_files().to_string()),
            ("auth.secret_key", "********".to_string()),
            (
                "auth.access_token_ttl_minutes",
                self.auth.access_token_ttl_minutes.to_string(),
            ),
            ("auth.cookie_name", self.auth.cookie_name.clone()),
            ("auth.excluded_paths", self.auth.excluded_paths.join(", ")),
            (
                "login_code.expiry_minutes",
                self.login_code.expiry_minutes.to_string(),
            ),
            (
                "email.smtp_host",
                self.email
                    .smtp_host
                    .clone()
                    .unwrap_or_else(|| "(not set)".to_string()),
            ),
            ("email.smtp_port", self.email.smtp_port.to_string()),
            ("email.smtp_password", redact(&self.email.smtp_password)),
            ("cors.allow_origins", self.cors.allow_origins.join(", ")),
            ("logging.level", self.logging.level.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.auth.access_token_ttl_minutes, 30);
        assert_eq!(config.auth.cookie_name, "access_token");
        assert_eq!(config.login_code.length, 6);
        assert_eq!(config.login_code.expiry_minutes, 15);
        assert!(config.tls.enabled);
        assert!(config.is_development());
        assert!(!config.email.is_configured());
        assert_eq!(
            config.tls.cert_path(),
            PathBuf::from("./certs/certificate.crt")
        );
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse(
            r#"
            [server]
            port = 9443
            environment = "production"

            [auth]
            secret_key = "s3cret"

            [email]
            smtp_host = "smtp.example.com"
            from_address = "noreply@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9443);
        assert!(config.is_production());
        assert_eq!(config.auth.secret_key, "s3cret");
        assert_eq!(config.auth.excluded_paths.len(), DEFAULT_EXCLUDED_PATHS.len());
        assert!(config.email.is_configured());
        assert_eq!(config.email.smtp_port, 587);
    }

    #[test]
    fn test_missing_secret_is_generated() {
        let mut config = Config::default();
        config.ensure_secret_key();
        assert_eq!(config.auth.secret_key.len(), 64);
    }

    #[test]
    fn test_summary_redacts_secrets() {
        let mut config = Config::default();
        config.auth.secret_key = "top-secret".to_string();
        config.email.smtp_password = Some("hunter2".to_string());

        let summary = config.summary();
        assert!(summary.iter().all(|(_, v)| !v.contains("top-secret")));
        assert!(summary.iter().all(|(_, v)| !v.contains("hunter2")));
    }
}
