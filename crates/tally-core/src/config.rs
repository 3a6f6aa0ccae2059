use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Access tokens this close to expiry are refreshed before use.
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;

pub const INTUIT_AUTH_URL: &str = "https://appcenter.intuit.com/connect/oauth2";
pub const INTUIT_TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
pub const ACCOUNTING_SCOPE: &str = "com.intuit.quickbooks.accounting";
pub const QBO_SANDBOX_URL: &str = "https://sandbox-quickbooks.api.intuit.com";
pub const QBO_PRODUCTION_URL: &str = "https://quickbooks.api.intuit.com";
pub const RESEND_API_URL: &str = "https://api.resend.com";

/// Top-level config (tally.toml + TALLY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub intuit: IntuitConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Setup-flow HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Which QuickBooks Online API host reports are fetched from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IntuitEnvironment {
    #[default]
    Sandbox,
    Production,
}

/// Intuit OAuth application and accounting API settings.
///
/// `client_id` / `client_secret` are optional here so the setup server can
/// start and report a useful error; they are required at the point an OAuth
/// client is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntuitConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Must match the redirect URI registered with the Intuit app.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub environment: IntuitEnvironment,
    /// Overrides the environment-derived accounting API host.
    pub api_base_url: Option<String>,
}

impl Default for IntuitConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            scope: default_scope(),
            environment: IntuitEnvironment::default(),
            api_base_url: None,
        }
    }
}

impl IntuitConfig {
    /// Accounting API host for the configured environment.
    pub fn api_base_url(&self) -> String {
        match (&self.api_base_url, self.environment) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, IntuitEnvironment::Sandbox) => QBO_SANDBOX_URL.to_string(),
            (None, IntuitEnvironment::Production) => QBO_PRODUCTION_URL.to_string(),
        }
    }

    /// The OAuth client credentials, or a config error naming what is missing.
    pub fn client_credentials(&self) -> crate::error::Result<(&str, &str)> {
        let id = self
            .client_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| crate::error::CoreError::Config("intuit.client_id is not set".into()))?;
        let secret = self
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                crate::error::CoreError::Config("intuit.client_secret is not set".into())
            })?;
        Ok((id, secret))
    }
}

/// Report delivery via the Resend HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub resend_api_key: Option<String>,
    #[serde(default = "default_mail_from")]
    pub from: String,
    #[serde(default = "default_mail_api_url")]
    pub api_url: String,
    /// Subject line prefix; the company id is appended.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            resend_api_key: None,
            from: default_mail_from(),
            api_url: default_mail_api_url(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_redirect_uri() -> String {
    format!("http://localhost:{DEFAULT_PORT}/callback")
}
fn default_auth_url() -> String {
    INTUIT_AUTH_URL.to_string()
}
fn default_token_url() -> String {
    INTUIT_TOKEN_URL.to_string()
}
fn default_scope() -> String {
    ACCOUNTING_SCOPE.to_string()
}
fn default_mail_from() -> String {
    "Tally Reports <reports@tally.local>".to_string()
}
fn default_mail_api_url() -> String {
    RESEND_API_URL.to_string()
}
fn default_subject_prefix() -> String {
    "QuickBooks Balance Sheet Report".to_string()
}
fn default_refresh_margin_secs() -> u64 {
    DEFAULT_REFRESH_MARGIN_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tally/tally.db", home)
}

impl TallyConfig {
    /// Load config from a TOML file with TALLY_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `TALLY_INTUIT__CLIENT_ID` → `intuit.client_id`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TallyConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TALLY_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tally/tally.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = TallyConfig::load(Some("/nonexistent/tally.toml")).unwrap();
        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert_eq!(config.intuit.environment, IntuitEnvironment::Sandbox);
        assert_eq!(config.scheduler.refresh_margin_secs, 60);
        assert!(config.intuit.client_credentials().is_err());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[intuit]
client_id = "abc"
client_secret = "shh"
environment = "production"

[mail]
from = "ops@example.com"

[scheduler]
refresh_margin_secs = 120
"#
        )
        .unwrap();

        let config = TallyConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.intuit.client_credentials().unwrap(), ("abc", "shh"));
        assert_eq!(config.intuit.api_base_url(), QBO_PRODUCTION_URL);
        assert_eq!(config.mail.from, "ops@example.com");
        assert_eq!(config.mail.api_url, RESEND_API_URL);
        assert_eq!(config.scheduler.refresh_margin_secs, 120);
    }

    #[test]
    fn explicit_api_base_url_wins() {
        let intuit = IntuitConfig {
            api_base_url: Some("http://127.0.0.1:9000/".into()),
            ..IntuitConfig::default()
        };
        assert_eq!(intuit.api_base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway]\nport = \"not a number\"").unwrap();

        let err = TallyConfig::load(file.path().to_str()).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Config(_)));
    }
}
