use config::ConfigError;
use std::time::Duration;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level connection, used to create throwaway test databases
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Shared key-value cache backing the token blocklist
#[derive(serde::Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    pub issuer: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds (3600 = 60 minutes)
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds (172800 = 2 days)
    #[serde(default = "default_leeway")]
    pub leeway: i64, // seconds of tolerated clock skew; 0 keeps `exp == now` expired
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_access_token_expiry() -> i64 {
    60 * 60
}

fn default_refresh_token_expiry() -> i64 {
    2 * 24 * 60 * 60
}

fn default_leeway() -> i64 {
    0
}

impl JwtSettings {
    /// How long a revoked token id must be remembered: the longest lifetime
    /// any issued token can have, skew included.
    pub fn revocation_ttl(&self) -> Duration {
        let longest = self.access_token_expiry.max(self.refresh_token_expiry) + self.leeway;
        Duration::from_secs(longest.max(1) as u64)
    }
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        // e.g. APP_JWT__SECRET=... overrides jwt.secret
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;
    settings.try_deserialize::<Settings>()
}
