use chrono::Duration;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment};

const MAX_ACCESS_TOKEN_MINUTES: i64 = 60 * 24;
const MAX_REFRESH_TOKEN_DAYS: i64 = 365;
const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Process-wide settings, built once at startup and injected everywhere
/// else. Values come from an optional `configuration` file overlaid by
/// environment variables (`DATABASE_URL`, `SECRET_KEY`, ...).
#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database_url: String,
    pub database_max_connections: u32,
    pub secret_key: String,
    pub refresh_secret_key: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub token_issuer: String,
    pub application_host: String,
    pub application_port: u16,
    pub cookie_secure: bool,
    pub bcrypt_cost: u32,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
}

/// JWT signing settings. The two secrets must differ.
#[derive(Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub issuer: String,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dir: std::path::PathBuf,
    pub max_bytes: usize,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("database_max_connections", &self.database_max_connections)
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("refresh_token_expire_days", &self.refresh_token_expire_days)
            .field("token_issuer", &self.token_issuer)
            .field("application_host", &self.application_host)
            .field("application_port", &self.application_port)
            .field("cookie_secure", &self.cookie_secure)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

impl Settings {
    pub fn jwt(&self) -> JwtSettings {
        JwtSettings {
            access_secret: self.secret_key.clone(),
            refresh_secret: self.refresh_secret_key.clone(),
            access_token_ttl: Duration::minutes(self.access_token_expire_minutes),
            refresh_token_ttl: Duration::days(self.refresh_token_expire_days),
            issuer: self.token_issuer.clone(),
        }
    }

    pub fn uploads(&self) -> UploadSettings {
        UploadSettings {
            dir: self.upload_dir.clone().into(),
            max_bytes: self.max_upload_bytes,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.application_host, self.application_port)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        for (key, value) in [
            ("DATABASE_URL", &self.database_url),
            ("SECRET_KEY", &self.secret_key),
            ("REFRESH_SECRET_KEY", &self.refresh_secret_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{} is not set", key)));
            }
        }

        if self.secret_key == self.refresh_secret_key {
            return Err(ConfigError::Message(
                "SECRET_KEY and REFRESH_SECRET_KEY must differ".to_string(),
            ));
        }
        if self.access_token_expire_minutes <= 0 {
            return Err(ConfigError::Message(
                "ACCESS_TOKEN_EXPIRE_MINUTES must be positive".to_string(),
            ));
        }
        if self.refresh_token_expire_days <= 0 {
            return Err(ConfigError::Message(
                "REFRESH_TOKEN_EXPIRE_DAYS must be positive".to_string(),
            ));
        }
        if self.access_token_expire_minutes > MAX_ACCESS_TOKEN_MINUTES {
            return Err(ConfigError::Message(format!(
                "ACCESS_TOKEN_EXPIRE_MINUTES must be at most {}",
                MAX_ACCESS_TOKEN_MINUTES
            )));
        }
        if self.refresh_token_expire_days > MAX_REFRESH_TOKEN_DAYS {
            return Err(ConfigError::Message(format!(
                "REFRESH_TOKEN_EXPIRE_DAYS must be at most {}",
                MAX_REFRESH_TOKEN_DAYS
            )));
        }
        if !BCRYPT_COST_RANGE.contains(&self.bcrypt_cost) {
            return Err(ConfigError::Message(format!(
                "BCRYPT_COST must be between {} and {}",
                BCRYPT_COST_RANGE.start(),
                BCRYPT_COST_RANGE.end()
            )));
        }
        if self.secret_key.len() < 32 || self.refresh_secret_key.len() < 32 {
            tracing::warn!("JWT secrets are shorter than recommended (32 bytes)");
        }

        Ok(self)
    }
}

/// Load settings from the `configuration` file (optional) and the process
/// environment. Fails if a required value is missing or invalid.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(environment());
    build_settings(builder)
}

// Values stay strings until deserialization, so a numeric-looking secret
// is kept verbatim while numeric fields still parse.
fn environment() -> Environment {
    Environment::default()
}

/// Apply defaults to a builder and deserialize. Split out so the defaults
/// and validation can be exercised without touching the real environment.
pub fn build_settings(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    let settings = builder
        .set_default("database_max_connections", 5)?
        .set_default("access_token_expire_minutes", 10)?
        .set_default("refresh_token_expire_days", 7)?
        .set_default("token_issuer", "tokensafe")?
        .set_default("application_host", "127.0.0.1")?
        .set_default("application_port", 8000)?
        .set_default("cookie_secure", false)?
        .set_default("bcrypt_cost", bcrypt::DEFAULT_COST as i64)?
        .set_default("upload_dir", "uploads")?
        .set_default("max_upload_bytes", 10 * 1024 * 1024)?
        .build()?;

    settings.try_deserialize::<Settings>()?.validate()
}
