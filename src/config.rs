use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::constants::{MAX_AUDIO_BYTES, MAX_IMAGE_BYTES};

/// Secret used when neither the config file nor the environment provides one
pub const DEVELOPMENT_SECRET_KEY: &str = "aula-audio-development-secret";

fn default_database_url() -> String {
    "sqlite://aula_audio.sqlite".to_string()
}

fn default_secret_key() -> String {
    DEVELOPMENT_SECRET_KEY.to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_port() -> u16 {
    5000
}

/// Server configuration file structure
///
/// Every field has a default, so an empty file (or no file at all) is valid.
/// Environment variables override the file, see [`AppConfig::apply_env_overrides`].
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// SQLite connection URL (env: DATABASE_URL)
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Key mixed into every password hash (env: SECRET_KEY)
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    /// Root of the uploads tree holding music/, covers/ and avatars/ (env: UPLOAD_DIR)
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// HTTP port (env: PORT)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Mark the session cookie Secure; enable behind HTTPS (env: SESSION_COOKIE_SECURE)
    #[serde(default)]
    pub secure_cookies: bool,
    /// Audio size ceiling in bytes (default: 50 MiB)
    pub max_audio_bytes: Option<u64>,
    /// Cover image size ceiling in bytes (default: 5 MiB)
    pub max_image_bytes: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            secret_key: default_secret_key(),
            upload_dir: default_upload_dir(),
            port: default_port(),
            secure_cookies: false,
            max_audio_bytes: None,
            max_image_bytes: None,
        }
    }
}

impl AppConfig {
    /// Load the config file if given, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    format!("Failed to read config file '{}': {}", path.display(), e)
                })?;
                Self::from_toml(&content).map_err(|e| {
                    format!("Failed to parse config file '{}': {}", path.display(), e)
                })?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Override fields from environment-style lookups
    ///
    /// Takes the lookup as a closure so tests don't have to touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(secret) = lookup("SECRET_KEY") {
            self.secret_key = secret;
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(secure) = lookup("SESSION_COOKIE_SECURE") {
            self.secure_cookies = matches!(secure.as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.secret_key.trim().is_empty() {
            return Err("secret_key must not be empty".to_string());
        }
        if self.database_url.trim().is_empty() {
            return Err("database_url must not be empty".to_string());
        }
        if self.max_audio_bytes == Some(0) || self.max_image_bytes == Some(0) {
            return Err("upload size ceilings must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn audio_limit(&self) -> u64 {
        self.max_audio_bytes.unwrap_or(MAX_AUDIO_BYTES)
    }

    pub fn image_limit(&self) -> u64 {
        self.max_image_bytes.unwrap_or(MAX_IMAGE_BYTES)
    }

    pub fn uses_development_secret(&self) -> bool {
        self.secret_key == DEVELOPMENT_SECRET_KEY
    }
}
