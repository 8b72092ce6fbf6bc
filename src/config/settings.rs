use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub security: SecuritySettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Which durable backend sits behind the user cache.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Json,
    Postgres,
    Sled,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(StorageKind::Json),
            "postgres" | "postgresql" => Ok(StorageKind::Postgres),
            "sled" => Ok(StorageKind::Sled),
            other => Err(format!("unknown storage kind '{other}'")),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageKind::Json => "json",
            StorageKind::Postgres => "postgres",
            StorageKind::Sled => "sled",
        })
    }
}

/// Configuration settings for user storage.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub kind: StorageKind,
    /// Users file for the json backend.
    pub file: String,
    /// Connection string for the postgres backend.
    pub connection_string: String,
    /// Database directory for the sled backend.
    pub sled_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecuritySettings {
    pub bcrypt_cost: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub storage: Option<PartialStorageSettings>,
    pub security: Option<PartialSecuritySettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// `kind` stays a string here so an unknown value can fall back to the default.
#[derive(Debug, Deserialize)]
pub struct PartialStorageSettings {
    pub kind: Option<String>,
    pub file: Option<String>,
    pub connection_string: Option<String>,
    pub sled_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialSecuritySettings {
    pub bcrypt_cost: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            storage: StorageSettings {
                kind: StorageKind::Json,
                file: "assets/users.json".to_string(),
                connection_string: String::new(),
                sled_path: "topicgate_db".to_string(),
            },
            security: SecuritySettings {
                bcrypt_cost: bcrypt::DEFAULT_COST,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
