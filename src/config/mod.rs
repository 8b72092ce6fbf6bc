mod settings;

use crate::auth::password::{MAX_COST, MIN_COST};
use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};
use tracing::warn;

pub use settings::{
    LoggingSettings, SecuritySettings, ServerSettings, Settings, StorageKind, StorageSettings,
};

/// Prefix of environment variables, e.g. `TOPICGATE__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "TOPICGATE";

/// Loads the configuration from `config/default` and environment variables
/// Merges the configuration with default values
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit base file (extension optional).
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    let server = partial.server.as_ref();
    let storage = partial.storage.as_ref();

    let kind = match storage.and_then(|s| s.kind.as_deref()) {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!(error = %e, fallback = %default.storage.kind, "Unknown storage kind");
            default.storage.kind
        }),
        None => default.storage.kind,
    };

    let bcrypt_cost = partial
        .security
        .as_ref()
        .and_then(|s| s.bcrypt_cost)
        .unwrap_or(default.security.bcrypt_cost);
    if !(MIN_COST..=MAX_COST).contains(&bcrypt_cost) {
        return Err(ConfigError::Message(format!(
            "security.bcrypt_cost must be within {MIN_COST}..={MAX_COST}, got {bcrypt_cost}"
        )));
    }

    Ok(Settings {
        server: ServerSettings {
            host: server
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: server.and_then(|s| s.port).unwrap_or(default.server.port),
        },
        storage: StorageSettings {
            kind,
            file: storage
                .and_then(|s| s.file.clone())
                .unwrap_or(default.storage.file),
            connection_string: storage
                .and_then(|s| s.connection_string.clone())
                .unwrap_or(default.storage.connection_string),
            sled_path: storage
                .and_then(|s| s.sled_path.clone())
                .unwrap_or(default.storage.sled_path),
        },
        security: SecuritySettings { bcrypt_cost },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}
