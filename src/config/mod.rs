mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{HubSettings, LogSettings, ServerSettings, Settings, UpstreamSettings};

/// Loads the configuration from files and environment variables.
///
/// Sources, later ones overriding earlier ones:
/// - `config/default.*` (optional)
/// - `config.*` in the working directory (optional)
/// - `path`, when given (required)
/// - `RELAY_*` environment variables, nested with `__`
///   (e.g. `RELAY_UPSTREAM__TOPIC`)
///
/// Anything left unset falls back to `Settings::default()`.
pub fn load_config(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name("config").required(false));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::merge(partial))
}

#[cfg(test)]
mod tests;
