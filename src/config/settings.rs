use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::trace::ReconstructOptions;
use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Reconstruction behavior
    pub reconstruct: ReconstructConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Output formatting
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructConfig {
    pub strict: bool,
    pub cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub pretty: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlReconstructConfig {
    pub strict: Option<bool>,
    pub cache: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlLoggingConfig {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlOutputConfig {
    pub pretty: Option<bool>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub reconstruct: Option<TomlReconstructConfig>,
    pub logging: Option<TomlLoggingConfig>,
    pub output: Option<TomlOutputConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconstruct: ReconstructConfig {
                strict: true,
                cache: true,
            },
            logging: LoggingConfig {
                level: "warn".to_string(),
            },
            output: OutputConfig { pretty: true },
        }
    }
}

impl Config {
    /// Load configuration from the default location, merging with defaults
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load configuration from `path`, merging with defaults.
    ///
    /// A missing file gives the defaults; a file that does not parse is
    /// reported and ignored.
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return Config::default(),
        };

        match toml::from_str::<TomlConfig>(&contents) {
            Ok(toml_config) => Config::default().merged(toml_config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Config::default()
            }
        }
    }

    /// Apply the values present in `toml_config` on top of `self`
    pub fn merged(mut self, toml_config: TomlConfig) -> Self {
        if let Some(reconstruct) = toml_config.reconstruct {
            if let Some(strict) = reconstruct.strict {
                self.reconstruct.strict = strict;
            }
            if let Some(cache) = reconstruct.cache {
                self.reconstruct.cache = cache;
            }
        }

        if let Some(logging) = toml_config.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
        }

        if let Some(output) = toml_config.output {
            if let Some(pretty) = output.pretty {
                self.output.pretty = pretty;
            }
        }

        self
    }

    pub fn reconstruct_options(&self) -> ReconstructOptions {
        ReconstructOptions {
            strict: self.reconstruct.strict,
        }
    }
}
