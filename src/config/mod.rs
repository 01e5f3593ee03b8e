mod settings;

pub use settings::{
    Config, LoggingConfig, OutputConfig, ReconstructConfig, TomlConfig, EXAMPLE_CONFIG,
};
