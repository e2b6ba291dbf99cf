//! Configuration module for the relay runtime.
//!
//! Configuration is layered with figment: built-in defaults, TOML/YAML
//! files, `RELAY_*` environment variables, then programmatic overrides.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, RelayConfig, SpanEventConfig,
};
pub use validation::validate_config;
