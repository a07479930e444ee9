//! Configuration system for claimgate.
//!
//! Provides TOML-based configuration with:
//! - An `[api]` section for the claims-resolving API
//! - A `[cache]` section bounding the claims cache
//! - A `[desktop]` section for the interactive PKCE login
//! - Config file layering (XDG user config + project-local overrides)
//! - Client secret resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, xdg_config_dir,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_client_secret};
pub use types::*;
