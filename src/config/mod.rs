//! Configuration module for restorer
//!
//! Loads config from `$XDG_CONFIG_HOME/restorer/config.toml` or `~/.config/restorer/config.toml`.
//! Falls back to built-in defaults if the file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//!
//! # Example
//!
//! ```no_run
//! use restorer::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Upscaler scale: {}", config.upscaler.scale);
//! println!("Models dir: {}", config.models.dir.display());
//! ```

pub mod schema;

pub use schema::{Config, FaceConfig, UpscalerConfig};
