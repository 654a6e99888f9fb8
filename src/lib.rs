pub mod config;
pub mod enhance;
pub mod error;
pub mod models;
pub mod utils;

pub use enhance::ImageEnhancer;
pub use error::{RestoreError, Result};
