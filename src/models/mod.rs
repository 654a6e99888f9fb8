pub mod download;
pub mod manager;
pub mod manifest;
pub mod registry;

pub use download::{ModelDownloader, Provisioned};
pub use manager::{ModelManager, ProvisionReport, WeightReport, WeightStatus};
pub use manifest::{InstalledWeight, Manifest};
pub use registry::{ModelInfo, WeightFile};
