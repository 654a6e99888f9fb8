use crate::config::schema::Config;
use crate::error::{RestoreError, Result};
use crate::models::download::{ModelDownloader, Provisioned};
use crate::models::manifest::{file_checksum, manifest_path, InstalledWeight, Manifest};
use crate::models::registry::{ModelInfo, WeightFile};
use std::path::PathBuf;

/// Health of one weight file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightStatus {
    Ready,
    Missing,
    ChecksumMismatch { expected: String, actual: String },
}

/// Verification result for one weight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightReport {
    pub name: String,
    pub path: PathBuf,
    pub status: WeightStatus,
}

/// Outcome of provisioning every registered weight
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, RestoreError)>,
}

impl ProvisionReport {
    /// True when every weight is now on disk
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Model manager for provisioning and verifying weight files
pub struct ModelManager {
    weights: Vec<WeightFile>,
    manifest: Manifest,
    manifest_path: PathBuf,
    downloader: ModelDownloader,
}

impl ModelManager {
    /// Create new model manager for the configured models directory
    pub fn new(config: &Config) -> Result<Self> {
        let weights = ModelInfo::resolve_all(&config.models);
        let manifest_path = manifest_path(&config.models.dir);

        // Load or rebuild from whatever is already on disk
        let manifest = if manifest_path.exists() {
            Manifest::load(&manifest_path)?
        } else {
            Manifest::regenerate_from_disk(&weights)
        };

        let downloader = ModelDownloader::new(&config.models.dir, &config.download)?;

        Ok(Self {
            weights,
            manifest,
            manifest_path,
            downloader,
        })
    }

    /// Show download progress bars
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.downloader = self.downloader.with_progress(show_progress);
        self
    }

    /// Look up a weight by registry name
    #[must_use]
    pub fn weight(&self, name: &str) -> Option<&WeightFile> {
        self.weights.iter().find(|w| w.name == name)
    }

    /// Pair each weight with its manifest record, if any
    #[must_use]
    pub fn list(&self) -> Vec<(&WeightFile, Option<&InstalledWeight>)> {
        self.weights
            .iter()
            .map(|w| (w, self.manifest.find_weight(&w.name)))
            .collect()
    }

    /// Provision one weight by name
    pub async fn download(&mut self, name: &str) -> Result<Provisioned> {
        let weight = self.weight(name).cloned().ok_or_else(|| {
            let hint = ModelInfo::suggest(name)
                .map(|s| format!(" Did you mean '{s}'?"))
                .unwrap_or_default();
            RestoreError::Other(format!(
                "Unknown weight '{name}'.{hint} Available: {}",
                ModelInfo::all_names().join(", ")
            ))
        })?;

        let outcome = self.downloader.ensure(&weight).await?;
        if let Provisioned::Downloaded(installed) = &outcome {
            self.manifest.add_weight(installed.clone());
            self.save_manifest()?;
        }

        Ok(outcome)
    }

    /// Provision every weight, continuing past individual failures
    ///
    /// Download failures are collected in the report; only a manifest write
    /// failure aborts.
    pub async fn download_all(&mut self) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::default();

        for weight in self.weights.clone() {
            match self.downloader.ensure(&weight).await {
                Ok(Provisioned::AlreadyPresent(_)) => report.skipped.push(weight.name),
                Ok(Provisioned::Downloaded(installed)) => {
                    self.manifest.add_weight(installed);
                    self.save_manifest()?;
                    report.downloaded.push(weight.name);
                }
                Err(e) => {
                    tracing::warn!("Failed to provision {}: {e}", weight.name);
                    report.failed.push((weight.name, e));
                }
            }
        }

        Ok(report)
    }

    /// Check every weight exists and still matches its recorded checksum
    pub fn verify(&self) -> Result<Vec<WeightReport>> {
        self.weights
            .iter()
            .map(|weight| {
                let status = self.weight_status(weight)?;
                Ok(WeightReport {
                    name: weight.name.clone(),
                    path: weight.path.clone(),
                    status,
                })
            })
            .collect()
    }

    fn weight_status(&self, weight: &WeightFile) -> Result<WeightStatus> {
        if !weight.path.is_file() {
            return Ok(WeightStatus::Missing);
        }

        let expected = self
            .manifest
            .find_weight(&weight.name)
            .filter(|installed| installed.file_name == weight.file_name())
            .and_then(|installed| installed.checksum.clone());

        let Some(expected) = expected else {
            return Ok(WeightStatus::Ready);
        };

        let actual = file_checksum(&weight.path)?;
        if actual == expected {
            Ok(WeightStatus::Ready)
        } else {
            Ok(WeightStatus::ChecksumMismatch { expected, actual })
        }
    }

    /// Save manifest to disk
    fn save_manifest(&self) -> Result<()> {
        self.manifest.save(&self.manifest_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.models.dir = dir.to_path_buf();
        config
    }

    #[test]
    #[serial]
    fn test_verify_reports_missing() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ModelManager::new(&config_in(temp_dir.path())).unwrap();

        let reports = manager.verify().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status == WeightStatus::Missing));
    }

    #[test]
    #[serial]
    fn test_verify_untracked_file_is_ready() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("realesr-general-x4v3.pth"), "weights").unwrap();

        let manager = ModelManager::new(&config_in(temp_dir.path())).unwrap();
        let reports = manager.verify().unwrap();

        assert_eq!(reports[0].name, "upscaler");
        assert_eq!(reports[0].status, WeightStatus::Ready);
        assert_eq!(reports[1].status, WeightStatus::Missing);
    }

    #[test]
    #[serial]
    fn test_verify_detects_checksum_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let weight_path = temp_dir.path().join("GFPGANv1.4.pth");
        fs::write(&weight_path, "tampered").unwrap();

        let mut manifest = Manifest::default();
        manifest.add_weight(InstalledWeight {
            name: "face".to_string(),
            file_name: "GFPGANv1.4.pth".to_string(),
            size_bytes: 8,
            checksum: Some(blake3::hash(b"original").to_hex().to_string()),
            downloaded_at: "2026-01-01T00:00:00Z".to_string(),
        });
        manifest.save(&manifest_path(temp_dir.path())).unwrap();

        let manager = ModelManager::new(&config_in(temp_dir.path())).unwrap();
        let reports = manager.verify().unwrap();

        assert!(matches!(
            reports[1].status,
            WeightStatus::ChecksumMismatch { .. }
        ));
    }

    #[test]
    #[serial]
    fn test_list_pairs_manifest_records() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("GFPGANv1.4.pth"), "weights").unwrap();

        let manager = ModelManager::new(&config_in(temp_dir.path())).unwrap();
        let listing = manager.list();

        assert_eq!(listing.len(), 2);
        assert!(listing[0].1.is_none());
        assert_eq!(listing[1].1.map(|w| w.size_bytes), Some(7));
    }

    #[tokio::test]
    #[serial]
    async fn test_download_unknown_name_suggests() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ModelManager::new(&config_in(temp_dir.path())).unwrap();

        let err = manager.download("upscalr").await.unwrap_err();
        assert!(err.to_string().contains("Did you mean 'upscaler'?"));
    }
}
