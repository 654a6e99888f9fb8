use crate::error::{RestoreError, Result};
use crate::models::registry::WeightFile;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the manifest inside the models directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Information about an installed weight file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledWeight {
    pub name: String,
    pub file_name: String,
    pub size_bytes: u64,
    /// BLAKE3 hex digest recorded at download time
    pub checksum: Option<String>,
    pub downloaded_at: String,
}

/// Manifest tracking installed weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub weights: Vec<InstalledWeight>,
    pub last_updated: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            weights: Vec::new(),
            last_updated: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl Manifest {
    /// Load manifest from file, empty if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;

        serde_json::from_str(&content)
            .map_err(|e| RestoreError::Config(format!("Failed to parse manifest: {e}")))
    }

    /// Save manifest to file atomically (tmp + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RestoreError::Config(format!("Failed to serialize manifest: {e}")))?;

        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, path)?;

        Ok(())
    }

    /// Add or update a weight in the manifest
    pub fn add_weight(&mut self, weight: InstalledWeight) {
        self.weights.retain(|w| w.name != weight.name);
        self.weights.push(weight);
        self.last_updated = chrono::Utc::now().to_rfc3339();
    }

    /// Find installed weight by name
    #[must_use]
    pub fn find_weight(&self, name: &str) -> Option<&InstalledWeight> {
        self.weights.iter().find(|w| w.name == name)
    }

    /// Rebuild the manifest from weight files already on disk
    ///
    /// Files placed by hand have no recorded checksum.
    pub fn regenerate_from_disk(weights: &[WeightFile]) -> Self {
        let mut manifest = Self::default();

        for weight in weights {
            let Ok(metadata) = fs::metadata(&weight.path) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            manifest.add_weight(InstalledWeight {
                name: weight.name.clone(),
                file_name: weight.file_name(),
                size_bytes: metadata.len(),
                checksum: None,
                downloaded_at: chrono::Utc::now().to_rfc3339(),
            });
        }

        manifest
    }
}

/// Get manifest path inside a models directory
#[must_use]
pub fn manifest_path(models_dir: &Path) -> PathBuf {
    models_dir.join(MANIFEST_FILE)
}

/// BLAKE3 hex digest of a file, streamed
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn weight(name: &str, size_bytes: u64) -> InstalledWeight {
        InstalledWeight {
            name: name.to_string(),
            file_name: format!("{name}.pth"),
            size_bytes,
            checksum: None,
            downloaded_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_default_manifest() {
        let manifest = Manifest::default();
        assert!(manifest.weights.is_empty());
        assert!(!manifest.last_updated.is_empty());
    }

    #[test]
    fn test_add_weight_updates_existing() {
        let mut manifest = Manifest::default();
        manifest.add_weight(weight("face", 100));
        manifest.add_weight(weight("face", 200));

        assert_eq!(manifest.weights.len(), 1);
        assert_eq!(manifest.weights[0].size_bytes, 200);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = manifest_path(temp_dir.path());

        let mut manifest = Manifest::default();
        manifest.add_weight(InstalledWeight {
            checksum: Some("abc123".to_string()),
            downloaded_at: "2026-01-01T00:00:00Z".to_string(),
            ..weight("upscaler", 5_000_000)
        });
        manifest.save(&path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let loaded = Manifest::load(&path).unwrap();
        let found = loaded.find_weight("upscaler").unwrap();
        assert_eq!(found.checksum.as_deref(), Some("abc123"));
        assert_eq!(found.downloaded_at, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn test_load_nonexistent_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = Manifest::load(&temp_dir.path().join("missing.json")).unwrap();
        assert!(manifest.weights.is_empty());
    }

    #[test]
    fn test_load_corrupt_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let path = manifest_path(temp_dir.path());
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Manifest::load(&path),
            Err(RestoreError::Config(_))
        ));
    }

    #[test]
    fn test_regenerate_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("present.pth"), "fake weights").unwrap();

        let weights = vec![
            WeightFile {
                name: "upscaler".to_string(),
                url: "https://example.invalid/present.pth".to_string(),
                path: temp_dir.path().join("present.pth"),
                size_mb: 1,
            },
            WeightFile {
                name: "face".to_string(),
                url: "https://example.invalid/absent.pth".to_string(),
                path: temp_dir.path().join("absent.pth"),
                size_mb: 1,
            },
        ];

        let manifest = Manifest::regenerate_from_disk(&weights);
        assert_eq!(manifest.weights.len(), 1);

        let found = manifest.find_weight("upscaler").unwrap();
        assert_eq!(found.file_name, "present.pth");
        assert_eq!(found.size_bytes, 12);
        assert!(found.checksum.is_none());
    }

    #[test]
    fn test_file_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("weights.bin");
        fs::write(&path, b"hello").unwrap();

        let checksum = file_checksum(&path).unwrap();
        assert_eq!(checksum, blake3::hash(b"hello").to_hex().to_string());
    }
}
