use crate::config::schema::DownloadConfig;
use crate::error::{DownloadError, RestoreError, Result};
use crate::models::manifest::InstalledWeight;
use crate::models::registry::WeightFile;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Outcome of provisioning a single weight file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// The target file was already on disk; nothing was fetched
    AlreadyPresent(PathBuf),
    /// The file was fetched and moved into place
    Downloaded(InstalledWeight),
}

/// Weight downloader with progress tracking
pub struct ModelDownloader {
    models_dir: PathBuf,
    client: reqwest::Client,
    show_progress: bool,
}

impl ModelDownloader {
    /// Create new downloader writing into `models_dir`
    pub fn new(models_dir: &Path, config: &DownloadConfig) -> Result<Self> {
        fs::create_dir_all(models_dir)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("restorer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DownloadError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            models_dir: models_dir.to_path_buf(),
            client,
            show_progress: false,
        })
    }

    /// Render a progress bar on stderr while downloading
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Download the weight unless its target file already exists
    pub async fn ensure(&self, weight: &WeightFile) -> Result<Provisioned> {
        if weight.path.exists() {
            tracing::info!(
                "{} already present at {}, skipping download",
                weight.name,
                weight.path.display()
            );
            return Ok(Provisioned::AlreadyPresent(weight.path.clone()));
        }

        self.download(weight).await.map(Provisioned::Downloaded)
    }

    /// Stream a weight file to disk
    ///
    /// The body goes to `<file>.part` first and is renamed into place once
    /// complete, so the target path never holds a truncated file.
    pub async fn download(&self, weight: &WeightFile) -> Result<InstalledWeight> {
        self.check_disk_space(weight.size_mb)?;

        tracing::info!("Downloading {} from {}", weight.name, weight.url);

        let response = self
            .client
            .get(&weight.url)
            .send()
            .await
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: weight.url.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        if let Some(parent) = weight.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let part_path = part_path(&weight.path);
        let progress = self.progress_bar(response.content_length(), &weight.name);

        let (size_bytes, checksum) = match stream_to_file(response, &part_path, &progress).await {
            Ok(written) => written,
            Err(e) => {
                progress.abandon();
                if let Err(rm_err) = tokio::fs::remove_file(&part_path).await {
                    tracing::debug!("Could not remove {}: {rm_err}", part_path.display());
                }
                return Err(e);
            }
        };

        tokio::fs::rename(&part_path, &weight.path).await?;
        progress.finish_and_clear();

        tracing::info!(
            "Downloaded {} ({})",
            weight.path.display(),
            format_bytes(size_bytes)
        );

        Ok(InstalledWeight {
            name: weight.name.clone(),
            file_name: weight.file_name(),
            size_bytes,
            checksum: Some(checksum),
            downloaded_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Check if enough disk space is available
    fn check_disk_space(&self, required_mb: u64) -> Result<()> {
        let stats = nix::sys::statvfs::statvfs(&self.models_dir)
            .map_err(|e| RestoreError::Other(format!("Failed to check disk space: {e}")))?;

        #[allow(clippy::unnecessary_cast)] // widths differ across platforms
        let available_bytes = stats.blocks_available() as u64 * stats.block_size() as u64;
        let required_bytes = required_mb * 1_024 * 1_024;

        // 50MB headroom on top of the file itself
        let required_with_buffer = required_bytes + (50 * 1_024 * 1_024);

        if available_bytes < required_with_buffer {
            return Err(DownloadError::DiskSpace {
                required_mb: required_with_buffer / (1_024 * 1_024),
                available_mb: available_bytes / (1_024 * 1_024),
            }
            .into());
        }

        Ok(())
    }

    fn progress_bar(&self, total: Option<u64>, name: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
                );
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        bar.set_message(name.to_string());
        bar
    }
}

/// Write the response body to `path`, returning bytes written and BLAKE3 digest
async fn stream_to_file(
    response: reqwest::Response,
    path: &Path,
    progress: &ProgressBar,
) -> Result<(u64, String)> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(item) = stream.next().await {
        let chunk = item.map_err(|e| DownloadError::Network(e.to_string()))?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);

        downloaded += chunk.len() as u64;
        progress.set_position(downloaded);
    }

    file.flush().await?;

    Ok((downloaded, hasher.finalize().to_hex().to_string()))
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_572_864), "1.50 MB");
        assert_eq!(format_bytes(1_610_612_736), "1.50 GB");
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("models/GFPGANv1.4.pth")),
            PathBuf::from("models/GFPGANv1.4.pth.part")
        );
    }

    #[test]
    #[serial]
    fn test_new_creates_models_dir() {
        let temp_dir = TempDir::new().unwrap();
        let models_dir = temp_dir.path().join("nested/models");

        ModelDownloader::new(&models_dir, &DownloadConfig::default()).unwrap();
        assert!(models_dir.is_dir());
    }

    #[test]
    #[serial]
    fn test_disk_space_rejects_absurd_requirement() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = ModelDownloader::new(temp_dir.path(), &DownloadConfig::default()).unwrap();

        let err = downloader.check_disk_space(u64::MAX / (1_024 * 1_024 * 2)).unwrap_err();
        assert!(matches!(
            err,
            RestoreError::Download(DownloadError::DiskSpace { .. })
        ));
    }

    #[tokio::test]
    #[serial]
    async fn test_ensure_skips_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("weights.pth");
        fs::write(&path, "already here").unwrap();

        let downloader = ModelDownloader::new(temp_dir.path(), &DownloadConfig::default()).unwrap();
        // Unroutable URL: reaching the network would fail the test
        let weight = WeightFile {
            name: "upscaler".to_string(),
            url: "http://127.0.0.1:1/never".to_string(),
            path: path.clone(),
            size_mb: 1,
        };

        let outcome = downloader.ensure(&weight).await.unwrap();
        assert_eq!(outcome, Provisioned::AlreadyPresent(path.clone()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "already here");
    }
}
