use crate::config::schema::{ModelsConfig, WeightOverride};
use std::path::PathBuf;

/// Information about a pretrained weight file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: &'static str,
    pub file_name: &'static str,
    pub url: &'static str,
    pub size_mb: u64,
    pub description: &'static str,
}

/// Registry of weights the enhancer needs
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "upscaler",
        file_name: "realesr-general-x4v3.pth",
        url: "https://github.com/xinntao/Real-ESRGAN/releases/download/v0.2.5.0/realesr-general-x4v3.pth",
        size_mb: 5,
        description: "Real-ESRGAN general x4 (v3) super-resolution",
    },
    ModelInfo {
        name: "face",
        file_name: "GFPGANv1.4.pth",
        url: "https://github.com/TencentARC/GFPGAN/releases/download/v1.3.0/GFPGANv1.4.pth",
        size_mb: 333,
        description: "GFPGAN v1.4 face restoration",
    },
];

/// A registry entry with config overrides applied and a concrete local path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightFile {
    pub name: String,
    pub url: String,
    pub path: PathBuf,
    pub size_mb: u64,
}

impl WeightFile {
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl ModelInfo {
    /// Get all model names
    #[must_use]
    pub fn all_names() -> Vec<&'static str> {
        MODELS.iter().map(|m| m.name).collect()
    }

    /// The super-resolution weights
    #[must_use]
    pub fn upscaler() -> &'static Self {
        &MODELS[0]
    }

    /// The face-restoration weights
    #[must_use]
    pub fn face() -> &'static Self {
        &MODELS[1]
    }

    /// Apply config overrides and place the file under the models directory
    #[must_use]
    pub fn resolve(&self, config: &ModelsConfig) -> WeightFile {
        let overrides: Option<&WeightOverride> = match self.name {
            "upscaler" => Some(&config.upscaler),
            "face" => Some(&config.face),
            _ => None,
        };

        let file_name = overrides
            .and_then(|o| o.file_name.as_deref())
            .unwrap_or(self.file_name);
        let url = overrides
            .and_then(|o| o.url.as_deref())
            .unwrap_or(self.url);

        WeightFile {
            name: self.name.to_string(),
            url: url.to_string(),
            path: config.dir.join(file_name),
            size_mb: self.size_mb,
        }
    }

    /// Resolve every registry entry against the config
    #[must_use]
    pub fn resolve_all(config: &ModelsConfig) -> Vec<WeightFile> {
        MODELS.iter().map(|m| m.resolve(config)).collect()
    }

    /// Find closest match using Levenshtein distance
    #[must_use]
    pub fn suggest(name: &str) -> Option<&'static str> {
        if name.is_empty() {
            return None;
        }

        MODELS
            .iter()
            .map(|m| (m.name, levenshtein_distance(name, m.name)))
            .min_by_key(|(_, dist)| *dist)
            .filter(|(_, dist)| *dist <= 2) // Only suggest if within 2 edits
            .map(|(model_name, _)| model_name)
    }
}

/// Calculate Levenshtein distance between two strings
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    if s1_chars.is_empty() {
        return s2_chars.len();
    }
    if s2_chars.is_empty() {
        return s1_chars.len();
    }

    // Single rolling row is enough for the distance alone
    let mut prev: Vec<usize> = (0..=s2_chars.len()).collect();
    let mut curr = vec![0; s2_chars.len() + 1];

    for (i, c1) in s1_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, c2) in s2_chars.iter().enumerate() {
            let cost = usize::from(c1 != c2);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[s2_chars.len()]
}
