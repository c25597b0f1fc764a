//! UI string dictionaries
//!
//! Files live under the configured directory as `strings.<lang>.json`, each a
//! flat JSON object of key to text. Only `en` and `ar` exist; any other
//! language resolves to `en`.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use roster_core::LocalizationConfig;
use tracing::debug;

use crate::error::AppError;

pub const DEFAULT_LANGUAGE: &str = "en";

pub type Dictionary = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct LocalizationService {
    directory: PathBuf,
}

impl From<&LocalizationConfig> for LocalizationService {
    fn from(config: &LocalizationConfig) -> Self {
        Self::new(&config.directory)
    }
}

/// Supported language code for a requested one
pub fn resolve_language(lang: &str) -> &'static str {
    let lang = lang.trim();
    if lang.eq_ignore_ascii_case("ar") {
        "ar"
    } else {
        DEFAULT_LANGUAGE
    }
}

impl LocalizationService {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, lang: &str) -> PathBuf {
        self.directory
            .join(format!("strings.{}.json", resolve_language(lang)))
    }

    /// Dictionary for `lang`; empty when the file does not exist
    pub async fn strings(&self, lang: &str) -> Result<Dictionary, AppError> {
        let path = self.path_for(lang);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Localization file missing");
                return Ok(Dictionary::new());
            }
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        serde_json::from_str(&content)
            .map_err(|e| AppError::Internal(format!("Malformed {}: {e}", path.display())))
    }
}
