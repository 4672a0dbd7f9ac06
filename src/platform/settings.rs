// LogDeck - platform/settings.rs
//
// Per-source settings persistence. The engine only needs get/put of a whole
// `LogSourceConfig`; where the blob lives is up to the store.
//
// `JsonFileSettingsStore` keeps one `<source-id>.json` per source and writes
// atomically (temp file, then rename) so a crash mid-save leaves the previous
// blob intact. `MemorySettingsStore` is the in-process equivalent.

use crate::core::model::LogSourceConfig;
use crate::core::source::SourceType;
use crate::util::error::SettingsError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Key/value store of per-source settings blobs.
pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored for `source` yet.
    fn get(&self, source: SourceType) -> Result<Option<LogSourceConfig>, SettingsError>;

    fn put(&self, source: SourceType, config: &LogSourceConfig) -> Result<(), SettingsError>;

    /// Stored settings, or the source's defaults when none exist.
    fn get_or_default(&self, source: SourceType) -> Result<LogSourceConfig, SettingsError> {
        Ok(self
            .get(source)?
            .unwrap_or_else(|| source.default_config()))
    }
}

// =============================================================================
// JSON files
// =============================================================================

/// One pretty-printed JSON file per source under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
    dir: PathBuf,
}

impl JsonFileSettingsStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, source: SourceType) -> PathBuf {
        self.dir.join(format!("{}.json", source.id()))
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self, source: SourceType) -> Result<Option<LogSourceConfig>, SettingsError> {
        let path = self.path_for(source);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SettingsError::Io { path, source: e }),
        };
        let config = serde_json::from_str(&content)
            .map_err(|e| SettingsError::Json {
                path: path.clone(),
                source: e,
            })?;
        tracing::debug!(source = %source, path = %path.display(), "Settings loaded");
        Ok(Some(config))
    }

    fn put(&self, source: SourceType, config: &LogSourceConfig) -> Result<(), SettingsError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SettingsError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let path = self.path_for(source);
        let json = serde_json::to_string_pretty(config).map_err(|e| SettingsError::Json {
            path: path.clone(),
            source: e,
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes()).map_err(|e| SettingsError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(SettingsError::Io { path, source: e });
        }

        tracing::debug!(source = %source, path = %path.display(), "Settings saved");
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    blobs: RwLock<HashMap<SourceType, LogSourceConfig>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with one blob.
    pub fn with(source: SourceType, config: LogSourceConfig) -> Self {
        let store = Self::new();
        if let Ok(mut blobs) = store.blobs.write() {
            blobs.insert(source, config);
        }
        store
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, source: SourceType) -> Result<Option<LogSourceConfig>, SettingsError> {
        let blobs = self.blobs.read().unwrap_or_else(|p| p.into_inner());
        Ok(blobs.get(&source).cloned())
    }

    fn put(&self, source: SourceType, config: &LogSourceConfig) -> Result<(), SettingsError> {
        let mut blobs = self.blobs.write().unwrap_or_else(|p| p.into_inner());
        blobs.insert(source, config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{LogKind, ManualFile, RegexOverride};

    fn sample_config() -> LogSourceConfig {
        let mut cfg = SourceType::Nginx.default_config();
        cfg.log_files.push(ManualFile {
            path: PathBuf::from("/srv/app/app.log"),
            log_type: LogKind::Custom,
            enabled: false,
        });
        cfg.custom_regex.insert(
            "/var/log/nginx/access.log".to_string(),
            RegexOverride {
                regex: r"^(?P<message>.*)$".to_string(),
                log_type: LogKind::Access,
                updated_at: chrono::Utc::now(),
            },
        );
        cfg
    }

    #[test]
    fn test_json_store_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettingsStore::new(dir.path().join("settings"));
        assert!(store.get(SourceType::Nginx).unwrap().is_none());
        let defaults = store.get_or_default(SourceType::Nginx).unwrap();
        assert_eq!(defaults, SourceType::Nginx.default_config());
    }

    #[test]
    fn test_json_store_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettingsStore::new(dir.path().join("settings"));
        let cfg = sample_config();
        store.put(SourceType::Nginx, &cfg).unwrap();

        assert_eq!(store.get(SourceType::Nginx).unwrap(), Some(cfg));
        assert!(store.get(SourceType::Apache).unwrap().is_none());
        assert!(!store.path_for(SourceType::Nginx).with_extension("json.tmp").exists());

        let raw = std::fs::read_to_string(store.path_for(SourceType::Nginx)).unwrap();
        assert!(raw.contains("\"customRegex\""));
        assert!(raw.contains("\"logFiles\""));
    }

    #[test]
    fn test_json_store_malformed_blob_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettingsStore::new(dir.path());
        std::fs::write(store.path_for(SourceType::Apache), "{ not json").unwrap();
        let err = store.get(SourceType::Apache).unwrap_err();
        assert!(matches!(err, SettingsError::Json { .. }));
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySettingsStore::with(SourceType::Npm, sample_config());
        assert!(store.get(SourceType::Npm).unwrap().is_some());
        assert!(store.get(SourceType::HostSystem).unwrap().is_none());
        store
            .put(SourceType::HostSystem, &SourceType::HostSystem.default_config())
            .unwrap();
        assert!(store.get(SourceType::HostSystem).unwrap().is_some());
    }
}
