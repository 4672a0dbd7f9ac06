// LogDeck - app/overrides.rs
//
// Shared store of regex overrides, keyed by (source, logical path).
//
// Concurrency:
//   - Reads take the `RwLock` read side only and never wait on each other.
//   - Writers to the same key are serialized by that key's mutex, which is
//     held across persisting and publishing. The last writer wins.
//   - Writers to different keys of the same source share one settings blob,
//     so the blob's get-modify-put is serialized per source. That section
//     covers only the settings-store round trip.
//   - Lock order is always key -> source persist -> data.
//
// An invalid pattern is rejected before any lock is taken; nothing is stored.

use crate::core::model::{CustomRegexIndex, LogKind, OverrideKey, RegexOverride};
use crate::core::normalize;
use crate::core::resolver;
use crate::core::source::SourceType;
use crate::platform::settings::SettingsStore;
use crate::util::error::{EngineError, SettingsError};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

type SourceOverrides = BTreeMap<String, RegexOverride>;

pub struct OverrideStore {
    settings: Arc<dyn SettingsStore>,
    data: RwLock<HashMap<SourceType, SourceOverrides>>,
    key_locks: Mutex<HashMap<OverrideKey, Arc<Mutex<()>>>>,
    persist_locks: HashMap<SourceType, Mutex<()>>,
}

/// Overrides are keyed by logical path, so rotated names address the same
/// entry as their base file.
pub fn override_key_path(path: &Path) -> String {
    normalize::normalize(path).to_string_lossy().into_owned()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl OverrideStore {
    /// Load every source's overrides from `settings`.
    pub fn load(settings: Arc<dyn SettingsStore>) -> Result<Self, SettingsError> {
        let mut data = HashMap::new();
        for source in SourceType::all() {
            if let Some(config) = settings.get(*source)? {
                if !config.custom_regex.is_empty() {
                    tracing::debug!(
                        source = %source,
                        count = config.custom_regex.len(),
                        "Loaded regex overrides"
                    );
                }
                data.insert(*source, config.custom_regex);
            }
        }
        Ok(Self {
            settings,
            data: RwLock::new(data),
            key_locks: Mutex::new(HashMap::new()),
            persist_locks: SourceType::all()
                .iter()
                .map(|s| (*s, Mutex::new(())))
                .collect(),
        })
    }

    pub fn get(&self, source: SourceType, path: &Path) -> Option<RegexOverride> {
        let key = override_key_path(path);
        let data = self.data.read().unwrap_or_else(|p| p.into_inner());
        data.get(&source).and_then(|m| m.get(&key)).cloned()
    }

    /// Snapshot of one source's overrides.
    pub fn for_source(&self, source: SourceType) -> SourceOverrides {
        let data = self.data.read().unwrap_or_else(|p| p.into_inner());
        data.get(&source).cloned().unwrap_or_default()
    }

    /// Every override of every source. Sources without overrides are omitted.
    pub fn all(&self) -> CustomRegexIndex {
        let data = self.data.read().unwrap_or_else(|p| p.into_inner());
        data.iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(s, m)| (s.id().to_string(), m.clone()))
            .collect()
    }

    /// Validate and store an override, replacing any previous one for the
    /// same key. Returns the stored entry.
    pub fn save(
        &self,
        source: SourceType,
        path: &Path,
        regex: &str,
        log_type: LogKind,
    ) -> Result<RegexOverride, EngineError> {
        resolver::validate_pattern(regex)?;

        let key = OverrideKey {
            source,
            logical_path: override_key_path(path),
        };
        let key_lock = self.key_lock(&key);
        let _key_guard = lock(&key_lock);

        let entry = RegexOverride {
            regex: regex.to_string(),
            log_type,
            updated_at: Utc::now(),
        };

        self.persist(source, |map| {
            map.insert(key.logical_path.clone(), entry.clone());
        })?;

        tracing::info!(
            source = %source,
            path = %key.logical_path,
            log_type = %log_type,
            "Regex override saved"
        );
        Ok(entry)
    }

    /// Remove an override. Removing one that does not exist is not an error;
    /// returns whether anything was removed.
    pub fn delete(&self, source: SourceType, path: &Path) -> Result<bool, EngineError> {
        let key = OverrideKey {
            source,
            logical_path: override_key_path(path),
        };
        let key_lock = self.key_lock(&key);
        let _key_guard = lock(&key_lock);

        let mut removed = false;
        self.persist(source, |map| {
            removed = map.remove(&key.logical_path).is_some();
        })?;

        if removed {
            tracing::info!(source = %source, path = %key.logical_path, "Regex override deleted");
        } else {
            tracing::debug!(source = %source, path = %key.logical_path, "No override to delete");
        }
        Ok(removed)
    }

    fn key_lock(&self, key: &OverrideKey) -> Arc<Mutex<()>> {
        let mut locks = lock(&self.key_locks);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Apply `edit` to the source's persisted override map, write the blob
    /// back, then publish the new map to readers.
    fn persist<F>(&self, source: SourceType, edit: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut SourceOverrides),
    {
        let _persist_guard = self.persist_locks.get(&source).map(lock);

        let mut config = self.settings.get_or_default(source)?;
        let before = config.custom_regex.clone();
        edit(&mut config.custom_regex);
        if config.custom_regex != before {
            self.settings.put(source, &config)?;
        }

        let mut data = self.data.write().unwrap_or_else(|p| p.into_inner());
        data.insert(source, config.custom_regex);
        Ok(())
    }
}
