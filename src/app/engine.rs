// LogDeck - app/engine.rs
//
// `LogEngine`: the transport-agnostic surface of LogDeck. Every operation a
// dashboard needs (default files, host detection, detected files, regex
// overrides, suggestions, live streams) is one method here.
//
// The engine holds no per-request state apart from the detection cache;
// scans for different sources share nothing and may run concurrently.

use crate::app::overrides::{override_key_path, OverrideStore};
use crate::app::scan::{self, ScanJob, ScanManager};
use crate::app::tail::{SessionInfo, StreamMultiplexer, StreamSubscription, StreamTarget};
use crate::core::{classify, discovery};
use crate::core::model::{
    Classification, CustomRegexIndex, DefaultFile, DetectedService, DetectionReport, LogKind,
    LogSourceConfig, LogicalFile, ManualFile, RegexOverride, Resolution, RotationPolicy, ScanMode,
    ScanOutcome, SessionId, Suggestion,
};
use crate::core::normalize;
use crate::core::resolver;
use crate::core::source::SourceType;
use crate::core::suggest;
use crate::platform::config::EngineConfig;
use crate::platform::rotation::{self, RotationInspector};
use crate::platform::settings::SettingsStore;
use crate::util::error::{Result, ScanError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Result of `detected_files`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFiles {
    pub base_path: PathBuf,
    pub mode: ScanMode,
    pub files: Vec<LogicalFile>,
    pub warnings: Vec<String>,
    /// The scan stopped early (time budget or file cap).
    pub truncated: bool,
}

/// Host log files split the way the host view presents them.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizedFiles {
    pub system_critical: Vec<LogicalFile>,
    /// Every other host log; each file still carries its own category.
    pub auto_detected: Vec<LogicalFile>,
}

/// Result of `detect_logging_services`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDetection {
    pub host_root: PathBuf,
    pub services: Vec<DetectedService>,
    pub categorized_files: CategorizedFiles,
    pub rotation: RotationPolicy,
    pub warnings: Vec<String>,
}

pub struct LogEngine {
    config: EngineConfig,
    settings: Arc<dyn SettingsStore>,
    overrides: OverrideStore,
    inspectors: Vec<Box<dyn RotationInspector>>,
    detection: RwLock<HashMap<PathBuf, DetectionReport>>,
    streams: StreamMultiplexer,
}

impl LogEngine {
    /// Build an engine over `settings`, loading every stored override.
    pub fn new(config: EngineConfig, settings: Arc<dyn SettingsStore>) -> Result<Self> {
        let overrides = OverrideStore::load(Arc::clone(&settings))?;
        let streams = StreamMultiplexer::new(config.stream.clone());
        tracing::debug!(
            host_root = %config.host_root.display(),
            "Engine initialised"
        );
        Ok(Self {
            config,
            settings,
            overrides,
            inspectors: rotation::default_inspectors(),
            detection: RwLock::new(HashMap::new()),
            streams,
        })
    }

    /// Replace the rotation inspectors (detection cache is cleared).
    pub fn with_inspectors(mut self, inspectors: Vec<Box<dyn RotationInspector>>) -> Self {
        self.inspectors = inspectors;
        self.detection = RwLock::new(HashMap::new());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stored settings for `source`, or its defaults.
    pub fn source_config(&self, source: SourceType) -> Result<LogSourceConfig> {
        Ok(self.settings.get_or_default(source)?)
    }

    // -------------------------------------------------------------------------
    // Listing and detection
    // -------------------------------------------------------------------------

    /// Well-known files for `source`. No filesystem access beyond reading the
    /// source's settings; a manual entry for the same path decides `enabled`.
    pub fn list_default_files(&self, source: SourceType) -> Result<Vec<DefaultFile>> {
        let config = self.source_config(source)?;
        Ok(source
            .default_files()
            .into_iter()
            .map(|mut f| {
                if let Some(m) = config.log_files.iter().find(|m| m.path == f.path) {
                    f.enabled = m.enabled;
                }
                f
            })
            .collect())
    }

    /// Cached host detection for `host_root`, running it on first use.
    pub fn detection(&self, host_root: &Path) -> DetectionReport {
        if let Some(report) = self
            .detection
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(host_root)
        {
            return report.clone();
        }
        self.refresh_detection(host_root)
    }

    /// Re-run host detection and replace the cached result.
    pub fn refresh_detection(&self, host_root: &Path) -> DetectionReport {
        let report = rotation::detect(host_root, &self.inspectors);
        self.detection
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(host_root.to_path_buf(), report.clone());
        report
    }

    /// Services, rotation setup and classified host logs under `host_root`
    /// (the configured host root when `None`).
    ///
    /// Never fails on detection problems. A host without a readable log
    /// directory yields empty file lists and a warning.
    pub fn detect_logging_services(&self, host_root: Option<&Path>) -> Result<HostDetection> {
        let host_root = host_root.unwrap_or(&self.config.host_root).to_path_buf();
        let report = self.detection(&host_root);
        let source = SourceType::HostSystem;
        let config = self.source_config(source)?;
        let base = rebase_onto(&host_root, &config.base_path);

        let mut warnings = Vec::new();
        let mut categorized = CategorizedFiles::default();
        match scan::scan_source(source, &config, &base, ScanMode::Quick, &self.config.scan, None) {
            Ok(outcome) => {
                warnings.extend(outcome.warnings.iter().cloned());
                let classification = self.classify(source, &outcome, &report.rotation, &config);
                categorized.system_critical = classification.system_critical;
                let mut rest: Vec<LogicalFile> = classification
                    .rotation_managed
                    .into_iter()
                    .chain(classification.auto_detected)
                    .chain(classification.custom)
                    .collect();
                rest.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
                categorized.auto_detected = rest;
            }
            Err(e @ (ScanError::NotFound { .. } | ScanError::NotADirectory { .. })) => {
                tracing::warn!(base = %base.display(), error = %e, "No host log directory");
                warnings.push(e.to_string());
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            host_root = %host_root.display(),
            services = report.services.len(),
            system_critical = categorized.system_critical.len(),
            other = categorized.auto_detected.len(),
            "Host logging services detected"
        );

        Ok(HostDetection {
            host_root,
            services: report.services,
            categorized_files: categorized,
            rotation: report.rotation,
            warnings,
        })
    }

    /// Scan and classify one source's files.
    ///
    /// `base` overrides the configured base path; a configured base is
    /// resolved under the engine's host root, an explicit one is used as is.
    /// Missing or unreadable base paths are errors, never an empty list.
    pub fn detected_files(
        &self,
        source: SourceType,
        base: Option<&Path>,
        mode: ScanMode,
    ) -> Result<DetectedFiles> {
        let config = self.source_config(source)?;
        let base = self.resolve_base(source, &config, base);
        let outcome = scan::scan_source(source, &config, &base, mode, &self.config.scan, None)?;
        let policy = self.detection(&self.config.host_root).rotation;
        let files = self.classify(source, &outcome, &policy, &config).into_sorted();

        Ok(DetectedFiles {
            base_path: base,
            mode,
            files,
            warnings: outcome.warnings,
            truncated: outcome.truncated,
        })
    }

    /// Run a full scan of `source` on a background thread. Poll the returned
    /// manager for the classified result.
    pub fn start_full_scan(&self, source: SourceType, base: Option<&Path>) -> Result<ScanManager> {
        let config = self.source_config(source)?;
        let base = self.resolve_base(source, &config, base);
        let policy = self.detection(&self.config.host_root).rotation;
        let overrides = self.overrides.for_source(source);
        let manual = config.log_files.clone();

        let mut manager = ScanManager::new();
        manager.start_scan(
            ScanJob {
                source,
                config,
                base,
                limits: self.config.scan.clone(),
            },
            move |outcome| {
                classify_with(source, outcome, &policy, &manual, &overrides).into_sorted()
            },
        );
        Ok(manager)
    }

    fn resolve_base(
        &self,
        source: SourceType,
        config: &LogSourceConfig,
        explicit: Option<&Path>,
    ) -> PathBuf {
        match explicit {
            Some(b) => b.to_path_buf(),
            None if config.base_path.as_os_str().is_empty() => {
                rebase_onto(&self.config.host_root, &source.default_base_path())
            }
            None => rebase_onto(&self.config.host_root, &config.base_path),
        }
    }

    fn classify(
        &self,
        source: SourceType,
        outcome: &ScanOutcome,
        policy: &RotationPolicy,
        config: &LogSourceConfig,
    ) -> Classification {
        let overrides = self.overrides.for_source(source);
        classify_with(source, outcome, policy, &config.log_files, &overrides)
    }

    // -------------------------------------------------------------------------
    // Regex configuration
    // -------------------------------------------------------------------------

    /// Effective regex for one file of `source`.
    ///
    /// The kind is decided exactly as classification decides it, so this
    /// always agrees with the `effective_regex` a scan reports.
    pub fn regex_config(&self, source: SourceType, path: &Path) -> Result<Resolution> {
        let config = self.source_config(source)?;
        let logical = normalize::normalize(path);
        let existing = self.overrides.get(source, &logical);
        let manual = config
            .log_files
            .iter()
            .find(|m| normalize::normalize(&m.path) == logical);
        let declared = discovery::declared_kind(source, &config, path);
        let kind = classify::decide_kind(source, &logical, declared, manual);
        Ok(resolver::resolve(source, kind, existing.as_ref()))
    }

    /// Save an override. An invalid pattern fails with `InvalidPattern` and
    /// leaves any previous override in place.
    pub fn put_regex_config(
        &self,
        source: SourceType,
        path: &Path,
        regex: &str,
        log_type: LogKind,
    ) -> Result<Resolution> {
        self.overrides.save(source, path, regex, log_type)?;
        self.regex_config(source, path)
    }

    /// Remove an override; succeeds when none exists. Returns the reverted
    /// resolution.
    pub fn delete_regex_config(&self, source: SourceType, path: &Path) -> Result<Resolution> {
        self.overrides.delete(source, path)?;
        self.regex_config(source, path)
    }

    pub fn generate_regex(&self, sample: &str) -> Suggestion {
        suggest::suggest(sample)
    }

    pub fn list_custom_regexes(&self) -> CustomRegexIndex {
        self.overrides.all()
    }

    // -------------------------------------------------------------------------
    // Streams
    // -------------------------------------------------------------------------

    /// Start following one logical file of `source` with its resolved regex
    /// and the source's `max_lines`/`read_compressed` settings.
    pub fn open_stream(&self, source: SourceType, path: &Path) -> Result<StreamSubscription> {
        let config = self.source_config(source)?;
        let resolution = self.regex_config(source, path)?;
        let subscription = self.streams.open(StreamTarget {
            logical_path: normalize::normalize(path),
            regex: resolution.regex,
            max_lines: config.max_lines,
            read_compressed: config.read_compressed,
        })?;
        Ok(subscription)
    }

    pub fn close_stream(&self, id: SessionId) -> bool {
        self.streams.close(id)
    }

    pub fn stream_sessions(&self) -> Vec<SessionInfo> {
        self.streams.sessions()
    }

    /// Close every stream session.
    pub fn shutdown(&self) {
        self.streams.shutdown();
    }
}

fn classify_with(
    source: SourceType,
    outcome: &ScanOutcome,
    policy: &RotationPolicy,
    manual: &[ManualFile],
    overrides: &BTreeMap<String, RegexOverride>,
) -> Classification {
    classify::classify(source, &outcome.files, policy, manual, |path, kind| {
        resolver::resolve(source, kind, overrides.get(&override_key_path(path)))
    })
}

/// Map an absolute host path under `host_root`.
fn rebase_onto(host_root: &Path, path: &Path) -> PathBuf {
    if host_root == Path::new("/") || host_root.as_os_str().is_empty() {
        return path.to_path_buf();
    }
    match path.strip_prefix("/") {
        Ok(rel) => host_root.join(rel),
        Err(_) => host_root.join(path),
    }
}
