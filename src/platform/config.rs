// LogDeck - platform/config.rs
//
// Platform directory resolution and config.toml loading with startup
// validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::discovery::ScanLimits;
use crate::core::model::Backpressure;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for LogDeck data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logdeck/)
    pub config_dir: PathBuf,

    /// Data directory; holds the default settings store.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();
            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );
            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
                data_dir: PathBuf::from("."),
            }
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }

    pub fn default_settings_dir(&self) -> PathBuf {
        self.data_dir.join(constants::SETTINGS_DIR_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub engine: EngineSection,
    pub scan: ScanSection,
    pub stream: StreamSection,
    pub logging: LoggingSection,
}

/// `[engine]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Root under which host files (`etc/`, `var/log/`, `run/`) are found.
    pub host_root: Option<String>,
    /// Directory of the JSON settings store.
    pub settings_dir: Option<String>,
}

/// `[scan]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ScanSection {
    pub quick_max_depth: Option<usize>,
    pub full_max_depth: Option<usize>,
    pub quick_time_budget_ms: Option<u64>,
    pub max_files: Option<usize>,
    /// Header lines sampled per file in full mode.
    pub sample_lines: Option<usize>,
}

/// `[stream]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub poll_interval_ms: Option<u64>,
    pub channel_capacity: Option<usize>,
    /// "block" or "drop-oldest".
    pub backpressure: Option<String>,
    pub max_line_bytes: Option<usize>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Tunables for stream sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub poll_interval_ms: u64,
    pub channel_capacity: usize,
    pub backpressure: Backpressure,
    /// A partial line longer than this is emitted as-is.
    pub max_line_bytes: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: constants::DEFAULT_STREAM_POLL_INTERVAL_MS,
            channel_capacity: constants::DEFAULT_STREAM_CHANNEL_CAPACITY,
            backpressure: Backpressure::default(),
            max_line_bytes: constants::MAX_STREAM_PARTIAL_BYTES,
        }
    }
}

/// Validated engine configuration derived from `config.toml`.
///
/// All values are validated against named constants at load time. Invalid
/// values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host_root: PathBuf,
    /// `None` means the platform default settings directory.
    pub settings_dir: Option<PathBuf>,
    pub scan: ScanLimits,
    pub stream: StreamSettings,
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_root: PathBuf::from("/"),
            settings_dir: None,
            scan: ScanLimits::default(),
            stream: StreamSettings::default(),
            log_level: None,
        }
    }
}

/// Load and validate the config file at `config_path`.
///
/// Returns `EngineConfig` with validated values and a list of non-fatal
/// warnings. A missing file yields defaults with no warnings (first run).
/// An unreadable or unparseable file yields defaults plus a warning: the
/// engine still starts but the operator is informed.
pub fn load_config(config_path: &Path) -> (EngineConfig, Vec<String>) {
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (EngineConfig::default(), Vec::new());
    }
    match load_config_strict(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            let msg = format!("{e}. Using defaults.");
            tracing::warn!("{}", msg);
            (EngineConfig::default(), vec![msg])
        }
    }
}

/// Load a config file the operator named explicitly (`--config`). Missing,
/// unreadable and unparseable files are errors; out-of-range values are
/// still only warnings.
pub fn load_config_strict(config_path: &Path) -> Result<(EngineConfig, Vec<String>), ConfigError> {
    let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
        path: config_path.to_path_buf(),
        source,
    })?;
    let (config, warnings) =
        parse_config(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path.to_path_buf(),
            source,
        })?;
    tracing::info!(path = %config_path.display(), "Loaded config.toml");
    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }
    Ok((config, warnings))
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<(EngineConfig, Vec<String>), toml::de::Error> {
    let raw: RawConfig = toml::from_str(content)?;
    Ok(validate(raw))
}

/// Validate each field against named constants, accumulating all problems.
fn validate(raw: RawConfig) -> (EngineConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();
    let mut config = EngineConfig::default();

    // -- Engine --
    if let Some(root) = raw.engine.host_root.filter(|r| !r.is_empty()) {
        config.host_root = PathBuf::from(root);
    }
    if let Some(dir) = raw.engine.settings_dir.filter(|d| !d.is_empty()) {
        config.settings_dir = Some(PathBuf::from(dir));
    }

    // -- Scan --
    let scan = &mut config.scan;
    if let Some(depth) = raw.scan.quick_max_depth {
        check_range(
            &mut warnings,
            "[scan] quick_max_depth",
            depth,
            1,
            constants::ABSOLUTE_MAX_DEPTH,
            &mut scan.quick_max_depth,
        );
    }
    if let Some(depth) = raw.scan.full_max_depth {
        check_range(
            &mut warnings,
            "[scan] full_max_depth",
            depth,
            1,
            constants::ABSOLUTE_MAX_DEPTH,
            &mut scan.full_max_depth,
        );
    }
    if scan.quick_max_depth > scan.full_max_depth {
        warnings.push(format!(
            "[scan] quick_max_depth ({}) exceeds full_max_depth ({}); clamping.",
            scan.quick_max_depth, scan.full_max_depth
        ));
        scan.quick_max_depth = scan.full_max_depth;
    }
    if let Some(ms) = raw.scan.quick_time_budget_ms {
        check_range(
            &mut warnings,
            "[scan] quick_time_budget_ms",
            ms,
            constants::MIN_QUICK_TIME_BUDGET_MS,
            constants::MAX_QUICK_TIME_BUDGET_MS,
            &mut scan.quick_time_budget_ms,
        );
    }
    if let Some(files) = raw.scan.max_files {
        check_range(
            &mut warnings,
            "[scan] max_files",
            files,
            constants::MIN_MAX_FILES,
            constants::ABSOLUTE_MAX_FILES,
            &mut scan.max_files,
        );
    }
    if let Some(lines) = raw.scan.sample_lines {
        check_range(
            &mut warnings,
            "[scan] sample_lines",
            lines,
            1,
            constants::MAX_SAMPLE_LINES,
            &mut scan.sample_lines,
        );
    }

    // -- Stream --
    let stream = &mut config.stream;
    if let Some(ms) = raw.stream.poll_interval_ms {
        check_range(
            &mut warnings,
            "[stream] poll_interval_ms",
            ms,
            constants::MIN_STREAM_POLL_INTERVAL_MS,
            constants::MAX_STREAM_POLL_INTERVAL_MS,
            &mut stream.poll_interval_ms,
        );
    }
    if let Some(cap) = raw.stream.channel_capacity {
        check_range(
            &mut warnings,
            "[stream] channel_capacity",
            cap,
            constants::MIN_STREAM_CHANNEL_CAPACITY,
            constants::MAX_STREAM_CHANNEL_CAPACITY,
            &mut stream.channel_capacity,
        );
    }
    if let Some(ref policy) = raw.stream.backpressure {
        match policy.parse::<Backpressure>() {
            Ok(p) => stream.backpressure = p,
            Err(e) => warnings.push(format!("[stream] backpressure: {e}. Using default (block).")),
        }
    }
    if let Some(bytes) = raw.stream.max_line_bytes {
        check_range(
            &mut warnings,
            "[stream] max_line_bytes",
            bytes,
            constants::MIN_STREAM_MAX_LINE_BYTES,
            constants::MAX_STREAM_PARTIAL_BYTES,
            &mut stream.max_line_bytes,
        );
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    (config, warnings)
}

/// Store `value` into `slot` when it lies in `min..=max`, else warn and keep
/// the default already in `slot`.
fn check_range<T>(warnings: &mut Vec<String>, field: &str, value: T, min: T, max: T, slot: &mut T)
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if value >= min && value <= max {
        *slot = value;
    } else {
        warnings.push(format!(
            "{field} = {value} is out of range ({min}-{max}). Using default ({}).",
            *slot
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_defaults() {
        let (cfg, warnings) = parse_config("").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(cfg.host_root, PathBuf::from("/"));
        assert_eq!(cfg.scan, ScanLimits::default());
        assert_eq!(cfg.stream, StreamSettings::default());
    }

    #[test]
    fn test_valid_values_applied() {
        let (cfg, warnings) = parse_config(
            r#"
            [engine]
            host_root = "/host"
            settings_dir = "/srv/logdeck"

            [scan]
            quick_max_depth = 1
            max_files = 10

            [stream]
            poll_interval_ms = 100
            backpressure = "drop-oldest"

            [logging]
            level = "debug"

            [future]
            unknown = true
            "#,
        )
        .unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(cfg.host_root, PathBuf::from("/host"));
        assert_eq!(cfg.settings_dir, Some(PathBuf::from("/srv/logdeck")));
        assert_eq!(cfg.scan.quick_max_depth, 1);
        assert_eq!(cfg.scan.max_files, 10);
        assert_eq!(cfg.stream.poll_interval_ms, 100);
        assert_eq!(cfg.stream.backpressure, Backpressure::DropOldest);
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_out_of_range_falls_back_with_warning() {
        let (cfg, warnings) = parse_config(
            r#"
            [scan]
            max_files = 0
            [stream]
            channel_capacity = 10000000
            backpressure = "shrug"
            [logging]
            level = "loud"
            "#,
        )
        .unwrap();
        assert_eq!(warnings.len(), 4, "{warnings:?}");
        assert_eq!(cfg.scan.max_files, constants::DEFAULT_MAX_FILES);
        assert_eq!(
            cfg.stream.channel_capacity,
            constants::DEFAULT_STREAM_CHANNEL_CAPACITY
        );
        assert_eq!(cfg.stream.backpressure, Backpressure::Block);
        assert!(cfg.log_level.is_none());
    }

    #[test]
    fn test_quick_depth_clamped_to_full() {
        let (cfg, warnings) =
            parse_config("[scan]\nquick_max_depth = 6\nfull_max_depth = 3\n").unwrap();
        assert_eq!(cfg.scan.quick_max_depth, 3);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(parse_config("this is = = not toml").is_err());
    }

    #[test]
    fn test_strict_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config_strict(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_config_missing_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, warnings) = load_config(&dir.path().join("config.toml"));
        assert!(warnings.is_empty());
        assert_eq!(cfg.scan, ScanLimits::default());
    }

    #[test]
    fn test_load_config_unparseable_file_warns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scan\nbroken").unwrap();
        let (_cfg, warnings) = load_config(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config.toml"));
    }
}
