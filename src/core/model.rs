// LogDeck - core/model.rs
//
// Core data model types. Pure data definitions with no I/O.
// These types are the shared vocabulary across all layers; the serde layout
// of the persisted ones matches the settings blob owned by the settings store.

use crate::core::source::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// =============================================================================
// Log kind
// =============================================================================

/// The kind of log a file holds, which selects the built-in default regex.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Access,
    Error,
    Syslog,
    #[default]
    Custom,
}

impl LogKind {
    pub fn label(&self) -> &'static str {
        match self {
            LogKind::Access => "access",
            LogKind::Error => "error",
            LogKind::Syslog => "syslog",
            LogKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "access" => Ok(LogKind::Access),
            "error" => Ok(LogKind::Error),
            "syslog" | "system" => Ok(LogKind::Syslog),
            "custom" => Ok(LogKind::Custom),
            other => Err(format!(
                "unknown log type '{other}' (expected access, error, syslog or custom)"
            )),
        }
    }
}

// =============================================================================
// Source configuration (persisted by the settings store)
// =============================================================================

/// Exclusion filters applied as a veto during scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeFilters {
    /// Globs matched against the file name.
    pub files: Vec<String>,
    /// Globs matched against each directory name below the base path.
    pub directories: Vec<String>,
    /// Globs matched against the full path.
    pub paths: Vec<String>,
}

/// An operator-added file entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualFile {
    pub path: PathBuf,
    #[serde(rename = "type", default)]
    pub log_type: LogKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// An operator-supplied regex bound to one logical path of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexOverride {
    pub regex: String,
    pub log_type: LogKind,
    pub updated_at: DateTime<Utc>,
}

/// Per-source settings. Owned by the settings store; the engine reads it and
/// mutates only `custom_regex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogSourceConfig {
    pub base_path: PathBuf,
    pub access_pattern: Option<String>,
    pub error_pattern: Option<String>,
    /// Historical backfill cap for stream sessions; 0 means unlimited.
    pub max_lines: usize,
    pub read_compressed: bool,
    pub exclude_filters: ExcludeFilters,
    /// Operator-added files.
    pub log_files: Vec<ManualFile>,
    /// Regex overrides keyed by logical path.
    pub custom_regex: BTreeMap<String, RegexOverride>,
}

impl Default for LogSourceConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::new(),
            access_pattern: None,
            error_pattern: None,
            max_lines: crate::util::constants::DEFAULT_MAX_LINES,
            read_compressed: false,
            exclude_filters: ExcludeFilters::default(),
            log_files: Vec::new(),
            custom_regex: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Scan output
// =============================================================================

/// Compression wrapper detected from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => "gz",
            Compression::Bzip2 => "bz2",
            Compression::Xz => "xz",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "gz" => Some(Compression::Gzip),
            "bz2" => Some(Compression::Bzip2),
            "xz" => Some(Compression::Xz),
            _ => None,
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// One filesystem entry found by a scan. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFile {
    pub path: PathBuf,
    pub declared_type: LogKind,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub compression: Option<Compression>,
    /// Header lines read in full mode (decompressed when needed). Empty in
    /// quick mode or when the file could not be read.
    #[serde(skip)]
    pub sample: Vec<String>,
}

/// Scan depth/time mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Metadata only, bounded depth, time-boxed.
    #[default]
    Quick,
    /// Deeper walk that also samples each file's header.
    Full,
}

/// Result of a scan: candidates plus non-fatal warnings.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub files: Vec<CandidateFile>,
    pub warnings: Vec<String>,
    /// True when the walk stopped early on its time budget or file cap.
    pub truncated: bool,
}

// =============================================================================
// Classification output
// =============================================================================

/// Classifier bucket. Every logical file lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    SystemCritical,
    RotationManaged,
    AutoDetected,
    Custom,
}

/// The effective regex for a logical file and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Effective regex; empty when no override and no default exist.
    pub regex: String,
    pub is_override: bool,
    /// The built-in default for the file's kind (empty when none).
    pub default_regex: String,
    pub log_type: LogKind,
}

impl Resolution {
    /// True when the file has no usable rule and needs operator input.
    pub fn needs_configuration(&self) -> bool {
        self.regex.is_empty()
    }
}

/// The rotation-normalized identity of one or more candidate files.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalFile {
    #[serde(rename = "path")]
    pub logical_path: PathBuf,
    #[serde(rename = "type")]
    pub log_type: LogKind,
    pub category: Category,
    #[serde(rename = "regex")]
    pub effective_regex: String,
    pub is_override: bool,
    pub default_regex: String,
    /// Size of the newest physical variant.
    #[serde(rename = "size")]
    pub size_bytes: u64,
    /// Modification time of the newest physical variant.
    #[serde(rename = "modified")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Every physical file (current + rotated copies) collapsed into this one.
    pub variants: Vec<PathBuf>,
}

/// Classifier output: a partition of the logical files.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub system_critical: Vec<LogicalFile>,
    pub rotation_managed: Vec<LogicalFile>,
    pub auto_detected: Vec<LogicalFile>,
    pub custom: Vec<LogicalFile>,
}

impl Classification {
    /// All logical files, in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = &LogicalFile> {
        self.system_critical
            .iter()
            .chain(&self.rotation_managed)
            .chain(&self.auto_detected)
            .chain(&self.custom)
    }

    pub fn len(&self) -> usize {
        self.system_critical.len()
            + self.rotation_managed.len()
            + self.auto_detected.len()
            + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into a single list sorted by logical path.
    pub fn into_sorted(self) -> Vec<LogicalFile> {
        let mut all: Vec<LogicalFile> = self
            .system_critical
            .into_iter()
            .chain(self.rotation_managed)
            .chain(self.auto_detected)
            .chain(self.custom)
            .collect();
        all.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
        all
    }
}

// =============================================================================
// Rotation / services
// =============================================================================

/// Which daemon owns log rotation on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RotationSystem {
    /// Host readable but no rotation manager found.
    None,
    Logrotate,
    SystemdJournald,
    /// Host introspection not possible.
    #[default]
    Unknown,
}

/// One configured rotation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationEntry {
    /// Path or glob as written in the config (rebased onto the host root).
    pub path: String,
    /// Cadence and naming, e.g. "daily", "weekly dateext", "size 100M".
    pub rotation_pattern: String,
    /// Number of rotated copies kept.
    pub rotate_count: Option<u32>,
    /// Approximate retention in days (from maxage, or count x cadence).
    pub keep_days: Option<u32>,
    pub compress: bool,
}

/// The detected rotation setup. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RotationPolicy {
    pub system: RotationSystem,
    pub config_path: Option<PathBuf>,
    pub configured_entries: Vec<RotationEntry>,
}

impl RotationPolicy {
    /// The policy reported when nothing can be inspected.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Entry governing `logical_path`, if any.
    pub fn entry_for(&self, logical_path: &std::path::Path) -> Option<&RotationEntry> {
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.configured_entries.iter().find(|entry| {
            if std::path::Path::new(&entry.path) == logical_path {
                return true;
            }
            glob::Pattern::new(&entry.path)
                .map(|p| p.matches_path_with(logical_path, options))
                .unwrap_or(false)
        })
    }

    pub fn manages(&self, logical_path: &std::path::Path) -> bool {
        self.entry_for(logical_path).is_some()
    }
}

/// Kind of logging service found on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceKind {
    Syslog,
    Journal,
    Rotation,
}

/// A logging-related daemon found on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedService {
    pub name: String,
    pub kind: ServiceKind,
    pub active: bool,
    pub config_path: Option<PathBuf>,
}

/// Output of host detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub services: Vec<DetectedService>,
    pub rotation: RotationPolicy,
}

// =============================================================================
// Regex suggestion
// =============================================================================

/// One captured group from a test match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedGroup {
    pub name: String,
    pub value: String,
}

/// A proposed regex plus the result of re-applying it to its sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub regex: String,
    /// Named groups in the order they appear in `regex`.
    pub groups: Vec<String>,
    /// Captures from matching `regex` against the sample line.
    pub test_result: Vec<CapturedGroup>,
}

impl Suggestion {
    pub fn captured(&self, name: &str) -> Option<&str> {
        self.test_result
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.value.as_str())
    }
}

// =============================================================================
// Live tail
// =============================================================================

/// Opaque identifier of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// What a stream worker does when its subscriber's channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Backpressure {
    /// Wait for room (the followed file is not read meanwhile).
    #[default]
    Block,
    /// Discard the oldest queued event and report `Lagged`.
    DropOldest,
}

impl std::str::FromStr for Backpressure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Backpressure::Block),
            "drop-oldest" | "drop_oldest" => Ok(Backpressure::DropOldest),
            other => Err(format!(
                "unknown backpressure policy '{other}' (expected block or drop-oldest)"
            )),
        }
    }
}

/// State machine of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Opening,
    Following,
    Rotated,
    Reopening,
    Closed,
}

/// One line pushed to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamLine {
    pub line: String,
    /// Named captures when the resolved regex matched the line.
    pub parsed_fields: Option<BTreeMap<String, String>>,
    /// Timestamp found in the line, or the read time when none was found.
    pub timestamp: DateTime<Utc>,
    /// Byte offset just past this line in its physical file.
    pub offset: u64,
}

/// Status transitions pushed to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum StreamStatus {
    /// The physical file was opened; `offset` is where following starts.
    Following { physical_path: PathBuf, offset: u64 },
    /// The file was replaced; remaining data from `from` has been flushed.
    Rotated { from: PathBuf, to: PathBuf },
    /// The file shrank in place; reading restarts at 0.
    Truncated { physical_path: PathBuf },
    /// A compressed archive was read in full; it cannot grow.
    CompressedSnapshot {
        physical_path: PathBuf,
        compression: Compression,
    },
    /// Events were dropped because the subscriber fell behind.
    Lagged { dropped: u64 },
    /// Terminal: the session released its file handle.
    Closed,
}

/// Event delivered over a session's bounded channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum StreamEvent {
    Line(StreamLine),
    Status(StreamStatus),
    /// Terminal error; followed by `Status(Closed)`.
    Error {
        kind: crate::util::error::ErrorKind,
        message: String,
    },
}

// =============================================================================
// Default file listing
// =============================================================================

/// Entry returned by `listDefaultFiles`: a well-known path for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultFile {
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub log_type: LogKind,
    pub enabled: bool,
}

/// Summary of all overrides: source id -> logical path -> override.
pub type CustomRegexIndex = BTreeMap<String, BTreeMap<String, RegexOverride>>;

/// Key of one override.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverrideKey {
    pub source: SourceType,
    pub logical_path: String,
}
