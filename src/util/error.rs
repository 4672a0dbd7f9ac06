// LogDeck - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Each subsystem owns an error enum; `EngineError` wraps them all and maps
// every variant onto the caller-facing taxonomy via `EngineError::kind()`.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Caller-facing error categories. A transport layer maps these onto its own
/// status codes; the engine never exposes raw `io::ErrorKind`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    InvalidPattern,
    DetectionUnavailable,
    UnsupportedCompression,
    StreamInterrupted,
    UnknownSource,
    Settings,
    Config,
    Timeout,
}

/// Top-level error type for all LogDeck operations.
#[derive(Debug)]
pub enum EngineError {
    /// Filesystem scan failed.
    Scan(ScanError),

    /// A regex pattern was rejected.
    Pattern(PatternError),

    /// Host introspection failed (normally recovered before reaching callers).
    Detection(DetectionError),

    /// A live-tail session could not be opened or continued.
    Stream(StreamError),

    /// Settings store read/write failed.
    Settings(SettingsError),

    /// Configuration loading failed.
    Config(ConfigError),

    /// A source id that does not name a supported source type.
    UnknownSource { id: String },
}

impl EngineError {
    /// Category of this error for caller-facing reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Scan(ScanError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Scan(ScanError::NotADirectory { .. }) => ErrorKind::NotFound,
            Self::Scan(ScanError::PermissionDenied { .. }) => ErrorKind::PermissionDenied,
            Self::Scan(ScanError::Timeout { .. }) => ErrorKind::Timeout,
            Self::Pattern(_) => ErrorKind::InvalidPattern,
            Self::Detection(_) => ErrorKind::DetectionUnavailable,
            Self::Stream(e) => e.kind(),
            Self::Settings(_) => ErrorKind::Settings,
            Self::Config(_) => ErrorKind::Config,
            Self::UnknownSource { .. } => ErrorKind::UnknownSource,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan(e) => write!(f, "Scan error: {e}"),
            Self::Pattern(e) => write!(f, "Pattern error: {e}"),
            Self::Detection(e) => write!(f, "Detection error: {e}"),
            Self::Stream(e) => write!(f, "Stream error: {e}"),
            Self::Settings(e) => write!(f, "Settings error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::UnknownSource { id } => write!(f, "Unknown log source '{id}'"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Scan(e) => Some(e),
            Self::Pattern(e) => Some(e),
            Self::Detection(e) => Some(e),
            Self::Stream(e) => Some(e),
            Self::Settings(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::UnknownSource { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan errors
// ---------------------------------------------------------------------------

/// Errors related to filesystem scanning. Only the base path can fail a scan;
/// per-entry problems below it are collected as warnings.
#[derive(Debug)]
pub enum ScanError {
    /// The base path does not exist.
    NotFound { path: PathBuf },

    /// The base path is not a directory.
    NotADirectory { path: PathBuf },

    /// Permission denied accessing the base path.
    PermissionDenied { path: PathBuf, source: io::Error },

    /// The pre-flight metadata check did not complete in time.
    Timeout { path: PathBuf, timeout_secs: u64 },
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => {
                write!(f, "Base path '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => {
                write!(f, "Base path '{}' is not a directory", path.display())
            }
            Self::PermissionDenied { path, source } => {
                write!(
                    f,
                    "Permission denied accessing '{}': {source}",
                    path.display()
                )
            }
            Self::Timeout { path, timeout_secs } => write!(
                f,
                "Timed out after {timeout_secs}s checking base path '{}'",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PermissionDenied { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ScanError> for EngineError {
    fn from(e: ScanError) -> Self {
        Self::Scan(e)
    }
}

// ---------------------------------------------------------------------------
// Pattern errors
// ---------------------------------------------------------------------------

/// A caller-supplied regex was rejected. Always caller-correctable; the
/// message carries the regex compiler's diagnostic.
#[derive(Debug)]
pub enum PatternError {
    /// The pattern failed to compile.
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// The pattern exceeds the maximum allowed length.
    PatternTooLong { length: usize, max_length: usize },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPattern { pattern, source } => {
                write!(f, "Invalid regex '{pattern}': {source}")
            }
            Self::PatternTooLong { length, max_length } => write!(
                f,
                "Regex is {length} chars, exceeds maximum of {max_length}"
            ),
        }
    }
}

impl std::error::Error for PatternError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPattern { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PatternError> for EngineError {
    fn from(e: PatternError) -> Self {
        Self::Pattern(e)
    }
}

// ---------------------------------------------------------------------------
// Detection errors
// ---------------------------------------------------------------------------

/// Host introspection could not read what it needed. The detector recovers
/// from this locally by reporting `Unknown`.
#[derive(Debug)]
pub enum DetectionError {
    DetectionUnavailable { path: PathBuf, source: io::Error },
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DetectionUnavailable { path, source } => write!(
                f,
                "Host introspection unavailable at '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for DetectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DetectionUnavailable { source, .. } => Some(source),
        }
    }
}

impl From<DetectionError> for EngineError {
    fn from(e: DetectionError) -> Self {
        Self::Detection(e)
    }
}

// ---------------------------------------------------------------------------
// Stream errors
// ---------------------------------------------------------------------------

/// Errors raised while opening or following a live-tail session.
#[derive(Debug, Clone)]
pub enum StreamError {
    /// Neither the logical file nor any rotated variant exists.
    NotFound { path: PathBuf },

    /// The physical file exists but cannot be opened.
    PermissionDenied { path: PathBuf, message: String },

    /// The newest physical file is compressed and the source does not allow
    /// reading compressed files.
    UnsupportedCompression { path: PathBuf, compression: String },

    /// The followed file disappeared or rotated and could not be reopened.
    StreamInterrupted { path: PathBuf, reason: String },

    /// Any other read failure.
    Io { path: PathBuf, message: String },
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::UnsupportedCompression { .. } => ErrorKind::UnsupportedCompression,
            Self::StreamInterrupted { .. } | Self::Io { .. } => ErrorKind::StreamInterrupted,
        }
    }

    /// Classify an `io::Error` raised while opening `path`.
    pub fn from_open(path: &std::path::Path, e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "'{}' not found", path.display()),
            Self::PermissionDenied { path, message } => {
                write!(f, "Permission denied opening '{}': {message}", path.display())
            }
            Self::UnsupportedCompression { path, compression } => write!(
                f,
                "'{}' is {compression}-compressed and not readable live \
                 (enable readCompressed for this source)",
                path.display()
            ),
            Self::StreamInterrupted { path, reason } => {
                write!(f, "Stream on '{}' interrupted: {reason}", path.display())
            }
            Self::Io { path, message } => {
                write!(f, "'{}': I/O error: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for StreamError {}

impl From<StreamError> for EngineError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

// ---------------------------------------------------------------------------
// Settings errors
// ---------------------------------------------------------------------------

/// Errors from the settings store collaborator.
#[derive(Debug)]
pub enum SettingsError {
    /// I/O error reading or writing a settings blob.
    Io { path: PathBuf, source: io::Error },

    /// A settings blob could not be (de)serialised.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Settings I/O error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "Settings JSON error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<SettingsError> for EngineError {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for LogDeck results.
pub type Result<T> = std::result::Result<T, EngineError>;
