// LogDeck - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every bound the engine enforces (depth, time budget, channel capacity,
// read sizes) is declared here so it can be audited in one place.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogDeck";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "logdeck";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Scan limits
// =============================================================================

/// Directory depth walked by a quick (first-paint) scan.
pub const DEFAULT_QUICK_MAX_DEPTH: usize = 2;

/// Directory depth walked by a full scan.
pub const DEFAULT_FULL_MAX_DEPTH: usize = 8;

/// Hard upper bound on scan depth (prevents runaway traversal).
pub const ABSOLUTE_MAX_DEPTH: usize = 32;

/// Wall-clock budget for a quick scan walk (ms). When exceeded the walk stops
/// and returns what it has collected so far, flagged as truncated.
pub const DEFAULT_QUICK_TIME_BUDGET_MS: u64 = 750;

/// Minimum user-configurable quick scan budget (ms).
pub const MIN_QUICK_TIME_BUDGET_MS: u64 = 50;

/// Maximum user-configurable quick scan budget (ms).
pub const MAX_QUICK_TIME_BUDGET_MS: u64 = 10_000;

/// Maximum number of candidate files a single scan returns.
pub const DEFAULT_MAX_FILES: usize = 2_000;

/// Minimum sensible value for the max-files limit.
pub const MIN_MAX_FILES: usize = 1;

/// Hard upper bound on max files.
pub const ABSOLUTE_MAX_FILES: usize = 50_000;

/// Number of lines sampled from the head of a file in full scan mode.
pub const DEFAULT_SAMPLE_LINES: usize = 5;

/// Hard upper bound on sampled header lines.
pub const MAX_SAMPLE_LINES: usize = 100;

/// Upper bound on decompressed xz content held in memory for sampling or a
/// compressed-file snapshot.
pub const MAX_XZ_DECOMPRESSED_BYTES: usize = 64 * 1_024 * 1_024; // 64 MiB

/// Timeout for the pre-flight `metadata()` check on a scan base path.
pub const PREFLIGHT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Regex limits
// =============================================================================

/// Maximum regex pattern length accepted for an override (ReDoS guard).
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Maximum sample line length, for header sampling and the suggestion generator.
pub const MAX_SAMPLE_LINE_LENGTH: usize = 8_192;

// =============================================================================
// Live tail limits
// =============================================================================

/// How often a stream session polls its file for growth (ms).
pub const DEFAULT_STREAM_POLL_INTERVAL_MS: u64 = 500;

/// Minimum user-configurable stream poll interval (ms).
pub const MIN_STREAM_POLL_INTERVAL_MS: u64 = 10;

/// Maximum user-configurable stream poll interval (ms).
pub const MAX_STREAM_POLL_INTERVAL_MS: u64 = 10_000;

/// How often the cancel flag is checked while a session sleeps or waits on
/// a full channel (ms).
pub const STREAM_CANCEL_CHECK_INTERVAL_MS: u64 = 25;

/// Capacity of the bounded per-session event channel.
pub const DEFAULT_STREAM_CHANNEL_CAPACITY: usize = 1_024;

/// Minimum user-configurable channel capacity.
pub const MIN_STREAM_CHANNEL_CAPACITY: usize = 1;

/// Maximum user-configurable channel capacity.
pub const MAX_STREAM_CHANNEL_CAPACITY: usize = 65_536;

/// Maximum bytes read from a followed file in one poll tick.
pub const MAX_STREAM_READ_BYTES_PER_TICK: usize = 512 * 1_024; // 512 KiB

/// Maximum accumulated size of the partial (in-progress) line buffer.
/// A fragment beyond this is emitted as a line so memory stays bounded.
pub const MAX_STREAM_PARTIAL_BYTES: usize = MAX_STREAM_READ_BYTES_PER_TICK * 4; // 2 MiB

/// Smallest accepted `[stream] max_line_bytes`.
pub const MIN_STREAM_MAX_LINE_BYTES: usize = 1_024;

/// Number of attempts to reopen a logical file after rotation before the
/// session gives up with `StreamInterrupted`.
pub const STREAM_REOPEN_ATTEMPTS: u32 = 20;

/// Delay between reopen attempts (ms).
pub const STREAM_REOPEN_DELAY_MS: u64 = 50;

// =============================================================================
// Source defaults
// =============================================================================

/// Default `maxLines` applied to a new source (historical backfill cap).
pub const DEFAULT_MAX_LINES: usize = 1_000;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
/// Prevents accidental exposure of sensitive data in long lines.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings subdirectory name (one JSON blob per source).
pub const SETTINGS_DIR_NAME: &str = "settings";
