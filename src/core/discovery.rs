// LogDeck - core/discovery.rs
//
// Filesystem scanner: walks a source's base path and returns candidate log
// files.
//
// Architecture note: this module uses `walkdir` for directory traversal as an
// OS abstraction. It reads only file *metadata* (size, mtime), never file
// *contents*; header sampling for full scans is owned by the app layer
// (app::scan), which fills `CandidateFile::sample` afterwards.
//
// Limits:
//   - Per-entry I/O errors are non-fatal and collected as warnings.
//   - Depth and file count are clamped to named-constant upper bounds.
//   - Quick mode is time-boxed; the walk stops at the deadline and the
//     outcome is flagged `truncated`.
//   - Exclude filters are a veto. Excluded directories are pruned via
//     `filter_entry` and never traversed at all.

use crate::core::model::{
    CandidateFile, ExcludeFilters, LogKind, LogSourceConfig, ScanMode, ScanOutcome,
};
use crate::core::normalize;
use crate::core::source::SourceType;
use crate::util::constants;
use crate::util::error::ScanError;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// =============================================================================
// Configuration
// =============================================================================

/// An include glob and the log kind it declares for matching files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludePattern {
    pub glob: String,
    pub kind: LogKind,
}

impl IncludePattern {
    pub fn new(glob: impl Into<String>, kind: LogKind) -> Self {
        Self {
            glob: glob.into(),
            kind,
        }
    }
}

/// Engine-wide scan limits, loaded from `[scan]` in config.toml.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLimits {
    pub quick_max_depth: usize,
    pub full_max_depth: usize,
    pub quick_time_budget_ms: u64,
    pub max_files: usize,
    pub sample_lines: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            quick_max_depth: constants::DEFAULT_QUICK_MAX_DEPTH,
            full_max_depth: constants::DEFAULT_FULL_MAX_DEPTH,
            quick_time_budget_ms: constants::DEFAULT_QUICK_TIME_BUDGET_MS,
            max_files: constants::DEFAULT_MAX_FILES,
            sample_lines: constants::DEFAULT_SAMPLE_LINES,
        }
    }
}

/// Everything one scan needs.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub mode: ScanMode,

    /// Files must match at least one of these (by raw or normalized name).
    /// An empty list means "include everything that is not excluded".
    pub include: Vec<IncludePattern>,

    /// Veto filters; an excluded file is omitted even if it is included.
    pub exclude: ExcludeFilters,

    pub max_depth: usize,
    pub max_files: usize,

    /// Wall-clock budget for the walk. `None` means unbounded (full mode).
    pub time_budget: Option<Duration>,

    /// Optional cancel flag, checked on every walker iteration. A cancelled
    /// walk returns what it has collected so far.
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl ScanRequest {
    /// Build a request for `source` from its stored configuration.
    ///
    /// The configured access/error globs declare `Access`/`Error` kinds; a
    /// source with neither falls back to its generic patterns, which declare
    /// nothing (`Custom`) and leave kind inference to the classifier.
    pub fn for_source(
        source: SourceType,
        config: &LogSourceConfig,
        mode: ScanMode,
        limits: &ScanLimits,
    ) -> Self {
        let include = include_patterns(source, config);
        let (max_depth, time_budget) = match mode {
            ScanMode::Quick => (
                limits.quick_max_depth,
                Some(Duration::from_millis(limits.quick_time_budget_ms)),
            ),
            ScanMode::Full => (limits.full_max_depth, None),
        };

        Self {
            mode,
            include,
            exclude: config.exclude_filters.clone(),
            max_depth,
            max_files: limits.max_files,
            time_budget,
            cancel_flag: None,
        }
    }
}

/// Include globs of a source: the configured access/error patterns, or the
/// source's generic fallbacks when neither is set.
pub fn include_patterns(source: SourceType, config: &LogSourceConfig) -> Vec<IncludePattern> {
    let mut include = Vec::new();
    if let Some(p) = config.access_pattern.as_deref().filter(|p| !p.is_empty()) {
        include.push(IncludePattern::new(p, LogKind::Access));
    }
    if let Some(p) = config.error_pattern.as_deref().filter(|p| !p.is_empty()) {
        include.push(IncludePattern::new(p, LogKind::Error));
    }
    if include.is_empty() {
        include = source
            .fallback_patterns()
            .iter()
            .map(|p| IncludePattern::new(*p, LogKind::Custom))
            .collect();
    }
    include
}

/// Kind a scan of `source` would declare for `path`: the kind of the first
/// include pattern matching its raw or logical name, `Custom` otherwise.
pub fn declared_kind(source: SourceType, config: &LogSourceConfig, path: &Path) -> LogKind {
    let include = compile_includes(&include_patterns(source, config));
    let logical = normalize::normalize(path);
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let logical_name = logical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);
    included_kind(&include, file_name, logical_name).unwrap_or(LogKind::Custom)
}

/// True when `filters` veto `path`, checked the way a scan of `base` checks
/// the files it walks: file globs on the raw and logical names, path globs
/// on the raw and logical paths, and directory globs on every ancestor
/// below `base`.
pub fn is_excluded(filters: &ExcludeFilters, base: &Path, path: &Path) -> bool {
    let exclude = ExcludeSet::compile(filters);
    if exclude.vetoes_file(path) {
        return true;
    }
    path.ancestors()
        .skip(1)
        .take_while(|dir| *dir != base && dir.parent().is_some())
        .any(|dir| {
            let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("");
            exclude.prunes_dir(name, dir)
        })
}

// =============================================================================
// Scan
// =============================================================================

/// Enumerate candidate files under `base`.
///
/// `on_file_found` is called once per accepted file with the running count;
/// it runs on the caller's thread and should be cheap.
///
/// Returns `Err` only when the base path itself is unusable (`NotFound`,
/// `NotADirectory`, `PermissionDenied`, `Timeout`). Problems with entries
/// below it become warnings, so an empty `files` list always means "no
/// matching files", never "could not look".
pub fn scan<F>(
    base: &Path,
    request: &ScanRequest,
    mut on_file_found: F,
) -> Result<ScanOutcome, ScanError>
where
    F: FnMut(&CandidateFile, usize),
{
    preflight(base)?;

    let max_files = request
        .max_files
        .clamp(constants::MIN_MAX_FILES, constants::ABSOLUTE_MAX_FILES);
    let max_depth = request.max_depth.min(constants::ABSOLUTE_MAX_DEPTH);
    let deadline = request.time_budget.map(|b| Instant::now() + b);

    tracing::debug!(
        base = %base.display(),
        mode = ?request.mode,
        max_depth,
        max_files,
        include = ?request.include,
        exclude = ?request.exclude,
        "Scan starting"
    );

    let include = compile_includes(&request.include);
    let exclude = ExcludeSet::compile(&request.exclude);

    let mut outcome = ScanOutcome::default();

    let walker = walkdir::WalkDir::new(base)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_str().unwrap_or("");
            !exclude.prunes_dir(name, e.path())
        });

    for entry_result in walker {
        if request
            .cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
        {
            tracing::debug!("Scan cancelled by request");
            outcome.truncated = true;
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::debug!(
                base = %base.display(),
                found = outcome.files.len(),
                "Quick scan time budget exhausted"
            );
            outcome.warnings.push(format!(
                "Quick scan of '{}' stopped at its time budget; run a full scan for complete results",
                base.display()
            ));
            outcome.truncated = true;
            break;
        }

        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                let path_str = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                let msg = format!("Cannot access '{path_str}': {e}");
                tracing::debug!(warning = %msg, "Scan warning");
                outcome.warnings.push(msg);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            outcome
                .warnings
                .push(format!("Skipping '{}': non-UTF-8 filename", path.display()));
            continue;
        };
        if exclude.vetoes_file(path) {
            tracing::trace!(file = %path.display(), "Excluded by filter");
            continue;
        }
        let logical = normalize::normalize(path);
        let logical_name = logical
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file_name);

        let Some(declared_type) = included_kind(&include, file_name, logical_name) else {
            tracing::trace!(file = file_name, "Not matched by include patterns");
            continue;
        };

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                let msg = format!("Cannot read metadata for '{}': {e}", path.display());
                tracing::debug!(warning = %msg, "Scan warning");
                outcome.warnings.push(msg);
                continue;
            }
        };

        let candidate = CandidateFile {
            path: path.to_path_buf(),
            declared_type,
            size_bytes: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            compression: normalize::compression_of(path),
            sample: Vec::new(),
        };

        let count = outcome.files.len() + 1;
        on_file_found(&candidate, count);
        outcome.files.push(candidate);
    }

    let total_found = outcome.files.len();

    // Over the cap: keep the shallowest files, ties broken by path. The
    // selection depends only on the tree, and every file a depth-bounded
    // quick walk sees ranks ahead of anything only a deeper full walk finds,
    // so a capped quick list stays a subset of the capped full list.
    if total_found > max_files {
        outcome
            .files
            .sort_by_cached_key(|f| (depth_below(base, &f.path), f.path.clone()));
        outcome.files.truncate(max_files);
        outcome.truncated = true;
        outcome.warnings.push(format!(
            "{total_found} log files were found but the limit is {max_files}. \
             Only the {max_files} shallowest files are listed; narrow the base path \
             or raise scan.max_files to see the rest."
        ));
        tracing::info!(
            total_found,
            limit = max_files,
            "File list truncated to the shallowest files"
        );
    }

    outcome.files.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!(
        total_found,
        files = outcome.files.len(),
        warnings = outcome.warnings.len(),
        truncated = outcome.truncated,
        "Scan complete"
    );

    Ok(outcome)
}

/// Check the base path on a helper thread with a wall-clock timeout.
///
/// `fs::metadata()` is used rather than `Path::is_dir()` because the latter
/// maps every error, including PermissionDenied, to `false`. An unreachable
/// network mount can block `metadata()` for a long time, hence the thread.
fn preflight(base: &Path) -> Result<(), ScanError> {
    enum Preflight {
        IsDirectory,
        IsFile,
        NotFound,
        AccessDenied(std::io::Error),
    }

    let base_buf = base.to_path_buf();
    let (tx, rx) = std::sync::mpsc::channel::<Preflight>();
    std::thread::spawn(move || {
        let result = match std::fs::metadata(&base_buf) {
            Ok(meta) if meta.is_dir() => Preflight::IsDirectory,
            Ok(_) => Preflight::IsFile,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Preflight::AccessDenied(e)
            }
            Err(_) => Preflight::NotFound,
        };
        let _ = tx.send(result);
    });

    let timeout = Duration::from_secs(constants::PREFLIGHT_TIMEOUT_SECS);
    match rx.recv_timeout(timeout) {
        Ok(Preflight::IsDirectory) => Ok(()),
        Ok(Preflight::IsFile) => Err(ScanError::NotADirectory {
            path: base.to_path_buf(),
        }),
        Ok(Preflight::NotFound) => Err(ScanError::NotFound {
            path: base.to_path_buf(),
        }),
        Ok(Preflight::AccessDenied(source)) => Err(ScanError::PermissionDenied {
            path: base.to_path_buf(),
            source,
        }),
        Err(_) => {
            tracing::warn!(
                base = %base.display(),
                timeout_secs = constants::PREFLIGHT_TIMEOUT_SECS,
                "Pre-flight path check timed out"
            );
            Err(ScanError::Timeout {
                path: base.to_path_buf(),
                timeout_secs: constants::PREFLIGHT_TIMEOUT_SECS,
            })
        }
    }
}

fn depth_below(base: &Path, path: &Path) -> usize {
    path.strip_prefix(base)
        .map(|rel| rel.components().count())
        .unwrap_or(usize::MAX)
}

// =============================================================================
// Glob helpers
// =============================================================================

/// Compiled exclude filters.
struct ExcludeSet {
    files: Vec<glob::Pattern>,
    directories: Vec<glob::Pattern>,
    paths: Vec<glob::Pattern>,
}

impl ExcludeSet {
    fn compile(filters: &ExcludeFilters) -> Self {
        Self {
            files: compile_patterns(&filters.files, "exclude file"),
            directories: compile_patterns(&filters.directories, "exclude directory"),
            paths: compile_patterns(&filters.paths, "exclude path"),
        }
    }

    fn prunes_dir(&self, name: &str, path: &Path) -> bool {
        any_match(&self.directories, name) || any_match_path(&self.paths, path)
    }

    /// Exclusion is a veto on either the physical or the logical identity.
    fn vetoes_file(&self, path: &Path) -> bool {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let logical = normalize::normalize(path);
        let logical_name = logical
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file_name);
        any_match(&self.files, file_name)
            || any_match(&self.files, logical_name)
            || any_match_path(&self.paths, path)
            || any_match_path(&self.paths, &logical)
    }
}

/// Compile glob strings, logging and skipping any that fail.
fn compile_patterns(patterns: &[String], kind: &str) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::warn!(pattern = %p, kind, error = %e, "Invalid glob pattern, skipping");
                None
            }
        })
        .collect()
}

fn compile_includes(patterns: &[IncludePattern]) -> Vec<(glob::Pattern, LogKind)> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(&p.glob) {
            Ok(compiled) => Some((compiled, p.kind)),
            Err(e) => {
                tracing::warn!(pattern = %p.glob, error = %e, "Invalid include glob, skipping");
                None
            }
        })
        .collect()
}

fn any_match(globs: &[glob::Pattern], name: &str) -> bool {
    globs.iter().any(|g| g.matches(name))
}

fn any_match_path(globs: &[glob::Pattern], path: &Path) -> bool {
    globs.iter().any(|g| g.matches_path(path))
}

/// Declared kind of the first include pattern matching the raw or logical
/// name, or `None` when nothing matches. An empty include list accepts
/// every file as `Custom`.
fn included_kind(
    include: &[(glob::Pattern, LogKind)],
    file_name: &str,
    logical_name: &str,
) -> Option<LogKind> {
    if include.is_empty() {
        return Some(LogKind::Custom);
    }
    include
        .iter()
        .find(|(g, _)| g.matches(file_name) || g.matches(logical_name))
        .map(|(_, kind)| *kind)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_apache_tree() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::write(root.join("access.log"), "a\n").expect("write access.log");
        fs::write(root.join("access.log.1.gz"), "gz").expect("write access.log.1.gz");
        fs::write(root.join("error.log"), "e\n").expect("write error.log");
        fs::write(root.join("other.txt"), "x\n").expect("write other.txt");

        let sub = root.join("vhosts");
        fs::create_dir(&sub).expect("mkdir vhosts");
        fs::write(sub.join("access_site.log"), "a\n").expect("write access_site.log");

        let deep = sub.join("a").join("b");
        fs::create_dir_all(&deep).expect("mkdir deep");
        fs::write(deep.join("access_deep.log"), "a\n").expect("write access_deep.log");
        dir
    }

    fn request(mode: ScanMode) -> ScanRequest {
        let config = SourceType::Apache.default_config();
        ScanRequest::for_source(SourceType::Apache, &config, mode, &ScanLimits::default())
    }

    fn names(outcome: &ScanOutcome) -> Vec<String> {
        outcome
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_rotated_variants_match_by_logical_name() {
        let dir = make_apache_tree();
        let outcome = scan(dir.path(), &request(ScanMode::Full), |_, _| {}).unwrap();
        let found = names(&outcome);
        assert!(found.contains(&"access.log".to_string()));
        assert!(
            found.contains(&"access.log.1.gz".to_string()),
            "rotated copy matches access*.log through its logical name: {found:?}"
        );
        assert!(found.contains(&"error.log".to_string()));
        assert!(!found.contains(&"other.txt".to_string()));
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    }

    #[test]
    fn test_declared_type_follows_pattern() {
        let dir = make_apache_tree();
        let outcome = scan(dir.path(), &request(ScanMode::Full), |_, _| {}).unwrap();
        for f in &outcome.files {
            let name = f.path.file_name().unwrap().to_string_lossy();
            if name.starts_with("access") {
                assert_eq!(f.declared_type, LogKind::Access, "{name}");
            } else if name.starts_with("error") {
                assert_eq!(f.declared_type, LogKind::Error, "{name}");
            }
        }
        let gz = outcome
            .files
            .iter()
            .find(|f| f.path.ends_with("access.log.1.gz"))
            .unwrap();
        assert_eq!(gz.compression, Some(crate::core::model::Compression::Gzip));
    }

    #[test]
    fn test_exclusion_is_a_veto() {
        let dir = make_apache_tree();
        let mut req = request(ScanMode::Full);
        req.exclude.files = vec!["error*".to_string()];
        req.exclude.directories = vec!["vhosts".to_string()];
        let outcome = scan(dir.path(), &req, |_, _| {}).unwrap();
        let found = names(&outcome);
        assert!(!found.contains(&"error.log".to_string()), "{found:?}");
        assert!(!found.contains(&"access_site.log".to_string()));
        assert!(!found.contains(&"access_deep.log".to_string()));
        assert!(found.contains(&"access.log".to_string()));
    }

    #[test]
    fn test_path_exclusion_matches_full_path() {
        let dir = make_apache_tree();
        let mut req = request(ScanMode::Full);
        req.exclude.paths = vec![format!("{}/access.log*", dir.path().display())];
        let outcome = scan(dir.path(), &req, |_, _| {}).unwrap();
        let found = names(&outcome);
        assert!(!found.contains(&"access.log".to_string()));
        assert!(!found.contains(&"access.log.1.gz".to_string()));
        assert!(found.contains(&"error.log".to_string()));
    }

    #[test]
    fn test_quick_is_subset_of_full() {
        let dir = make_apache_tree();
        let quick = scan(dir.path(), &request(ScanMode::Quick), |_, _| {}).unwrap();
        let full = scan(dir.path(), &request(ScanMode::Full), |_, _| {}).unwrap();
        let full_paths: Vec<_> = full.files.iter().map(|f| &f.path).collect();
        for f in &quick.files {
            assert!(full_paths.contains(&&f.path), "{} missing from full", f.path.display());
        }
        assert!(
            !names(&quick).contains(&"access_deep.log".to_string()),
            "quick mode is depth-bounded"
        );
        assert!(names(&full).contains(&"access_deep.log".to_string()));
    }

    #[test]
    fn test_zero_time_budget_truncates() {
        let dir = make_apache_tree();
        let mut req = request(ScanMode::Quick);
        req.time_budget = Some(Duration::ZERO);
        let outcome = scan(dir.path(), &req, |_, _| {}).unwrap();
        assert!(outcome.truncated);
        assert!(outcome.files.is_empty());
        assert!(!outcome.warnings.is_empty());
    }

    #[test]
    fn test_max_files_keeps_shallowest_and_warns() {
        let dir = make_apache_tree();
        let mut req = request(ScanMode::Full);
        req.max_files = 2;
        let outcome = scan(dir.path(), &req, |_, _| {}).unwrap();
        assert_eq!(names(&outcome), vec!["access.log", "access.log.1.gz"]);
        assert!(outcome.truncated);
        assert!(outcome.warnings.join(" ").contains("limit is 2"));
    }

    #[test]
    fn test_capped_quick_is_subset_of_capped_full() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("error.log"), "e\n").unwrap();
        fs::write(root.join("access.log"), "a\n").unwrap();
        let deep = root.join("a").join("b").join("c");
        fs::create_dir_all(&deep).unwrap();
        // Deep files are written last, so they are the newest, and sort
        // ahead of the shallow ones by path.
        for name in ["access_1.log", "access_2.log", "access_3.log"] {
            fs::write(deep.join(name), "a\n").unwrap();
        }

        let mut quick_req = request(ScanMode::Quick);
        quick_req.max_files = 2;
        quick_req.time_budget = None;
        let mut full_req = request(ScanMode::Full);
        full_req.max_files = 2;

        let quick = scan(root, &quick_req, |_, _| {}).unwrap();
        let full = scan(root, &full_req, |_, _| {}).unwrap();
        assert!(full.truncated);
        assert_eq!(names(&full), vec!["access.log", "error.log"]);
        for f in &quick.files {
            assert!(
                full.files.iter().any(|g| g.path == f.path),
                "{} missing from full",
                f.path.display()
            );
        }
    }

    #[test]
    fn test_is_excluded_matches_scan_veto() {
        let base = Path::new("/var/log/nginx");
        let filters = ExcludeFilters {
            files: vec!["access.log".to_string()],
            directories: vec!["archive".to_string()],
            paths: vec!["/var/log/nginx/debug*".to_string()],
        };
        assert!(is_excluded(&filters, base, &base.join("access.log")));
        assert!(is_excluded(&filters, base, &base.join("access.log.2.gz")));
        assert!(is_excluded(&filters, base, &base.join("archive/error.log")));
        assert!(is_excluded(&filters, base, &base.join("debug.log")));
        assert!(!is_excluded(&filters, base, &base.join("error.log")));
        assert!(!is_excluded(&filters, base, Path::new("/srv/archive.log")));
    }

    #[test]
    fn test_declared_kind_follows_include_patterns() {
        let config = SourceType::Nginx.default_config();
        assert_eq!(
            declared_kind(SourceType::Nginx, &config, Path::new("/var/log/nginx/access.log.1.gz")),
            LogKind::Access
        );
        assert_eq!(
            declared_kind(SourceType::Nginx, &config, Path::new("/srv/web/requests.txt")),
            LogKind::Custom
        );
    }

    #[test]
    fn test_cancel_flag_stops_walk() {
        let dir = make_apache_tree();
        let mut req = request(ScanMode::Full);
        req.cancel_flag = Some(Arc::new(AtomicBool::new(true)));
        let outcome = scan(dir.path(), &req, |_, _| {}).unwrap();
        assert!(outcome.files.is_empty());
        assert!(outcome.truncated);
    }

    #[test]
    fn test_fallback_patterns_for_host_system() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("syslog"), "x\n").unwrap();
        fs::write(dir.path().join("syslog.2.gz"), "x").unwrap();
        fs::write(dir.path().join("app.log"), "x\n").unwrap();
        fs::write(dir.path().join("notes.md"), "x\n").unwrap();
        let config = SourceType::HostSystem.default_config();
        let req = ScanRequest::for_source(
            SourceType::HostSystem,
            &config,
            ScanMode::Full,
            &ScanLimits::default(),
        );
        let outcome = scan(dir.path(), &req, |_, _| {}).unwrap();
        let found = names(&outcome);
        assert_eq!(found, vec!["app.log", "syslog", "syslog.2.gz"]);
        assert!(outcome.files.iter().all(|f| f.declared_type == LogKind::Custom));
    }

    #[test]
    fn test_progress_callback_called_for_each_file() {
        let dir = make_apache_tree();
        let mut calls = 0usize;
        let outcome = scan(dir.path(), &request(ScanMode::Full), |_, _| calls += 1).unwrap();
        assert_eq!(calls, outcome.files.len());
    }

    #[test]
    fn test_base_not_found() {
        let result = scan(
            Path::new("/nonexistent/path/logdeck"),
            &request(ScanMode::Quick),
            |_, _| {},
        );
        assert!(matches!(result, Err(ScanError::NotFound { .. })));
    }

    #[test]
    fn test_base_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir.log");
        fs::write(&file, "content").unwrap();
        let result = scan(&file, &request(ScanMode::Quick), |_, _| {});
        assert!(matches!(result, Err(ScanError::NotADirectory { .. })));
    }

    #[test]
    fn test_metadata_collected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("access.log"), "hello world").unwrap();
        let outcome = scan(dir.path(), &request(ScanMode::Quick), |_, _| {}).unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].size_bytes, 11);
        assert!(outcome.files[0].modified_at.is_some());
        assert!(outcome.files[0].sample.is_empty(), "sampling is the app layer's job");
    }
}
