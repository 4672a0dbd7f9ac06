// LogDeck - app/scan.rs
//
// Scan orchestration: runs the core scanner for one source, merges the
// operator's manual files, and in full mode samples each file's header.
//
// `ScanManager` runs a full scan on a background thread, sending progress
// messages over an mpsc channel. The caller polls without blocking and can
// cancel via a shared `Arc<AtomicBool>`; the cancel flag is also handed to
// the walker so a cancelled scan stops mid-tree.

use crate::core::discovery::{self, ScanLimits, ScanRequest};
use crate::core::model::{CandidateFile, LogSourceConfig, LogicalFile, ScanMode, ScanOutcome};
use crate::core::normalize;
use crate::core::source::SourceType;
use crate::platform::fs;
use crate::util::error::ScanError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

/// Scan `base` for `source` and return candidates ready for classification.
///
/// Enabled manual files that exist are appended even when no include pattern
/// matches them; exclude filters veto them like any walked file. In `Full` mode every candidate's header is sampled; files
/// that cannot be read keep an empty sample and produce a warning.
pub fn scan_source(
    source: SourceType,
    config: &LogSourceConfig,
    base: &Path,
    mode: ScanMode,
    limits: &ScanLimits,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<ScanOutcome, ScanError> {
    let mut request = ScanRequest::for_source(source, config, mode, limits);
    request.cancel_flag = cancel.clone();

    let mut outcome = discovery::scan(base, &request, |file, count| {
        tracing::trace!(file = %file.path.display(), count, "File discovered");
    })?;

    merge_manual_files(&mut outcome, config, base);

    if mode == ScanMode::Full {
        sample_headers(&mut outcome, limits.sample_lines, cancel.as_deref());
    }

    tracing::info!(
        source = %source,
        base = %base.display(),
        ?mode,
        files = outcome.files.len(),
        warnings = outcome.warnings.len(),
        truncated = outcome.truncated,
        "Source scan complete"
    );
    Ok(outcome)
}

/// Add enabled manual files that the walk did not already find.
fn merge_manual_files(outcome: &mut ScanOutcome, config: &LogSourceConfig, base: &Path) {
    let mut seen: HashSet<PathBuf> = outcome.files.iter().map(|c| c.path.clone()).collect();

    for manual in config.log_files.iter().filter(|m| m.enabled) {
        if !seen.insert(manual.path.clone()) {
            continue;
        }
        if discovery::is_excluded(&config.exclude_filters, base, &manual.path) {
            tracing::debug!(file = %manual.path.display(), "Manual file excluded by filter");
            continue;
        }
        match std::fs::metadata(&manual.path) {
            Ok(meta) if meta.is_file() => outcome.files.push(CandidateFile {
                path: manual.path.clone(),
                declared_type: manual.log_type,
                size_bytes: meta.len(),
                modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
                compression: normalize::compression_of(&manual.path),
                sample: Vec::new(),
            }),
            Ok(_) => outcome.warnings.push(format!(
                "Manual file '{}' is not a regular file",
                manual.path.display()
            )),
            Err(e) => outcome.warnings.push(format!(
                "Manual file '{}' is unavailable: {e}",
                manual.path.display()
            )),
        }
    }

    outcome.files.sort_by(|a, b| a.path.cmp(&b.path));
}

fn sample_headers(outcome: &mut ScanOutcome, lines: usize, cancel: Option<&AtomicBool>) {
    for file in &mut outcome.files {
        if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
            outcome.truncated = true;
            return;
        }
        match fs::read_first_lines(&file.path, lines) {
            Ok(sample) => file.sample = sample,
            Err(e) => {
                tracing::debug!(file = %file.path.display(), error = %e, "Cannot sample file");
                outcome
                    .warnings
                    .push(format!("Cannot read '{}': {e}", file.path.display()));
            }
        }
    }
}

// =============================================================================
// Background full scan
// =============================================================================

/// Messages sent from a background scan to its `ScanManager`.
#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started {
        source: SourceType,
        base: PathBuf,
    },
    Completed {
        files: Vec<LogicalFile>,
        warnings: Vec<String>,
        truncated: bool,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

/// Inputs of one background scan.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub source: SourceType,
    pub config: LogSourceConfig,
    pub base: PathBuf,
    pub limits: ScanLimits,
}

/// Runs one full scan at a time on a background thread.
pub struct ScanManager {
    progress_rx: Option<mpsc::Receiver<ScanProgress>>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl ScanManager {
    pub fn new() -> Self {
        Self {
            progress_rx: None,
            cancel_flag: None,
        }
    }

    /// Start a full scan; `classify` turns the raw outcome into logical files
    /// on the background thread. A scan already running is cancelled first.
    pub fn start_scan<F>(&mut self, job: ScanJob, classify: F)
    where
        F: FnOnce(&ScanOutcome) -> Vec<LogicalFile> + Send + 'static,
    {
        self.cancel_scan();

        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        self.progress_rx = Some(rx);
        self.cancel_flag = Some(Arc::clone(&cancel));

        let source = job.source;
        std::thread::spawn(move || run_scan(job, classify, tx, cancel));

        tracing::info!(source = %source, "Background full scan started");
    }

    /// Ask the running scan to stop. It reports `Cancelled` and exits.
    pub fn cancel_scan(&mut self) {
        if let Some(flag) = &self.cancel_flag {
            flag.store(true, Ordering::SeqCst);
        }
        self.cancel_flag = None;
    }

    /// Drain pending progress messages without blocking.
    pub fn poll_progress(&self) -> Vec<ScanProgress> {
        let mut messages = Vec::new();
        if let Some(ref rx) = self.progress_rx {
            while let Ok(msg) = rx.try_recv() {
                messages.push(msg);
            }
        }
        messages
    }
}

impl Default for ScanManager {
    fn default() -> Self {
        Self::new()
    }
}

fn run_scan<F>(job: ScanJob, classify: F, tx: mpsc::Sender<ScanProgress>, cancel: Arc<AtomicBool>)
where
    F: FnOnce(&ScanOutcome) -> Vec<LogicalFile>,
{
    macro_rules! send {
        ($msg:expr) => {
            if tx.send($msg).is_err() {
                return;
            }
        };
    }

    send!(ScanProgress::Started {
        source: job.source,
        base: job.base.clone(),
    });

    let outcome = match scan_source(
        job.source,
        &job.config,
        &job.base,
        ScanMode::Full,
        &job.limits,
        Some(Arc::clone(&cancel)),
    ) {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!(source = %job.source, error = %e, "Background scan failed");
            send!(ScanProgress::Failed {
                error: e.to_string(),
            });
            return;
        }
    };

    if cancel.load(Ordering::SeqCst) {
        send!(ScanProgress::Cancelled);
        return;
    }

    let files = classify(&outcome);
    send!(ScanProgress::Completed {
        files,
        warnings: outcome.warnings,
        truncated: outcome.truncated,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{LogKind, ManualFile};
    use std::time::{Duration, Instant};

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let p = dir.join(rel);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&p, content).unwrap();
        p
    }

    fn nginx_config(base: &Path) -> LogSourceConfig {
        LogSourceConfig {
            base_path: base.to_path_buf(),
            ..SourceType::Nginx.default_config()
        }
    }

    #[test]
    fn test_full_mode_samples_headers() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "access.log", "line one\nline two\n");
        let cfg = nginx_config(dir.path());
        let limits = ScanLimits::default();

        let quick = scan_source(SourceType::Nginx, &cfg, dir.path(), ScanMode::Quick, &limits, None)
            .unwrap();
        assert!(quick.files[0].sample.is_empty());

        let full = scan_source(SourceType::Nginx, &cfg, dir.path(), ScanMode::Full, &limits, None)
            .unwrap();
        assert_eq!(full.files[0].sample, vec!["line one", "line two"]);
    }

    #[test]
    fn test_manual_files_merged_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        write(dir.path(), "access.log", "x\n");
        let extra = write(other.path(), "app.out", "y\n");
        let off = write(other.path(), "off.out", "z\n");

        let mut cfg = nginx_config(dir.path());
        cfg.log_files = vec![
            ManualFile {
                path: extra.clone(),
                log_type: LogKind::Custom,
                enabled: true,
            },
            ManualFile {
                path: off.clone(),
                log_type: LogKind::Custom,
                enabled: false,
            },
            ManualFile {
                path: other.path().join("missing.log"),
                log_type: LogKind::Custom,
                enabled: true,
            },
        ];

        let outcome = scan_source(
            SourceType::Nginx,
            &cfg,
            dir.path(),
            ScanMode::Quick,
            &ScanLimits::default(),
            None,
        )
        .unwrap();
        let paths: Vec<_> = outcome.files.iter().map(|c| c.path.clone()).collect();
        assert!(paths.contains(&extra));
        assert!(!paths.contains(&off));
        assert!(outcome.warnings.iter().any(|w| w.contains("missing.log")));
    }

    #[test]
    fn test_exclude_filters_veto_manual_files() {
        let dir = tempfile::tempdir().unwrap();
        let access = write(dir.path(), "access.log", "x\n");
        let rotated = write(dir.path(), "access.log.1", "x\n");
        let error = write(dir.path(), "error.log", "e\n");

        let mut cfg = nginx_config(dir.path());
        cfg.exclude_filters.files = vec!["access.log".to_string()];
        cfg.log_files = [&access, &rotated, &error]
            .into_iter()
            .map(|p| ManualFile {
                path: p.clone(),
                log_type: LogKind::Access,
                enabled: true,
            })
            .collect();

        for mode in [ScanMode::Quick, ScanMode::Full] {
            let outcome = scan_source(
                SourceType::Nginx,
                &cfg,
                dir.path(),
                mode,
                &ScanLimits::default(),
                None,
            )
            .unwrap();
            let paths: Vec<_> = outcome.files.iter().map(|c| c.path.clone()).collect();
            assert_eq!(paths, vec![error.clone()], "{mode:?}");
        }
    }

    #[test]
    fn test_missing_base_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = nginx_config(dir.path());
        let err = scan_source(
            SourceType::Nginx,
            &cfg,
            &dir.path().join("nope"),
            ScanMode::Quick,
            &ScanLimits::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    fn wait_for_end(manager: &ScanManager) -> Vec<ScanProgress> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut all = Vec::new();
        while Instant::now() < deadline {
            all.extend(manager.poll_progress());
            if all.iter().any(|m| {
                matches!(
                    m,
                    ScanProgress::Completed { .. } | ScanProgress::Failed { .. } | ScanProgress::Cancelled
                )
            }) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        all
    }

    #[test]
    fn test_background_scan_completes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "access.log", "a\n");
        write(dir.path(), "error.log", "b\n");

        let mut manager = ScanManager::new();
        manager.start_scan(
            ScanJob {
                source: SourceType::Nginx,
                config: nginx_config(dir.path()),
                base: dir.path().to_path_buf(),
                limits: ScanLimits::default(),
            },
            |outcome| {
                assert!(outcome.files.iter().all(|f| !f.sample.is_empty()));
                Vec::new()
            },
        );

        let messages = wait_for_end(&manager);
        assert!(matches!(messages.first(), Some(ScanProgress::Started { .. })));
        assert!(messages
            .iter()
            .any(|m| matches!(m, ScanProgress::Completed { .. })));
    }

    #[test]
    fn test_background_scan_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ScanManager::new();
        manager.start_scan(
            ScanJob {
                source: SourceType::Apache,
                config: SourceType::Apache.default_config(),
                base: dir.path().join("absent"),
                limits: ScanLimits::default(),
            },
            |_| Vec::new(),
        );
        let messages = wait_for_end(&manager);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ScanProgress::Failed { .. })));
    }
}
