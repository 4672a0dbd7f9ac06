// LogDeck - platform/rotation.rs
//
// Host introspection: which rotation manager governs which log paths, and
// which logging daemons are present.
//
// Each supported rotation manager is one `RotationInspector`. Inspectors are
// best-effort: a manager that is not installed reports `Ok(None)`, one whose
// configuration cannot be read reports `DetectionUnavailable`, and `detect`
// folds all of that into a `DetectionReport` without ever failing. All host
// paths are resolved under `host_root`, so a container that mounts the host
// at `/host` sees the same results as a process running on the host.

use crate::core::model::{
    DetectedService, DetectionReport, RotationEntry, RotationPolicy, RotationSystem, ServiceKind,
};
use crate::util::error::DetectionError;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

/// A rotation manager whose configuration can be inspected.
pub trait RotationInspector: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when this manager is not configured under `host_root`.
    fn inspect(&self, host_root: &Path) -> Result<Option<RotationPolicy>, DetectionError>;
}

/// The inspectors tried by `detect`, in precedence order.
pub fn default_inspectors() -> Vec<Box<dyn RotationInspector>> {
    vec![Box::new(LogrotateInspector), Box::new(JournaldInspector)]
}

/// Inspect `host_root` for logging services and rotation configuration.
///
/// Never fails. An unreadable host root yields no services and an `Unknown`
/// rotation system; a readable host without any rotation manager yields
/// `RotationSystem::None`.
pub fn detect(host_root: &Path, inspectors: &[Box<dyn RotationInspector>]) -> DetectionReport {
    if let Err(e) = std::fs::read_dir(host_root) {
        let err = DetectionError::DetectionUnavailable {
            path: host_root.to_path_buf(),
            source: e,
        };
        tracing::warn!(error = %err, "Host introspection unavailable; rotation system unknown");
        return DetectionReport {
            services: Vec::new(),
            rotation: RotationPolicy::unknown(),
        };
    }

    let mut found: Vec<RotationPolicy> = Vec::new();
    let mut failures = 0usize;
    for inspector in inspectors {
        match inspector.inspect(host_root) {
            Ok(Some(policy)) => {
                tracing::debug!(
                    inspector = inspector.name(),
                    entries = policy.configured_entries.len(),
                    "Rotation manager detected"
                );
                found.push(policy);
            }
            Ok(None) => {
                tracing::trace!(inspector = inspector.name(), "Rotation manager not present");
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(inspector = inspector.name(), error = %e, "Rotation inspection failed");
            }
        }
    }

    let rotation = merge_policies(found, failures > 0);
    let services = probe_services(host_root);

    tracing::info!(
        host_root = %host_root.display(),
        services = services.len(),
        rotation = ?rotation.system,
        entries = rotation.configured_entries.len(),
        "Host detection complete"
    );

    DetectionReport { services, rotation }
}

/// The first policy found decides the system and config path; entries from
/// every policy are kept.
fn merge_policies(found: Vec<RotationPolicy>, had_failures: bool) -> RotationPolicy {
    let mut iter = found.into_iter();
    let Some(mut primary) = iter.next() else {
        return if had_failures {
            RotationPolicy::unknown()
        } else {
            RotationPolicy {
                system: RotationSystem::None,
                ..RotationPolicy::default()
            }
        };
    };
    for other in iter {
        primary.configured_entries.extend(other.configured_entries);
    }
    primary
}

/// Map an absolute host path onto `host_root`.
fn rebase(host_root: &Path, path: &str) -> PathBuf {
    host_root.join(path.trim_start_matches('/'))
}

fn unavailable(path: &Path, source: io::Error) -> DetectionError {
    DetectionError::DetectionUnavailable {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a config file; `Ok(None)` when it does not exist.
fn read_optional(path: &Path) -> Result<Option<String>, DetectionError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(unavailable(path, e)),
    }
}

// =============================================================================
// logrotate
// =============================================================================

/// Reads `etc/logrotate.conf` and the files it includes (normally
/// `etc/logrotate.d/*`).
pub struct LogrotateInspector;

/// Nested include limit.
const MAX_INCLUDE_DEPTH: usize = 4;

/// Editor and package-manager leftovers logrotate itself skips.
const IGNORED_SUFFIXES: &[&str] = &[
    "~", ".bak", ".disabled", ".dpkg-old", ".dpkg-dist", ".dpkg-new", ".rpmsave", ".rpmorig",
    ".rpmnew", ".swp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cadence {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Cadence {
    fn label(self) -> &'static str {
        match self {
            Cadence::Hourly => "hourly",
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Yearly => "yearly",
        }
    }

    /// Days of history `rotate count` copies represent.
    fn keep_days(self, count: u32) -> u32 {
        match self {
            Cadence::Hourly => count.div_ceil(24),
            Cadence::Daily => count,
            Cadence::Weekly => count.saturating_mul(7),
            Cadence::Monthly => count.saturating_mul(30),
            Cadence::Yearly => count.saturating_mul(365),
        }
    }
}

/// Directive state in effect at some point of a logrotate config.
#[derive(Debug, Clone, Default)]
struct Directives {
    cadence: Option<Cadence>,
    size: Option<String>,
    rotate: Option<u32>,
    maxage: Option<u32>,
    compress: bool,
    dateext: bool,
}

impl Directives {
    /// Apply one directive line. Returns true when it opens a script block.
    fn apply(&mut self, words: &[&str]) -> bool {
        let Some(first) = words.first() else {
            return false;
        };
        let (name, inline_value) = match first.split_once('=') {
            Some((n, v)) => (n, Some(v)),
            None => (*first, None),
        };
        let value = inline_value.or_else(|| words.get(1).copied());
        match name {
            "hourly" => self.cadence = Some(Cadence::Hourly),
            "daily" => self.cadence = Some(Cadence::Daily),
            "weekly" => self.cadence = Some(Cadence::Weekly),
            "monthly" => self.cadence = Some(Cadence::Monthly),
            "yearly" => self.cadence = Some(Cadence::Yearly),
            "size" | "maxsize" => self.size = value.map(str::to_string),
            "rotate" => self.rotate = value.and_then(|v| v.parse().ok()),
            "maxage" => self.maxage = value.and_then(|v| v.parse().ok()),
            "compress" => self.compress = true,
            "nocompress" => self.compress = false,
            "dateext" => self.dateext = true,
            "nodateext" => self.dateext = false,
            "postrotate" | "prerotate" | "firstaction" | "lastaction" | "preremove" => {
                return true
            }
            _ => {}
        }
        false
    }

    fn pattern(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(c) = self.cadence {
            parts.push(c.label().to_string());
        }
        if let Some(ref s) = self.size {
            parts.push(format!("size {s}"));
        }
        if self.dateext {
            parts.push("dateext".to_string());
        }
        if parts.is_empty() {
            // logrotate's built-in default cadence.
            parts.push("weekly".to_string());
        }
        parts.join(" ")
    }

    fn keep_days(&self) -> Option<u32> {
        if self.maxage.is_some() {
            return self.maxage;
        }
        let count = self.rotate?;
        match (self.cadence, &self.size) {
            (Some(c), _) => Some(c.keep_days(count)),
            (None, Some(_)) => None,
            (None, None) => Some(Cadence::Weekly.keep_days(count)),
        }
    }

    fn entry(&self, path: String) -> RotationEntry {
        RotationEntry {
            path,
            rotation_pattern: self.pattern(),
            rotate_count: self.rotate,
            keep_days: self.keep_days(),
            compress: self.compress,
        }
    }
}

struct LogrotateParse<'a> {
    host_root: &'a Path,
    globals: Directives,
    entries: Vec<RotationEntry>,
    visited: HashSet<PathBuf>,
}

impl RotationInspector for LogrotateInspector {
    fn name(&self) -> &'static str {
        "logrotate"
    }

    fn inspect(&self, host_root: &Path) -> Result<Option<RotationPolicy>, DetectionError> {
        let main = host_root.join("etc/logrotate.conf");
        let conf_d = host_root.join("etc/logrotate.d");

        let mut parse = LogrotateParse {
            host_root,
            globals: Directives::default(),
            entries: Vec::new(),
            visited: HashSet::new(),
        };

        let config_path = match read_optional(&main)? {
            Some(content) => {
                parse.visited.insert(main.clone());
                parse.parse_text(&content, 0)?;
                main
            }
            None if conf_d.is_dir() => {
                parse.include(&conf_d, 0)?;
                conf_d
            }
            None => return Ok(None),
        };

        Ok(Some(RotationPolicy {
            system: RotationSystem::Logrotate,
            config_path: Some(config_path),
            configured_entries: parse.entries,
        }))
    }
}

impl LogrotateParse<'_> {
    fn include(&mut self, target: &Path, depth: usize) -> Result<(), DetectionError> {
        if depth >= MAX_INCLUDE_DEPTH {
            tracing::warn!(path = %target.display(), "logrotate include nesting too deep; skipped");
            return Ok(());
        }
        if target.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(target)
                .map_err(|e| unavailable(target, e))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && !ignored_include(p))
                .collect();
            files.sort();
            for file in files {
                self.include_file(&file, depth)?;
            }
            Ok(())
        } else {
            self.include_file(target, depth)
        }
    }

    fn include_file(&mut self, file: &Path, depth: usize) -> Result<(), DetectionError> {
        if !self.visited.insert(file.to_path_buf()) {
            return Ok(());
        }
        match read_optional(file)? {
            Some(content) => self.parse_text(&content, depth + 1),
            None => Ok(()),
        }
    }

    fn parse_text(&mut self, content: &str, depth: usize) -> Result<(), DetectionError> {
        let mut pending_paths: Vec<String> = Vec::new();
        let mut block: Option<(Vec<String>, Directives)> = None;
        let mut in_script = false;

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if in_script {
                if line == "endscript" {
                    in_script = false;
                }
                continue;
            }

            if let Some((paths, directives)) = block.as_mut() {
                if let Some(rest) = line.strip_prefix('}') {
                    let paths = std::mem::take(paths);
                    let directives = directives.clone();
                    block = None;
                    self.finish_block(paths, &directives);
                    if !rest.trim().is_empty() {
                        tracing::debug!(line, "Ignoring text after logrotate block end");
                    }
                    continue;
                }
                let words: Vec<&str> = line.split_whitespace().collect();
                in_script = directives.apply(&words);
                continue;
            }

            if let Some((before, after)) = line.split_once('{') {
                pending_paths.extend(split_paths(before));
                let paths = std::mem::take(&mut pending_paths);
                let mut directives = self.globals.clone();
                // Single-line blocks: "/var/log/x.log { daily }".
                if let Some((inner, _)) = after.split_once('}') {
                    for directive in inner.split(';') {
                        let words: Vec<&str> = directive.split_whitespace().collect();
                        directives.apply(&words);
                    }
                    self.finish_block(paths, &directives);
                } else {
                    block = Some((paths, directives));
                }
                continue;
            }

            let words: Vec<&str> = line.split_whitespace().collect();
            if words.first() == Some(&"include") {
                if let Some(target) = words.get(1) {
                    let target = rebase(self.host_root, target.trim_matches('"'));
                    self.include(&target, depth)?;
                }
            } else if looks_like_path(line) {
                pending_paths.extend(split_paths(line));
            } else {
                self.globals.apply(&words);
            }
        }

        if block.is_some() {
            tracing::warn!("Unterminated logrotate block ignored");
        }
        Ok(())
    }

    fn finish_block(&mut self, paths: Vec<String>, directives: &Directives) {
        for path in paths {
            let rebased = rebase(self.host_root, &path).to_string_lossy().into_owned();
            self.entries.push(directives.entry(rebased));
        }
    }
}

fn looks_like_path(line: &str) -> bool {
    line.starts_with('/') || line.starts_with('"') || line.starts_with('\'')
}

/// Whitespace-separated paths, honouring double and single quotes.
fn split_paths(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn ignored_include(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.starts_with('.') || IGNORED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

// =============================================================================
// systemd-journald
// =============================================================================

/// Reads `etc/systemd/journald.conf` (and `journald.conf.d/*.conf`).
pub struct JournaldInspector;

impl RotationInspector for JournaldInspector {
    fn name(&self) -> &'static str {
        "journald"
    }

    fn inspect(&self, host_root: &Path) -> Result<Option<RotationPolicy>, DetectionError> {
        let conf = host_root.join("etc/systemd/journald.conf");
        let main = read_optional(&conf)?;
        let present = main.is_some()
            || host_root.join("run/systemd/journal").exists()
            || host_root.join("var/log/journal").is_dir();
        if !present {
            return Ok(None);
        }

        let mut settings = JournaldSettings::default();
        if let Some(ref text) = main {
            settings.apply(text);
        }
        let drop_in = host_root.join("etc/systemd/journald.conf.d");
        if drop_in.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(&drop_in)
                .map_err(|e| unavailable(&drop_in, e))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|x| x == "conf"))
                .collect();
            files.sort();
            for file in files {
                if let Some(text) = read_optional(&file)? {
                    settings.apply(&text);
                }
            }
        }

        let entry = RotationEntry {
            path: host_root
                .join("var/log/journal/*/*.journal")
                .to_string_lossy()
                .into_owned(),
            rotation_pattern: format!("journald storage={}", settings.storage),
            rotate_count: None,
            keep_days: settings.retention_days,
            compress: settings.compress,
        };

        Ok(Some(RotationPolicy {
            system: RotationSystem::SystemdJournald,
            config_path: main.map(|_| conf),
            configured_entries: vec![entry],
        }))
    }
}

#[derive(Debug)]
struct JournaldSettings {
    storage: String,
    compress: bool,
    retention_days: Option<u32>,
}

impl Default for JournaldSettings {
    fn default() -> Self {
        Self {
            storage: "auto".to_string(),
            compress: true,
            retention_days: None,
        }
    }
}

impl JournaldSettings {
    /// Apply the `[Journal]` section of a journald.conf text.
    fn apply(&mut self, text: &str) {
        let mut in_journal = false;
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') {
                in_journal = line == "[Journal]";
                continue;
            }
            if !in_journal {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "Storage" => self.storage = value.to_ascii_lowercase(),
                "Compress" => {
                    self.compress = !matches!(
                        value.to_ascii_lowercase().as_str(),
                        "no" | "false" | "0" | "off"
                    )
                }
                "MaxRetentionSec" => self.retention_days = parse_timespan_days(value),
                _ => {}
            }
        }
    }
}

/// Parse a systemd time span ("1month", "2w 3d", "86400") into whole days,
/// rounding up. `None` for 0 (no limit) or unparseable input.
fn parse_timespan_days(value: &str) -> Option<u32> {
    let mut total_secs: u64 = 0;
    let mut rest = value.trim();
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return None;
        }
        let n: u64 = rest[..digits_end].parse().ok()?;
        rest = rest[digits_end..].trim_start();
        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c.is_whitespace())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = rest[unit_end..].trim_start();
        let factor: u64 = match unit {
            "" | "s" | "sec" | "second" | "seconds" => 1,
            "m" | "min" | "minute" | "minutes" => 60,
            "h" | "hr" | "hour" | "hours" => 3_600,
            "d" | "day" | "days" => 86_400,
            "w" | "week" | "weeks" => 7 * 86_400,
            "M" | "month" | "months" => 30 * 86_400,
            "y" | "year" | "years" => 365 * 86_400,
            _ => return None,
        };
        total_secs = total_secs.saturating_add(n.saturating_mul(factor));
    }
    if total_secs == 0 {
        return None;
    }
    u32::try_from(total_secs.div_ceil(86_400)).ok()
}

// =============================================================================
// Service probing
// =============================================================================

/// Find logging daemons from their config files; `active` comes from pid
/// files and runtime sockets.
pub fn probe_services(host_root: &Path) -> Vec<DetectedService> {
    let exists = |rel: &str| host_root.join(rel).exists();
    let first_existing = |rels: &[&str]| {
        rels.iter()
            .map(|r| host_root.join(r))
            .find(|p| p.exists())
    };

    let mut services = Vec::new();

    if let Some(config) = first_existing(&["etc/rsyslog.conf"]) {
        services.push(DetectedService {
            name: "rsyslog".to_string(),
            kind: ServiceKind::Syslog,
            active: exists("run/rsyslogd.pid") || exists("var/run/rsyslogd.pid"),
            config_path: Some(config),
        });
    }
    if let Some(config) = first_existing(&["etc/syslog-ng/syslog-ng.conf"]) {
        services.push(DetectedService {
            name: "syslog-ng".to_string(),
            kind: ServiceKind::Syslog,
            active: exists("run/syslog-ng.pid") || exists("var/run/syslog-ng.pid"),
            config_path: Some(config),
        });
    }
    let journald_config = first_existing(&["etc/systemd/journald.conf"]);
    let journald_runtime = exists("run/systemd/journal");
    if journald_config.is_some() || journald_runtime {
        services.push(DetectedService {
            name: "systemd-journald".to_string(),
            kind: ServiceKind::Journal,
            active: journald_runtime,
            config_path: journald_config,
        });
    }
    if let Some(config) = first_existing(&["etc/logrotate.conf", "etc/logrotate.d"]) {
        services.push(DetectedService {
            name: "logrotate".to_string(),
            kind: ServiceKind::Rotation,
            active: exists("var/lib/logrotate/status") || exists("var/lib/logrotate.status"),
            config_path: Some(config),
        });
    }

    services
}
