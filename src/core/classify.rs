// LogDeck - core/classify.rs
//
// Partitions scanned files into SystemCritical / RotationManaged /
// AutoDetected / Custom. Pure logic: candidates, rotation policy, manual
// files and a resolver callback in; a `Classification` out.
//
// Rotated and compressed copies are collapsed onto their logical file first,
// so each logical file is classified exactly once and its variants inherit
// the result.

use crate::core::model::{
    CandidateFile, Category, Classification, LogKind, LogicalFile, ManualFile, Resolution,
    RotationPolicy,
};
use crate::core::normalize;
use crate::core::source::SourceType;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Basename stems of host logs that are always system-critical.
const CRITICAL_STEMS: &[&str] = &[
    "syslog", "messages", "auth", "authlog", "secure", "kern", "kernel", "mail", "maillog",
    "cron", "daemon", "dmesg", "boot", "faillog", "audit",
];

/// True when `file_name` is a well-known critical host log, with or without
/// trailing qualifiers (`auth.log`, `mail.err`, `kern.log`, `messages`) or a
/// logrotate `dateext` tail (`messages-20240101`, `secure-20240101.gz`).
pub fn is_critical_basename(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    let stem = lower.split('.').next().unwrap_or("");
    let stem = strip_date_tail(stem);
    CRITICAL_STEMS.contains(&stem)
}

/// `name-YYYYMMDD` -> `name`; anything else is returned unchanged.
fn strip_date_tail(stem: &str) -> &str {
    match stem.rsplit_once('-') {
        Some((head, tail))
            if !head.is_empty() && tail.len() == 8 && tail.bytes().all(|b| b.is_ascii_digit()) =>
        {
            head
        }
        _ => stem,
    }
}

/// Classify candidates into a partition of logical files.
///
/// `resolve` returns the effective regex for a logical path and kind; it is
/// the resolver's view of overrides and defaults.
pub fn classify<F>(
    source: SourceType,
    candidates: &[CandidateFile],
    policy: &RotationPolicy,
    manual_files: &[ManualFile],
    resolve: F,
) -> Classification
where
    F: Fn(&Path, LogKind) -> Resolution,
{
    let mut groups: BTreeMap<PathBuf, Vec<&CandidateFile>> = BTreeMap::new();
    for candidate in candidates {
        groups
            .entry(normalize::normalize(&candidate.path))
            .or_default()
            .push(candidate);
    }

    let manual: HashMap<PathBuf, &ManualFile> = manual_files
        .iter()
        .map(|m| (normalize::normalize(&m.path), m))
        .collect();

    let mut compiled: HashMap<String, Option<Regex>> = HashMap::new();
    let mut out = Classification::default();

    for (logical_path, mut variants) in groups {
        variants.sort_by_key(|c| normalize::rotation_rank(&normalize::split(&c.path)));
        let newest = variants[0];
        let file_name = logical_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");
        let critical = is_critical_basename(file_name);
        let manual_entry = manual.get(&logical_path).copied();

        let log_type = decide_kind(source, &logical_path, newest.declared_type, manual_entry);
        let resolution = resolve(&logical_path, log_type);

        let category = if critical {
            Category::SystemCritical
        } else if policy.manages(&logical_path) {
            Category::RotationManaged
        } else if resolution.is_override {
            // An override is already a resolved rule; never re-judged.
            Category::AutoDetected
        } else if default_validates(&resolution, &variants, &mut compiled) {
            Category::AutoDetected
        } else {
            Category::Custom
        };

        tracing::trace!(
            path = %logical_path.display(),
            ?category,
            kind = %log_type,
            variants = variants.len(),
            manual = manual_entry.is_some(),
            "Classified logical file"
        );

        let file = LogicalFile {
            logical_path,
            log_type,
            category,
            effective_regex: resolution.regex,
            is_override: resolution.is_override,
            default_regex: resolution.default_regex,
            size_bytes: newest.size_bytes,
            modified_at: newest.modified_at,
            variants: variants.iter().map(|c| c.path.clone()).collect(),
        };

        match category {
            Category::SystemCritical => out.system_critical.push(file),
            Category::RotationManaged => out.rotation_managed.push(file),
            Category::AutoDetected => out.auto_detected.push(file),
            Category::Custom => out.custom.push(file),
        }
    }

    tracing::debug!(
        source = %source,
        system_critical = out.system_critical.len(),
        rotation_managed = out.rotation_managed.len(),
        auto_detected = out.auto_detected.len(),
        custom = out.custom.len(),
        "Classification complete"
    );

    out
}

/// Kind precedence: operator-declared type, then the type declared by the
/// include pattern that matched, then a name-based guess. Critical host logs
/// fall back to syslog.
///
/// Shared by classification and regex resolution so a file reports the same
/// kind, and therefore the same effective regex, on every path.
pub fn decide_kind(
    source: SourceType,
    logical_path: &Path,
    declared: LogKind,
    manual_entry: Option<&ManualFile>,
) -> LogKind {
    let declared = manual_entry
        .map(|m| m.log_type)
        .filter(|k| *k != LogKind::Custom)
        .unwrap_or(declared);
    let kind = if declared == LogKind::Custom {
        source.detect_kind(logical_path)
    } else {
        declared
    };
    let critical = logical_path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(is_critical_basename);
    if critical && kind == LogKind::Custom {
        LogKind::Syslog
    } else {
        kind
    }
}

/// True when the default regex exists and is not contradicted by the sampled
/// header lines. Files without a sample (quick scans, empty files) are judged
/// on the existence of a default alone.
fn default_validates(
    resolution: &Resolution,
    variants: &[&CandidateFile],
    compiled: &mut HashMap<String, Option<Regex>>,
) -> bool {
    if resolution.default_regex.is_empty() {
        return false;
    }
    let sample: Vec<&str> = variants
        .iter()
        .flat_map(|c| c.sample.iter())
        .map(|l| l.trim_end_matches(['\r', '\n']))
        .filter(|l| !l.trim().is_empty())
        .collect();
    if sample.is_empty() {
        return true;
    }
    let re = compiled
        .entry(resolution.default_regex.clone())
        .or_insert_with(|| Regex::new(&resolution.default_regex).ok());
    match re {
        Some(re) => sample.iter().any(|line| re.is_match(line)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{RotationEntry, RotationSystem};
    use std::collections::HashSet;

    fn cand(path: &str, kind: LogKind, sample: &[&str]) -> CandidateFile {
        CandidateFile {
            path: PathBuf::from(path),
            declared_type: kind,
            size_bytes: 10,
            modified_at: None,
            compression: normalize::compression_of(Path::new(path)),
            sample: sample.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn default_resolver(source: SourceType) -> impl Fn(&Path, LogKind) -> Resolution {
        move |_p, kind| {
            let d = source.default_regex(kind).unwrap_or("").to_string();
            Resolution {
                regex: d.clone(),
                is_override: false,
                default_regex: d,
                log_type: kind,
            }
        }
    }

    const ACCESS_LINE: &str =
        r#"10.0.0.1 - - [10/Jan/2024:13:55:36 +0000] "GET / HTTP/1.1" 200 12 "-" "x""#;

    #[test]
    fn test_critical_basenames() {
        for name in ["syslog", "messages", "auth.log", "kern.log", "mail.err", "cron"] {
            assert!(is_critical_basename(name), "{name} should be critical");
        }
        for name in ["access.log", "error.log", "dpkg.log", "application.log"] {
            assert!(!is_critical_basename(name), "{name} should not be critical");
        }
    }

    #[test]
    fn test_dateext_rotations_stay_critical() {
        for name in ["messages-20240101", "secure-20240101", "maillog-20231231.gz"] {
            assert!(is_critical_basename(name), "{name} should be critical");
        }
        for name in ["messages-2024", "access-20240101", "-20240101", "app-log-20240101"] {
            assert!(!is_critical_basename(name), "{name} should not be critical");
        }
    }

    #[test]
    fn test_dateext_copy_classified_as_system_critical() {
        let candidates = vec![cand("/var/log/secure-20240101", LogKind::Custom, &[])];
        let result = classify(
            SourceType::HostSystem,
            &candidates,
            &RotationPolicy::unknown(),
            &[],
            default_resolver(SourceType::HostSystem),
        );
        assert_eq!(result.system_critical.len(), 1);
        assert_eq!(result.system_critical[0].log_type, LogKind::Syslog);
    }

    #[test]
    fn test_decide_kind_precedence() {
        let path = Path::new("/srv/web/requests.txt");
        let manual = ManualFile {
            path: path.to_path_buf(),
            log_type: LogKind::Access,
            enabled: true,
        };
        assert_eq!(
            decide_kind(SourceType::Nginx, path, LogKind::Error, Some(&manual)),
            LogKind::Access
        );
        assert_eq!(
            decide_kind(SourceType::Nginx, path, LogKind::Error, None),
            LogKind::Error
        );
        assert_eq!(
            decide_kind(SourceType::HostSystem, Path::new("/var/log/kern.log"), LogKind::Custom, None),
            LogKind::Syslog
        );
    }

    #[test]
    fn test_rotated_variants_collapse() {
        let candidates = vec![
            cand("/var/log/apache2/access.log", LogKind::Access, &[]),
            cand("/var/log/apache2/access.log.1.gz", LogKind::Access, &[]),
            cand("/var/log/apache2/error.log", LogKind::Error, &[]),
        ];
        let result = classify(
            SourceType::Apache,
            &candidates,
            &RotationPolicy::unknown(),
            &[],
            default_resolver(SourceType::Apache),
        );
        let paths: Vec<_> = result.iter().map(|f| f.logical_path.clone()).collect();
        assert_eq!(paths.len(), 2);
        let access = result
            .iter()
            .find(|f| f.logical_path.ends_with("access.log"))
            .unwrap();
        assert_eq!(access.variants.len(), 2);
        assert_eq!(access.variants[0], PathBuf::from("/var/log/apache2/access.log"));
        assert_eq!(access.category, Category::AutoDetected);
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let candidates = vec![
            cand("/var/log/syslog", LogKind::Custom, &[]),
            cand("/var/log/syslog.1", LogKind::Custom, &[]),
            cand("/var/log/nginx/access.log", LogKind::Access, &[ACCESS_LINE]),
            cand("/var/log/app/custom.log", LogKind::Custom, &["free text"]),
            cand("/var/log/dpkg.log", LogKind::Custom, &[]),
            cand("/var/log/managed.log.2.gz", LogKind::Custom, &[]),
        ];
        let policy = RotationPolicy {
            system: RotationSystem::Logrotate,
            config_path: None,
            configured_entries: vec![RotationEntry {
                path: "/var/log/managed.log".to_string(),
                rotation_pattern: "weekly".to_string(),
                rotate_count: Some(4),
                keep_days: Some(28),
                compress: true,
            }],
        };
        let result = classify(
            SourceType::HostSystem,
            &candidates,
            &policy,
            &[],
            default_resolver(SourceType::HostSystem),
        );

        let distinct: HashSet<PathBuf> = candidates
            .iter()
            .map(|c| normalize::normalize(&c.path))
            .collect();
        let mut seen = HashSet::new();
        for f in result.iter() {
            assert!(seen.insert(f.logical_path.clone()), "duplicate {:?}", f.logical_path);
        }
        assert_eq!(seen, distinct);
        assert_eq!(result.len(), distinct.len());

        assert_eq!(result.system_critical.len(), 1);
        assert_eq!(result.rotation_managed.len(), 1);
        assert!(result
            .custom
            .iter()
            .any(|f| f.logical_path.ends_with("custom.log")));
    }

    #[test]
    fn test_critical_beats_rotation_and_manual() {
        let candidates = vec![cand("/var/log/auth.log", LogKind::Custom, &[])];
        let policy = RotationPolicy {
            system: RotationSystem::Logrotate,
            config_path: None,
            configured_entries: vec![RotationEntry {
                path: "/var/log/auth.log".to_string(),
                rotation_pattern: "daily".to_string(),
                rotate_count: None,
                keep_days: None,
                compress: false,
            }],
        };
        let manual = vec![ManualFile {
            path: PathBuf::from("/var/log/auth.log"),
            log_type: LogKind::Custom,
            enabled: false,
        }];
        let result = classify(
            SourceType::HostSystem,
            &candidates,
            &policy,
            &manual,
            default_resolver(SourceType::HostSystem),
        );
        assert_eq!(result.system_critical.len(), 1);
        assert!(!result.system_critical[0].effective_regex.is_empty());
    }

    #[test]
    fn test_sample_mismatch_makes_custom() {
        let candidates = vec![cand(
            "/var/log/nginx/access.log",
            LogKind::Access,
            &["this is not an access log line"],
        )];
        let result = classify(
            SourceType::Nginx,
            &candidates,
            &RotationPolicy::unknown(),
            &[],
            default_resolver(SourceType::Nginx),
        );
        assert_eq!(result.custom.len(), 1);
    }

    #[test]
    fn test_override_treated_as_resolved() {
        let candidates = vec![cand("/srv/app/out.log", LogKind::Custom, &["anything"])];
        let result = classify(
            SourceType::Nginx,
            &candidates,
            &RotationPolicy::unknown(),
            &[],
            |_p, kind| Resolution {
                regex: "^(?P<message>.*)$".to_string(),
                is_override: true,
                default_regex: String::new(),
                log_type: kind,
            },
        );
        assert_eq!(result.auto_detected.len(), 1);
        assert!(result.auto_detected[0].is_override);
    }

    #[test]
    fn test_manual_declared_type_wins() {
        let candidates = vec![cand("/srv/web/requests.txt", LogKind::Custom, &[ACCESS_LINE])];
        let manual = vec![ManualFile {
            path: PathBuf::from("/srv/web/requests.txt"),
            log_type: LogKind::Access,
            enabled: true,
        }];
        let result = classify(
            SourceType::Nginx,
            &candidates,
            &RotationPolicy::unknown(),
            &manual,
            default_resolver(SourceType::Nginx),
        );
        assert_eq!(result.auto_detected.len(), 1);
        assert_eq!(result.auto_detected[0].log_type, LogKind::Access);
    }
}
