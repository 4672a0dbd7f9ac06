// LogDeck - core/source.rs
//
// Closed set of supported log sources. Each variant carries its own default
// base path, include patterns, well-known files, and a default regex per
// log kind, so the classifier and resolver stay generic over the variant.

use crate::core::model::{DefaultFile, LogKind, LogSourceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Built-in patterns
// =============================================================================

/// Combined/common access log (nginx `combined`, Apache `combined`/`common`).
pub const COMBINED_ACCESS_REGEX: &str = r#"^(?P<ip>\S+) \S+ (?P<user>\S+) \[(?P<timestamp>[^\]]+)\] "(?P<method>[A-Z]+) (?P<path>\S+) (?P<protocol>[^"]+)" (?P<status>\d{3}) (?P<size>\d+|-)(?: "(?P<referer>[^"]*)" "(?P<user_agent>[^"]*)")?.*$"#;

/// nginx error log: `2024/01/10 13:55:36 [error] 1234#1234: *5 message`.
pub const NGINX_ERROR_REGEX: &str = r"^(?P<timestamp>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) \[(?P<level>\w+)\] (?P<pid>\d+)#(?P<tid>\d+): (?:\*(?P<cid>\d+) )?(?P<message>.*)$";

/// Apache 2.4 error log: `[Wed Jan 10 13:55:36.123 2024] [core:error] [pid 1:tid 2] [client 1.2.3.4:5] msg`.
pub const APACHE_ERROR_REGEX: &str = r"^\[(?P<timestamp>[^\]]+)\] \[(?:(?P<module>[^:\]]+):)?(?P<level>[^\]]+)\] (?:\[pid (?P<pid>\d+)(?::tid (?P<tid>\d+))?\] )?(?:\[client (?P<client>[^\]]+)\] )?(?P<message>.*)$";

/// BSD syslog (RFC 3164) or ISO-timestamped rsyslog lines.
pub const SYSLOG_REGEX: &str = r"^(?P<timestamp>[A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2}|\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?) (?P<host>\S+) (?P<process>[^:\[\s]+)(?:\[(?P<pid>\d+)\])?: (?P<message>.*)$";

/// Nginx Proxy Manager proxy-host access log:
/// `[10/Jan/2024:13:55:36 +0000] - 200 200 - GET https example.com "/x" [Client 1.2.3.4] [Length 12] ...`.
pub const NPM_ACCESS_REGEX: &str = r#"^\[(?P<timestamp>[^\]]+)\] (?P<cache>\S+) (?P<status>\d{3}) (?P<upstream_status>\S+) - (?P<method>[A-Z]+) (?P<scheme>\S+) (?P<host>\S+) "(?P<path>[^"]*)" \[Client (?P<ip>[^\]]+)\] \[Length (?P<size>[^\]]+)\](?P<message>.*)$"#;

// =============================================================================
// SourceType
// =============================================================================

/// A supported log source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    HostSystem,
    Nginx,
    Apache,
    /// Nginx Proxy Manager.
    Npm,
}

impl SourceType {
    /// All variants in display order.
    pub fn all() -> &'static [SourceType] {
        &[
            SourceType::HostSystem,
            SourceType::Nginx,
            SourceType::Apache,
            SourceType::Npm,
        ]
    }

    /// Stable identifier used as the settings key.
    pub fn id(&self) -> &'static str {
        match self {
            SourceType::HostSystem => "host-system",
            SourceType::Nginx => "nginx",
            SourceType::Apache => "apache",
            SourceType::Npm => "npm",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceType::HostSystem => "Host system",
            SourceType::Nginx => "nginx",
            SourceType::Apache => "Apache httpd",
            SourceType::Npm => "Nginx Proxy Manager",
        }
    }

    pub fn default_base_path(&self) -> PathBuf {
        PathBuf::from(match self {
            SourceType::HostSystem => "/var/log",
            SourceType::Nginx => "/var/log/nginx",
            SourceType::Apache => "/var/log/apache2",
            SourceType::Npm => "/data/logs",
        })
    }

    /// Default access/error include globs (file-name globs).
    pub fn default_patterns(&self) -> (Option<&'static str>, Option<&'static str>) {
        match self {
            SourceType::HostSystem => (None, None),
            SourceType::Nginx | SourceType::Apache => (Some("access*.log"), Some("error*.log")),
            SourceType::Npm => (Some("*_access.log"), Some("*_error.log")),
        }
    }

    /// Include globs used when the source config names none.
    pub fn fallback_patterns(&self) -> &'static [&'static str] {
        match self {
            SourceType::HostSystem => &[
                "*.log",
                "syslog",
                "messages",
                "secure",
                "maillog",
                "cron",
                "dmesg",
            ],
            SourceType::Nginx | SourceType::Apache => &["*.log"],
            SourceType::Npm => &["*.log"],
        }
    }

    /// Settings a source starts from when the store has no blob for it.
    pub fn default_config(&self) -> LogSourceConfig {
        let (access, error) = self.default_patterns();
        LogSourceConfig {
            base_path: self.default_base_path(),
            access_pattern: access.map(str::to_string),
            error_pattern: error.map(str::to_string),
            read_compressed: matches!(self, SourceType::HostSystem),
            ..Default::default()
        }
    }

    /// Well-known files for this source, relative to its default base path.
    pub fn default_files(&self) -> Vec<DefaultFile> {
        let base = self.default_base_path();
        let entries: &[(&str, LogKind)] = match self {
            SourceType::HostSystem => &[
                ("syslog", LogKind::Syslog),
                ("messages", LogKind::Syslog),
                ("auth.log", LogKind::Syslog),
                ("kern.log", LogKind::Syslog),
                ("mail.log", LogKind::Syslog),
                ("cron.log", LogKind::Syslog),
            ],
            SourceType::Nginx | SourceType::Apache => {
                &[("access.log", LogKind::Access), ("error.log", LogKind::Error)]
            }
            SourceType::Npm => &[
                ("fallback_access.log", LogKind::Access),
                ("fallback_error.log", LogKind::Error),
                ("default-host_access.log", LogKind::Access),
                ("default-host_error.log", LogKind::Error),
            ],
        };
        entries
            .iter()
            .map(|(name, kind)| DefaultFile {
                path: base.join(name),
                log_type: *kind,
                enabled: true,
            })
            .collect()
    }

    /// Infer the log kind of a (normalized) file from its name.
    pub fn detect_kind(&self, logical_path: &Path) -> LogKind {
        let name = logical_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match self {
            SourceType::HostSystem => {
                if name.contains("access") {
                    LogKind::Access
                } else if crate::core::classify::is_critical_basename(&name)
                    || name.starts_with("daemon")
                    || name.starts_with("user")
                {
                    LogKind::Syslog
                } else {
                    LogKind::Custom
                }
            }
            SourceType::Nginx | SourceType::Apache | SourceType::Npm => {
                if name.contains("access") {
                    LogKind::Access
                } else if name.contains("error") {
                    LogKind::Error
                } else {
                    LogKind::Custom
                }
            }
        }
    }

    /// Built-in default regex for a log kind, if this source has one.
    pub fn default_regex(&self, kind: LogKind) -> Option<&'static str> {
        match (self, kind) {
            (_, LogKind::Custom) => None,
            (_, LogKind::Syslog) => Some(SYSLOG_REGEX),
            (SourceType::Npm, LogKind::Access) => Some(NPM_ACCESS_REGEX),
            (SourceType::Npm, LogKind::Error) => Some(NGINX_ERROR_REGEX),
            (SourceType::Nginx, LogKind::Error) => Some(NGINX_ERROR_REGEX),
            (SourceType::Apache, LogKind::Error) => Some(APACHE_ERROR_REGEX),
            (SourceType::HostSystem, LogKind::Error) => None,
            (_, LogKind::Access) => Some(COMBINED_ACCESS_REGEX),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for SourceType {
    type Err = crate::util::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::all()
            .iter()
            .copied()
            .find(|t| t.id() == s)
            .ok_or_else(|| crate::util::error::EngineError::UnknownSource { id: s.to_string() })
    }
}
