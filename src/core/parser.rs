// LogDeck - core/parser.rs
//
// Per-line parsing for live tail: apply the resolved regex to a raw line to
// extract named fields, and sniff a timestamp out of the line so events can
// be ordered even when the regex has no `timestamp` group.
// Core layer: works on strings only, never touches the filesystem.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Named captures extracted from one line.
pub type ParsedFields = BTreeMap<String, String>;

/// A compiled parsing rule for one logical file.
#[derive(Debug, Clone)]
pub struct LineParser {
    regex: Option<Regex>,
}

impl LineParser {
    /// Build a parser from a resolved regex. An empty or uncompilable pattern
    /// yields a parser that only forwards raw lines.
    pub fn new(pattern: &str) -> Self {
        if pattern.is_empty() {
            return Self { regex: None };
        }
        match Regex::new(pattern) {
            Ok(re) => Self { regex: Some(re) },
            Err(e) => {
                tracing::warn!(error = %e, "Resolved regex does not compile; forwarding raw lines");
                Self { regex: None }
            }
        }
    }

    /// A parser that never extracts fields.
    pub fn raw() -> Self {
        Self { regex: None }
    }

    pub fn has_regex(&self) -> bool {
        self.regex.is_some()
    }

    /// Extract named captures from `line`, or `None` when there is no regex
    /// or the line does not match.
    pub fn parse(&self, line: &str) -> Option<ParsedFields> {
        self.regex.as_ref().and_then(|re| parse_line(re, line))
    }
}

/// Apply `re` to `line` and collect every named group that participated.
pub fn parse_line(re: &Regex, line: &str) -> Option<ParsedFields> {
    let caps = re.captures(line)?;
    let fields = re
        .capture_names()
        .flatten()
        .filter_map(|name| {
            caps.name(name)
                .map(|m| (name.to_string(), m.as_str().to_string()))
        })
        .collect();
    Some(fields)
}

// =============================================================================
// Timestamp sniffing
// =============================================================================

/// Try to find and parse any recognisable timestamp embedded anywhere in
/// `raw_line`, returning the first successful result.
///
/// Patterns are tried from most-precise (RFC 3339 with explicit timezone)
/// to least-precise (year-less BSD syslog), so higher-confidence results
/// take priority over looser matches on the same line.
pub fn sniff_timestamp(raw_line: &str) -> Option<DateTime<Utc>> {
    struct Sniffer {
        re: Regex,
        parse: fn(&str) -> Option<DateTime<Utc>>,
    }

    static SNIFFERS: OnceLock<Vec<Sniffer>> = OnceLock::new();

    let sniffers = SNIFFERS.get_or_init(|| {
        // Patterns are constants exercised by the unit tests below.
        fn re(pat: &str) -> Regex {
            Regex::new(pat).expect("sniff_timestamp: invalid regex")
        }

        vec![
            // RFC 3339 / ISO 8601 with timezone: 2024-01-15T14:30:22.123+05:30
            Sniffer {
                re: re(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})"),
                parse: |s| {
                    let fixed = normalise_offset(s);
                    DateTime::parse_from_rfc3339(&fixed.replace(',', "."))
                        .ok()
                        .map(|dt| dt.into())
                },
            },
            // ISO 8601 without timezone, optional dot/comma fraction.
            Sniffer {
                re: re(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?"),
                parse: |s| {
                    let s = s.replace(',', ".").replace('T', " ");
                    NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                        .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
                        .ok()
                        .map(|ndt| ndt.and_utc())
                },
            },
            // nginx error log: 2024/01/15 14:30:22
            Sniffer {
                re: re(r"\d{4}/\d{2}/\d{2}[ T]\d{2}:\d{2}:\d{2}(?:\.\d+)?"),
                parse: |s| {
                    let s = s.replace('/', "-").replace('T', " ");
                    NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                        .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
                        .ok()
                        .map(|ndt| ndt.and_utc())
                },
            },
            // Common log format: 15/Jan/2024:14:30:22 +0000
            Sniffer {
                re: re(r"\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4}"),
                parse: |s| {
                    DateTime::parse_from_str(s, "%d/%b/%Y:%H:%M:%S %z")
                        .ok()
                        .map(|dt| dt.into())
                },
            },
            // Apache error log: Wed Jan 10 13:55:36.123456 2024
            Sniffer {
                re: re(r"[A-Z][a-z]{2} [A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2}(?:\.\d+)? \d{4}"),
                parse: |s| {
                    let s: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
                    NaiveDateTime::parse_from_str(&s, "%a %b %e %H:%M:%S%.f %Y")
                        .or_else(|_| NaiveDateTime::parse_from_str(&s, "%a %b %e %H:%M:%S %Y"))
                        .ok()
                        .map(|ndt| ndt.and_utc())
                },
            },
            // BSD syslog year-less: Jan 15 14:30:22 (current year injected).
            Sniffer {
                re: re(r"[A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2}"),
                parse: |s| {
                    let year = Utc::now().year();
                    let with_year = format!("{year} {s}");
                    NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S")
                        .ok()
                        .map(|ndt| ndt.and_utc())
                },
            },
            // Unix epoch seconds, only at line start.
            Sniffer {
                re: re(r"^\d{10}(?:\.\d+)?"),
                parse: |s| {
                    let (secs_str, _) = s.split_once('.').unwrap_or((s, ""));
                    secs_str
                        .parse::<i64>()
                        .ok()
                        .and_then(|secs| DateTime::from_timestamp(secs, 0))
                },
            },
        ]
    });

    for sniffer in sniffers {
        if let Some(m) = sniffer.re.find(raw_line) {
            if let Some(dt) = (sniffer.parse)(m.as_str()) {
                return Some(dt);
            }
        }
    }
    None
}

/// Normalise `+0530` to `+05:30` so `parse_from_rfc3339` accepts it.
fn normalise_offset(s: &str) -> String {
    if s.len() > 20 {
        let tail = &s[s.len().saturating_sub(5)..];
        if !tail.contains(':') && (tail.starts_with('+') || tail.starts_with('-')) {
            return format!("{}{}:{}", &s[..s.len() - 5], &tail[..3], &tail[3..]);
        }
    }
    s.to_owned()
}
