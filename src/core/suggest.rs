// LogDeck - core/suggest.rs
//
// Regex suggestion from a single sample line.
//
// The line is walked left to right. At every token boundary an ordered list
// of recognizers (timestamps, HTTP request triples, IP addresses, bracketed
// severities, quoted strings, integers) is tried; the first hit becomes a
// named capture group. Whatever lies between recognized tokens is
// generalised (`\s+` for whitespace, `\S+` for word runs, literal
// punctuation), and the rest of the line after the last token is captured
// as `message`.
//
// Every suggestion is re-applied to its own sample before it is returned.
// A suggestion that fails to reproduce its sample is an internal error; it
// is logged and replaced by the message-only regex.

use crate::core::model::{CapturedGroup, Suggestion};
use crate::util::constants;
use crate::util::logging;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Regex used when no token in the sample is recognised.
pub const MESSAGE_ONLY_REGEX: &str = r"^(?P<message>.*)$";

/// Characters emitted as escaped literals between tokens.
const LITERAL_PUNCTUATION: &[char] = &[
    '[', ']', '"', '\'', '(', ')', '{', '}', '<', '>', ':', ',', ';', '=', '|',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    BracketTimestamp,
    IsoTimestamp,
    SlashTimestamp,
    SyslogTimestamp,
    Request,
    Ipv4,
    Ipv6,
    Level,
    Quoted,
    Integer,
    Dash,
}

struct Recognizer {
    kind: TokenKind,
    re: Regex,
}

/// Ordered recognizers. Earlier entries win when several match at the same
/// position, so the more specific shapes come first.
fn recognizers() -> &'static [Recognizer] {
    static RECOGNIZERS: OnceLock<Vec<Recognizer>> = OnceLock::new();
    RECOGNIZERS.get_or_init(|| {
        // Patterns are constants exercised by the unit tests below.
        fn r(kind: TokenKind, pat: &str) -> Recognizer {
            Recognizer {
                kind,
                re: Regex::new(pat).expect("suggest: invalid recognizer regex"),
            }
        }
        use TokenKind::*;
        vec![
            // [10/Jan/2024:13:55:36 +0000]
            r(
                BracketTimestamp,
                r"^\[\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4}\]",
            ),
            // [Wed Jan 10 13:55:36.123456 2024]
            r(
                BracketTimestamp,
                r"^\[[A-Z][a-z]{2} [A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2}(?:\.\d+)? \d{4}\]",
            ),
            r(
                IsoTimestamp,
                r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
            ),
            r(SlashTimestamp, r"^\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}"),
            r(SyslogTimestamp, r"^[A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2}"),
            r(Request, r#"^"[A-Z]+ \S+ HTTP/[\d.]+""#),
            r(Ipv4, r"^\d{1,3}(?:\.\d{1,3}){3}"),
            r(Ipv6, r"^(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}"),
            r(
                Ipv6,
                r"^(?:[0-9a-fA-F]{1,4}(?::[0-9a-fA-F]{1,4})*)?::(?:[0-9a-fA-F]{1,4}(?::[0-9a-fA-F]{1,4})*)?",
            ),
            r(
                Level,
                r"(?i)^\[(?:\w+:)?(?:emerg|emergency|alert|crit|critical|err|error|warn|warning|notice|info|debug|trace|fatal)\]",
            ),
            r(Quoted, r#"^"[^"]*""#),
            r(Integer, r"^\d+"),
            r(Dash, r"^-"),
        ]
    })
}

/// One element of the generated pattern, in line order.
#[derive(Debug)]
enum Piece {
    Field(String),
    Space,
    Literal(char),
    Word,
}

/// Group naming and the little bit of context the naming rules need.
#[derive(Default)]
struct Namer {
    counts: HashMap<&'static str, usize>,
    status_seen: bool,
    size_seen: bool,
    request_seen: bool,
    quotes_after_request: usize,
}

impl Namer {
    /// Claim a unique group name: `base`, then `base_2`, `base_3`, ...
    fn claim(&mut self, base: &'static str) -> String {
        let n = self.counts.entry(base).or_insert(0);
        *n += 1;
        if *n == 1 {
            base.to_string()
        } else {
            format!("{base}_{n}")
        }
    }

    fn accepts(&self, kind: TokenKind, text: &str, after: Option<char>) -> bool {
        let clean_end = after.map_or(true, |c| !c.is_alphanumeric());
        match kind {
            TokenKind::Ipv4 => {
                clean_end
                    && after != Some('.')
                    && text
                        .split('.')
                        .all(|octet| octet.parse::<u16>().is_ok_and(|v| v <= 255))
            }
            TokenKind::Ipv6 => clean_end && text.chars().any(|c| c.is_ascii_hexdigit()),
            TokenKind::Integer => clean_end && after != Some('.'),
            TokenKind::Dash => {
                self.status_seen && !self.size_seen && after.map_or(true, char::is_whitespace)
            }
            TokenKind::IsoTimestamp | TokenKind::SlashTimestamp | TokenKind::SyslogTimestamp => {
                clean_end
            }
            TokenKind::BracketTimestamp
            | TokenKind::Request
            | TokenKind::Level
            | TokenKind::Quoted => true,
        }
    }

    fn fragment(&mut self, kind: TokenKind, text: &str) -> String {
        match kind {
            TokenKind::BracketTimestamp => {
                format!(r"\[(?P<{}>[^\]]+)\]", self.claim("timestamp"))
            }
            TokenKind::IsoTimestamp => format!(
                r"(?P<{}>\d{{4}}-\d{{2}}-\d{{2}}[T ]\d{{2}}:\d{{2}}:\d{{2}}(?:[.,]\d+)?(?:Z|[+-]\d{{2}}:?\d{{2}})?)",
                self.claim("timestamp")
            ),
            TokenKind::SlashTimestamp => format!(
                r"(?P<{}>\d{{4}}/\d{{2}}/\d{{2}} \d{{2}}:\d{{2}}:\d{{2}})",
                self.claim("timestamp")
            ),
            TokenKind::SyslogTimestamp => format!(
                r"(?P<{}>[A-Z][a-z]{{2}} +\d{{1,2}} \d{{2}}:\d{{2}}:\d{{2}})",
                self.claim("timestamp")
            ),
            TokenKind::Request => {
                self.request_seen = true;
                format!(
                    r#""(?P<{}>[A-Z]+) (?P<{}>\S+) (?P<{}>HTTP/[\d.]+)""#,
                    self.claim("method"),
                    self.claim("path"),
                    self.claim("protocol")
                )
            }
            TokenKind::Ipv4 => format!(r"(?P<{}>\d{{1,3}}(?:\.\d{{1,3}}){{3}})", self.claim("ip")),
            TokenKind::Ipv6 => format!(r"(?P<{}>[0-9a-fA-F:]+)", self.claim("ip")),
            TokenKind::Level => format!(r"\[(?:\w+:)?(?P<{}>\w+)\]", self.claim("level")),
            TokenKind::Quoted => {
                let base = if self.request_seen {
                    self.quotes_after_request += 1;
                    match self.quotes_after_request {
                        1 => "referer",
                        2 => "user_agent",
                        _ => "quoted",
                    }
                } else {
                    "quoted"
                };
                format!(r#""(?P<{}>[^"]*)""#, self.claim(base))
            }
            TokenKind::Integer => {
                let is_status = !self.status_seen
                    && text.len() == 3
                    && text.parse::<u16>().is_ok_and(|v| (100..=599).contains(&v));
                if is_status {
                    self.status_seen = true;
                    format!(r"(?P<{}>\d{{3}})", self.claim("status"))
                } else if self.status_seen && !self.size_seen {
                    self.size_seen = true;
                    format!(r"(?P<{}>\d+|-)", self.claim("size"))
                } else {
                    format!(r"(?P<{}>\d+)", self.claim("number"))
                }
            }
            TokenKind::Dash => {
                self.size_seen = true;
                format!(r"(?P<{}>\d+|-)", self.claim("size"))
            }
        }
    }
}

/// Propose a capture regex for `sample` and test it against the sample.
///
/// Only the first line of `sample` is used. The result always matches that
/// line; `test_result` carries the captured value of every participating
/// named group.
pub fn suggest(sample: &str) -> Suggestion {
    let line = sample.lines().next().unwrap_or("");
    let pattern = build_pattern(line);

    match self_test(&pattern, line) {
        Some(suggestion) => {
            tracing::debug!(
                groups = suggestion.groups.len(),
                line = logging::preview(line),
                "Regex suggestion generated"
            );
            suggestion
        }
        None => {
            tracing::error!(
                regex = %pattern,
                line = logging::preview(line),
                "Generated regex does not reproduce its sample; using message-only regex"
            );
            // MESSAGE_ONLY_REGEX matches every single line.
            self_test(MESSAGE_ONLY_REGEX, line).unwrap_or_else(|| Suggestion {
                regex: MESSAGE_ONLY_REGEX.to_string(),
                groups: vec!["message".to_string()],
                test_result: vec![CapturedGroup {
                    name: "message".to_string(),
                    value: line.to_string(),
                }],
            })
        }
    }
}

fn build_pattern(line: &str) -> String {
    let pieces = tokenize(scan_window(line));
    let Some(last_field) = pieces.iter().rposition(|p| matches!(p, Piece::Field(_))) else {
        return MESSAGE_ONLY_REGEX.to_string();
    };

    let mut out = String::from("^");
    for (i, piece) in pieces[..=last_field].iter().enumerate() {
        match piece {
            Piece::Field(fragment) => out.push_str(fragment),
            Piece::Space => out.push_str(r"\s+"),
            Piece::Literal(c) => out.push_str(&regex::escape(&c.to_string())),
            Piece::Word => {
                // Lazy when glued to a field so the field keeps its digits.
                if matches!(pieces.get(i + 1), Some(Piece::Field(_))) {
                    out.push_str(r"\S+?");
                } else {
                    out.push_str(r"\S+");
                }
            }
        }
    }
    out.push_str(r"\s*(?P<message>.*)$");
    out
}

/// The prefix of `line` that is tokenized; anything beyond it ends up in
/// `message`.
fn scan_window(line: &str) -> &str {
    let max = constants::MAX_SAMPLE_LINE_LENGTH;
    if line.len() <= max {
        return line;
    }
    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

fn tokenize(line: &str) -> Vec<Piece> {
    let mut namer = Namer::default();
    let mut pieces = Vec::new();
    let mut in_word = false;
    let mut pos = 0;

    while pos < line.len() {
        let rest = &line[pos..];
        let at_boundary = line[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());

        if at_boundary {
            if let Some((fragment, len)) = recognize(rest, &mut namer) {
                if in_word {
                    pieces.push(Piece::Word);
                    in_word = false;
                }
                pieces.push(Piece::Field(fragment));
                pos += len;
                continue;
            }
        }

        let Some(c) = rest.chars().next() else { break };
        if c.is_whitespace() {
            if in_word {
                pieces.push(Piece::Word);
                in_word = false;
            }
            let ws = rest
                .find(|ch: char| !ch.is_whitespace())
                .unwrap_or(rest.len());
            pieces.push(Piece::Space);
            pos += ws;
            continue;
        }
        if LITERAL_PUNCTUATION.contains(&c) {
            if in_word {
                pieces.push(Piece::Word);
                in_word = false;
            }
            pieces.push(Piece::Literal(c));
        } else {
            in_word = true;
        }
        pos += c.len_utf8();
    }
    if in_word {
        pieces.push(Piece::Word);
    }
    pieces
}

fn recognize(rest: &str, namer: &mut Namer) -> Option<(String, usize)> {
    for recognizer in recognizers() {
        let Some(m) = recognizer.re.find(rest) else {
            continue;
        };
        let after = rest[m.end()..].chars().next();
        if !namer.accepts(recognizer.kind, m.as_str(), after) {
            continue;
        }
        let fragment = namer.fragment(recognizer.kind, m.as_str());
        return Some((fragment, m.end()));
    }
    None
}

/// Compile `pattern` and apply it to `line`. `None` when it does not
/// compile or does not match.
fn self_test(pattern: &str, line: &str) -> Option<Suggestion> {
    let re = Regex::new(pattern).ok()?;
    let caps = re.captures(line)?;
    let groups: Vec<String> = re.capture_names().flatten().map(str::to_string).collect();
    let test_result = groups
        .iter()
        .filter_map(|name| {
            caps.name(name).map(|m| CapturedGroup {
                name: name.clone(),
                value: m.as_str().to_string(),
            })
        })
        .collect();
    Some(Suggestion {
        regex: pattern.to_string(),
        groups,
        test_result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLF_LINE: &str =
        r#"192.168.1.10 - - [10/Jan/2024:13:55:36 +0000] "GET /index.html HTTP/1.1" 200 1043"#;

    #[test]
    fn test_common_log_format_groups() {
        let s = suggest(CLF_LINE);
        assert_ne!(s.regex, MESSAGE_ONLY_REGEX, "tokens should be recognised");
        assert_eq!(s.captured("ip"), Some("192.168.1.10"));
        assert_eq!(s.captured("timestamp"), Some("10/Jan/2024:13:55:36 +0000"));
        assert_eq!(s.captured("method"), Some("GET"));
        assert_eq!(s.captured("path"), Some("/index.html"));
        assert_eq!(s.captured("protocol"), Some("HTTP/1.1"));
        assert_eq!(s.captured("status"), Some("200"));
        assert_eq!(s.captured("size"), Some("1043"));
    }

    #[test]
    fn test_combined_format_referer_and_agent() {
        let line = r#"10.0.0.1 - bob [10/Jan/2024:13:55:36 +0000] "POST /api HTTP/2.0" 201 12 "https://example.com/" "curl/8.0""#;
        let s = suggest(line);
        assert_eq!(s.captured("referer"), Some("https://example.com/"));
        assert_eq!(s.captured("user_agent"), Some("curl/8.0"));
        assert_eq!(s.captured("status"), Some("201"));
    }

    #[test]
    fn test_dash_size_and_ipv6() {
        let line = r#"::1 - - [10/Jan/2024:13:55:36 +0000] "GET / HTTP/1.1" 404 -"#;
        let s = suggest(line);
        assert_eq!(s.captured("ip"), Some("::1"));
        assert_eq!(s.captured("status"), Some("404"));
        assert_eq!(s.captured("size"), Some("-"));
    }

    #[test]
    fn test_nginx_error_line() {
        let line = r#"2024/01/15 14:30:22 [error] 1234#0: *1 open() "/x" failed (2: No such file)"#;
        let s = suggest(line);
        assert_eq!(s.captured("timestamp"), Some("2024/01/15 14:30:22"));
        assert_eq!(s.captured("level"), Some("error"));
        assert_eq!(s.captured("number"), Some("1234"));
        assert_eq!(s.captured("number_2"), Some("0"));
        assert_eq!(s.captured("quoted"), Some("/x"));
    }

    #[test]
    fn test_apache_error_line() {
        let line = "[Wed Jan 10 13:55:36.123456 2024] [core:error] [pid 1234] AH00037: Symbolic link not allowed";
        let s = suggest(line);
        assert_eq!(s.captured("timestamp"), Some("Wed Jan 10 13:55:36.123456 2024"));
        assert_eq!(s.captured("level"), Some("error"));
        assert!(s.captured("message").is_some_and(|m| m.contains("AH00037")));
    }

    #[test]
    fn test_syslog_line() {
        let line = "Jan 15 14:30:22 myhost sshd[1234]: Accepted publickey for root from 10.0.0.5 port 52144 ssh2";
        let s = suggest(line);
        assert_eq!(s.captured("timestamp"), Some("Jan 15 14:30:22"));
        assert_eq!(s.captured("ip"), Some("10.0.0.5"));
        assert_eq!(s.captured("number"), Some("1234"));
    }

    #[test]
    fn test_iso_timestamp_rest_is_message() {
        let s = suggest("2024-01-15T14:30:22.123Z INFO started worker");
        assert_eq!(s.captured("timestamp"), Some("2024-01-15T14:30:22.123Z"));
        assert_eq!(s.captured("message"), Some("INFO started worker"));
    }

    #[test]
    fn test_no_tokens_yields_message_only() {
        let s = suggest("hello world");
        assert_eq!(s.regex, MESSAGE_ONLY_REGEX);
        assert_eq!(s.groups, vec!["message".to_string()]);
        assert_eq!(s.captured("message"), Some("hello world"));

        let empty = suggest("");
        assert_eq!(empty.regex, MESSAGE_ONLY_REGEX);
        assert_eq!(empty.captured("message"), Some(""));
    }

    #[test]
    fn test_every_suggestion_matches_its_sample() {
        let samples = [
            CLF_LINE,
            "1.2.3.4/24 via 10.0.0.1 dev eth0",
            "value=300 other=400 third=500",
            "[INFO] (worker) {x} <y> a|b; c, d",
            "999.1.1.1 is not an address",
            "2001:db8::1 - - [10/Jan/2024:13:55:36 +0000] \"GET /a?b=c HTTP/1.0\" 500 0",
            "\"unterminated quote 42",
            "ünïcödé 2024-01-15 10:00:00 ✓ done",
            "1705329022.123 event fired",
        ];
        for line in samples {
            let s = suggest(line);
            let re = Regex::new(&s.regex).expect("suggested regex compiles");
            assert!(re.is_match(line), "regex {} does not match {line:?}", s.regex);
            assert!(!s.test_result.is_empty(), "no captures for {line:?}");
        }
    }

    #[test]
    fn test_group_names_are_unique() {
        let s = suggest("2024-01-15 10:00:00 2024-01-15 10:00:01 7 8");
        assert!(s.groups.contains(&"timestamp".to_string()));
        assert!(s.groups.contains(&"timestamp_2".to_string()));
        assert!(s.groups.contains(&"number_2".to_string()));
    }

    #[test]
    fn test_only_first_line_used() {
        let s = suggest("alpha 42\nbeta");
        assert_eq!(s.captured("number"), Some("42"));
    }
}
