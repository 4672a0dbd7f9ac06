// LogDeck - lib.rs
//
// Library entry point. The engine behind a multi-source log dashboard:
// discovers log files per source, classifies them, resolves the parsing
// regex for each logical file, suggests regexes from sample lines, inspects
// the host's rotation setup, and streams new lines to live viewers.
//
// The CLI in `main.rs` is a thin JSON front-end over `app::engine::LogEngine`.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
