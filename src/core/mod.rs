// LogDeck - core/mod.rs
//
// Core logic: data model, source types, path normalization, scanning,
// classification, regex resolution and suggestion, line parsing.
// Must NOT depend on: platform, app.

pub mod classify;
pub mod discovery;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod resolver;
pub mod source;
pub mod suggest;
