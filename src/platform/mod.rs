// LogDeck - platform/mod.rs
//
// Host I/O: configuration file, compressed file reads, rotation and
// service inspection, settings persistence.
// Dependencies: core (data model), util.
// Must NOT depend on: app.

pub mod config;
pub mod fs;
pub mod rotation;
pub mod settings;
