// LogDeck - app/mod.rs
//
// Application layer: the engine facade, override store, scan orchestration
// and live-tail sessions.
// Dependencies: core layer, platform layer (settings, host inspection, file
// access).

pub mod engine;
pub mod overrides;
pub mod scan;
pub mod tail;
