pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod exit;
pub mod export;
pub mod platform;
pub mod probe;
pub mod probes;
pub mod scoring;
pub mod tui;
pub mod ui;
