//! # Core Infrastructure
//!
//! File: cli/src/core/mod.rs
//!
//! ## Overview
//!
//! Configuration loading and the error taxonomy shared by every other module.
//!
//! - `config`: layered TOML configuration (user file, project file, `--config`).
//! - `error`: `LanwatchError` and the crate-wide `Result` alias.
//!
pub mod config;
pub mod error;
