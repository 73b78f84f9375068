// crates/fedis-bench-config/src/lib.rs
// ============================================================================
// Module: Fedis Bench Config Library
// Description: Layered configuration for the fedis benchmark harness.
// Purpose: Resolve defaults, TOML files, and environment into one config.
// Dependencies: crate::{config, env}
// ============================================================================

//! ## Overview
//! Fedis bench config resolves the harness configuration once per process:
//! built-in defaults, an optional TOML file, then `FEDIS_*` environment
//! overrides. Validation is fail-closed; the resolved [`BenchConfig`] builds
//! the suite plan, server launcher, and event sink the harness consumes.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod config;
mod env;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::BenchConfig;
pub use config::ConfigError;
pub use config::EventsConfig;
pub use config::ServerCommandConfig;
pub use env::BenchEnv;
pub use env::read_env_strict;
