//! Layered configuration for the KrakenHashes scheduler: TOML file,
//! environment overrides, typed defaults. Loaded once at startup into an
//! immutable snapshot; nothing in this crate hands out a live handle for
//! the scheduler to poll mid-tick.

pub mod config;
pub mod env;
pub mod schema;

pub use config::{load_config, load_from_file, validate_config};
pub use env::apply_env_overrides;
pub use schema::{
    BenchmarkSection, CommandPlaneSection, ConfigError, KrakenConfig, RuleSplittingSection,
    SchedulingSection, ServerSection,
};
