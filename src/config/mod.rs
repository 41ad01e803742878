// src/config/mod.rs

//! Configuration loading and validation for ethos.
//!
//! - `model.rs`: the TOML-backed raw model and the validated [`ConfigFile`].
//! - `loader.rs`: reading from disk and environment overrides.
//! - `validate.rs`: `RawConfigFile -> ConfigFile` conversion.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_env_overrides, enable_var, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, EvaluatorConfig, GithubSection, JobConfig, LedgerSection, RawConfigFile,
    SchedulerConfig, StoreSection, StravaSection,
};
