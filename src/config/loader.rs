// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] to
/// apply environment overrides and validate.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file, apply process environment overrides and
/// validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let mut raw_config = load_from_path(&path)?;
    apply_env_overrides(&mut raw_config, |key| std::env::var(key).ok());
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Apply environment overrides to a raw config.
///
/// - `ENABLE_<JOB>=false` disables a built-in job (`progress-sweep` reads
///   `ENABLE_PROGRESS_SWEEP`). Any other value leaves the config alone.
/// - `GITHUB_TOKEN`, `STRAVA_CLIENT_ID` and `STRAVA_CLIENT_SECRET` fill in
///   credentials the file does not set.
pub fn apply_env_overrides<F>(raw: &mut RawConfigFile, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for defaults in crate::jobs::builtin::BUILTIN_JOBS {
        let key = enable_var(defaults.name);
        let Some(value) = lookup(&key) else {
            continue;
        };
        if value.trim().eq_ignore_ascii_case("false") {
            debug!(job = defaults.name, var = %key, "job disabled by environment");
            raw.jobs.entry(defaults.name.to_string()).or_default().enabled = Some(false);
        }
    }

    if raw.github.token.is_none() {
        raw.github.token = lookup("GITHUB_TOKEN");
    }
    if raw.strava.client_id.is_none() {
        raw.strava.client_id = lookup("STRAVA_CLIENT_ID");
    }
    if raw.strava.client_secret.is_none() {
        raw.strava.client_secret = lookup("STRAVA_CLIENT_SECRET");
    }
}

/// `deadline-sweep` -> `ENABLE_DEADLINE_SWEEP`.
pub fn enable_var(job: &str) -> String {
    format!("ENABLE_{}", job.replace('-', "_").to_ascii_uppercase())
}
