//! Config resolution with CLI flag overrides.
//!
//! `narwal-config` owns the file format; this module layers `--host`,
//! `--port` and `--device-id` on top of the selected profile.

use std::path::PathBuf;

use narwal_config::{Config, Profile};
use narwal_core::SessionConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The config file this invocation reads and writes.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(narwal_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let cfg = match &global.config {
        Some(path) => narwal_config::load_config_from(path)?,
        None => narwal_config::load_config()?,
    };
    Ok(cfg)
}

pub fn save(global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    match &global.config {
        Some(path) => narwal_config::save_config_to(path, cfg)?,
        None => narwal_config::save_config(cfg)?,
    }
    tracing::info!(path = %config_path(global).display(), "Config saved");
    Ok(())
}

pub fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}

/// Build a `SessionConfig` from the config file, profile, and CLI overrides.
pub fn resolve_session_config(global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let cfg = load(global)?;

    let selected = match cfg.profile(global.profile.as_deref()) {
        Ok((_, profile)) => Some(profile.clone()),
        Err(narwal_config::ConfigError::UnknownProfile { name }) => {
            return Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(&cfg),
            });
        }
        Err(_) => None,
    };

    let mut profile = match (selected, global.host.as_deref()) {
        (Some(profile), _) => profile,
        (None, Some(host)) => Profile::for_host(host),
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path(global).display().to_string(),
            });
        }
    };

    if let Some(host) = &global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = Some(port);
    }
    if let Some(device_id) = &global.device_id {
        profile.device_id = Some(device_id.clone());
    }

    Ok(narwal_config::profile_to_session_config(
        &profile,
        &cfg.defaults,
    )?)
}
