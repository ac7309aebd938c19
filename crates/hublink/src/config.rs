//! CLI configuration: thin wrapper around `hublink_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--url, --token, --insecure, --timeout).

use std::time::Duration;

use secrecy::SecretString;

use hublink_core::{ClientConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use hublink_config::{Config, Profile, config_path, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `ClientConfig` from the config file, the active profile, and
/// CLI overrides.
pub fn build_client_config(global: &GlobalOpts) -> Result<ClientConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    // An explicitly named profile must exist; the default one may not
    let mut profile = if global.profile.is_some() {
        cfg.profile(Some(profile_name.as_str()))?.1.clone()
    } else {
        cfg.profiles.get(&profile_name).cloned().unwrap_or_default()
    };

    // 1. Hub URL (flag > env > profile)
    if let Some(ref url) = global.url {
        profile.url.clone_from(url);
    }
    if profile.url.is_empty() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }

    // 2. Token (flag > profile chain)
    let mut config = match global.token {
        Some(ref token) => hublink_config::to_client_config(
            &profile,
            &cfg.defaults,
            SecretString::from(token.clone()),
        )?,
        None => hublink_config::profile_to_client_config(&profile, &profile_name, &cfg.defaults)?,
    };

    // 3. Flag overrides
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.http_timeout = Duration::from_secs(secs);
    }

    Ok(config)
}
