//! Resolved profile set shared by all jobs

use crate::config::{Config, ConfigError, EncodingProfile, DEFAULT_PROFILE};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Immutable profiles with a guaranteed default
///
/// Jobs hold an `Arc` to their profile, so a job never observes another
/// job's profile changing.
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: HashMap<String, Arc<EncodingProfile>>,
    default: Arc<EncodingProfile>,
}

impl ProfileSet {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let profiles: HashMap<String, Arc<EncodingProfile>> = config
            .profiles
            .iter()
            .map(|(name, profile)| (name.clone(), Arc::new(profile.clone())))
            .collect();

        let default = profiles.get(DEFAULT_PROFILE).cloned().ok_or_else(|| {
            ConfigError::Invalid(format!("profile '{}' must be defined", DEFAULT_PROFILE))
        })?;

        Ok(Self { profiles, default })
    }

    /// Look up a profile by name, falling back to the default profile
    pub fn resolve<'a>(&'a self, name: Option<&'a str>) -> (&'a str, Arc<EncodingProfile>) {
        match name.and_then(|n| self.profiles.get(n).map(|p| (n, p))) {
            Some((name, profile)) => (name, Arc::clone(profile)),
            None => {
                if let Some(name) = name {
                    debug!(profile = name, "Unknown profile, using default");
                }
                (DEFAULT_PROFILE, Arc::clone(&self.default))
            }
        }
    }
}
