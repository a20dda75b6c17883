//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::onboarding::registry::OnboardingSettings;

/// Server configuration, read from `HANDIE_ONBOARDING_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Overrides the catalog's auto-save interval.
    pub save_interval_secs: Option<u64>,
    /// Overrides the catalog's auto-save switch.
    pub auto_save: Option<bool>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/onboarding.db"),
            save_interval_secs: None,
            auto_save: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port: u16 = lookup("HANDIE_ONBOARDING_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let db_path = lookup("HANDIE_ONBOARDING_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let save_interval_secs: Option<u64> = lookup("HANDIE_ONBOARDING_SAVE_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0);

        let auto_save = lookup("HANDIE_ONBOARDING_AUTOSAVE").and_then(|s| parse_bool(&s));

        Self {
            port,
            db_path,
            save_interval_secs,
            auto_save,
        }
    }

    /// Catalog settings with the environment overrides applied.
    pub fn apply(&self, settings: &OnboardingSettings) -> OnboardingSettings {
        OnboardingSettings {
            save_interval_secs: self.save_interval_secs.unwrap_or(settings.save_interval_secs),
            auto_save: self.auto_save.unwrap_or(settings.auto_save),
            ..settings.clone()
        }
    }

    pub fn save_interval(settings: &OnboardingSettings) -> Duration {
        Duration::from_secs(settings.save_interval_secs.max(1))
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
