//! Process settings read from the environment.
//!
//! Every setting is optional: unset variables use defaults, and invalid values
//! fall back to the default with a warning rather than failing the hook.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing::warn;

use crate::io::artifacts::DEFAULT_MAX_SCAN_FILES;
use crate::io::state_store::FileStateStore;
use crate::messages::Locale;

pub const STATE_DIR_VAR: &str = "GSD_ENFORCE_STATE_DIR";
pub const LOCALE_VAR: &str = "GSD_ENFORCE_LOCALE";
pub const MAX_SCAN_FILES_VAR: &str = "GSD_ENFORCE_MAX_SCAN_FILES";
pub const DEBUG_VARS: &[&str] = &["GSD_DEBUG", "GSD_ENFORCE_DEBUG"];
pub const PROJECT_DIR_VAR: &str = "CLAUDE_PROJECT_DIR";
pub const HOME_VARS: &[&str] = &["HOME", "USERPROFILE"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding one turn record per session.
    pub state_dir: PathBuf,
    /// Language of user-facing reasons.
    pub locale: Locale,
    /// Cap on files enumerated per artifact spec.
    pub max_scan_files: usize,
    /// Enable the debug diagnostics channel.
    pub debug: bool,
    /// Workspace fallback when the event carries no directory.
    pub project_dir: Option<PathBuf>,
    /// Prefix shown as `~` in user-facing reasons.
    pub home_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: FileStateStore::default_dir(),
            locale: Locale::En,
            max_scan_files: DEFAULT_MAX_SCAN_FILES,
            debug: false,
            project_dir: None,
            home_dir: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.max_scan_files == 0 {
            return Err(anyhow!("max_scan_files must be > 0"));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(anyhow!("state_dir must not be empty"));
        }
        Ok(())
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Debug toggle alone, so logging can start before the rest is parsed.
    pub fn debug_from_env() -> bool {
        debug_enabled(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let locale = match var(LOCALE_VAR) {
            Some(raw) => Locale::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unknown {LOCALE_VAR}; using default locale");
                defaults.locale
            }),
            None => defaults.locale,
        };
        let max_scan_files = match var(MAX_SCAN_FILES_VAR) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    warn!(value = %raw, "invalid {MAX_SCAN_FILES_VAR}; using default");
                    defaults.max_scan_files
                }
            },
            None => defaults.max_scan_files,
        };

        let settings = Self {
            state_dir: var(STATE_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| defaults.state_dir.clone()),
            locale,
            max_scan_files,
            debug: debug_enabled(&lookup),
            project_dir: var(PROJECT_DIR_VAR).map(PathBuf::from),
            home_dir: HOME_VARS.iter().find_map(|name| var(*name)).map(PathBuf::from),
        };
        match settings.validate() {
            Ok(()) => settings,
            Err(err) => {
                warn!(error = %err, "invalid settings; using defaults");
                defaults
            }
        }
    }
}

fn debug_enabled(lookup: impl Fn(&str) -> Option<String>) -> bool {
    DEBUG_VARS.iter().any(|name| {
        lookup(*name).is_some_and(|value| !value.trim().is_empty() && is_truthy(value.trim()))
    })
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
