//! Feature flags gating dashboard sections and routes.
//!
//! Defaults are compiled in. In development mode a per-developer override
//! map is loaded from (and saved to) `feature_flags.json`; overrides win over
//! defaults. Production never reads or writes the override file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Mode;

/// Override file name in the config directory
pub const OVERRIDES_FILE: &str = "feature_flags.json";

/// Compiled-in flag defaults
pub const DEFAULT_FLAGS: &[(&str, bool)] = &[
    // Admin features
    ("adminDashboard", true),
    ("financialDashboard", false),
    ("jobsAdminDashboard", true),
    ("usersManagement", true),
    ("blogAdmin", false),
    // Recruiter features
    ("recruiterDashboard", true),
    ("recruiterJobs", true),
    ("recruiterCandidates", true),
    ("recruiterInterviews", false),
    ("recruiterApplications", false),
    ("dynamicJobForm", false),
    ("multiStepJobCreation", true),
    ("applicationFormBuilder", false),
    // Jobseeker features
    ("jobseekerBlog", false),
    // General features
    ("referAndWin", false),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagState {
    pub name: String,
    pub enabled: bool,
    pub default: bool,
    pub overridden: bool,
}

#[derive(Debug, Clone)]
pub struct FeatureFlags {
    defaults: BTreeMap<String, bool>,
    overrides: BTreeMap<String, bool>,
    mode: Mode,
    overrides_path: Option<PathBuf>,
}

impl FeatureFlags {
    /// Defaults only, nothing persisted
    pub fn new(mode: Mode) -> Self {
        Self {
            defaults: DEFAULT_FLAGS
                .iter()
                .map(|(name, enabled)| (name.to_string(), *enabled))
                .collect(),
            overrides: BTreeMap::new(),
            mode,
            overrides_path: None,
        }
    }

    /// Defaults plus the override file at `path` when not in production.
    /// A corrupt override file is ignored with a warning.
    pub fn load(mode: Mode, path: impl Into<PathBuf>) -> Self {
        let mut flags = Self::new(mode);
        if mode.is_production() {
            return flags;
        }

        let path = path.into();
        match Self::read_overrides(&path) {
            Ok(overrides) => {
                debug!(count = overrides.len(), "Loaded feature flag overrides");
                flags.overrides = overrides;
            }
            Err(e) => warn!(error = %e, "Ignoring unreadable feature flag overrides"),
        }
        flags.overrides_path = Some(path);
        flags
    }

    fn read_overrides(path: &Path) -> Result<BTreeMap<String, bool>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse feature flag overrides")
    }

    fn save_overrides(&self) -> Result<()> {
        let Some(ref path) = self.overrides_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.overrides)?)?;
        Ok(())
    }

    pub fn is_known(&self, flag: &str) -> bool {
        self.defaults.contains_key(flag)
    }

    /// Override if one is set, otherwise the default. Unknown flags are off.
    pub fn is_enabled(&self, flag: &str) -> bool {
        self.overrides
            .get(flag)
            .or_else(|| self.defaults.get(flag))
            .copied()
            .unwrap_or(false)
    }

    pub fn set_override(&mut self, flag: &str, enabled: bool) -> Result<()> {
        if self.mode.is_production() {
            anyhow::bail!("Feature flag overrides are disabled in production");
        }
        if !self.is_known(flag) {
            anyhow::bail!("Unknown feature flag: {}", flag);
        }
        self.overrides.insert(flag.to_string(), enabled);
        self.save_overrides()?;
        info!(flag, enabled, "Feature flag overridden");
        Ok(())
    }

    pub fn reset_overrides(&mut self) -> Result<()> {
        if self.mode.is_production() {
            anyhow::bail!("Feature flag overrides are disabled in production");
        }
        self.overrides.clear();
        if let Some(ref path) = self.overrides_path {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        info!("Feature flag overrides reset");
        Ok(())
    }

    pub fn all(&self) -> Vec<FlagState> {
        self.defaults
            .iter()
            .map(|(name, default)| FlagState {
                name: name.clone(),
                enabled: self.is_enabled(name),
                default: *default,
                overridden: self.overrides.contains_key(name),
            })
            .collect()
    }
}
