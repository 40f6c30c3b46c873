use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tallyfeed_import::{RuleError, RuleSet, RuleStore};

/// Settings file looked up in the working directory when `--config` is absent.
pub const DEFAULT_SETTINGS_FILE: &str = "tallyfeed.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub rules: RuleFiles,
    pub feed: FeedSettings,
    pub camt: CamtSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleFiles {
    /// Shared payee rules. Required.
    pub base: PathBuf,
    /// Personal rules that take precedence. Optional.
    pub overrides: PathBuf,
}

impl Default for RuleFiles {
    fn default() -> Self {
        Self {
            base: PathBuf::from("public_payees.toml"),
            overrides: PathBuf::from("private_payees.toml"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedSettings {
    pub credentials: PathBuf,
    pub base_url: String,
    pub limit: u32,
    pub export: PathBuf,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            credentials: PathBuf::from("n26_config.toml"),
            base_url: "https://api.tech26.de".to_string(),
            limit: 50,
            export: PathBuf::from("export/ynab_import_n26.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CamtSettings {
    /// Folder scanned for statement archives.
    pub inbound: PathBuf,
    /// Consumed archives are moved here.
    pub processed: PathBuf,
    pub export: PathBuf,
}

impl Default for CamtSettings {
    fn default() -> Self {
        Self {
            inbound: PathBuf::from("import/sparkasse"),
            processed: PathBuf::from("processed/sparkasse"),
            export: PathBuf::from("export/ynab_data_sparkasse.csv"),
        }
    }
}

impl Settings {
    /// Reads `explicit` if given, else the default file if it exists, else
    /// falls back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_SETTINGS_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    tracing::debug!("no {DEFAULT_SETTINGS_FILE}, using default settings");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing settings in {}", path.display()))
    }
}

/// Login for the feed API. Only used to obtain an access token.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading feed credentials from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing feed credentials in {}", path.display()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Builds the rule store from the base file and, if usable, the override file.
pub fn load_rule_store(files: &RuleFiles) -> Result<RuleStore, RuleError> {
    let base = match fs::read_to_string(&files.base) {
        Ok(content) => RuleSet::from_toml(&content)?,
        Err(e) => {
            return Err(RuleError::ConfigurationMissing(format!(
                "{}: {e}",
                files.base.display()
            )))
        }
    };

    let overrides = match fs::read_to_string(&files.overrides) {
        Ok(content) => {
            let set = RuleSet::from_toml(&content)?;
            if set.is_empty() {
                tracing::info!(path = %files.overrides.display(), "override rule file is empty");
                None
            } else {
                Some(set)
            }
        }
        Err(e) => {
            tracing::info!(path = %files.overrides.display(), error = %e, "no override rules");
            None
        }
    };

    let store = RuleStore::build(Some(base), overrides)?;
    tracing::info!(rules = store.len(), "payee rules loaded");
    Ok(store)
}
