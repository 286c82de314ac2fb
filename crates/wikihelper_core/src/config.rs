use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV_VAR: &str = "WIKIHELPER_CONFIG";
pub const INTERWIKI_ENV_VAR: &str = "WIKIHELPER_INTERWIKI";
pub const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".wikihelper/config.toml";

pub const DEFAULT_TABLE_SIZE: usize = 170;
pub const DEFAULT_MARKER: &str = "publication_date";
pub const DEFAULT_MARKER_WINDOW: usize = 1000;
pub const DEFAULT_INTERWIKI: &str = "wikipedia";
pub const DEFAULT_IMPORT_SUFFIX: &str = "-FOR-IMPORT.xml";
pub const DEFAULT_PRIMARY_ACCOUNT: &str = "lovely_pig328";
pub const DEFAULT_ANCHOR_EVERY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfigPath {
    pub path: PathBuf,
    pub source: ValueSource,
}

impl ResolvedConfigPath {
    pub fn diagnostics(&self) -> String {
        format!(
            "config_path={} ({})\nconfig_exists={}",
            self.path.to_string_lossy().replace('\\', "/"),
            self.source.as_str(),
            self.path.exists()
        )
    }
}

/// Pick the config file: `--config` flag > `WIKIHELPER_CONFIG` > `<cwd>/.wikihelper/config.toml`.
pub fn resolve_config_path(
    flag: Option<&Path>,
    env_value: Option<String>,
    cwd: &Path,
) -> ResolvedConfigPath {
    if let Some(path) = flag {
        return ResolvedConfigPath {
            path: absolutize(path, cwd),
            source: ValueSource::Flag,
        };
    }
    if let Some(value) = env_value {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return ResolvedConfigPath {
                path: absolutize(Path::new(trimmed), cwd),
                source: ValueSource::Env,
            };
        }
    }
    ResolvedConfigPath {
        path: cwd.join(DEFAULT_CONFIG_RELATIVE_PATH),
        source: ValueSource::Default,
    }
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HelperConfig {
    #[serde(default)]
    pub chapters: ChaptersSection,
    #[serde(default)]
    pub import: ImportSection,
    #[serde(default)]
    pub twitter: TwitterSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ChaptersSection {
    pub table_size: Option<usize>,
    pub marker: Option<String>,
    pub marker_window: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ImportSection {
    pub interwiki: Option<String>,
    pub output_suffix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TwitterSection {
    pub primary: Option<String>,
    pub secondary: Option<Vec<SecondaryAccount>>,
    pub anchor_every: Option<usize>,
}

/// An account searched below the primary one, optionally only from a start date on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SecondaryAccount {
    pub handle: String,
    pub since: Option<NaiveDate>,
}

pub fn default_secondary_accounts() -> Vec<SecondaryAccount> {
    vec![
        SecondaryAccount {
            handle: "boku__yaba".to_string(),
            since: None,
        },
        SecondaryAccount {
            handle: "bokuyaba_anime".to_string(),
            since: NaiveDate::from_ymd_opt(2022, 7, 10),
        },
    ]
}

impl HelperConfig {
    pub fn table_size(&self) -> usize {
        self.chapters.table_size.unwrap_or(DEFAULT_TABLE_SIZE)
    }

    pub fn marker(&self) -> &str {
        self.chapters.marker.as_deref().unwrap_or(DEFAULT_MARKER)
    }

    pub fn marker_window(&self) -> usize {
        self.chapters.marker_window.unwrap_or(DEFAULT_MARKER_WINDOW)
    }

    /// Resolve the interwiki prefix: env WIKIHELPER_INTERWIKI > config > DEFAULT_INTERWIKI.
    pub fn interwiki(&self) -> String {
        if let Ok(value) = env::var(INTERWIKI_ENV_VAR) {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.import
            .interwiki
            .clone()
            .unwrap_or_else(|| DEFAULT_INTERWIKI.to_string())
    }

    pub fn import_suffix(&self) -> &str {
        self.import
            .output_suffix
            .as_deref()
            .unwrap_or(DEFAULT_IMPORT_SUFFIX)
    }

    pub fn primary_account(&self) -> &str {
        self.twitter
            .primary
            .as_deref()
            .unwrap_or(DEFAULT_PRIMARY_ACCOUNT)
    }

    pub fn secondary_accounts(&self) -> Vec<SecondaryAccount> {
        self.twitter
            .secondary
            .clone()
            .unwrap_or_else(default_secondary_accounts)
    }

    pub fn anchor_every(&self) -> usize {
        self.twitter.anchor_every.unwrap_or(DEFAULT_ANCHOR_EVERY)
    }

    fn validate(&self, config_path: &Path) -> Result<()> {
        if self.table_size() == 0 {
            bail!("chapters.table_size must be positive in {}", config_path.display());
        }
        if self.marker().trim().is_empty() {
            bail!("chapters.marker cannot be empty in {}", config_path.display());
        }
        if self.anchor_every() == 0 {
            bail!("twitter.anchor_every must be positive in {}", config_path.display());
        }
        if self.primary_account().trim().is_empty() {
            bail!("twitter.primary cannot be empty in {}", config_path.display());
        }
        if let Some(secondary) = &self.twitter.secondary
            && secondary.iter().any(|account| account.handle.trim().is_empty())
        {
            bail!(
                "twitter.secondary handles cannot be empty in {}",
                config_path.display()
            );
        }
        Ok(())
    }
}

/// Load and parse a HelperConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<HelperConfig> {
    if !config_path.exists() {
        return Ok(HelperConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: HelperConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    parsed.validate(config_path)?;
    Ok(parsed)
}
