use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::genres::GenreMap;
use crate::vault::ScanRules;

pub const DEFAULT_USER_AGENT: &str = "medianotes/0.2";
pub const DEFAULT_POSTER_WIDTH: u32 = 200;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MediaNotesConfig {
    #[serde(default)]
    pub vault: VaultSection,
    #[serde(default)]
    pub posters: PosterSection,
    #[serde(default)]
    pub http: HttpSection,
    /// Vault tag to the provider genre names it replaces.
    #[serde(default)]
    pub genres: BTreeMap<String, Vec<String>>,
    /// Player tag to the people it stands for.
    #[serde(default)]
    pub players: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct VaultSection {
    pub excluded_dir: Option<String>,
    pub backup_marker: Option<String>,
    pub note_extension: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PosterSection {
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
}

impl MediaNotesConfig {
    pub fn scan_rules(&self) -> ScanRules {
        let defaults = ScanRules::default();
        ScanRules {
            extension: self
                .vault
                .note_extension
                .as_deref()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .unwrap_or(defaults.extension),
            excluded_dir: self
                .vault
                .excluded_dir
                .clone()
                .unwrap_or(defaults.excluded_dir),
            backup_marker: self
                .vault
                .backup_marker
                .clone()
                .unwrap_or(defaults.backup_marker),
        }
    }

    pub fn poster_width(&self) -> u32 {
        self.posters.width.unwrap_or(DEFAULT_POSTER_WIDTH)
    }

    /// Resolve user agent: env MEDIANOTES_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Ok(value) = env::var("MEDIANOTES_USER_AGENT") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.http
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn genre_map(&self) -> GenreMap {
        GenreMap::new(&self.genres)
    }
}

/// Load and parse the config from a TOML file. Returns default if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<MediaNotesConfig> {
    if !config_path.exists() {
        return Ok(MediaNotesConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: MediaNotesConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_default_config() -> String {
    format!(
        "# medianotes configuration (materialized by `medianotes init`)\n\n[vault]\nexcluded_dir = \"Templates\"\nbackup_marker = \".backup.\"\nnote_extension = \"md\"\n\n[posters]\nwidth = {DEFAULT_POSTER_WIDTH}\n\n[http]\n# user_agent = \"{DEFAULT_USER_AGENT}\"\ntimeout_ms = 30000\nmax_retries = 2\nretry_delay_ms = 500\n\n# Provider genre names folded into one vault tag.\n[genres]\nrpg = [\"Role-playing (RPG)\", \"RPG\"]\nsci-fi = [\"Science Fiction\", \"Sci-Fi & Fantasy\"]\n\n# Player tags converted by `medianotes migrate-games`.\n[players]\n# jordan = [\"Jordan Godfrey\"]\n"
    )
}
