use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::render_default_config;

pub const STATE_DIR_NAME: &str = ".medianotes";
pub const CONFIG_FILENAME: &str = "config.toml";
pub const VAULT_ENV: &str = "MEDIANOTES_VAULT";
pub const CONFIG_ENV: &str = "MEDIANOTES_CONFIG";

/// Directories whose presence marks a vault root.
const VAULT_MARKERS: &[&str] = &[STATE_DIR_NAME, ".obsidian"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub vault: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub vault_root: PathBuf,
    pub state_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub config_path: PathBuf,
    pub vault_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "vault_root={} ({})\nstate_dir={}\nbackups_dir={}\nconfig_path={} ({})",
            normalize_for_display(&self.vault_root),
            self.vault_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.backups_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (vault_root, vault_source) = resolve_vault_root(context, overrides, &lookup_env);
    let state_dir = vault_root.join(STATE_DIR_NAME);

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env(CONFIG_ENV)) {
        (
            absolutize(Path::new(value.trim()), &vault_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join(CONFIG_FILENAME), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        backups_dir: state_dir.join("backups"),
        vault_root,
        state_dir,
        config_path,
        vault_source,
        config_source,
    })
}

fn resolve_vault_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.vault.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }
    if let Some(value) = non_empty(lookup_env(VAULT_ENV)) {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }
    match detect_vault_root(&context.cwd) {
        Some(root) => (root, ValueSource::Heuristic),
        None => (context.cwd.clone(), ValueSource::Default),
    }
}

fn detect_vault_root(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|candidate| {
            VAULT_MARKERS
                .iter()
                .any(|marker| candidate.join(marker).is_dir())
        })
        .map(Path::to_path_buf)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Fail before any file is touched when the vault root is not a directory.
pub fn ensure_vault_exists(paths: &ResolvedPaths) -> Result<()> {
    if !paths.vault_root.is_dir() {
        bail!(
            "vault path does not exist: {}\nPass --vault <dir> or set {VAULT_ENV}",
            normalize_for_display(&paths.vault_root)
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub vault_exists: bool,
    pub state_dir_exists: bool,
    pub config_exists: bool,
    pub backup_count: usize,
    pub warnings: Vec<String>,
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> Result<RuntimeStatus> {
    let vault_exists = paths.vault_root.is_dir();
    let state_dir_exists = paths.state_dir.is_dir();
    let config_exists = paths.config_path.exists();
    let backup_count = if paths.backups_dir.is_dir() {
        fs::read_dir(&paths.backups_dir)
            .with_context(|| format!("failed to list {}", paths.backups_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("zip"))
            .count()
    } else {
        0
    };

    let mut warnings = Vec::new();
    if !vault_exists {
        warnings.push("vault root is missing; pass --vault or set MEDIANOTES_VAULT".to_string());
    }
    if !config_exists {
        warnings.push(format!(
            "{} is missing; built-in defaults apply (run `medianotes init` to write one)",
            normalize_for_display(&paths.config_path)
        ));
    }

    Ok(RuntimeStatus {
        vault_exists,
        state_dir_exists,
        config_exists,
        backup_count,
        warnings,
    })
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn init_layout(paths: &ResolvedPaths, options: &InitOptions) -> Result<InitReport> {
    ensure_vault_exists(paths)?;
    let mut created_dirs = Vec::new();
    for dir in [&paths.state_dir, &paths.backups_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }
    let wrote_config = write_text_file(&paths.config_path, &render_default_config(), options.force)?;
    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::{
        InitOptions, PathOverrides, ResolutionContext, ValueSource, ensure_vault_exists,
        init_layout, inspect_runtime, resolve_paths_with_lookup,
    };
    use crate::config::load_config;

    #[test]
    fn resolve_paths_prefers_flag_over_env() {
        let temp = tempdir().expect("tempdir");
        let cwd = temp.path().join("cwd");
        let from_flag = temp.path().join("flag-vault");
        fs::create_dir_all(&cwd).expect("create cwd");

        let overrides = PathOverrides {
            vault: Some(from_flag.clone()),
            ..PathOverrides::default()
        };
        let context = ResolutionContext { cwd: cwd.clone() };
        let env = HashMap::from([(
            "MEDIANOTES_VAULT".to_string(),
            temp.path().join("env-vault").to_string_lossy().to_string(),
        )]);

        let resolved = resolve_paths_with_lookup(&context, &overrides, |key| env.get(key).cloned())
            .expect("resolve paths");
        assert_eq!(resolved.vault_root, from_flag);
        assert_eq!(resolved.vault_source, ValueSource::Flag);
        assert_eq!(resolved.config_path, from_flag.join(".medianotes/config.toml"));
    }

    #[test]
    fn resolve_paths_uses_env_then_heuristic() {
        let temp = tempdir().expect("tempdir");
        let vault = temp.path().join("vault");
        let nested = vault.join("Movies/Drafts");
        fs::create_dir_all(vault.join(".obsidian")).expect("marker");
        fs::create_dir_all(&nested).expect("nested");

        let context = ResolutionContext { cwd: nested.clone() };
        let env = HashMap::from([(
            "MEDIANOTES_VAULT".to_string(),
            "relative-vault".to_string(),
        )]);
        let from_env = resolve_paths_with_lookup(&context, &PathOverrides::default(), |key| {
            env.get(key).cloned()
        })
        .expect("resolve");
        assert_eq!(from_env.vault_root, nested.join("relative-vault"));
        assert_eq!(from_env.vault_source, ValueSource::Env);

        let detected = resolve_paths_with_lookup(&context, &PathOverrides::default(), |_| None)
            .expect("resolve");
        assert_eq!(detected.vault_root, vault);
        assert_eq!(detected.vault_source, ValueSource::Heuristic);
    }

    #[test]
    fn config_flag_overrides_env() {
        let temp = tempdir().expect("tempdir");
        let context = ResolutionContext {
            cwd: temp.path().to_path_buf(),
        };
        let overrides = PathOverrides {
            vault: Some(temp.path().to_path_buf()),
            config: Some("custom.toml".into()),
        };
        let env = HashMap::from([("MEDIANOTES_CONFIG".to_string(), "env.toml".to_string())]);
        let resolved = resolve_paths_with_lookup(&context, &overrides, |key| env.get(key).cloned())
            .expect("resolve");
        assert_eq!(resolved.config_path, temp.path().join("custom.toml"));
        assert_eq!(resolved.config_source, ValueSource::Flag);
        assert!(resolved.diagnostics().contains("(flag)"));
    }

    #[test]
    fn init_layout_writes_state_and_loadable_config() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("vault");
        fs::create_dir_all(&root).expect("create root");
        let context = ResolutionContext { cwd: root.clone() };
        let overrides = PathOverrides {
            vault: Some(root.clone()),
            ..PathOverrides::default()
        };
        let paths = resolve_paths_with_lookup(&context, &overrides, |_| None).expect("resolve");

        let report = init_layout(&paths, &InitOptions::default()).expect("init");
        assert_eq!(report.created_dirs.len(), 2);
        assert!(report.wrote_config);
        assert!(paths.backups_dir.is_dir());
        load_config(&paths.config_path).expect("materialized config parses");

        let again = init_layout(&paths, &InitOptions::default()).expect("init again");
        assert!(again.created_dirs.is_empty());
        assert!(!again.wrote_config);

        let status = inspect_runtime(&paths).expect("inspect");
        assert!(status.config_exists);
        assert!(status.warnings.is_empty());
    }

    #[test]
    fn missing_vault_is_reported() {
        let temp = tempdir().expect("tempdir");
        let context = ResolutionContext {
            cwd: temp.path().to_path_buf(),
        };
        let overrides = PathOverrides {
            vault: Some(temp.path().join("missing")),
            ..PathOverrides::default()
        };
        let paths = resolve_paths_with_lookup(&context, &overrides, |_| None).expect("resolve");
        let error = ensure_vault_exists(&paths).expect_err("must fail");
        assert!(error.to_string().contains("vault path does not exist"));
        let status = inspect_runtime(&paths).expect("inspect");
        assert!(!status.vault_exists);
        assert_eq!(status.warnings.len(), 2);
    }
}
