use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::info;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use crate::console::Console;
use crate::runtime::STATE_DIR_NAME;
use crate::vault::RunSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub path: PathBuf,
    pub files: usize,
}

/// Settings shared by every command that can change the vault.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Archive written before the first change. `None` runs without one.
    pub backup: Option<PathBuf>,
}

impl RunOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            backup: None,
        }
    }
}

/// Open a batch. Live runs archive the vault first; a failed backup aborts
/// before any note is touched.
pub fn begin_run(
    vault_root: &Path,
    options: &RunOptions,
    console: &mut dyn Console,
) -> Result<RunSummary> {
    let mut summary = RunSummary::new(options.dry_run);
    if options.dry_run {
        console.say("mode: dry-run");
        return Ok(summary);
    }
    if let Some(destination) = &options.backup {
        let report = create_vault_backup(vault_root, destination)
            .context("backup failed; no notes were changed")?;
        console.say(&format!(
            "backup: {} ({} files)",
            report.path.display(),
            report.files
        ));
        summary.backup = Some(report.path);
    }
    Ok(summary)
}

/// `<state_dir>/backups/vault-YYYYMMDD-HHMMSS.zip`
pub fn default_backup_path(state_dir: &Path, now: DateTime<Utc>) -> PathBuf {
    state_dir
        .join("backups")
        .join(format!("vault-{}.zip", now.format("%Y%m%d-%H%M%S")))
}

/// Archive every file under `vault_root` into a deflated zip at
/// `destination`, with paths relative to the vault. The tool's own state
/// directory and the archive itself are left out.
pub fn create_vault_backup(vault_root: &Path, destination: &Path) -> Result<BackupReport> {
    if !vault_root.is_dir() {
        bail!("vault path does not exist: {}", vault_root.display());
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let destination_abs = fs::canonicalize(destination).unwrap_or_else(|_| destination.to_path_buf());
    let mut files = 0usize;
    let walker = WalkDir::new(vault_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != STATE_DIR_NAME);
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", vault_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if fs::canonicalize(path).is_ok_and(|abs| abs == destination_abs) {
            continue;
        }
        let relative = path
            .strip_prefix(vault_root)
            .with_context(|| format!("{} is outside the vault", path.display()))?;
        let name = relative.to_string_lossy().replace('\\', "/");

        writer
            .start_file(name.as_str(), options)
            .with_context(|| format!("failed to add {name} to backup"))?;
        let mut source =
            File::open(path).with_context(|| format!("failed to read {}", path.display()))?;
        io::copy(&mut source, &mut writer)
            .with_context(|| format!("failed to add {name} to backup"))?;
        files += 1;
    }

    let mut inner = writer
        .finish()
        .with_context(|| format!("failed to finish {}", destination.display()))?;
    inner
        .flush()
        .with_context(|| format!("failed to flush {}", destination.display()))?;
    info!(path = %destination.display(), files, "vault backup written");

    Ok(BackupReport {
        path: destination.to_path_buf(),
        files,
    })
}
