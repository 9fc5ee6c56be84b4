use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use similar::TextDiff;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::classify::classify_category;
use crate::console::{Console, is_input_closed};
use crate::frontmatter::Document;
use crate::media::Category;
use crate::runtime::STATE_DIR_NAME;

pub const DEFAULT_NOTE_EXTENSION: &str = "md";
pub const DEFAULT_EXCLUDED_DIR: &str = "Templates";
pub const DEFAULT_BACKUP_MARKER: &str = ".backup.";

/// Which files under the vault count as notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRules {
    pub extension: String,
    pub excluded_dir: String,
    pub backup_marker: String,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            extension: DEFAULT_NOTE_EXTENSION.to_string(),
            excluded_dir: DEFAULT_EXCLUDED_DIR.to_string(),
            backup_marker: DEFAULT_BACKUP_MARKER.to_string(),
        }
    }
}

impl ScanRules {
    pub fn admits(&self, path: &Path) -> bool {
        if path.extension().and_then(|ext| ext.to_str()) != Some(self.extension.as_str()) {
            return false;
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        if !self.backup_marker.is_empty() && file_name.contains(&self.backup_marker) {
            return false;
        }
        !path.components().any(|component| {
            let part = component.as_os_str();
            part == self.excluded_dir.as_str() || part == STATE_DIR_NAME
        })
    }
}

/// Every note under `root`, sorted by path.
pub fn find_candidate_files(root: &Path, rules: &ScanRules) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("vault path does not exist: {}", root.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if rules.admits(relative) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A note read once and parsed, ready for classification and mutation.
#[derive(Debug, Clone)]
pub struct Note {
    pub path: PathBuf,
    pub content: String,
    pub document: Document,
    pub category: Option<Category>,
}

impl Note {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let document = Document::parse(&content);
        let category = classify_category(&document, &content);
        Ok(Self {
            path: path.to_path_buf(),
            content,
            document,
            category,
        })
    }

    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Load every note in `files` that satisfies `keep`. Unreadable files are
/// logged and skipped.
pub fn load_notes<F>(files: &[PathBuf], mut keep: F) -> Vec<Note>
where
    F: FnMut(&Note) -> bool,
{
    let mut notes = Vec::new();
    for path in files {
        match Note::load(path) {
            Ok(note) => {
                if keep(&note) {
                    notes.push(note);
                }
            }
            Err(error) => warn!(path = %path.display(), error = %format!("{error:#}"), "skipping note"),
        }
    }
    notes
}

fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// The composed new state of one note: its content and, for renames, its
/// new path. Nothing touches disk until `apply`.
#[derive(Debug, Clone)]
pub struct WritePlan {
    pub source: PathBuf,
    pub target: PathBuf,
    pub content: String,
    original_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Unchanged,
    Written,
    Renamed { old_stem: String, new_stem: String },
}

impl WritePlan {
    /// Plan a rewrite of an existing note whose content was `original`.
    pub fn update(source: &Path, original: &str, content: String) -> Self {
        Self {
            source: source.to_path_buf(),
            target: source.to_path_buf(),
            content,
            original_hash: Some(compute_hash(original)),
        }
    }

    /// Plan a brand-new note.
    pub fn create(target: &Path, content: String) -> Self {
        Self {
            source: target.to_path_buf(),
            target: target.to_path_buf(),
            content,
            original_hash: None,
        }
    }

    pub fn rename_to(mut self, target: PathBuf) -> Self {
        self.target = target;
        self
    }

    pub fn is_rename(&self) -> bool {
        self.source != self.target
    }

    fn content_changed(&self) -> bool {
        match &self.original_hash {
            Some(hash) => compute_hash(&self.content) != *hash,
            None => true,
        }
    }

    pub fn outcome(&self) -> Applied {
        if self.is_rename() {
            Applied::Renamed {
                old_stem: file_stem(&self.source),
                new_stem: file_stem(&self.target),
            }
        } else if self.content_changed() {
            Applied::Written
        } else {
            Applied::Unchanged
        }
    }

    /// Unified diff of the planned change against `original`.
    pub fn diff(&self, original: &str) -> String {
        TextDiff::from_lines(original, &self.content)
            .unified_diff()
            .context_radius(2)
            .header(
                &self.source.display().to_string(),
                &self.target.display().to_string(),
            )
            .to_string()
    }

    /// Carry out the plan. A dry run reports the same outcome without
    /// touching disk. The source is re-hashed first so a note edited since
    /// it was read is never overwritten.
    pub fn apply(&self, dry_run: bool) -> Result<Applied> {
        let outcome = self.outcome();
        if dry_run || outcome == Applied::Unchanged {
            return Ok(outcome);
        }

        if let Some(expected) = &self.original_hash {
            let current = fs::read_to_string(&self.source)
                .with_context(|| format!("failed to re-read {}", self.source.display()))?;
            if compute_hash(&current) != *expected {
                bail!("{} changed on disk since it was read", self.source.display());
            }
        }

        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&self.target, &self.content)
            .with_context(|| format!("failed to write {}", self.target.display()))?;
        if self.is_rename() && self.original_hash.is_some() {
            fs::remove_file(&self.source)
                .with_context(|| format!("failed to remove {}", self.source.display()))?;
        }
        debug!(
            source = %self.source.display(),
            target = %self.target.display(),
            "applied write plan"
        );
        Ok(outcome)
    }
}

/// Terminal state of one item in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created(String),
    Updated(String),
    Unchanged(String),
    Skipped(String),
}

/// Running tally for a batch. Items report as they finish; a failed item is
/// recorded and the batch moves on.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<(String, String)>,
    pub backup: Option<PathBuf>,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Record one item's result. End of input is handed back so the whole
    /// run stops; every other error becomes a failure entry.
    pub fn record(
        &mut self,
        console: &mut dyn Console,
        item: &str,
        result: Result<ItemOutcome>,
    ) -> Result<()> {
        let verb = if self.dry_run { "would " } else { "" };
        match result {
            Ok(ItemOutcome::Created(detail)) => {
                self.created += 1;
                console.say(&format!("{verb}create: {detail}"));
            }
            Ok(ItemOutcome::Updated(detail)) => {
                self.updated += 1;
                console.say(&format!("{verb}update: {detail}"));
            }
            Ok(ItemOutcome::Unchanged(detail)) => {
                self.unchanged += 1;
                console.say(&format!("unchanged: {detail}"));
            }
            Ok(ItemOutcome::Skipped(reason)) => {
                self.skipped += 1;
                console.say(&format!("skipped: {item} ({reason})"));
            }
            Err(error) if is_input_closed(&error) => return Err(error),
            Err(error) => {
                self.failed += 1;
                let reason = format!("{error:#}");
                console.say(&format!("failed: {item}: {reason}"));
                self.failures.push((item.to_string(), reason));
            }
        }
        Ok(())
    }

    pub fn report(&self, console: &mut dyn Console) {
        console.say("");
        console.say("summary:");
        console.say(&format!("created: {}", self.created));
        console.say(&format!("updated: {}", self.updated));
        console.say(&format!("unchanged: {}", self.unchanged));
        console.say(&format!("skipped: {}", self.skipped));
        console.say(&format!("failed: {}", self.failed));
        match &self.backup {
            Some(path) => console.say(&format!("backup: {}", path.display())),
            None if self.dry_run => console.say("backup: <dry-run>"),
            None => console.say("backup: <none>"),
        }
    }
}
