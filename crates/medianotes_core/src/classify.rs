use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::frontmatter::{Document, value_to_string};
use crate::media::Category;
use crate::vault::{ScanRules, find_candidate_files};

/// Determine a note's media category.
///
/// A list-valued `tags` entry naming a category wins; otherwise the raw
/// content is searched for the category hashtag. Categories are checked in
/// `Category::ALL` order.
pub fn classify_category(document: &Document, content: &str) -> Option<Category> {
    if let Some(serde_yaml::Value::Sequence(tags)) = document.get("tags") {
        let tags = tags
            .iter()
            .map(|tag| value_to_string(tag).to_lowercase())
            .collect::<Vec<_>>();
        for category in Category::ALL {
            if tags
                .iter()
                .any(|tag| Category::from_tag(tag) == Some(category))
            {
                return Some(category);
            }
        }
    }

    let lowered = content.to_lowercase();
    Category::ALL
        .into_iter()
        .find(|category| lowered.contains(&category.hashtag()))
}

/// True when the frontmatter has `key` with a non-blank value.
pub fn has_property(document: &Document, key: &str) -> bool {
    document
        .get(key)
        .is_some_and(|value| !value_to_string(value).trim().is_empty())
}

/// Read and classify a note on disk.
pub fn classify_file(path: &Path) -> Result<Option<Category>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let document = Document::parse(&content);
    Ok(classify_category(&document, &content))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Media(Category),
    Unclassified,
    Unreadable,
}

impl Classification {
    pub fn label(self) -> &'static str {
        match self {
            Self::Media(category) => category.as_str(),
            Self::Unclassified => "-",
            Self::Unreadable => "?",
        }
    }
}

/// Classify every note in the vault. A note that cannot be read is logged
/// and reported as `Unreadable`; the walk carries on.
pub fn classify_vault(
    vault_root: &Path,
    rules: &ScanRules,
) -> Result<Vec<(PathBuf, Classification)>> {
    let files = find_candidate_files(vault_root, rules)?;
    let mut classified = Vec::with_capacity(files.len());
    for path in files {
        let classification = match classify_file(&path) {
            Ok(Some(category)) => Classification::Media(category),
            Ok(None) => Classification::Unclassified,
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %format!("{error:#}"),
                    "skipping unreadable note"
                );
                Classification::Unreadable
            }
        };
        classified.push((path, classification));
    }
    Ok(classified)
}
