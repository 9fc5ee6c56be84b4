use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("non-word pattern is valid"));
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_]+").expect("separator pattern is valid"));
static DASH_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-+").expect("dash pattern is valid"));

/// Lookup table from a vault tag to the provider genre strings it stands for.
///
/// Built once from configuration and passed to whatever formats tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreMap {
    by_genre: BTreeMap<String, String>,
}

impl GenreMap {
    pub fn new(mappings: &BTreeMap<String, Vec<String>>) -> Self {
        let mut by_genre = BTreeMap::new();
        for (tag, genres) in mappings {
            for genre in genres {
                by_genre
                    .entry(genre.trim().to_lowercase())
                    .or_insert_with(|| tag.clone());
            }
        }
        Self { by_genre }
    }

    pub fn is_empty(&self) -> bool {
        self.by_genre.is_empty()
    }

    /// Translate a provider genre into a vault tag. Unmapped genres become a
    /// lowercase hyphenated slug, or `unknown` when nothing is left.
    pub fn translate(&self, genre: &str) -> String {
        let lowered = genre.trim().to_lowercase();
        if let Some(tag) = self.by_genre.get(&lowered) {
            return tag.clone();
        }
        slugify(&lowered)
    }
}

fn slugify(value: &str) -> String {
    let cleaned = NON_WORD_RE.replace_all(value, "");
    let hyphenated = SEPARATOR_RE.replace_all(&cleaned, "-");
    let collapsed = DASH_RUN_RE.replace_all(&hyphenated, "-");
    let slug = collapsed.trim_matches('-');
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug.to_string()
    }
}
