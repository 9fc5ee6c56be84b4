use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::console::{Console, choose_number};
use crate::disambiguate::rule;
use crate::title::is_year_qualified;
use crate::vault::{ScanRules, find_candidate_files};

static WIKILINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").expect("wikilink pattern is valid")
});
static YEAR_STEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+\((\d{4})\)$").expect("stem pattern is valid"));

/// One `[[Target]]` or `[[Target|Alias]]` found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikilinkOccurrence<'a> {
    pub full: &'a str,
    pub target: &'a str,
    pub alias: Option<&'a str>,
    pub span: Range<usize>,
}

impl WikilinkOccurrence<'_> {
    fn render_with_target(&self, target: &str) -> String {
        match self.alias {
            Some(alias) => format!("[[{target}|{alias}]]"),
            None => format!("[[{target}]]"),
        }
    }
}

/// Scan `text` for wikilinks. Each call starts a fresh scan.
pub fn find_wikilinks(text: &str) -> impl Iterator<Item = WikilinkOccurrence<'_>> {
    WIKILINK_RE.captures_iter(text).filter_map(|captures| {
        let full = captures.get(0)?;
        let target = captures.get(1)?;
        Some(WikilinkOccurrence {
            full: full.as_str(),
            target: target.as_str(),
            alias: captures.get(2).map(|alias| alias.as_str()),
            span: full.range(),
        })
    })
}

/// Bare title to the year-qualified stems that carry it, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameIndex {
    titles: BTreeMap<String, Vec<String>>,
}

impl RenameIndex {
    pub fn candidates(&self, title: &str) -> Option<&[String]> {
        self.titles.get(title).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Group `Title (YYYY)` stems by title. Stems without a year suffix are
/// ignored.
pub fn build_rename_index<I, S>(stems: I) -> RenameIndex
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut titles: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for stem in stems {
        let stem = stem.as_ref();
        if let Some(captures) = YEAR_STEM_RE.captures(stem) {
            titles
                .entry(captures[1].to_string())
                .or_default()
                .push(stem.to_string());
        }
    }
    for stems in titles.values_mut() {
        stems.sort_by(|left, right| right.cmp(left));
        stems.dedup();
    }
    RenameIndex { titles }
}

/// How ambiguous link targets are handled.
pub enum LinkMode<'a> {
    Interactive(&'a mut dyn Console),
    /// Ambiguous targets are left untouched.
    NonInteractive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub text: String,
    pub changed: usize,
    pub ambiguous: usize,
}

/// Rewrite bare link targets to their year-qualified stem.
///
/// A target with one candidate is rewritten directly. A target with several
/// is asked about once per text in interactive mode (the answer applies to
/// every occurrence) and skipped otherwise. Targets already ending in
/// `(YYYY)` are never touched, so a second pass changes nothing.
pub fn rewrite_wikilinks(
    text: &str,
    index: &RenameIndex,
    mut mode: LinkMode<'_>,
) -> Result<RewriteOutcome> {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut changed = 0;
    let mut ambiguous = 0;
    let mut choices: HashMap<String, Option<String>> = HashMap::new();

    for occurrence in find_wikilinks(text) {
        if is_year_qualified(occurrence.target) {
            continue;
        }
        let Some(candidates) = index.candidates(occurrence.target) else {
            continue;
        };

        let replacement = match candidates {
            [] => None,
            [only] => Some(only.clone()),
            _ => {
                ambiguous += 1;
                match &mut mode {
                    LinkMode::NonInteractive => None,
                    LinkMode::Interactive(console) => {
                        if let Some(choice) = choices.get(occurrence.target) {
                            choice.clone()
                        } else {
                            let choice =
                                prompt_link_choice(&mut **console, occurrence.target, candidates)?;
                            choices.insert(occurrence.target.to_string(), choice.clone());
                            choice
                        }
                    }
                }
            }
        };

        if let Some(stem) = replacement {
            output.push_str(&text[cursor..occurrence.span.start]);
            output.push_str(&occurrence.render_with_target(&stem));
            cursor = occurrence.span.end;
            changed += 1;
        }
    }
    output.push_str(&text[cursor..]);

    Ok(RewriteOutcome {
        text: output,
        changed,
        ambiguous,
    })
}

fn prompt_link_choice(
    console: &mut dyn Console,
    target: &str,
    candidates: &[String],
) -> Result<Option<String>> {
    let keep = candidates.len() + 1;
    console.say("");
    console.say(&format!("Multiple files match the link target '{target}':"));
    console.say(&rule());
    for (position, candidate) in candidates.iter().enumerate() {
        console.say(&format!("{}. {candidate}", position + 1));
    }
    console.say(&format!("{keep}. Keep original (don't update this link)"));
    console.say(&rule());

    let choice = choose_number(
        console,
        "Select the correct file (or keep original): ",
        1..=keep,
    )?;
    Ok(candidates.get(choice - 1).cloned())
}

/// Rewrite one note on disk, writing only when the text changed.
pub fn rewrite_wikilinks_in_file(
    path: &Path,
    index: &RenameIndex,
    mode: LinkMode<'_>,
) -> Result<RewriteOutcome> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let outcome = rewrite_wikilinks(&content, index, mode)?;
    if outcome.text != content {
        fs::write(path, &outcome.text)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(outcome)
}

/// Point every `[[old]]` and `[[old|alias]]` in `text` at `new`.
pub fn retarget_wikilinks(text: &str, old: &str, new: &str) -> String {
    let escaped = regex::escape(old);
    let (Ok(bare), Ok(aliased)) = (
        Regex::new(&format!(r"\[\[{escaped}\]\]")),
        Regex::new(&format!(r"\[\[{escaped}\|([^\]]+)\]\]")),
    ) else {
        return text.to_string();
    };
    let step = bare.replace_all(text, |_: &Captures<'_>| format!("[[{new}]]"));
    aliased
        .replace_all(&step, |captures: &Captures<'_>| {
            format!("[[{new}|{}]]", &captures[1])
        })
        .into_owned()
}

/// Retarget links from `old_stem` to `new_stem` in every admitted file.
/// Returns how many files were rewritten. A file that cannot be read or
/// written is logged and left as it was.
pub fn update_wikilinks_across_tree(
    files: &[PathBuf],
    old_stem: &str,
    new_stem: &str,
    rules: &ScanRules,
) -> Result<usize> {
    let mut updated = 0;
    for path in files.iter().filter(|path| rules.admits(path)) {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable note");
                continue;
            }
        };
        let rewritten = retarget_wikilinks(&content, old_stem, new_stem);
        if rewritten != content {
            if let Err(error) = fs::write(path, rewritten) {
                warn!(path = %path.display(), %error, "failed to retarget wikilinks");
                continue;
            }
            debug!(path = %path.display(), old_stem, new_stem, "retargeted wikilinks");
            updated += 1;
        }
    }
    Ok(updated)
}

/// Retarget links across the vault after a note was renamed. The rename
/// stands either way; a failure comes back as a note for the item's report.
pub fn relink_after_rename(
    vault_root: &Path,
    rules: &ScanRules,
    old_stem: &str,
    new_stem: &str,
    console: &mut dyn Console,
) -> Option<String> {
    let relinked = find_candidate_files(vault_root, rules)
        .and_then(|files| update_wikilinks_across_tree(&files, old_stem, new_stem, rules));
    match relinked {
        Ok(0) => None,
        Ok(count) => {
            console.say(&format!("updated links in {count} file(s)"));
            None
        }
        Err(error) => {
            warn!(old_stem, new_stem, error = %format!("{error:#}"), "links not retargeted");
            Some(format!("links not updated: {error:#}"))
        }
    }
}
