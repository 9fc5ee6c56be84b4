use std::path::Path;

use anyhow::Result;

use crate::backup::{RunOptions, begin_run};
use crate::console::Console;
use crate::frontmatter::{serialize_frontmatter, value_to_string};
use crate::poster::{POSTER_PROPERTY, poster_target};
use crate::vault::{
    ItemOutcome, Note, RunSummary, ScanRules, WritePlan, find_candidate_files, load_notes,
};

#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    pub rules: ScanRules,
    pub run: RunOptions,
}

/// Poster filename to embed, when the note has a poster and its body does
/// not already open with an embed.
pub fn embed_target(note: &Note) -> Option<String> {
    if !note.category.is_some_and(|category| category.embeds_poster()) {
        return None;
    }
    let value = value_to_string(note.document.get(POSTER_PROPERTY)?);
    let target = poster_target(&value);
    if target.is_empty() || note.document.body.trim_start_matches('\n').starts_with("![[") {
        return None;
    }
    Some(target.to_string())
}

/// Note content with `![[poster]]` placed right after the frontmatter.
pub fn with_poster_embed(note: &Note, target: &str) -> Option<String> {
    let mapping = note.document.frontmatter.as_ref()?;
    let body = note.document.body.trim_start_matches('\n');
    Some(serialize_frontmatter(
        mapping,
        &format!("\n\n![[{target}]]\n\n{body}"),
    ))
}

pub fn find_notes_needing_embed(vault_root: &Path, rules: &ScanRules) -> Result<Vec<Note>> {
    let files = find_candidate_files(vault_root, rules)?;
    Ok(load_notes(&files, |note| embed_target(note).is_some()))
}

pub fn embed_posters(
    vault_root: &Path,
    options: &EmbedOptions,
    console: &mut dyn Console,
) -> Result<RunSummary> {
    let notes = find_notes_needing_embed(vault_root, &options.rules)?;
    let mut summary = begin_run(vault_root, &options.run, console)?;
    console.say(&format!("notes needing embeds: {}", notes.len()));

    for note in &notes {
        let name = note.file_name();
        let result = embed_one(note, options);
        summary.record(console, &name, result)?;
    }

    summary.report(console);
    Ok(summary)
}

fn embed_one(note: &Note, options: &EmbedOptions) -> Result<ItemOutcome> {
    let name = note.file_name();
    let Some(target) = embed_target(note) else {
        return Ok(ItemOutcome::Unchanged(name));
    };
    let Some(content) = with_poster_embed(note, &target) else {
        return Ok(ItemOutcome::Unchanged(name));
    };
    WritePlan::update(&note.path, &note.content, content).apply(options.run.dry_run)?;
    Ok(ItemOutcome::Updated(format!("{name} (![[{target}]])")))
}
