use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::backup::{RunOptions, begin_run};
use crate::console::{Console, confirm};
use crate::disambiguate::{Resolution, resolve_title};
use crate::media::Category;
use crate::notes::{appended_sections, note_filename};
use crate::provider::MetadataProvider;
use crate::title::is_year_qualified;
use crate::vault::{
    Applied, ItemOutcome, Note, RunSummary, ScanRules, WritePlan, find_candidate_files, load_notes,
};
use crate::wikilinks::relink_after_rename;

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub rules: ScanRules,
    pub run: RunOptions,
}

/// Movie and series notes still named by bare title.
pub fn find_update_candidates(vault_root: &Path, rules: &ScanRules) -> Result<Vec<Note>> {
    let files = find_candidate_files(vault_root, rules)?;
    Ok(load_notes(&files, |note| {
        matches!(note.category, Some(Category::Movie | Category::Tv))
            && !is_year_qualified(&note.stem())
    }))
}

/// Enrich and rename every bare-titled movie and series note.
pub fn update_notes(
    vault_root: &Path,
    options: &UpdateOptions,
    provider: &mut dyn MetadataProvider,
    console: &mut dyn Console,
) -> Result<RunSummary> {
    let notes = find_update_candidates(vault_root, &options.rules)?;
    let mut summary = begin_run(vault_root, &options.run, console)?;
    console.say(&format!("notes to update: {}", notes.len()));

    for note in &notes {
        let stem = note.stem();
        console.say("");
        console.say(&format!("processing: {stem}"));
        let result = update_one(vault_root, note, options, provider, console);
        summary.record(console, &stem, result)?;
    }

    summary.report(console);
    Ok(summary)
}

fn update_one(
    vault_root: &Path,
    note: &Note,
    options: &UpdateOptions,
    provider: &mut dyn MetadataProvider,
    console: &mut dyn Console,
) -> Result<ItemOutcome> {
    let title = note.stem();
    let candidates = provider.search(&title)?;
    let record = match resolve_title(candidates, &title, None, console)? {
        Resolution::Selected(record) => record,
        Resolution::Skipped => return Ok(ItemOutcome::Skipped("skipped by user".to_string())),
        Resolution::NoResults => bail!("No results found for '{title}'"),
    };

    let details = provider.get_details(&record)?;
    let filename = note_filename(&details)
        .with_context(|| format!("Could not determine release year for '{title}'"))?;
    let directory = note.path.parent().unwrap_or(vault_root);
    let target = directory.join(&filename);
    if target != note.path && target.exists() {
        console.say(&format!("File already exists: {filename}"));
        if !confirm(console, "Overwrite? (y/n): ")? {
            return Ok(ItemOutcome::Skipped("kept existing file".to_string()));
        }
    }

    let content = format!("{}{}", note.content, appended_sections(&details));
    let plan = WritePlan::update(&note.path, &note.content, content).rename_to(target);
    let applied = plan.apply(options.run.dry_run)?;

    if let Applied::Renamed { old_stem, new_stem } = &applied {
        info!(old = %old_stem, new = %new_stem, "renamed note");
        let mut detail = format!("{old_stem} -> {new_stem}");
        if !options.run.dry_run
            && let Some(warning) =
                relink_after_rename(vault_root, &options.rules, old_stem, new_stem, console)
        {
            detail.push_str(&format!(" ({warning})"));
        }
        return Ok(ItemOutcome::Updated(detail));
    }
    Ok(ItemOutcome::Updated(filename))
}
