use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::backup::{RunOptions, begin_run};
use crate::console::Console;
use crate::disambiguate::{Resolution, resolve_title};
use crate::frontmatter::string_list;
use crate::notes::note_filename;
use crate::poster::{poster_path_for, set_poster};
use crate::provider::MetadataProvider;
use crate::title::parse_game_filename;
use crate::vault::{
    ItemOutcome, Note, RunSummary, ScanRules, WritePlan, file_stem, find_candidate_files,
    load_notes,
};
use crate::wikilinks::relink_after_rename;

#[derive(Debug, Clone, Default)]
pub struct StandardizeOptions {
    pub rules: ScanRules,
    pub run: RunOptions,
}

/// Notes whose frontmatter tag list contains `game`, ignoring case.
pub fn find_game_notes(vault_root: &Path, rules: &ScanRules) -> Result<Vec<Note>> {
    let files = find_candidate_files(vault_root, rules)?;
    Ok(load_notes(&files, |note| {
        matches!(note.document.get("tags"), Some(serde_yaml::Value::Sequence(_)))
            && string_list(note.document.get("tags"))
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case("game"))
    }))
}

/// Rename game notes to `Name (Year).md` using the release year on record,
/// carrying their posters and inbound links along.
pub fn standardize_games(
    vault_root: &Path,
    options: &StandardizeOptions,
    provider: &mut dyn MetadataProvider,
    console: &mut dyn Console,
) -> Result<RunSummary> {
    let notes = find_game_notes(vault_root, &options.rules)?;
    let mut summary = begin_run(vault_root, &options.run, console)?;
    console.say(&format!("game notes: {}", notes.len()));

    for note in &notes {
        let name = note.file_name();
        console.say("");
        console.say(&format!("processing: {name}"));
        let result = standardize_one(vault_root, note, options, provider, console);
        summary.record(console, &name, result)?;
    }

    summary.report(console);
    Ok(summary)
}

fn standardize_one(
    vault_root: &Path,
    note: &Note,
    options: &StandardizeOptions,
    provider: &mut dyn MetadataProvider,
    console: &mut dyn Console,
) -> Result<ItemOutcome> {
    let current = note.stem();
    let parsed = parse_game_filename(&current);
    if let Some(platform) = &parsed.platform {
        console.say(&format!("platform: {platform}"));
    }
    let candidates = provider.search(&parsed.title)?;
    let record = match resolve_title(candidates, &parsed.title, parsed.year.as_deref(), console)? {
        Resolution::Selected(record) => record,
        Resolution::Skipped => return Ok(ItemOutcome::Skipped("skipped by user".to_string())),
        Resolution::NoResults => bail!("No results found for '{}'", parsed.title),
    };
    let details = provider.get_details(&record)?;
    let filename = note_filename(&details)?;
    let target = note.path.with_file_name(&filename);
    let correct = file_stem(&target);
    if correct == current {
        return Ok(ItemOutcome::Unchanged(format!("{filename} (already correct)")));
    }
    if target.exists() {
        bail!("{filename} already exists");
    }

    let old_poster = poster_path_for(&note.path);
    let new_poster = poster_path_for(&target);
    let carry_poster = old_poster.exists();
    if carry_poster && new_poster.exists() {
        bail!("{} already exists", file_name(&new_poster));
    }
    let mut content = note.content.clone();
    if carry_poster && note.document.frontmatter.is_some() {
        let mut document = note.document.clone();
        set_poster(&mut document, &file_name(&new_poster));
        content = document.render();
    }
    let plan = WritePlan::update(&note.path, &note.content, content).rename_to(target.clone());

    // Poster first; it is moved back if the note write fails.
    let live = !options.run.dry_run;
    if carry_poster && live {
        fs::rename(&old_poster, &new_poster).with_context(|| {
            format!(
                "failed to rename {} to {}",
                old_poster.display(),
                new_poster.display()
            )
        })?;
    }
    if let Err(error) = plan.apply(options.run.dry_run) {
        if carry_poster
            && live
            && let Err(rollback) = fs::rename(&new_poster, &old_poster)
        {
            warn!(poster = %new_poster.display(), %rollback, "failed to restore poster name");
        }
        return Err(error);
    }
    if carry_poster {
        console.say(&format!(
            "poster: {} -> {}",
            file_name(&old_poster),
            file_name(&new_poster)
        ));
    }

    info!(old = %current, new = %correct, "standardized game note");
    let mut detail = format!("{current} -> {correct}");
    if live
        && let Some(warning) =
            relink_after_rename(vault_root, &options.rules, &current, &correct, console)
    {
        detail.push_str(&format!(" ({warning})"));
    }
    Ok(ItemOutcome::Updated(detail))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
