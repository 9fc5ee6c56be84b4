use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::backup::{RunOptions, begin_run};
use crate::console::{Console, confirm};
use crate::disambiguate::{Resolution, resolve_title};
use crate::frontmatter::Document;
use crate::genres::GenreMap;
use crate::media::{Category, MediaDetails};
use crate::notes::{format_note_content, note_filename};
use crate::poster::{PosterFetcher, poster_filename, poster_path_for, save_poster, set_poster};
use crate::provider::MetadataProvider;
use crate::title::extract_title_and_year;
use crate::vault::{ItemOutcome, RunSummary, WritePlan, file_stem};

#[derive(Debug, Clone)]
pub struct AddOptions {
    pub category: Category,
    pub genres: GenreMap,
    /// Poster width in pixels. `None` skips poster downloads.
    pub poster_width: Option<u32>,
    pub run: RunOptions,
}

/// Titles from `reader`, one per line: trimmed, blanks dropped, first
/// occurrence kept.
pub fn read_titles<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut titles = Vec::new();
    for line in reader.lines() {
        let line = line.context("failed to read titles")?;
        let title = line.trim();
        if title.is_empty() || !seen.insert(title.to_string()) {
            continue;
        }
        titles.push(title.to_string());
    }
    Ok(titles)
}

/// Create one note per title in `vault_root`.
pub fn add_titles(
    vault_root: &Path,
    titles: &[String],
    options: &AddOptions,
    provider: &mut dyn MetadataProvider,
    posters: &mut dyn PosterFetcher,
    console: &mut dyn Console,
) -> Result<RunSummary> {
    let mut summary = begin_run(vault_root, &options.run, console)?;
    console.say(&format!(
        "titles: {} ({})",
        titles.len(),
        options.category
    ));

    for title in titles {
        console.say("");
        console.say(&format!("processing: {title}"));
        let result = add_one(vault_root, title, options, provider, posters, console);
        summary.record(console, title, result)?;
    }

    summary.report(console);
    Ok(summary)
}

fn add_one(
    vault_root: &Path,
    input: &str,
    options: &AddOptions,
    provider: &mut dyn MetadataProvider,
    posters: &mut dyn PosterFetcher,
    console: &mut dyn Console,
) -> Result<ItemOutcome> {
    let (title, year) = extract_title_and_year(input);
    let candidates = provider.search(&title)?;
    let record = match resolve_title(candidates, &title, year.as_deref(), console)? {
        Resolution::Selected(record) => record,
        Resolution::Skipped => return Ok(ItemOutcome::Skipped("skipped by user".to_string())),
        Resolution::NoResults => bail!("No results found for '{title}'"),
    };

    let details = provider.get_details(&record)?;
    let filename = note_filename(&details)?;
    let path = vault_root.join(&filename);
    if path.exists() {
        console.say(&format!("File already exists: {filename}"));
        if !confirm(console, "Overwrite? (y/n): ")? {
            return Ok(ItemOutcome::Skipped("kept existing file".to_string()));
        }
    }

    let mut content = format_note_content(&details, &options.genres);
    let mut poster = None;
    if let Some(width) = options.poster_width {
        match fetch_poster(posters, &details, width) {
            Ok(Some(bytes)) => {
                let stem = file_stem(&path);
                let mut document = Document::parse(&content);
                set_poster(&mut document, &poster_filename(&stem));
                content = document.render();
                poster = Some(bytes);
            }
            Ok(None) => console.say("no poster available"),
            Err(error) => {
                warn!(title = %title, error = %format!("{error:#}"), "poster download failed");
                console.say(&format!("poster download failed: {error:#}"));
            }
        }
    }

    WritePlan::create(&path, content).apply(options.run.dry_run)?;
    if let Some(bytes) = poster
        && !options.run.dry_run
    {
        save_poster(&poster_path_for(&path), &bytes)?;
    }
    info!(path = %path.display(), "created note");
    Ok(ItemOutcome::Created(filename))
}

fn fetch_poster(
    fetcher: &mut dyn PosterFetcher,
    details: &MediaDetails,
    width: u32,
) -> Result<Option<Vec<u8>>> {
    match details.poster_url() {
        Some(url) => fetcher.fetch_and_resize(url, width).map(Some),
        None => Ok(None),
    }
}
