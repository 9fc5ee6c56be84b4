use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::backup::{RunOptions, begin_run};
use crate::classify::has_property;
use crate::console::Console;
use crate::disambiguate::{Resolution, resolve_title};
use crate::media::Category;
use crate::poster::{
    POSTER_PROPERTY, PosterFetcher, poster_filename, poster_path_for, save_poster, set_poster,
};
use crate::provider::ProviderSource;
use crate::title::extract_title_and_year;
use crate::vault::{
    ItemOutcome, Note, RunSummary, ScanRules, WritePlan, find_candidate_files, load_notes,
};

#[derive(Debug, Clone)]
pub struct PosterOptions {
    /// Only notes of this category. `None` covers every category.
    pub category: Option<Category>,
    pub width: u32,
    pub rules: ScanRules,
    pub run: RunOptions,
}

/// Media notes without a usable `poster` property.
pub fn find_notes_missing_posters(
    vault_root: &Path,
    rules: &ScanRules,
    category: Option<Category>,
) -> Result<Vec<Note>> {
    let files = find_candidate_files(vault_root, rules)?;
    Ok(load_notes(&files, |note| {
        let wanted = match (note.category, category) {
            (Some(found), Some(filter)) => found == filter,
            (Some(_), None) => true,
            (None, _) => false,
        };
        wanted && !has_property(&note.document, POSTER_PROPERTY)
    }))
}

/// Search title for a note stem. Album notes are named `Artist - Title`, so
/// only the part after the first ` - ` is searched.
fn search_title(stem: &str, category: Category) -> (String, Option<String>) {
    let (title, year) = extract_title_and_year(stem);
    if category == Category::Album
        && let Some((_, album)) = title.split_once(" - ")
    {
        return (album.trim().to_string(), year);
    }
    (title, year)
}

pub fn download_posters(
    vault_root: &Path,
    options: &PosterOptions,
    source: &mut dyn ProviderSource,
    fetcher: &mut dyn PosterFetcher,
    console: &mut dyn Console,
) -> Result<RunSummary> {
    let notes = find_notes_missing_posters(vault_root, &options.rules, options.category)?;
    let mut categories = notes
        .iter()
        .filter_map(|note| note.category)
        .collect::<Vec<_>>();
    categories.sort_by_key(|category| category.as_str());
    categories.dedup();
    source.prepare(&categories)?;

    let mut summary = begin_run(vault_root, &options.run, console)?;
    console.say(&format!("notes missing posters: {}", notes.len()));

    for note in &notes {
        let name = note.file_name();
        console.say("");
        console.say(&format!("processing: {name}"));
        let result = poster_for_note(note, options, source, fetcher, console);
        summary.record(console, &name, result)?;
    }

    summary.report(console);
    Ok(summary)
}

fn poster_for_note(
    note: &Note,
    options: &PosterOptions,
    source: &mut dyn ProviderSource,
    fetcher: &mut dyn PosterFetcher,
    console: &mut dyn Console,
) -> Result<ItemOutcome> {
    let Some(category) = note.category else {
        bail!("note has no media category");
    };
    let stem = note.stem();
    let (title, year) = search_title(&stem, category);
    let provider = source.provider(category)?;
    let candidates = provider.search(&title)?;
    let record = match resolve_title(candidates, &title, year.as_deref(), console)? {
        Resolution::Selected(record) => record,
        Resolution::Skipped => return Ok(ItemOutcome::Skipped("skipped by user".to_string())),
        Resolution::NoResults => bail!("No results found for '{title}'"),
    };

    let url = match record.poster_url.clone() {
        Some(url) => url,
        None => match provider.get_details(&record)?.poster_url() {
            Some(url) => url.to_string(),
            None => bail!("No poster available for '{title}'"),
        },
    };

    let jpeg = fetcher.fetch_and_resize(&url, options.width)?;
    let filename = poster_filename(&stem);
    let mut document = note.document.clone();
    set_poster(&mut document, &filename);
    let plan = WritePlan::update(&note.path, &note.content, document.render());
    if options.run.dry_run {
        plan.apply(true)?;
    } else {
        let poster_path = poster_path_for(&note.path);
        let existed = poster_path.exists();
        save_poster(&poster_path, &jpeg)?;
        if let Err(error) = plan.apply(false) {
            if !existed && let Err(cleanup) = fs::remove_file(&poster_path) {
                warn!(poster = %poster_path.display(), %cleanup, "failed to remove poster");
            }
            return Err(error);
        }
    }
    info!(note = %note.path.display(), poster = %filename, "poster attached");
    Ok(ItemOutcome::Updated(filename))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use anyhow::Result;
    use serde_yaml::Value;
    use tempfile::tempdir;

    use super::*;
    use crate::console::ScriptedConsole;
    use crate::frontmatter::Document;
    use crate::media::{MediaRecord, Release};
    use crate::poster::testing::FakeFetcher;
    use crate::provider::testing::StaticProvider;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    fn options(category: Option<Category>, run: RunOptions) -> PosterOptions {
        PosterOptions {
            category,
            width: 200,
            rules: ScanRules::default(),
            run,
        }
    }

    fn with_poster(mut record: MediaRecord, url: &str) -> MediaRecord {
        record.poster_url = Some(url.to_string());
        record
    }

    #[test]
    fn notes_with_posters_or_other_categories_are_left_out() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("Heat (1995).md"), "---\ntags:\n- movie\n---\n");
        write_file(
            &root.join("Alien (1979).md"),
            "---\ntags:\n- movie\nposter: '[[Alien (1979).jpg]]'\n---\n",
        );
        write_file(&root.join("Blank.md"), "---\ntags:\n- movie\nposter: ''\n---\n");
        write_file(&root.join("Hades (2020).md"), "#game\n");
        write_file(&root.join("Recipes.md"), "no tags");

        let all = find_notes_missing_posters(root, &ScanRules::default(), None).expect("scan");
        let names = all.iter().map(Note::stem).collect::<Vec<_>>();
        assert_eq!(names, vec!["Blank", "Hades (2020)", "Heat (1995)"]);

        let movies = find_notes_missing_posters(root, &ScanRules::default(), Some(Category::Movie))
            .expect("scan");
        assert_eq!(movies.len(), 2);
    }

    #[test]
    fn poster_is_saved_and_linked() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        let note_path = root.join("Movies/Heat (1995).md");
        write_file(&note_path, "---\ntags:\n- movie\n---\n\nGreat film.\n");
        let mut source = StaticProvider::default().with(
            "Heat",
            vec![
                with_poster(
                    MediaRecord::new(Category::Movie, "1", "Heat")
                        .with_release(Release::Date("1972-03-01".to_string())),
                    "https://img/heat-1972.jpg",
                ),
                with_poster(
                    MediaRecord::new(Category::Movie, "949", "Heat")
                        .with_release(Release::Date("1995-12-15".to_string())),
                    "https://img/heat.jpg",
                ),
            ],
        );
        let mut fetcher = FakeFetcher::default();
        let mut console = ScriptedConsole::default();

        let summary = download_posters(
            root,
            &options(None, RunOptions::default()),
            &mut source,
            &mut fetcher,
            &mut console,
        )
        .expect("posters");

        assert_eq!(summary.updated, 1);
        assert_eq!(console.prompts(), 0);
        assert_eq!(fetcher.requests, vec![("https://img/heat.jpg".to_string(), 200)]);
        assert_eq!(
            fs::read(root.join("Movies/Heat (1995).jpg")).expect("poster"),
            b"jpeg:https://img/heat.jpg"
        );
        let content = fs::read_to_string(&note_path).expect("note");
        let document = Document::parse(&content);
        assert_eq!(
            document.get("poster").and_then(Value::as_str),
            Some("[[Heat (1995).jpg]]")
        );
        assert!(content.ends_with("\n\nGreat film.\n"));
    }

    #[test]
    fn album_notes_search_without_the_artist() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("Radiohead - Kid A (2000).md"), "#album\n");
        let mut source = StaticProvider::default().with(
            "Kid A",
            vec![with_poster(
                MediaRecord::new(Category::Album, "abc", "Kid A")
                    .with_release(Release::Date("2000-10-02".to_string())),
                "https://coverartarchive.org/release/abc/front",
            )],
        );
        let mut fetcher = FakeFetcher::default();
        let mut console = ScriptedConsole::default();

        download_posters(
            root,
            &options(Some(Category::Album), RunOptions::default()),
            &mut source,
            &mut fetcher,
            &mut console,
        )
        .expect("posters");

        assert_eq!(source.searches, vec!["Kid A"]);
        assert!(root.join("Radiohead - Kid A (2000).jpg").exists());
    }

    /// Touches the note while the download is in flight.
    struct EditingFetcher {
        note: PathBuf,
    }

    impl PosterFetcher for EditingFetcher {
        fn fetch_and_resize(&mut self, url: &str, _width: u32) -> Result<Vec<u8>> {
            fs::write(&self.note, "#movie\nedited\n").expect("edit note");
            Ok(format!("jpeg:{url}").into_bytes())
        }
    }

    #[test]
    fn failed_note_write_removes_the_new_poster() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("Heat (1995).md"), "#movie\n");
        let mut source = StaticProvider::default().with(
            "Heat",
            vec![with_poster(
                MediaRecord::new(Category::Movie, "949", "Heat")
                    .with_release(Release::Date("1995-12-15".to_string())),
                "https://img/heat.jpg",
            )],
        );
        let mut fetcher = EditingFetcher {
            note: root.join("Heat (1995).md"),
        };
        let mut console = ScriptedConsole::default();

        let summary = download_posters(
            root,
            &options(None, RunOptions::default()),
            &mut source,
            &mut fetcher,
            &mut console,
        )
        .expect("posters");

        assert_eq!(summary.failed, 1);
        assert!(console.printed("changed on disk"));
        assert!(!root.join("Heat (1995).jpg").exists());
        assert_eq!(
            fs::read_to_string(root.join("Heat (1995).md")).expect("note"),
            "#movie\nedited\n"
        );
    }

    #[test]
    fn missing_cover_is_a_failure_and_dry_run_writes_nothing() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("Heat (1995).md"), "#movie\n");
        write_file(&root.join("Obscure (2001).md"), "#movie\n");
        let mut source = StaticProvider::default()
            .with(
                "Heat",
                vec![with_poster(
                    MediaRecord::new(Category::Movie, "949", "Heat"),
                    "https://img/heat.jpg",
                )],
            )
            .with("Obscure", vec![MediaRecord::new(Category::Movie, "5", "Obscure")]);
        let mut fetcher = FakeFetcher::default();
        let mut console = ScriptedConsole::default();

        let summary = download_posters(
            root,
            &options(None, RunOptions::dry_run()),
            &mut source,
            &mut fetcher,
            &mut console,
        )
        .expect("posters");

        assert_eq!((summary.updated, summary.failed), (1, 1));
        assert!(console.printed("No poster available for 'Obscure'"));
        assert!(console.printed("would update: Heat (1995).jpg"));
        assert!(!root.join("Heat (1995).jpg").exists());
        assert_eq!(
            fs::read_to_string(root.join("Heat (1995).md")).expect("note"),
            "#movie\n"
        );
    }
}
