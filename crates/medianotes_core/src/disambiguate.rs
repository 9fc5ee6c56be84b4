use anyhow::Result;
use tracing::debug;

use crate::console::{Console, choose_number};
use crate::media::{Category, MediaRecord};

const RULE_WIDTH: usize = 80;
const SYNOPSIS_LIMIT: usize = 100;

/// Horizontal separator used around interactive menus.
pub fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

/// Outcome of resolving one title against a candidate set.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Selected(MediaRecord),
    /// The user chose option 0.
    Skipped,
    NoResults,
}

/// Keep candidates released in `year`. An empty result means the year was
/// no help, so the full list comes back instead.
pub fn filter_by_year(candidates: Vec<MediaRecord>, year: &str) -> Vec<MediaRecord> {
    let matching = candidates
        .iter()
        .filter(|candidate| candidate.year().as_deref() == Some(year))
        .cloned()
        .collect::<Vec<_>>();
    if matching.is_empty() {
        debug!(year, "year filter matched nothing; keeping all candidates");
        candidates
    } else {
        matching
    }
}

/// The single candidate whose title equals `title`, ignoring case and
/// surrounding whitespace. Two or more equal titles count as no match.
pub fn find_exact_title_match<'a>(
    candidates: &'a [MediaRecord],
    title: &str,
) -> Option<&'a MediaRecord> {
    let wanted = title.trim().to_lowercase();
    let mut matches = candidates
        .iter()
        .filter(|candidate| candidate.title.trim().to_lowercase() == wanted);
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first)
}

/// Resolve `title` to one candidate: year filter, then exact-title match,
/// then a single remaining candidate, then the interactive prompt.
pub fn resolve_title(
    candidates: Vec<MediaRecord>,
    title: &str,
    year: Option<&str>,
    console: &mut dyn Console,
) -> Result<Resolution> {
    if candidates.is_empty() {
        return Ok(Resolution::NoResults);
    }

    let candidates = match year {
        Some(year) => filter_by_year(candidates, year),
        None => candidates,
    };

    if let Some(exact) = find_exact_title_match(&candidates, title) {
        debug!(title, id = %exact.id, "auto-selected exact title match");
        return Ok(Resolution::Selected(exact.clone()));
    }

    if candidates.len() == 1 {
        return Ok(candidates
            .into_iter()
            .next()
            .map_or(Resolution::NoResults, Resolution::Selected));
    }

    prompt_disambiguation(candidates, title, console)
}

fn prompt_disambiguation(
    candidates: Vec<MediaRecord>,
    title: &str,
    console: &mut dyn Console,
) -> Result<Resolution> {
    console.say("");
    console.say(&format!("Multiple results found for '{title}':"));
    console.say(&rule());
    for (index, candidate) in candidates.iter().enumerate() {
        for line in candidate_lines(index + 1, candidate) {
            console.say(&line);
        }
        console.say("");
    }
    console.say("0. Skip this file");
    console.say(&rule());

    let choice = choose_number(
        console,
        "Select the correct match (0 to skip): ",
        0..=candidates.len(),
    )?;
    if choice == 0 {
        return Ok(Resolution::Skipped);
    }
    Ok(candidates
        .into_iter()
        .nth(choice - 1)
        .map_or(Resolution::Skipped, Resolution::Selected))
}

fn candidate_lines(index: usize, candidate: &MediaRecord) -> Vec<String> {
    let year = candidate.display_year();
    match candidate.category {
        Category::Album => {
            let artist = candidate.artist.as_deref().unwrap_or("Unknown");
            let kind = candidate.kind.as_deref().unwrap_or("ALBUM");
            let note = candidate
                .disambiguation
                .as_deref()
                .filter(|text| !text.is_empty())
                .map(|text| format!(" [{text}]"))
                .unwrap_or_default();
            vec![format!(
                "{index}. {} - {artist} ({year}) [{kind}]{note}",
                candidate.title
            )]
        }
        category => {
            let synopsis = candidate
                .synopsis
                .as_deref()
                .unwrap_or("No description available");
            vec![
                format!(
                    "{index}. {} ({year}) [{}]",
                    candidate.title,
                    category.label()
                ),
                format!("   {}...", truncate_chars(synopsis, SYNOPSIS_LIMIT)),
            ]
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Resolution, candidate_lines, filter_by_year, find_exact_title_match, resolve_title,
        truncate_chars,
    };
    use crate::console::ScriptedConsole;
    use crate::media::{Category, MediaRecord, Release};

    fn movie(id: &str, title: &str, date: &str) -> MediaRecord {
        MediaRecord::new(Category::Movie, id, title).with_release(Release::from_date(Some(date)))
    }

    fn no_input() -> ScriptedConsole {
        ScriptedConsole::new(Vec::<String>::new())
    }

    #[test]
    fn empty_candidates_are_no_results() {
        let mut console = no_input();
        let resolution = resolve_title(Vec::new(), "Anything", None, &mut console).expect("resolve");
        assert_eq!(resolution, Resolution::NoResults);
    }

    #[test]
    fn exact_title_within_year_auto_selects() {
        let candidates = vec![
            movie("1", "Loot", "2022-06-24"),
            movie("2", "Loot - Blood Treasure", "2022-03-15"),
        ];
        let mut console = no_input();
        let resolution =
            resolve_title(candidates, "Loot", Some("2022"), &mut console).expect("resolve");
        match resolution {
            Resolution::Selected(record) => assert_eq!(record.id, "1"),
            other => panic!("unexpected resolution: {other:?}"),
        }
        assert_eq!(console.prompts(), 0);
    }

    #[test]
    fn year_filter_narrows_to_single_candidate() {
        let candidates = vec![
            movie("1", "Dune", "1984-12-14"),
            movie("2", "Dune", "2021-09-15"),
        ];
        let mut console = no_input();
        let resolution =
            resolve_title(candidates, "Dune", Some("2021"), &mut console).expect("resolve");
        assert_eq!(
            resolution,
            Resolution::Selected(movie("2", "Dune", "2021-09-15"))
        );
    }

    #[test]
    fn year_filter_never_grows_and_restores_on_empty() {
        let candidates = vec![
            movie("1", "A", "2001-01-01"),
            movie("2", "B", "2002-01-01"),
            movie("3", "C", "2001-05-05"),
        ];
        let filtered = filter_by_year(candidates.clone(), "2001");
        assert_eq!(filtered.len(), 2);
        assert!(filtered.len() <= candidates.len());

        let restored = filter_by_year(candidates.clone(), "1999");
        assert_eq!(restored, candidates);
    }

    #[test]
    fn album_years_match_any_date_precision() {
        let albums = vec![
            MediaRecord::new(Category::Album, "a", "One")
                .with_release(Release::from_date(Some("1997"))),
            MediaRecord::new(Category::Album, "b", "Two")
                .with_release(Release::from_date(Some("1997-05"))),
            MediaRecord::new(Category::Album, "c", "Three")
                .with_release(Release::from_date(Some("1997-05-21"))),
            MediaRecord::new(Category::Album, "d", "Four")
                .with_release(Release::from_date(Some("2000-01-01"))),
        ];
        assert_eq!(filter_by_year(albums, "1997").len(), 3);
    }

    #[test]
    fn game_years_come_from_utc_timestamps() {
        let games = vec![
            MediaRecord::new(Category::Game, "1", "Hades")
                .with_release(Release::Timestamp(1_600_905_600)),
            MediaRecord::new(Category::Game, "2", "Hades II"),
        ];
        let filtered = filter_by_year(games, "2020");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "1");
    }

    #[test]
    fn duplicate_exact_titles_are_ambiguous() {
        let candidates = vec![
            movie("1", "The Thing", "1982-06-25"),
            movie("2", " the thing ", "2011-10-14"),
            movie("3", "The Thing Called Love", "1993-07-16"),
        ];
        assert!(find_exact_title_match(&candidates, "The Thing").is_none());

        let mut console = ScriptedConsole::new(["2"]);
        let resolution =
            resolve_title(candidates, "The Thing", None, &mut console).expect("resolve");
        assert_eq!(
            resolution,
            Resolution::Selected(movie("2", " the thing ", "2011-10-14"))
        );
        assert_eq!(console.prompts(), 1);
        assert!(console.printed("Multiple results found for 'The Thing':"));
        assert!(console.printed("0. Skip this file"));
    }

    #[test]
    fn zero_skips_and_invalid_input_reprompts() {
        let candidates = vec![
            movie("1", "Alien", "1979-05-25"),
            movie("2", "Aliens", "1986-07-18"),
        ];
        let mut console = ScriptedConsole::new(["x", "7", "0"]);
        let resolution = resolve_title(candidates, "Alien Film", None, &mut console).expect("resolve");
        assert_eq!(resolution, Resolution::Skipped);
        assert_eq!(console.prompts(), 3);
        assert!(console.printed("Please enter a number between 0 and 2"));
    }

    #[test]
    fn closed_input_propagates() {
        let candidates = vec![
            movie("1", "Alien", "1979-05-25"),
            movie("2", "Aliens", "1986-07-18"),
        ];
        let mut console = no_input();
        assert!(resolve_title(candidates, "Alien Film", None, &mut console).is_err());
    }

    #[test]
    fn candidate_lines_use_category_labels() {
        let game = MediaRecord::new(Category::Game, "9", "Silksong").with_synopsis("Bugs.");
        assert_eq!(
            candidate_lines(1, &game),
            vec![
                "1. Silksong (unreleased) [GAME]".to_string(),
                "   Bugs....".to_string()
            ]
        );

        let mut album = MediaRecord::new(Category::Album, "m", "OK Computer")
            .with_artist("Radiohead")
            .with_release(Release::from_date(Some("1997-05-21")));
        album.kind = Some("ALBUM".to_string());
        album.disambiguation = Some("remaster".to_string());
        assert_eq!(
            candidate_lines(3, &album),
            vec!["3. OK Computer - Radiohead (1997) [ALBUM] [remaster]".to_string()]
        );
    }

    #[test]
    fn synopsis_truncates_on_char_boundaries() {
        let text = "é".repeat(150);
        assert_eq!(truncate_chars(&text, 100).chars().count(), 100);
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
