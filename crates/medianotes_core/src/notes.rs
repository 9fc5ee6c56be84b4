use anyhow::Result;
use serde_yaml::{Mapping, Value};

use crate::frontmatter::{serialize_frontmatter, string_sequence};
use crate::genres::GenreMap;
use crate::media::{CastMember, Category, Credits, MediaDetails};
use crate::title::{format_wikilink, sanitize_filename};

const NOT_AVAILABLE: &str = "Not available";
const NO_DESCRIPTION: &str = "No description available.";
const UNKNOWN: &str = "Unknown";

/// Complete content of a freshly created note.
pub fn format_note_content(details: &MediaDetails, genres: &GenreMap) -> String {
    let mut mapping = Mapping::new();
    mapping.insert(
        Value::String("tags".to_string()),
        string_sequence(note_tags(details, genres)),
    );
    serialize_frontmatter(&mapping, &format!("\n\n{}", sections(details)))
}

/// Links and Description sections appended to an existing note.
pub fn appended_sections(details: &MediaDetails) -> String {
    format!("\n{}", sections(details))
}

fn sections(details: &MediaDetails) -> String {
    let link = details.external_url.as_deref().unwrap_or(NOT_AVAILABLE);
    format!(
        "## Links\n{link}\n\n## Description\n{}\n",
        describe(details)
    )
}

/// `Title (Year).md`, or `Artist - Title (Year).md` for albums.
pub fn note_filename(details: &MediaDetails) -> Result<String> {
    let record = &details.record;
    let year = record.filename_year()?;
    let title = sanitize_filename(&record.title);
    Ok(match details.category() {
        Category::Album => {
            let artist = sanitize_filename(record.artist.as_deref().unwrap_or(UNKNOWN));
            format!("{artist} - {title} ({year}).md")
        }
        _ => format!("{title} ({year}).md"),
    })
}

/// Category tag first, then game modes or release types, then genres, with
/// duplicates dropped.
pub fn note_tags(details: &MediaDetails, genres: &GenreMap) -> Vec<String> {
    let mut tags = vec![details.category().tag().to_string()];
    let mut push = |tag: String| {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    };

    for mode in &details.modes {
        let mode = mode.to_lowercase();
        if mode.contains("single player") || mode.contains("singleplayer") {
            push("single-player".to_string());
        }
        if mode.contains("multiplayer") && !mode.contains("mmo") {
            push("multiplayer".to_string());
        }
        if mode.contains("co-op") || mode.contains("cooperative") {
            push("co-op".to_string());
        }
    }
    for release_type in &details.release_types {
        push(release_type.to_lowercase().replace(' ', "-"));
    }
    for genre in &details.genres {
        push(genres.translate(genre));
    }
    tags
}

pub fn describe(details: &MediaDetails) -> String {
    let overview = details
        .overview
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .unwrap_or(NO_DESCRIPTION);
    match &details.credits {
        Credits::Movie { directors, cast } => format!(
            "{overview} Directed by {}.{}",
            first_link(directors),
            starring(cast)
        ),
        Credits::Series { creators, cast } => format!(
            "{overview} Created by {}.{}",
            first_link(creators),
            starring(cast)
        ),
        Credits::Game {
            developers,
            publishers,
        } => format!(
            "{overview} Developed by {}. Published by {}.",
            first_link(developers),
            first_link(publishers)
        ),
        Credits::Album { label } => format!(
            "By {}. Released by {}.",
            format_wikilink(details.record.artist.as_deref().unwrap_or(UNKNOWN)),
            format_wikilink(label)
        ),
    }
}

fn first_link(names: &[String]) -> String {
    names
        .first()
        .map(|name| format_wikilink(name))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn starring(cast: &[CastMember]) -> String {
    if cast.is_empty() {
        return String::new();
    }
    let credited = cast
        .iter()
        .map(|member| format!("{} ({})", member.character, format_wikilink(&member.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" Starring {credited}.")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::frontmatter::{Document, string_list};
    use crate::media::{MediaRecord, Release};

    fn inception() -> MediaDetails {
        let record = MediaRecord::new(Category::Movie, "27205", "Inception")
            .with_release(Release::Date("2010-07-15".to_string()));
        let mut details = MediaDetails::new(
            record,
            Credits::Movie {
                directors: vec!["Christopher Nolan".to_string()],
                cast: vec![
                    CastMember {
                        name: "Leonardo DiCaprio".to_string(),
                        character: "Cobb".to_string(),
                    },
                    CastMember {
                        name: "Elliot Page".to_string(),
                        character: "Ariadne".to_string(),
                    },
                ],
            },
        );
        details.overview = Some("A thief steals secrets.".to_string());
        details.external_url = Some("https://www.imdb.com/title/tt1375666".to_string());
        details
    }

    #[test]
    fn movie_note_has_tags_links_and_description() {
        let content = format_note_content(&inception(), &GenreMap::default());
        assert_eq!(
            content,
            "---\ntags:\n- movie\n---\n\n## Links\nhttps://www.imdb.com/title/tt1375666\n\n## Description\nA thief steals secrets. Directed by [[Christopher Nolan]]. Starring Cobb ([[Leonardo DiCaprio]]), Ariadne ([[Elliot Page]]).\n"
        );
        assert_eq!(note_filename(&inception()).expect("filename"), "Inception (2010).md");
    }

    #[test]
    fn game_tags_follow_modes_then_genres() {
        let record = MediaRecord::new(Category::Game, "1", "Portal 2: Extended")
            .with_release(Release::Timestamp(1_303_171_200));
        let mut details = MediaDetails::new(
            record,
            Credits::Game {
                developers: vec!["Valve".to_string()],
                publishers: Vec::new(),
            },
        );
        details.modes = vec![
            "Single player".to_string(),
            "Multiplayer".to_string(),
            "Massively Multiplayer Online (MMO)".to_string(),
            "Co-operative".to_string(),
        ];
        details.genres = vec!["Puzzle".to_string(), "Role-playing (RPG)".to_string()];
        let genres = GenreMap::new(&BTreeMap::from([(
            "rpg".to_string(),
            vec!["Role-playing (RPG)".to_string()],
        )]));

        let content = format_note_content(&details, &genres);
        let document = Document::parse(&content);
        assert_eq!(
            string_list(document.get("tags")),
            vec!["game", "single-player", "multiplayer", "co-op", "puzzle", "rpg"]
        );
        assert!(content.contains("## Links\nNot available\n"));
        assert!(content.contains(
            "No description available. Developed by [[Valve]]. Published by Unknown."
        ));
        assert_eq!(
            note_filename(&details).expect("filename"),
            "Portal 2 - Extended (2011).md"
        );
    }

    #[test]
    fn album_notes_name_artist_and_label() {
        let record = MediaRecord::new(Category::Album, "mbid", "Live at Leeds")
            .with_artist("The Who");
        let mut details = MediaDetails::new(
            record,
            Credits::Album {
                label: "Decca".to_string(),
            },
        );
        details.release_types = vec!["Live".to_string(), "Spoken Word".to_string()];
        details.genres = vec!["Hard Rock".to_string()];

        let document = Document::parse(&format_note_content(&details, &GenreMap::default()));
        assert_eq!(
            string_list(document.get("tags")),
            vec!["album", "live", "spoken-word", "hard-rock"]
        );
        assert!(document.body.contains("By [[The Who]]. Released by [[Decca]]."));
        assert_eq!(
            note_filename(&details).expect("filename"),
            "The Who - Live at Leeds (TBD).md"
        );
    }

    #[test]
    fn series_without_year_cannot_be_named() {
        let record = MediaRecord::new(Category::Tv, "1", "Untitled Pilot");
        let details = MediaDetails::new(
            record,
            Credits::Series {
                creators: Vec::new(),
                cast: Vec::new(),
            },
        );
        assert!(note_filename(&details).is_err());
        assert_eq!(
            appended_sections(&details),
            "\n## Links\nNot available\n\n## Description\nNo description available. Created by Unknown.\n"
        );
    }
}
