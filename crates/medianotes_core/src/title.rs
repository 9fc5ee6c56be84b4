use std::sync::LazyLock;

use regex::Regex;

static TITLE_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(.+?) \((\d{4})\)\s*$").expect("title/year pattern is valid")
});
static YEAR_QUALIFIED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+\s+\(\d{4}\)$").expect("year-qualified pattern is valid"));
static PARENTHETICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s*\(([^)]+)\)\s*$").expect("parenthetical pattern is valid")
});
static FOUR_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}$").expect("year pattern is valid"));

/// Parentheticals in game note names that name a platform rather than a year.
pub const PLATFORMS: &[&str] = &[
    "ipad",
    "iphone",
    "ios",
    "pc",
    "mac",
    "linux",
    "steam",
    "playstation",
    "ps4",
    "ps5",
    "xbox",
    "switch",
    "nintendo",
    "mobile",
    "android",
    "windows",
    "macos",
];

/// Split `Title (Year)` into its title and four-digit year. Only the final
/// parenthetical is considered; anything else is returned as a bare title.
pub fn extract_title_and_year(input: &str) -> (String, Option<String>) {
    match TITLE_YEAR_RE.captures(input) {
        Some(captures) => (
            captures[1].trim().to_string(),
            Some(captures[2].to_string()),
        ),
        None => (input.trim().to_string(), None),
    }
}

/// True when `stem` already ends in a ` (YYYY)` qualifier.
pub fn is_year_qualified(stem: &str) -> bool {
    YEAR_QUALIFIED_RE.is_match(stem)
}

pub fn sanitize_filename(title: &str) -> String {
    title
        .replace(':', " -")
        .replace(['/', '\\'], "-")
        .replace('?', "")
}

pub fn format_wikilink(text: &str) -> String {
    format!("[[{text}]]")
}

/// A game note name decomposed into title plus either a year or a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameFilename {
    pub title: String,
    pub year: Option<String>,
    pub platform: Option<String>,
}

/// Parse a game note stem such as `Hades (2020)` or `Balatro (iPad)`.
/// Parentheticals that are neither a year nor a known platform (editions,
/// subtitles) stay part of the title.
pub fn parse_game_filename(stem: &str) -> GameFilename {
    let untouched = GameFilename {
        title: stem.to_string(),
        year: None,
        platform: None,
    };
    let Some(captures) = PARENTHETICAL_RE.captures(stem) else {
        return untouched;
    };
    let title = captures[1].trim().to_string();
    let parenthetical = captures[2].trim();

    if FOUR_DIGITS_RE.is_match(parenthetical) {
        return GameFilename {
            title,
            year: Some(parenthetical.to_string()),
            platform: None,
        };
    }
    if PLATFORMS.contains(&parenthetical.to_lowercase().as_str()) {
        return GameFilename {
            title,
            year: None,
            platform: Some(parenthetical.to_string()),
        };
    }
    untouched
}
