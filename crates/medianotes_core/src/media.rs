use std::fmt;

use anyhow::{Result, bail};
use chrono::{DateTime, Datelike};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Movie,
    Tv,
    Game,
    Album,
}

impl Category {
    pub const ALL: [Category; 4] = [Self::Movie, Self::Tv, Self::Game, Self::Album];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
            Self::Game => "game",
            Self::Album => "album",
        }
    }

    /// The frontmatter tag a note of this category carries.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "series",
            Self::Game => "game",
            Self::Album => "album",
        }
    }

    pub fn hashtag(self) -> String {
        format!("#{}", self.tag())
    }

    /// Map a frontmatter tag to a category, ignoring case.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "movie" => Some(Self::Movie),
            "series" | "tv" => Some(Self::Tv),
            "game" => Some(Self::Game),
            "album" => Some(Self::Album),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match Self::from_tag(value) {
            Some(category) => Ok(category),
            None => bail!("unsupported media type: {value} (expected movie|tv|game|album)"),
        }
    }

    /// Year token used in filenames and prompts when no release date is known.
    /// Movies and series have none: a missing year is an error for them.
    pub fn year_placeholder(self) -> Option<&'static str> {
        match self {
            Self::Movie | Self::Tv => None,
            Self::Game => Some("unreleased"),
            Self::Album => Some("TBD"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Movie => "MOVIE",
            Self::Tv => "TV",
            Self::Game => "GAME",
            Self::Album => "ALBUM",
        }
    }

    /// Categories whose notes get a leading poster embed.
    pub fn embeds_poster(self) -> bool {
        matches!(self, Self::Movie | Self::Tv | Self::Game)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release information as each provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
    Date(String),
    /// Seconds since the Unix epoch.
    Timestamp(i64),
    Unknown,
}

impl Release {
    pub fn from_date(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(date) if !date.is_empty() => Self::Date(date.to_string()),
            _ => Self::Unknown,
        }
    }

    /// Calendar year of the release. Timestamps are read in UTC.
    pub fn year(&self) -> Option<String> {
        match self {
            Self::Date(date) => {
                let prefix = date.get(..4)?;
                prefix
                    .chars()
                    .all(|ch| ch.is_ascii_digit())
                    .then(|| prefix.to_string())
            }
            Self::Timestamp(seconds) => {
                DateTime::from_timestamp(*seconds, 0).map(|moment| format!("{:04}", moment.year()))
            }
            Self::Unknown => None,
        }
    }
}

/// One search result from a metadata provider.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub category: Category,
    pub id: String,
    pub title: String,
    pub release: Release,
    pub synopsis: Option<String>,
    pub artist: Option<String>,
    pub disambiguation: Option<String>,
    /// Release-type label shown for albums (`ALBUM`, `ALBUM/LIVE`).
    pub kind: Option<String>,
    pub poster_url: Option<String>,
}

impl MediaRecord {
    pub fn new(category: Category, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            category,
            id: id.into(),
            title: title.into(),
            release: Release::Unknown,
            synopsis: None,
            artist: None,
            disambiguation: None,
            kind: None,
            poster_url: None,
        }
    }

    pub fn with_release(mut self, release: Release) -> Self {
        self.release = release;
        self
    }

    pub fn with_synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.synopsis = Some(synopsis.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn year(&self) -> Option<String> {
        self.release.year()
    }

    /// Year shown to the user: the release year, else the category
    /// placeholder, else `TBD`.
    pub fn display_year(&self) -> String {
        self.year().unwrap_or_else(|| {
            self.category
                .year_placeholder()
                .unwrap_or("TBD")
                .to_string()
        })
    }

    /// Year used in a generated filename.
    pub fn filename_year(&self) -> Result<String> {
        if let Some(year) = self.year() {
            return Ok(year);
        }
        match self.category.year_placeholder() {
            Some(placeholder) => Ok(placeholder.to_string()),
            None => bail!("Could not determine release year"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastMember {
    pub name: String,
    pub character: String,
}

/// People and organisations credited on a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credits {
    Movie {
        directors: Vec<String>,
        cast: Vec<CastMember>,
    },
    Series {
        creators: Vec<String>,
        cast: Vec<CastMember>,
    },
    Game {
        developers: Vec<String>,
        publishers: Vec<String>,
    },
    Album {
        label: String,
    },
}

/// Full detail record for one selected title.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDetails {
    pub record: MediaRecord,
    /// Canonical page for the title (IMDB, IGDB, MusicBrainz).
    pub external_url: Option<String>,
    pub overview: Option<String>,
    pub credits: Credits,
    pub genres: Vec<String>,
    /// Game mode names as reported (`Single player`, `Co-operative`).
    pub modes: Vec<String>,
    /// Album secondary release types (`Live`, `Compilation`).
    pub release_types: Vec<String>,
}

impl MediaDetails {
    pub fn new(record: MediaRecord, credits: Credits) -> Self {
        Self {
            record,
            external_url: None,
            overview: None,
            credits,
            genres: Vec::new(),
            modes: Vec::new(),
            release_types: Vec::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.record.category
    }

    pub fn poster_url(&self) -> Option<&str> {
        self.record.poster_url.as_deref()
    }
}
