use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::http::{HttpClient, HttpSettings};
use crate::media::{CastMember, Category, Credits, MediaDetails, MediaRecord, Release};
use crate::provider::MetadataProvider;

pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const TMDB_IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/original";
const TMDB_MIN_INTERVAL: Duration = Duration::from_millis(250);
const TOP_BILLED: usize = 3;

/// TMDB client for movies and series. A `scope` of `None` searches both
/// through the multi endpoint.
pub struct TmdbProvider {
    http: HttpClient,
    api_key: String,
    scope: Option<Category>,
}

impl TmdbProvider {
    pub fn new(api_key: &str, scope: Option<Category>, settings: HttpSettings) -> Result<Self> {
        if let Some(category) = scope
            && !matches!(category, Category::Movie | Category::Tv)
        {
            bail!("TMDB cannot serve {category} lookups");
        }
        Ok(Self {
            http: HttpClient::new(settings, "TMDB", TMDB_MIN_INTERVAL)?,
            api_key: api_key.to_string(),
            scope,
        })
    }

    fn search_endpoint(&self) -> &'static str {
        match self.scope {
            Some(Category::Tv) => "search/tv",
            Some(_) => "search/movie",
            None => "search/multi",
        }
    }
}

impl MetadataProvider for TmdbProvider {
    fn search(&mut self, title: &str) -> Result<Vec<MediaRecord>> {
        let url = format!("{TMDB_BASE_URL}/{}", self.search_endpoint());
        let params = [
            ("api_key", self.api_key.clone()),
            ("query", title.to_string()),
            ("language", "en-US".to_string()),
        ];
        let response: SearchResponse = self
            .http
            .get_json(&url, &params, &[])
            .with_context(|| format!("TMDB search failed for '{title}'"))?;
        Ok(search_records(response, self.scope))
    }

    fn get_details(&mut self, record: &MediaRecord) -> Result<MediaDetails> {
        let kind = match record.category {
            Category::Movie => "movie",
            Category::Tv => "tv",
            other => bail!("TMDB cannot serve {other} lookups"),
        };
        let url = format!("{TMDB_BASE_URL}/{kind}/{}", record.id);
        let params = [
            ("api_key", self.api_key.clone()),
            ("language", "en-US".to_string()),
            ("append_to_response", "credits,external_ids".to_string()),
        ];
        let response: DetailsResponse = self
            .http
            .get_json(&url, &params, &[])
            .with_context(|| format!("TMDB details failed for id {}", record.id))?;
        Ok(details_from_response(response, record.category))
    }
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: u64,
    title: Option<String>,
    name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    id: u64,
    title: Option<String>,
    name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    #[serde(default)]
    genres: Vec<Named>,
    #[serde(default)]
    created_by: Vec<Named>,
    #[serde(default)]
    credits: CreditsPayload,
    #[serde(default)]
    external_ids: ExternalIds,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct CreditsPayload {
    #[serde(default)]
    cast: Vec<CastPayload>,
    #[serde(default)]
    crew: Vec<CrewPayload>,
}

#[derive(Debug, Deserialize)]
struct CastPayload {
    name: Option<String>,
    character: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrewPayload {
    name: String,
    job: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ExternalIds {
    imdb_id: Option<String>,
}

fn search_records(response: SearchResponse, scope: Option<Category>) -> Vec<MediaRecord> {
    response
        .results
        .into_iter()
        .filter_map(|item| {
            let category = match scope {
                Some(category) => category,
                None => match item.media_type.as_deref() {
                    Some("movie") => Category::Movie,
                    Some("tv") => Category::Tv,
                    _ => return None,
                },
            };
            let title = item
                .title
                .or(item.name)
                .unwrap_or_else(|| "Unknown".to_string());
            let mut record = MediaRecord::new(category, item.id.to_string(), title)
                .with_release(release_of(item.release_date, item.first_air_date));
            record.synopsis = item.overview.filter(|text| !text.is_empty());
            record.poster_url = poster_url(item.poster_path.as_deref());
            Some(record)
        })
        .collect()
}

fn details_from_response(response: DetailsResponse, category: Category) -> MediaDetails {
    let title = response
        .title
        .or(response.name)
        .unwrap_or_else(|| "Unknown".to_string());
    let mut record = MediaRecord::new(category, response.id.to_string(), title)
        .with_release(release_of(response.release_date, response.first_air_date));
    record.synopsis = response.overview.clone();
    record.poster_url = poster_url(response.poster_path.as_deref());

    let cast = response
        .credits
        .cast
        .into_iter()
        .take(TOP_BILLED)
        .map(|member| CastMember {
            name: member.name.unwrap_or_else(|| "Unknown".to_string()),
            character: member.character.unwrap_or_else(|| "Unknown".to_string()),
        })
        .collect();
    let credits = match category {
        Category::Tv => Credits::Series {
            creators: response.created_by.into_iter().map(|p| p.name).collect(),
            cast,
        },
        _ => Credits::Movie {
            directors: response
                .credits
                .crew
                .into_iter()
                .filter(|member| member.job.as_deref() == Some("Director"))
                .map(|member| member.name)
                .collect(),
            cast,
        },
    };

    let mut details = MediaDetails::new(record, credits);
    details.overview = response.overview;
    details.external_url = response
        .external_ids
        .imdb_id
        .filter(|id| !id.is_empty())
        .map(|id| format!("https://www.imdb.com/title/{id}"));
    details.genres = response.genres.into_iter().map(|genre| genre.name).collect();
    details
}

fn release_of(release_date: Option<String>, first_air_date: Option<String>) -> Release {
    let date = release_date
        .filter(|date| !date.is_empty())
        .or(first_air_date);
    Release::from_date(date.as_deref())
}

fn poster_url(path: Option<&str>) -> Option<String> {
    path.filter(|path| !path.is_empty())
        .map(|path| format!("{TMDB_IMAGE_BASE_URL}{path}"))
}
