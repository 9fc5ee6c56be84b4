use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::http::{HttpClient, HttpSettings};
use crate::media::{Category, Credits, MediaDetails, MediaRecord, Release};
use crate::provider::MetadataProvider;

pub const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const IGDB_GAMES_URL: &str = "https://api.igdb.com/v4/games";
pub const IGDB_COVER_BASE_URL: &str = "https://images.igdb.com/igdb/image/upload/t_cover_big";
const IGDB_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// IGDB client authenticated with a Twitch client-credentials token.
pub struct IgdbProvider {
    http: HttpClient,
    client_id: String,
    access_token: String,
}

impl IgdbProvider {
    /// Exchange the client id and secret for an access token.
    pub fn connect(client_id: &str, client_secret: &str, settings: HttpSettings) -> Result<Self> {
        let mut http = HttpClient::new(settings, "IGDB", IGDB_MIN_INTERVAL)?;
        let params = [
            ("client_id", client_id.to_string()),
            ("client_secret", client_secret.to_string()),
            ("grant_type", "client_credentials".to_string()),
        ];
        let token: TokenResponse = http
            .post_json(TWITCH_TOKEN_URL, &params, &[], None)
            .context("failed to obtain IGDB access token")?;
        if token.access_token.is_empty() {
            bail!("Twitch returned an empty IGDB access token");
        }
        Ok(Self {
            http,
            client_id: client_id.to_string(),
            access_token: token.access_token,
        })
    }

    fn query_games(&mut self, query: &str) -> Result<Vec<GamePayload>> {
        let headers = [
            ("Client-ID", self.client_id.clone()),
            ("Authorization", format!("Bearer {}", self.access_token)),
            ("Accept", "application/json".to_string()),
        ];
        self.http
            .post_json(IGDB_GAMES_URL, &[], &headers, Some(query))
    }
}

impl MetadataProvider for IgdbProvider {
    fn search(&mut self, title: &str) -> Result<Vec<MediaRecord>> {
        let games = self
            .query_games(&search_query(title))
            .with_context(|| format!("IGDB search failed for '{title}'"))?;
        Ok(games.into_iter().map(record_from_game).collect())
    }

    fn get_details(&mut self, record: &MediaRecord) -> Result<MediaDetails> {
        let id: u64 = record
            .id
            .parse()
            .with_context(|| format!("invalid IGDB id: {}", record.id))?;
        let games = self
            .query_games(&details_query(id))
            .with_context(|| format!("IGDB details failed for id {id}"))?;
        match games.into_iter().next() {
            Some(game) => Ok(details_from_game(game)),
            None => bail!("Game with ID {id} not found"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GamePayload {
    id: u64,
    name: Option<String>,
    first_release_date: Option<i64>,
    summary: Option<String>,
    url: Option<String>,
    cover: Option<CoverPayload>,
    #[serde(default)]
    involved_companies: Vec<InvolvedCompany>,
    #[serde(default)]
    game_modes: Vec<NamedPayload>,
    #[serde(default)]
    genres: Vec<NamedPayload>,
}

#[derive(Debug, Deserialize)]
struct CoverPayload {
    image_id: Option<String>,
}

/// Search results carry bare company ids; details expand them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InvolvedCompany {
    Expanded {
        company: Option<NamedPayload>,
        #[serde(default)]
        developer: bool,
        #[serde(default)]
        publisher: bool,
    },
    Id(#[allow(dead_code)] u64),
}

#[derive(Debug, Deserialize)]
struct NamedPayload {
    name: Option<String>,
}

fn search_query(title: &str) -> String {
    let escaped = title.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "search \"{escaped}\"; fields name, first_release_date, summary, url, involved_companies, cover.image_id; limit 10;"
    )
}

fn details_query(id: u64) -> String {
    format!(
        "fields name, first_release_date, summary, url, involved_companies.company.name, involved_companies.developer, involved_companies.publisher, game_modes.name, genres.name, cover.image_id; where id = {id};"
    )
}

fn cover_url(cover: Option<&CoverPayload>) -> Option<String> {
    let image_id = cover?.image_id.as_deref()?;
    if image_id.is_empty() {
        return None;
    }
    Some(format!("{IGDB_COVER_BASE_URL}/{image_id}.jpg"))
}

fn record_from_game(game: GamePayload) -> MediaRecord {
    let release = match game.first_release_date {
        Some(seconds) => Release::Timestamp(seconds),
        None => Release::Unknown,
    };
    let mut record = MediaRecord::new(
        Category::Game,
        game.id.to_string(),
        game.name.unwrap_or_else(|| "Unknown".to_string()),
    )
    .with_release(release);
    record.poster_url = cover_url(game.cover.as_ref());
    record.synopsis = game.summary;
    record
}

fn details_from_game(mut game: GamePayload) -> MediaDetails {
    let mut developers = Vec::new();
    let mut publishers = Vec::new();
    for involved in std::mem::take(&mut game.involved_companies) {
        if let InvolvedCompany::Expanded {
            company,
            developer,
            publisher,
        } = involved
        {
            let name = company
                .and_then(|company| company.name)
                .unwrap_or_else(|| "Unknown".to_string());
            if developer {
                developers.push(name.clone());
            }
            if publisher {
                publishers.push(name);
            }
        }
    }
    let modes = names(std::mem::take(&mut game.game_modes));
    let genres = names(std::mem::take(&mut game.genres));
    let url = game.url.take();

    let record = record_from_game(game);
    let overview = record.synopsis.clone();
    let mut details = MediaDetails::new(
        record,
        Credits::Game {
            developers,
            publishers,
        },
    );
    details.external_url = url;
    details.overview = overview;
    details.modes = modes;
    details.genres = genres;
    details
}

fn names(items: Vec<NamedPayload>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| item.name)
        .filter(|name| !name.is_empty())
        .collect()
}
