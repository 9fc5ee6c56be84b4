use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::http::{HttpClient, HttpSettings};
use crate::media::{Category, Credits, MediaDetails, MediaRecord, Release};
use crate::provider::MetadataProvider;

pub const MUSICBRAINZ_API_URL: &str = "https://musicbrainz.org/ws/2";
pub const MUSICBRAINZ_RELEASE_URL: &str = "https://musicbrainz.org/release";
pub const COVER_ART_URL: &str = "https://coverartarchive.org/release";
/// MusicBrainz allows one request per second per client.
const MUSICBRAINZ_MIN_INTERVAL: Duration = Duration::from_secs(1);
const SEARCH_LIMIT: usize = 25;
const MIN_TAG_VOTES: u64 = 5;
const MAX_TAGS: usize = 5;

pub struct MusicBrainzProvider {
    http: HttpClient,
}

impl MusicBrainzProvider {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(settings, "MusicBrainz", MUSICBRAINZ_MIN_INTERVAL)?,
        })
    }
}

impl MetadataProvider for MusicBrainzProvider {
    fn search(&mut self, title: &str) -> Result<Vec<MediaRecord>> {
        let params = [
            ("query", search_query(title)),
            ("limit", SEARCH_LIMIT.to_string()),
            ("fmt", "json".to_string()),
        ];
        let response: SearchResponse = self
            .http
            .get_json(&format!("{MUSICBRAINZ_API_URL}/release"), &params, &[])
            .with_context(|| format!("MusicBrainz search failed for '{title}'"))?;
        Ok(response.releases.into_iter().map(record_from_release).collect())
    }

    fn get_details(&mut self, record: &MediaRecord) -> Result<MediaDetails> {
        let params = [
            ("inc", "artists+labels+release-groups+tags".to_string()),
            ("fmt", "json".to_string()),
        ];
        let release: ReleasePayload = self
            .http
            .get_json(
                &format!("{MUSICBRAINZ_API_URL}/release/{}", record.id),
                &params,
                &[],
            )
            .with_context(|| format!("MusicBrainz lookup failed for release {}", record.id))?;
        Ok(details_from_release(release))
    }
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    releases: Vec<ReleasePayload>,
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    id: String,
    title: Option<String>,
    date: Option<String>,
    disambiguation: Option<String>,
    #[serde(default, rename = "artist-credit")]
    artist_credit: Vec<ArtistCredit>,
    #[serde(rename = "release-group")]
    release_group: Option<ReleaseGroup>,
    #[serde(default, rename = "label-info")]
    label_info: Vec<LabelInfo>,
    #[serde(default)]
    tags: Vec<TagPayload>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    artist: Option<NamedPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct ReleaseGroup {
    #[serde(rename = "primary-type")]
    primary_type: Option<String>,
    #[serde(default, rename = "secondary-types")]
    secondary_types: Vec<String>,
    #[serde(default)]
    tags: Vec<TagPayload>,
}

#[derive(Debug, Deserialize)]
struct LabelInfo {
    label: Option<NamedPayload>,
}

#[derive(Debug, Deserialize)]
struct NamedPayload {
    name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
struct TagPayload {
    name: String,
    #[serde(default)]
    count: u64,
}

fn search_query(title: &str) -> String {
    let escaped = title.replace('\\', "\\\\").replace('"', "\\\"");
    format!("release:\"{escaped}\" AND status:official AND primarytype:album")
}

fn artist_name(credits: &[ArtistCredit]) -> String {
    let names: Vec<String> = credits
        .iter()
        .filter_map(|credit| credit.artist.as_ref())
        .map(|artist| artist.name.clone().unwrap_or_else(|| "Unknown".to_string()))
        .collect();
    if names.is_empty() {
        "Various Artists".to_string()
    } else {
        names.join(" & ")
    }
}

/// `ALBUM`, or `ALBUM/LIVE/COMPILATION` when secondary types are present.
fn kind_label(group: &ReleaseGroup) -> String {
    let primary = group.primary_type.as_deref().unwrap_or("Album").to_uppercase();
    if group.secondary_types.is_empty() {
        primary
    } else {
        format!("{primary}/{}", group.secondary_types.join("/").to_uppercase())
    }
}

/// Top community tags: most votes first, more than five votes, at most five.
fn top_tags(tags: &[TagPayload]) -> Vec<String> {
    let mut sorted = tags.to_vec();
    sorted.sort_by(|left, right| right.count.cmp(&left.count));
    sorted
        .into_iter()
        .filter(|tag| tag.count > MIN_TAG_VOTES)
        .take(MAX_TAGS)
        .map(|tag| tag.name)
        .collect()
}

fn record_from_release(release: ReleasePayload) -> MediaRecord {
    let group = release.release_group.unwrap_or_default();
    let mut record = MediaRecord::new(
        Category::Album,
        release.id.clone(),
        release.title.unwrap_or_else(|| "Unknown".to_string()),
    )
    .with_release(Release::from_date(release.date.as_deref()))
    .with_artist(artist_name(&release.artist_credit));
    record.disambiguation = release.disambiguation.filter(|text| !text.is_empty());
    record.kind = Some(kind_label(&group));
    record.poster_url = Some(format!("{COVER_ART_URL}/{}/front", release.id));
    record
}

fn details_from_release(mut release: ReleasePayload) -> MediaDetails {
    let label = release
        .label_info
        .iter()
        .find_map(|info| info.label.as_ref().and_then(|label| label.name.clone()))
        .unwrap_or_else(|| "Independent".to_string());
    let group_tags = release
        .release_group
        .as_ref()
        .map(|group| group.tags.clone())
        .unwrap_or_default();
    let tags = if group_tags.is_empty() {
        top_tags(&release.tags)
    } else {
        top_tags(&group_tags)
    };
    let release_types = release
        .release_group
        .as_mut()
        .map(|group| std::mem::take(&mut group.secondary_types))
        .unwrap_or_default();
    let url = format!("{MUSICBRAINZ_RELEASE_URL}/{}", release.id);

    let mut record = record_from_release(release);
    if !release_types.is_empty() {
        record.kind = record
            .kind
            .map(|kind| format!("{kind}/{}", release_types.join("/").to_uppercase()));
    }
    let mut details = MediaDetails::new(record, Credits::Album { label });
    details.external_url = Some(url);
    details.genres = tags;
    details.release_types = release_types;
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_release(json: &str) -> ReleasePayload {
        serde_json::from_str(json).expect("fixture parses")
    }

    #[test]
    fn search_query_filters_official_albums() {
        assert_eq!(
            search_query("OK Computer"),
            "release:\"OK Computer\" AND status:official AND primarytype:album"
        );
    }

    #[test]
    fn search_records_join_artists_and_label_types() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"releases": [{
                "id": "b1392450", "title": "Watch the Throne", "date": "2011-08-08",
                "disambiguation": "clean",
                "artist-credit": [
                    {"name": "JAY Z", "joinphrase": " & ", "artist": {"name": "JAY Z"}},
                    {"name": "Kanye West", "artist": {"name": "Kanye West"}}
                ],
                "release-group": {"primary-type": "Album", "secondary-types": ["Live"]}
            }, {
                "id": "c0ffee", "title": "Untitled"
            }]}"#,
        )
        .expect("fixture parses");
        let records: Vec<MediaRecord> = response
            .releases
            .into_iter()
            .map(record_from_release)
            .collect();

        assert_eq!(records[0].artist.as_deref(), Some("JAY Z & Kanye West"));
        assert_eq!(records[0].kind.as_deref(), Some("ALBUM/LIVE"));
        assert_eq!(records[0].disambiguation.as_deref(), Some("clean"));
        assert_eq!(
            records[0].poster_url.as_deref(),
            Some("https://coverartarchive.org/release/b1392450/front")
        );
        assert_eq!(records[1].artist.as_deref(), Some("Various Artists"));
        assert_eq!(records[1].display_year(), "TBD");
        assert_eq!(records[1].kind.as_deref(), Some("ALBUM"));
    }

    #[test]
    fn details_pick_label_and_top_tags() {
        let release = parse_release(
            r#"{
                "id": "abc", "title": "Kid A", "date": "2000-10-02",
                "artist-credit": [{"artist": {"name": "Radiohead"}}],
                "label-info": [{"label": null}, {"label": {"name": "Parlophone"}}],
                "release-group": {
                    "primary-type": "Album",
                    "secondary-types": [],
                    "tags": [
                        {"name": "electronic", "count": 12},
                        {"name": "experimental", "count": 30},
                        {"name": "rock", "count": 5},
                        {"name": "art rock", "count": 9},
                        {"name": "ambient", "count": 7},
                        {"name": "idm", "count": 8},
                        {"name": "glitch", "count": 6}
                    ]
                }
            }"#,
        );
        let details = details_from_release(release);

        assert_eq!(
            details.credits,
            Credits::Album {
                label: "Parlophone".to_string()
            }
        );
        assert_eq!(
            details.genres,
            vec!["experimental", "electronic", "art rock", "idm", "ambient"]
        );
        assert_eq!(
            details.external_url.as_deref(),
            Some("https://musicbrainz.org/release/abc")
        );
        assert!(details.release_types.is_empty());
    }

    #[test]
    fn details_default_to_independent_label() {
        let release = parse_release(
            r#"{"id": "x", "title": "Demo",
                "release-group": {"primary-type": "Album", "secondary-types": ["Live", "Compilation"]}}"#,
        );
        let details = details_from_release(release);
        assert_eq!(
            details.credits,
            Credits::Album {
                label: "Independent".to_string()
            }
        );
        assert_eq!(details.release_types, vec!["Live", "Compilation"]);
        assert_eq!(details.record.kind.as_deref(), Some("ALBUM/LIVE/COMPILATION"));
    }
}
