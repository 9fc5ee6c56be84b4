use std::collections::HashMap;
use std::env;

use anyhow::{Result, bail};

use crate::http::HttpSettings;
use crate::igdb::IgdbProvider;
use crate::media::{Category, MediaDetails, MediaRecord};
use crate::musicbrainz::MusicBrainzProvider;
use crate::tmdb::TmdbProvider;

pub const TMDB_API_KEY_ENV: &str = "TMDB_API_KEY";
pub const IGDB_CLIENT_ID_ENV: &str = "IGDB_CLIENT_ID";
pub const IGDB_CLIENT_SECRET_ENV: &str = "IGDB_CLIENT_SECRET";

/// A metadata source that can search titles and expand a chosen result.
pub trait MetadataProvider {
    fn search(&mut self, title: &str) -> Result<Vec<MediaRecord>>;
    fn get_details(&mut self, record: &MediaRecord) -> Result<MediaDetails>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub tmdb_api_key: Option<String>,
    pub igdb_client_id: Option<String>,
    pub igdb_client_secret: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup_env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            tmdb_api_key: read(TMDB_API_KEY_ENV),
            igdb_client_id: read(IGDB_CLIENT_ID_ENV),
            igdb_client_secret: read(IGDB_CLIENT_SECRET_ENV),
        }
    }

    pub fn tmdb_api_key(&self) -> Result<&str> {
        match self.tmdb_api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("{TMDB_API_KEY_ENV} environment variable not set"),
        }
    }

    pub fn igdb(&self) -> Result<(&str, &str)> {
        match (
            self.igdb_client_id.as_deref(),
            self.igdb_client_secret.as_deref(),
        ) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => bail!(
                "{IGDB_CLIENT_ID_ENV} and {IGDB_CLIENT_SECRET_ENV} environment variables required"
            ),
        }
    }

    /// Fail before any file is touched when `category` cannot be served.
    pub fn require(&self, category: Category) -> Result<()> {
        match category {
            Category::Movie | Category::Tv => self.tmdb_api_key().map(|_| ()),
            Category::Game => self.igdb().map(|_| ()),
            Category::Album => Ok(()),
        }
    }
}

pub fn create_provider(
    category: Category,
    credentials: &Credentials,
    settings: &HttpSettings,
) -> Result<Box<dyn MetadataProvider>> {
    credentials.require(category)?;
    let provider: Box<dyn MetadataProvider> = match category {
        Category::Movie | Category::Tv => Box::new(TmdbProvider::new(
            credentials.tmdb_api_key()?,
            Some(category),
            settings.clone(),
        )?),
        Category::Game => {
            let (client_id, client_secret) = credentials.igdb()?;
            Box::new(IgdbProvider::connect(
                client_id,
                client_secret,
                settings.clone(),
            )?)
        }
        Category::Album => Box::new(MusicBrainzProvider::new(settings.clone())?),
    };
    Ok(provider)
}

/// TMDB provider searching movies and series together.
pub fn create_screen_provider(
    credentials: &Credentials,
    settings: &HttpSettings,
) -> Result<Box<dyn MetadataProvider>> {
    Ok(Box::new(TmdbProvider::new(
        credentials.tmdb_api_key()?,
        None,
        settings.clone(),
    )?))
}

/// Hands out a provider per category.
pub trait ProviderSource {
    /// Fail early when any of `categories` cannot be served.
    fn prepare(&mut self, categories: &[Category]) -> Result<()> {
        let _ = categories;
        Ok(())
    }

    fn provider(&mut self, category: Category) -> Result<&mut dyn MetadataProvider>;
}

/// Builds real providers on first use and keeps them for the run, so each
/// service keeps its own rate limit and token.
pub struct ProviderCache {
    credentials: Credentials,
    settings: HttpSettings,
    built: HashMap<Category, Box<dyn MetadataProvider>>,
}

impl ProviderCache {
    pub fn new(credentials: Credentials, settings: HttpSettings) -> Self {
        Self {
            credentials,
            settings,
            built: HashMap::new(),
        }
    }
}

impl ProviderSource for ProviderCache {
    fn prepare(&mut self, categories: &[Category]) -> Result<()> {
        for category in categories {
            self.credentials.require(*category)?;
        }
        Ok(())
    }

    fn provider(&mut self, category: Category) -> Result<&mut dyn MetadataProvider> {
        if !self.built.contains_key(&category) {
            let provider = create_provider(category, &self.credentials, &self.settings)?;
            self.built.insert(category, provider);
        }
        match self.built.get_mut(&category) {
            Some(provider) => Ok(provider.as_mut()),
            None => bail!("no provider available for {category}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use anyhow::{Result, bail};

    use super::{MetadataProvider, ProviderSource};
    use crate::media::{Category, Credits, MediaDetails, MediaRecord};

    /// Canned search results and details keyed by title and id.
    #[derive(Debug, Default)]
    pub struct StaticProvider {
        pub results: BTreeMap<String, Vec<MediaRecord>>,
        pub details: BTreeMap<String, MediaDetails>,
        pub failing: Vec<String>,
        pub searches: Vec<String>,
    }

    impl StaticProvider {
        pub fn with(mut self, title: &str, records: Vec<MediaRecord>) -> Self {
            self.results.insert(title.to_string(), records);
            self
        }

        pub fn with_details(mut self, details: MediaDetails) -> Self {
            self.details.insert(details.record.id.clone(), details);
            self
        }

        pub fn failing_on(mut self, title: &str) -> Self {
            self.failing.push(title.to_string());
            self
        }
    }

    impl MetadataProvider for StaticProvider {
        fn search(&mut self, title: &str) -> Result<Vec<MediaRecord>> {
            self.searches.push(title.to_string());
            if self.failing.iter().any(|entry| entry == title) {
                bail!("service unavailable");
            }
            Ok(self.results.get(title).cloned().unwrap_or_default())
        }

        fn get_details(&mut self, record: &MediaRecord) -> Result<MediaDetails> {
            if let Some(details) = self.details.get(&record.id) {
                return Ok(details.clone());
            }
            let credits = match record.category {
                Category::Movie => Credits::Movie {
                    directors: Vec::new(),
                    cast: Vec::new(),
                },
                Category::Tv => Credits::Series {
                    creators: Vec::new(),
                    cast: Vec::new(),
                },
                Category::Game => Credits::Game {
                    developers: Vec::new(),
                    publishers: Vec::new(),
                },
                Category::Album => Credits::Album {
                    label: "Independent".to_string(),
                },
            };
            Ok(MediaDetails::new(record.clone(), credits))
        }
    }

    impl ProviderSource for StaticProvider {
        fn provider(&mut self, _category: Category) -> Result<&mut dyn MetadataProvider> {
            Ok(self)
        }
    }
}
