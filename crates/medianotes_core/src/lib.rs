pub mod add;
pub mod backup;
pub mod classify;
pub mod config;
pub mod console;
pub mod disambiguate;
pub mod embed;
pub mod fix_links;
pub mod frontmatter;
pub mod genres;
pub mod http;
pub mod igdb;
pub mod media;
pub mod migrate_games;
pub mod musicbrainz;
pub mod notes;
pub mod poster;
pub mod posters;
pub mod provider;
pub mod runtime;
pub mod standardize;
pub mod title;
pub mod tmdb;
pub mod update;
pub mod vault;
pub mod wikilinks;

pub use classify::{classify_category, classify_file, classify_vault, has_property};
pub use disambiguate::{Resolution, resolve_title};
pub use frontmatter::{Document, parse_frontmatter, serialize_frontmatter};
pub use vault::find_candidate_files;
pub use wikilinks::{rewrite_wikilinks_in_file, update_wikilinks_across_tree};
