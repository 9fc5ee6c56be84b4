use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use anyhow::{Result, bail};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::backup::{RunOptions, begin_run};
use crate::console::{Console, confirm};
use crate::frontmatter::{serialize_frontmatter, string_list, string_sequence, value_to_string};
use crate::title::format_wikilink;
use crate::vault::{
    ItemOutcome, Note, RunSummary, ScanRules, WritePlan, find_candidate_files, load_notes,
};

const PLAYERS: &str = "players";
const STATUS: &str = "status";
const TAGS: &str = "tags";
const WIP_TAG: &str = "wip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    TagRemoved,
    TagAdded,
    PropertyAdded,
    PropertyUpdated,
    NoChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub description: String,
}

impl Change {
    fn new(kind: ChangeKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Player tag (lowercase) to the people it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerMapping {
    players: BTreeMap<String, Vec<String>>,
}

impl Default for PlayerMapping {
    fn default() -> Self {
        Self {
            players: BTreeMap::from([("jordan".to_string(), vec!["Jordan Godfrey".to_string()])]),
        }
    }
}

impl PlayerMapping {
    /// Map `tag` to one name or a comma-separated list, replacing any
    /// earlier mapping for the tag.
    pub fn add_mapping(&mut self, tag: &str, names: &str) {
        let names = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        self.players.insert(tag.trim().to_lowercase(), names);
    }

    /// Add every `tag -> names` entry from the config `[players]` table.
    pub fn extend(&mut self, entries: &BTreeMap<String, Vec<String>>) {
        for (tag, names) in entries {
            self.add_mapping(tag, &names.join(","));
        }
    }

    pub fn is_player_tag(&self, tag: &str) -> bool {
        self.players.contains_key(&tag.to_lowercase())
    }

    pub fn wikilinks(&self, tag: &str) -> Vec<String> {
        self.players
            .get(&tag.to_lowercase())
            .map(|names| names.iter().map(|name| format_wikilink(name)).collect())
            .unwrap_or_default()
    }
}

/// Split a `tag:Name[,Name]` command-line mapping.
pub fn parse_mapping_arg(arg: &str) -> Result<(String, String)> {
    match arg.split_once(':') {
        Some((tag, names)) if !tag.trim().is_empty() => {
            Ok((tag.trim().to_string(), names.trim().to_string()))
        }
        _ => bail!("invalid player mapping '{arg}' (expected 'tag:Name' or 'tag:Name1,Name2')"),
    }
}

/// True when the frontmatter `tags` holds exactly `game`, as a list entry or
/// as the whole value.
pub fn has_game_tag(mapping: &Mapping) -> bool {
    match mapping.get(TAGS) {
        Some(Value::Sequence(tags)) => tags.iter().any(|tag| value_to_string(tag) == "game"),
        Some(Value::String(tag)) => tag == "game",
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Sequence(items) => !items.is_empty(),
        Value::Mapping(entries) => !entries.is_empty(),
        Value::Tagged(_) => true,
    }
}

/// Move player tags into a sorted `players` wikilink list and derive
/// `status` when the note has none. Everything else is left in place.
pub fn migrate_frontmatter(frontmatter: &Mapping, mapping: &PlayerMapping) -> (Mapping, Vec<Change>) {
    let mut updated = frontmatter.clone();
    let mut changes = Vec::new();
    let original_tags = string_list(updated.get(TAGS));
    let mut tags = original_tags.clone();

    let mut players = BTreeSet::new();
    if let Some(Value::Sequence(existing)) = updated.get(PLAYERS) {
        players.extend(existing.iter().map(value_to_string));
    }
    let mut converted = Vec::new();
    for tag in &tags {
        if !mapping.is_player_tag(tag) {
            continue;
        }
        let links = mapping.wikilinks(tag);
        if !links.is_empty() {
            players.extend(links);
            converted.push(tag.clone());
            changes.push(Change::new(ChangeKind::TagRemoved, format!("Removed '{tag}' tag")));
        }
    }
    for tag in &converted {
        if let Some(position) = tags.iter().position(|existing| existing == tag) {
            tags.remove(position);
        }
    }

    if !players.is_empty() {
        let sorted = players.into_iter().collect::<Vec<_>>();
        let listed = sorted.join(", ");
        match updated.get(PLAYERS).cloned() {
            None => {
                updated.insert(Value::from(PLAYERS), string_sequence(sorted));
                changes.push(Change::new(
                    ChangeKind::PropertyAdded,
                    format!("Added players: {listed}"),
                ));
            }
            Some(current) if current != string_sequence(sorted.clone()) => {
                updated.insert(Value::from(PLAYERS), string_sequence(sorted));
                changes.push(Change::new(
                    ChangeKind::PropertyUpdated,
                    format!("Updated players: {listed}"),
                ));
            }
            Some(_) => {}
        }
    }

    if !updated.contains_key(STATUS) {
        let status = if let Some(position) = tags.iter().position(|tag| tag == WIP_TAG) {
            tags.remove(position);
            changes.push(Change::new(ChangeKind::TagRemoved, "Removed 'wip' tag"));
            changes.push(Change::new(ChangeKind::PropertyAdded, "Added status: playing"));
            "playing"
        } else if updated.get("rating").is_some_and(is_truthy) {
            changes.push(Change::new(
                ChangeKind::PropertyAdded,
                "Added status: completed (has rating)",
            ));
            "completed"
        } else {
            changes.push(Change::new(
                ChangeKind::PropertyAdded,
                "Added status: want-to-play (default)",
            ));
            "want-to-play"
        };
        updated.insert(Value::from(STATUS), Value::from(status));
    }

    if tags != original_tags {
        updated.insert(Value::from(TAGS), string_sequence(tags));
    }
    (updated, changes)
}

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub players: PlayerMapping,
    /// Only notes carrying at least one of these tags. Empty means all.
    pub filter_tags: Vec<String>,
    /// Print each note's individual changes.
    pub show_details: bool,
    pub rules: ScanRules,
    pub run: RunOptions,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            players: PlayerMapping::default(),
            filter_tags: Vec::new(),
            show_details: true,
            rules: ScanRules::default(),
            run: RunOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MigrationRun {
    NoNotes,
    Cancelled,
    Finished(RunSummary),
}

/// Game notes (by frontmatter tag), narrowed to `filter_tags` when given.
pub fn find_game_notes(
    vault_root: &Path,
    rules: &ScanRules,
    filter_tags: &[String],
) -> Result<Vec<Note>> {
    let files = find_candidate_files(vault_root, rules)?;
    Ok(load_notes(&files, |note| {
        let Some(frontmatter) = &note.document.frontmatter else {
            return false;
        };
        if !has_game_tag(frontmatter) {
            return false;
        }
        if filter_tags.is_empty() {
            return true;
        }
        let tags = string_list(frontmatter.get(TAGS));
        filter_tags.iter().any(|wanted| tags.contains(wanted))
    }))
}

pub fn migrate_games(
    vault_root: &Path,
    options: &MigrateOptions,
    console: &mut dyn Console,
) -> Result<MigrationRun> {
    let notes = find_game_notes(vault_root, &options.rules, &options.filter_tags)?;
    if !options.filter_tags.is_empty() {
        console.say(&format!("filter tags: {}", options.filter_tags.join(", ")));
    }
    if notes.is_empty() {
        console.say("no game notes found matching criteria");
        return Ok(MigrationRun::NoNotes);
    }
    console.say(&format!("game notes: {}", notes.len()));

    if !options.run.dry_run {
        let prompt = format!(
            "This will modify {} file(s). Continue? (y/n): ",
            notes.len()
        );
        if !confirm(console, &prompt)? {
            console.say("Cancelled by user");
            return Ok(MigrationRun::Cancelled);
        }
    }
    let mut summary = begin_run(vault_root, &options.run, console)?;

    for note in &notes {
        let name = note.file_name();
        let result = migrate_note(note, options).map(|(outcome, changes)| {
            if options.show_details {
                for change in changes
                    .iter()
                    .filter(|change| change.kind != ChangeKind::NoChange)
                {
                    console.say(&format!("  {name}: {change}"));
                }
            }
            outcome
        });
        summary.record(console, &name, result)?;
    }

    summary.report(console);
    Ok(MigrationRun::Finished(summary))
}

fn migrate_note(note: &Note, options: &MigrateOptions) -> Result<(ItemOutcome, Vec<Change>)> {
    let name = note.file_name();
    let Some(frontmatter) = &note.document.frontmatter else {
        bail!("No valid frontmatter found");
    };
    let (updated, changes) = migrate_frontmatter(frontmatter, &options.players);
    if changes.is_empty() {
        return Ok((
            ItemOutcome::Unchanged(format!("{name} (no changes needed)")),
            vec![Change::new(ChangeKind::NoChange, "No changes needed")],
        ));
    }
    let content = serialize_frontmatter(&updated, &note.document.body);
    WritePlan::update(&note.path, &note.content, content).apply(options.run.dry_run)?;
    debug!(path = %note.path.display(), changes = changes.len(), "migrated game note");
    Ok((ItemOutcome::Updated(name), changes))
}
