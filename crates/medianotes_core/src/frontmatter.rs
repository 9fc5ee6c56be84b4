use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use tracing::debug;

pub const DELIMITER: &str = "---";

/// A note split into its frontmatter block and verbatim body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub frontmatter: Option<Mapping>,
    pub body: String,
}

impl Document {
    pub fn parse(content: &str) -> Self {
        let (frontmatter, body) = parse_frontmatter(content);
        Self { frontmatter, body }
    }

    /// Render the document back to text. A document that never had a
    /// frontmatter block is returned as its body alone.
    pub fn render(&self) -> String {
        match &self.frontmatter {
            Some(mapping) => serialize_frontmatter(mapping, &self.body),
            None => self.body.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.frontmatter.as_ref().and_then(|mapping| mapping.get(key))
    }

    /// Set a frontmatter key, creating the block when the note had none.
    pub fn set(&mut self, key: &str, value: Value) {
        let mapping = self.frontmatter.get_or_insert_with(Mapping::new);
        mapping.insert(Value::String(key.to_string()), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.frontmatter
            .as_mut()
            .and_then(|mapping| mapping.remove(key))
    }
}

/// Split `content` into its frontmatter mapping and body.
///
/// The split is literal: the content is cut on the first two `---`
/// occurrences, so any later delimiter stays part of the body. Anything that
/// does not produce a YAML mapping degrades to "no frontmatter" and the whole
/// content is returned as the body.
pub fn parse_frontmatter(content: &str) -> (Option<Mapping>, String) {
    if !content.starts_with(DELIMITER) {
        return (None, content.to_string());
    }

    let mut segments = content.splitn(3, DELIMITER);
    let (Some(_), Some(raw), Some(body)) = (segments.next(), segments.next(), segments.next())
    else {
        return (None, content.to_string());
    };

    match parse_mapping(raw) {
        Some(mapping) => (Some(mapping), body.to_string()),
        None => (None, content.to_string()),
    }
}

/// Render `mapping` as a block-style YAML frontmatter followed by `body`.
pub fn serialize_frontmatter(mapping: &Mapping, body: &str) -> String {
    let rendered = render_mapping(mapping);
    format!("{DELIMITER}\n{rendered}{DELIMITER}{body}")
}

fn parse_mapping(raw: &str) -> Option<Mapping> {
    if raw.trim().is_empty() {
        return Some(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Mapping(mapping)) => Some(mapping),
        Ok(Value::Null) => Some(Mapping::new()),
        Ok(other) => {
            debug!(kind = value_kind(&other), "frontmatter is not a mapping");
            None
        }
        Err(error) => {
            debug!(%error, "frontmatter failed to parse");
            None
        }
    }
}

fn render_mapping(mapping: &Mapping) -> String {
    if mapping.is_empty() {
        return String::new();
    }
    // Mapping keys are always serializable; a failure here would mean a
    // non-string key carrying a tagged value, which we render as empty.
    let plain = serde_yaml::to_string(mapping).unwrap_or_default();
    let mut rendered = if plain.contains(DELIMITER) {
        render_shielded(mapping, &plain)
    } else {
        plain
    };
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    rendered
}

/// Render a mapping whose strings contain the delimiter. Those strings are
/// swapped for plain placeholder tokens, rendered, then replaced by
/// double-quoted scalars with every `-` escaped, so the block never holds a
/// literal `---` for `parse_frontmatter` to split on.
fn render_shielded(mapping: &Mapping, plain: &str) -> String {
    let mut nonce = String::from("mnshield");
    while plain.contains(&nonce) {
        nonce.push('q');
    }
    let mut shielded = Vec::new();
    let masked = shield_value(&Value::Mapping(mapping.clone()), &nonce, &mut shielded);
    let mut rendered = serde_yaml::to_string(&masked).unwrap_or_default();
    for (index, text) in shielded.iter().enumerate() {
        rendered = rendered.replace(&placeholder(&nonce, index), &double_quoted(text));
    }
    rendered
}

fn placeholder(nonce: &str, index: usize) -> String {
    format!("{nonce}{index}x")
}

fn shield_value(value: &Value, nonce: &str, shielded: &mut Vec<String>) -> Value {
    match value {
        Value::String(text) if text.contains(DELIMITER) => {
            let token = placeholder(nonce, shielded.len());
            shielded.push(text.clone());
            Value::String(token)
        }
        Value::Sequence(items) => {
            let mut masked = Vec::with_capacity(items.len());
            for item in items {
                masked.push(shield_value(item, nonce, shielded));
            }
            Value::Sequence(masked)
        }
        Value::Mapping(mapping) => {
            let mut masked = Mapping::with_capacity(mapping.len());
            for (key, item) in mapping {
                let key = shield_value(key, nonce, shielded);
                masked.insert(key, shield_value(item, nonce, shielded));
            }
            Value::Mapping(masked)
        }
        Value::Tagged(tagged) => Value::Tagged(Box::new(TaggedValue {
            tag: tagged.tag.clone(),
            value: shield_value(&tagged.value, nonce, shielded),
        })),
        other => other.clone(),
    }
}

fn double_quoted(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '-' => quoted.push_str("\\x2D"),
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            ch if ch.is_control() => quoted.push_str(&format!("\\u{:04X}", ch as u32)),
            ch => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

/// Stringify a scalar frontmatter value the way it reads in the file.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Normalise a `tags`-style value into a list of strings. A bare string is
/// a one-element list; anything else is empty.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items.iter().map(value_to_string).collect(),
        Some(Value::String(text)) => vec![text.clone()],
        _ => Vec::new(),
    }
}

pub fn string_sequence<I, S>(items: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::Sequence(
        items
            .into_iter()
            .map(|item| Value::String(item.into()))
            .collect(),
    )
}
