//! Document mapper and field-level indexing rules
//!
//! [`parse`] turns raw registry metadata into a [`Document`]. The
//! [`FIELD_MAPPINGS`] table declares, once, how each document field is
//! analysed and whether it takes part in default (all-fields) search. The
//! query evaluator and the index store both read their rules from here.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{Document, ImageMetadata};

/// Value stored for a label or env entry that carried no `=`
pub const TRUE_MARKER: &str = "true";

/// Map raw image metadata for `repository:tag` into an indexable document
pub fn parse(repository: &str, tag: &str, raw: &ImageMetadata) -> Document {
    let label = split_pairs(&raw.labels);
    let env = split_pairs(&raw.env);

    Document {
        id: raw.digest.clone(),
        manifest_digest: raw.manifest_digest.clone(),
        name: repository.to_string(),
        tag: tag.to_string(),
        full_name: Document::full_name_of(repository, tag),
        comment: raw.comment.clone().unwrap_or_default(),
        created_at: raw.created,
        author: raw.author.clone().unwrap_or_default(),
        label_keys: label.keys().cloned().collect(),
        label,
        volumes: raw.volumes.iter().cloned().collect(),
        exposed_ports: raw
            .exposed_ports
            .iter()
            .filter_map(|p| parse_port(p))
            .collect(),
        env_keys: env.keys().cloned().collect(),
        env,
        size_bytes: raw.size,
    }
}

/// Split `key=value` tokens on the first `=`; bare keys get [`TRUE_MARKER`]
fn split_pairs(tokens: &[String]) -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    for token in tokens {
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k, v),
            None => (token.as_str(), TRUE_MARKER),
        };
        if key.is_empty() {
            continue;
        }
        pairs.insert(key.to_string(), value.to_string());
    }
    pairs
}

/// `80/tcp` -> 80
fn parse_port(port: &str) -> Option<u32> {
    port.split('/').next()?.trim().parse().ok()
}

/// Searchable document fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    ManifestDigest,
    Name,
    Tag,
    FullName,
    Comment,
    CreatedAt,
    Author,
    Label,
    LabelKeys,
    Volumes,
    ExposedPorts,
    Env,
    EnvKeys,
    SizeBytes,
}

/// How a field's text is broken into comparable terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    /// Lower-cased, split on anything that is not alphanumeric
    Simple,
    /// The whole value is one exact, case-sensitive term
    Keyword,
    /// Simple tokens with English stop words removed and light stemming
    English,
    /// Unsigned integers compared numerically
    Numeric,
    /// RFC 3339 timestamps compared chronologically
    Date,
}

/// Indexing rule for one field
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub field: Field,
    pub analyzer: Analyzer,
    /// Returned in search results
    pub stored: bool,
    /// Usable in a field-qualified clause
    pub searchable: bool,
    /// Included when a clause names no field
    pub default_search: bool,
}

const fn rule(
    field: Field,
    analyzer: Analyzer,
    searchable: bool,
    default_search: bool,
) -> FieldMapping {
    FieldMapping {
        field,
        analyzer,
        stored: true,
        searchable,
        default_search,
    }
}

/// Field mapping table for the image document kind
pub static FIELD_MAPPINGS: [FieldMapping; 15] = [
    rule(Field::Id, Analyzer::Keyword, false, false),
    rule(Field::ManifestDigest, Analyzer::Keyword, false, false),
    rule(Field::Name, Analyzer::Simple, true, true),
    rule(Field::Tag, Analyzer::Simple, true, true),
    rule(Field::FullName, Analyzer::Simple, true, true),
    rule(Field::Comment, Analyzer::English, true, true),
    rule(Field::CreatedAt, Analyzer::Date, true, false),
    rule(Field::Author, Analyzer::Simple, true, true),
    rule(Field::Label, Analyzer::Keyword, true, true),
    rule(Field::LabelKeys, Analyzer::Keyword, true, true),
    rule(Field::Volumes, Analyzer::Keyword, true, true),
    rule(Field::ExposedPorts, Analyzer::Numeric, true, false),
    rule(Field::Env, Analyzer::Keyword, true, false),
    rule(Field::EnvKeys, Analyzer::Keyword, true, false),
    rule(Field::SizeBytes, Analyzer::Numeric, true, false),
];

impl Field {
    /// Name used in queries and in serialized documents
    pub fn name(self) -> &'static str {
        match self {
            Field::Id => "ID",
            Field::ManifestDigest => "ManifestDigest",
            Field::Name => "Name",
            Field::Tag => "Tag",
            Field::FullName => "FullName",
            Field::Comment => "Comment",
            Field::CreatedAt => "CreatedAt",
            Field::Author => "Author",
            Field::Label => "Label",
            Field::LabelKeys => "LabelKeys",
            Field::Volumes => "Volumes",
            Field::ExposedPorts => "ExposedPorts",
            Field::Env => "Env",
            Field::EnvKeys => "EnvKeys",
            Field::SizeBytes => "SizeBytes",
        }
    }

    /// Resolve a field name, accepting `Labels`/`Envs` as key-set aliases
    pub fn from_name(name: &str) -> Option<Field> {
        match name {
            "Labels" => return Some(Field::LabelKeys),
            "Envs" => return Some(Field::EnvKeys),
            _ => {}
        }
        FIELD_MAPPINGS
            .iter()
            .map(|m| m.field)
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    /// The indexing rule for this field
    pub fn mapping(self) -> &'static FieldMapping {
        FIELD_MAPPINGS
            .iter()
            .find(|m| m.field == self)
            .unwrap_or(&FIELD_MAPPINGS[0])
    }

    /// Fields addressed as `Field.subkey`
    pub fn is_keyed(self) -> bool {
        matches!(self, Field::Label | Field::Env)
    }

    /// Fields consulted by clauses that name no field
    pub fn default_fields() -> impl Iterator<Item = Field> {
        FIELD_MAPPINGS
            .iter()
            .filter(|m| m.default_search)
            .map(|m| m.field)
    }
}

/// A field, optionally narrowed to one key of a keyed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub field: Field,
    pub key: Option<String>,
}

impl FieldRef {
    pub fn new(field: Field) -> Self {
        Self { field, key: None }
    }

    /// Parse `Field` or `Field.subkey`
    pub fn parse(path: &str) -> Result<Self> {
        let (name, key) = match path.split_once('.') {
            Some((name, key)) => (name, Some(key)),
            None => (path, None),
        };
        let field = Field::from_name(name)
            .ok_or_else(|| Error::invalid_query(format!("unknown field '{}'", name)))?;

        match key {
            Some(_) if !field.is_keyed() => Err(Error::invalid_query(format!(
                "field '{}' has no sub-keys",
                field.name()
            ))),
            Some("") => Err(Error::invalid_query(format!(
                "empty sub-key in '{}'",
                path
            ))),
            _ => Ok(Self {
                field,
                key: key.map(str::to_string),
            }),
        }
    }
}

/// One comparable value pulled out of a document field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(u64),
    Date(DateTime<Utc>),
}

/// Extract the values a clause on `field_ref` is compared against
pub fn field_values<'a>(doc: &'a Document, field_ref: &FieldRef) -> Vec<FieldValue<'a>> {
    let keyed = |map: &'a BTreeMap<String, String>| -> Vec<FieldValue<'a>> {
        match &field_ref.key {
            Some(key) => map
                .get(key)
                .map(|v| vec![FieldValue::Text(v.as_str())])
                .unwrap_or_default(),
            None => map.values().map(|v| FieldValue::Text(v.as_str())).collect(),
        }
    };

    match field_ref.field {
        Field::Id => vec![FieldValue::Text(&doc.id)],
        Field::ManifestDigest => doc
            .manifest_digest
            .as_deref()
            .map(FieldValue::Text)
            .into_iter()
            .collect(),
        Field::Name => vec![FieldValue::Text(&doc.name)],
        Field::Tag => vec![FieldValue::Text(&doc.tag)],
        Field::FullName => vec![FieldValue::Text(&doc.full_name)],
        Field::Comment => vec![FieldValue::Text(&doc.comment)],
        Field::Author => vec![FieldValue::Text(&doc.author)],
        Field::CreatedAt => doc.created_at.map(FieldValue::Date).into_iter().collect(),
        Field::Label => keyed(&doc.label),
        Field::Env => keyed(&doc.env),
        Field::LabelKeys => doc.label_keys.iter().map(|k| FieldValue::Text(k)).collect(),
        Field::EnvKeys => doc.env_keys.iter().map(|k| FieldValue::Text(k)).collect(),
        Field::Volumes => doc.volumes.iter().map(|v| FieldValue::Text(v)).collect(),
        Field::ExposedPorts => doc
            .exposed_ports
            .iter()
            .map(|p| FieldValue::Number(u64::from(*p)))
            .collect(),
        Field::SizeBytes => vec![FieldValue::Number(doc.size_bytes)],
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "with",
];

impl Analyzer {
    /// Break text into the terms this analyzer indexes
    pub fn tokenize(self, text: &str) -> Vec<String> {
        match self {
            Analyzer::Keyword | Analyzer::Numeric | Analyzer::Date => vec![text.to_string()],
            Analyzer::Simple => simple_tokens(text).collect(),
            Analyzer::English => simple_tokens(text)
                .filter(|t| !STOP_WORDS.contains(&t.as_str()))
                .map(|t| stem(&t))
                .collect(),
        }
    }
}

fn simple_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Suffix-stripping stemmer; only needs to be consistent on both sides
fn stem(word: &str) -> String {
    let len = word.chars().count();
    if len > 4 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.ends_with("sses") {
        word[..word.len() - 2].to_string()
    } else if len > 5 && word.ends_with("ing") {
        word[..word.len() - 3].to_string()
    } else if len > 4 && word.ends_with("ed") {
        word[..word.len() - 2].to_string()
    } else if len > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Copy the requested stored fields of a document into a JSON object
///
/// An empty field list projects every stored field. `Label.key` and
/// `Env.key` project a single entry.
pub fn project(doc: &Document, fields: &[String]) -> Result<serde_json::Map<String, serde_json::Value>> {
    let full = match serde_json::to_value(doc)? {
        serde_json::Value::Object(map) => map,
        _ => return Err(Error::store("document did not serialize to an object")),
    };
    if fields.is_empty() {
        return Ok(full);
    }

    let mut projected = serde_json::Map::new();
    for path in fields {
        let field_ref = FieldRef::parse(path)?;
        if !field_ref.field.mapping().stored {
            continue;
        }
        let name = field_ref.field.name();
        let Some(value) = full.get(name) else {
            continue;
        };
        match &field_ref.key {
            Some(key) => {
                if let Some(v) = value.get(key) {
                    projected.insert(path.clone(), v.clone());
                }
            }
            None => {
                projected.insert(name.to_string(), value.clone());
            }
        }
    }
    Ok(projected)
}
