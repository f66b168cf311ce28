//! Query construction
//!
//! A search request carries a simple query (a partial repository/tag name)
//! and an advanced query (field-qualified clauses with `+`/`-` markers).
//! [`build`] compiles both into one boolean [`Query`] that the index store
//! evaluates against each document.

mod eval;
mod parser;

pub use parser::parse_advanced;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};
use crate::mapping::{Analyzer, Field, FieldRef};

/// Structured query understood by the index store
#[derive(Debug, Clone)]
pub enum Query {
    /// Boolean combination of sub-queries
    Bool(BoolQuery),
    /// Partial, case-insensitive match against any of the fields
    Fuzzy { fields: Vec<Field>, text: String },
    /// Analysed term match; `None` searches the default field set
    Term {
        field: Option<FieldRef>,
        value: String,
    },
    /// `*`/`?` pattern match; `None` searches the default field set
    Wildcard {
        field: Option<FieldRef>,
        pattern: Pattern,
    },
    /// Numeric or date comparison
    Range {
        field: FieldRef,
        op: Comparison,
        bound: Bound,
    },
}

/// Clauses grouped by occurrence
///
/// A document matches when every `must` clause matches, no `must_not`
/// clause matches, and, if there are no `must` clauses, at least one
/// `should` clause matches. A query made only of `must_not` clauses
/// matches every document not excluded.
#[derive(Debug, Clone, Default)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
}

/// A `*`/`?` pattern compiled for keyword and analysed fields
///
/// Keyword fields compare case-sensitively; analysed fields hold lower-cased
/// tokens, so they use the case-folded form.
#[derive(Debug, Clone)]
pub struct Pattern {
    exact: Regex,
    folded: Regex,
}

impl Pattern {
    /// Compile a wildcard pattern
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            exact: wildcard(pattern, false)?,
            folded: wildcard(pattern, true)?,
        })
    }

    /// Match one value of a field analysed by `analyzer`
    pub fn is_match(&self, text: &str, analyzer: Analyzer) -> bool {
        match analyzer {
            Analyzer::Keyword => self.exact.is_match(text),
            _ => self.folded.is_match(text),
        }
    }
}

/// Translate a `*`/`?` pattern into an anchored regex
fn wildcard(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            _ => re.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');

    RegexBuilder::new(&re)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| Error::invalid_query(format!("bad pattern '{}': {}", pattern, e)))
}

/// Comparison operator for range clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Right-hand side of a range clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Number(u64),
    Date(DateTime<Utc>),
}

impl Query {
    /// Partial match of `text` against `Name` or `Tag`
    pub fn simple(text: &str) -> Self {
        Query::Fuzzy {
            fields: vec![Field::Name, Field::Tag],
            text: text.trim().to_string(),
        }
    }
}

/// Combine a simple and an advanced query string into one disjunction
///
/// Fails with [`Error::NoSearchCriteria`] when both are blank rather than
/// matching everything.
pub fn build(simple: &str, advanced: &str) -> Result<Query> {
    let simple = simple.trim();
    let advanced = advanced.trim();

    if simple.is_empty() && advanced.is_empty() {
        return Err(Error::NoSearchCriteria);
    }

    let mut should = Vec::with_capacity(2);
    if !simple.is_empty() {
        should.push(Query::simple(simple));
    }
    if !advanced.is_empty() {
        should.push(parse_advanced(advanced)?);
    }

    Ok(Query::Bool(BoolQuery {
        should,
        ..Default::default()
    }))
}
