//! Advanced query string parser
//!
//! Grammar, one clause per whitespace-separated token:
//!
//! ```text
//! clause  := [+|-] [field ':'] value
//! field   := Name | Label.<key> | Env.<key> | LabelKeys | ...
//! value   := word | '"' quoted text '"'
//! ```
//!
//! Unquoted values containing `*` or `?` are wildcard patterns. Values on
//! numeric and date fields may start with `>`, `>=`, `<` or `<=`.

use chrono::{DateTime, NaiveDate, Utc};

use super::{BoolQuery, Bound, Comparison, Pattern, Query};
use crate::error::{Error, Result};
use crate::mapping::{Analyzer, FieldRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug)]
struct Clause {
    occur: Occur,
    field: Option<String>,
    value: String,
    quoted: bool,
}

/// Parse an advanced query string into a boolean query
pub fn parse_advanced(input: &str) -> Result<Query> {
    let mut bool_query = BoolQuery::default();

    for clause in lex(input)? {
        let occur = clause.occur;
        let query = compile(clause)?;
        match occur {
            Occur::Must => bool_query.must.push(query),
            Occur::Should => bool_query.should.push(query),
            Occur::MustNot => bool_query.must_not.push(query),
        }
    }

    if bool_query.must.is_empty() && bool_query.should.is_empty() && bool_query.must_not.is_empty()
    {
        return Err(Error::invalid_query("query has no clauses"));
    }
    Ok(Query::Bool(bool_query))
}

fn lex(input: &str) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        let occur = match first {
            '+' => Occur::Must,
            '-' => Occur::MustNot,
            _ => Occur::Should,
        };
        if occur != Occur::Should {
            chars.next();
        }

        let mut field: Option<String> = None;
        let mut value = String::new();
        let mut quoted = false;

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '"' => {
                    quoted = true;
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some('\\') => {
                                if let Some(escaped) = chars.next() {
                                    value.push(escaped);
                                }
                            }
                            Some(ch) => value.push(ch),
                            None => return Err(Error::invalid_query("unterminated quote")),
                        }
                    }
                }
                ':' if field.is_none() && !quoted => {
                    field = Some(std::mem::take(&mut value));
                }
                _ => value.push(c),
            }
        }

        if field.as_deref() == Some("") {
            return Err(Error::invalid_query(format!(
                "missing field name before ':{}'",
                value
            )));
        }
        if value.is_empty() && !quoted {
            return Err(Error::invalid_query(match &field {
                Some(f) => format!("missing value for field '{}'", f),
                None => "dangling clause marker".to_string(),
            }));
        }

        clauses.push(Clause {
            occur,
            field,
            value,
            quoted,
        });
    }

    Ok(clauses)
}

fn compile(clause: Clause) -> Result<Query> {
    let is_pattern = !clause.quoted && clause.value.contains(['*', '?']);

    let Some(name) = clause.field else {
        if is_pattern {
            return Ok(Query::Wildcard {
                field: None,
                pattern: Pattern::new(&clause.value)?,
            });
        }
        return Ok(Query::Term {
            field: None,
            value: clause.value,
        });
    };

    let field = FieldRef::parse(&name)?;
    let mapping = field.field.mapping();
    if !mapping.searchable {
        return Err(Error::invalid_query(format!(
            "field '{}' is not searchable",
            field.field.name()
        )));
    }

    match mapping.analyzer {
        Analyzer::Numeric | Analyzer::Date => {
            if is_pattern {
                return Err(Error::invalid_query(format!(
                    "wildcards are not supported on field '{}'",
                    field.field.name()
                )));
            }
            let (op, rest) = comparison(&clause.value);
            let bound = if mapping.analyzer == Analyzer::Numeric {
                rest.parse::<u64>().map(Bound::Number).map_err(|_| {
                    Error::invalid_query(format!(
                        "'{}' is not a number for field '{}'",
                        rest,
                        field.field.name()
                    ))
                })?
            } else {
                Bound::Date(parse_date(rest)?)
            };
            Ok(Query::Range { field, op, bound })
        }
        Analyzer::Keyword | Analyzer::Simple | Analyzer::English if is_pattern => {
            Ok(Query::Wildcard {
                pattern: Pattern::new(&clause.value)?,
                field: Some(field),
            })
        }
        _ => Ok(Query::Term {
            field: Some(field),
            value: clause.value,
        }),
    }
}

fn comparison(value: &str) -> (Comparison, &str) {
    if let Some(rest) = value.strip_prefix(">=") {
        (Comparison::Ge, rest)
    } else if let Some(rest) = value.strip_prefix("<=") {
        (Comparison::Le, rest)
    } else if let Some(rest) = value.strip_prefix('>') {
        (Comparison::Gt, rest)
    } else if let Some(rest) = value.strip_prefix('<') {
        (Comparison::Lt, rest)
    } else {
        (Comparison::Eq, value)
    }
}

fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| Error::invalid_query(format!("'{}' is not a date", value)))
}
