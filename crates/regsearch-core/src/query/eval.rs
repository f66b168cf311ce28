//! Query evaluation against a single document

use super::{BoolQuery, Bound, Comparison, Query};
use crate::mapping::{field_values, Analyzer, Field, FieldRef, FieldValue};
use crate::types::Document;

impl Query {
    /// Score a document, or `None` if it does not match
    pub fn score(&self, doc: &Document) -> Option<f64> {
        match self {
            Query::Bool(b) => b.score(doc),
            Query::Fuzzy { fields, text } => fuzzy(doc, fields, text),
            Query::Term { field, value } => on_fields(doc, field.as_ref(), |doc, field_ref| {
                term(doc, field_ref, value)
            }),
            Query::Wildcard { field, pattern } => {
                on_fields(doc, field.as_ref(), |doc, field_ref| {
                    let analyzer = field_ref.field.mapping().analyzer;
                    field_values(doc, field_ref).iter().any(|v| match v {
                        FieldValue::Text(text) if analyzer == Analyzer::Keyword => {
                            pattern.is_match(text, analyzer)
                        }
                        FieldValue::Text(text) => Analyzer::Simple
                            .tokenize(text)
                            .iter()
                            .any(|t| pattern.is_match(t, analyzer)),
                        _ => false,
                    })
                })
            }
            Query::Range { field, op, bound } => {
                let hit = field_values(doc, field)
                    .iter()
                    .any(|v| compare(v, *op, *bound));
                hit.then_some(1.0)
            }
        }
    }

    /// Whether the document matches
    pub fn matches(&self, doc: &Document) -> bool {
        self.score(doc).is_some()
    }
}

impl BoolQuery {
    fn score(&self, doc: &Document) -> Option<f64> {
        if self.must_not.iter().any(|q| q.matches(doc)) {
            return None;
        }

        let mut total = 0.0;
        for q in &self.must {
            total += q.score(doc)?;
        }

        let mut any_should = false;
        for q in &self.should {
            if let Some(s) = q.score(doc) {
                any_should = true;
                total += s;
            }
        }

        if self.must.is_empty() && !self.should.is_empty() && !any_should {
            return None;
        }
        Some(total)
    }
}

/// Apply a per-field predicate to one field, or to every default field
fn on_fields<F>(doc: &Document, field: Option<&FieldRef>, hit: F) -> Option<f64>
where
    F: Fn(&Document, &FieldRef) -> bool,
{
    match field {
        Some(field_ref) => hit(doc, field_ref).then_some(1.0),
        None => {
            let matched = Field::default_fields()
                .filter(|f| hit(doc, &FieldRef::new(*f)))
                .count();
            (matched > 0).then_some(matched as f64)
        }
    }
}

fn term(doc: &Document, field_ref: &FieldRef, value: &str) -> bool {
    let analyzer = field_ref.field.mapping().analyzer;
    let values = field_values(doc, field_ref);

    match analyzer {
        Analyzer::Keyword => values
            .iter()
            .any(|v| matches!(v, FieldValue::Text(text) if *text == value)),
        Analyzer::Simple | Analyzer::English => {
            let wanted = analyzer.tokenize(value);
            if wanted.is_empty() {
                return false;
            }
            values.iter().any(|v| match v {
                FieldValue::Text(text) => {
                    let have = analyzer.tokenize(text);
                    wanted.iter().all(|w| have.contains(w))
                }
                _ => false,
            })
        }
        // Range clauses cover numeric and date fields
        Analyzer::Numeric | Analyzer::Date => false,
    }
}

fn compare(value: &FieldValue<'_>, op: Comparison, bound: Bound) -> bool {
    let ordering = match (value, bound) {
        (FieldValue::Number(n), Bound::Number(b)) => n.cmp(&b),
        (FieldValue::Date(d), Bound::Date(b)) => d.cmp(&b),
        _ => return false,
    };
    match op {
        Comparison::Eq => ordering.is_eq(),
        Comparison::Gt => ordering.is_gt(),
        Comparison::Ge => ordering.is_ge(),
        Comparison::Lt => ordering.is_lt(),
        Comparison::Le => ordering.is_le(),
    }
}

/// Substring match scores 1.0, an exact token 2.0, a one-edit typo 0.5
fn fuzzy(doc: &Document, fields: &[Field], text: &str) -> Option<f64> {
    let needle = text.to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let mut best: Option<f64> = None;
    for field in fields {
        for value in field_values(doc, &FieldRef::new(*field)) {
            let FieldValue::Text(value) = value else {
                continue;
            };
            let haystack = value.to_lowercase();
            let tokens = Analyzer::Simple.tokenize(value);

            let score = if tokens.iter().any(|t| *t == needle) || haystack == needle {
                Some(2.0)
            } else if haystack.contains(&needle) {
                Some(1.0)
            } else if needle.chars().count() >= 4
                && tokens.iter().any(|t| within_one_edit(t, &needle))
            {
                Some(0.5)
            } else {
                None
            };

            if let Some(s) = score {
                best = Some(best.map_or(s, |b: f64| b.max(s)));
            }
        }
    }
    best
}

fn within_one_edit(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > 1 {
        return false;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()] <= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::parse;
    use crate::query::{build, parse_advanced};
    use crate::types::ImageMetadata;
    use chrono::TimeZone;

    fn doc(name: &str, tag: &str, labels: &[&str]) -> Document {
        let raw = ImageMetadata {
            digest: format!("sha256:{}-{}", name, tag),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            comment: Some("Minimal base images for servers".to_string()),
            exposed_ports: vec!["80/tcp".to_string()],
            size: 5_000,
            created: chrono::Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).single(),
            ..Default::default()
        };
        parse(name, tag, &raw)
    }

    #[test]
    fn test_simple_partial_and_exact() {
        let mysql = doc("mysql", "5.7", &[]);
        let q = build("sql", "").unwrap();
        assert!(q.matches(&mysql));

        let exact = Query::simple("mysql").score(&mysql).unwrap();
        let partial = Query::simple("sql").score(&mysql).unwrap();
        assert!(exact > partial);
    }

    #[test]
    fn test_simple_tolerates_one_typo() {
        let centos = doc("centos", "centos6", &[]);
        assert!(Query::simple("cemtos").matches(&centos));
        assert!(!Query::simple("xyz").matches(&centos));
    }

    #[test]
    fn test_bool_semantics() {
        let httpd = doc("httpd", "2.4", &["family=debian", "type=web"]);
        assert!(parse_advanced("+Label.family:debian").unwrap().matches(&httpd));
        assert!(!parse_advanced("+Label.family:debian -Label.type:web")
            .unwrap()
            .matches(&httpd));
        assert!(parse_advanced("-Label.type:base").unwrap().matches(&httpd));
    }

    #[test]
    fn test_keyword_is_exact() {
        let httpd = doc("httpd", "2.4", &["family=debian"]);
        assert!(!parse_advanced("Label.family:Debian").unwrap().matches(&httpd));
        assert!(!parse_advanced("Label.family:deb").unwrap().matches(&httpd));
        assert!(parse_advanced("Label.family:deb*").unwrap().matches(&httpd));
    }

    #[test]
    fn test_english_analyzer_on_comment() {
        let d = doc("alpine", "3", &[]);
        assert!(parse_advanced("Comment:image").unwrap().matches(&d));
        assert!(parse_advanced(r#"Comment:"the server""#).unwrap().matches(&d));
        assert!(!parse_advanced("Comment:desktop").unwrap().matches(&d));
    }

    #[test]
    fn test_default_fields() {
        let d = doc("redis", "7", &["family=debian"]);
        assert!(parse_advanced("redis").unwrap().matches(&d));
        assert!(parse_advanced("debian").unwrap().matches(&d));
        // numeric fields are not part of the default set
        assert!(!parse_advanced("5000").unwrap().matches(&d));
    }

    #[test]
    fn test_unqualified_wildcard_ignores_case_on_analysed_fields() {
        let mysql = doc("mysql", "5.7", &["family=Debian"]);
        assert!(parse_advanced("MySQL*").unwrap().matches(&mysql));
        assert!(parse_advanced("Name:MySQL*").unwrap().matches(&mysql));
        // keyword fields stay case-sensitive
        assert!(parse_advanced("Deb*").unwrap().matches(&mysql));
        assert!(!parse_advanced("deb*").unwrap().matches(&mysql));
    }

    #[test]
    fn test_ranges() {
        let d = doc("nginx", "1", &[]);
        assert!(parse_advanced("ExposedPorts:80").unwrap().matches(&d));
        assert!(!parse_advanced("ExposedPorts:443").unwrap().matches(&d));
        assert!(parse_advanced("SizeBytes:>4999").unwrap().matches(&d));
        assert!(!parse_advanced("SizeBytes:<5000").unwrap().matches(&d));
        assert!(parse_advanced("CreatedAt:>=2019-06-01").unwrap().matches(&d));
        assert!(!parse_advanced("CreatedAt:>2020-01-01T00:00:00Z")
            .unwrap()
            .matches(&d));
    }

    #[test]
    fn test_within_one_edit() {
        assert!(within_one_edit("centos", "cemtos"));
        assert!(within_one_edit("httpd", "http"));
        assert!(!within_one_edit("mysql", "psql"));
    }
}
