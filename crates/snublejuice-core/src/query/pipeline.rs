use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::field::Field;

/// Letters that count as part of a word when matching store names.
const WORD_LETTERS: &str = "a-zæøåA-ZÆØÅ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Lte,
    Gte,
    Gt,
}

impl CompareOp {
    #[must_use]
    pub fn test(self, actual: f64, bound: f64) -> bool {
        match self {
            CompareOp::Eq => (actual - bound).abs() < f64::EPSILON,
            CompareOp::Lte => actual <= bound,
            CompareOp::Gte => actual >= bound,
            CompareOp::Gt => actual > bound,
        }
    }

    fn operator(self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Lte => "$lte",
            CompareOp::Gte => "$gte",
            CompareOp::Gt => "$gt",
        }
    }
}

/// A single predicate. A [`Stage::Match`] requires all of its clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    /// Boolean field equals the value.
    Flag(Field, bool),
    /// Text field equals the value.
    Equals(Field, String),
    /// Numeric field compared against a bound. Missing values never match.
    Compare(Field, CompareOp, f64),
    /// Field exists and is not null.
    Present(Field),
    /// Array field contains the value.
    Contains(Field, String),
    /// Some element of an array field contains the needle as a whole word,
    /// ignoring case.
    WordMatch(Field, String),
    /// Product index is one of the values.
    IndexIn(Vec<i64>),
}

impl Clause {
    fn to_document(&self) -> Value {
        let mut doc = Map::new();
        match self {
            Clause::Flag(field, value) => {
                doc.insert(field.path().to_string(), json!(value));
            }
            Clause::Equals(field, value) => {
                doc.insert(field.path().to_string(), json!(value));
            }
            Clause::Compare(field, op, bound) => {
                let mut bound_doc = Map::new();
                bound_doc.insert(op.operator().to_string(), json!(bound));
                doc.insert(field.path().to_string(), Value::Object(bound_doc));
            }
            Clause::Present(field) => {
                doc.insert(
                    field.path().to_string(),
                    json!({ "$exists": true, "$ne": null }),
                );
            }
            Clause::Contains(field, value) => {
                doc.insert(field.path().to_string(), json!({ "$in": [value] }));
            }
            Clause::WordMatch(field, needle) => {
                doc.insert(
                    field.path().to_string(),
                    json!({ "$regex": word_pattern(needle), "$options": "i" }),
                );
            }
            Clause::IndexIn(indices) => {
                doc.insert(Field::Index.path().to_string(), json!({ "$in": indices }));
            }
        }
        Value::Object(doc)
    }
}

/// Regex matching `needle` as a whole word: it must be bounded by the start
/// or end of the string or by a non-letter. The needle is matched literally.
#[must_use]
pub fn word_pattern(needle: &str) -> String {
    format!(
        "(^|[^{WORD_LETTERS}]){}([^{WORD_LETTERS}]|$)",
        regex::escape(needle)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fuzzy {
    pub max_edits: u8,
    /// Leading characters that must match exactly.
    pub prefix_length: u8,
    pub max_expansions: u8,
}

/// Full-text relevance search over product names. Both clauses are optional
/// and their scores add up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStage {
    pub query: String,
    /// Score multiplier for exact token matches.
    pub exact_boost: f64,
    pub fuzzy: Fuzzy,
}

impl SearchStage {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            exact_boost: 10.0,
            fuzzy: Fuzzy {
                max_edits: 2,
                prefix_length: 1,
                max_expansions: 1,
            },
        }
    }

    /// Lowercased alphanumeric words of the query. Each is scored on its own.
    #[must_use]
    pub fn terms(&self) -> Vec<String> {
        search_tokens(&self.query)
    }
}

/// Split `text` into lowercased alphanumeric words.
#[must_use]
pub(crate) fn search_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    Search(SearchStage),
    Match(Vec<Clause>),
    Sort { field: Field, ascending: bool },
    Skip(u64),
    Limit(u64),
}

impl Stage {
    fn to_document(&self) -> Value {
        match self {
            Stage::Search(search) => json!({
                "$search": {
                    "index": "name",
                    "compound": {
                        "should": [
                            {
                                "text": {
                                    "query": search.query,
                                    "path": "name",
                                    "score": { "boost": { "value": search.exact_boost } }
                                }
                            },
                            {
                                "text": {
                                    "query": search.query,
                                    "path": "name",
                                    "fuzzy": {
                                        "maxEdits": search.fuzzy.max_edits,
                                        "prefixLength": search.fuzzy.prefix_length,
                                        "maxExpansions": search.fuzzy.max_expansions
                                    }
                                }
                            }
                        ]
                    }
                }
            }),
            Stage::Match(clauses) => {
                let clauses: Vec<Value> = clauses.iter().map(Clause::to_document).collect();
                json!({ "$match": { "$and": clauses } })
            }
            Stage::Sort { field, ascending } => {
                let direction = if *ascending { 1 } else { -1 };
                json!({ "$sort": { field.path(): direction } })
            }
            Stage::Skip(n) => json!({ "$skip": n }),
            Stage::Limit(n) => json!({ "$limit": n }),
        }
    }
}

/// Ordered stages executed by a [`super::ProductSource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn search(&self) -> Option<&SearchStage> {
        self.stages.iter().find_map(|s| match s {
            Stage::Search(search) => Some(search),
            _ => None,
        })
    }

    /// All match clauses across every match stage, in order.
    pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
        self.stages
            .iter()
            .filter_map(|s| match s {
                Stage::Match(clauses) => Some(clauses.iter()),
                _ => None,
            })
            .flatten()
    }

    #[must_use]
    pub fn sort(&self) -> Option<(Field, bool)> {
        self.stages.iter().find_map(|s| match s {
            Stage::Sort { field, ascending } => Some((*field, *ascending)),
            _ => None,
        })
    }

    #[must_use]
    pub fn skip(&self) -> u64 {
        self.stages
            .iter()
            .filter_map(|s| match s {
                Stage::Skip(n) => Some(*n),
                _ => None,
            })
            .sum()
    }

    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.stages
            .iter()
            .filter_map(|s| match s {
                Stage::Limit(n) => Some(*n),
                _ => None,
            })
            .min()
    }

    /// Render as aggregation-pipeline JSON, the shape a document store
    /// collaborator consumes.
    #[must_use]
    pub fn to_document(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::to_document).collect())
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}
