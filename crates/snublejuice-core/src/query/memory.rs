//! In-process [`ProductSource`] with document-store matching semantics.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};

use crate::products::Product;

use super::field::Field;
use super::load::{ProductSource, SourceError};
use super::pipeline::{search_tokens, word_pattern, Clause, Pipeline, SearchStage, Stage};

/// A product collection held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    products: Vec<Product>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Insert or replace a product by index.
    pub fn upsert(&mut self, product: Product) {
        match self.products.iter_mut().find(|p| p.index == product.index) {
            Some(existing) => *existing = product,
            None => self.products.push(product),
        }
    }

    fn run(&self, pipeline: &Pipeline) -> Result<Vec<&Product>, SourceError> {
        let mut rows: Vec<(&Product, f64)> = self.products.iter().map(|p| (p, 0.0)).collect();

        for stage in pipeline.stages() {
            match stage {
                Stage::Search(search) => {
                    rows = rows
                        .into_iter()
                        .filter_map(|(p, _)| {
                            let score = search_score(search, &p.name);
                            (score > 0.0).then_some((p, score))
                        })
                        .collect();
                    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.index.cmp(&b.0.index)));
                }
                Stage::Match(clauses) => {
                    let compiled = clauses
                        .iter()
                        .map(Compiled::new)
                        .collect::<Result<Vec<_>, _>>()?;
                    rows.retain(|(p, _)| compiled.iter().all(|c| c.matches(p)));
                }
                Stage::Sort { field, ascending } => {
                    rows.sort_by(|a, b| {
                        let ord = compare_field(a.0, b.0, *field);
                        let ord = if *ascending { ord } else { ord.reverse() };
                        ord.then(a.0.index.cmp(&b.0.index))
                    });
                }
                Stage::Skip(n) => {
                    let n = usize::try_from(*n).unwrap_or(usize::MAX);
                    rows = rows.into_iter().skip(n).collect();
                }
                Stage::Limit(n) => {
                    rows.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
                }
            }
        }

        Ok(rows.into_iter().map(|(p, _)| p).collect())
    }
}

impl ProductSource for MemoryCatalog {
    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Product>, SourceError> {
        Ok(self.run(pipeline)?.into_iter().cloned().collect())
    }

    async fn count(&self, pipeline: &Pipeline) -> Result<u64, SourceError> {
        let matched = self.run(pipeline)?.len();
        Ok(u64::try_from(matched).unwrap_or(u64::MAX))
    }
}

/// A clause with its word-match regex compiled once per stage.
struct Compiled<'a> {
    clause: &'a Clause,
    word: Option<Regex>,
}

impl<'a> Compiled<'a> {
    fn new(clause: &'a Clause) -> Result<Self, SourceError> {
        let word = match clause {
            Clause::WordMatch(_, needle) => Some(
                RegexBuilder::new(&word_pattern(needle))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| SourceError::Backend(Box::new(e)))?,
            ),
            _ => None,
        };
        Ok(Self { clause, word })
    }

    fn matches(&self, product: &Product) -> bool {
        match self.clause {
            Clause::Flag(field, expected) => flag(product, *field) == Some(*expected),
            Clause::Equals(field, expected) => text(product, *field) == Some(expected.as_str()),
            Clause::Compare(field, op, bound) => {
                number(product, *field).is_some_and(|v| op.test(v, *bound))
            }
            Clause::Present(field) => is_present(product, *field),
            Clause::Contains(field, expected) => {
                list(product, *field).is_some_and(|items| items.iter().any(|s| s == expected))
            }
            Clause::WordMatch(field, _) => self.word.as_ref().is_some_and(|re| {
                list(product, *field).is_some_and(|items| items.iter().any(|s| re.is_match(s)))
            }),
            Clause::IndexIn(indices) => indices.contains(&product.index),
        }
    }
}

fn number(product: &Product, field: Field) -> Option<f64> {
    let overlay = product.taxfree.as_ref();
    match field {
        #[allow(clippy::cast_precision_loss)]
        Field::Index => Some(product.index as f64),
        Field::Year => product.year.map(f64::from),
        Field::Volume => product.volume,
        Field::Alcohol => product.alcohol,
        Field::RatingValue => product.rating.as_ref().and_then(|r| r.value),
        Field::Price => product.price,
        Field::OldPrice => product.oldprice,
        Field::Discount => product.discount,
        Field::LiterPrice => product.literprice,
        Field::AlcoholPrice => product.alcoholprice,
        Field::TaxfreePrice => overlay.and_then(|t| t.price),
        Field::TaxfreeOldPrice => overlay.and_then(|t| t.oldprice),
        Field::TaxfreeDiscount => overlay.and_then(|t| t.discount),
        Field::TaxfreeLiterPrice => overlay.and_then(|t| t.literprice),
        Field::TaxfreeAlcoholPrice => overlay.and_then(|t| t.alcoholprice),
        _ => None,
    }
}

fn flag(product: &Product, field: Field) -> Option<bool> {
    match field {
        Field::Buyable => Some(product.buyable),
        Field::Orderable => Some(product.orderable),
        Field::Instores => Some(product.instores),
        Field::Updated => Some(product.updated),
        Field::TaxfreeUpdated => product.taxfree.as_ref().map(|t| t.updated),
        _ => None,
    }
}

fn text(product: &Product, field: Field) -> Option<&str> {
    match field {
        Field::Name => Some(product.name.as_str()),
        Field::Category => product.category.as_deref(),
        Field::Country => product.country.as_deref(),
        _ => None,
    }
}

fn list(product: &Product, field: Field) -> Option<&[String]> {
    match field {
        Field::Stores => Some(product.stores.as_slice()),
        Field::TaxfreeStores => product.taxfree.as_ref().map(|t| t.stores.as_slice()),
        _ => None,
    }
}

fn is_present(product: &Product, field: Field) -> bool {
    number(product, field).is_some()
        || flag(product, field).is_some()
        || text(product, field).is_some()
        || list(product, field).is_some()
}

/// Ordering for one field, with missing values first as in the document
/// store.
fn compare_field(a: &Product, b: &Product, field: Field) -> Ordering {
    if let (Some(x), Some(y)) = (text(a, field), text(b, field)) {
        return x.cmp(y);
    }
    match (number(a, field), number(b, field)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Relevance of `name` for a search: each query token scores the boost when
/// a name token contains it, plus one when a name token is within the fuzzy
/// edit budget.
fn search_score(search: &SearchStage, name: &str) -> f64 {
    let name_tokens = search_tokens(name);
    let prefix = usize::from(search.fuzzy.prefix_length);
    let max_edits = usize::from(search.fuzzy.max_edits);

    search
        .terms()
        .iter()
        .map(|q| {
            let exact = name_tokens.iter().any(|t| t.contains(q.as_str()));
            let fuzzy = name_tokens.iter().any(|t| {
                t.chars().take(prefix).eq(q.chars().take(prefix)) && levenshtein(t, q) <= max_edits
            });
            let mut score = 0.0;
            if exact {
                score += search.exact_boost;
            }
            if fuzzy {
                score += 1.0;
            }
            score
        })
        .sum()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
