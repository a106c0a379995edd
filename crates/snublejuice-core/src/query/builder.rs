use chrono::NaiveDate;
use serde::Serialize;

use crate::metadata::{freshness_label, Metadata};

use super::field::Field;
use super::pipeline::{Clause, CompareOp, Pipeline, SearchStage, Stage};
use super::{ProductQuery, RangeFilter};

/// Output of [`build_pipeline`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltQuery {
    /// Full pipeline including sort and page window.
    pub pipeline: Pipeline,
    /// Filtering stages only, present when the request wants a page count.
    pub count: Option<Pipeline>,
    /// How long ago the channel's stock was refreshed, computed whenever the
    /// default availability filters are not in effect.
    pub updated: Option<String>,
}

/// Which optional clauses a request turns on. Every guard is evaluated from
/// the request alone so clause order never changes meaning.
struct Guards<'a> {
    query: &'a ProductQuery,
}

impl Guards<'_> {
    fn taxfree(&self) -> bool {
        self.query.channel.is_taxfree()
    }

    fn searching(&self) -> bool {
        self.query.is_search()
    }

    fn has_favourites(&self) -> bool {
        self.query.favourites.is_some()
    }

    fn has_storelike(&self) -> bool {
        self.query.storelike.is_some()
    }

    fn storelike(&self) -> bool {
        self.has_storelike() && !self.has_favourites() && !self.taxfree() && !self.searching()
    }

    fn buyable(&self) -> bool {
        !self.has_favourites() && !self.taxfree()
    }

    fn structured(&self) -> bool {
        !self.searching()
    }

    fn store(&self) -> bool {
        if self.query.store.is_none() || self.searching() {
            return false;
        }
        self.taxfree() || !self.has_storelike()
    }

    fn default_availability(&self) -> bool {
        self.query.store.is_none()
            && !self.has_storelike()
            && !self.searching()
            && !self.has_favourites()
            && !self.taxfree()
    }
}

/// Translate a listing request into the pipeline that answers it.
///
/// Stage order: optional name search, optional store-name word match,
/// optional favourites restriction, one combined match, then sort (skipped for
/// searches, which keep relevance order) and the page window.
#[must_use]
pub fn build_pipeline(query: &ProductQuery, metadata: &Metadata, today: NaiveDate) -> BuiltQuery {
    let guards = Guards { query };
    let channel = query.channel;
    let sort_field = query.sort.resolve(channel);

    let mut pipeline = Pipeline::new();

    if let Some(search) = &query.search {
        pipeline.push(Stage::Search(SearchStage::new(search.clone())));
    }

    if guards.storelike() {
        if let Some(storelike) = &query.storelike {
            pipeline.push(Stage::Match(vec![Clause::WordMatch(
                Field::Stores,
                storelike.clone(),
            )]));
        }
    }

    if let Some(favourites) = &query.favourites {
        pipeline.push(Stage::Match(vec![Clause::IndexIn(favourites.clone())]));
    }

    let mut clauses = vec![Clause::Flag(Field::Updated.for_channel(channel), true)];

    if guards.buyable() {
        clauses.push(Clause::Flag(Field::Buyable, true));
    }

    if guards.structured() {
        if let Some(category) = &query.category {
            clauses.push(Clause::Equals(Field::Category, category.clone()));
        }
        if let Some(country) = &query.country {
            clauses.push(Clause::Equals(Field::Country, country.clone()));
        }
    }

    if guards.store() {
        if let Some(store) = &query.store {
            clauses.push(Clause::Contains(
                Field::Stores.for_channel(channel),
                store.clone(),
            ));
        }
    }

    let mut updated = None;
    if guards.default_availability() {
        if query.orderable {
            clauses.push(Clause::Flag(Field::Orderable, true));
        }
        if query.instores {
            clauses.push(Clause::Flag(Field::Instores, true));
        }
    } else {
        updated = metadata
            .stock_updated(channel)
            .map(|at| freshness_label(today, at));
    }

    if guards.structured() {
        push_range(
            &mut clauses,
            Field::Price.for_channel(channel),
            query.price,
            CompareOp::Lte,
        );
        push_range(&mut clauses, Field::Volume, query.volume, CompareOp::Gte);
        push_range(&mut clauses, Field::Alcohol, query.alcohol, CompareOp::Gte);
        push_range(&mut clauses, Field::Year, query.year, CompareOp::Lte);

        if !query.nonalcoholic {
            clauses.push(Clause::Present(Field::Alcohol));
            clauses.push(Clause::Compare(Field::Alcohol, CompareOp::Gt, 0.0));
        }

        clauses.push(Clause::Present(sort_field));
    }

    pipeline.push(Stage::Match(clauses));

    let count = query.fresh.then(|| pipeline.clone());

    if !guards.searching() {
        pipeline.push(Stage::Sort {
            field: sort_field,
            ascending: query.ascending,
        });
    }
    pipeline.push(Stage::Skip(query.offset()));
    pipeline.push(Stage::Limit(query.per_page()));

    tracing::debug!(
        channel = %channel,
        stages = pipeline.stages().len(),
        search = query.is_search(),
        "built product pipeline"
    );

    BuiltQuery {
        pipeline,
        count,
        updated,
    }
}

fn push_range(clauses: &mut Vec<Clause>, field: Field, filter: RangeFilter, bound: CompareOp) {
    if let Some(value) = filter.active() {
        let op = if filter.exact { CompareOp::Eq } else { bound };
        clauses.push(Clause::Compare(field, op, value));
    }
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod tests;
