//! Compiles a product [`Pipeline`] into a single Postgres statement.
//!
//! Pipelines are treated as flat: every match clause joins one `WHERE`, the
//! search stage contributes a relevance score, and sort/skip/limit become
//! `ORDER BY`/`OFFSET`/`LIMIT`. Filters commute, so this is equivalent to
//! running the stages in order for every pipeline the query builder emits.

use snublejuice_core::{Clause, CompareOp, Field, Pipeline, SearchStage};
use sqlx::{Postgres, QueryBuilder};

pub(crate) const PRODUCT_COLUMNS: &str = "product_index, name, url, category, subcategory, \
     country, year, price, oldprice, prices, discount, volume, literprice, alcohol, \
     alcoholprice, buyable, orderable, instores, updated, stores, rating_value, rating_count, \
     rating_updated, tf_index, tf_name, tf_url, tf_price, tf_oldprice, tf_prices, tf_discount, \
     tf_literprice, tf_alcoholprice, tf_updated, tf_stores";

/// Splits a lowercased name into words for fuzzy matching.
const NAME_WORD_SEPARATOR: &str = "'[^0-9a-zA-Zà-öø-ÿÀ-ÖØ-Þ]+'";

pub(crate) fn column(field: Field) -> &'static str {
    match field {
        Field::Index => "product_index",
        Field::Name => "name",
        Field::Category => "category",
        Field::Country => "country",
        Field::Year => "year",
        Field::Volume => "volume",
        Field::Alcohol => "alcohol",
        Field::RatingValue => "rating_value",
        Field::Price => "price",
        Field::OldPrice => "oldprice",
        Field::Discount => "discount",
        Field::LiterPrice => "literprice",
        Field::AlcoholPrice => "alcoholprice",
        Field::Buyable => "buyable",
        Field::Orderable => "orderable",
        Field::Instores => "instores",
        Field::Updated => "updated",
        Field::Stores => "stores",
        Field::TaxfreePrice => "tf_price",
        Field::TaxfreeOldPrice => "tf_oldprice",
        Field::TaxfreeDiscount => "tf_discount",
        Field::TaxfreeLiterPrice => "tf_literprice",
        Field::TaxfreeAlcoholPrice => "tf_alcoholprice",
        Field::TaxfreeUpdated => "tf_updated",
        Field::TaxfreeStores => "tf_stores",
    }
}

fn operator(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => " = ",
        CompareOp::Lte => " <= ",
        CompareOp::Gte => " >= ",
        CompareOp::Gt => " > ",
    }
}

/// Escape `%`, `_` and `\` so the needle matches literally inside `ILIKE`.
pub(crate) fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn saturating_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// `SELECT` of full product rows for `pipeline`.
pub(crate) fn select_products(pipeline: &Pipeline) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(PRODUCT_COLUMNS);
    qb.push(" FROM products");
    push_where(&mut qb, pipeline);

    if let Some((field, ascending)) = pipeline.sort() {
        // Missing values order lowest, as in the document store.
        let direction = if ascending {
            " ASC NULLS FIRST"
        } else {
            " DESC NULLS LAST"
        };
        qb.push(" ORDER BY ");
        qb.push(column(field));
        qb.push(direction);
        qb.push(", product_index");
    } else if let Some(search) = pipeline.search() {
        qb.push(" ORDER BY ");
        push_score(&mut qb, search);
        qb.push(" DESC, product_index");
    } else {
        qb.push(" ORDER BY product_index");
    }

    let skip = pipeline.skip();
    if skip > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(saturating_i64(skip));
    }
    if let Some(limit) = pipeline.limit() {
        qb.push(" LIMIT ");
        qb.push_bind(saturating_i64(limit));
    }

    qb
}

/// `SELECT COUNT(*)` over the pipeline's filters. Sort and window stages are
/// ignored.
pub(crate) fn count_products(pipeline: &Pipeline) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM products");
    push_where(&mut qb, pipeline);
    qb
}

fn push_where(qb: &mut QueryBuilder<'static, Postgres>, pipeline: &Pipeline) {
    qb.push(" WHERE TRUE");

    if let Some(search) = pipeline.search() {
        let terms = search.terms();
        if terms.is_empty() {
            qb.push(" AND FALSE");
        }
        for (i, term) in terms.iter().enumerate() {
            qb.push(if i == 0 { " AND ((" } else { " OR (" });
            push_exact(qb, term);
            qb.push(" OR ");
            push_fuzzy(qb, search, term);
            qb.push(")");
        }
        if !terms.is_empty() {
            qb.push(")");
        }
    }

    for clause in pipeline.clauses() {
        qb.push(" AND ");
        push_clause(qb, clause);
    }
}

/// Relevance of `name`: per query term, the boost when a name word contains
/// it plus one when a name word is within the fuzzy edit budget.
fn push_score(qb: &mut QueryBuilder<'static, Postgres>, search: &SearchStage) {
    qb.push("(0");
    for term in search.terms() {
        qb.push(" + CASE WHEN ");
        push_exact(qb, &term);
        qb.push(" THEN ");
        qb.push_bind(search.exact_boost);
        qb.push(" ELSE 0 END + CASE WHEN ");
        push_fuzzy(qb, search, &term);
        qb.push(" THEN 1 ELSE 0 END");
    }
    qb.push(")");
}

fn push_exact(qb: &mut QueryBuilder<'static, Postgres>, term: &str) {
    qb.push("name ILIKE ");
    qb.push_bind(format!("%{}%", escape_like(term)));
}

/// Some name word shares the term's leading characters and lies within
/// `max_edits` Levenshtein edits of it.
fn push_fuzzy(qb: &mut QueryBuilder<'static, Postgres>, search: &SearchStage, term: &str) {
    let prefix = i32::from(search.fuzzy.prefix_length);
    qb.push("EXISTS (SELECT 1 FROM regexp_split_to_table(lower(name), ");
    qb.push(NAME_WORD_SEPARATOR);
    qb.push(") AS w(word) WHERE left(w.word, ");
    qb.push_bind(prefix);
    qb.push(") = left(");
    qb.push_bind(term.to_string());
    qb.push(", ");
    qb.push_bind(prefix);
    qb.push(") AND levenshtein(w.word, ");
    qb.push_bind(term.to_string());
    qb.push(") <= ");
    qb.push_bind(i32::from(search.fuzzy.max_edits));
    qb.push(")");
}

fn push_clause(qb: &mut QueryBuilder<'static, Postgres>, clause: &Clause) {
    match clause {
        Clause::Flag(field, value) => {
            qb.push(column(*field));
            qb.push(" = ");
            qb.push_bind(*value);
        }
        Clause::Equals(field, value) => {
            qb.push(column(*field));
            qb.push(" = ");
            qb.push_bind(value.clone());
        }
        Clause::Compare(field, op, bound) => {
            qb.push(column(*field));
            qb.push(operator(*op));
            qb.push_bind(*bound);
        }
        Clause::Present(field) => {
            qb.push(column(*field));
            qb.push(" IS NOT NULL");
        }
        Clause::Contains(field, value) => {
            qb.push_bind(value.clone());
            qb.push(" = ANY(");
            qb.push(column(*field));
            qb.push(")");
        }
        Clause::WordMatch(field, needle) => {
            qb.push("EXISTS (SELECT 1 FROM unnest(");
            qb.push(column(*field));
            qb.push(") AS s(store) WHERE s.store ~* ");
            qb.push_bind(snublejuice_core::word_pattern(needle));
            qb.push(")");
        }
        Clause::IndexIn(indices) => {
            qb.push("product_index = ANY(");
            qb.push_bind(indices.clone());
            qb.push(")");
        }
    }
}
