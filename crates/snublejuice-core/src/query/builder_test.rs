use chrono::{TimeZone, Utc};

use super::*;
use crate::metadata::{Channel, StockMetadata};
use crate::query::SortKey;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).expect("date")
}

fn metadata() -> Metadata {
    Metadata {
        stock: StockMetadata {
            vinmonopolet: Some(Utc.with_ymd_and_hms(2026, 10, 16, 5, 0, 0).unwrap()),
            taxfree: Some(Utc.with_ymd_and_hms(2026, 10, 14, 5, 0, 0).unwrap()),
            ..StockMetadata::default()
        },
        ..Metadata::default()
    }
}

fn build(query: &ProductQuery) -> BuiltQuery {
    build_pipeline(query, &metadata(), today())
}

fn main_clauses(built: &BuiltQuery) -> Vec<Clause> {
    built
        .pipeline
        .stages()
        .iter()
        .rev()
        .find_map(|s| match s {
            Stage::Match(clauses) => Some(clauses.clone()),
            _ => None,
        })
        .expect("combined match stage")
}

#[test]
fn default_request_filters_availability_and_sorts() {
    let built = build(&ProductQuery::default());
    let clauses = main_clauses(&built);

    assert_eq!(
        clauses,
        vec![
            Clause::Flag(Field::Updated, true),
            Clause::Flag(Field::Buyable, true),
            Clause::Flag(Field::Orderable, true),
            Clause::Present(Field::Alcohol),
            Clause::Compare(Field::Alcohol, CompareOp::Gt, 0.0),
            Clause::Present(Field::Discount),
        ]
    );
    assert_eq!(built.pipeline.sort(), Some((Field::Discount, true)));
    assert_eq!(built.pipeline.skip(), 0);
    assert_eq!(built.pipeline.limit(), Some(15));
    assert!(built.count.is_some());
    assert!(built.updated.is_none(), "default branch has no freshness label");
}

#[test]
fn search_suppresses_structured_filters_and_sort() {
    let mut query = ProductQuery::default();
    query.search = Some("barolo".to_string());
    query.category = Some("Rødvin".to_string());
    query.country = Some("Italia".to_string());
    query.store = Some("Oslo, Vika".to_string());
    query.price = RangeFilter::new(200.0, false);

    let built = build(&query);
    assert!(matches!(built.pipeline.stages()[0], Stage::Search(_)));
    assert_eq!(
        main_clauses(&built),
        vec![
            Clause::Flag(Field::Updated, true),
            Clause::Flag(Field::Buyable, true),
        ]
    );
    assert!(built.pipeline.sort().is_none());
    assert_eq!(built.updated.as_deref(), Some("i går"));
}

#[test]
fn search_gates_off_storelike() {
    let mut query = ProductQuery::default();
    query.search = Some("akevitt".to_string());
    query.storelike = Some("Bergen".to_string());

    let built = build(&query);
    assert!(!built
        .pipeline
        .clauses()
        .any(|c| matches!(c, Clause::WordMatch(..))));
}

#[test]
fn storelike_adds_word_match_and_suppresses_store() {
    let mut query = ProductQuery::default();
    query.storelike = Some("Trondheim".to_string());
    query.store = Some("Trondheim, Solsiden".to_string());

    let built = build(&query);
    assert_eq!(
        built.pipeline.stages()[0],
        Stage::Match(vec![Clause::WordMatch(
            Field::Stores,
            "Trondheim".to_string()
        )])
    );
    let clauses = main_clauses(&built);
    assert!(!clauses.iter().any(|c| matches!(c, Clause::Contains(..))));
    assert!(!clauses.contains(&Clause::Flag(Field::Orderable, true)));
}

#[test]
fn favourites_restrict_indices_and_skip_buyable() {
    let mut query = ProductQuery::default();
    query.favourites = Some(vec![10, 20, 30]);
    query.storelike = Some("Oslo".to_string());

    let built = build(&query);
    assert_eq!(
        built.pipeline.stages()[0],
        Stage::Match(vec![Clause::IndexIn(vec![10, 20, 30])])
    );
    let clauses = main_clauses(&built);
    assert!(!clauses.contains(&Clause::Flag(Field::Buyable, true)));
    assert!(!clauses.contains(&Clause::Flag(Field::Orderable, true)));
    assert!(!built
        .pipeline
        .clauses()
        .any(|c| matches!(c, Clause::WordMatch(..))));
}

#[test]
fn store_selection_replaces_default_availability() {
    let mut query = ProductQuery::default();
    query.store = Some("Bergen, Valkendorfsgt.".to_string());
    query.instores = true;

    let built = build(&query);
    let clauses = main_clauses(&built);
    assert!(clauses.contains(&Clause::Contains(
        Field::Stores,
        "Bergen, Valkendorfsgt.".to_string()
    )));
    assert!(!clauses.contains(&Clause::Flag(Field::Orderable, true)));
    assert!(!clauses.contains(&Clause::Flag(Field::Instores, true)));
    assert_eq!(built.updated.as_deref(), Some("i går"));
}

#[test]
fn instores_flag_applies_in_default_branch() {
    let mut query = ProductQuery::default();
    query.instores = true;
    query.orderable = false;

    let clauses = main_clauses(&build(&query));
    assert!(clauses.contains(&Clause::Flag(Field::Instores, true)));
    assert!(!clauses.contains(&Clause::Flag(Field::Orderable, true)));
}

#[test]
fn taxfree_uses_overlay_fields() {
    let mut query = ProductQuery::new(Channel::Taxfree);
    query.store = Some("Oslo lufthavn".to_string());
    query.storelike = Some("Oslo".to_string());
    query.sort = SortKey::Price;
    query.price = RangeFilter::new(300.0, false);

    let built = build(&query);
    let clauses = main_clauses(&built);

    assert_eq!(clauses[0], Clause::Flag(Field::TaxfreeUpdated, true));
    assert!(!clauses.contains(&Clause::Flag(Field::Buyable, true)));
    assert!(clauses.contains(&Clause::Contains(
        Field::TaxfreeStores,
        "Oslo lufthavn".to_string()
    )));
    assert!(clauses.contains(&Clause::Compare(
        Field::TaxfreePrice,
        CompareOp::Lte,
        300.0
    )));
    assert!(clauses.contains(&Clause::Present(Field::TaxfreePrice)));
    assert_eq!(built.pipeline.sort(), Some((Field::TaxfreePrice, true)));
    assert!(!built
        .pipeline
        .clauses()
        .any(|c| matches!(c, Clause::WordMatch(..))));
    assert_eq!(built.updated.as_deref(), Some("for 3 dager siden"));
}

#[test]
fn taxfree_alcohol_sort_stays_top_level() {
    let mut query = ProductQuery::new(Channel::Taxfree);
    query.sort = SortKey::Alcohol;
    let built = build(&query);
    assert_eq!(built.pipeline.sort(), Some((Field::Alcohol, true)));
}

#[test]
fn range_filters_choose_operator_by_field_and_exactness() {
    let mut query = ProductQuery::default();
    query.price = RangeFilter::new(100.0, true);
    query.volume = RangeFilter::new(70.0, false);
    query.alcohol = RangeFilter::new(40.0, false);
    query.year = RangeFilter::new(2015.0, false);

    let clauses = main_clauses(&build(&query));
    assert!(clauses.contains(&Clause::Compare(Field::Price, CompareOp::Eq, 100.0)));
    assert!(clauses.contains(&Clause::Compare(Field::Volume, CompareOp::Gte, 70.0)));
    assert!(clauses.contains(&Clause::Compare(Field::Alcohol, CompareOp::Gte, 40.0)));
    assert!(clauses.contains(&Clause::Compare(Field::Year, CompareOp::Lte, 2015.0)));

    query.price = RangeFilter::new(100.0, false);
    query.year = RangeFilter::new(2015.0, true);
    let clauses = main_clauses(&build(&query));
    assert!(clauses.contains(&Clause::Compare(Field::Price, CompareOp::Lte, 100.0)));
    assert!(clauses.contains(&Clause::Compare(Field::Year, CompareOp::Eq, 2015.0)));
}

#[test]
fn alcohol_floor_and_nonalcoholic_exclusion_coexist() {
    let mut query = ProductQuery::default();
    query.alcohol = RangeFilter::new(4.5, false);

    let clauses = main_clauses(&build(&query));
    let alcohol: Vec<&Clause> = clauses
        .iter()
        .filter(|c| {
            matches!(c, Clause::Compare(Field::Alcohol, ..) | Clause::Present(Field::Alcohol))
        })
        .collect();
    assert_eq!(alcohol.len(), 3, "floor, presence and positivity: {alcohol:?}");
}

#[test]
fn nonalcoholic_drops_alcohol_requirement() {
    let mut query = ProductQuery::default();
    query.nonalcoholic = true;
    let clauses = main_clauses(&build(&query));
    assert!(!clauses.contains(&Clause::Present(Field::Alcohol)));
}

#[test]
fn rating_sort_requires_rating_value() {
    let mut query = ProductQuery::default();
    query.sort = SortKey::Rating;
    query.ascending = false;
    let built = build(&query);
    assert!(main_clauses(&built).contains(&Clause::Present(Field::RatingValue)));
    assert_eq!(built.pipeline.sort(), Some((Field::RatingValue, false)));
}

#[test]
fn page_window_uses_one_indexed_pages() {
    let mut query = ProductQuery::default();
    query.page = 3;
    query.per_page = 20;
    let built = build(&query);
    assert_eq!(built.pipeline.skip(), 40);
    assert_eq!(built.pipeline.limit(), Some(20));

    query.page = 0;
    query.per_page = 0;
    let built = build(&query);
    assert_eq!(built.pipeline.skip(), 0);
    assert_eq!(built.pipeline.limit(), Some(1));
}

#[test]
fn count_pipeline_excludes_sort_and_window() {
    let built = build(&ProductQuery::default());
    let count = built.count.expect("fresh request counts");
    assert!(count.sort().is_none());
    assert_eq!(count.limit(), None);
    assert_eq!(count.skip(), 0);

    let mut query = ProductQuery::default();
    query.fresh = false;
    assert!(build(&query).count.is_none());
}

#[test]
fn missing_stock_date_leaves_label_unset() {
    let mut query = ProductQuery::default();
    query.store = Some("Molde".to_string());
    let built = build_pipeline(&query, &Metadata::default(), today());
    assert!(built.updated.is_none());
}
