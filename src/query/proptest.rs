//! Property-Based Tests for Cache Key Determinism
//!
//! # Test Properties
//!
//! 1. **Determinism**: compiling twice yields the same key
//! 2. **Order Independence**: permuting filters yields the same key
//! 3. **Sensitivity**: changing any single field yields a different key

#![cfg(test)]

use proptest::prelude::*;

use super::compiler::{KeyScope, PredicateCompiler, QueryParams};
use crate::domain::{BlockId, Filter, FilterOperator, Sort, Value};

const NS: &str = "grid:v1";

// =============================================================================
// Property Strategies
// =============================================================================

fn ident_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[A-Za-z0-9 :|,]{1,12}".prop_map(Value::Text),
        (-1000i64..1000).prop_map(Value::from),
    ]
}

fn filter_strategy() -> impl Strategy<Value = Filter> {
    (
        ident_strategy(),
        prop_oneof![
            Just(FilterOperator::Equals),
            Just(FilterOperator::NotEquals),
            Just(FilterOperator::GreaterThan),
            Just(FilterOperator::LessThan),
        ],
        value_strategy(),
    )
        .prop_map(|(column, op, value)| Filter::new(column, op, value))
}

fn sort_strategy() -> impl Strategy<Value = Sort> {
    (ident_strategy(), any::<bool>()).prop_map(|(column, asc)| {
        if asc {
            Sort::asc(column)
        } else {
            Sort::desc(column)
        }
    })
}

fn params_strategy() -> impl Strategy<Value = QueryParams> {
    (
        prop::collection::vec(filter_strategy(), 0..5),
        prop::collection::vec(sort_strategy(), 0..3),
        prop::option::of("[a-z]{1,8}"),
    )
        .prop_map(|(filters, sorts, search)| QueryParams {
            filters,
            sorts,
            search,
        })
}

fn key_for(block: &str, params: &QueryParams, page: u64, page_size: u64) -> String {
    PredicateCompiler::new(NS)
        .compile(
            &BlockId::new(block),
            params,
            KeyScope::Page { page, page_size },
        )
        .unwrap()
        .key
        .as_str()
        .to_string()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_key_is_deterministic(
        block in ident_strategy(),
        params in params_strategy(),
        page in 1u64..100,
        page_size in 1u64..500,
    ) {
        prop_assert_eq!(
            key_for(&block, &params, page, page_size),
            key_for(&block, &params, page, page_size)
        );
    }

    #[test]
    fn prop_filter_permutation_is_irrelevant(
        params in params_strategy(),
        rotate in 0usize..5,
    ) {
        let mut permuted = params.clone();
        if !permuted.filters.is_empty() {
            let n = rotate % permuted.filters.len();
            permuted.filters.rotate_left(n);
            permuted.filters.reverse();
        }
        prop_assert_eq!(key_for("orders", &params, 1, 50), key_for("orders", &permuted, 1, 50));
    }

    #[test]
    fn prop_page_fields_change_key(
        params in params_strategy(),
        page in 1u64..100,
        page_size in 1u64..500,
    ) {
        let base = key_for("orders", &params, page, page_size);
        prop_assert_ne!(&base, &key_for("orders", &params, page + 1, page_size));
        prop_assert_ne!(&base, &key_for("orders", &params, page, page_size + 1));
        prop_assert_ne!(&base, &key_for("orders_b", &params, page, page_size));
    }

    #[test]
    fn prop_new_filter_changes_key(
        params in params_strategy(),
        extra in filter_strategy(),
    ) {
        let already_present = params.filters.iter().any(|f| f == &extra);
        prop_assume!(!already_present);

        let mut extended = params.clone();
        extended.filters.push(extra);
        prop_assert_ne!(key_for("orders", &params, 1, 50), key_for("orders", &extended, 1, 50));
    }

    #[test]
    fn prop_search_changes_key(
        params in params_strategy(),
        term in "[a-z]{1,8}",
    ) {
        let mut changed = params.clone();
        let new_term = match &params.search {
            Some(existing) => format!("{}{}", existing, term),
            None => term,
        };
        changed.search = Some(new_term);
        prop_assert_ne!(key_for("orders", &params, 1, 50), key_for("orders", &changed, 1, 50));
    }

    #[test]
    fn prop_sort_direction_changes_key(
        params in params_strategy(),
        sort in sort_strategy(),
    ) {
        let mut a = params.clone();
        a.sorts.push(sort.clone());
        let mut b = params;
        let flipped = match sort.direction {
            crate::domain::SortDirection::Ascending => Sort::desc(sort.column_id.as_str()),
            crate::domain::SortDirection::Descending => Sort::asc(sort.column_id.as_str()),
        };
        b.sorts.push(flipped);
        prop_assert_ne!(key_for("orders", &a, 1, 50), key_for("orders", &b, 1, 50));
    }
}
