//! Property-Based Tests for Page Arithmetic
//!
//! # Test Properties
//!
//! 1. **Page Count**: `total_pages == ceil(total / page_size)`
//! 2. **Continuation**: `has_more` holds exactly when a later page exists
//! 3. **Bounded Rows**: a page never carries more than `page_size` rows
//! 4. **Coverage**: the pages `1..=total_pages` tile every row exactly once

#![cfg(test)]

use proptest::prelude::*;

use super::model::{total_pages, PaginatedResult, Row};

fn rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| Row::new(format!("row-{}", i + 1), i as i64 + 1))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_total_pages_is_ceiling(
        total in 0u64..1_000_000,
        page_size in 0u64..5_000,
    ) {
        let size = page_size.max(1);
        let pages = total_pages(total, page_size);
        prop_assert!(pages * size >= total);
        prop_assert!(pages == 0 || (pages - 1) * size < total);
        prop_assert_eq!(pages == 0, total == 0);
    }

    #[test]
    fn prop_pagination_math(
        total in 0u64..100_000,
        page in 1u64..10_000,
        page_size in 1u64..2_000,
        supplied in 0usize..2_500,
    ) {
        let result = PaginatedResult::new(rows(supplied), total, page, page_size);
        prop_assert_eq!(result.total_pages, total_pages(total, page_size));
        prop_assert_eq!(result.has_more, page < result.total_pages);
        prop_assert_eq!(result.rows.len(), supplied.min(page_size as usize));
        prop_assert!(result.rows.len() as u64 <= result.page_size);
    }

    #[test]
    fn prop_pages_tile_every_row(
        total in 0u64..5_000,
        page_size in 1u64..300,
    ) {
        let pages = total_pages(total, page_size);
        let mut covered = 0;
        for page in 1..=pages {
            let offset = (page - 1) * page_size;
            let on_page = page_size.min(total - offset);
            prop_assert!(on_page > 0);
            let result = PaginatedResult::new(rows(on_page as usize), total, page, page_size);
            prop_assert_eq!(result.has_more, page != pages);
            covered += result.rows.len() as u64;
        }
        prop_assert_eq!(covered, total);
    }
}
