//! The row pipeline: filter → sort → paginate.
//!
//! Each stage is a pure function over borrowed items, so the table never
//! copies the snapshot it was given.

use crate::column::{Column, Direction, Sort};
use tabula_storage::RemoteItem;

/// Keep items whose display name contains `text`, ignoring case.
/// Empty text keeps everything.
pub fn filter<'a>(items: impl IntoIterator<Item = &'a RemoteItem>, text: &str) -> Vec<&'a RemoteItem> {
    if text.is_empty() {
        return items.into_iter().collect();
    }
    let needle = text.to_lowercase();
    items.into_iter().filter(|item| item.name.to_lowercase().contains(&needle)).collect()
}

/// Reorder in place. `None` leaves the incoming (fetch) order alone.
///
/// Descending is the exact reverse of ascending, except that items without
/// an upload time always sort after those with one, in fetch order.
pub fn sort(items: &mut Vec<&RemoteItem>, sort: Option<Sort>) {
    let Some(Sort { column, direction }) = sort else {
        return;
    };
    match column {
        Column::Name => items.sort_by(|a, b| a.name.cmp(&b.name)),
        Column::Kind => items.sort_by(|a, b| a.kind.as_str().cmp(b.kind.as_str())),
        Column::Uploaded => {
            // Stable partition: dated items first, undated keep their relative order.
            let (mut dated, undated): (Vec<_>, Vec<_>) = items.drain(..).partition(|item| item.modified.is_some());
            dated.sort_by(|a, b| a.modified.cmp(&b.modified));
            if direction == Direction::Descending {
                dated.reverse();
            }
            items.extend(dated);
            items.extend(undated);
            return;
        },
        Column::Select | Column::Actions => return,
    }
    if direction == Direction::Descending {
        items.reverse();
    }
}

/// Number of pages needed for `total` rows. An empty table still has one (empty) page.
pub fn page_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1)).max(1)
}

/// The rows on page `page` (zero-based). Out of range pages are empty.
pub fn paginate<T>(rows: &[T], page: usize, page_size: usize) -> &[T] {
    let page_size = page_size.max(1);
    let start = page.saturating_mul(page_size).min(rows.len());
    let end = start.saturating_add(page_size).min(rows.len());
    &rows[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    fn items() -> Vec<RemoteItem> {
        vec![
            RemoteItem::new("z.csv").with_modified(datetime!(2024-03-01 00:00 UTC)),
            RemoteItem::new("Alpha.PKL"),
            RemoteItem::new("a.csv").with_modified(datetime!(2024-01-01 00:00 UTC)),
            RemoteItem::new("reports/"),
            RemoteItem::new("b.csv").with_modified(datetime!(2024-02-01 00:00 UTC)),
        ]
    }

    fn names<'a>(rows: &[&'a RemoteItem]) -> Vec<&'a str> {
        rows.iter().map(|item| item.name.as_str()).collect()
    }

    #[rstest]
    #[case("", 5)]
    #[case("csv", 3)]
    #[case("CSV", 3)]
    #[case("alpha", 1)]
    #[case("nothing", 0)]
    fn test_filter_is_idempotent(#[case] text: &str, #[case] expected: usize) {
        let items = items();
        let once = filter(&items, text);
        let twice = filter(once.iter().copied(), text);
        assert_eq!(once.len(), expected);
        assert_eq!(names(&once), names(&twice));
    }

    #[rstest]
    #[case(Column::Name, vec!["Alpha.PKL", "a.csv", "b.csv", "reports", "z.csv"])]
    #[case(Column::Kind, vec!["z.csv", "a.csv", "b.csv", "reports", "Alpha.PKL"])]
    #[case(Column::Uploaded, vec!["a.csv", "b.csv", "z.csv", "Alpha.PKL", "reports"])]
    fn test_sort_ascending(#[case] column: Column, #[case] expected: Vec<&str>) {
        let items = items();
        let mut rows = filter(&items, "");
        sort(&mut rows, Some(Sort::ascending(column)));
        assert_eq!(names(&rows), expected);
    }

    #[rstest]
    #[case(Column::Name)]
    #[case(Column::Kind)]
    fn test_descending_is_exact_reverse(#[case] column: Column) {
        let items = items();
        let mut ascending = filter(&items, "");
        sort(&mut ascending, Some(Sort::ascending(column)));
        let mut descending = filter(&items, "");
        sort(&mut descending, Some(Sort::descending(column)));
        ascending.reverse();
        assert_eq!(names(&ascending), names(&descending));
    }

    #[test]
    fn test_undated_sort_last_both_ways() {
        let items = items();
        let mut rows = filter(&items, "");
        sort(&mut rows, Some(Sort::descending(Column::Uploaded)));
        assert_eq!(names(&rows), vec!["z.csv", "b.csv", "a.csv", "Alpha.PKL", "reports"]);
    }

    #[test]
    fn test_no_sort_keeps_fetch_order() {
        let items = items();
        let mut rows = filter(&items, "");
        sort(&mut rows, None);
        assert_eq!(names(&rows), vec!["z.csv", "Alpha.PKL", "a.csv", "reports", "b.csv"]);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(10, 1)]
    #[case(11, 2)]
    #[case(25, 3)]
    fn test_page_count(#[case] total: usize, #[case] expected: usize) {
        assert_eq!(page_count(total, 10), expected);
    }

    #[test]
    fn test_paginate_bounds() {
        let rows: Vec<u32> = (0..25).collect();
        assert_eq!(paginate(&rows, 0, 10), &rows[0..10]);
        assert_eq!(paginate(&rows, 2, 10), &rows[20..25]);
        assert!(paginate(&rows, 3, 10).is_empty());
        assert!(paginate(&rows, usize::MAX, 10).is_empty());
    }
}
