use crate::column::{Column, Sort, Visibility};
use crate::error::{ErrorKind, Result};
use crate::pipeline;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use tabula_storage::RemoteItem;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Receives the full selection, in snapshot order, every time it changes.
pub type SelectionCallback = Box<dyn FnMut(&[RemoteItem]) + Send>;

/// State of the "select all on this page" checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelection {
    All,
    /// Indeterminate: some, but not all, rows on the page are selected.
    Some,
    None,
}

/// One rendered row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row<'a> {
    pub item: &'a RemoteItem,
    pub selected: bool,
}

/// Table state over one snapshot of remote items.
///
/// Rows are derived on demand (filter → sort → paginate) from the items and
/// the current state, so every accessor reflects the latest change. Selection
/// is keyed on [`RemoteItem::key`]: sorting, paging and filtering never add
/// or remove selected keys, and only keys that vanish from a new snapshot are
/// pruned.
///
/// # Examples
///
/// ```
/// use tabula_storage::RemoteItem;
/// use tabula_table::{Column, TableView};
///
/// let mut table = TableView::new(10).unwrap();
/// table.set_items(vec![RemoteItem::new("z.csv"), RemoteItem::new("a.csv")]);
/// table.toggle_sort(Column::Name).unwrap();
///
/// let names: Vec<_> = table.rows().iter().map(|row| row.item.name.as_str()).collect();
/// assert_eq!(names, ["a.csv", "z.csv"]);
/// ```
pub struct TableView {
    items: Arc<Vec<RemoteItem>>,
    filter: String,
    sort: Option<Sort>,
    visibility: Visibility,
    selection: HashSet<String>,
    page: usize,
    page_size: usize,
    on_selection_change: Option<SelectionCallback>,
}

impl TableView {
    pub fn new(page_size: usize) -> Result<Self> {
        if page_size == 0 {
            exn::bail!(ErrorKind::InvalidPageSize);
        }
        Ok(Self {
            items: Arc::default(),
            filter: String::new(),
            sort: None,
            visibility: Visibility::default(),
            selection: HashSet::new(),
            page: 0,
            page_size,
            on_selection_change: None,
        })
    }

    /// Register the host callback for selection changes, replacing any previous one.
    pub fn on_selection_change(&mut self, callback: impl FnMut(&[RemoteItem]) + Send + 'static) {
        self.on_selection_change = Some(Box::new(callback));
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Swap in a new snapshot.
    ///
    /// Selected keys that no longer exist are dropped (emitting a selection
    /// change if any were), and the page index is clamped to the new page count.
    pub fn set_items(&mut self, items: impl Into<Arc<Vec<RemoteItem>>>) {
        self.items = items.into();
        let present: HashSet<&str> = self.items.iter().map(|item| item.key.as_str()).collect();
        let before = self.selection.len();
        self.selection.retain(|key| present.contains(key.as_str()));
        let pruned = before - self.selection.len();
        self.clamp_page();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned selection of vanished items");
            self.emit_selection();
        }
    }

    pub fn items(&self) -> &[RemoteItem] {
        &self.items
    }

    // =========================================================================
    // Filter, sort, visibility
    // =========================================================================

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Set the name filter. Any change sends the view back to the first page.
    pub fn set_filter(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.filter {
            self.filter = text;
            self.page = 0;
        }
    }

    pub fn sort(&self) -> Option<Sort> {
        self.sort
    }

    /// Advance `column` through none → ascending → descending → none,
    /// resetting any other column's sort.
    pub fn toggle_sort(&mut self, column: Column) -> Result<Option<Sort>> {
        if !column.is_sortable() {
            exn::bail!(ErrorKind::NotSortable(column));
        }
        self.sort = Sort::cycle(self.sort, column);
        Ok(self.sort)
    }

    /// Set the sort directly.
    pub fn set_sort(&mut self, sort: Option<Sort>) -> Result<()> {
        if let Some(sort) = sort
            && !sort.column.is_sortable()
        {
            exn::bail!(ErrorKind::NotSortable(sort.column));
        }
        self.sort = sort;
        Ok(())
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn set_visible(&mut self, column: Column, visible: bool) -> Result<()> {
        if !column.is_hideable() {
            exn::bail!(ErrorKind::NotHideable(column));
        }
        self.visibility.set(column, visible);
        Ok(())
    }

    pub fn toggle_visible(&mut self, column: Column) -> Result<bool> {
        let visible = !self.visibility.is_visible(column);
        self.set_visible(column, visible)?;
        Ok(visible)
    }

    // =========================================================================
    // Rows and pagination
    // =========================================================================

    /// Every row passing the filter, sorted; all pages.
    fn filtered(&self) -> Vec<&RemoteItem> {
        let mut rows = pipeline::filter(self.items.iter(), &self.filter);
        pipeline::sort(&mut rows, self.sort);
        rows
    }

    pub fn filtered_count(&self) -> usize {
        pipeline::filter(self.items.iter(), &self.filter).len()
    }

    fn page_items(&self) -> Vec<&RemoteItem> {
        let rows = self.filtered();
        pipeline::paginate(&rows, self.page, self.page_size).to_vec()
    }

    /// Rows on the current page.
    pub fn rows(&self) -> Vec<Row<'_>> {
        self.page_items()
            .into_iter()
            .map(|item| Row { item, selected: self.selection.contains(&item.key) })
            .collect()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        pipeline::page_count(self.filtered_count(), self.page_size)
    }

    pub fn can_previous_page(&self) -> bool {
        self.page > 0
    }

    pub fn can_next_page(&self) -> bool {
        self.page + 1 < self.page_count()
    }

    /// Returns `false` (and stays put) on the last page.
    pub fn next_page(&mut self) -> bool {
        if !self.can_next_page() {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn previous_page(&mut self) -> bool {
        if !self.can_previous_page() {
            return false;
        }
        self.page -= 1;
        true
    }

    /// Jump to `page`, clamped to the last page.
    pub fn set_page(&mut self, page: usize) {
        self.page = page.min(self.page_count() - 1);
    }

    fn clamp_page(&mut self) {
        self.set_page(self.page);
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn is_selected(&self, key: &str) -> bool {
        self.selection.contains(key)
    }

    pub fn selected_count(&self) -> usize {
        self.selection.len()
    }

    /// Selected items in snapshot order, including any hidden by the filter.
    pub fn selected_items(&self) -> Vec<RemoteItem> {
        self.items.iter().filter(|item| self.selection.contains(&item.key)).cloned().collect()
    }

    pub fn set_selected(&mut self, key: &str, selected: bool) -> Result<()> {
        if !self.items.iter().any(|item| item.key == key) {
            exn::bail!(ErrorKind::UnknownKey(key.to_string()));
        }
        let changed = if selected { self.selection.insert(key.to_string()) } else { self.selection.remove(key) };
        if changed {
            self.emit_selection();
        }
        Ok(())
    }

    /// Flip one row's selection, returning its new state.
    pub fn toggle_selected(&mut self, key: &str) -> Result<bool> {
        let selected = !self.is_selected(key);
        self.set_selected(key, selected)?;
        Ok(selected)
    }

    pub fn page_selection(&self) -> PageSelection {
        let rows = self.page_items();
        let selected = rows.iter().filter(|item| self.selection.contains(&item.key)).count();
        match selected {
            0 => PageSelection::None,
            n if n == rows.len() => PageSelection::All,
            _ => PageSelection::Some,
        }
    }

    /// Select or deselect every row on the current page. Rows on other pages
    /// (or hidden by the filter) keep their state.
    pub fn set_page_selected(&mut self, selected: bool) {
        let keys: Vec<String> = self.page_items().into_iter().map(|item| item.key.clone()).collect();
        let mut changed = false;
        for key in keys {
            changed |= if selected { self.selection.insert(key) } else { self.selection.remove(&key) };
        }
        if changed {
            self.emit_selection();
        }
    }

    /// The header checkbox: a fully selected page is cleared, anything else
    /// (including a partially selected page) becomes fully selected.
    pub fn toggle_page_selected(&mut self) -> PageSelection {
        let select = self.page_selection() != PageSelection::All;
        self.set_page_selected(select);
        self.page_selection()
    }

    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.emit_selection();
        }
    }

    fn emit_selection(&mut self) {
        let selected = self.selected_items();
        tracing::trace!(selected = selected.len(), "Selection changed");
        if let Some(callback) = self.on_selection_change.as_mut() {
            callback(&selected);
        }
    }
}

impl Debug for TableView {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TableView")
            .field("items", &self.items.len())
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .field("selection", &self.selection)
            .field("page", &self.page)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Direction;
    use std::sync::Mutex;

    type Emitted = Arc<Mutex<Vec<Vec<String>>>>;

    fn table(keys: &[&str], page_size: usize) -> (TableView, Emitted) {
        let mut table = TableView::new(page_size).unwrap();
        table.set_items(keys.iter().map(|key| RemoteItem::new(*key)).collect::<Vec<_>>());
        let emitted: Emitted = Arc::default();
        let sink = emitted.clone();
        table.on_selection_change(move |items| {
            sink.lock().unwrap().push(items.iter().map(|item| item.key.clone()).collect());
        });
        (table, emitted)
    }

    fn names(table: &TableView) -> Vec<String> {
        table.rows().iter().map(|row| row.item.name.clone()).collect()
    }

    fn numbered(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("file-{i:02}.csv")).collect()
    }

    #[test]
    fn test_sort_toggle_scenario() {
        let (mut table, _) = table(&["z.csv", "a.csv"], 10);
        table.toggle_sort(Column::Name).unwrap();
        assert_eq!(names(&table), vec!["a.csv", "z.csv"]);
        assert_eq!(table.toggle_sort(Column::Name).unwrap().map(|s| s.direction), Some(Direction::Descending));
        assert_eq!(names(&table), vec!["z.csv", "a.csv"]);
        assert_eq!(table.toggle_sort(Column::Name).unwrap(), None);
        assert_eq!(names(&table), vec!["z.csv", "a.csv"]);
    }

    #[test]
    fn test_unsortable_and_unhideable_columns() {
        let (mut table, _) = table(&["a.csv"], 10);
        let err = table.toggle_sort(Column::Select).unwrap_err();
        assert_eq!(*err, ErrorKind::NotSortable(Column::Select));
        let err = table.set_visible(Column::Select, false).unwrap_err();
        assert_eq!(*err, ErrorKind::NotHideable(Column::Select));
        assert!(!table.toggle_visible(Column::Actions).unwrap());
        assert!(!table.visibility().is_visible(Column::Actions));
        assert_eq!(table.rows().len(), 1);
    }

    #[test]
    fn test_filter_hides_but_keeps_selection() {
        let (mut table, emitted) = table(&["z.csv", "a.csv"], 10);
        table.set_selected("a.csv", true).unwrap();
        assert_eq!(*emitted.lock().unwrap(), vec![vec!["a.csv".to_string()]]);

        table.set_filter("z");
        assert_eq!(names(&table), vec!["z.csv"]);
        assert!(table.is_selected("a.csv"));
        assert_eq!(emitted.lock().unwrap().len(), 1);

        table.set_filter("");
        let rows = table.rows();
        let a = rows.iter().find(|row| row.item.key == "a.csv").unwrap();
        assert!(a.selected);
        assert_eq!(emitted.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_sort_and_paging_preserve_selection() {
        let keys = numbered(25);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (mut table, emitted) = table(&keys, 10);
        table.set_selected("file-03.csv", true).unwrap();
        table.set_selected("file-17.csv", true).unwrap();
        let before = table.selected_items();

        table.toggle_sort(Column::Name).unwrap();
        table.toggle_sort(Column::Name).unwrap();
        assert!(table.next_page());
        assert!(table.next_page());
        assert!(!table.next_page());
        table.toggle_sort(Column::Uploaded).unwrap();
        assert!(table.previous_page());

        assert_eq!(table.selected_items(), before);
        assert_eq!(emitted.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_filter_change_resets_page() {
        let mut keys = numbered(22);
        keys.extend(["zeta-1.csv", "zeta-2.csv", "zeta-3.csv"].map(String::from));
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (mut table, _) = table(&keys, 20);
        assert_eq!(table.page_count(), 2);
        assert!(table.next_page());
        assert_eq!(table.page(), 1);

        table.set_filter("zeta");
        assert_eq!(table.page(), 0);
        assert_eq!(table.page_count(), 1);
        assert_eq!(names(&table), vec!["zeta-1.csv", "zeta-2.csv", "zeta-3.csv"]);
    }

    #[test]
    fn test_same_filter_keeps_page() {
        let keys = numbered(15);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (mut table, _) = table(&keys, 10);
        table.set_filter("file");
        table.next_page();
        table.set_filter("file");
        assert_eq!(table.page(), 1);
    }

    #[test]
    fn test_page_selection_toggle() {
        let keys = numbered(15);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (mut table, emitted) = table(&keys, 10);
        assert_eq!(table.page_selection(), PageSelection::None);

        table.set_selected("file-00.csv", true).unwrap();
        assert_eq!(table.page_selection(), PageSelection::Some);
        assert_eq!(table.toggle_page_selected(), PageSelection::All);
        assert_eq!(table.selected_count(), 10);

        // Second page is untouched by the first page's header checkbox.
        table.next_page();
        assert_eq!(table.page_selection(), PageSelection::None);
        table.previous_page();

        assert_eq!(table.toggle_page_selected(), PageSelection::None);
        assert_eq!(table.selected_count(), 0);
        assert_eq!(emitted.lock().unwrap().len(), 3);
        assert!(emitted.lock().unwrap()[2].is_empty());
    }

    #[test]
    fn test_new_snapshot_prunes_and_clamps() {
        let keys = numbered(15);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (mut table, emitted) = table(&keys, 10);
        table.set_selected("file-02.csv", true).unwrap();
        table.set_selected("file-12.csv", true).unwrap();
        table.next_page();

        table.set_items(vec![RemoteItem::new("file-02.csv"), RemoteItem::new("new.csv")]);
        assert_eq!(table.page(), 0);
        assert_eq!(table.selected_items(), vec![RemoteItem::new("file-02.csv")]);
        assert_eq!(emitted.lock().unwrap().last().unwrap(), &vec!["file-02.csv".to_string()]);

        // Nothing pruned, nothing emitted.
        let count = emitted.lock().unwrap().len();
        table.set_items(vec![RemoteItem::new("file-02.csv")]);
        assert_eq!(emitted.lock().unwrap().len(), count);
    }

    #[test]
    fn test_selection_in_snapshot_order() {
        let (mut table, emitted) = table(&["c.csv", "a.csv", "b.csv"], 10);
        table.set_selected("b.csv", true).unwrap();
        table.set_selected("c.csv", true).unwrap();
        assert_eq!(emitted.lock().unwrap().last().unwrap(), &vec!["c.csv".to_string(), "b.csv".to_string()]);
        assert!(table.set_selected("missing.csv", true).is_err());
        table.clear_selection();
        table.clear_selection();
        assert_eq!(emitted.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        assert_eq!(*TableView::new(0).unwrap_err(), ErrorKind::InvalidPageSize);
    }
}
