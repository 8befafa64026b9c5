use derive_more::Display;
use std::collections::BTreeMap;

/// The columns of the item table, in display order.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    #[display("select")]
    Select,
    #[display("name")]
    Name,
    #[display("kind")]
    Kind,
    #[display("uploaded")]
    Uploaded,
    #[display("actions")]
    Actions,
}

impl Column {
    pub const ALL: [Self; 5] = [Self::Select, Self::Name, Self::Kind, Self::Uploaded, Self::Actions];

    pub fn is_sortable(self) -> bool {
        matches!(self, Self::Name | Self::Kind | Self::Uploaded)
    }

    /// The selection checkbox column is always shown.
    pub fn is_hideable(self) -> bool {
        !matches!(self, Self::Select)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    #[display("asc")]
    Ascending,
    #[display("desc")]
    Descending,
}

/// The active sort: at most one column at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sort {
    pub column: Column,
    pub direction: Direction,
}

impl Sort {
    pub fn ascending(column: Column) -> Self {
        Self { column, direction: Direction::Ascending }
    }

    pub fn descending(column: Column) -> Self {
        Self { column, direction: Direction::Descending }
    }

    /// Next state in the none → ascending → descending → none cycle when
    /// `column`'s header is clicked. Clicking a different column starts that
    /// column at ascending and drops the current sort.
    pub fn cycle(current: Option<Self>, column: Column) -> Option<Self> {
        match current {
            Some(Self { column: active, direction: Direction::Ascending }) if active == column => {
                Some(Self::descending(column))
            },
            Some(Self { column: active, direction: Direction::Descending }) if active == column => None,
            _ => Some(Self::ascending(column)),
        }
    }
}

/// Which columns are shown. Rendering only; never affects rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visibility(BTreeMap<Column, bool>);

impl Visibility {
    pub fn is_visible(&self, column: Column) -> bool {
        self.0.get(&column).copied().unwrap_or(true)
    }

    pub(crate) fn set(&mut self, column: Column, visible: bool) {
        self.0.insert(column, visible);
    }

    /// Visible columns in display order.
    pub fn columns(&self) -> Vec<Column> {
        Column::ALL.into_iter().filter(|column| self.is_visible(*column)).collect()
    }
}
