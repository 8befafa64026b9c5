//! Table view engine for remote item listings.
//!
//! [`TableView`] turns a snapshot of [`RemoteItem`](tabula_storage::RemoteItem)s
//! into the rows of one page, always in the same order of operations:
//!
//! 1. **filter**: case-insensitive substring match on the display name,
//! 2. **sort**: at most one column, cycling none → ascending → descending,
//! 3. **paginate**: fixed page size, back to the first page whenever the
//!    filter text changes.
//!
//! The stages are also available as free functions in [`pipeline`]. Selection
//! and column visibility sit alongside and never influence which rows are
//! produced.

mod column;
pub mod error;
pub mod pipeline;
mod view;

pub use crate::column::{Column, Direction, Sort, Visibility};
pub use crate::view::{DEFAULT_PAGE_SIZE, PageSelection, Row, SelectionCallback, TableView};
