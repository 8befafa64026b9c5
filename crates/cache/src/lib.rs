//! Item repository cache.
//!
//! Holds the last successfully fetched listing of the remote dataset service
//! and keeps it current: it fetches once when mounted, again whenever the
//! session gains a token, and again on every refresh signal. The cache is not
//! the source of truth (the remote service is) and never blanks itself: a
//! failed fetch is logged and the previous snapshot stays in place.
//!
//! # Ordering
//! Fetches can overlap. Each one is tagged with a sequence number when it is
//! issued, and a response is only applied if its number is higher than that
//! of the snapshot currently held. A slow early fetch can therefore never
//! overwrite the result of a faster later one.

pub mod error;
mod repo;

pub use crate::repo::{Outcome, Repository, Snapshot};
