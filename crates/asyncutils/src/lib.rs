//! Async plumbing shared by the tabula crates: a payload-free refresh
//! [`Broadcaster`] and [`Scope`]s that tie in-flight work to the lifetime of
//! whatever started it.

mod broadcast;
mod scope;

pub use crate::broadcast::{Broadcaster, Subscription};
pub use crate::scope::{Scope, Scoped};
