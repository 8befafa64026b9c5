//! Upload pipeline for tabular datasets.
//!
//! Files dropped onto the pipeline are validated locally first (count per
//! drop, size per file, extension), and only the survivors become
//! [`UploadTask`]s. Each task walks the `Queued → Uploading → Done | Error`
//! state machine in [`task`]; the queue itself is an immutable value updated
//! through [`Queue::reduce`], and observable through a `watch` channel.

pub mod error;
mod file;
mod pipeline;
mod queue;
pub mod task;
mod validate;

pub use crate::file::UploadFile;
pub use crate::pipeline::{Batch, ErrorCallback, Pipeline};
pub use crate::queue::{Action, Queue};
pub use crate::task::{Status, TaskId, Transition, UploadTask};
pub use crate::validate::{Constraints, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FILES, Rejection, ValidationError};
