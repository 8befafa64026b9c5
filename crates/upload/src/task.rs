//! Upload tasks and their state machine.
//!
//! ```text
//! Queued --Start--> Uploading --Succeed--> Done
//!                             \--Fail----> Error
//! ```
//!
//! `Done` and `Error` are terminal. Transitions never mutate a task in place;
//! [`UploadTask::apply`] returns the next version of it.

use crate::error::{ErrorKind, Result};
use crate::file::UploadFile;
use derive_more::Display;
use tabula_storage::UploadReceipt;

/// Identity of one task: its position in the order files were queued.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("#{_0}")]
pub struct TaskId(pub u64);

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[display("queued")]
    Queued,
    #[display("uploading")]
    Uploading,
    #[display("done")]
    Done,
    #[display("error")]
    Error,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Processing has reached this task.
    Start,
    /// The server accepted the file.
    Succeed(UploadReceipt),
    /// The server rejected the file or the request never completed.
    Fail(String),
}

impl Transition {
    fn verb(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Succeed(_) => "succeed",
            Self::Fail(_) => "fail",
        }
    }
}

/// The pipeline's record of one file's upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub id: TaskId,
    pub name: String,
    pub size: u64,
    pub extension: String,
    pub status: Status,
    pub error: Option<String>,
    pub receipt: Option<UploadReceipt>,
}

impl UploadTask {
    pub fn queued(id: TaskId, file: &UploadFile) -> Self {
        Self {
            id,
            name: file.name.clone(),
            size: file.size(),
            extension: file.extension(),
            status: Status::Queued,
            error: None,
            receipt: None,
        }
    }

    /// The task after `transition`, or an error if the transition isn't
    /// allowed from the current status.
    pub fn apply(&self, transition: Transition) -> Result<Self> {
        let mut next = self.clone();
        match (self.status, transition) {
            (Status::Queued, Transition::Start) => next.status = Status::Uploading,
            (Status::Uploading, Transition::Succeed(receipt)) => {
                next.status = Status::Done;
                next.receipt = Some(receipt);
            },
            (Status::Uploading, Transition::Fail(message)) => {
                next.status = Status::Error;
                next.error = Some(message);
            },
            (from, transition) => {
                exn::bail!(ErrorKind::InvalidTransition { task: self.id, from, action: transition.verb() });
            },
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn receipt() -> UploadReceipt {
        UploadReceipt {
            dataset_id: "datasets/a.csv".to_string(),
            columns: vec!["x".to_string()],
            original_filename: None,
            num_rows: None,
        }
    }

    fn task(status: Status) -> UploadTask {
        UploadTask { status, ..UploadTask::queued(TaskId(1), &UploadFile::new("a.csv", b"x\n1\n".to_vec())) }
    }

    #[rstest]
    #[case(Status::Queued, Transition::Start, Some(Status::Uploading))]
    #[case(Status::Uploading, Transition::Succeed(receipt()), Some(Status::Done))]
    #[case(Status::Uploading, Transition::Fail("boom".to_string()), Some(Status::Error))]
    #[case(Status::Queued, Transition::Succeed(receipt()), None)]
    #[case(Status::Queued, Transition::Fail("boom".to_string()), None)]
    #[case(Status::Uploading, Transition::Start, None)]
    #[case(Status::Done, Transition::Start, None)]
    #[case(Status::Done, Transition::Fail("boom".to_string()), None)]
    #[case(Status::Error, Transition::Start, None)]
    #[case(Status::Error, Transition::Succeed(receipt()), None)]
    fn test_transition_table(#[case] from: Status, #[case] transition: Transition, #[case] to: Option<Status>) {
        let before = task(from);
        let after = before.apply(transition).ok().map(|task| task.status);
        assert_eq!(after, to);
        // The original is never touched.
        assert_eq!(before.status, from);
    }

    #[test]
    fn test_outcome_recorded() {
        let done = task(Status::Uploading).apply(Transition::Succeed(receipt())).unwrap();
        assert_eq!(done.receipt, Some(receipt()));
        assert!(done.status.is_terminal());

        let failed = task(Status::Uploading).apply(Transition::Fail("server error (400): bad".to_string())).unwrap();
        assert_eq!(failed.error.as_deref(), Some("server error (400): bad"));
        assert!(failed.receipt.is_none());

        let err = done.apply(Transition::Start).unwrap_err();
        assert_eq!(
            *err,
            ErrorKind::InvalidTransition { task: TaskId(1), from: Status::Done, action: "start" }
        );
        assert_eq!((*err).to_string(), "task #1 cannot start while done");
    }
}
