use crate::error::{ErrorKind, Result};
use crate::task::{Status, TaskId, Transition, UploadTask};
use exn::OptionExt;

/// Something that can happen to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A new batch, in the order its files were dropped.
    Enqueue(Vec<UploadTask>),
    Transition(TaskId, Transition),
    /// Forget every task in a terminal state.
    ClearFinished,
}

/// The pipeline's display queue: newest batch first, each batch in drop order.
///
/// Snapshots are plain values; [`reduce`](Self::reduce) produces the next one
/// and leaves the current one alone, so two snapshots can be compared
/// directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Queue {
    tasks: Vec<UploadTask>,
}

impl Queue {
    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&UploadTask> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn count(&self, status: Status) -> usize {
        self.tasks.iter().filter(|task| task.status == status).count()
    }

    /// `true` once nothing is queued or uploading.
    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(|task| task.status.is_terminal())
    }

    pub fn reduce(&self, action: Action) -> Result<Self> {
        let tasks = match action {
            Action::Enqueue(batch) => batch.into_iter().chain(self.tasks.iter().cloned()).collect(),
            Action::Transition(id, transition) => {
                let index =
                    self.tasks.iter().position(|task| task.id == id).ok_or_raise(|| ErrorKind::UnknownTask(id))?;
                let mut tasks = self.tasks.clone();
                tasks[index] = tasks[index].apply(transition)?;
                tasks
            },
            Action::ClearFinished => self.tasks.iter().filter(|task| !task.status.is_terminal()).cloned().collect(),
        };
        Ok(Self { tasks })
    }
}
