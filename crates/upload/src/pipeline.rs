use crate::file::UploadFile;
use crate::queue::{Action, Queue};
use crate::task::{TaskId, Transition, UploadTask};
use crate::validate::{Constraints, Rejection, ValidationError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tabula_asyncutils::{Broadcaster, Scope};
use tabula_storage::{BackendHandle, Session};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Called once per rejected file, before `enqueue` returns.
pub type ErrorCallback = Arc<dyn Fn(&UploadFile, &ValidationError) + Send + Sync>;

struct Inner {
    backend: BackendHandle,
    session: Session,
    broadcaster: Broadcaster,
    scope: Scope,
    constraints: Constraints,
    next_id: AtomicU64,
    queue: watch::Sender<Queue>,
}

/// Validates dropped files and uploads them.
///
/// Each [`enqueue`](Self::enqueue) call is a batch. A batch's files are
/// uploaded strictly one after another, in drop order, on their own task;
/// separate batches run concurrently with no ordering between them. Every
/// successful upload publishes a refresh signal. A failed upload marks its
/// own task as errored and the batch carries on.
///
/// All processing is bound to the pipeline's [`Scope`]: once it closes,
/// in-flight uploads are abandoned without touching the queue or publishing,
/// and nothing further starts.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
    on_error: Option<ErrorCallback>,
}

impl Pipeline {
    pub fn new(
        backend: BackendHandle,
        session: Session,
        broadcaster: Broadcaster,
        constraints: Constraints,
        scope: Scope,
    ) -> Self {
        let (queue, _rx) = watch::channel(Queue::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                session,
                broadcaster,
                scope,
                constraints,
                next_id: AtomicU64::new(1),
                queue,
            }),
            on_error: None,
        }
    }

    /// Register the callback for validation failures.
    pub fn on_error(mut self, callback: impl Fn(&UploadFile, &ValidationError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn constraints(&self) -> &Constraints {
        &self.inner.constraints
    }

    /// Current queue snapshot.
    pub fn queue(&self) -> Queue {
        self.inner.queue.borrow().clone()
    }

    /// Watch the queue; a new snapshot is published on every transition.
    pub fn subscribe(&self) -> watch::Receiver<Queue> {
        self.inner.queue.subscribe()
    }

    /// Remove every finished (done or errored) task from the queue.
    pub fn clear(&self) {
        self.inner.dispatch(Action::ClearFinished);
    }

    /// Validate `files` and start uploading the ones that pass.
    ///
    /// Rejections are reported to the error callback, one call per file,
    /// before this returns; they never become tasks. Accepted files are
    /// queued at the front of the queue and processed on a spawned task, so
    /// this must be called from within a Tokio runtime.
    pub fn enqueue(&self, files: impl IntoIterator<Item = UploadFile>) -> Batch {
        let (accepted, rejected) = self.inner.constraints.validate(files);
        for rejection in &rejected {
            tracing::info!(file = %rejection.file.name, reason = %rejection.error, "Rejected upload");
            if let Some(callback) = &self.on_error {
                callback(&rejection.file, &rejection.error);
            }
        }
        if accepted.is_empty() {
            return Batch { ids: Vec::new(), rejected, handle: None };
        }

        let work: Vec<(TaskId, UploadFile)> = accepted
            .into_iter()
            .map(|file| (TaskId(self.inner.next_id.fetch_add(1, Ordering::SeqCst)), file))
            .collect();
        let ids: Vec<TaskId> = work.iter().map(|(id, _)| *id).collect();
        self.inner.dispatch(Action::Enqueue(work.iter().map(|(id, file)| UploadTask::queued(*id, file)).collect()));
        tracing::debug!(tasks = ids.len(), "Queued batch");

        let inner = self.inner.clone();
        let handle = self.inner.scope.spawn(async move { inner.process(work).await });
        Batch { ids, rejected, handle: Some(handle) }
    }
}

impl Inner {
    fn dispatch(&self, action: Action) {
        self.queue.send_if_modified(|queue| match queue.reduce(action) {
            Ok(next) => {
                *queue = next;
                true
            },
            Err(err) => {
                tracing::warn!(error = ?err, "Rejected queue action");
                false
            },
        });
    }

    async fn process(&self, work: Vec<(TaskId, UploadFile)>) {
        for (id, file) in work {
            self.upload(id, file).await;
        }
    }

    #[instrument(skip(self, file), fields(task = %id, file = %file.name))]
    async fn upload(&self, id: TaskId, file: UploadFile) {
        self.dispatch(Action::Transition(id, Transition::Start));
        let token = self.session.token();
        match self.backend.upload(token.as_ref(), &file.name, file.data).await {
            Ok(receipt) => {
                tracing::info!(dataset = %receipt.dataset_id, "Upload complete");
                self.dispatch(Action::Transition(id, Transition::Succeed(receipt)));
                self.broadcaster.publish();
            },
            Err(err) => {
                tracing::warn!(error = ?err, "Upload failed");
                self.dispatch(Action::Transition(id, Transition::Fail((*err).to_string())));
            },
        }
    }
}

/// Handle on one `enqueue` call.
#[derive(Debug)]
pub struct Batch {
    ids: Vec<TaskId>,
    rejected: Vec<Rejection>,
    handle: Option<JoinHandle<Option<()>>>,
}

impl Batch {
    /// Tasks created for this batch, in processing order.
    pub fn ids(&self) -> &[TaskId] {
        &self.ids
    }

    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    /// Nothing was accepted, so there is nothing to wait for.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Wait for every task of the batch to reach a terminal state.
    ///
    /// Returns `false` if processing was cut short because the pipeline's
    /// scope closed (or the runtime shut down) first.
    pub async fn finished(self) -> bool {
        match self.handle {
            None => true,
            Some(handle) => matches!(handle.await, Ok(Some(()))),
        }
    }
}
