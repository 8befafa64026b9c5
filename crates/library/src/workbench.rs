use crate::error::{ErrorKind, Result};
use crate::host::{Host, RowAction};
use exn::{OptionExt, ResultExt};
use std::sync::Arc;
use tabula_asyncutils::{Broadcaster, Scope};
use tabula_cache::{Outcome, Repository, Snapshot};
use tabula_config::Config;
use tabula_storage::{BackendHandle, PreprocessReport, PreviewRow, RemoteItem, Session};
use tabula_table::TableView;
use tabula_upload::{Batch, Constraints, Pipeline, UploadFile};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

/// One dataset browser: the item cache, the table over it and the upload
/// pipeline feeding it, sharing a session, a refresh channel and a lifetime.
///
/// The table only changes when the workbench is told to [`sync`](Self::sync)
/// (or [`changed`](Self::changed) resolves), so a UI can redraw from it
/// without worrying about a fetch landing mid-frame.
///
/// Dropping the workbench (or calling [`teardown`](Self::teardown)) closes its
/// scope: fetches and uploads still in flight are abandoned, and their
/// results never reach the table, the queue or the refresh channel.
pub struct Workbench {
    session: Session,
    broadcaster: Broadcaster,
    scope: Scope,
    repository: Repository,
    snapshots: watch::Receiver<Snapshot>,
    synced: u64,
    table: TableView,
    pipeline: Pipeline,
    host: Arc<dyn Host>,
    task: Option<JoinHandle<Option<()>>>,
}

impl Workbench {
    pub fn new(config: &Config, backend: BackendHandle, session: Session, host: Arc<dyn Host>) -> Result<Self> {
        let broadcaster = Broadcaster::new();
        let scope = Scope::new();
        let repository = Repository::new(backend.clone(), session.clone());

        let mut table = TableView::new(config.table.page_size).or_raise(|| ErrorKind::Config)?;
        let selection_host = host.clone();
        table.on_selection_change(move |items| selection_host.on_selection_change(items));

        let constraints = Constraints::new(
            config.upload.max_files,
            config.upload.max_file_size,
            &config.upload.allowed_extensions,
        );
        let error_host = host.clone();
        let pipeline = Pipeline::new(backend, session.clone(), broadcaster.clone(), constraints, scope.clone())
            .on_error(move |file, error| error_host.on_upload_error(file, error));

        Ok(Self {
            snapshots: repository.subscribe(),
            synced: 0,
            session,
            broadcaster,
            scope,
            repository,
            table,
            pipeline,
            host,
            task: None,
        })
    }

    /// Start keeping the item cache current. Calling it again does nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn mount(&mut self) {
        if self.task.is_none() {
            tracing::debug!(backend = self.repository.backend().name(), "Mounting workbench");
            self.task = Some(self.repository.mount(&self.broadcaster, &self.scope));
        }
    }

    /// Close the scope and wait for the cache loop to wind down.
    pub async fn teardown(mut self) {
        self.scope.close();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            tracing::warn!(error = ?err, "Repository loop did not shut down cleanly");
        }
    }

    /// Fetch once, outside the mounted loop, and sync the table.
    pub async fn refresh(&mut self) -> Result<Outcome> {
        let outcome = self.scope.bind(self.repository.refresh()).await.ok_or_raise(|| ErrorKind::Closed)?;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                let kind = (*err).clone();
                return Err(err).or_raise(|| ErrorKind::Refresh(kind));
            },
        };
        self.sync();
        Ok(outcome)
    }

    /// Move the table onto the newest applied snapshot.
    ///
    /// Returns `false` if the table was already showing it.
    pub fn sync(&mut self) -> bool {
        let snapshot = self.snapshots.borrow_and_update().clone();
        if snapshot.sequence == self.synced {
            return false;
        }
        tracing::trace!(sequence = snapshot.sequence, items = snapshot.items.len(), "Syncing table");
        self.synced = snapshot.sequence;
        self.table.set_items(snapshot.items);
        true
    }

    /// Wait for the cache to apply a new snapshot, then sync the table.
    ///
    /// Returns `false` once the workbench has been closed.
    pub async fn changed(&mut self) -> bool {
        let open = tokio::select! {
            changed = self.snapshots.changed() => changed.is_ok(),
            () = self.scope.closed() => false,
        };
        if open {
            self.sync();
        }
        open
    }

    pub fn table(&self) -> &TableView {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut TableView {
        &mut self.table
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Validate and upload a drop of files. See [`Pipeline::enqueue`].
    pub fn enqueue(&self, files: impl IntoIterator<Item = UploadFile>) -> Batch {
        self.pipeline.enqueue(files)
    }

    /// The row currently shown for `key`.
    pub fn item(&self, key: &str) -> Result<RemoteItem> {
        self.table
            .items()
            .iter()
            .find(|item| item.key == key)
            .cloned()
            .ok_or_raise(|| ErrorKind::UnknownItem(key.to_string()))
    }

    /// Hand a row action to the host.
    pub fn trigger(&self, key: &str, action: RowAction) -> Result<()> {
        let item = self.item(key)?;
        tracing::debug!(key, %action, "Row action");
        match action {
            RowAction::Analyse => self.host.on_analyse(&item),
            RowAction::Download => self.host.on_download(&item),
            RowAction::Delete => self.host.on_delete(&item),
        }
        Ok(())
    }

    /// Delete `item` remotely, then tell every cache to refetch.
    #[instrument(skip(self, item), fields(key = %item.key))]
    pub async fn delete(&self, item: &RemoteItem) -> Result<()> {
        let token = self.session.token();
        self.request("delete", self.repository.backend().delete(token.as_ref(), &item.key)).await?;
        tracing::info!("Deleted item");
        self.broadcaster.publish();
        Ok(())
    }

    /// Have the server profile `item`.
    #[instrument(skip(self, item), fields(dataset = item.dataset_id()))]
    pub async fn analyse(&self, item: &RemoteItem) -> Result<PreprocessReport> {
        let token = self.session.token();
        let report = self
            .request("preprocessing", self.repository.backend().begin_preprocessing(token.as_ref(), item.dataset_id()))
            .await?;
        tracing::debug!(columns = report.columns.len(), rows = report.num_rows, "Preprocessing complete");
        Ok(report)
    }

    /// The first rows of `item`.
    #[instrument(skip(self, item), fields(dataset = item.dataset_id()))]
    pub async fn preview(&self, item: &RemoteItem, target_column: Option<&str>) -> Result<Vec<PreviewRow>> {
        let token = self.session.token();
        self.request("preview", self.repository.backend().top_rows(token.as_ref(), item.dataset_id(), target_column))
            .await
    }

    pub fn download_url<'a>(&self, item: &'a RemoteItem) -> Result<&'a str> {
        item.download_url.as_deref().ok_or_raise(|| ErrorKind::NoDownload(item.key.clone()))
    }

    async fn request<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = tabula_storage::error::Result<T>>,
    ) -> Result<T> {
        let result = self.scope.bind(future).await.ok_or_raise(|| ErrorKind::Closed)?;
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!(operation, error = ?err, "Request failed");
                let kind = (*err).clone();
                Err(err).or_raise(|| ErrorKind::Remote { operation, kind })
            },
        }
    }
}

impl Drop for Workbench {
    fn drop(&mut self) {
        self.scope.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Headless;
    use rstest::rstest;
    use std::sync::Mutex;
    use std::time::Duration;
    use tabula_storage::Token;
    use tabula_storage::backend::{Call, MockBackend};
    use tabula_storage::error::ErrorKind as StorageErrorKind;
    use tabula_upload::{Status, ValidationError};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Host for Recorder {
        fn on_analyse(&self, item: &RemoteItem) {
            self.push(format!("analyse {}", item.key));
        }

        fn on_download(&self, item: &RemoteItem) {
            self.push(format!("download {}", item.key));
        }

        fn on_delete(&self, item: &RemoteItem) {
            self.push(format!("delete {}", item.key));
        }

        fn on_selection_change(&self, items: &[RemoteItem]) {
            let keys: Vec<&str> = items.iter().map(|item| item.key.as_str()).collect();
            self.push(format!("selection [{}]", keys.join(",")));
        }

        fn on_upload_error(&self, file: &UploadFile, error: &ValidationError) {
            self.push(format!("upload error {}: {error}", file.name));
        }
    }

    fn setup(keys: &[&str]) -> (Arc<MockBackend>, Arc<Recorder>, Workbench) {
        let backend = Arc::new(MockBackend::with_keys(keys.iter().copied()));
        let host = Arc::new(Recorder::default());
        let workbench =
            Workbench::new(&Config::default(), backend.clone(), Session::new(Some(Token::new("t"))), host.clone())
                .unwrap();
        (backend, host, workbench)
    }

    fn keys(workbench: &Workbench) -> Vec<String> {
        workbench.table().items().iter().map(|item| item.key.clone()).collect()
    }

    async fn next(workbench: &mut Workbench) {
        let open = tokio::time::timeout(Duration::from_secs(1), workbench.changed()).await.unwrap();
        assert!(open, "workbench closed while waiting for a snapshot");
    }

    async fn until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_rows_until_next_success() {
        let (backend, _host, mut workbench) = setup(&["a.csv", "b.csv"]);
        workbench.mount();
        next(&mut workbench).await;
        assert_eq!(keys(&workbench), vec!["a.csv", "b.csv"]);

        backend.fail_next_list(StorageErrorKind::Network("connection reset".to_string()));
        workbench.broadcaster().publish();
        until(|| backend.list_count() == 2).await;
        assert!(!workbench.sync());
        assert_eq!(keys(&workbench), vec!["a.csv", "b.csv"]);

        // An unrelated delete publishes the refresh that recovers.
        let item = workbench.item("a.csv").unwrap();
        workbench.delete(&item).await.unwrap();
        next(&mut workbench).await;
        assert_eq!(keys(&workbench), vec!["b.csv"]);
        assert_eq!(backend.list_count(), 3);

        workbench.teardown().await;
    }

    #[rstest]
    #[case(RowAction::Analyse, "analyse b.csv")]
    #[case(RowAction::Download, "download b.csv")]
    #[case(RowAction::Delete, "delete b.csv")]
    #[tokio::test]
    async fn test_row_actions_go_to_host(#[case] action: RowAction, #[case] expected: &str) {
        let (backend, host, mut workbench) = setup(&["a.csv", "b.csv"]);
        assert!(matches!(workbench.refresh().await.unwrap(), Outcome::Applied { count: 2, .. }));

        workbench.trigger("b.csv", action).unwrap();
        assert_eq!(host.events(), vec![expected.to_string()]);
        // Triggering only notifies; the host decides what to send.
        assert_eq!(backend.calls(), vec![Call::List]);

        let err = workbench.trigger("missing.csv", action).unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownItem("missing.csv".to_string()));
    }

    #[tokio::test]
    async fn test_selection_changes_go_to_host() {
        let (_backend, host, mut workbench) = setup(&["a.csv", "b.csv"]);
        workbench.refresh().await.unwrap();

        workbench.table_mut().set_selected("b.csv", true).unwrap();
        workbench.table_mut().set_selected("a.csv", true).unwrap();
        assert_eq!(host.events(), vec!["selection [b.csv]", "selection [a.csv,b.csv]"]);

        // Deleting a selected item prunes it from the selection on the next sync.
        let item = workbench.item("b.csv").unwrap();
        workbench.delete(&item).await.unwrap();
        workbench.refresh().await.unwrap();
        assert_eq!(host.events().last().map(String::as_str), Some("selection [a.csv]"));
        assert_eq!(workbench.table().selected_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_then_analyse() {
        let (backend, host, mut workbench) = setup(&[]);
        workbench.mount();
        next(&mut workbench).await;
        assert!(keys(&workbench).is_empty());

        let batch = workbench.enqueue([
            UploadFile::new("scores.csv", b"name,score\nada,3\nbob,\n".to_vec()),
            UploadFile::new("notes.txt", b"hello".to_vec()),
        ]);
        assert_eq!(host.events(), vec!["upload error notes.txt: invalid extension"]);
        assert!(batch.finished().await);
        assert_eq!(workbench.pipeline().queue().count(Status::Done), 1);

        next(&mut workbench).await;
        assert_eq!(keys(&workbench), vec!["datasets/scores.csv"]);

        let item = workbench.item("datasets/scores.csv").unwrap();
        let report = workbench.analyse(&item).await.unwrap();
        assert_eq!(report.columns, vec!["name", "score"]);
        assert_eq!(report.num_rows, 2);
        assert_eq!(report.missing_values.get("score"), Some(&1));

        let rows = workbench.preview(&item, Some("score")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name").and_then(|v| v.as_str()), Some("ada"));

        let err = workbench.download_url(&item).unwrap_err();
        assert_eq!(*err, ErrorKind::NoDownload("datasets/scores.csv".to_string()));
        assert!(backend.calls().contains(&Call::BeginPreprocessing("datasets/scores.csv".to_string())));

        workbench.teardown().await;
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_publish() {
        let (_backend, _host, workbench) = setup(&["a.csv"]);
        let err = workbench.delete(&RemoteItem::new("ghost.csv")).await.unwrap_err();
        assert!(matches!(
            &*err,
            ErrorKind::Remote { operation: "delete", kind: StorageErrorKind::NotFound(_) }
        ));
        assert!(!err.is_retryable());
        assert_eq!(workbench.broadcaster().published(), 0);
    }

    #[tokio::test]
    async fn test_closed_workbench_refuses_requests() {
        let (backend, _host, workbench) = setup(&["a.csv"]);
        workbench.scope().close();
        let err = workbench.delete(&RemoteItem::new("a.csv")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Closed);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_abandons_in_flight_upload() {
        let (backend, _host, mut workbench) = setup(&[]);
        let gate = backend.gate_upload("a.csv");
        workbench.mount();

        let pipeline = workbench.pipeline().clone();
        let broadcaster = workbench.broadcaster().clone();
        let batch = workbench.enqueue([UploadFile::new("a.csv", b"x\n1\n".to_vec())]);
        until(|| backend.calls().contains(&Call::Upload("a.csv".to_string()))).await;

        workbench.teardown().await;
        gate.release();
        assert!(!batch.finished().await);
        assert_eq!(broadcaster.published(), 0);
        assert_eq!(pipeline.queue().count(Status::Uploading), 1);
    }

    #[test]
    fn test_config_drives_table_and_constraints() {
        let mut config = Config::default();
        config.table.page_size = 3;
        config.upload.max_files = 2;
        let workbench =
            Workbench::new(&config, Arc::new(MockBackend::default()), Session::anonymous(), Arc::new(Headless)).unwrap();
        assert_eq!(workbench.table().page_size(), 3);
        assert_eq!(workbench.pipeline().constraints().max_files, 2);

        config.table.page_size = 0;
        let err = Workbench::new(&config, Arc::new(MockBackend::default()), Session::anonymous(), Arc::new(Headless))
            .err()
            .unwrap();
        assert_eq!(*err, ErrorKind::Config);
    }
}
