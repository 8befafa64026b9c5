use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tabula_asyncutils::{Broadcaster, Scope, Subscription};
use tabula_storage::{BackendHandle, RemoteItem, Session, normalize_all};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

/// One applied listing.
///
/// `sequence` is the number of the fetch that produced it; `0` means nothing
/// has been fetched yet and the item list is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub sequence: u64,
    pub items: Arc<Vec<RemoteItem>>,
}
impl Snapshot {
    pub fn is_loaded(&self) -> bool {
        self.sequence > 0
    }

    pub fn items(&self) -> &[RemoteItem] {
        &self.items
    }

    pub fn get(&self, key: &str) -> Option<&RemoteItem> {
        self.items.iter().find(|item| item.key == key)
    }
}

/// What a single [`Repository::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The response became the current snapshot.
    Applied { sequence: u64, count: usize },
    /// The response arrived after a newer one had already been applied and
    /// was discarded.
    Stale { sequence: u64, latest: u64 },
    /// No token in the session; nothing was fetched.
    Skipped,
}

struct Inner {
    backend: BackendHandle,
    session: Session,
    /// Highest sequence number handed out so far.
    issued: AtomicU64,
    snapshot: watch::Sender<Snapshot>,
}

/// Cache of the remote listing, shared by cloning.
///
/// # Examples
///
/// ```no_run
/// use tabula_asyncutils::{Broadcaster, Scope};
/// use tabula_cache::Repository;
/// use tabula_storage::{BackendHandle, Session, Token};
///
/// # async fn example(backend: BackendHandle) {
/// let session = Session::new(Some(Token::new("token")));
/// let repository = Repository::new(backend, session);
/// let (broadcaster, scope) = (Broadcaster::new(), Scope::new());
/// repository.mount(&broadcaster, &scope);
///
/// let mut snapshots = repository.subscribe();
/// snapshots.changed().await.ok();
/// println!("{} items", snapshots.borrow().items().len());
/// # }
/// ```
#[derive(Clone)]
pub struct Repository {
    inner: Arc<Inner>,
}

impl Repository {
    pub fn new(backend: BackendHandle, session: Session) -> Self {
        let (snapshot, _rx) = watch::channel(Snapshot::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                session,
                issued: AtomicU64::new(0),
                snapshot,
            }),
        }
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.inner.backend
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// The current snapshot. Cheap: the item list is shared, not copied.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Watch for newly applied snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Look an item up by key in the current snapshot.
    pub fn get(&self, key: &str) -> Option<RemoteItem> {
        self.inner.snapshot.borrow().get(key).cloned()
    }

    /// Fetch the listing once and apply it unless a newer one got there first.
    ///
    /// On failure the error is logged, returned, and the current snapshot is
    /// left exactly as it was.
    #[instrument(skip(self), fields(backend = %self.inner.backend.name()))]
    pub async fn refresh(&self) -> Result<Outcome> {
        let Some(token) = self.inner.session.token() else {
            tracing::debug!("No session token; skipping fetch");
            return Ok(Outcome::Skipped);
        };
        let sequence = self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(sequence, "Fetching items");

        let raw = match self.inner.backend.list(Some(&token)).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(sequence, error = ?err, "Fetch failed; keeping previous snapshot");
                let name = self.inner.backend.name().to_string();
                let kind = if err.is_auth() { ErrorKind::Unauthorized(name) } else { ErrorKind::Fetch(name) };
                return Err(err).or_raise(|| kind);
            },
        };
        let items = normalize_all(raw);
        let count = items.len();

        let mut latest = sequence;
        let applied = self.inner.snapshot.send_if_modified(|snapshot| {
            if snapshot.sequence >= sequence {
                latest = snapshot.sequence;
                return false;
            }
            *snapshot = Snapshot { sequence, items: Arc::new(items) };
            true
        });
        if applied {
            tracing::info!(sequence, count, "Applied snapshot");
            Ok(Outcome::Applied { sequence, count })
        } else {
            tracing::debug!(sequence, latest, "Discarded stale response");
            Ok(Outcome::Stale { sequence, latest })
        }
    }

    /// Keep the cache current until every signal source is gone.
    ///
    /// Fetches once straight away, then again on every refresh signal and
    /// every time the session gains a token. Signals arriving while earlier
    /// fetches are in flight start new fetches concurrently; sequencing in
    /// [`refresh`](Self::refresh) sorts out which response wins.
    ///
    /// Dropping the future (or closing the scope it was bound to in
    /// [`mount`](Self::mount)) abandons in-flight fetches without touching
    /// the snapshot.
    pub async fn run(self, mut refreshes: Subscription) {
        let mut auth = self.inner.session.subscribe();
        let mut in_flight = FuturesUnordered::new();
        in_flight.push(self.refresh());

        let (mut refreshes_open, mut auth_open) = (true, true);
        loop {
            tokio::select! {
                signal = refreshes.recv(), if refreshes_open => match signal {
                    Some(()) => in_flight.push(self.refresh()),
                    None => refreshes_open = false,
                },
                changed = auth.changed(), if auth_open => match changed {
                    Ok(()) => {
                        let ready = auth.borrow_and_update().is_some();
                        if ready {
                            tracing::debug!("Session token available; fetching");
                            in_flight.push(self.refresh());
                        }
                    },
                    Err(_) => auth_open = false,
                },
                Some(_) = in_flight.next(), if !in_flight.is_empty() => {},
                else => break,
            }
        }
        tracing::debug!("Repository loop finished");
    }

    /// Spawn [`run`](Self::run), subscribed to `broadcaster` and bound to `scope`.
    pub fn mount(&self, broadcaster: &Broadcaster, scope: &Scope) -> JoinHandle<Option<()>> {
        scope.spawn(self.clone().run(broadcaster.subscribe()))
    }
}
