//! In-memory dataset backend for testing.

use crate::auth::Token;
use crate::backend::DatasetBackend;
use crate::error::{ErrorKind, Result};
use crate::models::{PreprocessReport, PreviewRow, RawItem, UploadReceipt};
use async_trait::async_trait;
use serde_json::{Map, Number, Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::oneshot;

/// How many rows `top_rows` returns.
const PREVIEW_ROWS: usize = 10;

type GateResult<T> = std::result::Result<T, ErrorKind>;

/// A request the mock has received, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Upload(String),
    Delete(String),
    BeginPreprocessing(String),
    TopRows(String),
}

/// Scripted response for the next `list` request.
enum ListScript {
    Fail(ErrorKind),
    Gate(oneshot::Receiver<GateResult<Vec<RawItem>>>),
}

/// Holds a `list` request open until the test decides how it completes.
///
/// Dropping the gate without resolving it fails the request with a network error.
#[must_use = "the gated request stays pending until the gate is resolved"]
pub struct ListGate(oneshot::Sender<GateResult<Vec<RawItem>>>);
impl ListGate {
    /// Complete the request with exactly these records.
    pub fn release(self, items: impl IntoIterator<Item = RawItem>) {
        let _ = self.0.send(Ok(items.into_iter().collect()));
    }

    pub fn fail(self, kind: ErrorKind) {
        let _ = self.0.send(Err(kind));
    }
}

/// Holds an `upload` request open until the test decides how it completes.
#[must_use = "the gated request stays pending until the gate is resolved"]
pub struct UploadGate(oneshot::Sender<GateResult<()>>);
impl UploadGate {
    /// Let the upload go through and store the file.
    pub fn release(self) {
        let _ = self.0.send(Ok(()));
    }

    pub fn fail(self, kind: ErrorKind) {
        let _ = self.0.send(Err(kind));
    }
}

#[derive(Default)]
struct State {
    items: Vec<RawItem>,
    data: HashMap<String, Vec<u8>>,
    lists: VecDeque<ListScript>,
    upload_gates: HashMap<String, oneshot::Receiver<GateResult<()>>>,
    upload_failures: HashMap<String, ErrorKind>,
    calls: Vec<Call>,
}

/// In-memory dataset backend for testing.
///
/// Holds a listing plus the bytes of anything uploaded through it. Individual
/// requests can be scripted to fail or to block until the test releases them,
/// which is how response ordering and in-flight behaviour get exercised
/// deterministically.
///
/// # Examples
///
/// ```
/// use tabula_storage::backend::{DatasetBackend, MockBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tabula_storage::error::Result<()> {
/// let backend = MockBackend::with_keys(["datasets/a.csv"]);
/// backend.upload(None, "b.csv", b"x,y\n1,2\n".to_vec()).await?;
/// assert_eq!(backend.list(None).await?.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    require_token: bool,
    state: Mutex<State>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with raw listing records.
    pub fn with_items(items: impl IntoIterator<Item = RawItem>) -> Self {
        Self {
            name: "mock".to_string(),
            require_token: false,
            state: Mutex::new(State {
                items: items.into_iter().collect(),
                ..State::default()
            }),
        }
    }

    /// Create a mock backend listing one `{key, name}` record per key.
    pub fn with_keys(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::with_items(keys.into_iter().map(|key| record(&key.into(), None)))
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Reject every request that arrives without a token.
    pub fn requiring_token(mut self) -> Self {
        self.require_token = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, token: Option<&Token>, call: Call) -> Result<()> {
        self.state().calls.push(call);
        if self.require_token && token.is_none() {
            exn::bail!(ErrorKind::Unauthorized);
        }
        Ok(())
    }

    /// Replace the stored listing.
    pub fn set_items(&self, items: impl IntoIterator<Item = RawItem>) {
        self.state().items = items.into_iter().collect();
    }

    /// Fail the next `list` request (after any already-scripted ones).
    pub fn fail_next_list(&self, kind: ErrorKind) {
        self.state().lists.push_back(ListScript::Fail(kind));
    }

    /// Block the next `list` request (after any already-scripted ones) until
    /// the returned gate is resolved.
    pub fn gate_next_list(&self) -> ListGate {
        let (tx, rx) = oneshot::channel();
        self.state().lists.push_back(ListScript::Gate(rx));
        ListGate(tx)
    }

    /// Block the upload of `file_name` until the returned gate is resolved.
    pub fn gate_upload(&self, file_name: impl Into<String>) -> UploadGate {
        let (tx, rx) = oneshot::channel();
        self.state().upload_gates.insert(file_name.into(), rx);
        UploadGate(tx)
    }

    /// Fail every upload of `file_name`.
    pub fn fail_upload(&self, file_name: impl Into<String>, kind: ErrorKind) {
        self.state().upload_failures.insert(file_name.into(), kind);
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Number of `list` requests received so far.
    pub fn list_count(&self) -> usize {
        self.state().calls.iter().filter(|call| matches!(call, Call::List)).count()
    }

    /// Raw bytes stored under `key` by a previous upload.
    pub fn data(&self, key: &str) -> Option<Vec<u8>> {
        self.state().data.get(key).cloned()
    }

    fn csv(&self, dataset_id: &str) -> Result<Csv> {
        let data = self.state().data.get(dataset_id).cloned();
        let Some(data) = data else {
            exn::bail!(ErrorKind::NotFound(format!("dataset {dataset_id} not found")));
        };
        Ok(Csv::parse(&String::from_utf8_lossy(&data)))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::with_items([])
    }
}

fn record(key: &str, uploaded: Option<OffsetDateTime>) -> RawItem {
    let name = key.rsplit('/').next().unwrap_or(key);
    let mut fields = Map::new();
    fields.insert("key".to_string(), json!(key));
    fields.insert("name".to_string(), json!(name));
    if let Some(uploaded) = uploaded.and_then(|at| at.format(&Rfc3339).ok()) {
        fields.insert("uploadedAt".to_string(), json!(uploaded));
    }
    RawItem::new(fields)
}

#[async_trait]
impl DatasetBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, token: Option<&Token>) -> Result<Vec<RawItem>> {
        self.check(token, Call::List)?;
        let script = self.state().lists.pop_front();
        match script {
            None => Ok(self.state().items.clone()),
            Some(ListScript::Fail(kind)) => Err(kind.into()),
            Some(ListScript::Gate(rx)) => match rx.await {
                Ok(Ok(items)) => Ok(items),
                Ok(Err(kind)) => Err(kind.into()),
                Err(_) => exn::bail!(ErrorKind::Network("gate dropped".to_string())),
            },
        }
    }

    async fn upload(&self, token: Option<&Token>, file_name: &str, data: Vec<u8>) -> Result<UploadReceipt> {
        self.check(token, Call::Upload(file_name.to_string()))?;
        let gate = self.state().upload_gates.remove(file_name);
        if let Some(rx) = gate {
            match rx.await {
                Ok(Ok(())) => {},
                Ok(Err(kind)) => return Err(kind.into()),
                Err(_) => exn::bail!(ErrorKind::Network("gate dropped".to_string())),
            }
        }
        if let Some(kind) = self.state().upload_failures.get(file_name).cloned() {
            return Err(kind.into());
        }

        let key = format!("datasets/{file_name}");
        let csv = Csv::parse(&String::from_utf8_lossy(&data));
        let mut state = self.state();
        state.items.retain(|item| item.field("key") != Some(&json!(key)));
        state.items.push(record(&key, Some(OffsetDateTime::now_utc())));
        state.data.insert(key.clone(), data);
        Ok(UploadReceipt {
            dataset_id: key,
            columns: csv.columns,
            original_filename: Some(file_name.to_string()),
            num_rows: Some(csv.rows.len() as u64),
        })
    }

    async fn delete(&self, token: Option<&Token>, key: &str) -> Result<()> {
        self.check(token, Call::Delete(key.to_string()))?;
        let mut state = self.state();
        let before = state.items.len();
        state.items.retain(|item| item.field("key") != Some(&json!(key)));
        if state.items.len() == before {
            exn::bail!(ErrorKind::NotFound(format!("{key} not found")));
        }
        state.data.remove(key);
        Ok(())
    }

    async fn begin_preprocessing(&self, token: Option<&Token>, dataset_id: &str) -> Result<PreprocessReport> {
        self.check(token, Call::BeginPreprocessing(dataset_id.to_string()))?;
        Ok(self.csv(dataset_id)?.report())
    }

    async fn top_rows(
        &self,
        token: Option<&Token>,
        dataset_id: &str,
        _target_column: Option<&str>,
    ) -> Result<Vec<PreviewRow>> {
        self.check(token, Call::TopRows(dataset_id.to_string()))?;
        Ok(self.csv(dataset_id)?.preview(PREVIEW_ROWS))
    }
}

/// Just enough CSV (no quoting) to fake the server's dataset profiling.
struct Csv {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Csv {
    fn parse(text: &str) -> Self {
        let mut lines = text.lines().map(|line| line.trim_end_matches('\r')).filter(|line| !line.is_empty());
        let split = |line: &str| line.split(',').map(|cell| cell.trim().to_string()).collect::<Vec<_>>();
        let columns = lines.next().map(split).unwrap_or_default();
        let rows = lines.map(split).collect();
        Self { columns, rows }
    }

    fn cells(&self, column: usize) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |row| row.get(column).map(String::as_str).unwrap_or_default())
    }

    fn numbers(&self, column: usize) -> Option<Vec<f64>> {
        let values: Vec<&str> = self.cells(column).filter(|cell| !cell.is_empty()).collect();
        let numbers: Vec<f64> = values.iter().filter_map(|cell| cell.parse().ok()).collect();
        (!numbers.is_empty() && numbers.len() == values.len()).then_some(numbers)
    }

    fn report(&self) -> PreprocessReport {
        let mut missing_values = BTreeMap::new();
        let mut column_types = BTreeMap::new();
        let mut summary = BTreeMap::new();
        for (index, column) in self.columns.iter().enumerate() {
            missing_values.insert(column.clone(), self.cells(index).filter(|cell| cell.is_empty()).count() as u64);
            let Some(numbers) = self.numbers(index) else {
                column_types.insert(column.clone(), "object".to_string());
                continue;
            };
            column_types.insert(column.clone(), "float64".to_string());
            let count = numbers.len() as f64;
            let stats = BTreeMap::from([
                ("count".to_string(), Some(count)),
                ("mean".to_string(), Some(numbers.iter().sum::<f64>() / count)),
                ("min".to_string(), numbers.iter().copied().reduce(f64::min)),
                ("max".to_string(), numbers.iter().copied().reduce(f64::max)),
            ]);
            summary.insert(column.clone(), stats);
        }
        PreprocessReport {
            message: "Preprocessing complete".to_string(),
            missing_values,
            column_types,
            num_rows: self.rows.len() as u64,
            columns: self.columns.clone(),
            summary: Some(summary),
        }
    }

    fn preview(&self, limit: usize) -> Vec<PreviewRow> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| (column.clone(), cell_value(row.get(index).map(String::as_str))))
                    .collect()
            })
            .collect()
    }
}

fn cell_value(cell: Option<&str>) -> Value {
    match cell {
        None | Some("") => Value::Null,
        Some(cell) => {
            if let Ok(int) = cell.parse::<i64>() {
                Value::from(int)
            } else if let Some(number) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(number)
            } else {
                Value::String(cell.to_string())
            }
        },
    }
}
