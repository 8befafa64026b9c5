//! Storage models.
//!
//! [`RawItem`] is what the listing endpoint hands back (field names vary
//! between server versions), [`RemoteItem`] is the canonical shape everything
//! downstream works with. The remaining types are the response bodies of the
//! upload and preprocessing endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::OffsetDateTime;

/// One record from the listing endpoint, exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem(Map<String, Value>);
impl RawItem {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value, returning `None` for anything that isn't an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Raw field lookup. `null` is reported as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}
impl From<Map<String, Value>> for RawItem {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// What kind of thing a [`RemoteItem`] is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Folder,
    /// Lowercase file extension or declared (content) type, e.g. `csv`, `pkl`, `text/csv`.
    File(String),
}
impl Kind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Folder => "folder",
            Self::File(kind) => kind,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder)
    }
}
impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A normalized entry in the remote storage namespace.
///
/// `key` is the identity: unique within one repository snapshot and stable
/// across refreshes, which is what selection is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub key: String,
    /// Identifier the preprocessing endpoints expect, when it differs from the key.
    pub dataset_id: Option<String>,
    pub name: String,
    pub kind: Kind,
    pub modified: Option<OffsetDateTime>,
    pub download_url: Option<String>,
    pub size: Option<u64>,
}
impl RemoteItem {
    /// Minimal item; everything else is derived the same way the normalizer would.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let name = crate::normalize::name_from_key(&key);
        let kind = crate::normalize::kind_from_name(&key, &name);
        Self {
            key,
            dataset_id: None,
            name,
            kind,
            modified: None,
            download_url: None,
            size: None,
        }
    }

    pub fn with_modified(mut self, modified: impl Into<Option<OffsetDateTime>>) -> Self {
        self.modified = modified.into();
        self
    }

    /// The identifier to send to `begin_preprocessing`/`top_rows`.
    pub fn dataset_id(&self) -> &str {
        self.dataset_id.as_deref().unwrap_or(&self.key)
    }
}

/// Response of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub dataset_id: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub num_rows: Option<u64>,
}

/// Response of `begin_preprocessing`: a per-column profile of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessReport {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub missing_values: BTreeMap<String, u64>,
    #[serde(default)]
    pub column_types: BTreeMap<String, String>,
    #[serde(default)]
    pub num_rows: u64,
    #[serde(default)]
    pub columns: Vec<String>,
    /// column → statistic → value. Statistics that don't apply come back as `null`.
    #[serde(default)]
    pub summary: Option<BTreeMap<String, BTreeMap<String, Option<f64>>>>,
}

/// One row of a dataset preview: column → cell value.
pub type PreviewRow = Map<String, Value>;
