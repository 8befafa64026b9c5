use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;

/// A file handed to the pipeline: a name and its contents, fully in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), data: data.into() }
    }

    /// Read a local file, naming it after the last path component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        let data = tokio::fs::read(path).await.or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        Ok(Self { name, data })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Lowercase extension without the dot; empty if the name has none.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }
}

impl Debug for UploadFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("UploadFile").field("name", &self.name).field("size", &self.data.len()).finish()
    }
}

pub(crate) fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}
