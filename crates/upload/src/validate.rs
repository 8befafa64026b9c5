use crate::file::UploadFile;
use derive_more::{Display, Error};

pub const DEFAULT_MAX_FILES: usize = 10;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Why a file was refused before it got anywhere near the network.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// More files were dropped at once than the pipeline accepts in one go.
    #[display("too many files")]
    TooManyFiles { max: usize },
    #[display("file too large")]
    FileTooLarge { size: u64, max: u64 },
    #[display("invalid extension")]
    InvalidExtension { extension: String },
}

/// A file that failed validation, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub file: UploadFile,
    pub error: ValidationError,
}

/// What an `enqueue` call will accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraints {
    pub max_files: usize,
    pub max_file_size: u64,
    /// Lowercase, without the leading dot. Empty accepts any extension.
    pub allowed_extensions: Vec<String>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: vec!["csv".to_string()],
        }
    }
}

impl Constraints {
    pub fn new(max_files: usize, max_file_size: u64, allowed_extensions: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            max_files,
            max_file_size,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions.is_empty() || self.allowed_extensions.iter().any(|allowed| allowed == extension)
    }

    /// Check one file on its own merits (extension, then size).
    pub fn check(&self, file: &UploadFile) -> Result<(), ValidationError> {
        let extension = file.extension();
        if !self.allows_extension(&extension) {
            return Err(ValidationError::InvalidExtension { extension });
        }
        if file.size() > self.max_file_size {
            return Err(ValidationError::FileTooLarge { size: file.size(), max: self.max_file_size });
        }
        Ok(())
    }

    /// Split one drop into accepted files (in their original order) and rejections.
    ///
    /// Files are checked individually first. If more files pass than
    /// `max_files` allows, every one of them is rejected as
    /// [`TooManyFiles`](ValidationError::TooManyFiles): there is no sensible
    /// way to pick which ones the user meant.
    pub fn validate(&self, files: impl IntoIterator<Item = UploadFile>) -> (Vec<UploadFile>, Vec<Rejection>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for file in files {
            match self.check(&file) {
                Ok(()) => accepted.push(file),
                Err(error) => rejected.push(Rejection { file, error }),
            }
        }
        if accepted.len() > self.max_files {
            let max = self.max_files;
            rejected.extend(
                accepted.drain(..).map(|file| Rejection { file, error: ValidationError::TooManyFiles { max } }),
            );
        }
        (accepted, rejected)
    }
}
