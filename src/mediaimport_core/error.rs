use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    // Setup errors (fatal, raised before anything is moved)
    #[error("Destination is a file, not a folder: {0}")]
    DestinationIsAFile(PathBuf),

    #[error("Filename already exists in destination: {0}")]
    FilenameExistsInDestination(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walker error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    // Import folder layout
    #[error("Invalid import folder: {0}")]
    InvalidImportFolder(String),

    #[error("Found unsupported files: {}", .0.join(", "))]
    UnsupportedFiles(Vec<String>),

    // External tools
    #[error("Exiftool error: {0}")]
    Exiftool(String),

    #[error("{tool} failed: {exit_code}; error: '{stderr}'")]
    ToolFailed {
        tool: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to run {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract metadata from {path}: {reason}")]
    MetadataExtraction { path: PathBuf, reason: String },

    #[error("Date parsing error: {0}")]
    InvalidDateFormat(String),

    // Sensitive locations file
    #[error("Sensitive locations file error: {0}")]
    SensitiveLocations(#[from] serde_json::Error),

    // Resuming an interrupted import
    #[error("No import journal in {0}; nothing to resume")]
    NoJournal(PathBuf),

    #[error("Import journal {path} is unreadable: {reason}")]
    InvalidJournal { path: PathBuf, reason: String },

    // User interaction
    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Argument error: {0}")]
    Argument(String),
}

impl ImportError {
    /// Setup failures abort the run before any file has been touched.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            ImportError::DestinationIsAFile(_) | ImportError::FilenameExistsInDestination(_)
        )
    }
}

/// Result type for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_files_message() {
        let err = ImportError::UnsupportedFiles(vec!["a.txt".to_string(), "b.psd".to_string()]);
        assert_eq!(err.to_string(), "Found unsupported files: a.txt, b.psd");
    }

    #[test]
    fn test_tool_failed_message() {
        let err = ImportError::ToolFailed {
            tool: "exiftool".to_string(),
            exit_code: 1,
            stderr: "bad tag".to_string(),
        };
        assert_eq!(err.to_string(), "exiftool failed: 1; error: 'bad tag'");
    }

    #[test]
    fn test_setup_failure_classification() {
        assert!(ImportError::DestinationIsAFile(PathBuf::from("/tmp/x")).is_setup_failure());
        assert!(ImportError::FilenameExistsInDestination("a.JPG".into()).is_setup_failure());
        assert!(!ImportError::Cancelled.is_setup_failure());
    }
}
