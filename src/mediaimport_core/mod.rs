pub mod checker;
pub mod cli;
pub mod config;
pub mod error;
pub mod exif;
pub mod import;
pub mod journal;
pub mod media;
pub mod progress;
pub mod scan;
pub mod sensitive;
pub mod tools;

pub use checker::{Warning, WarningKind, find_warnings};
pub use cli::{Cli, Commands};
pub use config::ToolConfig;
pub use error::{ImportError, Result};
pub use exif::{ExifToolReader, FilesystemReader, MediaReader, default_reader};
pub use import::{FileOutcome, Importer, OutcomeStatus, RunReport, Stage, StageReport};
pub use journal::ImportJournal;
pub use media::{Location, MediaDescriptor, MediaKind};
pub use progress::{ChannelProgress, ImportProgress, LogProgress, ProgressEvent};
pub use scan::{ImportSet, load_import_folder};
pub use sensitive::{SensitiveLocationOracle, SensitiveLocations};
pub use tools::{CommandInvoker, ExternalTools, ProcessOutput, ToolInvoker};
