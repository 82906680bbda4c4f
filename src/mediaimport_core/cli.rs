use crate::mediaimport_core::import::Stage;
use clap::{Parser, Subcommand, ValueEnum};
use simplelog::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Import camera originals and their edited exports into one folder")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable file logging to mediaimport.log
    #[arg(long = "log", global = true)]
    pub log: bool,

    /// Log level for file logging (debug, info, warn, error)
    #[arg(long, default_value_t = LevelFilter::Debug, global = true)]
    pub log_level: LevelFilter,

    /// Path to the exiftool executable
    #[arg(long, global = true)]
    pub exiftool: Option<PathBuf>,

    /// Path to the HandBrakeCLI executable
    #[arg(long, global = true)]
    pub handbrake: Option<PathBuf>,

    /// JSON file listing sensitive locations
    #[arg(long, global = true)]
    pub sensitive_locations: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check an import folder and list warnings without changing anything
    Check {
        /// Folder holding the originals and an 'Exported' subfolder
        #[arg(required = true)]
        import_folder: PathBuf,
    },

    /// Move originals and exports into a destination folder and convert videos.
    ///
    /// Exported images keep their names; original JPGs are renamed to NAME-org.JPG.
    /// Videos are re-encoded to NAME_V.MP4 next to the original. The import folder is
    /// removed once nothing is left in it.
    Import {
        /// Folder holding the originals and an 'Exported' subfolder
        #[arg(required = true)]
        import_folder: PathBuf,

        /// Destination folder (created if it doesn't exist)
        #[arg(required = true)]
        destination: PathBuf,

        /// Import even when there are warnings, without asking
        #[arg(long, short)]
        yes: bool,

        /// Continue an interrupted import from this stage
        #[arg(long, value_enum)]
        resume_from: Option<Stage>,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        report: ReportFormat,
    },

    /// Write a GPS location into media files
    SetLocation {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Remove GPS locations from media files
    ClearLocation {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Add or remove keywords
    Keywords {
        /// Keyword to add (repeatable)
        #[arg(long)]
        add: Vec<String>,

        /// Keyword to remove (repeatable)
        #[arg(long)]
        remove: Vec<String>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Set all capture dates to a local date and time ("YYYY-MM-DD HH:MM:SS")
    SetDate {
        #[arg(required = true)]
        date: String,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Manage sensitive locations
    Sensitive {
        #[command(subcommand)]
        command: SensitiveCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum SensitiveCommands {
    /// List stored sensitive locations
    List,

    /// Add a sensitive location
    Add {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ReportFormat {
    /// Per-stage summary and failures
    Text,
    /// Full run report as JSON
    Json,
}
