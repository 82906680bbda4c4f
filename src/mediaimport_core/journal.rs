use crate::mediaimport_core::error::{ImportError, Result};
use crate::mediaimport_core::exif::MediaReader;
use crate::mediaimport_core::import::{Stage, generate_destination_name};
use crate::mediaimport_core::media::{MediaDescriptor, detect_media_kind};
use crate::mediaimport_core::scan::{EXPORTED_FOLDER_NAME, ImportSet, read_or_bare};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Hidden, so the destination's name-conflict check never sees it.
pub const JOURNAL_FILE_NAME: &str = ".mediaimport-journal.json";

/// The files an import was started with, saved in the destination so an interrupted import
/// can be picked up again once the import folder no longer holds everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJournal {
    pub import_folder: PathBuf,
    /// File names at the top of the import folder.
    pub originals: Vec<String>,
    /// File names in `Exported/`.
    pub exported: Vec<String>,
    pub last_completed: Option<Stage>,
}

impl ImportJournal {
    pub fn from_set(set: &ImportSet) -> Self {
        Self {
            import_folder: std::path::absolute(&set.import_folder)
                .unwrap_or_else(|_| set.import_folder.clone()),
            originals: set.originals.iter().map(|m| m.name()).collect(),
            exported: set.exported.iter().map(|m| m.name()).collect(),
            last_completed: None,
        }
    }

    pub fn path(destination: &Path) -> PathBuf {
        destination.join(JOURNAL_FILE_NAME)
    }

    pub fn load(destination: &Path) -> Result<Self> {
        let path = Self::path(destination);
        if !path.is_file() {
            return Err(ImportError::NoJournal(destination.to_path_buf()));
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|e| ImportError::InvalidJournal {
            path,
            reason: e.to_string(),
        })
    }

    pub fn save(&self, destination: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ImportError::InvalidJournal {
            path: Self::path(destination),
            reason: e.to_string(),
        })?;
        fs::write(Self::path(destination), json)?;
        Ok(())
    }

    pub fn remove(&self, destination: &Path) -> Result<()> {
        let path = Self::path(destination);
        if path.exists() {
            fs::remove_file(&path)?;
            log::debug!("Removed import journal {}", path.display());
        }
        Ok(())
    }

    /// Rebuild the import set. Descriptors keep their import-folder paths; metadata is read
    /// from the destination for files that were already moved.
    pub fn rebuild_set(&self, destination: &Path, reader: &mut dyn MediaReader) -> ImportSet {
        let exported_folder = self.import_folder.join(EXPORTED_FOLDER_NAME);
        let originals = self
            .originals
            .iter()
            .map(|name| {
                let moved_to = destination.join(generate_destination_name(name, true));
                locate(reader, self.import_folder.join(name), &moved_to)
            })
            .collect();
        let exported = self
            .exported
            .iter()
            .map(|name| {
                let moved_to = destination.join(generate_destination_name(name, false));
                locate(reader, exported_folder.join(name), &moved_to)
            })
            .collect();

        ImportSet {
            import_folder: self.import_folder.clone(),
            originals,
            exported,
        }
    }
}

fn locate(reader: &mut dyn MediaReader, source: PathBuf, moved_to: &Path) -> MediaDescriptor {
    let current = if !source.exists() && moved_to.exists() {
        moved_to.to_path_buf()
    } else {
        source.clone()
    };
    let kind = detect_media_kind(&source);
    let mut media = read_or_bare(reader, current, kind);
    media.path = source;
    media
}
