use crate::mediaimport_core::checker::{Warning, find_warnings};
use crate::mediaimport_core::error::{ImportError, Result};
use crate::mediaimport_core::exif::MediaReader;
use crate::mediaimport_core::media::{MediaDescriptor, MediaKind, detect_media_kind};
use crate::mediaimport_core::sensitive::SensitiveLocationOracle;
use crate::mediaimport_core::tools::set_file_date_to_metadata_date;
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;

/// Name of the subfolder holding the photo editor's exports.
pub const EXPORTED_FOLDER_NAME: &str = "Exported";

/// The two media sets read from an import folder.
#[derive(Debug)]
pub struct ImportSet {
    pub import_folder: PathBuf,
    pub originals: Vec<MediaDescriptor>,
    pub exported: Vec<MediaDescriptor>,
}

impl ImportSet {
    pub fn warnings(&self, oracle: &dyn SensitiveLocationOracle) -> Vec<Warning> {
        find_warnings(&self.originals, &self.exported, oracle)
    }

    /// Start of a destination folder name, "YYYY-MM-DD ", from the first export (or the first
    /// original when nothing was exported). The user completes it with a description.
    pub fn suggested_folder_name(&self) -> Option<String> {
        let ts = self.reference_timestamp()?;
        let date = ts.format(format_description!("[year]-[month]-[day]")).ok()?;
        Some(format!("{} ", date))
    }

    pub fn suggested_year(&self) -> Option<String> {
        self.reference_timestamp().map(|ts| ts.year().to_string())
    }

    fn reference_timestamp(&self) -> Option<time::OffsetDateTime> {
        self.exported
            .first()
            .or_else(|| self.originals.first())
            .and_then(|m| m.timestamp)
    }
}

/// Read an import folder: originals at the top level plus a single `Exported` subfolder.
pub fn load_import_folder(folder: &Path, reader: &mut dyn MediaReader) -> Result<ImportSet> {
    log::info!("Loading import folder {}", folder.display());
    if !folder.is_dir() {
        return Err(ImportError::InvalidImportFolder(format!(
            "'{}' is not a folder",
            folder.display()
        )));
    }

    let (folders, original_files) = folders_and_files(folder)?;
    if folders.len() != 1 {
        return Err(ImportError::InvalidImportFolder(format!(
            "Import supports only a single folder, found {}",
            folders.len()
        )));
    }
    let exported_folder = &folders[0];
    if exported_folder.file_name().and_then(|n| n.to_str()) != Some(EXPORTED_FOLDER_NAME) {
        return Err(ImportError::InvalidImportFolder(format!(
            "Import requires a folder named '{}'; found '{}'",
            EXPORTED_FOLDER_NAME,
            exported_folder.display()
        )));
    }

    let (exported_subfolders, exported_files) = folders_and_files(exported_folder)?;
    if !exported_subfolders.is_empty() {
        return Err(ImportError::InvalidImportFolder(format!(
            "The '{}' folder has at least one subfolder - but shouldn't have any",
            EXPORTED_FOLDER_NAME
        )));
    }

    let mut unsupported = Vec::new();
    let mut has_videos = false;
    let mut originals = Vec::new();
    for path in original_files {
        match detect_media_kind(&path) {
            MediaKind::Unknown => unsupported.push(file_name(&path)),
            kind => {
                has_videos |= kind == MediaKind::Video;
                originals.push(read_or_bare(reader, path, kind));
            }
        }
    }

    let mut exported = Vec::new();
    for path in exported_files {
        match detect_media_kind(&path) {
            MediaKind::Unknown => unsupported.push(file_name(&path)),
            kind => {
                let mut media = read_or_bare(reader, path, kind);
                align_file_date(reader, &mut media);
                exported.push(media);
            }
        }
    }

    if !unsupported.is_empty() {
        return Err(ImportError::UnsupportedFiles(unsupported));
    }
    if exported.is_empty() && !has_videos {
        return Err(ImportError::InvalidImportFolder(
            "No exported files were found".to_string(),
        ));
    }

    log::info!(
        "Found {} originals and {} exported files",
        originals.len(),
        exported.len()
    );
    Ok(ImportSet {
        import_folder: folder.to_path_buf(),
        originals,
        exported,
    })
}

/// Split the visible children of `dir` into folders and files, each sorted by name.
pub fn folders_and_files(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut folders = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if is_hidden(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if entry.file_type()?.is_dir() {
            folders.push(entry.path());
        } else {
            files.push(entry.path());
        }
    }
    folders.sort();
    files.sort();
    Ok((folders, files))
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

pub(crate) fn read_or_bare(
    reader: &mut dyn MediaReader,
    path: PathBuf,
    kind: MediaKind,
) -> MediaDescriptor {
    match reader.read(&path) {
        Ok(mut media) => {
            // Kind always comes from the extension
            if media.media_kind() != kind {
                let mut bare = MediaDescriptor::bare(path, kind);
                bare.refresh_from(media);
                media = bare;
            }
            media
        }
        Err(e) => {
            log::warn!("Failed to read metadata for {}: {}", path.display(), e);
            MediaDescriptor::bare(path, kind)
        }
    }
}

/// Exports often carry the export time as their file date; reset it to the capture time.
fn align_file_date(reader: &mut dyn MediaReader, media: &mut MediaDescriptor) {
    if media.do_file_and_metadata_timestamps_match() {
        return;
    }
    let Some(ts) = media.timestamp else {
        return;
    };
    match set_file_date_to_metadata_date(&media.path, ts) {
        Ok(()) => {
            log::debug!("Reset file date of {}", media.path.display());
            if let Err(e) = reader.reload(media) {
                log::warn!("Failed to re-read {}: {}", media.path.display(), e);
            }
        }
        Err(e) => log::warn!("Failed to set file date of {}: {}", media.path.display(), e),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}
