use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Kind of a media file, fixed when the descriptor is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Unknown,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A GPS position in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn latitude_ref(&self) -> &'static str {
        if self.latitude < 0.0 { "S" } else { "N" }
    }

    pub fn longitude_ref(&self) -> &'static str {
        if self.longitude < 0.0 { "W" } else { "E" }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// Image file extensions (lowercase).
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "heic", "heif",
    // RAW formats
    "dng", "cr2", "nef", "arw", "raf", "orf", "rw2",
];

/// Video file extensions (lowercase).
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mts", "m2ts", "3gp"];

/// Detect the media kind of a file from its extension.
pub fn detect_media_kind(path: &Path) -> MediaKind {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return MediaKind::Unknown;
    };
    let ext_lower = ext.to_lowercase();

    if IMAGE_EXTENSIONS.contains(&ext_lower.as_str()) {
        MediaKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext_lower.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Unknown
    }
}

/// One media file on disk and the metadata read from it.
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    pub path: PathBuf,
    media_kind: MediaKind,
    /// Capture time embedded in the file's metadata.
    pub timestamp: Option<OffsetDateTime>,
    /// Filesystem modification time.
    pub file_timestamp: OffsetDateTime,
    pub location: Option<Location>,
    pub keywords: Option<BTreeSet<String>>,
    pub compatible_brands: BTreeSet<String>,
    /// Video rotation in degrees, as stored by the camera.
    pub rotation: Option<i32>,
}

impl MediaDescriptor {
    /// Descriptor built from the filesystem alone, with no embedded metadata.
    pub fn bare(path: PathBuf, media_kind: MediaKind) -> Self {
        let file_timestamp = file_modified_time(&path);
        Self {
            path,
            media_kind,
            timestamp: None,
            file_timestamp,
            location: None,
            keywords: None,
            compatible_brands: BTreeSet::new(),
            rotation: None,
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn is_video(&self) -> bool {
        self.media_kind == MediaKind::Video
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    pub fn name_without_extension(&self) -> String {
        self.path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    /// Join key between the originals and the exported set.
    pub fn base_name(&self) -> String {
        self.name_without_extension()
    }

    /// Whole-second comparison of the metadata and filesystem times.
    /// A file without a metadata timestamp never matches.
    pub fn do_file_and_metadata_timestamps_match(&self) -> bool {
        match self.timestamp {
            Some(ts) => ts.unix_timestamp() == self.file_timestamp.unix_timestamp(),
            None => false,
        }
    }

    /// Replace the metadata-derived fields with freshly read ones, keeping the kind.
    pub fn refresh_from(&mut self, fresh: MediaDescriptor) {
        self.timestamp = fresh.timestamp;
        self.file_timestamp = fresh.file_timestamp;
        self.location = fresh.location;
        self.keywords = fresh.keywords;
        self.compatible_brands = fresh.compatible_brands;
        self.rotation = fresh.rotation;
    }
}

/// Modification time of a file, or the Unix epoch when it cannot be read.
pub fn file_modified_time(path: &Path) -> OffsetDateTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(OffsetDateTime::from)
        .unwrap_or_else(|e| {
            log::debug!("No modification time for {}: {}", path.display(), e);
            OffsetDateTime::UNIX_EPOCH
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_detect_image_extensions() {
        assert_eq!(detect_media_kind(Path::new("photo.jpg")), MediaKind::Image);
        assert_eq!(detect_media_kind(Path::new("IMG_0001.JPG")), MediaKind::Image);
        assert_eq!(detect_media_kind(Path::new("photo.HEIC")), MediaKind::Image);
        assert_eq!(detect_media_kind(Path::new("photo.cr2")), MediaKind::Image);
    }

    #[test]
    fn test_detect_video_extensions() {
        assert_eq!(detect_media_kind(Path::new("MVI_0002.MOV")), MediaKind::Video);
        assert_eq!(detect_media_kind(Path::new("clip.mp4")), MediaKind::Video);
        assert_eq!(detect_media_kind(Path::new("clip.MTS")), MediaKind::Video);
    }

    #[test]
    fn test_detect_unknown_extension() {
        assert_eq!(detect_media_kind(Path::new("notes.txt")), MediaKind::Unknown);
        assert_eq!(detect_media_kind(Path::new("Makefile")), MediaKind::Unknown);
    }

    #[test]
    fn test_names() {
        let md = MediaDescriptor::bare(PathBuf::from("/import/IMG_0001.JPG"), MediaKind::Image);
        assert_eq!(md.name(), "IMG_0001.JPG");
        assert_eq!(md.name_without_extension(), "IMG_0001");
        assert_eq!(md.base_name(), "IMG_0001");
    }

    #[test]
    fn test_timestamps_match() {
        let mut md = MediaDescriptor::bare(PathBuf::from("/nope/a.jpg"), MediaKind::Image);
        md.file_timestamp = datetime!(2024-05-21 12:30:00.250 UTC);
        assert!(!md.do_file_and_metadata_timestamps_match());

        md.timestamp = Some(datetime!(2024-05-21 14:30:00 +02:00));
        assert!(md.do_file_and_metadata_timestamps_match());

        md.timestamp = Some(datetime!(2024-05-21 12:31:00 UTC));
        assert!(!md.do_file_and_metadata_timestamps_match());
    }

    #[test]
    fn test_refresh_keeps_kind() {
        let mut md = MediaDescriptor::bare(PathBuf::from("/nope/a.mov"), MediaKind::Video);
        let mut fresh = MediaDescriptor::bare(PathBuf::from("/nope/a.mov"), MediaKind::Unknown);
        fresh.location = Some(Location::new(47.6, -122.3));
        fresh.rotation = Some(90);
        md.refresh_from(fresh);
        assert_eq!(md.media_kind(), MediaKind::Video);
        assert_eq!(md.rotation, Some(90));
        assert_eq!(md.location.unwrap().longitude_ref(), "W");
    }
}
