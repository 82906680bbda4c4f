use crate::mediaimport_core::media::MediaDescriptor;
use crate::mediaimport_core::sensitive::SensitiveLocationOracle;
use serde::Serialize;
use std::collections::BTreeMap;

/// Compatible brand written by Canon cameras that store local time as UTC in videos.
pub const CANON_VIDEO_BRAND: &str = "CAEP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    NotInExported,
    CanonMovieTimestamp,
    NoMatchingOriginal,
    MismatchedTimestamps,
    MissingLocation,
    SensitiveLocation,
    VideoInExported,
}

/// One advisory finding about the import set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub file: String,
}

impl Warning {
    fn new(kind: WarningKind, file: String) -> Self {
        Self { kind, file }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file = &self.file;
        match self.kind {
            WarningKind::NotInExported => {
                write!(f, "Original file {file} not in exported list")
            }
            WarningKind::CanonMovieTimestamp => write!(
                f,
                "Original file {file} is a Canon movie - the timestamp will need to be adjusted to UTC"
            ),
            WarningKind::NoMatchingOriginal => {
                write!(f, "Exported file {file} has no matching file in original list")
            }
            WarningKind::MismatchedTimestamps => {
                write!(f, "Exported file {file} has mismatched timestamps")
            }
            WarningKind::MissingLocation => write!(f, "Exported file {file} is missing location"),
            WarningKind::SensitiveLocation => {
                write!(f, "Exported file {file} is in a sensitive location")
            }
            WarningKind::VideoInExported => write!(f, "Videos in Exported are ignored: {file}"),
        }
    }
}

/// Cross-check originals against exports. Nothing is modified.
///
/// Passes run in a fixed order. The name-matching passes walk base names in sorted order and
/// the per-export passes follow input order, so the output is deterministic. Duplicate base
/// names within one set collapse to the last entry.
pub fn find_warnings(
    originals: &[MediaDescriptor],
    exported: &[MediaDescriptor],
    oracle: &dyn SensitiveLocationOracle,
) -> Vec<Warning> {
    let original_names = by_base_name(originals);
    let exported_names = by_base_name(exported);
    let mut result = Vec::new();

    // Videos from the editor come back with export-time dates, an odd location tag and a
    // re-encode, so they are reported and left out of the import.

    for (base, original) in &original_names {
        if !original.is_video() && !exported_names.contains_key(base) {
            result.push(Warning::new(WarningKind::NotInExported, original.name()));
        }
    }

    for original in original_names.values() {
        if original.is_video() && original.compatible_brands.contains(CANON_VIDEO_BRAND) {
            result.push(Warning::new(WarningKind::CanonMovieTimestamp, original.name()));
        }
    }

    for (base, export) in &exported_names {
        if !original_names.contains_key(base) {
            result.push(Warning::new(WarningKind::NoMatchingOriginal, export.name()));
        }
    }

    for export in exported {
        if !export.do_file_and_metadata_timestamps_match() {
            result.push(Warning::new(WarningKind::MismatchedTimestamps, export.name()));
        }
        match &export.location {
            None => result.push(Warning::new(WarningKind::MissingLocation, export.name())),
            Some(location) if oracle.is_sensitive(location) => {
                result.push(Warning::new(WarningKind::SensitiveLocation, export.name()))
            }
            Some(_) => {}
        }
    }

    for export in exported {
        if export.is_video() {
            result.push(Warning::new(WarningKind::VideoInExported, export.name()));
        }
    }

    result
}

fn by_base_name(media: &[MediaDescriptor]) -> BTreeMap<String, &MediaDescriptor> {
    media.iter().map(|m| (m.base_name(), m)).collect()
}
