use crate::mediaimport_core::config::ToolConfig;
use crate::mediaimport_core::error::{ImportError, Result};
use crate::mediaimport_core::media::{Location, MediaDescriptor, MediaKind, detect_media_kind};
use exiftool::ExifTool;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Date format used in EXIF data.
pub const EXIF_DATE_FORMAT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");

const EXIF_OFFSET_FORMAT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[offset_hour]:[offset_minute]");

/// Reads media metadata from disk. The pipeline re-reads files through this after a tool
/// rewrites them.
pub trait MediaReader {
    fn read(&mut self, path: &Path) -> Result<MediaDescriptor>;

    /// Re-read a file in place; the descriptor keeps its original kind.
    fn reload(&mut self, descriptor: &mut MediaDescriptor) -> Result<()> {
        let fresh = self.read(&descriptor.path)?;
        descriptor.refresh_from(fresh);
        Ok(())
    }
}

/// Raw exiftool output. Several tags come back as strings, numbers or arrays.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct RawExifInfo {
    #[serde(default)]
    date_time_original: String,
    #[serde(default)]
    create_date: String,
    #[serde(default)]
    offset_time_original: Option<String>,
    #[serde(default)]
    offset_time: Option<String>,
    #[serde(rename = "GPSLatitude", default)]
    gps_latitude: Option<Value>,
    #[serde(rename = "GPSLongitude", default)]
    gps_longitude: Option<Value>,
    #[serde(default)]
    keywords: Option<Value>,
    #[serde(default)]
    subject: Option<Value>,
    #[serde(default)]
    compatible_brands: Option<Value>,
    #[serde(default)]
    rotation: Option<Value>,
}

/// `MediaReader` backed by a long-running exiftool process.
pub struct ExifToolReader {
    exiftool: ExifTool,
}

impl ExifToolReader {
    /// Start `exiftool` from the given executable (a bare name is looked up on PATH).
    pub fn with_executable(exiftool: &Path) -> Result<Self> {
        let exiftool = ExifTool::with_executable(exiftool).map_err(|e| {
            ImportError::Exiftool(format!("cannot start {}: {}", exiftool.display(), e))
        })?;
        Ok(Self { exiftool })
    }
}

impl MediaReader for ExifToolReader {
    fn read(&mut self, path: &Path) -> Result<MediaDescriptor> {
        let raw: RawExifInfo = self.exiftool.read_metadata(path, &[]).map_err(|e| {
            ImportError::MetadataExtraction {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        Ok(descriptor_from_raw(path, detect_media_kind(path), raw))
    }
}

/// Reader used when exiftool is not installed: kinds and file times only.
pub struct FilesystemReader;

impl MediaReader for FilesystemReader {
    fn read(&mut self, path: &Path) -> Result<MediaDescriptor> {
        if !path.is_file() {
            return Err(ImportError::NotAFile(path.to_path_buf()));
        }
        Ok(MediaDescriptor::bare(path.to_path_buf(), detect_media_kind(path)))
    }
}

/// Prefer the configured exiftool, falling back to filesystem-only metadata.
pub fn default_reader(config: &ToolConfig) -> Box<dyn MediaReader> {
    match ExifToolReader::with_executable(&config.exiftool) {
        Ok(reader) => Box::new(reader),
        Err(e) => {
            log::warn!("{}; metadata will not be read", e);
            Box::new(FilesystemReader)
        }
    }
}

fn descriptor_from_raw(path: &Path, kind: MediaKind, raw: RawExifInfo) -> MediaDescriptor {
    let mut descriptor = MediaDescriptor::bare(path.to_path_buf(), kind);

    descriptor.timestamp = if kind == MediaKind::Video {
        // QuickTime dates are stored in UTC
        parse_exif_date(&raw.create_date, Some(UtcOffset::UTC)).ok()
    } else {
        parse_exif_date_with_offset(&raw.create_date, raw.offset_time.as_deref())
            .or_else(|_| {
                parse_exif_date_with_offset(
                    &raw.date_time_original,
                    raw.offset_time_original.as_deref(),
                )
            })
            .ok()
    };
    if descriptor.timestamp.is_none() {
        log::debug!("No metadata timestamp in {}", path.display());
    }

    let lat = raw.gps_latitude.as_ref().and_then(value_to_f64);
    let lon = raw.gps_longitude.as_ref().and_then(value_to_f64);
    descriptor.location = match (lat, lon) {
        (Some(latitude), Some(longitude)) => Some(Location::new(latitude, longitude)),
        _ => None,
    };

    let mut keywords = BTreeSet::new();
    for value in [raw.keywords.as_ref(), raw.subject.as_ref()].into_iter().flatten() {
        keywords.extend(value_to_strings(value));
    }
    descriptor.keywords = if keywords.is_empty() { None } else { Some(keywords) };

    descriptor.compatible_brands = raw
        .compatible_brands
        .as_ref()
        .map(value_to_strings)
        .unwrap_or_default();

    descriptor.rotation = raw.rotation.as_ref().and_then(value_to_i32);
    descriptor
}

/// Parse an EXIF date, using the offset tag when present and the local offset otherwise.
fn parse_exif_date_with_offset(date_str: &str, offset_str: Option<&str>) -> Result<OffsetDateTime> {
    let offset = match offset_str {
        Some(o) if !o.is_empty() => UtcOffset::parse(o, EXIF_OFFSET_FORMAT)
            .unwrap_or_else(|_| local_offset()),
        _ => local_offset(),
    };
    parse_exif_date(date_str, Some(offset))
}

fn parse_exif_date(date_str: &str, offset: Option<UtcOffset>) -> Result<OffsetDateTime> {
    if date_str.is_empty() {
        return Err(ImportError::InvalidDateFormat("empty date".to_string()));
    }
    // exiftool reports unset QuickTime dates as all zeroes
    if date_str.starts_with("0000:00:00") {
        return Err(ImportError::InvalidDateFormat(format!("unset date '{}'", date_str)));
    }

    // Ignore trailing subseconds or offsets, e.g. "2024:05:21 12:30:00+02:00"
    let trimmed = date_str.get(..19).unwrap_or(date_str);
    let date_time = PrimitiveDateTime::parse(trimmed, EXIF_DATE_FORMAT)
        .map_err(|e| ImportError::InvalidDateFormat(e.to_string()))?;

    Ok(date_time.assume_offset(offset.unwrap_or_else(local_offset)))
}

/// Get the local timezone offset, falling back to UTC if unavailable.
pub fn local_offset() -> UtcOffset {
    OffsetDateTime::now_local()
        .map(|dt| dt.offset())
        .unwrap_or(UtcOffset::UTC)
}

/// Helper to extract f64 from Value (handles both string and number)
fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_gps_string(s).or_else(|| s.trim().parse().ok()),
        _ => None,
    }
}

/// Parse GPS string like "45 deg 30' 16.91\" N" to decimal degrees
fn parse_gps_string(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    let degrees: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[2].trim_end_matches('\'').parse().ok()?;
    let seconds: f64 = parts[3].trim_end_matches('"').trim_end_matches('\'').parse().ok()?;
    let direction = parts.get(4).and_then(|s| s.chars().next());

    let result = degrees + (minutes / 60.0) + (seconds / 3600.0);

    // South and West are negative
    match direction {
        Some('S') | Some('W') => Some(-result),
        _ => Some(result),
    }
}

fn value_to_i32(v: &Value) -> Option<i32> {
    match v {
        Value::Number(n) => n.as_i64().map(|i| i as i32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Tags such as Keywords are a string for one entry and an array for several.
fn value_to_strings(v: &Value) -> BTreeSet<String> {
    match v {
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Number(n) => BTreeSet::from([n.to_string()]),
        _ => BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use serde_json::json;

    #[test]
    fn test_reader_uses_configured_exiftool() {
        let missing = Path::new("/nonexistent/bin/exiftool");
        match ExifToolReader::with_executable(missing) {
            Err(ImportError::Exiftool(msg)) => assert!(msg.contains("/nonexistent/bin/exiftool")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("started exiftool from a path that does not exist"),
        }
    }

    #[test]
    fn test_default_reader_falls_back_for_missing_exiftool() {
        let temp = assert_fs::TempDir::new().unwrap();
        let photo = temp.child("IMG_0001.JPG");
        photo.write_str("not really a jpeg").unwrap();
        let config = ToolConfig {
            exiftool: std::path::PathBuf::from("/nonexistent/bin/exiftool"),
            ..ToolConfig::default()
        };

        let mut reader = default_reader(&config);
        let media = reader.read(photo.path()).unwrap();
        assert_eq!(media.media_kind(), MediaKind::Image);
        assert!(media.timestamp.is_none());
        assert!(matches!(
            reader.read(&temp.path().join("missing.JPG")),
            Err(ImportError::NotAFile(_))
        ));
    }

    #[test]
    fn test_parse_exif_date_with_offset() {
        let dt = parse_exif_date_with_offset("2024:05:21 12:30:00", Some("+09:00")).unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month() as u8, 5);
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.offset(), UtcOffset::from_hms(9, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_exif_date_rejects_empty_and_zero() {
        assert!(parse_exif_date("", None).is_err());
        assert!(parse_exif_date("0000:00:00 00:00:00", Some(UtcOffset::UTC)).is_err());
    }

    #[test]
    fn test_parse_exif_date_ignores_trailing_offset() {
        let dt = parse_exif_date("2023:01:02 03:04:05+02:00", Some(UtcOffset::UTC)).unwrap();
        assert_eq!(dt.second(), 5);
        assert_eq!(dt.offset(), UtcOffset::UTC);
    }

    #[test]
    fn test_parse_gps_string() {
        let lat = parse_gps_string("45 deg 30' 16.91\" N").unwrap();
        assert!((lat - 45.50469722).abs() < 0.0001);

        let lon = parse_gps_string("122 deg 40' 30.12\" W").unwrap();
        assert!((lon - (-122.675033)).abs() < 0.0001);

        assert!(parse_gps_string("").is_none());
    }

    #[test]
    fn test_value_to_strings() {
        assert_eq!(
            value_to_strings(&json!(["isom", "iso2", "CAEP"])),
            BTreeSet::from(["CAEP".to_string(), "iso2".to_string(), "isom".to_string()])
        );
        assert_eq!(
            value_to_strings(&json!("beach, family")),
            BTreeSet::from(["beach".to_string(), "family".to_string()])
        );
    }

    #[test]
    fn test_descriptor_from_raw_video() {
        let raw = RawExifInfo {
            create_date: "2020:07:04 18:00:00".to_string(),
            compatible_brands: Some(json!(["CAEP", "isom"])),
            rotation: Some(json!(90)),
            gps_latitude: Some(json!(47.5)),
            gps_longitude: Some(json!("122 deg 30' 0.00\" W")),
            ..Default::default()
        };
        let md = descriptor_from_raw(Path::new("/nope/MVI_0001.MOV"), MediaKind::Video, raw);
        assert_eq!(md.media_kind(), MediaKind::Video);
        assert_eq!(md.timestamp.unwrap().offset(), UtcOffset::UTC);
        assert!(md.compatible_brands.contains("CAEP"));
        assert_eq!(md.rotation, Some(90));
        let loc = md.location.unwrap();
        assert!((loc.longitude + 122.5).abs() < 1e-9);
        assert!(md.keywords.is_none());
    }

    #[test]
    fn test_descriptor_from_raw_image_keywords() {
        let raw = RawExifInfo {
            date_time_original: "2021:03:04 05:06:07".to_string(),
            offset_time_original: Some("-07:00".to_string()),
            keywords: Some(json!(["beach"])),
            subject: Some(json!(["beach", "sunset"])),
            ..Default::default()
        };
        let md = descriptor_from_raw(Path::new("/nope/IMG_1.JPG"), MediaKind::Image, raw);
        let ts = md.timestamp.unwrap();
        assert_eq!(ts.offset(), UtcOffset::from_hms(-7, 0, 0).unwrap());
        assert_eq!(md.keywords.unwrap().len(), 2);
        assert!(md.location.is_none());
    }

    #[test]
    fn test_filesystem_reader_requires_file() {
        let mut reader = FilesystemReader;
        assert!(matches!(
            reader.read(Path::new("/definitely/not/here.jpg")),
            Err(ImportError::NotAFile(_))
        ));
    }
}
