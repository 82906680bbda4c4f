use crate::mediaimport_core::config::ToolConfig;
use crate::mediaimport_core::error::{ImportError, Result};
use crate::mediaimport_core::exif::{EXIF_DATE_FORMAT, local_offset};
use crate::mediaimport_core::media::Location;
use filetime::FileTime;
use std::path::{Path, PathBuf};
use std::process::Command;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Exit code and captured output of one external tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an external executable to completion. A non-zero exit is not an error here;
/// only failing to launch the process is.
pub trait ToolInvoker: Send {
    fn invoke(&self, executable: &Path, args: &[String]) -> Result<ProcessOutput>;
}

/// `ToolInvoker` that spawns real processes. Blocks until the child exits.
pub struct CommandInvoker;

impl ToolInvoker for CommandInvoker {
    fn invoke(&self, executable: &Path, args: &[String]) -> Result<ProcessOutput> {
        log::debug!("Running {} {}", executable.display(), args.join(" "));
        let output = Command::new(executable)
            .args(args)
            .output()
            .map_err(|source| ImportError::ToolLaunch {
                tool: executable.display().to_string(),
                source,
            })?;

        Ok(ProcessOutput {
            // Killed by a signal
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// HandBrake rotate argument derived from a video's stored rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationFlag {
    pub flag: Option<&'static str>,
    /// Set when the rotation was present but not one of 0/90/180/270.
    pub unhandled: bool,
}

pub fn rotation_flag(rotation: Option<i32>) -> RotationFlag {
    let flag = match rotation {
        Some(90) => Some("--rotate=4"),
        Some(180) => Some("--rotate=3"),
        Some(270) => Some("--rotate=7"),
        Some(0) | None => None,
        Some(_) => {
            return RotationFlag {
                flag: None,
                unhandled: true,
            };
        }
    };
    RotationFlag {
        flag,
        unhandled: false,
    }
}

/// HandBrake encoder settings: x264 in an mp4 container with AAC passthrough where possible.
const HANDBRAKE_ARGS: &[&str] = &[
    "-e", "x264", "-q", "20.0", "-a", "1", "-E", "faac", "-B", "160", "-6", "dpl2", "-R", "Auto",
    "-D", "0.0", "--audio-copy-mask", "aac,ac3,dtshd,dts,mp3", "--audio-fallback", "ffac3", "-f",
    "mp4", "--loose-anamorphic", "--modulus", "2", "-m", "--x264-preset", "veryfast",
    "--h264-profile", "auto", "--h264-level", "auto", "-O",
];

const QUIET_WRITE_ARGS: &[&str] = &["-P", "-fast", "-q", "-overwrite_original"];

/// The exiftool and HandBrakeCLI commands the importer depends on.
pub struct ExternalTools {
    config: ToolConfig,
    invoker: Box<dyn ToolInvoker>,
}

impl ExternalTools {
    pub fn new(config: ToolConfig, invoker: Box<dyn ToolInvoker>) -> Self {
        Self { config, invoker }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Run exiftool without judging the exit code.
    pub fn run_exiftool(&self, args: &[String]) -> Result<ProcessOutput> {
        self.invoker.invoke(&self.config.exiftool, args)
    }

    /// Run HandBrakeCLI without judging the exit code.
    pub fn run_handbrake(&self, args: &[String]) -> Result<ProcessOutput> {
        self.invoker.invoke(&self.config.handbrake, args)
    }

    /// Remove GPS tags from images (EXIF) and videos (XMP).
    pub fn clear_locations(&self, images: &[PathBuf], videos: &[PathBuf]) -> Result<()> {
        check_files(images)?;
        check_files(videos)?;

        if !images.is_empty() {
            let mut args = strings(QUIET_WRITE_ARGS);
            args.extend(strings(&[
                "-exif:gpslatitude=",
                "-exif:gpslatituderef=",
                "-exif:gpslongitude=",
                "-exif:gpslongituderef=",
            ]));
            args.extend(path_args(images));
            self.exiftool_checked(&args)?;
        }

        if !videos.is_empty() {
            let mut args = strings(QUIET_WRITE_ARGS);
            args.extend(strings(&["-xmp:gpslatitude=", "-xmp:gpslongitude="]));
            args.extend(path_args(videos));
            self.exiftool_checked(&args)?;
        }
        Ok(())
    }

    /// Write a GPS position. Images take decimal degrees plus a hemisphere ref; videos
    /// take the XMP `degrees,minutes<ref>` form.
    pub fn update_locations(
        &self,
        images: &[PathBuf],
        videos: &[PathBuf],
        location: Location,
    ) -> Result<()> {
        check_files(images)?;
        check_files(videos)?;

        if !images.is_empty() {
            let mut args = strings(QUIET_WRITE_ARGS);
            args.extend(image_gps_args(location));
            args.extend(path_args(images));
            self.exiftool_checked(&args)?;
        }

        if !videos.is_empty() {
            let mut args = strings(QUIET_WRITE_ARGS);
            args.extend(video_gps_args(location));
            args.extend(path_args(videos));
            self.exiftool_checked(&args)?;
        }
        Ok(())
    }

    /// Add and remove keywords in both IPTC and XMP. Returns false when there was nothing to do.
    pub fn update_keywords(
        &self,
        files: &[PathBuf],
        added: &[String],
        removed: &[String],
    ) -> Result<bool> {
        if added.is_empty() && removed.is_empty() {
            return Ok(false);
        }
        check_files(files)?;

        let mut args = strings(&["-P", "-overwrite_original"]);
        args.extend(keyword_args(added, removed));
        args.extend(path_args(files));
        self.exiftool_checked(&args)?;
        Ok(true)
    }

    /// Set every capture date to `local` (a wall-clock time in the local zone). Videos also get
    /// their QuickTime dates in UTC.
    pub fn set_metadata_dates(
        &self,
        images: &[PathBuf],
        videos: &[PathBuf],
        local: PrimitiveDateTime,
    ) -> Result<()> {
        check_files(images)?;
        check_files(videos)?;

        let local_str = format_exif_date(local)?;

        if !images.is_empty() {
            let mut args = strings(&["-overwrite_original"]);
            args.push(format!("-AllDates={}", local_str));
            args.extend(path_args(images));
            self.exiftool_checked(&args)?;
        }

        // Some Canon video dates cannot be rewritten by exiftool at all
        if !videos.is_empty() {
            let utc = local.assume_offset(local_offset()).to_offset(UtcOffset::UTC);
            let utc_str = format_exif_date(PrimitiveDateTime::new(utc.date(), utc.time()))?;

            let mut args = strings(&["-overwrite_original"]);
            args.extend(video_date_args(&local_str, &utc_str));
            args.extend(path_args(videos));
            self.exiftool_checked(&args)?;
        }
        Ok(())
    }

    /// Copy all metadata tags from `source` onto `destination`.
    pub fn copy_tags(&self, source: &Path, destination: &Path) -> Result<ProcessOutput> {
        let args = vec![
            "-overwrite_original".to_string(),
            "-tagsFromFile".to_string(),
            source.display().to_string(),
            destination.display().to_string(),
        ];
        self.run_exiftool(&args)
    }

    /// Re-encode a video to mp4, optionally rotating it.
    pub fn transcode_video(
        &self,
        source: &Path,
        destination: &Path,
        rotation: Option<&str>,
    ) -> Result<ProcessOutput> {
        self.run_handbrake(&handbrake_args(source, destination, rotation))
    }

    fn exiftool_checked(&self, args: &[String]) -> Result<String> {
        let output = self.run_exiftool(args)?;
        if output.success() {
            return Ok(output.stdout);
        }
        Err(ImportError::ToolFailed {
            tool: "exiftool".to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Set a file's access and modification times to its metadata timestamp.
pub fn set_file_date_to_metadata_date(path: &Path, timestamp: OffsetDateTime) -> Result<()> {
    let ft = FileTime::from_unix_time(timestamp.unix_timestamp(), timestamp.nanosecond());
    filetime::set_file_times(path, ft, ft)?;
    Ok(())
}

pub fn handbrake_args(source: &Path, destination: &Path, rotation: Option<&str>) -> Vec<String> {
    let mut args = strings(HANDBRAKE_ARGS);
    if let Some(flag) = rotation {
        args.push(flag.to_string());
    }
    args.extend([
        "-i".to_string(),
        source.display().to_string(),
        "-o".to_string(),
        destination.display().to_string(),
    ]);
    args
}

fn image_gps_args(location: Location) -> Vec<String> {
    vec![
        format!("-exif:gpslatitude={}", location.latitude.abs()),
        format!("-exif:gpslatituderef={}", location.latitude_ref()),
        format!("-exif:gpslongitude={}", location.longitude.abs()),
        format!("-exif:gpslongituderef={}", location.longitude_ref()),
    ]
}

fn video_gps_args(location: Location) -> Vec<String> {
    vec![
        format!(
            "-xmp:gpslatitude={}{}",
            degrees_minutes(location.latitude),
            location.latitude_ref()
        ),
        format!(
            "-xmp:gpslongitude={}{}",
            degrees_minutes(location.longitude),
            location.longitude_ref()
        ),
    ]
}

/// "47,36.5" for 47.608333: whole degrees, then fractional minutes.
fn degrees_minutes(value: f64) -> String {
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = (abs - degrees) * 60.0;
    format!("{},{}", degrees as i64, minutes)
}

fn keyword_args(added: &[String], removed: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity((added.len() + removed.len()) * 2);
    for k in added {
        args.push(format!("-IPTC:Keywords+={}", k));
        args.push(format!("-XMP:Subject+={}", k));
    }
    for k in removed {
        args.push(format!("-IPTC:Keywords-={}", k));
        args.push(format!("-XMP:Subject-={}", k));
    }
    args
}

fn video_date_args(local_str: &str, utc_str: &str) -> Vec<String> {
    vec![
        format!("-AllDates={}", utc_str),
        format!("-quicktime:TrackCreateDate={}", utc_str),
        format!("-quicktime:TrackModifyDate={}", utc_str),
        format!("-quicktime:MediaCreateDate={}", utc_str),
        format!("-quicktime:MediaModifyDate={}", utc_str),
        format!("-quicktime:ContentCreateDate={}", utc_str),
        format!("-ExifIFD:CreateDate={}", local_str),
        format!("-ExifIFD:DateTimeOriginal={}", local_str),
        format!("-IFD0:ModifyDate={}", local_str),
    ]
}

fn format_exif_date(dt: PrimitiveDateTime) -> Result<String> {
    dt.format(EXIF_DATE_FORMAT)
        .map_err(|e| ImportError::InvalidDateFormat(e.to_string()))
}

fn check_files(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        if !path.exists() {
            return Err(ImportError::NotAFile(path.clone()));
        }
    }
    Ok(())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn path_args(paths: &[PathBuf]) -> impl Iterator<Item = String> + '_ {
    paths.iter().map(|p| p.display().to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use std::sync::{Arc, Mutex};
    use time::macros::datetime;

    /// Records every invocation; optionally creates the `-o` output like HandBrake would.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingInvoker {
        pub calls: Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>,
        pub exit_code: i32,
        pub create_outputs: bool,
    }

    impl ToolInvoker for RecordingInvoker {
        fn invoke(&self, executable: &Path, args: &[String]) -> Result<ProcessOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((executable.to_path_buf(), args.to_vec()));
            if self.create_outputs {
                if let Some(pos) = args.iter().position(|a| a == "-o") {
                    std::fs::write(&args[pos + 1], b"transcoded").unwrap();
                }
            }
            Ok(ProcessOutput {
                exit_code: self.exit_code,
                stdout: String::new(),
                stderr: if self.exit_code == 0 { String::new() } else { "boom".to_string() },
            })
        }
    }

    fn tools_with(invoker: &RecordingInvoker) -> ExternalTools {
        ExternalTools::new(ToolConfig::default(), Box::new(invoker.clone()))
    }

    #[test]
    fn test_rotation_flags() {
        assert_eq!(rotation_flag(Some(90)).flag, Some("--rotate=4"));
        assert_eq!(rotation_flag(Some(180)).flag, Some("--rotate=3"));
        assert_eq!(rotation_flag(Some(270)).flag, Some("--rotate=7"));
        assert_eq!(rotation_flag(Some(0)), RotationFlag { flag: None, unhandled: false });
        assert_eq!(rotation_flag(None), RotationFlag { flag: None, unhandled: false });
        assert_eq!(rotation_flag(Some(45)), RotationFlag { flag: None, unhandled: true });
    }

    #[test]
    fn test_handbrake_args_rotation_placement() {
        let args = handbrake_args(Path::new("/d/a.MOV"), Path::new("/d/a_V.MP4"), Some("--rotate=4"));
        let n = args.len();
        assert_eq!(args[n - 5], "--rotate=4");
        assert_eq!(&args[n - 4..], &["-i", "/d/a.MOV", "-o", "/d/a_V.MP4"]);

        let plain = handbrake_args(Path::new("/d/a.MOV"), Path::new("/d/a_V.MP4"), None);
        assert_eq!(plain.len(), n - 1);
        assert!(!plain.iter().any(|a| a.starts_with("--rotate")));
    }

    #[test]
    fn test_gps_encodings() {
        let loc = Location::new(-33.5, 151.25);
        assert_eq!(
            image_gps_args(loc),
            vec![
                "-exif:gpslatitude=33.5",
                "-exif:gpslatituderef=S",
                "-exif:gpslongitude=151.25",
                "-exif:gpslongituderef=E",
            ]
        );
        assert_eq!(
            video_gps_args(loc),
            vec!["-xmp:gpslatitude=33,30S", "-xmp:gpslongitude=151,15E"]
        );
    }

    #[test]
    fn test_keyword_args_lockstep() {
        let args = keyword_args(&["beach".to_string()], &["work".to_string()]);
        assert_eq!(
            args,
            vec![
                "-IPTC:Keywords+=beach",
                "-XMP:Subject+=beach",
                "-IPTC:Keywords-=work",
                "-XMP:Subject-=work",
            ]
        );
    }

    #[test]
    fn test_update_keywords_noop() {
        let invoker = RecordingInvoker::default();
        let tools = tools_with(&invoker);
        assert!(!tools.update_keywords(&[], &[], &[]).unwrap());
        assert!(invoker.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_locations_checks_files() {
        let invoker = RecordingInvoker::default();
        let tools = tools_with(&invoker);
        let result = tools.update_locations(
            &[PathBuf::from("/no/such/file.jpg")],
            &[],
            Location::new(1.0, 2.0),
        );
        assert!(matches!(result, Err(ImportError::NotAFile(_))));
        assert!(invoker.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_clear_locations_splits_images_and_videos() {
        let temp = assert_fs::TempDir::new().unwrap();
        let img = temp.child("a.jpg");
        img.touch().unwrap();
        let vid = temp.child("b.mov");
        vid.touch().unwrap();

        let invoker = RecordingInvoker::default();
        let tools = tools_with(&invoker);
        tools
            .clear_locations(&[img.to_path_buf()], &[vid.to_path_buf()])
            .unwrap();

        let calls = invoker.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.contains(&"-exif:gpslatituderef=".to_string()));
        assert!(calls[1].1.contains(&"-xmp:gpslongitude=".to_string()));
        assert_eq!(calls[1].1.last().unwrap(), &vid.path().display().to_string());
    }

    #[test]
    fn test_exiftool_failure_is_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let img = temp.child("a.jpg");
        img.touch().unwrap();

        let invoker = RecordingInvoker {
            exit_code: 2,
            ..Default::default()
        };
        let tools = tools_with(&invoker);
        let err = tools
            .update_keywords(&[img.to_path_buf()], &["x".to_string()], &[])
            .unwrap_err();
        assert!(matches!(err, ImportError::ToolFailed { exit_code: 2, .. }));
    }

    #[test]
    fn test_set_metadata_dates_image_args() {
        let temp = assert_fs::TempDir::new().unwrap();
        let img = temp.child("a.jpg");
        img.touch().unwrap();

        let invoker = RecordingInvoker::default();
        let tools = tools_with(&invoker);
        tools
            .set_metadata_dates(&[img.to_path_buf()], &[], datetime!(2020-01-02 03:04:05))
            .unwrap();

        let calls = invoker.calls.lock().unwrap();
        assert_eq!(calls[0].1[1], "-AllDates=2020:01:02 03:04:05");
    }

    #[test]
    fn test_video_date_args_local_and_utc() {
        let args = video_date_args("2020:01:02 03:04:05", "2020:01:02 11:04:05");
        assert_eq!(args[0], "-AllDates=2020:01:02 11:04:05");
        assert!(args.contains(&"-quicktime:MediaCreateDate=2020:01:02 11:04:05".to_string()));
        assert!(args.contains(&"-ExifIFD:DateTimeOriginal=2020:01:02 03:04:05".to_string()));
    }

    #[test]
    fn test_set_file_date() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a_V.MP4");
        file.touch().unwrap();
        let ts = datetime!(2019-06-01 10:00:00 UTC);
        set_file_date_to_metadata_date(file.path(), ts).unwrap();
        let modified = OffsetDateTime::from(std::fs::metadata(file.path()).unwrap().modified().unwrap());
        assert_eq!(modified.unix_timestamp(), ts.unix_timestamp());
    }
}
