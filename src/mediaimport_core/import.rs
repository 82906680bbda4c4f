use crate::mediaimport_core::error::{ImportError, Result};
use crate::mediaimport_core::exif::MediaReader;
use crate::mediaimport_core::journal::ImportJournal;
use crate::mediaimport_core::media::{MediaDescriptor, MediaKind};
use crate::mediaimport_core::progress::ImportProgress;
use crate::mediaimport_core::scan::is_hidden;
use crate::mediaimport_core::tools::{
    ExternalTools, ProcessOutput, rotation_flag, set_file_date_to_metadata_date,
};
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Suffix of a video that has already been transcoded.
pub const CONVERTED_VIDEO_SUFFIX: &str = "_V.MP4";

/// Pipeline stages, in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Setup,
    MoveExported,
    MoveOriginals,
    ConvertVideos,
    ArchiveOriginals,
    RemoveImportFolders,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Setup,
        Stage::MoveExported,
        Stage::MoveOriginals,
        Stage::ConvertVideos,
        Stage::ArchiveOriginals,
        Stage::RemoveImportFolders,
    ];

    pub fn next(self) -> Option<Stage> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::MoveExported => "move-exported",
            Stage::MoveOriginals => "move-originals",
            Stage::ConvertVideos => "convert-videos",
            Stage::ArchiveOriginals => "archive-originals",
            Stage::RemoveImportFolders => "remove-import-folders",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "result", content = "reason")]
pub enum OutcomeStatus {
    Succeeded,
    Skipped(String),
    Failed(String),
}

/// What happened to one file (or folder) in one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: OutcomeStatus,
}

impl FileOutcome {
    fn succeeded(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            status: OutcomeStatus::Succeeded,
        }
    }

    fn skipped(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            status: OutcomeStatus::Skipped(reason.into()),
        }
    }

    fn failed(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            status: OutcomeStatus::Failed(reason.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub outcomes: Vec<FileOutcome>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            outcomes: Vec::new(),
        }
    }
}

/// Per-stage, per-file results of one run. `last_completed` is the resume cursor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    pub last_completed: Option<Stage>,
    pub import_folder_removed: bool,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = (Stage, &FileOutcome)> {
        self.stages
            .iter()
            .flat_map(|s| s.outcomes.iter().map(move |o| (s.stage, o)))
            .filter(|(_, o)| o.is_failure())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    fn complete(&mut self, report: StageReport) {
        log::info!("Checkpoint: {} complete", report.stage);
        self.last_completed = Some(report.stage);
        self.stages.push(report);
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for stage in &self.stages {
            let count = |pred: fn(&OutcomeStatus) -> bool| {
                stage.outcomes.iter().filter(|o| pred(&o.status)).count()
            };
            writeln!(
                f,
                "  {:<22} {} ok, {} skipped, {} failed",
                stage.stage.as_str(),
                count(|s| matches!(s, OutcomeStatus::Succeeded)),
                count(|s| matches!(s, OutcomeStatus::Skipped(_))),
                count(|s| matches!(s, OutcomeStatus::Failed(_))),
            )?;
        }
        for (stage, failure) in self.failures() {
            if let OutcomeStatus::Failed(reason) = &failure.status {
                writeln!(f, "  FAILED [{}] {}: {}", stage, failure.path.display(), reason)?;
            }
        }
        Ok(())
    }
}

/// Hook for archiving originals once they sit in the destination. Nothing is archived
/// unless one is installed.
pub trait OriginalsArchiver {
    fn archive(
        &self,
        destination: &Path,
        originals: &[MediaDescriptor],
        progress: &dyn ImportProgress,
    ) -> Vec<FileOutcome>;
}

/// Destination name for a file: original JPGs get "-org" so the edited export can take the
/// plain name.
pub fn generate_destination_name(name: &str, is_original: bool) -> String {
    let path = Path::new(name);
    let is_jpg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("JPG"));

    if is_original && is_jpg {
        let stem = path.file_stem().unwrap_or_default().to_string_lossy();
        return format!("{}-org.JPG", stem);
    }
    name.to_string()
}

/// Name of the transcoded copy of a video.
pub fn converted_video_name(media: &MediaDescriptor) -> String {
    format!("{}{}", media.name_without_extension(), CONVERTED_VIDEO_SUFFIX)
}

fn needs_conversion(media: &MediaDescriptor) -> bool {
    media.is_video() && !media.name().ends_with(CONVERTED_VIDEO_SUFFIX)
}

/// Moves an import set into a destination folder, converts videos and removes the emptied
/// import folder.
///
/// Stages run strictly in order. Nothing is rolled back: conflicts are checked during setup
/// so that later stages should not need to undo earlier moves. Per-file problems are recorded
/// in the `RunReport`; only setup checks and folder-level filesystem errors abort the run.
pub struct Importer {
    originals: Vec<MediaDescriptor>,
    exported: Vec<MediaDescriptor>,
    tools: ExternalTools,
    reader: Box<dyn MediaReader>,
    archiver: Option<Box<dyn OriginalsArchiver>>,
    journal: Option<ImportJournal>,
    original_names: Vec<String>,
    exported_names: Vec<String>,
}

impl Importer {
    pub fn new(
        originals: Vec<MediaDescriptor>,
        exported: Vec<MediaDescriptor>,
        tools: ExternalTools,
        reader: Box<dyn MediaReader>,
    ) -> Self {
        Self {
            originals,
            exported,
            tools,
            reader,
            archiver: None,
            journal: None,
            original_names: Vec::new(),
            exported_names: Vec::new(),
        }
    }

    pub fn with_archiver(mut self, archiver: Box<dyn OriginalsArchiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    /// Keep `journal` in the destination while the run is in progress. It is removed once a
    /// run ends cleanly with the import folder gone.
    pub fn with_journal(mut self, journal: ImportJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn originals(&self) -> &[MediaDescriptor] {
        &self.originals
    }

    pub fn exported(&self) -> &[MediaDescriptor] {
        &self.exported
    }

    /// Run every stage from setup onwards.
    pub fn run(
        &mut self,
        progress: &dyn ImportProgress,
        import_folder: &Path,
        destination: &Path,
    ) -> Result<RunReport> {
        self.resume(progress, import_folder, destination, Stage::Setup)
    }

    /// Run from `from`. Setup always runs to prepare the destination and names, but its
    /// collision check only applies to a fresh run, since a resumed run has already moved files.
    /// Files found in the destination instead of the import folder count as moved.
    pub fn resume(
        &mut self,
        progress: &dyn ImportProgress,
        import_folder: &Path,
        destination: &Path,
        from: Stage,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();

        let setup = self.setup(progress, destination, from == Stage::Setup)?;
        report.complete(setup);
        self.checkpoint(destination, Stage::Setup);

        let mut next = Stage::Setup.next();
        while let Some(stage) = next {
            next = stage.next();
            if stage < from {
                log::debug!("Skipping {} (resuming from {})", stage, from);
                match stage {
                    Stage::MoveExported => {
                        adopt_moved(&mut self.exported, &self.exported_names, destination)
                    }
                    Stage::MoveOriginals => {
                        adopt_moved(&mut self.originals, &self.original_names, destination)
                    }
                    _ => {}
                }
                continue;
            }

            let stage_report = match stage {
                Stage::Setup => continue,
                Stage::MoveExported => self.move_exported(progress, destination),
                Stage::MoveOriginals => self.move_originals(progress, destination),
                Stage::ConvertVideos => self.convert_videos(progress, destination),
                Stage::ArchiveOriginals => self.archive_originals(progress, destination),
                Stage::RemoveImportFolders => {
                    let stage_report = self.remove_import_folders(progress, import_folder)?;
                    report.import_folder_removed = stage_report
                        .outcomes
                        .iter()
                        .all(|o| o.status == OutcomeStatus::Succeeded);
                    stage_report
                }
            };
            report.complete(stage_report);
            self.checkpoint(destination, stage);
        }

        if report.is_clean() && report.import_folder_removed {
            if let Some(journal) = &self.journal {
                if let Err(e) = journal.remove(destination) {
                    log::warn!("Failed to remove import journal: {}", e);
                }
            }
        }
        Ok(report)
    }

    fn checkpoint(&mut self, destination: &Path, stage: Stage) {
        let Some(journal) = &mut self.journal else {
            return;
        };
        journal.last_completed = journal.last_completed.max(Some(stage));
        if let Err(e) = journal.save(destination) {
            log::warn!("Failed to save import journal: {}", e);
        }
    }

    //---------------------------------------------------------------------------------------
    // Stages
    //---------------------------------------------------------------------------------------

    fn setup(
        &mut self,
        progress: &dyn ImportProgress,
        destination: &Path,
        check_conflicts: bool,
    ) -> Result<StageReport> {
        log::info!("Importing to {}", destination.display());
        progress.set_current_step("Setting up");

        let mut existing_names = BTreeSet::new();
        if destination.exists() {
            if !destination.is_dir() {
                return Err(ImportError::DestinationIsAFile(destination.to_path_buf()));
            }
            for entry in fs::read_dir(destination)? {
                let name = entry?.file_name().to_string_lossy().to_string();
                if !is_hidden(&name) {
                    existing_names.insert(name);
                }
            }
        } else {
            fs::create_dir_all(destination)?;
        }

        // Every file this run will create in the destination, converted videos included
        let mut original_names = Vec::with_capacity(self.originals.len());
        let mut generated = BTreeSet::new();
        let mut moved = BTreeSet::new();

        for media in &self.originals {
            let name = generate_destination_name(&media.name(), true);
            if !moved.insert(name.clone()) {
                return Err(ImportError::FilenameExistsInDestination(name));
            }
            generated.insert(name.clone());
            if needs_conversion(media) {
                let converted = converted_video_name(media);
                if !moved.insert(converted.clone()) {
                    return Err(ImportError::FilenameExistsInDestination(converted));
                }
                generated.insert(converted);
            }
            original_names.push(name);
        }
        let mut exported_names = Vec::with_capacity(self.exported.len());
        for media in &self.exported {
            let name = generate_destination_name(&media.name(), false);
            if media.media_kind() == MediaKind::Image && !moved.insert(name.clone()) {
                return Err(ImportError::FilenameExistsInDestination(name));
            }
            generated.insert(name.clone());
            exported_names.push(name);
        }
        self.original_names = original_names;
        self.exported_names = exported_names;

        if check_conflicts {
            if let Some(existing) = existing_names.intersection(&generated).next() {
                return Err(ImportError::FilenameExistsInDestination(existing.clone()));
            }
        }

        Ok(StageReport::new(Stage::Setup))
    }

    fn move_exported(&mut self, progress: &dyn ImportProgress, destination: &Path) -> StageReport {
        progress.set_current_step("Moving files from exported folder");
        let mut report = StageReport::new(Stage::MoveExported);

        // Exports go first so an accidental overwrite can only hit an original
        for idx in 0..self.exported.len() {
            let media = &self.exported[idx];
            if media.media_kind() != MediaKind::Image {
                let reason = format!("Skipping unsupported file in 'Exported': {}", media.name());
                progress.set_step_detail(&reason);
                report.outcomes.push(FileOutcome::skipped(&media.path, reason));
                continue;
            }

            let target = destination.join(&self.exported_names[idx]);
            let outcome = move_media(&mut self.exported[idx], &target, progress);
            report.outcomes.push(outcome);
        }
        report
    }

    fn move_originals(&mut self, progress: &dyn ImportProgress, destination: &Path) -> StageReport {
        progress.set_current_step("Moving files from originals folder");
        let mut report = StageReport::new(Stage::MoveOriginals);

        for idx in 0..self.originals.len() {
            let target = destination.join(&self.original_names[idx]);
            let outcome = move_media(&mut self.originals[idx], &target, progress);
            report.outcomes.push(outcome);
        }
        report
    }

    fn convert_videos(&mut self, progress: &dyn ImportProgress, destination: &Path) -> StageReport {
        let mut report = StageReport::new(Stage::ConvertVideos);
        let videos: Vec<(MediaDescriptor, String)> = self
            .originals
            .iter()
            .zip(&self.original_names)
            .filter(|(m, _)| needs_conversion(m))
            .map(|(m, name)| (m.clone(), name.clone()))
            .collect();
        if videos.is_empty() {
            return report;
        }

        progress.set_current_step("Converting videos");
        for (media, name) in &videos {
            progress.set_step_detail(&media.name());
            // The video has already been moved; work from the destination copy
            let source = destination.join(name);
            let outcome = self.convert_video(progress, &source, media);
            report.outcomes.push(outcome);
        }
        report
    }

    fn convert_video(
        &mut self,
        progress: &dyn ImportProgress,
        source: &Path,
        media: &MediaDescriptor,
    ) -> FileOutcome {
        let rotation = rotation_flag(media.rotation);
        if rotation.unhandled {
            let rotation_value = media.rotation.unwrap_or_default();
            log::warn!("Unhandled rotation {} for {}", rotation_value, media.name());
            progress.set_step_detail(&format!("Unhandled rotation {}", rotation_value));
        }

        let converted = source.with_file_name(converted_video_name(media));

        let transcode = self.tools.transcode_video(source, &converted, rotation.flag);
        if let Some(reason) = process_failure("HandBrake", transcode, progress) {
            return FileOutcome::failed(source, reason);
        }

        // Re-encoding drops the metadata; copy it from the source video
        let copy = self.tools.copy_tags(source, &converted);
        if let Some(reason) = process_failure("ExifTool", copy, progress) {
            return FileOutcome::failed(&converted, reason);
        }

        let mut converted_media = media.clone();
        converted_media.path = converted.clone();
        if let Err(e) = self.reader.reload(&mut converted_media) {
            progress.set_step_detail(&format!("Failed reading {}: {}", converted.display(), e));
            return FileOutcome::failed(&converted, e.to_string());
        }
        match converted_media.timestamp {
            Some(ts) => {
                if let Err(e) = set_file_date_to_metadata_date(&converted, ts) {
                    let reason = format!("Failed setting file date: {}", e);
                    progress.set_step_detail(&reason);
                    return FileOutcome::failed(&converted, reason);
                }
            }
            None => progress.set_step_detail(&format!(
                "No metadata date in {}; file date left as is",
                converted.display()
            )),
        }

        FileOutcome::succeeded(&converted)
    }

    fn archive_originals(&mut self, progress: &dyn ImportProgress, destination: &Path) -> StageReport {
        let mut report = StageReport::new(Stage::ArchiveOriginals);
        match &self.archiver {
            Some(archiver) => {
                progress.set_current_step("Archiving originals");
                report.outcomes = archiver.archive(destination, &self.originals, progress);
            }
            None => log::debug!("No archiver installed; originals are not archived"),
        }
        report
    }

    fn remove_import_folders(
        &mut self,
        progress: &dyn ImportProgress,
        import_folder: &Path,
    ) -> Result<StageReport> {
        progress.set_current_step(&format!(
            "Removing original/import folder: {}",
            import_folder.display()
        ));
        let mut report = StageReport::new(Stage::RemoveImportFolders);

        if !import_folder.exists() {
            let reason = "Import folder is already gone";
            progress.set_step_detail(reason);
            report.outcomes.push(FileOutcome::skipped(import_folder, reason));
            return Ok(report);
        }

        let mut had_error = false;
        let mut file_count = 0;
        let walker = WalkDir::new(import_folder)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_hidden(&e.file_name().to_string_lossy()));
        for entry in walker {
            match entry {
                Ok(entry) if !entry.file_type().is_dir() => file_count += 1,
                Ok(_) => {}
                Err(e) => {
                    had_error = true;
                    log::error!("Failed finding remaining files in original/import folder: {}", e);
                }
            }
        }

        if file_count == 0 && !had_error {
            fs::remove_dir_all(import_folder)?;
            report.outcomes.push(FileOutcome::succeeded(import_folder));
        } else {
            let reason = "Not removing original folder due to existing files";
            log::error!("{} ({} left in {})", reason, file_count, import_folder.display());
            progress.set_step_detail(reason);
            report.outcomes.push(FileOutcome::skipped(import_folder, reason));
        }
        Ok(report)
    }
}

/// Point descriptors at the destination for files an earlier, interrupted run already moved.
fn adopt_moved(media: &mut [MediaDescriptor], names: &[String], destination: &Path) {
    for (media, name) in media.iter_mut().zip(names) {
        let target = destination.join(name);
        if !media.path.exists() && target.exists() {
            media.path = target;
        }
    }
}

/// Move one file and point its descriptor at the new location.
fn move_media(
    media: &mut MediaDescriptor,
    target: &Path,
    progress: &dyn ImportProgress,
) -> FileOutcome {
    progress.set_step_detail(&format!(
        "Moving from {} to {}",
        media.path.display(),
        target.display()
    ));

    if !media.path.exists() && target.exists() {
        let reason = format!("Already in destination: {}", target.display());
        progress.set_step_detail(&reason);
        media.path = target.to_path_buf();
        return FileOutcome::skipped(target, reason);
    }

    match move_file(&media.path, target) {
        Ok(()) => {
            media.path = target.to_path_buf();
            FileOutcome::succeeded(target)
        }
        Err(e) => {
            let reason = format!("Failed moving {}: {}", media.path.display(), e);
            log::error!("{}", reason);
            progress.set_step_detail(&reason);
            FileOutcome::failed(&media.path, reason)
        }
    }
}

/// Rename without replacing an existing file, copying when the rename crosses devices.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        ));
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            log::debug!("Copying {} across devices", from.display());
            copy_move(from, to)
        }
        Err(e) => Err(e),
    }
}

/// Copy into a newly created file, carry over permissions and file times, then delete the
/// source. A partial copy is removed again.
fn copy_move(from: &Path, to: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(from)?;
    let metadata = reader.metadata()?;
    let mut writer = fs::OpenOptions::new().write(true).create_new(true).open(to)?;

    if let Err(e) = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all()) {
        drop(writer);
        if let Err(cleanup) = fs::remove_file(to) {
            log::warn!("Failed to remove partial copy {}: {}", to.display(), cleanup);
        }
        return Err(e);
    }
    drop(writer);

    if let Err(e) = fs::set_permissions(to, metadata.permissions()) {
        log::warn!("Failed to restore permissions on {}: {}", to.display(), e);
    }
    // Keeps the capture-time file dates set while scanning
    let mtime = FileTime::from_last_modification_time(&metadata);
    let atime = FileTime::from_last_access_time(&metadata);
    filetime::set_file_times(to, atime, mtime)?;

    fs::remove_file(from)
}

/// Report a tool run as step detail; returns the failure reason if it did not succeed.
fn process_failure(
    name: &str,
    result: Result<ProcessOutput>,
    progress: &dyn ImportProgress,
) -> Option<String> {
    match result {
        Ok(output) => {
            progress.set_step_detail(&format!("{} exit code: {}", name, output.exit_code));
            if output.success() {
                return None;
            }
            progress.set_step_detail(&format!("{} standard output: {}", name, output.stdout));
            progress.set_step_detail(&format!("{} error output: {}", name, output.stderr));
            Some(format!(
                "{} exit code {}: {}",
                name,
                output.exit_code,
                output.stderr.trim()
            ))
        }
        Err(e) => {
            progress.set_step_detail(&format!("{} failed to run: {}", name, e));
            Some(e.to_string())
        }
    }
}
