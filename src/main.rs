use anyhow::{Result, anyhow, bail};
use clap::Parser;
use crossbeam_channel::unbounded;
use mediaimport::mediaimport_core::cli::{ReportFormat, SensitiveCommands};
use mediaimport::mediaimport_core::media::detect_media_kind;
use mediaimport::mediaimport_core::progress::render_events;
use mediaimport::mediaimport_core::{
    ChannelProgress, Cli, CommandInvoker, Commands, ExternalTools, ImportError, ImportJournal,
    ImportSet, Importer, Location, MediaKind, SensitiveLocations, Stage, ToolConfig,
    default_reader, load_import_folder,
};
use simplelog::{CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, WriteLogger};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use time::PrimitiveDateTime;
use time::macros::format_description;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize loggers
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Warn,
        Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];

    if cli.log {
        loggers.push(WriteLogger::new(
            cli.log_level,
            Config::default(),
            File::create("mediaimport.log")?,
        ));
    }

    CombinedLogger::init(loggers)?;

    let config = ToolConfig::from_overrides(cli.exiftool, cli.handbrake, cli.sensitive_locations);

    match cli.command {
        Commands::Check { import_folder } => {
            let set = load(&import_folder, &config)?;
            let oracle = SensitiveLocations::load(&config.sensitive_locations)?;
            let warnings = set.warnings(&oracle);

            println!(
                "{} originals, {} exported",
                set.originals.len(),
                set.exported.len()
            );
            if warnings.is_empty() {
                println!("No warnings");
            } else {
                println!("{} warning(s):", warnings.len());
                for warning in &warnings {
                    println!("  {}", warning);
                }
            }
            if let (Some(year), Some(name)) = (set.suggested_year(), set.suggested_folder_name()) {
                println!("Suggested destination: {}/{}<description>", year, name);
            }
        }

        Commands::Import {
            import_folder,
            destination,
            yes,
            resume_from,
            report,
        } => {
            let (set, journal) = match resume_from {
                Some(stage) => {
                    let journal = ImportJournal::load(&destination)?;
                    if std::path::absolute(&import_folder).ok().as_ref()
                        != Some(&journal.import_folder)
                    {
                        log::warn!(
                            "Resuming the import of {} recorded in the destination",
                            journal.import_folder.display()
                        );
                    }
                    println!(
                        "Resuming from {} (last completed: {})",
                        stage,
                        journal
                            .last_completed
                            .map_or("nothing".to_string(), |s| s.to_string())
                    );
                    let mut reader = default_reader(&config);
                    let set = journal.rebuild_set(&destination, reader.as_mut());
                    (set, journal)
                }
                None => {
                    let set = load(&import_folder, &config)?;
                    check_destination_name(&set, &destination)?;

                    let oracle = SensitiveLocations::load(&config.sensitive_locations)?;
                    let warnings = set.warnings(&oracle);
                    for warning in &warnings {
                        println!("  {}", warning);
                    }
                    if !warnings.is_empty() && !yes && !confirm(warnings.len())? {
                        return Err(ImportError::Cancelled.into());
                    }
                    let journal = ImportJournal::from_set(&set);
                    (set, journal)
                }
            };

            println!("Importing from {}", set.import_folder.display());
            println!("to {}", destination.display());

            let (tx, rx) = unbounded();
            let worker_config = config.clone();
            let ImportSet {
                import_folder,
                originals,
                exported,
            } = set;
            let worker_destination = destination.clone();
            let worker = std::thread::spawn(move || {
                let progress = ChannelProgress::new(tx);
                let reader = default_reader(&worker_config);
                let tools = ExternalTools::new(worker_config, Box::new(CommandInvoker));
                let mut importer =
                    Importer::new(originals, exported, tools, reader).with_journal(journal);
                let from = resume_from.unwrap_or(Stage::Setup);
                importer.resume(&progress, &import_folder, &worker_destination, from)
            });

            render_events(rx);
            let run_report = match worker
                .join()
                .map_err(|_| anyhow!("import worker panicked"))?
            {
                Ok(run_report) => run_report,
                Err(e) if e.is_setup_failure() => {
                    eprintln!("No files were moved");
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };

            match report {
                ReportFormat::Text => {
                    println!("\nDone with import");
                    print!("{}", run_report);
                }
                ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&run_report)?),
            }

            if ImportJournal::path(&destination).exists() {
                println!(
                    "Import journal kept in {}; rerun with --resume-from to continue",
                    destination.display()
                );
            }
            let failed = run_report.failures().count();
            if failed > 0 {
                bail!("{} file operation(s) failed", failed);
            }
        }

        Commands::SetLocation { lat, lon, files } => {
            let (images, videos) = split_by_kind(&files)?;
            let tools = ExternalTools::new(config, Box::new(CommandInvoker));
            let location = Location::new(lat, lon);
            tools.update_locations(&images, &videos, location)?;
            println!("Set location {} on {} file(s)", location, files.len());
        }

        Commands::ClearLocation { files } => {
            let (images, videos) = split_by_kind(&files)?;
            let tools = ExternalTools::new(config, Box::new(CommandInvoker));
            tools.clear_locations(&images, &videos)?;
            println!("Cleared location on {} file(s)", files.len());
        }

        Commands::Keywords { add, remove, files } => {
            let tools = ExternalTools::new(config, Box::new(CommandInvoker));
            if tools.update_keywords(&files, &add, &remove)? {
                println!("Updated keywords on {} file(s)", files.len());
            } else {
                println!("No keywords to add or remove");
            }
        }

        Commands::SetDate { date, files } => {
            let local = PrimitiveDateTime::parse(
                &date,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
            )
            .map_err(|e| {
                ImportError::InvalidDateFormat(format!(
                    "'{}' must match 'YYYY-MM-DD HH:MM:SS': {}",
                    date, e
                ))
            })?;
            let (images, videos) = split_by_kind(&files)?;
            let tools = ExternalTools::new(config, Box::new(CommandInvoker));
            tools.set_metadata_dates(&images, &videos, local)?;
            println!("Set dates on {} file(s)", files.len());
        }

        Commands::Sensitive { command } => {
            let mut locations = SensitiveLocations::load(&config.sensitive_locations)?;
            match command {
                SensitiveCommands::List => {
                    println!("{}", config.sensitive_locations.display());
                    for location in locations.locations() {
                        println!("  {}", location);
                    }
                }
                SensitiveCommands::Add { lat, lon } => {
                    if locations.add(Location::new(lat, lon))? {
                        println!("Added sensitive location {}, {}", lat, lon);
                    } else {
                        println!("Already covered by an existing sensitive location");
                    }
                }
            }
        }
    }

    Ok(())
}

fn load(import_folder: &Path, config: &ToolConfig) -> Result<ImportSet> {
    let mut reader = default_reader(config);
    Ok(load_import_folder(import_folder, reader.as_mut())?)
}

/// The suggested name is only a date prefix; the user must add a description.
fn check_destination_name(set: &ImportSet, destination: &Path) -> Result<()> {
    let Some(date) = set.suggested_folder_name() else {
        return Ok(());
    };
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if name.trim() == date.trim() {
        return Err(ImportError::Argument(format!(
            "The destination folder name must be different from the date. Currently: '{}'",
            name
        ))
        .into());
    }
    Ok(())
}

fn confirm(warning_count: usize) -> Result<bool> {
    print!(
        "Do you want to import with {} warning(s)? [y/N]: ",
        warning_count
    );
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn split_by_kind(files: &[PathBuf]) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut images = Vec::new();
    let mut videos = Vec::new();
    let mut unsupported = Vec::new();
    for file in files {
        match detect_media_kind(file) {
            MediaKind::Image => images.push(file.clone()),
            MediaKind::Video => videos.push(file.clone()),
            MediaKind::Unknown => unsupported.push(file.display().to_string()),
        }
    }
    if !unsupported.is_empty() {
        return Err(ImportError::UnsupportedFiles(unsupported).into());
    }
    Ok((images, videos))
}
