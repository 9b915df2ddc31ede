use anyhow::{bail, Context as _};
use archpack::{
    ArchiveError, Archiver, Context, Engine, FileEntry, Listing, Reporter,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archpack", version, about = "Single-file archiver with compression and encryption")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Compression level (0 = store, 9 = smallest)
    #[arg(short = 'c', long = "level", global = true, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: Option<u32>,

    /// Password for encrypting new entries and decrypting existing ones
    #[arg(short, long, global = true, env = "ARCHPACK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new archive
    #[command(visible_alias = "c")]
    Create {
        archive: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Extract all entries
    #[command(visible_alias = "x")]
    Extract {
        archive: PathBuf,
        /// Destination directory
        #[arg(short = 'C', long = "directory", default_value = ".")]
        directory: PathBuf,
    },

    /// List archive contents
    #[command(visible_alias = "l")]
    List {
        archive: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Add files to an archive (created if missing)
    #[command(visible_alias = "a")]
    Add {
        archive: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Remove entries by name
    #[command(visible_alias = "r")]
    Remove {
        archive: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Re-read entries from disk
    #[command(visible_alias = "u")]
    Update {
        archive: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check every entry's checksum
    #[command(visible_alias = "v")]
    Verify { archive: PathBuf },

    /// Check the archive header
    #[command(visible_alias = "t")]
    Test { archive: PathBuf },
}

#[derive(Args)]
struct InputArgs {
    /// Descend into directories
    #[arg(short, long)]
    recursive: bool,

    /// Skip inputs matching a glob pattern (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,
}

impl InputArgs {
    fn apply(&self, ctx: Context) -> Context {
        let ctx = if self.recursive {
            ctx.with_recursive(true)
        } else {
            ctx
        };
        ctx.with_exclude(self.exclude.iter().cloned())
    }
}

/// Drives an indicatif bar; messages are printed above it
struct CliReporter {
    bar: ProgressBar,
    quiet: bool,
}

impl Reporter for CliReporter {
    fn progress(&self, percent: u8, label: &str) {
        self.bar.set_position(u64::from(percent));
        self.bar.set_message(label.to_string());
    }

    fn error(&self, message: &str) {
        self.bar.suspend(|| eprintln!("error: {}", message));
    }

    fn verified(&self, name: &str, outcome: Result<(), &ArchiveError>) {
        match outcome {
            Ok(()) if self.quiet => {}
            Ok(()) => self.bar.suspend(|| println!("[OK]    {}", name)),
            Err(err) => self.bar.suspend(|| println!("[ERROR] {}: {}", name, err)),
        }
    }
}

fn progress_bar(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░ ");
    bar.set_style(style);
    bar
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "archpack=debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[derive(Serialize)]
struct JsonListing<'a> {
    archive: String,
    version: String,
    file_count: u32,
    total_size: u32,
    archive_size: u32,
    create_time: i64,
    compression_ratio: f64,
    entries: Vec<JsonEntry<'a>>,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    name: &'a str,
    size: u32,
    stored_size: u32,
    offset: u32,
    mtime: i64,
    atime: i64,
    mode: String,
    flags: String,
    crc32: String,
}

impl<'a> From<&'a FileEntry> for JsonEntry<'a> {
    fn from(entry: &'a FileEntry) -> Self {
        Self {
            name: &entry.name,
            size: entry.file_size,
            stored_size: entry.stored_size,
            offset: entry.offset,
            mtime: entry.mtime,
            atime: entry.atime,
            mode: format!("{:o}", entry.mode),
            flags: entry.flags.letters(),
            crc32: format!("{:08x}", entry.crc32),
        }
    }
}

impl<'a> From<&'a Listing> for JsonListing<'a> {
    fn from(listing: &'a Listing) -> Self {
        let header = &listing.header;
        Self {
            archive: listing.archive.display().to_string(),
            version: format!("{}.{}", header.version_major(), header.version_minor()),
            file_count: header.file_count,
            total_size: header.total_size,
            archive_size: header.archive_size,
            create_time: header.create_time,
            compression_ratio: header.compression_ratio(),
            entries: listing.entries.iter().map(JsonEntry::from).collect(),
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let shows_progress = !matches!(cli.command, Command::List { .. } | Command::Test { .. });
    let bar = progress_bar(shows_progress && !cli.quiet && !cli.no_progress);
    let reporter = Arc::new(CliReporter {
        bar: bar.clone(),
        quiet: cli.quiet,
    });

    let mut ctx = match &cli.config {
        Some(path) => Context::from_config_file(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => Context::new(),
    };
    if let Some(level) = cli.level {
        ctx = ctx.with_compression_level(level)?;
    }
    if let Some(password) = cli.password {
        ctx = ctx.with_password(password);
    }
    let ctx = ctx.with_reporter(reporter);

    let engine = Engine::new();
    let quiet = cli.quiet;

    match cli.command {
        Command::Create {
            archive,
            files,
            inputs,
        } => {
            let ctx = inputs.apply(ctx);
            let summary = engine
                .create(&ctx, &archive, &files)
                .with_context(|| format!("cannot create {}", archive.display()))?;
            bar.finish_and_clear();
            if !quiet {
                println!(
                    "Created {}: {} files, {} bytes",
                    archive.display(),
                    summary.file_count,
                    summary.archive_size
                );
            }
        }
        Command::Extract { archive, directory } => {
            let summary = engine
                .extract(&ctx, &archive, &directory)
                .with_context(|| format!("cannot extract {}", archive.display()))?;
            bar.finish_and_clear();
            if !summary.is_complete() {
                bail!(
                    "{} of {} entries could not be extracted",
                    summary.failed,
                    summary.total
                );
            }
            if !quiet {
                println!(
                    "Extracted {} entries to {}",
                    summary.extracted,
                    directory.display()
                );
            }
        }
        Command::List { archive, json } => {
            let listing = engine
                .list(&ctx, &archive)
                .with_context(|| format!("cannot list {}", archive.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&JsonListing::from(&listing))?);
            } else {
                print!("{}", listing);
            }
        }
        Command::Add {
            archive,
            files,
            inputs,
        } => {
            let ctx = inputs.apply(ctx);
            let summary = engine
                .add(&ctx, &archive, &files)
                .with_context(|| format!("cannot add to {}", archive.display()))?;
            bar.finish_and_clear();
            if !quiet {
                println!(
                    "Added {} files to {} ({} entries)",
                    summary.written,
                    archive.display(),
                    summary.file_count
                );
            }
        }
        Command::Remove { archive, files } => {
            let summary = engine
                .remove(&ctx, &archive, &files)
                .with_context(|| format!("cannot remove from {}", archive.display()))?;
            bar.finish_and_clear();
            if summary.skipped > 0 {
                bail!("{} of {} names were not found in the archive", summary.skipped, summary.requested);
            }
            if !quiet {
                println!(
                    "Removed {} entries from {}",
                    summary.removed,
                    archive.display()
                );
            }
        }
        Command::Update { archive, files } => {
            let summary = engine
                .update(&ctx, &archive, &files)
                .with_context(|| format!("cannot update {}", archive.display()))?;
            bar.finish_and_clear();
            if summary.failed + summary.skipped > 0 {
                bail!(
                    "{} of {} entries could not be updated",
                    summary.failed + summary.skipped,
                    summary.requested
                );
            }
            if !quiet {
                println!("Updated {} entries in {}", summary.written, archive.display());
            }
        }
        Command::Verify { archive } => {
            let result = engine.verify(&ctx, &archive);
            bar.finish_and_clear();
            let report = result.with_context(|| format!("verification of {} failed", archive.display()))?;
            if !quiet {
                println!("{}", report);
            }
        }
        Command::Test { archive } => {
            let header = engine
                .test(&ctx, &archive)
                .with_context(|| format!("{} is not a valid archive", archive.display()))?;
            if !quiet {
                println!(
                    "{}: OK (format {}.{}, {} entries)",
                    archive.display(),
                    header.version_major(),
                    header.version_minor(),
                    header.file_count
                );
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
