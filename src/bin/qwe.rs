//! # qwe CLI - version control for single files
//!
//! Command-line front end for the qwe library.
//!
//! ## Usage
//! ```bash
//! # Initialize qwe in the current directory
//! qwe init
//!
//! # Track a file and commit a change
//! qwe track notes.txt
//! qwe commit notes.txt "tighten intro"
//!
//! # Inspect and move around history
//! qwe list notes.txt
//! qwe diff notes.txt 0 1
//! qwe revert notes.txt 0
//!
//! # Work with groups
//! qwe group-init docs
//! qwe group-track docs ./docs
//! qwe group-commit docs "first draft"
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use humantime::format_duration;
use qwe::{
    CompressionStrategy, CurrentVersion, DiffReport, DiffTarget, FileRef, QweError, Repository,
    RepositoryBuilder, Result, RevertTarget,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// qwe CLI - track, commit and restore individual files
#[derive(Parser)]
#[command(name = "qwe")]
#[command(version)]
#[command(about = "Lightweight version control for single files and groups of files")]
#[command(long_about = None)]
struct Cli {
    /// Working directory (defaults to current)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a repository in the working directory
    Init {
        /// Compression strategy for stored objects
        #[arg(long, value_enum, default_value = "fast")]
        compression: CompressionMode,

        /// Do not take the repository lock file
        #[arg(long)]
        no_lock: bool,
    },

    /// Create a new group
    GroupInit {
        /// Group name
        name: String,
    },

    /// Start tracking a file
    Track {
        /// File path relative to the working directory
        file: String,
    },

    /// Add a file, or every file directly inside a directory, to a group
    GroupTrack {
        /// Group name
        group: String,

        /// File or directory path
        #[arg(id = "group_track_path", value_name = "PATH")]
        path: String,
    },

    /// List the commits of a file
    #[command(alias = "ls")]
    List {
        /// Tracked file
        file: String,
    },

    /// List the commits of a group
    GroupList {
        /// Group name
        group: String,
    },

    /// Commit the working content of a file
    Commit {
        /// Tracked file
        file: String,

        /// Commit message
        message: String,
    },

    /// Commit every member of a group
    GroupCommit {
        /// Group name
        group: String,

        /// Commit message
        message: String,
    },

    /// Restore a file to a commit (latest when omitted)
    Revert {
        /// Tracked file
        file: String,

        /// Commit index, -1 for latest
        #[arg(allow_negative_numbers = true)]
        commit: Option<i64>,
    },

    /// Restore every member of a group to a group commit
    GroupRevert {
        /// Group name
        group: String,

        /// Group commit index
        commit: usize,
    },

    /// Show the checked-out commit of a file
    Current {
        /// Tracked file
        file: String,
    },

    /// Show the checked-out commit of a group
    GroupCurrent {
        /// Group name
        group: String,
    },

    /// Restore a deleted tracked file
    Recover {
        /// Tracked file
        file: String,
    },

    /// Restore a file to its original tracked content
    Rebase {
        /// Tracked file
        file: String,
    },

    /// Compare the working file or two commits
    ///
    /// With no commits the working file is compared with the latest commit.
    /// `uncommitted <k>` compares it with commit k; `<a> <b>` compares two commits.
    Diff {
        /// Tracked file
        file: String,

        /// First commit, or `uncommitted`
        first: Option<String>,

        /// Second commit
        second: Option<usize>,
    },

    /// List every group
    Groups,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum CompressionMode {
    None,
    Fast,
}

impl From<CompressionMode> for CompressionStrategy {
    fn from(mode: CompressionMode) -> Self {
        match mode {
            CompressionMode::None => CompressionStrategy::None,
            CompressionMode::Fast => CompressionStrategy::Fast,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let work_dir = cli.path.unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Init { compression, no_lock } => cmd_init(work_dir, compression, no_lock),
        Commands::GroupInit { name } => {
            let repo = Repository::open(work_dir)?;
            let id = repo.group_init(&name)?;
            println!(
                "{} Created group {} ({})",
                "✓".green().bold(),
                name.cyan(),
                id.short().yellow()
            );
            Ok(())
        }
        Commands::Track { file } => {
            let repo = Repository::open(work_dir)?;
            let base = repo.track(&file)?;
            let kind = if repo.tracker(&file)?.is_binary() { "binary" } else { "text" };
            println!("{} Tracking {} as {}", "✓".green().bold(), file.cyan(), kind);
            println!("  Base: {}", base.short().yellow());
            Ok(())
        }
        Commands::GroupTrack { group, path } => {
            let repo = Repository::open(work_dir)?;
            let added = repo.group_track(&group, &path)?;
            println!(
                "{} Added {} file(s) to {}",
                "✓".green().bold(),
                added.len().to_string().cyan(),
                group.cyan()
            );
            for file in &added {
                println!("  + {}", file);
            }
            Ok(())
        }
        Commands::List { file } => cmd_list(work_dir, &file),
        Commands::GroupList { group } => cmd_group_list(work_dir, &group),
        Commands::Commit { file, message } => cmd_commit(work_dir, &file, &message),
        Commands::GroupCommit { group, message } => {
            let repo = Repository::open(work_dir)?;
            let start = Instant::now();
            let outcome = repo.group_commit(&group, &message)?;
            println!(
                "{} Committed group {} as version {}",
                "✓".green().bold(),
                group.cyan(),
                outcome.index.to_string().yellow().bold()
            );
            println!("  Changed: {}", outcome.committed.to_string().cyan());
            println!("  Unchanged: {}", outcome.unchanged.to_string().cyan());
            println!("  Time: {}", format_duration(start.elapsed()).to_string().cyan());
            Ok(())
        }
        Commands::Revert { file, commit } => {
            let repo = Repository::open(work_dir)?;
            let target = match commit {
                Some(index) => RevertTarget::from_index(index, repo.commits(&file)?.len())?,
                None => RevertTarget::Latest,
            };
            let uid = repo.revert(&file, target)?;
            println!(
                "{} Reverted {} to {}",
                "✓".green().bold(),
                file.cyan(),
                uid.short().yellow()
            );
            Ok(())
        }
        Commands::GroupRevert { group, commit } => {
            let repo = Repository::open(work_dir)?;
            let id = repo.group_revert(&group, commit)?;
            println!(
                "{} Reverted group {} to version {} ({})",
                "✓".green().bold(),
                group.cyan(),
                commit.to_string().yellow().bold(),
                id.short().yellow()
            );
            Ok(())
        }
        Commands::Current { file } => cmd_current(work_dir, &file),
        Commands::GroupCurrent { group } => {
            let repo = Repository::open(work_dir)?;
            let status = repo.group_current(&group)?;
            println!(
                "{} is at version {}: {}",
                status.name.cyan(),
                status.index.to_string().yellow().bold(),
                status.message
            );
            for file in &status.files {
                let commit = match file.commit_number {
                    FileRef::Commit(index) => index.to_string(),
                    FileRef::BaseOnly => "base".to_string(),
                };
                println!("  {} @ {}", file.file_name, commit.yellow());
            }
            Ok(())
        }
        Commands::Recover { file } => {
            let repo = Repository::open(work_dir)?;
            repo.recover(&file)?;
            println!("{} Recovered {}", "✓".green().bold(), file.cyan());
            Ok(())
        }
        Commands::Rebase { file } => {
            let repo = Repository::open(work_dir)?;
            repo.rebase(&file)?;
            println!("{} Rebased {} to its base", "✓".green().bold(), file.cyan());
            Ok(())
        }
        Commands::Diff { file, first, second } => cmd_diff(work_dir, &file, first, second),
        Commands::Groups => {
            let repo = Repository::open(work_dir)?;
            let groups = repo.groups()?;
            if groups.is_empty() {
                println!("{}", "No groups found".yellow());
            }
            for name in groups {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

/// Initialize a repository
///
/// Creates `.qwe/` with the object directory, both tracker schemas and
/// `metadata.json`.
fn cmd_init(work_dir: PathBuf, compression: CompressionMode, no_lock: bool) -> Result<()> {
    println!("{}", "Initializing qwe...".blue().bold());

    let repo = RepositoryBuilder::new()
        .compression_strategy(compression.into())
        .use_lock(!no_lock)
        .init(work_dir)?;

    println!("{} Initialized qwe repository", "✓".green().bold());
    println!("  Working dir: {}", repo.work_dir().display().to_string().cyan());
    println!("  Storage: {}", repo.root().display().to_string().cyan());
    println!("\nNext steps:");
    println!("  - Track a file: {}", "qwe track <file>".yellow());
    println!("  - Commit it: {}", "qwe commit <file> \"message\"".yellow());

    Ok(())
}

fn cmd_commit(work_dir: PathBuf, file: &str, message: &str) -> Result<()> {
    let repo = Repository::open(work_dir)?;
    let start = Instant::now();
    let outcome = repo.commit(file, message)?;

    if outcome.is_unchanged() {
        println!("{} No changes in {}", "•".yellow(), file.cyan());
        return Ok(());
    }

    if let Some(index) = outcome.index() {
        println!(
            "{} Committed {} as version {}",
            "✓".green().bold(),
            file.cyan(),
            index.to_string().yellow().bold()
        );
    }
    println!("  Object: {}", outcome.uid().short().yellow());
    println!("  Time: {}", format_duration(start.elapsed()).to_string().cyan());

    let stats = repo.storage().compression_stats();
    debug!(
        "Compression: {} compressed, {} raw, {} bytes saved",
        stats.objects_compressed, stats.objects_stored_raw, stats.bytes_saved
    );
    Ok(())
}

fn cmd_list(work_dir: PathBuf, file: &str) -> Result<()> {
    let repo = Repository::open(work_dir)?;
    let tracker = repo.tracker(file)?;

    if tracker.versions.is_empty() {
        println!("{}", "No commits yet".yellow());
        return Ok(());
    }

    println!("{}", format!("Commits of {}:", file).bold());
    for (index, version) in tracker.versions.iter().enumerate() {
        let marker = if version.uid == tracker.current { "*".green().bold() } else { " ".normal() };
        println!(
            "{} {} {} {}",
            marker,
            format!("{:>3}", index).yellow(),
            version.timestamp.dimmed(),
            version.commit_message
        );
    }
    Ok(())
}

fn cmd_group_list(work_dir: PathBuf, group: &str) -> Result<()> {
    let repo = Repository::open(work_dir)?;
    let commits = repo.group_commits(group)?;
    let current = repo.group_current(group)?;

    println!("{}", format!("Commits of group {}:", group).bold());
    for commit in commits {
        let marker = if commit.index == current.index { "*".green().bold() } else { " ".normal() };
        println!(
            "{} {} {} ({} files)",
            marker,
            format!("{:>3}", commit.index).yellow(),
            commit.message,
            commit.file_count
        );
    }
    Ok(())
}

fn cmd_current(work_dir: PathBuf, file: &str) -> Result<()> {
    let repo = Repository::open(work_dir)?;
    match repo.current(file)? {
        CurrentVersion::Base { uid } => {
            println!("{} is at its base ({})", file.cyan(), uid.short().yellow());
        }
        CurrentVersion::Commit { index, details } => {
            println!(
                "{} is at version {}: {}",
                file.cyan(),
                index.to_string().yellow().bold(),
                details.commit_message
            );
            println!("  Committed: {}", details.timestamp.dimmed());
        }
    }
    Ok(())
}

/// Show differences for a tracked file
///
/// Text files print one `-`/`+` pair per changed line; binary files only
/// report whether the two sides differ.
fn cmd_diff(
    work_dir: PathBuf,
    file: &str,
    first: Option<String>,
    second: Option<usize>,
) -> Result<()> {
    let target = diff_target(first.as_deref(), second)?;
    let repo = Repository::open(work_dir)?;

    match repo.diff(file, target)? {
        DiffReport::Binary { changed } => {
            if changed {
                println!("Binary files differ");
            } else {
                println!("{}", "No differences".green());
            }
        }
        DiffReport::Text(changes) => {
            if changes.is_empty() {
                println!("{}", "No differences".green());
            }
            for change in changes {
                println!("{}", format!("@@ line {} @@", change.line).cyan());
                if let Some(old) = change.old_text() {
                    println!("{}", format!("-{}", old).red());
                }
                if let Some(new) = change.new_text() {
                    println!("{}", format!("+{}", new).green());
                }
            }
        }
    }
    Ok(())
}

fn diff_target(first: Option<&str>, second: Option<usize>) -> Result<DiffTarget> {
    match (first, second) {
        (None, None) => Ok(DiffTarget::WorkingVsLatest),
        (Some("uncommitted"), Some(k)) => Ok(DiffTarget::WorkingVsCommit(k)),
        (Some(a), Some(b)) => {
            let a = a.parse::<usize>().map_err(|_| {
                QweError::InvalidConfiguration(format!("'{}' is not a commit index", a))
            })?;
            Ok(DiffTarget::Commits(a, b))
        }
        _ => Err(QweError::InvalidConfiguration(
            "diff takes no commits, `uncommitted <k>`, or two commit indices".to_string(),
        )),
    }
}
