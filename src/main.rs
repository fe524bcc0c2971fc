use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use humansize::{format_size, BINARY};
use std::path::{Path, PathBuf};

use metadelta::pipeline::manifest_path;
use metadelta::{
    run_delta, run_package, run_package_from, DeltaOptions, DeltaReport, GitChangeSource,
    LocalFs, ManifestDescriptor, TypeConfig,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Prune a metadata source tree to the files changed since a git reference and generate package.xml",
    long_about = None
)]
struct Args {
    /// Root of the metadata source tree
    #[arg(long, global = true, default_value = "src")]
    src: PathBuf,

    /// Type mapping file (.toml or .json); the built-in mapping is used otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Report what would change without deleting or writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Increase log output (-v debug, -vv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove every file not added or modified since the reference
    Delta {
        /// Reference passed to `git diff` (e.g. HEAD~1, origin/main...HEAD)
        #[arg(long)]
        diff: String,
    },
    /// Write package.xml for the files currently in the source tree
    Package,
    /// Run delta, then package
    Run {
        /// Reference passed to `git diff` (e.g. HEAD~1, origin/main...HEAD)
        #[arg(long)]
        diff: String,
    },
}

fn init_logging(verbosity: u8) {
    let log_filter = match verbosity {
        0 => "warn,metadelta=info",
        1 => "info,metadelta=debug",
        _ => "trace",
    };

    let log_env = env_logger::Env::default().default_filter_or(log_filter);

    env_logger::Builder::from_env(log_env)
        .format_module_path(false)
        .format_timestamp(None)
        .format_indent(Some(8))
        .init();
}

fn delta(src: &Path, diff: &str, config: &TypeConfig, dry_run: bool) -> Result<DeltaReport> {
    println!("{}", "> delta: removing unmodified files and folders".bold());

    let options = DeltaOptions {
        src_root: src.to_path_buf(),
        reference: diff.to_string(),
        dry_run,
    };
    let report = run_delta(&options, config, &GitChangeSource::new(src), &LocalFs)?;
    print_delta(&report);
    Ok(report)
}

fn print_delta(report: &DeltaReport) {
    println!(
        "  Changed: {} (kept with companions: {})",
        report.changed, report.kept
    );
    println!("  Files in snapshot: {}", report.listed);

    let removed = report.removal.removed.len();
    let size = format_size(report.removal.bytes, BINARY);
    if report.removal.dry_run {
        println!("  Would remove: {} files ({})", removed, size);
        println!("Dry run mode: No files were deleted.");
    } else {
        println!(
            "  {}",
            format!("Removed: {} files ({})", removed, size).green()
        );
        println!("  Empty directories pruned: {}", report.removal.pruned_dirs);
    }
}

/// `survivors` replaces the on-disk listing when a dry-run delta ran first.
fn package(
    src: &Path,
    config: &TypeConfig,
    dry_run: bool,
    survivors: Option<Vec<PathBuf>>,
) -> Result<()> {
    println!("{}", "> package: creating package.xml".bold());

    let manifest = match survivors {
        Some(files) => run_package_from(src, files, config, &LocalFs, dry_run)?,
        None => run_package(src, config, &LocalFs, dry_run)?,
    };
    print_manifest(&manifest);

    if dry_run {
        println!("Dry run mode: package.xml was not written.");
    } else {
        println!("  Written to {}", manifest_path(src).display());
    }
    Ok(())
}

fn print_manifest(manifest: &ManifestDescriptor) {
    if manifest.is_empty() {
        println!("  No deployable components found.");
        return;
    }

    for category in manifest.categories() {
        println!("  {}", category.name().bold());
        for member in category.members() {
            println!("    - {}", member);
        }
    }
    println!(
        "  {}",
        format!(
            "Total: {} members in {} types (API version {})",
            manifest.member_count(),
            manifest.categories().len(),
            manifest.version()
        )
        .green()
    );
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = TypeConfig::load(args.config.as_deref())?;

    match &args.command {
        Command::Delta { diff } => {
            delta(&args.src, diff, &config, args.dry_run)?;
        }
        Command::Package => package(&args.src, &config, args.dry_run, None)?,
        Command::Run { diff } => {
            let report = delta(&args.src, diff, &config, args.dry_run)?;
            let survivors = args.dry_run.then_some(report.remaining);
            package(&args.src, &config, args.dry_run, survivors)?;
        }
    }

    println!("{}", "> Success: done".green().bold());
    Ok(())
}
