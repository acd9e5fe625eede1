use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use patchalg::apply;
use patchalg::create::{self, read_patch, write_patch};
use patchalg::{Patch, PatchInfo};

#[derive(Parser)]
#[command(name = "patchalg", about = "Record, apply, invert, commute and merge darcs-style patches")]
struct Cli {
    /// Author recorded in new patches
    #[arg(long, global = true, env = "PATCHALG_AUTHOR", default_value = "anonymous")]
    author: String,
    /// Log engine decisions (same as RUST_LOG=debug)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the difference between two directories as a named patch
    #[command(group(ArgGroup::new("destination").args(["output", "out_dir"])))]
    Record {
        /// Directory holding the original files
        #[arg(long)]
        old: PathBuf,
        /// Directory holding the changed files
        #[arg(long)]
        new: PathBuf,
        /// Patch name
        #[arg(long)]
        name: String,
        /// Longer description; may span several lines
        #[arg(long)]
        comment: Option<String>,
        /// Output path for the patch file
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Directory to write the patch into under its canonical file name
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print a patch file
    Show {
        #[arg(long, short)]
        patch: PathBuf,
        /// Print as JSON instead of patch text
        #[arg(long)]
        json: bool,
    },
    /// Apply a patch to a target directory
    Apply {
        /// Path to the target directory to patch
        #[arg(long)]
        target: PathBuf,
        /// Path to the patch file
        #[arg(long, short)]
        patch: PathBuf,
    },
    /// Write the inverse of a patch
    Invert {
        #[arg(long, short)]
        patch: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Reorder two consecutive patches, writing both results to a directory
    Commute {
        /// Patch applied first
        #[arg(long)]
        first: PathBuf,
        /// Patch applied second
        #[arg(long)]
        second: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Rebase a patch made in parallel with another so it applies after it
    Merge {
        /// Patch already applied
        #[arg(long)]
        base: PathBuf,
        /// Patch to rebase on top of `base`
        #[arg(long)]
        other: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn write_into(dir: &Path, patch: &Patch) -> Result<PathBuf> {
    let path = dir.join(patch.file_name());
    write_patch(patch, &path)?;
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Record {
            old,
            new,
            name,
            comment,
            output,
            out_dir,
        } => {
            println!("Recording patch...");
            println!("  Old: {}", old.display());
            println!("  New: {}", new.display());

            let mut info = PatchInfo::new(cli.author, name);
            if let Some(comment) = comment {
                info = info.with_comment(comment);
            }

            let start = Instant::now();
            let (patch, summary) = create::record_tree(&old, &new, info).await?;
            let elapsed = start.elapsed();

            let Some(patch) = patch else {
                println!("\nNo changes to record.");
                return Ok(());
            };
            let output = match output {
                Some(path) => {
                    write_patch(&patch, &path)?;
                    path
                }
                None => write_into(out_dir.as_deref().unwrap_or(Path::new(".")), &patch)?,
            };

            println!("\nPatch recorded successfully!");
            println!("  Output: {}", output.display());
            println!("  Files added: {}", summary.files_added);
            println!("  Files modified: {}", summary.files_modified);
            println!("  Files removed: {}", summary.files_removed);
            println!("  Files moved: {}", summary.files_moved);
            println!("  Primitive patches: {}", summary.primitives);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Show { patch, json } => {
            let patch = read_patch(&patch)?;
            if json {
                let text = serde_json::to_string_pretty(&patch).context("Failed to encode JSON")?;
                println!("{text}");
            } else {
                print!("{patch}");
            }
        }
        Commands::Apply { target, patch } => {
            println!("Applying patch...");
            println!("  Target: {}", target.display());
            println!("  Patch: {}", patch.display());

            let start = Instant::now();
            let summary = apply::apply_patch(&target, &patch).await?;
            let elapsed = start.elapsed();

            println!("\nPatch applied successfully!");
            println!("  Files added: {}", summary.files_added);
            println!("  Files removed: {}", summary.files_removed);
            println!("  Files moved: {}", summary.files_moved);
            println!("  Hunks: {}", summary.hunks);
            println!("  Binary edits: {}", summary.binary_edits);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Invert { patch, output } => {
            let inverse = read_patch(&patch)?.inverse();
            write_patch(&inverse, &output)?;
            println!("Inverse written to {}", output.display());
        }
        Commands::Commute {
            first,
            second,
            out_dir,
        } => {
            let first = read_patch(&first)?;
            let second = read_patch(&second)?;
            let (second, first) = first
                .commute(&second)
                .with_context(|| format!("Cannot commute '{}' past '{}'", second.name(), first.name()))?;
            let second_path = write_into(&out_dir, &second)?;
            let first_path = write_into(&out_dir, &first)?;
            println!("Patches commuted.");
            println!("  Now first: {}", second_path.display());
            println!("  Now second: {}", first_path.display());
        }
        Commands::Merge {
            base,
            other,
            output,
        } => {
            let base = read_patch(&base)?;
            let other = read_patch(&other)?;
            let merged = base
                .merge(&other)
                .with_context(|| format!("Cannot merge '{}' onto '{}'", other.name(), base.name()))?;
            write_patch(&merged, &output)?;
            println!("Merged patch written to {}", output.display());
        }
    }

    Ok(())
}
