use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use binpatch::{
    format_bytes, BatchSummary, PatchTask, Signature, TaskError, TaskList, TaskReport,
};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "binpatch")]
#[command(about = "Patch bytes in a binary at an offset from a byte signature")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every task in a TOML task list
    Run {
        tasks: PathBuf,

        /// Scan and patch in memory without writing output files
        #[arg(long)]
        dry_run: bool,
    },
    /// Patch a single file
    Apply {
        file: PathBuf,

        /// Signature such as "41 83 F9 07 0F 87 ?? ?? ?? ??"
        #[arg(short, long)]
        signature: String,

        /// Hex bytes to write, e.g. "0F 86"
        #[arg(short, long)]
        patch: String,

        /// Offset from the start of the match, may be negative
        #[arg(short, long, allow_hyphen_values = true)]
        offset: isize,

        /// Defaults to <stem>.patched.<ext>
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Report where a signature matches without patching
    Find {
        file: PathBuf,

        #[arg(short, long)]
        signature: String,

        /// List every match instead of the first
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("binpatch=info".parse()?))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Run { tasks, dry_run } => {
            let list = TaskList::load(&tasks)
                .with_context(|| format!("Failed to load tasks from {}", tasks.display()))?;
            info!("=== Binary Patcher ===");
            info!("IMPORTANT: Make sure you have backups of your original files!");

            let (results, summary) = list.run_all(dry_run);
            if results
                .iter()
                .any(|r| matches!(r, Err(e) if e.is_not_found()))
            {
                warn!("Check that the original files exist and are the expected version.");
            }
            report_summary(&summary);
            Ok(ExitCode::from(batch_status(&summary)))
        }
        Command::Apply {
            file,
            signature,
            patch,
            offset,
            output,
            dry_run,
        } => {
            let task = PatchTask {
                file,
                signature,
                patch_offset: offset,
                patch_data: patch,
                description: String::new(),
                output,
            };
            let result = task.run(dry_run);
            if let Err(e) = &result {
                report_error(e);
            }
            Ok(ExitCode::from(task_status(&result)))
        }
        Command::Find {
            file,
            signature,
            all,
        } => {
            let signature: Signature = signature.parse()?;
            let data = fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            info!("Read {} bytes from {}", data.len(), file.display());

            let limit = if all { usize::MAX } else { 1 };
            let mut found = 0;
            for (pos, view) in signature.scan(&data).take(limit) {
                info!("Match at {:#x}: {}", pos, format_bytes(view));
                found += 1;
            }
            if found == 0 {
                warn!("Signature not found");
            }
            Ok(ExitCode::from(find_status(found)))
        }
    }
}

const PATCHED: u8 = 0;
const FAILED: u8 = 1;
const NOT_FOUND: u8 = 2;

fn task_status(result: &Result<TaskReport, TaskError>) -> u8 {
    match result {
        Ok(TaskReport::Patched { .. }) => PATCHED,
        Ok(TaskReport::NotFound { .. }) => NOT_FOUND,
        Err(_) => FAILED,
    }
}

/// A batch only succeeds when every task patched.
fn batch_status(summary: &BatchSummary) -> u8 {
    if summary.all_patched() {
        PATCHED
    } else {
        FAILED
    }
}

fn find_status(matches: usize) -> u8 {
    if matches == 0 {
        NOT_FOUND
    } else {
        PATCHED
    }
}

fn report_error(e: &TaskError) {
    error!("{}", e);
    if e.is_not_found() {
        warn!("Check that the original file exists.");
    }
}

fn report_summary(summary: &BatchSummary) {
    info!("--- Patcher Finished ---");
    if summary.all_patched() {
        info!("All {} file(s) patched successfully!", summary.total());
        return;
    }
    warn!(
        "{} file(s) could not be patched ({} signature not found, {} failed).",
        summary.total() - summary.patched,
        summary.not_found,
        summary.failed
    );
}
