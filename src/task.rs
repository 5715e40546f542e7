//! Patch tasks: which file to patch, with which signature and payload.
//!
//! This is the I/O boundary around [`PatchSpec::apply`]. A task list is
//! loaded from TOML:
//!
//! ```toml
//! [[task]]
//! file = "AltA2dpConfig.exe"
//! signature = "41 83 F9 07 0F 87 ?? ?? ?? ??"
//! patch_offset = 4
//! patch_data = "0F 86"
//! description = "Change JA to JBE"
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    error::{PatchError, SignatureError},
    patch::{format_bytes, PatchOutcome, PatchSpec, PatchStatus},
    signature::Signature,
};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("invalid signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("invalid patch: {0}")]
    Patch(#[from] PatchError),

    /// The written file does not hold the payload at the write offset.
    #[error(
        "verification of {} failed at {offset:#x}: expected {expected}, found {found}",
        path.display()
    )]
    Verification {
        path: PathBuf,
        offset: usize,
        expected: String,
        found: String,
    },
}

impl TaskError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TaskError::Read { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Error)]
pub enum TaskListError {
    #[error("failed to read task list {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse task list {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchTask {
    pub file: PathBuf,
    pub signature: String,
    pub patch_offset: isize,
    pub patch_data: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to `<stem>.patched.<ext>` beside `file`.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReport {
    Patched {
        bytes_read: usize,
        outcome: PatchOutcome,
        /// `None` on a dry run.
        output: Option<PathBuf>,
    },
    NotFound {
        bytes_read: usize,
    },
}

impl TaskReport {
    pub fn is_patched(&self) -> bool {
        matches!(self, TaskReport::Patched { .. })
    }
}

/// `AltA2DP.sys` -> `AltA2DP.patched.sys`, `driver` -> `driver.patched`.
pub fn patched_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or(input.as_os_str());
    let mut name = stem.to_os_string();
    name.push(".patched");
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

/// Reads `path` back and checks that the patched range holds the payload.
pub fn verify_written(path: &Path, outcome: &PatchOutcome) -> Result<(), TaskError> {
    let written = fs::read(path).map_err(|source| TaskError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let found = written
        .get(outcome.write_range())
        .map(format_bytes)
        .unwrap_or_else(|| format!("{} byte file", written.len()));
    if !outcome.verify(&written) {
        return Err(TaskError::Verification {
            path: path.to_path_buf(),
            offset: outcome.write_offset,
            expected: format_bytes(&outcome.patched),
            found,
        });
    }
    info!(
        "Verification - bytes at {:#x}: {}",
        outcome.write_offset, found
    );
    Ok(())
}

impl PatchTask {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| patched_path(&self.file))
    }

    /// Reads the input, patches it in memory and writes the result unless
    /// `dry_run` is set. The input file itself is never modified.
    pub fn run(&self, dry_run: bool) -> Result<TaskReport, TaskError> {
        let name = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("--- Patching {} ---", name);

        // Parse everything before touching the disk.
        let signature = Signature::compile(&self.signature)?;
        let spec = PatchSpec::from_hex(&self.patch_data, self.patch_offset)?;

        let mut data = fs::read(&self.file).map_err(|source| TaskError::Read {
            path: self.file.clone(),
            source,
        })?;
        let bytes_read = data.len();
        info!("Read {} bytes from {}", bytes_read, self.file.display());

        let outcome = match spec.apply(&mut data, &signature)? {
            PatchStatus::Applied(outcome) => outcome,
            PatchStatus::NotFound => {
                warn!(
                    "Signature not found in {}. The file may be an incompatible version or already patched.",
                    name
                );
                return Ok(TaskReport::NotFound { bytes_read });
            }
        };

        info!("Signature found at offset: {:#x}", outcome.match_offset);
        info!(
            "Original bytes at {:#x}: {}",
            outcome.write_offset,
            format_bytes(&outcome.original)
        );
        info!(
            "Patching with {} bytes: {}",
            outcome.patched.len(),
            format_bytes(&outcome.patched)
        );

        if dry_run {
            info!("Dry run, not writing output");
            return Ok(TaskReport::Patched {
                bytes_read,
                outcome,
                output: None,
            });
        }

        let output = self.output_path();
        fs::write(&output, &data).map_err(|source| TaskError::Write {
            path: output.clone(),
            source,
        })?;
        info!("Patched file created: {}", output.display());
        verify_written(&output, &outcome)?;

        Ok(TaskReport::Patched {
            bytes_read,
            outcome,
            output: Some(output),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default, rename = "task")]
    pub tasks: Vec<PatchTask>,
}

/// Tally of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub patched: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.patched + self.not_found + self.failed
    }

    pub fn all_patched(&self) -> bool {
        self.patched == self.total()
    }
}

impl TaskList {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads a task list. Relative task paths are taken relative to the
    /// directory holding the list.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TaskListError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| TaskListError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut list = Self::parse(&content).map_err(|source| TaskListError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            for task in &mut list.tasks {
                if task.file.is_relative() {
                    task.file = base.join(&task.file);
                }
                if let Some(output) = task.output.as_mut().filter(|o| o.is_relative()) {
                    *output = base.join(&*output);
                }
            }
        }
        Ok(list)
    }

    /// Runs every task in order. A failing task is logged and counted, the
    /// rest still run.
    pub fn run_all(&self, dry_run: bool) -> (Vec<Result<TaskReport, TaskError>>, BatchSummary) {
        let mut summary = BatchSummary::default();
        let results = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, task)| {
                info!("Task {}: {}", i + 1, task.description);
                let result = task.run(dry_run);
                match &result {
                    Ok(TaskReport::Patched { .. }) => summary.patched += 1,
                    Ok(TaskReport::NotFound { .. }) => summary.not_found += 1,
                    Err(e) => {
                        error!("{}", e);
                        summary.failed += 1;
                    }
                }
                result
            })
            .collect();
        (results, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patched_path() {
        assert_eq!(
            patched_path(Path::new("AltA2DP.sys")),
            PathBuf::from("AltA2DP.patched.sys")
        );
        assert_eq!(
            patched_path(Path::new("bin/AltA2dpConfig.exe")),
            PathBuf::from("bin/AltA2dpConfig.patched.exe")
        );
        assert_eq!(
            patched_path(Path::new("driver")),
            PathBuf::from("driver.patched")
        );
        assert_eq!(
            patched_path(Path::new("archive.tar.gz")),
            PathBuf::from("archive.tar.patched.gz")
        );
    }

    #[test]
    fn test_parse_task_list() {
        let list = TaskList::parse(
            r#"
            [[task]]
            file = "AltA2dpConfig.exe"
            signature = "41 83 F9 07 0F 87 ?? ?? ?? ??"
            patch_offset = 4
            patch_data = "0F 86"
            description = "Change JA to JBE"

            [[task]]
            file = "AltA2DP.sys"
            signature = "33 D2 48 8B CB E8 ?? ?? ?? ?? 83 F8 06"
            patch_offset = -5
            patch_data = "B8 06 00 00 00"
            output = "out.sys"
            "#,
        )
        .unwrap();

        assert_eq!(list.tasks.len(), 2);
        assert_eq!(list.tasks[0].patch_offset, 4);
        assert_eq!(list.tasks[0].output, None);
        assert_eq!(
            list.tasks[0].output_path(),
            PathBuf::from("AltA2dpConfig.patched.exe")
        );
        assert_eq!(list.tasks[1].patch_offset, -5);
        assert_eq!(list.tasks[1].description, "");
        assert_eq!(list.tasks[1].output_path(), PathBuf::from("out.sys"));
    }

    #[test]
    fn test_parse_missing_field() {
        assert!(TaskList::parse("[[task]]\nfile = \"a.bin\"\n").is_err());
        assert_eq!(TaskList::parse("").unwrap(), TaskList::default());
    }

    #[test]
    fn test_summary() {
        let summary = BatchSummary {
            patched: 2,
            not_found: 1,
            failed: 0,
        };
        assert_eq!(summary.total(), 3);
        assert!(!summary.all_patched());
        assert!(BatchSummary::default().all_patched());
    }
}
