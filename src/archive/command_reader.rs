//! External-command unpack fallback.
//!
//! Runs an unpacker binary into a scratch directory, then walks the unpacked
//! files sorted by relative path. Used for RAR variants the in-process decoder
//! cannot handle.

use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use super::{ArchiveEntry, ArchiveReader, EntryVisitor, ImageFilter, ReadStats};
use crate::error::ArchiveError;

const ARCHIVE_PLACEHOLDER: &str = "{archive}";
const DEST_PLACEHOLDER: &str = "{dest}";

/// One unpack command line.
///
/// `{archive}` and `{dest}` inside arguments are replaced with the archive
/// path and the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl UnpackCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn render_args(&self, archive: &Path, dest: &Path) -> Vec<String> {
        let archive = archive.to_string_lossy();
        let dest = dest.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(ARCHIVE_PLACEHOLDER, &archive)
                    .replace(DEST_PLACEHOLDER, &dest)
            })
            .collect()
    }
}

/// `unrar` first, then `7z`.
pub fn default_unpack_commands() -> Vec<UnpackCommand> {
    vec![
        UnpackCommand::new("unrar", ["x", "-y", "-idq", "{archive}", "{dest}/"]),
        UnpackCommand::new("7z", ["x", "-y", "{archive}", "-o{dest}"]),
    ]
}

/// Reader that shells out to an unpack command.
pub struct CommandReader {
    path: PathBuf,
    commands: Vec<UnpackCommand>,
}

impl CommandReader {
    pub fn new(path: &Path, commands: Vec<UnpackCommand>) -> Self {
        Self {
            path: path.to_path_buf(),
            commands,
        }
    }

    /// Try each command in order in a fresh directory under `scratch`.
    /// Returns the directory of the first command that exits successfully.
    fn unpack(&self, scratch: &Path) -> Result<PathBuf, ArchiveError> {
        let mut failures = Vec::new();

        for (attempt, command) in self.commands.iter().enumerate() {
            let dest = scratch.join(format!("attempt-{attempt}"));
            fs::create_dir_all(&dest)?;

            let status = Command::new(&command.program)
                .args(command.render_args(&self.path, &dest))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();

            match status {
                Ok(status) if status.success() => {
                    debug!(program = %command.program, "Archive unpacked");
                    return Ok(dest);
                }
                Ok(status) => {
                    warn!(program = %command.program, %status, "Unpack command failed");
                    failures.push(format!("{} exited with {}", command.program, status));
                }
                Err(e) => {
                    warn!(program = %command.program, error = %e, "Unpack command unavailable");
                    failures.push(format!("{}: {}", command.program, e));
                }
            }
        }

        let reason = if failures.is_empty() {
            "no unpack commands configured".to_string()
        } else {
            failures.join("; ")
        };
        Err(ArchiveError::Unavailable { reason })
    }
}

impl ArchiveReader for CommandReader {
    fn name(&self) -> &'static str {
        "command"
    }

    fn read_entries(
        &mut self,
        filter: &ImageFilter,
        visit: &mut EntryVisitor<'_>,
    ) -> Result<ReadStats, ArchiveError> {
        let scratch = tempfile::tempdir()?;
        let root = self.unpack(scratch.path())?;

        let mut files = Vec::new();
        collect_files(&root, &root, &mut files)?;
        files.sort();

        let mut stats = ReadStats::default();
        for relative in files {
            if !filter.accepts(&relative) {
                continue;
            }
            let data = match fs::read(root.join(&relative)) {
                Ok(data) => data,
                Err(e) => {
                    warn!(entry = %relative, error = %e, "Skipping unreadable unpacked file");
                    stats.skipped += 1;
                    continue;
                }
            };

            stats.matched += 1;
            if let ControlFlow::Break(()) = visit(ArchiveEntry {
                name: relative,
                data,
            }) {
                break;
            }
        }

        Ok(stats)
    }
}

/// Relative paths (forward slashes) of every regular file under `dir`.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), ArchiveError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                let parts: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(parts.join("/"));
            }
        }
    }
    Ok(())
}
