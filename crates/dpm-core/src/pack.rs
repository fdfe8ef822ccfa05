//! Packaging a package folder into a gzip'd tarball.
//!
//! Two packagers are provided: [`NativePackager`] builds the archive in
//! process with the npm layout (every entry under `package/`), and
//! [`CommandPackager`] shells out to `yarn pack` or `npm pack`. Anything a
//! packaging tool prints on stderr is treated as a failure.

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::manifest::PackageManifest;
use dpm_schema::keys::tarball_filename;

/// Directory every archive entry is nested under.
const PACKAGE_PREFIX: &str = "package";

#[derive(Error, Debug)]
pub enum PackError {
    #[error("{0} was not found on PATH")]
    ToolNotFound(&'static str),

    #[error("Packaging tool reported errors: {0}")]
    Stderr(String),

    #[error("{tool} pack exited with {status}")]
    Failed {
        tool: &'static str,
        status: std::process::ExitStatus,
    },

    #[error("Could not find the tarball path in packaging output: {0}")]
    UnrecognizedOutput(String),

    #[error("Failed to walk package folder")]
    Walk(#[from] walkdir::Error),

    #[error("IO error while packaging")]
    Io(#[from] std::io::Error),

    #[error("Packaging task failed")]
    Join(#[from] tokio::task::JoinError),
}

/// A tarball on disk, ready for upload.
#[derive(Debug)]
pub struct PackedTarball {
    pub path: PathBuf,
    pub size: u64,
    /// Hex-encoded SHA-256 of the archive.
    pub sha256: String,
    /// Number of files archived, when known.
    pub entries: Option<usize>,
    // Keeps a packager-owned temp directory alive until upload finishes.
    _workdir: Option<TempDir>,
}

impl PackedTarball {
    /// Describe an existing tarball written by some other tool.
    pub fn open(path: PathBuf) -> Result<Self, PackError> {
        Self::from_file(path, None, None)
    }

    fn from_file(
        path: PathBuf,
        entries: Option<usize>,
        workdir: Option<TempDir>,
    ) -> Result<Self, PackError> {
        let mut file = File::open(&path)?;
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut file, &mut hasher)?;

        Ok(Self {
            path,
            size,
            sha256: hex::encode(hasher.finalize()),
            entries,
            _workdir: workdir,
        })
    }
}

/// Turns a package folder into a tarball.
#[async_trait]
pub trait Packager: Send + Sync {
    /// Short name shown in progress output.
    fn name(&self) -> &'static str;

    async fn pack(
        &self,
        folder: &Path,
        manifest: &PackageManifest,
    ) -> Result<PackedTarball, PackError>;
}

/// Builds the tarball in process with `tar` and `flate2`.
///
/// Dot-files, dot-directories and `node_modules` are left out.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePackager;

#[async_trait]
impl Packager for NativePackager {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn pack(
        &self,
        folder: &Path,
        manifest: &PackageManifest,
    ) -> Result<PackedTarball, PackError> {
        let folder = folder.to_path_buf();
        let filename = tarball_filename(&manifest.name, &manifest.version);
        tokio::task::spawn_blocking(move || build_tarball(&folder, &filename)).await?
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules"
}

fn build_tarball(folder: &Path, filename: &str) -> Result<PackedTarball, PackError> {
    let workdir = tempfile::tempdir()?;
    let path = workdir.path().join(filename);

    let encoder = GzEncoder::new(File::create(&path)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);

    let mut entries = 0;
    let walker = WalkDir::new(folder)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(folder)
            .map_err(std::io::Error::other)?;
        builder.append_path_with_name(entry.path(), Path::new(PACKAGE_PREFIX).join(relative))?;
        entries += 1;
    }

    builder.into_inner()?.finish()?;
    tracing::debug!(path = %path.display(), entries, "built tarball");

    PackedTarball::from_file(path, Some(entries), Some(workdir))
}

/// External packaging tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackTool {
    Yarn,
    Npm,
}

impl PackTool {
    pub fn program(self) -> &'static str {
        match self {
            Self::Yarn => "yarn",
            Self::Npm => "npm",
        }
    }

    /// Locate the written tarball from the tool's stdout.
    ///
    /// yarn prints `success Wrote tarball to "<path>".`; npm prints the file
    /// name, relative to the package folder, as its last line.
    pub fn tarball_path(self, folder: &Path, stdout: &str) -> Result<PathBuf, PackError> {
        let unrecognized = || PackError::UnrecognizedOutput(stdout.trim().to_string());
        match self {
            Self::Yarn => {
                let quoted = regex::Regex::new(r#""(.*?)""#)
                    .map_err(|e| PackError::UnrecognizedOutput(e.to_string()))?;
                quoted
                    .captures(stdout)
                    .and_then(|c| c.get(1))
                    .map(|m| folder.join(m.as_str()))
                    .ok_or_else(unrecognized)
            }
            Self::Npm => stdout
                .lines()
                .map(str::trim)
                .rfind(|line| !line.is_empty())
                .map(|line| folder.join(line))
                .ok_or_else(unrecognized),
        }
    }
}

/// Runs `yarn pack` / `npm pack` in the package folder.
#[derive(Debug, Clone)]
pub struct CommandPackager {
    tool: PackTool,
    program: Option<PathBuf>,
}

impl CommandPackager {
    pub fn new(tool: PackTool) -> Self {
        Self {
            tool,
            program: None,
        }
    }

    /// Use a specific executable instead of searching `PATH`.
    pub fn with_program(tool: PackTool, program: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            program: Some(program.into()),
        }
    }

    fn resolve_program(&self) -> Result<PathBuf, PackError> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => which::which(self.tool.program())
                .map_err(|_| PackError::ToolNotFound(self.tool.program())),
        }
    }
}

#[async_trait]
impl Packager for CommandPackager {
    fn name(&self) -> &'static str {
        self.tool.program()
    }

    async fn pack(
        &self,
        folder: &Path,
        _manifest: &PackageManifest,
    ) -> Result<PackedTarball, PackError> {
        let mut command = tokio::process::Command::new(self.resolve_program()?);
        command.arg("pack").current_dir(folder);
        match self.tool {
            PackTool::Yarn => command.arg("--cwd").arg(folder),
            PackTool::Npm => command.arg("--loglevel=error"),
        };

        tracing::debug!(tool = self.tool.program(), folder = %folder.display(), "running pack");
        let output = command.output().await?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            return Err(PackError::Stderr(stderr));
        }
        if !output.status.success() {
            return Err(PackError::Failed {
                tool: self.tool.program(),
                status: output.status,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = self.tool.tarball_path(folder, &stdout)?;
        tokio::task::spawn_blocking(move || PackedTarball::open(path)).await?
    }
}
