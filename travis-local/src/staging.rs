//! Build context staging
//!
//! Layout under the work directory:
//!
//! ```text
//! <work_dir>/<project>/
//!     src/                      tracked project files + composer.lock
//!     .dockerignore
//!     Dockerfile.<job id>
//!     travis-entrypoint.<job id>
//! ```

use crate::recipe::{
    entrypoint_file_name, recipe_directives, recipe_file_name, render_docker_ignore, render_entrypoint,
};
use convenient_travis::Job;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Directories never copied by the fallback scan
const SKIPPED_DIRS: [&str; 2] = [".git", "vendor"];

/// Lock file copied even though it is usually not tracked
const LOCK_FILE: &str = "composer.lock";

/// Errors raised while preparing a build context
#[derive(Debug, Error)]
pub enum StagingError {
    /// File system error
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being processed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StagingError + '_ {
    move |source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A prepared build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedJob {
    /// Build context directory
    pub context_dir: PathBuf,
    /// Recipe inside the context
    pub recipe_path: PathBuf,
    /// Entry point inside the context
    pub entrypoint_path: PathBuf,
    /// Recipe directives as written
    pub directives: Vec<String>,
}

/// Prepares build contexts below a work directory
#[derive(Debug, Clone)]
pub struct Workspace {
    work_dir: PathBuf,
    base_image: String,
}

impl Workspace {
    /// Workspace rooted at `work_dir` building from `base_image`
    pub fn new(work_dir: impl Into<PathBuf>, base_image: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            base_image: base_image.into(),
        }
    }

    /// Context directory of a project
    pub fn context_dir(&self, project_name: &str) -> PathBuf {
        self.work_dir.join(project_name)
    }

    /// Copy the project sources and write recipe, entry point and ignore file
    pub async fn stage(&self, job: &Job) -> Result<StagedJob, StagingError> {
        let context_dir = self.context_dir(job.project_name());
        let src_dir = context_dir.join("src");

        if fs::try_exists(&src_dir).await.unwrap_or(false) {
            fs::remove_dir_all(&src_dir).await.map_err(io_error(&src_dir))?;
        }
        fs::create_dir_all(&src_dir).await.map_err(io_error(&src_dir))?;

        let files = project_files(job.project_dir()).await;
        for relative in &files {
            copy_entry(&job.project_dir().join(relative), &src_dir.join(relative)).await?;
        }
        info!("Staged {} files of {} into {}", files.len(), job.project_name(), src_dir.display());

        let ignore_path = context_dir.join(".dockerignore");
        fs::write(&ignore_path, render_docker_ignore())
            .await
            .map_err(io_error(&ignore_path))?;

        let entrypoint_path = context_dir.join(entrypoint_file_name(job));
        fs::write(&entrypoint_path, render_entrypoint(job))
            .await
            .map_err(io_error(&entrypoint_path))?;
        make_executable(&entrypoint_path).await?;

        let directives = recipe_directives(job, &self.base_image);
        let recipe_path = context_dir.join(recipe_file_name(job));
        fs::write(&recipe_path, directives.join("\n"))
            .await
            .map_err(io_error(&recipe_path))?;
        debug!("Wrote {}", recipe_path.display());

        Ok(StagedJob {
            context_dir,
            recipe_path,
            entrypoint_path,
            directives,
        })
    }
}

/// Relative paths of the files to copy
///
/// Files tracked by git when the project is a repository, otherwise every
/// file outside `.git` and `vendor`. `composer.lock` is always included.
async fn project_files(project_dir: &Path) -> Vec<PathBuf> {
    let mut files = match tracked_files(project_dir).await {
        Some(files) => files,
        None => {
            debug!("{} is not a git checkout, scanning the directory", project_dir.display());
            scan_files(project_dir)
        }
    };

    let lock = PathBuf::from(LOCK_FILE);
    if project_dir.join(&lock).is_file() && !files.contains(&lock) {
        files.push(lock);
    }
    files
}

async fn tracked_files(project_dir: &Path) -> Option<Vec<PathBuf>> {
    let output = tokio::process::Command::new("git")
        .args(["ls-files", "-z"])
        .current_dir(project_dir)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(split_nul_paths(&output.stdout))
}

/// Paths of NUL-separated `git ls-files -z` output, unquoted
fn split_nul_paths(output: &[u8]) -> Vec<PathBuf> {
    output
        .split(|byte| *byte == 0)
        .filter(|entry| !entry.is_empty())
        .map(path_from_bytes)
        .collect()
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

fn scan_files(project_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(project_dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() == 1
                && entry.file_type().is_dir()
                && SKIPPED_DIRS.iter().any(|dir| entry.file_name() == *dir))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(project_dir).ok().map(Path::to_path_buf))
        .collect()
}

/// Copy a tracked entry; directories (submodule checkouts) are copied whole
async fn copy_entry(source: &Path, target: &Path) -> Result<(), StagingError> {
    let Ok(metadata) = fs::metadata(source).await else {
        // tracked but deleted in the working tree
        debug!("Skipping missing {}", source.display());
        return Ok(());
    };
    if metadata.is_dir() {
        return copy_tree(source, target).await;
    }
    copy_file(source, target).await
}

async fn copy_tree(source: &Path, target: &Path) -> Result<(), StagingError> {
    let entries = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == ".git"));
    for entry in entries {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            StagingError::Io {
                path,
                source: e.into(),
            }
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination).await.map_err(io_error(&destination))?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &destination).await?;
        }
    }
    Ok(())
}

async fn copy_file(source: &Path, target: &Path) -> Result<(), StagingError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }
    let _ = fs::copy(source, target).await.map_err(io_error(source))?;
    Ok(())
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), StagingError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(io_error(path))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), StagingError> {
    Ok(())
}
