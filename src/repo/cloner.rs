//! Git repository preparation.
//!
//! Remote repositories are shallow-cloned into a temporary directory
//! with git2; local directories are analyzed in place.

use anyhow::{Context, Result};
use git2::{FetchOptions, Progress, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// A repository ready for analysis.
pub struct CloneResult {
    /// Path to the repository root.
    pub path: PathBuf,
    /// Keeps a temporary clone alive; `None` for local directories.
    pub temp_dir: Option<TempDir>,
    /// Checked-out branch, if the directory is a git repository.
    pub branch: Option<String>,
    /// Short commit hash of HEAD.
    pub commit: Option<String>,
}

impl CloneResult {
    pub fn repo_path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory is deleted when this value is dropped.
    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }
}

/// Options for cloning a repository.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Branch to checkout (None for the remote's default branch).
    pub branch: Option<String>,
    /// Depth for shallow clone (None for full clone).
    pub depth: Option<i32>,
    pub show_progress: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            branch: None,
            depth: Some(1),
            show_progress: true,
        }
    }
}

/// Clone a repository from a URL into a fresh temporary directory.
pub fn clone_repository(url: &str, options: CloneOptions) -> Result<CloneResult> {
    info!("Cloning repository: {}", url);

    let temp = TempDir::new().context("Failed to create temporary directory")?;
    let path = temp.path().to_path_buf();
    debug!("Clone target: {}", path.display());

    let progress_bar = if options.show_progress {
        let pb = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        Some(Arc::new(pb))
    } else {
        None
    };

    let pb_clone = progress_bar.clone();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |progress: Progress<'_>| {
        if let Some(ref pb) = pb_clone {
            pb.set_length(progress.total_objects() as u64);
            pb.set_position(progress.received_objects() as u64);
        }
        true
    });

    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(callbacks);

    // The local transport does not negotiate shallow fetches.
    if let Some(depth) = options.depth.filter(|_| !url.starts_with("file://")) {
        fetch_opts.depth(depth);
    }

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_opts);
    if let Some(ref branch) = options.branch {
        builder.branch(branch);
    }

    let repo = builder
        .clone(url, &path)
        .with_context(|| format!("Failed to clone repository: {}", url))?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Clone complete");
    }

    info!("Successfully cloned repository to: {}", path.display());

    Ok(CloneResult {
        branch: get_current_branch(&repo),
        commit: get_current_commit(&repo),
        path,
        temp_dir: Some(temp),
    })
}

/// Use a local directory in place. It does not have to be a git repository.
pub fn open_local_repository(path: &Path) -> Result<CloneResult> {
    info!("Opening local repository: {}", path.display());

    if !path.is_dir() {
        anyhow::bail!("Repository path is not a directory: {}", path.display());
    }

    let path = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", path.display()))?;

    let (branch, commit) = match Repository::open(&path) {
        Ok(repo) => (get_current_branch(&repo), get_current_commit(&repo)),
        Err(e) => {
            debug!("{} is not a git repository: {}", path.display(), e);
            (None, None)
        }
    };

    Ok(CloneResult {
        path,
        temp_dir: None,
        branch,
        commit,
    })
}

/// Prepare the repository named by a request.
///
/// `file://` URLs pointing at a directory that is not a git repository
/// are used in place; everything else is cloned.
pub fn prepare_repository(url: &str, branch: Option<&str>, show_progress: bool) -> Result<CloneResult> {
    if let Some(local) = url.strip_prefix("file://") {
        let local = Path::new(local);
        if local.is_dir() && Repository::open(local).is_err() {
            return open_local_repository(local);
        }
    }

    let options = CloneOptions {
        branch: branch.filter(|b| !b.is_empty()).map(String::from),
        show_progress,
        ..CloneOptions::default()
    };
    clone_repository(url, options)
}

/// Split a repository URL into its path segments, dropping the scheme,
/// host and a trailing `.git`.
fn url_segments(url: &str) -> Vec<&str> {
    let url = url.trim().trim_end_matches('/').trim_end_matches(".git");
    let path = if let Some((_, rest)) = url.split_once("://") {
        rest.split_once('/').map(|(_, p)| p).unwrap_or("")
    } else if let Some((_, rest)) = url.split_once(':') {
        rest
    } else {
        url
    };
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Last path segment of the URL, e.g. `widgets` for
/// `https://github.com/acme/widgets.git`.
pub fn repository_name_from_url(url: &str) -> String {
    url_segments(url)
        .last()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown-repository".to_string())
}

/// Segment before the repository name, e.g. `acme`.
pub fn owner_from_url(url: &str) -> String {
    let segments = url_segments(url);
    if segments.len() >= 2 {
        segments[segments.len() - 2].to_string()
    } else {
        "unknown".to_string()
    }
}

/// Get the current branch name of a repository.
pub fn get_current_branch(repo: &Repository) -> Option<String> {
    repo.head()
        .ok()
        .and_then(|head| head.shorthand().map(String::from))
}

/// Get the current commit hash (short form).
pub fn get_current_commit(repo: &Repository) -> Option<String> {
    repo.head()
        .ok()
        .and_then(|head| head.peel_to_commit().ok())
        .map(|commit| commit.id().to_string()[..8].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_repository_name_from_url() {
        assert_eq!(
            repository_name_from_url("https://github.com/acme/widgets"),
            "widgets"
        );
        assert_eq!(
            repository_name_from_url("https://github.com/acme/widgets.git"),
            "widgets"
        );
        assert_eq!(
            repository_name_from_url("git@github.com:acme/widgets.git"),
            "widgets"
        );
        assert_eq!(repository_name_from_url("file:///tmp/work/demo/"), "demo");
        assert_eq!(repository_name_from_url("https://"), "unknown-repository");
    }

    #[test]
    fn test_owner_from_url() {
        assert_eq!(owner_from_url("https://github.com/acme/widgets"), "acme");
        assert_eq!(owner_from_url("git@gitlab.com:group/sub/tool.git"), "sub");
        assert_eq!(owner_from_url("https://example.com/solo"), "unknown");
    }

    #[test]
    fn test_clone_options_default() {
        let opts = CloneOptions::default();
        assert!(opts.branch.is_none());
        assert_eq!(opts.depth, Some(1));
        assert!(opts.show_progress);
    }

    #[test]
    fn test_open_local_plain_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let result = open_local_repository(dir.path()).unwrap();
        assert!(!result.is_temporary());
        assert!(result.branch.is_none());
        assert!(result.repo_path().join("main.rs").exists());
    }

    #[test]
    fn test_open_local_missing_directory_fails() {
        assert!(open_local_repository(Path::new("/no/such/dir")).is_err());
    }

    #[test]
    fn test_prepare_file_url_uses_plain_directory_in_place() {
        let dir = TempDir::new().unwrap();
        let url = format!("file://{}", dir.path().display());
        let result = prepare_repository(&url, Some("main"), false).unwrap();
        assert!(!result.is_temporary());
    }

    #[test]
    fn test_clone_local_git_repository() {
        let origin = TempDir::new().unwrap();
        let repo = Repository::init(origin.path()).unwrap();
        fs::write(origin.path().join("README.md"), "# demo\n").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("dev", "dev@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();

        let url = format!("file://{}", origin.path().display());
        let cloned = prepare_repository(&url, None, false).unwrap();
        assert!(cloned.is_temporary());
        assert!(cloned.repo_path().join("README.md").exists());
        assert_eq!(cloned.commit.as_deref().map(str::len), Some(8));
    }
}
