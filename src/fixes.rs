//! Writing accepted fixes to the working tree.
//!
//! Agents run concurrently and more than one may propose a fix for the
//! same file, so writes are serialized per path. Before writing, the
//! file's current content must still equal the fix's
//! `original_content`; otherwise the fix is refused instead of
//! clobbering another agent's change.

use crate::error::FixError;
use crate::models::AgentFix;
use chrono::Utc;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct FixApplier {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FixApplier {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Apply every fix in place, recording success or the reason for refusal.
    ///
    /// With `dry_run` nothing is written and every fix stays unapplied.
    /// Returns the number of fixes written.
    pub async fn apply_all(&self, repo_root: &Path, fixes: &mut [AgentFix], dry_run: bool) -> usize {
        if dry_run {
            debug!("Dry run: leaving {} fix(es) unapplied", fixes.len());
            return 0;
        }

        let mut applied = 0;
        for fix in fixes.iter_mut() {
            match self.apply(repo_root, fix).await {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!("Fix for {} not applied: {}", fix.file_path, e);
                    fix.error = Some(e.to_string());
                }
            }
        }
        applied
    }

    /// Write a single fix.
    pub async fn apply(&self, repo_root: &Path, fix: &mut AgentFix) -> Result<(), FixError> {
        let target = resolve(repo_root, &fix.file_path)?;
        let lock = self.lock_for(&target).await;
        let _guard = lock.lock().await;

        let current = match tokio::fs::read_to_string(&target).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        if current != fix.original_content {
            return Err(FixError::Stale(fix.file_path.clone()));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &fix.fixed_content).await?;

        fix.applied = true;
        fix.applied_at = Some(Utc::now());
        info!("Applied fix to {}", fix.file_path);
        Ok(())
    }
}

/// Join a relative fix path onto the repository root, rejecting escapes.
fn resolve(repo_root: &Path, relative: &str) -> Result<PathBuf, FixError> {
    let rel = Path::new(relative);
    let normal = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || !normal {
        return Err(FixError::OutsideRepository(relative.to_string()));
    }
    Ok(repo_root.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentFinding, FixType, Severity};
    use std::fs;
    use tempfile::TempDir;

    fn fix(path: &str, original: &str, fixed: &str) -> AgentFix {
        let finding = AgentFinding::new("Code Style", Severity::Low, "ws", "");
        AgentFix::for_finding(&finding, FixType::CodeFix, path, original, fixed, "fix")
    }

    #[tokio::test]
    async fn test_apply_writes_and_marks_applied() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("a.rs"), "x  \n").unwrap();

        let applier = FixApplier::new();
        let mut fixes = vec![fix("a.rs", "x  \n", "x\n")];
        assert_eq!(applier.apply_all(repo.path(), &mut fixes, false).await, 1);

        assert!(fixes[0].applied);
        assert!(fixes[0].applied_at.is_some());
        assert_eq!(fs::read_to_string(repo.path().join("a.rs")).unwrap(), "x\n");
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("a.rs"), "x  \n").unwrap();

        let applier = FixApplier::new();
        let mut fixes = vec![fix("a.rs", "x  \n", "x\n")];
        assert_eq!(applier.apply_all(repo.path(), &mut fixes, true).await, 0);

        assert!(!fixes[0].applied);
        assert!(fixes[0].error.is_none());
        assert_eq!(fs::read_to_string(repo.path().join("a.rs")).unwrap(), "x  \n");
    }

    #[tokio::test]
    async fn test_new_file_is_created() {
        let repo = TempDir::new().unwrap();
        let applier = FixApplier::new();
        let mut f = fix("docs/README.md", "", "# Hi\n");
        applier.apply(repo.path(), &mut f).await.unwrap();
        assert_eq!(
            fs::read_to_string(repo.path().join("docs/README.md")).unwrap(),
            "# Hi\n"
        );
    }

    #[tokio::test]
    async fn test_stale_fix_is_refused() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("a.rs"), "changed\n").unwrap();

        let applier = FixApplier::new();
        let mut fixes = vec![fix("a.rs", "original\n", "fixed\n")];
        assert_eq!(applier.apply_all(repo.path(), &mut fixes, false).await, 0);

        assert!(!fixes[0].applied);
        assert!(fixes[0].error.as_deref().unwrap().contains("changed since"));
        assert_eq!(fs::read_to_string(repo.path().join("a.rs")).unwrap(), "changed\n");
    }

    #[tokio::test]
    async fn test_second_fix_on_same_file_sees_first() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join(".gitignore"), "").unwrap();

        let applier = Arc::new(FixApplier::new());
        let mut first = fix(".gitignore", "", ".env\n");
        let mut second = fix(".gitignore", "", "target/\n");

        let a = applier.clone();
        let root = repo.path().to_path_buf();
        let h1 = tokio::spawn(async move {
            let r = a.apply(&root, &mut first).await;
            r.is_ok()
        });
        let b = applier.clone();
        let root = repo.path().to_path_buf();
        let h2 = tokio::spawn(async move {
            let r = b.apply(&root, &mut second).await;
            r.is_ok()
        });

        let outcomes = [h1.await.unwrap(), h2.await.unwrap()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    }

    #[test]
    fn test_paths_outside_repository_are_rejected() {
        let root = Path::new("/repo");
        assert!(resolve(root, "../etc/passwd").is_err());
        assert!(resolve(root, "/etc/passwd").is_err());
        assert!(resolve(root, "").is_err());
        assert_eq!(resolve(root, "src/a.rs").unwrap(), PathBuf::from("/repo/src/a.rs"));
    }
}
