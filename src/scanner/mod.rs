//! File scanner for discovering and filtering repository files.
//!
//! This module provides a unified file scanner that respects
//! configuration for extensions, excludes, and file size limits,
//! plus the language detection used to populate the analysis context.

use crate::config::ScannerConfig;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (e.g., ["rs", "py", "js"]). Empty means any file.
    pub extensions: Vec<String>,
    /// Names to exclude (e.g., ["node_modules", "target", ".git"]); `*.suffix` matches endings.
    pub excludes: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: u64,
    /// Maximum number of files to return
    pub max_files: Option<usize>,
    /// Whether dot-files such as `.env` are visited
    pub include_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            excludes: default_excludes(),
            max_file_size: 1024 * 1024,
            max_files: None,
            include_hidden: false,
        }
    }
}

/// Directory and file names skipped unless configured otherwise.
pub fn default_excludes() -> Vec<String> {
    vec![
        ".git",
        "target",
        "node_modules",
        "vendor",
        "dist",
        "build",
        "bin",
        "obj",
        "__pycache__",
        ".venv",
        "venv",
        ".idea",
        ".vscode",
        "*.min.js",
        "*.min.css",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl From<&ScannerConfig> for ScanConfig {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            extensions: Vec::new(),
            excludes: config.excludes.clone(),
            max_file_size: config.max_file_size,
            max_files: Some(config.max_files),
            include_hidden: false,
        }
    }
}

impl ScanConfig {
    /// Restrict the scan to the given extensions.
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    pub fn with_max_files(mut self, max_files: Option<usize>) -> Self {
        self.max_files = max_files;
        self
    }
}

/// Scanned file information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Relative path from repo root, always `/`-separated
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// File extension (without dot, lowercase)
    pub extension: String,
}

impl ScannedFile {
    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// File scanner for discovering repository files.
#[derive(Debug, Clone)]
pub struct FileScanner {
    config: ScanConfig,
    repo_root: PathBuf,
}

impl FileScanner {
    /// Create a new file scanner.
    pub fn new(repo_root: impl Into<PathBuf>, config: ScanConfig) -> Self {
        Self {
            config,
            repo_root: repo_root.into(),
        }
    }

    /// Scan for all matching files, sorted by path.
    pub fn scan(&self) -> io::Result<Vec<ScannedFile>> {
        if !self.repo_root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Not a directory: {}", self.repo_root.display()),
            ));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.repo_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !self.is_excluded(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let extension = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();

            if !self.config.extensions.is_empty()
                && !self.config.extensions.iter().any(|e| e == &extension)
            {
                continue;
            }

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(_) => continue,
            };
            if size > self.config.max_file_size {
                debug!("Skipping large file {} ({} bytes)", entry.path().display(), size);
                continue;
            }

            files.push(ScannedFile {
                path: self.relative(entry.path()),
                size,
                extension,
            });

            if let Some(max) = self.config.max_files {
                if files.len() >= max {
                    break;
                }
            }
        }

        Ok(files)
    }

    /// [`scan`](Self::scan) on the blocking pool, for use from async code.
    pub async fn scan_async(&self) -> io::Result<Vec<ScannedFile>> {
        let scanner = self.clone();
        tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(io::Error::other)?
    }

    /// Read a scanned file's content.
    pub async fn read_async(&self, file: &ScannedFile) -> io::Result<String> {
        tokio::fs::read_to_string(self.repo_root.join(&file.path)).await
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.repo_root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Check if a name matches exclusion patterns.
    fn is_excluded(&self, name: &str) -> bool {
        if !self.config.include_hidden && name.starts_with('.') {
            return true;
        }

        self.config.excludes.iter().any(|pattern| match pattern.strip_prefix('*') {
            Some(suffix) => name.ends_with(suffix),
            None => name == pattern,
        })
    }
}

/// Map a file extension to a language name.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "jsx" | "mjs" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "java" => "Java",
        "kt" => "Kotlin",
        "c" | "h" => "C",
        "cpp" | "cc" | "hpp" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        "scala" => "Scala",
        _ => return None,
    };
    Some(lang)
}

/// [`detect_languages`] on the blocking pool.
pub async fn detect_languages_async(repo_root: &Path, config: &ScanConfig) -> io::Result<Vec<String>> {
    let repo_root = repo_root.to_path_buf();
    let config = config.clone();
    tokio::task::spawn_blocking(move || detect_languages(&repo_root, &config))
        .await
        .map_err(io::Error::other)?
}

/// Detect the languages present in a repository, most common first.
pub fn detect_languages(repo_root: &Path, config: &ScanConfig) -> io::Result<Vec<String>> {
    let files = FileScanner::new(repo_root, config.clone().with_max_files(None)).scan()?;

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for file in &files {
        if let Some(lang) = language_for_extension(&file.extension) {
            *counts.entry(lang).or_insert(0) += 1;
        }
    }

    let mut langs: Vec<_> = counts.into_iter().collect();
    langs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    Ok(langs.into_iter().map(|(l, _)| l.to_string()).collect())
}
