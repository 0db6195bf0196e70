use crate::error::{Result, RunconfError};
use globset::{Glob, GlobMatcher, GlobSet};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default pattern for Spring Boot entry points
pub const DEFAULT_APPLICATION_GLOB: &str = "**/*Application.java";

/// Extensions accepted for environment files
pub const ENVIRONMENT_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Options controlling which application files are picked up
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Glob matched against paths relative to the base directory
    pub application_glob: String,
    /// Paths matching this set are skipped
    pub exclude: Option<GlobSet>,
    /// Whether to honour `.gitignore` files during the walk
    pub use_gitignore: bool,
    /// Directories never descended into (e.g. the output directory)
    pub skip_dirs: Vec<PathBuf>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            application_glob: DEFAULT_APPLICATION_GLOB.to_string(),
            exclude: None,
            use_gitignore: true,
            skip_dirs: Vec::new(),
        }
    }
}

/// Finds application entry-point files under `base_dir`, sorted.
///
/// Hidden entries are skipped.
///
/// # Errors
///
/// Returns `RunconfError::Glob` if the application glob is invalid.
/// Unreadable directories are logged and skipped.
pub fn find_applications(base_dir: &Path, options: &DiscoveryOptions) -> Result<Vec<PathBuf>> {
    let matcher: GlobMatcher = Glob::new(&options.application_glob)?.compile_matcher();
    let skip_dirs = options.skip_dirs.clone();

    let walker = WalkBuilder::new(base_dir)
        .hidden(true)
        .git_ignore(options.use_gitignore)
        .git_global(options.use_gitignore)
        .git_exclude(options.use_gitignore)
        .ignore(options.use_gitignore)
        .parents(options.use_gitignore)
        .require_git(false)
        .filter_entry(move |entry| !skip_dirs.iter().any(|dir| entry.path() == dir))
        .build();

    let mut applications = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", RunconfError::from(e));
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(base_dir).unwrap_or(path);
        if !matcher.is_match(relative) {
            continue;
        }
        if let Some(exclude) = &options.exclude
            && exclude.is_match(relative)
        {
            debug!("Excluded {}", relative.display());
            continue;
        }

        applications.push(path.to_path_buf());
    }

    applications.sort();
    Ok(applications)
}

/// Lists `*.yml` / `*.yaml` files directly inside `envs_dir`, sorted.
///
/// A missing directory yields no environments; unreadable entries are skipped.
#[must_use]
pub fn find_environments(envs_dir: &Path) -> Vec<PathBuf> {
    if !envs_dir.is_dir() {
        warn!("Environment directory {} not found", envs_dir.display());
        return Vec::new();
    }

    let mut environments = Vec::new();
    for entry in walkdir::WalkDir::new(envs_dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", RunconfError::from(e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let is_yaml = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ENVIRONMENT_EXTENSIONS.contains(&ext));
        if is_yaml {
            environments.push(entry.into_path());
        }
    }

    environments.sort();
    environments
}

/// Resolves `path` against `base_dir` unless it is already absolute
#[must_use]
pub fn resolve_against(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Reads a file, mapping a missing file to `RunconfError::TemplateNotFound`
///
/// # Errors
///
/// - `RunconfError::TemplateNotFound` if the path doesn't exist or isn't a file.
/// - `RunconfError::Io` if there's an error reading the file.
pub fn read_template_file(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(RunconfError::TemplateNotFound {
            path: path.to_path_buf(),
        });
    }

    std::fs::read_to_string(path).map_err(Into::into)
}
