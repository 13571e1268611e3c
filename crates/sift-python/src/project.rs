//! Project layout: where modules live on disk.
//!
//! A [`Project`] turns dotted module names into files and back. Lookup
//! order is the project's source folders first, then any extra path
//! folders. A directory is a package only when it carries an
//! `__init__.py`. An in-memory overlay shadows the filesystem so callers
//! can analyze unsaved buffers without touching disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;
use walkdir::WalkDir;

use sift_core::error::SiftError;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("cannot read {path}: {message}")]
    Read { path: String, message: String },
}

impl From<ProjectError> for SiftError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::Read { path, message } => SiftError::File { path, message },
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Search configuration for a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
    /// Folders holding the project's own code, searched first.
    pub source_folders: Vec<PathBuf>,
    /// Extra folders searched after the source folders.
    pub path_folders: Vec<PathBuf>,
}

impl ProjectConfig {
    /// A project rooted at a single folder.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        ProjectConfig {
            source_folders: vec![root.into()],
            path_folders: Vec::new(),
        }
    }
}

// ============================================================================
// Project
// ============================================================================

/// A resolved module location.
#[derive(Debug, Clone)]
pub struct FoundModule {
    pub path: PathBuf,
    /// The package directory when the module is a package `__init__`.
    pub folder: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct Project {
    config: ProjectConfig,
    /// Unsaved buffer contents, keyed by path; shadows the filesystem.
    overlay: HashMap<PathBuf, String>,
}

impl Project {
    pub fn new(config: ProjectConfig) -> Self {
        Project {
            config,
            overlay: HashMap::new(),
        }
    }

    /// A project with no folders; only overlay and in-memory modules exist.
    pub fn empty() -> Self {
        Project::default()
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn write_overlay(&mut self, path: impl Into<PathBuf>, contents: String) {
        self.overlay.insert(path.into(), contents);
    }

    pub fn clear_overlay(&mut self, path: &Path) {
        self.overlay.remove(path);
    }

    /// Read module source, preferring overlay contents.
    pub fn read_source(&self, path: &Path) -> Result<String, ProjectError> {
        if let Some(contents) = self.overlay.get(path) {
            return Ok(contents.clone());
        }
        fs::read_to_string(path).map_err(|err| ProjectError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }

    /// Locate a dotted module name: source folders first, then path
    /// folders. Packages require `__init__.py`.
    pub fn resolve_module(&self, name: &str) -> Option<FoundModule> {
        let segments: Vec<&str> = name.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        for folder in self.search_folders() {
            if let Some(found) = resolve_in(folder, &segments) {
                trace!(module = name, path = %found.path.display(), "module resolved");
                return Some(found);
            }
        }
        None
    }

    /// Locate a direct submodule of a package folder.
    pub fn find_in_folder(&self, folder: &Path, name: &str) -> Option<FoundModule> {
        resolve_in(folder, &[name])
    }

    /// Derive a module's dotted name from its path. Files outside every
    /// search folder fall back to their stem.
    pub fn module_name_of(&self, path: &Path) -> Option<String> {
        for folder in self.search_folders() {
            let Ok(relative) = path.strip_prefix(folder) else {
                continue;
            };
            let mut segments: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let last = segments.pop()?;
            if last == "__init__.py" {
                if segments.is_empty() {
                    return None;
                }
            } else {
                segments.push(last.strip_suffix(".py")?.to_string());
            }
            return Some(segments.join("."));
        }
        path.file_stem().map(|s| s.to_string_lossy().into_owned())
    }

    /// The package directory of a path, when it is a package `__init__`.
    pub fn package_folder_of(&self, path: &Path) -> Option<PathBuf> {
        if path.file_name()?.to_str()? == "__init__.py" {
            return path.parent().map(Path::to_path_buf);
        }
        None
    }

    /// Every module name reachable from the source folders.
    pub fn list_modules(&self) -> Vec<String> {
        let mut names = Vec::new();
        for folder in &self.config.source_folders {
            for entry in WalkDir::new(folder)
                .into_iter()
                .filter_entry(|e| !is_hidden(e.path()))
                .filter_map(Result::ok)
            {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("py") {
                    continue;
                }
                if let Some(name) = self.module_name_of(path) {
                    names.push(name);
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }

    fn search_folders(&self) -> impl Iterator<Item = &PathBuf> {
        self.config
            .source_folders
            .iter()
            .chain(self.config.path_folders.iter())
    }
}

fn resolve_in(folder: &Path, segments: &[&str]) -> Option<FoundModule> {
    let (last, packages) = segments.split_last()?;
    let mut dir = folder.to_path_buf();
    for package in packages {
        dir = dir.join(package);
        if !dir.join("__init__.py").is_file() {
            return None;
        }
    }
    let file = dir.join(format!("{last}.py"));
    if file.is_file() {
        return Some(FoundModule {
            path: file,
            folder: None,
        });
    }
    let package_dir = dir.join(last);
    let init = package_dir.join("__init__.py");
    if init.is_file() {
        return Some(FoundModule {
            path: init,
            folder: Some(package_dir),
        });
    }
    None
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for (path, contents) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).expect("mkdir");
            }
            fs::write(full, contents).expect("write");
        }
        dir
    }

    mod resolution {
        use super::*;

        #[test]
        fn finds_top_level_modules_and_packages() {
            let dir = tree(&[
                ("single.py", ""),
                ("pkg/__init__.py", ""),
                ("pkg/inner.py", ""),
            ]);
            let project = Project::new(ProjectConfig::rooted_at(dir.path()));

            let single = project.resolve_module("single").unwrap();
            assert!(single.folder.is_none());

            let pkg = project.resolve_module("pkg").unwrap();
            assert_eq!(pkg.folder.as_deref(), Some(dir.path().join("pkg").as_path()));

            let inner = project.resolve_module("pkg.inner").unwrap();
            assert_eq!(inner.path, dir.path().join("pkg/inner.py"));
        }

        #[test]
        fn directories_without_init_are_not_packages() {
            let dir = tree(&[("plain/inner.py", "")]);
            let project = Project::new(ProjectConfig::rooted_at(dir.path()));
            assert!(project.resolve_module("plain.inner").is_none());
        }

        #[test]
        fn path_folders_are_searched_after_source_folders() {
            let source = tree(&[("shared.py", "x = 'source'\n")]);
            let extra = tree(&[("shared.py", "x = 'extra'\n"), ("only.py", "")]);
            let project = Project::new(ProjectConfig {
                source_folders: vec![source.path().to_path_buf()],
                path_folders: vec![extra.path().to_path_buf()],
            });
            let shared = project.resolve_module("shared").unwrap();
            assert_eq!(shared.path, source.path().join("shared.py"));
            assert!(project.resolve_module("only").is_some());
        }
    }

    mod naming {
        use super::*;

        #[test]
        fn paths_round_trip_to_dotted_names() {
            let dir = tree(&[("pkg/__init__.py", ""), ("pkg/sub/__init__.py", ""), ("pkg/sub/mod.py", "")]);
            let project = Project::new(ProjectConfig::rooted_at(dir.path()));
            assert_eq!(
                project.module_name_of(&dir.path().join("pkg/sub/mod.py")),
                Some("pkg.sub.mod".to_string())
            );
            assert_eq!(
                project.module_name_of(&dir.path().join("pkg/sub/__init__.py")),
                Some("pkg.sub".to_string())
            );
        }

        #[test]
        fn listing_covers_every_module() {
            let dir = tree(&[
                ("a.py", ""),
                ("pkg/__init__.py", ""),
                ("pkg/b.py", ""),
                ("notes.txt", ""),
            ]);
            let project = Project::new(ProjectConfig::rooted_at(dir.path()));
            assert_eq!(project.list_modules(), ["a", "pkg", "pkg.b"]);
        }
    }

    mod overlay {
        use super::*;

        #[test]
        fn overlay_shadows_the_file() {
            let dir = tree(&[("mod.py", "x = 1\n")]);
            let mut project = Project::new(ProjectConfig::rooted_at(dir.path()));
            let path = dir.path().join("mod.py");
            assert_eq!(project.read_source(&path).unwrap(), "x = 1\n");
            project.write_overlay(&path, "x = 2\n".to_string());
            assert_eq!(project.read_source(&path).unwrap(), "x = 2\n");
            project.clear_overlay(&path);
            assert_eq!(project.read_source(&path).unwrap(), "x = 1\n");
        }
    }
}
