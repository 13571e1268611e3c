//! Command implementations behind the `sift` binary.
//!
//! Each `run_*` function builds an analyzer over the project root, loads
//! the file under analysis, and returns a JSON-ready value. All failures
//! flow through [`SiftError`] so the binary can map them to stable exit
//! codes.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use sift_core::error::SiftError;
use sift_python::{dynamic, Analyzer, ModuleId, Project, ProjectConfig};

// ============================================================================
// Locations
// ============================================================================

/// A `path:line:col` argument, 1-indexed.
#[derive(Debug, Clone)]
pub struct Location {
    pub path: PathBuf,
    pub line: u32,
    pub col: u32,
}

pub fn parse_location(text: &str) -> Result<Location, SiftError> {
    let mut parts = text.rsplitn(3, ':');
    let col = parts.next().and_then(|p| p.parse().ok());
    let line = parts.next().and_then(|p| p.parse().ok());
    let path = parts.next();
    match (path, line, col) {
        (Some(path), Some(line), Some(col)) if line > 0 && col > 0 => Ok(Location {
            path: PathBuf::from(path),
            line,
            col,
        }),
        _ => Err(SiftError::invalid_args(format!(
            "expected path:line:col, got '{text}'"
        ))),
    }
}

// ============================================================================
// Commands
// ============================================================================

pub fn run_resolve(
    root: Option<&Path>,
    at: &str,
    observations: Option<&Path>,
) -> Result<Value, SiftError> {
    let location = parse_location(at)?;
    let (mut analyzer, module) = open(root, &location.path, observations)?;
    analyzer.analyze_module_calls(module);
    let resolved = analyzer.resolve_position(module, location.line, location.col)?;
    serde_json::to_value(resolved).map_err(|err| SiftError::internal(err.to_string()))
}

pub fn run_occurrences(
    root: Option<&Path>,
    at: &str,
    include_unsure: bool,
    observations: Option<&Path>,
) -> Result<Value, SiftError> {
    let location = parse_location(at)?;
    let (mut analyzer, module) = open(root, &location.path, observations)?;
    for name in analyzer.project().list_modules() {
        analyzer.load_module(&name);
    }
    analyzer.analyze_all();
    let offset = offset_of(&analyzer, module, &location)?;
    let found = analyzer.find_occurrences_in_project(module, offset, include_unsure, &mut |name| {
        info!(module = name, "scanning");
        true
    })?;
    serde_json::to_value(found).map_err(|err| SiftError::internal(err.to_string()))
}

pub fn run_outline(root: Option<&Path>, path: &Path) -> Result<Value, SiftError> {
    let (mut analyzer, module) = open(root, path, None)?;
    let outline = analyzer.module_outline(module);
    serde_json::to_value(outline).map_err(|err| SiftError::internal(err.to_string()))
}

// ============================================================================
// Setup
// ============================================================================

fn open(
    root: Option<&Path>,
    path: &Path,
    observations: Option<&Path>,
) -> Result<(Analyzer, ModuleId), SiftError> {
    let path = fs::canonicalize(path).map_err(|err| SiftError::File {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    let root = match root {
        Some(root) => fs::canonicalize(root).map_err(|err| SiftError::File {
            path: root.display().to_string(),
            message: err.to_string(),
        })?,
        None => path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    info!(root = %root.display(), file = %path.display(), "opening project");
    let mut analyzer = Analyzer::new(Project::new(ProjectConfig::rooted_at(root)));
    if let Some(observations) = observations {
        let file = dynamic::load_observations(observations)?;
        let applied = analyzer.seed_observations(&file);
        info!(applied, total = file.samples.len(), "seeded observations");
    }
    let module = analyzer.load_path(&path).ok_or_else(|| SiftError::File {
        path: path.display().to_string(),
        message: "not a loadable Python module".to_string(),
    })?;
    Ok((analyzer, module))
}

fn offset_of(
    analyzer: &Analyzer,
    module: ModuleId,
    location: &Location,
) -> Result<usize, SiftError> {
    analyzer
        .module_state(module)
        .lines
        .offset_of(location.line, location.col)
        .ok_or_else(|| {
            SiftError::invalid_args(format!(
                "position {}:{} out of range",
                location.line, location.col
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod locations {
        use super::*;

        #[test]
        fn parses_path_line_col() {
            let location = parse_location("pkg/mod.py:12:5").unwrap();
            assert_eq!(location.path, PathBuf::from("pkg/mod.py"));
            assert_eq!((location.line, location.col), (12, 5));
        }

        #[test]
        fn windows_style_drives_survive() {
            let location = parse_location("C:/code/mod.py:3:1").unwrap();
            assert_eq!(location.path, PathBuf::from("C:/code/mod.py"));
        }

        #[test]
        fn malformed_locations_are_invalid_arguments() {
            for bad in ["mod.py", "mod.py:0:1", "mod.py:a:b", "mod.py:4"] {
                let err = parse_location(bad).unwrap_err();
                assert!(matches!(err, SiftError::InvalidArguments { .. }), "{bad}");
            }
        }
    }
}
