//! Occurrence search: every place a resolved name is used.
//!
//! Starting from one position, the target name is resolved once, then each
//! candidate module is scanned textually for whole-word matches of the same
//! name. Every candidate match is resolved through the facade and kept only
//! when it provably shares the target's definition site. Matches that
//! resolve to nothing (an unknown receiver, a name the engine cannot
//! conclude) are reported as unsure when the caller opts in; they are never
//! silently treated as matches.

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use sift_core::error::SiftError;
use sift_core::text::Span;

use crate::analyzer::{Analyzer, ModuleId};
use crate::resolve::NameAt;

// ============================================================================
// Results
// ============================================================================

/// One use of the searched name.
#[derive(Debug, Clone, Serialize)]
pub struct Occurrence {
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// 1-indexed position of the word.
    pub line: u32,
    pub column: u32,
    pub span: Span,
    /// False when the engine could not prove the match refers to the
    /// target (unsure matches, present only when requested).
    pub certain: bool,
}

// ============================================================================
// Search
// ============================================================================

impl Analyzer {
    /// Find occurrences of the name at `offset` within its own module.
    pub fn find_occurrences(
        &mut self,
        module: ModuleId,
        offset: usize,
        include_unsure: bool,
    ) -> Result<Vec<Occurrence>, SiftError> {
        let target = self.name_at(module, offset)?;
        let pattern = word_pattern(&target.text)?;
        Ok(self.scan_module(module, &target, &pattern, include_unsure))
    }

    /// Find occurrences across every module of the project. The progress
    /// callback receives each module name before its scan; returning false
    /// cancels the search, keeping what was already found.
    pub fn find_occurrences_in_project(
        &mut self,
        module: ModuleId,
        offset: usize,
        include_unsure: bool,
        progress: &mut dyn FnMut(&str) -> bool,
    ) -> Result<Vec<Occurrence>, SiftError> {
        let target = self.name_at(module, offset)?;
        let pattern = word_pattern(&target.text)?;

        for name in self.project.list_modules() {
            self.load_module(&name);
        }
        let mut candidates: Vec<ModuleId> = (0..self.modules.len())
            .map(<ModuleId as sift_core::cache::Idx>::from_usize)
            .collect();
        candidates.sort_by(|&a, &b| self.modules[a].name.cmp(&self.modules[b].name));

        let mut found = Vec::new();
        for candidate in candidates {
            let name = self.modules[candidate].name.clone();
            if !progress(&name) {
                debug!(at = %name, "occurrence search cancelled");
                break;
            }
            found.extend(self.scan_module(candidate, &target, &pattern, include_unsure));
        }
        Ok(found)
    }

    /// Scan one module for matches of the target. Modules that do not parse
    /// contribute nothing.
    fn scan_module(
        &mut self,
        module: ModuleId,
        target: &NameAt,
        pattern: &Regex,
        include_unsure: bool,
    ) -> Vec<Occurrence> {
        if self.modules[module].parse_error.is_some() {
            debug!(module = %self.modules[module].name, "skipping unparsed module");
            return Vec::new();
        }
        let source = self.modules[module].source.clone();
        let starts: Vec<usize> = pattern
            .captures_iter(&source)
            .filter_map(|captures| captures.get(1).map(|m| m.start()))
            .collect();

        let mut found = Vec::new();
        for start in starts {
            let Some(certain) = self.classify_match(module, start, target) else {
                continue;
            };
            if !certain && !include_unsure {
                continue;
            }
            let span = Span::new(start, start + target.text.len());
            let (line, column) = self.modules[module].lines.position_of(start);
            found.push(Occurrence {
                module: self.modules[module].name.clone(),
                path: self.modules[module]
                    .resource
                    .as_ref()
                    .map(|p| p.display().to_string()),
                line,
                column,
                span,
                certain,
            });
        }
        found
    }

    /// `Some(true)`: provably the target. `Some(false)`: cannot be proved
    /// either way. `None`: provably something else, or not a name at all.
    fn classify_match(
        &mut self,
        module: ModuleId,
        start: usize,
        target: &NameAt,
    ) -> Option<bool> {
        match self.name_at(module, start) {
            Ok(candidate) => {
                if self.same_binding(candidate.found, target.found) {
                    return Some(true);
                }
                let object = self.object_of(candidate.found);
                let anchored = self.def_location(candidate.found).is_some();
                if object.is_unknown() && !anchored {
                    return Some(false);
                }
                None
            }
            Err(SiftError::NameNotFound { .. }) => Some(false),
            Err(_) => None,
        }
    }
}

/// One pattern scans each module: string literals and comments participate
/// as alternates so matches inside them are consumed by the scan itself,
/// and only group 1 (the bare word) yields candidates.
fn word_pattern(name: &str) -> Result<Regex, SiftError> {
    let pattern = format!(
        concat!(
            r#"(?s:'''.*?'''|""".*?""")"#,
            r#"|'(?:\\.|[^'\\\n])*'"#,
            r#"|"(?:\\.|[^"\\\n])*""#,
            r"|#[^\n]*",
            r"|\b({})\b",
        ),
        regex::escape(name)
    );
    Regex::new(&pattern).map_err(|err| SiftError::internal(format!("occurrence pattern: {err}")))
}

// ============================================================================
// Tests
// ============================================================================
