//! Seeding conclusions from recorded runtime observations.
//!
//! An observation file carries argument and return types collected while
//! the analyzed program actually ran. Seeding replays those samples into
//! the call table, so call-based conclusions exist even for functions the
//! static pre-pass never saw called. Each sample is pinned to a hash of the
//! module source it was recorded against; samples whose module has since
//! changed are dropped rather than misapplied.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use sift_core::error::SiftError;

use crate::analyzer::{Analyzer, ModuleId};
use crate::objects::{ContainerKind, ObjectId, PyObject, ScalarKind};

// ============================================================================
// Sample Format
// ============================================================================

/// An observed type, in a form stable across analyzer runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDescriptor {
    Unknown,
    /// A builtin scalar or empty container (`int`, `str`, `list`, ...).
    Builtin { name: String },
    /// An instance of a project class.
    Instance { module: String, class: String },
    /// The class itself.
    Class { module: String, class: String },
}

/// One observed call of one function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSample {
    /// Dotted name of the module holding the function.
    pub module: String,
    /// 1-indexed line of the function's `def`.
    pub line: u32,
    /// Hex sha256 of the module source at recording time.
    pub source_hash: String,
    pub parameters: Vec<TypeDescriptor>,
    pub returned: TypeDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationFile {
    pub recorded_at: DateTime<Utc>,
    pub samples: Vec<CallSample>,
}

impl ObservationFile {
    pub fn new(samples: Vec<CallSample>) -> Self {
        ObservationFile {
            recorded_at: Utc::now(),
            samples,
        }
    }
}

/// Hex sha256 of module source, as stored in [`CallSample::source_hash`].
pub fn source_hash(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Read an observation file from disk.
pub fn load_observations(path: &Path) -> Result<ObservationFile, SiftError> {
    let text = fs::read_to_string(path).map_err(|err| SiftError::File {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|err| {
        SiftError::invalid_args(format!("malformed observation file: {err}"))
    })
}

// ============================================================================
// Seeding
// ============================================================================

impl Analyzer {
    /// Replay observation samples into the call table. Returns how many
    /// samples applied; stale and unmatchable samples are skipped.
    pub fn seed_observations(&mut self, observations: &ObservationFile) -> usize {
        let mut applied = 0;
        for sample in &observations.samples {
            if self.seed_sample(sample) {
                applied += 1;
            } else {
                debug!(
                    module = %sample.module,
                    line = sample.line,
                    "observation sample skipped"
                );
            }
        }
        applied
    }

    fn seed_sample(&mut self, sample: &CallSample) -> bool {
        let Some(module) = self.load_module(&sample.module) else {
            return false;
        };
        if source_hash(&self.modules[module].source) != sample.source_hash {
            return false;
        }
        let Some(function) = self.function_at_line(module, sample.line) else {
            return false;
        };
        let parameters: Vec<ObjectId> = sample
            .parameters
            .iter()
            .map(|descriptor| self.descriptor_object(descriptor))
            .collect();
        let returned = self.descriptor_object(&sample.returned);
        self.calls.record_parameters(function, &parameters);
        self.calls.record_returned(function, returned);
        true
    }

    /// The function whose `def` sits on the given 1-indexed line, searching
    /// nested classes and functions.
    fn function_at_line(&mut self, module: ModuleId, line: u32) -> Option<ObjectId> {
        let root = self.module_scope(module)?;
        let mut pending = vec![root];
        while let Some(scope) = pending.pop() {
            let children = self.scopes[scope].children.clone();
            for child in children {
                if let PyObject::Function(data) = &self.objects[child] {
                    let at = self.modules[module].lines.line_of(data.span.start);
                    if at == line {
                        return Some(child);
                    }
                }
                if let Some(inner) = self.scope_of(child) {
                    pending.push(inner);
                }
            }
        }
        None
    }

    fn descriptor_object(&mut self, descriptor: &TypeDescriptor) -> ObjectId {
        match descriptor {
            TypeDescriptor::Unknown => self.unknown(),
            TypeDescriptor::Builtin { name } => self.builtin_named(name),
            TypeDescriptor::Instance { module, class } => {
                match self.described_class(module, class) {
                    Some(found) => self.instance_of(found),
                    None => self.unknown(),
                }
            }
            TypeDescriptor::Class { module, class } => self
                .described_class(module, class)
                .unwrap_or_else(|| self.unknown()),
        }
    }

    fn described_class(&mut self, module: &str, class: &str) -> Option<ObjectId> {
        let module = self.load_module(module)?;
        let object = self.global_object(module, class)?;
        match self.objects[object] {
            PyObject::Class(_) => Some(object),
            _ => None,
        }
    }

    fn builtin_named(&mut self, name: &str) -> ObjectId {
        match name {
            "int" => self.scalar(ScalarKind::Int),
            "float" => self.scalar(ScalarKind::Float),
            "bool" => self.scalar(ScalarKind::Bool),
            "str" => self.scalar(ScalarKind::Str),
            "bytes" => self.scalar(ScalarKind::Bytes),
            "complex" => self.scalar(ScalarKind::Complex),
            "NoneType" => self.scalar(ScalarKind::NoneType),
            "list" => {
                let unknown = self.unknown();
                self.container(ContainerKind::List, vec![unknown])
            }
            "set" => {
                let unknown = self.unknown();
                self.container(ContainerKind::Set, vec![unknown])
            }
            "tuple" => {
                let unknown = self.unknown();
                self.container(ContainerKind::Tuple, vec![unknown])
            }
            "dict" => {
                let unknown = self.unknown();
                self.container(ContainerKind::Dict, vec![unknown, unknown])
            }
            _ => self.unknown(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
