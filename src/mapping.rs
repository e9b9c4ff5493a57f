//! Class identity resolution across worker versions.
//!
//! Persisted entity records are tagged by class id, not name, so once a
//! name is bound to an id within a worker lineage that id can never be
//! rebound to a different name. The resolver copies known ids forward,
//! assigns fresh ids above the high-water mark for new names, and never
//! reuses an id even after its class disappears from the source.
//!
//! The high-water mark is threaded through the call as a value (mark in,
//! updated mark out); nothing here is process-wide state.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{BusinessLogicErrorCode, CompileError, CompilerResult, PlatformErrorCode};
use crate::extract::ParsedClass;

/// The worker config pseudo-file blamed for invalid mapping overrides. The
/// override payload rides in the deployment request, not in a source file.
pub const WORKER_CONFIG_FILE: &str = "worker.json";

lazy_static! {
    static ref CLASS_NAME_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Binding between a source-level class name and its stable wire id.
/// Exposed to the deployment API response so client tooling can map
/// between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMapping {
    pub class_name: String,
    pub class_id: u16,
}

/// A validated set of class mappings carried over from the previous
/// deployed version (or supplied as an explicit override by out-of-band
/// tooling). Construction rejects malformed entries up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedClassMappings {
    by_name: HashMap<String, u16>,
}

impl ParsedClassMappings {
    /// Validate raw `{className, classId}` entries. Returns `None` when the
    /// caller supplied nothing, so first deploys need no special casing.
    pub fn parse(mappings: &[ClassMapping]) -> CompilerResult<Option<Self>> {
        if mappings.is_empty() {
            return Ok(None);
        }

        const ERROR_PREFIX: &str = "Invalid class mapping: ";

        let mut class_ids = HashSet::new();
        let mut by_name = HashMap::new();

        for mapping in mappings {
            if mapping.class_id == 0 {
                return Err(CompileError::code_parse(
                    WORKER_CONFIG_FILE,
                    format!("{ERROR_PREFIX}The class id 0 is invalid."),
                ));
            }
            if mapping.class_name.trim().is_empty() {
                return Err(CompileError::code_parse(
                    WORKER_CONFIG_FILE,
                    format!("{ERROR_PREFIX}Empty class name specified."),
                ));
            }
            if !CLASS_NAME_RE.is_match(&mapping.class_name) {
                return Err(CompileError::code_parse(
                    WORKER_CONFIG_FILE,
                    format!(
                        "{ERROR_PREFIX}The class name '{}' has invalid characters.",
                        mapping.class_name
                    ),
                ));
            }
            if !class_ids.insert(mapping.class_id) {
                return Err(CompileError::code_parse(
                    WORKER_CONFIG_FILE,
                    format!("The class id {} is a duplicate.", mapping.class_id),
                ));
            }
            if by_name
                .insert(mapping.class_name.clone(), mapping.class_id)
                .is_some()
            {
                return Err(CompileError::code_parse(
                    WORKER_CONFIG_FILE,
                    format!("The class name {} is a duplicate.", mapping.class_name),
                ));
            }
        }

        Ok(Some(ParsedClassMappings { by_name }))
    }

    pub fn get(&self, class_name: &str) -> Option<u16> {
        self.by_name.get(class_name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

/// Resolver output: each extracted class bound to its id, plus the updated
/// high-water mark to persist in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClasses {
    pub assignments: Vec<(String, u16)>,
    pub last_class_id: u16,
}

/// Bind every extracted class to a stable id.
///
/// Names present in `previous` keep their ids unchanged; new names get
/// `last_class_id + 1` onward. Every name in `previous` must still exist in
/// the extracted set — a stale entry means the caller's mapping and the
/// code have diverged.
pub fn resolve_class_ids(
    classes: &[ParsedClass],
    previous: Option<&ParsedClassMappings>,
    last_class_id: Option<u16>,
) -> CompilerResult<ResolvedClasses> {
    let mut high_water = last_class_id.unwrap_or(0);
    let mut used_ids: HashSet<u16> = HashSet::new();
    let mut assignments = Vec::with_capacity(classes.len());

    if let Some(previous) = previous {
        let extracted: HashSet<&str> = classes.iter().map(|c| c.name.as_str()).collect();
        let stale: Vec<&str> = previous
            .names()
            .filter(|name| !extracted.contains(name))
            .collect();
        if !stale.is_empty() {
            tracing::warn!(
                missing = ?stale,
                "class mapping references classes absent from the extracted set"
            );
            return Err(CompileError::BusinessLogic(
                BusinessLogicErrorCode::MissingTypeDefinitions,
            ));
        }
    }

    for class in classes {
        let id = match previous.and_then(|p| p.get(&class.name)) {
            Some(existing) => existing,
            None => {
                let fresh = high_water.checked_add(1).ok_or(CompileError::Platform(
                    PlatformErrorCode::ClassIdCapacityExceeded,
                ))?;
                high_water = fresh;
                fresh
            }
        };

        if !used_ids.insert(id) {
            // A carried-forward id collided with a fresh assignment (or two
            // override entries slipped past validation). Never merge.
            return Err(CompileError::BusinessLogic(
                BusinessLogicErrorCode::DuplicateWorkerClassMapping,
            ));
        }

        assignments.push((class.name.clone(), id));
        if id > high_water {
            high_water = id;
        }
    }

    Ok(ResolvedClasses {
        assignments,
        last_class_id: high_water,
    })
}
