//! Worker descriptor model and builder.
//!
//! The descriptor is the structured record of one deployed worker version:
//! identifiers, version lineage, the resolved class table and the file
//! manifest. It is assembled once per deploy request, validated here, and
//! never mutated after serialization.
//!
//! This module is also the home of the small shared model types the rest of
//! the pipeline passes around (source files, languages, base kinds).

use serde::{Deserialize, Serialize};

use crate::error::{BusinessLogicErrorCode, CompileError, CompilerResult};
use crate::mapping::ClassMapping;

/// One worker source file as supplied by the file loader. Owned by the
/// caller; the pipeline never mutates the original, it produces rewritten
/// copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub name: String,
    pub code: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        SourceFile {
            name: name.into(),
            code: code.into(),
        }
    }
}

/// The source language a worker is written in. Closed set; the wire index
/// carries it as a single byte, so variants are never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerLanguage {
    JavaScript = 0,
}

impl WorkerLanguage {
    pub fn from_tag(tag: u8) -> CompilerResult<Self> {
        match tag {
            0 => Ok(WorkerLanguage::JavaScript),
            _ => Err(CompileError::BusinessLogic(
                BusinessLogicErrorCode::InvalidWorkerLanguage,
            )),
        }
    }

    /// Parse the request-level language selector ("javascript").
    pub fn from_selector(selector: &str) -> CompilerResult<Self> {
        match selector {
            "javascript" => Ok(WorkerLanguage::JavaScript),
            _ => Err(CompileError::BusinessLogic(
                BusinessLogicErrorCode::InvalidWorkerLanguage,
            )),
        }
    }
}

/// The three platform base kinds a worker class may extend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseKind {
    /// Persistent, identity-bearing domain object.
    Entity = 1,
    /// Transactional unit of business logic, created on first use.
    Service = 2,
    /// Ephemeral notification broadcast to subscribers.
    Event = 3,
}

impl BaseKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Entity" => Some(BaseKind::Entity),
            "Service" => Some(BaseKind::Service),
            "Event" => Some(BaseKind::Event),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BaseKind::Entity => "Entity",
            BaseKind::Service => "Service",
            BaseKind::Event => "Event",
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(BaseKind::Entity),
            2 => Some(BaseKind::Service),
            3 => Some(BaseKind::Event),
            _ => None,
        }
    }
}

/// Manifest entry: stable 1-based file id plus the loader-supplied name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerFileName {
    pub file_id: u16,
    pub name: String,
}

/// One class row of the descriptor: the wire identity of a managed class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorClass {
    pub class_id: u16,
    pub class_name: String,
    pub base_kind: BaseKind,
    pub file_id: u16,
}

/// The structured record of one worker version, handed to the protocol
/// serializer. Class rows are ordered by class id, the manifest by file id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDescriptor {
    pub worker_id: u64,
    pub worker_version: u64,
    pub previous_worker_version: Option<u64>,
    pub worker_name: String,
    pub language: WorkerLanguage,
    /// High-water mark of assigned class ids, carried so the next deploy can
    /// resume numbering without reusing ids of since-removed classes.
    pub last_class_id: u16,
    pub classes: Vec<DescriptorClass>,
    pub file_manifest: Vec<WorkerFileName>,
}

impl WorkerDescriptor {
    /// Assemble and validate a descriptor. Only descriptor-level invariants
    /// are enforced here; class identity and text rewriting happened
    /// upstream.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: u64,
        worker_version: u64,
        previous_worker_version: Option<u64>,
        worker_name: impl Into<String>,
        language: WorkerLanguage,
        last_class_id: u16,
        mut classes: Vec<DescriptorClass>,
        file_manifest: Vec<WorkerFileName>,
    ) -> CompilerResult<Self> {
        let worker_name = worker_name.into();

        if worker_id == 0 {
            return Err(CompileError::BusinessLogic(
                BusinessLogicErrorCode::MissingWorkerId,
            ));
        }
        if worker_version == 0 {
            return Err(CompileError::BusinessLogic(
                BusinessLogicErrorCode::InvalidWorkerVersion,
            ));
        }
        if let Some(previous) = previous_worker_version {
            if worker_version <= previous {
                return Err(CompileError::BusinessLogic(
                    BusinessLogicErrorCode::InvalidWorkerVersion,
                ));
            }
        }
        if worker_name.trim().is_empty() {
            return Err(CompileError::BusinessLogic(
                BusinessLogicErrorCode::MissingWorkerName,
            ));
        }
        if file_manifest.is_empty() {
            return Err(CompileError::BusinessLogic(
                BusinessLogicErrorCode::MissingWorkerFiles,
            ));
        }

        classes.sort_by(|a, b| a.class_id.cmp(&b.class_id));

        Ok(WorkerDescriptor {
            worker_id,
            worker_version,
            previous_worker_version,
            worker_name,
            language,
            last_class_id,
            classes,
            file_manifest,
        })
    }

    /// The `{className, classId}` pairs exposed to the deployment API
    /// response, ordered by class id.
    pub fn class_mappings(&self) -> Vec<ClassMapping> {
        self.classes
            .iter()
            .map(|c| ClassMapping {
                class_name: c.class_name.clone(),
                class_id: c.class_id,
            })
            .collect()
    }
}
