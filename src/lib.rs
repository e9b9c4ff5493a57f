//! # Worker Compiler Core
//!
//! Compilation and protocol-serialization pipeline for versioned backend
//! workers: ordinary JavaScript modules whose classes extend the platform
//! base kinds (`Entity`, `Service`, `Event`). Before a worker can run on
//! the execution engine its source is analyzed, its class identities are
//! reconciled against the previous deployed version, its text is rewritten,
//! and the result is packaged into the binary worker index the engine
//! consumes over the native boundary.
//!
//! ## Pipeline Invariants
//!
//! 1. **Identity stability**: once a class name is bound to a class id
//!    within a worker lineage, that id is never rebound to another name.
//!    Persisted entity records are tagged by id, not name.
//! 2. **No id reuse**: ids of removed classes stay burned; fresh ids are
//!    assigned strictly above the lineage's high-water mark.
//! 3. **All-or-nothing**: a compile request either yields the full artifact
//!    set (index bytes, rewritten files, class mappings, setup frame) or a
//!    single categorized error. No stage emits partial output.
//! 4. **Byte determinism**: encoding the same descriptor always yields
//!    identical bytes. The engine treats the stream as the wire contract.
//! 5. **Purity**: no I/O, no shared mutable state, no threads. Everything a
//!    request needs arrives as an argument; concurrent requests for
//!    different workers cannot interact.

mod compile;
mod descriptor;
mod error;
mod extract;
mod gateway;
mod mapping;
mod precompile;
mod protocol;

#[cfg(test)]
mod property_tests;

pub use compile::{compile_worker, delete_worker, CompileRequest, CompileResult};
pub use descriptor::{
    BaseKind, DescriptorClass, SourceFile, WorkerDescriptor, WorkerFileName, WorkerLanguage,
};
pub use error::{
    BusinessLogicErrorCode, CompileError, CompilerResult, ErrorCategory, ErrorShape,
    PlatformErrorCode,
};
pub use extract::{
    extract_classes, ExtractedWorker, ParsedClass, INTERNAL_PREFIX, RUNTIME_MODULE_NAME,
};
pub use gateway::{decode_engine_response, EngineGateway, EngineResponse};
pub use mapping::{
    resolve_class_ids, ClassMapping, ParsedClassMappings, ResolvedClasses, WORKER_CONFIG_FILE,
};
pub use precompile::{PreCompilerDirective, PreCompilerInstruction};
pub use protocol::{
    render_debug_tree, DeleteWorkerRequest, ProtocolSerializer, ProtocolSerializerConfig,
    SetupWorkerRequest, MAX_LOG_CONTEXT_CHARS, WORKER_INDEX_FORMAT, WORKER_INDEX_MAGIC,
};

#[cfg(feature = "napi")]
pub use compile::{compile_worker_native, delete_worker_request_native};

#[cfg(feature = "napi")]
use napi_derive::napi;

#[cfg(feature = "napi")]
#[napi]
pub fn compiler_bridge() -> String {
    "Worker Compiler Native Bridge Connected".to_string()
}
