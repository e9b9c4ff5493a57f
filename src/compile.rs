//! Compile-request orchestration.
//!
//! One deploy request flows extract → resolve → pre-compile → descriptor →
//! serialize, all-or-nothing: no artifact is produced on any failure. The
//! pipeline is pure and synchronous; every input (file contents, prior
//! mapping, high-water mark) arrives already loaded, and nothing here is
//! shared across concurrent requests. Serializing deploys *per worker* is
//! the surrounding orchestrator's job — this crate only verifies that the
//! versions it is handed line up.

use serde::{Deserialize, Serialize};

use crate::descriptor::{DescriptorClass, SourceFile, WorkerDescriptor, WorkerLanguage};
use crate::error::{BusinessLogicErrorCode, CompileError, CompilerResult};
use crate::extract::extract_classes;
use crate::mapping::{resolve_class_ids, ClassMapping, ParsedClassMappings};
use crate::protocol::ProtocolSerializer;

/// Everything the deployment orchestrator supplies for one compile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub log_context: String,
    pub worker_id: u64,
    pub worker_version: u64,
    pub previous_worker_version: Option<u64>,
    pub worker_name: String,
    /// Language selector, e.g. "javascript".
    pub language: String,
    pub files: Vec<SourceFile>,
    /// Class mappings carried from the previous version's deploy response
    /// (or an explicit tooling override). Empty on first deploy.
    #[serde(default)]
    pub class_mappings: Vec<ClassMapping>,
    /// High-water mark from the previous version's descriptor.
    pub last_class_id: Option<u16>,
}

/// Everything a successful compile hands back to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub descriptor: WorkerDescriptor,
    /// The encoded worker index, as persisted and as sent to the engine.
    pub worker_index: Vec<u8>,
    /// Rewritten source files, parallel to the input file order.
    pub code: Vec<SourceFile>,
    /// `{className, classId}` pairs for the deployment API response,
    /// ordered by class id.
    pub class_mappings: Vec<ClassMapping>,
    /// The framed setup request ready for the engine gateway.
    pub setup_request: Vec<u8>,
}

/// Run the full pipeline for one deploy request.
pub fn compile_worker(
    request: &CompileRequest,
    serializer: &ProtocolSerializer,
) -> CompilerResult<CompileResult> {
    let language = WorkerLanguage::from_selector(&request.language)?;

    if request.files.is_empty() {
        return Err(CompileError::BusinessLogic(
            BusinessLogicErrorCode::MissingWorkerFiles,
        ));
    }

    let previous_mappings = ParsedClassMappings::parse(&request.class_mappings)?;

    // Carried identity state only makes sense when redeploying over a known
    // previous version.
    if request.previous_worker_version.is_none()
        && (previous_mappings.is_some() || request.last_class_id.is_some())
    {
        return Err(CompileError::BusinessLogic(
            BusinessLogicErrorCode::MissingCurrentWorkerVersion,
        ));
    }

    let extracted = extract_classes(&request.files)?;
    tracing::debug!(
        log_context = %request.log_context,
        classes = extracted.classes.len(),
        "extraction complete"
    );

    let resolved = resolve_class_ids(
        &extracted.classes,
        previous_mappings.as_ref(),
        request.last_class_id,
    )?;

    let code = extracted
        .directives
        .iter()
        .map(|directive| directive.pre_compile())
        .collect::<CompilerResult<Vec<SourceFile>>>()?;

    let classes: Vec<DescriptorClass> = extracted
        .classes
        .iter()
        .zip(&resolved.assignments)
        .map(|(class, (_, class_id))| DescriptorClass {
            class_id: *class_id,
            class_name: class.name.clone(),
            base_kind: class.base_kind,
            file_id: class.file_id,
        })
        .collect();

    let descriptor = WorkerDescriptor::new(
        request.worker_id,
        request.worker_version,
        request.previous_worker_version,
        request.worker_name.clone(),
        language,
        resolved.last_class_id,
        classes,
        extracted.files,
    )?;

    let worker_index = serializer.serialize_worker_index(&descriptor)?;

    let code_strings: Vec<String> = code.iter().map(|file| file.code.clone()).collect();
    let setup_request = serializer.create_setup_worker_request(
        &request.log_context,
        descriptor.worker_id,
        descriptor.worker_version,
        descriptor.previous_worker_version,
        &worker_index,
        &code_strings,
    )?;

    let class_mappings = descriptor.class_mappings();

    tracing::info!(
        log_context = %request.log_context,
        worker = %descriptor.worker_name,
        worker_id = descriptor.worker_id,
        version = descriptor.worker_version,
        classes = class_mappings.len(),
        "CompileWorker: Ok"
    );

    Ok(CompileResult {
        descriptor,
        worker_index,
        code,
        class_mappings,
        setup_request,
    })
}

/// Frame a delete request for a deployed worker version.
pub fn delete_worker(
    serializer: &ProtocolSerializer,
    log_context: &str,
    worker_id: u64,
    worker_version: u64,
) -> CompilerResult<Vec<u8>> {
    let request = serializer.create_delete_worker_request(log_context, worker_id, worker_version)?;
    tracing::info!(
        log_context = %log_context,
        worker_id,
        version = worker_version,
        "DeleteWorker: request framed"
    );
    Ok(request)
}

#[cfg(feature = "napi")]
mod native {
    use napi_derive::napi;
    use serde::Deserialize;

    use super::*;
    use crate::error::ErrorShape;

    /// Request shape at the host boundary. Sixty-four-bit ids travel as
    /// strings because the host language's numbers can't hold them.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct NativeCompileRequest {
        log_context: String,
        worker_id_str: String,
        worker_version_str: String,
        previous_worker_version_str: Option<String>,
        worker_name: String,
        #[serde(default = "default_language")]
        language: String,
        worker_files: Vec<SourceFile>,
        #[serde(default)]
        worker_class_mappings: Vec<ClassMapping>,
        last_class_id: Option<u16>,
    }

    fn default_language() -> String {
        "javascript".to_string()
    }

    impl NativeCompileRequest {
        fn into_request(self) -> CompilerResult<CompileRequest> {
            let worker_id: u64 = self.worker_id_str.parse().map_err(|_| {
                CompileError::BusinessLogic(BusinessLogicErrorCode::MissingWorkerId)
            })?;
            let worker_version: u64 = self.worker_version_str.parse().map_err(|_| {
                CompileError::BusinessLogic(BusinessLogicErrorCode::InvalidWorkerVersion)
            })?;
            let previous_worker_version = match self.previous_worker_version_str {
                Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                    CompileError::BusinessLogic(
                        BusinessLogicErrorCode::MissingCurrentWorkerVersion,
                    )
                })?),
                None => None,
            };
            Ok(CompileRequest {
                log_context: self.log_context,
                worker_id,
                worker_version,
                previous_worker_version,
                worker_name: self.worker_name,
                language: self.language,
                files: self.worker_files,
                class_mappings: self.worker_class_mappings,
                last_class_id: self.last_class_id,
            })
        }
    }

    fn error_json(err: &CompileError) -> String {
        serde_json::to_string(&ErrorShape::from(err)).unwrap_or_else(|_| {
            r#"{"type":"code","category":"platform","error":"serialization failure"}"#.to_string()
        })
    }

    /// Compile a worker deploy request. Takes and returns JSON strings; on
    /// failure the returned JSON is one of the two error shapes.
    #[napi]
    pub fn compile_worker_native(request_json: String) -> String {
        let request = match serde_json::from_str::<NativeCompileRequest>(&request_json)
            .map_err(|_| {
                CompileError::BusinessLogic(BusinessLogicErrorCode::UnknownParserError)
            })
            .and_then(NativeCompileRequest::into_request)
        {
            Ok(request) => request,
            Err(err) => return error_json(&err),
        };

        let serializer = ProtocolSerializer::default();
        match compile_worker(&request, &serializer) {
            Ok(result) => serde_json::to_string(&result).unwrap_or_else(|_| {
                error_json(&CompileError::Serialization(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "response encoding failed",
                )))
            }),
            Err(err) => error_json(&err),
        }
    }

    /// Frame a delete request. Returns the bytes as a JSON array, or an
    /// error shape.
    #[napi]
    pub fn delete_worker_request_native(
        log_context: String,
        worker_id_str: String,
        worker_version_str: String,
    ) -> String {
        let parsed = worker_id_str
            .parse::<u64>()
            .map_err(|_| CompileError::BusinessLogic(BusinessLogicErrorCode::MissingWorkerId))
            .and_then(|worker_id| {
                let worker_version = worker_version_str.parse::<u64>().map_err(|_| {
                    CompileError::BusinessLogic(BusinessLogicErrorCode::InvalidWorkerVersion)
                })?;
                Ok((worker_id, worker_version))
            });

        let (worker_id, worker_version) = match parsed {
            Ok(pair) => pair,
            Err(err) => return error_json(&err),
        };

        let serializer = ProtocolSerializer::default();
        match delete_worker(&serializer, &log_context, worker_id, worker_version) {
            Ok(bytes) => serde_json::to_string(&bytes)
                .unwrap_or_else(|_| error_json(&communication_fallback())),
            Err(err) => error_json(&err),
        }
    }

    fn communication_fallback() -> CompileError {
        CompileError::Serialization(std::io::Error::new(
            std::io::ErrorKind::Other,
            "response encoding failed",
        ))
    }
}

#[cfg(feature = "napi")]
pub use native::{compile_worker_native, delete_worker_request_native};
