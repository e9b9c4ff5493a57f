//! Binary protocol for the execution-engine boundary.
//!
//! Encodes the worker descriptor (the persisted/transmitted "worker index")
//! and the two outbound request framings the engine accepts. The engine
//! treats the byte stream as the wire contract, so the layout here is
//! frozen: little-endian throughout, length-prefixed UTF-8 strings, flagged
//! optionals, and a magic + format-version header on the index. Encoding is
//! a total function of its input — identical descriptors always produce
//! identical bytes.
//!
//! Layout, worker index v1:
//!   magic u32 "WIDX" | format u16 | worker_id u64 | worker_version u64 |
//!   previous flag u8 [+ u64] | language u8 | worker_name str |
//!   last_class_id u16 | class count u32 × (class_id u16 | kind u8 |
//!   file_id u16 | name str) | manifest count u32 × (file_id u16 | name str)
//!
//! Requests are framed with a leading message-kind byte (setup = 1,
//! delete = 2) followed by the ≤10-char log context, ids and versions, and
//! for setup the index bytes plus the rewritten code files.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::descriptor::{
    BaseKind, DescriptorClass, WorkerDescriptor, WorkerFileName, WorkerLanguage,
};
use crate::error::{BusinessLogicErrorCode, CompileError, CompilerResult};

/// "WIDX" little-endian.
pub const WORKER_INDEX_MAGIC: u32 = 0x5844_4957;

/// Bumped only when the layout changes; decoders reject anything newer.
pub const WORKER_INDEX_FORMAT: u16 = 1;

pub const MESSAGE_KIND_SETUP: u8 = 1;
pub const MESSAGE_KIND_DELETE: u8 = 2;

/// The native boundary truncates log contexts; senders must not.
pub const MAX_LOG_CONTEXT_CHARS: usize = 10;

/// Decoded form of a setup request, for the engine-side contract tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupWorkerRequest {
    pub log_context: String,
    pub worker_id: u64,
    pub worker_version: u64,
    pub previous_worker_version: Option<u64>,
    pub worker_index: Vec<u8>,
    pub code: Vec<String>,
}

/// Decoded form of a delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteWorkerRequest {
    pub log_context: String,
    pub worker_id: u64,
    pub worker_version: u64,
}

/// Serializer configuration. The buffer-size hint is pure performance
/// tuning and never affects output bytes.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolSerializerConfig {
    pub initial_buffer_size: usize,
}

impl Default for ProtocolSerializerConfig {
    fn default() -> Self {
        ProtocolSerializerConfig {
            initial_buffer_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolSerializer {
    config: ProtocolSerializerConfig,
}

impl ProtocolSerializer {
    pub fn new(config: ProtocolSerializerConfig) -> Self {
        ProtocolSerializer { config }
    }

    fn buffer(&self) -> Vec<u8> {
        Vec::with_capacity(self.config.initial_buffer_size)
    }

    /// Encode a descriptor into its frozen worker-index form.
    pub fn serialize_worker_index(
        &self,
        descriptor: &WorkerDescriptor,
    ) -> CompilerResult<Vec<u8>> {
        let mut out = self.buffer();
        out.write_u32::<LittleEndian>(WORKER_INDEX_MAGIC)?;
        out.write_u16::<LittleEndian>(WORKER_INDEX_FORMAT)?;
        out.write_u64::<LittleEndian>(descriptor.worker_id)?;
        out.write_u64::<LittleEndian>(descriptor.worker_version)?;
        write_opt_u64(&mut out, descriptor.previous_worker_version)?;
        out.write_u8(descriptor.language as u8)?;
        write_str(&mut out, &descriptor.worker_name)?;
        out.write_u16::<LittleEndian>(descriptor.last_class_id)?;

        out.write_u32::<LittleEndian>(descriptor.classes.len() as u32)?;
        for class in &descriptor.classes {
            out.write_u16::<LittleEndian>(class.class_id)?;
            out.write_u8(class.base_kind as u8)?;
            out.write_u16::<LittleEndian>(class.file_id)?;
            write_str(&mut out, &class.class_name)?;
        }

        out.write_u32::<LittleEndian>(descriptor.file_manifest.len() as u32)?;
        for file in &descriptor.file_manifest {
            out.write_u16::<LittleEndian>(file.file_id)?;
            write_str(&mut out, &file.name)?;
        }

        Ok(out)
    }

    /// Reconstruct a descriptor from worker-index bytes.
    pub fn deserialize_worker_index(&self, bytes: &[u8]) -> CompilerResult<WorkerDescriptor> {
        let mut cursor = Cursor::new(bytes);

        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != WORKER_INDEX_MAGIC {
            return Err(bad_data("worker index magic mismatch"));
        }
        let format = cursor.read_u16::<LittleEndian>()?;
        if format != WORKER_INDEX_FORMAT {
            return Err(bad_data("unsupported worker index format"));
        }

        let worker_id = cursor.read_u64::<LittleEndian>()?;
        let worker_version = cursor.read_u64::<LittleEndian>()?;
        let previous_worker_version = read_opt_u64(&mut cursor)?;
        let language = WorkerLanguage::from_tag(cursor.read_u8()?)?;
        let worker_name = read_str(&mut cursor)?;
        let last_class_id = cursor.read_u16::<LittleEndian>()?;

        let class_count = cursor.read_u32::<LittleEndian>()?;
        let mut classes = Vec::with_capacity(class_count as usize);
        for _ in 0..class_count {
            let class_id = cursor.read_u16::<LittleEndian>()?;
            let kind_tag = cursor.read_u8()?;
            let base_kind =
                BaseKind::from_tag(kind_tag).ok_or_else(|| bad_data("unknown base kind tag"))?;
            let file_id = cursor.read_u16::<LittleEndian>()?;
            let class_name = read_str(&mut cursor)?;
            classes.push(DescriptorClass {
                class_id,
                class_name,
                base_kind,
                file_id,
            });
        }

        let file_count = cursor.read_u32::<LittleEndian>()?;
        let mut file_manifest = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let file_id = cursor.read_u16::<LittleEndian>()?;
            let name = read_str(&mut cursor)?;
            file_manifest.push(WorkerFileName { file_id, name });
        }

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

    /// Frame a setup request carrying the index and the rewritten code.
    pub fn create_setup_worker_request(
        &self,
        log_context: &str,
        worker_id: u64,
        worker_version: u64,
        previous_worker_version: Option<u64>,
        worker_index: &[u8],
        code: &[String],
    ) -> CompilerResult<Vec<u8>> {
        validate_log_context(log_context)?;

        let mut out = self.buffer();
        out.write_u8(MESSAGE_KIND_SETUP)?;
        write_str(&mut out, log_context)?;
        out.write_u64::<LittleEndian>(worker_id)?;
        out.write_u64::<LittleEndian>(worker_version)?;
        write_opt_u64(&mut out, previous_worker_version)?;
        out.write_u32::<LittleEndian>(worker_index.len() as u32)?;
        out.write_all(worker_index)?;
        out.write_u32::<LittleEndian>(code.len() as u32)?;
        for file in code {
            write_str(&mut out, file)?;
        }
        Ok(out)
    }

    pub fn decode_setup_worker_request(
        &self,
        bytes: &[u8],
    ) -> CompilerResult<SetupWorkerRequest> {
        let mut cursor = Cursor::new(bytes);
        if cursor.read_u8()? != MESSAGE_KIND_SETUP {
            return Err(bad_data("not a setup request"));
        }
        let log_context = read_str(&mut cursor)?;
        let worker_id = cursor.read_u64::<LittleEndian>()?;
        let worker_version = cursor.read_u64::<LittleEndian>()?;
        let previous_worker_version = read_opt_u64(&mut cursor)?;

        let index_len = cursor.read_u32::<LittleEndian>()? as usize;
        let mut worker_index = vec![0u8; index_len];
        cursor.read_exact(&mut worker_index)?;

        let code_count = cursor.read_u32::<LittleEndian>()?;
        let mut code = Vec::with_capacity(code_count as usize);
        for _ in 0..code_count {
            code.push(read_str(&mut cursor)?);
        }

        Ok(SetupWorkerRequest {
            log_context,
            worker_id,
            worker_version,
            previous_worker_version,
            worker_index,
            code,
        })
    }

    /// Frame a delete request.
    pub fn create_delete_worker_request(
        &self,
        log_context: &str,
        worker_id: u64,
        worker_version: u64,
    ) -> CompilerResult<Vec<u8>> {
        validate_log_context(log_context)?;

        let mut out = self.buffer();
        out.write_u8(MESSAGE_KIND_DELETE)?;
        write_str(&mut out, log_context)?;
        out.write_u64::<LittleEndian>(worker_id)?;
        out.write_u64::<LittleEndian>(worker_version)?;
        Ok(out)
    }

    pub fn decode_delete_worker_request(
        &self,
        bytes: &[u8],
    ) -> CompilerResult<DeleteWorkerRequest> {
        let mut cursor = Cursor::new(bytes);
        if cursor.read_u8()? != MESSAGE_KIND_DELETE {
            return Err(bad_data("not a delete request"));
        }
        let log_context = read_str(&mut cursor)?;
        let worker_id = cursor.read_u64::<LittleEndian>()?;
        let worker_version = cursor.read_u64::<LittleEndian>()?;
        Ok(DeleteWorkerRequest {
            log_context,
            worker_id,
            worker_version,
        })
    }
}

/// Human-readable tree rendering of a descriptor, for tooling and logs.
/// Independent of the binary form.
pub fn render_debug_tree(descriptor: &WorkerDescriptor) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "worker {} (id {}, v{}",
        descriptor.worker_name, descriptor.worker_id, descriptor.worker_version
    ));
    match descriptor.previous_worker_version {
        Some(previous) => out.push_str(&format!(", from v{previous})\n")),
        None => out.push_str(", first deploy)\n"),
    }
    out.push_str(&format!(
        "├─ language: {:?}\n",
        descriptor.language
    ));
    out.push_str(&format!(
        "├─ last class id: {}\n",
        descriptor.last_class_id
    ));
    out.push_str("├─ classes\n");
    for class in &descriptor.classes {
        out.push_str(&format!(
            "│  ├─ [{}] {} ({}, file {})\n",
            class.class_id,
            class.class_name,
            class.base_kind.as_str(),
            class.file_id
        ));
    }
    out.push_str("└─ files\n");
    for file in &descriptor.file_manifest {
        out.push_str(&format!("   ├─ [{}] {}\n", file.file_id, file.name));
    }
    out
}

fn validate_log_context(log_context: &str) -> CompilerResult<()> {
    if log_context.chars().count() > MAX_LOG_CONTEXT_CHARS {
        return Err(CompileError::BusinessLogic(
            BusinessLogicErrorCode::InvalidLogContext,
        ));
    }
    Ok(())
}

fn bad_data(message: &str) -> CompileError {
    CompileError::Serialization(io::Error::new(io::ErrorKind::InvalidData, message.to_string()))
}

fn write_str(out: &mut Vec<u8>, value: &str) -> io::Result<()> {
    out.write_u32::<LittleEndian>(value.len() as u32)?;
    out.write_all(value.as_bytes())
}

fn read_str(cursor: &mut Cursor<&[u8]>) -> CompilerResult<String> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| bad_data("invalid UTF-8 in string field"))
}

fn write_opt_u64(out: &mut Vec<u8>, value: Option<u64>) -> io::Result<()> {
    match value {
        Some(value) => {
            out.write_u8(1)?;
            out.write_u64::<LittleEndian>(value)
        }
        None => out.write_u8(0),
    }
}

fn read_opt_u64(cursor: &mut Cursor<&[u8]>) -> CompilerResult<Option<u64>> {
    match cursor.read_u8()? {
        0 => Ok(None),
        1 => Ok(Some(cursor.read_u64::<LittleEndian>()?)),
        _ => Err(bad_data("invalid optional flag")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> WorkerDescriptor {
        WorkerDescriptor {
            worker_id: 5002,
            worker_version: 2,
            previous_worker_version: Some(1),
            worker_name: "shop".into(),
            language: WorkerLanguage::JavaScript,
            last_class_id: 3,
            classes: vec![
                DescriptorClass {
                    class_id: 1,
                    class_name: "User".into(),
                    base_kind: BaseKind::Entity,
                    file_id: 1,
                },
                DescriptorClass {
                    class_id: 2,
                    class_name: "Checkout".into(),
                    base_kind: BaseKind::Service,
                    file_id: 1,
                },
                DescriptorClass {
                    class_id: 3,
                    class_name: "OrderShipped".into(),
                    base_kind: BaseKind::Event,
                    file_id: 2,
                },
            ],
            file_manifest: vec![
                WorkerFileName {
                    file_id: 1,
                    name: "shop.js".into(),
                },
                WorkerFileName {
                    file_id: 2,
                    name: "events.js".into(),
                },
            ],
        }
    }

    #[test]
    fn test_worker_index_round_trip() {
        let serializer = ProtocolSerializer::default();
        let original = descriptor();
        let bytes = serializer.serialize_worker_index(&original).unwrap();
        let decoded = serializer.deserialize_worker_index(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let serializer = ProtocolSerializer::default();
        let a = serializer.serialize_worker_index(&descriptor()).unwrap();
        let b = serializer.serialize_worker_index(&descriptor()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_buffer_hint_does_not_change_bytes() {
        let small = ProtocolSerializer::new(ProtocolSerializerConfig {
            initial_buffer_size: 1,
        });
        let large = ProtocolSerializer::new(ProtocolSerializerConfig {
            initial_buffer_size: 1 << 20,
        });
        assert_eq!(
            small.serialize_worker_index(&descriptor()).unwrap(),
            large.serialize_worker_index(&descriptor()).unwrap()
        );
    }

    #[test]
    fn test_index_header_is_frozen() {
        let serializer = ProtocolSerializer::default();
        let bytes = serializer.serialize_worker_index(&descriptor()).unwrap();
        // "WIDX" magic, format 1, worker id 5002.
        assert_eq!(&bytes[0..4], b"WIDX");
        assert_eq!(&bytes[4..6], &1u16.to_le_bytes());
        assert_eq!(&bytes[6..14], &5002u64.to_le_bytes());
    }

    #[test]
    fn test_setup_request_round_trip() {
        let serializer = ProtocolSerializer::default();
        let index = serializer.serialize_worker_index(&descriptor()).unwrap();
        let code = vec!["export class User {}".to_string(), "// events".to_string()];
        let bytes = serializer
            .create_setup_worker_request("deploy-1", 5002, 2, Some(1), &index, &code)
            .unwrap();
        let decoded = serializer.decode_setup_worker_request(&bytes).unwrap();
        assert_eq!(decoded.log_context, "deploy-1");
        assert_eq!(decoded.worker_id, 5002);
        assert_eq!(decoded.worker_version, 2);
        assert_eq!(decoded.previous_worker_version, Some(1));
        assert_eq!(decoded.worker_index, index);
        assert_eq!(decoded.code, code);
    }

    #[test]
    fn test_delete_request_round_trip() {
        let serializer = ProtocolSerializer::default();
        let bytes = serializer
            .create_delete_worker_request("gc", 5002, 3)
            .unwrap();
        let decoded = serializer.decode_delete_worker_request(&bytes).unwrap();
        assert_eq!(
            decoded,
            DeleteWorkerRequest {
                log_context: "gc".into(),
                worker_id: 5002,
                worker_version: 3,
            }
        );
    }

    #[test]
    fn test_log_context_length_enforced() {
        let serializer = ProtocolSerializer::default();
        let err = serializer
            .create_delete_worker_request("elevenchars", 1, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::BusinessLogic(BusinessLogicErrorCode::InvalidLogContext)
        ));
    }

    #[test]
    fn test_truncated_index_rejected() {
        let serializer = ProtocolSerializer::default();
        let bytes = serializer.serialize_worker_index(&descriptor()).unwrap();
        let err = serializer
            .deserialize_worker_index(&bytes[..bytes.len() - 3])
            .unwrap_err();
        assert!(matches!(err, CompileError::Serialization(_)));
    }

    #[test]
    fn test_foreign_magic_rejected() {
        let serializer = ProtocolSerializer::default();
        let err = serializer
            .deserialize_worker_index(&[0xde, 0xad, 0xbe, 0xef, 0, 0])
            .unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_debug_tree_names_every_class_and_file() {
        let tree = render_debug_tree(&descriptor());
        assert!(tree.contains("worker shop"));
        assert!(tree.contains("[1] User (Entity, file 1)"));
        assert!(tree.contains("[2] Checkout (Service, file 1)"));
        assert!(tree.contains("[3] OrderShipped (Event, file 2)"));
        assert!(tree.contains("[2] events.js"));
    }
}
