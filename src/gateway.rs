//! Execution-engine gateway boundary.
//!
//! The engine is an external collaborator reached through a loaded native
//! function table: an initializer taking a config file path, and one send
//! function per request kind, each taking the framed request bytes and
//! yielding `(status_code, response_bytes)`. This module defines that
//! interface and decodes the engine's response framing into the error
//! taxonomy; loading the table itself belongs to the host process.
//!
//! Response framing: tag u8 — 0 ok; 1 error code (u16); 2 script exception
//! (message string + stack string). A non-zero transport status with an
//! undecodable body is an internal communication failure.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{CompileError, CompilerResult, PlatformErrorCode};

pub const RESPONSE_TAG_OK: u8 = 0;
pub const RESPONSE_TAG_ERROR_CODE: u8 = 1;
pub const RESPONSE_TAG_SCRIPT_EXCEPTION: u8 = 2;

/// Transport status plus raw response bytes, exactly as the native callback
/// delivers them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

/// The engine's native function table.
pub trait EngineGateway {
    /// One-time initialization with the engine config file.
    fn init(&self, config_file: &Path) -> CompilerResult<()>;

    /// Submit a framed setup request for the given worker.
    fn send_setup_worker_request(
        &self,
        log_context: &str,
        worker_id: u64,
        request: &[u8],
    ) -> CompilerResult<EngineResponse>;

    /// Submit a framed delete request for the given worker.
    fn send_delete_worker_request(
        &self,
        log_context: &str,
        worker_id: u64,
        request: &[u8],
    ) -> CompilerResult<EngineResponse>;
}

/// Interpret an engine response, mapping failure framings onto the
/// External category.
pub fn decode_engine_response(response: &EngineResponse) -> CompilerResult<()> {
    if response.body.is_empty() {
        if response.status_code == 0 {
            return Ok(());
        }
        // The engine returned a raw transport status with no detail.
        return Err(CompileError::External {
            code: response.status_code,
        });
    }

    let mut cursor = Cursor::new(response.body.as_slice());
    let tag = cursor
        .read_u8()
        .map_err(|_| communication_failure())?;

    match tag {
        RESPONSE_TAG_OK => Ok(()),
        RESPONSE_TAG_ERROR_CODE => {
            let code = cursor
                .read_u16::<LittleEndian>()
                .map_err(|_| communication_failure())?;
            Err(CompileError::External { code })
        }
        RESPONSE_TAG_SCRIPT_EXCEPTION => {
            let message = read_str(&mut cursor).map_err(|_| communication_failure())?;
            let stack = read_str(&mut cursor).map_err(|_| communication_failure())?;
            Err(CompileError::ScriptException { message, stack })
        }
        _ => Err(communication_failure()),
    }
}

fn communication_failure() -> CompileError {
    CompileError::Platform(PlatformErrorCode::InternalCommunicationFailure)
}

fn read_str(cursor: &mut Cursor<&[u8]>) -> std::io::Result<String> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn script_exception_body(message: &str, stack: &str) -> Vec<u8> {
        let mut body = vec![RESPONSE_TAG_SCRIPT_EXCEPTION];
        body.write_u32::<LittleEndian>(message.len() as u32).unwrap();
        body.write_all(message.as_bytes()).unwrap();
        body.write_u32::<LittleEndian>(stack.len() as u32).unwrap();
        body.write_all(stack.as_bytes()).unwrap();
        body
    }

    #[test]
    fn test_ok_responses() {
        let empty = EngineResponse {
            status_code: 0,
            body: vec![],
        };
        assert!(decode_engine_response(&empty).is_ok());

        let tagged = EngineResponse {
            status_code: 0,
            body: vec![RESPONSE_TAG_OK],
        };
        assert!(decode_engine_response(&tagged).is_ok());
    }

    #[test]
    fn test_bare_status_code_maps_to_external() {
        let response = EngineResponse {
            status_code: 500,
            body: vec![],
        };
        let err = decode_engine_response(&response).unwrap_err();
        assert!(matches!(err, CompileError::External { code: 500 }));
    }

    #[test]
    fn test_error_code_framing() {
        let mut body = vec![RESPONSE_TAG_ERROR_CODE];
        body.write_u16::<LittleEndian>(42).unwrap();
        let response = EngineResponse {
            status_code: 0,
            body,
        };
        let err = decode_engine_response(&response).unwrap_err();
        assert!(matches!(err, CompileError::External { code: 42 }));
    }

    #[test]
    fn test_script_exception_framing() {
        let response = EngineResponse {
            status_code: 0,
            body: script_exception_body("TypeError: boom", "at Checkout.pay"),
        };
        match decode_engine_response(&response).unwrap_err() {
            CompileError::ScriptException { message, stack } => {
                assert_eq!(message, "TypeError: boom");
                assert_eq!(stack, "at Checkout.pay");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_body_is_communication_failure() {
        let response = EngineResponse {
            status_code: 0,
            body: vec![0xff, 0x01],
        };
        let err = decode_engine_response(&response).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Platform(PlatformErrorCode::InternalCommunicationFailure)
        ));
    }

    #[test]
    fn test_truncated_exception_is_communication_failure() {
        let mut body = script_exception_body("boom", "stack");
        body.truncate(body.len() - 2);
        let response = EngineResponse {
            status_code: 0,
            body,
        };
        let err = decode_engine_response(&response).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Platform(PlatformErrorCode::InternalCommunicationFailure)
        ));
    }
}
