//! Pre-compiler instruction engine.
//!
//! Applies an ordered set of text edits (insert / delete / replace) to one
//! file's source, producing the executable form handed to the engine. All
//! positions are byte offsets computed once against the *original* text; a
//! single left-to-right pass with an accumulating offset keeps later
//! positions valid after earlier edits shift the buffer.
//!
//! Instructions that overlap are rejected before any splicing — there is no
//! merge policy, by contract.

use serde::{Deserialize, Serialize};

use crate::descriptor::SourceFile;
use crate::error::{CompileError, CompilerResult};

/// One text edit against a file's original byte positions. Closed set: the
/// engine below handles every variant exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PreCompilerInstruction {
    Insert { start: u32, text: String },
    Delete { start: u32, end: u32 },
    Replace { start: u32, end: u32, text: String },
}

impl PreCompilerInstruction {
    pub fn start(&self) -> u32 {
        match self {
            PreCompilerInstruction::Insert { start, .. }
            | PreCompilerInstruction::Delete { start, .. }
            | PreCompilerInstruction::Replace { start, .. } => *start,
        }
    }

    /// Exclusive end of the affected range. An insert occupies the empty
    /// range `[start, start)`.
    pub fn end(&self) -> u32 {
        match self {
            PreCompilerInstruction::Insert { start, .. } => *start,
            PreCompilerInstruction::Delete { end, .. }
            | PreCompilerInstruction::Replace { end, .. } => *end,
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            PreCompilerInstruction::Insert { .. } => 0,
            PreCompilerInstruction::Delete { .. } => 1,
            PreCompilerInstruction::Replace { .. } => 2,
        }
    }

    fn text(&self) -> &str {
        match self {
            PreCompilerInstruction::Insert { text, .. }
            | PreCompilerInstruction::Replace { text, .. } => text,
            PreCompilerInstruction::Delete { .. } => "",
        }
    }

    fn validate(&self, file: &str) -> CompilerResult<()> {
        match self {
            PreCompilerInstruction::Insert { .. } => Ok(()),
            PreCompilerInstruction::Delete { start, end }
            | PreCompilerInstruction::Replace { start, end, .. } => {
                if end <= start {
                    Err(CompileError::code_parse(
                        file,
                        format!("Invalid pre-compiler range [{start}, {end}): end must be > start"),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Splice this edit into `code` at its offset-adjusted position and
    /// advance the running offset by the length delta.
    fn apply(&self, file: &str, code: &mut String, offset: &mut i64) -> CompilerResult<()> {
        let at = |pos: u32, offset: i64, code: &String| -> CompilerResult<usize> {
            let adjusted = pos as i64 + offset;
            if adjusted < 0 || adjusted as usize > code.len() {
                return Err(CompileError::code_parse(
                    file,
                    format!("Pre-compiler position {pos} is outside the file"),
                ));
            }
            let adjusted = adjusted as usize;
            if !code.is_char_boundary(adjusted) {
                return Err(CompileError::code_parse(
                    file,
                    format!("Pre-compiler position {pos} splits a character"),
                ));
            }
            Ok(adjusted)
        };

        match self {
            PreCompilerInstruction::Insert { start, text } => {
                let pos = at(*start, *offset, code)?;
                code.insert_str(pos, text);
                *offset += text.len() as i64;
            }
            PreCompilerInstruction::Delete { start, end } => {
                let from = at(*start, *offset, code)?;
                let to = at(*end, *offset, code)?;
                code.replace_range(from..to, "");
                *offset -= (end - start) as i64;
            }
            PreCompilerInstruction::Replace { start, end, text } => {
                let from = at(*start, *offset, code)?;
                let to = at(*end, *offset, code)?;
                code.replace_range(from..to, text);
                *offset += text.len() as i64 - (end - start) as i64;
            }
        }
        Ok(())
    }
}

/// The unit of rewriting for one file: the original source plus its edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreCompilerDirective {
    pub file: SourceFile,
    pub instructions: Vec<PreCompilerInstruction>,
}

impl PreCompilerDirective {
    pub fn new(file: SourceFile, instructions: Vec<PreCompilerInstruction>) -> Self {
        PreCompilerDirective { file, instructions }
    }

    /// Apply every instruction and return the rewritten file.
    ///
    /// Instructions are sorted defensively under a total order so the result
    /// is a function of the instruction set, not of the order the caller
    /// supplied it in. Overlapping ranges are rejected.
    pub fn pre_compile(&self) -> CompilerResult<SourceFile> {
        let name = &self.file.name;

        for instruction in &self.instructions {
            instruction.validate(name)?;
        }

        let mut ordered: Vec<&PreCompilerInstruction> = self.instructions.iter().collect();
        ordered.sort_by(|a, b| {
            a.start()
                .cmp(&b.start())
                .then(a.end().cmp(&b.end()))
                .then(a.variant_rank().cmp(&b.variant_rank()))
                .then(a.text().cmp(b.text()))
        });

        for pair in ordered.windows(2) {
            if pair[1].start() < pair[0].end() {
                return Err(CompileError::code_parse(
                    name,
                    format!(
                        "Overlapping pre-compiler instructions: [{}, {}) and [{}, {})",
                        pair[0].start(),
                        pair[0].end(),
                        pair[1].start(),
                        pair[1].end()
                    ),
                ));
            }
        }

        let mut code = self.file.code.clone();
        let mut offset: i64 = 0;
        for instruction in ordered {
            instruction.apply(name, &mut code, &mut offset)?;
        }

        Ok(SourceFile {
            name: name.clone(),
            code,
        })
    }
}
