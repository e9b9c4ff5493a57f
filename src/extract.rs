//! Class extraction over worker source files.
//!
//! Walks every file's syntax tree, finds each class whose inheritance chain
//! terminates at one of the three platform base kinds, and records its name,
//! kind and source span. Resolution is two-pass and pure: pass 1 builds a
//! worker-wide name → declaration table from the full file set, pass 2
//! follows `extends` chains through that table. No stage mutates shared
//! state, so extraction is a function of the supplied files.
//!
//! Extraction also emits the per-file pre-compiler instructions the engine's
//! module loading depends on: runtime-module import specifiers are
//! canonicalized, and managed classes that aren't exported get an `export `
//! inserted so the engine's module factory can reach them.

use oxc_allocator::Allocator;
use oxc_ast::ast::{Declaration, Expression, Statement};
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::descriptor::{BaseKind, SourceFile, WorkerFileName};
use crate::error::{CompileError, CompilerResult, PlatformErrorCode};
use crate::precompile::{PreCompilerDirective, PreCompilerInstruction};

/// Canonical module name worker code imports the runtime surface from.
/// Import specifiers that merely *contain* it (relative paths into a checkout
/// or a package dir) are rewritten to this exact form.
pub const RUNTIME_MODULE_NAME: &str = "worker-runtime";

/// Prefix reserved for engine-internal bindings. Worker code referencing it
/// is rejected outright.
pub const INTERNAL_PREFIX: &str = "__engine_internal";

/// A worker class bound to a platform base kind. Spans are byte offsets
/// into the original (pre-rewrite) source of the declaring file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedClass {
    pub name: String,
    pub base_kind: BaseKind,
    pub file: String,
    pub file_id: u16,
    pub start: u32,
    pub end: u32,
}

/// Extraction output for one compile request: the managed classes, the
/// per-file rewrite directives, and the ordered file manifest.
#[derive(Debug, Clone)]
pub struct ExtractedWorker {
    pub classes: Vec<ParsedClass>,
    pub directives: Vec<PreCompilerDirective>,
    pub files: Vec<WorkerFileName>,
}

/// One top-level class declaration seen in pass 1.
struct ClassDecl {
    name: String,
    file: String,
    file_index: usize,
    start: u32,
    end: u32,
    super_name: Option<String>,
    exported: bool,
}

/// Extract every managed class from the worker's file set.
///
/// All-or-nothing: any structural error aborts the request with no partial
/// output.
pub fn extract_classes(files: &[SourceFile]) -> CompilerResult<ExtractedWorker> {
    let mut decls: Vec<ClassDecl> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut instructions: Vec<Vec<PreCompilerInstruction>> = vec![Vec::new(); files.len()];
    let mut manifest: Vec<WorkerFileName> = Vec::with_capacity(files.len());
    let mut stems: HashSet<String> = HashSet::new();

    if files.len() > u16::MAX as usize {
        return Err(CompileError::Platform(
            PlatformErrorCode::FileIdCapacityExceeded,
        ));
    }

    // Pass 1: per-file syntax walk. Builds the worker-wide declaration
    // table, the manifest, and the import-rewrite instructions.
    for (file_index, file) in files.iter().enumerate() {
        let stem = Path::new(&file.name)
            .with_extension("")
            .to_string_lossy()
            .into_owned();
        if !stems.insert(stem) {
            return Err(CompileError::code_parse(&file.name, "Duplicate file name"));
        }

        // Cheap textual scan; the prefix is not a legal user identifier no
        // matter where it appears.
        if file.code.contains(INTERNAL_PREFIX) {
            return Err(CompileError::code_parse(
                &file.name,
                "Found reference to reserved engine-internal logic",
            ));
        }

        let allocator = Allocator::default();
        let source_type = SourceType::default().with_module(true);
        let ret = Parser::new(&allocator, &file.code, source_type).parse();
        if !ret.errors.is_empty() {
            let message = ret
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CompileError::code_parse(&file.name, message));
        }

        let mut exported_names: HashSet<String> = HashSet::new();

        for statement in &ret.program.body {
            match statement {
                Statement::ImportDeclaration(import) => {
                    if import.source.value.contains(RUNTIME_MODULE_NAME) {
                        // The literal span covers the quotes, so the
                        // replacement supplies its own.
                        instructions[file_index].push(PreCompilerInstruction::Replace {
                            start: import.source.span.start,
                            end: import.source.span.end,
                            text: format!("\"{RUNTIME_MODULE_NAME}\""),
                        });
                    }
                }
                Statement::ExportNamedDeclaration(export) => {
                    if let Some(Declaration::ClassDeclaration(class)) = &export.declaration {
                        record_class(file, file_index, class, true, &mut decls, &mut by_name)?;
                    } else if export.declaration.is_none() {
                        for specifier in &export.specifiers {
                            exported_names.insert(specifier.exported.name().to_string());
                        }
                    }
                }
                Statement::ClassDeclaration(class) => {
                    record_class(file, file_index, class, false, &mut decls, &mut by_name)?;
                }
                _ => {}
            }
        }

        // `export { Foo }` may appear before or after the declaration, so
        // reconcile once the whole file has been walked.
        for decl in decls.iter_mut().filter(|d| d.file_index == file_index) {
            if exported_names.contains(&decl.name) {
                decl.exported = true;
            }
        }

        manifest.push(WorkerFileName {
            file_id: (file_index + 1) as u16,
            name: file.name.clone(),
        });

        tracing::debug!(file = %file.name, "extracted worker file");
    }

    // Pass 2: resolve inheritance chains through the completed table.
    let mut classes: Vec<ParsedClass> = Vec::new();
    for (index, decl) in decls.iter().enumerate() {
        let Some(kind) = chain_kind(index, &decls, &by_name)? else {
            continue; // ordinary helper class
        };

        if !decl.exported {
            instructions[decl.file_index].push(PreCompilerInstruction::Insert {
                start: decl.start,
                text: "export ".into(),
            });
        }

        classes.push(ParsedClass {
            name: decl.name.clone(),
            base_kind: kind,
            file: decl.file.clone(),
            file_id: (decl.file_index + 1) as u16,
            start: decl.start,
            end: decl.end,
        });
    }

    let directives = files
        .iter()
        .zip(instructions)
        .map(|(file, instructions)| PreCompilerDirective::new(file.clone(), instructions))
        .collect();

    tracing::debug!(
        classes = classes.len(),
        files = files.len(),
        "class extraction complete"
    );

    Ok(ExtractedWorker {
        classes,
        directives,
        files: manifest,
    })
}

fn record_class(
    file: &SourceFile,
    file_index: usize,
    class: &oxc_ast::ast::Class<'_>,
    exported: bool,
    decls: &mut Vec<ClassDecl>,
    by_name: &mut HashMap<String, usize>,
) -> CompilerResult<()> {
    let Some(id) = &class.id else {
        // Anonymous class declarations only occur in default exports, which
        // the engine's module factory can't address by name anyway.
        return Ok(());
    };
    let name = id.name.to_string();

    if BaseKind::from_name(&name).is_some() {
        return Err(CompileError::code_parse(
            &file.name,
            format!("The class name {name} shadows a platform base kind, making inheritance ambiguous"),
        ));
    }

    if let Some(&first) = by_name.get(&name) {
        return Err(CompileError::code_parse(
            &file.name,
            format!(
                "Duplicate class name: {name} (also declared in {})",
                decls[first].file
            ),
        ));
    }

    let super_name = match &class.super_class {
        Some(Expression::Identifier(ident)) => Some(ident.name.to_string()),
        _ => None,
    };

    by_name.insert(name.clone(), decls.len());
    decls.push(ClassDecl {
        name,
        file: file.name.clone(),
        file_index,
        start: class.span.start,
        end: class.span.end,
        super_name,
        exported,
    });
    Ok(())
}

/// Follow one declaration's `extends` chain until a platform kind, an
/// unknown name, or a cycle.
fn chain_kind(
    start: usize,
    decls: &[ClassDecl],
    by_name: &HashMap<String, usize>,
) -> CompilerResult<Option<BaseKind>> {
    let mut visited: HashSet<usize> = HashSet::new();
    visited.insert(start);
    let mut current = start;

    loop {
        let Some(super_name) = &decls[current].super_name else {
            return Ok(None);
        };

        // Shadowing was rejected at declaration time, so a kind name here
        // can only mean the platform base itself.
        if let Some(kind) = BaseKind::from_name(super_name) {
            return Ok(Some(kind));
        }

        match by_name.get(super_name) {
            Some(&next) => {
                if !visited.insert(next) {
                    let origin = &decls[start];
                    return Err(CompileError::code_parse(
                        &origin.file,
                        format!(
                            "Class {} has an unresolvable inheritance chain: cycle through {super_name}",
                            origin.name
                        ),
                    ));
                }
                current = next;
            }
            // Extends something outside the worker (an imported library
            // class); it can't reach a platform kind.
            None => return Ok(None),
        }
    }
}
