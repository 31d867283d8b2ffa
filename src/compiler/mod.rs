//! ConfigRules compiler.
//!
//! This module turns rule text into [`CompiledRules`] bytecode. It is
//! organized into several sub-modules:
//! - [`segments`] - Nesting-aware argument splitting
//! - [`literal`] - Downgrading literal regexes to plain string compares
//! - [`parser`] - Parsing of individual directive arguments
//! - [`codegen`] - Instruction emission and jump fixups
//!
//! Compilation is all-or-nothing: the first error aborts it and no bytecode
//! is produced.
//!
//! # Examples
//!
//! ```rust
//! use config_rules::Compiler;
//!
//! let source = r#"
//! // version:3
//! if:((SourceType=SRC_DeviceMake,CompareType=CMP_Equal,MatchString="samsung"))
//!     set:(r.Vulkan.Enable="1")
//! endif
//! "#;
//!
//! let rules = Compiler::new().compile(source)?;
//! assert_eq!(rules.rule_version, 3);
//! assert_eq!(rules.instruction_count, 4);
//! # Ok::<(), config_rules::CompileError>(())
//! ```

pub(crate) mod codegen;
pub mod literal;
pub(crate) mod parser;
pub mod segments;

use crate::config::CompileOptions;
use crate::error::{CompileError, CompileErrorKind};
use crate::ir::{CompiledRules, Operation};
use crate::strings::StringTable;
use crate::tokens::Command;
use codegen::Assembler;

/// The ConfigRules compiler.
///
/// Holds only options; every call to [`Compiler::compile`] starts from a
/// fresh string table and instruction buffer, so one compiler can be shared
/// across threads.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a compiler with default options.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use config_rules::Compiler;
    ///
    /// let compiler = Compiler::new();
    /// assert!(!compiler.options().verbose);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile rule text into bytecode.
    pub fn compile(&self, source: &str) -> Result<CompiledRules, CompileError> {
        let mut strings = StringTable::new();
        let mut assembler = Assembler::new(self.options.verbose);
        let mut rule_version = None;
        let mut last_line = 1;

        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            last_line = line;
            let text = raw.trim();

            if text.is_empty() || text.starts_with(';') {
                continue;
            }
            if let Some(comment) = text.strip_prefix("//") {
                if let Some(parsed) = version_comment(comment) {
                    let version = parsed.map_err(|kind| CompileError::new(line, kind))?;
                    if rule_version.is_some() {
                        return Err(CompileError::new(line, CompileErrorKind::DuplicateVersion));
                    }
                    rule_version = Some(version);
                }
                continue;
            }
            if rule_version.is_none() {
                return Err(CompileError::new(line, CompileErrorKind::MissingVersion));
            }

            compile_line(text, line, &mut strings, &mut assembler)
                .map_err(|kind| CompileError::new(line, kind))?;
        }

        let rule_version = rule_version
            .ok_or_else(|| CompileError::new(last_line, CompileErrorKind::MissingVersion))?;
        let assembled = assembler.finish(last_line)?;

        log::debug!(
            "compiled version {} rules: {} strings, {} instructions",
            rule_version,
            strings.len(),
            assembled.instruction_count
        );
        Ok(CompiledRules {
            rule_version,
            strings,
            instruction_count: assembled.instruction_count,
            code: assembled.code,
        })
    }

    /// Compile and serialize in one step.
    pub fn compile_to_bytes(&self, source: &str) -> Result<Vec<u8>, CompileError> {
        Ok(self.compile(source)?.to_bytes())
    }
}

/// Compile rule text to the serialized file layout.
///
/// ```rust
/// let bytes = config_rules::compile("// version:1\nset:(X=\"1\")\n", false)?;
/// assert_eq!(&bytes[..4], &[0x01, 0x01, 0x00, 0x01]);
/// # Ok::<(), config_rules::CompileError>(())
/// ```
pub fn compile(source: &str, verbose: bool) -> Result<Vec<u8>, CompileError> {
    Compiler::with_options(CompileOptions { verbose }).compile_to_bytes(source)
}

/// Read the `// version:N` header without compiling.
///
/// Used when raw rule text is packed without compiling it.
pub fn find_version(source: &str) -> Result<u16, CompileError> {
    let mut last_line = 1;
    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        last_line = line;
        let text = raw.trim();
        if text.is_empty() || text.starts_with(';') {
            continue;
        }
        match text.strip_prefix("//").map(version_comment) {
            Some(Some(parsed)) => return parsed.map_err(|kind| CompileError::new(line, kind)),
            Some(None) => continue,
            None => return Err(CompileError::new(line, CompileErrorKind::MissingVersion)),
        }
    }
    Err(CompileError::new(last_line, CompileErrorKind::MissingVersion))
}

/// `None` if the comment is not a version header.
fn version_comment(comment: &str) -> Option<Result<u16, CompileErrorKind>> {
    let value = comment.trim().strip_prefix("version:")?.trim();
    Some(
        value
            .parse::<u16>()
            .map_err(|_| CompileErrorKind::InvalidVersion(value.to_string())),
    )
}

fn compile_line(
    text: &str,
    line: usize,
    strings: &mut StringTable,
    assembler: &mut Assembler,
) -> Result<(), CompileErrorKind> {
    let (keyword, rest) = match text.split_once(':') {
        Some((keyword, rest)) => (keyword.trim(), rest.trim()),
        None => (text, ""),
    };
    let command = Command::from_keyword(keyword)
        .ok_or_else(|| CompileErrorKind::UnknownCommand(keyword.to_string()))?;
    log::trace!("line {} (depth {}): {}", line, assembler.depth(), command.keyword());

    match command {
        Command::Set => {
            let assignments = parser::parse_assignments(rest, strings, false)?;
            assembler.emit(&Operation::Set(assignments))?;
        }
        Command::Clear => {
            let keys = parser::parse_keys(rest, strings, false)?;
            assembler.emit(&Operation::Clear(keys))?;
        }
        Command::Chipset => {
            let record = parser::parse_chipset(rest, strings)?;
            assembler.emit(&Operation::Chipset(record))?;
        }
        Command::Condition => {
            let (conditions, sets, clears) = parser::parse_condition_directive(rest, strings)?;
            assembler.emit(&Operation::Condition {
                conditions,
                sets,
                clears,
            })?;
        }
        Command::If => {
            let conditions = parser::parse_condition_group(rest, strings)?;
            assembler.begin_if(line, conditions)?;
        }
        Command::ElseIf => {
            let conditions = parser::parse_condition_group(rest, strings)?;
            assembler.else_if(conditions)?;
        }
        Command::Else => {
            no_arguments("else", rest)?;
            assembler.else_()?;
        }
        Command::EndIf => {
            no_arguments("endif", rest)?;
            assembler.end_if()?;
        }
    }
    Ok(())
}

fn no_arguments(command: &'static str, rest: &str) -> Result<(), CompileErrorKind> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(CompileErrorKind::UnexpectedArguments {
            command,
            rest: rest.to_string(),
        })
    }
}
