//! Error types for the ConfigRules crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RulesError>;

/// A compilation failure, tagged with the 1-based source line it occurred on.
///
/// Compilation is all-or-nothing: when this is returned no bytecode exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct CompileError {
    pub line: usize,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(line: usize, kind: CompileErrorKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    // Structural
    #[error("no `// version:` comment found before the first directive")]
    MissingVersion,
    #[error("version comment declared more than once")]
    DuplicateVersion,
    #[error("invalid version number: {0}")]
    InvalidVersion(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown condition key: {0}")]
    UnknownConditionKey(String),
    #[error("unknown compare type: {0}")]
    UnknownCompareType(String),
    #[error("condition is missing {0}")]
    MissingConditionKey(&'static str),
    #[error("condition key {0} given more than once")]
    DuplicateConditionKey(&'static str),
    #[error("expected {expected} segments, found {found}")]
    SegmentCount { expected: &'static str, found: usize },
    #[error("expected key=value, found: {0}")]
    MissingAssignment(String),
    #[error("empty key")]
    EmptyKey,
    #[error("empty {0} list")]
    EmptyList(&'static str),
    #[error("unexpected arguments after {command}: {rest}")]
    UnexpectedArguments { command: &'static str, rest: String },

    // Capacity
    #[error("too many {what}: {count} (max 255)")]
    TooManyEntries { what: &'static str, count: usize },
    #[error("too many distinct strings (max 65535)")]
    TooManyStrings,
    #[error("string too long: {0} bytes (max 65535)")]
    StringTooLong(usize),
    #[error("string table exceeds 65535 bytes")]
    StringBlobTooLarge,
    #[error("instruction payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("too many instructions (max 65535)")]
    TooManyInstructions,

    // Control flow
    #[error("elseif without matching if")]
    ElseIfWithoutIf,
    #[error("elseif after else")]
    ElseIfAfterElse,
    #[error("else without matching if")]
    ElseWithoutIf,
    #[error("else after else")]
    ElseAfterElse,
    #[error("endif without matching if")]
    EndIfWithoutIf,
    #[error("if without matching endif")]
    UnterminatedIf,

    #[error("internal compiler error: {0}")]
    Internal(String),
}

/// Corrupt or unsupported bytecode. The decompiler and the engine never
/// attempt to recover from these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecompileError {
    #[error("unexpected end of data at offset {offset} (needed {needed} bytes)")]
    Truncated { offset: usize, needed: usize },
    #[error("bad marker byte: {0:#04x}")]
    BadMarker(u8),
    #[error("unsupported format version: {0}")]
    UnsupportedFormatVersion(u8),
    #[error("unknown opcode {opcode} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("unknown compare code {0}")]
    UnknownCompareCode(u8),
    #[error("unknown source code {0}")]
    UnknownSourceCode(u8),
    #[error("string index {index} out of range (table has {count})")]
    StringIndexOutOfRange { index: u16, count: usize },
    #[error("string {0} is not valid UTF-8")]
    InvalidUtf8(u16),
    #[error("malformed {opcode} payload at offset {offset}: {reason}")]
    MalformedPayload {
        opcode: &'static str,
        offset: usize,
        reason: String,
    },
    #[error("jump at offset {offset} targets {target}, which is not a later instruction boundary")]
    BadJumpTarget { offset: usize, target: i64 },
    #[error("instruction count mismatch: header declares {declared}, stream holds {found}")]
    InstructionCountMismatch { declared: usize, found: usize },
    #[error("instruction stream does not end with EOF")]
    MissingEof,
    #[error("unbalanced control flow at offset {offset}: {reason}")]
    UnbalancedControlFlow { offset: usize, reason: &'static str },
}

/// Failures while executing compiled rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Bytecode(#[from] DecompileError),
    #[error("invalid regex pattern {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// Failures of the framed container (compression and encryption layers).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("container too short: {0} bytes")]
    TooShort(usize),
    #[error("unknown container signature: {0:?}")]
    BadSignature([u8; 2]),
    #[error("invalid uncompressed size: {0}")]
    InvalidSize(i64),
    #[error("compression failed: {0}")]
    Compression(String),
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error("size mismatch: header declares {expected} bytes, inflated {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("decryption failed (wrong key or corrupt data)")]
    Decryption,
}

/// Umbrella error for callers that drive the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("Compilation error: {0}")]
    Compile(#[from] CompileError),
    #[error("Decompilation error: {0}")]
    Decompile(#[from] DecompileError),
    #[error("Execution error: {0}")]
    Engine(#[from] EngineError),
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RulesError {
    fn from(err: std::io::Error) -> Self {
        RulesError::Io(err.to_string())
    }
}
