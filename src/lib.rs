//! # ConfigRules
//!
//! A compiler, decompiler and evaluator for ConfigRules, the line-oriented
//! scripting language that selects configuration variables for a device
//! from its properties (make, model, GPU, Android version and so on).
//!
//! Rule text compiles to a compact, self-contained bytecode: a deduplicated
//! string table followed by a flat instruction stream whose conditional
//! branches are resolved to absolute jump offsets. The decompiler turns that
//! bytecode back into rule text which recompiles to identical bytes, and the
//! [`RuleEngine`] executes it against a device description.
//!
//! ## Quick Start
//!
//! ### Compiling
//!
//! ```rust
//! use config_rules::Compiler;
//!
//! let source = r#"// version:3
//! if:((SourceType=SRC_DeviceMake,CompareType=CMP_EqualIgnore,MatchString="samsung"))
//!     set:(Profile="high")
//! else:
//!     set:(Profile="low")
//! endif:
//! "#;
//!
//! let rules = Compiler::new().compile(source)?;
//! assert_eq!(rules.rule_version, 3);
//! assert_eq!(rules.instruction_count, 7);
//! # Ok::<(), config_rules::CompileError>(())
//! ```
//!
//! ### Decompiling
//!
//! ```rust
//! use config_rules::{compile, Decompiler};
//!
//! let bytes = compile("// version:1\nset:(Gpu=\"mali\")\n", false)?;
//! let text = Decompiler::new().decompile(&bytes)?;
//! assert_eq!(compile(&text, false)?, bytes);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Evaluating
//!
//! ```rust
//! use config_rules::{compile, EvalContext, RuleEngine};
//! use config_rules::tokens::SourceType;
//!
//! let bytes = compile(
//!     "// version:1\n\
//!      if:((SourceType=SRC_AndroidVersion,CompareType=CMP_VersionGreaterEqual,MatchString=\"13\"))\n\
//!      set:(Api=\"new\")\n\
//!      endif\n",
//!     false,
//! )?;
//! let engine = RuleEngine::from_bytes(&bytes)?;
//! let context = EvalContext::new().with_source(SourceType::AndroidVersion, "14");
//! assert_eq!(engine.run(&context)?["Api"], "new");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Containers
//!
//! Compiled bytecode (or raw rule text) is stored on disk inside a framed,
//! zlib-compressed and optionally password-encrypted container; see
//! [`container`].

pub mod batch;
pub mod compiler;
pub mod config;
pub mod container;
pub mod crypto;
pub mod decompiler;
pub mod engine;
pub mod error;
pub mod ir;
pub mod strings;
pub mod tokens;

// Compiler and decompiler
pub use compiler::{compile, find_version, Compiler};
pub use decompiler::{decompile, Decompiler};

// Evaluation
pub use engine::{EvalContext, RuleEngine};

// Configuration
pub use config::{BatchConfig, CompileOptions, ContainerOptions, DecompileOptions, ToolConfig};

// Core types and errors
pub use error::{
    CompileError, CompileErrorKind, ContainerError, DecompileError, EngineError, Result,
    RulesError,
};
pub use ir::{CompiledRules, Opcode, Operation};
pub use strings::{StringIndex, StringTable};
