//! Bytecode evaluator.
//!
//! [`RuleEngine`] executes [`CompiledRules`] against an [`EvalContext`].
//! Construction validates the bytecode, decodes every instruction once and
//! compiles each distinct regex; evaluation is then a plain walk over the
//! decoded program. Every jump moves forward, so a run visits each
//! instruction at most once.

pub mod compare;
pub mod context;

pub use context::{ContextDocument, EvalContext};

use crate::error::{DecompileError, EngineError};
use crate::ir::{
    restore_hardware_case, Assignment, ChipsetRecord, CompiledRules, ConditionRecord, Opcode,
    Operation,
};
use crate::strings::StringIndex;
use crate::tokens::{CompareOp, SourceType};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, HashMap};

/// Variables written by a matching CHIPSET line, in field order.
pub const CHIPSET_VARIABLES: [&str; 7] = [
    "Hardware",
    "UseAffinity",
    "Chipset",
    "CPU",
    "ProcessorCount",
    "BigCoreMask",
    "LittleCoreMask",
];

type EngineResult<T> = std::result::Result<T, EngineError>;

/// Executes compiled rules.
///
/// # Examples
///
/// ```rust
/// use config_rules::engine::{EvalContext, RuleEngine};
/// use config_rules::tokens::SourceType;
/// use config_rules::Compiler;
///
/// let rules = Compiler::new().compile(r#"// version:1
/// if:((SourceType=SRC_DeviceMake,CompareType=CMP_EqualIgnore,MatchString="Samsung"))
///     set:(r.Vulkan="1")
/// else:
///     set:(r.Vulkan="0")
/// endif:
/// "#)?;
///
/// let engine = RuleEngine::new(rules)?;
/// let mut context = EvalContext::new().with_source(SourceType::DeviceMake, "SAMSUNG");
/// engine.evaluate(&mut context)?;
/// assert_eq!(context.variable("r.Vulkan"), Some("1"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: CompiledRules,
    program: Vec<(usize, Operation)>,
    index_of: HashMap<usize, usize>,
    regexes: HashMap<(StringIndex, bool), Regex>,
}

impl RuleEngine {
    pub fn new(rules: CompiledRules) -> EngineResult<Self> {
        rules.validate()?;

        let mut program = Vec::with_capacity(rules.instruction_count as usize);
        let mut index_of = HashMap::with_capacity(rules.instruction_count as usize);
        let mut regexes = HashMap::new();
        for instruction in rules.instructions() {
            let instruction = instruction?;
            let operation = instruction.decode()?;

            for record in conditions_of(&operation) {
                if record.compare.op != CompareOp::Regex {
                    continue;
                }
                let key = (record.match_string, record.compare.ignore_case);
                if regexes.contains_key(&key) {
                    continue;
                }
                let pattern = rules.strings.get(record.match_string)?;
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(record.compare.ignore_case)
                    .build()
                    .map_err(|e| EngineError::InvalidRegex {
                        pattern: pattern.to_string(),
                        message: e.to_string(),
                    })?;
                regexes.insert(key, regex);
            }

            index_of.insert(instruction.offset, program.len());
            program.push((instruction.offset, operation));
        }

        log::debug!(
            "engine ready: {} instructions, {} regexes",
            program.len(),
            regexes.len()
        );
        Ok(Self {
            rules,
            program,
            index_of,
            regexes,
        })
    }

    /// Parse, validate and load a serialized file.
    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        Self::new(CompiledRules::from_bytes(bytes)?)
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    /// Run the program once, updating the context's variables.
    pub fn evaluate(&self, context: &mut EvalContext) -> EngineResult<()> {
        let mut pc = 0;
        while let Some((offset, operation)) = self.program.get(pc) {
            pc += 1;
            match operation {
                Operation::Set(assignments) => self.apply_sets(assignments, context)?,
                Operation::Clear(keys) => self.apply_clears(keys, context)?,
                Operation::Chipset(record) => self.apply_chipset(record, *offset, context)?,
                Operation::Condition {
                    conditions,
                    sets,
                    clears,
                } => {
                    if self.group_holds(conditions, context)? {
                        self.apply_sets(sets, context)?;
                        self.apply_clears(clears, context)?;
                    }
                }
                Operation::If {
                    false_branch,
                    conditions,
                }
                | Operation::ElseIf {
                    false_branch,
                    conditions,
                } => {
                    if !self.group_holds(conditions, context)? {
                        pc = self.jump(*offset, *false_branch)?;
                    }
                }
                Operation::Goto(target) => pc = self.jump(*offset, *target)?,
                Operation::Else | Operation::EndIf => {}
                Operation::Eof => return Ok(()),
            }
        }
        Err(DecompileError::MissingEof.into())
    }

    /// Evaluate against a fresh copy of `context` and return the variables.
    pub fn run(&self, context: &EvalContext) -> EngineResult<BTreeMap<String, String>> {
        let mut context = context.clone();
        self.evaluate(&mut context)?;
        Ok(context.into_variables())
    }

    fn jump(&self, offset: usize, target: i32) -> EngineResult<usize> {
        usize::try_from(target)
            .ok()
            .and_then(|target| self.index_of.get(&target).copied())
            .ok_or_else(|| {
                DecompileError::BadJumpTarget {
                    offset,
                    target: target as i64,
                }
                .into()
            })
    }

    fn string(&self, index: StringIndex) -> EngineResult<&str> {
        Ok(self.rules.strings.get(index)?)
    }

    fn apply_sets(&self, assignments: &[Assignment], context: &mut EvalContext) -> EngineResult<()> {
        for assignment in assignments {
            let key = self.string(assignment.key)?;
            let raw = self.string(assignment.value)?;
            let value = if assignment.expand {
                context.expand(raw)
            } else {
                raw.to_string()
            };
            if assignment.append {
                context.append_variable(key, &value);
            } else {
                context.set_variable(key, value);
            }
        }
        Ok(())
    }

    fn apply_clears(&self, keys: &[StringIndex], context: &mut EvalContext) -> EngineResult<()> {
        for &key in keys {
            context.remove_variable(self.string(key)?);
        }
        Ok(())
    }

    fn apply_chipset(
        &self,
        record: &ChipsetRecord,
        offset: usize,
        context: &mut EvalContext,
    ) -> EngineResult<()> {
        let folded = self.string(record.hardware)?;
        if context.source(SourceType::Hardware).to_ascii_lowercase() != folded {
            return Ok(());
        }

        let deltas = self.string(record.case_deltas)?;
        let hardware = restore_hardware_case(folded, deltas).ok_or_else(|| {
            DecompileError::MalformedPayload {
                opcode: Opcode::Chipset.name(),
                offset,
                reason: format!("bad case deltas {deltas:?}"),
            }
        })?;

        let fields = record.fields();
        context.set_variable(CHIPSET_VARIABLES[0], hardware);
        for (name, &index) in CHIPSET_VARIABLES[1..].iter().zip(&fields[2..]) {
            context.set_variable(*name, self.string(index)?);
        }
        Ok(())
    }

    fn group_holds(
        &self,
        conditions: &[ConditionRecord],
        context: &mut EvalContext,
    ) -> EngineResult<bool> {
        for record in conditions {
            if !self.condition_holds(record, context)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn condition_holds(
        &self,
        record: &ConditionRecord,
        context: &mut EvalContext,
    ) -> EngineResult<bool> {
        let expected = self.string(record.match_string)?;
        let op = record.compare.op;

        let value = match record.source {
            SourceType::Exist => {
                let exists = context.has_variable(expected);
                return Ok(if op == CompareOp::NotEqual { !exists } else { exists });
            }
            SourceType::PreviousRegexMatch => context.previous_match().unwrap_or("").to_string(),
            SourceType::Literal => context.expand(self.string(record.source_string)?),
            device => context.source(device).to_string(),
        };
        let value = if record.compare.ignore_case {
            value.to_lowercase()
        } else {
            value
        };

        // Literal tests stand in for anchored regexes, so they capture too.
        let holds = match op {
            CompareOp::Equal => value == expected,
            CompareOp::NotEqual => return Ok(value != expected),
            CompareOp::StartsWith => value.starts_with(expected),
            CompareOp::EndsWith => value.ends_with(expected),
            CompareOp::Contains => value.contains(expected),
            CompareOp::Regex => {
                let regex = self
                    .regexes
                    .get(&(record.match_string, record.compare.ignore_case))
                    .ok_or_else(|| EngineError::InvalidRegex {
                        pattern: expected.to_string(),
                        message: "pattern was not compiled".to_string(),
                    })?;
                let captured = regex.captures(&value).and_then(|captures| {
                    captures
                        .get(1)
                        .or_else(|| captures.get(0))
                        .map(|m| m.as_str().to_string())
                });
                return Ok(match captured {
                    Some(text) => {
                        context.set_previous_match(text);
                        true
                    }
                    None => false,
                });
            }
            CompareOp::Less
            | CompareOp::LessEqual
            | CompareOp::Greater
            | CompareOp::GreaterEqual => return Ok(compare::compare_numeric(op, &value, expected)),
            CompareOp::VersionLess
            | CompareOp::VersionLessEqual
            | CompareOp::VersionGreater
            | CompareOp::VersionGreaterEqual => {
                return Ok(compare::compare_version_op(op, &value, expected))
            }
        };
        if holds {
            context.set_previous_match(expected);
        }
        Ok(holds)
    }
}

fn conditions_of(operation: &Operation) -> &[ConditionRecord] {
    match operation {
        Operation::Condition { conditions, .. }
        | Operation::If { conditions, .. }
        | Operation::ElseIf { conditions, .. } => conditions,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;

    fn run(source: &str, context: EvalContext) -> BTreeMap<String, String> {
        let rules = Compiler::new().compile(source).unwrap();
        RuleEngine::new(rules).unwrap().run(&context).unwrap()
    }

    fn make(make: &str) -> EvalContext {
        EvalContext::new().with_source(SourceType::DeviceMake, make)
    }

    const BRANCHES: &str = r#"// version:1
if:((SourceType=SRC_DeviceMake,CompareType=CMP_Equal,MatchString="a"))
set:(X="1")
elseif:((SourceType=SRC_DeviceMake,CompareType=CMP_Equal,MatchString="b"))
set:(X="2")
else:
set:(X="3")
endif:
set:(Done="yes")
"#;

    #[test]
    fn test_branch_selection() {
        for (input, expected) in [("a", "1"), ("b", "2"), ("c", "3")] {
            let vars = run(BRANCHES, make(input));
            assert_eq!(vars.get("X").map(String::as_str), Some(expected), "{input}");
            assert_eq!(vars.get("Done").map(String::as_str), Some("yes"));
        }
    }

    #[test]
    fn test_set_append_expand_and_clear() {
        let source = r#"// version:1
set:(Gpu="Mali",Cmd="-a")
set:(APPEND_Cmd=" -b",Name="r.$(Gpu)",Plain="$Gpu")
clear:(Gpu)
"#;
        let vars = run(source, EvalContext::new());
        assert_eq!(vars.get("Cmd").map(String::as_str), Some("-a -b"));
        assert_eq!(vars.get("Name").map(String::as_str), Some("r.Mali"));
        assert_eq!(vars.get("Plain").map(String::as_str), Some("$Gpu"));
        assert!(!vars.contains_key("Gpu"));
    }

    #[test]
    fn test_condition_applies_effects_inline() {
        let source = r#"// version:1
set:(Old="x")
condition:((SourceType=SRC_DeviceMake,CompareType=CMP_Equal,MatchString="a")),(New="1"),(Old)
"#;
        let vars = run(source, make("a"));
        assert_eq!(vars.get("New").map(String::as_str), Some("1"));
        assert!(!vars.contains_key("Old"));

        let vars = run(source, make("b"));
        assert!(!vars.contains_key("New"));
        assert!(vars.contains_key("Old"));
    }

    #[test]
    fn test_exist_source() {
        let source = r#"// version:1
condition:((SourceType=[EXIST],CompareType=CMP_Equal,MatchString="Flag")),(Seen="1")
condition:((SourceType=[EXIST],CompareType=CMP_NotEqual,MatchString="Flag")),(Missing="1")
"#;
        let vars = run(source, EvalContext::new().with_variable("Flag", ""));
        assert!(vars.contains_key("Seen"));
        assert!(!vars.contains_key("Missing"));

        let vars = run(source, EvalContext::new());
        assert!(!vars.contains_key("Seen"));
        assert!(vars.contains_key("Missing"));
    }

    #[test]
    fn test_regex_captures_feed_previous_match() {
        let source = r#"// version:1
condition:((SourceType=SRC_GPUFamily,CompareType=CMP_Regex,MatchString="Mali-G(\d+)")),()
set:(Series="$(Unused)")
condition:((SourceType=SRC_PreviousRegexMatch,CompareType=CMP_GreaterEqual,MatchString="70")),(Modern="1")
"#;
        let context = EvalContext::new().with_source(SourceType::GpuFamily, "Mali-G78 MP14");
        let vars = run(source, context);
        assert_eq!(vars.get("Modern").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_literalized_regex_behaves_like_regex() {
        // `^Adreno` compiles to StartsWith; the match still feeds SRC_PreviousRegexMatch.
        let source = r#"// version:1
condition:((SourceType=SRC_GPUFamily,CompareType=CMP_Regex,MatchString="^Adreno")),(IsAdreno="1")
condition:((SourceType=SRC_PreviousRegexMatch,CompareType=CMP_Equal,MatchString="Adreno")),(Prev="1")
"#;
        let context = EvalContext::new().with_source(SourceType::GpuFamily, "Adreno (TM) 740");
        let vars = run(source, context);
        assert!(vars.contains_key("IsAdreno"));
        assert!(vars.contains_key("Prev"));
    }

    #[test]
    fn test_ignore_case_compares() {
        let source = r#"// version:1
condition:((SourceType=SRC_DeviceModel,CompareType=CMP_StartsWithIgnore,MatchString="SM-")),(Galaxy="1")
condition:((SourceType=SRC_DeviceModel,CompareType=CMP_RegexIgnore,MatchString="G99[0-9]")),(S21="1")
"#;
        let context = EvalContext::new().with_source(SourceType::DeviceModel, "sm-g991b");
        let vars = run(source, context);
        assert!(vars.contains_key("Galaxy"));
        assert!(vars.contains_key("S21"));
    }

    #[test]
    fn test_literal_source_is_expanded() {
        let source = r#"// version:1
set:(Tier="2")
condition:((SourceType="$(Tier)",CompareType=CMP_Greater,MatchString="1")),(HighTier="1")
"#;
        let vars = run(source, EvalContext::new());
        assert!(vars.contains_key("HighTier"));
    }

    #[test]
    fn test_version_compare() {
        let source = r#"// version:1
if:((SourceType=SRC_AndroidVersion,CompareType=CMP_VersionGreaterEqual,MatchString="12.1"))
set:(Modern="1")
endif:
"#;
        let context = EvalContext::new().with_source(SourceType::AndroidVersion, "13");
        assert!(run(source, context).contains_key("Modern"));
        let context = EvalContext::new().with_source(SourceType::AndroidVersion, "12");
        assert!(!run(source, context).contains_key("Modern"));
    }

    #[test]
    fn test_chipset_matches_hardware_case_insensitively() {
        let source = "// version:1\nchipset:\"SnapDragon 8\",\"true\",\"SM8450\",\"Kryo\",\"8\",\"0xF0\",\"0x0F\"\n";
        let context = EvalContext::new().with_source(SourceType::Hardware, "SNAPDRAGON 8");
        let vars = run(source, context);
        assert_eq!(vars.get("Hardware").map(String::as_str), Some("SnapDragon 8"));
        assert_eq!(vars.get("ProcessorCount").map(String::as_str), Some("8"));
        assert_eq!(vars.get("LittleCoreMask").map(String::as_str), Some("0x0F"));

        let context = EvalContext::new().with_source(SourceType::Hardware, "exynos");
        assert!(run(source, context).is_empty());
    }

    #[test]
    fn test_invalid_regex_rejected_at_load() {
        let source = r#"// version:1
condition:((SourceType=SRC_GPUFamily,CompareType=CMP_Regex,MatchString="(unclosed")),()
"#;
        let rules = Compiler::new().compile(source).unwrap();
        assert!(matches!(
            RuleEngine::new(rules),
            Err(EngineError::InvalidRegex { .. })
        ));
    }
}
