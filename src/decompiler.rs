//! Bytecode to rule text.
//!
//! A single linear pass over the instruction stream. GOTO instructions have
//! no textual form and only show up as comments in debug mode. The output
//! recompiles to byte-identical payloads: strings are printed in the order
//! they were interned, so the string table is rebuilt in the same order.

use crate::compiler::parser::APPEND_PREFIX;
use crate::config::DecompileOptions;
use crate::error::DecompileError;
use crate::ir::{
    restore_hardware_case, Assignment, ChipsetRecord, CompiledRules, ConditionRecord, Opcode,
    Operation,
};
use crate::strings::{StringIndex, StringTable};

/// Renders compiled rules back into source text.
///
/// # Examples
///
/// ```rust
/// use config_rules::{Compiler, Decompiler};
///
/// let rules = Compiler::new().compile("// version:2\nset:(r.Shadow=\"0\")\n")?;
/// let text = Decompiler::new().decompile_rules(&rules)?;
/// assert_eq!(text, "// version:2\nset:(r.Shadow=\"0\")\n");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Decompiler {
    options: DecompileOptions,
}

impl Decompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecompileOptions) -> Self {
        Self { options }
    }

    /// Parse, validate and render a serialized file.
    pub fn decompile(&self, bytes: &[u8]) -> Result<String, DecompileError> {
        let rules = CompiledRules::from_bytes(bytes)?;
        self.render(&rules)
    }

    pub fn decompile_rules(&self, rules: &CompiledRules) -> Result<String, DecompileError> {
        rules.validate()?;
        self.render(rules)
    }

    fn render(&self, rules: &CompiledRules) -> Result<String, DecompileError> {
        let mut out = Writer {
            text: String::new(),
            indent: &self.options.indent,
        };
        out.line(0, &format!("// version:{}", rules.rule_version));

        let strings = &rules.strings;
        let mut depth = 0usize;
        for instruction in rules.instructions() {
            let instruction = instruction?;
            match instruction.decode()? {
                Operation::Set(assignments) => {
                    let list = assignment_list(&assignments, strings)?;
                    out.line(depth, &format!("set:{list}"));
                }
                Operation::Clear(keys) => {
                    let list = key_list(&keys, strings)?;
                    out.line(depth, &format!("clear:{list}"));
                }
                Operation::Chipset(record) => {
                    let fields = chipset_fields(&record, strings, instruction.offset)?;
                    out.line(depth, &format!("chipset:{fields}"));
                }
                Operation::Condition {
                    conditions,
                    sets,
                    clears,
                } => {
                    let mut text = format!(
                        "condition:{},{}",
                        condition_group(&conditions, strings)?,
                        assignment_list(&sets, strings)?
                    );
                    if !clears.is_empty() {
                        text.push_str(&format!(",{}", key_list(&clears, strings)?));
                    }
                    out.line(depth, &text);
                }
                Operation::If {
                    false_branch,
                    conditions,
                } => {
                    out.line(depth, &format!("if:{}", condition_group(&conditions, strings)?));
                    if self.options.debug {
                        out.line(depth, &format!(";false: {false_branch}"));
                    }
                    depth += 1;
                }
                Operation::ElseIf {
                    false_branch,
                    conditions,
                } => {
                    let parent = depth.saturating_sub(1);
                    out.line(parent, &format!("elseif:{}", condition_group(&conditions, strings)?));
                    if self.options.debug {
                        out.line(parent, &format!(";false: {false_branch}"));
                    }
                }
                Operation::Else => out.line(depth.saturating_sub(1), "else:"),
                Operation::EndIf => {
                    depth = depth.saturating_sub(1);
                    out.line(depth, "endif:");
                }
                Operation::Goto(target) => {
                    if self.options.debug {
                        out.line(depth, &format!(";goto: {target}"));
                    }
                }
                Operation::Eof => break,
            }
        }
        Ok(out.text)
    }
}

/// Decompile a serialized file with default indentation.
pub fn decompile(bytes: &[u8], debug: bool) -> Result<String, DecompileError> {
    Decompiler::with_options(DecompileOptions {
        debug,
        ..Default::default()
    })
    .decompile(bytes)
}

struct Writer<'a> {
    text: String,
    indent: &'a str,
}

impl Writer<'_> {
    fn line(&mut self, depth: usize, content: &str) {
        for _ in 0..depth {
            self.text.push_str(self.indent);
        }
        self.text.push_str(content);
        self.text.push('\n');
    }
}

fn quoted(value: &str) -> String {
    format!("\"{value}\"")
}

/// Keys made only of identifier characters print without quotes.
fn key_text(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if bare {
        key.to_string()
    } else {
        quoted(key)
    }
}

fn assignment_list(
    assignments: &[Assignment],
    strings: &StringTable,
) -> Result<String, DecompileError> {
    let mut items = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let key = strings.get(assignment.key)?;
        let key = if assignment.append {
            format!("{APPEND_PREFIX}{key}")
        } else {
            key.to_string()
        };
        items.push(format!(
            "{}={}",
            key_text(&key),
            quoted(strings.get(assignment.value)?)
        ));
    }
    Ok(format!("({})", items.join(",")))
}

fn key_list(keys: &[StringIndex], strings: &StringTable) -> Result<String, DecompileError> {
    let items = keys
        .iter()
        .map(|&key| strings.get(key).map(key_text))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", items.join(",")))
}

fn chipset_fields(
    record: &ChipsetRecord,
    strings: &StringTable,
    offset: usize,
) -> Result<String, DecompileError> {
    let folded = strings.get(record.hardware)?;
    let deltas = strings.get(record.case_deltas)?;
    let hardware =
        restore_hardware_case(folded, deltas).ok_or_else(|| DecompileError::MalformedPayload {
            opcode: Opcode::Chipset.name(),
            offset,
            reason: format!("bad case deltas {deltas:?} for {folded:?}"),
        })?;

    let mut fields = vec![quoted(&hardware)];
    for index in &record.fields()[2..] {
        fields.push(quoted(strings.get(*index)?));
    }
    Ok(fields.join(","))
}

fn condition_group(
    conditions: &[ConditionRecord],
    strings: &StringTable,
) -> Result<String, DecompileError> {
    let mut items = Vec::with_capacity(conditions.len());
    for record in conditions {
        let source = match record.source.keyword() {
            Some(keyword) => keyword.to_string(),
            None => quoted(strings.get(record.source_string)?),
        };
        items.push(format!(
            "(SourceType={},CompareType={},MatchString={})",
            source,
            record.compare.keyword(),
            quoted(strings.get(record.match_string)?)
        ));
    }
    Ok(format!("({})", items.join(",")))
}
