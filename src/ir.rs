//! Bytecode representation for compiled ConfigRules.
//!
//! This module defines the opcode set, the payload records, the instruction
//! reader shared by the decompiler and the engine, and the compiled file
//! layout:
//!
//! ```text
//! [marker:1][formatVersion:1][ruleLanguageVersion:u16]
//! [stringCount:u16][stringBlobLength:u16][offsets][lengths][blob]
//! [instructionCount:u16][instructions...]
//! ```
//!
//! Every integer is big-endian. An instruction is `[opcode:u8][length:u16][payload]`
//! and jump targets are byte offsets from the start of the instruction stream.

use crate::error::DecompileError;
use crate::strings::{StringIndex, StringTable};
use crate::tokens::{CompareType, SourceType};
use std::collections::HashSet;

/// First byte of a compiled file. Below 0x20 so it can never start a text file.
pub const MARKER: u8 = 0x01;
pub const FORMAT_VERSION: u8 = 1;
pub const INSTRUCTION_HEADER_LEN: usize = 3;
pub const JUMP_LEN: usize = 4;
/// Value a jump slot holds until its fixup is applied.
pub const JUMP_PLACEHOLDER: i32 = -1;
/// Count fields are single bytes.
pub const MAX_LIST_ENTRIES: usize = u8::MAX as usize;

pub const SET_FLAG_APPEND: u8 = 0x01;
pub const SET_FLAG_EXPAND: u8 = 0x02;

/// Big-endian cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecompileError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecompileError::Truncated {
                offset: self.pos,
                needed: len,
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecompileError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecompileError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecompileError> {
        let bytes = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Eof = 0,
    Set = 1,
    Clear = 2,
    Chipset = 3,
    Condition = 4,
    If = 5,
    ElseIf = 6,
    Else = 7,
    EndIf = 8,
    Goto = 9,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Opcode::Eof),
            1 => Some(Opcode::Set),
            2 => Some(Opcode::Clear),
            3 => Some(Opcode::Chipset),
            4 => Some(Opcode::Condition),
            5 => Some(Opcode::If),
            6 => Some(Opcode::ElseIf),
            7 => Some(Opcode::Else),
            8 => Some(Opcode::EndIf),
            9 => Some(Opcode::Goto),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Eof => "EOF",
            Opcode::Set => "SET",
            Opcode::Clear => "CLEAR",
            Opcode::Chipset => "CHIPSET",
            Opcode::Condition => "CONDITION",
            Opcode::If => "IF",
            Opcode::ElseIf => "ELSEIF",
            Opcode::Else => "ELSE",
            Opcode::EndIf => "ENDIF",
            Opcode::Goto => "GOTO",
        }
    }
}

/// One `(source, compare, match)` test of a condition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionRecord {
    pub source: SourceType,
    pub source_string: StringIndex,
    pub compare: CompareType,
    pub match_string: StringIndex,
}

/// One `key=value` entry of a SET list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub append: bool,
    pub expand: bool,
    pub key: StringIndex,
    pub value: StringIndex,
}

impl Assignment {
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.append {
            flags |= SET_FLAG_APPEND;
        }
        if self.expand {
            flags |= SET_FLAG_EXPAND;
        }
        flags
    }
}

/// A `chipset:` line. `hardware` is stored lower-cased; `case_deltas` restores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChipsetRecord {
    pub hardware: StringIndex,
    pub case_deltas: StringIndex,
    pub use_affinity: StringIndex,
    pub chipset: StringIndex,
    pub cpu: StringIndex,
    pub processor_count: StringIndex,
    pub big_core_mask: StringIndex,
    pub little_core_mask: StringIndex,
}

impl ChipsetRecord {
    pub fn fields(&self) -> [StringIndex; 8] {
        [
            self.hardware,
            self.case_deltas,
            self.use_affinity,
            self.chipset,
            self.cpu,
            self.processor_count,
            self.big_core_mask,
            self.little_core_mask,
        ]
    }

    fn from_fields(fields: [StringIndex; 8]) -> Self {
        Self {
            hardware: fields[0],
            case_deltas: fields[1],
            use_affinity: fields[2],
            chipset: fields[3],
            cpu: fields[4],
            processor_count: fields[5],
            big_core_mask: fields[6],
            little_core_mask: fields[7],
        }
    }
}

/// Lower-case the ASCII capitals of a hardware name, recording where they were.
///
/// Returns the folded name and the delta string: the distance of each
/// capital from the previous one (the first from position zero), joined by
/// commas. Only ASCII capitals are folded and recorded; any other
/// character, including non-ASCII capitals such as `Ä`, is stored as-is and
/// restores to itself.
///
/// ```rust
/// use config_rules::ir::{fold_hardware_case, restore_hardware_case};
///
/// let (folded, deltas) = fold_hardware_case("SnapDragon 8");
/// assert_eq!((folded.as_str(), deltas.as_str()), ("snapdragon 8", "0,4"));
/// assert_eq!(restore_hardware_case(&folded, &deltas).as_deref(), Some("SnapDragon 8"));
/// ```
pub fn fold_hardware_case(name: &str) -> (String, String) {
    let mut folded = String::with_capacity(name.len());
    let mut deltas = Vec::new();
    let mut previous = 0;
    for (position, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            deltas.push((position - previous).to_string());
            previous = position;
            folded.push(ch.to_ascii_lowercase());
        } else {
            folded.push(ch);
        }
    }
    (folded, deltas.join(","))
}

/// Inverse of [`fold_hardware_case`]. `None` if the deltas are malformed
/// or point past the end of the name.
pub fn restore_hardware_case(folded: &str, deltas: &str) -> Option<String> {
    if deltas.is_empty() {
        return Some(folded.to_string());
    }

    let mut positions = HashSet::new();
    let mut position = 0usize;
    for part in deltas.split(',') {
        position = position.checked_add(part.parse::<usize>().ok()?)?;
        positions.insert(position);
    }
    if position >= folded.chars().count() {
        return None;
    }

    Some(
        folded
            .chars()
            .enumerate()
            .map(|(i, ch)| {
                if positions.contains(&i) {
                    ch.to_ascii_uppercase()
                } else {
                    ch
                }
            })
            .collect(),
    )
}

/// Decoded form of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Set(Vec<Assignment>),
    Clear(Vec<StringIndex>),
    Chipset(ChipsetRecord),
    Condition {
        conditions: Vec<ConditionRecord>,
        sets: Vec<Assignment>,
        clears: Vec<StringIndex>,
    },
    If {
        false_branch: i32,
        conditions: Vec<ConditionRecord>,
    },
    ElseIf {
        false_branch: i32,
        conditions: Vec<ConditionRecord>,
    },
    Else,
    EndIf,
    Goto(i32),
    Eof,
}

impl Operation {
    pub fn opcode(&self) -> Opcode {
        match self {
            Operation::Set(_) => Opcode::Set,
            Operation::Clear(_) => Opcode::Clear,
            Operation::Chipset(_) => Opcode::Chipset,
            Operation::Condition { .. } => Opcode::Condition,
            Operation::If { .. } => Opcode::If,
            Operation::ElseIf { .. } => Opcode::ElseIf,
            Operation::Else => Opcode::Else,
            Operation::EndIf => Opcode::EndIf,
            Operation::Goto(_) => Opcode::Goto,
            Operation::Eof => Opcode::Eof,
        }
    }

    /// Offset of the jump slot within the payload, for operations that have one.
    pub fn jump_slot(&self) -> Option<usize> {
        match self {
            Operation::If { .. } | Operation::ElseIf { .. } | Operation::Goto(_) => Some(0),
            _ => None,
        }
    }

    pub fn jump_target(&self) -> Option<i32> {
        match self {
            Operation::If { false_branch, .. } | Operation::ElseIf { false_branch, .. } => {
                Some(*false_branch)
            }
            Operation::Goto(target) => Some(*target),
            _ => None,
        }
    }

    /// Every string index referenced by the payload.
    pub fn string_indices(&self) -> Vec<StringIndex> {
        fn conditions(records: &[ConditionRecord], out: &mut Vec<StringIndex>) {
            for record in records {
                out.push(record.source_string);
                out.push(record.match_string);
            }
        }
        fn sets(records: &[Assignment], out: &mut Vec<StringIndex>) {
            for record in records {
                out.push(record.key);
                out.push(record.value);
            }
        }

        let mut out = Vec::new();
        match self {
            Operation::Set(assignments) => sets(assignments, &mut out),
            Operation::Clear(keys) => out.extend_from_slice(keys),
            Operation::Chipset(record) => out.extend_from_slice(&record.fields()),
            Operation::Condition {
                conditions: records,
                sets: assignments,
                clears,
            } => {
                conditions(records, &mut out);
                sets(assignments, &mut out);
                out.extend_from_slice(clears);
            }
            Operation::If {
                conditions: records,
                ..
            }
            | Operation::ElseIf {
                conditions: records,
                ..
            } => conditions(records, &mut out),
            Operation::Else | Operation::EndIf | Operation::Goto(_) | Operation::Eof => {}
        }
        out
    }

    /// Write the payload (without the instruction header).
    ///
    /// List lengths must already be within [`MAX_LIST_ENTRIES`].
    pub fn encode_payload(&self, out: &mut Vec<u8>) {
        match self {
            Operation::Set(assignments) => encode_assignments(assignments, out),
            Operation::Clear(keys) => encode_keys(keys, out),
            Operation::Chipset(record) => {
                for field in record.fields() {
                    out.extend_from_slice(&field.to_be_bytes());
                }
            }
            Operation::Condition {
                conditions,
                sets,
                clears,
            } => {
                encode_conditions(conditions, out);
                encode_assignments(sets, out);
                encode_keys(clears, out);
            }
            Operation::If {
                false_branch,
                conditions,
            }
            | Operation::ElseIf {
                false_branch,
                conditions,
            } => {
                out.extend_from_slice(&false_branch.to_be_bytes());
                encode_conditions(conditions, out);
            }
            Operation::Goto(target) => out.extend_from_slice(&target.to_be_bytes()),
            Operation::Else | Operation::EndIf | Operation::Eof => {}
        }
    }
}

fn encode_conditions(records: &[ConditionRecord], out: &mut Vec<u8>) {
    out.push(records.len() as u8);
    for record in records {
        out.push(record.source.code());
        out.extend_from_slice(&record.source_string.to_be_bytes());
        out.push(record.compare.code());
        out.extend_from_slice(&record.match_string.to_be_bytes());
    }
}

fn encode_assignments(records: &[Assignment], out: &mut Vec<u8>) {
    out.push(records.len() as u8);
    for record in records {
        out.push(record.flags());
        out.extend_from_slice(&record.key.to_be_bytes());
        out.extend_from_slice(&record.value.to_be_bytes());
    }
}

fn encode_keys(keys: &[StringIndex], out: &mut Vec<u8>) {
    out.push(keys.len() as u8);
    for key in keys {
        out.extend_from_slice(&key.to_be_bytes());
    }
}

fn decode_conditions(reader: &mut ByteReader<'_>) -> Result<Vec<ConditionRecord>, DecompileError> {
    let count = reader.read_u8()? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let source_code = reader.read_u8()?;
        let source =
            SourceType::from_code(source_code).ok_or(DecompileError::UnknownSourceCode(source_code))?;
        let source_string = reader.read_u16()?;
        let compare_code = reader.read_u8()?;
        let compare = CompareType::from_code(compare_code)
            .ok_or(DecompileError::UnknownCompareCode(compare_code))?;
        let match_string = reader.read_u16()?;
        records.push(ConditionRecord {
            source,
            source_string,
            compare,
            match_string,
        });
    }
    Ok(records)
}

fn decode_assignments(reader: &mut ByteReader<'_>) -> Result<Vec<Assignment>, DecompileError> {
    let count = reader.read_u8()? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let flags = reader.read_u8()?;
        if flags & !(SET_FLAG_APPEND | SET_FLAG_EXPAND) != 0 {
            return Err(DecompileError::MalformedPayload {
                opcode: Opcode::Set.name(),
                offset: reader.position(),
                reason: format!("unknown flag bits {flags:#04x}"),
            });
        }
        let key = reader.read_u16()?;
        let value = reader.read_u16()?;
        records.push(Assignment {
            append: flags & SET_FLAG_APPEND != 0,
            expand: flags & SET_FLAG_EXPAND != 0,
            key,
            value,
        });
    }
    Ok(records)
}

fn decode_keys(reader: &mut ByteReader<'_>) -> Result<Vec<StringIndex>, DecompileError> {
    let count = reader.read_u8()? as usize;
    (0..count).map(|_| reader.read_u16()).collect()
}

/// A raw instruction located in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub offset: usize,
    pub opcode: Opcode,
    pub payload: &'a [u8],
}

impl<'a> Instruction<'a> {
    /// Read the instruction starting at `offset`.
    pub fn read_at(code: &'a [u8], offset: usize) -> Result<Self, DecompileError> {
        let header = code
            .get(offset..offset + INSTRUCTION_HEADER_LEN)
            .ok_or(DecompileError::Truncated {
                offset,
                needed: INSTRUCTION_HEADER_LEN,
            })?;
        let opcode = Opcode::from_u8(header[0]).ok_or(DecompileError::UnknownOpcode {
            opcode: header[0],
            offset,
        })?;
        let length = u16::from_be_bytes([header[1], header[2]]) as usize;
        let start = offset + INSTRUCTION_HEADER_LEN;
        let payload = code
            .get(start..start + length)
            .ok_or(DecompileError::Truncated {
                offset: start,
                needed: length,
            })?;
        Ok(Self {
            offset,
            opcode,
            payload,
        })
    }

    /// Encoded size including the header.
    pub fn encoded_len(&self) -> usize {
        INSTRUCTION_HEADER_LEN + self.payload.len()
    }

    pub fn next_offset(&self) -> usize {
        self.offset + self.encoded_len()
    }

    /// Decode the payload, requiring it to be consumed exactly.
    pub fn decode(&self) -> Result<Operation, DecompileError> {
        let mut reader = ByteReader::new(self.payload);
        let operation = self
            .decode_with(&mut reader)
            .map_err(|err| match err {
                DecompileError::Truncated { .. } => self.malformed("payload truncated".to_string()),
                other => other,
            })?;
        if reader.remaining() != 0 {
            return Err(self.malformed(format!("{} trailing bytes", reader.remaining())));
        }
        Ok(operation)
    }

    fn decode_with(&self, reader: &mut ByteReader<'_>) -> Result<Operation, DecompileError> {
        let operation = match self.opcode {
            Opcode::Set => Operation::Set(decode_assignments(reader)?),
            Opcode::Clear => Operation::Clear(decode_keys(reader)?),
            Opcode::Chipset => {
                let mut fields = [0; 8];
                for field in fields.iter_mut() {
                    *field = reader.read_u16()?;
                }
                Operation::Chipset(ChipsetRecord::from_fields(fields))
            }
            Opcode::Condition => Operation::Condition {
                conditions: decode_conditions(reader)?,
                sets: decode_assignments(reader)?,
                clears: decode_keys(reader)?,
            },
            Opcode::If => Operation::If {
                false_branch: reader.read_i32()?,
                conditions: decode_conditions(reader)?,
            },
            Opcode::ElseIf => Operation::ElseIf {
                false_branch: reader.read_i32()?,
                conditions: decode_conditions(reader)?,
            },
            Opcode::Goto => Operation::Goto(reader.read_i32()?),
            Opcode::Else => Operation::Else,
            Opcode::EndIf => Operation::EndIf,
            Opcode::Eof => Operation::Eof,
        };
        Ok(operation)
    }

    fn malformed(&self, reason: String) -> DecompileError {
        DecompileError::MalformedPayload {
            opcode: self.opcode.name(),
            offset: self.offset,
            reason,
        }
    }
}

/// Linear walk over an instruction stream. Stops after the first error.
#[derive(Debug, Clone)]
pub struct InstructionReader<'a> {
    code: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> InstructionReader<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for InstructionReader<'a> {
    type Item = Result<Instruction<'a>, DecompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.code.len() {
            return None;
        }
        match Instruction::read_at(self.code, self.pos) {
            Ok(instruction) => {
                self.pos = instruction.next_offset();
                Some(Ok(instruction))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// A compiled rule file: string table plus instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRules {
    pub rule_version: u16,
    pub strings: StringTable,
    pub instruction_count: u16,
    pub code: Vec<u8>,
}

impl CompiledRules {
    pub fn instructions(&self) -> InstructionReader<'_> {
        InstructionReader::new(&self.code)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            8 + self.strings.len() * 4 + self.strings.blob_len() + 2 + self.code.len(),
        );
        out.push(MARKER);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&self.rule_version.to_be_bytes());
        self.strings.write_to(&mut out);
        out.extend_from_slice(&self.instruction_count.to_be_bytes());
        out.extend_from_slice(&self.code);
        out
    }

    /// Parse and fully validate a compiled file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecompileError> {
        let mut reader = ByteReader::new(bytes);
        let marker = reader.read_u8()?;
        if marker != MARKER {
            return Err(DecompileError::BadMarker(marker));
        }
        let format_version = reader.read_u8()?;
        if format_version != FORMAT_VERSION {
            return Err(DecompileError::UnsupportedFormatVersion(format_version));
        }
        let rule_version = reader.read_u16()?;
        let strings = StringTable::read_from(&mut reader)?;
        let instruction_count = reader.read_u16()?;
        let code = reader.rest().to_vec();

        let rules = Self {
            rule_version,
            strings,
            instruction_count,
            code,
        };
        rules.validate()?;
        Ok(rules)
    }

    /// Check structural invariants: decodable payloads, in-range string
    /// indices, forward jumps onto instruction boundaries, balanced
    /// IF/ELSEIF/ELSE/ENDIF nesting, a single EOF at the end, and a
    /// matching instruction count.
    pub fn validate(&self) -> Result<(), DecompileError> {
        let mut boundaries = HashSet::new();
        let mut jumps = Vec::new();
        let mut found = 0usize;
        let mut saw_eof = false;
        // One entry per open IF, true once its ELSE has been seen.
        let mut open_ifs: Vec<bool> = Vec::new();
        let mut eof_offset = 0usize;

        for instruction in self.instructions() {
            let instruction = instruction?;
            if saw_eof {
                // Anything after EOF is unreachable and not part of the format.
                return Err(DecompileError::MalformedPayload {
                    opcode: Opcode::Eof.name(),
                    offset: instruction.offset,
                    reason: "instructions after EOF".to_string(),
                });
            }
            found += 1;
            boundaries.insert(instruction.offset);

            let operation = instruction.decode()?;
            for index in operation.string_indices() {
                self.strings.get(index)?;
            }
            if let Some(target) = operation.jump_target() {
                jumps.push((instruction.offset, target));
            }
            track_nesting(&mut open_ifs, instruction.offset, operation.opcode())?;
            saw_eof = operation == Operation::Eof;
            eof_offset = instruction.offset;
        }

        if !saw_eof {
            return Err(DecompileError::MissingEof);
        }
        if !open_ifs.is_empty() {
            return Err(DecompileError::UnbalancedControlFlow {
                offset: eof_offset,
                reason: "IF without ENDIF",
            });
        }
        if found != self.instruction_count as usize {
            return Err(DecompileError::InstructionCountMismatch {
                declared: self.instruction_count as usize,
                found,
            });
        }
        for (offset, target) in jumps {
            let lands = usize::try_from(target)
                .map(|t| t > offset && boundaries.contains(&t))
                .unwrap_or(false);
            if !lands {
                return Err(DecompileError::BadJumpTarget {
                    offset,
                    target: target as i64,
                });
            }
        }
        Ok(())
    }
}

fn track_nesting(
    open_ifs: &mut Vec<bool>,
    offset: usize,
    opcode: Opcode,
) -> Result<(), DecompileError> {
    let unbalanced = |reason| DecompileError::UnbalancedControlFlow { offset, reason };
    match opcode {
        Opcode::If => open_ifs.push(false),
        Opcode::ElseIf => match open_ifs.last() {
            None => return Err(unbalanced("ELSEIF without IF")),
            Some(true) => return Err(unbalanced("ELSEIF after ELSE")),
            Some(false) => {}
        },
        Opcode::Else => match open_ifs.last_mut() {
            None => return Err(unbalanced("ELSE without IF")),
            Some(true) => return Err(unbalanced("ELSE after ELSE")),
            Some(else_seen) => *else_seen = true,
        },
        Opcode::EndIf => {
            if open_ifs.pop().is_none() {
                return Err(unbalanced("ENDIF without IF"));
            }
        }
        _ => {}
    }
    Ok(())
}
