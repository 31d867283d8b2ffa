//! Instruction emission and control-flow assembly.
//!
//! The [`Assembler`] appends encoded instructions to one buffer. Jump slots
//! are written as [`JUMP_PLACEHOLDER`] and recorded as fixups once their
//! destination is known; [`Assembler::finish`] patches them all after the
//! last line has been consumed.

use crate::error::{CompileError, CompileErrorKind};
use crate::ir::{ConditionRecord, Operation, INSTRUCTION_HEADER_LEN, JUMP_LEN, JUMP_PLACEHOLDER};

/// One open `if` block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BranchFrame {
    /// Source line of the opening `if`, for unterminated-block errors.
    if_line: usize,
    /// Jump slot of the most recent IF/ELSEIF. `None` once `else` is seen.
    false_branch: Option<usize>,
    else_seen: bool,
    /// GOTO slots that must land on this block's ENDIF.
    endif_sites: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fixup {
    site: usize,
    target: usize,
}

/// Output of a finished assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Assembled {
    pub instruction_count: u16,
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Assembler {
    code: Vec<u8>,
    instruction_count: usize,
    frames: Vec<BranchFrame>,
    fixups: Vec<Fixup>,
    placeholders: usize,
    verbose: bool,
}

impl Assembler {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }

    /// Current nesting depth of `if` blocks.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Append one instruction and return its offset.
    pub fn emit(&mut self, operation: &Operation) -> Result<usize, CompileErrorKind> {
        if self.instruction_count >= u16::MAX as usize {
            return Err(CompileErrorKind::TooManyInstructions);
        }

        let mut payload = Vec::new();
        operation.encode_payload(&mut payload);
        let length = u16::try_from(payload.len())
            .map_err(|_| CompileErrorKind::PayloadTooLarge(payload.len()))?;

        let offset = self.code.len();
        self.code.push(operation.opcode() as u8);
        self.code.extend_from_slice(&length.to_be_bytes());
        self.code.extend_from_slice(&payload);
        self.instruction_count += 1;
        if operation.jump_target() == Some(JUMP_PLACEHOLDER) {
            self.placeholders += 1;
        }

        if self.verbose {
            log::info!("{:>6}: {} ({} bytes)", offset, operation.opcode().name(), length);
        } else {
            log::trace!("{:>6}: {} ({} bytes)", offset, operation.opcode().name(), length);
        }
        Ok(offset)
    }

    pub fn begin_if(
        &mut self,
        line: usize,
        conditions: Vec<ConditionRecord>,
    ) -> Result<(), CompileErrorKind> {
        let (_, site) = self.emit_jump(&Operation::If {
            false_branch: JUMP_PLACEHOLDER,
            conditions,
        })?;
        self.frames.push(BranchFrame {
            if_line: line,
            false_branch: Some(site),
            else_seen: false,
            endif_sites: Vec::new(),
        });
        Ok(())
    }

    /// Close the previous branch with a GOTO to ENDIF, then test again.
    pub fn else_if(&mut self, conditions: Vec<ConditionRecord>) -> Result<(), CompileErrorKind> {
        match self.frames.last() {
            None => return Err(CompileErrorKind::ElseIfWithoutIf),
            Some(frame) if frame.else_seen => return Err(CompileErrorKind::ElseIfAfterElse),
            Some(_) => {}
        }

        let (_, goto_site) = self.emit_jump(&Operation::Goto(JUMP_PLACEHOLDER))?;
        let (here, false_site) = self.emit_jump(&Operation::ElseIf {
            false_branch: JUMP_PLACEHOLDER,
            conditions,
        })?;

        let frame = self.current_frame()?;
        frame.endif_sites.push(goto_site);
        let previous = frame.false_branch.replace(false_site);
        self.resolve(previous, here);
        Ok(())
    }

    /// Close the previous branch with a GOTO to ENDIF and open the fallback.
    pub fn else_(&mut self) -> Result<(), CompileErrorKind> {
        match self.frames.last() {
            None => return Err(CompileErrorKind::ElseWithoutIf),
            Some(frame) if frame.else_seen => return Err(CompileErrorKind::ElseAfterElse),
            Some(_) => {}
        }

        let (_, goto_site) = self.emit_jump(&Operation::Goto(JUMP_PLACEHOLDER))?;
        let here = self.emit(&Operation::Else)?;

        let frame = self.current_frame()?;
        frame.endif_sites.push(goto_site);
        frame.else_seen = true;
        let previous = frame.false_branch.take();
        self.resolve(previous, here);
        Ok(())
    }

    pub fn end_if(&mut self) -> Result<(), CompileErrorKind> {
        let frame = self
            .frames
            .pop()
            .ok_or(CompileErrorKind::EndIfWithoutIf)?;

        let here = self.code.len();
        self.resolve(frame.false_branch, here);
        for site in frame.endif_sites {
            self.resolve(Some(site), here);
        }
        self.emit(&Operation::EndIf)?;
        Ok(())
    }

    /// Emit EOF and patch every jump slot.
    ///
    /// An `if` still open at this point is reported at its opening line.
    pub fn finish(mut self, last_line: usize) -> Result<Assembled, CompileError> {
        if let Some(frame) = self.frames.last() {
            return Err(CompileError::new(
                frame.if_line,
                CompileErrorKind::UnterminatedIf,
            ));
        }
        let internal = |reason: String| CompileError::new(last_line, CompileErrorKind::Internal(reason));

        self.emit(&Operation::Eof)
            .map_err(|kind| CompileError::new(last_line, kind))?;

        for fixup in &self.fixups {
            let slot = self
                .code
                .get_mut(fixup.site..fixup.site + JUMP_LEN)
                .ok_or_else(|| internal(format!("jump slot {} out of range", fixup.site)))?;
            if slot[..] != JUMP_PLACEHOLDER.to_be_bytes()[..] {
                return Err(internal(format!("jump slot {} patched twice", fixup.site)));
            }
            let target = i32::try_from(fixup.target)
                .map_err(|_| internal(format!("jump target {} overflows", fixup.target)))?;
            slot.copy_from_slice(&target.to_be_bytes());
        }

        if self.fixups.len() != self.placeholders {
            return Err(internal(format!(
                "{} jump placeholders but {} fixups",
                self.placeholders,
                self.fixups.len()
            )));
        }

        let instruction_count = u16::try_from(self.instruction_count)
            .map_err(|_| CompileError::new(last_line, CompileErrorKind::TooManyInstructions))?;
        log::debug!(
            "assembled {} instructions, {} bytes, {} fixups",
            instruction_count,
            self.code.len(),
            self.fixups.len()
        );
        Ok(Assembled {
            instruction_count,
            code: self.code,
        })
    }

    /// Emit a jump instruction. Returns its offset and the position of its
    /// target slot in the code buffer.
    fn emit_jump(&mut self, operation: &Operation) -> Result<(usize, usize), CompileErrorKind> {
        let slot = operation.jump_slot().ok_or_else(|| {
            CompileErrorKind::Internal(format!("{} has no jump slot", operation.opcode().name()))
        })?;
        let offset = self.emit(operation)?;
        Ok((offset, offset + INSTRUCTION_HEADER_LEN + slot))
    }

    fn current_frame(&mut self) -> Result<&mut BranchFrame, CompileErrorKind> {
        self.frames
            .last_mut()
            .ok_or_else(|| CompileErrorKind::Internal("branch stack underflow".to_string()))
    }

    fn resolve(&mut self, site: Option<usize>, target: usize) {
        if let Some(site) = site {
            self.fixups.push(Fixup { site, target });
        }
    }
}
