use super::labels::LabelGenerator;
use crate::assembly::{Instruction, Label, Listing, Offset, Register};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("reserved slot {index} ({remark}) was never patched")]
    UnpatchedSlot { index: usize, remark: String },
    #[error("slot {0} is not a reserved slot and cannot be patched")]
    NotReserved(usize),
    #[error("label {0} was never bound")]
    UnboundLabel(Label),
    #[error("label {label} was already bound at {previous}")]
    LabelRebound { label: Label, previous: usize },
    #[error("label {0} does not belong to this stream")]
    ForeignLabel(Label),
    #[error("label {label} is addressed through register {register} instead of pc")]
    LabelNotPcRelative { label: Label, register: Register },
}

#[derive(Debug, Clone)]
enum Slot {
    Emitted {
        instruction: Instruction,
        remark: String,
    },
    Reserved {
        remark: String,
    },
}

/// A block of slots reserved by [`InstructionStream::reserve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub start: usize,
    pub len: usize,
}

impl Reservation {
    pub const fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Instructions in emission order. Appending is the normal mode; slots reserved up front can be
/// filled in later through a [`Patch`], and jumps may name [`Label`]s that are only bound later.
/// Nothing leaves the stream before [`InstructionStream::finish`] has checked that every slot is
/// written and every label bound.
#[derive(Debug, Default)]
pub struct InstructionStream {
    slots: Vec<Slot>,
    notes: Vec<(usize, String)>,
    labels: LabelGenerator,
}

impl InstructionStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next appended instruction will get
    pub fn position(&self) -> usize {
        self.slots.len()
    }

    pub fn emit(&mut self, instruction: Instruction, remark: impl Into<String>) -> usize {
        let index = self.position();
        self.slots.push(Slot::Emitted {
            instruction,
            remark: remark.into(),
        });
        index
    }

    /// Free-standing comment placed before the next appended instruction
    pub fn comment(&mut self, note: impl Into<String>) {
        let position = self.position();
        self.notes.push((position, note.into()));
    }

    pub fn reserve(&mut self, amount: usize, remark: &str) -> Reservation {
        let start = self.position();
        self.slots.extend((0..amount).map(|_| Slot::Reserved {
            remark: remark.to_string(),
        }));
        tracing::trace!(target: "codegen::output", "reserved {amount} slots at {start}");
        Reservation { start, len: amount }
    }

    /// Overwrite reserved slots starting at `at`. Appending resumes once the guard is dropped.
    pub fn patch(&mut self, at: usize) -> Patch<'_> {
        Patch {
            stream: self,
            start: at,
            cursor: at,
        }
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.new_label()
    }

    /// Bind `label` to the current position
    pub fn bind(&mut self, label: Label) -> Result<(), EmitError> {
        let position = self.position();
        self.labels.bind(label, position)
    }

    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        match self.slots.get(index)? {
            Slot::Emitted { instruction, .. } => Some(instruction),
            Slot::Reserved { .. } => None,
        }
    }

    pub fn is_reserved(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Slot::Reserved { .. }))
    }

    /// Resolve every label into a pc-relative displacement and hand out the listing.
    pub fn finish(self) -> Result<Listing, EmitError> {
        let mut instructions = Vec::with_capacity(self.slots.len());
        let mut remarks = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.into_iter().enumerate() {
            let (mut instruction, remark) = match slot {
                Slot::Reserved { remark } => return Err(EmitError::UnpatchedSlot { index, remark }),
                Slot::Emitted {
                    instruction,
                    remark,
                } => (instruction, remark),
            };
            if let Some(address) = instruction.memory_mut() {
                if let Offset::Label(label) = address.offset {
                    if address.register != Register::Pc {
                        return Err(EmitError::LabelNotPcRelative {
                            label,
                            register: address.register,
                        });
                    }
                    let target = self
                        .labels
                        .target(label)
                        .ok_or(EmitError::UnboundLabel(label))?;
                    // pc already points past the executing instruction
                    address.offset = Offset::Determined(target as i32 - (index as i32 + 1));
                }
            }
            instructions.push(instruction);
            remarks.push(remark);
        }
        Ok(Listing::from_parts(instructions, remarks, self.notes))
    }
}

/// Write cursor over previously reserved slots
pub struct Patch<'s> {
    stream: &'s mut InstructionStream,
    start: usize,
    cursor: usize,
}

impl Patch<'_> {
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn emit(
        &mut self,
        instruction: Instruction,
        remark: impl Into<String>,
    ) -> Result<usize, EmitError> {
        let index = self.cursor;
        let slot = self
            .stream
            .slots
            .get_mut(index)
            .filter(|slot| matches!(slot, Slot::Reserved { .. }))
            .ok_or(EmitError::NotReserved(index))?;
        *slot = Slot::Emitted {
            instruction,
            remark: remark.into(),
        };
        self.cursor += 1;
        Ok(index)
    }

    pub fn comment(&mut self, note: impl Into<String>) {
        self.stream.notes.push((self.cursor, note.into()));
    }
}

impl Drop for Patch<'_> {
    fn drop(&mut self) {
        tracing::trace!(
            target: "codegen::output",
            "patched {}..{}, appending resumes at {}",
            self.start,
            self.cursor,
            self.stream.position()
        );
    }
}
