//! The TM instruction set and the finished [`Listing`] handed to printers and to the machine.
use itertools::Itertools;
use std::fmt;

pub const REGISTER_COUNT: usize = 8;

/// TM has eight registers; the generator only gives a meaning to a few of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Primary accumulator
    Ac,
    /// Secondary accumulator
    Ac1,
    R2,
    R3,
    R4,
    /// Global pointer, never written, so globals are addressed absolutely
    Gp,
    /// Frame pointer; temporaries, locals and parameters are relative to it
    Mp,
    /// Program counter
    Pc,
}

impl Register {
    pub const fn index(self) -> usize {
        match self {
            Self::Ac => 0,
            Self::Ac1 => 1,
            Self::R2 => 2,
            Self::R3 => 3,
            Self::R4 => 4,
            Self::Gp => 5,
            Self::Mp => 6,
            Self::Pc => 7,
        }
    }
    pub const fn from_index(index: usize) -> Option<Self> {
        Some(match index {
            0 => Self::Ac,
            1 => Self::Ac1,
            2 => Self::R2,
            3 => Self::R3,
            4 => Self::R4,
            5 => Self::Gp,
            6 => Self::Mp,
            7 => Self::Pc,
            _ => return None,
        })
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Condition a conditional jump checks its register against zero with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Equals,
    NotEquals,
}

impl Condition {
    pub const fn holds(self, value: i32) -> bool {
        match self {
            Self::LessThan => value < 0,
            Self::LessEqual => value <= 0,
            Self::GreaterThan => value > 0,
            Self::GreaterEqual => value >= 0,
            Self::Equals => value == 0,
            Self::NotEquals => value != 0,
        }
    }
}

/// A position in the instruction stream that is only known later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    num: usize,
}

impl Label {
    /// Labels are handed out by [`crate::codegen::labels::LabelGenerator`], which keeps them
    /// unique per stream.
    pub(crate) const fn new(num: usize) -> Self {
        Self { num }
    }
    pub const fn index(self) -> usize {
        self.num
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, ".L{}", self.num)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    /// displacement that is added directly to the register
    Determined(i32),
    /// pc-relative displacement to a label, fixed when the stream is finished
    Label(Label),
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Determined(value) => write!(f, "{}", value),
            Self::Label(label) => write!(f, "{}", label),
        }
    }
}

/// `d(s)` addressing: register `s` plus displacement `d`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Memory {
    pub register: Register,
    pub offset: Offset,
}

impl Memory {
    pub const fn new(register: Register, offset: i32) -> Self {
        Self {
            register,
            offset: Offset::Determined(offset),
        }
    }
    /// Address of `label`, expressed relative to the program counter
    pub const fn label(label: Label) -> Self {
        Self {
            register: Register::Pc,
            offset: Offset::Label(label),
        }
    }
    pub const fn displacement(&self) -> Option<i32> {
        match self.offset {
            Offset::Determined(value) => Some(value),
            Offset::Label(_) => None,
        }
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.offset, self.register)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Halt,
    In,
    Out,
    Add,
    Sub,
    Mul,
    Div,
    Ld,
    St,
    Lda,
    Ldc,
    Jlt,
    Jle,
    Jgt,
    Jge,
    Jeq,
    Jne,
}

impl Opcode {
    pub const ALL: [Opcode; 17] = [
        Self::Halt,
        Self::In,
        Self::Out,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Ld,
        Self::St,
        Self::Lda,
        Self::Ldc,
        Self::Jlt,
        Self::Jle,
        Self::Jgt,
        Self::Jge,
        Self::Jeq,
        Self::Jne,
    ];

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Halt => "HALT",
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Ld => "LD",
            Self::St => "ST",
            Self::Lda => "LDA",
            Self::Ldc => "LDC",
            Self::Jlt => "JLT",
            Self::Jle => "JLE",
            Self::Jgt => "JGT",
            Self::Jge => "JGE",
            Self::Jeq => "JEQ",
            Self::Jne => "JNE",
        }
    }

    /// Register-only opcodes take `r,s,t`, every other one takes `r,d(s)`
    pub const fn is_register_only(self) -> bool {
        matches!(
            self,
            Self::Halt | Self::In | Self::Out | Self::Add | Self::Sub | Self::Mul | Self::Div
        )
    }

    const fn condition(self) -> Option<Condition> {
        Some(match self {
            Self::Jlt => Condition::LessThan,
            Self::Jle => Condition::LessEqual,
            Self::Jgt => Condition::GreaterThan,
            Self::Jge => Condition::GreaterEqual,
            Self::Jeq => Condition::Equals,
            Self::Jne => Condition::NotEquals,
            _ => return None,
        })
    }
}

impl From<Condition> for Opcode {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::LessThan => Self::Jlt,
            Condition::LessEqual => Self::Jle,
            Condition::GreaterThan => Self::Jgt,
            Condition::GreaterEqual => Self::Jge,
            Condition::Equals => Self::Jeq,
            Condition::NotEquals => Self::Jne,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Stop the machine
    Halt,
    /// Read an integer into a register
    In { target: Register },
    /// Print the contents of a register
    Out { source: Register },
    /// `target = lhs + rhs`
    Add {
        target: Register,
        lhs: Register,
        rhs: Register,
    },
    /// `target = lhs - rhs`
    Sub {
        target: Register,
        lhs: Register,
        rhs: Register,
    },
    /// `target = lhs * rhs`
    Mul {
        target: Register,
        lhs: Register,
        rhs: Register,
    },
    /// `target = lhs / rhs`, faults on a zero divisor
    Div {
        target: Register,
        lhs: Register,
        rhs: Register,
    },
    /// Load a register from memory
    Ld { target: Register, address: Memory },
    /// Store a register into memory
    St { source: Register, address: Memory },
    /// Load the address itself (also the way to jump: `LDA pc, ..`)
    Lda { target: Register, address: Memory },
    /// Load a constant
    Ldc { target: Register, value: i32 },
    /// Set the program counter to the address if the register satisfies the condition
    Jump {
        condition: Condition,
        register: Register,
        address: Memory,
    },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Halt => Opcode::Halt,
            Self::In { .. } => Opcode::In,
            Self::Out { .. } => Opcode::Out,
            Self::Add { .. } => Opcode::Add,
            Self::Sub { .. } => Opcode::Sub,
            Self::Mul { .. } => Opcode::Mul,
            Self::Div { .. } => Opcode::Div,
            Self::Ld { .. } => Opcode::Ld,
            Self::St { .. } => Opcode::St,
            Self::Lda { .. } => Opcode::Lda,
            Self::Ldc { .. } => Opcode::Ldc,
            Self::Jump { condition, .. } => Opcode::from(*condition),
        }
    }

    /// Builds a register-only instruction from its `r,s,t` encoding.
    pub const fn register_only(
        opcode: Opcode,
        r: Register,
        s: Register,
        t: Register,
    ) -> Option<Self> {
        Some(match opcode {
            Opcode::Halt => Self::Halt,
            Opcode::In => Self::In { target: r },
            Opcode::Out => Self::Out { source: r },
            Opcode::Add => Self::Add {
                target: r,
                lhs: s,
                rhs: t,
            },
            Opcode::Sub => Self::Sub {
                target: r,
                lhs: s,
                rhs: t,
            },
            Opcode::Mul => Self::Mul {
                target: r,
                lhs: s,
                rhs: t,
            },
            Opcode::Div => Self::Div {
                target: r,
                lhs: s,
                rhs: t,
            },
            _ => return None,
        })
    }

    /// Builds a register-memory instruction from its `r,d(s)` encoding.
    pub const fn register_memory(opcode: Opcode, r: Register, address: Memory) -> Option<Self> {
        if let Some(condition) = opcode.condition() {
            return Some(Self::Jump {
                condition,
                register: r,
                address,
            });
        }
        Some(match opcode {
            Opcode::Ld => Self::Ld { target: r, address },
            Opcode::St => Self::St { source: r, address },
            Opcode::Lda => Self::Lda { target: r, address },
            Opcode::Ldc => match address.displacement() {
                Some(value) => Self::Ldc { target: r, value },
                None => return None,
            },
            _ => return None,
        })
    }

    pub fn memory_mut(&mut self) -> Option<&mut Memory> {
        match self {
            Self::Ld { address, .. }
            | Self::St { address, .. }
            | Self::Lda { address, .. }
            | Self::Jump { address, .. } => Some(address),
            Self::Halt
            | Self::In { .. }
            | Self::Out { .. }
            | Self::Add { .. }
            | Self::Sub { .. }
            | Self::Mul { .. }
            | Self::Div { .. }
            | Self::Ldc { .. } => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let opcode = self.opcode();
        match *self {
            Self::Halt => write!(f, "{:>5}  0,0,0", opcode),
            Self::In { target: r } | Self::Out { source: r } => {
                write!(f, "{:>5}  {},0,0", opcode, r)
            }
            Self::Add { target, lhs, rhs }
            | Self::Sub { target, lhs, rhs }
            | Self::Mul { target, lhs, rhs }
            | Self::Div { target, lhs, rhs } => {
                write!(f, "{:>5}  {},{},{}", opcode, target, lhs, rhs)
            }
            Self::Ld {
                target: r,
                address,
            }
            | Self::St { source: r, address }
            | Self::Lda {
                target: r,
                address,
            }
            | Self::Jump {
                register: r,
                address,
                ..
            } => write!(f, "{:>5}  {},{}", opcode, r, address),
            Self::Ldc { target, value } => write!(f, "{:>5}  {},{}(0)", opcode, target, value),
        }
    }
}

/// Finished instruction sequence: every slot is written and every displacement determined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    instructions: Vec<Instruction>,
    remarks: Vec<String>,
    /// free-standing comments, by the position of the instruction they precede
    notes: Vec<(usize, String)>,
}

impl Listing {
    pub(crate) fn from_parts(
        instructions: Vec<Instruction>,
        remarks: Vec<String>,
        mut notes: Vec<(usize, String)>,
    ) -> Self {
        debug_assert_eq!(instructions.len(), remarks.len());
        notes.sort_by_key(|(position, _)| *position);
        Self {
            instructions,
            remarks,
            notes,
        }
    }
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
    pub fn len(&self) -> usize {
        self.instructions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
    pub fn remark(&self, index: usize) -> Option<&str> {
        self.remarks.get(index).map(String::as_str)
    }
    pub fn notes(&self) -> impl Iterator<Item = &str> {
        self.notes.iter().map(|(_, note)| note.as_str())
    }
    /// Index of the first instruction carrying exactly this remark
    pub fn find_remark(&self, remark: &str) -> Option<usize> {
        self.remarks.iter().position(|r| r == remark)
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut notes = self.notes.iter().peekable();
        let lines = self.instructions.iter().zip(&self.remarks).enumerate();
        for (index, (instruction, remark)) in lines {
            for (_, note) in notes.peeking_take_while(|(position, _)| *position <= index) {
                writeln!(f, "* {}", note)?;
            }
            writeln!(f, "{:3}:  {} \t{}", index, instruction, remark)?;
        }
        for (_, note) in notes {
            writeln!(f, "* {}", note)?;
        }
        Ok(())
    }
}
