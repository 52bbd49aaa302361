//! A TM machine that runs finished listings.
//!
//! Semantics follow the classic TM simulator: all registers start at zero, data cell 0 holds the
//! highest data address, the program counter is advanced before an instruction executes, and
//! instruction memory past the program is filled with `HALT`.
mod loader;

pub use loader::{load_listing, LoadError, MAX_LOCATION};

use crate::assembly::{Instruction, Listing, Memory, Offset, Register, REGISTER_COUNT};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub instruction_memory: usize,
    pub data_memory: usize,
    /// Give up after this many instructions
    pub step_limit: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            instruction_memory: 1024,
            data_memory: 1024,
            step_limit: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("program of {len} instructions does not fit into {capacity} instruction cells")]
    ProgramTooLarge { len: usize, capacity: usize },
    #[error("instruction memory fault: pc = {0}")]
    InstructionFault(i32),
    #[error("data memory fault at {pc}: address {address}")]
    DataFault { pc: usize, address: i32 },
    #[error("division by zero at {0}")]
    DivisionByZero(usize),
    #[error("no input left for IN at {0}")]
    InputExhausted(usize),
    #[error("unresolved label in instruction {0}")]
    UnresolvedLabel(usize),
    #[error("step limit of {0} reached")]
    StepLimit(u64),
}

/// Where `IN` reads from and `OUT` writes to
pub trait Console {
    fn read(&mut self) -> Option<i32>;
    fn write(&mut self, value: i32);
}

/// Console fed from a fixed input list that keeps everything written
#[derive(Debug, Default)]
pub struct BufferedConsole {
    input: VecDeque<i32>,
    output: Vec<i32>,
}

impl BufferedConsole {
    pub fn new(input: impl IntoIterator<Item = i32>) -> Self {
        Self {
            input: input.into_iter().collect(),
            output: Vec::new(),
        }
    }
    pub fn output(&self) -> &[i32] {
        &self.output
    }
    pub fn into_output(self) -> Vec<i32> {
        self.output
    }
}

impl Console for BufferedConsole {
    fn read(&mut self) -> Option<i32> {
        self.input.pop_front()
    }
    fn write(&mut self, value: i32) {
        self.output.push(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
}

#[derive(Debug)]
pub struct Machine {
    config: MachineConfig,
    instructions: Vec<Instruction>,
    registers: [i32; REGISTER_COUNT],
    data: Vec<i32>,
    steps: u64,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        let mut machine = Self {
            instructions: vec![Instruction::Halt; config.instruction_memory],
            registers: [0; REGISTER_COUNT],
            data: vec![0; config.data_memory],
            steps: 0,
            config,
        };
        machine.reset();
        machine
    }

    /// Clear registers and data memory; the program stays loaded
    pub fn reset(&mut self) {
        self.registers = [0; REGISTER_COUNT];
        self.data.iter_mut().for_each(|cell| *cell = 0);
        if let Some(first) = self.data.first_mut() {
            *first = self.config.data_memory as i32 - 1;
        }
        self.steps = 0;
    }

    pub fn load(&mut self, listing: &Listing) -> Result<(), VmError> {
        let program = listing.instructions();
        if program.len() > self.config.instruction_memory {
            return Err(VmError::ProgramTooLarge {
                len: program.len(),
                capacity: self.config.instruction_memory,
            });
        }
        self.instructions.fill(Instruction::Halt);
        self.instructions[..program.len()].copy_from_slice(program);
        log::debug!("loaded {} instructions", program.len());
        self.reset();
        Ok(())
    }

    pub fn register(&self, register: Register) -> i32 {
        self.registers[register.index()]
    }

    pub fn data(&self, address: usize) -> Option<i32> {
        self.data.get(address).copied()
    }

    /// Instructions executed since the last reset
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    fn set(&mut self, register: Register, value: i32) {
        self.registers[register.index()] = value;
    }

    fn effective(&self, address: Memory, pc: usize) -> Result<i32, VmError> {
        match address.offset {
            Offset::Determined(displacement) => {
                Ok(displacement.wrapping_add(self.register(address.register)))
            }
            Offset::Label(_) => Err(VmError::UnresolvedLabel(pc)),
        }
    }

    fn cell(&self, address: i32, pc: usize) -> Result<usize, VmError> {
        usize::try_from(address)
            .ok()
            .filter(|&cell| cell < self.data.len())
            .ok_or(VmError::DataFault { pc, address })
    }

    /// Execute a single instruction
    pub fn step(&mut self, console: &mut dyn Console) -> Result<Status, VmError> {
        let pc = self.register(Register::Pc);
        let index = usize::try_from(pc)
            .ok()
            .filter(|&index| index < self.instructions.len())
            .ok_or(VmError::InstructionFault(pc))?;
        let instruction = self.instructions[index];
        self.set(Register::Pc, pc + 1);
        self.steps += 1;
        log::trace!("{:3}: {}", index, instruction);

        match instruction {
            Instruction::Halt => return Ok(Status::Halted),
            Instruction::In { target } => {
                let value = console.read().ok_or(VmError::InputExhausted(index))?;
                self.set(target, value);
            }
            Instruction::Out { source } => console.write(self.register(source)),
            Instruction::Add { target, lhs, rhs } => {
                self.set(target, self.register(lhs).wrapping_add(self.register(rhs)))
            }
            Instruction::Sub { target, lhs, rhs } => {
                self.set(target, self.register(lhs).wrapping_sub(self.register(rhs)))
            }
            Instruction::Mul { target, lhs, rhs } => {
                self.set(target, self.register(lhs).wrapping_mul(self.register(rhs)))
            }
            Instruction::Div { target, lhs, rhs } => {
                let divisor = self.register(rhs);
                if divisor == 0 {
                    return Err(VmError::DivisionByZero(index));
                }
                self.set(target, self.register(lhs).wrapping_div(divisor));
            }
            Instruction::Ld { target, address } => {
                let cell = self.cell(self.effective(address, index)?, index)?;
                self.set(target, self.data[cell]);
            }
            Instruction::St { source, address } => {
                let cell = self.cell(self.effective(address, index)?, index)?;
                self.data[cell] = self.register(source);
            }
            Instruction::Lda { target, address } => {
                let value = self.effective(address, index)?;
                self.set(target, value);
            }
            Instruction::Ldc { target, value } => self.set(target, value),
            Instruction::Jump {
                condition,
                register,
                address,
            } => {
                if condition.holds(self.register(register)) {
                    let target = self.effective(address, index)?;
                    self.set(Register::Pc, target);
                }
            }
        }
        Ok(Status::Running)
    }

    /// Run until `HALT`. Returns the number of instructions executed.
    pub fn run(&mut self, console: &mut dyn Console) -> Result<u64, VmError> {
        loop {
            if let Some(limit) = self.config.step_limit {
                if self.steps >= limit {
                    return Err(VmError::StepLimit(limit));
                }
            }
            if self.step(console)? == Status::Halted {
                log::debug!("halted after {} steps", self.steps);
                return Ok(self.steps);
            }
        }
    }
}
