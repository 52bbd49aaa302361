//! Single pass from the syntax tree to TM code.
//!
//! Everything that changes while walking the tree lives in [`GeneratorState`], which is passed
//! by `&mut` to every `compile_*` function. Expressions leave their value in `ac`; binary
//! operators park their left operand in a temporary below the current frame while the right one
//! is computed.
mod expr;
mod frame;
mod function;
pub mod labels;
mod output;
mod program;
mod stack;
mod statement;

pub use frame::{NameStack, FIRST_PARAMETER, RETURN_ADDRESS, SAVED_FRAME};
pub use function::FunctionTable;
pub use output::{EmitError, InstructionStream, Patch, Reservation};
pub use program::{generate, global_footprint};
pub use stack::TemporaryAllocator;

use crate::assembly::{Label, Memory, Register};
use crate::error;
use crate::symtab::{ResolveError, Resolver, Scope};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error("{stack} stack exhausted ({capacity} entries)")]
    NameStackExhausted { stack: &'static str, capacity: usize },
    #[error("temporary area exhausted ({capacity} slots)")]
    TemporariesExhausted { capacity: usize },
    #[error("function table is full ({capacity} slots)")]
    FunctionTableFull { capacity: usize },
    #[error("no entry point: declare `main` or give top-level statements")]
    MissingEntry,
    #[error("both a `main` function and top-level statements were given")]
    ConflictingEntry,
}

pub type GenE = error::Error<CodegenError>;
pub type GenResult<T> = Result<T, GenE>;

impl From<ResolveError> for GenE {
    fn from(e: ResolveError) -> Self {
        Self::new(e.into())
    }
}

impl From<EmitError> for GenE {
    fn from(e: EmitError) -> Self {
        Self::new(e.into())
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Surround the code of every node with `-> kind` / `<- kind` comments
    pub trace_code: bool,
    /// Entries each of the local and parameter name stacks can hold
    pub name_stack_capacity: usize,
    /// Temporaries a single frame may have in use at once
    pub temporary_capacity: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            trace_code: false,
            name_stack_capacity: 1024,
            temporary_capacity: 1024,
        }
    }
}

/// Marks returned by [`GeneratorState::enter_frame`]
#[derive(Debug)]
struct FrameMarks {
    locals: usize,
    parameters: usize,
    scope: Scope,
    entry_point: bool,
}

pub struct GeneratorState<'g> {
    resolver: &'g dyn Resolver,
    options: &'g GeneratorOptions,
    stream: InstructionStream,
    temporaries: TemporaryAllocator,
    locals: NameStack,
    parameters: NameStack,
    scope: Scope,
    /// bound at the final `HALT`
    exit: Label,
    /// `return` leaves the program instead of a called frame
    entry_point: bool,
}

impl<'g> GeneratorState<'g> {
    pub fn new(resolver: &'g dyn Resolver, options: &'g GeneratorOptions) -> Self {
        let mut stream = InstructionStream::new();
        let exit = stream.new_label();
        Self {
            resolver,
            options,
            stream,
            temporaries: TemporaryAllocator::new(options.temporary_capacity),
            locals: NameStack::new("local", options.name_stack_capacity),
            parameters: NameStack::new("parameter", options.name_stack_capacity),
            scope: Scope::Global,
            exit,
            entry_point: true,
        }
    }

    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    pub fn temporary_offset(&self) -> i32 {
        self.temporaries.offset()
    }

    fn trace(&mut self, note: &str) {
        if self.options.trace_code {
            self.stream.comment(note);
        }
    }

    /// Where `name` lives: the current frame's locals, then its parameters, then whatever the
    /// resolver knows.
    fn locate(&self, name: &str) -> GenResult<Memory> {
        if let Some(depth) = self.locals.offset_of(name) {
            let local_slots = self.locals.frame_len() as i32;
            return Ok(Memory::new(Register::Mp, depth as i32 - local_slots));
        }
        if let Some(depth) = self.parameters.offset_of(name) {
            return Ok(Memory::new(Register::Mp, FIRST_PARAMETER + depth as i32));
        }
        let location = self
            .resolver
            .resolve(&self.scope, name)
            .map_err(|e| GenE::from(e).with_node(name))?;
        Ok(Memory::new(Register::Gp, location))
    }

    fn enter_frame(&mut self, scope: Scope, entry_point: bool) -> FrameMarks {
        FrameMarks {
            locals: self.locals.enter(),
            parameters: self.parameters.enter(),
            scope: std::mem::replace(&mut self.scope, scope),
            entry_point: std::mem::replace(&mut self.entry_point, entry_point),
        }
    }

    fn leave_frame(&mut self, marks: FrameMarks) {
        self.temporaries.finalize();
        self.locals.leave(marks.locals);
        self.parameters.leave(marks.parameters);
        self.scope = marks.scope;
        self.entry_point = marks.entry_point;
    }
}
