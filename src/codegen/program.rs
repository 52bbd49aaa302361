use super::function::{compile_entry, compile_function, FunctionTable};
use super::{CodegenError, GenResult, GeneratorOptions, GeneratorState};
use crate::assembly::{Instruction, Listing, Memory, Register};
use crate::ast::{Item, Program, Statement, MAIN};
use crate::symtab::Resolver;

/// Global cells the program's top-level items account for. Sizes the function table.
pub fn global_footprint(program: &Program) -> usize {
    program.items.iter().map(Item::footprint).sum()
}

/// Generates the whole program.
///
/// Layout of the result: the two prelude instructions, the function table, every function in
/// declaration order, the top-level statements (if any) and a final `HALT`, which is where the
/// entry point returns to.
pub fn generate(
    program: &Program,
    resolver: &dyn Resolver,
    output_name: &str,
    options: &GeneratorOptions,
) -> GenResult<Listing> {
    let statements: Vec<&Statement> = program
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Statement(statement) => Some(statement),
            _ => None,
        })
        .collect();
    let has_main = program
        .items
        .iter()
        .any(|item| matches!(item, Item::Function(function) if function.name == MAIN));
    match (has_main, statements.is_empty()) {
        (true, false) => return Err(CodegenError::ConflictingEntry.into()),
        (false, true) => return Err(CodegenError::MissingEntry.into()),
        _ => {}
    }

    let mut state = GeneratorState::new(resolver, options);
    state.stream.comment("TINY Compilation to TM Code");
    state.stream.comment(format!("File: {}", output_name));
    state.stream.comment("Standard prelude:");
    state.stream.emit(
        Instruction::Ld {
            target: Register::Mp,
            address: Memory::new(Register::Ac, 0),
        },
        "load maxaddress from location 0",
    );
    state.stream.emit(
        Instruction::St {
            source: Register::Ac,
            address: Memory::new(Register::Ac, 0),
        },
        "clear location 0",
    );
    state.stream.comment("End of standard prelude.");

    let footprint = global_footprint(program);
    let mut table = FunctionTable::reserve(&mut state.stream, footprint);
    tracing::debug!(
        target: "codegen::program",
        "{} top-level items take {} global cells, function table has {} slots",
        program.items.len(),
        footprint,
        table.capacity()
    );

    let mut main_entry = None;
    for item in &program.items {
        match item {
            Item::Function(function) => {
                let entry = compile_function(&mut state, &mut table, function)
                    .map_err(|e| {
                        e.add_context(format!("generating function `{}`", function.name))
                    })?;
                if function.name == MAIN {
                    main_entry = Some(entry);
                }
            }
            Item::Variable(variable) => {
                tracing::trace!(
                    target: "codegen::program",
                    "global {:?} needs no code",
                    variable.name
                );
            }
            Item::Statement(_) => {}
        }
    }
    let main_entry = match main_entry {
        Some(entry) => entry,
        None => compile_entry(&mut state, &statements)
            .map_err(|e| e.add_context("generating top-level statements"))?,
    };
    table.finish(&mut state.stream, main_entry)?;

    state.stream.comment("End of execution.");
    state.stream.bind(state.exit)?;
    state.stream.emit(Instruction::Halt, "done");
    let listing = state.stream.finish()?;
    tracing::info!(
        target: "codegen::program",
        "generated {} instructions for {}",
        listing.len(),
        output_name
    );
    Ok(listing)
}
