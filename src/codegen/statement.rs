use super::expr::{compile_expr, element_address};
use super::function::emit_return;
use super::{GenResult, GeneratorState};
use crate::assembly::{Condition, Instruction, Memory, Register};
use crate::ast::{Expr, Place, Statement};

pub fn compile_block(state: &mut GeneratorState, statements: &[Statement]) -> GenResult<()> {
    for statement in statements {
        compile_statement(state, statement)?;
    }
    Ok(())
}

pub fn compile_statement(state: &mut GeneratorState, statement: &Statement) -> GenResult<()> {
    match statement {
        Statement::If {
            test,
            then_branch,
            else_branch,
        } => {
            state.trace("-> if");
            compile_expr(state, test)?;
            let else_start = state.stream.new_label();
            let end = state.stream.new_label();
            state.trace("if: jump to else belongs here");
            state.stream.emit(
                Instruction::Jump {
                    condition: Condition::Equals,
                    register: Register::Ac,
                    address: Memory::label(else_start),
                },
                "if: jmp to else",
            );
            compile_block(state, then_branch)?;
            state.trace("if: jump to end belongs here");
            state.stream.emit(
                Instruction::Lda {
                    target: Register::Pc,
                    address: Memory::label(end),
                },
                "jmp to end",
            );
            state.stream.bind(else_start)?;
            compile_block(state, else_branch)?;
            state.stream.bind(end)?;
            tracing::trace!(target: "codegen::stmt", "if: else at {else_start}, end at {end}");
            state.trace("<- if");
        }
        Statement::Repeat { body, test } => {
            state.trace("-> repeat");
            let top = state.stream.new_label();
            state.trace("repeat: jump after body comes back here");
            state.stream.bind(top)?;
            compile_block(state, body)?;
            compile_expr(state, test)?;
            state.stream.emit(
                Instruction::Jump {
                    condition: Condition::Equals,
                    register: Register::Ac,
                    address: Memory::label(top),
                },
                "repeat: jmp back to body",
            );
            state.trace("<- repeat");
        }
        Statement::Assign { target, value } => {
            state.trace("-> assign");
            compile_assign(state, target, value)
                .map_err(|e| e.with_backup_node(format!("{} := ..", target)))?;
            state.trace("<- assign");
        }
        Statement::Read { target } => {
            state.trace("-> read");
            compile_read(state, target)
                .map_err(|e| e.with_backup_node(format!("read {}", target)))?;
            state.trace("<- read");
        }
        Statement::Write { value } => {
            state.trace("-> write");
            compile_expr(state, value)?;
            state.stream.emit(Instruction::Out { source: Register::Ac }, "write ac");
            state.trace("<- write");
        }
        Statement::Return(value) => {
            state.trace("-> return");
            if let Some(value) = value {
                compile_expr(state, value)?;
            }
            emit_return(state);
            state.trace("<- return");
        }
        Statement::Expression(expr) => compile_expr(state, expr)?,
    }
    Ok(())
}

fn compile_assign(state: &mut GeneratorState, target: &Place, value: &Expr) -> GenResult<()> {
    let address = match &target.index {
        None => {
            compile_expr(state, value)?;
            state.locate(&target.name)?
        }
        Some(index) => {
            compile_expr(state, index)?;
            let slot = state.temporaries.push()?;
            state.stream.emit(
                Instruction::St {
                    source: Register::Ac,
                    address: slot,
                },
                "assign: push index",
            );
            compile_expr(state, value)?;
            let slot = state.temporaries.pop();
            state.stream.emit(
                Instruction::Ld {
                    target: Register::Ac1,
                    address: slot,
                },
                "assign: load index",
            );
            element_address(state, &target.name, Register::Ac1, Register::Ac1)?
        }
    };
    state.stream.emit(
        Instruction::St {
            source: Register::Ac,
            address,
        },
        "assign: store value",
    );
    Ok(())
}

fn compile_read(state: &mut GeneratorState, target: &Place) -> GenResult<()> {
    let address = match &target.index {
        None => state.locate(&target.name)?,
        Some(index) => {
            compile_expr(state, index)?;
            element_address(state, &target.name, Register::Ac, Register::Ac1)?
        }
    };
    state.stream.emit(Instruction::In { target: Register::Ac }, "read integer value");
    state.stream.emit(
        Instruction::St {
            source: Register::Ac,
            address,
        },
        "read: store value",
    );
    Ok(())
}
