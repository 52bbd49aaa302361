use super::expr::compile_expr;
use super::frame::{RETURN_ADDRESS, SAVED_FRAME};
use super::output::{InstructionStream, Reservation};
use super::statement::{compile_block, compile_statement};
use super::{CodegenError, GenE, GenResult, GeneratorState};
use crate::assembly::{Instruction, Memory, Register};
use crate::ast::{Expr, Function, Statement, Variable, MAIN};
use crate::symtab::Scope;

/// Code run right after the prelude that stores every function's entry address into its global
/// cell, then jumps to the entry point.
///
/// The table is reserved before any function is generated. Each generated function patches the
/// next two slots; [`FunctionTable::finish`] pads the rest with `HALT` and writes the dispatch
/// into the first slot left over.
#[derive(Debug)]
pub struct FunctionTable {
    reservation: Reservation,
    cursor: usize,
}

impl FunctionTable {
    /// Reserve `2 * declarations + 1` slots at the current position
    pub fn reserve(stream: &mut InstructionStream, declarations: usize) -> Self {
        let reservation = stream.reserve(2 * declarations + 1, "function table");
        Self {
            reservation,
            cursor: reservation.start,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.reservation.len
    }

    /// Record that `function` starts at `entry` and is called through global cell `slot`
    pub fn insert(
        &mut self,
        state: &mut GeneratorState,
        function: &str,
        entry: usize,
        slot: i32,
    ) -> GenResult<()> {
        // one slot always stays free for the dispatch
        if self.cursor + 2 >= self.reservation.end() {
            return Err(CodegenError::FunctionTableFull {
                capacity: self.capacity(),
            }
            .into());
        }
        let trace = state.options.trace_code;
        let mut patch = state.stream.patch(self.cursor);
        if trace {
            patch.comment(format!("function {} is at {}", function, slot));
        }
        patch.emit(
            Instruction::Ldc {
                target: Register::Ac,
                value: entry as i32,
            },
            format!("load function location({})", entry),
        )?;
        patch.emit(
            Instruction::St {
                source: Register::Ac,
                address: Memory::new(Register::Gp, slot),
            },
            "add into memory",
        )?;
        self.cursor = patch.position();
        Ok(())
    }

    /// Pad the unused slots and make the slot after the last entry jump to `main_entry`
    pub fn finish(self, stream: &mut InstructionStream, main_entry: usize) -> GenResult<()> {
        let dispatch = self.cursor;
        let mut patch = stream.patch(dispatch + 1);
        for _ in dispatch + 1..self.reservation.end() {
            patch.emit(Instruction::Halt, "unused function table entry")?;
        }
        drop(patch);
        stream.patch(dispatch).emit(
            Instruction::Ldc {
                target: Register::Pc,
                value: main_entry as i32,
            },
            "jump to main",
        )?;
        tracing::debug!(
            target: "codegen::function",
            "function table: {} of {} slots used, dispatch at {}",
            dispatch - self.reservation.start,
            self.capacity(),
            dispatch
        );
        Ok(())
    }
}

/// Generates `function` at the current position, registers it in the table and returns its
/// entry address.
pub fn compile_function(
    state: &mut GeneratorState,
    table: &mut FunctionTable,
    function: &Function,
) -> GenResult<usize> {
    let entry = state.stream.position();
    let slot = state
        .resolver
        .resolve_function_slot(&Scope::Global, &function.name)
        .map_err(|e| GenE::from(e).with_node(&function.name))?;
    table.insert(state, &function.name, entry, slot)?;
    tracing::debug!(
        target: "codegen::function",
        "`{}` enters at {}, table cell {}",
        function.name,
        entry,
        slot
    );

    state.trace(&format!("-> function {}", function.name));
    let marks = state.enter_frame(Scope::Function(function.name.clone()), function.name == MAIN);
    push_parameters(state, &function.name)?;
    push_locals(state, &function.locals)?;
    let local_slots = state.locals.frame_len() as i32;
    state.temporaries.enter_frame(-(1 + local_slots));
    compile_block(state, &function.body)?;
    // falling off the end returns whatever is in ac
    emit_return(state);
    state.leave_frame(marks);
    state.trace(&format!("<- function {}", function.name));
    Ok(entry)
}

/// Generates the statements given at the top level as the body of the entry point and returns
/// its entry address. They run in the prelude frame and see globals only.
pub fn compile_entry(state: &mut GeneratorState, statements: &[&Statement]) -> GenResult<usize> {
    let entry = state.stream.position();
    tracing::debug!(target: "codegen::function", "top-level statements enter at {}", entry);
    let marks = state.enter_frame(Scope::Global, true);
    state.temporaries.enter_frame(-1);
    for statement in statements {
        compile_statement(state, statement)?;
    }
    emit_return(state);
    state.leave_frame(marks);
    Ok(entry)
}

pub fn compile_call(state: &mut GeneratorState, callee: &str, arguments: &[Expr]) -> GenResult<()> {
    state.trace("-> call");
    let slot = state
        .resolver
        .resolve_function_slot(&state.scope, callee)
        .map_err(|e| GenE::from(e).with_node(callee))?;
    let count = push_arguments(state, arguments)?;
    let saved = state.temporaries.push()?;
    state.stream.emit(
        Instruction::St {
            source: Register::Mp,
            address: saved,
        },
        "call: save frame pointer",
    );
    let frame = state.temporaries.push()?;
    state.stream.emit(
        Instruction::Lda {
            target: Register::Mp,
            address: frame,
        },
        "call: enter callee frame",
    );
    state.stream.emit(
        Instruction::Lda {
            target: Register::Ac,
            address: Memory::new(Register::Pc, 2),
        },
        "call: compute return address",
    );
    state.stream.emit(
        Instruction::St {
            source: Register::Ac,
            address: Memory::new(Register::Mp, RETURN_ADDRESS),
        },
        "call: store return address",
    );
    state.stream.emit(
        Instruction::Ld {
            target: Register::Pc,
            address: Memory::new(Register::Gp, slot),
        },
        format!("call: jump to {}", callee),
    );
    for _ in 0..count + 2 {
        state.temporaries.pop();
    }
    state.trace("<- call");
    Ok(())
}

/// Stores the arguments into consecutive temporaries, the last one first, so argument `k` ends
/// up `k` slots above argument 0. Returns how many were pushed.
fn push_arguments(state: &mut GeneratorState, arguments: &[Expr]) -> GenResult<usize> {
    let Some((last, rest)) = arguments.split_last() else {
        return Ok(0);
    };
    compile_expr(state, last)?;
    let slot = state.temporaries.push()?;
    state.stream.emit(
        Instruction::St {
            source: Register::Ac,
            address: slot,
        },
        "op: push argument(reverse order)",
    );
    Ok(push_arguments(state, rest)? + 1)
}

/// Pushes the parameter names of `function` from the highest slot down, so that parameter `k`
/// ends up `k` entries from the top.
fn push_parameters(state: &mut GeneratorState, function: &str) -> GenResult<()> {
    let parameters = state.resolver.scope_parameters(function)?;
    let Some(highest) = parameters.iter().map(|(slot, _)| *slot).max() else {
        return Ok(());
    };
    let mut names: Vec<Option<&str>> = vec![None; highest + 1];
    for (slot, name) in &parameters {
        names[*slot] = Some(name.as_str());
    }
    for name in names.into_iter().rev() {
        state.parameters.push(name)?;
    }
    Ok(())
}

/// Locals go below the frame in declaration order; an array takes its length in slots and its
/// name sits on the lowest one.
fn push_locals(state: &mut GeneratorState, locals: &[Variable]) -> GenResult<()> {
    for local in locals {
        tracing::trace!(
            target: "codegen::function",
            "local {:?} takes {} slots",
            local.name,
            local.slots()
        );
        for _ in 1..local.slots() {
            state.locals.push(None)?;
        }
        state.locals.push(Some(local.name.as_str()))?;
    }
    Ok(())
}

/// Leaves the current function with ac as the result
pub fn emit_return(state: &mut GeneratorState) {
    if state.entry_point {
        let exit = state.exit;
        state.stream.emit(
            Instruction::Lda {
                target: Register::Pc,
                address: Memory::label(exit),
            },
            "return: jump to end of program",
        );
        return;
    }
    state.stream.emit(
        Instruction::Ld {
            target: Register::Ac1,
            address: Memory::new(Register::Mp, RETURN_ADDRESS),
        },
        "return: load return address",
    );
    state.stream.emit(
        Instruction::Ld {
            target: Register::Mp,
            address: Memory::new(Register::Mp, SAVED_FRAME),
        },
        "return: restore frame pointer",
    );
    state.stream.emit(
        Instruction::Lda {
            target: Register::Pc,
            address: Memory::new(Register::Ac1, 0),
        },
        "return: jump back",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::Listing;
    use crate::ast::{ArithmeticOp, Item, Program, Relational};
    use crate::codegen::testing::run_program;
    use crate::codegen::{generate, GeneratorOptions};
    use crate::symtab::SymbolTable;

    fn function(
        name: &str,
        parameters: &[&str],
        locals: Vec<Variable>,
        body: Vec<Statement>,
    ) -> Item {
        Item::Function(Function {
            name: name.into(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            locals,
            body,
        })
    }

    fn listing_of(program: &Program) -> anyhow::Result<Listing> {
        let symbols = SymbolTable::build(program)?;
        Ok(generate(program, &symbols, "call.tm", &Default::default())?)
    }

    /// `f(a, b, c)` writes its parameters in order; main calls `f(1, 2, 3)`
    fn three_arguments() -> Program {
        Program {
            items: vec![
                function(
                    "f",
                    &["a", "b", "c"],
                    vec![],
                    vec![
                        Statement::write(Expr::id("a")),
                        Statement::write(Expr::id("b")),
                        Statement::write(Expr::id("c")),
                    ],
                ),
                function(
                    MAIN,
                    &[],
                    vec![],
                    vec![Statement::Expression(Expr::call(
                        "f",
                        vec![1.into(), 2.into(), 3.into()],
                    ))],
                ),
            ],
        }
    }

    #[test]
    fn arguments_are_stored_last_first() -> anyhow::Result<()> {
        let listing = listing_of(&three_arguments())?;
        let stores: Vec<_> = listing
            .instructions()
            .iter()
            .enumerate()
            .filter(|(index, _)| listing.remark(*index) == Some("op: push argument(reverse order)"))
            .map(|(index, instruction)| (index, *instruction))
            .collect();
        assert_eq!(stores.len(), 3);
        let offsets: Vec<_> = stores
            .iter()
            .filter_map(|(_, instruction)| match instruction {
                Instruction::St { address, .. } => address.displacement(),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![-1, -2, -3]);
        // the highest slot holds the last argument
        assert_eq!(
            listing.instructions()[stores[0].0 - 1],
            Instruction::Ldc {
                target: Register::Ac,
                value: 3
            }
        );
        Ok(())
    }

    #[test]
    fn parameters_match_argument_positions() -> anyhow::Result<()> {
        assert_eq!(run_program(&three_arguments(), &[])?, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn recursive_factorial() -> anyhow::Result<()> {
        // fact(n): if n < 2 then return 1 else return n * fact(n - 1)
        let fact = function(
            "fact",
            &["n"],
            vec![],
            vec![Statement::If {
                test: Expr::binary(Relational::Less, Expr::id("n"), 2.into()),
                then_branch: vec![Statement::Return(Some(1.into()))],
                else_branch: vec![Statement::Return(Some(Expr::binary(
                    ArithmeticOp::Multiply,
                    Expr::id("n"),
                    Expr::call(
                        "fact",
                        vec![Expr::binary(ArithmeticOp::Subtract, Expr::id("n"), 1.into())],
                    ),
                )))],
            }],
        );
        let main = function(
            MAIN,
            &[],
            vec![Variable::scalar("x")],
            vec![
                Statement::read("x"),
                Statement::write(Expr::call("fact", vec![Expr::id("x")])),
            ],
        );
        let program = Program {
            items: vec![fact, main],
        };
        assert_eq!(run_program(&program, &[5])?, vec![120]);
        assert_eq!(run_program(&program, &[1])?, vec![1]);
        assert_eq!(run_program(&program, &[10])?, vec![3628800]);
        Ok(())
    }

    #[test]
    fn callee_may_follow_its_caller() -> anyhow::Result<()> {
        let program = Program {
            items: vec![
                function(
                    MAIN,
                    &[],
                    vec![],
                    vec![Statement::write(Expr::call("later", vec![4.into()]))],
                ),
                function(
                    "later",
                    &["n"],
                    vec![],
                    vec![Statement::Return(Some(Expr::binary(
                        ArithmeticOp::Multiply,
                        Expr::id("n"),
                        10.into(),
                    )))],
                ),
            ],
        };
        let listing = listing_of(&program)?;
        let entries: Vec<_> = (0..listing.len())
            .filter(|&i| {
                listing
                    .remark(i)
                    .map_or(false, |r| r.starts_with("load function location"))
            })
            .filter_map(|i| match listing.instructions()[i] {
                Instruction::Ldc { value, .. } => Some(value as usize),
                _ => None,
            })
            .collect();
        let call = listing.find_remark("call: jump to later");
        // main is emitted first, so the call is generated before `later` has an address
        assert_eq!(entries.len(), 2);
        assert!(call.map_or(false, |call| call < entries[1]));
        assert_eq!(run_program(&program, &[])?, vec![40]);
        Ok(())
    }

    #[test]
    fn locals_and_temporaries_survive_calls() -> anyhow::Result<()> {
        // sum(t) keeps a local array and calls square() on each element
        let square = function(
            "square",
            &["v"],
            vec![],
            vec![Statement::Return(Some(Expr::binary(
                ArithmeticOp::Multiply,
                Expr::id("v"),
                Expr::id("v"),
            )))],
        );
        let element = |i: i32| Expr::index("t", i.into());
        let total = Expr::binary(
            ArithmeticOp::Add,
            Expr::call("square", vec![element(0)]),
            Expr::binary(
                ArithmeticOp::Add,
                Expr::call("square", vec![element(1)]),
                Expr::call("square", vec![element(2)]),
            ),
        );
        let sum = function(
            "sum",
            &["base"],
            vec![Variable::scalar("i"), Variable::array("t", 3)],
            vec![
                Statement::assign("i", 0.into()),
                Statement::Repeat {
                    body: vec![
                        Statement::assign(
                            crate::ast::Place::element("t", Expr::id("i")),
                            Expr::binary(ArithmeticOp::Add, Expr::id("base"), Expr::id("i")),
                        ),
                        Statement::assign(
                            "i",
                            Expr::binary(ArithmeticOp::Add, Expr::id("i"), 1.into()),
                        ),
                    ],
                    test: Expr::binary(Relational::Equals, Expr::id("i"), 3.into()),
                },
                Statement::Return(Some(total)),
            ],
        );
        let main = function(
            MAIN,
            &[],
            vec![],
            vec![Statement::write(Expr::binary(
                ArithmeticOp::Add,
                100.into(),
                Expr::call("sum", vec![1.into()]),
            ))],
        );
        let program = Program {
            items: vec![square, sum, main],
        };
        // 1 + 4 + 9
        assert_eq!(run_program(&program, &[])?, vec![114]);
        Ok(())
    }

    #[test]
    fn table_overflow_is_reported() -> anyhow::Result<()> {
        let program = Program::default();
        let symbols = SymbolTable::build(&program)?;
        let options = GeneratorOptions::default();
        let mut state = GeneratorState::new(&symbols, &options);
        let mut table = FunctionTable::reserve(&mut state.stream, 1);
        assert_eq!(table.capacity(), 3);
        table.insert(&mut state, "f", 10, 0)?;
        let err = table.insert(&mut state, "g", 20, 1).unwrap_err();
        assert!(matches!(err.kind, CodegenError::FunctionTableFull { capacity: 3 }));
        table.finish(&mut state.stream, 10)?;
        let listing = state.stream.finish()?;
        assert_eq!(listing.remark(0), Some("load function location(10)"));
        assert_eq!(
            listing.instructions()[2],
            Instruction::Ldc {
                target: Register::Pc,
                value: 10
            }
        );
        Ok(())
    }
}
