use super::function::compile_call;
use super::{GenResult, GeneratorState};
use crate::assembly::{Condition, Instruction, Memory, Register};
use crate::ast::{ArithmeticOp, BinaryOp, Expr, Relational};

/// Leaves the value of `expr` in `ac`. Temporaries used on the way are released again.
pub fn compile_expr(state: &mut GeneratorState, expr: &Expr) -> GenResult<()> {
    let offset = state.temporaries.offset();
    match expr {
        Expr::Constant(value) => {
            state.trace("-> Const");
            state.stream.emit(
                Instruction::Ldc {
                    target: Register::Ac,
                    value: *value,
                },
                "load const",
            );
            state.trace("<- Const");
        }
        Expr::Identifier(name) => {
            state.trace("-> Id");
            let address = state.locate(name)?;
            state.stream.emit(
                Instruction::Ld {
                    target: Register::Ac,
                    address,
                },
                "load id value",
            );
            state.trace("<- Id");
        }
        Expr::Index { name, index } => {
            state.trace("-> Index");
            compile_expr(state, index)?;
            let address = element_address(state, name, Register::Ac, Register::Ac)?;
            state.stream.emit(
                Instruction::Ld {
                    target: Register::Ac,
                    address,
                },
                "load array element",
            );
            state.trace("<- Index");
        }
        Expr::Binary { operator, lhs, rhs } => compile_binary(state, *operator, lhs, rhs)?,
        Expr::Call { callee, arguments } => compile_call(state, callee, arguments)?,
    }
    debug_assert_eq!(
        offset,
        state.temporaries.offset(),
        "expression left the temporaries unbalanced"
    );
    Ok(())
}

/// Address of element `index` of array `name`, where the index is held in `index`.
/// Emits `ADD target, index, base` and returns the element's address relative to `target`.
pub(super) fn element_address(
    state: &mut GeneratorState,
    name: &str,
    index: Register,
    target: Register,
) -> GenResult<Memory> {
    let base = state.locate(name)?;
    state.stream.emit(
        Instruction::Add {
            target,
            lhs: index,
            rhs: base.register,
        },
        format!("index: add base of {}", name),
    );
    Ok(Memory {
        register: target,
        offset: base.offset,
    })
}

fn compile_binary(
    state: &mut GeneratorState,
    operator: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
) -> GenResult<()> {
    state.trace("-> Op");
    compile_expr(state, lhs)?;
    let slot = state.temporaries.push()?;
    state.stream.emit(
        Instruction::St {
            source: Register::Ac,
            address: slot,
        },
        "op: push left",
    );
    compile_expr(state, rhs)?;
    let slot = state.temporaries.pop();
    state.stream.emit(
        Instruction::Ld {
            target: Register::Ac1,
            address: slot,
        },
        "op: load left",
    );

    // ac1 holds the left operand, ac the right one
    let (target, lhs, rhs) = (Register::Ac, Register::Ac1, Register::Ac);
    let remark = format!("op {}", operator);
    match operator {
        BinaryOp::Arithmetic(op) => {
            let instruction = match op {
                ArithmeticOp::Add => Instruction::Add { target, lhs, rhs },
                ArithmeticOp::Subtract => Instruction::Sub { target, lhs, rhs },
                ArithmeticOp::Multiply => Instruction::Mul { target, lhs, rhs },
                ArithmeticOp::Divide => Instruction::Div { target, lhs, rhs },
                ArithmeticOp::Modulo => {
                    tracing::warn!(
                        target: "codegen::expr",
                        "no TM lowering for operator `{}`",
                        operator
                    );
                    state.stream.comment("BUG: Unknown operator");
                    state.trace("<- Op");
                    return Ok(());
                }
            };
            state.stream.emit(instruction, remark);
        }
        BinaryOp::Relational(op) => {
            state.stream.emit(Instruction::Sub { target, lhs, rhs }, remark);
            state.stream.emit(
                Instruction::Jump {
                    condition: condition_of(op),
                    register: Register::Ac,
                    address: Memory::new(Register::Pc, 2),
                },
                "br if true",
            );
            state.stream.emit(
                Instruction::Ldc {
                    target: Register::Ac,
                    value: 0,
                },
                "false case",
            );
            state.stream.emit(
                Instruction::Lda {
                    target: Register::Pc,
                    address: Memory::new(Register::Pc, 1),
                },
                "unconditional jmp",
            );
            state.stream.emit(
                Instruction::Ldc {
                    target: Register::Ac,
                    value: 1,
                },
                "true case",
            );
        }
    }
    state.trace("<- Op");
    Ok(())
}

/// `lhs - rhs` satisfies the returned condition exactly when `lhs op rhs` holds
const fn condition_of(op: Relational) -> Condition {
    match op {
        Relational::Less => Condition::LessThan,
        Relational::LessEqual => Condition::LessEqual,
        Relational::Greater => Condition::GreaterThan,
        Relational::GreaterEqual => Condition::GreaterEqual,
        Relational::Equals => Condition::Equals,
        Relational::NotEquals => Condition::NotEquals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Item, Program, Statement, Variable};
    use crate::codegen::testing::run_program;
    use crate::codegen::GeneratorOptions;
    use crate::symtab::SymbolTable;

    fn globals(names: &[&str]) -> anyhow::Result<SymbolTable> {
        let program = Program {
            items: names
                .iter()
                .map(|name| Item::Variable(Variable::scalar(*name)))
                .collect(),
        };
        Ok(SymbolTable::build(&program)?)
    }

    fn writes(values: Vec<Expr>) -> Program {
        Program {
            items: values
                .into_iter()
                .map(|value| Item::Statement(Statement::write(value)))
                .collect(),
        }
    }

    #[test]
    fn nested_operators_leave_temporaries_balanced() -> anyhow::Result<()> {
        let symbols = globals(&["x", "y"])?;
        let options = GeneratorOptions::default();
        let mut state = GeneratorState::new(&symbols, &options);
        state.temporaries.enter_frame(-1);
        // (x + 1) * (y - (2 / x))
        let expr = Expr::binary(
            ArithmeticOp::Multiply,
            Expr::binary(ArithmeticOp::Add, Expr::id("x"), 1.into()),
            Expr::binary(
                ArithmeticOp::Subtract,
                Expr::id("y"),
                Expr::binary(ArithmeticOp::Divide, 2.into(), Expr::id("x")),
            ),
        );
        compile_expr(&mut state, &expr)?;
        assert_eq!(state.temporary_offset(), -1);
        // the innermost left operand was parked two slots deep
        let deepest = (0..state.stream.position())
            .filter_map(|i| match state.stream.instruction(i) {
                Some(Instruction::St { address, .. }) => address.displacement(),
                _ => None,
            })
            .min();
        assert_eq!(deepest, Some(-3));
        Ok(())
    }

    #[test]
    fn relational_operators_branch_over_the_false_case() -> anyhow::Result<()> {
        let symbols = globals(&[])?;
        let options = GeneratorOptions::default();
        let mut state = GeneratorState::new(&symbols, &options);
        state.temporaries.enter_frame(-1);
        compile_expr(&mut state, &Expr::binary(Relational::Less, 1.into(), 2.into()))?;
        let emitted: Vec<_> = (0..state.stream.position())
            .filter_map(|i| state.stream.instruction(i).copied())
            .collect();
        assert_eq!(emitted.len(), 9);
        assert_eq!(
            emitted[4],
            Instruction::Sub {
                target: Register::Ac,
                lhs: Register::Ac1,
                rhs: Register::Ac
            }
        );
        assert_eq!(
            emitted[5],
            Instruction::Jump {
                condition: Condition::LessThan,
                register: Register::Ac,
                address: Memory::new(Register::Pc, 2),
            }
        );
        assert_eq!(
            emitted[8],
            Instruction::Ldc {
                target: Register::Ac,
                value: 1
            }
        );
        Ok(())
    }

    #[test]
    fn arithmetic_keeps_operand_order() -> anyhow::Result<()> {
        let program = writes(vec![
            Expr::binary(ArithmeticOp::Subtract, 10.into(), 4.into()),
            Expr::binary(ArithmeticOp::Divide, 17.into(), 5.into()),
            Expr::binary(
                ArithmeticOp::Multiply,
                Expr::binary(ArithmeticOp::Subtract, 7.into(), 2.into()),
                3.into(),
            ),
        ]);
        assert_eq!(run_program(&program, &[])?, vec![6, 3, 15]);
        Ok(())
    }

    #[test]
    fn every_comparison_yields_zero_or_one() -> anyhow::Result<()> {
        let compare = |op: Relational, lhs: i32, rhs: i32| Expr::binary(op, lhs.into(), rhs.into());
        let program = writes(vec![
            compare(Relational::Less, 1, 2),
            compare(Relational::Less, 2, 2),
            compare(Relational::LessEqual, 2, 2),
            compare(Relational::Greater, 3, 2),
            compare(Relational::GreaterEqual, 1, 2),
            compare(Relational::Equals, 4, 4),
            compare(Relational::NotEquals, 4, 4),
        ]);
        assert_eq!(run_program(&program, &[])?, vec![1, 0, 1, 1, 0, 1, 0]);
        Ok(())
    }

    #[test]
    fn unknown_operator_only_leaves_a_comment() -> anyhow::Result<()> {
        let symbols = globals(&[])?;
        let options = GeneratorOptions::default();
        let mut state = GeneratorState::new(&symbols, &options);
        state.temporaries.enter_frame(-1);
        compile_expr(&mut state, &Expr::binary(ArithmeticOp::Modulo, 7.into(), 3.into()))?;
        // both operands, the push and the pop, but no operation
        assert_eq!(state.stream.position(), 4);
        assert_eq!(state.temporary_offset(), -1);
        let listing = state.stream.finish()?;
        assert!(listing.notes().any(|note| note == "BUG: Unknown operator"));
        Ok(())
    }
}
