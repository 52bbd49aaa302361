//! Reads TM text back into a [`Listing`].
//!
//! Accepts the format the listing printer writes: `*` comment lines and `loc: OP operands remark`
//! instruction lines. Locations may come in any order; gaps are filled with `HALT`.
use crate::assembly::{Instruction, Listing, Memory, Opcode, Register};
use itertools::Itertools;
use lazy_static::lazy_static;
use std::collections::HashMap;
use thiserror::Error;

lazy_static! {
    static ref OPCODES: HashMap<&'static str, Opcode> =
        Opcode::ALL.iter().map(|&opcode| (opcode.mnemonic(), opcode)).collect();
}

/// Highest instruction location a listing may name
pub const MAX_LOCATION: usize = (1 << 20) - 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("line {line}: bad location `{text}`")]
    BadLocation { line: usize, text: String },
    #[error("line {line}: unknown opcode `{text}`")]
    UnknownOpcode { line: usize, text: String },
    #[error("line {line}: bad operands `{text}`")]
    BadOperands { line: usize, text: String },
    #[error("line {line}: location {location} is given twice")]
    DuplicateLocation { line: usize, location: usize },
}

pub fn load_listing(text: &str) -> Result<Listing, LoadError> {
    let mut slots: Vec<Option<(Instruction, String)>> = Vec::new();
    let mut notes = Vec::new();
    let mut pending = Vec::new();

    for (number, raw) in text.lines().enumerate() {
        let line = number + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(note) = trimmed.strip_prefix('*') {
            pending.push(note.trim().to_string());
            continue;
        }

        let (location, rest) = trimmed.split_once(':').ok_or_else(|| LoadError::BadLocation {
            line,
            text: trimmed.to_string(),
        })?;
        let bad_location = || LoadError::BadLocation {
            line,
            text: location.trim().to_string(),
        };
        let location: usize = location.trim().parse().map_err(|_| bad_location())?;
        let cells = location
            .checked_add(1)
            .filter(|&cells| cells <= MAX_LOCATION + 1)
            .ok_or_else(bad_location)?;
        let (instruction, remark) = parse_instruction(line, rest)?;

        if slots.len() < cells {
            slots.resize(cells, None);
        }
        if slots[location].is_some() {
            return Err(LoadError::DuplicateLocation { line, location });
        }
        slots[location] = Some((instruction, remark));
        notes.extend(pending.drain(..).map(|note| (location, note)));
    }
    let end = slots.len();
    notes.extend(pending.into_iter().map(|note| (end, note)));

    let (instructions, remarks): (Vec<_>, Vec<_>) = slots
        .into_iter()
        .map(|slot| slot.unwrap_or((Instruction::Halt, String::new())))
        .unzip();
    log::debug!("loaded {} instruction cells", end);
    Ok(Listing::from_parts(instructions, remarks, notes))
}

fn parse_instruction(line: usize, text: &str) -> Result<(Instruction, String), LoadError> {
    let text = text.trim_start();
    let (mnemonic, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let opcode = *OPCODES
        .get(mnemonic.to_ascii_uppercase().as_str())
        .ok_or_else(|| LoadError::UnknownOpcode {
            line,
            text: mnemonic.to_string(),
        })?;
    let rest = rest.trim_start();
    let (operands, remark) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let bad_operands = || LoadError::BadOperands {
        line,
        text: operands.to_string(),
    };

    let instruction = if opcode.is_register_only() {
        let registers: Option<Vec<Register>> = operands.split(',').map(register).collect();
        let (r, s, t) = registers
            .and_then(|registers| registers.into_iter().collect_tuple())
            .ok_or_else(bad_operands)?;
        Instruction::register_only(opcode, r, s, t)
    } else {
        let (r, address) = operands.split_once(',').ok_or_else(bad_operands)?;
        let (displacement, base) = address
            .strip_suffix(')')
            .and_then(|address| address.split_once('('))
            .ok_or_else(bad_operands)?;
        let displacement: i32 = displacement.trim().parse().map_err(|_| bad_operands())?;
        let r = register(r).ok_or_else(bad_operands)?;
        let base = register(base).ok_or_else(bad_operands)?;
        Instruction::register_memory(opcode, r, Memory::new(base, displacement))
    }
    .ok_or_else(bad_operands)?;
    Ok((instruction, remark.trim().to_string()))
}

fn register(text: &str) -> Option<Register> {
    text.trim().parse().ok().and_then(Register::from_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ArithmeticOp, Expr, Function, Item, Program, Relational, Statement, MAIN};
    use crate::codegen::generate;
    use crate::symtab::SymbolTable;
    use crate::vm::{BufferedConsole, Machine, MachineConfig};

    fn run(listing: &Listing, input: &[i32]) -> anyhow::Result<Vec<i32>> {
        let mut machine = Machine::new(MachineConfig::default());
        machine.load(listing)?;
        let mut console = BufferedConsole::new(input.iter().copied());
        machine.run(&mut console)?;
        Ok(console.into_output())
    }

    #[test]
    fn printed_listing_loads_back_and_runs_the_same() -> anyhow::Result<()> {
        let double = Item::Function(Function {
            name: "double".into(),
            parameters: vec!["n".into()],
            locals: vec![],
            body: vec![Statement::Return(Some(Expr::binary(
                ArithmeticOp::Add,
                Expr::id("n"),
                Expr::id("n"),
            )))],
        });
        let main = Item::Function(Function {
            name: MAIN.into(),
            parameters: vec![],
            locals: vec![crate::ast::Variable::scalar("x")],
            body: vec![
                Statement::read("x"),
                Statement::If {
                    test: Expr::binary(Relational::Greater, Expr::id("x"), 10.into()),
                    then_branch: vec![Statement::write(Expr::call("double", vec![Expr::id("x")]))],
                    else_branch: vec![Statement::write(Expr::id("x"))],
                },
            ],
        });
        let program = Program {
            items: vec![double, main],
        };
        let symbols = SymbolTable::build(&program)?;
        let options = crate::codegen::GeneratorOptions {
            trace_code: true,
            ..Default::default()
        };
        let listing = generate(&program, &symbols, "round.tm", &options)?;
        let loaded = load_listing(&listing.to_string())?;
        assert_eq!(loaded, listing);
        for input in [3, 21] {
            assert_eq!(run(&loaded, &[input])?, run(&listing, &[input])?);
        }
        assert_eq!(run(&loaded, &[21])?, vec![42]);
        Ok(())
    }

    #[test]
    fn hand_written_text_is_accepted() -> anyhow::Result<()> {
        let text = "* hand assembled\n\
                    2:  out 0,0,0\n\
                    0:  IN  0,0,0   read\n\
                    1:  LDA 7,-2(7)\n";
        let listing = load_listing(text)?;
        assert_eq!(listing.len(), 3);
        assert_eq!(listing.remark(0), Some("read"));
        assert_eq!(
            listing.instructions()[1],
            Instruction::Lda {
                target: Register::Pc,
                address: Memory::new(Register::Pc, -2)
            }
        );
        assert_eq!(listing.notes().collect::<Vec<_>>(), ["hand assembled"]);
        Ok(())
    }

    #[test]
    fn highest_location_is_accepted() -> anyhow::Result<()> {
        let listing = load_listing(&format!("{}: OUT 0,0,0", MAX_LOCATION))?;
        assert_eq!(listing.len(), MAX_LOCATION + 1);
        assert_eq!(listing.instructions()[0], Instruction::Halt);
        Ok(())
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert_eq!(
            load_listing("0: JUMP 0,0(0)").unwrap_err(),
            LoadError::UnknownOpcode {
                line: 1,
                text: "JUMP".into()
            }
        );
        assert_eq!(
            load_listing("0: LD 0,0,0").unwrap_err(),
            LoadError::BadOperands {
                line: 1,
                text: "0,0,0".into()
            }
        );
        assert_eq!(
            load_listing("0: ADD 0,9,0").unwrap_err(),
            LoadError::BadOperands {
                line: 1,
                text: "0,9,0".into()
            }
        );
        assert_eq!(
            load_listing("0: HALT 0,0,0\n0: HALT 0,0,0").unwrap_err(),
            LoadError::DuplicateLocation { line: 2, location: 0 }
        );
        assert!(matches!(
            load_listing("x: HALT 0,0,0"),
            Err(LoadError::BadLocation { line: 1, .. })
        ));
        assert_eq!(
            load_listing("18446744073709551615: HALT 0,0,0").unwrap_err(),
            LoadError::BadLocation {
                line: 1,
                text: "18446744073709551615".into()
            }
        );
        assert!(matches!(
            load_listing("0: HALT 0,0,0\n99999999999999: HALT 0,0,0"),
            Err(LoadError::BadLocation { line: 2, .. })
        ));
    }
}
