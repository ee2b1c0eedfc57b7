//! Bytecode disassembly for diagnostics.
//!
//! Renders instruction streams with their resolved operands: constant
//! values next to `LOAD_CONST`, interned names next to name-carrying
//! opcodes, plain numbers for slots, counts and jump targets.

use super::bytecode::{Instruction, OpCode};
use super::strings::StringPool;
use super::value::Value;
use std::fmt::Write;

/// Render one stream, one instruction per line.
pub fn disassemble(
    name: &str,
    code: &[Instruction],
    strings: &StringPool,
    constants: &[Value],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", name);
    for (at, inst) in code.iter().enumerate() {
        let _ = writeln!(out, "{:04} {}", at, render(inst, strings, constants));
    }
    out
}

fn render(inst: &Instruction, strings: &StringPool, constants: &[Value]) -> String {
    let name = inst.op.name();
    match inst.op {
        OpCode::LoadConst => match constants.get(inst.operand as usize) {
            Some(value) => format!("{} {} ({})", name, inst.operand, value.display(strings)),
            None => format!("{} {} (?)", name, inst.operand),
        },
        OpCode::LoadGlobal
        | OpCode::StoreGlobal
        | OpCode::Call
        | OpCode::SignalEmit
        | OpCode::SignalRecv
        | OpCode::EventExecute
        | OpCode::NewObject
        | OpCode::GetField
        | OpCode::SetField => {
            format!(
                "{} {} ({})",
                name,
                inst.operand,
                strings.resolve(inst.operand as u32)
            )
        }
        OpCode::LoadLocal
        | OpCode::StoreLocal
        | OpCode::Jump
        | OpCode::JumpIfFalse
        | OpCode::JumpIfTrue
        | OpCode::BuildArray => format!("{} {}", name, inst.operand),
        _ => name.to_string(),
    }
}
