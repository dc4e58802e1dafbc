// File: src/debug.rs
//
// Read-only bytecode disassembler. Used by the `disassemble` CLI
// subcommand and by the VM's `--trace` mode so both views decode
// instructions identically. Never mutates chunk, compiler, or VM state.

use crate::chunk::{Chunk, OpCode};

pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {} ==", name);

    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

/// Decodes exactly one instruction at `offset`, printing it, and returns
/// the offset of the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{:04} ", offset);

    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.lines[offset]);
    }

    let op = OpCode::from_byte(chunk.code[offset]);
    match op {
        OpCode::Constant => constant_instruction("OP_CONSTANT", chunk, offset),
        OpCode::Nil => simple_instruction("OP_NIL", offset),
        OpCode::True => simple_instruction("OP_TRUE", offset),
        OpCode::False => simple_instruction("OP_FALSE", offset),
        OpCode::Pop => simple_instruction("OP_POP", offset),
        OpCode::GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset),
        OpCode::SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset),
        OpCode::GetGlobal => constant_instruction("OP_GET_GLOBAL", chunk, offset),
        OpCode::DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset),
        OpCode::SetGlobal => constant_instruction("OP_SET_GLOBAL", chunk, offset),
        OpCode::GetUpvalue => byte_instruction("OP_GET_UPVALUE", chunk, offset),
        OpCode::SetUpvalue => byte_instruction("OP_SET_UPVALUE", chunk, offset),
        OpCode::Equal => simple_instruction("OP_EQUAL", offset),
        OpCode::Greater => simple_instruction("OP_GREATER", offset),
        OpCode::Less => simple_instruction("OP_LESS", offset),
        OpCode::Add => simple_instruction("OP_ADD", offset),
        OpCode::Subtract => simple_instruction("OP_SUBTRACT", offset),
        OpCode::Multiply => simple_instruction("OP_MULTIPLY", offset),
        OpCode::Divide => simple_instruction("OP_DIVIDE", offset),
        OpCode::Not => simple_instruction("OP_NOT", offset),
        OpCode::Negate => simple_instruction("OP_NEGATE", offset),
        OpCode::Print => simple_instruction("OP_PRINT", offset),
        OpCode::Jump => jump_instruction("OP_JUMP", 1, chunk, offset),
        OpCode::JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        OpCode::Loop => jump_instruction("OP_LOOP", -1, chunk, offset),
        OpCode::Call => byte_instruction("OP_CALL", chunk, offset),
        OpCode::Closure => closure_instruction(chunk, offset),
        OpCode::CloseUpvalue => simple_instruction("OP_CLOSE_UPVALUE", offset),
        OpCode::Return => simple_instruction("OP_RETURN", offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{}", name);
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{:-16} {:4}", name, slot);
    offset + 2
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let idx = chunk.code[offset + 1] as usize;
    println!("{:-16} {:4} '{}'", name, idx, chunk.constants[idx]);
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let hi = chunk.code[offset + 1] as u16;
    let lo = chunk.code[offset + 2] as u16;
    let jump = (hi << 8) | lo;
    let target = offset as i32 + 3 + sign * jump as i32;
    println!("{:-16} {:4} -> {}", name, offset, target);
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize) -> usize {
    let mut off = offset + 1;
    let const_idx = chunk.code[off] as usize;
    off += 1;
    println!("{:-16} {:4} '{}'", "OP_CLOSURE", const_idx, chunk.constants[const_idx]);

    if let crate::value::Value::Function(function) = &chunk.constants[const_idx] {
        for _ in 0..function.upvalue_count {
            let is_local = chunk.code[off];
            let index = chunk.code[off + 1];
            println!(
                "{:04}      |                     {} {}",
                off,
                if is_local != 0 { "local" } else { "upvalue" },
                index
            );
            off += 2;
        }
    }

    off
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::OpCode;
    use crate::value::Value;

    #[test]
    fn disassemble_instruction_advances_by_operand_width() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::Number(1.0));
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(idx as u8, 1);
        chunk.write_op(OpCode::Return, 1);

        let next = disassemble_instruction(&chunk, 0);
        assert_eq!(next, 2);
        let next = disassemble_instruction(&chunk, next);
        assert_eq!(next, 3);
    }

    #[test]
    fn jump_instruction_decodes_big_endian_operand() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Jump, 1);
        chunk.write(0x01, 1);
        chunk.write(0x02, 1);
        let next = disassemble_instruction(&chunk, 0);
        assert_eq!(next, 3);
    }
}
