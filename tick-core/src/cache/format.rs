//! Bytecode cache wire format.
//!
//! Little-endian, fixed-width fields throughout.
//!
//! Layout:
//! - header: magic `TICK`, version u32, source mtime u64, source size
//!   u64, then u32 counts for functions, processes, events, signals,
//!   classes, string-pool entries and constants;
//! - main stream: u32 length + instruction records;
//! - functions: (u32 name len, name bytes, u32 stream length, records)*;
//! - processes: the same, with the name serialized as the composite
//!   `event@process` so the event binding survives the round trip;
//! - events, signals, classes, string pool: (u32 len + bytes)* each;
//! - constants: (u8 tag + 8-byte payload)* each.
//!
//! An instruction record is u32 opcode + i32 operand (8 bytes).

use crate::runtime::bytecode::{Instruction, OpCode};
use crate::runtime::codegen::{CompiledProgram, ProcessCode};
use crate::runtime::value::Value;
use thiserror::Error;

pub const CACHE_MAGIC: [u8; 4] = *b"TICK";
pub const CACHE_VERSION: u32 = 1;

const TAG_INT: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_DOUBLE: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_NONE: u8 = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("Bad magic number")]
    BadMagic,
    #[error("Unsupported cache version {0}")]
    BadVersion(u32),
    #[error("Truncated cache data")]
    Truncated,
    #[error("Unknown opcode {0} in cache data")]
    BadOpcode(u32),
    #[error("Unknown constant tag {0} in cache data")]
    BadConstantTag(u8),
    #[error("Non-scalar constant cannot be serialized")]
    NonScalarConstant,
    #[error("Malformed process name '{0}' (expected 'event@process')")]
    BadProcessName(String),
    #[error("Invalid UTF-8 in cache data")]
    BadUtf8,
}

/// Header fields validated against the current source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStamp {
    /// Seconds since the epoch.
    pub mtime: u64,
    /// Source length in bytes.
    pub size: u64,
}

/// Serialize a compiled program for `stamp`'s source file.
pub fn encode(program: &CompiledProgram, stamp: SourceStamp) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::with_capacity(4096);

    out.extend_from_slice(&CACHE_MAGIC);
    write_u32(&mut out, CACHE_VERSION);
    write_u64(&mut out, stamp.mtime);
    write_u64(&mut out, stamp.size);
    write_u32(&mut out, program.functions.len() as u32);
    write_u32(&mut out, program.processes.len() as u32);
    write_u32(&mut out, program.events.len() as u32);
    write_u32(&mut out, program.signals.len() as u32);
    write_u32(&mut out, program.classes.len() as u32);
    write_u32(&mut out, program.strings.len() as u32);
    write_u32(&mut out, program.constants.len() as u32);

    match &program.main {
        Some(main) => write_stream(&mut out, main),
        None => write_u32(&mut out, 0),
    }

    for (name, code) in &program.functions {
        write_bytes(&mut out, name.as_bytes());
        write_stream(&mut out, code);
    }

    for process in &program.processes {
        let composite = format!("{}@{}", process.event, process.name);
        write_bytes(&mut out, composite.as_bytes());
        write_stream(&mut out, &process.code);
    }

    for name in &program.events {
        write_bytes(&mut out, name.as_bytes());
    }
    for name in &program.signals {
        write_bytes(&mut out, name.as_bytes());
    }
    for name in &program.classes {
        write_bytes(&mut out, name.as_bytes());
    }
    for entry in &program.strings {
        write_bytes(&mut out, entry.as_bytes());
    }

    for constant in &program.constants {
        write_constant(&mut out, constant)?;
    }

    Ok(out)
}

/// Read only the stamp out of a serialized cache entry, validating
/// magic and version.
pub fn decode_stamp(data: &[u8]) -> Result<SourceStamp, FormatError> {
    let mut cursor = Cursor::new(data);
    cursor.expect_magic()?;
    let version = cursor.read_u32()?;
    if version != CACHE_VERSION {
        return Err(FormatError::BadVersion(version));
    }
    Ok(SourceStamp {
        mtime: cursor.read_u64()?,
        size: cursor.read_u64()?,
    })
}

/// Deserialize a full cache entry.
pub fn decode(data: &[u8]) -> Result<(CompiledProgram, SourceStamp), FormatError> {
    let mut cursor = Cursor::new(data);
    cursor.expect_magic()?;
    let version = cursor.read_u32()?;
    if version != CACHE_VERSION {
        return Err(FormatError::BadVersion(version));
    }

    let stamp = SourceStamp {
        mtime: cursor.read_u64()?,
        size: cursor.read_u64()?,
    };

    let num_functions = cursor.read_u32()?;
    let num_processes = cursor.read_u32()?;
    let num_events = cursor.read_u32()?;
    let num_signals = cursor.read_u32()?;
    let num_classes = cursor.read_u32()?;
    let num_strings = cursor.read_u32()?;
    let num_constants = cursor.read_u32()?;

    let main_code = cursor.read_stream()?;
    let main = if main_code.is_empty() {
        None
    } else {
        Some(main_code)
    };

    let mut functions = Vec::with_capacity(num_functions as usize);
    for _ in 0..num_functions {
        let name = cursor.read_string()?;
        let code = cursor.read_stream()?;
        functions.push((name, code));
    }

    let mut processes = Vec::with_capacity(num_processes as usize);
    for _ in 0..num_processes {
        let composite = cursor.read_string()?;
        let code = cursor.read_stream()?;
        let Some((event, name)) = composite.split_once('@') else {
            return Err(FormatError::BadProcessName(composite));
        };
        processes.push(ProcessCode {
            event: event.to_string(),
            name: name.to_string(),
            code,
        });
    }

    let events = cursor.read_strings(num_events)?;
    let signals = cursor.read_strings(num_signals)?;
    let classes = cursor.read_strings(num_classes)?;
    let strings = cursor.read_strings(num_strings)?;

    let mut constants = Vec::with_capacity(num_constants as usize);
    for _ in 0..num_constants {
        constants.push(cursor.read_constant()?);
    }

    Ok((
        CompiledProgram {
            main,
            functions,
            processes,
            events,
            signals,
            classes,
            strings,
            constants,
        },
        stamp,
    ))
}

// ==================== writers ====================

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

fn write_stream(out: &mut Vec<u8>, code: &[Instruction]) {
    write_u32(out, code.len() as u32);
    for inst in code {
        write_u32(out, inst.op as u32);
        out.extend_from_slice(&inst.operand.to_le_bytes());
    }
}

fn write_constant(out: &mut Vec<u8>, value: &Value) -> Result<(), FormatError> {
    let mut payload = [0u8; 8];
    let tag = match value {
        Value::Int(n) => {
            payload[..4].copy_from_slice(&n.to_le_bytes());
            TAG_INT
        }
        Value::Float(f) => {
            payload[..4].copy_from_slice(&f.to_le_bytes());
            TAG_FLOAT
        }
        Value::Double(d) => {
            payload.copy_from_slice(&d.to_le_bytes());
            TAG_DOUBLE
        }
        Value::Bool(b) => {
            payload[0] = *b as u8;
            TAG_BOOL
        }
        Value::Str(id) => {
            payload[..4].copy_from_slice(&id.to_le_bytes());
            TAG_STR
        }
        Value::None => TAG_NONE,
        Value::Array(_) | Value::Object(_) => return Err(FormatError::NonScalarConstant),
    };
    out.push(tag);
    out.extend_from_slice(&payload);
    Ok(())
}

// ==================== reader ====================

struct Cursor<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, at: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self.at.checked_add(n).ok_or(FormatError::Truncated)?;
        if end > self.data.len() {
            return Err(FormatError::Truncated);
        }
        let slice = &self.data[self.at..end];
        self.at = end;
        Ok(slice)
    }

    fn expect_magic(&mut self) -> Result<(), FormatError> {
        if self.take(4)? != CACHE_MAGIC {
            return Err(FormatError::BadMagic);
        }
        Ok(())
    }

    fn read_u32(&mut self) -> Result<u32, FormatError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn read_u64(&mut self) -> Result<u64, FormatError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn read_string(&mut self) -> Result<String, FormatError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FormatError::BadUtf8)
    }

    fn read_strings(&mut self, count: u32) -> Result<Vec<String>, FormatError> {
        (0..count).map(|_| self.read_string()).collect()
    }

    fn read_stream(&mut self) -> Result<Vec<Instruction>, FormatError> {
        let len = self.read_u32()? as usize;
        let mut code = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            let raw_op = self.read_u32()?;
            let op = OpCode::from_u32(raw_op).map_err(|_| FormatError::BadOpcode(raw_op))?;
            let operand = i32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes"));
            code.push(Instruction::new(op, operand));
        }
        Ok(code)
    }

    fn read_constant(&mut self) -> Result<Value, FormatError> {
        let tag = self.take(1)?[0];
        let payload = self.take(8)?;
        let word4: [u8; 4] = payload[..4].try_into().expect("4 bytes");
        let word8: [u8; 8] = payload.try_into().expect("8 bytes");
        match tag {
            TAG_INT => Ok(Value::Int(i32::from_le_bytes(word4))),
            TAG_FLOAT => Ok(Value::Float(f32::from_le_bytes(word4))),
            TAG_DOUBLE => Ok(Value::Double(f64::from_le_bytes(word8))),
            TAG_BOOL => Ok(Value::Bool(payload[0] != 0)),
            TAG_STR => Ok(Value::Str(u32::from_le_bytes(word4))),
            TAG_NONE => Ok(Value::None),
            other => Err(FormatError::BadConstantTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::bytecode::{Instruction, OpCode};

    fn sample_program() -> CompiledProgram {
        CompiledProgram {
            main: Some(vec![
                Instruction::new(OpCode::LoadConst, 0),
                Instruction::simple(OpCode::Return),
            ]),
            functions: vec![(
                "helper".to_string(),
                vec![Instruction::new(OpCode::LoadConst, 1)],
            )],
            processes: vec![ProcessCode {
                event: "e".to_string(),
                name: "p".to_string(),
                code: vec![Instruction::simple(OpCode::Halt)],
            }],
            events: vec!["e".to_string()],
            signals: vec!["s".to_string()],
            classes: vec!["C".to_string()],
            strings: vec!["e".to_string(), "s".to_string()],
            constants: vec![
                Value::Int(42),
                Value::Double(1.5),
                Value::Bool(true),
                Value::Str(1),
                Value::Float(0.25),
                Value::None,
            ],
        }
    }

    #[test]
    fn test_round_trip() {
        let program = sample_program();
        let stamp = SourceStamp {
            mtime: 1722500000,
            size: 321,
        };
        let data = encode(&program, stamp).unwrap();
        let (decoded, decoded_stamp) = decode(&data).unwrap();
        assert_eq!(decoded_stamp, stamp);
        assert_eq!(decoded, program);
    }

    #[test]
    fn test_stamp_only_read() {
        let data = encode(
            &sample_program(),
            SourceStamp {
                mtime: 7,
                size: 9,
            },
        )
        .unwrap();
        let stamp = decode_stamp(&data).unwrap();
        assert_eq!(stamp.mtime, 7);
        assert_eq!(stamp.size, 9);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = encode(
            &sample_program(),
            SourceStamp { mtime: 1, size: 1 },
        )
        .unwrap();
        data[0] = b'X';
        assert_eq!(decode(&data).unwrap_err(), FormatError::BadMagic);
    }

    #[test]
    fn test_bad_version() {
        let mut data = encode(
            &sample_program(),
            SourceStamp { mtime: 1, size: 1 },
        )
        .unwrap();
        data[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert_eq!(decode(&data).unwrap_err(), FormatError::BadVersion(99));
    }

    #[test]
    fn test_truncated_data() {
        let data = encode(
            &sample_program(),
            SourceStamp { mtime: 1, size: 1 },
        )
        .unwrap();
        assert_eq!(
            decode(&data[..data.len() - 3]).unwrap_err(),
            FormatError::Truncated
        );
    }

    #[test]
    fn test_non_scalar_constant_rejected() {
        let mut program = sample_program();
        program.constants.push(Value::array(vec![]));
        let result = encode(&program, SourceStamp { mtime: 1, size: 1 });
        assert_eq!(result.unwrap_err(), FormatError::NonScalarConstant);
    }

    #[test]
    fn test_process_event_binding_survives() {
        let data = encode(
            &sample_program(),
            SourceStamp { mtime: 1, size: 1 },
        )
        .unwrap();
        let (decoded, _) = decode(&data).unwrap();
        assert_eq!(decoded.processes[0].event, "e");
        assert_eq!(decoded.processes[0].name, "p");
    }
}
