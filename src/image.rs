//! Binary image codec: serializes a parsed [`Program`] to a compact byte
//! format and reloads it without needing the original source.
//!
//! Layout: a string header (each record is `len:u8` followed by `len`
//! bytes), terminated by a single `;` (0x3B) byte, followed by one 10-byte
//! chunk per instruction: `[type:u8][variant:u8][payload:8 bytes]`. String
//! operands store the literal placeholder `$STRING$` in the payload and are
//! matched back to header strings in declaration order.

use std::fmt;

use crate::location::Location;
use crate::parser::{InstrType, Instruction, Operand, Program};
use crate::value::Value;

const TERMINATOR: u8 = b';';
const STRING_PLACEHOLDER: &[u8; 8] = b"$STRING$";
const CHUNK_SIZE: usize = 10;

#[repr(u8)]
enum Variant {
    None = 0,
    U8 = 1,
    I64 = 2,
    U64 = 3,
    F64 = 4,
    Nan = 5,
    Str = 6,
    Type = 7,
}

impl Variant {
    fn from_byte(b: u8) -> Option<Variant> {
        Some(match b {
            0 => Variant::None,
            1 => Variant::U8,
            2 => Variant::I64,
            3 => Variant::U64,
            4 => Variant::F64,
            5 => Variant::Nan,
            6 => Variant::Str,
            7 => Variant::Type,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    UnexpectedEof,
    UnknownInstructionType(u8),
    UnknownOperandVariant(u8),
    StringTableExhausted,
    MissingTerminator,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedEof => write!(f, "image ended before expected data"),
            Error::UnknownInstructionType(b) => write!(f, "instruction-type ordinal {b} exceeds the known set"),
            Error::UnknownOperandVariant(b) => write!(f, "operand-variant ordinal {b} is not recognized"),
            Error::StringTableExhausted => write!(f, "chunk references a string past the end of the header table"),
            Error::MissingTerminator => write!(f, "string header is missing its ';' terminator"),
        }
    }
}

/// Serialize `program` to its binary image. The location map is not part of
/// the image — it is a debugging aid rebuilt only by reparsing source.
pub fn encode(program: &Program) -> Vec<u8> {
    let mut strings = Vec::new();
    let mut out = Vec::new();

    for instr in &program.instructions {
        if let Operand::Str(s) = &instr.operand {
            strings.push(s.clone());
        }
    }

    for s in &strings {
        out.push(s.len() as u8);
        out.extend_from_slice(s.as_bytes());
    }
    out.push(TERMINATOR);

    for instr in &program.instructions {
        out.extend_from_slice(&encode_chunk(instr));
    }

    out
}

fn encode_chunk(instr: &Instruction) -> [u8; CHUNK_SIZE] {
    let mut chunk = [0u8; CHUNK_SIZE];
    chunk[0] = instr.ty as u8;

    let mut payload = [0u8; 8];
    let variant = match &instr.operand {
        Operand::None => Variant::None,
        Operand::U8(v) => {
            payload[0] = *v;
            Variant::U8
        }
        Operand::I64(v) => {
            payload.copy_from_slice(&v.to_le_bytes());
            Variant::I64
        }
        Operand::U64(v) => {
            payload.copy_from_slice(&v.to_le_bytes());
            Variant::U64
        }
        Operand::F64(v) => {
            payload.copy_from_slice(&v.to_le_bytes());
            Variant::F64
        }
        Operand::Nan(v) => {
            payload.copy_from_slice(&v.to_bits().to_le_bytes());
            Variant::Nan
        }
        Operand::Str(_) => {
            payload.copy_from_slice(STRING_PLACEHOLDER);
            Variant::Str
        }
        Operand::Type(t) => {
            payload[0] = *t as u8;
            Variant::Type
        }
    };
    chunk[1] = variant as u8;
    chunk[2..10].copy_from_slice(&payload);
    chunk
}

/// Deserialize a binary image back into a [`Program`]. Labels are recovered
/// from `Label` instructions; the IP-to-location map is synthesized with a
/// placeholder location since images carry no source positions.
pub fn decode(bytes: &[u8]) -> Result<Program, Error> {
    let mut pos = 0usize;
    let mut strings = Vec::new();

    loop {
        let len = *bytes.get(pos).ok_or(Error::MissingTerminator)?;
        if len == TERMINATOR {
            pos += 1;
            break;
        }
        pos += 1;
        let len = len as usize;
        let end = pos + len;
        let slice = bytes.get(pos..end).ok_or(Error::UnexpectedEof)?;
        strings.push(String::from_utf8_lossy(slice).into_owned());
        pos = end;
    }

    let mut string_iter = strings.into_iter();
    let mut instructions = Vec::new();
    let mut labels = std::collections::HashMap::new();
    let mut entry = None;
    let mut locations = Vec::new();
    let placeholder = Location::new(std::rc::Rc::from("<image>"), 0, 0);

    while pos < bytes.len() {
        let chunk = bytes.get(pos..pos + CHUNK_SIZE).ok_or(Error::UnexpectedEof)?;
        pos += CHUNK_SIZE;

        let ty = InstrType::from_ordinal(chunk[0]).ok_or(Error::UnknownInstructionType(chunk[0]))?;
        let variant = Variant::from_byte(chunk[1]).ok_or(Error::UnknownOperandVariant(chunk[1]))?;
        let payload = &chunk[2..10];

        let operand = match variant {
            Variant::None => Operand::None,
            Variant::U8 => Operand::U8(payload[0]),
            Variant::I64 => Operand::I64(i64::from_le_bytes(payload.try_into().unwrap())),
            Variant::U64 => Operand::U64(u64::from_le_bytes(payload.try_into().unwrap())),
            Variant::F64 => Operand::F64(f64::from_le_bytes(payload.try_into().unwrap())),
            Variant::Nan => Operand::Nan(Value::from_bits(u64::from_le_bytes(payload.try_into().unwrap()))),
            Variant::Str => {
                let s = string_iter.next().ok_or(Error::StringTableExhausted)?;
                Operand::Str(s)
            }
            Variant::Type => {
                let inner = InstrType::from_ordinal(payload[0]).ok_or(Error::UnknownInstructionType(payload[0]))?;
                Operand::Type(inner)
            }
        };

        if matches!(ty, InstrType::Label) {
            if let Operand::Str(name) = &operand {
                labels.insert(name.clone(), instructions.len());
                if name == "_start" {
                    entry = Some(instructions.len());
                }
            }
        }

        locations.push(placeholder.clone());
        instructions.push(Instruction { ty, operand });
    }

    Ok(Program { instructions, labels, locations, entry: entry.unwrap_or(0) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser;
    use std::io::Write;

    fn build(src: &str) -> Program {
        let mut f = tempfile::Builder::new().suffix(".asm").tempfile().unwrap();
        f.write_all(src.as_bytes()).unwrap();
        let lines = lexer::lex_file(f.path(), None).unwrap();
        parser::parse(&lines).unwrap()
    }

    #[test]
    fn roundtrips_simple_program() {
        let program = build("_start:\npush 2\npush 3\niadd\ndmpln\nhalt\n");
        let bytes = encode(&program);
        let reloaded = decode(&bytes).unwrap();
        assert_eq!(reloaded.instructions.len(), program.instructions.len());
        assert_eq!(reloaded.entry, program.entry);
    }

    #[test]
    fn roundtrips_string_operand() {
        let program = build("_start:\npush \"hi\"\ndmpln\nhalt\n");
        let bytes = encode(&program);
        let reloaded = decode(&bytes).unwrap();
        match &reloaded.instructions[0].operand {
            Operand::Str(s) => assert_eq!(s, "hi"),
            other => panic!("expected Str operand, got {other:?}"),
        }
    }

    #[test]
    fn preserves_labels_and_jump_targets() {
        let program = build("_start:\njmp _start\nhalt\n");
        let bytes = encode(&program);
        let reloaded = decode(&bytes).unwrap();
        assert!(reloaded.labels.contains_key("_start"));
    }

    #[test]
    fn rejects_truncated_image() {
        let err = decode(&[]).unwrap_err();
        assert!(matches!(err, Error::MissingTerminator));
    }

    #[test]
    fn rejects_unknown_instruction_ordinal() {
        let mut bytes = vec![TERMINATOR];
        bytes.extend_from_slice(&[255, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::UnknownInstructionType(255)));
    }
}
