//! Turns expanded token lines into a typed instruction stream: the
//! [`Program`], its label map, and its IP-to-source-location map.

pub mod instructions;

use std::collections::HashMap;
use std::fmt;

use crate::lexer::token::{Line, Token, TokenKind};
use crate::location::Location;
use crate::value::{Tag, Value};

pub use instructions::InstrType;

const ENTRY_LABEL: &str = "_start";

#[derive(Debug, Clone)]
pub enum Operand {
    None,
    U8(u8),
    I64(i64),
    U64(u64),
    F64(f64),
    Nan(Value),
    Str(String),
    Type(InstrType),
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub ty: InstrType,
    pub operand: Operand,
}

/// The parser's output: an instruction stream plus everything needed to
/// execute and debug it.
#[derive(Debug, Clone)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<String, usize>,
    pub locations: Vec<Location>,
    pub entry: usize,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    NoEntryPoint,
    NoOperand { mnemonic: String, loc: Location },
    InvalidType { mnemonic: String, lexeme: String, loc: Location },
    FailedToParse { lexeme: String, loc: Location },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoEntryPoint => write!(f, "no \"{ENTRY_LABEL}\" label found"),
            Error::NoOperand { mnemonic, loc } => {
                write!(f, "{loc}: \"{mnemonic}\" requires an operand but none was given")
            }
            Error::InvalidType { mnemonic, lexeme, loc } => {
                write!(f, "{loc}: \"{lexeme}\" is not a valid operand for \"{mnemonic}\"")
            }
            Error::FailedToParse { lexeme, loc } => write!(f, "{loc}: unrecognized instruction \"{lexeme}\""),
        }
    }
}

/// Parse a fully macro-expanded token stream into a [`Program`].
pub fn parse(lines: &[Line]) -> Result<Program, Error> {
    let mut instructions = Vec::new();
    let mut labels = HashMap::new();
    let mut locations = Vec::new();
    let mut entry = None;

    for line in lines {
        let mut tokens = line.iter().peekable();
        while let Some(token) = tokens.next() {
            if let TokenKind::Label(name) = &token.kind {
                labels.insert(name.clone(), instructions.len());
                if name == ENTRY_LABEL {
                    entry = Some(instructions.len());
                }
                locations.push(token.loc.clone());
                instructions.push(Instruction { ty: InstrType::Label, operand: Operand::Str(name.clone()) });
                continue;
            }

            let mnemonic = match &token.kind {
                TokenKind::Literal(s) => s.as_str(),
                _ => {
                    return Err(Error::FailedToParse { lexeme: token.lexeme.clone(), loc: token.loc.clone() });
                }
            };

            let ty = InstrType::from_mnemonic(mnemonic)
                .ok_or_else(|| Error::FailedToParse { lexeme: token.lexeme.clone(), loc: token.loc.clone() })?;

            let operand = if ty.requires_operand() {
                let operand_token = tokens
                    .next()
                    .ok_or_else(|| Error::NoOperand { mnemonic: mnemonic.to_string(), loc: token.loc.clone() })?;
                if !ty.accepts(&operand_token.kind) {
                    return Err(Error::InvalidType {
                        mnemonic: mnemonic.to_string(),
                        lexeme: operand_token.lexeme.clone(),
                        loc: operand_token.loc.clone(),
                    });
                }
                parse_operand(ty, operand_token)?
            } else {
                Operand::None
            };

            locations.push(token.loc.clone());
            instructions.push(Instruction { ty, operand });
        }
    }

    let entry = entry.ok_or(Error::NoEntryPoint)?;
    Ok(Program { instructions, labels, locations, entry })
}

fn parse_operand(ty: InstrType, token: &Token) -> Result<Operand, Error> {
    Ok(match (&token.kind, ty) {
        (TokenKind::Char(b), InstrType::Push | InstrType::Spush) => Operand::Nan(Value::from_i64(Tag::I64, *b as i64)),
        (TokenKind::Int(v), InstrType::Push | InstrType::Spush) => Operand::Nan(Value::from_i64(Tag::I64, *v)),
        (TokenKind::Float(v), InstrType::Push | InstrType::Spush) => Operand::Nan(Value::from_f64(*v)),
        (TokenKind::Str(s), InstrType::Push | InstrType::Spush) => Operand::Str(s.clone()),
        (TokenKind::Label(s), InstrType::Push | InstrType::Spush) => Operand::Str(s.clone()),
        (TokenKind::Literal(s), InstrType::Push | InstrType::Spush) => Operand::Str(s.clone()),

        (TokenKind::Int(v), _) => Operand::I64(*v),
        (TokenKind::Str(s), _) => Operand::Str(s.clone()),
        (TokenKind::Literal(s), _) => Operand::Str(s.clone()),
        (TokenKind::Label(s), InstrType::Label) => Operand::Str(s.clone()),

        _ => return Err(Error::InvalidType { mnemonic: format!("{ty:?}"), lexeme: token.lexeme.clone(), loc: token.loc.clone() }),
    })
}
