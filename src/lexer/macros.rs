//! Macro table and expansion pass.
//!
//! Single macros (`#NAME tokens…`) splice inline, token for token, wherever
//! `@name` appears in a line. Multi macros (`#NAME args… { body }`) must be
//! invoked at the start of a line; the rest of that line is bound
//! positionally to the macro's parameters and the whole line is replaced by
//! the macro's body lines.

use std::collections::HashMap;

use super::token::{Line, Token, TokenKind};
use super::Error;
use crate::location::Location;

#[derive(Debug, Clone)]
pub enum Macro {
    Single(Line),
    Multi { params: Vec<String>, body: Vec<Line> },
}

#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> MacroTable {
        MacroTable { macros: HashMap::new() }
    }

    pub fn insert(&mut self, name: String, m: Macro) {
        self.macros.insert(name, m);
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }
}

/// Expand every macro invocation in `lines` against `table`. Tracks the
/// chain of macro names currently being expanded so a macro that invokes
/// itself, directly or through another macro, is rejected as
/// [`Error::RecursiveMacro`] instead of recursing without bound.
pub fn expand(lines: &[Line], table: &MacroTable) -> Result<Vec<Line>, Error> {
    let mut out = Vec::new();
    let mut active = Vec::new();
    for line in lines {
        expand_line(line, table, &mut out, &mut active)?;
    }
    Ok(out)
}

fn expand_line(line: &Line, table: &MacroTable, out: &mut Vec<Line>, active: &mut Vec<String>) -> Result<(), Error> {
    if let Some(first) = line.first() {
        if let Some(name) = first.macro_name() {
            match table.get(name) {
                Some(Macro::Multi { params, body }) => {
                    if active.iter().any(|n| n == name) {
                        return Err(Error::RecursiveMacro { name: name.to_string(), loc: first.loc.clone() });
                    }
                    let args = &line[1..];
                    let bound = bind_args(name, params, args, &first.loc, table, active)?;
                    let body_lines = substitute_body(body, params, &bound);
                    active.push(name.to_string());
                    for body_line in &body_lines {
                        expand_line(body_line, table, out, active)?;
                    }
                    active.pop();
                    return Ok(());
                }
                Some(Macro::Single(_)) => {
                    // Falls through to token-level splice below.
                }
                None => return Err(Error::UndefinedMacro { name: name.to_string(), loc: first.loc.clone() }),
            }
        }
    }

    out.push(splice_single(line, table, active)?);
    Ok(())
}

/// Replace every `@name` token referring to a single macro with its
/// (recursively expanded) token list, left to right.
fn splice_single(line: &Line, table: &MacroTable, active: &mut Vec<String>) -> Result<Line, Error> {
    let mut result = Vec::with_capacity(line.len());
    for token in line {
        match token.macro_name() {
            Some(name) => match table.get(name) {
                Some(Macro::Single(body)) => {
                    if active.iter().any(|n| n == name) {
                        return Err(Error::RecursiveMacro { name: name.to_string(), loc: token.loc.clone() });
                    }
                    active.push(name.to_string());
                    let expanded = splice_single(body, table, active);
                    active.pop();
                    result.extend(expanded?);
                }
                Some(Macro::Multi { .. }) => {
                    return Err(Error::UnexpectedArguments { macro_name: name.to_string(), loc: token.loc.clone() });
                }
                None => return Err(Error::UndefinedMacro { name: name.to_string(), loc: token.loc.clone() }),
            },
            None => result.push(token.clone()),
        }
    }
    Ok(result)
}

/// Bind a multi macro's positional parameters to the tokens following its
/// invocation, resolving any `@name` argument value against the single-macro
/// table first (an argument that is itself a single-macro invocation expands
/// to its first token).
fn bind_args(
    macro_name: &str,
    params: &[String],
    args: &[Token],
    loc: &Location,
    table: &MacroTable,
    active: &mut Vec<String>,
) -> Result<Vec<Token>, Error> {
    if args.len() < params.len() {
        return Err(Error::TooFewArguments {
            macro_name: macro_name.to_string(),
            expected: params.len(),
            found: args.len(),
            loc: loc.clone(),
        });
    }
    if args.len() > params.len() {
        return Err(Error::TooManyArguments {
            macro_name: macro_name.to_string(),
            expected: params.len(),
            found: args.len(),
            loc: loc.clone(),
        });
    }

    let mut bound = Vec::with_capacity(args.len());
    for arg in args {
        match arg.macro_name() {
            Some(name) => match table.get(name) {
                Some(Macro::Single(body)) => {
                    if active.iter().any(|n| n == name) {
                        return Err(Error::RecursiveMacro { name: name.to_string(), loc: arg.loc.clone() });
                    }
                    active.push(name.to_string());
                    let expanded = splice_single(body, table, active);
                    active.pop();
                    let first = expanded?
                        .into_iter()
                        .next()
                        .ok_or(Error::UnexpectedEof { loc: arg.loc.clone() })?;
                    bound.push(first);
                }
                Some(Macro::Multi { .. }) => {
                    return Err(Error::UnexpectedArguments { macro_name: name.to_string(), loc: arg.loc.clone() });
                }
                None => return Err(Error::UndefinedMacro { name: name.to_string(), loc: arg.loc.clone() }),
            },
            None => bound.push(arg.clone()),
        }
    }
    Ok(bound)
}

/// Replace every bare `Literal(param)` token in `body` with its bound value.
fn substitute_body(body: &[Line], params: &[String], bound: &[Token]) -> Vec<Line> {
    body.iter()
        .map(|line| {
            line.iter()
                .map(|token| match &token.kind {
                    TokenKind::Literal(name) => match params.iter().position(|p| p == name) {
                        Some(idx) => bound[idx].clone(),
                        None => token.clone(),
                    },
                    _ => token.clone(),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use std::rc::Rc;

    fn loc() -> Location {
        Location::new(Rc::from("t.asm"), 1, 1)
    }

    fn lit(s: &str) -> Token {
        Token::new(TokenKind::Literal(s.to_string()), s.to_string(), loc())
    }

    fn int(v: i64) -> Token {
        Token::new(TokenKind::Int(v), v.to_string(), loc())
    }

    #[test]
    fn single_macro_splices_inline() {
        let mut table = MacroTable::new();
        table.insert("two".to_string(), Macro::Single(vec![int(2)]));
        let line = vec![lit("push"), lit("@two")];
        let out = expand(&[line], &table).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0][1].kind, TokenKind::Int(2)));
    }

    #[test]
    fn multi_macro_expands_to_body_lines() {
        let mut table = MacroTable::new();
        table.insert(
            "sq".to_string(),
            Macro::Multi {
                params: vec!["x".to_string()],
                body: vec![vec![lit("push"), lit("x")], vec![lit("push"), lit("x")], vec![lit("imul")]],
            },
        );
        let line = vec![lit("@sq"), int(5)];
        let out = expand(&[line], &table).unwrap();
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0][1].kind, TokenKind::Int(5)));
        assert!(matches!(out[1][1].kind, TokenKind::Int(5)));
    }

    #[test]
    fn undefined_macro_errors() {
        let table = MacroTable::new();
        let line = vec![lit("push"), lit("@nope")];
        let err = expand(&[line], &table).unwrap_err();
        assert!(matches!(err, Error::UndefinedMacro { .. }));
    }

    #[test]
    fn self_referencing_single_macro_errors() {
        let mut table = MacroTable::new();
        table.insert("foo".to_string(), Macro::Single(vec![lit("@foo")]));
        let line = vec![lit("push"), lit("@foo")];
        let err = expand(&[line], &table).unwrap_err();
        assert!(matches!(err, Error::RecursiveMacro { .. }));
    }

    #[test]
    fn self_referencing_multi_macro_errors() {
        let mut table = MacroTable::new();
        table.insert(
            "loopy".to_string(),
            Macro::Multi { params: vec!["x".to_string()], body: vec![vec![lit("@loopy"), lit("x")]] },
        );
        let line = vec![lit("@loopy"), int(1)];
        let err = expand(&[line], &table).unwrap_err();
        assert!(matches!(err, Error::RecursiveMacro { .. }));
    }

    #[test]
    fn wrong_arg_count_errors() {
        let mut table = MacroTable::new();
        table.insert(
            "sq".to_string(),
            Macro::Multi { params: vec!["x".to_string()], body: vec![vec![lit("push"), lit("x")]] },
        );
        let line = vec![lit("@sq")];
        let err = expand(&[line], &table).unwrap_err();
        assert!(matches!(err, Error::TooFewArguments { .. }));
    }
}
