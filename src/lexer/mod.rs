//! Tokenizer and preprocessor: turns source text (plus recursively included
//! files) into a sequence of token lines with macros fully expanded.
//!
//! Two passes, mirroring the teacher's two-pass assembler shape but applied
//! to text instead of bytecode: [`collect`] walks the source (and any
//! `#"path"` includes) gathering raw token lines and macro definitions,
//! then [`macros::expand`] substitutes every `@name` invocation.

pub mod macros;
pub mod token;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use regex::Regex;

use crate::location::Location;
pub use macros::{Macro, MacroTable};
pub use token::{Line, Token, TokenKind};

const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Clone)]
pub enum Error {
    UnexpectedEof { loc: Location },
    NoClosingQuote { loc: Location },
    InvalidChar { lexeme: String, loc: Location },
    InvalidLiteral { lexeme: String, loc: Location },
    UndefinedSymbol { name: String, loc: Location },
    UndefinedMacro { name: String, loc: Location },
    ArgNameInvalid { name: String, loc: Location },
    TooFewArguments { macro_name: String, expected: usize, found: usize, loc: Location },
    TooManyArguments { macro_name: String, expected: usize, found: usize, loc: Location },
    UnexpectedArguments { macro_name: String, loc: Location },
    UnexpectedSpaceInMacroDefinition { loc: Location },
    PathTooLong { path: String, loc: Location },
    FailedToReadFile { path: String, loc: Location },
    RecursiveMacro { name: String, loc: Location },
}

impl Error {
    pub fn loc(&self) -> &Location {
        match self {
            Error::UnexpectedEof { loc }
            | Error::NoClosingQuote { loc }
            | Error::InvalidChar { loc, .. }
            | Error::InvalidLiteral { loc, .. }
            | Error::UndefinedSymbol { loc, .. }
            | Error::UndefinedMacro { loc, .. }
            | Error::ArgNameInvalid { loc, .. }
            | Error::TooFewArguments { loc, .. }
            | Error::TooManyArguments { loc, .. }
            | Error::UnexpectedArguments { loc, .. }
            | Error::UnexpectedSpaceInMacroDefinition { loc }
            | Error::PathTooLong { loc, .. }
            | Error::FailedToReadFile { loc, .. }
            | Error::RecursiveMacro { loc, .. } => loc,
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedEof { loc } => write!(f, "{loc}: unexpected end of file"),
            Error::NoClosingQuote { loc } => write!(f, "{loc}: string is missing a closing quote"),
            Error::InvalidChar { lexeme, loc } => {
                write!(f, "{loc}: invalid char literal \"{lexeme}\"")
            }
            Error::InvalidLiteral { lexeme, loc } => {
                write!(f, "{loc}: invalid numeric literal \"{lexeme}\"")
            }
            Error::UndefinedSymbol { name, loc } => write!(f, "{loc}: undefined symbol \"{name}\""),
            Error::UndefinedMacro { name, loc } => write!(f, "{loc}: undefined macro \"{name}\""),
            Error::ArgNameInvalid { name, loc } => {
                write!(f, "{loc}: macro argument name \"{name}\" is not alphabetic")
            }
            Error::TooFewArguments { macro_name, expected, found, loc } => write!(
                f,
                "{loc}: too few arguments for macro \"{macro_name}\": expected {expected}, found {found}"
            ),
            Error::TooManyArguments { macro_name, expected, found, loc } => write!(
                f,
                "{loc}: too many arguments for macro \"{macro_name}\": expected {expected}, found {found}"
            ),
            Error::UnexpectedArguments { macro_name, loc } => {
                write!(f, "{loc}: unexpected arguments passed to macro \"{macro_name}\"")
            }
            Error::UnexpectedSpaceInMacroDefinition { loc } => {
                write!(f, "{loc}: unexpected space immediately after '#' in macro definition")
            }
            Error::PathTooLong { path, loc } => write!(f, "{loc}: include path too long: \"{path}\""),
            Error::FailedToReadFile { path, loc } => {
                write!(f, "{loc}: failed to read file \"{path}\"")
            }
            Error::RecursiveMacro { name, loc } => {
                write!(f, "{loc}: macro \"{name}\" recurses into itself")
            }
        }
    }
}

/// Lex `path` (and everything it transitively includes), expand all macros,
/// and return the fully-expanded program as a sequence of token lines.
pub fn lex_file(path: &Path, include_root: Option<&Path>) -> Result<Vec<Line>, Error> {
    let mut macros = MacroTable::new();
    let mut raw_lines = Vec::new();
    collect(path, include_root, &mut raw_lines, &mut macros)?;
    macros::expand(&raw_lines, &macros)
}

fn resolve_include(from_dir: &Path, include_root: Option<&Path>, raw_path: &str, loc: &Location) -> Result<PathBuf, Error> {
    if raw_path.len() > MAX_PATH_LEN {
        return Err(Error::PathTooLong { path: raw_path.to_string(), loc: loc.clone() });
    }
    let local = from_dir.join(raw_path);
    if local.is_file() {
        return Ok(local);
    }
    if let Some(root) = include_root {
        let candidate = root.join(raw_path);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(Error::FailedToReadFile { path: raw_path.to_string(), loc: loc.clone() })
}

/// Walk a single file top to bottom, consuming preprocessor directives,
/// recursing into `#"path"` includes, and appending every non-directive
/// line's tokens (and every macro definition) into the shared accumulators.
fn collect(
    path: &Path,
    include_root: Option<&Path>,
    raw_lines: &mut Vec<Line>,
    macros: &mut MacroTable,
) -> Result<(), Error> {
    let file_name: Rc<str> = Rc::from(path.to_string_lossy().as_ref());
    let source = fs::read_to_string(path).map_err(|_| Error::FailedToReadFile {
        path: path.to_string_lossy().into_owned(),
        loc: Location::new(file_name.clone(), 0, 0),
    })?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let lines: Vec<&str> = source.lines().collect();
    let mut row = 0usize;

    while row < lines.len() {
        let physical_row = row + 1;
        let raw_line = strip_comment(lines[row]);
        row += 1;

        let trimmed = raw_line.trim_start();
        let indent = raw_line.len() - trimmed.len();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('#') {
            handle_directive(
                rest,
                indent,
                physical_row,
                &file_name,
                dir,
                include_root,
                &lines,
                &mut row,
                raw_lines,
                macros,
            )?;
            continue;
        }

        let tokens = tokenize_line(trimmed, &file_name, physical_row, indent + 1)?;
        if !tokens.is_empty() {
            raw_lines.push(tokens);
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_directive(
    rest: &str,
    indent: usize,
    physical_row: usize,
    file_name: &Rc<str>,
    dir: &Path,
    include_root: Option<&Path>,
    lines: &[&str],
    row: &mut usize,
    raw_lines: &mut Vec<Line>,
    macros: &mut MacroTable,
) -> Result<(), Error> {
    let loc = Location::new(file_name.clone(), physical_row, indent + 1);

    if rest.starts_with(' ') || rest.starts_with('\t') {
        return Err(Error::UnexpectedSpaceInMacroDefinition { loc });
    }
    if rest.is_empty() {
        return Err(Error::UnexpectedEof { loc });
    }

    // `#"path"` — include directive.
    if let Some(quoted) = rest.strip_prefix('"') {
        let end = quoted.find('"').ok_or(Error::NoClosingQuote { loc: loc.clone() })?;
        let raw_path = &quoted[..end];
        let resolved = resolve_include(dir, include_root, raw_path, &loc)?;
        return collect(&resolved, include_root, raw_lines, macros);
    }

    // `#NAME ...` — macro definition (single or multi).
    let name_end = rest.find(|c: char| c.is_whitespace()).unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() {
        return Err(Error::UnexpectedEof { loc });
    }
    let after_name = rest[name_end..].trim_start();

    if let Some(brace_pos) = after_name.find('{') {
        let arg_text = after_name[..brace_pos].trim();
        let params = parse_macro_params(arg_text, &loc)?;
        let after_brace = after_name[brace_pos + 1..].trim();

        let mut body = Vec::new();
        if !after_brace.is_empty() && !after_brace.starts_with('}') {
            body.push(tokenize_line(after_brace, file_name, physical_row, 1)?);
        }
        loop {
            if *row >= lines.len() {
                return Err(Error::UnexpectedEof { loc });
            }
            let body_row = *row + 1;
            let body_line = strip_comment(lines[*row]);
            *row += 1;
            let body_trimmed = body_line.trim();
            if body_trimmed.is_empty() {
                continue;
            }
            if body_trimmed.starts_with('}') {
                break;
            }
            let tokens = tokenize_line(body_trimmed, file_name, body_row, 1)?;
            if !tokens.is_empty() {
                body.push(tokens);
            }
        }
        if macros.get(name).is_some() {
            crate::logging::warning(format!("macro \"{name}\" redefined"), &loc);
        }
        macros.insert(name.to_string(), Macro::Multi { params, body });
    } else {
        let tokens = tokenize_line(after_name, file_name, physical_row, 1)?;
        if macros.get(name).is_some() {
            crate::logging::warning(format!("macro \"{name}\" redefined"), &loc);
        }
        macros.insert(name.to_string(), Macro::Single(tokens));
    }

    Ok(())
}

fn parse_macro_params(arg_text: &str, loc: &Location) -> Result<Vec<String>, Error> {
    if arg_text.is_empty() {
        return Ok(Vec::new());
    }
    arg_text
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.chars().all(|c| c.is_ascii_alphabetic()) {
                Ok(s.to_string())
            } else {
                Err(Error::ArgNameInvalid { name: s.to_string(), loc: loc.clone() })
            }
        })
        .collect()
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Splits on the same shape the teacher's assembler uses for its own
/// lexeme scan: a quoted string, or a run of anything but a comma or
/// whitespace.
fn lexeme_pattern() -> Regex {
    Regex::new(r#""[^"]*"|'[^']*'|[^,\s]+"#).unwrap()
}

fn tokenize_line(line: &str, file: &Rc<str>, row: usize, base_col: usize) -> Result<Line, Error> {
    let mut tokens = Vec::new();
    let re = lexeme_pattern();

    for m in re.find_iter(line) {
        let lexeme = m.as_str();
        let loc = Location::new(file.clone(), row, base_col + m.start());

        if let Some(content) = lexeme.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            tokens.push(Token::new(TokenKind::Str(join_whitespace(content)), lexeme.to_string(), loc));
            continue;
        }

        if let Some(content) = lexeme.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            let bytes = content.as_bytes();
            if bytes.len() != 1 {
                return Err(Error::InvalidChar { lexeme: lexeme.to_string(), loc });
            }
            tokens.push(Token::new(TokenKind::Char(bytes[0]), lexeme.to_string(), loc));
            continue;
        }

        // A lone leading quote with no matching close falls into this
        // generic branch instead of one of the two above.
        if lexeme.starts_with('"') || lexeme.starts_with('\'') {
            return Err(Error::NoClosingQuote { loc });
        }

        tokens.push(classify(lexeme.to_string(), loc)?);
    }

    Ok(tokens)
}

/// Collapse runs of whitespace inside a quoted string to single spaces, per
/// the "may span across whitespace... joined with single spaces" rule.
fn join_whitespace(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn classify(lexeme: String, loc: Location) -> Result<Token, Error> {
    if lexeme.len() > 1 && lexeme.ends_with(':') {
        let name = lexeme[..lexeme.len() - 1].to_string();
        return Ok(Token::new(TokenKind::Label(name), lexeme, loc));
    }

    if let Some(v) = try_parse_int(&lexeme) {
        return Ok(Token::new(TokenKind::Int(v), lexeme, loc));
    }

    if looks_numeric(&lexeme) {
        if lexeme.contains('.') {
            return match lexeme.parse::<f64>() {
                Ok(v) => Ok(Token::new(TokenKind::Float(v), lexeme, loc)),
                Err(_) => Err(Error::InvalidLiteral { lexeme, loc }),
            };
        }
        return Err(Error::InvalidLiteral { lexeme, loc });
    }

    Ok(Token::new(TokenKind::Literal(lexeme.clone()), lexeme, loc))
}

fn looks_numeric(lexeme: &str) -> bool {
    let body = lexeme.strip_prefix('-').unwrap_or(lexeme);
    !body.is_empty() && body.chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn try_parse_int(lexeme: &str) -> Option<i64> {
    let (negative, body) = match lexeme.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, lexeme),
    };
    if body.is_empty() {
        return None;
    }
    let magnitude = if let Some(hex) = body.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        if body.contains('.') || !body.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        body.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".asm").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn lexes_basic_program() {
        let f = write_temp("push 2\npush 3\niadd\ndmpln\nhalt\n");
        let lines = lex_file(f.path(), None).unwrap();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0][0].lexeme, "push");
        assert!(matches!(lines[0][1].kind, TokenKind::Int(2)));
    }

    #[test]
    fn strips_comments() {
        let f = write_temp("push 2 ; comment\nhalt\n");
        let lines = lex_file(f.path(), None).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 2);
    }

    #[test]
    fn recognizes_labels() {
        let f = write_temp("_loop:\npush 1\nhalt\n");
        let lines = lex_file(f.path(), None).unwrap();
        assert!(matches!(&lines[0][0].kind, TokenKind::Label(name) if name == "_loop"));
    }

    #[test]
    fn quoted_string_joins_whitespace() {
        let f = write_temp("push \"hi  there\"\nhalt\n");
        let lines = lex_file(f.path(), None).unwrap();
        match &lines[0][1].kind {
            TokenKind::Str(s) => assert_eq!(s, "hi there"),
            other => panic!("expected Str, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_quote_errors() {
        let f = write_temp("push \"oops\nhalt\n");
        let err = lex_file(f.path(), None).unwrap_err();
        assert!(matches!(err, Error::NoClosingQuote { .. }));
    }

    #[test]
    fn hex_and_negative_ints() {
        let f = write_temp("push 0xFF\npush -5\nhalt\n");
        let lines = lex_file(f.path(), None).unwrap();
        assert!(matches!(lines[0][1].kind, TokenKind::Int(255)));
        assert!(matches!(lines[1][1].kind, TokenKind::Int(-5)));
    }

    #[test]
    fn char_literal() {
        let f = write_temp("push 'a'\nhalt\n");
        let lines = lex_file(f.path(), None).unwrap();
        assert!(matches!(lines[0][1].kind, TokenKind::Char(b'a')));
    }
}
