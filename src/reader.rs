//! Reader: source text to [`Value`] trees.
//!
//! Whitespace separates expressions and `;` starts a comment running to the
//! end of the line. `( ... )` reads as an S-expression, `{ ... }` as a
//! Q-expression and `"..."` as a string. Any other run of alphanumerics and
//! `_+-*/\=<>!&?%` is an atom: a number if it is `-?[0-9]+`, a boolean if it
//! is `true` or `false`, a symbol otherwise.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::value,
    error::ErrorKind,
    multi::many0,
    sequence::preceded,
};
use std::path::Path;

use crate::ast::{NumberType, SYMBOL_SPECIAL_CHARS, Value, is_valid_symbol};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Treat `;` to end of line as whitespace
    pub handle_comments: bool,
    /// Nesting beyond this depth is rejected
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

fn fail<T>(input: &str, code: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, code)))
}

fn is_atom_char(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Skip whitespace and, when enabled, comments
fn skip_ignored<'a>(input: &'a str, config: &ParseConfig) -> IResult<&'a str, ()> {
    if config.handle_comments {
        value(
            (),
            many0(alt((
                multispace1,
                preceded(char(';'), take_while(|c: char| c != '\n')),
            ))),
        )
        .parse(input)
    } else {
        value((), multispace0).parse(input)
    }
}

/// Parse an atom: number, boolean or symbol
fn parse_atom(input: &str) -> IResult<&str, Value> {
    let (remaining, token) = take_while1(is_atom_char).parse(input)?;

    let digits = token.strip_prefix('-').unwrap_or(token);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return match token.parse::<NumberType>() {
            Ok(n) => Ok((remaining, Value::Number(n))),
            // Only overflow can get here
            Err(_) => fail(input, ErrorKind::Digit),
        };
    }

    match token {
        "true" => Ok((remaining, Value::Bool(true))),
        "false" => Ok((remaining, Value::Bool(false))),
        _ if is_valid_symbol(token) => Ok((remaining, Value::Symbol(token.to_owned()))),
        _ => fail(input, ErrorKind::Alpha),
    }
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((char_iter.as_str(), Value::String(chars)));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => return fail(remaining, ErrorKind::Escaped),
                    None => return fail(char_iter.as_str(), ErrorKind::Eof),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            // Unterminated: more input could still close it
            None => return fail(remaining, ErrorKind::Eof),
        }
    }
}

/// Parse the items between `open` and `close`
fn parse_list<'a>(
    input: &'a str,
    open: char,
    close: char,
    config: &ParseConfig,
    depth: usize,
) -> IResult<&'a str, Vec<Value>> {
    let (mut input, _) = char(open).parse(input)?;
    let mut items = Vec::new();

    loop {
        let (rest, ()) = skip_ignored(input, config)?;
        if let Some(rest) = rest.strip_prefix(close) {
            return Ok((rest, items));
        }
        let (rest, item) = parse_value(rest, config, depth + 1)?;
        items.push(item);
        input = rest;
    }
}

/// Parse one expression starting exactly at `input`
fn parse_value<'a>(input: &'a str, config: &ParseConfig, depth: usize) -> IResult<&'a str, Value> {
    if depth >= config.max_depth {
        return fail(input, ErrorKind::TooLarge);
    }

    match input.chars().next() {
        None => fail(input, ErrorKind::Eof),
        Some('(') => parse_list(input, '(', ')', config, depth)
            .map(|(rest, items)| (rest, Value::SExpr(items))),
        Some('{') => parse_list(input, '{', '}', config, depth)
            .map(|(rest, items)| (rest, Value::QExpr(items))),
        Some('"') => parse_string(input),
        Some(c) if is_atom_char(c) => parse_atom(input),
        Some(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Char,
        ))),
    }
}

/// Convert nom parsing errors to structured parse errors
fn to_parse_error(
    input: &str,
    error: nom::Err<nom::error::Error<&str>>,
    config: &ParseConfig,
) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = input.len().saturating_sub(e.input.len());
            let token: String = e.input.chars().take_while(|&c| is_atom_char(c)).collect();
            let next_char = e.input.chars().next().map(String::from);

            let (kind, message, found) = match e.code {
                ErrorKind::Eof => (
                    ParseErrorKind::Incomplete,
                    "unexpected end of input".to_owned(),
                    None,
                ),
                ErrorKind::TooLarge => (
                    ParseErrorKind::TooDeeplyNested,
                    format!("expression too deeply nested (max depth: {})", config.max_depth),
                    None,
                ),
                ErrorKind::Digit => (
                    ParseErrorKind::ImplementationLimit,
                    format!("integer literal out of range at position {offset}"),
                    Some(token),
                ),
                ErrorKind::Alpha => (
                    ParseErrorKind::InvalidSyntax,
                    format!("invalid symbol at position {offset}"),
                    Some(token),
                ),
                ErrorKind::Escaped => (
                    ParseErrorKind::InvalidSyntax,
                    format!("invalid escape sequence at position {offset}"),
                    e.input.chars().take(2).collect::<String>().into(),
                ),
                _ => (
                    ParseErrorKind::InvalidSyntax,
                    format!("unexpected character at position {offset}"),
                    next_char,
                ),
            };
            ParseError::with_context_and_found(kind, message, input, offset, found)
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "incomplete input")
        }
    }
}

/// Parse exactly one expression
pub fn parse_expr(input: &str) -> Result<Value, ParseError> {
    parse_expr_with_config(input, &ParseConfig::default())
}

pub fn parse_expr_with_config(input: &str, config: &ParseConfig) -> Result<Value, ParseError> {
    let parsed = skip_ignored(input, config)
        .and_then(|(rest, ())| parse_value(rest, config, 0))
        .and_then(|(rest, value)| {
            let (rest, ()) = skip_ignored(rest, config)?;
            Ok((rest, value))
        });

    match parsed {
        Ok(("", value)) => Ok(value),
        Ok((remaining, _)) => {
            let offset = input.len().saturating_sub(remaining.len());
            Err(ParseError::with_context_and_found(
                ParseErrorKind::TrailingContent,
                format!("unexpected input after expression at position {offset}"),
                input,
                offset,
                Some(remaining.chars().take(20).collect()),
            ))
        }
        Err(e) => Err(to_parse_error(input, e, config)),
    }
}

/// Parse a whole program: zero or more top-level expressions, in order
pub fn parse_program(input: &str) -> Result<Vec<Value>, ParseError> {
    parse_program_with_config(input, &ParseConfig::default())
}

pub fn parse_program_with_config(
    input: &str,
    config: &ParseConfig,
) -> Result<Vec<Value>, ParseError> {
    let mut exprs = Vec::new();
    let mut rest = input;

    loop {
        let (remaining, ()) =
            skip_ignored(rest, config).map_err(|e| to_parse_error(input, e, config))?;
        if remaining.is_empty() {
            return Ok(exprs);
        }
        let (remaining, expr) =
            parse_value(remaining, config, 0).map_err(|e| to_parse_error(input, e, config))?;
        exprs.push(expr);
        rest = remaining;
    }
}

/// Read a file and parse it as a program
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Value>, Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_program(&text)?)
}
