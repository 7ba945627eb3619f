//! Lispy - a small Lisp with S-expressions and Q-expressions
//!
//! This crate provides a reader and a tree-walking evaluator for a compact,
//! dynamically typed Lisp. Source text is read into a tree of [`ast::Value`]s
//! and reduced against a mutable global scope plus one scope per closure call.
//!
//! ## Two kinds of list
//!
//! ```text
//! (+ 1 2 3)            ; S-expression: evaluated when encountered
//! {1 2 (+ 1 2)}        ; Q-expression: inert data, never reduced on its own
//! (eval {+ 1 2})       ; turns data back into code
//! ```
//!
//! Q-expressions double as quoting, as lists of names for `def` and `=`,
//! and as formal-parameter lists for closures:
//!
//! ```text
//! (def {add} (\ {a b} {+ a b}))
//! (add 1 2)            ; 3
//! ((add 1) 2)          ; partial application, also 3
//! (\ {x & xs} {xs})    ; variadic: xs collects the remaining arguments
//! ```
//!
//! ## Errors are values
//!
//! Every user-level failure (unbound symbol, wrong type, wrong arity,
//! division by zero, ...) produces an `Error` value that flows through
//! reduction like any other datum; the first error among the elements of an
//! S-expression wins. Only host-level problems (reading a file, parsing text)
//! surface as Rust errors, see [`Error`].
//!
//! ## Modules
//!
//! - `ast`: the value model, structural equality and the printer
//! - `scope`: binding environments chained to their parent
//! - `evaluator`: eval/apply and closure application
//! - `builtinops`: the builtin procedure library
//! - `reader`: text to value trees
//! - `error`: the catalogue of language-level failures

use std::fmt;
use std::path::PathBuf;

/// Maximum nesting accepted by the reader
/// Keeps pathological input from overflowing the stack while parsing
pub const MAX_PARSE_DEPTH: usize = 64;

/// Maximum evaluation depth before a reduction yields an error value.
/// Depth counts nested closure applications and builtins re-entering the
/// evaluator (`eval`, `if`, `load`), not every nested sub-expression.
/// The evaluator grows its stack on demand, so this bounds memory rather than
/// guarding the native stack
pub const MAX_EVAL_DEPTH: usize = 50_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (unterminated string, unclosed list)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
    /// Implementation-imposed limit exceeded (integer literal out of range)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // `error_offset` counts bytes, the snippet is cut on characters
        let error_char = input
            .char_indices()
            .take_while(|(i, _)| *i < error_offset)
            .count();
        let context_start = error_char.saturating_sub(20);
        let mut chars = input.chars().skip(context_start);
        let context_str: String = chars.by_ref().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if chars.next().is_some() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }

    /// True when more input could complete the expression
    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ParseError: {}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Host-level failures: everything that goes wrong outside of evaluation.
///
/// Evaluation itself never fails with a Rust error; see [`error::EvalError`]
/// for the failures that become `Error` values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("could not read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub mod ast;
pub mod builtinops;
pub mod error;
pub mod evaluator;
pub mod reader;
pub mod scope;

pub use ast::Value;
pub use error::EvalError;
pub use evaluator::{create_global_env, eval, eval_program};
pub use scope::{Env, Scope};
