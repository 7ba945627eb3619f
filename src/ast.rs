//! This module defines the value model shared by the reader and the evaluator.
//! The main enum, [`Value`], covers every runtime datum: integers, booleans,
//! strings, symbols, first-class errors, builtin and user-defined procedures,
//! and the two list kinds (S-expressions, which are reduced, and Q-expressions,
//! which are inert data). Values own their children exclusively, so `clone`
//! is the deep copy the language semantics call for. No value holds a scope
//! handle, so value trees never form reference cycles.
//!
//! Ergonomic helpers such as [`val`], [`sym`], [`qexpr`] and [`sexpr`] are
//! provided for building trees in code and tests. Equality and display are
//! customized to match the language: equality is structural (closures compare
//! by formals and body, builtins by name) and display is the canonical printer.

use crate::builtinops::BuiltinOp;

/// Type alias for number values in the interpreter
pub type NumberType = i64;

/// Allowed non-alphanumeric characters in symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "_+-*/\\=<>!&?%";

/// Marker separating fixed formals from the rest parameter in a formals list
pub(crate) const VARIADIC_MARKER: &str = "&";

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if first_char == '-'
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// A user-defined procedure.
///
/// `captured` is the closure's private scope: copies of the local bindings
/// visible where it was defined, plus the arguments bound so far by partial
/// application. Global names are not captured; the body resolves them in the
/// root scope of whoever applies the closure, which is how late binding and
/// mutual recursion work.
#[derive(Clone)]
pub struct Closure {
    /// Parameter names still awaiting arguments, possibly containing `&`
    pub formals: Vec<String>,
    /// Items of the body, evaluated as an S-expression on complete application
    pub body: Vec<Value>,
    pub captured: Vec<(String, Value)>,
}


/// Core value type of the interpreter
///
/// To build a tree, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols
/// - `qexpr(vec![...])` / `sexpr(vec![...])` for the two list kinds
/// - `val([1, 2, 3])` for homogeneous Q-expressions
#[derive(Clone)]
pub enum Value {
    /// Numbers (signed integers only)
    Number(NumberType),
    /// Boolean values, distinct from numbers
    Bool(bool),
    /// String literals
    String(String),
    /// Unresolved identifiers; evaluation substitutes the bound value
    Symbol(String),
    /// First-class errors, propagated through reduction like data
    Error(String),
    /// Builtin procedures, identified by name
    Builtin(BuiltinOp),
    /// User-defined procedures
    Function(Closure),
    /// Evaluable lists, reduced when encountered
    SExpr(Vec<Value>),
    /// Data lists, self-evaluating
    QExpr(Vec<Value>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Error(msg) => write!(f, "Error({msg:?})"),
            Value::Builtin(op) => write!(f, "Builtin({})", op.name),
            Value::Function(closure) => write!(
                f,
                "Function(formals={:?}, body={:?})",
                closure.formals, closure.body
            ),
            Value::SExpr(items) => f.debug_tuple("SExpr").field(items).finish(),
            Value::QExpr(items) => f.debug_tuple("QExpr").field(items).finish(),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

// Rust sequences become data lists: that is what literal lists are in source text
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::QExpr(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::QExpr(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating symbols
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating data lists
pub fn qexpr(items: Vec<Value>) -> Value {
    Value::QExpr(items)
}

/// Helper function for creating evaluable lists
pub fn sexpr(items: Vec<Value>) -> Value {
    Value::SExpr(items)
}

/// The empty S-expression, the result of definitions and `print`
pub fn unit() -> Value {
    Value::SExpr(Vec::new())
}

fn write_items(
    f: &mut std::fmt::Formatter<'_>,
    open: char,
    items: &[Value],
    close: char,
) -> std::fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Error(msg) => write!(f, "Error: {msg}"),
            Value::Builtin(op) => write!(f, "#<builtin:{}>", op.name),
            Value::Function(_) => write!(f, "#<function>"),
            Value::SExpr(items) => write_items(f, '(', items, ')'),
            Value::QExpr(items) => write_items(f, '{', items, '}'),
        }
    }
}

impl Value {
    /// Name of the value's kind, as used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Bool(_) => "Boolean",
            Value::String(_) => "String",
            Value::Symbol(_) => "Symbol",
            Value::Error(_) => "Error",
            Value::Builtin(_) => "Builtin",
            Value::Function(_) => "Function",
            Value::SExpr(_) => "S-Expression",
            Value::QExpr(_) => "Q-Expression",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Value::Builtin(_) | Value::Function(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            // Builtins compare by name, not function pointer
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            // Captured bindings are not part of a closure's identity
            (Value::Function(a), Value::Function(b)) => {
                a.formals == b.formals && a.body == b.body
            }
            (Value::SExpr(a), Value::SExpr(b)) => a == b,
            (Value::QExpr(a), Value::QExpr(b)) => a == b,
            _ => false,
        }
    }
}
