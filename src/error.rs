//! Language-level failures.
//!
//! Builtins and the evaluator report problems as [`EvalError`] internally so
//! they can use `?`, but nothing here ever escapes to the host: at the
//! application boundary every `EvalError` is rendered into a
//! [`Value::Error`] and continues through reduction as data.

use crate::ast::Value;
use crate::builtinops::Arity;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unbound symbol '{0}'")]
    UnboundSymbol(String),
    #[error("function '{function}' passed incorrect type: expected {expected}, got {got}")]
    TypeMismatch {
        function: &'static str,
        expected: &'static str,
        got: &'static str,
    },
    #[error("function '{function}' passed incorrect number of arguments: expected {expected}, got {got}")]
    WrongArity {
        function: &'static str,
        expected: Arity,
        got: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in '{0}'")]
    IntegerOverflow(&'static str),
    #[error("S-expression does not start with a function: got {0}")]
    NotApplicable(&'static str),
    #[error("function passed too many arguments: got {got}, expected {expected}")]
    TooManyArguments { got: usize, expected: usize },
    #[error("function '{function}' cannot bind non-symbol: got {got}")]
    InvalidFormal {
        function: &'static str,
        got: &'static str,
    },
    #[error("function format invalid: symbol '&' not followed by single symbol")]
    MalformedVariadic,
    #[error("function '{0}' passed {{}}")]
    EmptyList(&'static str),
    #[error("function 'join' passed no arguments")]
    EmptyJoin,
    #[error("function '{function}' cannot bind {names} names to {values} values")]
    BindingCountMismatch {
        function: &'static str,
        names: usize,
        values: usize,
    },
    #[error("load failed: {0}")]
    LoadFailed(String),
    #[error("evaluation depth limit exceeded (max: {0})")]
    DepthLimitExceeded(usize),
}

impl EvalError {
    /// Shorthand for the most common failure: a builtin saw the wrong kind of value
    pub(crate) fn type_mismatch(
        function: &'static str,
        expected: &'static str,
        got: &Value,
    ) -> Self {
        EvalError::TypeMismatch {
            function,
            expected,
            got: got.type_name(),
        }
    }
}

impl From<EvalError> for Value {
    fn from(err: EvalError) -> Self {
        Value::Error(err.to_string())
    }
}
