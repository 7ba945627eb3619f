//! Builtin procedure registry.
//!
//! Every primitive the language ships with is declared once in `BUILTIN_OPS`
//! and bound into the root scope by [`create_global_env`](crate::create_global_env).
//! A builtin is identified by its name: two `Builtin` values are equal when
//! their names are, whatever function they point to.
//!
//! ## Calling convention
//!
//! All builtins share the signature [`BuiltinFn`]. They receive the calling
//! [`Context`] and their arguments already evaluated, left to right, and own
//! them. The registry checks [`Arity`] before the function runs, so bodies
//! only validate types. Failures are returned as [`EvalError`] and become
//! `Error` values at the application boundary.
//!
//! ```text
//! (+ 1 2 3)                  ; arithmetic, checked for overflow
//! (head {1 2 3})             ; {1}
//! (def {x y} 1 2)            ; binds in the root scope
//! (if (> x y) {x} {y})       ; branches are data lists, evaluated on demand
//! ```
//!
//! ## Strictness
//!
//! - **No coercion**: `(+ 1 "1")` is a type error, `(== 1 true)` is false
//! - **Overflow detection**: arithmetic reports `i64` overflow instead of wrapping
//! - **Arity checking**: every builtin declares how many arguments it takes

use crate::Error;
use crate::ast::{Closure, NumberType, Value, unit};
use crate::error::EvalError;
use crate::evaluator::Context;
use crate::reader::parse_file;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Signature shared by every builtin, including host-registered ones
pub type BuiltinFn = fn(&Context<'_>, Vec<Value>) -> Result<Value, EvalError>;

/// Number of arguments a builtin accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn validate(&self, function: &'static str, got: usize) -> Result<(), EvalError> {
        let ok = match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(EvalError::WrongArity {
                function,
                expected: *self,
                got,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number"),
        }
    }
}

/// Definition of a builtin procedure
#[derive(Clone, Copy)]
pub struct BuiltinOp {
    /// The symbol the builtin is bound to, and its identity
    pub name: &'static str,
    /// Expected number of arguments
    pub arity: Arity,
    pub func: BuiltinFn,
}

impl fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl BuiltinOp {
    /// Check arity, then run the builtin
    pub fn call(&self, ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
        self.arity.validate(self.name, args.len())?;
        (self.func)(ctx, args)
    }
}

//
// Argument helpers
//

/// Move a vector whose length arity checking already fixed into an array
fn take<const N: usize>(
    function: &'static str,
    args: Vec<Value>,
) -> Result<[Value; N], EvalError> {
    args.try_into().map_err(|args: Vec<Value>| EvalError::WrongArity {
        function,
        expected: Arity::Exact(N),
        got: args.len(),
    })
}

fn number(function: &'static str, value: Value) -> Result<NumberType, EvalError> {
    match value {
        Value::Number(n) => Ok(n),
        other => Err(EvalError::type_mismatch(function, "Number", &other)),
    }
}

/// Numbers and booleans (as 0/1) for the ordering builtins
fn ordinal(function: &'static str, value: Value) -> Result<NumberType, EvalError> {
    match value {
        Value::Number(n) => Ok(n),
        Value::Bool(b) => Ok(NumberType::from(b)),
        other => Err(EvalError::type_mismatch(function, "Number", &other)),
    }
}

fn boolean(function: &'static str, value: Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::type_mismatch(function, "Boolean", &other)),
    }
}

fn string(function: &'static str, value: Value) -> Result<String, EvalError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(EvalError::type_mismatch(function, "String", &other)),
    }
}

fn data_list(function: &'static str, value: Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::QExpr(items) => Ok(items),
        other => Err(EvalError::type_mismatch(function, "Q-Expression", &other)),
    }
}

fn non_empty_list(function: &'static str, value: Value) -> Result<Vec<Value>, EvalError> {
    let items = data_list(function, value)?;
    if items.is_empty() {
        return Err(EvalError::EmptyList(function));
    }
    Ok(items)
}

/// Names in a data list, as used by `def`, `=`, `\` and `fun`
fn symbols(function: &'static str, items: Vec<Value>) -> Result<Vec<String>, EvalError> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Symbol(name) => Ok(name),
            other => Err(EvalError::InvalidFormal {
                function,
                got: other.type_name(),
            }),
        })
        .collect()
}

/// Type-check every argument before folding: `(+ 1 "a" (/ 1 0))` is a type error
fn numbers(function: &'static str, args: Vec<Value>) -> Result<Vec<NumberType>, EvalError> {
    args.into_iter().map(|arg| number(function, arg)).collect()
}

//
// Builtin Function Implementations
//

fn fold_numbers(
    function: &'static str,
    args: Vec<Value>,
    step: impl Fn(NumberType, NumberType) -> Result<NumberType, EvalError>,
) -> Result<Value, EvalError> {
    let mut iter = numbers(function, args)?.into_iter();
    let Some(first) = iter.next() else {
        return Err(EvalError::WrongArity {
            function,
            expected: Arity::AtLeast(1),
            got: 0,
        });
    };
    iter.try_fold(first, step).map(Value::Number)
}

/// Fold with a checked integer operation, reporting overflow under `function`
fn fold_checked(
    function: &'static str,
    args: Vec<Value>,
    op: fn(NumberType, NumberType) -> Option<NumberType>,
) -> Result<Value, EvalError> {
    fold_numbers(function, args, |acc, n| {
        op(acc, n).ok_or(EvalError::IntegerOverflow(function))
    })
}

fn builtin_add(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    fold_checked("+", args, NumberType::checked_add)
}

fn builtin_sub(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    if args.len() == 1 {
        let [n] = take("-", args)?;
        return number("-", n)?
            .checked_neg()
            .map(Value::Number)
            .ok_or(EvalError::IntegerOverflow("-"));
    }
    fold_checked("-", args, NumberType::checked_sub)
}

fn builtin_mul(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    fold_checked("*", args, NumberType::checked_mul)
}

fn builtin_div(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    fold_numbers("/", args, |acc, n| {
        if n == 0 {
            return Err(EvalError::DivisionByZero);
        }
        acc.checked_div(n).ok_or(EvalError::IntegerOverflow("/"))
    })
}

fn builtin_min(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    fold_numbers("min", args, |a, b| Ok(a.min(b)))
}

fn builtin_max(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    fold_numbers("max", args, |a, b| Ok(a.max(b)))
}

// Macro to generate the ordering comparisons
macro_rules! ordering_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
            let [a, b] = take($op_str, args)?;
            let (a, b) = (ordinal($op_str, a)?, ordinal($op_str, b)?);
            Ok(Value::Bool(a $op b))
        }
    };
}

ordering_comparison!(builtin_lt, <, "<");
ordering_comparison!(builtin_le, <=, "<=");
ordering_comparison!(builtin_gt, >, ">");
ordering_comparison!(builtin_ge, >=, ">=");

/// Structural equality never fails: values of different kinds are just unequal
fn builtin_eq(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [a, b] = take("==", args)?;
    Ok(Value::Bool(a == b))
}

fn builtin_ne(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [a, b] = take("!=", args)?;
    Ok(Value::Bool(a != b))
}

fn builtin_not(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [b] = take("not", args)?;
    Ok(Value::Bool(!boolean("not", b)?))
}

fn builtin_if(ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [cond, then_branch, else_branch] = take("if", args)?;
    let cond = boolean("if", cond)?;
    let then_branch = data_list("if", then_branch)?;
    let else_branch = data_list("if", else_branch)?;

    let chosen = if cond { then_branch } else { else_branch };
    Ok(ctx.eval(Value::SExpr(chosen)))
}

fn builtin_list(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::QExpr(args))
}

fn builtin_head(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [list] = take("head", args)?;
    let mut items = non_empty_list("head", list)?;
    items.truncate(1);
    Ok(Value::QExpr(items))
}

fn builtin_tail(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [list] = take("tail", args)?;
    let mut items = non_empty_list("tail", list)?;
    items.remove(0);
    Ok(Value::QExpr(items))
}

fn builtin_join(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(EvalError::EmptyJoin);
    }
    let lists = args
        .into_iter()
        .map(|arg| data_list("join", arg))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::QExpr(lists.into_iter().flatten().collect()))
}

fn builtin_cons(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [first, rest] = take("cons", args)?;
    let mut items = vec![first];
    items.extend(data_list("cons", rest)?);
    Ok(Value::QExpr(items))
}

fn builtin_len(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [list] = take("len", args)?;
    let count = data_list("len", list)?.len();
    NumberType::try_from(count)
        .map(Value::Number)
        .map_err(|_| EvalError::IntegerOverflow("len"))
}

fn builtin_eval(ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [list] = take("eval", args)?;
    let items = data_list("eval", list)?;
    Ok(ctx.eval(Value::SExpr(items)))
}

fn builtin_lambda(ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [formals, body] = take("\\", args)?;
    let formals = symbols("\\", data_list("\\", formals)?)?;
    let body = data_list("\\", body)?;
    Ok(Value::Function(Closure {
        formals,
        body,
        captured: ctx.env().local_bindings(),
    }))
}

/// Shared shape of `def` and `=`: a data list of names, then one value per name
fn bind(
    function: &'static str,
    ctx: &Context<'_>,
    args: Vec<Value>,
    global: bool,
) -> Result<Value, EvalError> {
    let mut args = args.into_iter();
    let Some(names) = args.next() else {
        return Err(EvalError::WrongArity {
            function,
            expected: Arity::AtLeast(1),
            got: 0,
        });
    };
    let names = symbols(function, data_list(function, names)?)?;
    let values: Vec<Value> = args.collect();
    if names.len() != values.len() {
        return Err(EvalError::BindingCountMismatch {
            function,
            names: names.len(),
            values: values.len(),
        });
    }

    debug!(function, ?names, "binding");
    for (name, value) in names.into_iter().zip(values) {
        if global {
            ctx.env().define_global(name, value);
        } else {
            ctx.env().define_local(name, value);
        }
    }
    Ok(unit())
}

fn builtin_def(ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    bind("def", ctx, args, true)
}

fn builtin_put(ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    bind("=", ctx, args, false)
}

/// `(fun {name formals...} body)` is `(def {name} (\ {formals...} body))`
fn builtin_fun(ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [header, body] = take("fun", args)?;
    let header = symbols("fun", data_list("fun", header)?)?;
    let body = data_list("fun", body)?;
    let Some((name, formals)) = header.split_first() else {
        return Err(EvalError::EmptyList("fun"));
    };

    debug!(%name, "defining function");
    let closure = Value::Function(Closure {
        formals: formals.to_vec(),
        body,
        captured: ctx.env().local_bindings(),
    });
    ctx.env().define_global(name.as_str(), closure);
    Ok(unit())
}

/// The line `print` writes: printed values separated by spaces, then a newline
fn print_line(args: &[Value]) -> String {
    let mut line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    line.push('\n');
    line
}

fn builtin_print(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    print!("{}", print_line(&args));
    Ok(unit())
}

fn builtin_error(_ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [message] = take("error", args)?;
    Ok(Value::Error(string("error", message)?))
}

/// Evaluate every expression of a file in the calling scope. Errors raised by
/// individual expressions are reported and skipped; only an unreadable or
/// unparsable file fails the call.
fn builtin_load(ctx: &Context<'_>, args: Vec<Value>) -> Result<Value, EvalError> {
    let [path] = take("load", args)?;
    let path = string("load", path)?;

    debug!(%path, "loading file");
    let exprs = parse_file(Path::new(&path)).map_err(|e| {
        EvalError::LoadFailed(match e {
            // Only the message: the context snippet spans several lines
            Error::Parse(parse_error) => parse_error.message,
            io_error => io_error.to_string(),
        })
    })?;

    for expr in exprs {
        let result = ctx.eval(expr);
        if result.is_error() {
            warn!(%path, %result, "expression in loaded file failed");
            println!("{result}");
        }
    }
    debug!(%path, "finished loading file");
    Ok(unit())
}

/// Global registry of all builtin operations, in the order they are bound
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn op(name: &'static str, arity: Arity, func: BuiltinFn) -> BuiltinOp {
        BuiltinOp { name, arity, func }
    }

    vec![
        // Arithmetic
        op("+", Arity::AtLeast(1), builtin_add),
        op("-", Arity::AtLeast(1), builtin_sub),
        op("*", Arity::AtLeast(1), builtin_mul),
        op("/", Arity::AtLeast(1), builtin_div),
        op("min", Arity::AtLeast(1), builtin_min),
        op("max", Arity::AtLeast(1), builtin_max),
        // Comparison
        op("<", Arity::Exact(2), builtin_lt),
        op("<=", Arity::Exact(2), builtin_le),
        op(">", Arity::Exact(2), builtin_gt),
        op(">=", Arity::Exact(2), builtin_ge),
        op("==", Arity::Exact(2), builtin_eq),
        op("!=", Arity::Exact(2), builtin_ne),
        // Logic and control
        op("not", Arity::Exact(1), builtin_not),
        op("if", Arity::Exact(3), builtin_if),
        // Data lists
        op("list", Arity::Any, builtin_list),
        op("head", Arity::Exact(1), builtin_head),
        op("tail", Arity::Exact(1), builtin_tail),
        // Zero arguments is its own error, not an arity error
        op("join", Arity::Any, builtin_join),
        op("cons", Arity::Exact(2), builtin_cons),
        op("len", Arity::Exact(1), builtin_len),
        op("eval", Arity::Exact(1), builtin_eval),
        // Functions and bindings
        op("\\", Arity::Exact(2), builtin_lambda),
        op("def", Arity::AtLeast(1), builtin_def),
        op("=", Arity::AtLeast(1), builtin_put),
        op("fun", Arity::Exact(2), builtin_fun),
        // Input and output
        op("print", Arity::Any, builtin_print),
        op("error", Arity::Exact(1), builtin_error),
        op("load", Arity::Exact(1), builtin_load),
    ]
});

/// Lazy static map from name to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.name, op)).collect()
    });

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by the name it is bound to
pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}
