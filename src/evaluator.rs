use crate::ast::{Closure, VARIADIC_MARKER, Value};
use crate::builtinops::get_builtin_ops;
use crate::error::EvalError;
use crate::reader::parse_program;
use crate::scope::{Env, Scope};
use crate::{MAX_EVAL_DEPTH, ParseError};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, warn};

/// Minimum stack space to keep available before recursing (100KB red zone)
const RED_ZONE: usize = 100 * 1024;

/// Stack space allocated each time the red zone is reached (1MB)
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// What a builtin sees of the evaluation that invoked it: the calling scope
/// and the current nesting depth.
pub struct Context<'a> {
    env: &'a Env,
    depth: usize,
}

impl<'a> Context<'a> {
    pub(crate) fn new(env: &'a Env, depth: usize) -> Self {
        Context { env, depth }
    }

    /// The scope the builtin was called from
    pub fn env(&self) -> &'a Env {
        self.env
    }

    /// Evaluate `value` in the calling scope, one level deeper
    pub fn eval(&self, value: Value) -> Value {
        let depth = self.depth + 1;
        if depth > MAX_EVAL_DEPTH {
            return depth_exceeded(depth).into();
        }
        eval_with_depth_tracking(self.env, value, depth)
    }
}

/// Evaluate a value (public API)
pub fn eval(env: &Env, expr: Value) -> Value {
    eval_with_depth_tracking(env, expr, 0)
}

/// Parse `input` as a program and evaluate each top-level expression in
/// order, returning every result. Nothing is evaluated if parsing fails.
pub fn eval_program(env: &Env, input: &str) -> Result<Vec<Value>, ParseError> {
    let exprs = parse_program(input)?;
    Ok(exprs.into_iter().map(|expr| eval(env, expr)).collect())
}

/// Evaluate a value at `depth`. Sub-expressions share their parent's depth;
/// only closure application and `Context::eval` go one level deeper.
fn eval_with_depth_tracking(env: &Env, expr: Value, depth: usize) -> Value {
    match expr {
        // Look-up is substitution: the caller owns the returned copy
        Value::Symbol(name) => env.lookup(&name).unwrap_or_else(Value::from),

        Value::SExpr(elements) => stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || {
            eval_sexpr(env, elements, depth)
        }),

        // Everything else, data lists included, is self-evaluating
        other => other,
    }
}

/// Reduce an S-expression: evaluate every element left to right, surface the
/// first error, then apply the head to the rest.
fn eval_sexpr(env: &Env, elements: Vec<Value>, depth: usize) -> Value {
    let mut evaluated: Vec<Value> = elements
        .into_iter()
        .map(|element| eval_with_depth_tracking(env, element, depth))
        .collect();

    if let Some(pos) = evaluated.iter().position(Value::is_error) {
        return evaluated.swap_remove(pos);
    }

    if evaluated.is_empty() {
        return Value::SExpr(evaluated);
    }

    let mut items = evaluated.into_iter();
    let Some(head) = items.next() else {
        return Value::SExpr(Vec::new());
    };
    let args: Vec<Value> = items.collect();

    // A lone procedure is applied to nothing; any other lone value is just grouped
    if args.is_empty() && !head.is_procedure() {
        return eval_with_depth_tracking(env, head, depth);
    }

    apply(env, head, args, depth)
}

/// Apply a procedure to already evaluated arguments
fn apply(env: &Env, func: Value, args: Vec<Value>, depth: usize) -> Value {
    let result = match func {
        Value::Builtin(op) => {
            debug!(builtin = op.name, args = args.len(), "applying builtin");
            op.call(&Context::new(env, depth), args)
        }
        Value::Function(closure) => apply_closure(env, closure, args, depth),
        other => Err(EvalError::NotApplicable(other.type_name())),
    };
    result.unwrap_or_else(Value::from)
}

/// Bind arguments to formals in a fresh call scope.
///
/// The call scope starts from the closure's captured bindings and links to
/// the root of the calling scope, so global names resolve at call time.
/// Supplying fewer arguments than formals yields a new closure capturing the
/// partially populated scope; `&` collects every remaining argument into a
/// data list bound to the single formal that follows it.
fn apply_closure(
    env: &Env,
    closure: Closure,
    args: Vec<Value>,
    depth: usize,
) -> Result<Value, EvalError> {
    let Closure {
        formals,
        body,
        captured,
    } = closure;
    let given = args.len();
    let total = formals.len();

    let call_env = Rc::new(Scope::with_parent(env.root()));
    for (name, value) in captured {
        call_env.define_local(name, value);
    }
    let mut formals: VecDeque<String> = formals.into();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let Some(formal) = formals.pop_front() else {
            return Err(EvalError::TooManyArguments {
                got: given,
                expected: total,
            });
        };

        if formal == VARIADIC_MARKER {
            let rest_name = take_rest_formal(&mut formals)?;
            let mut rest = vec![arg];
            rest.extend(args.by_ref());
            call_env.define_local(rest_name, Value::QExpr(rest));
            break;
        }

        call_env.define_local(formal, arg);
    }

    // Arguments ran out right before the rest parameter: it collects nothing
    if formals.front().is_some_and(|f| f == VARIADIC_MARKER) {
        formals.pop_front();
        let rest_name = take_rest_formal(&mut formals)?;
        call_env.define_local(rest_name, Value::QExpr(Vec::new()));
    }

    if !formals.is_empty() {
        debug!(given, remaining = formals.len(), "partially applying function");
        return Ok(Value::Function(Closure {
            formals: formals.into(),
            body,
            captured: call_env.local_bindings(),
        }));
    }

    let depth = depth + 1;
    if depth > MAX_EVAL_DEPTH {
        return Err(depth_exceeded(depth));
    }
    debug!(given, depth, "applying function");
    Ok(eval_with_depth_tracking(&call_env, Value::SExpr(body), depth))
}

fn depth_exceeded(depth: usize) -> EvalError {
    warn!(depth, "evaluation depth limit exceeded");
    EvalError::DepthLimitExceeded(MAX_EVAL_DEPTH)
}

/// After `&` exactly one formal, the rest parameter, must remain
fn take_rest_formal(formals: &mut VecDeque<String>) -> Result<String, EvalError> {
    match formals.pop_front() {
        Some(name) if formals.is_empty() && name != VARIADIC_MARKER => Ok(name),
        _ => Err(EvalError::MalformedVariadic),
    }
}

/// Create a root scope with every builtin bound
pub fn create_global_env() -> Env {
    let env = Rc::new(Scope::new());
    for op in get_builtin_ops() {
        env.define_local(op.name, Value::Builtin(*op));
    }
    env
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{qexpr, sexpr, sym, unit, val};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Weak;

    /// Evaluate a whole program in a fresh environment and return the last result
    fn run(program: &str) -> Value {
        let env = create_global_env();
        eval_program(&env, program).unwrap().pop().unwrap()
    }

    /// Run data-driven cases of (program, expected printed result)
    fn run_eval_tests(test_cases: Vec<(&str, &str)>) {
        for (i, (program, expected)) in test_cases.iter().enumerate() {
            let result = run(program);
            assert_eq!(
                format!("{result}"),
                *expected,
                "Eval test #{} failed for: {program}",
                i + 1
            );
        }
    }

    #[test]
    fn test_self_evaluating_values() {
        let env = create_global_env();
        for value in [
            val(1),
            val(true),
            val("text"),
            qexpr(vec![sym("undefined"), sexpr(vec![sym("+")])]),
            Value::Error("kept".into()),
        ] {
            assert_eq!(eval(&env, value.clone()), value);
        }
    }

    #[test]
    fn test_sexpr_reduction_rules() {
        run_eval_tests(vec![
            // Empty expression is its own value
            ("()", "()"),
            // Singletons group
            ("(5)", "5"),
            ("((((5))))", "5"),
            ("({1 2})", "{1 2}"),
            // Nested application, left to right
            ("(+ 1 (* 2 3) (- 10 4))", "13"),
            // Head must be a procedure
            (
                "(1 2 3)",
                "Error: S-expression does not start with a function: got Number",
            ),
            (
                "({+} 1)",
                "Error: S-expression does not start with a function: got Q-Expression",
            ),
            // Unbound symbols
            ("(undefined 1)", "Error: unbound symbol 'undefined'"),
            ("nope", "Error: unbound symbol 'nope'"),
            // A lone procedure is applied to no arguments
            ("(list)", "{}"),
            ("(join)", "Error: function 'join' passed no arguments"),
        ]);
    }

    #[test]
    fn test_first_error_wins() {
        run_eval_tests(vec![
            ("(+ 1 (error \"boom\") (/ 1 0))", "Error: boom"),
            ("(+ 1 (/ 1 0) (error \"boom\"))", "Error: division by zero"),
            ("(list 1 x (error \"later\"))", "Error: unbound symbol 'x'"),
        ]);
    }

    #[test]
    fn test_closure_application() {
        run_eval_tests(vec![
            ("((\\ {x} {* x x}) 7)", "49"),
            ("((\\ {a b} {- a b}) 10 3)", "7"),
            // Zero formals, zero arguments
            ("((\\ {} {+ 1 2}))", "3"),
            (
                "((\\ {a} {a}) 1 2)",
                "Error: function passed too many arguments: got 2, expected 1",
            ),
            // Closures capture the local bindings of the call defining them
            (
                "(def {make-adder} (\\ {n} {\\ {x} {+ x n}})) ((make-adder 10) 5)",
                "15",
            ),
            // ...as copies taken when the closure is built
            (
                "(fun {snapshot} {list (= {y} 1) (= {g} (\\ {} {y})) (= {y} 2) (g)}) (snapshot)",
                "{() () () 1}",
            ),
            // Caller locals stay invisible to the callee
            (
                "(fun {peek} {secret}) (fun {hide secret} {peek}) (hide 1)",
                "Error: unbound symbol 'secret'",
            ),
        ]);
    }

    #[test]
    fn test_variadic_binding() {
        run_eval_tests(vec![
            ("((\\ {x & xs} {xs}) 1 2 3)", "{2 3}"),
            ("((\\ {x & xs} {xs}) 1)", "{}"),
            ("((\\ {& xs} {xs}))", "{}"),
            ("((\\ {& xs} {xs}) 1 {2})", "{1 {2}}"),
            ("((\\ {x & xs} {x}) 1 2 3)", "1"),
            (
                "((\\ {x &} {x}) 1 2)",
                "Error: function format invalid: symbol '&' not followed by single symbol",
            ),
            (
                "((\\ {& a b} {a}) 1 2)",
                "Error: function format invalid: symbol '&' not followed by single symbol",
            ),
            (
                "((\\ {x & a b} {x}) 1)",
                "Error: function format invalid: symbol '&' not followed by single symbol",
            ),
        ]);
    }

    #[test]
    fn test_partial_application() {
        let env = create_global_env();
        let results = eval_program(
            &env,
            "(def {add} (\\ {a b} {+ a b}))
             (def {inc} (add 1))
             inc
             (inc 2)
             ((add 10) 20)
             (((\\ {a b c} {list a b c}) 1) 2 3)
             ((\\ {a b & rest} {rest}) 1)",
        )
        .unwrap();

        assert!(matches!(&results[2], Value::Function(c) if c.formals == vec!["b".to_owned()]));
        assert_eq!(results[3], val(3));
        assert_eq!(results[4], val(30));
        assert_eq!(results[5], val([1, 2, 3]));
        assert!(matches!(&results[6], Value::Function(c) if c.formals.len() == 3));

        // The original closure is untouched by partial application
        assert_eq!(eval_program(&env, "(add 2 3)").unwrap(), vec![val(5)]);
    }

    #[test]
    fn test_call_scope_is_discarded() {
        let env = create_global_env();
        let results = eval_program(
            &env,
            "(def {x} 1)
             (def {shadow} (\\ {} {= {x} 2}))
             (shadow)
             x
             (def {local} (\\ {} {= {g} 5}))
             (local)
             g
             (def {global} (\\ {} {def {h} 6}))
             (global)
             h",
        )
        .unwrap();

        assert_eq!(results[3], val(1));
        assert_eq!(results[6], Value::Error("unbound symbol 'g'".into()));
        assert_eq!(results[9], val(6));
    }

    #[test]
    fn test_late_binding_through_shared_scope() {
        // `is-even` refers to `is-odd` before it exists
        run_eval_tests(vec![(
            "(fun {is-even n} {if (== n 0) {true} {is-odd (- n 1)}})
             (fun {is-odd n} {if (== n 0) {false} {is-even (- n 1)}})
             (list (is-even 10) (is-odd 7) (is-even 3))",
            "{true true false}",
        )]);
    }

    #[test]
    fn test_recursion() {
        run_eval_tests(vec![
            (
                "(fun {fact n} {if (<= n 1) {1} {* n (fact (- n 1))}}) (fact 20)",
                "2432902008176640000",
            ),
            (
                "(fun {len l} {if (== l {}) {0} {+ 1 (len (tail l))}}) (len {1 2 3 4 5})",
                "5",
            ),
        ]);
    }

    #[test]
    fn test_deep_recursion() {
        run_eval_tests(vec![(
            "(fun {count n} {if (== n 0) {0} {+ 1 (count (- n 1))}}) (count 10000)",
            "10000",
        )]);
    }

    #[test]
    fn test_runaway_recursion_yields_error() {
        let result = run("(fun {forever x} {forever x}) (forever 1)");
        assert_eq!(
            result,
            Value::Error(format!(
                "evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
            ))
        );
    }

    #[test]
    fn test_root_scope_is_freed_with_its_last_handle() {
        let env = create_global_env();
        let root = Rc::downgrade(&env);
        eval_program(&env, "(fun {f x} {x}) (def {g} (f)) (f 1)").unwrap();

        drop(env);
        assert!(root.upgrade().is_none());
    }

    thread_local! {
        static LAST_CALL_SCOPE: RefCell<Option<Weak<Scope>>> = const { RefCell::new(None) };
    }

    fn builtin_remember_scope(ctx: &Context<'_>, _args: Vec<Value>) -> Result<Value, EvalError> {
        LAST_CALL_SCOPE.with(|last| *last.borrow_mut() = Some(Rc::downgrade(ctx.env())));
        Ok(unit())
    }

    #[test]
    fn test_call_scope_is_freed_after_the_call() {
        let env = create_global_env();
        env.register_builtin(
            "remember-scope",
            crate::builtinops::Arity::Exact(0),
            builtin_remember_scope,
        );

        // A closure stored into the call scope it was built in
        let results = eval_program(
            &env,
            "((\\ {} {list (= {g} (\\ {} {g})) (remember-scope)}))",
        )
        .unwrap();
        assert_eq!(results, vec![qexpr(vec![unit(), unit()])]);

        let call_scope = LAST_CALL_SCOPE.with(|last| last.borrow_mut().take()).unwrap();
        assert!(call_scope.upgrade().is_none());

        let handles = Rc::strong_count(&env);
        for _ in 0..100 {
            eval_program(&env, "((\\ {} {= {g} (\\ {} {g})}))").unwrap();
        }
        assert_eq!(Rc::strong_count(&env), handles);
    }

    #[test]
    fn test_global_env_holds_builtins() {
        let env = create_global_env();
        assert!(matches!(env.lookup("+").unwrap(), Value::Builtin(op) if op.name == "+"));
        assert_eq!(env.lookup("+").unwrap(), env.lookup("+").unwrap());
        assert_ne!(env.lookup("+").unwrap(), env.lookup("-").unwrap());
        assert_eq!(eval(&env, sexpr(vec![sym("def"), val([sym("z")]), val(1)])), unit());
        assert_eq!(env.lookup("z").unwrap(), val(1));
    }
}
