use crate::ast::Value;
use crate::builtinops::{Arity, BuiltinFn, BuiltinOp};
use crate::error::EvalError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to a scope.
///
/// Call scopes hold their parent through this handle, so a scope lives
/// exactly as long as its longest-living holder. Values never hold one.
pub type Env = Rc<Scope>;

/// Environment for variable bindings
///
/// Bindings are mutated through a shared reference: every call scope links to
/// the same root, and all of them observe later definitions in it.
#[derive(Default)]
pub struct Scope {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Env>,
}

impl Scope {
    /// A root scope with no parent and no bindings
    pub fn new() -> Self {
        Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }
    }

    pub fn with_parent(parent: Env) -> Self {
        Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent),
        }
    }

    pub fn parent(&self) -> Option<&Env> {
        self.parent.as_ref()
    }

    /// Insert or overwrite `name` in this scope's own bindings
    pub fn define_local(&self, name: impl Into<String>, value: Value) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Bind `name` in the root of this scope's chain, regardless of depth
    pub fn define_global(&self, name: impl Into<String>, value: Value) {
        match &self.parent {
            Some(parent) => parent.define_global(name, value),
            None => self.define_local(name, value),
        }
    }

    /// Resolve `name` through the chain, innermost binding first
    ///
    /// The caller receives its own copy of the bound value.
    pub fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.bindings.borrow().get(name) {
            return Ok(value.clone());
        }
        match &self.parent {
            Some(parent) => parent.lookup(name),
            None => Err(EvalError::UnboundSymbol(name.to_owned())),
        }
    }

    /// The root scope at the top of this scope's chain
    pub fn root(self: &Rc<Self>) -> Env {
        match &self.parent {
            Some(parent) => parent.root(),
            None => Rc::clone(self),
        }
    }

    /// Copies of the bindings visible from this scope, excluding the root's,
    /// sorted by name with inner bindings shadowing outer ones.
    ///
    /// This is what a closure defined here captures.
    pub fn local_bindings(&self) -> Vec<(String, Value)> {
        let Some(parent) = &self.parent else {
            return Vec::new();
        };
        let mut bindings: HashMap<String, Value> = parent.local_bindings().into_iter().collect();
        for (name, value) in self.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Register a host-provided builtin under `name` in this scope.
    ///
    /// The function receives the evaluation context and its already evaluated
    /// arguments, after `arity` has been checked. Builtins compare by name,
    /// so registering a different function under an existing builtin's name
    /// makes the two indistinguishable to `==`.
    ///
    /// # Example
    /// ```
    /// use lispy::builtinops::Arity;
    /// use lispy::evaluator::Context;
    /// use lispy::{EvalError, Value, create_global_env, eval_program};
    ///
    /// fn answer(_ctx: &Context<'_>, _args: Vec<Value>) -> Result<Value, EvalError> {
    ///     Ok(Value::Number(42))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin("answer", Arity::Exact(0), answer);
    /// let results = eval_program(&env, "(answer)").unwrap();
    /// assert_eq!(results, vec![Value::Number(42)]);
    /// ```
    pub fn register_builtin(&self, name: &'static str, arity: Arity, func: BuiltinFn) {
        self.define_local(name, Value::Builtin(BuiltinOp { name, arity, func }));
    }

    /// Get all bindings visible from this scope
    /// Returns a Vec of (name, value) pairs sorted by name, inner bindings shadowing outer ones
    pub fn bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        if let Some(parent) = &self.parent {
            for (name, value) in parent.bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in self.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}
