//! The universal tagged datum and the environment chain.
//!
//! Every stage of the pipeline traffics in [`Value`]: the parser produces
//! one, the macro expander and CPS transformer rewrite one into another,
//! and evaluation yields one. Aggregate payloads sit behind `Rc`, so
//! cloning a value is cheap and pairs form shared graphs without copying.
//!
//! Lists are the recursive view over pairs: a value is a list if it is the
//! empty list or a pair whose cdr is itself a list. Pairs with a non-list
//! cdr (improper lists) are permitted and are what variadic parameter
//! forms parse into.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::analyzer::AnalyzedExpr;
use crate::number::Number;
use crate::port::Port;

/// A cons cell. Both fields are full values; `cdr` need not be a list.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

/// A user-defined procedure: parameter names, the analyzed body sequence,
/// and the captured environment. When `has_tail` is set the last parameter
/// receives a list of all surplus arguments, so the fixed arity is
/// `params.len() - 1`.
pub struct Procedure {
    pub params: Vec<String>,
    pub has_tail: bool,
    pub body: Rc<AnalyzedExpr>,
    pub env: Rc<Environment>,
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("params", &self.params)
            .field("has_tail", &self.has_tail)
            .finish_non_exhaustive()
    }
}

/// A native built-in. The function payload is a trait object so the
/// evaluator can synthesize primitives that capture state, such as the
/// halt continuation handed to the CPS pass.
pub struct Primitive {
    pub name: &'static str,
    pub n_args: usize,
    pub has_tail: bool,
    pub func: Box<dyn Fn(&[Value]) -> Result<Value, Error>>,
}

impl Primitive {
    pub fn new(
        name: &'static str,
        n_args: usize,
        has_tail: bool,
        func: impl Fn(&[Value]) -> Result<Value, Error> + 'static,
    ) -> Value {
        Value::Primitive(Rc::new(Primitive {
            name,
            n_args,
            has_tail,
            func: Box::new(func),
        }))
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Primitive({})", self.name)
    }
}

/// The universal datum.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Number(Number),
    Char(char),
    Str(String),
    Symbol(String),
    Pair(Rc<Pair>),
    EmptyList,
    Vector(Rc<Vec<Value>>),
    ByteVector(Rc<Vec<u8>>),
    Procedure(Rc<Procedure>),
    Primitive(Rc<Primitive>),
    /// A compound procedure used as a syntax transformer; it receives the
    /// raw, unevaluated argument list of its call site.
    Macro(Rc<Procedure>),
    Environment(Rc<Environment>),
    Port(Rc<RefCell<Port>>),
    /// Sentinel returned by `read` at end of stream.
    Eof,
    /// The result of `define` and friends; the REPL never prints it.
    Unspecified,
}

pub fn cons(car: Value, cdr: Value) -> Value {
    Value::Pair(Rc::new(Pair { car, cdr }))
}

/// Build a proper list from a vector, consing right to left.
pub fn vec_to_list(items: Vec<Value>) -> Value {
    items
        .into_iter()
        .rev()
        .fold(Value::EmptyList, |acc, v| cons(v, acc))
}

/// Build an improper list: the last element becomes the final cdr.
pub fn vec_to_improper_list(mut items: Vec<Value>) -> Value {
    match items.pop() {
        None => Value::EmptyList,
        Some(tail) => items.into_iter().rev().fold(tail, |acc, v| cons(v, acc)),
    }
}

impl Value {
    /// Flatten a pair spine into a vector. An improper tail is appended as
    /// the final element, matching the list walk everywhere else in the
    /// pipeline.
    pub fn list_to_vec(&self) -> Vec<Value> {
        let mut items = Vec::new();
        let mut cur = self.clone();
        loop {
            match cur {
                Value::Pair(p) => {
                    items.push(p.car.clone());
                    cur = p.cdr.clone();
                }
                Value::EmptyList => break,
                other => {
                    items.push(other);
                    break;
                }
            }
        }
        items
    }

    pub fn is_empty_list(&self) -> bool {
        matches!(self, Value::EmptyList)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::Pair(_) | Value::EmptyList)
    }

    /// True iff the pair spine ends in the empty list.
    pub fn is_proper_list(&self) -> bool {
        let mut cur = self;
        while let Value::Pair(p) = cur {
            cur = &p.cdr;
        }
        matches!(cur, Value::EmptyList)
    }

    /// True iff this is a non-empty list whose head is the given symbol.
    pub fn is_tagged(&self, tag: &str) -> bool {
        if let Value::Pair(p) = self
            && let Value::Symbol(s) = &p.car
        {
            s == tag
        } else {
            false
        }
    }

    /// Everything except `#f` counts as true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(_) => "num",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::Symbol(_) => "identifier",
            Value::Pair(_) | Value::EmptyList => "list",
            Value::Vector(_) => "vector",
            Value::ByteVector(_) => "b-vector",
            Value::Procedure(_) => "procedure",
            Value::Primitive(_) => "primitive",
            Value::Macro(_) => "macro",
            Value::Environment(_) => "environment",
            Value::Port(_) => "port",
            Value::Eof => "eof",
            Value::Unspecified => "unspecified",
        }
    }

    /// Identity comparison, the semantics of the `eq?` primitive: atoms by
    /// value, aggregates by pointer.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::EmptyList, Value::EmptyList) => true,
            (Value::Vector(a), Value::Vector(b)) => Rc::ptr_eq(a, b),
            (Value::ByteVector(a), Value::ByteVector(b)) => Rc::ptr_eq(a, b),
            (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
            (Value::Primitive(a), Value::Primitive(b)) => a.name == b.name,
            (Value::Macro(a), Value::Macro(b)) => Rc::ptr_eq(a, b),
            (Value::Environment(a), Value::Environment(b)) => Rc::ptr_eq(a, b),
            (Value::Port(a), Value::Port(b)) => Rc::ptr_eq(a, b),
            (Value::Eof, Value::Eof) => true,
            _ => false,
        }
    }
}

/// Structural equality for data. Procedures, macros, environments and
/// ports only compare equal to themselves; `Unspecified` never compares
/// equal to anything, itself included.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => a.car == b.car && a.cdr == b.cdr,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::ByteVector(a), Value::ByteVector(b)) => a == b,
            (Value::Unspecified, _) | (_, Value::Unspecified) => false,
            _ => self.identical(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Number(n) => write!(f, "{n}"),
            Value::Char(c) => match c {
                ' ' => write!(f, "#\\space"),
                '\n' => write!(f, "#\\newline"),
                '\t' => write!(f, "#\\tab"),
                c => write!(f, "#\\{c}"),
            },
            Value::Str(s) => {
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
            Value::Pair(p) => {
                write!(f, "({}", p.car)?;
                let mut cur = p.cdr.clone();
                loop {
                    match cur {
                        Value::Pair(q) => {
                            write!(f, " {}", q.car)?;
                            cur = q.cdr.clone();
                        }
                        Value::EmptyList => return write!(f, ")"),
                        other => return write!(f, " . {other})"),
                    }
                }
            }
            Value::EmptyList => write!(f, "()"),
            Value::Vector(items) => {
                write!(f, "#(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::ByteVector(bytes) => {
                write!(f, "#u8(")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{b}")?;
                }
                write!(f, ")")
            }
            Value::Procedure(_) => write!(f, "#<proc>"),
            Value::Primitive(_) => write!(f, "#<primitive>"),
            Value::Macro(_) => write!(f, "#<macro>"),
            Value::Environment(_) => write!(f, "#<environment>"),
            Value::Port(_) => write!(f, "#<port>"),
            Value::Eof => write!(f, "#<eof>"),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

/// A frame of name-to-value bindings plus a reference to the enclosing
/// frame. Lookups walk outward to the first match. `define` always writes
/// the innermost frame; [`Environment::set`] rewrites the binding wherever
/// it lives and errors when the name is bound nowhere.
#[derive(Debug, Default)]
pub struct Environment {
    bindings: RefCell<HashMap<String, Value>>,
    outer: Option<Rc<Environment>>,
}

impl Environment {
    pub fn new() -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            outer: None,
        })
    }

    pub fn with_outer(outer: Rc<Environment>) -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            outer: Some(outer),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.bindings.borrow().get(name) {
            Some(v.clone())
        } else if let Some(outer) = &self.outer {
            outer.lookup(name)
        } else {
            None
        }
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        if self.bindings.borrow().contains_key(name) {
            self.bindings.borrow_mut().insert(name.to_string(), value);
            Ok(())
        } else if let Some(outer) = &self.outer {
            outer.set(name, value)
        } else {
            Err(Error::Unbound(name.to_string()))
        }
    }
}

/// Helper for building symbols in tests and synthesized forms.
pub fn sym(name: impl AsRef<str>) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper for building integer values.
pub fn int(n: i64) -> Value {
    Value::Number(Number::Int(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_round_trip() {
        let v = vec_to_list(vec![sym("a"), int(1), Value::Bool(true)]);
        assert_eq!(v.list_to_vec(), vec![sym("a"), int(1), Value::Bool(true)]);
        assert!(v.is_list());
        assert!(!v.is_empty_list());
        assert!(vec_to_list(vec![]).is_empty_list());
    }

    #[test]
    fn test_improper_list() {
        let v = vec_to_improper_list(vec![sym("a"), sym("b"), sym("rest")]);
        assert_eq!(v.to_string(), "(a b . rest)");
        // the improper tail comes back as the final element
        assert_eq!(v.list_to_vec(), vec![sym("a"), sym("b"), sym("rest")]);
    }

    #[test]
    fn test_display() {
        let cases = vec![
            (int(42), "42"),
            (Value::Number(Number::Real(0.5)), "0.5"),
            (Value::Bool(true), "#t"),
            (Value::Bool(false), "#f"),
            (Value::Char('a'), "#\\a"),
            (Value::Char(' '), "#\\space"),
            (Value::Str("a\"b".into()), "\"a\\\"b\""),
            (Value::EmptyList, "()"),
            (vec_to_list(vec![int(1), int(2), int(3)]), "(1 2 3)"),
            (cons(int(1), int(2)), "(1 . 2)"),
            (
                Value::Vector(Rc::new(vec![int(1), sym("x")])),
                "#(1 x)",
            ),
            (Value::Eof, "#<eof>"),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn test_tagged() {
        let quoted = vec_to_list(vec![sym("quote"), sym("x")]);
        assert!(quoted.is_tagged("quote"));
        assert!(!quoted.is_tagged("quasiquote"));
        assert!(!Value::EmptyList.is_tagged("quote"));
        assert!(!sym("quote").is_tagged("quote"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::EmptyList.is_truthy());
        assert!(int(0).is_truthy());
    }

    #[test]
    fn test_identity_vs_structural_equality() {
        let a = vec_to_list(vec![int(1), int(2)]);
        let b = vec_to_list(vec![int(1), int(2)]);
        assert_eq!(a, b, "structural equality recurses through pairs");
        assert!(!a.identical(&b), "distinct pairs are not eq?");
        assert!(a.identical(&a.clone()), "a cloned pair shares its cell");
        assert!(int(3).identical(&int(3)));
        assert!(!int(3).identical(&Value::Number(Number::Real(3.0))));
    }

    #[test]
    fn test_environment_define_and_lookup() {
        let outer = Environment::new();
        outer.define("x", int(1));
        let inner = Environment::with_outer(outer.clone());
        assert_eq!(inner.lookup("x"), Some(int(1)));

        // define shadows in the innermost frame only
        inner.define("x", int(2));
        assert_eq!(inner.lookup("x"), Some(int(2)));
        assert_eq!(outer.lookup("x"), Some(int(1)));
    }

    #[test]
    fn test_environment_set_walks_outward() {
        let outer = Environment::new();
        outer.define("x", int(1));
        let inner = Environment::with_outer(outer.clone());

        inner.set("x", int(5)).unwrap();
        assert_eq!(outer.lookup("x"), Some(int(5)));

        assert_eq!(
            inner.set("missing", int(0)),
            Err(Error::Unbound("missing".into()))
        );
    }
}
