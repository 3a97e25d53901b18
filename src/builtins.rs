//! The global primitive table.
//!
//! Primitives are synchronous and never see a continuation: the CPS pass
//! keeps an application of one of these names in the `(K (p a ...))`
//! shape, and the analyzer calls the native function directly. Fixed
//! arity is enforced here against `n_args`; variadic primitives
//! (`has_tail`) accept any count.

use std::process;
use std::rc::Rc;

use crate::Error;
use crate::analyzer::analyze;
use crate::number::Number;
use crate::port;
use crate::value::{Environment, Primitive, Value, cons, vec_to_list};

/// Names bound in the global primitive frame. The CPS transformer
/// consults this list, so it must stay in step with
/// [`global_environment`].
pub const PRIMITIVE_NAMES: &[&str] = &[
    "cons",
    "car",
    "cdr",
    "list",
    "eq?",
    "pair?",
    "null?",
    "symbol?",
    "string?",
    "number?",
    "symbol->string",
    "+",
    "-",
    "*",
    "/",
    "floor",
    "ceiling",
    "read",
    "write",
    "eval",
    "quit",
    "exit",
    "open-input-file",
    "close-port",
    "eof-object",
    "eof-object?",
    "null-environment",
];

pub fn is_primitive_name(name: &str) -> bool {
    PRIMITIVE_NAMES.contains(&name)
}

/// Build the outermost environment frame holding every primitive.
pub fn global_environment() -> Rc<Environment> {
    let env = Environment::new();

    env.define("cons", Primitive::new("cons", 2, false, |args| {
        Ok(cons(args[0].clone(), args[1].clone()))
    }));
    env.define("car", Primitive::new("car", 1, false, car));
    env.define("cdr", Primitive::new("cdr", 1, false, cdr));
    env.define("list", Primitive::new("list", 0, true, |args| {
        Ok(vec_to_list(args.to_vec()))
    }));
    env.define("eq?", Primitive::new("eq?", 2, false, |args| {
        Ok(Value::Bool(args[0].identical(&args[1])))
    }));

    env.define("pair?", predicate("pair?", |v| matches!(v, Value::Pair(_))));
    env.define("null?", predicate("null?", Value::is_empty_list));
    env.define("symbol?", predicate("symbol?", |v| matches!(v, Value::Symbol(_))));
    env.define("string?", predicate("string?", |v| matches!(v, Value::Str(_))));
    env.define("number?", predicate("number?", |v| matches!(v, Value::Number(_))));
    env.define("eof-object?", predicate("eof-object?", |v| matches!(v, Value::Eof)));

    env.define("symbol->string", Primitive::new("symbol->string", 1, false, |args| {
        match &args[0] {
            Value::Symbol(s) => Ok(Value::Str(s.clone())),
            other => Err(Error::type_mismatch("identifier", other.type_name())),
        }
    }));

    env.define("+", numeric_fold("+", Number::add, Number::Int(0), false));
    env.define("-", numeric_fold("-", Number::sub, Number::Int(0), true));
    env.define("*", numeric_fold("*", Number::mul, Number::Int(1), false));
    env.define("/", numeric_fold("/", Number::div, Number::Real(1.0), true));
    env.define("floor", number_unary("floor", Number::floor));
    env.define("ceiling", number_unary("ceiling", Number::ceiling));

    env.define("read", Primitive::new("read", 0, true, port::read));
    env.define("write", Primitive::new("write", 1, false, |args| {
        println!("{}", args[0]);
        Ok(Value::Unspecified)
    }));
    env.define("eval", Primitive::new("eval", 2, false, eval_in));
    env.define("quit", Primitive::new("quit", 0, false, |_| process::exit(0)));
    env.define("exit", Primitive::new("exit", 0, false, |_| process::exit(0)));

    env.define(
        "open-input-file",
        Primitive::new("open-input-file", 1, false, port::open_input_file),
    );
    env.define(
        "close-port",
        Primitive::new("close-port", 1, false, port::close_port),
    );
    env.define("eof-object", Primitive::new("eof-object", 0, false, |_| {
        Ok(Value::Eof)
    }));
    env.define(
        "null-environment",
        Primitive::new("null-environment", 1, false, |_| {
            Ok(Value::Environment(Environment::new()))
        }),
    );

    env
}

fn car(args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Pair(p) => Ok(p.car.clone()),
        Value::EmptyList => Err(Error::Runtime("empty list".into())),
        other => Err(Error::type_mismatch("list", other.type_name())),
    }
}

fn cdr(args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Pair(p) => Ok(p.cdr.clone()),
        Value::EmptyList => Err(Error::Runtime("reached empty list".into())),
        other => Err(Error::type_mismatch("list", other.type_name())),
    }
}

fn predicate(name: &'static str, test: fn(&Value) -> bool) -> Value {
    Primitive::new(name, 1, false, move |args| Ok(Value::Bool(test(&args[0]))))
}

fn number_unary(name: &'static str, op: fn(Number) -> Number) -> Value {
    Primitive::new(name, 1, false, move |args| match &args[0] {
        Value::Number(n) => Ok(Value::Number(op(*n))),
        other => Err(Error::type_mismatch("num", other.type_name())),
    })
}

/// Variadic arithmetic with a neutral element: no arguments yield the
/// neutral element, one argument folds against it for `-` and `/`
/// (negation, reciprocal) and passes through for `+` and `*`.
fn numeric_fold(
    name: &'static str,
    op: fn(Number, Number) -> Result<Number, Error>,
    neutral: Number,
    fold_single: bool,
) -> Value {
    Primitive::new(name, 0, true, move |args| {
        let mut numbers = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Value::Number(n) => numbers.push(*n),
                other => return Err(Error::type_mismatch("num", other.type_name())),
            }
        }
        let result = match numbers.as_slice() {
            [] => neutral,
            [n] if fold_single => op(neutral, *n)?,
            [n] => *n,
            [first, rest @ ..] => {
                let mut acc = *first;
                for n in rest {
                    acc = op(acc, *n)?;
                }
                acc
            }
        };
        Ok(Value::Number(result))
    })
}

/// `(eval datum env)`: analyze the datum and run it directly in the
/// given environment.
fn eval_in(args: &[Value]) -> Result<Value, Error> {
    let env = match &args[1] {
        Value::Environment(e) => e.clone(),
        other => return Err(Error::type_mismatch("environment", other.type_name())),
    };
    analyze(&args[0])?.execute(None, &env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{int, sym};

    fn call(name: &str, args: &[Value]) -> Result<Value, Error> {
        match global_environment().lookup(name) {
            Some(Value::Primitive(p)) => (p.func)(args),
            other => panic!("{name} is not a primitive: {other:?}"),
        }
    }

    #[test]
    fn test_every_listed_name_is_bound() {
        let env = global_environment();
        for name in PRIMITIVE_NAMES {
            assert!(
                matches!(env.lookup(name), Some(Value::Primitive(_))),
                "{name} missing from the global environment"
            );
        }
    }

    #[test]
    fn test_arithmetic_neutral_elements() {
        assert_eq!(call("+", &[]).unwrap(), int(0));
        assert_eq!(call("*", &[]).unwrap(), int(1));
        // single arguments negate and take the reciprocal
        assert_eq!(call("-", &[int(5)]).unwrap(), int(-5));
        assert_eq!(
            call("/", &[int(2)]).unwrap(),
            Value::Number(Number::Real(0.5))
        );
        // but pass through for + and *
        assert_eq!(call("+", &[int(5)]).unwrap(), int(5));
        assert_eq!(call("*", &[int(5)]).unwrap(), int(5));
    }

    #[test]
    fn test_arithmetic_folds() {
        assert_eq!(call("+", &[int(1), int(2), int(3)]).unwrap(), int(6));
        assert_eq!(call("-", &[int(10), int(1), int(2)]).unwrap(), int(7));
        assert_eq!(call("*", &[int(2), int(3), int(4)]).unwrap(), int(24));
        assert_eq!(call("/", &[int(12), int(3), int(2)]).unwrap(), int(2));
        assert_eq!(
            call("+", &[int(1), Value::Number(Number::Real(0.5))]).unwrap(),
            Value::Number(Number::Real(1.5))
        );
        assert_eq!(
            call("+", &[int(1), Value::Bool(true)]),
            Err(Error::type_mismatch("num", "bool"))
        );
    }

    #[test]
    fn test_list_operations() {
        let pair = call("cons", &[int(1), int(2)]).unwrap();
        assert_eq!(call("car", &[pair.clone()]).unwrap(), int(1));
        assert_eq!(call("cdr", &[pair]).unwrap(), int(2));
        assert_eq!(
            call("list", &[int(1), int(2)]).unwrap(),
            vec_to_list(vec![int(1), int(2)])
        );
        assert_eq!(call("list", &[]).unwrap(), Value::EmptyList);

        assert!(call("car", &[Value::EmptyList]).is_err());
        assert_eq!(
            call("car", &[int(1)]),
            Err(Error::type_mismatch("list", "num"))
        );
    }

    #[test]
    fn test_predicates() {
        let pair = call("cons", &[int(1), int(2)]).unwrap();
        let cases = vec![
            ("pair?", pair.clone(), true),
            ("pair?", Value::EmptyList, false),
            ("null?", Value::EmptyList, true),
            ("null?", pair, false),
            ("symbol?", sym("a"), true),
            ("symbol?", Value::Str("a".into()), false),
            ("string?", Value::Str("a".into()), true),
            ("string?", sym("a"), false),
            ("number?", int(1), true),
            ("eof-object?", Value::Eof, true),
            ("eof-object?", int(1), false),
        ];
        for (name, arg, expected) in cases {
            assert_eq!(
                call(name, &[arg.clone()]).unwrap(),
                Value::Bool(expected),
                "({name} {arg})"
            );
        }
    }

    #[test]
    fn test_eq() {
        let shared = vec_to_list(vec![int(1)]);
        assert_eq!(
            call("eq?", &[shared.clone(), shared.clone()]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("eq?", &[vec_to_list(vec![int(1)]), vec_to_list(vec![int(1)])]).unwrap(),
            Value::Bool(false),
            "structurally equal pairs are distinct objects"
        );
        assert_eq!(
            call("eq?", &[sym("a"), sym("a")]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(call("eq?", &[int(0), int(0)]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_symbol_to_string() {
        assert_eq!(
            call("symbol->string", &[sym("abc")]).unwrap(),
            Value::Str("abc".into())
        );
        assert_eq!(
            call("symbol->string", &[int(1)]),
            Err(Error::type_mismatch("identifier", "num"))
        );
    }

    #[test]
    fn test_floor_ceiling() {
        assert_eq!(
            call("floor", &[Value::Number(Number::Real(2.7))]).unwrap(),
            int(2)
        );
        assert_eq!(
            call("ceiling", &[Value::Number(Number::Real(2.2))]).unwrap(),
            int(3)
        );
    }
}
