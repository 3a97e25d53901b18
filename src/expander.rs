//! Macro expansion.
//!
//! A macro here is a named procedure applied to the unevaluated argument
//! list of its call site; the result replaces the call site and is
//! expanded again until no macro remains in head position. `define-syntax`
//! is handled entirely at expansion time: its transformer expression is
//! evaluated directly (outside the CPS world) and must yield a procedure,
//! which is re-tagged as a macro and bound in the current environment.
//!
//! Quote and quasiquote forms are opaque to expansion.

use std::rc::Rc;

use log::debug;

use crate::Error;
use crate::analyzer::{analyze, extend_env};
use crate::evaluator::eval_direct;
use crate::value::{Environment, Procedure, Value, cons};

/// Recursively expand every macro call in `value`.
pub fn expand(value: &Value, env: &Rc<Environment>) -> Result<Value, Error> {
    if !matches!(value, Value::Pair(_)) {
        return Ok(value.clone());
    }
    if value.is_tagged("quote") || value.is_tagged("quasiquote") {
        return Ok(value.clone());
    }
    if value.is_tagged("define-syntax") {
        return define_syntax(value, env);
    }

    if let Value::Pair(p) = value
        && let Value::Symbol(name) = &p.car
        && let Some(Value::Macro(transformer)) = env.lookup(name)
    {
        debug!("expanding macro call {value}");
        let argv = p.cdr.list_to_vec();
        let result = apply_macro(&transformer, &argv)?;
        debug!("expanded to {result}");
        return expand(&result, env);
    }

    expand_elements(value, env)
}

/// Expand each element of a pair spine in place, leaving an improper tail
/// untouched.
fn expand_elements(value: &Value, env: &Rc<Environment>) -> Result<Value, Error> {
    match value {
        Value::Pair(p) => Ok(cons(expand(&p.car, env)?, expand_elements(&p.cdr, env)?)),
        other => Ok(other.clone()),
    }
}

/// Apply a macro's procedure to the raw argument vector under the macro's
/// captured environment.
fn apply_macro(transformer: &Rc<Procedure>, argv: &[Value]) -> Result<Value, Error> {
    let frame = extend_env(
        &transformer.params,
        argv,
        transformer.has_tail,
        &transformer.env,
    )?;
    eval_direct(&transformer.body, &frame)
}

/// `(define-syntax name transformer)`: evaluate the transformer, which
/// must yield a procedure, and bind it as a macro. The form itself
/// expands to nothing.
fn define_syntax(value: &Value, env: &Rc<Environment>) -> Result<Value, Error> {
    let elements = value.list_to_vec();
    if elements.len() != 3 {
        return Err(Error::Expand(format!(
            "define-syntax needs a name and a transformer: {value}"
        )));
    }
    let name = match &elements[1] {
        Value::Symbol(s) => s.clone(),
        other => {
            return Err(Error::Expand(format!(
                "define-syntax name must be an identifier, got {}",
                other.type_name()
            )));
        }
    };
    match eval_direct(&*analyze(&elements[2])?, env)? {
        Value::Procedure(p) => {
            debug!("binding macro {name}");
            env.define(name, Value::Macro(p));
            Ok(Value::Unspecified)
        }
        other => Err(Error::type_mismatch("procedure", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::global_environment;
    use crate::parser::parse;
    use crate::value::{int, sym, vec_to_list};

    fn test_env() -> Rc<Environment> {
        Environment::with_outer(global_environment())
    }

    fn expand_str(input: &str, env: &Rc<Environment>) -> Result<Value, Error> {
        expand(&parse(input).unwrap(), env)
    }

    #[test]
    fn test_non_macro_forms_pass_through() {
        let env = test_env();
        for input in ["42", "x", "(+ 1 2)", "(lambda (x) x)", "()"] {
            let value = parse(input).unwrap();
            assert_eq!(expand(&value, &env).unwrap(), value, "input: {input}");
        }
    }

    #[test]
    fn test_define_syntax_binds_a_macro() {
        let env = test_env();
        let result = expand_str(
            "(define-syntax my-if
               (lambda (c t e)
                 (cons 'if (cons c (cons t (cons e '()))))))",
            &env,
        )
        .unwrap();
        assert!(matches!(result, Value::Unspecified));
        assert!(matches!(env.lookup("my-if"), Some(Value::Macro(_))));

        let expanded = expand_str("(my-if #t 1 2)", &env).unwrap();
        assert_eq!(
            expanded,
            vec_to_list(vec![sym("if"), Value::Bool(true), int(1), int(2)])
        );
    }

    #[test]
    fn test_macro_arguments_stay_unevaluated() {
        let env = test_env();
        // the macro receives the raw operand, not its value
        expand_str("(define-syntax head (lambda (form) (car form)))", &env).unwrap();
        let expanded = expand_str("(head (unbound-op 1 2))", &env).unwrap();
        assert_eq!(expanded, sym("unbound-op"));
    }

    #[test]
    fn test_expansion_reaches_a_fixed_point() {
        let env = test_env();
        expand_str("(define-syntax two (lambda () 2))", &env).unwrap();
        expand_str("(define-syntax wrap-two (lambda () (cons 'two '())))", &env).unwrap();
        // wrap-two expands to (two), which expands again to 2
        assert_eq!(expand_str("(wrap-two)", &env).unwrap(), int(2));
    }

    #[test]
    fn test_expansion_descends_into_subforms() {
        let env = test_env();
        expand_str("(define-syntax two (lambda () 2))", &env).unwrap();
        assert_eq!(
            expand_str("(+ 1 (two))", &env).unwrap(),
            vec_to_list(vec![sym("+"), int(1), int(2)])
        );
    }

    #[test]
    fn test_quote_is_opaque() {
        let env = test_env();
        expand_str("(define-syntax two (lambda () 2))", &env).unwrap();
        let quoted = parse("'(two)").unwrap();
        assert_eq!(expand(&quoted, &env).unwrap(), quoted);
        let quasiquoted = parse("`(two)").unwrap();
        assert_eq!(expand(&quasiquoted, &env).unwrap(), quasiquoted);
    }

    #[test]
    fn test_define_syntax_rejects_non_procedures() {
        let env = test_env();
        let err = expand_str("(define-syntax bad 42)", &env).unwrap_err();
        assert_eq!(err, Error::type_mismatch("procedure", "num"));

        let err = expand_str("(define-syntax 42 (lambda () 1))", &env).unwrap_err();
        assert!(err.to_string().contains("identifier"));
    }
}
