//! Continuation-passing style rewrite.
//!
//! The transformer rewrites a macro-expanded form so that every
//! non-trivial sub-expression is lifted into a continuation-accepting
//! shape. Two call conventions coexist: an application whose operator
//! names a global primitive stays a synchronous call handed to the
//! continuation, `(K (p a ...))`, while every other application threads
//! the continuation as its first argument, `(f K a ...)` - the same
//! position where rewritten lambdas receive it.
//!
//! `wrap_values` controls whether a form that already denotes a value
//! should be returned as `(K v)` or left bare; tail positions wrap,
//! value positions (a `define` body, a non-tail statement) do not.
//! Compound calls cannot be left bare - their callee needs a
//! continuation no matter the position.
//!
//! Every operand that is itself a compound form is hoisted through a
//! fresh continuation lambda. The obligations fold so that the rightmost
//! hoisted operand ends up outermost, giving right-to-left evaluation
//! order.

use crate::Error;
use crate::builtins;
use crate::value::{Value, cons, sym, vec_to_list};

/// Source-to-source CPS rewriter with a deterministic fresh-name counter.
pub struct CpsTransformer {
    counter: usize,
}

impl Default for CpsTransformer {
    fn default() -> Self {
        Self::new()
    }
}

/// `(K value)` when wrapping is requested, the bare value otherwise.
fn wrap(value: &Value, cont: &Value, wrap_values: bool) -> Value {
    if wrap_values {
        vec_to_list(vec![cont.clone(), value.clone()])
    } else {
        value.clone()
    }
}

/// A form whose evaluation requires a continuation of its own: any pair
/// other than quotation (data) and lambda (rewritten in place).
fn is_compound(value: &Value) -> bool {
    matches!(value, Value::Pair(_))
        && !value.is_tagged("quote")
        && !value.is_tagged("quasiquote")
        && !value.is_tagged("lambda")
}

impl CpsTransformer {
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Start the fresh-name counter at `seed`, for reproducible output.
    pub fn with_seed(seed: usize) -> Self {
        CpsTransformer { counter: seed }
    }

    fn fresh(&mut self) -> String {
        let name = format!("k{}", self.counter);
        self.counter += 1;
        name
    }

    /// Rewrite `value` so that its result is delivered to the
    /// continuation expression `cont`.
    pub fn transform(
        &mut self,
        value: &Value,
        cont: &Value,
        wrap_values: bool,
    ) -> Result<Value, Error> {
        match value {
            Value::Pair(_) => {
                if value.is_tagged("quote") || value.is_tagged("quasiquote") {
                    Ok(wrap(value, cont, wrap_values))
                } else if value.is_tagged("lambda") {
                    self.transform_lambda(value, cont, wrap_values)
                } else if value.is_tagged("if") {
                    self.transform_if(value, cont)
                } else if value.is_tagged("begin") {
                    self.transform_begin(value, cont)
                } else if value.is_tagged("define") {
                    self.transform_binding(value, cont, wrap_values, "define")
                } else if value.is_tagged("set!") {
                    self.transform_binding(value, cont, wrap_values, "set!")
                } else {
                    self.transform_application(value, cont, wrap_values)
                }
            }
            // atoms and symbols are trivial
            _ => Ok(wrap(value, cont, wrap_values)),
        }
    }

    /// `(lambda formals body ...)`: prepend a fresh continuation
    /// parameter and rewrite every body statement against it; only the
    /// tail statement delivers its value to that continuation.
    fn transform_lambda(
        &mut self,
        value: &Value,
        cont: &Value,
        wrap_values: bool,
    ) -> Result<Value, Error> {
        let elements = value.list_to_vec();
        if elements.len() < 3 {
            return Err(Error::Cps(format!(
                "lambda needs a parameter list and a body: {value}"
            )));
        }
        let k = self.fresh();
        let formals = match &elements[1] {
            // a bare symbol collects every argument after the continuation
            Value::Symbol(_) | Value::Pair(_) => cons(sym(&k), elements[1].clone()),
            Value::EmptyList => vec_to_list(vec![sym(&k)]),
            other => {
                return Err(Error::Cps(format!("bad lambda parameters: {other}")));
            }
        };

        let k_cont = sym(&k);
        let last = elements.len() - 1;
        let mut rewritten = vec![sym("lambda"), formals];
        for (i, statement) in elements.iter().enumerate().skip(2) {
            rewritten.push(self.transform(statement, &k_cont, i == last)?);
        }
        Ok(wrap(&vec_to_list(rewritten), cont, wrap_values))
    }

    /// `(if p c a)`, a missing alternate meaning `#f`. Both branches
    /// always wrap, so each delivers its value to the continuation. A
    /// compound predicate is hoisted through a receiving lambda that the
    /// predicate's own rewrite calls with the test value.
    fn transform_if(&mut self, value: &Value, cont: &Value) -> Result<Value, Error> {
        let elements = value.list_to_vec();
        if elements.len() < 3 || elements.len() > 4 {
            return Err(Error::Cps(format!(
                "if needs a predicate, a consequent, and an optional alternate: {value}"
            )));
        }
        let predicate = elements[1].clone();
        let consequent = self.transform(&elements[2], cont, true)?;
        let alternate_source = elements.get(3).cloned().unwrap_or(Value::Bool(false));
        let alternate = self.transform(&alternate_source, cont, true)?;

        if predicate.is_tagged("lambda") {
            let rewritten = self.transform(&predicate, cont, false)?;
            return Ok(vec_to_list(vec![sym("if"), rewritten, consequent, alternate]));
        }
        if is_compound(&predicate) {
            let kp = self.fresh();
            let hoisted = vec_to_list(vec![sym("if"), sym(&kp), consequent, alternate]);
            let receiver = vec_to_list(vec![sym("lambda"), vec_to_list(vec![sym(&kp)]), hoisted]);
            return self.transform(&predicate, &receiver, true);
        }
        Ok(vec_to_list(vec![sym("if"), predicate, consequent, alternate]))
    }

    /// `(begin s ...)`: every statement but the last is a value position;
    /// the last delivers to the continuation.
    fn transform_begin(&mut self, value: &Value, cont: &Value) -> Result<Value, Error> {
        let elements = value.list_to_vec();
        if elements.len() < 2 {
            return Err(Error::Cps("empty begin".into()));
        }
        let last = elements.len() - 1;
        let mut rewritten = vec![sym("begin")];
        for (i, statement) in elements.iter().enumerate().skip(1) {
            rewritten.push(self.transform(statement, cont, i == last)?);
        }
        Ok(vec_to_list(rewritten))
    }

    /// `(define id body)` and `(set! id body)`. The body is a value
    /// position. `(define (f p ...) body ...)` first desugars into a
    /// lambda binding.
    fn transform_binding(
        &mut self,
        value: &Value,
        cont: &Value,
        wrap_values: bool,
        which: &str,
    ) -> Result<Value, Error> {
        let mut elements = value.list_to_vec();
        if which == "define"
            && elements.len() >= 3
            && let Value::Pair(header) = elements[1].clone()
        {
            let mut lambda_form = vec![sym("lambda"), header.cdr.clone()];
            lambda_form.extend(elements[2..].iter().cloned());
            elements = vec![
                elements[0].clone(),
                header.car.clone(),
                vec_to_list(lambda_form),
            ];
        }
        if elements.len() != 3 {
            return Err(Error::Cps(format!("{which} needs a name and a value: {value}")));
        }
        if !matches!(elements[1], Value::Symbol(_)) {
            return Err(Error::Cps(format!(
                "{which} name must be an identifier: {value}"
            )));
        }
        let body = self.transform(&elements[2], cont, false)?;
        let form = vec_to_list(vec![elements[0].clone(), elements[1].clone(), body]);
        Ok(wrap(&form, cont, wrap_values))
    }

    /// Applications. Compound operands (and a compound operator) are
    /// replaced by fresh names and re-expressed as binding obligations,
    /// folded so the rightmost evaluates first. Lambda operands are
    /// rewritten in place; quoted data and atoms stay put.
    fn transform_application(
        &mut self,
        value: &Value,
        cont: &Value,
        wrap_values: bool,
    ) -> Result<Value, Error> {
        if !value.is_proper_list() {
            return Err(Error::Cps(format!("improper application: {value}")));
        }
        let elements = value.list_to_vec();
        let is_primitive =
            matches!(&elements[0], Value::Symbol(name) if builtins::is_primitive_name(name));

        let mut obligations: Vec<(Value, String)> = Vec::new();
        let mut rewritten: Vec<Value> = Vec::with_capacity(elements.len() + 1);
        for element in &elements {
            if element.is_tagged("lambda") {
                rewritten.push(self.transform(element, cont, false)?);
            } else if is_compound(element) {
                let k = self.fresh();
                rewritten.push(sym(&k));
                obligations.push((element.clone(), k));
            } else {
                rewritten.push(element.clone());
            }
        }

        let mut call = if is_primitive {
            wrap(&vec_to_list(rewritten), cont, wrap_values)
        } else {
            let mut with_cont = Vec::with_capacity(rewritten.len() + 1);
            with_cont.push(rewritten[0].clone());
            with_cont.push(cont.clone());
            with_cont.extend(rewritten.drain(1..));
            vec_to_list(with_cont)
        };

        for (original, k) in obligations {
            let receiver = vec_to_list(vec![sym("lambda"), vec_to_list(vec![sym(&k)]), call]);
            call = self.transform(&original, &receiver, true)?;
        }
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn transform_str(input: &str, wrap_values: bool) -> Result<String, Error> {
        let value = parse(input).unwrap();
        let mut transformer = CpsTransformer::new();
        let result = transformer.transform(&value, &sym("K"), wrap_values)?;
        Ok(result.to_string())
    }

    #[test]
    fn test_trivial_forms() {
        let cases = vec![
            ("42", true, "(K 42)"),
            ("42", false, "42"),
            ("x", true, "(K x)"),
            ("#t", true, "(K #t)"),
            ("'(1 2)", true, "(K (quote (1 2)))"),
            ("'(1 2)", false, "(quote (1 2))"),
            ("`(a ,b)", true, "(K (quasiquote (a (unquote b))))"),
        ];
        for (input, wrap_values, expected) in cases {
            assert_eq!(
                transform_str(input, wrap_values).unwrap(),
                expected,
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_applications() {
        let cases = vec![
            // primitive operators stay synchronous under the continuation
            ("(+ 1 2)", true, "(K (+ 1 2))"),
            ("(+ 1 2)", false, "(+ 1 2)"),
            // everything else threads the continuation first
            ("(f 1 2)", true, "(f K 1 2)"),
            ("(f)", true, "(f K)"),
            // a compound argument is hoisted through a receiving lambda
            ("(+ 1 (f 2))", true, "(f (lambda (k0) (K (+ 1 k0))) 2)"),
            (
                "(* n (fact (- n 1)))",
                true,
                "((lambda (k1) (fact (lambda (k0) (K (* n k0))) k1)) (- n 1))",
            ),
            // lambda operands are rewritten in place
            ("((lambda (x) x) 1)", true, "((lambda (k0 x) (k0 x)) K 1)"),
        ];
        for (input, wrap_values, expected) in cases {
            assert_eq!(
                transform_str(input, wrap_values).unwrap(),
                expected,
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_arguments_evaluate_right_to_left() {
        // the rightmost hoisted operand ends up outermost
        assert_eq!(
            transform_str("(f (g 1) (h 2))", true).unwrap(),
            "(h (lambda (k1) (g (lambda (k0) (f K k0 k1)) 1)) 2)"
        );
    }

    #[test]
    fn test_lambda() {
        let cases = vec![
            ("(lambda (x) x)", true, "(K (lambda (k0 x) (k0 x)))"),
            ("(lambda (x) x)", false, "(lambda (k0 x) (k0 x))"),
            // variadic formals keep their shape behind the continuation
            ("(lambda x x)", true, "(K (lambda (k0 . x) (k0 x)))"),
            ("(lambda (a . b) a)", true, "(K (lambda (k0 a . b) (k0 a)))"),
            ("(lambda () 1)", true, "(K (lambda (k0) (k0 1)))"),
            // only the tail statement delivers to the continuation
            ("(lambda (x) (write x) x)", true, "(K (lambda (k0 x) (write x) (k0 x)))"),
        ];
        for (input, wrap_values, expected) in cases {
            assert_eq!(
                transform_str(input, wrap_values).unwrap(),
                expected,
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_if() {
        let cases = vec![
            ("(if p 1 2)", "(if p (K 1) (K 2))"),
            ("(if p 1)", "(if p (K 1) (K #f))"),
            // compound predicates are hoisted
            ("(if (f) 1 2)", "(f (lambda (k0) (if k0 (K 1) (K 2))))"),
            // branch rewrites run first, so the alternate's hoist takes k0
            // and the predicate receiver takes k1
            (
                "(if (eq? n 0) 'done (loop (- n 1)))",
                "((lambda (k1) (if k1 (K (quote done)) ((lambda (k0) (loop K k0)) (- n 1)))) (eq? n 0))",
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(transform_str(input, true).unwrap(), expected, "input: {input}");
        }
    }

    #[test]
    fn test_begin() {
        assert_eq!(
            transform_str("(begin 1 2)", true).unwrap(),
            "(begin 1 (K 2))"
        );
        assert_eq!(
            transform_str("(begin (+ 1 2) (f 3))", true).unwrap(),
            "(begin (+ 1 2) (f K 3))"
        );
    }

    #[test]
    fn test_define_and_set() {
        let cases = vec![
            ("(define x 1)", true, "(K (define x 1))"),
            ("(define x 1)", false, "(define x 1)"),
            ("(define x (+ 1 2))", true, "(K (define x (+ 1 2)))"),
            ("(set! x 2)", true, "(K (set! x 2))"),
            (
                "(define (id y) y)",
                false,
                "(define id (lambda (k0 y) (k0 y)))",
            ),
            (
                "(define (f) x)",
                false,
                "(define f (lambda (k0) (k0 x)))",
            ),
        ];
        for (input, wrap_values, expected) in cases {
            assert_eq!(
                transform_str(input, wrap_values).unwrap(),
                expected,
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_fresh_names_are_seeded() {
        let value = parse("(+ 1 (f 2))").unwrap();
        let mut transformer = CpsTransformer::with_seed(7);
        let result = transformer.transform(&value, &sym("K"), true).unwrap();
        assert_eq!(result.to_string(), "(f (lambda (k7) (K (+ 1 k7))) 2)");
    }

    #[test]
    fn test_malformed_forms() {
        let cases = vec![
            ("(if p)", "if needs"),
            ("(if p 1 2 3)", "if needs"),
            ("(begin)", "empty begin"),
            ("(define x)", "define needs"),
            ("(define x 1 2)", "define needs"),
            ("(set! x)", "set! needs"),
            ("(define 42 1)", "identifier"),
            ("(lambda (x))", "lambda needs"),
            ("(lambda 42 x)", "bad lambda parameters"),
            ("(f 1 . 2)", "improper application"),
        ];
        for (input, expected) in cases {
            let err = transform_str(input, true).unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "input {input}: expected {expected:?} in {err}"
            );
        }
    }
}
