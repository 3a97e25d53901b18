//! Analysis: CPS form to executable expression tree.
//!
//! [`analyze`] walks a value once and produces an [`AnalyzedExpr`], a
//! tagged tree executed by a single interpreter function. Analysis
//! results are immutable and shared behind `Rc`: a lambda's body is
//! analyzed once and reused by every procedure value it ever closes over.
//!
//! Execution takes an optional evaluator handle. With a handle present,
//! tail positions (the last statement of a sequence, a chosen `if`
//! branch, the body of an applied procedure) are scheduled on the
//! trampoline instead of being entered recursively - that is what makes
//! tail calls stack-free. Without a handle (`eval_direct`), everything
//! runs to completion on the host stack; operator, operand and predicate
//! positions always use this direct path because their results are
//! needed immediately.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::Error;
use crate::evaluator::Evaluator;
use crate::value::{Environment, Procedure, Value, vec_to_list};

/// An analyzed expression, ready to execute against an environment.
#[derive(Debug)]
pub enum AnalyzedExpr {
    SelfEval(Value),
    Lookup(String),
    Quote(Value),
    /// Quasiquote templates are walked at run time with level tracking
    Quasiquote(Value),
    Sequence(Vec<Rc<AnalyzedExpr>>),
    If {
        predicate: Rc<AnalyzedExpr>,
        consequent: Rc<AnalyzedExpr>,
        alternate: Option<Rc<AnalyzedExpr>>,
    },
    Define {
        name: String,
        body: Rc<AnalyzedExpr>,
    },
    Assign {
        name: String,
        body: Rc<AnalyzedExpr>,
    },
    Lambda {
        params: Vec<String>,
        has_tail: bool,
        body: Rc<AnalyzedExpr>,
    },
    Apply {
        operator: Rc<AnalyzedExpr>,
        operands: Vec<Rc<AnalyzedExpr>>,
    },
}

/// Analyze one form. Symbols become lookups, pairs dispatch on their
/// head, and everything else evaluates to itself.
pub fn analyze(value: &Value) -> Result<Rc<AnalyzedExpr>, Error> {
    match value {
        Value::Symbol(name) => Ok(Rc::new(AnalyzedExpr::Lookup(name.clone()))),
        Value::Pair(_) => analyze_form(value),
        Value::EmptyList => Err(Error::Analyze("cannot evaluate ()".into())),
        other => Ok(Rc::new(AnalyzedExpr::SelfEval(other.clone()))),
    }
}

fn analyze_form(value: &Value) -> Result<Rc<AnalyzedExpr>, Error> {
    if value.is_tagged("quote") {
        return Ok(Rc::new(AnalyzedExpr::Quote(tagged_payload(value)?)));
    }
    if value.is_tagged("quasiquote") {
        return Ok(Rc::new(AnalyzedExpr::Quasiquote(tagged_payload(value)?)));
    }
    if value.is_tagged("begin") {
        let elements = value.list_to_vec();
        return Ok(Rc::new(AnalyzedExpr::Sequence(analyze_sequence(
            &elements[1..],
            value,
        )?)));
    }
    if value.is_tagged("if") {
        return analyze_if(value);
    }
    if value.is_tagged("define") {
        return analyze_define(value);
    }
    if value.is_tagged("set!") {
        return analyze_assign(value);
    }
    if value.is_tagged("lambda") {
        return analyze_lambda(value);
    }
    analyze_application(value)
}

fn tagged_payload(value: &Value) -> Result<Value, Error> {
    let elements = value.list_to_vec();
    if elements.len() != 2 {
        return Err(Error::Analyze(format!("malformed form {value}")));
    }
    Ok(elements[1].clone())
}

fn analyze_sequence(statements: &[Value], origin: &Value) -> Result<Vec<Rc<AnalyzedExpr>>, Error> {
    if statements.is_empty() {
        return Err(Error::Analyze(format!("empty sequence in {origin}")));
    }
    statements.iter().map(analyze).collect()
}

fn analyze_if(value: &Value) -> Result<Rc<AnalyzedExpr>, Error> {
    let elements = value.list_to_vec();
    let (predicate, consequent, alternate) = match elements.len() {
        3 => (&elements[1], &elements[2], None),
        4 => (&elements[1], &elements[2], Some(&elements[3])),
        n => {
            return Err(Error::Analyze(format!("length mismatch in if: {n}")));
        }
    };
    Ok(Rc::new(AnalyzedExpr::If {
        predicate: analyze(predicate)?,
        consequent: analyze(consequent)?,
        alternate: alternate.map(analyze).transpose()?,
    }))
}

fn analyze_define(value: &Value) -> Result<Rc<AnalyzedExpr>, Error> {
    let mut elements = value.list_to_vec();
    // (define (f p ...) body ...) desugars to a lambda binding; the CPS
    // pass already does this, but analysis stays usable on raw forms
    if elements.len() >= 3
        && let Value::Pair(header) = elements[1].clone()
    {
        let mut lambda_form = vec![Value::Symbol("lambda".into()), header.cdr.clone()];
        lambda_form.extend(elements[2..].iter().cloned());
        elements = vec![
            elements[0].clone(),
            header.car.clone(),
            vec_to_list(lambda_form),
        ];
    }
    let (name, body) = binding_parts(&elements, value)?;
    Ok(Rc::new(AnalyzedExpr::Define { name, body }))
}

fn analyze_assign(value: &Value) -> Result<Rc<AnalyzedExpr>, Error> {
    let elements = value.list_to_vec();
    let (name, body) = binding_parts(&elements, value)?;
    Ok(Rc::new(AnalyzedExpr::Assign { name, body }))
}

fn binding_parts(elements: &[Value], origin: &Value) -> Result<(String, Rc<AnalyzedExpr>), Error> {
    if elements.len() != 3 {
        return Err(Error::Analyze(format!(
            "length mismatch: {} != 3 in {origin}",
            elements.len()
        )));
    }
    let name = match &elements[1] {
        Value::Symbol(s) => s.clone(),
        other => return Err(Error::type_mismatch("identifier", other.type_name())),
    };
    Ok((name, analyze(&elements[2])?))
}

fn analyze_lambda(value: &Value) -> Result<Rc<AnalyzedExpr>, Error> {
    let elements = value.list_to_vec();
    if elements.len() < 3 {
        return Err(Error::Analyze(format!(
            "lambda needs a parameter list and a body: {value}"
        )));
    }
    let (params, has_tail) = parse_formals(&elements[1])?;
    let body = analyze_sequence(&elements[2..], value)?;
    Ok(Rc::new(AnalyzedExpr::Lambda {
        params,
        has_tail,
        body: Rc::new(AnalyzedExpr::Sequence(body)),
    }))
}

fn analyze_application(value: &Value) -> Result<Rc<AnalyzedExpr>, Error> {
    if !value.is_proper_list() {
        return Err(Error::Analyze(format!("improper application: {value}")));
    }
    let elements = value.list_to_vec();
    let operator = analyze(&elements[0])?;
    let operands = elements[1..]
        .iter()
        .map(analyze)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Rc::new(AnalyzedExpr::Apply { operator, operands }))
}

/// Split a formals list into parameter names plus the rest-parameter
/// flag: a proper list is fixed-arity, a dotted tail or a bare symbol
/// collects surplus arguments into its last name.
pub fn parse_formals(formals: &Value) -> Result<(Vec<String>, bool), Error> {
    match formals {
        Value::Symbol(s) => Ok((vec![s.clone()], true)),
        Value::EmptyList => Ok((Vec::new(), false)),
        Value::Pair(_) => {
            let mut params = Vec::new();
            let mut has_tail = false;
            let mut cur = formals.clone();
            loop {
                match cur {
                    Value::Pair(p) => {
                        params.push(require_param(&p.car)?);
                        cur = p.cdr.clone();
                    }
                    Value::EmptyList => break,
                    tail => {
                        params.push(require_param(&tail)?);
                        has_tail = true;
                        break;
                    }
                }
            }
            Ok((params, has_tail))
        }
        other => Err(Error::type_mismatch("identifier", other.type_name())),
    }
}

fn require_param(value: &Value) -> Result<String, Error> {
    match value {
        Value::Symbol(s) => Ok(s.clone()),
        other => Err(Error::Analyze(format!("invalid parameter value {other}"))),
    }
}

/// Bind argument values against a parameter list, honoring the rest
/// parameter: surplus arguments are collected into a list bound to the
/// last name, and under-supply is an error.
pub fn extend_env(
    params: &[String],
    vals: &[Value],
    has_tail: bool,
    outer: &Rc<Environment>,
) -> Result<Rc<Environment>, Error> {
    let fixed = if has_tail { params.len() - 1 } else { params.len() };
    if vals.len() < fixed || (!has_tail && vals.len() > fixed) {
        return Err(Error::arity_in(
            fixed,
            vals.len(),
            formals_display(params, has_tail),
        ));
    }
    let env = Environment::with_outer(outer.clone());
    for (param, val) in params[..fixed].iter().zip(vals) {
        env.define(param.clone(), val.clone());
    }
    if has_tail {
        env.define(params[fixed].clone(), vec_to_list(vals[fixed..].to_vec()));
    }
    Ok(env)
}

/// Render a parameter list the way it was written, for arity errors:
/// `(a b)`, `(a b . rest)`, or a bare rest symbol.
fn formals_display(params: &[String], has_tail: bool) -> String {
    if has_tail && params.len() == 1 {
        return params[0].clone();
    }
    let fixed = if has_tail { params.len() - 1 } else { params.len() };
    let mut out = String::from("(");
    out.push_str(&params[..fixed].join(" "));
    if has_tail {
        out.push_str(" . ");
        out.push_str(&params[fixed]);
    }
    out.push(')');
    out
}

impl AnalyzedExpr {
    /// Execute against `env`. When `ev` is present, tail positions are
    /// scheduled on it and this call returns without a meaningful value;
    /// when absent, the expression runs to completion.
    pub fn execute(&self, ev: Option<&Evaluator>, env: &Rc<Environment>) -> Result<Value, Error> {
        match self {
            AnalyzedExpr::SelfEval(value) => Ok(value.clone()),
            AnalyzedExpr::Lookup(name) => env
                .lookup(name)
                .ok_or_else(|| Error::Unbound(name.clone())),
            AnalyzedExpr::Quote(datum) => Ok(datum.clone()),
            AnalyzedExpr::Quasiquote(template) => quasiquote(template, env, 1),
            AnalyzedExpr::Sequence(statements) => {
                // analysis guarantees at least one statement
                let last = statements.len() - 1;
                for statement in &statements[..last] {
                    statement.execute(None, env)?;
                }
                match ev {
                    Some(ev) => {
                        ev.schedule(statements[last].clone(), env.clone());
                        Ok(Value::Unspecified)
                    }
                    None => statements[last].execute(None, env),
                }
            }
            AnalyzedExpr::If {
                predicate,
                consequent,
                alternate,
            } => {
                let test = predicate.execute(None, env)?;
                let branch = if test.is_truthy() {
                    Some(consequent)
                } else {
                    alternate.as_ref()
                };
                match (branch, ev) {
                    (None, _) => Ok(Value::Unspecified),
                    (Some(branch), Some(ev)) => {
                        ev.schedule(branch.clone(), env.clone());
                        Ok(Value::Unspecified)
                    }
                    (Some(branch), None) => branch.execute(None, env),
                }
            }
            AnalyzedExpr::Define { name, body } => {
                let value = body.execute(None, env)?;
                env.define(name.clone(), value);
                Ok(Value::Unspecified)
            }
            AnalyzedExpr::Assign { name, body } => {
                let value = body.execute(None, env)?;
                env.set(name, value.clone())?;
                Ok(value)
            }
            AnalyzedExpr::Lambda {
                params,
                has_tail,
                body,
            } => Ok(Value::Procedure(Rc::new(Procedure {
                params: params.clone(),
                has_tail: *has_tail,
                body: body.clone(),
                env: env.clone(),
            }))),
            AnalyzedExpr::Apply { operator, operands } => {
                let op = operator.execute(None, env)?;
                let mut args: SmallVec<[Value; 4]> = SmallVec::with_capacity(operands.len());
                for operand in operands {
                    args.push(operand.execute(None, env)?);
                }
                match op {
                    Value::Primitive(p) => {
                        if !p.has_tail && args.len() != p.n_args {
                            return Err(Error::arity_in(p.n_args, args.len(), p.name));
                        }
                        (p.func)(&args)
                    }
                    Value::Procedure(proc) => {
                        let frame = extend_env(&proc.params, &args, proc.has_tail, &proc.env)?;
                        match ev {
                            Some(ev) => {
                                ev.schedule(proc.body.clone(), frame);
                                Ok(Value::Unspecified)
                            }
                            None => proc.body.execute(None, &frame),
                        }
                    }
                    other => Err(Error::type_mismatch("procedure", other.type_name())),
                }
            }
        }
    }
}

/// Level-tracked quasiquote walk. Nested `quasiquote` raises the level,
/// `unquote` lowers it, and substitution happens only at level zero,
/// where the payload is analyzed on the fly and evaluated directly.
fn quasiquote(template: &Value, env: &Rc<Environment>, level: usize) -> Result<Value, Error> {
    if template.is_tagged("quasiquote") {
        let walked = quasiquote(&tagged_payload(template)?, env, level + 1)?;
        return Ok(vec_to_list(vec![Value::Symbol("quasiquote".into()), walked]));
    }
    if template.is_tagged("unquote") {
        return unquote(template, env, level - 1);
    }
    match template {
        Value::Pair(_) => {
            let mut out = Vec::new();
            for element in template.list_to_vec() {
                if element.is_tagged("unquote-splicing") {
                    out.extend(splice(&element, env, level - 1)?);
                } else {
                    out.push(quasiquote(&element, env, level)?);
                }
            }
            Ok(vec_to_list(out))
        }
        other => Ok(other.clone()),
    }
}

fn unquote(form: &Value, env: &Rc<Environment>, level: usize) -> Result<Value, Error> {
    let payload = tagged_payload(form)?;
    if level == 0 {
        analyze(&payload)?.execute(None, env)
    } else {
        let walked = quasiquote(&payload, env, level)?;
        Ok(vec_to_list(vec![Value::Symbol("unquote".into()), walked]))
    }
}

/// The elements an `unquote-splicing` form contributes to its enclosing
/// list: the spliced list's elements at level zero, the rebuilt form as
/// a single element above it.
fn splice(form: &Value, env: &Rc<Environment>, level: usize) -> Result<Vec<Value>, Error> {
    let payload = tagged_payload(form)?;
    if level == 0 {
        let value = analyze(&payload)?.execute(None, env)?;
        if !value.is_list() {
            return Err(Error::type_mismatch("list", value.type_name()));
        }
        Ok(value.list_to_vec())
    } else {
        let walked = quasiquote(&payload, env, level)?;
        Ok(vec![vec_to_list(vec![
            Value::Symbol("unquote-splicing".into()),
            walked,
        ])])
    }
}
