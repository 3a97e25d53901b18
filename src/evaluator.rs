//! The trampoline driver and the public runtime.
//!
//! An [`Evaluator`] owns a single-slot work cell. Executing a closure may
//! return a value, schedule exactly one follow-on closure (a tail call),
//! or raise the halt flag through the halt continuation the CPS pass
//! threads through the program. The driver loop drains the cell until it
//! stays empty, so an unbounded chain of tail calls turns over the queue
//! instead of growing the host stack.
//!
//! [`Runtime`] wires the whole pipeline together: read one balanced
//! form, expand, CPS-rewrite against a fresh evaluator's halt
//! continuation, analyze, and run.

use std::cell::{Cell, RefCell};
use std::io::{BufRead, Write};
use std::rc::Rc;

use log::debug;

use crate::Error;
use crate::analyzer::{AnalyzedExpr, analyze};
use crate::builtins;
use crate::cps::CpsTransformer;
use crate::expander::expand;
use crate::parser;
use crate::value::{Environment, Primitive, Value};

/// A suspended unit of work: an analyzed expression plus the environment
/// to run it in.
pub struct Closure {
    pub expr: Rc<AnalyzedExpr>,
    pub env: Rc<Environment>,
}

/// The trampoline. One evaluator drives one top-level form.
pub struct Evaluator {
    next: RefCell<Option<Closure>>,
    halted: Cell<bool>,
    final_value: RefCell<Option<Value>>,
}

impl Evaluator {
    pub fn new() -> Rc<Self> {
        Rc::new(Evaluator {
            next: RefCell::new(None),
            halted: Cell::new(false),
            final_value: RefCell::new(None),
        })
    }

    /// Hand the trampoline its next unit of work. Only one closure is
    /// ever pending: the tail call scheduled by the closure currently
    /// executing.
    pub fn schedule(&self, expr: Rc<AnalyzedExpr>, env: Rc<Environment>) {
        *self.next.borrow_mut() = Some(Closure { expr, env });
    }

    /// The continuation threaded through a top-level form by the CPS
    /// pass: a primitive that publishes its argument as the final value
    /// and stops the trampoline.
    pub fn halt_continuation(self: &Rc<Self>) -> Value {
        let ev = Rc::clone(self);
        Primitive::new("write-and-quit", 1, false, move |args| {
            let result = args[0].clone();
            ev.halted.set(true);
            *ev.final_value.borrow_mut() = Some(result.clone());
            Ok(result)
        })
    }

    /// Seed the work cell and drain it.
    pub fn eval(&self, expr: Rc<AnalyzedExpr>, env: Rc<Environment>) -> Result<Value, Error> {
        self.schedule(expr, env);
        let mut last = Value::Unspecified;
        loop {
            let closure = self.next.borrow_mut().take();
            let Some(closure) = closure else { break };
            last = closure.expr.execute(Some(self), &closure.env)?;
            if self.halted.get() {
                break;
            }
        }
        Ok(self.final_value.borrow_mut().take().unwrap_or(last))
    }
}

/// Run an analyzed expression to completion with no evaluator handle.
/// Used wherever a result is needed immediately: predicates, operators,
/// operands, and non-tail statements.
pub fn eval_direct(expr: &AnalyzedExpr, env: &Rc<Environment>) -> Result<Value, Error> {
    expr.execute(None, env)
}

/// Read lines from `reader` until the parentheses balance, optionally
/// prompting before each line. Returns `None` on a clean end of input
/// with nothing collected.
pub fn collect_input(
    reader: &mut impl BufRead,
    prompt: &str,
    write_prompt: bool,
) -> Result<Option<String>, Error> {
    let mut collected = String::new();
    let mut left = 0usize;
    let mut right = 0usize;
    loop {
        if write_prompt {
            print!("{prompt}");
            let _ = std::io::stdout().flush();
        }
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| Error::Runtime(format!("read error: {e}")))?;
        if n == 0 {
            if collected.trim().is_empty() {
                return Ok(None);
            }
            return Ok(Some(collected));
        }
        for byte in line.bytes() {
            match byte {
                b'(' => left += 1,
                b')' => right += 1,
                _ => {}
            }
        }
        if right > left {
            return Err(Error::parse(0, "mismatched parentheses"));
        }
        collected.push_str(&line);
        if left == right && !collected.trim().is_empty() {
            return Ok(Some(collected));
        }
    }
}

/// The interpreter's public surface: a global environment (the primitive
/// frame as its outer) plus the evaluation entry points.
pub struct Runtime {
    env: Rc<Environment>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            env: Environment::with_outer(builtins::global_environment()),
        }
    }

    /// The user frame; `define` at the top level writes here, leaving
    /// the primitive frame underneath untouched.
    pub fn environment(&self) -> &Rc<Environment> {
        &self.env
    }

    /// Run one parsed form through expand, CPS, analyze, trampoline.
    pub fn run_form(&self, form: &Value) -> Result<Value, Error> {
        let expanded = expand(form, &self.env)?;
        let evaluator = Evaluator::new();
        let mut transformer = CpsTransformer::new();
        let cps_form = transformer.transform(&expanded, &evaluator.halt_continuation(), true)?;
        debug!("cps form: {cps_form}");
        let analyzed = analyze(&cps_form)?;
        evaluator.eval(analyzed, self.env.clone())
    }

    /// Read one balanced top-level form from the reader and evaluate it.
    /// A clean end of input yields the EOF object.
    pub fn eval(&self, reader: &mut impl BufRead) -> Result<Value, Error> {
        match collect_input(reader, "] ", false)? {
            None => Ok(Value::Eof),
            Some(text) => self.run_form(&parser::parse(text.trim())?),
        }
    }

    pub fn eval_string(&self, text: &str) -> Result<Value, Error> {
        self.eval(&mut text.as_bytes())
    }

    /// Evaluate every form in the text, returning the last result.
    pub fn eval_program(&self, text: &str) -> Result<Value, Error> {
        let mut result = Value::Unspecified;
        for form in parser::parse_all(text)? {
            result = self.run_form(&form)?;
        }
        Ok(result)
    }

    /// Interactive loop on stdin. See [`crate::repl`].
    pub fn repl(&self) -> Result<(), Error> {
        crate::repl::run(self).map_err(|e| Error::Runtime(e.to_string()))
    }
}
