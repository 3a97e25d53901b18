//! Numeric values: 64-bit integers and floats with contagion.
//!
//! The numeric tower is deliberately shallow. Exact integers and inexact
//! reals are the only representations; a binary operation promotes both
//! operands to `Real` as soon as either side is one. Integer arithmetic is
//! checked, so overflow surfaces as an error instead of wrapping.

use std::fmt;

use crate::Error;

/// A Scheme number, either exact or inexact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Real(f64),
}

/// Promote a mixed int/real pair so both sides share a representation.
fn promote(a: Number, b: Number) -> (Number, Number) {
    match (a, b) {
        (Number::Int(x), Number::Real(_)) => (Number::Real(x as f64), b),
        (Number::Real(_), Number::Int(y)) => (a, Number::Real(y as f64)),
        _ => (a, b),
    }
}

fn binary(
    a: Number,
    b: Number,
    op: &'static str,
    int_op: fn(i64, i64) -> Option<i64>,
    real_op: fn(f64, f64) -> f64,
) -> Result<Number, Error> {
    match promote(a, b) {
        (Number::Int(x), Number::Int(y)) => int_op(x, y)
            .map(Number::Int)
            .ok_or_else(|| Error::Runtime(format!("integer overflow in {op}"))),
        (Number::Real(x), Number::Real(y)) => Ok(Number::Real(real_op(x, y))),
        // promote never yields a mixed pair
        _ => unreachable!(),
    }
}

impl Number {
    /// Parse a numeric literal: integer first, float as the fallback.
    pub fn parse(text: &str) -> Option<Number> {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Number::Int(i));
        }
        text.parse::<f64>().ok().map(Number::Real)
    }

    pub fn add(self, other: Number) -> Result<Number, Error> {
        binary(self, other, "+", i64::checked_add, |x, y| x + y)
    }

    pub fn sub(self, other: Number) -> Result<Number, Error> {
        binary(self, other, "-", i64::checked_sub, |x, y| x - y)
    }

    pub fn mul(self, other: Number) -> Result<Number, Error> {
        binary(self, other, "*", i64::checked_mul, |x, y| x * y)
    }

    /// Division. Two exact operands divide exactly (truncating); a zero
    /// exact divisor is an error rather than a panic.
    pub fn div(self, other: Number) -> Result<Number, Error> {
        if let (Number::Int(_), Number::Int(0)) = promote(self, other) {
            return Err(Error::Runtime("division by zero".into()));
        }
        binary(self, other, "/", i64::checked_div, |x, y| x / y)
    }

    pub fn floor(self) -> Number {
        match self {
            Number::Int(_) => self,
            Number::Real(r) => Number::Int(r.floor() as i64),
        }
    }

    pub fn ceiling(self) -> Number {
        match self {
            Number::Int(_) => self,
            Number::Real(r) => Number::Int(r.ceil() as i64),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            // {:?} keeps the decimal point so reals re-read as reals
            Number::Real(r) => write!(f, "{r:?}"),
        }
    }
}
