//! Input ports and the `read` primitive.
//!
//! A port wraps a buffered file reader plus its flags. Closing a port
//! drops the reader; further reads from it are runtime errors. `read`
//! collects one parenthesis-balanced chunk of text (prompting on stdin)
//! and hands it to the parser, yielding the EOF object at end of stream.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::rc::Rc;

use crate::Error;
use crate::evaluator::collect_input;
use crate::parser;
use crate::value::Value;

#[derive(Debug)]
pub struct Port {
    reader: Option<BufReader<File>>,
    pub is_input: bool,
    pub is_open: bool,
}

/// `(open-input-file path)`
pub fn open_input_file(args: &[Value]) -> Result<Value, Error> {
    let path = match &args[0] {
        Value::Str(s) => s,
        other => return Err(Error::type_mismatch("string", other.type_name())),
    };
    let file = File::open(path).map_err(|e| Error::Runtime(format!("runtime error: {e}")))?;
    Ok(Value::Port(Rc::new(RefCell::new(Port {
        reader: Some(BufReader::new(file)),
        is_input: true,
        is_open: true,
    }))))
}

/// `(close-port port)`; closing an already-closed port is a no-op.
pub fn close_port(args: &[Value]) -> Result<Value, Error> {
    let port = match &args[0] {
        Value::Port(p) => p,
        other => return Err(Error::type_mismatch("port", other.type_name())),
    };
    let mut port = port.borrow_mut();
    if port.is_open {
        port.reader = None;
        port.is_open = false;
    }
    Ok(Value::Unspecified)
}

/// `(read)` reads from stdin with a prompt; `(read port)` reads from the
/// port. Either way the result is the parsed datum, or the EOF object at
/// end of stream.
pub fn read(args: &[Value]) -> Result<Value, Error> {
    match args {
        [] => {
            let stdin = std::io::stdin();
            let mut lock = stdin.lock();
            read_datum(&mut lock, true)
        }
        [Value::Port(port)] => {
            let mut port = port.borrow_mut();
            if !port.is_input {
                return Err(Error::Runtime("not an input port".into()));
            }
            let reader = port
                .reader
                .as_mut()
                .ok_or_else(|| Error::Runtime("port is closed".into()))?;
            read_datum(reader, false)
        }
        [other] => Err(Error::type_mismatch("port", other.type_name())),
        _ => Err(Error::arity_in(1, args.len(), "read")),
    }
}

fn read_datum(reader: &mut impl BufRead, prompt: bool) -> Result<Value, Error> {
    match collect_input(reader, "> ", prompt)? {
        None => Ok(Value::Eof),
        Some(text) => parser::parse(text.trim()),
    }
}
