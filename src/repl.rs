//! Interactive read-eval-print loop.
//!
//! Input is collected until the parentheses balance, so a form may span
//! several lines; the continuation prompt drops the `]` marker. Results
//! print unless they are the unspecified value, and errors print with
//! their category prefix before the loop re-prompts. Ctrl-C abandons the
//! pending input, Ctrl-D (EOF) leaves the loop.

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::evaluator::Runtime;
use crate::parser;
use crate::value::Value;

const HISTORY_FILE: &str = ".cpscheme_history";

pub fn run(runtime: &Runtime) -> Result<(), ReadlineError> {
    let mut editor = DefaultEditor::new()?;
    let _ = editor.load_history(HISTORY_FILE);

    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() { "] " } else { "  " };
        match editor.readline(prompt) {
            Ok(line) => {
                pending.push_str(&line);
                pending.push('\n');

                let left = pending.bytes().filter(|b| *b == b'(').count();
                let right = pending.bytes().filter(|b| *b == b')').count();
                if right > left {
                    eprintln!("PARSE: mismatched parentheses");
                    pending.clear();
                    continue;
                }
                if left > right {
                    continue;
                }

                let text = std::mem::take(&mut pending);
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(text);
                evaluate_entry(runtime, text);
            }
            Err(ReadlineError::Interrupted) => {
                pending.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        }
    }

    let _ = editor.save_history(HISTORY_FILE);
    Ok(())
}

/// Evaluate every form in one entry, printing each result as it lands.
/// The first error stops the entry and the loop re-prompts.
fn evaluate_entry(runtime: &Runtime, text: &str) {
    let forms = match parser::parse_all(text) {
        Ok(forms) => forms,
        Err(e) => {
            eprintln!("{}: {e}", e.category());
            return;
        }
    };
    for form in forms {
        match runtime.run_form(&form) {
            Ok(Value::Unspecified) => {}
            Ok(value) => println!("{value}"),
            Err(e) => {
                eprintln!("{}: {e}", e.category());
                return;
            }
        }
    }
}
