// File: src/repl.rs
//
// Interactive REPL. Reads one line at a time until EOF and feeds each
// line to the VM as a complete `interpret` call; there is no multi-line
// buffering. State (globals, interned strings) persists across lines
// because the same `Vm` is reused for the whole session.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::vm::Vm;

pub fn run(vm: &mut Vm) -> i32 {
    println!("{}", "Glint REPL".bright_cyan().bold());
    println!("{}", "Enter an expression or statement, or Ctrl-D to exit.".bright_black());

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("{}", format!("Could not start REPL: {}", err).red());
            return 74;
        }
    };

    loop {
        match editor.readline(&"> ".bright_green().to_string()) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                if line.trim().is_empty() {
                    continue;
                }
                // A bare expression is convenient to type at a prompt but
                // isn't a legal statement; fall back to treating a line
                // that doesn't already end in `;` or `}` as one.
                let source = if needs_auto_semicolon(&line) {
                    format!("{};", line)
                } else {
                    line
                };
                // Compile/runtime errors are already reported by the VM;
                // the REPL just keeps looping either way.
                let _ = vm.interpret(&source);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{}", format!("Readline error: {}", err).red());
                return 74;
            }
        }
    }

    0
}

fn needs_auto_semicolon(line: &str) -> bool {
    let trimmed = line.trim_end();
    !(trimmed.ends_with(';') || trimmed.ends_with('}'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::InterpretResult;

    #[test]
    fn bare_expression_needs_a_semicolon() {
        assert!(needs_auto_semicolon("1 + 2"));
        assert!(!needs_auto_semicolon("var a = 1;"));
        assert!(!needs_auto_semicolon("fun f() {}"));
    }

    #[test]
    fn repl_session_shares_globals_across_lines() {
        let mut vm = Vm::new();
        assert_eq!(vm.interpret("var x = 1;"), InterpretResult::Ok);
        assert_eq!(vm.interpret("x = x + 1;"), InterpretResult::Ok);
        assert_eq!(vm.interpret("print x;"), InterpretResult::Ok);
    }
}
