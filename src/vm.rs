// File: src/vm.rs
//
// Stack-based virtual machine for Glint bytecode. Executes a chunk
// through a stack of call frames, each holding a closure reference, an
// instruction pointer, and a base slot pointer into the shared value
// stack. Single-threaded, synchronous: there is no suspension point and
// no re-entrancy from native functions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use colored::Colorize;

use crate::chunk::OpCode;
use crate::compiler;
use crate::debug;
use crate::natives;
use crate::value::{
    NativeFn, ObjClosure, ObjNative, StringInterner, Upvalue, UpvalueRef, Value,
};

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = FRAMES_MAX * 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

struct CallFrame {
    closure: Rc<ObjClosure>,
    ip: usize,
    slot_base: usize,
}

/// Owns every piece of process-wide interpreter state described in the
/// data model: the value stack, call frames, globals table, intern
/// table, and the open-upvalues list. Threaded explicitly rather than
/// kept behind module statics, so nothing prevents embedding more than
/// one `Vm` in the same process.
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: HashMap<Rc<str>, Value>,
    strings: StringInterner,
    /// Sorted strictly by decreasing stack index (invariant 5).
    open_upvalues: Vec<UpvalueRef>,
    /// `None` prints to real stdout; tests redirect here instead.
    output: Option<Rc<RefCell<Vec<u8>>>>,
    pub trace: bool,
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Vm {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: HashMap::new(),
            strings: StringInterner::new(),
            open_upvalues: Vec::new(),
            output: None,
            trace: false,
        };
        for (name, arity, function) in natives::builtins() {
            vm.define_native(name, arity, function);
        }
        vm
    }

    /// Redirects `print` output into a buffer instead of real stdout;
    /// used by integration tests to assert on program output.
    pub fn set_output(&mut self, sink: Rc<RefCell<Vec<u8>>>) {
        self.output = Some(sink);
    }

    pub fn define_native(&mut self, name: &'static str, arity: u8, function: NativeFn) {
        let native = natives::make_native(name, arity, function);
        let key: Rc<str> = Rc::from(name);
        self.globals.insert(key, Value::Native(Rc::new(native)));
    }

    fn write_output(&self, line: &str) {
        match &self.output {
            Some(buf) => {
                let mut buf = buf.borrow_mut();
                let _ = writeln!(buf, "{}", line);
            }
            None => println!("{}", line),
        }
    }

    /// Compiles and runs a source string. Resets the stack and frames
    /// first so a `Vm` can be reused across multiple `interpret` calls
    /// (as the REPL does) without carrying over a prior run's state.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();

        let Some(function) = compiler::compile(source, &mut self.strings) else {
            return InterpretResult::CompileError;
        };

        let closure = Rc::new(ObjClosure { function, upvalues: Vec::new() });
        self.stack.push(Value::Closure(Rc::clone(&closure)));
        self.frames.push(CallFrame { closure, ip: 0, slot_base: 0 });

        self.run()
    }

    // --- stack helpers --------------------------------------------------

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: compiler emitted unbalanced bytecode")
    }

    fn peek(&self, distance: usize) -> &Value {
        let len = self.stack.len();
        &self.stack[len - 1 - distance]
    }

    // --- errors -----------------------------------------------------------

    /// Prints the message and an innermost-first stack trace, matching
    /// the embedding contract: the VM resets its own stack before
    /// returning control, the caller only sees `RuntimeError`.
    fn runtime_error(&mut self, message: &str) -> InterpretResult {
        eprintln!("{}", message.red());

        for frame in self.frames.iter().rev() {
            let function = &frame.closure.function;
            let instruction = frame.ip.saturating_sub(1);
            let line = function.chunk.lines.get(instruction).copied().unwrap_or(0);
            if function.name.is_some() {
                eprintln!("{}", format!("[line {}] in {}()", line, function.display_name()).red());
            } else {
                eprintln!("{}", format!("[line {}] in script", line).red());
            }
        }

        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        InterpretResult::RuntimeError
    }

    // --- upvalues -----------------------------------------------------

    fn capture_upvalue(&mut self, stack_index: usize) -> UpvalueRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, existing) in self.open_upvalues.iter().enumerate() {
            let idx = match &*existing.borrow() {
                Upvalue::Open(idx) => *idx,
                Upvalue::Closed(_) => unreachable!("open list holds only open upvalues"),
            };
            if idx == stack_index {
                return Rc::clone(existing);
            }
            if idx < stack_index {
                insert_at = i;
                break;
            }
        }
        let created: UpvalueRef = Rc::new(RefCell::new(Upvalue::Open(stack_index)));
        self.open_upvalues.insert(insert_at, Rc::clone(&created));
        created
    }

    /// Hoists every open upvalue at or above `boundary` onto the heap,
    /// maintaining invariant 5 (the list stays sorted, now shorter).
    fn close_upvalues(&mut self, boundary: usize) {
        while let Some(top) = self.open_upvalues.first() {
            let idx = match &*top.borrow() {
                Upvalue::Open(idx) => *idx,
                Upvalue::Closed(_) => unreachable!(),
            };
            if idx < boundary {
                break;
            }
            let value = self.stack[idx].clone();
            *self.open_upvalues[0].borrow_mut() = Upvalue::Closed(value);
            self.open_upvalues.remove(0);
        }
    }

    fn read_upvalue(&self, upvalue: &UpvalueRef) -> Value {
        match &*upvalue.borrow() {
            Upvalue::Open(idx) => self.stack[*idx].clone(),
            Upvalue::Closed(value) => value.clone(),
        }
    }

    fn write_upvalue(&mut self, upvalue: &UpvalueRef, value: Value) {
        let idx = match &*upvalue.borrow() {
            Upvalue::Open(idx) => Some(*idx),
            Upvalue::Closed(_) => None,
        };
        match idx {
            Some(idx) => self.stack[idx] = value,
            None => *upvalue.borrow_mut() = Upvalue::Closed(value),
        }
    }

    // --- calls --------------------------------------------------------

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), InterpretResult> {
        match callee {
            Value::Closure(closure) => self.call_closure(closure, arg_count),
            Value::Native(native) => self.call_native(native, arg_count),
            _ => Err(self.runtime_error("Can only call functions and classes.")),
        }
    }

    fn call_closure(&mut self, closure: Rc<ObjClosure>, arg_count: u8) -> Result<(), InterpretResult> {
        let arity = closure.function.arity;
        if arg_count != arity {
            return Err(self.runtime_error(&format!(
                "Expected {} arguments but got {}.",
                arity, arg_count
            )));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        let slot_base = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame { closure, ip: 0, slot_base });
        Ok(())
    }

    fn call_native(&mut self, native: Rc<ObjNative>, arg_count: u8) -> Result<(), InterpretResult> {
        if arg_count != native.arity {
            return Err(self.runtime_error(&format!(
                "Expected {} arguments but got {}.",
                native.arity, arg_count
            )));
        }
        let start = self.stack.len() - arg_count as usize;
        let args: Vec<Value> = self.stack[start..].to_vec();
        let result = (native.function)(&args)
            .map_err(|message| self.runtime_error(&message))?;
        self.stack.truncate(start - 1);
        self.push(result);
        Ok(())
    }

    // --- dispatch loop --------------------------------------------------

    fn run(&mut self) -> InterpretResult {
        loop {
            if self.trace {
                self.trace_state();
            }

            let op = OpCode::from_byte(self.read_byte());
            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slot_base;
                    self.push(self.stack[base + slot].clone());
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slot_base;
                    self.stack[base + slot] = self.peek(0).clone();
                }
                OpCode::GetGlobal => {
                    let name = self.read_string();
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.push(value);
                        }
                        None => {
                            return self
                                .runtime_error(&format!("Undefined variable '{}'.", name));
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let value = self.peek(0).clone();
                    self.globals.insert(name, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    if !self.globals.contains_key(&name) {
                        return self.runtime_error(&format!("Undefined variable '{}'.", name));
                    }
                    let value = self.peek(0).clone();
                    self.globals.insert(name, value);
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let upvalue = Rc::clone(&self.frame().closure.upvalues[slot]);
                    let value = self.read_upvalue(&upvalue);
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let upvalue = Rc::clone(&self.frame().closure.upvalues[slot]);
                    let value = self.peek(0).clone();
                    self.write_upvalue(&upvalue, value);
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => {
                    if let Err(r) = self.binary_number_cmp(|a, b| a > b) {
                        return r;
                    }
                }
                OpCode::Less => {
                    if let Err(r) = self.binary_number_cmp(|a, b| a < b) {
                        return r;
                    }
                }
                OpCode::Add => {
                    if let Err(r) = self.add() {
                        return r;
                    }
                }
                OpCode::Subtract => {
                    if let Err(r) = self.binary_number_op(|a, b| a - b) {
                        return r;
                    }
                }
                OpCode::Multiply => {
                    if let Err(r) = self.binary_number_op(|a, b| a * b) {
                        return r;
                    }
                }
                OpCode::Divide => {
                    if let Err(r) = self.binary_number_op(|a, b| a / b) {
                        return r;
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    if !matches!(self.peek(0), Value::Number(_)) {
                        return self.runtime_error("Operand must be a number.");
                    }
                    let n = match self.pop() {
                        Value::Number(n) => n,
                        _ => unreachable!(),
                    };
                    self.push(Value::Number(-n));
                }
                OpCode::Print => {
                    let value = self.pop();
                    let line = value.to_string();
                    self.write_output(&line);
                }
                OpCode::Jump => {
                    let offset = self.read_short();
                    self.frame_mut().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short();
                    self.frame_mut().ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek(arg_count as usize).clone();
                    if let Err(r) = self.call_value(callee, arg_count) {
                        return r;
                    }
                }
                OpCode::Closure => {
                    let function = match self.read_constant() {
                        Value::Function(f) => f,
                        _ => unreachable!("compiler only emits CLOSURE over a Function constant"),
                    };
                    let count = function.upvalue_count;
                    let mut upvalues = Vec::with_capacity(count);
                    for _ in 0..count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        if is_local {
                            let base = self.frame().slot_base;
                            upvalues.push(self.capture_upvalue(base + index));
                        } else {
                            upvalues.push(Rc::clone(&self.frame().closure.upvalues[index]));
                        }
                    }
                    self.push(Value::Closure(Rc::new(ObjClosure { function, upvalues })));
                }
                OpCode::CloseUpvalue => {
                    let boundary = self.stack.len() - 1;
                    self.close_upvalues(boundary);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let boundary = self.frame().slot_base;
                    self.close_upvalues(boundary);
                    self.frames.pop();
                    if self.frames.is_empty() {
                        self.stack.clear();
                        return InterpretResult::Ok;
                    }
                    self.stack.truncate(boundary);
                    self.push(result);
                }
            }
        }
    }

    fn trace_state(&self) {
        print!("          ");
        for slot in &self.stack {
            print!("[ {} ]", slot);
        }
        println!();
        let frame = self.frames.last().expect("run() always has a frame");
        debug::disassemble_instruction(&frame.closure.function.chunk, frame.ip);
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("run() always has a frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("run() always has a frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("run() always has a frame");
        let byte = frame.closure.function.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let idx = self.read_byte() as usize;
        self.frame().closure.function.chunk.constants[idx].clone()
    }

    fn read_string(&mut self) -> Rc<str> {
        match self.read_constant() {
            Value::String(s) => Rc::clone(&s.chars),
            _ => unreachable!("compiler only emits *_GLOBAL over a String constant"),
        }
    }

    fn binary_number_op(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), InterpretResult> {
        let (a, b) = self.number_operands()?;
        self.push(Value::Number(op(a, b)));
        Ok(())
    }

    fn binary_number_cmp(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), InterpretResult> {
        let (a, b) = self.number_operands()?;
        self.push(Value::Bool(op(a, b)));
        Ok(())
    }

    fn number_operands(&mut self) -> Result<(f64, f64), InterpretResult> {
        let ok = matches!(self.peek(0), Value::Number(_)) && matches!(self.peek(1), Value::Number(_));
        if !ok {
            return Err(self.runtime_error("Operands must be numbers."));
        }
        let b = match self.pop() {
            Value::Number(n) => n,
            _ => unreachable!(),
        };
        let a = match self.pop() {
            Value::Number(n) => n,
            _ => unreachable!(),
        };
        Ok((a, b))
    }

    fn add(&mut self) -> Result<(), InterpretResult> {
        let both_numbers = matches!(self.peek(0), Value::Number(_)) && matches!(self.peek(1), Value::Number(_));
        let both_strings = matches!(self.peek(0), Value::String(_)) && matches!(self.peek(1), Value::String(_));

        if both_numbers {
            let b = match self.pop() {
                Value::Number(n) => n,
                _ => unreachable!(),
            };
            let a = match self.pop() {
                Value::Number(n) => n,
                _ => unreachable!(),
            };
            self.push(Value::Number(a + b));
            Ok(())
        } else if both_strings {
            let b = match self.pop() {
                Value::String(s) => s,
                _ => unreachable!(),
            };
            let a = match self.pop() {
                Value::String(s) => s,
                _ => unreachable!(),
            };
            let concatenated = format!("{}{}", a.as_str(), b.as_str());
            let interned = self.strings.intern(&concatenated);
            self.push(Value::String(interned));
            Ok(())
        } else {
            Err(self.runtime_error("Operands must be two numbers or two strings."))
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_capture(source: &str) -> (InterpretResult, String) {
        let mut vm = Vm::new();
        let sink = Rc::new(RefCell::new(Vec::new()));
        vm.set_output(Rc::clone(&sink));
        let result = vm.interpret(source);
        let out = String::from_utf8(sink.borrow().clone()).expect("output is valid utf8");
        (result, out)
    }

    #[test]
    fn arithmetic_precedence() {
        let (result, out) = run_capture("print 1 + 2 * 3;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(out, "7\n");
    }

    #[test]
    fn string_concatenation() {
        let (result, out) = run_capture(r#"var a = "he"; var b = "llo"; print a + b;"#);
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn closure_captures_local_by_reference() {
        let (result, out) = run_capture(
            "fun make() { var x = 10; fun get() { return x; } return get; } \
             var g = make(); print g(); print g();",
        );
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(out, "10\n10\n");
    }

    #[test]
    fn closed_upvalue_mutation_persists_across_calls() {
        let (result, out) = run_capture(
            "fun counter() { var n = 0; fun inc() { n = n + 1; return n; } return inc; } \
             var c = counter(); print c(); print c(); print c();",
        );
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(out, "1\n2\n3\n");
    }

    #[test]
    fn for_loop_accumulates() {
        let (result, out) =
            run_capture("var s = 0; for (var i = 1; i <= 5; i = i + 1) { s = s + i; } print s;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(out, "15\n");
    }

    #[test]
    fn or_short_circuits_on_first_truthy_operand() {
        let (result, out) = run_capture(r#"if (nil or 0) print "t"; else print "f";"#);
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(out, "t\n");
    }

    #[test]
    fn adding_number_and_string_is_a_runtime_error() {
        let (result, _) = run_capture(r#"1 + "a";"#);
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn reading_undefined_global_is_a_runtime_error() {
        let (result, _) = run_capture("a + 1;");
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn calling_with_wrong_arity_is_a_runtime_error() {
        let (result, _) = run_capture("fun f() {} f(1);");
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn calling_a_non_callable_is_a_runtime_error() {
        let (result, _) = run_capture("var a = 1; a();");
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn stack_is_empty_after_a_runtime_error() {
        let mut vm = Vm::new();
        let result = vm.interpret("1 + \"a\";");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
    }

    #[test]
    fn compile_error_is_reported_without_running() {
        let mut vm = Vm::new();
        let result = vm.interpret("var a = ;");
        assert_eq!(result, InterpretResult::CompileError);
    }

    #[test]
    fn clock_native_is_registered_at_startup() {
        let (result, out) = run_capture("print clock() >= 0;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(out, "true\n");
    }

    #[test]
    fn setting_an_undefined_global_is_a_runtime_error_and_does_not_define_it() {
        let mut vm = Vm::new();
        let result = vm.interpret("a = 1;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(!vm.globals.contains_key("a"));
    }

    #[test]
    fn vm_can_be_reused_across_interpret_calls() {
        let mut vm = Vm::new();
        let sink = Rc::new(RefCell::new(Vec::new()));
        vm.set_output(Rc::clone(&sink));
        assert_eq!(vm.interpret("var x = 1; print x;"), InterpretResult::Ok);
        assert_eq!(vm.interpret("var y = 2; print y;"), InterpretResult::Ok);
        let out = String::from_utf8(sink.borrow().clone()).unwrap();
        assert_eq!(out, "1\n2\n");
    }
}
