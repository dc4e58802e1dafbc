// Integration tests for the Glint interpreter.
//
// These drive complete programs through the public `Vm` surface and
// check captured stdout and `InterpretResult`, the same contract the
// CLI's `run` subcommand exposes.

use std::cell::RefCell;
use std::rc::Rc;

use glint::vm::{InterpretResult, Vm};

fn run(source: &str) -> (InterpretResult, String) {
    let mut vm = Vm::new();
    let sink = Rc::new(RefCell::new(Vec::new()));
    vm.set_output(Rc::clone(&sink));
    let result = vm.interpret(source);
    let output = String::from_utf8(sink.borrow().clone()).expect("program output is valid utf8");
    (result, output)
}

#[test]
fn operator_precedence() {
    let (result, out) = run("print 1 + 2 * 3;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "7\n");
}

#[test]
fn string_concatenation() {
    let (result, out) = run(r#"var a = "he"; var b = "llo"; print a + b;"#);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "hello\n");
}

#[test]
fn closure_over_an_enclosing_local() {
    let (result, out) = run(
        "fun make() { var x = 10; fun get() { return x; } return get; } \
         var g = make(); print g(); print g();",
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "10\n10\n");
}

#[test]
fn mutation_through_a_shared_closed_upvalue() {
    let (result, out) = run(
        "fun counter() { var n = 0; fun inc() { n = n + 1; return n; } return inc; } \
         var c = counter(); print c(); print c(); print c();",
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "1\n2\n3\n");
}

#[test]
fn for_loop_summation() {
    let (result, out) =
        run("var s = 0; for (var i = 1; i <= 5; i = i + 1) { s = s + i; } print s;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "15\n");
}

#[test]
fn or_short_circuits_on_first_truthy_operand() {
    let (result, out) = run(r#"if (nil or 0) print "t"; else print "f";"#);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "t\n");
}

#[test]
fn left_associative_subtraction() {
    // A left-to-right evaluation order is invisible in `1 + 2 * 3`
    // (scenario 1) but not here: right-associative subtraction would
    // compute 10 - (3 - 2) = 9 instead of (10 - 3) - 2 = 5.
    let (result, out) = run("print 10 - 3 - 2;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "5\n");
}

#[test]
fn global_self_referencing_initializer_is_a_runtime_error() {
    // The initializer compiles to GET_GLOBAL "a" before DEFINE_GLOBAL "a"
    // runs, so "a" isn't defined yet when the initializer reads it. This
    // matches the original reference interpreter's behavior rather than
    // the "reads nil" text describing this case elsewhere, since that
    // text does not square with GET_GLOBAL's own documented contract of
    // erroring on an undefined name.
    let (result, _) = run("var a = a; print a;");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn local_self_referencing_initializer_is_a_compile_error() {
    let (result, _) = run("{ var a = a; }");
    assert_eq!(result, InterpretResult::CompileError);
}

#[test]
fn adding_number_and_string_is_a_runtime_error() {
    let (result, _) = run(r#"1 + "a";"#);
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn reading_an_undefined_global_is_a_runtime_error() {
    let (result, _) = run("a + 1;");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn calling_with_the_wrong_arity_is_a_runtime_error() {
    let (result, _) = run("fun f(){} f(1);");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn deeply_nested_closures_each_capture_their_own_frame() {
    let (result, out) = run(
        "fun outer() { \
            var a = 1; \
            fun middle() { \
                var b = 2; \
                fun inner() { return a + b; } \
                return inner; \
            } \
            return middle(); \
         } \
         print outer()();",
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "3\n");
}

#[test]
fn recursive_function_runs_to_completion() {
    let (result, out) = run(
        "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);",
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "55\n");
}
