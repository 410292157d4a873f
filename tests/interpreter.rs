use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use lox_interpreter as lox;

use lox::error::LoxError;
use lox::interpreter::Interpreter;
use lox::parser::Parser;
use lox::resolver::Resolver;
use lox::scanner::scan;

/// In-memory `print` sink shared between the test and the interpreter.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("print output was not UTF-8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run the whole pipeline; panics on any static error, returns the
/// interpreter outcome and everything the program printed.
fn try_run(source: &str) -> (Result<(), LoxError>, String) {
    let (tokens, scan_errors) = scan(source.as_bytes());
    assert!(scan_errors.is_empty(), "scan errors: {:?}", scan_errors);

    let (program, parse_errors) = Parser::new(&tokens).parse();
    assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);

    let (locals, resolve_errors) = Resolver::new().resolve(&program);
    assert!(resolve_errors.is_empty(), "resolve errors: {:?}", resolve_errors);

    let out = SharedBuf::default();
    let mut interpreter = Interpreter::with_output(Box::new(out.clone()));
    let result = interpreter.interpret(&program, locals);

    (result, out.contents())
}

fn run(source: &str) -> String {
    let (result, output) = try_run(source);
    result.expect("program should run without runtime errors");
    output
}

fn run_expect_error(source: &str) -> (LoxError, String) {
    let (result, output) = try_run(source);
    (result.expect_err("program should fail at runtime"), output)
}

// ───────────────────────── arithmetic & printing ────────────────────────────

#[test]
fn division_follows_double_precision_semantics() {
    assert_eq!(run("print 1 / 3;"), "0.3333333333333333\n");
    assert_eq!(run("print 10 / 4;"), "2.5\n");
}

#[test]
fn integral_numbers_print_without_trailing_decimal() {
    assert_eq!(run("print 3.0;"), "3\n");
    assert_eq!(run("print 2 + 2;"), "4\n");
    assert_eq!(run("print -0.5 * 2;"), "-1\n");
}

#[test]
fn string_concatenation() {
    assert_eq!(run("print \"foo\" + \"bar\";"), "foobar\n");
}

#[test]
fn mixed_plus_operands_are_a_type_error() {
    let (err, _) = run_expect_error("print \"1\" + 1;");

    match err {
        LoxError::Runtime { message, line, .. } => {
            assert!(message.contains("two numbers or two strings"));
            assert_eq!(line, 1);
        }
        other => panic!("expected runtime error, got {:?}", other),
    }
}

#[test]
fn comparison_requires_numbers() {
    let (err, _) = run_expect_error("print \"a\" < \"b\";");
    assert!(err.to_string().contains("Operands must be numbers"));
}

#[test]
fn equality_is_strict_across_types() {
    assert_eq!(
        run("print 1 == 1; print nil == nil; print 1 == \"1\"; print nil == false;"),
        "true\ntrue\nfalse\nfalse\n"
    );
}

#[test]
fn truthiness_nil_and_false_only() {
    // 0 and "" are truthy; `or`/`and` yield the deciding operand itself.
    assert_eq!(
        run("print !nil; print !false; print !0; print !\"\"; print 0 or 9; print nil or 9;"),
        "true\ntrue\nfalse\nfalse\n0\n9\n"
    );
}

// ───────────────────────── variables & scoping ──────────────────────────────

#[test]
fn undefined_variable_is_a_runtime_error() {
    let (err, _) = run_expect_error("print missing;");

    match err {
        LoxError::Runtime { message, lexeme, line } => {
            assert!(message.contains("Undefined variable 'missing'"));
            assert_eq!(lexeme, "missing");
            assert_eq!(line, 1);
        }
        other => panic!("expected runtime error, got {:?}", other),
    }
}

#[test]
fn shadowing_initializer_reads_the_outer_binding() {
    assert_eq!(
        run("var a = 1; { var a = a + 1; print a; } print a;"),
        "2\n1\n"
    );
}

#[test]
fn assignment_is_an_expression_yielding_its_value() {
    assert_eq!(run("var a = 1; print a = 7;"), "7\n");
}

#[test]
fn while_loop_runs_until_condition_is_falsy() {
    assert_eq!(
        run("var i = 0; while (i < 3) { print i; i = i + 1; }"),
        "0\n1\n2\n"
    );
}

#[test]
fn for_loop_desugars_and_runs() {
    assert_eq!(run("for (var i = 0; i < 3; i = i + 1) print i;"), "0\n1\n2\n");
}

// ───────────────────────── functions & closures ─────────────────────────────

#[test]
fn function_without_return_yields_nil() {
    assert_eq!(run("fun f() {} print f();"), "nil\n");
}

#[test]
fn return_unwinds_through_nested_blocks_and_loops() {
    let source = "
        fun f() {
            while (true) {
                { return 42; }
            }
            print \"unreachable\";
        }
        print f();
    ";
    assert_eq!(run(source), "42\n");
}

#[test]
fn closures_capture_the_environment_not_a_snapshot() {
    let source = "
        fun makeCounter() {
            var count = 0;
            fun increment() {
                count = count + 1;
                return count;
            }
            return increment;
        }
        var counter = makeCounter();
        print counter();
        print counter();
    ";
    assert_eq!(run(source), "1\n2\n");
}

#[test]
fn two_closures_share_one_captured_frame() {
    let source = "
        fun makePair() {
            var n = 0;
            fun bump() { n = n + 1; }
            fun read() { return n; }
            bump();
            bump();
            return read;
        }
        print makePair()();
    ";
    assert_eq!(run(source), "2\n");
}

#[test]
fn arity_mismatch_fails_before_the_body_runs() {
    let source = "
        fun f(a) {
            print \"entered\";
            return a;
        }
        print f(1, 2);
    ";
    let (err, output) = run_expect_error(source);

    assert!(err.to_string().contains("Expected 1 arguments but got 2."));
    assert_eq!(output, "", "body must not execute on arity mismatch");
}

#[test]
fn calling_a_non_callable_is_a_runtime_error() {
    let (err, _) = run_expect_error("var x = 1; x();");
    assert!(err
        .to_string()
        .contains("Can only call functions and classes"));
}

#[test]
fn anonymous_functions_are_first_class() {
    let source = "
        var twice = fun (x) { return x + x; };
        fun apply(f, v) { return f(v); }
        print apply(twice, 4);
        print twice;
    ";
    assert_eq!(run(source), "8\n<fn>\n");
}

#[test]
fn named_function_prints_with_its_name() {
    assert_eq!(run("fun greet() {} print greet;"), "<fn greet>\n");
}

#[test]
fn native_clock_is_installed_and_callable() {
    assert_eq!(run("print clock() > 0;"), "true\n");
    assert_eq!(run("print clock;"), "<native fn clock>\n");
}

#[test]
fn recursion_resolves_through_the_declaring_scope() {
    let source = "
        fun fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        print fib(10);
    ";
    assert_eq!(run(source), "55\n");
}

// ───────────────────────── classes & inheritance ────────────────────────────

#[test]
fn class_and_instance_print_forms() {
    assert_eq!(
        run("class Bagel {} print Bagel; print Bagel();"),
        "Bagel\nBagel instance\n"
    );
}

#[test]
fn fields_are_created_by_assignment() {
    assert_eq!(
        run("class Box {} var b = Box(); b.contents = \"jam\"; print b.contents;"),
        "jam\n"
    );
}

#[test]
fn undefined_property_read_is_a_runtime_error() {
    let (err, _) = run_expect_error("class Box {} print Box().missing;");
    assert!(err.to_string().contains("Undefined property 'missing'"));
}

#[test]
fn property_access_on_non_instance_is_a_runtime_error() {
    let (err, _) = run_expect_error("var x = 1; print x.field;");
    assert!(err.to_string().contains("Only instances have properties"));

    let (err, _) = run_expect_error("var x = 1; x.field = 2;");
    assert!(err.to_string().contains("Only instances have fields"));
}

#[test]
fn methods_see_this_through_their_binding() {
    let source = "
        class Person {
            init(name) { this.name = name; }
            greet() { print \"hi \" + this.name; }
        }
        Person(\"lox\").greet();
    ";
    assert_eq!(run(source), "hi lox\n");
}

#[test]
fn bound_methods_survive_being_stored() {
    let source = "
        class Person {
            init(name) { this.name = name; }
            greet() { print \"hi \" + this.name; }
        }
        var method = Person(\"lox\").greet;
        method();
    ";
    assert_eq!(run(source), "hi lox\n");
}

#[test]
fn initializer_arity_is_enforced_on_the_class_call() {
    let (err, _) = run_expect_error(
        "class Point { init(x, y) { this.x = x; this.y = y; } } Point(1);",
    );
    assert!(err.to_string().contains("Expected 2 arguments but got 1."));
}

#[test]
fn constructors_always_yield_the_instance() {
    // Bare `return;` inside init exits early but cannot redirect the result.
    let source = "
        class Foo {
            init() {
                this.ready = true;
                return;
            }
        }
        var f = Foo();
        print f;
        print f.ready;
    ";
    assert_eq!(run(source), "Foo instance\ntrue\n");
}

#[test]
fn calling_init_directly_returns_this() {
    let source = "
        class Foo {
            init() { this.n = 0; }
        }
        var f = Foo();
        print f.init();
    ";
    assert_eq!(run(source), "Foo instance\n");
}

#[test]
fn methods_are_inherited_from_the_superclass() {
    let source = "
        class A { hello() { print \"from A\"; } }
        class B < A {}
        B().hello();
    ";
    assert_eq!(run(source), "from A\n");
}

#[test]
fn super_dispatches_on_the_static_superclass() {
    // C inherits B's test(); `super` inside B still means A, no matter the
    // runtime class of `this`.
    let source = "
        class A { method() { print \"A method\"; } }
        class B < A {
            method() { print \"B method\"; }
            test() { super.method(); }
        }
        class C < B {}
        C().test();
    ";
    assert_eq!(run(source), "A method\n");
}

#[test]
fn overridden_method_wins_on_the_instance() {
    let source = "
        class A { speak() { print \"A\"; } }
        class B < A { speak() { print \"B\"; } }
        B().speak();
    ";
    assert_eq!(run(source), "B\n");
}

#[test]
fn superclass_must_be_a_class_value() {
    let (err, _) = run_expect_error("var NotAClass = 1; class Sub < NotAClass {}");
    assert!(err.to_string().contains("Superclass must be a class"));
}

#[test]
fn runtime_error_halts_the_remaining_program() {
    let (err, output) = run_expect_error("print 1; print missing; print 2;");

    assert!(err.to_string().contains("Undefined variable"));
    assert_eq!(output, "1\n", "statements after the error must not run");
}

#[test]
fn runtime_error_reports_the_offending_line() {
    let (err, _) = run_expect_error("var a = 1;\nvar b = 2;\nprint a + nil;");

    match err {
        LoxError::Runtime { line, .. } => assert_eq!(line, 3),
        other => panic!("expected runtime error, got {:?}", other),
    }
}
