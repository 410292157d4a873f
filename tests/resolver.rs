use lox_interpreter as lox;

use lox::error::LoxError;
use lox::parser::Parser;
use lox::resolver::{Locals, Resolver};
use lox::scanner::scan;

fn resolve_source(source: &str) -> (Locals, Vec<LoxError>) {
    let (tokens, scan_errors) = scan(source.as_bytes());
    assert!(scan_errors.is_empty(), "scan errors: {:?}", scan_errors);

    let (program, parse_errors) = Parser::new(&tokens).parse();
    assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);

    Resolver::new().resolve(&program)
}

fn messages(errors: &[LoxError]) -> Vec<String> {
    errors.iter().map(|e| e.to_string()).collect()
}

#[test]
fn globals_are_absent_from_the_table() {
    let (locals, errors) = resolve_source("var a = 1; print a; a = 2;");

    assert!(errors.is_empty());
    assert!(
        locals.is_empty(),
        "top-level names are globals, got {:?}",
        locals
    );
}

#[test]
fn block_local_resolves_at_distance_zero() {
    let (locals, errors) = resolve_source("{ var a = 1; print a; }");

    assert!(errors.is_empty());
    assert_eq!(locals.len(), 1);
    assert_eq!(locals.values().copied().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn nested_block_reference_counts_enclosing_scopes() {
    let (locals, errors) = resolve_source("{ var a = 1; { { print a; } } }");

    assert!(errors.is_empty());
    assert_eq!(locals.len(), 1);
    assert_eq!(locals.values().copied().collect::<Vec<_>>(), vec![2]);
}

#[test]
fn closure_captures_resolve_through_function_scopes() {
    // `count` is two frames up from its use: function body scope, then the
    // enclosing block scope that declares it.
    let source = "
        {
            var count = 0;
            fun tick() {
                count = count + 1;
                print count;
            }
            tick();
        }
    ";
    let (locals, errors) = resolve_source(source);

    assert!(errors.is_empty());
    // Three `count` occurrences inside tick at distance 1, plus the call
    // target `tick` at distance 0.
    let mut distances: Vec<usize> = locals.values().copied().collect();
    distances.sort_unstable();
    assert_eq!(distances, vec![0, 1, 1, 1]);
}

#[test]
fn initializer_reading_its_own_name_binds_outward() {
    // The inner declaration is still mid-initialization while its
    // initializer resolves, so `a` there means the enclosing `a`.
    let (locals, errors) = resolve_source("{ var a = 1; { var a = a + 1; print a; } }");

    assert!(errors.is_empty(), "diagnostics: {:?}", errors);

    let mut distances: Vec<usize> = locals.values().copied().collect();
    distances.sort_unstable();
    // initializer `a` → outer block (distance 1); `print a` → the freshly
    // defined inner slot (distance 0).
    assert_eq!(distances, vec![0, 1]);
}

#[test]
fn self_reference_with_no_outer_binding_falls_through_to_globals() {
    let (locals, errors) = resolve_source("{ var a = a; }");

    assert!(errors.is_empty());
    assert!(locals.is_empty(), "initializer `a` should be global, got {:?}", locals);
}

#[test]
fn redeclaration_in_same_scope_is_legal() {
    // Later definition wins; rebinding is not an error at any scope depth.
    let (_, errors) = resolve_source("{ var a = 1; var a = 2; print a; }");
    assert!(errors.is_empty());

    let (_, errors) = resolve_source("var a = 1; var a = 2;");
    assert!(errors.is_empty());
}

#[test]
fn return_outside_function_is_reported() {
    let (_, errors) = resolve_source("return 1;");

    assert_eq!(errors.len(), 1);
    assert!(messages(&errors)[0].contains("return from top-level code"));
}

#[test]
fn return_with_value_in_initializer_is_reported() {
    let (_, errors) = resolve_source("class Foo { init() { return 1; } }");

    assert_eq!(errors.len(), 1);
    assert!(messages(&errors)[0].contains("return a value from an initializer"));
}

#[test]
fn bare_return_in_initializer_is_legal() {
    let (_, errors) = resolve_source("class Foo { init() { return; } }");

    assert!(errors.is_empty(), "diagnostics: {:?}", errors);
}

#[test]
fn this_outside_a_class_is_reported() {
    let (_, errors) = resolve_source("print this;");

    assert_eq!(errors.len(), 1);
    assert!(messages(&errors)[0].contains("'this' outside of a class"));

    let (_, errors) = resolve_source("fun f() { return this; }");
    assert_eq!(errors.len(), 1);
}

#[test]
fn this_inside_a_method_is_legal() {
    let (locals, errors) = resolve_source("class Foo { m() { return this; } }");

    assert!(errors.is_empty());
    // `this` resolves one scope out of the method body.
    assert_eq!(locals.values().copied().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn super_outside_a_class_is_reported() {
    let (_, errors) = resolve_source("print super.m;");

    assert_eq!(errors.len(), 1);
    assert!(messages(&errors)[0].contains("'super' outside of a class"));
}

#[test]
fn super_without_a_superclass_is_reported() {
    let (_, errors) = resolve_source("class Foo { m() { super.m(); } }");

    assert_eq!(errors.len(), 1);
    assert!(messages(&errors)[0].contains("no superclass"));
}

#[test]
fn self_inheritance_is_reported() {
    let (_, errors) = resolve_source("class Oops < Oops {}");

    assert_eq!(errors.len(), 1);
    assert!(messages(&errors)[0].contains("inherit from itself"));
}

#[test]
fn resolution_continues_past_diagnostics() {
    // Both problems in one program: each is reported, neither masks the
    // other, and the valid local still lands in the table.
    let source = "
        return 1;
        print this;
        { var ok = true; print ok; }
    ";
    let (locals, errors) = resolve_source(source);

    assert_eq!(errors.len(), 2);
    assert_eq!(locals.len(), 1);
}
