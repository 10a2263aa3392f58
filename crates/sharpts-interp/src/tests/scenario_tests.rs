//! The end-to-end reference scenarios: literal inputs with pinned
//! outputs, run through scan -> parse -> check -> interpret.

use sharpts_parser::parse_source;

use crate::run_program_to_string;

fn run(source: &str) -> String {
    let program = parse_source(source).expect("parse failed");
    sharpts_checker::check(&program).expect("check failed");
    run_program_to_string(&program).expect("run failed")
}

#[test]
fn numeric_separator_literal() {
    assert_eq!(run("let x = 1_000_000; console.log(x);"), "1000000\n");
}

#[test]
fn enum_forward_and_reverse() {
    assert_eq!(
        run("enum D { Up, Down } console.log(D.Up, D[0]);"),
        "0 Up\n"
    );
}

#[test]
fn overloaded_function_by_argument_type() {
    assert_eq!(
        run(
            "function f(x: number): number;\n\
             function f(x: string): string;\n\
             function f(x: number | string): number | string { return typeof x === \"number\" ? x * 2 : x.toUpperCase(); }\n\
             console.log(f(5), f(\"hi\"));"
        ),
        "10 HI\n"
    );
}

#[test]
fn async_function_then() {
    assert_eq!(
        run("async function g(): Promise<number> { return 42; } g().then(v => console.log(v));"),
        "42\n"
    );
}

#[test]
fn generator_for_of() {
    assert_eq!(
        run(
            "function* r(n: number): Generator<number> { for (let i = 0; i < n; i++) yield i; }\n\
             for (const v of r(3)) console.log(v);"
        ),
        "0\n1\n2\n"
    );
}

#[test]
fn mapped_type_partial_object() {
    assert_eq!(
        run(
            "type P<T> = { [K in keyof T]?: T[K] };\n\
             let o: P<{a: number; b: string}> = {a: 1};\n\
             console.log(o.a);"
        ),
        "1\n"
    );
}

#[test]
fn override_with_super_call() {
    assert_eq!(
        run(
            "class A { greet(): string { return \"hi\"; } }\n\
             class B extends A { override greet(): string { return super.greet() + \"!\"; } }\n\
             console.log(new B().greet());"
        ),
        "hi!\n"
    );
}

#[test]
fn ill_typed_programs_refuse_to_run() {
    // Both running modes refuse to produce output for rejected programs;
    // the pipeline stops at the checker.
    let program = parse_source("let x: number = \"hi\"; console.log(x);").expect("parse failed");
    assert!(sharpts_checker::check(&program).is_err());
}
