//! Flow-sensitive narrowing behavior.

use sharpts_common::diagnostics::diagnostic_codes;
use sharpts_parser::parse_source;

use crate::check;

fn check_ok(source: &str) {
    let program = parse_source(source).expect("parse failed");
    if let Err(error) = check(&program) {
        panic!("expected success, got: {error} (source: {source})");
    }
}

fn check_err(source: &str, code: u32) {
    let program = parse_source(source).expect("parse failed");
    match check(&program) {
        Ok(_) => panic!("expected error {code}, but checking succeeded"),
        Err(error) => assert_eq!(error.code, code, "wrong code, message: {}", error.message),
    }
}

#[test]
fn typeof_narrows_in_branches() {
    check_ok(
        "function f(x: number | string): number {\n\
           if (typeof x === \"number\") { return x * 2; }\n\
           return x.length;\n\
         }",
    );
}

#[test]
fn typeof_narrows_in_conditional_expression() {
    check_ok(
        "function f(x: number | string): number | string {\n\
           return typeof x === \"number\" ? x * 2 : x.toUpperCase();\n\
         }",
    );
}

#[test]
fn without_narrowing_the_union_rejects_numeric_ops() {
    check_err(
        "function f(x: number | string): number { return x * 2; }",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}

#[test]
fn null_checks_narrow() {
    check_ok(
        "function f(x: string | null): number {\n\
           if (x === null) { return 0; }\n\
           return x.length;\n\
         }",
    );
    check_ok(
        "function f(x: string | null | undefined): number {\n\
           if (x == null) { return 0; }\n\
           return x.length;\n\
         }",
    );
}

#[test]
fn instanceof_narrows_to_the_class() {
    check_ok(
        "class Dog { bark(): string { return \"woof\"; } }\n\
         class Cat { meow(): string { return \"meow\"; } }\n\
         function speak(pet: Dog | Cat): string {\n\
           if (pet instanceof Dog) { return pet.bark(); }\n\
           return pet.meow();\n\
         }",
    );
}

#[test]
fn in_operator_narrows_unions() {
    check_ok(
        "type Fish = { swim: () => void };\n\
         type Bird = { fly: () => void };\n\
         function move(animal: Fish | Bird): void {\n\
           if (\"swim\" in animal) { animal.swim(); } else { animal.fly(); }\n\
         }",
    );
}

#[test]
fn discriminated_unions_narrow_by_literal() {
    check_ok(
        "type Shape =\n\
           | { kind: \"circle\"; radius: number }\n\
           | { kind: \"square\"; side: number };\n\
         function area(shape: Shape): number {\n\
           if (shape.kind === \"circle\") { return shape.radius * 3; }\n\
           return shape.side * shape.side;\n\
         }",
    );
}

#[test]
fn user_predicates_narrow() {
    check_ok(
        "function isString(x: number | string): x is string { return typeof x === \"string\"; }\n\
         function f(x: number | string): number {\n\
           if (isString(x)) { return x.length; }\n\
           return x;\n\
         }",
    );
}

#[test]
fn assertion_predicates_narrow_following_statements() {
    check_ok(
        "function assertString(x: number | string): asserts x is string {\n\
           if (typeof x !== \"string\") { throw new Error(\"not a string\"); }\n\
         }\n\
         function f(x: number | string): number {\n\
           assertString(x);\n\
           return x.length;\n\
         }",
    );
}

#[test]
fn assignment_invalidates_narrowing() {
    // After writing a wider value, the narrowing must not survive.
    check_err(
        "function f(x: number | string): number {\n\
           if (typeof x === \"number\") {\n\
             x = \"reset\";\n\
             return x * 2;\n\
           }\n\
           return 0;\n\
         }",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}

#[test]
fn early_return_applies_negated_narrowing() {
    check_ok(
        "function f(x: number | string): number {\n\
           if (typeof x === \"string\") { return x.length; }\n\
           return x * 2;\n\
         }",
    );
}

#[test]
fn truthiness_removes_nullish() {
    check_ok(
        "function f(x: string | null): number {\n\
           if (x) { return x.length; }\n\
           return 0;\n\
         }",
    );
}
