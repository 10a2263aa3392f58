//! End-to-end checker tests over parsed source.

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
        Ok(_) => panic!("expected error {code}, but checking succeeded (source: {source})"),
        Err(error) => assert_eq!(error.code, code, "wrong code, message: {}", error.message),
    }
}

#[test]
fn accepts_well_typed_declarations() {
    check_ok("let x: number = 1; const s: string = \"hi\"; let b: boolean = x > 0;");
}

#[test]
fn rejects_assignment_incompatibility() {
    check_err(
        "let x: number = \"hi\";",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
    check_err(
        "let x = 1; x = \"hi\";",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}

#[test]
fn rejects_unresolved_identifiers() {
    check_err("console.log(missing);", diagnostic_codes::CANNOT_FIND_NAME);
}

#[test]
fn rejects_assignment_to_const() {
    check_err(
        "const x = 1; x = 2;",
        diagnostic_codes::CANNOT_ASSIGN_TO_CONST,
    );
}

#[test]
fn rejects_duplicate_let_in_scope() {
    check_err(
        "let x = 1; let x = 2;",
        diagnostic_codes::DUPLICATE_DECLARATION,
    );
}

#[test]
fn literal_widening_for_let_but_not_const() {
    // let widens to number, so reassignment with another number is fine.
    check_ok("let x = 1; x = 2;");
    // const keeps the literal type but remains readable.
    check_ok("const x = 1; let y: number = x;");
}

#[test]
fn checks_function_calls_and_arity() {
    check_ok("function f(a: number, b?: string): number { return a; } f(1); f(1, \"x\");");
    check_err(
        "function f(a: number): number { return a; } f();",
        diagnostic_codes::WRONG_ARITY,
    );
    check_err(
        "function f(a: number): void {} f(\"hi\");",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}

#[test]
fn checks_return_types() {
    check_err(
        "function f(): number { return \"hi\"; }",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
    check_ok("function f(): number | string { return \"hi\"; }");
}

#[test]
fn resolves_overloads_in_source_order() {
    check_ok(
        "function f(x: number): number;\n\
         function f(x: string): string;\n\
         function f(x: number | string): number | string { return x; }\n\
         let a: number = f(5);\n\
         let b: string = f(\"hi\");",
    );
    check_err(
        "function f(x: number): number;\n\
         function f(x: string): string;\n\
         function f(x: number | string): number | string { return x; }\n\
         f(true);",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}

#[test]
fn generic_function_inference() {
    check_ok(
        "function identity<T>(value: T): T { return value; }\n\
         let n: number = identity(42);\n\
         let s: string = identity(\"hi\");",
    );
    check_ok("function identity<T>(value: T): T { return value; } let n: number = identity<number>(1);");
}

#[test]
fn generic_constraint_enforcement() {
    check_err(
        "function len<T extends { length: number }>(value: T): number { return value.length; }\n\
         len(42);",
        diagnostic_codes::CONSTRAINT_UNSATISFIED,
    );
    check_ok(
        "function len<T extends { length: number }>(value: T): number { return value.length; }\n\
         len(\"hello\");\n\
         len([1, 2, 3]);",
    );
}

#[test]
fn checks_interfaces_structurally() {
    check_ok(
        "interface Point { x: number; y: number; }\n\
         let p: Point = { x: 1, y: 2 };",
    );
    check_err(
        "interface Point { x: number; y: number; }\n\
         let p: Point = { x: 1 };",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
    check_ok(
        "interface Named { name?: string; }\n\
         let n: Named = {};",
    );
}

#[test]
fn class_inheritance_and_override() {
    check_ok(
        "class A { greet(): string { return \"hi\"; } }\n\
         class B extends A { override greet(): string { return \"yo\"; } }\n\
         let a: A = new B();",
    );
    check_err(
        "class A {}\n\
         class B extends A { override greet(): string { return \"yo\"; } }",
        diagnostic_codes::OVERRIDE_WITHOUT_BASE,
    );
    check_err(
        "class A { greet(): string { return \"hi\"; } }\n\
         class B extends A { static override greet(): string { return \"yo\"; } }",
        diagnostic_codes::OVERRIDE_ON_STATIC,
    );
}

#[test]
fn abstract_completeness() {
    check_err(
        "abstract class Shape { abstract area(): number; }\n\
         class Circle extends Shape {}",
        diagnostic_codes::ABSTRACT_NOT_IMPLEMENTED,
    );
    check_ok(
        "abstract class Shape { abstract area(): number; }\n\
         class Circle extends Shape { area(): number { return 3; } }",
    );
    check_err(
        "abstract class Shape { abstract area(): number; }\n\
         let s = new Shape();",
        diagnostic_codes::ABSTRACT_NOT_IMPLEMENTED,
    );
}

#[test]
fn implements_satisfaction() {
    check_ok(
        "interface Greeter { greet(): string; }\n\
         class Friendly implements Greeter { greet(): string { return \"hi\"; } }",
    );
    check_err(
        "interface Greeter { greet(): string; }\n\
         class Rude implements Greeter {}",
        diagnostic_codes::INTERFACE_NOT_SATISFIED,
    );
}

#[test]
fn private_member_enforcement() {
    check_err(
        "class C { private secret: number = 1; }\n\
         let c = new C();\n\
         console.log(c.secret);",
        diagnostic_codes::PRIVATE_ACCESS,
    );
    check_ok(
        "class C { private secret: number = 1; reveal(): number { return this.secret; } }",
    );
}

#[test]
fn readonly_property_enforcement() {
    check_err(
        "let o: { readonly x: number } = { x: 1 }; o.x = 2;",
        diagnostic_codes::READONLY_ASSIGNMENT,
    );
}

#[test]
fn enums_and_reverse_maps() {
    check_ok(
        "enum D { Up, Down }\n\
         let d: D = D.Up;\n\
         let name: string = D[0];",
    );
    check_err(
        "enum S { A = \"a\" }\n\
         let x = S[0];",
        diagnostic_codes::REVERSE_MAP_ON_STRING_ENUM,
    );
}

#[test]
fn tuple_indexing_bounds() {
    check_ok("let t: [number, string] = [1, \"a\"]; let x: number = t[0];");
    check_err(
        "let t: [number, string] = [1, \"a\"]; let x = t[5];",
        diagnostic_codes::TUPLE_INDEX_OUT_OF_RANGE,
    );
    // A dynamic index yields the union of element types.
    check_ok(
        "let t: [number, string] = [1, \"a\"]; let i = 0; let v: number | string = t[i];",
    );
}

#[test]
fn mapped_and_utility_aliases() {
    check_ok(
        "type P<T> = { [K in keyof T]?: T[K] };\n\
         let o: P<{a: number; b: string}> = { a: 1 };",
    );
    check_ok(
        "interface User { id: number; name: string; }\n\
         let partial: Partial<User> = { id: 1 };\n\
         let picked: Pick<User, \"id\"> = { id: 1 };",
    );
    check_err(
        "interface User { id: number; name: string; }\n\
         let bad: Required<User> = { id: 1 };",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}

#[test]
fn conditional_type_aliases() {
    check_ok(
        "type IsString<T> = T extends string ? true : false;\n\
         let yes: IsString<\"a\"> = true;\n\
         let no: IsString<number> = false;",
    );
}

#[test]
fn template_literal_types() {
    check_ok(
        "type Dir = \"left\" | \"right\";\n\
         type Key = `go-${Dir}`;\n\
         let k: Key = \"go-left\";",
    );
    check_err(
        "type Dir = \"left\" | \"right\";\n\
         type Key = `go-${Dir}`;\n\
         let k: Key = \"go-up\";",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}

#[test]
fn async_and_await_typing() {
    check_ok(
        "async function g(): Promise<number> { return 42; }\n\
         async function h(): Promise<number> { let v = await g(); return v; }",
    );
    check_err(
        "async function g(): Promise<number> { return \"hi\"; }",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}

#[test]
fn for_of_iterates_arrays_and_strings() {
    check_ok("for (const v of [1, 2, 3]) console.log(v);");
    check_ok("for (const c of \"abc\") console.log(c);");
    check_err("for (const v of 42) console.log(v);", diagnostic_codes::NOT_ITERABLE);
}

#[test]
fn variadic_tuple_annotation() {
    check_ok(
        "type Pair = [number, boolean];\n\
         type Triple = [string, ...Pair];\n\
         let t: Triple = [\"a\", 1, true];",
    );
}

#[test]
fn bigint_number_mixing_is_rejected() {
    check_err(
        "let a = 1n + 2;",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
    check_ok("let a = 1n + 2n; let b = 1 + 2;");
}

#[test]
fn instance_satisfies_structural_shape() {
    check_ok(
        "class P { x: number = 0; y: number = 0; }\n\
         let shape: { x: number } = new P();",
    );
}

#[test]
fn setter_only_accessors_accept_writes() {
    check_ok(
        "class Sink {\n\
           private stored: number = 0;\n\
           set value(next: number) { this.stored = next; }\n\
           flush(): number { return this.stored; }\n\
         }\n\
         const s = new Sink();\n\
         s.value = 5;",
    );
    // The setter's parameter type constrains the write.
    check_err(
        "class Sink { set value(next: number) {} }\n\
         const s = new Sink();\n\
         s.value = \"no\";",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}

#[test]
fn setter_only_members_satisfy_interfaces() {
    check_ok(
        "interface HasValue { value: number; }\n\
         class Sink implements HasValue { set value(next: number) {} }\n\
         let target: { value: number } = new Sink();",
    );
}

#[test]
fn utility_globals_expose_their_shapes() {
    check_ok(
        "const digest: string = crypto.hash(\"fnv1a\", \"abc\");\n\
         const hidden: string = crypto.cipher(\"key\", \"payload\");\n\
         const parts = url.parse(\"https://example.com/items?id=1\");\n\
         let host: string = parts.host;\n\
         let query: string = parts.query;",
    );
    check_err(
        "crypto.hash(1, \"abc\");",
        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
    );
}
