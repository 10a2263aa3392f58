//! Interpreter behavior over parsed (and checked) programs.

use sharpts_parser::parse_source;

use crate::run_program_to_string;

fn run(source: &str) -> String {
    let program = parse_source(source).expect("parse failed");
    sharpts_checker::check(&program).expect("check failed");
    run_program_to_string(&program).expect("run failed")
}

fn run_unchecked(source: &str) -> String {
    let program = parse_source(source).expect("parse failed");
    run_program_to_string(&program).expect("run failed")
}

#[test]
fn prints_numbers_in_javascript_format() {
    assert_eq!(run("console.log(1);"), "1\n");
    assert_eq!(run("console.log(0.5);"), "0.5\n");
    assert_eq!(run("console.log(1000000);"), "1000000\n");
    assert_eq!(run("console.log(1 / 0);"), "Infinity\n");
}

#[test]
fn arithmetic_and_string_concat() {
    assert_eq!(run("console.log(1 + 2 * 3);"), "7\n");
    assert_eq!(run("console.log(\"a\" + 1);"), "a1\n");
    assert_eq!(run("console.log(10 % 3, 2 ** 10);"), "1 1024\n");
    assert_eq!(run("console.log(7 / 2);"), "3.5\n");
}

#[test]
fn bitwise_operators_use_int32_semantics() {
    assert_eq!(run("console.log(5 & 3, 5 | 3, 5 ^ 3);"), "1 7 6\n");
    assert_eq!(run("console.log(1 << 3, -8 >> 1);"), "8 -4\n");
    assert_eq!(run("console.log(-1 >>> 28);"), "15\n");
}

#[test]
fn bigint_arithmetic_is_arbitrary_precision() {
    assert_eq!(
        run_unchecked("console.log(123456789012345678901234567890n + 1n);"),
        "123456789012345678901234567891n\n"
    );
}

#[test]
fn control_flow_and_loops() {
    assert_eq!(
        run("let total = 0; for (let i = 1; i <= 4; i++) { total += i; } console.log(total);"),
        "10\n"
    );
    assert_eq!(
        run("let i = 0; while (true) { i++; if (i >= 3) break; } console.log(i);"),
        "3\n"
    );
    assert_eq!(
        run(
            "outer: for (let i = 0; i < 3; i++) { for (let j = 0; j < 3; j++) { if (j > i) continue outer; console.log(i, j); } }"
        ),
        "0 0\n1 0\n1 1\n2 0\n2 1\n2 2\n"
    );
}

#[test]
fn switch_with_fallthrough() {
    assert_eq!(
        run(
            "function pick(x: number): string {\n\
               switch (x) {\n\
                 case 1:\n\
                 case 2: return \"small\";\n\
                 case 3: return \"three\";\n\
                 default: return \"big\";\n\
               }\n\
             }\n\
             console.log(pick(1), pick(2), pick(3), pick(9));"
        ),
        "small small three big\n"
    );
}

#[test]
fn closures_capture_environments() {
    assert_eq!(
        run(
            "function counter(): () => number { let n = 0; return () => { n++; return n; }; }\n\
             const c = counter();\n\
             c(); c();\n\
             console.log(c());"
        ),
        "3\n"
    );
}

#[test]
fn classes_inheritance_and_super() {
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
fn parameter_properties_initialize_fields() {
    assert_eq!(
        run(
            "class P { constructor(public x: number, private y: number) {}\n\
               sum(): number { return this.x + this.y; } }\n\
             console.log(new P(3, 4).sum());"
        ),
        "7\n"
    );
}

#[test]
fn getters_and_setters() {
    assert_eq!(
        run(
            "class Box { private v: number = 0;\n\
               get value(): number { return this.v; }\n\
               set value(next: number) { this.v = next * 2; } }\n\
             const b = new Box();\n\
             b.value = 21;\n\
             console.log(b.value);"
        ),
        "42\n"
    );
}

#[test]
fn setter_only_accessor_dispatches_writes() {
    assert_eq!(
        run(
            "class Sink {\n\
               private total: number = 0;\n\
               set value(next: number) { this.total = this.total + next; }\n\
               sum(): number { return this.total; }\n\
             }\n\
             const s = new Sink();\n\
             s.value = 3;\n\
             s.value = 4;\n\
             console.log(s.sum());"
        ),
        "7\n"
    );
}

#[test]
fn crypto_helpers_are_deterministic() {
    assert_eq!(
        run(
            "const a = crypto.hash(\"fnv1a\", \"abc\");\n\
             const b = crypto.hash(\"fnv1a\", \"abc\");\n\
             const c = crypto.hash(\"fnv1a\", \"abd\");\n\
             console.log(a === b, a === c);"
        ),
        "true false\n"
    );
    assert_eq!(
        run(
            "const same = crypto.cipher(\"k\", \"abc\") === crypto.cipher(\"k\", \"abc\");\n\
             const rekeyed = crypto.cipher(\"k\", \"abc\") === crypto.cipher(\"q\", \"abc\");\n\
             console.log(same, rekeyed);"
        ),
        "true false\n"
    );
}

#[test]
fn url_parse_splits_components() {
    assert_eq!(
        run(
            "const parts = url.parse(\"https://example.com/items?id=1\");\n\
             console.log(parts.protocol, parts.host, parts.path, parts.query);"
        ),
        "https example.com /items id=1\n"
    );
    assert_eq!(
        run("const bare = url.parse(\"example.com\"); console.log(bare.host, bare.protocol === \"\");"),
        "example.com true\n"
    );
}

#[test]
fn static_members() {
    assert_eq!(
        run(
            "class C { static count: number = 7; static bump(): number { return C.count + 1; } }\n\
             console.log(C.count, C.bump());"
        ),
        "7 8\n"
    );
}

#[test]
fn try_catch_finally_ordering() {
    assert_eq!(
        run(
            "function f(): string {\n\
               try { throw new Error(\"boom\"); }\n\
               catch (e) { return \"caught\"; }\n\
               finally { console.log(\"finally\"); }\n\
             }\n\
             console.log(f());"
        ),
        "finally\ncaught\n"
    );
}

#[test]
fn destructuring_declarations() {
    assert_eq!(
        run("let {a, b: c} = {a: 1, b: 2}; console.log(a, c);"),
        "1 2\n"
    );
    assert_eq!(
        run("const [x, , z, ...rest] = [1, 2, 3, 4, 5]; console.log(x, z, rest.length);"),
        "1 3 2\n"
    );
}

#[test]
fn spread_in_calls_and_arrays() {
    assert_eq!(
        run("function add(a: number, b: number, c: number): number { return a + b + c; }\n\
             const xs: number[] = [1, 2, 3];\n\
             console.log(add(...xs));"),
        "6\n"
    );
    assert_eq!(run("const ys = [0, ...[1, 2], 3]; console.log(ys.join(\"-\"));"), "0-1-2-3\n");
}

#[test]
fn template_literals_interpolate() {
    assert_eq!(
        run("const name = \"world\"; console.log(`hello ${name} ${1 + 1}`);"),
        "hello world 2\n"
    );
}

#[test]
fn optional_chaining_and_nullish() {
    assert_eq!(
        run_unchecked("let o: any = null; console.log(o?.x); console.log(o?.x ?? \"fallback\");"),
        "undefined\nfallback\n"
    );
}

#[test]
fn enums_produce_forward_and_reverse_maps() {
    assert_eq!(
        run("enum D { Up, Down } console.log(D.Up, D[0]);"),
        "0 Up\n"
    );
    assert_eq!(
        run("enum Flags { A = 1, B = A << 1, C = A | B } console.log(Flags.C);"),
        "3\n"
    );
}

#[test]
fn frozen_objects_reject_writes_in_strict_mode() {
    assert_eq!(
        run_unchecked(
            "const o: any = { x: 1 };\n\
             Object.freeze(o);\n\
             try { o.x = 2; } catch (e) { console.log(\"blocked\"); }\n\
             console.log(o.x, Object.isFrozen(o));"
        ),
        "blocked\n1 true\n"
    );
}

#[test]
fn sealed_objects_allow_updates_but_not_additions() {
    assert_eq!(
        run_unchecked(
            "const o: any = { x: 1 };\n\
             Object.seal(o);\n\
             o.x = 5;\n\
             try { o.y = 1; } catch (e) { console.log(\"no new props\"); }\n\
             console.log(o.x);"
        ),
        "no new props\n5\n"
    );
}

#[test]
fn iterator_protocol_over_arrays_and_strings() {
    assert_eq!(
        run("for (const v of [10, 20]) console.log(v);"),
        "10\n20\n"
    );
    assert_eq!(run("for (const c of \"ab\") console.log(c);"), "a\nb\n");
}

#[test]
fn generators_are_lazy_coroutines() {
    assert_eq!(
        run(
            "function* g(): Generator<number> { console.log(\"start\"); yield 1; console.log(\"mid\"); yield 2; }\n\
             const it = g();\n\
             console.log(\"created\");\n\
             console.log(it.next().value);\n\
             console.log(it.next().value);\n\
             console.log(it.next().done);"
        ),
        "created\nstart\n1\nmid\n2\ntrue\n"
    );
}

#[test]
fn generator_receives_sent_values() {
    assert_eq!(
        run_unchecked(
            "function* echo(): any { const got = yield 1; yield got * 10; }\n\
             const it: any = echo();\n\
             it.next();\n\
             console.log(it.next(4).value);"
        ),
        "40\n"
    );
}

#[test]
fn finished_generator_return_is_a_noop_step() {
    assert_eq!(
        run_unchecked(
            "function* g(): any { yield 1; }\n\
             const it: any = g();\n\
             it.next(); it.next();\n\
             const r = it.return(9);\n\
             console.log(r.value, r.done);"
        ),
        "9 true\n"
    );
}

#[test]
fn generator_finally_runs_on_early_return() {
    assert_eq!(
        run_unchecked(
            "function* g(): any { try { yield 1; yield 2; } finally { console.log(\"cleanup\"); } }\n\
             const it: any = g();\n\
             it.next();\n\
             it.return(0);\n\
             console.log(\"after\");"
        ),
        "cleanup\nafter\n"
    );
}

#[test]
fn async_functions_resolve_through_microtasks() {
    assert_eq!(
        run(
            "async function g(): Promise<number> { return 42; }\n\
             g().then(v => console.log(v));\n\
             console.log(\"sync first\");"
        ),
        "sync first\n42\n"
    );
}

#[test]
fn await_sequences_continuations_in_fifo_order() {
    assert_eq!(
        run(
            "async function step(tag: string): Promise<void> {\n\
               await Promise.resolve(0);\n\
               console.log(tag);\n\
             }\n\
             step(\"a\");\n\
             step(\"b\");\n\
             console.log(\"main\");"
        ),
        "main\na\nb\n"
    );
}

#[test]
fn promise_all_collects_in_order() {
    assert_eq!(
        run_unchecked(
            "Promise.all([Promise.resolve(1), 2, Promise.resolve(3)]).then((vs: any) => console.log(vs[0], vs[1], vs[2]));"
        ),
        "1 2 3\n"
    );
}

#[test]
fn async_generator_with_for_await() {
    assert_eq!(
        run_unchecked(
            "async function* gen(): any { yield 1; yield await Promise.resolve(2); }\n\
             async function main(): Promise<void> {\n\
               for await (const v of gen()) { console.log(v); }\n\
               console.log(\"done\");\n\
             }\n\
             main();"
        ),
        "1\n2\ndone\n"
    );
}

#[test]
fn runtime_error_surfaces_as_diagnostic() {
    let program = parse_source("throw new Error(\"kaput\");").expect("parse failed");
    let error = crate::run_program_to_string(&program).unwrap_err();
    assert!(error.message.contains("kaput"));
}

#[test]
fn instanceof_and_error_classes() {
    assert_eq!(
        run_unchecked(
            "try { null.x; } catch (e) { console.log(e instanceof Error ? \"typed\" : \"plain\"); }"
        ),
        "plain\n"
    );
    assert_eq!(
        run_unchecked(
            "const e: any = new TypeError(\"t\");\n\
             console.log(e instanceof TypeError, e instanceof Error, e.message);"
        ),
        "true true t\n"
    );
}

#[test]
fn bound_functions_fix_this() {
    assert_eq!(
        run_unchecked(
            "const obj: any = { n: 5, get(): number { return this.n; } };\n\
             const f: any = obj.get;\n\
             const bound: any = f.bind(obj);\n\
             console.log(bound());"
        ),
        "5\n"
    );
}

#[test]
fn namespaces_expose_their_bindings() {
    assert_eq!(
        run_unchecked(
            "namespace A.B { export function f(): number { return 9; } }\n\
             console.log(A.B.f());"
        ),
        "9\n"
    );
}
