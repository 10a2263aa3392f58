//! Structural properties of emitted modules.

use sharpts_parser::parse_source;

use crate::il::*;
use crate::emit_program;

fn emit(source: &str) -> IlModule {
    let program = parse_source(source).expect("parse failed");
    let check = sharpts_checker::check(&program).expect("check failed");
    emit_program(&program, &check).expect("emit failed")
}

fn instrs<'a>(module: &'a IlModule, method: &str) -> &'a [Instr] {
    &module
        .find_method(method)
        .unwrap_or_else(|| panic!("method {method} missing"))
        .body
}

#[test]
fn module_has_entry_and_runtime_shim() {
    let module = emit("console.log(1);");
    assert_eq!(module.entry, "main");
    assert!(module.find_method("main").is_some());
    let runtime = module.find_class("Runtime").expect("runtime shim");
    // The shim always carries the core protocol helpers.
    for core in ["IsTruthy", "StrictEquals", "GetProperty", "GetIndex"] {
        assert!(
            runtime.methods.iter().any(|m| m.name == core),
            "missing shim helper {core}"
        );
    }
    // Frozen/sealed weak tables exist as statics.
    assert!(runtime.fields.iter().any(|f| f.name == "__frozen"));
    assert!(runtime.fields.iter().any(|f| f.name == "__sealed"));
}

#[test]
fn numeric_expressions_stay_unboxed() {
    let module = emit("let x: number = 1 + 2 * 3; console.log(x);");
    let main = instrs(&module, "main");
    // The arithmetic chain uses primitive opcodes, not shim calls.
    assert!(main.iter().any(|i| matches!(i, Instr::Add)));
    assert!(main.iter().any(|i| matches!(i, Instr::Mul)));
    // The store into the boxed global boxes exactly once.
    let boxes = main.iter().filter(|i| matches!(i, Instr::Box)).count();
    assert!(boxes >= 1, "the stored value must be boxed");
}

#[test]
fn string_typed_operands_use_concat() {
    let module = emit("let s: string = \"a\" + \"b\"; console.log(s);");
    let main = instrs(&module, "main");
    assert!(main.iter().any(|i| matches!(
        i,
        Instr::CallIntrinsic {
            intrinsic: Intrinsic::StringConcat,
            ..
        }
    )));
}

#[test]
fn union_typed_operands_take_the_runtime_path() {
    let module = emit(
        "function f(x: number | string): number | string { return x; }\n\
         let v = f(1) as any;\n\
         console.log(v + v);",
    );
    let main = instrs(&module, "main");
    // `any + any` boxes and calls Runtime.Add.
    assert!(main.iter().any(|i| matches!(
        i,
        Instr::Call { method, .. } if method.class == "Runtime" && method.name == "Add"
    )));
}

#[test]
fn functions_emit_as_static_methods() {
    let module = emit(
        "function double(x: number): number { return x * 2; }\n\
         console.log(double(21));",
    );
    assert!(module.find_method("double").is_some());
    let main = instrs(&module, "main");
    assert!(main.iter().any(|i| matches!(
        i,
        Instr::Call { method, .. } if method.name == "double"
    )));
}

#[test]
fn classes_emit_fields_methods_and_accessor_names() {
    let module = emit(
        "class Box {\n\
           private v: number = 0;\n\
           get value(): number { return this.v; }\n\
           set value(next: number) { this.v = next; }\n\
           grow(): void { this.v = this.v + 1; }\n\
         }\n\
         let b = new Box();",
    );
    let class = module.find_class("Box").expect("class Box");
    assert!(class.fields.iter().any(|f| f.name == "v"));
    // Accessors use the reflected-name convention the shim probes.
    assert!(class.methods.iter().any(|m| m.name == "get_value"));
    assert!(class.methods.iter().any(|m| m.name == "set_value"));
    assert!(class.methods.iter().any(|m| m.name == "grow"));
    // Private members allocate a brand table on the shim.
    let runtime = module.find_class("Runtime").expect("runtime");
    assert!(runtime.fields.iter().any(|f| f.name == "__brand_Box"));
}

#[test]
fn enums_build_dictionaries_with_reverse_entries() {
    let module = emit("enum D { Up, Down } console.log(D.Up, D[0]);");
    let main = instrs(&module, "main");
    let dict_sets = main
        .iter()
        .filter(|i| {
            matches!(
                i,
                Instr::CallIntrinsic {
                    intrinsic: Intrinsic::DictSet,
                    ..
                }
            )
        })
        .count();
    // Two forward entries plus two reverse entries.
    assert!(dict_sets >= 4, "expected forward and reverse entries, got {dict_sets}");
}

#[test]
fn const_enum_members_inline_to_constants() {
    let module = emit("const enum C { A = 2, B = A * 3 } console.log(C.B);");
    let main = instrs(&module, "main");
    assert!(
        main.iter()
            .any(|i| matches!(i, Instr::LdcF64(v) if *v == 6.0)),
        "const enum member must inline as a constant"
    );
    // No dictionary is built for a const enum.
    assert!(!main.iter().any(|i| matches!(
        i,
        Instr::CallIntrinsic {
            intrinsic: Intrinsic::DictNew,
            ..
        }
    )));
}

#[test]
fn try_catch_emits_structured_regions() {
    let module = emit(
        "try { console.log(1); } catch (e) { console.log(2); } finally { console.log(3); }",
    );
    let main = instrs(&module, "main");
    assert!(main.iter().any(|i| matches!(i, Instr::BeginTry)));
    assert!(main.iter().any(|i| matches!(i, Instr::BeginCatch { .. })));
    assert!(main.iter().any(|i| matches!(i, Instr::BeginFinally)));
    assert!(main.iter().any(|i| matches!(i, Instr::EndException)));
}

#[test]
fn frozen_checks_guard_property_writes() {
    let module = emit("let o: any = { x: 1 }; o.x = 2;");
    let runtime = module.find_class("Runtime").expect("runtime");
    let set_strict = runtime
        .methods
        .iter()
        .find(|m| m.name == "SetPropertyStrict")
        .expect("strict setter");
    assert!(set_strict.body.iter().any(|i| matches!(
        i,
        Instr::CallIntrinsic {
            intrinsic: Intrinsic::WeakTableHas,
            ..
        }
    )));
    assert!(set_strict.body.iter().any(|i| matches!(
        i,
        Instr::CallIntrinsic {
            intrinsic: Intrinsic::ThrowError,
            ..
        }
    )));
}

#[test]
fn referenced_utility_wrappers_join_the_shim() {
    let module = emit(
        "const digest: string = crypto.hash(\"fnv1a\", \"abc\");\n\
         const parts = url.parse(\"https://example.com/a\");\n\
         console.log(digest, parts.host);",
    );
    let runtime = module.find_class("Runtime").expect("runtime");
    for helper in ["HashDigest", "CipherTransform", "UrlParse"] {
        assert!(
            runtime.methods.iter().any(|m| m.name == helper),
            "missing utility wrapper {helper}"
        );
    }
    // A program that never touches them keeps the shim lean.
    let plain = emit("console.log(1);");
    let runtime = plain.find_class("Runtime").expect("runtime");
    assert!(!runtime.methods.iter().any(|m| m.name == "HashDigest"));
    assert!(!runtime.methods.iter().any(|m| m.name == "UrlParse"));
}

#[test]
fn top_level_bindings_live_on_the_globals_class() {
    let module = emit(
        "let shared = 1;\n\
         function read(): number { return shared; }\n\
         console.log(read());",
    );
    let globals = module.find_class("Globals").expect("globals class");
    assert!(globals.fields.iter().any(|f| f.name == "shared"));
    let read = instrs(&module, "read");
    assert!(read.iter().any(|i| matches!(
        i,
        Instr::LdSFld(field) if field.class == "Globals" && field.name == "shared"
    )));
}
