//! State-machine emission: dispatch tables, suspension sites, hoisted
//! locals, and region metadata.

use sharpts_parser::parse_source;

use crate::il::*;
use crate::emit_program;

fn emit(source: &str) -> IlModule {
    let program = parse_source(source).expect("parse failed");
    let check = sharpts_checker::check(&program).expect("check failed");
    emit_program(&program, &check).expect("emit failed")
}

fn machine<'a>(module: &'a IlModule, name: &str) -> &'a IlClass {
    module
        .find_class(name)
        .unwrap_or_else(|| panic!("state machine {name} missing"))
}

fn move_next<'a>(class: &'a IlClass) -> &'a IlMethod {
    class
        .methods
        .iter()
        .find(|m| m.name == "MoveNext")
        .expect("MoveNext")
}

#[test]
fn async_function_emits_machine_with_dispatch_and_awaiter() {
    let module = emit(
        "async function g(): Promise<number> { let v = await Promise.resolve(41); return v + 1; }\n\
         g();",
    );
    let class = machine(&module, "g__StateMachine");
    // State integer plus awaiter and pending bookkeeping.
    for field in ["__state", "__awaiter", "__pending", "__pendingValue", "__result"] {
        assert!(
            class.fields.iter().any(|f| f.name == field),
            "missing field {field}"
        );
    }
    // The hoisted local crossing the suspension is a field, not a slot.
    assert!(class.fields.iter().any(|f| f.name == "v"));

    let body = &move_next(class).body;
    // Dispatch jump table on the state integer.
    assert!(body.iter().any(|i| matches!(i, Instr::Switch(_))));
    // The suspension protocol: completed-check, continuation
    // registration, resume.
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::CallIntrinsic {
            intrinsic: Intrinsic::PromiseIsCompleted,
            ..
        }
    )));
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::CallIntrinsic {
            intrinsic: Intrinsic::RegisterContinuation,
            ..
        }
    )));
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::CallIntrinsic {
            intrinsic: Intrinsic::PromiseResult,
            ..
        }
    )));

    // The callable wrapper allocates the machine and hands it to the
    // async driver.
    let entry = module.find_method("g").expect("entry method");
    assert!(entry.body.iter().any(|i| matches!(
        i,
        Instr::NewObj { class, .. } if class == "g__StateMachine"
    )));
    assert!(entry.body.iter().any(|i| matches!(
        i,
        Instr::Call { method, .. } if method.name == "RunAsync"
    )));
}

#[test]
fn generator_yield_stores_current_and_suspends() {
    let module = emit(
        "function* r(n: number): Generator<number> { for (let i = 0; i < n; i++) yield i; }\n\
         for (const v of r(3)) console.log(v);",
    );
    let class = machine(&module, "r__StateMachine");
    assert!(class.fields.iter().any(|f| f.name == "__current"));
    // The loop variable crosses the suspension, so it is hoisted.
    assert!(class.fields.iter().any(|f| f.name == "i"));
    // The parameter is stored on the machine as well.
    assert!(class.fields.iter().any(|f| f.name == "n"));

    let body = &move_next(class).body;
    // A yield stores __current, updates __state, and returns true.
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::StFld(field) if field.name == "__current"
    )));
    assert!(body.iter().any(|i| matches!(i, Instr::LdcBool(true))));

    let entry = module.find_method("r").expect("entry method");
    assert!(entry.body.iter().any(|i| matches!(
        i,
        Instr::Call { method, .. } if method.name == "MakeGeneratorObject"
    )));
}

#[test]
fn try_finally_across_await_emits_region_metadata() {
    let module = emit(
        "async function f(): Promise<void> {\n\
           try { await Promise.resolve(1); } finally { console.log(\"done\"); }\n\
         }\n\
         f();",
    );
    let class = machine(&module, "f__StateMachine");
    assert_eq!(class.regions.len(), 1);
    let region = &class.regions[0];
    assert!(region.finally_state.is_some());
    // Each state records its active region.
    assert_eq!(class.state_handlers.len(), move_next_state_count(class));
    assert!(class.state_handlers.iter().any(|h| h.is_some()));
    // The pending-completion replay dispatches on the pending flag.
    let body = &move_next(class).body;
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::LdFld(field) if field.name == "__pending"
    )));
}

fn move_next_state_count(class: &IlClass) -> usize {
    class.state_handlers.len()
}

#[test]
fn async_generator_composes_yield_and_await_protocols() {
    let module = emit(
        "async function* g(): AsyncGenerator<number> { yield 1; yield await Promise.resolve(2); }\n\
         g();",
    );
    let class = machine(&module, "g__StateMachine");
    let body = &move_next(class).body;
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::StFld(field) if field.name == "__current"
    )));
    assert!(body.iter().any(|i| matches!(
        i,
        Instr::StFld(field) if field.name == "__awaiter"
    )));
    let entry = module.find_method("g").expect("entry method");
    assert!(entry.body.iter().any(|i| matches!(
        i,
        Instr::Call { method, .. } if method.name == "MakeAsyncGeneratorObject"
    )));
}
