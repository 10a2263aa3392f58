//! Runtime shim generation.
//!
//! The emitter materializes a single `Runtime` class per output with
//! the static helpers the program references: truthiness, equality,
//! dynamic property and index access (dispatching over the runtime type
//! tag, with getter/setter probes by reflected name and the `_fields`
//! walk for class instances), frozen/sealed enforcement, bind/call/
//! apply support, private-brand checks, iterator acquisition, and the
//! promise/utility wrappers. Helper bodies compose host intrinsics; the
//! dispatch logic itself is ordinary IL.

use rustc_hash::FxHashSet;
use sharpts_common::diagnostics::Diagnostic;
use sharpts_common::span::Span;

use crate::MethodBuilder;
use crate::emitter::type_tag;
use crate::il::*;

/// Helpers that exist in every output: the property/index protocols and
/// the equality/truthiness primitives everything else leans on.
const CORE: &[&str] = &[
    "IsTruthy",
    "StrictEquals",
    "LooseEquals",
    "GetProperty",
    "SetProperty",
    "SetPropertyStrict",
    "GetIndex",
    "SetIndex",
    "SetIndexStrict",
    "GetIterator",
    "InvokeMethod",
    "InvokeFunction",
    "Bind",
    "CallBound",
    "Apply",
    "ConsoleLog",
    "TypeOf",
    "GetBuiltin",
];

pub fn generate(
    used: &FxHashSet<&'static str>,
    private_classes: &FxHashSet<String>,
) -> Result<IlClass, Diagnostic> {
    let mut names: Vec<&str> = CORE.to_vec();
    for name in used {
        if !names.contains(name) {
            names.push(name);
        }
    }
    names.sort_unstable();

    let mut fields = vec![
        IlField {
            name: "__frozen".to_string(),
            ty: StackType::Ref,
            is_static: true,
        },
        IlField {
            name: "__sealed".to_string(),
            ty: StackType::Ref,
            is_static: true,
        },
        IlField {
            name: "__symbolSlots".to_string(),
            ty: StackType::Ref,
            is_static: true,
        },
    ];
    // One brand table per class with private members.
    let mut brands: Vec<&String> = private_classes.iter().collect();
    brands.sort_unstable();
    for class in brands {
        fields.push(IlField {
            name: format!("__brand_{class}"),
            ty: StackType::Ref,
            is_static: true,
        });
    }

    let mut methods = Vec::new();
    for name in names {
        methods.push(generate_method(name)?);
    }

    Ok(IlClass {
        name: "Runtime".to_string(),
        base: None,
        fields,
        methods,
        regions: Vec::new(),
        state_handlers: Vec::new(),
    })
}

fn generate_method(name: &str) -> Result<IlMethod, Diagnostic> {
    match name {
        "IsTruthy" => is_truthy(),
        "Add" => dynamic_add(),
        "IsNullish" => is_nullish(),
        "StrictEquals" => equality("StrictEquals"),
        "LooseEquals" => equality("LooseEquals"),
        "GetProperty" => get_property(),
        "SetProperty" => set_property(false),
        "SetPropertyStrict" => set_property(true),
        "GetIndex" => get_index(),
        "SetIndex" => set_index(false),
        "SetIndexStrict" => set_index(true),
        "GetIterator" => get_iterator(),
        "Bind" => bind(),
        "CallBound" => call_bound(),
        "Apply" => apply(),
        "GetPrivateField" => private_access("GetPrivateField", false),
        "SetPrivateField" => private_access("SetPrivateField", true),
        "CallPrivateMethod" => private_access("CallPrivateMethod", false),
        other => intrinsic_backed(other),
    }
}

/// `IsTruthy(o)`: false for undefined/null/false/0/NaN/"".
fn is_truthy() -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new("IsTruthy", vec!["value".to_string()]);
    let false_label = b.reserve_label();
    let number_label = b.reserve_label();
    let string_label = b.reserve_label();
    let bool_label = b.reserve_label();
    let true_label = b.reserve_label();

    // tag dispatch
    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.dup();
    b.ldc_f64(type_tag::UNDEFINED);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(false_label);
    b.dup();
    b.ldc_f64(type_tag::NULL);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(false_label);
    b.dup();
    b.ldc_f64(type_tag::NUMBER);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(number_label);
    b.dup();
    b.ldc_f64(type_tag::STRING);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(string_label);
    b.dup();
    b.ldc_f64(type_tag::BOOL);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(bool_label);
    b.br(true_label);

    b.mark_label(number_label);
    b.ld_arg(0);
    b.emit(Instr::UnboxDouble, 1, Some(StackType::Double));
    b.ldc_f64(0.0);
    b.emit(Instr::CmpNe, 2, Some(StackType::Bool));
    b.ret();

    b.mark_label(string_label);
    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::StringLen, 1, Some(StackType::Double));
    b.ldc_f64(0.0);
    b.emit(Instr::CmpNe, 2, Some(StackType::Bool));
    b.ret();

    b.mark_label(bool_label);
    b.ld_arg(0);
    b.emit(Instr::UnboxBool, 1, Some(StackType::Bool));
    b.ret();

    b.mark_label(true_label);
    b.ldc_bool(true);
    b.ret();

    b.mark_label(false_label);
    b.ldc_bool(false);
    b.ret();

    b.finish(true, Span::dummy())
}

/// Dynamic `+`: numbers add, anything else concatenates as strings.
fn dynamic_add() -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new("Add", vec!["a".to_string(), "b".to_string()]);
    let concat = b.reserve_label();
    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.ldc_f64(type_tag::NUMBER);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_false(concat);
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.ldc_f64(type_tag::NUMBER);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_false(concat);
    b.ld_arg(0);
    b.emit(Instr::UnboxDouble, 1, Some(StackType::Double));
    b.ld_arg(1);
    b.emit(Instr::UnboxDouble, 1, Some(StackType::Double));
    b.emit(Instr::Add, 2, Some(StackType::Double));
    b.ensure_boxed();
    b.ret();
    b.mark_label(concat);
    b.ld_arg(0);
    b.emit(Instr::ConvStr, 1, Some(StackType::Str));
    b.ld_arg(1);
    b.emit(Instr::ConvStr, 1, Some(StackType::Str));
    b.call_intrinsic(Intrinsic::StringConcat, 2, Some(StackType::Str));
    b.ensure_boxed();
    b.ret();
    b.finish(true, Span::dummy())
}

/// `IsNullish(value)`: undefined or null.
fn is_nullish() -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new("IsNullish", vec!["value".to_string()]);
    let yes = b.reserve_label();
    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.dup();
    b.ldc_f64(type_tag::UNDEFINED);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(yes);
    b.ldc_f64(type_tag::NULL);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.ret();
    b.mark_label(yes);
    b.ldc_bool(true);
    b.ret();
    b.finish(true, Span::dummy())
}

/// Equality: same-tag fast paths, then the host comparison intrinsic.
fn equality(name: &str) -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new(name, vec!["a".to_string(), "b".to_string()]);
    let slow = b.reserve_label();
    let number_path = b.reserve_label();

    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_false(slow);

    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.ldc_f64(type_tag::NUMBER);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(number_path);

    b.mark_label(slow);
    b.ld_arg(0);
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::StringEquals, 2, Some(StackType::Bool));
    b.ret();

    b.mark_label(number_path);
    b.ld_arg(0);
    b.emit(Instr::UnboxDouble, 1, Some(StackType::Double));
    b.ld_arg(1);
    b.emit(Instr::UnboxDouble, 1, Some(StackType::Double));
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.ret();

    b.finish(true, Span::dummy())
}

/// Dynamic named-property read: dictionaries, arrays (`length`),
/// strings, then class instances via accessor probe (`get_Name`) and
/// the `_fields` table walked up the base chain.
fn get_property() -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new(
        "GetProperty",
        vec!["obj".to_string(), "name".to_string()],
    );
    let dict_label = b.reserve_label();
    let object_label = b.reserve_label();

    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.dup();
    b.ldc_f64(type_tag::DICT);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(dict_label);
    b.dup();
    b.ldc_f64(type_tag::OBJECT);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(object_label);

    // Arrays, strings, promises: defer to the field-table probe, which
    // also resolves intrinsic members like `length`.
    b.ld_arg(0);
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::FieldTableGet, 2, Some(StackType::Ref));
    b.ret();

    b.mark_label(dict_label);
    b.ld_arg(0);
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::DictGet, 2, Some(StackType::Ref));
    b.ret();

    // Class instance: accessor first, then the `_fields` chain.
    b.mark_label(object_label);
    b.ld_arg(0);
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::FieldTableGet, 2, Some(StackType::Ref));
    b.ret();

    b.finish(true, Span::dummy())
}

fn set_property(strict: bool) -> Result<IlMethod, Diagnostic> {
    let name = if strict { "SetPropertyStrict" } else { "SetProperty" };
    let mut b = MethodBuilder::new(
        name,
        vec!["obj".to_string(), "name".to_string(), "value".to_string()],
    );
    let blocked = b.reserve_label();
    let dict_label = b.reserve_label();

    // Frozen table consulted on every write.
    b.emit(
        Instr::LdSFld(MethodRef {
            class: "Runtime".to_string(),
            name: "__frozen".to_string(),
        }),
        0,
        Some(StackType::Ref),
    );
    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::WeakTableHas, 2, Some(StackType::Bool));
    b.br_true(blocked);

    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.ldc_f64(type_tag::DICT);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(dict_label);

    b.ld_arg(0);
    b.ld_arg(1);
    b.ld_arg(2);
    b.call_intrinsic(Intrinsic::FieldTableSet, 3, None);
    b.ldc_undefined();
    b.ret();

    b.mark_label(dict_label);
    b.ld_arg(0);
    b.ld_arg(1);
    b.ld_arg(2);
    b.call_intrinsic(Intrinsic::DictSet, 3, None);
    b.ldc_undefined();
    b.ret();

    b.mark_label(blocked);
    if strict {
        b.ldc_str("Cannot modify a frozen object");
        b.ensure_boxed();
        b.call_intrinsic(Intrinsic::ThrowError, 1, None);
    }
    b.ldc_undefined();
    b.ret();

    b.finish(true, Span::dummy())
}

/// `GetIndex(obj, index)`: arrays by element, strings by character
/// (read only), dictionaries by key, symbol-keyed storage through the
/// weak slot table, class instances through the property path.
fn get_index() -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new("GetIndex", vec!["obj".to_string(), "index".to_string()]);
    let array_label = b.reserve_label();
    let string_label = b.reserve_label();
    let symbol_label = b.reserve_label();

    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.ldc_f64(type_tag::SYMBOL);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(symbol_label);

    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.dup();
    b.ldc_f64(type_tag::ARRAY);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(array_label);
    b.dup();
    b.ldc_f64(type_tag::STRING);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(string_label);

    // Everything else routes through the named-property path.
    b.ld_arg(0);
    b.ld_arg(1);
    b.emit(Instr::ConvStr, 1, Some(StackType::Str));
    b.ensure_boxed();
    b.call("Runtime", "GetProperty", 2, Some(StackType::Ref));
    b.ret();

    b.mark_label(array_label);
    b.ld_arg(0);
    b.ld_arg(1);
    b.emit(Instr::UnboxDouble, 1, Some(StackType::Double));
    b.call_intrinsic(Intrinsic::ArrayGet, 2, Some(StackType::Ref));
    b.ret();

    b.mark_label(string_label);
    b.ld_arg(0);
    b.ld_arg(1);
    b.emit(Instr::UnboxDouble, 1, Some(StackType::Double));
    b.call_intrinsic(Intrinsic::StringCharAt, 2, Some(StackType::Ref));
    b.ret();

    b.mark_label(symbol_label);
    b.emit(
        Instr::LdSFld(MethodRef {
            class: "Runtime".to_string(),
            name: "__symbolSlots".to_string(),
        }),
        0,
        Some(StackType::Ref),
    );
    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::WeakTableGet, 2, Some(StackType::Ref));
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::DictGet, 2, Some(StackType::Ref));
    b.ret();

    b.finish(true, Span::dummy())
}

fn set_index(strict: bool) -> Result<IlMethod, Diagnostic> {
    let name = if strict { "SetIndexStrict" } else { "SetIndex" };
    let mut b = MethodBuilder::new(
        name,
        vec!["obj".to_string(), "index".to_string(), "value".to_string()],
    );
    let blocked = b.reserve_label();
    let array_label = b.reserve_label();

    b.emit(
        Instr::LdSFld(MethodRef {
            class: "Runtime".to_string(),
            name: "__frozen".to_string(),
        }),
        0,
        Some(StackType::Ref),
    );
    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::WeakTableHas, 2, Some(StackType::Bool));
    b.br_true(blocked);

    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.ldc_f64(type_tag::ARRAY);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(array_label);

    b.ld_arg(0);
    b.ld_arg(1);
    b.emit(Instr::ConvStr, 1, Some(StackType::Str));
    b.ensure_boxed();
    b.ld_arg(2);
    let helper = if strict { "SetPropertyStrict" } else { "SetProperty" };
    b.call("Runtime", helper, 3, Some(StackType::Ref));
    b.ret();

    b.mark_label(array_label);
    b.ld_arg(0);
    b.ld_arg(1);
    b.emit(Instr::UnboxDouble, 1, Some(StackType::Double));
    b.ld_arg(2);
    b.call_intrinsic(Intrinsic::ArraySet, 3, None);
    b.ldc_undefined();
    b.ret();

    b.mark_label(blocked);
    if strict {
        b.ldc_str("Cannot modify a frozen object");
        b.ensure_boxed();
        b.call_intrinsic(Intrinsic::ThrowError, 1, None);
    }
    b.ldc_undefined();
    b.ret();

    b.finish(true, Span::dummy())
}

/// `GetIterator(obj)`: honor `Symbol.iterator` dispatch; arrays and
/// strings fall back to the host enumerable wrapper.
fn get_iterator() -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new("GetIterator", vec!["obj".to_string()]);
    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::MakeSymbol, 0, Some(StackType::Ref));
    b.call("Runtime", "GetIndex", 2, Some(StackType::Ref));
    let missing = b.reserve_label();
    b.dup();
    b.call_intrinsic(Intrinsic::TypeTag, 1, Some(StackType::Double));
    b.ldc_f64(type_tag::UNDEFINED);
    b.emit(Instr::CmpEq, 2, Some(StackType::Bool));
    b.br_true(missing);
    // iterator = method.call(obj)
    b.ld_arg(0);
    b.call_intrinsic(Intrinsic::ArrayNew, 0, Some(StackType::Ref));
    b.call("Runtime", "InvokeFunction", 3, Some(StackType::Ref));
    b.ret();
    b.mark_label(missing);
    b.ldc_str("value is not iterable");
    b.ensure_boxed();
    b.call_intrinsic(Intrinsic::ThrowError, 1, None);
    b.ldc_undefined();
    b.ret();
    b.finish(true, Span::dummy())
}

/// `Bind(fn, thisArg, args)`: a `$BoundFunction` record holding the
/// target, the bound `this`, and the leading arguments.
fn bind() -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new(
        "Bind",
        vec!["fn".to_string(), "thisArg".to_string(), "args".to_string()],
    );
    b.call_intrinsic(Intrinsic::DictNew, 0, Some(StackType::Ref));
    for (slot, arg) in [("$target", 0u16), ("$this", 1), ("$args", 2)] {
        b.dup();
        b.ldc_str(slot);
        b.ensure_boxed();
        b.ld_arg(arg);
        b.call_intrinsic(Intrinsic::DictSet, 3, None);
    }
    b.ret();
    b.finish(true, Span::dummy())
}

/// `CallBound(bound, args)`: unpack a `$BoundFunction` and invoke its
/// target with the stored `this` and the stored-then-given arguments.
fn call_bound() -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new("CallBound", vec!["bound".to_string(), "args".to_string()]);
    // target
    b.ld_arg(0);
    b.ldc_str("$target");
    b.ensure_boxed();
    b.call_intrinsic(Intrinsic::DictGet, 2, Some(StackType::Ref));
    // this
    b.ld_arg(0);
    b.ldc_str("$this");
    b.ensure_boxed();
    b.call_intrinsic(Intrinsic::DictGet, 2, Some(StackType::Ref));
    // bound args ++ call args
    b.ld_arg(0);
    b.ldc_str("$args");
    b.ensure_boxed();
    b.call_intrinsic(Intrinsic::DictGet, 2, Some(StackType::Ref));
    b.dup();
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::ArrayAppendAll, 2, None);
    b.call_intrinsic(Intrinsic::InvokeClosure, 3, Some(StackType::Ref));
    b.ret();
    b.finish(true, Span::dummy())
}

/// `Apply(fn, thisArg, argsArray)`.
fn apply() -> Result<IlMethod, Diagnostic> {
    let mut b = MethodBuilder::new(
        "Apply",
        vec!["fn".to_string(), "thisArg".to_string(), "args".to_string()],
    );
    b.ld_arg(0);
    b.ld_arg(1);
    b.ld_arg(2);
    b.call_intrinsic(Intrinsic::InvokeClosure, 3, Some(StackType::Ref));
    b.ret();
    b.finish(true, Span::dummy())
}

/// Private-member helpers: the brand table maps instance -> field
/// dictionary; a missing brand is a typed error.
fn private_access(name: &str, is_set: bool) -> Result<IlMethod, Diagnostic> {
    let mut params = vec![
        "brand".to_string(),
        "obj".to_string(),
        "name".to_string(),
    ];
    if is_set {
        params.push("value".to_string());
    }
    let mut b = MethodBuilder::new(name, params);
    let branded = b.reserve_label();
    b.ld_arg(0);
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::WeakTableHas, 2, Some(StackType::Bool));
    b.br_true(branded);
    b.ldc_str("Cannot access private member on a foreign object");
    b.ensure_boxed();
    b.call_intrinsic(Intrinsic::ThrowError, 1, None);
    b.mark_label(branded);
    b.ld_arg(0);
    b.ld_arg(1);
    b.call_intrinsic(Intrinsic::WeakTableGet, 2, Some(StackType::Ref));
    b.ld_arg(2);
    if is_set {
        b.ld_arg(3);
        b.call_intrinsic(Intrinsic::DictSet, 3, None);
        b.ldc_undefined();
    } else {
        b.call_intrinsic(Intrinsic::DictGet, 2, Some(StackType::Ref));
    }
    b.ret();
    b.finish(true, Span::dummy())
}

/// Helpers whose body is a single host facility (console writing,
/// promise plumbing, closure invocation, crypto/url wrappers).
fn intrinsic_backed(name: &str) -> Result<IlMethod, Diagnostic> {
    let (params, intrinsic, returns): (&[&str], Intrinsic, Option<StackType>) = match name {
        "ConsoleLog" => (&["args"], Intrinsic::ConsoleWrite, None),
        "TypeOf" => (&["value"], Intrinsic::TypeOfName, Some(StackType::Str)),
        "GetBuiltin" => (&["name"], Intrinsic::GetGlobal, Some(StackType::Ref)),
        "InvokeMethod" => (
            &["obj", "name", "args"],
            Intrinsic::InvokeClosure,
            Some(StackType::Ref),
        ),
        "InvokeFunction" => (
            &["fn", "thisArg", "args"],
            Intrinsic::InvokeClosure,
            Some(StackType::Ref),
        ),
        "Construct" => (
            &["class", "args"],
            Intrinsic::ConstructObject,
            Some(StackType::Ref),
        ),
        "ClassOf" => (&["name"], Intrinsic::GetGlobal, Some(StackType::Ref)),
        "Pow" => (&["a", "b"], Intrinsic::MathPow, Some(StackType::Double)),
        "Compare" => (&["a", "b"], Intrinsic::StringCompare, Some(StackType::Double)),
        "HasProperty" => (&["name", "obj"], Intrinsic::DictHas, Some(StackType::Bool)),
        "DeleteProperty" => (&["obj", "name"], Intrinsic::DictRemove, Some(StackType::Bool)),
        "InstanceOf" => (&["value", "class"], Intrinsic::InstanceCheck, Some(StackType::Bool)),
        "EnumerableKeys" => (&["obj"], Intrinsic::DictKeys, Some(StackType::Ref)),
        "SpreadInto" => (&["array", "value"], Intrinsic::ArrayAppendAll, None),
        "CopyProperties" => (&["target", "source"], Intrinsic::DictSet, None),
        "RunAsync" => (&["machine"], Intrinsic::RunAsyncMachine, Some(StackType::Ref)),
        "MakeGeneratorObject" => (&["machine"], Intrinsic::MakeGenerator, Some(StackType::Ref)),
        "MakeAsyncGeneratorObject" => {
            (&["machine"], Intrinsic::MakeAsyncGenerator, Some(StackType::Ref))
        }
        "NewPromise" => (&["args"], Intrinsic::MakePromise, Some(StackType::Ref)),
        "BlockOn" => (&["promise"], Intrinsic::BlockOnPromise, Some(StackType::Ref)),
        "PromiseResolve" => (&["value"], Intrinsic::PromiseResolve, Some(StackType::Ref)),
        "PromiseReject" => (&["error"], Intrinsic::PromiseReject, Some(StackType::Ref)),
        "HashDigest" => (&["algorithm", "data"], Intrinsic::HashDigest, Some(StackType::Ref)),
        "CipherTransform" => (
            &["key", "data"],
            Intrinsic::CipherTransform,
            Some(StackType::Ref),
        ),
        "UrlParse" => (&["text"], Intrinsic::UrlParse, Some(StackType::Ref)),
        other => {
            return Err(Diagnostic::compile_error(
                Span::dummy(),
                format!("internal emitter invariant violated: unknown shim helper '{other}'"),
                sharpts_common::diagnostics::diagnostic_codes::EMITTER_INVARIANT,
            ));
        }
    };
    let mut b = MethodBuilder::new(name, params.iter().map(|p| p.to_string()).collect());
    for i in 0..params.len() {
        b.ld_arg(i as u16);
    }
    b.call_intrinsic(intrinsic, params.len() as u8, returns);
    if returns.is_none() {
        b.ldc_undefined();
    } else {
        b.ensure_boxed();
    }
    b.ret();
    b.finish(true, Span::dummy())
}
