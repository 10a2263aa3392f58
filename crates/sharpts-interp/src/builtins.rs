//! Built-in values: the global bindings and the member surfaces of
//! primitives, arrays, functions, promises, and generators.
//!
//! The full library surface is outside the core; what lives here is the
//! callable contract the interpreter needs for the supported programs.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use sharpts_common::numeric::format_number;

use crate::coroutine;
use crate::interp::{EvalResult, Interpreter, Signal};
use crate::iterator::native_fn;
use crate::ops;
use crate::value::*;

pub fn install(interp: &mut Interpreter) {
    install_console(interp);
    install_math(interp);
    install_object(interp);
    install_symbol(interp);
    install_process(interp);
    install_conversions(interp);
    install_promise(interp);
    install_errors(interp);
    install_crypto(interp);
    install_url(interp);
}

fn define_object(interp: &mut Interpreter, name: &str, fields: Vec<(&str, Value)>) {
    let object = ObjectData::plain();
    for (key, value) in fields {
        object
            .props
            .borrow_mut()
            .insert(PropKey::Name(key.to_string()), value);
    }
    interp.globals.define(name, Value::Object(object));
}

fn install_console(interp: &mut Interpreter) {
    let log = native_fn("log", |interp, _this, args| {
        let parts: Vec<String> = args.iter().map(ops::format_for_console).collect();
        let line = parts.join(" ");
        let _ = writeln!(interp.output, "{line}");
        Ok(Value::Undefined)
    });
    define_object(
        interp,
        "console",
        vec![
            ("log", log.clone()),
            ("info", log.clone()),
            ("warn", log.clone()),
            ("error", log.clone()),
            ("debug", log),
        ],
    );
}

fn number_unary(name: &'static str, f: fn(f64) -> f64) -> Value {
    native_fn(name, move |_interp, _this, args| {
        let x = args.first().map(ops::to_number).unwrap_or(f64::NAN);
        Ok(Value::Number(f(x)))
    })
}

fn install_math(interp: &mut Interpreter) {
    let pow = native_fn("pow", |_interp, _this, args| {
        let a = args.first().map(ops::to_number).unwrap_or(f64::NAN);
        let b = args.get(1).map(ops::to_number).unwrap_or(f64::NAN);
        Ok(Value::Number(a.powf(b)))
    });
    let atan2 = native_fn("atan2", |_interp, _this, args| {
        let a = args.first().map(ops::to_number).unwrap_or(f64::NAN);
        let b = args.get(1).map(ops::to_number).unwrap_or(f64::NAN);
        Ok(Value::Number(a.atan2(b)))
    });
    let min = native_fn("min", |_interp, _this, args| {
        let mut best = f64::INFINITY;
        for arg in args {
            let x = ops::to_number(arg);
            if x.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            best = best.min(x);
        }
        Ok(Value::Number(best))
    });
    let max = native_fn("max", |_interp, _this, args| {
        let mut best = f64::NEG_INFINITY;
        for arg in args {
            let x = ops::to_number(arg);
            if x.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            best = best.max(x);
        }
        Ok(Value::Number(best))
    });
    let random = native_fn("random", |_interp, _this, _args| {
        // Deterministic core: a simple linear congruential step seeded
        // per process start keeps output reproducible across backends.
        use std::cell::Cell;
        thread_local! {
            static SEED: Cell<u64> = const { Cell::new(0x9E3779B97F4A7C15) };
        }
        let next = SEED.with(|seed| {
            let value = seed
                .get()
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            seed.set(value);
            value
        });
        Ok(Value::Number((next >> 11) as f64 / (1u64 << 53) as f64))
    });
    define_object(
        interp,
        "Math",
        vec![
            ("abs", number_unary("abs", f64::abs)),
            ("floor", number_unary("floor", f64::floor)),
            ("ceil", number_unary("ceil", f64::ceil)),
            ("round", number_unary("round", f64::round)),
            ("trunc", number_unary("trunc", f64::trunc)),
            ("sqrt", number_unary("sqrt", f64::sqrt)),
            ("sign", number_unary("sign", f64::signum)),
            ("log", number_unary("log", f64::ln)),
            ("log2", number_unary("log2", f64::log2)),
            ("log10", number_unary("log10", f64::log10)),
            ("exp", number_unary("exp", f64::exp)),
            ("sin", number_unary("sin", f64::sin)),
            ("cos", number_unary("cos", f64::cos)),
            ("tan", number_unary("tan", f64::tan)),
            ("pow", pow),
            ("atan2", atan2),
            ("min", min),
            ("max", max),
            ("random", random),
            ("PI", Value::Number(std::f64::consts::PI)),
            ("E", Value::Number(std::f64::consts::E)),
        ],
    );
}

fn install_object(interp: &mut Interpreter) {
    let freeze = native_fn("freeze", |interp, _this, args| {
        let target = args.first().cloned().unwrap_or(Value::Undefined);
        if let Some(identity) = target.identity() {
            interp.frozen.insert(identity);
        }
        Ok(target)
    });
    let seal = native_fn("seal", |interp, _this, args| {
        let target = args.first().cloned().unwrap_or(Value::Undefined);
        if let Some(identity) = target.identity() {
            interp.sealed.insert(identity);
        }
        Ok(target)
    });
    let is_frozen = native_fn("isFrozen", |interp, _this, args| {
        let frozen = args
            .first()
            .and_then(|v| v.identity())
            .is_some_and(|id| interp.frozen.contains(&id));
        Ok(Value::Bool(frozen))
    });
    let is_sealed = native_fn("isSealed", |interp, _this, args| {
        let sealed = args
            .first()
            .and_then(|v| v.identity())
            .is_some_and(|id| interp.sealed.contains(&id) || interp.frozen.contains(&id));
        Ok(Value::Bool(sealed))
    });
    let keys = native_fn("keys", |_interp, _this, args| {
        let keys = args
            .first()
            .map(crate::iterator::enumerable_keys)
            .unwrap_or_default();
        let values: Vec<Value> = keys.into_iter().map(Value::string).collect();
        Ok(Value::Array(Rc::new(RefCell::new(values))))
    });
    let values = native_fn("values", |_interp, _this, args| {
        let out: Vec<Value> = match args.first() {
            Some(Value::Object(data)) => data
                .props
                .borrow()
                .iter()
                .filter(|(k, _)| matches!(k, PropKey::Name(_)))
                .map(|(_, v)| v.clone())
                .collect(),
            Some(Value::Array(items)) => items.borrow().clone(),
            _ => Vec::new(),
        };
        Ok(Value::Array(Rc::new(RefCell::new(out))))
    });
    let assign = native_fn("assign", |interp, _this, args| {
        let target = args.first().cloned().unwrap_or(Value::Undefined);
        for source in args.iter().skip(1) {
            if let Value::Object(data) = source {
                let props: Vec<(PropKey, Value)> = data
                    .props
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, value) in props {
                    if let PropKey::Name(name) = key {
                        interp.set_property(&target, &name, value)?;
                    }
                }
            }
        }
        Ok(target)
    });
    define_object(
        interp,
        "Object",
        vec![
            ("freeze", freeze),
            ("seal", seal),
            ("isFrozen", is_frozen),
            ("isSealed", is_sealed),
            ("keys", keys),
            ("values", values),
            ("assign", assign),
        ],
    );
}

fn install_symbol(interp: &mut Interpreter) {
    define_object(
        interp,
        "Symbol",
        vec![
            ("iterator", Value::Symbol(SYMBOL_ITERATOR)),
            ("asyncIterator", Value::Symbol(SYMBOL_ASYNC_ITERATOR)),
        ],
    );
}

fn install_process(interp: &mut Interpreter) {
    let argv: Vec<Value> = interp.argv.iter().map(Value::string).collect();
    define_object(
        interp,
        "process",
        vec![("argv", Value::Array(Rc::new(RefCell::new(argv))))],
    );
}

fn install_conversions(interp: &mut Interpreter) {
    let to_string = native_fn("String", |_interp, _this, args| {
        Ok(Value::string(
            args.first().map(ops::to_display_string).unwrap_or_default(),
        ))
    });
    let to_number = native_fn("Number", |_interp, _this, args| {
        Ok(Value::Number(
            args.first().map(ops::to_number).unwrap_or(0.0),
        ))
    });
    let to_boolean = native_fn("Boolean", |_interp, _this, args| {
        Ok(Value::Bool(args.first().is_some_and(ops::is_truthy)))
    });
    let parse_int = native_fn("parseInt", |_interp, _this, args| {
        let text = args.first().map(ops::to_display_string).unwrap_or_default();
        let radix = args.get(1).map(ops::to_number).unwrap_or(10.0) as u32;
        let radix = if radix == 0 { 10 } else { radix };
        let trimmed = text.trim();
        let (digits, negative) = match trimmed.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (trimmed.strip_prefix('+').unwrap_or(trimmed), false),
        };
        let prefix_stripped = if radix == 16 {
            digits
                .strip_prefix("0x")
                .or_else(|| digits.strip_prefix("0X"))
                .unwrap_or(digits)
        } else {
            digits
        };
        let valid: String = prefix_stripped
            .chars()
            .take_while(|c| c.is_digit(radix))
            .collect();
        if valid.is_empty() {
            return Ok(Value::Number(f64::NAN));
        }
        let value = i64::from_str_radix(&valid, radix).map(|v| v as f64).unwrap_or(f64::NAN);
        Ok(Value::Number(if negative { -value } else { value }))
    });
    let parse_float = native_fn("parseFloat", |_interp, _this, args| {
        let text = args.first().map(ops::to_display_string).unwrap_or_default();
        Ok(Value::Number(
            text.trim().parse::<f64>().unwrap_or(f64::NAN),
        ))
    });
    let is_nan = native_fn("isNaN", |_interp, _this, args| {
        Ok(Value::Bool(
            args.first().map(ops::to_number).unwrap_or(f64::NAN).is_nan(),
        ))
    });
    interp.globals.define("String", to_string);
    interp.globals.define("Number", to_number);
    interp.globals.define("Boolean", to_boolean);
    interp.globals.define("parseInt", parse_int);
    interp.globals.define("parseFloat", parse_float);
    interp.globals.define("isNaN", is_nan);
}

fn install_promise(interp: &mut Interpreter) {
    let resolve = native_fn("resolve", |interp, _this, args| {
        let promise = PromiseState::pending();
        let value = args.first().cloned().unwrap_or(Value::Undefined);
        interp.resolve_promise(&promise, value);
        Ok(Value::Promise(promise))
    });
    let reject = native_fn("reject", |interp, _this, args| {
        let promise = PromiseState::pending();
        let error = args.first().cloned().unwrap_or(Value::Undefined);
        interp.reject_promise(&promise, error);
        Ok(Value::Promise(promise))
    });
    let all = native_fn("all", |interp, _this, args| {
        let result = PromiseState::pending();
        let mut items = Vec::new();
        if let Some(value) = args.first() {
            crate::iterator::spread_into(interp, value, &mut items)?;
        }
        let total = items.len();
        let settled: Rc<RefCell<Vec<Option<Value>>>> =
            Rc::new(RefCell::new(vec![None; total]));
        if total == 0 {
            interp.resolve_promise(&result, Value::Array(Rc::new(RefCell::new(Vec::new()))));
            return Ok(Value::Promise(result));
        }
        for (i, item) in items.into_iter().enumerate() {
            match item {
                Value::Promise(inner) => {
                    let settled = Rc::clone(&settled);
                    let result = Rc::clone(&result);
                    interp.on_settle(
                        &inner,
                        Box::new(move |interp, outcome| match outcome {
                            Ok(value) => {
                                settled.borrow_mut()[i] = Some(value);
                                let complete =
                                    settled.borrow().iter().all(|slot| slot.is_some());
                                if complete {
                                    let values: Vec<Value> = settled
                                        .borrow()
                                        .iter()
                                        .map(|slot| slot.clone().unwrap_or(Value::Undefined))
                                        .collect();
                                    interp.resolve_promise(
                                        &result,
                                        Value::Array(Rc::new(RefCell::new(values))),
                                    );
                                }
                            }
                            Err(error) => {
                                interp.reject_promise(&result, error);
                            }
                        }),
                    );
                }
                plain => {
                    settled.borrow_mut()[i] = Some(plain);
                }
            }
        }
        let complete = settled.borrow().iter().all(|slot| slot.is_some());
        if complete {
            let values: Vec<Value> = settled
                .borrow()
                .iter()
                .map(|slot| slot.clone().unwrap_or(Value::Undefined))
                .collect();
            interp.resolve_promise(&result, Value::Array(Rc::new(RefCell::new(values))));
        }
        Ok(Value::Promise(result))
    });
    let race = native_fn("race", |interp, _this, args| {
        let result = PromiseState::pending();
        let mut items = Vec::new();
        if let Some(value) = args.first() {
            crate::iterator::spread_into(interp, value, &mut items)?;
        }
        for item in items {
            match item {
                Value::Promise(inner) => {
                    let result = Rc::clone(&result);
                    interp.on_settle(
                        &inner,
                        Box::new(move |interp, outcome| match outcome {
                            Ok(value) => interp.resolve_promise(&result, value),
                            Err(error) => interp.reject_promise(&result, error),
                        }),
                    );
                }
                plain => {
                    interp.resolve_promise(&result, plain);
                    break;
                }
            }
        }
        Ok(Value::Promise(result))
    });
    define_object(
        interp,
        "Promise",
        vec![
            ("resolve", resolve),
            ("reject", reject),
            ("all", all),
            ("race", race),
        ],
    );
}

fn install_errors(interp: &mut Interpreter) {
    let mut base: Option<Rc<ClassValue>> = None;
    for name in ["Error", "TypeError", "RangeError", "SyntaxError"] {
        let class_name = name.to_string();
        let ctor: NativeFn = Rc::new(move |_interp, this, args: &[Value]| {
            if let Value::Object(data) = &this {
                let message = args
                    .first()
                    .map(ops::to_display_string)
                    .unwrap_or_default();
                data.props.borrow_mut().insert(
                    PropKey::Name("message".to_string()),
                    Value::string(message),
                );
                data.props.borrow_mut().insert(
                    PropKey::Name("name".to_string()),
                    Value::string(&class_name),
                );
            }
            Ok(Value::Undefined)
        });
        let class = Rc::new(ClassValue {
            name: name.to_string(),
            superclass: base.clone(),
            ctor: None,
            methods: rustc_hash::FxHashMap::default(),
            getters: rustc_hash::FxHashMap::default(),
            setters: rustc_hash::FxHashMap::default(),
            static_props: RefCell::new(rustc_hash::FxHashMap::default()),
            field_inits: Vec::new(),
            env: Rc::clone(&interp.globals),
            native_ctor: Some(ctor),
        });
        if name == "Error" {
            base = Some(Rc::clone(&class));
        }
        interp.globals.define(name, Value::Class(class));
    }
}

fn install_crypto(interp: &mut Interpreter) {
    // FNV-1a over algorithm and data, rendered as hex. Deterministic,
    // so interpreter and emitted output agree byte for byte.
    let hash = native_fn("hash", |_interp, _this, args| {
        let algorithm = args.first().map(ops::to_display_string).unwrap_or_default();
        let data = args.get(1).map(ops::to_display_string).unwrap_or_default();
        let mut digest: u64 = 0xcbf29ce484222325;
        for byte in algorithm.bytes().chain([0u8]).chain(data.bytes()) {
            digest ^= u64::from(byte);
            digest = digest.wrapping_mul(0x100000001b3);
        }
        Ok(Value::string(format!("{digest:016x}")))
    });
    // XOR transform with a cycling key, rendered as hex.
    let cipher = native_fn("cipher", |_interp, _this, args| {
        let key = args.first().map(ops::to_display_string).unwrap_or_default();
        let data = args.get(1).map(ops::to_display_string).unwrap_or_default();
        let key_bytes = key.as_bytes();
        let mut out = String::with_capacity(data.len() * 2);
        for (i, byte) in data.bytes().enumerate() {
            let masked = match key_bytes.is_empty() {
                true => byte,
                false => byte ^ key_bytes[i % key_bytes.len()],
            };
            out.push_str(&format!("{masked:02x}"));
        }
        Ok(Value::string(out))
    });
    define_object(interp, "crypto", vec![("hash", hash), ("cipher", cipher)]);
}

fn install_url(interp: &mut Interpreter) {
    let parse = native_fn("parse", |_interp, _this, args| {
        let text = args.first().map(ops::to_display_string).unwrap_or_default();
        let (protocol, rest) = match text.split_once("://") {
            Some((protocol, rest)) => (protocol, rest),
            None => ("", text.as_str()),
        };
        let (host, path_and_query) = match rest.find('/') {
            Some(at) => (&rest[..at], &rest[at..]),
            None => (rest, ""),
        };
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path_and_query, ""),
        };
        let object = ObjectData::plain();
        for (name, value) in [
            ("protocol", protocol),
            ("host", host),
            ("path", path),
            ("query", query),
        ] {
            object
                .props
                .borrow_mut()
                .insert(PropKey::Name(name.to_string()), Value::string(value));
        }
        Ok(Value::Object(object))
    });
    define_object(interp, "url", vec![("parse", parse)]);
}

// =============================================================================
// Member surfaces of non-object receivers
// =============================================================================

/// `receiver.name` for primitives, arrays, functions, promises, and
/// generators. Methods come back bound to the receiver.
pub fn builtin_member(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
) -> EvalResult<Value> {
    match receiver {
        Value::Str(text) => string_member(interp, text, name),
        Value::Number(n) => number_member(interp, *n, name),
        Value::BigInt(b) => {
            if name == "toString" {
                let text = b.to_string();
                Ok(native_fn("toString", move |_interp, _this, _args| {
                    Ok(Value::string(&text))
                }))
            } else {
                Ok(Value::Undefined)
            }
        }
        Value::Bool(b) => {
            if name == "toString" {
                let text = b.to_string();
                Ok(native_fn("toString", move |_interp, _this, _args| {
                    Ok(Value::string(&text))
                }))
            } else {
                Ok(Value::Undefined)
            }
        }
        Value::Array(items) => array_member(interp, items, name),
        Value::Function(f) => function_member(interp, f, name),
        Value::Promise(promise) => promise_member(interp, promise, name),
        Value::Generator(generator) => generator_member(interp, generator, name),
        _ => Ok(Value::Undefined),
    }
}

fn string_member(interp: &mut Interpreter, text: &Rc<str>, name: &str) -> EvalResult<Value> {
    let _ = interp;
    let s = Rc::clone(text);
    Ok(match name {
        "length" => Value::Number(s.chars().count() as f64),
        "toUpperCase" => native_fn("toUpperCase", move |_i, _t, _a| {
            Ok(Value::string(s.to_uppercase()))
        }),
        "toLowerCase" => native_fn("toLowerCase", move |_i, _t, _a| {
            Ok(Value::string(s.to_lowercase()))
        }),
        "trim" => native_fn("trim", move |_i, _t, _a| Ok(Value::string(s.trim()))),
        "toString" => native_fn("toString", move |_i, _t, _a| Ok(Value::string(&*s))),
        "charAt" => native_fn("charAt", move |_i, _t, args| {
            let index = args.first().map(ops::to_number).unwrap_or(0.0) as usize;
            Ok(Value::string(
                s.chars().nth(index).map(String::from).unwrap_or_default(),
            ))
        }),
        "charCodeAt" => native_fn("charCodeAt", move |_i, _t, args| {
            let index = args.first().map(ops::to_number).unwrap_or(0.0) as usize;
            Ok(match s.chars().nth(index) {
                Some(c) => Value::Number(c as u32 as f64),
                None => Value::Number(f64::NAN),
            })
        }),
        "indexOf" => native_fn("indexOf", move |_i, _t, args| {
            let probe = args.first().map(ops::to_display_string).unwrap_or_default();
            Ok(Value::Number(match s.find(&probe) {
                Some(byte) => s[..byte].chars().count() as f64,
                None => -1.0,
            }))
        }),
        "lastIndexOf" => native_fn("lastIndexOf", move |_i, _t, args| {
            let probe = args.first().map(ops::to_display_string).unwrap_or_default();
            Ok(Value::Number(match s.rfind(&probe) {
                Some(byte) => s[..byte].chars().count() as f64,
                None => -1.0,
            }))
        }),
        "includes" => native_fn("includes", move |_i, _t, args| {
            let probe = args.first().map(ops::to_display_string).unwrap_or_default();
            Ok(Value::Bool(s.contains(&probe)))
        }),
        "startsWith" => native_fn("startsWith", move |_i, _t, args| {
            let probe = args.first().map(ops::to_display_string).unwrap_or_default();
            Ok(Value::Bool(s.starts_with(&probe)))
        }),
        "endsWith" => native_fn("endsWith", move |_i, _t, args| {
            let probe = args.first().map(ops::to_display_string).unwrap_or_default();
            Ok(Value::Bool(s.ends_with(&probe)))
        }),
        "slice" | "substring" => native_fn("slice", move |_i, _t, args| {
            let len = s.chars().count() as i64;
            let start = args.first().map(ops::to_number).unwrap_or(0.0) as i64;
            let end = args.get(1).map(ops::to_number).unwrap_or(len as f64) as i64;
            let clamp = |index: i64| -> usize {
                let adjusted = if index < 0 { len + index } else { index };
                adjusted.clamp(0, len) as usize
            };
            let (from, to) = (clamp(start), clamp(end));
            let sliced: String = s
                .chars()
                .skip(from)
                .take(to.saturating_sub(from))
                .collect();
            Ok(Value::string(sliced))
        }),
        "split" => native_fn("split", move |_i, _t, args| {
            let separator = args.first().map(ops::to_display_string).unwrap_or_default();
            let parts: Vec<Value> = if separator.is_empty() {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(&separator).map(Value::string).collect()
            };
            Ok(Value::Array(Rc::new(RefCell::new(parts))))
        }),
        "replace" => native_fn("replace", move |_i, _t, args| {
            let pattern = args.first().map(ops::to_display_string).unwrap_or_default();
            let replacement = args.get(1).map(ops::to_display_string).unwrap_or_default();
            Ok(Value::string(s.replacen(&pattern, &replacement, 1)))
        }),
        "repeat" => native_fn("repeat", move |_i, _t, args| {
            let count = args.first().map(ops::to_number).unwrap_or(0.0).max(0.0) as usize;
            Ok(Value::string(s.repeat(count)))
        }),
        "padStart" => native_fn("padStart", move |_i, _t, args| {
            let width = args.first().map(ops::to_number).unwrap_or(0.0) as usize;
            let fill = args
                .get(1)
                .map(ops::to_display_string)
                .unwrap_or_else(|| " ".to_string());
            let mut out = String::new();
            let current = s.chars().count();
            if width > current && !fill.is_empty() {
                let mut pad = String::new();
                while pad.chars().count() < width - current {
                    pad.push_str(&fill);
                }
                out.extend(pad.chars().take(width - current));
            }
            out.push_str(&s);
            Ok(Value::string(out))
        }),
        "concat" => native_fn("concat", move |_i, _t, args| {
            let mut out = s.to_string();
            for arg in args {
                out.push_str(&ops::to_display_string(arg));
            }
            Ok(Value::string(out))
        }),
        _ => Value::Undefined,
    })
}

fn number_member(interp: &mut Interpreter, n: f64, name: &str) -> EvalResult<Value> {
    let _ = interp;
    Ok(match name {
        "toFixed" => native_fn("toFixed", move |_i, _t, args| {
            let digits = args.first().map(ops::to_number).unwrap_or(0.0) as usize;
            Ok(Value::string(format!("{n:.digits$}")))
        }),
        "toString" => native_fn("toString", move |_i, _t, args| {
            match args.first().map(ops::to_number) {
                Some(radix) if radix != 10.0 => {
                    let radix = radix as u32;
                    Ok(Value::string(format_radix(n, radix)))
                }
                _ => Ok(Value::string(format_number(n))),
            }
        }),
        _ => Value::Undefined,
    })
}

fn format_radix(value: f64, radix: u32) -> String {
    if !(2..=36).contains(&radix) || !value.is_finite() {
        return format_number(value);
    }
    let negative = value < 0.0;
    let mut n = value.abs().trunc() as u64;
    let digits = "0123456789abcdefghijklmnopqrstuvwxyz".as_bytes();
    let mut out = Vec::new();
    loop {
        out.push(digits[(n % u64::from(radix)) as usize]);
        n /= u64::from(radix);
        if n == 0 {
            break;
        }
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn array_member(
    interp: &mut Interpreter,
    items: &Rc<RefCell<Vec<Value>>>,
    name: &str,
) -> EvalResult<Value> {
    let _ = interp;
    let a = Rc::clone(items);
    Ok(match name {
        "length" => Value::Number(a.borrow().len() as f64),
        "push" => native_fn("push", move |interp, this, args| {
            if interp.write_blocked(&this)? {
                return Ok(Value::Number(a.borrow().len() as f64));
            }
            a.borrow_mut().extend(args.iter().cloned());
            Ok(Value::Number(a.borrow().len() as f64))
        }),
        "pop" => native_fn("pop", move |_i, _t, _a| {
            Ok(a.borrow_mut().pop().unwrap_or(Value::Undefined))
        }),
        "shift" => native_fn("shift", move |_i, _t, _a| {
            let mut items = a.borrow_mut();
            if items.is_empty() {
                Ok(Value::Undefined)
            } else {
                Ok(items.remove(0))
            }
        }),
        "unshift" => native_fn("unshift", move |_i, _t, args| {
            let mut items = a.borrow_mut();
            for (offset, arg) in args.iter().enumerate() {
                items.insert(offset, arg.clone());
            }
            Ok(Value::Number(items.len() as f64))
        }),
        "slice" => native_fn("slice", move |_i, _t, args| {
            let items = a.borrow();
            let len = items.len() as i64;
            let start = args.first().map(ops::to_number).unwrap_or(0.0) as i64;
            let end = args.get(1).map(ops::to_number).unwrap_or(len as f64) as i64;
            let clamp = |index: i64| -> usize {
                let adjusted = if index < 0 { len + index } else { index };
                adjusted.clamp(0, len) as usize
            };
            let (from, to) = (clamp(start), clamp(end));
            let out: Vec<Value> = items
                .get(from..to.max(from))
                .unwrap_or(&[])
                .to_vec();
            Ok(Value::Array(Rc::new(RefCell::new(out))))
        }),
        "indexOf" => native_fn("indexOf", move |_i, _t, args| {
            let probe = args.first().cloned().unwrap_or(Value::Undefined);
            let found = a
                .borrow()
                .iter()
                .position(|v| ops::strict_equals(v, &probe));
            Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
        }),
        "includes" => native_fn("includes", move |_i, _t, args| {
            let probe = args.first().cloned().unwrap_or(Value::Undefined);
            Ok(Value::Bool(
                a.borrow().iter().any(|v| ops::strict_equals(v, &probe)),
            ))
        }),
        "join" => native_fn("join", move |_i, _t, args| {
            let separator = args
                .first()
                .map(ops::to_display_string)
                .unwrap_or_else(|| ",".to_string());
            let parts: Vec<String> = a.borrow().iter().map(ops::to_display_string).collect();
            Ok(Value::string(parts.join(&separator)))
        }),
        "concat" => native_fn("concat", move |_i, _t, args| {
            let mut out = a.borrow().clone();
            for arg in args {
                match arg {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::Array(Rc::new(RefCell::new(out))))
        }),
        "reverse" => native_fn("reverse", move |_i, this, _a| {
            a.borrow_mut().reverse();
            Ok(this)
        }),
        "map" => native_fn("map", move |interp, _t, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let snapshot = a.borrow().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                let mapped = interp.call_value(
                    &callback,
                    Value::Undefined,
                    vec![item, Value::Number(i as f64)],
                )?;
                out.push(mapped);
            }
            Ok(Value::Array(Rc::new(RefCell::new(out))))
        }),
        "filter" => native_fn("filter", move |interp, _t, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let snapshot = a.borrow().clone();
            let mut out = Vec::new();
            for (i, item) in snapshot.into_iter().enumerate() {
                let keep = interp.call_value(
                    &callback,
                    Value::Undefined,
                    vec![item.clone(), Value::Number(i as f64)],
                )?;
                if ops::is_truthy(&keep) {
                    out.push(item);
                }
            }
            Ok(Value::Array(Rc::new(RefCell::new(out))))
        }),
        "forEach" => native_fn("forEach", move |interp, _t, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let snapshot = a.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                interp.call_value(
                    &callback,
                    Value::Undefined,
                    vec![item, Value::Number(i as f64)],
                )?;
            }
            Ok(Value::Undefined)
        }),
        "find" => native_fn("find", move |interp, _t, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let snapshot = a.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                let hit = interp.call_value(
                    &callback,
                    Value::Undefined,
                    vec![item.clone(), Value::Number(i as f64)],
                )?;
                if ops::is_truthy(&hit) {
                    return Ok(item);
                }
            }
            Ok(Value::Undefined)
        }),
        "findIndex" => native_fn("findIndex", move |interp, _t, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let snapshot = a.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                let hit =
                    interp.call_value(&callback, Value::Undefined, vec![item])?;
                if ops::is_truthy(&hit) {
                    return Ok(Value::Number(i as f64));
                }
            }
            Ok(Value::Number(-1.0))
        }),
        "some" => native_fn("some", move |interp, _t, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let snapshot = a.borrow().clone();
            for item in snapshot {
                let hit =
                    interp.call_value(&callback, Value::Undefined, vec![item])?;
                if ops::is_truthy(&hit) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }),
        "every" => native_fn("every", move |interp, _t, args| {
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let snapshot = a.borrow().clone();
            for item in snapshot {
                let hit =
                    interp.call_value(&callback, Value::Undefined, vec![item])?;
                if !ops::is_truthy(&hit) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
        "sort" => native_fn("sort", move |interp, this, args| {
            let comparator = args.first().cloned();
            let mut items = a.borrow().clone();
            // Insertion sort keeps the comparator fallible.
            for i in 1..items.len() {
                let mut j = i;
                while j > 0 {
                    let ordering = match &comparator {
                        Some(callback) => {
                            let result = interp.call_value(
                                callback,
                                Value::Undefined,
                                vec![items[j - 1].clone(), items[j].clone()],
                            )?;
                            ops::to_number(&result)
                        }
                        None => {
                            let left = ops::to_display_string(&items[j - 1]);
                            let right = ops::to_display_string(&items[j]);
                            match left.cmp(&right) {
                                std::cmp::Ordering::Greater => 1.0,
                                _ => -1.0,
                            }
                        }
                    };
                    if ordering > 0.0 {
                        items.swap(j - 1, j);
                        j -= 1;
                    } else {
                        break;
                    }
                }
            }
            *a.borrow_mut() = items;
            Ok(this)
        }),
        _ => Value::Undefined,
    })
}

fn function_member(
    interp: &mut Interpreter,
    function: &Rc<FunctionValue>,
    name: &str,
) -> EvalResult<Value> {
    let _ = interp;
    let f = Rc::clone(function);
    Ok(match name {
        "bind" => native_fn("bind", move |_i, _t, args| {
            let this = args.first().cloned().unwrap_or(Value::Undefined);
            let bound_args = args.get(1..).unwrap_or(&[]).to_vec();
            Ok(Value::Function(Rc::new(FunctionValue::Bound {
                target: Rc::clone(&f),
                this,
                bound_args,
            })))
        }),
        "call" => native_fn("call", move |interp, _t, args| {
            let this = args.first().cloned().unwrap_or(Value::Undefined);
            let rest = args.get(1..).unwrap_or(&[]).to_vec();
            interp.call_function(&f, this, rest)
        }),
        "apply" => native_fn("apply", move |interp, _t, args| {
            let this = args.first().cloned().unwrap_or(Value::Undefined);
            let rest = match args.get(1) {
                Some(Value::Array(items)) => items.borrow().clone(),
                _ => Vec::new(),
            };
            interp.call_function(&f, this, rest)
        }),
        "name" => match function.as_ref() {
            FunctionValue::User(user) => Value::string(&user.name),
            FunctionValue::Native { name, .. } => Value::string(*name),
            FunctionValue::Bound { .. } => Value::string("bound"),
        },
        _ => Value::Undefined,
    })
}

fn promise_member(
    interp: &mut Interpreter,
    promise: &Rc<RefCell<PromiseState>>,
    name: &str,
) -> EvalResult<Value> {
    let _ = interp;
    let p = Rc::clone(promise);
    Ok(match name {
        "then" => native_fn("then", move |interp, _t, args| {
            let on_fulfilled = args.first().cloned();
            let on_rejected = args.get(1).cloned();
            let result = PromiseState::pending();
            let chained = Rc::clone(&result);
            interp.on_settle(
                &p,
                Box::new(move |interp, outcome| match outcome {
                    Ok(value) => match on_fulfilled {
                        Some(callback) if !matches!(callback, Value::Undefined) => {
                            match interp.call_value(&callback, Value::Undefined, vec![value]) {
                                Ok(mapped) => interp.resolve_promise(&chained, mapped),
                                Err(Signal::Throw(error)) => {
                                    interp.reject_promise(&chained, error)
                                }
                                Err(_) => {}
                            }
                        }
                        _ => interp.resolve_promise(&chained, value),
                    },
                    Err(error) => match on_rejected {
                        Some(callback) if !matches!(callback, Value::Undefined) => {
                            match interp.call_value(&callback, Value::Undefined, vec![error]) {
                                Ok(mapped) => interp.resolve_promise(&chained, mapped),
                                Err(Signal::Throw(error)) => {
                                    interp.reject_promise(&chained, error)
                                }
                                Err(_) => {}
                            }
                        }
                        _ => interp.reject_promise(&chained, error),
                    },
                }),
            );
            Ok(Value::Promise(result))
        }),
        "catch" => native_fn("catch", move |interp, _t, args| {
            let handler = args.first().cloned();
            let result = PromiseState::pending();
            let chained = Rc::clone(&result);
            interp.on_settle(
                &p,
                Box::new(move |interp, outcome| match outcome {
                    Ok(value) => interp.resolve_promise(&chained, value),
                    Err(error) => match handler {
                        Some(callback) if !matches!(callback, Value::Undefined) => {
                            match interp.call_value(&callback, Value::Undefined, vec![error]) {
                                Ok(mapped) => interp.resolve_promise(&chained, mapped),
                                Err(Signal::Throw(error)) => {
                                    interp.reject_promise(&chained, error)
                                }
                                Err(_) => {}
                            }
                        }
                        _ => interp.reject_promise(&chained, error),
                    },
                }),
            );
            Ok(Value::Promise(result))
        }),
        "finally" => native_fn("finally", move |interp, _t, args| {
            let handler = args.first().cloned();
            let result = PromiseState::pending();
            let chained = Rc::clone(&result);
            interp.on_settle(
                &p,
                Box::new(move |interp, outcome| {
                    if let Some(callback) = &handler {
                        if !matches!(callback, Value::Undefined) {
                            if let Err(Signal::Throw(error)) =
                                interp.call_value(callback, Value::Undefined, Vec::new())
                            {
                                interp.reject_promise(&chained, error);
                                return;
                            }
                        }
                    }
                    match outcome {
                        Ok(value) => interp.resolve_promise(&chained, value),
                        Err(error) => interp.reject_promise(&chained, error),
                    }
                }),
            );
            Ok(Value::Promise(result))
        }),
        _ => Value::Undefined,
    })
}

fn generator_member(
    interp: &mut Interpreter,
    generator: &Rc<RefCell<GeneratorState>>,
    name: &str,
) -> EvalResult<Value> {
    let _ = interp;
    let g = Rc::clone(generator);
    Ok(match name {
        "next" => native_fn("next", move |interp, _t, args| {
            let sent = args.first().cloned().unwrap_or(Value::Undefined);
            coroutine::generator_next(interp, &g, sent)
        }),
        "return" => native_fn("return", move |interp, _t, args| {
            let value = args.first().cloned().unwrap_or(Value::Undefined);
            coroutine::generator_return(interp, &g, value)
        }),
        "throw" => native_fn("throw", move |interp, _t, args| {
            let error = args.first().cloned().unwrap_or(Value::Undefined);
            coroutine::generator_throw(interp, &g, error)
        }),
        _ => Value::Undefined,
    })
}
