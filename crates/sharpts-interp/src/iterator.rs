//! The iteration protocol.
//!
//! An object is iterable iff it exposes a `Symbol.iterator` (or
//! `Symbol.asyncIterator`) method returning an object with `next()`
//! yielding `{value, done}` steps. Arrays, strings, and generators get
//! their protocol implementations here; plain objects participate by
//! carrying a symbol-keyed method.

use std::cell::Cell;
use std::rc::Rc;

use crate::coroutine;
use crate::interp::{EvalResult, Interpreter};
use crate::ops;
use crate::value::*;

/// `receiver[symbol]` lookups, covering the built-in iterables.
pub fn symbol_lookup(
    interp: &mut Interpreter,
    receiver: &Value,
    symbol: SymbolId,
) -> EvalResult<Value> {
    match receiver {
        Value::Object(data) => {
            if let Some(value) = data.props.borrow().get(&PropKey::Symbol(symbol)) {
                return Ok(value.clone());
            }
            Ok(Value::Undefined)
        }
        Value::Array(_) | Value::Str(_) if symbol == SYMBOL_ITERATOR => {
            let receiver = receiver.clone();
            Ok(native_fn("[Symbol.iterator]", move |interp, _this, _args| {
                make_value_iterator(interp, &receiver)
            }))
        }
        Value::Generator(generator) => {
            let wants_async = symbol == SYMBOL_ASYNC_ITERATOR;
            let is_async = generator.borrow().is_async;
            if wants_async == is_async {
                // A generator is its own iterator.
                let generator = receiver.clone();
                Ok(native_fn("[Symbol.iterator]", move |_interp, _this, _args| {
                    Ok(generator.clone())
                }))
            } else {
                Ok(Value::Undefined)
            }
        }
        _ => Ok(Value::Undefined),
    }
}

pub fn native_fn(
    name: &'static str,
    call: impl Fn(&mut Interpreter, Value, &[Value]) -> EvalResult<Value> + 'static,
) -> Value {
    Value::Function(Rc::new(FunctionValue::Native {
        name,
        call: Rc::new(call),
    }))
}

/// Build an index-driven iterator object over an array or string.
fn make_value_iterator(interp: &mut Interpreter, source: &Value) -> EvalResult<Value> {
    let elements: Vec<Value> = match source {
        Value::Array(items) => items.borrow().clone(),
        Value::Str(text) => text
            .chars()
            .map(|c| Value::string(c.to_string()))
            .collect(),
        other => {
            return Err(interp.throw_type_error(format!(
                "{} is not iterable",
                ops::to_display_string(other)
            )));
        }
    };
    let index = Cell::new(0usize);
    let object = ObjectData::plain();
    let next = native_fn("next", move |_interp, _this, _args| {
        let i = index.get();
        if i < elements.len() {
            index.set(i + 1);
            Ok(coroutine::step_result(elements[i].clone(), false))
        } else {
            Ok(coroutine::step_result(Value::Undefined, true))
        }
    });
    object
        .props
        .borrow_mut()
        .insert(PropKey::Name("next".to_string()), next);
    Ok(Value::Object(object))
}

/// Acquire an iterator for a value via the well-known-symbol protocol.
pub fn get_iterator(
    interp: &mut Interpreter,
    value: &Value,
    is_async: bool,
) -> EvalResult<Value> {
    let symbol = if is_async {
        SYMBOL_ASYNC_ITERATOR
    } else {
        SYMBOL_ITERATOR
    };
    let mut method = symbol_lookup(interp, value, symbol)?;
    if is_async && matches!(method, Value::Undefined) {
        // An async iteration can fall back to the sync protocol.
        method = symbol_lookup(interp, value, SYMBOL_ITERATOR)?;
    }
    match method {
        Value::Undefined | Value::Null => Err(interp.throw_type_error(format!(
            "{} is not iterable",
            ops::to_display_string(value)
        ))),
        method => interp.call_value(&method, value.clone(), Vec::new()),
    }
}

/// One protocol step: `iterator.next(sent)`.
pub fn iterator_next(
    interp: &mut Interpreter,
    iterator: &Value,
    sent: Value,
) -> EvalResult<Value> {
    match iterator {
        Value::Generator(generator) => coroutine::generator_next(interp, generator, sent),
        _ => {
            let next = interp.get_property(iterator, "next")?;
            interp.call_value(&next, iterator.clone(), vec![sent])
        }
    }
}

/// Split `{value, done}` out of a step object.
pub fn step_parts(interp: &mut Interpreter, step: &Value) -> EvalResult<(Value, bool)> {
    let value = interp.get_property(step, "value")?;
    let done = interp.get_property(step, "done")?;
    Ok((value, ops::is_truthy(&done)))
}

/// Spread a value's elements into a buffer (array spread, call spread).
pub fn spread_into(
    interp: &mut Interpreter,
    value: &Value,
    out: &mut Vec<Value>,
) -> EvalResult<()> {
    match value {
        Value::Array(items) => {
            out.extend(items.borrow().iter().cloned());
            Ok(())
        }
        Value::Str(text) => {
            out.extend(text.chars().map(|c| Value::string(c.to_string())));
            Ok(())
        }
        _ => {
            let iterator = get_iterator(interp, value, false)?;
            loop {
                let step = iterator_next(interp, &iterator, Value::Undefined)?;
                let (item, done) = step_parts(interp, &step)?;
                if done {
                    return Ok(());
                }
                out.push(item);
            }
        }
    }
}

/// Enumerable string keys for `for...in`.
pub fn enumerable_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(data) => data
            .props
            .borrow()
            .keys()
            .filter_map(|key| match key {
                PropKey::Name(name) => Some(name.clone()),
                PropKey::Symbol(_) => None,
            })
            .collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

