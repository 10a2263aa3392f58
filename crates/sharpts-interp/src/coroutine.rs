//! Driving coroutine machines.
//!
//! A [`CoroFrame`] holds a machine, a persistent environment, the state
//! integer, and a pending-completion slot. Each resume executes the
//! current state's statements by ordinary tree walking and applies the
//! transition; throws, returns, and jumps that cross `finally` regions
//! are routed through the machine's region table with pending replay.

use std::cell::RefCell;
use std::rc::Rc;

use sharpts_lowering::{
    CoroMachine, SENT_VAR, START_STATE, Transition, lower_function_body,
};

use crate::env::{Env, Environment};
use crate::interp::{EvalResult, Interpreter, Signal};
use crate::ops;
use crate::value::*;

pub struct CoroFrame {
    pub machine: Rc<CoroMachine>,
    pub env: Env,
    pub state: usize,
    pub done: bool,
    pub pending: Pending,
}

#[derive(Default)]
pub enum Pending {
    #[default]
    None,
    Return(Value),
    Throw(Value),
    Jump(usize),
}

pub enum StepOutcome {
    Yield(Value),
    Await(Value),
    Done(Value),
}

impl CoroFrame {
    fn new(machine: Rc<CoroMachine>, env: Env) -> Self {
        env.define(SENT_VAR, Value::Undefined);
        CoroFrame {
            machine,
            env,
            state: START_STATE,
            done: false,
            pending: Pending::None,
        }
    }
}

fn lowered_machine(user: &UserFunction) -> Rc<CoroMachine> {
    Rc::clone(user.lowered.get_or_init(|| {
        let body: &[sharpts_parser::ast::Stmt] = match &user.body {
            FnBody::Block(stmts) => stmts,
            FnBody::ArrowExpr(_) => &[],
        };
        Rc::new(lower_function_body(body, user.is_async, user.is_generator))
    }))
}

fn coroutine_env(
    interp: &mut Interpreter,
    user: &UserFunction,
    this: Value,
    args: &[Value],
) -> EvalResult<Env> {
    let env = Environment::child(&user.env);
    interp.bind_params(&user.params, args, &env)?;
    if !user.is_arrow {
        env.define("this", this);
    }
    Ok(env)
}

/// Calling a generator (or async generator) function creates the
/// generator object without running any of the body.
pub fn make_generator(
    interp: &mut Interpreter,
    user: &UserFunction,
    this: Value,
    args: Vec<Value>,
) -> EvalResult<Value> {
    let machine = lowered_machine(user);
    let env = coroutine_env(interp, user, this, &args)?;
    Ok(Value::Generator(Rc::new(RefCell::new(GeneratorState {
        frame: CoroFrame::new(machine, env),
        is_async: user.is_async,
        started: false,
    }))))
}

/// Calling an async function starts its machine immediately and returns
/// the promise for its completion.
pub fn start_async(
    interp: &mut Interpreter,
    user: &UserFunction,
    this: Value,
    args: Vec<Value>,
) -> EvalResult<Value> {
    let machine = lowered_machine(user);
    let env = coroutine_env(interp, user, this, &args)?;
    let frame = Rc::new(RefCell::new(CoroFrame::new(machine, env)));
    let promise = PromiseState::pending();
    drive_async(interp, frame, Rc::clone(&promise));
    Ok(Value::Promise(promise))
}

fn drive_async(
    interp: &mut Interpreter,
    frame: Rc<RefCell<CoroFrame>>,
    promise: Rc<RefCell<PromiseState>>,
) {
    loop {
        let outcome = {
            let mut guard = frame.borrow_mut();
            step(interp, &mut guard)
        };
        match outcome {
            Ok(StepOutcome::Await(value)) => {
                if let Value::Promise(awaited) = value {
                    let frame = Rc::clone(&frame);
                    let promise = Rc::clone(&promise);
                    interp.on_settle(
                        &awaited,
                        Box::new(move |interp, result| match result {
                            Ok(value) => {
                                frame.borrow().env.define(SENT_VAR, value);
                                drive_async(interp, frame, promise);
                            }
                            Err(error) => {
                                let recovered = {
                                    let mut guard = frame.borrow_mut();
                                    dispatch_throw(&mut guard, error)
                                };
                                match recovered {
                                    Ok(()) => drive_async(interp, frame, promise),
                                    Err(unhandled) => {
                                        interp.reject_promise(&promise, unhandled);
                                    }
                                }
                            }
                        }),
                    );
                    return;
                }
                // Awaiting a plain value resumes immediately.
                frame.borrow().env.define(SENT_VAR, value);
            }
            Ok(StepOutcome::Done(value)) => {
                interp.resolve_promise(&promise, value);
                return;
            }
            Ok(StepOutcome::Yield(_)) => {
                // A plain async function has no yields; defensive stop.
                interp.resolve_promise(&promise, Value::Undefined);
                return;
            }
            Err(error) => {
                interp.reject_promise(&promise, error);
                return;
            }
        }
    }
}

// =============================================================================
// The step loop
// =============================================================================

/// Run the machine until it yields, awaits, or completes. The error
/// variant is an exception that escaped every region.
pub fn step(interp: &mut Interpreter, frame: &mut CoroFrame) -> Result<StepOutcome, Value> {
    loop {
        if frame.done {
            return Ok(StepOutcome::Done(Value::Undefined));
        }
        let machine = Rc::clone(&frame.machine);
        let state = &machine.states[frame.state];

        let mut failed = None;
        for stmt in &state.stmts {
            match interp.exec_stmt(stmt, &frame.env) {
                Ok(()) => {}
                Err(Signal::Throw(error)) => {
                    failed = Some(SignalKind::Throw(error));
                    break;
                }
                Err(Signal::Return(value)) => {
                    failed = Some(SignalKind::Return(value));
                    break;
                }
                Err(Signal::Break(_) | Signal::Continue(_)) => break,
            }
        }
        if let Some(kind) = failed {
            match kind {
                SignalKind::Throw(error) => {
                    dispatch_throw(frame, error)?;
                    continue;
                }
                SignalKind::Return(value) => {
                    match route_return(frame, value) {
                        Some(value) => {
                            frame.done = true;
                            return Ok(StepOutcome::Done(value));
                        }
                        None => continue,
                    }
                }
            }
        }

        match state.transition.clone() {
            Transition::Jump(target) => {
                route_jump(&machine, frame, target);
            }
            Transition::Branch {
                cond,
                then_state,
                else_state,
            } => match interp.eval_expr(&cond, &frame.env) {
                Ok(value) => {
                    frame.state = if ops::is_truthy(&value) {
                        then_state
                    } else {
                        else_state
                    };
                }
                Err(Signal::Throw(error)) => dispatch_throw(frame, error)?,
                Err(_) => {}
            },
            Transition::Yield { value, resume } => {
                match interp.eval_expr(&value, &frame.env) {
                    Ok(value) => {
                        frame.state = resume;
                        return Ok(StepOutcome::Yield(value));
                    }
                    Err(Signal::Throw(error)) => dispatch_throw(frame, error)?,
                    Err(_) => {}
                }
            }
            Transition::Await { value, resume } => {
                match interp.eval_expr(&value, &frame.env) {
                    Ok(value) => {
                        frame.state = resume;
                        return Ok(StepOutcome::Await(value));
                    }
                    Err(Signal::Throw(error)) => dispatch_throw(frame, error)?,
                    Err(_) => {}
                }
            }
            Transition::Return(argument) => {
                let value = match argument {
                    Some(expr) => match interp.eval_expr(&expr, &frame.env) {
                        Ok(value) => value,
                        Err(Signal::Throw(error)) => {
                            dispatch_throw(frame, error)?;
                            continue;
                        }
                        Err(_) => Value::Undefined,
                    },
                    None => Value::Undefined,
                };
                match route_return(frame, value) {
                    Some(value) => {
                        frame.done = true;
                        return Ok(StepOutcome::Done(value));
                    }
                    None => {}
                }
            }
            Transition::FinallyEnd { region } => {
                if let Some(outcome) = finally_end(&machine, frame, region)? {
                    return Ok(outcome);
                }
            }
        }
    }
}

enum SignalKind {
    Throw(Value),
    Return(Value),
}

/// Dispatch a raised value through the region table: nearest catch
/// wins; intervening finallys run with a pending rethrow. The error
/// variant escapes the machine.
pub fn dispatch_throw(frame: &mut CoroFrame, error: Value) -> Result<(), Value> {
    let machine = Rc::clone(&frame.machine);
    let mut region_idx = machine.states[frame.state].handler;
    while let Some(idx) = region_idx {
        let region = &machine.handlers[idx];
        if let Some(catch_state) = region.catch_state {
            if let Some(var) = &region.catch_var {
                frame.env.define(var, error);
            }
            frame.state = catch_state;
            return Ok(());
        }
        if let Some(finally_state) = region.finally_state {
            frame.pending = Pending::Throw(error);
            frame.state = finally_state;
            return Ok(());
        }
        region_idx = region.parent;
    }
    frame.done = true;
    Err(error)
}

/// Route a return through enclosing finallys. `Some(value)` means the
/// machine completes now.
pub fn route_return(frame: &mut CoroFrame, value: Value) -> Option<Value> {
    let machine = Rc::clone(&frame.machine);
    let mut region_idx = machine.states[frame.state].handler;
    while let Some(idx) = region_idx {
        let region = &machine.handlers[idx];
        if let Some(finally_state) = region.finally_state {
            frame.pending = Pending::Return(value);
            frame.state = finally_state;
            return None;
        }
        region_idx = region.parent;
    }
    Some(value)
}

/// Jump, running any finally blocks of regions being exited.
fn route_jump(machine: &CoroMachine, frame: &mut CoroFrame, target: usize) {
    let target_chain = machine.handler_chain(target);
    let mut region_idx = machine.states[frame.state].handler;
    while let Some(idx) = region_idx {
        if target_chain.contains(&idx) {
            break;
        }
        let region = &machine.handlers[idx];
        if let Some(finally_state) = region.finally_state {
            frame.pending = Pending::Jump(target);
            frame.state = finally_state;
            return;
        }
        region_idx = region.parent;
    }
    frame.state = target;
}

/// Replay the pending completion at the end of a finally block.
fn finally_end(
    machine: &CoroMachine,
    frame: &mut CoroFrame,
    region: usize,
) -> Result<Option<StepOutcome>, Value> {
    let pending = std::mem::take(&mut frame.pending);
    let parent = machine.handlers[region].parent;
    match pending {
        Pending::None => {
            frame.state = machine.handlers[region].exit_state;
            Ok(None)
        }
        Pending::Jump(target) => {
            let target_chain = machine.handler_chain(target);
            let mut region_idx = parent;
            while let Some(idx) = region_idx {
                if target_chain.contains(&idx) {
                    break;
                }
                let outer = &machine.handlers[idx];
                if let Some(finally_state) = outer.finally_state {
                    frame.pending = Pending::Jump(target);
                    frame.state = finally_state;
                    return Ok(None);
                }
                region_idx = outer.parent;
            }
            frame.state = target;
            Ok(None)
        }
        Pending::Return(value) => {
            let mut region_idx = parent;
            while let Some(idx) = region_idx {
                let outer = &machine.handlers[idx];
                if let Some(finally_state) = outer.finally_state {
                    frame.pending = Pending::Return(value);
                    frame.state = finally_state;
                    return Ok(None);
                }
                region_idx = outer.parent;
            }
            frame.done = true;
            Ok(Some(StepOutcome::Done(value)))
        }
        Pending::Throw(error) => {
            let mut region_idx = parent;
            while let Some(idx) = region_idx {
                let outer = &machine.handlers[idx];
                if let Some(catch_state) = outer.catch_state {
                    if let Some(var) = &outer.catch_var {
                        frame.env.define(var, error);
                    }
                    frame.state = catch_state;
                    return Ok(None);
                }
                if let Some(finally_state) = outer.finally_state {
                    frame.pending = Pending::Throw(error);
                    frame.state = finally_state;
                    return Ok(None);
                }
                region_idx = outer.parent;
            }
            frame.done = true;
            Err(error)
        }
    }
}

// =============================================================================
// Generator protocol
// =============================================================================

/// Build an iterator-result object `{value, done}`.
pub fn step_result(value: Value, done: bool) -> Value {
    let object = ObjectData::plain();
    object
        .props
        .borrow_mut()
        .insert(PropKey::Name("value".to_string()), value);
    object
        .props
        .borrow_mut()
        .insert(PropKey::Name("done".to_string()), Value::Bool(done));
    Value::Object(object)
}

pub fn generator_next(
    interp: &mut Interpreter,
    generator: &Rc<RefCell<GeneratorState>>,
    sent: Value,
) -> EvalResult<Value> {
    let is_async = generator.borrow().is_async;
    if is_async {
        return Ok(async_generator_step(interp, generator, AsyncResume::Next(sent)));
    }
    let mut guard = generator
        .try_borrow_mut()
        .map_err(|_| interp.throw_type_error("Generator is already running"))?;
    if guard.frame.done {
        return Ok(step_result(Value::Undefined, true));
    }
    guard.started = true;
    guard.frame.env.define(SENT_VAR, sent);
    match step(interp, &mut guard.frame) {
        Ok(StepOutcome::Yield(value)) => Ok(step_result(value, false)),
        Ok(StepOutcome::Done(value)) => Ok(step_result(value, true)),
        Ok(StepOutcome::Await(_)) => {
            Err(interp.throw_type_error("await is not valid in a synchronous generator"))
        }
        Err(error) => Err(Signal::Throw(error)),
    }
}

pub fn generator_return(
    interp: &mut Interpreter,
    generator: &Rc<RefCell<GeneratorState>>,
    value: Value,
) -> EvalResult<Value> {
    let mut guard = generator
        .try_borrow_mut()
        .map_err(|_| interp.throw_type_error("Generator is already running"))?;
    if guard.frame.done || !guard.started {
        guard.frame.done = true;
        return Ok(step_result(value, true));
    }
    // Route the return through any active finally regions, then run to
    // the next suspension or completion.
    match route_return(&mut guard.frame, value) {
        Some(value) => {
            guard.frame.done = true;
            Ok(step_result(value, true))
        }
        None => match step(interp, &mut guard.frame) {
            Ok(StepOutcome::Yield(value)) => Ok(step_result(value, false)),
            Ok(StepOutcome::Done(value)) => Ok(step_result(value, true)),
            Ok(StepOutcome::Await(_)) => {
                Err(interp.throw_type_error("await is not valid in a synchronous generator"))
            }
            Err(error) => Err(Signal::Throw(error)),
        },
    }
}

pub fn generator_throw(
    interp: &mut Interpreter,
    generator: &Rc<RefCell<GeneratorState>>,
    error: Value,
) -> EvalResult<Value> {
    let mut guard = generator
        .try_borrow_mut()
        .map_err(|_| interp.throw_type_error("Generator is already running"))?;
    if guard.frame.done || !guard.started {
        guard.frame.done = true;
        return Err(Signal::Throw(error));
    }
    match dispatch_throw(&mut guard.frame, error) {
        Err(unhandled) => Err(Signal::Throw(unhandled)),
        Ok(()) => match step(interp, &mut guard.frame) {
            Ok(StepOutcome::Yield(value)) => Ok(step_result(value, false)),
            Ok(StepOutcome::Done(value)) => Ok(step_result(value, true)),
            Ok(StepOutcome::Await(_)) => {
                Err(interp.throw_type_error("await is not valid in a synchronous generator"))
            }
            Err(error) => Err(Signal::Throw(error)),
        },
    }
}

// =============================================================================
// Async generators
// =============================================================================

enum AsyncResume {
    Next(Value),
    Continue,
}

/// One `next()` of an async generator: a promise that settles with the
/// `{value, done}` step, awaits driven transparently in between.
fn async_generator_step(
    interp: &mut Interpreter,
    generator: &Rc<RefCell<GeneratorState>>,
    resume: AsyncResume,
) -> Value {
    let promise = PromiseState::pending();
    drive_async_generator(interp, Rc::clone(generator), Rc::clone(&promise), resume);
    Value::Promise(promise)
}

fn drive_async_generator(
    interp: &mut Interpreter,
    generator: Rc<RefCell<GeneratorState>>,
    step_promise: Rc<RefCell<PromiseState>>,
    resume: AsyncResume,
) {
    {
        let Ok(mut guard) = generator.try_borrow_mut() else {
            let error = interp.make_error("TypeError", "Generator is already running");
            interp.reject_promise(&step_promise, error);
            return;
        };
        if guard.frame.done {
            interp.resolve_promise(&step_promise, step_result(Value::Undefined, true));
            return;
        }
        guard.started = true;
        if let AsyncResume::Next(sent) = resume {
            guard.frame.env.define(SENT_VAR, sent);
        }
    }
    loop {
        let outcome = {
            let mut guard = generator.borrow_mut();
            step(interp, &mut guard.frame)
        };
        match outcome {
            Ok(StepOutcome::Yield(value)) => {
                interp.resolve_promise(&step_promise, step_result(value, false));
                return;
            }
            Ok(StepOutcome::Done(value)) => {
                interp.resolve_promise(&step_promise, step_result(value, true));
                return;
            }
            Ok(StepOutcome::Await(value)) => {
                if let Value::Promise(awaited) = value {
                    let generator = Rc::clone(&generator);
                    let step_promise = Rc::clone(&step_promise);
                    interp.on_settle(
                        &awaited,
                        Box::new(move |interp, result| match result {
                            Ok(value) => {
                                generator.borrow().frame.env.define(SENT_VAR, value);
                                drive_async_generator(
                                    interp,
                                    generator,
                                    step_promise,
                                    AsyncResume::Continue,
                                );
                            }
                            Err(error) => {
                                let recovered = {
                                    let mut guard = generator.borrow_mut();
                                    dispatch_throw(&mut guard.frame, error)
                                };
                                match recovered {
                                    Ok(()) => drive_async_generator(
                                        interp,
                                        generator,
                                        step_promise,
                                        AsyncResume::Continue,
                                    ),
                                    Err(unhandled) => {
                                        interp.reject_promise(&step_promise, unhandled);
                                    }
                                }
                            }
                        }),
                    );
                    return;
                }
                let guard = generator.borrow();
                guard.frame.env.define(SENT_VAR, value);
            }
            Err(error) => {
                interp.reject_promise(&step_promise, error);
                return;
            }
        }
    }
}
