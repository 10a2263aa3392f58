//! Promise plumbing: settlement and the microtask handoff.
//!
//! Reactions attached to a pending promise run as microtasks once it
//! settles, drained in FIFO order by the scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use crate::interp::Interpreter;
use crate::value::{PromiseState, PromiseStatus, Reaction, Value};

impl Interpreter {
    /// Resolve with a value; resolving with a promise chains onto it.
    pub fn resolve_promise(&mut self, promise: &Rc<RefCell<PromiseState>>, value: Value) {
        if let Value::Promise(inner) = &value {
            if Rc::ptr_eq(inner, promise) {
                let error = self.make_error("TypeError", "Chaining cycle detected");
                self.settle(promise, Err(error));
                return;
            }
            let chained = Rc::clone(promise);
            self.on_settle(
                inner,
                Box::new(move |interp, result| {
                    interp.settle(&chained, result);
                }),
            );
            return;
        }
        self.settle(promise, Ok(value));
    }

    pub fn reject_promise(&mut self, promise: &Rc<RefCell<PromiseState>>, error: Value) {
        self.settle(promise, Err(error));
    }

    fn settle(&mut self, promise: &Rc<RefCell<PromiseState>>, result: Result<Value, Value>) {
        let reactions = {
            let mut state = promise.borrow_mut();
            if !matches!(state.status, PromiseStatus::Pending) {
                return;
            }
            state.status = match &result {
                Ok(value) => PromiseStatus::Fulfilled(value.clone()),
                Err(error) => PromiseStatus::Rejected(error.clone()),
            };
            std::mem::take(&mut state.reactions)
        };
        for reaction in reactions {
            let result = result.clone();
            self.enqueue(Box::new(move |interp| reaction(interp, result)));
        }
    }

    /// Attach a reaction; fires as a microtask if already settled.
    pub fn on_settle(&mut self, promise: &Rc<RefCell<PromiseState>>, reaction: Reaction) {
        let settled = {
            let state = promise.borrow();
            match &state.status {
                PromiseStatus::Pending => None,
                PromiseStatus::Fulfilled(value) => Some(Ok(value.clone())),
                PromiseStatus::Rejected(error) => Some(Err(error.clone())),
            }
        };
        match settled {
            Some(result) => {
                self.enqueue(Box::new(move |interp| reaction(interp, result)));
            }
            None => promise.borrow_mut().reactions.push(reaction),
        }
    }
}
