//! Runtime values.
//!
//! Values are a tagged union over reference-counted payloads. Identity
//! (for frozen/sealed tables and strict equality of objects) is the
//! payload allocation.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use rustc_hash::FxHashMap;
use sharpts_parser::ast::{Expr, Param, Stmt};
use sharpts_lowering::CoroMachine;

use crate::env::Env;
use crate::interp::Interpreter;

/// Well-known symbols are small fixed ids; user symbols count upward.
pub type SymbolId = u32;

pub const SYMBOL_ITERATOR: SymbolId = 1;
pub const SYMBOL_ASYNC_ITERATOR: SymbolId = 2;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(Rc<BigInt>),
    Str(Rc<str>),
    Symbol(SymbolId),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<ObjectData>),
    Function(Rc<FunctionValue>),
    Class(Rc<ClassValue>),
    Promise(Rc<RefCell<PromiseState>>),
    Generator(Rc<RefCell<GeneratorState>>),
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(text.as_ref()))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Array(_) | Value::Object(_) | Value::Promise(_) | Value::Generator(_) => {
                "object"
            }
            Value::Function(_) | Value::Class(_) => "function",
        }
    }

    /// Identity pointer for the frozen/sealed tables and strict
    /// equality of reference values.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Array(cells) => Some(Rc::as_ptr(cells) as usize),
            Value::Object(data) => Some(Rc::as_ptr(data) as usize),
            Value::Function(f) => Some(Rc::as_ptr(f) as usize),
            Value::Class(c) => Some(Rc::as_ptr(c) as usize),
            Value::Promise(p) => Some(Rc::as_ptr(p) as usize),
            Value::Generator(g) => Some(Rc::as_ptr(g) as usize),
            _ => None,
        }
    }
}

/// Property keys: names or symbols.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum PropKey {
    Name(String),
    Symbol(SymbolId),
}

/// A plain object (or class instance when `class` is set).
pub struct ObjectData {
    pub props: RefCell<IndexMap<PropKey, Value>>,
    pub class: Option<Rc<ClassValue>>,
    /// Object-literal accessors by property name.
    pub accessors: RefCell<FxHashMap<String, AccessorPair>>,
}

#[derive(Default, Clone)]
pub struct AccessorPair {
    pub getter: Option<Rc<FunctionValue>>,
    pub setter: Option<Rc<FunctionValue>>,
}

impl ObjectData {
    pub fn plain() -> Rc<ObjectData> {
        Rc::new(ObjectData {
            props: RefCell::new(IndexMap::new()),
            class: None,
            accessors: RefCell::new(FxHashMap::default()),
        })
    }

    pub fn instance_of(class: Rc<ClassValue>) -> Rc<ObjectData> {
        Rc::new(ObjectData {
            props: RefCell::new(IndexMap::new()),
            class: Some(class),
            accessors: RefCell::new(FxHashMap::default()),
        })
    }
}

/// The body of a user function.
#[derive(Clone)]
pub enum FnBody {
    Block(Rc<Vec<Stmt>>),
    ArrowExpr(Rc<Expr>),
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, Value, &[Value]) -> Result<Value, crate::interp::Signal>>;

pub enum FunctionValue {
    User(UserFunction),
    Native {
        name: &'static str,
        call: NativeFn,
    },
    /// Produced by `bind`: a target with a fixed `this` and leading
    /// arguments.
    Bound {
        target: Rc<FunctionValue>,
        this: Value,
        bound_args: Vec<Value>,
    },
}

pub struct UserFunction {
    pub name: String,
    pub params: Rc<Vec<Param>>,
    pub body: FnBody,
    pub env: Env,
    /// Arrows capture `this` lexically (it lives in `env`); non-arrow
    /// functions bind `this` per call.
    pub is_arrow: bool,
    pub is_async: bool,
    pub is_generator: bool,
    /// Object-literal method shorthand: `this` binds to the owner.
    pub lowered: once_cell::unsync::OnceCell<Rc<CoroMachine>>,
}

/// The runtime representation of a class declaration.
pub struct ClassValue {
    pub name: String,
    pub superclass: Option<Rc<ClassValue>>,
    pub ctor: Option<MethodDef>,
    pub methods: FxHashMap<String, MethodDef>,
    pub getters: FxHashMap<String, MethodDef>,
    pub setters: FxHashMap<String, MethodDef>,
    pub static_props: RefCell<FxHashMap<String, Value>>,
    /// Instance field initializers, run at construction.
    pub field_inits: Vec<(String, Option<Expr>)>,
    /// Closure environment the class body was declared in.
    pub env: Env,
    /// Host-provided constructor (the error classes).
    pub native_ctor: Option<NativeFn>,
}

impl ClassValue {
    pub fn find_method(&self, name: &str) -> Option<(&MethodDef, &ClassValue)> {
        if let Some(method) = self.methods.get(name) {
            return Some((method, self));
        }
        self.superclass
            .as_deref()
            .and_then(|base| base.find_method(name))
    }

    pub fn find_getter(&self, name: &str) -> Option<&MethodDef> {
        self.getters
            .get(name)
            .or_else(|| self.superclass.as_deref().and_then(|b| b.find_getter(name)))
    }

    pub fn find_setter(&self, name: &str) -> Option<&MethodDef> {
        self.setters
            .get(name)
            .or_else(|| self.superclass.as_deref().and_then(|b| b.find_setter(name)))
    }

    pub fn find_static(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.static_props.borrow().get(name) {
            return Some(value.clone());
        }
        self.superclass
            .as_deref()
            .and_then(|base| base.find_static(name))
    }
}

#[derive(Clone)]
pub struct MethodDef {
    pub params: Rc<Vec<Param>>,
    pub body: Rc<Vec<Stmt>>,
    pub is_async: bool,
    pub is_generator: bool,
}

// =============================================================================
// Promises
// =============================================================================

pub type Reaction = Box<dyn FnOnce(&mut Interpreter, Result<Value, Value>)>;

pub enum PromiseStatus {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

pub struct PromiseState {
    pub status: PromiseStatus,
    pub reactions: Vec<Reaction>,
}

impl PromiseState {
    pub fn pending() -> Rc<RefCell<PromiseState>> {
        Rc::new(RefCell::new(PromiseState {
            status: PromiseStatus::Pending,
            reactions: Vec::new(),
        }))
    }
}

// =============================================================================
// Generators
// =============================================================================

pub struct GeneratorState {
    pub frame: crate::coroutine::CoroFrame,
    pub is_async: bool,
    pub started: bool,
}
