//! The evaluator.

use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rustc_hash::FxHashSet;
use sharpts_common::diagnostics::{Diagnostic, DiagnosticCategory};
use sharpts_common::limits;
use sharpts_parser::ast::*;

use crate::builtins;
use crate::coroutine;
use crate::env::{Env, Environment};
use crate::iterator;
use crate::ops;
use crate::value::*;

/// Abrupt completions that thread through statement execution.
pub enum Signal {
    Throw(Value),
    Break(Option<String>),
    Continue(Option<String>),
    Return(Value),
}

pub type EvalResult<T> = Result<T, Signal>;

/// A queued microtask.
pub type Job = Box<dyn FnOnce(&mut Interpreter)>;

pub struct Interpreter {
    pub globals: Env,
    pub microtasks: VecDeque<Job>,
    pub output: Box<dyn Write>,
    /// Identity tables for Object.freeze / Object.seal.
    pub frozen: FxHashSet<usize>,
    pub sealed: FxHashSet<usize>,
    pub call_depth: u32,
    pub strict: bool,
    pub argv: Vec<String>,
}

impl Interpreter {
    pub fn new(output: Box<dyn Write>) -> Self {
        Self::with_argv(output, Vec::new())
    }

    /// Build an interpreter whose `process.argv` is the given vector.
    pub fn with_argv(output: Box<dyn Write>, argv: Vec<String>) -> Self {
        let mut interp = Interpreter {
            globals: Environment::root(),
            microtasks: VecDeque::new(),
            output,
            frozen: FxHashSet::default(),
            sealed: FxHashSet::default(),
            call_depth: 0,
            strict: true,
            argv,
        };
        builtins::install(&mut interp);
        interp
    }

    /// Run a program to completion, draining the microtask queue.
    pub fn run(&mut self, program: &Program) -> Result<(), Diagnostic> {
        tracing::debug!(statements = program.statements.len(), "interpreting program");
        let env = Environment::child(&self.globals);
        let result = self.exec_stmts(&program.statements, &env);
        match result {
            Ok(()) => {}
            Err(Signal::Throw(value)) => {
                return Err(self.runtime_error(&value));
            }
            Err(_) => {}
        }
        self.run_microtasks();
        let _ = self.output.flush();
        Ok(())
    }

    fn runtime_error(&self, value: &Value) -> Diagnostic {
        let message = match value {
            Value::Object(data) => {
                let props = data.props.borrow();
                let name = props
                    .get(&PropKey::Name("name".to_string()))
                    .map(ops::to_display_string)
                    .unwrap_or_else(|| "Error".to_string());
                let message = props
                    .get(&PropKey::Name("message".to_string()))
                    .map(ops::to_display_string)
                    .unwrap_or_default();
                format!("{name}: {message}")
            }
            other => format!("Uncaught {}", ops::to_display_string(other)),
        };
        Diagnostic {
            category: DiagnosticCategory::Runtime,
            code: 0,
            message,
            span: sharpts_common::span::Span::dummy(),
        }
    }

    pub fn run_microtasks(&mut self) {
        while let Some(job) = self.microtasks.pop_front() {
            job(self);
        }
    }

    pub fn enqueue(&mut self, job: Job) {
        self.microtasks.push_back(job);
    }

    /// A thrown error value in the host's shape.
    pub fn make_error(&mut self, name: &str, message: impl Into<String>) -> Value {
        let object = ObjectData::plain();
        object.props.borrow_mut().insert(
            PropKey::Name("name".to_string()),
            Value::string(name),
        );
        object.props.borrow_mut().insert(
            PropKey::Name("message".to_string()),
            Value::string(message.into()),
        );
        Value::Object(object)
    }

    pub fn throw_type_error(&mut self, message: impl Into<String>) -> Signal {
        let error = self.make_error("TypeError", message);
        Signal::Throw(error)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn exec_stmts(&mut self, stmts: &[Stmt], env: &Env) -> EvalResult<()> {
        // Function declarations hoist within their scope.
        for stmt in stmts {
            if let StmtKind::Function(decl) = &stmt.kind {
                if decl.body.is_some() {
                    let function = self.make_function(decl, env);
                    env.define(&decl.name, function);
                }
            }
        }
        for stmt in stmts {
            self.exec_stmt(stmt, env)?;
        }
        Ok(())
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> EvalResult<()> {
        self.exec_stmt_labeled(stmt, env, None)
    }

    fn exec_stmt_labeled(
        &mut self,
        stmt: &Stmt,
        env: &Env,
        label: Option<&str>,
    ) -> EvalResult<()> {
        match &stmt.kind {
            StmtKind::VarDecl { declarations, .. } => {
                for declarator in declarations {
                    let value = match &declarator.init {
                        Some(init) => self.eval_expr(init, env)?,
                        None => Value::Undefined,
                    };
                    env.define(&declarator.name, value);
                }
                Ok(())
            }
            StmtKind::Function(decl) => {
                if decl.body.is_some() && env.get(&decl.name).is_none() {
                    let function = self.make_function(decl, env);
                    env.define(&decl.name, function);
                }
                Ok(())
            }
            StmtKind::Class(decl) => {
                let class = self.make_class(decl, env)?;
                env.define(&decl.name, class);
                Ok(())
            }
            StmtKind::Enum(decl) => {
                let object = self.make_enum(decl, env)?;
                env.define(&decl.name, object);
                Ok(())
            }
            StmtKind::Namespace(decl) => {
                let inner = Environment::child(env);
                self.exec_stmts(&decl.body, &inner)?;
                let object = ObjectData::plain();
                for (name, value) in inner.snapshot() {
                    object
                        .props
                        .borrow_mut()
                        .insert(PropKey::Name(name), value);
                }
                env.define(&decl.name, Value::Object(object));
                Ok(())
            }
            StmtKind::Interface(_)
            | StmtKind::TypeAlias(_)
            | StmtKind::Import(_)
            | StmtKind::ExportNamed { .. }
            | StmtKind::Directive(_)
            | StmtKind::Empty => Ok(()),
            StmtKind::Export(inner) => self.exec_stmt(inner, env),
            StmtKind::Block(stmts) => {
                let inner = Environment::child(env);
                match label {
                    // A label on a block reaches its final statement:
                    // the parser desugars C-style `for` into
                    // `{ init; while ... }`, and the label belongs to
                    // the loop.
                    Some(label) if !stmts.is_empty() => {
                        for stmt in &stmts[..stmts.len() - 1] {
                            self.exec_stmt(stmt, &inner)?;
                        }
                        self.exec_stmt_labeled(&stmts[stmts.len() - 1], &inner, Some(label))
                    }
                    _ => self.exec_stmts(stmts, &inner),
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let test = self.eval_expr(cond, env)?;
                if ops::is_truthy(&test) {
                    self.exec_stmt(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, env)
                } else {
                    Ok(())
                }
            }
            StmtKind::While { cond, body } => loop {
                let test = self.eval_expr(cond, env)?;
                if !ops::is_truthy(&test) {
                    return Ok(());
                }
                match self.exec_stmt(body, env) {
                    Ok(()) => {}
                    Err(Signal::Break(l)) if matches_label(&l, label) => return Ok(()),
                    Err(Signal::Continue(l)) if matches_label(&l, label) => {}
                    Err(signal) => return Err(signal),
                }
            },
            StmtKind::DoWhile { body, cond } => loop {
                match self.exec_stmt(body, env) {
                    Ok(()) => {}
                    Err(Signal::Break(l)) if matches_label(&l, label) => return Ok(()),
                    Err(Signal::Continue(l)) if matches_label(&l, label) => {}
                    Err(signal) => return Err(signal),
                }
                let test = self.eval_expr(cond, env)?;
                if !ops::is_truthy(&test) {
                    return Ok(());
                }
            },
            StmtKind::ForIn {
                binding,
                object,
                body,
                ..
            } => {
                let target = self.eval_expr(object, env)?;
                let keys = iterator::enumerable_keys(&target);
                for key in keys {
                    let inner = Environment::child(env);
                    inner.define(binding, Value::string(&key));
                    match self.exec_stmt(body, &inner) {
                        Ok(()) => {}
                        Err(Signal::Break(l)) if matches_label(&l, label) => return Ok(()),
                        Err(Signal::Continue(l)) if matches_label(&l, label) => {}
                        Err(signal) => return Err(signal),
                    }
                }
                Ok(())
            }
            StmtKind::ForOf {
                binding,
                iterable,
                body,
                is_await,
                ..
            } => {
                let target = self.eval_expr(iterable, env)?;
                let iter = iterator::get_iterator(self, &target, *is_await)?;
                loop {
                    let step = iterator::iterator_next(self, &iter, Value::Undefined)?;
                    let step = if *is_await { self.block_on(step)? } else { step };
                    let (value, done) = iterator::step_parts(self, &step)?;
                    if done {
                        return Ok(());
                    }
                    let inner = Environment::child(env);
                    inner.define(binding, value);
                    match self.exec_stmt(body, &inner) {
                        Ok(()) => {}
                        Err(Signal::Break(l)) if matches_label(&l, label) => return Ok(()),
                        Err(Signal::Continue(l)) if matches_label(&l, label) => {}
                        Err(signal) => return Err(signal),
                    }
                }
            }
            StmtKind::Return(argument) => {
                let value = match argument {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Undefined,
                };
                Err(Signal::Return(value))
            }
            StmtKind::Break(label) => Err(Signal::Break(label.clone())),
            StmtKind::Continue(label) => Err(Signal::Continue(label.clone())),
            StmtKind::Throw(value) => {
                let value = self.eval_expr(value, env)?;
                Err(Signal::Throw(value))
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => {
                let inner = Environment::child(env);
                let mut outcome = self.exec_stmts(block, &inner);
                if let (Err(Signal::Throw(error)), Some(catch)) = (&outcome, catch) {
                    let catch_env = Environment::child(env);
                    if let Some(param) = &catch.param {
                        catch_env.define(param, error.clone());
                    }
                    outcome = self.exec_stmts(&catch.body, &catch_env);
                }
                if let Some(finally) = finally {
                    let finally_env = Environment::child(env);
                    // An abrupt completion in `finally` overrides the
                    // pending one.
                    self.exec_stmts(finally, &finally_env)?;
                }
                outcome
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                let subject = self.eval_expr(discriminant, env)?;
                let inner = Environment::child(env);
                let mut matched = cases.len();
                for (i, case) in cases.iter().enumerate() {
                    if let Some(test) = &case.test {
                        let test = self.eval_expr(test, &inner)?;
                        if ops::strict_equals(&subject, &test) {
                            matched = i;
                            break;
                        }
                    }
                }
                if matched == cases.len() {
                    if let Some(default) = cases.iter().position(|c| c.test.is_none()) {
                        matched = default;
                    }
                }
                for case in cases.iter().skip(matched) {
                    match self.exec_stmts(&case.body, &inner) {
                        Ok(()) => {}
                        Err(Signal::Break(l)) if matches_label(&l, label) => return Ok(()),
                        Err(signal) => return Err(signal),
                    }
                }
                Ok(())
            }
            StmtKind::Labeled { label, body } => {
                match self.exec_stmt_labeled(body, env, Some(label)) {
                    Err(Signal::Break(Some(l))) if l == *label => Ok(()),
                    other => other,
                }
            }
            StmtKind::Expr(expr) => {
                self.eval_expr(expr, env)?;
                Ok(())
            }
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn eval_expr(&mut self, expr: &Expr, env: &Env) -> EvalResult<Value> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(self.eval_literal(lit)),
            ExprKind::Ident(name) => match env.get(name) {
                Some(value) => Ok(value),
                None => {
                    let error = self.make_error("ReferenceError", format!("{name} is not defined"));
                    Err(Signal::Throw(error))
                }
            },
            ExprKind::This => Ok(env.get("this").unwrap_or(Value::Undefined)),
            ExprKind::Super => Ok(Value::Undefined),
            ExprKind::Paren(inner) => self.eval_expr(inner, env),
            ExprKind::Template { quasis, exprs } => {
                let mut text = quasis[0].clone();
                for (i, part) in exprs.iter().enumerate() {
                    let value = self.eval_expr(part, env)?;
                    text.push_str(&ops::to_display_string(&value));
                    text.push_str(&quasis[i + 1]);
                }
                Ok(Value::string(text))
            }
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, env),
            ExprKind::Logical { op, left, right } => {
                let lhs = self.eval_expr(left, env)?;
                match op {
                    LogicalOp::And => {
                        if ops::is_truthy(&lhs) {
                            self.eval_expr(right, env)
                        } else {
                            Ok(lhs)
                        }
                    }
                    LogicalOp::Or => {
                        if ops::is_truthy(&lhs) {
                            Ok(lhs)
                        } else {
                            self.eval_expr(right, env)
                        }
                    }
                    LogicalOp::Nullish => {
                        if matches!(lhs, Value::Null | Value::Undefined) {
                            self.eval_expr(right, env)
                        } else {
                            Ok(lhs)
                        }
                    }
                }
            }
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand, env),
            ExprKind::Update {
                op,
                prefix,
                operand,
            } => self.eval_update(*op, *prefix, operand, env),
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, env),
            ExprKind::Conditional {
                cond,
                consequent,
                alternate,
            } => {
                let test = self.eval_expr(cond, env)?;
                if ops::is_truthy(&test) {
                    self.eval_expr(consequent, env)
                } else {
                    self.eval_expr(alternate, env)
                }
            }
            ExprKind::Sequence(parts) => {
                let mut last = Value::Undefined;
                for part in parts {
                    last = self.eval_expr(part, env)?;
                }
                Ok(last)
            }
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    if let ExprKind::Spread(inner) = &element.kind {
                        let spread = self.eval_expr(inner, env)?;
                        iterator::spread_into(self, &spread, &mut values)?;
                    } else {
                        values.push(self.eval_expr(element, env)?);
                    }
                }
                Ok(Value::Array(Rc::new(std::cell::RefCell::new(values))))
            }
            ExprKind::Object(props) => self.eval_object_literal(props, env),
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                // `super.m` resolves on the superclass with the current
                // `this`; handled at call sites, and for reads here.
                if matches!(object.kind, ExprKind::Super) {
                    let (method, this) = self.resolve_super_member(property, env)?;
                    let _ = this;
                    return Ok(method);
                }
                let receiver = self.eval_expr(object, env)?;
                if *optional && matches!(receiver, Value::Null | Value::Undefined) {
                    return Ok(Value::Undefined);
                }
                self.get_property(&receiver, property)
            }
            ExprKind::Index {
                object,
                index,
                optional,
            } => {
                let receiver = self.eval_expr(object, env)?;
                if *optional && matches!(receiver, Value::Null | Value::Undefined) {
                    return Ok(Value::Undefined);
                }
                let key = self.eval_expr(index, env)?;
                self.get_index(&receiver, &key)
            }
            ExprKind::Call {
                callee,
                args,
                optional,
                ..
            } => self.eval_call(callee, args, *optional, env),
            ExprKind::New { callee, args, .. } => self.eval_new(callee, args, env),
            ExprKind::Arrow {
                params,
                body,
                is_async,
                ..
            } => {
                let fn_body = match body {
                    ArrowBody::Expr(expr) => FnBody::ArrowExpr(Rc::new(expr.as_ref().clone())),
                    ArrowBody::Block(stmts) => FnBody::Block(Rc::new(stmts.clone())),
                };
                Ok(Value::Function(Rc::new(FunctionValue::User(UserFunction {
                    name: String::new(),
                    params: Rc::new(params.clone()),
                    body: fn_body,
                    env: Rc::clone(env),
                    is_arrow: true,
                    is_async: *is_async,
                    is_generator: false,
                    lowered: once_cell::unsync::OnceCell::new(),
                }))))
            }
            ExprKind::FunctionExpr { name, parts } => {
                let function = Value::Function(Rc::new(FunctionValue::User(UserFunction {
                    name: name.clone().unwrap_or_default(),
                    params: Rc::new(parts.params.clone()),
                    body: FnBody::Block(Rc::new(parts.body.clone().unwrap_or_default())),
                    env: Rc::clone(env),
                    is_arrow: false,
                    is_async: parts.is_async,
                    is_generator: parts.is_generator,
                    lowered: once_cell::unsync::OnceCell::new(),
                })));
                Ok(function)
            }
            ExprKind::ClassExpr(decl) => self.make_class(decl, env),
            ExprKind::Spread(inner) => self.eval_expr(inner, env),
            ExprKind::TypeAssertion { expr: inner, .. } | ExprKind::NonNull(inner) => {
                self.eval_expr(inner, env)
            }
            ExprKind::Await(operand) => {
                // Suspensions inside coroutine bodies were lowered away;
                // a remaining await is a top-level one, driven by
                // draining the microtask queue.
                let value = self.eval_expr(operand, env)?;
                self.block_on(value)
            }
            ExprKind::Yield { .. } => {
                Err(self.throw_type_error("yield is only valid inside a generator body"))
            }
        }
    }

    fn eval_literal(&mut self, lit: &Lit) -> Value {
        match lit {
            Lit::Number(n) => Value::Number(*n),
            Lit::Str(s) => Value::string(s),
            Lit::Bool(b) => Value::Bool(*b),
            Lit::Null => Value::Null,
            Lit::Undefined => Value::Undefined,
            Lit::BigInt(b) => Value::BigInt(Rc::new(b.clone())),
            Lit::Regex { pattern, flags } => {
                let object = ObjectData::plain();
                object.props.borrow_mut().insert(
                    PropKey::Name("source".to_string()),
                    Value::string(pattern),
                );
                object
                    .props
                    .borrow_mut()
                    .insert(PropKey::Name("flags".to_string()), Value::string(flags));
                Value::Object(object)
            }
        }
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        env: &Env,
    ) -> EvalResult<Value> {
        let lhs = self.eval_expr(left, env)?;
        let rhs = self.eval_expr(right, env)?;
        self.apply_binary(op, lhs, rhs)
    }

    pub fn apply_binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> EvalResult<Value> {
        use BinaryOp::*;
        match op {
            Add => match (&lhs, &rhs) {
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    let mut text = ops::to_display_string(&lhs);
                    text.push_str(&ops::to_display_string(&rhs));
                    Ok(Value::string(text))
                }
                (Value::BigInt(a), Value::BigInt(b)) => {
                    Ok(Value::BigInt(Rc::new(a.as_ref() + b.as_ref())))
                }
                (Value::BigInt(_), _) | (_, Value::BigInt(_)) => {
                    Err(self.throw_type_error("Cannot mix BigInt and other types"))
                }
                _ => Ok(Value::Number(ops::to_number(&lhs) + ops::to_number(&rhs))),
            },
            Sub | Mul | Div | Rem | Exp => match (&lhs, &rhs) {
                (Value::BigInt(a), Value::BigInt(b)) => {
                    self.bigint_arith(op, a.as_ref(), b.as_ref())
                }
                (Value::BigInt(_), _) | (_, Value::BigInt(_)) => {
                    Err(self.throw_type_error("Cannot mix BigInt and other types"))
                }
                _ => {
                    let a = ops::to_number(&lhs);
                    let b = ops::to_number(&rhs);
                    Ok(Value::Number(match op {
                        Sub => a - b,
                        Mul => a * b,
                        Div => a / b,
                        Rem => a % b,
                        Exp => a.powf(b),
                        _ => unreachable!(),
                    }))
                }
            },
            Shl | Shr | UShr | BitAnd | BitOr | BitXor => match (&lhs, &rhs) {
                (Value::BigInt(a), Value::BigInt(b)) => {
                    self.bigint_bitwise(op, a.as_ref(), b.as_ref())
                }
                _ => {
                    let a = ops::to_int32(&lhs);
                    let shift = ops::to_uint32(&rhs) & 31;
                    Ok(Value::Number(match op {
                        Shl => f64::from(a << shift),
                        Shr => f64::from(a >> shift),
                        UShr => f64::from((a as u32) >> shift),
                        BitAnd => f64::from(a & ops::to_int32(&rhs)),
                        BitOr => f64::from(a | ops::to_int32(&rhs)),
                        BitXor => f64::from(a ^ ops::to_int32(&rhs)),
                        _ => unreachable!(),
                    }))
                }
            },
            Lt | LtEq | Gt | GtEq => {
                let ordering = match (&lhs, &rhs) {
                    (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                    (Value::BigInt(a), Value::BigInt(b)) => a.partial_cmp(b),
                    _ => ops::to_number(&lhs).partial_cmp(&ops::to_number(&rhs)),
                };
                Ok(Value::Bool(match (op, ordering) {
                    (_, None) => false,
                    (Lt, Some(o)) => o == std::cmp::Ordering::Less,
                    (LtEq, Some(o)) => o != std::cmp::Ordering::Greater,
                    (Gt, Some(o)) => o == std::cmp::Ordering::Greater,
                    (GtEq, Some(o)) => o != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                }))
            }
            Eq => Ok(Value::Bool(ops::loose_equals(&lhs, &rhs))),
            Neq => Ok(Value::Bool(!ops::loose_equals(&lhs, &rhs))),
            StrictEq => Ok(Value::Bool(ops::strict_equals(&lhs, &rhs))),
            StrictNeq => Ok(Value::Bool(!ops::strict_equals(&lhs, &rhs))),
            Instanceof => match &rhs {
                Value::Class(class) => Ok(Value::Bool(self.is_instance_of(&lhs, class))),
                Value::Function(_) => Ok(Value::Bool(false)),
                _ => Err(self.throw_type_error(
                    "Right-hand side of 'instanceof' is not callable",
                )),
            },
            In => {
                let key = ops::to_display_string(&lhs);
                Ok(Value::Bool(self.has_property(&rhs, &key)))
            }
        }
    }

    fn bigint_arith(&mut self, op: BinaryOp, a: &BigInt, b: &BigInt) -> EvalResult<Value> {
        use BinaryOp::*;
        let zero = BigInt::from(0);
        let result = match op {
            Sub => a - b,
            Mul => a * b,
            Div => {
                if *b == zero {
                    return Err(self.throw_type_error("Division by zero"));
                }
                a / b
            }
            Rem => {
                if *b == zero {
                    return Err(self.throw_type_error("Division by zero"));
                }
                a % b
            }
            Exp => {
                let exponent = b
                    .to_u32()
                    .ok_or_else(|| self.throw_type_error("Exponent must not be negative"))?;
                a.pow(exponent)
            }
            _ => unreachable!(),
        };
        Ok(Value::BigInt(Rc::new(result)))
    }

    fn bigint_bitwise(&mut self, op: BinaryOp, a: &BigInt, b: &BigInt) -> EvalResult<Value> {
        use BinaryOp::*;
        let result = match op {
            BitAnd => a & b,
            BitOr => a | b,
            BitXor => a ^ b,
            Shl => {
                let shift = b
                    .to_u64()
                    .ok_or_else(|| self.throw_type_error("Invalid shift amount"))?;
                a << shift
            }
            Shr => {
                let shift = b
                    .to_u64()
                    .ok_or_else(|| self.throw_type_error("Invalid shift amount"))?;
                a >> shift
            }
            UShr => {
                return Err(
                    self.throw_type_error("BigInts have no unsigned right shift")
                );
            }
            _ => unreachable!(),
        };
        Ok(Value::BigInt(Rc::new(result)))
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: &Env) -> EvalResult<Value> {
        if op == UnaryOp::Typeof {
            // typeof tolerates unresolved identifiers.
            if let ExprKind::Ident(name) = &operand.kind {
                if env.get(name).is_none() {
                    return Ok(Value::string("undefined"));
                }
            }
            let value = self.eval_expr(operand, env)?;
            return Ok(Value::string(value.type_of()));
        }
        if op == UnaryOp::Delete {
            return self.eval_delete(operand, env);
        }
        let value = self.eval_expr(operand, env)?;
        Ok(match op {
            UnaryOp::Neg => match &value {
                Value::BigInt(b) => Value::BigInt(Rc::new(-(b.as_ref().clone()))),
                _ => Value::Number(-ops::to_number(&value)),
            },
            UnaryOp::Plus => match &value {
                Value::BigInt(_) => {
                    return Err(self.throw_type_error("Cannot convert a BigInt to a number"));
                }
                _ => Value::Number(ops::to_number(&value)),
            },
            UnaryOp::Not => Value::Bool(!ops::is_truthy(&value)),
            UnaryOp::BitNot => match &value {
                Value::BigInt(b) => {
                    // ~x == -(x + 1)
                    let one = BigInt::from(1);
                    Value::BigInt(Rc::new(-(b.as_ref() + one)))
                }
                _ => Value::Number(f64::from(!ops::to_int32(&value))),
            },
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Typeof | UnaryOp::Delete => unreachable!(),
        })
    }

    fn eval_delete(&mut self, operand: &Expr, env: &Env) -> EvalResult<Value> {
        match &operand.kind {
            ExprKind::Member {
                object, property, ..
            } => {
                let receiver = self.eval_expr(object, env)?;
                if let Value::Object(data) = &receiver {
                    if self.write_blocked(&receiver)? {
                        return Ok(Value::Bool(false));
                    }
                    data.props
                        .borrow_mut()
                        .shift_remove(&PropKey::Name(property.clone()));
                }
                Ok(Value::Bool(true))
            }
            ExprKind::Index { object, index, .. } => {
                let receiver = self.eval_expr(object, env)?;
                let key = self.eval_expr(index, env)?;
                if let Value::Object(data) = &receiver {
                    if self.write_blocked(&receiver)? {
                        return Ok(Value::Bool(false));
                    }
                    let prop_key = match &key {
                        Value::Symbol(id) => PropKey::Symbol(*id),
                        other => PropKey::Name(ops::to_display_string(other)),
                    };
                    data.props.borrow_mut().shift_remove(&prop_key);
                }
                Ok(Value::Bool(true))
            }
            _ => Ok(Value::Bool(true)),
        }
    }

    fn eval_update(
        &mut self,
        op: UpdateOp,
        prefix: bool,
        operand: &Expr,
        env: &Env,
    ) -> EvalResult<Value> {
        let old = self.eval_expr(operand, env)?;
        let new = match &old {
            Value::BigInt(b) => {
                let one = BigInt::from(1);
                Value::BigInt(Rc::new(match op {
                    UpdateOp::Inc => b.as_ref() + one,
                    UpdateOp::Dec => b.as_ref() - one,
                }))
            }
            _ => {
                let n = ops::to_number(&old);
                Value::Number(match op {
                    UpdateOp::Inc => n + 1.0,
                    UpdateOp::Dec => n - 1.0,
                })
            }
        };
        self.write_target(operand, new.clone(), env)?;
        Ok(if prefix { new } else { old })
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        env: &Env,
    ) -> EvalResult<Value> {
        let result = match op {
            AssignOp::Assign => self.eval_expr(value, env)?,
            AssignOp::And => {
                let current = self.eval_expr(target, env)?;
                if !ops::is_truthy(&current) {
                    return Ok(current);
                }
                self.eval_expr(value, env)?
            }
            AssignOp::Or => {
                let current = self.eval_expr(target, env)?;
                if ops::is_truthy(&current) {
                    return Ok(current);
                }
                self.eval_expr(value, env)?
            }
            AssignOp::Nullish => {
                let current = self.eval_expr(target, env)?;
                if !matches!(current, Value::Null | Value::Undefined) {
                    return Ok(current);
                }
                self.eval_expr(value, env)?
            }
            _ => {
                let current = self.eval_expr(target, env)?;
                let rhs = self.eval_expr(value, env)?;
                let binary = match op {
                    AssignOp::Add => BinaryOp::Add,
                    AssignOp::Sub => BinaryOp::Sub,
                    AssignOp::Mul => BinaryOp::Mul,
                    AssignOp::Div => BinaryOp::Div,
                    AssignOp::Rem => BinaryOp::Rem,
                    AssignOp::Exp => BinaryOp::Exp,
                    AssignOp::Shl => BinaryOp::Shl,
                    AssignOp::Shr => BinaryOp::Shr,
                    AssignOp::UShr => BinaryOp::UShr,
                    AssignOp::BitAnd => BinaryOp::BitAnd,
                    AssignOp::BitOr => BinaryOp::BitOr,
                    AssignOp::BitXor => BinaryOp::BitXor,
                    _ => unreachable!(),
                };
                self.apply_binary(binary, current, rhs)?
            }
        };
        self.write_target(target, result.clone(), env)?;
        Ok(result)
    }

    fn write_target(&mut self, target: &Expr, value: Value, env: &Env) -> EvalResult<()> {
        match &target.kind {
            ExprKind::Ident(name) => {
                if !env.assign(name, value.clone()) {
                    // Implicit global.
                    self.globals.define(name, value);
                }
                Ok(())
            }
            ExprKind::Member {
                object, property, ..
            } => {
                let receiver = self.eval_expr(object, env)?;
                self.set_property(&receiver, property, value)
            }
            ExprKind::Index { object, index, .. } => {
                let receiver = self.eval_expr(object, env)?;
                let key = self.eval_expr(index, env)?;
                self.set_index(&receiver, &key, value)
            }
            ExprKind::Paren(inner) | ExprKind::NonNull(inner) => {
                self.write_target(inner, value, env)
            }
            _ => Err(self.throw_type_error("Invalid assignment target")),
        }
    }

    fn eval_object_literal(&mut self, props: &[ObjectProp], env: &Env) -> EvalResult<Value> {
        let object = ObjectData::plain();
        for prop in props {
            if let ObjectPropValue::Spread(inner) = &prop.value {
                let source = self.eval_expr(inner, env)?;
                match &source {
                    Value::Object(data) => {
                        let copied: Vec<(PropKey, Value)> = data
                            .props
                            .borrow()
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        for (key, value) in copied {
                            object.props.borrow_mut().insert(key, value);
                        }
                    }
                    Value::Array(items) => {
                        for (i, value) in items.borrow().iter().enumerate() {
                            object
                                .props
                                .borrow_mut()
                                .insert(PropKey::Name(i.to_string()), value.clone());
                        }
                    }
                    _ => {}
                }
                continue;
            }

            let key = match &prop.key {
                PropName::Computed(expr) => {
                    let value = self.eval_expr(expr, env)?;
                    match value {
                        Value::Symbol(id) => PropKey::Symbol(id),
                        other => PropKey::Name(ops::to_display_string(&other)),
                    }
                }
                other => match other.as_static() {
                    Some(name) => PropKey::Name(name),
                    None => continue,
                },
            };

            match &prop.value {
                ObjectPropValue::Value(value) => {
                    let value = self.eval_expr(value, env)?;
                    object.props.borrow_mut().insert(key, value);
                }
                ObjectPropValue::Shorthand => {
                    let PropKey::Name(name) = &key else { continue };
                    let value = match env.get(name) {
                        Some(value) => value,
                        None => {
                            let error = self
                                .make_error("ReferenceError", format!("{name} is not defined"));
                            return Err(Signal::Throw(error));
                        }
                    };
                    object.props.borrow_mut().insert(key, value);
                }
                ObjectPropValue::Method(parts) => {
                    // Object-literal method shorthand: `this` binds to
                    // the owning object at call time through the
                    // receiver.
                    let function = Value::Function(Rc::new(FunctionValue::User(UserFunction {
                        name: String::new(),
                        params: Rc::new(parts.params.clone()),
                        body: FnBody::Block(Rc::new(parts.body.clone().unwrap_or_default())),
                        env: Rc::clone(env),
                        is_arrow: false,
                        is_async: parts.is_async,
                        is_generator: parts.is_generator,
                        lowered: once_cell::unsync::OnceCell::new(),
                    })));
                    object.props.borrow_mut().insert(key, function);
                }
                ObjectPropValue::Getter(body) => {
                    let PropKey::Name(name) = &key else { continue };
                    let getter = Rc::new(FunctionValue::User(UserFunction {
                        name: String::new(),
                        params: Rc::new(Vec::new()),
                        body: FnBody::Block(Rc::new(body.clone().unwrap_or_default())),
                        env: Rc::clone(env),
                        is_arrow: false,
                        is_async: false,
                        is_generator: false,
                        lowered: once_cell::unsync::OnceCell::new(),
                    }));
                    object
                        .accessors
                        .borrow_mut()
                        .entry(name.clone())
                        .or_default()
                        .getter = Some(getter);
                }
                ObjectPropValue::Setter(param, body) => {
                    let PropKey::Name(name) = &key else { continue };
                    let setter = Rc::new(FunctionValue::User(UserFunction {
                        name: String::new(),
                        params: Rc::new(vec![param.clone()]),
                        body: FnBody::Block(Rc::new(body.clone().unwrap_or_default())),
                        env: Rc::clone(env),
                        is_arrow: false,
                        is_async: false,
                        is_generator: false,
                        lowered: once_cell::unsync::OnceCell::new(),
                    }));
                    object
                        .accessors
                        .borrow_mut()
                        .entry(name.clone())
                        .or_default()
                        .setter = Some(setter);
                }
                ObjectPropValue::Spread(_) => unreachable!("handled above"),
            }
        }
        Ok(Value::Object(object))
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        optional: bool,
        env: &Env,
    ) -> EvalResult<Value> {
        // super(...)
        if matches!(callee.kind, ExprKind::Super) {
            let arg_values = self.eval_args(args, env)?;
            return self.call_super_constructor(&arg_values, env);
        }

        // Method calls bind `this` to the receiver.
        let (function, this) = match &callee.kind {
            ExprKind::Member {
                object,
                property,
                optional: member_optional,
            } => {
                if matches!(object.kind, ExprKind::Super) {
                    let (method, this) = self.resolve_super_member(property, env)?;
                    (method, this)
                } else {
                    let receiver = self.eval_expr(object, env)?;
                    if *member_optional && matches!(receiver, Value::Null | Value::Undefined) {
                        return Ok(Value::Undefined);
                    }
                    let method = self.get_property(&receiver, property)?;
                    (method, receiver)
                }
            }
            ExprKind::Index { object, index, .. } => {
                let receiver = self.eval_expr(object, env)?;
                let key = self.eval_expr(index, env)?;
                let method = self.get_index(&receiver, &key)?;
                (method, receiver)
            }
            _ => (self.eval_expr(callee, env)?, Value::Undefined),
        };

        if optional && matches!(function, Value::Null | Value::Undefined) {
            return Ok(Value::Undefined);
        }
        let arg_values = self.eval_args(args, env)?;
        self.call_value(&function, this, arg_values)
    }

    pub fn eval_args(&mut self, args: &[Expr], env: &Env) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            if let ExprKind::Spread(inner) = &arg.kind {
                let spread = self.eval_expr(inner, env)?;
                iterator::spread_into(self, &spread, &mut values)?;
            } else {
                values.push(self.eval_expr(arg, env)?);
            }
        }
        Ok(values)
    }

    pub fn call_value(
        &mut self,
        function: &Value,
        this: Value,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        match function {
            Value::Function(f) => self.call_function(&Rc::clone(f), this, args),
            Value::Class(_) => {
                Err(self.throw_type_error("Class constructors must be invoked with 'new'"))
            }
            other => Err(self.throw_type_error(format!(
                "{} is not a function",
                ops::to_display_string(other)
            ))),
        }
    }

    pub fn call_function(
        &mut self,
        function: &Rc<FunctionValue>,
        this: Value,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        if self.call_depth >= limits::MAX_CALL_DEPTH {
            let error = self.make_error("RangeError", "Maximum call stack size exceeded");
            return Err(Signal::Throw(error));
        }
        self.call_depth += 1;
        let result = self.call_function_inner(function, this, args);
        self.call_depth -= 1;
        result
    }

    fn call_function_inner(
        &mut self,
        function: &Rc<FunctionValue>,
        this: Value,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        match function.as_ref() {
            FunctionValue::Native { call, .. } => {
                let call = Rc::clone(call);
                call(self, this, &args)
            }
            FunctionValue::Bound {
                target,
                this: bound_this,
                bound_args,
            } => {
                let mut all = bound_args.clone();
                all.extend(args);
                self.call_function(target, bound_this.clone(), all)
            }
            FunctionValue::User(user) => {
                if user.is_generator {
                    return coroutine::make_generator(self, user, this, args);
                }
                if user.is_async {
                    return coroutine::start_async(self, user, this, args);
                }
                let env = Environment::child(&user.env);
                self.bind_params(&user.params, &args, &env)?;
                if !user.is_arrow {
                    env.define("this", this);
                }
                match &user.body {
                    FnBody::ArrowExpr(expr) => self.eval_expr(expr, &env),
                    FnBody::Block(stmts) => match self.exec_stmts(stmts, &env) {
                        Ok(()) => Ok(Value::Undefined),
                        Err(Signal::Return(value)) => Ok(value),
                        Err(signal) => Err(signal),
                    },
                }
            }
        }
    }

    pub fn bind_params(&mut self, params: &[Param], args: &[Value], env: &Env) -> EvalResult<()> {
        let mut index = 0usize;
        for param in params.iter() {
            if param.name == "this" {
                continue;
            }
            if param.rest {
                let rest: Vec<Value> = args.get(index..).unwrap_or(&[]).to_vec();
                env.define(
                    &param.name,
                    Value::Array(Rc::new(std::cell::RefCell::new(rest))),
                );
                index = args.len();
                continue;
            }
            let mut value = args.get(index).cloned().unwrap_or(Value::Undefined);
            if matches!(value, Value::Undefined) {
                if let Some(default) = &param.default {
                    value = self.eval_expr(default, env)?;
                }
            }
            env.define(&param.name, value);
            index += 1;
        }
        Ok(())
    }

    // =========================================================================
    // Construction
    // =========================================================================

    fn eval_new(&mut self, callee: &Expr, args: &[Expr], env: &Env) -> EvalResult<Value> {
        // `new Promise(executor)`: the executor runs synchronously with
        // native resolve/reject callbacks.
        if let ExprKind::Ident(name) = &callee.kind {
            if name == "Promise" && !matches!(env.get(name), Some(Value::Class(_))) {
                let arg_values = self.eval_args(args, env)?;
                let promise = PromiseState::pending();
                if let Some(executor) = arg_values.first() {
                    let resolve_target = Rc::clone(&promise);
                    let resolve = iterator::native_fn("resolve", move |interp, _this, args| {
                        let value = args.first().cloned().unwrap_or(Value::Undefined);
                        interp.resolve_promise(&resolve_target, value);
                        Ok(Value::Undefined)
                    });
                    let reject_target = Rc::clone(&promise);
                    let reject = iterator::native_fn("reject", move |interp, _this, args| {
                        let error = args.first().cloned().unwrap_or(Value::Undefined);
                        interp.reject_promise(&reject_target, error);
                        Ok(Value::Undefined)
                    });
                    match self.call_value(executor, Value::Undefined, vec![resolve, reject]) {
                        Ok(_) => {}
                        Err(Signal::Throw(error)) => self.reject_promise(&promise, error),
                        Err(signal) => return Err(signal),
                    }
                }
                return Ok(Value::Promise(promise));
            }
        }

        let target = self.eval_expr(callee, env)?;
        let arg_values = self.eval_args(args, env)?;
        match &target {
            Value::Class(class) => self.construct(&Rc::clone(class), arg_values),
            Value::Function(f) => {
                // `new` over a plain function: allocate and run with
                // `this` bound (constructor-function style).
                let object = Value::Object(ObjectData::plain());
                let result = self.call_function(&Rc::clone(f), object.clone(), arg_values)?;
                Ok(match result {
                    Value::Undefined => object,
                    other => other,
                })
            }
            other => Err(self.throw_type_error(format!(
                "{} is not a constructor",
                ops::to_display_string(other)
            ))),
        }
    }

    pub fn construct(&mut self, class: &Rc<ClassValue>, args: Vec<Value>) -> EvalResult<Value> {
        let instance = Value::Object(ObjectData::instance_of(Rc::clone(class)));
        self.initialize_fields(class, &instance)?;
        self.run_constructor(class, &instance, args)?;
        Ok(instance)
    }

    fn initialize_fields(&mut self, class: &Rc<ClassValue>, instance: &Value) -> EvalResult<()> {
        // Base-class fields first.
        if let Some(base) = &class.superclass {
            self.initialize_fields(base, instance)?;
        }
        let env = Environment::child(&class.env);
        env.define("this", instance.clone());
        for (name, init) in &class.field_inits {
            let value = match init {
                Some(expr) => self.eval_expr(expr, &env)?,
                None => Value::Undefined,
            };
            self.set_property(instance, name, value)?;
        }
        Ok(())
    }

    fn run_constructor(
        &mut self,
        class: &Rc<ClassValue>,
        instance: &Value,
        args: Vec<Value>,
    ) -> EvalResult<()> {
        if let Some(native) = &class.native_ctor {
            let native = Rc::clone(native);
            native(self, instance.clone(), &args)?;
            return Ok(());
        }
        match &class.ctor {
            Some(ctor) => {
                let env = Environment::child(&class.env);
                self.bind_params(&ctor.params, &args, &env)?;
                env.define("this", instance.clone());
                env.define("__class__", Value::Class(Rc::clone(class)));
                match self.exec_stmts(&ctor.body, &env) {
                    Ok(()) | Err(Signal::Return(_)) => Ok(()),
                    Err(signal) => Err(signal),
                }
            }
            None => {
                // Implicit constructor: forward to the base class.
                if let Some(base) = &class.superclass {
                    self.run_constructor(&Rc::clone(base), instance, args)?;
                }
                Ok(())
            }
        }
    }

    fn call_super_constructor(&mut self, args: &[Value], env: &Env) -> EvalResult<Value> {
        let this = env.get("this").unwrap_or(Value::Undefined);
        let class = match env.get("__class__") {
            Some(Value::Class(class)) => class,
            _ => return Err(self.throw_type_error("'super' is only valid inside a constructor")),
        };
        match &class.superclass {
            Some(base) => {
                self.run_constructor(&Rc::clone(base), &this, args.to_vec())?;
                Ok(Value::Undefined)
            }
            None => Err(self.throw_type_error("Class has no base class")),
        }
    }

    /// Resolve `super.method`, returning it bound to the current
    /// `this`.
    fn resolve_super_member(&mut self, property: &str, env: &Env) -> EvalResult<(Value, Value)> {
        let this = env.get("this").unwrap_or(Value::Undefined);
        let class = match env.get("__class__") {
            Some(Value::Class(class)) => class,
            _ => {
                // Fall back to the receiver's class chain.
                match &this {
                    Value::Object(data) => match &data.class {
                        Some(class) => Rc::clone(class),
                        None => {
                            return Err(
                                self.throw_type_error("'super' outside of a class member")
                            );
                        }
                    },
                    _ => return Err(self.throw_type_error("'super' outside of a class member")),
                }
            }
        };
        let base = class
            .superclass
            .as_ref()
            .ok_or_else(|| self.throw_type_error("Class has no base class"))?;
        let (method, owner) = base
            .find_method(property)
            .ok_or_else(|| {
                self.throw_type_error(format!("Superclass has no method '{property}'"))
            })?;
        let _ = owner;
        let function = self.method_to_function(method, base);
        Ok((function, this))
    }

    pub fn method_to_function(&self, method: &MethodDef, class: &Rc<ClassValue>) -> Value {
        Value::Function(Rc::new(FunctionValue::User(UserFunction {
            name: String::new(),
            params: Rc::clone(&method.params),
            body: FnBody::Block(Rc::clone(&method.body)),
            env: {
                let env = Environment::child(&class.env);
                env.define("__class__", Value::Class(Rc::clone(class)));
                env
            },
            is_arrow: false,
            is_async: method.is_async,
            is_generator: method.is_generator,
            lowered: once_cell::unsync::OnceCell::new(),
        })))
    }

    // =========================================================================
    // Declarations to values
    // =========================================================================

    pub fn make_function(&mut self, decl: &FunctionDecl, env: &Env) -> Value {
        Value::Function(Rc::new(FunctionValue::User(UserFunction {
            name: decl.name.clone(),
            params: Rc::new(decl.params.clone()),
            body: FnBody::Block(Rc::new(decl.body.clone().unwrap_or_default())),
            env: Rc::clone(env),
            is_arrow: false,
            is_async: decl.is_async,
            is_generator: decl.is_generator,
            lowered: once_cell::unsync::OnceCell::new(),
        })))
    }

    pub fn make_class(&mut self, decl: &ClassDecl, env: &Env) -> EvalResult<Value> {
        let superclass = match &decl.superclass {
            Some((name, _)) => match env.get(name) {
                Some(Value::Class(base)) => Some(base),
                _ => {
                    return Err(self.throw_type_error(format!(
                        "Superclass '{name}' is not a class"
                    )));
                }
            },
            None => None,
        };

        let mut ctor = None;
        let mut methods = rustc_hash::FxHashMap::default();
        let mut getters = rustc_hash::FxHashMap::default();
        let mut setters = rustc_hash::FxHashMap::default();
        let mut field_inits = Vec::new();
        let mut static_fields: Vec<(String, Option<Expr>)> = Vec::new();
        let mut static_methods: Vec<(String, MethodDef)> = Vec::new();

        for member in &decl.members {
            let Some(name) = member.name.as_static() else {
                continue;
            };
            match &member.kind {
                MemberKind::Constructor { params, body } => {
                    if let Some(body) = body {
                        ctor = Some(MethodDef {
                            params: Rc::new(params.clone()),
                            body: Rc::new(body.clone()),
                            is_async: false,
                            is_generator: false,
                        });
                    }
                }
                MemberKind::Method(parts) => {
                    let Some(body) = &parts.body else { continue };
                    let def = MethodDef {
                        params: Rc::new(parts.params.clone()),
                        body: Rc::new(body.clone()),
                        is_async: parts.is_async,
                        is_generator: parts.is_generator,
                    };
                    if member.is_static {
                        static_methods.push((name, def));
                    } else {
                        methods.insert(name, def);
                    }
                }
                MemberKind::Getter { body, .. } => {
                    if let Some(body) = body {
                        getters.insert(
                            name,
                            MethodDef {
                                params: Rc::new(Vec::new()),
                                body: Rc::new(body.clone()),
                                is_async: false,
                                is_generator: false,
                            },
                        );
                    }
                }
                MemberKind::Setter { param, body } => {
                    if let Some(body) = body {
                        setters.insert(
                            name,
                            MethodDef {
                                params: Rc::new(vec![param.clone()]),
                                body: Rc::new(body.clone()),
                                is_async: false,
                                is_generator: false,
                            },
                        );
                    }
                }
                MemberKind::Field { init, .. } => {
                    if member.is_static {
                        static_fields.push((name, init.clone()));
                    } else {
                        field_inits.push((name, init.clone()));
                    }
                }
            }
        }

        let class = Rc::new(ClassValue {
            name: decl.name.clone(),
            superclass,
            ctor,
            methods,
            getters,
            setters,
            static_props: std::cell::RefCell::new(rustc_hash::FxHashMap::default()),
            field_inits,
            env: Rc::clone(env),
            native_ctor: None,
        });

        // Static members are evaluated once, with the class in scope.
        let class_value = Value::Class(Rc::clone(&class));
        for (name, init) in static_fields {
            let value = match init {
                Some(expr) => self.eval_expr(&expr, env)?,
                None => Value::Undefined,
            };
            class.static_props.borrow_mut().insert(name, value);
        }
        for (name, def) in static_methods {
            let function = self.method_to_function(&def, &class);
            class.static_props.borrow_mut().insert(name, function);
        }
        Ok(class_value)
    }

    fn make_enum(&mut self, decl: &EnumDecl, env: &Env) -> EvalResult<Value> {
        let object = ObjectData::plain();
        let scope = Environment::child(env);
        let mut next_auto = 0.0f64;
        for member in &decl.members {
            let value = match &member.init {
                Some(init) => self.eval_expr(init, &scope)?,
                None => Value::Number(next_auto),
            };
            if let Value::Number(n) = &value {
                next_auto = n + 1.0;
                // Reverse mapping for numeric members.
                object.props.borrow_mut().insert(
                    PropKey::Name(sharpts_common::numeric::format_number(*n)),
                    Value::string(&member.name),
                );
            }
            object
                .props
                .borrow_mut()
                .insert(PropKey::Name(member.name.clone()), value.clone());
            scope.define(&member.name, value);
        }
        Ok(Value::Object(object))
    }

    // =========================================================================
    // Instance checks and property protocol
    // =========================================================================

    pub fn is_instance_of(&self, value: &Value, class: &Rc<ClassValue>) -> bool {
        let Value::Object(data) = value else {
            return false;
        };
        let mut current = data.class.clone();
        while let Some(c) = current {
            if Rc::ptr_eq(&c, class) {
                return true;
            }
            current = c.superclass.clone();
        }
        false
    }

    pub fn has_property(&self, value: &Value, name: &str) -> bool {
        match value {
            Value::Object(data) => {
                if data
                    .props
                    .borrow()
                    .contains_key(&PropKey::Name(name.to_string()))
                {
                    return true;
                }
                let mut class = data.class.clone();
                while let Some(c) = class {
                    if c.methods.contains_key(name)
                        || c.getters.contains_key(name)
                        || c.setters.contains_key(name)
                    {
                        return true;
                    }
                    class = c.superclass.clone();
                }
                false
            }
            Value::Array(elements) => {
                name == "length"
                    || name
                        .parse::<usize>()
                        .is_ok_and(|i| i < elements.borrow().len())
            }
            _ => false,
        }
    }

    /// Whether writes to this value are blocked (frozen), throwing in
    /// strict mode.
    pub fn write_blocked(&mut self, value: &Value) -> EvalResult<bool> {
        if let Some(identity) = value.identity() {
            if self.frozen.contains(&identity) {
                if self.strict {
                    return Err(
                        self.throw_type_error("Cannot modify a frozen object")
                    );
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn new_prop_blocked(&mut self, value: &Value, exists: bool) -> EvalResult<bool> {
        if exists {
            return Ok(false);
        }
        if let Some(identity) = value.identity() {
            if self.sealed.contains(&identity) {
                if self.strict {
                    return Err(self.throw_type_error(
                        "Cannot add a property to a sealed object",
                    ));
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn get_property(&mut self, receiver: &Value, name: &str) -> EvalResult<Value> {
        match receiver {
            Value::Undefined | Value::Null => Err(self.throw_type_error(format!(
                "Cannot read properties of {} (reading '{name}')",
                ops::to_display_string(receiver)
            ))),
            Value::Object(data) => {
                // Own accessor?
                let accessor = data.accessors.borrow().get(name).cloned();
                if let Some(AccessorPair {
                    getter: Some(getter),
                    ..
                }) = accessor
                {
                    return self.call_function(&getter, receiver.clone(), Vec::new());
                }
                if let Some(value) = data
                    .props
                    .borrow()
                    .get(&PropKey::Name(name.to_string()))
                {
                    return Ok(value.clone());
                }
                // Class chain: getters then methods.
                if let Some(class) = &data.class {
                    if let Some(getter) = class.find_getter(name) {
                        let getter = getter.clone();
                        let class = Rc::clone(class);
                        let function = self.method_to_function(&getter, &class);
                        return self.call_value(&function, receiver.clone(), Vec::new());
                    }
                    if let Some((method, owner)) = class.find_method(name) {
                        let method = method.clone();
                        let mut owner_rc = Rc::clone(class);
                        // Locate the owning class Rc for the closure env.
                        let mut cursor = Some(Rc::clone(class));
                        while let Some(c) = cursor {
                            if std::ptr::eq(c.as_ref(), owner) {
                                owner_rc = Rc::clone(&c);
                                break;
                            }
                            cursor = c.superclass.clone();
                        }
                        let function = self.method_to_function(&method, &owner_rc);
                        // Methods resolved through member access bind
                        // `this` to the receiver.
                        if let Value::Function(target) = function {
                            return Ok(Value::Function(Rc::new(FunctionValue::Bound {
                                target,
                                this: receiver.clone(),
                                bound_args: Vec::new(),
                            })));
                        }
                    }
                }
                Ok(Value::Undefined)
            }
            Value::Class(class) => {
                if name == "name" {
                    return Ok(Value::string(&class.name));
                }
                Ok(class.find_static(name).unwrap_or(Value::Undefined))
            }
            _ => builtins::builtin_member(self, receiver, name),
        }
    }

    pub fn set_property(&mut self, receiver: &Value, name: &str, value: Value) -> EvalResult<()> {
        match receiver {
            Value::Object(data) => {
                if self.write_blocked(receiver)? {
                    return Ok(());
                }
                let accessor = data.accessors.borrow().get(name).cloned();
                if let Some(AccessorPair {
                    setter: Some(setter),
                    ..
                }) = accessor
                {
                    self.call_function(&setter, receiver.clone(), vec![value])?;
                    return Ok(());
                }
                if let Some(class) = &data.class {
                    if let Some(setter) = class.find_setter(name) {
                        let setter = setter.clone();
                        let class = Rc::clone(class);
                        let function = self.method_to_function(&setter, &class);
                        self.call_value(&function, receiver.clone(), vec![value])?;
                        return Ok(());
                    }
                }
                let key = PropKey::Name(name.to_string());
                let exists = data.props.borrow().contains_key(&key);
                if self.new_prop_blocked(receiver, exists)? {
                    return Ok(());
                }
                data.props.borrow_mut().insert(key, value);
                Ok(())
            }
            Value::Class(class) => {
                class
                    .static_props
                    .borrow_mut()
                    .insert(name.to_string(), value);
                Ok(())
            }
            Value::Array(elements) => {
                if self.write_blocked(receiver)? {
                    return Ok(());
                }
                if name == "length" {
                    let new_len = ops::to_number(&value).max(0.0) as usize;
                    elements.borrow_mut().resize(new_len, Value::Undefined);
                }
                Ok(())
            }
            Value::Undefined | Value::Null => Err(self.throw_type_error(format!(
                "Cannot set properties of {}",
                ops::to_display_string(receiver)
            ))),
            _ => Ok(()),
        }
    }

    pub fn get_index(&mut self, receiver: &Value, key: &Value) -> EvalResult<Value> {
        match (receiver, key) {
            (Value::Array(elements), Value::Number(n)) => {
                let index = *n as usize;
                Ok(elements
                    .borrow()
                    .get(index)
                    .cloned()
                    .unwrap_or(Value::Undefined))
            }
            (Value::Str(s), Value::Number(n)) => {
                let index = *n as usize;
                Ok(s.chars()
                    .nth(index)
                    .map(|c| Value::string(c.to_string()))
                    .unwrap_or(Value::Undefined))
            }
            (_, Value::Symbol(id)) => iterator::symbol_lookup(self, receiver, *id),
            (Value::Object(data), _) => {
                let name = ops::to_display_string(key);
                if data
                    .props
                    .borrow()
                    .contains_key(&PropKey::Name(name.clone()))
                {
                    return Ok(data.props.borrow()[&PropKey::Name(name.clone())].clone());
                }
                self.get_property(receiver, &name)
            }
            _ => {
                let name = ops::to_display_string(key);
                self.get_property(receiver, &name)
            }
        }
    }

    pub fn set_index(&mut self, receiver: &Value, key: &Value, value: Value) -> EvalResult<()> {
        match (receiver, key) {
            (Value::Array(elements), Value::Number(n)) => {
                if self.write_blocked(receiver)? {
                    return Ok(());
                }
                let index = *n as usize;
                let mut elements = elements.borrow_mut();
                if index >= elements.len() {
                    elements.resize(index + 1, Value::Undefined);
                }
                elements[index] = value;
                Ok(())
            }
            (Value::Object(data), Value::Symbol(id)) => {
                if self.write_blocked(receiver)? {
                    return Ok(());
                }
                data.props
                    .borrow_mut()
                    .insert(PropKey::Symbol(*id), value);
                Ok(())
            }
            _ => {
                let name = ops::to_display_string(key);
                self.set_property(receiver, &name, value)
            }
        }
    }

    // =========================================================================
    // Top-level await support
    // =========================================================================

    /// Resolve a (possibly promise) value by draining the microtask
    /// queue until it settles. This is the cooperative-scheduler view of
    /// a top-level await.
    pub fn block_on(&mut self, value: Value) -> EvalResult<Value> {
        let Value::Promise(promise) = value else {
            return Ok(value);
        };
        loop {
            let status = {
                let state = promise.borrow();
                match &state.status {
                    PromiseStatus::Pending => None,
                    PromiseStatus::Fulfilled(v) => Some(Ok(v.clone())),
                    PromiseStatus::Rejected(e) => Some(Err(Signal::Throw(e.clone()))),
                }
            };
            if let Some(outcome) = status {
                return outcome;
            }
            match self.microtasks.pop_front() {
                Some(job) => job(self),
                None => {
                    return Err(self.throw_type_error(
                        "Await would deadlock: promise never settles",
                    ));
                }
            }
        }
    }
}

fn matches_label(signal_label: &Option<String>, loop_label: Option<&str>) -> bool {
    match signal_label {
        None => true,
        Some(l) => loop_label == Some(l.as_str()),
    }
}
