//! Shared checker state.

use rustc_hash::FxHashMap;
use sharpts_common::diagnostics::Diagnostic;
use sharpts_parser::ast::{NodeId, TypeAliasDecl};
use sharpts_solver::TypeInterner;
use sharpts_solver::types::{EnumType, TypeId};

use crate::CheckResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Let,
    Const,
    Param,
    Function,
    Class,
    Enum,
    Namespace,
    Import,
    Builtin,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub ty: TypeId,
    pub kind: BindingKind,
}

/// One lexical scope frame: value bindings plus the flow-sensitive
/// narrowings attached to the region.
#[derive(Debug, Default)]
pub struct Scope {
    pub bindings: FxHashMap<String, Binding>,
    /// Narrowing paths (`x`, `x.a.b`, `x[0]`) refined in this region.
    pub narrowings: FxHashMap<String, TypeId>,
}

/// Information about the function body currently being checked.
#[derive(Debug, Clone)]
pub struct FunctionContext {
    /// Declared return type (`T` of `Promise<T>` for async functions).
    pub return_type: Option<TypeId>,
    pub is_async: bool,
    pub is_generator: bool,
}

pub struct CheckerContext {
    pub interner: TypeInterner,
    pub expr_types: FxHashMap<NodeId, TypeId>,
    pub scopes: Vec<Scope>,
    /// Type-level environment: interfaces and classes by (possibly
    /// namespace-qualified) name.
    pub type_bindings: FxHashMap<String, TypeId>,
    /// Type aliases stay as AST and expand at reference time.
    pub aliases: FxHashMap<String, TypeAliasDecl>,
    pub enums: FxHashMap<String, EnumType>,
    /// Stack of enclosing function bodies.
    pub function_stack: Vec<FunctionContext>,
    /// Stack of enclosing class instance types (for `this`).
    pub this_stack: Vec<TypeId>,
    /// Stack of enclosing superclass instance types (for `super`).
    pub super_stack: Vec<Option<TypeId>>,
    /// Namespace prefix for qualified registration (`A.B.`).
    pub namespace_prefix: String,
}

impl CheckerContext {
    pub fn new() -> Self {
        CheckerContext {
            interner: TypeInterner::new(),
            expr_types: FxHashMap::default(),
            scopes: vec![Scope::default()],
            type_bindings: FxHashMap::default(),
            aliases: FxHashMap::default(),
            enums: FxHashMap::default(),
            function_stack: Vec::new(),
            this_stack: Vec::new(),
            super_stack: Vec::new(),
            namespace_prefix: String::new(),
        }
    }

    pub fn into_result(self) -> CheckResult {
        CheckResult {
            interner: self.interner,
            expr_types: self.expr_types,
            enums: self.enums,
        }
    }

    // =========================================================================
    // Scopes and bindings
    // =========================================================================

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn declare(
        &mut self,
        name: &str,
        ty: TypeId,
        kind: BindingKind,
    ) -> Result<(), Diagnostic> {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        scope
            .bindings
            .insert(name.to_string(), Binding { ty, kind });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        for scope in self.scopes.iter().rev() {
            if let Some(binding) = scope.bindings.get(name) {
                return Some(binding);
            }
        }
        None
    }

    pub fn is_declared_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|s| s.bindings.contains_key(name))
    }

    /// Update the declared type of an existing binding (used when an
    /// unannotated declaration's type is inferred).
    pub fn set_binding_type(&mut self, name: &str, ty: TypeId) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.bindings.get_mut(name) {
                binding.ty = ty;
                return;
            }
        }
    }

    // =========================================================================
    // Narrowing
    // =========================================================================

    /// The effective type of a narrowing path, if one is active.
    pub fn narrowed(&self, path: &str) -> Option<TypeId> {
        for scope in self.scopes.iter().rev() {
            if let Some(&ty) = scope.narrowings.get(path) {
                return Some(ty);
            }
        }
        None
    }

    pub fn apply_narrowing(&mut self, path: String, ty: TypeId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.narrowings.insert(path, ty);
        }
    }

    /// Invalidate every narrowing of `path`, of any extension of it, and
    /// of any path it extends. A write to `a.b` kills `a.b`, `a.b.c`,
    /// and the refinement of `a` itself.
    pub fn invalidate_narrowings(&mut self, path: &str) {
        for scope in self.scopes.iter_mut() {
            scope.narrowings.retain(|key, _| {
                let extends_written = key == path
                    || key.starts_with(&format!("{path}."))
                    || key.starts_with(&format!("{path}["));
                let written_extends = path.starts_with(&format!("{key}."))
                    || path.starts_with(&format!("{key}["));
                !(extends_written || written_extends)
            });
        }
    }

    pub fn register_type(&mut self, name: &str, ty: TypeId) {
        let qualified = format!("{}{}", self.namespace_prefix, name);
        self.type_bindings.insert(qualified, ty);
        if !self.namespace_prefix.is_empty() {
            // Also visible unqualified inside the namespace body.
            self.type_bindings.insert(name.to_string(), ty);
        }
    }

    pub fn record_expr_type(&mut self, id: NodeId, ty: TypeId) -> TypeId {
        self.expr_types.insert(id, ty);
        ty
    }
}

impl Default for CheckerContext {
    fn default() -> Self {
        Self::new()
    }
}
