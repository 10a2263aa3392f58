//! The emitter driver: program, function, class, and enum emission.

mod expressions;
mod statements;

use rustc_hash::{FxHashMap, FxHashSet};
use sharpts_checker::CheckResult;
use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::span::Span;
use sharpts_parser::ast::*;
use sharpts_solver::types::EnumMemberValue;

use crate::MethodBuilder;
use crate::il::*;
use crate::shim;
use crate::statemachine;

/// Where a named binding lives in emitted code.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Local(u16),
    Arg(u16),
    /// Static field on the synthetic `Globals` class (top-level
    /// bindings are visible to every method).
    Global(String),
    /// Field on the enclosing state-machine object.
    MachineField(String),
    /// Direct static method (top-level function declarations).
    Method(String),
    /// A class binding.
    Class(String),
}

/// Per-method emission context.
pub struct FnCtx {
    pub builder: MethodBuilder,
    pub scopes: Vec<FxHashMap<String, Storage>>,
    /// `break`/`continue` label targets.
    pub loop_stack: Vec<LoopLabels>,
    /// Set when emitting a state-machine `MoveNext` body: named
    /// variables resolve to machine fields.
    pub machine_class: Option<String>,
    pub this_class: Option<String>,
    /// True for the synthetic `main`, where top-level bindings live on
    /// the `Globals` class.
    pub is_entry: bool,
    scratch: Option<u16>,
}

pub struct LoopLabels {
    pub label: Option<String>,
    pub break_label: Label,
    pub continue_label: Option<Label>,
}

impl FnCtx {
    pub fn new(builder: MethodBuilder) -> Self {
        FnCtx {
            builder,
            scopes: vec![FxHashMap::default()],
            loop_stack: Vec::new(),
            machine_class: None,
            this_class: None,
            is_entry: false,
            scratch: None,
        }
    }

    /// A reusable boxed scratch local.
    pub fn scratch_slot(&mut self) -> u16 {
        match self.scratch {
            Some(slot) => slot,
            None => {
                let slot = self.builder.declare_local("__scratch", StackType::Ref);
                self.scratch = Some(slot);
                slot
            }
        }
    }

    pub fn declare(&mut self, name: &str) -> Storage {
        if let Some(machine) = &self.machine_class {
            let storage = Storage::MachineField(name.to_string());
            let _ = machine;
            self.scopes
                .last_mut()
                .expect("scope stack is never empty")
                .insert(name.to_string(), storage.clone());
            return storage;
        }
        let slot = self.builder.declare_local(name, StackType::Ref);
        let storage = Storage::Local(slot);
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), storage.clone());
        storage
    }

    pub fn lookup(&self, name: &str) -> Option<Storage> {
        for scope in self.scopes.iter().rev() {
            if let Some(storage) = scope.get(name) {
                return Some(storage.clone());
            }
        }
        None
    }
}

pub struct Emitter<'a> {
    pub check: &'a CheckResult,
    pub classes: Vec<IlClass>,
    pub methods: Vec<IlMethod>,
    pub globals: Vec<IlField>,
    /// Top-level bindings, visible from any method.
    pub global_scope: FxHashMap<String, Storage>,
    /// Runtime shim helpers actually referenced.
    pub used_shim: FxHashSet<&'static str>,
    /// Classes that declare private members get a brand table.
    pub private_classes: FxHashSet<String>,
    /// One instantiation per (generic function, argument tuple); the
    /// tuple is compared structurally so `[number, string]` keys equal
    /// regardless of construction path.
    pub instantiations: FxHashMap<(String, Vec<String>), String>,
    pub next_method_id: u32,
}

impl<'a> Emitter<'a> {
    pub fn new(check: &'a CheckResult) -> Self {
        Emitter {
            check,
            classes: Vec::new(),
            methods: Vec::new(),
            globals: Vec::new(),
            global_scope: FxHashMap::default(),
            used_shim: FxHashSet::default(),
            private_classes: FxHashSet::default(),
            instantiations: FxHashMap::default(),
            next_method_id: 0,
        }
    }

    pub fn use_shim(&mut self, name: &'static str) {
        self.used_shim.insert(name);
    }

    pub fn fresh_method_name(&mut self, hint: &str) -> String {
        let id = self.next_method_id;
        self.next_method_id += 1;
        format!("{hint}__{id}")
    }

    pub fn invariant(&self, span: Span, message: impl Into<String>) -> Diagnostic {
        Diagnostic::compile_error(
            span,
            format!("internal emitter invariant violated: {}", message.into()),
            diagnostic_codes::EMITTER_INVARIANT,
        )
    }

    // =========================================================================
    // Program
    // =========================================================================

    pub fn emit_program(&mut self, program: &Program) -> Result<IlModule, Diagnostic> {
        tracing::debug!("emitting program");
        // Pass 1: register top-level declarations so forward references
        // resolve to direct storage.
        for stmt in &program.statements {
            self.register_top_level(stmt);
        }

        // Pass 2: declarations.
        for stmt in &program.statements {
            self.emit_declaration(stmt)?;
        }

        // Pass 3: the entry method from the remaining statements.
        let mut ctx = FnCtx::new(MethodBuilder::new("main", Vec::new()));
        ctx.is_entry = true;
        for stmt in &program.statements {
            if is_declaration(stmt) {
                // Enum objects still need their dictionaries built at
                // startup.
                if let StmtKind::Enum(decl) = unwrap_export(stmt) {
                    if !decl.is_const {
                        self.emit_enum_object(&mut ctx, decl)?;
                    }
                }
                continue;
            }
            self.emit_stmt(&mut ctx, stmt)?;
        }
        ctx.builder.ret();
        let main = ctx.builder.finish(true, Span::dummy())?;
        self.methods.push(main);

        // The runtime shim, generated once per output for the helpers
        // the program referenced.
        let shim_class = shim::generate(&self.used_shim, &self.private_classes)?;
        let mut classes = std::mem::take(&mut self.classes);
        classes.push(shim_class);
        if !self.globals.is_empty() {
            classes.push(IlClass {
                name: "Globals".to_string(),
                base: None,
                fields: std::mem::take(&mut self.globals),
                methods: Vec::new(),
                regions: Vec::new(),
                state_handlers: Vec::new(),
            });
        }

        Ok(IlModule {
            name: "program".to_string(),
            classes,
            methods: std::mem::take(&mut self.methods),
            entry: "main".to_string(),
            runtime_version: "sharpts-runtime/1.0".to_string(),
        })
    }

    fn register_top_level(&mut self, stmt: &Stmt) {
        match unwrap_export(stmt) {
            StmtKind::Function(decl) => {
                self.global_scope
                    .insert(decl.name.clone(), Storage::Method(decl.name.clone()));
            }
            StmtKind::Class(decl) => {
                self.global_scope
                    .insert(decl.name.clone(), Storage::Class(decl.name.clone()));
            }
            StmtKind::VarDecl { declarations, .. } => {
                for declarator in declarations {
                    self.globals.push(IlField {
                        name: declarator.name.clone(),
                        ty: StackType::Ref,
                        is_static: true,
                    });
                    self.global_scope.insert(
                        declarator.name.clone(),
                        Storage::Global(declarator.name.clone()),
                    );
                }
            }
            StmtKind::Enum(decl) => {
                if !decl.is_const {
                    self.globals.push(IlField {
                        name: decl.name.clone(),
                        ty: StackType::Ref,
                        is_static: true,
                    });
                    self.global_scope
                        .insert(decl.name.clone(), Storage::Global(decl.name.clone()));
                }
            }
            _ => {}
        }
    }

    fn emit_declaration(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match unwrap_export(stmt) {
            StmtKind::Function(decl) => {
                if decl.body.is_some() {
                    self.emit_function_decl(decl)?;
                }
                Ok(())
            }
            StmtKind::Class(decl) => self.emit_class(decl),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    pub fn emit_function_decl(&mut self, decl: &FunctionDecl) -> Result<(), Diagnostic> {
        if decl.is_async || decl.is_generator {
            let machine = statemachine::emit_coroutine(
                self,
                &decl.name,
                &decl.params,
                decl.body.as_deref().unwrap_or(&[]),
                decl.is_async,
                decl.is_generator,
            )?;
            self.classes.push(machine);
            return Ok(());
        }
        let body = decl.body.as_deref().unwrap_or(&[]);
        let method = self.emit_plain_function(&decl.name, &decl.params, body, decl.span)?;
        self.methods.push(method);
        Ok(())
    }

    pub fn emit_plain_function(
        &mut self,
        name: &str,
        params: &[Param],
        body: &[Stmt],
        span: Span,
    ) -> Result<IlMethod, Diagnostic> {
        let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let mut ctx = FnCtx::new(MethodBuilder::new(name, param_names));
        for (i, param) in params.iter().enumerate() {
            ctx.scopes
                .last_mut()
                .expect("scope stack is never empty")
                .insert(param.name.clone(), Storage::Arg(i as u16));
            // Defaulted parameter: `if (arg === undefined) arg = default`.
            if let Some(default) = &param.default {
                let skip = ctx.builder.reserve_label();
                ctx.builder.ld_arg(i as u16);
                ctx.builder.emit(
                    Instr::CallIntrinsic {
                        intrinsic: Intrinsic::TypeTag,
                        argc: 1,
                    },
                    1,
                    Some(StackType::Double),
                );
                ctx.builder.ldc_f64(type_tag::UNDEFINED);
                ctx.builder.emit(Instr::CmpEq, 2, Some(StackType::Bool));
                ctx.builder.br_false(skip);
                self.emit_expr(&mut ctx, default)?;
                ctx.builder.ensure_boxed();
                ctx.builder.emit(Instr::StArg(i as u16), 1, None);
                ctx.builder.mark_label(skip);
            }
        }
        for stmt in body {
            self.emit_stmt(&mut ctx, stmt)?;
        }
        // Implicit `return undefined`.
        ctx.builder.ldc_undefined();
        ctx.builder.ret();
        ctx.builder.finish(true, span)
    }

    // =========================================================================
    // Classes
    // =========================================================================

    fn emit_class(&mut self, decl: &ClassDecl) -> Result<(), Diagnostic> {
        let has_private = decl.members.iter().any(|m| {
            m.accessibility == AccessModifier::Private
                || m.accessibility == AccessModifier::Protected
        });
        if has_private {
            self.private_classes.insert(decl.name.clone());
            self.use_shim("GetPrivateField");
            self.use_shim("SetPrivateField");
        }

        let mut fields: Vec<IlField> = Vec::new();
        let mut methods: Vec<IlMethod> = Vec::new();

        for member in &decl.members {
            let Some(name) = member.name.as_static() else {
                continue;
            };
            match &member.kind {
                MemberKind::Field { .. } => {
                    fields.push(IlField {
                        name,
                        ty: StackType::Ref,
                        is_static: member.is_static,
                    });
                }
                MemberKind::Method(parts) => {
                    let Some(body) = &parts.body else { continue };
                    if parts.is_async || parts.is_generator {
                        let machine_name = format!("{}_{}", decl.name, name);
                        let machine = statemachine::emit_coroutine(
                            self,
                            &machine_name,
                            &parts.params,
                            body,
                            parts.is_async,
                            parts.is_generator,
                        )?;
                        self.classes.push(machine);
                        continue;
                    }
                    let method =
                        self.emit_member_method(decl, &name, &parts.params, body, member.span)?;
                    methods.push(method);
                }
                MemberKind::Getter { body, .. } => {
                    if let Some(body) = body {
                        // Accessor methods use the reflected-name
                        // convention the shim's property dispatch probes.
                        let method = self.emit_member_method(
                            decl,
                            &format!("get_{name}"),
                            &[],
                            body,
                            member.span,
                        )?;
                        methods.push(method);
                    }
                }
                MemberKind::Setter { param, body } => {
                    if let Some(body) = body {
                        let params = vec![param.clone()];
                        let method = self.emit_member_method(
                            decl,
                            &format!("set_{name}"),
                            &params,
                            body,
                            member.span,
                        )?;
                        methods.push(method);
                    }
                }
                MemberKind::Constructor { params, body } => {
                    if let Some(body) = body {
                        let method =
                            self.emit_member_method(decl, ".ctor", params, body, member.span)?;
                        methods.push(method);
                    }
                }
            }
        }

        self.classes.push(IlClass {
            name: decl.name.clone(),
            base: decl.superclass.as_ref().map(|(name, _)| name.clone()),
            fields,
            methods,
            regions: Vec::new(),
            state_handlers: Vec::new(),
        });
        Ok(())
    }

    fn emit_member_method(
        &mut self,
        class: &ClassDecl,
        name: &str,
        params: &[Param],
        body: &[Stmt],
        span: Span,
    ) -> Result<IlMethod, Diagnostic> {
        // Arg 0 is `this`.
        let mut param_names = vec!["this".to_string()];
        param_names.extend(params.iter().map(|p| p.name.clone()));
        let mut ctx = FnCtx::new(MethodBuilder::new(name, param_names));
        ctx.this_class = Some(class.name.clone());
        let scope = ctx.scopes.last_mut().expect("scope stack is never empty");
        scope.insert("this".to_string(), Storage::Arg(0));
        for (i, param) in params.iter().enumerate() {
            scope.insert(param.name.clone(), Storage::Arg(i as u16 + 1));
        }
        for stmt in body {
            self.emit_stmt(&mut ctx, stmt)?;
        }
        ctx.builder.ldc_undefined();
        ctx.builder.ret();
        ctx.builder.finish(false, span)
    }

    // =========================================================================
    // Enums
    // =========================================================================

    /// Non-const enums become a pair of dictionaries (forward, plus
    /// reverse entries for numeric members) bound to the enum's name.
    fn emit_enum_object(&mut self, ctx: &mut FnCtx, decl: &EnumDecl) -> Result<(), Diagnostic> {
        let Some(enum_type) = self.check.enums.get(&decl.name) else {
            return Err(self.invariant(decl.span, format!("enum '{}' was not checked", decl.name)));
        };
        let members = enum_type.members.clone();
        ctx.builder
            .call_intrinsic(Intrinsic::DictNew, 0, Some(StackType::Ref));
        for (name, value) in &members {
            // dict, key, value -> dict
            ctx.builder.dup();
            ctx.builder.ldc_str(name);
            ctx.builder.ensure_boxed();
            match value {
                EnumMemberValue::Num(bits) => ctx.builder.ldc_f64(bits.as_f64()),
                EnumMemberValue::Str(text) => ctx.builder.ldc_str(text),
            }
            ctx.builder.ensure_boxed();
            ctx.builder.call_intrinsic(Intrinsic::DictSet, 3, None);
            if let EnumMemberValue::Num(bits) = value {
                ctx.builder.dup();
                ctx.builder
                    .ldc_str(&sharpts_common::numeric::format_number(bits.as_f64()));
                ctx.builder.ensure_boxed();
                ctx.builder.ldc_str(name);
                ctx.builder.ensure_boxed();
                ctx.builder.call_intrinsic(Intrinsic::DictSet, 3, None);
            }
        }
        ctx.builder.emit(
            Instr::StSFld(MethodRef {
                class: "Globals".to_string(),
                name: decl.name.clone(),
            }),
            1,
            None,
        );
        Ok(())
    }

    /// The compile-time value of a const-enum member, inlined at use
    /// sites.
    pub fn const_enum_value(&self, enum_name: &str, member: &str) -> Option<EnumMemberValue> {
        let enum_type = self.check.enums.get(enum_name)?;
        if !enum_type.is_const {
            return None;
        }
        enum_type
            .members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| value.clone())
    }
}

pub fn unwrap_export(stmt: &Stmt) -> &StmtKind {
    match &stmt.kind {
        StmtKind::Export(inner) => &inner.kind,
        other => other,
    }
}

pub fn is_declaration(stmt: &Stmt) -> bool {
    matches!(
        unwrap_export(stmt),
        StmtKind::Function(_)
            | StmtKind::Class(_)
            | StmtKind::Interface(_)
            | StmtKind::TypeAlias(_)
            | StmtKind::Enum(_)
            | StmtKind::Import(_)
            | StmtKind::ExportNamed { .. }
            | StmtKind::Directive(_)
    )
}

/// Runtime type tags the host guarantees for `TypeTag`.
pub mod type_tag {
    pub const UNDEFINED: f64 = 0.0;
    pub const NULL: f64 = 1.0;
    pub const BOOL: f64 = 2.0;
    pub const NUMBER: f64 = 3.0;
    pub const STRING: f64 = 4.0;
    pub const ARRAY: f64 = 5.0;
    pub const OBJECT: f64 = 6.0;
    pub const FUNCTION: f64 = 7.0;
    pub const PROMISE: f64 = 8.0;
    pub const SYMBOL: f64 = 9.0;
    pub const BIGINT: f64 = 10.0;
    pub const DICT: f64 = 11.0;
}
